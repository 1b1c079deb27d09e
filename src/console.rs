#[path = "line.rs"]
mod line;

use crate::sync::Mutex;
use crate::task::{Task, TaskId};
use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::{Duration, Instant};
use termcolor::ColorChoice::Auto;
use termcolor::{Color, ColorSpec, StandardStream, WriteColor};
use tracing::trace;

pub use self::line::TaskConsole;

/// One console shared by many concurrently writing tasks.
///
/// Each task writes through its own [`TaskConsole`]. Lines are labelled with
/// the writing task's header, and when a task's partial line is cut off by
/// another task the line is closed and later resumed under a fresh header
/// with a `(...)` marker.
///
/// ```
/// use taskline::{Console, TaskId};
/// use termcolor::NoColor;
///
/// # use std::io::{self, Write};
/// # use std::sync::{Arc, Mutex};
/// # #[derive(Clone, Default)]
/// # struct Capture(Arc<Mutex<Vec<u8>>>);
/// # impl Write for Capture {
/// #     fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
/// #         self.0.lock().unwrap().write(buf)
/// #     }
/// #     fn flush(&mut self) -> io::Result<()> {
/// #         Ok(())
/// #     }
/// # }
/// let capture = Capture::default();
/// let console = Console::new(NoColor::new(capture.clone()));
///
/// let a = console.open(TaskId::from(1), "Task 1");
/// let b = console.open(TaskId::from(2), "Task 2");
/// a.write_str("a")?;
/// b.write_str("b")?;
/// a.write_str("c")?;
///
/// let output = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
/// assert_eq!(output, "[Task 1]: a\n[Task 2]: b\n[Task 1]: (...) c");
/// # Ok::<(), io::Error>(())
/// ```
#[derive(Clone)]
pub struct Console {
    shared: Arc<Mutex<State>>,
}

#[cfg(test)]
struct _Test
where
    Console: Send + Sync,
    TaskConsole: Send + Sync;

struct State {
    stream: Box<dyn WriteColor + Send>,
    /// Whether the cursor sits at the beginning of a line.
    at_line_start: bool,
    /// Task that wrote last, if anyone has.
    last_writer: Option<TaskId>,
    elapsed: Option<Box<dyn Elapsed>>,
    header_color: Option<ColorSpec>,
}

/// Source of the elapsed-time prefix.
///
/// Returning `None` leaves the prefix off for that line, so a source that
/// cannot tell the time simply turns the feature off.
pub trait Elapsed: Send {
    /// Time to print before each header, or `None` to print nothing.
    fn elapsed(&self) -> Option<Duration>;
}

impl Elapsed for Instant {
    fn elapsed(&self) -> Option<Duration> {
        Some(Instant::elapsed(self))
    }
}

impl<F> Elapsed for F
where
    F: Fn() -> Option<Duration> + Send,
{
    fn elapsed(&self) -> Option<Duration> {
        self()
    }
}

/// Configures a [`Console`].
///
/// ```no_run
/// use std::time::Instant;
/// use taskline::{Color, Console};
///
/// let console = Console::builder()
///     .elapsed(Instant::now())
///     .header_color(Color::Cyan)
///     .stderr();
/// ```
#[derive(Default)]
pub struct Builder {
    elapsed: Option<Box<dyn Elapsed>>,
    header_color: Option<Color>,
}

impl Builder {
    /// Prefixes every header with the time reported by `source`.
    pub fn elapsed(mut self, source: impl Elapsed + 'static) -> Self {
        self.elapsed = Some(Box::new(source));
        self
    }

    /// Renders headers in `color`.
    pub fn header_color(mut self, color: Color) -> Self {
        self.header_color = Some(color);
        self
    }

    /// Builds a console on stdout, colored when stdout is a terminal.
    pub fn stdout(self) -> Console {
        self.build(StandardStream::stdout(Auto))
    }

    /// Builds a console on stderr, colored when stderr is a terminal.
    pub fn stderr(self) -> Console {
        self.build(StandardStream::stderr(Auto))
    }

    /// Builds a console writing to `stream`.
    pub fn build(self, stream: impl WriteColor + Send + 'static) -> Console {
        let header_color = self.header_color.map(|color| {
            let mut spec = ColorSpec::new();
            spec.set_fg(Some(color));
            spec
        });
        trace!(
            elapsed = self.elapsed.is_some(),
            color = stream.supports_color(),
            "console created"
        );
        Console {
            shared: Arc::new(Mutex::new(State {
                stream: Box::new(stream),
                at_line_start: true,
                last_writer: None,
                elapsed: self.elapsed,
                header_color,
            })),
        }
    }
}

impl Console {
    /// Starts configuring a console.
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Console on `stream` with no elapsed prefix and uncolored headers.
    pub fn new(stream: impl WriteColor + Send + 'static) -> Self {
        Builder::default().build(stream)
    }

    /// Makes a console whose output goes to stdout.
    pub fn stdout() -> Self {
        Builder::default().stdout()
    }

    /// Makes a console whose output goes to stderr.
    pub fn stderr() -> Self {
        Builder::default().stderr()
    }

    /// Opens a writer for `task`, labelled with its full name.
    pub fn task(&self, task: &Task) -> TaskConsole {
        self.open(task.id, &task.full_name())
    }

    /// Opens a writer for the task `id` with the given header text.
    ///
    /// Writers for the same id opened separately do not share the record of
    /// whether their line was interrupted; keep one writer per task.
    pub fn open(&self, id: TaskId, header: &str) -> TaskConsole {
        TaskConsole::new(id, header, self.shared.clone())
    }

    /// Writer for output that belongs to no task: no header, line tracking
    /// only.
    pub fn placeholder(&self) -> TaskConsole {
        self.open(TaskId::PLACEHOLDER, "")
    }

    /// Whether the console cursor is at the beginning of a line.
    pub fn at_line_start(&self) -> bool {
        self.shared.lock().at_line_start
    }
}

impl Debug for Console {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        let state = self.shared.lock();
        formatter
            .debug_struct("Console")
            .field("at_line_start", &state.at_line_start)
            .field("last_writer", &state.last_writer)
            .finish_non_exhaustive()
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    let millis = elapsed.as_millis();
    format!(
        "{:02}:{:02}:{:02}.{:03} ",
        millis / 3_600_000,
        millis / 60_000 % 60,
        millis / 1000 % 60,
        millis % 1000,
    )
}
