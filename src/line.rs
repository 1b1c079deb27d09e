use super::{format_elapsed, State};
use crate::sync::Mutex;
use crate::task::{format_header, TaskId};
use std::fmt::{self, Debug};
use std::io::{Result, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use termcolor::{Color, ColorSpec, WriteColor};

const LINE_BREAK: &[u8] = b"\n";
const CONTINUATION: &[u8] = b"(...) ";

/// One task's view of a shared [`Console`](super::Console).
///
/// Use the standard library `write!` or `writeln!` macros for writing the
/// output of a task. Each call is formatted in full before the console is
/// locked, so one call never interleaves with another task's output.
///
/// ```
/// use taskline::{Color::Blue, Console, Task};
///
/// fn work(console: &Console, task: &Task) {
///     let out = console.task(task);
///     out.color(Blue);
///     writeln!(out, "hello from task #{}", task.id);
///     out.reset_color();
/// }
/// ```
#[readonly::make]
#[derive(Clone)]
pub struct TaskConsole {
    handle: Arc<Handle>,

    /// Task this writer labels its lines with.
    ///
    /// This field is read-only; writing to its value will not compile.
    #[readonly]
    pub id: TaskId,
}

struct Handle {
    shared: Arc<Mutex<State>>,
    header: Mutex<Header>,
    /// This task's last write left its line open. If that is still true when
    /// the task next starts a line, someone else closed it.
    mid_line: AtomicBool,
}

struct Header {
    text: String,
    rendered: Option<String>,
}

impl Debug for TaskConsole {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter
            .debug_tuple("TaskConsole")
            .field(&self.id.get())
            .field(&self.header())
            .finish()
    }
}

impl TaskConsole {
    pub(super) fn new(id: TaskId, header: &str, shared: Arc<Mutex<State>>) -> Self {
        TaskConsole {
            handle: Arc::new(Handle {
                shared,
                header: Mutex::new(Header {
                    text: header.to_owned(),
                    rendered: None,
                }),
                mid_line: AtomicBool::new(false),
            }),
            id,
        }
    }

    /// Current header text, without the `[...]: ` decoration.
    pub fn header(&self) -> String {
        self.handle.header.lock().text.clone()
    }

    /// Replaces the header text. Takes effect from the next line this task
    /// starts.
    pub fn set_header(&self, text: &str) {
        let mut header = self.handle.header.lock();
        if header.text != text {
            header.text = text.to_owned();
            header.rendered = None;
        }
    }

    /// Whether this task's last write left a line unfinished.
    pub fn is_mid_line(&self) -> bool {
        self.handle.mid_line.load(Ordering::Relaxed)
    }

    /// Writes `text` as this task.
    pub fn write_str(&self, text: &str) -> Result<()> {
        self.emit(text.as_bytes(), None)
    }

    /// Writes `text` followed by a line break.
    pub fn write_line(&self, text: &str) -> Result<()> {
        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');
        self.emit(line.as_bytes(), None)
    }

    /// Writes `text` in `color`. The header and markers stay uncolored.
    pub fn write_colored(&self, color: Color, text: &str) -> Result<()> {
        let mut spec = ColorSpec::new();
        spec.set_fg(Some(color));
        self.emit(text.as_bytes(), Some(&spec))
    }

    /// Set output to appear in bold uncolored.
    pub fn bold(&self) {
        let mut spec = ColorSpec::new();
        spec.set_bold(true);
        let _ = self.apply(|w| w.set_color(&spec));
    }

    /// Set output to appear in color (not bold).
    pub fn color(&self, color: Color) {
        let mut spec = ColorSpec::new();
        spec.set_fg(Some(color));
        let _ = self.apply(|w| w.set_color(&spec));
    }

    /// Set output to appear bold and colored.
    pub fn bold_color(&self, color: Color) {
        let mut spec = ColorSpec::new();
        spec.set_bold(true);
        spec.set_fg(Some(color));
        let _ = self.apply(|w| w.set_color(&spec));
    }

    /// Set output to non-bold uncolored.
    pub fn reset_color(&self) {
        let _ = self.apply(|w| w.reset());
    }

    #[doc(hidden)]
    pub fn write_fmt(&self, args: fmt::Arguments) {
        let _ = self.emit(args.to_string().as_bytes(), None);
    }

    /// Runs a non-text operation on the console stream, serialized with
    /// every task's writes.
    fn apply<T>(&self, f: impl FnOnce(&mut dyn WriteColor) -> T) -> T {
        let state = &mut *self.handle.shared.lock();
        f(&mut *state.stream)
    }

    fn emit(&self, text: &[u8], color: Option<&ColorSpec>) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }

        let state = &mut *self.handle.shared.lock();
        if !state.at_line_start {
            if state.last_writer == Some(self.id) {
                return self.finish(state, text, color);
            }
            state.stream.write_all(LINE_BREAK)?;
            state.at_line_start = true;
        }

        self.prefix(state)?;
        self.finish(state, text, color)
    }

    /// Elapsed time, header, and the continuation marker if this task's
    /// previous line was cut off.
    fn prefix(&self, state: &mut State) -> Result<()> {
        if let Some(elapsed) = state.elapsed.as_ref().and_then(|source| source.elapsed()) {
            state.stream.write_all(format_elapsed(elapsed).as_bytes())?;
        }

        let header = self.rendered_header();
        if !header.is_empty() {
            match &state.header_color {
                Some(spec) => {
                    state.stream.set_color(spec)?;
                    state.stream.write_all(header.as_bytes())?;
                    state.stream.reset()?;
                }
                None => state.stream.write_all(header.as_bytes())?,
            }
        }

        if self.is_mid_line() {
            state.stream.write_all(CONTINUATION)?;
        }
        Ok(())
    }

    fn finish(&self, state: &mut State, text: &[u8], color: Option<&ColorSpec>) -> Result<()> {
        match color {
            Some(spec) => {
                state.stream.set_color(spec)?;
                let written = state.stream.write_all(text);
                state.stream.reset()?;
                written?;
            }
            None => state.stream.write_all(text)?,
        }

        let ends_line = text.ends_with(LINE_BREAK);
        state.at_line_start = ends_line;
        state.last_writer = Some(self.id);
        self.handle.mid_line.store(!ends_line, Ordering::Relaxed);
        Ok(())
    }

    fn rendered_header(&self) -> String {
        let header = &mut *self.handle.header.lock();
        header
            .rendered
            .get_or_insert_with(|| format_header(&header.text))
            .clone()
    }
}

impl Write for TaskConsole {
    fn write(&mut self, b: &[u8]) -> Result<usize> {
        self.emit(b, None)?;
        Ok(b.len())
    }

    fn flush(&mut self) -> Result<()> {
        self.apply(|w| w.flush())
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.emit(buf, None)
    }

    fn write_fmt(&mut self, args: fmt::Arguments) -> Result<()> {
        self.emit(args.to_string().as_bytes(), None)
    }
}

impl WriteColor for TaskConsole {
    fn supports_color(&self) -> bool {
        self.apply(|w| w.supports_color())
    }

    fn set_color(&mut self, spec: &ColorSpec) -> Result<()> {
        self.apply(|w| w.set_color(spec))
    }

    fn reset(&mut self) -> Result<()> {
        self.apply(|w| w.reset())
    }
}

#[cfg(test)]
mod tests {
    use super::super::Console;
    use super::*;
    use termcolor::Buffer;

    #[derive(Clone)]
    struct Shared(Arc<std::sync::Mutex<Buffer>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> Result<()> {
            Ok(())
        }
    }

    impl WriteColor for Shared {
        fn supports_color(&self) -> bool {
            true
        }

        fn set_color(&mut self, spec: &ColorSpec) -> Result<()> {
            self.0.lock().unwrap().set_color(spec)
        }

        fn reset(&mut self) -> Result<()> {
            self.0.lock().unwrap().reset()
        }
    }

    fn ansi() -> (Console, Shared) {
        let shared = Shared(Arc::new(std::sync::Mutex::new(Buffer::ansi())));
        (Console::new(shared.clone()), shared)
    }

    fn text(shared: &Shared) -> String {
        String::from_utf8(shared.0.lock().unwrap().as_slice().to_vec()).unwrap()
    }

    #[test]
    fn colored_text_leaves_header_plain() {
        let (console, shared) = ansi();
        let out = console.open(TaskId::from(9), "C");
        out.write_colored(Color::Red, "bad\n").unwrap();

        let text = text(&shared);
        assert!(text.starts_with("[C]: \x1b["));
        assert!(text.contains("bad\n"));
        assert!(text.ends_with("\x1b[0m"));
        assert!(!out.is_mid_line());
    }

    #[test]
    fn header_color_is_reset_before_the_body() {
        let shared = Shared(Arc::new(std::sync::Mutex::new(Buffer::ansi())));
        let console = Console::builder()
            .header_color(Color::Green)
            .build(shared.clone());
        console.open(TaskId::from(1), "G").write_line("body").unwrap();

        let text = text(&shared);
        assert!(text.contains("[G]: \x1b[0mbody\n"));
    }

    #[test]
    fn io_write_goes_through_the_multiplexer() {
        let (console, shared) = ansi();
        let mut out = console.open(TaskId::from(5), "W");
        out.write_all(b"raw").unwrap();
        assert_eq!(out.write(b" bytes\n").unwrap(), 7);
        out.flush().unwrap();

        assert_eq!(text(&shared), "[W]: raw bytes\n");
    }

    #[test]
    fn set_header_is_idempotent() {
        let (console, _shared) = ansi();
        let out = console.open(TaskId::from(5), "same");
        out.set_header("same");
        assert_eq!(out.header(), "same");
        assert_eq!(out.rendered_header(), "[same]: ");
    }
}
