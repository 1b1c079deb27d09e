//! A [`Sink`] that prints items on a [`Console`], labelled by the ambient task.

use crate::console::{Console, TaskConsole};
use crate::item::Item;
use crate::scope;
use crate::stream::Sink;
use crate::sync::Mutex;
use crate::task::{Task, TaskId};
use std::collections::HashMap;
use std::io;
use termcolor::Color;

/// Prints every item it receives on a console, under the header of whichever
/// task is ambient at the time of the write.
///
/// Put it behind an extracting [`Redirector`](crate::Redirector) so items
/// arriving from other threads are labelled with the task that produced them.
pub struct ConsoleSink {
    console: Console,
    placeholder: TaskConsole,
    writers: Mutex<HashMap<TaskId, Writer>>,
}

struct Writer {
    task: Task,
    out: TaskConsole,
}

impl ConsoleSink {
    /// Prints items through `console`.
    pub fn new(console: Console) -> Self {
        ConsoleSink {
            placeholder: console.placeholder(),
            console,
            writers: Mutex::new(HashMap::new()),
        }
    }

    /// The console this sink prints to.
    pub fn console(&self) -> &Console {
        &self.console
    }

    /// Writer for `task`, kept across calls so interrupted lines resume with
    /// a continuation marker. The header follows the task's current full
    /// name.
    pub fn writer(&self, task: &Task) -> TaskConsole {
        if task.id.is_placeholder() {
            return self.placeholder.clone();
        }

        let header = task.full_name();
        let mut writers = self.writers.lock();
        if let Some(writer) = writers.get(&task.id) {
            writer.out.set_header(&header);
            return writer.out.clone();
        }

        // Forget writers of finished tasks, unless their line is still open
        // and may yet be resumed.
        writers.retain(|_, writer| writer.task.is_registered() || writer.out.is_mid_line());

        let out = self.console.open(task.id, &header);
        writers.insert(
            task.id,
            Writer {
                task: task.clone(),
                out: out.clone(),
            },
        );
        out
    }
}

impl Sink for ConsoleSink {
    fn write(&self, item: Item) -> io::Result<()> {
        let task = scope::current().unwrap_or_else(Task::placeholder);
        let out = self.writer(&task);
        match item {
            Item::Output(object) => out.write_line(&object.to_string()),
            Item::Error(record) => out.write_colored(Color::Red, &format!("{}\n", record)),
            Item::Warning(message) => {
                out.write_colored(Color::Yellow, &format!("WARNING: {}\n", message))
            }
            Item::Verbose(message) => {
                out.write_colored(Color::Cyan, &format!("VERBOSE: {}\n", message))
            }
            Item::Debug(message) => {
                out.write_colored(Color::Magenta, &format!("DEBUG: {}\n", message))
            }
            Item::Information(record) => out.write_line(&record.data),
            Item::Progress(record) => out.write_line(&record.to_string()),
        }
    }
}
