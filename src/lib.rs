//! Readable console output from many concurrent tasks, labelled with the task
//! that wrote it, even when the writing happens on a thread that has no idea
//! which task it is working for.
//!
//! # Use case
//!
//! Suppose a program runs many pieces of work at once and each of them writes
//! progress to the same terminal, sometimes half a line at a time. Written
//! naïvely, fragments from different tasks run together and nobody can tell
//! which line came from where. Labelling each line with its task solves that,
//! as long as the code doing the writing knows which task is current.
//!
//! Often it does not. Output regularly changes threads on its way to the
//! console: it is queued by a worker and printed by a collector, or handed to
//! a thread pool that has never heard of the task. Thread-local state does not
//! make that trip.
//!
//! # Pieces
//!
//!   - [`Task`] is a unit of work with a process-wide id, a name, and a
//!     manual retain count. Live tasks can be found by id with
//!     [`Task::get`].
//!
//!   - [`Scope`] makes a task the ambient task of the current thread.
//!     [`scope::begin`] starts a new task as a child of the ambient one.
//!
//!   - [`codec`] tags items with the ambient task's id so the identity travels
//!     inside the item, and recovers it on the far side.
//!
//!   - [`Redirector`] taps a set of output [`Streams`] and relays every item
//!     to a [`Sink`], tagging ([`Inject`]) or untagging ([`Extract`]) on the
//!     way.
//!
//!   - [`Console`] serializes writes from every task's [`TaskConsole`] onto
//!     one terminal, starting each task's lines with a `[name]: ` header and
//!     marking lines that were cut off by another task with `(...)` when they
//!     resume.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::thread;
//! use taskline::{scope, Console, ConsoleSink, Item, Redirector, Sink, Streams};
//!
//! let console = ConsoleSink::new(Console::stderr());
//! let collected = Streams::new();
//! let _labels = Redirector::extracting(&collected, Arc::new(console));
//!
//! let transport = Streams::new();
//! let workers: Vec<_> = (0..3)
//!     .map(|n| {
//!         let transport = transport.clone();
//!         thread::spawn(move || {
//!             let _task = scope::begin(&format!("worker {}", n));
//!             let output = Streams::new();
//!             let _tags = Redirector::injecting(&output, Arc::new(transport)).unwrap();
//!             output.write(Item::output(format!("hello from worker {}", n))).unwrap();
//!         })
//!     })
//!     .collect();
//! for worker in workers {
//!     worker.join().unwrap();
//! }
//!
//! // Printed here, on a thread that never saw the workers' tasks, but each
//! // line still reads "[worker n]: hello from worker n".
//! transport.flush_to(&collected).unwrap();
//! ```

pub mod codec;
mod console;
mod error;
mod host;
mod item;
mod redirect;
pub mod scope;
mod stream;
mod sync;
mod task;

pub use crate::console::{Builder, Console, Elapsed, TaskConsole};
pub use crate::error::Error;
pub use crate::host::ConsoleSink;
pub use crate::item::{ErrorRecord, InformationRecord, Item, Object, Payload, ProgressRecord, Stream};
pub use crate::redirect::{Extract, Inject, Passthrough, Redirector, Relay};
pub use crate::scope::Scope;
pub use crate::stream::{Channel, Sink, Streams, Subscription};
pub use crate::task::{Task, TaskId};

#[doc(no_inline)]
pub use termcolor::Color;
