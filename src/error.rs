//! Error type shared by the registry, scopes and redirectors.

use crate::task::TaskId;
use std::io;
use thiserror::Error;

/// Errors reported synchronously to the caller.
///
/// Malformed or unresolvable tags are never errors; the codec treats them as
/// ordinary text.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    /// A scope was disposed while a scope nested inside it was still live.
    ///
    /// Nothing is unwound when this is returned; the ambient task stays what
    /// it was.
    #[error("scope for task {scope} disposed out of order; ambient task is {current:?}")]
    ScopeOrder {
        /// Task of the scope whose disposal was attempted.
        scope: TaskId,
        /// Task that is actually ambient on this thread.
        current: Option<TaskId>,
    },

    /// An injecting redirector was built on a thread with no ambient task.
    #[error("no ambient task to inject")]
    NoAmbientTask,

    /// The underlying sink failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Returns a short stable label (snake_case) for use in log fields.
    ///
    /// ```
    /// use taskline::Error;
    ///
    /// assert_eq!(Error::NoAmbientTask.as_label(), "no_ambient_task");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            Error::ScopeOrder { .. } => "scope_order",
            Error::NoAmbientTask => "no_ambient_task",
            Error::Io(_) => "io",
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(err) => err,
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_order_message_names_both_tasks() {
        let err = Error::ScopeOrder {
            scope: TaskId::from(4),
            current: Some(TaskId::from(7)),
        };
        assert_eq!(
            err.to_string(),
            "scope for task 4 disposed out of order; ambient task is Some(TaskId(7))",
        );
        assert_eq!(err.as_label(), "scope_order");
    }

    #[test]
    fn io_errors_convert() {
        let err = Error::from(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        assert_eq!(err.as_label(), "io");
        assert_eq!(err.to_string(), "gone");
    }
}
