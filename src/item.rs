//! Items carried by the seven output channels.

use crate::task::Task;
use std::any::Any;
use std::fmt::{self, Debug, Display};

/// Names one of the fixed output channels.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Stream {
    Output,
    Error,
    Warning,
    Verbose,
    Debug,
    Information,
    Progress,
}

impl Stream {
    /// Every channel, in relay order.
    pub const ALL: [Stream; 7] = [
        Stream::Output,
        Stream::Error,
        Stream::Warning,
        Stream::Verbose,
        Stream::Debug,
        Stream::Information,
        Stream::Progress,
    ];

    /// Lowercase channel name, as used in log fields.
    pub fn name(self) -> &'static str {
        match self {
            Stream::Output => "output",
            Stream::Error => "error",
            Stream::Warning => "warning",
            Stream::Verbose => "verbose",
            Stream::Debug => "debug",
            Stream::Information => "information",
            Stream::Progress => "progress",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl Display for Stream {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str(self.name())
    }
}

/// One unit of output, tagged with the channel it belongs to.
#[derive(Debug)]
pub enum Item {
    Output(Object),
    Error(ErrorRecord),
    Warning(String),
    Verbose(String),
    Debug(String),
    Information(InformationRecord),
    Progress(ProgressRecord),
}

impl Item {
    /// Channel this item belongs on.
    pub fn stream(&self) -> Stream {
        match self {
            Item::Output(_) => Stream::Output,
            Item::Error(_) => Stream::Error,
            Item::Warning(_) => Stream::Warning,
            Item::Verbose(_) => Stream::Verbose,
            Item::Debug(_) => Stream::Debug,
            Item::Information(_) => Stream::Information,
            Item::Progress(_) => Stream::Progress,
        }
    }

    /// Shorthand for an output item holding `value`.
    pub fn output<T: Payload>(value: T) -> Item {
        Item::Output(Object::new(value))
    }
}

/// Anything that can travel on the output channel.
pub trait Payload: Display + Send + 'static {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Display + Send + 'static> Payload for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Value on the output channel, optionally carrying the task that produced it.
///
/// A carrier owns one retain of its task. If it is dropped before the task is
/// taken back out, that retain is released.
pub struct Object {
    value: Box<dyn Payload>,
    carrier: Option<Carrier>,
}

struct Carrier(Option<Task>);

impl Drop for Carrier {
    fn drop(&mut self) {
        if let Some(task) = self.0.take() {
            task.release();
        }
    }
}

impl Object {
    /// Untagged object holding `value`.
    pub fn new<T: Payload>(value: T) -> Object {
        Object {
            value: Box::new(value),
            carrier: None,
        }
    }

    /// The payload, if it is a `T`.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        (*self.value).as_any().downcast_ref()
    }

    /// Whether this object is wrapped together with a task.
    pub fn is_tagged(&self) -> bool {
        self.carrier.is_some()
    }

    /// Task carried along with this object, if any.
    pub fn task(&self) -> Option<&Task> {
        self.carrier.as_ref().and_then(|carrier| carrier.0.as_ref())
    }

    /// The caller hands over one retain of `task`.
    pub(crate) fn wrap(mut self, task: Task) -> Object {
        self.carrier = Some(Carrier(Some(task)));
        self
    }

    /// Splits off the carried task together with the retain the carrier held.
    pub(crate) fn unwrap(mut self) -> (Object, Option<Task>) {
        let task = self.carrier.take().and_then(|mut carrier| carrier.0.take());
        (self, task)
    }
}

impl Display for Object {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&*self.value, formatter)
    }
}

impl Debug for Object {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter
            .debug_struct("Object")
            .field("value", &format_args!("{}", self.value))
            .field("task", &self.task().map(|task| task.id))
            .finish()
    }
}

/// Record on the error channel.
///
/// `details`, when present, replaces `message` for display. It is also the
/// field that carries a task tag across a boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorRecord {
    /// Text shown when there are no details.
    pub message: String,
    /// Text shown in place of `message`.
    pub details: Option<String>,
    // Set while `details` holds a tagged copy of `message` that decoding
    // must turn back into `None`.
    pub(crate) details_from_message: bool,
}

impl ErrorRecord {
    /// Record with no details.
    pub fn new(message: impl Into<String>) -> Self {
        ErrorRecord {
            message: message.into(),
            details: None,
            details_from_message: false,
        }
    }

    /// Sets the text displayed in place of `message`.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self.details_from_message = false;
        self
    }
}

impl Display for ErrorRecord {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str(self.details.as_deref().unwrap_or(&self.message))
    }
}

/// Record on the information channel. The tag travels in `source`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InformationRecord {
    /// The message itself.
    pub data: String,
    /// Where the message came from.
    pub source: String,
    /// Free-form labels.
    pub tags: Vec<String>,
}

impl InformationRecord {
    /// Record with no tags.
    pub fn new(data: impl Into<String>, source: impl Into<String>) -> Self {
        InformationRecord {
            data: data.into(),
            source: source.into(),
            tags: Vec::new(),
        }
    }
}

impl Display for InformationRecord {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str(&self.data)
    }
}

/// Record on the progress channel. The tag travels in `activity`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgressRecord {
    /// What is being done.
    pub activity: String,
    /// How far along it is, in words.
    pub status: String,
    /// Completion, 0 to 100.
    pub percent: Option<u8>,
}

impl ProgressRecord {
    /// Record with no completion percentage.
    pub fn new(activity: impl Into<String>, status: impl Into<String>) -> Self {
        ProgressRecord {
            activity: activity.into(),
            status: status.into(),
            percent: None,
        }
    }

    /// Sets the completion percentage, capped at 100.
    pub fn with_percent(mut self, percent: u8) -> Self {
        self.percent = Some(percent.min(100));
        self
    }
}

impl Display for ProgressRecord {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "{}: {}", self.activity, self.status)?;
        if let Some(percent) = self.percent {
            write!(formatter, " ({}%)", percent)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_know_their_stream() {
        assert_eq!(Item::output(5).stream(), Stream::Output);
        assert_eq!(Item::Warning("w".into()).stream(), Stream::Warning);
        assert_eq!(
            Item::Progress(ProgressRecord::new("a", "b")).stream(),
            Stream::Progress,
        );
        for (index, stream) in Stream::ALL.iter().enumerate() {
            assert_eq!(stream.index(), index);
        }
    }

    #[test]
    fn objects_downcast_to_their_payload() {
        let object = Object::new(String::from("hello"));
        assert_eq!(object.downcast_ref::<String>().map(String::as_str), Some("hello"));
        assert!(object.downcast_ref::<u32>().is_none());
        assert_eq!(object.to_string(), "hello");
        assert!(!object.is_tagged());
    }

    #[test]
    fn dropping_a_carrier_releases_its_task() {
        let task = Task::create("carried");
        task.retain();
        let object = Object::new(1u8).wrap(task.clone());
        assert_eq!(object.task(), Some(&task));
        assert_eq!(task.retain_count(), 2);

        drop(object);
        assert_eq!(task.retain_count(), 1);
        task.release();
    }

    #[test]
    fn unwrapping_hands_the_retain_to_the_caller() {
        let task = Task::create("carried");
        task.retain();
        let (object, carried) = Object::new(1u8).wrap(task.clone()).unwrap();
        assert!(!object.is_tagged());
        assert_eq!(carried, Some(task.clone()));
        drop(object);
        assert_eq!(task.retain_count(), 2);
        task.release();
        task.release();
    }

    #[test]
    fn records_display_their_visible_text() {
        assert_eq!(ErrorRecord::new("boom").to_string(), "boom");
        assert_eq!(
            ErrorRecord::new("boom").with_details("disk full").to_string(),
            "disk full",
        );
        assert_eq!(
            ProgressRecord::new("copy", "halfway").with_percent(50).to_string(),
            "copy: halfway (50%)",
        );
        assert_eq!(InformationRecord::new("hi", "me").to_string(), "hi");
    }
}
