//! Relays items from a set of channels into a sink, transforming each one on
//! the way.

use crate::codec;
use crate::error::Error;
use crate::item::Item;
use crate::scope;
use crate::stream::{Channel, Sink, Streams, Subscription};
use crate::task::Task;
use std::io;
use std::sync::Arc;
use tracing::warn;

/// Per-item transform applied by a [`Redirector`].
///
/// The default forwards the item unchanged.
pub trait Relay: Send + Sync {
    /// Writes `item`, or whatever it becomes, to `target`.
    fn relay(&self, target: &dyn Sink, item: Item) -> io::Result<()> {
        target.write(item)
    }
}

/// Forwards items untouched.
#[derive(Copy, Clone, Debug, Default)]
pub struct Passthrough;

impl Relay for Passthrough {}

/// Tags every item with the task ambient on the appending thread before
/// forwarding it.
///
/// Items appended where no task is ambient are tagged with the fallback
/// task, if there is one, and otherwise forwarded untagged.
#[derive(Debug, Default)]
pub struct Inject {
    fallback: Option<Task>,
}

impl Inject {
    /// Tags with `task` whenever the appending thread has no ambient task.
    /// Holds a retain of `task` until dropped.
    pub fn with_fallback(task: &Task) -> Self {
        task.retain();
        Inject {
            fallback: Some(task.clone()),
        }
    }
}

impl Relay for Inject {
    fn relay(&self, target: &dyn Sink, item: Item) -> io::Result<()> {
        let item = match (scope::current(), &self.fallback) {
            (Some(task), _) => codec::encode_for(item, &task),
            (None, Some(fallback)) => codec::encode_for(item, fallback),
            (None, None) => item,
        };
        target.write(item)
    }
}

impl Drop for Inject {
    fn drop(&mut self) {
        if let Some(task) = &self.fallback {
            task.release();
        }
    }
}

/// Strips the tag from every item and forwards it with the tagged task
/// ambient for the duration of that one write.
///
/// # Panics
///
/// If the target sink returns with a scope of its own still open, ending
/// the tagged task's scope is out of order and panics like any other
/// misordered [`Scope`](crate::Scope) drop.
#[derive(Copy, Clone, Debug, Default)]
pub struct Extract;

impl Relay for Extract {
    fn relay(&self, target: &dyn Sink, item: Item) -> io::Result<()> {
        let (item, scope) = codec::decode(item);
        let result = target.write(item);
        drop(scope);
        result
    }
}

/// Taps every channel of a [`Streams`] and relays each appended item to a
/// target sink.
///
/// Relaying happens on whichever thread appended the item. The redirector
/// stops listening when dropped.
///
/// ```
/// use std::sync::Arc;
/// use taskline::{scope, Item, Redirector, Sink, Stream, Streams};
///
/// let producer = Streams::new();
/// let transport = Streams::new();
///
/// let worker = scope::begin("worker");
/// let tap = Redirector::injecting(&producer, Arc::new(transport.clone())).unwrap();
/// producer.write(Item::Verbose("starting".into())).unwrap();
/// drop(tap);
/// drop(worker);
///
/// let item = transport.channel(Stream::Verbose).pop().unwrap();
/// assert!(taskline::codec::is_tagged(&item));
/// ```
pub struct Redirector {
    taps: Vec<(Channel, Subscription)>,
}

impl Redirector {
    /// Taps every channel of `source`, passing each appended item through
    /// `relay` into `target`.
    pub fn new(source: &Streams, target: Arc<dyn Sink>, relay: impl Relay + 'static) -> Self {
        let relay: Arc<dyn Relay> = Arc::new(relay);
        let taps = source
            .iter()
            .map(|channel| {
                let relay = relay.clone();
                let target = target.clone();
                let subscription = channel.subscribe(move |channel| {
                    while let Some(item) = channel.pop() {
                        let stream = item.stream();
                        if let Err(err) = relay.relay(&*target, item) {
                            warn!(stream = stream.name(), error = %err, "failed to relay item");
                        }
                    }
                });
                (channel.clone(), subscription)
            })
            .collect();
        Redirector { taps }
    }

    /// Forwards items unchanged.
    pub fn passthrough(source: &Streams, target: Arc<dyn Sink>) -> Self {
        Redirector::new(source, target, Passthrough)
    }

    /// Tags items with the task ambient on the appending thread.
    ///
    /// The task ambient here, at construction, is kept as the fallback for
    /// items appended from threads with no ambient task, and stays retained
    /// until the redirector is dropped. Fails with [`Error::NoAmbientTask`]
    /// when the calling thread has no ambient task.
    pub fn injecting(source: &Streams, target: Arc<dyn Sink>) -> Result<Self, Error> {
        let task = scope::current().ok_or(Error::NoAmbientTask)?;
        Ok(Redirector::new(source, target, Inject::with_fallback(&task)))
    }

    /// Strips tags and writes each item with its tagged task ambient.
    pub fn extracting(source: &Streams, target: Arc<dyn Sink>) -> Self {
        Redirector::new(source, target, Extract)
    }
}

impl Drop for Redirector {
    fn drop(&mut self) {
        for (channel, subscription) in &self.taps {
            channel.unsubscribe(*subscription);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{Object, Stream};
    use crate::task::TaskId;
    use std::sync::Mutex;
    use std::thread;

    /// Records each item together with the task ambient while it was written.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(String, Option<TaskId>)>>,
    }

    impl Sink for Recorder {
        fn write(&self, item: Item) -> io::Result<()> {
            let text = match &item {
                Item::Output(object) => object.to_string(),
                Item::Error(record) => record.to_string(),
                Item::Warning(text) | Item::Verbose(text) | Item::Debug(text) => text.clone(),
                Item::Information(record) => record.to_string(),
                Item::Progress(record) => record.to_string(),
            };
            let current = scope::current().map(|task| task.id);
            self.seen.lock().unwrap().push((text, current));
            Ok(())
        }
    }

    struct Failing;

    impl Sink for Failing {
        fn write(&self, _item: Item) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    #[test]
    fn passthrough_forwards_as_is() {
        let source = Streams::new();
        let target = Arc::new(Streams::new());
        let _tap = Redirector::passthrough(&source, target.clone());

        source.write(Item::Debug("d".into())).unwrap();
        source.write(Item::output(1)).unwrap();
        assert!(source.is_empty());
        assert_eq!(target.len(), 2);
    }

    #[test]
    fn injecting_requires_an_ambient_task() {
        let source = Streams::new();
        let target = Arc::new(Streams::new());
        let err = Redirector::injecting(&source, target).err().unwrap();
        assert!(matches!(err, Error::NoAmbientTask));
    }

    #[test]
    fn dropped_redirector_stops_relaying() {
        let source = Streams::new();
        let target = Arc::new(Streams::new());
        let tap = Redirector::passthrough(&source, target.clone());
        drop(tap);

        source.write(Item::Warning("w".into())).unwrap();
        assert_eq!(source.len(), 1);
        assert!(target.is_empty());
    }

    #[test]
    fn sink_failures_do_not_reach_the_producer() {
        let source = Streams::new();
        let _tap = Redirector::passthrough(&source, Arc::new(Failing));
        source.write(Item::Warning("lost".into())).unwrap();
        assert!(source.is_empty());
    }

    #[test]
    fn identity_crosses_a_thread_boundary() {
        let producer = Streams::new();
        let transport = Streams::new();
        let recorder = Arc::new(Recorder::default());
        let consumer = Streams::new();
        let _extract = Redirector::extracting(&consumer, recorder.clone());

        let worker = scope::begin("worker");
        let id = worker.task().id;
        {
            let _inject = Redirector::injecting(&producer, Arc::new(transport.clone())).unwrap();
            producer.write(Item::Warning("careful".into())).unwrap();
            producer.write(Item::Output(Object::new("result"))).unwrap();
        }
        drop(worker);
        assert!(Task::get(id).is_some());

        let handle = {
            let transport = transport.clone();
            let consumer = consumer.clone();
            thread::spawn(move || {
                assert!(scope::current().is_none());
                transport.flush_to(&consumer).unwrap();
                scope::current().map(|task| task.id)
            })
        };
        assert_eq!(handle.join().unwrap(), None);

        let seen = recorder.seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                ("result".to_owned(), Some(id)),
                ("careful".to_owned(), Some(id)),
            ],
        );
        assert!(Task::get(id).is_none());
    }

    #[test]
    fn untagged_items_extract_without_ambient_task() {
        let consumer = Streams::new();
        let recorder = Arc::new(Recorder::default());
        let _extract = Redirector::extracting(&consumer, recorder.clone());

        consumer.write(Item::Verbose("bare".into())).unwrap();
        assert_eq!(*recorder.seen.lock().unwrap(), vec![("bare".to_owned(), None)]);
    }

    #[test]
    fn chained_injectors_tag_once() {
        let first = Streams::new();
        let second = Streams::new();
        let last = Arc::new(Streams::new());

        let outer = scope::begin("outer");
        let _a = Redirector::injecting(&first, Arc::new(second.clone())).unwrap();
        let _b = Redirector::injecting(&second, last.clone()).unwrap();
        let before = outer.task().retain_count();
        first.write(Item::Debug("once".into())).unwrap();
        assert_eq!(outer.task().retain_count(), before + 1);

        match last.channel(Stream::Debug).pop() {
            Some(Item::Debug(text)) => {
                assert_eq!(text, codec::tag_text("once", outer.task().id));
            }
            other => panic!("unexpected item: {:?}", other),
        }
    }

    #[test]
    fn other_threads_tag_with_the_constructing_task() {
        let producer = Streams::new();
        let transport = Arc::new(Streams::new());

        let owner = scope::begin("owner");
        let task = owner.task().clone();
        let tap = Redirector::injecting(&producer, transport.clone()).unwrap();
        drop(owner);
        assert!(Task::get(task.id).is_some());

        let guest = Task::create("guest");
        thread::scope(|scope| {
            scope.spawn(|| {
                assert!(scope::current().is_none());
                producer.write(Item::Warning("bare".into())).unwrap();
            });
            scope.spawn(|| {
                let _scope = guest.enter();
                producer.write(Item::Verbose("scoped".into())).unwrap();
            });
        });
        drop(tap);

        match transport.channel(Stream::Warning).pop() {
            Some(Item::Warning(text)) => assert_eq!(text, codec::tag_text("bare", task.id)),
            other => panic!("unexpected item: {:?}", other),
        }
        match transport.channel(Stream::Verbose).pop() {
            Some(Item::Verbose(text)) => assert_eq!(text, codec::tag_text("scoped", guest.id)),
            other => panic!("unexpected item: {:?}", other),
        }
        assert_eq!(task.retain_count(), 1);
        assert_eq!(guest.retain_count(), 2);
    }

    #[test]
    #[should_panic(expected = "disposed out of order")]
    fn sink_leaving_a_scope_open_panics() {
        struct Leaky;

        impl Sink for Leaky {
            fn write(&self, _item: Item) -> io::Result<()> {
                std::mem::forget(scope::begin("left open"));
                Ok(())
            }
        }

        let consumer = Streams::new();
        let _extract = Redirector::extracting(&consumer, Arc::new(Leaky));
        let worker = Task::create("worker");
        consumer
            .write(codec::encode_for(Item::Debug("d".into()), &worker))
            .unwrap();
    }
}
