//! Output channels and the sinks they drain into.

use crate::item::{Item, Stream};
use crate::sync::Mutex;
use std::collections::VecDeque;
use std::fmt::{self, Debug};
use std::io;
use std::sync::Arc;

/// Destination for items, such as a console or another set of channels.
pub trait Sink: Send + Sync {
    /// Accepts one item.
    fn write(&self, item: Item) -> io::Result<()>;
}

impl<S: Sink + ?Sized> Sink for Arc<S> {
    fn write(&self, item: Item) -> io::Result<()> {
        (**self).write(item)
    }
}

type Listener = Arc<dyn Fn(&Channel) + Send + Sync>;

/// Handle returned by [`Channel::subscribe`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Subscription(u64);

/// Append-only queue of items that notifies listeners after each append.
///
/// Listeners run on the appending thread, after the channel lock has been
/// released, and receive the channel so they can drain it.
#[derive(Clone)]
pub struct Channel {
    stream: Stream,
    queue: Arc<Mutex<Queue>>,
}

struct Queue {
    items: VecDeque<Item>,
    listeners: Vec<(Subscription, Listener)>,
    next_subscription: u64,
}

impl Channel {
    /// Empty channel for `stream` with no listeners.
    pub fn new(stream: Stream) -> Self {
        Channel {
            stream,
            queue: Arc::new(Mutex::new(Queue {
                items: VecDeque::new(),
                listeners: Vec::new(),
                next_subscription: 0,
            })),
        }
    }

    /// Channel this queue carries.
    pub fn stream(&self) -> Stream {
        self.stream
    }

    /// Queues `item`, then runs every listener.
    pub fn append(&self, item: Item) {
        debug_assert_eq!(item.stream(), self.stream);
        let listeners: Vec<Listener> = {
            let mut queue = self.queue.lock();
            queue.items.push_back(item);
            queue
                .listeners
                .iter()
                .map(|(_, listener)| listener.clone())
                .collect()
        };
        for listener in listeners {
            listener(self);
        }
    }

    /// Runs `listener` after every append until unsubscribed.
    pub fn subscribe(&self, listener: impl Fn(&Channel) + Send + Sync + 'static) -> Subscription {
        let mut queue = self.queue.lock();
        let subscription = Subscription(queue.next_subscription);
        queue.next_subscription += 1;
        queue.listeners.push((subscription, Arc::new(listener)));
        subscription
    }

    /// Stops notifying `subscription`. Returns whether it was still active.
    ///
    /// The listener is dropped after the channel lock is released.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let removed = {
            let mut queue = self.queue.lock();
            let index = queue.listeners.iter().position(|(id, _)| *id == subscription);
            index.map(|index| queue.listeners.remove(index))
        };
        removed.is_some()
    }

    /// Takes the oldest queued item.
    pub fn pop(&self) -> Option<Item> {
        self.queue.lock().items.pop_front()
    }

    /// Takes every queued item, oldest first.
    pub fn drain(&self) -> Vec<Item> {
        self.queue.lock().items.drain(..).collect()
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.queue.lock().items.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Debug for Channel {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter
            .debug_struct("Channel")
            .field("stream", &self.stream)
            .field("len", &self.len())
            .finish()
    }
}

/// The fixed set of seven named channels.
///
/// Writing an item to `Streams` appends it to the matching channel. Clones
/// share the same channels, so one clone can be filled on one thread and
/// drained on another.
#[derive(Clone, Debug)]
pub struct Streams {
    channels: [Channel; 7],
}

impl Streams {
    /// Seven empty channels.
    pub fn new() -> Self {
        Streams {
            channels: Stream::ALL.map(Channel::new),
        }
    }

    /// The channel for `stream`.
    pub fn channel(&self, stream: Stream) -> &Channel {
        &self.channels[stream.index()]
    }

    /// Channels in [`Stream::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    /// Number of items queued across all channels.
    pub fn len(&self) -> usize {
        self.channels.iter().map(Channel::len).sum()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Moves every queued item into `sink`, channel by channel.
    ///
    /// Called from a thread other than the producer's, this is a boundary:
    /// whatever was ambient on the producer side is not ambient here.
    pub fn flush_to(&self, sink: &dyn Sink) -> io::Result<()> {
        for channel in &self.channels {
            while let Some(item) = channel.pop() {
                sink.write(item)?;
            }
        }
        Ok(())
    }
}

impl Default for Streams {
    fn default() -> Self {
        Streams::new()
    }
}

impl Sink for Streams {
    fn write(&self, item: Item) -> io::Result<()> {
        self.channel(item.stream()).append(item);
        Ok(())
    }
}

#[cfg(test)]
struct _Test
where
    Streams: Send + Sync,
    Channel: Send + Sync;
