//! Carries a task identity inside items so it survives boundaries that lose
//! the ambient task.
//!
//! Text is tagged by prefixing the task id bracketed by two control
//! characters:
//!
//! ```text
//! \u{2} 42 \u{3} original text        (without the spaces)
//! ```
//!
//! Output objects are wrapped in a carrier instead. Records tag one
//! designated string field: [`ErrorRecord::details`],
//! [`InformationRecord::source`] and [`ProgressRecord::activity`].
//!
//! Tagging owns one retain of the task; [`decode`] hands that retain to the
//! [`Scope`] it returns.
//!
//! ```
//! use taskline::{codec, scope, Item};
//!
//! let outer = scope::begin("worker");
//! let tagged = codec::encode(Item::Warning("low disk".into()));
//! drop(outer);
//!
//! let (item, recovered) = codec::decode(tagged);
//! assert!(matches!(&item, Item::Warning(text) if text == "low disk"));
//! assert_eq!(&*recovered.unwrap().task().name(), "worker");
//! ```
//!
//! [`ErrorRecord::details`]: crate::ErrorRecord::details
//! [`InformationRecord::source`]: crate::InformationRecord::source
//! [`ProgressRecord::activity`]: crate::ProgressRecord::activity

use crate::item::Item;
use crate::scope::{self, Scope};
use crate::task::{Task, TaskId};
use tracing::debug;

/// Opens a text tag.
pub const TAG_OPEN: char = '\u{2}';
/// Closes a text tag.
pub const TAG_CLOSE: char = '\u{3}';

/// Tags `item` with the ambient task. Without an ambient task the item is
/// returned unchanged.
pub fn encode(item: Item) -> Item {
    match scope::current() {
        Some(task) => encode_for(item, &task),
        None => item,
    }
}

/// Tags `item` with `task`, retaining it on behalf of the tagged item.
///
/// Items that already carry a tag are returned unchanged and nothing is
/// retained, so chained injecting relays never tag twice.
pub fn encode_for(item: Item, task: &Task) -> Item {
    if task.id.is_placeholder() || is_tagged(&item) {
        return item;
    }

    task.retain();
    let id = task.id;
    match item {
        Item::Output(object) => Item::Output(object.wrap(task.clone())),
        Item::Error(mut record) => {
            record.details_from_message = record.details.is_none();
            record.details = Some(tag_text(&record.to_string(), id));
            Item::Error(record)
        }
        Item::Warning(text) => Item::Warning(tag_text(&text, id)),
        Item::Verbose(text) => Item::Verbose(tag_text(&text, id)),
        Item::Debug(text) => Item::Debug(tag_text(&text, id)),
        Item::Information(mut record) => {
            record.source = tag_text(&record.source, id);
            Item::Information(record)
        }
        Item::Progress(mut record) => {
            record.activity = tag_text(&record.activity, id);
            Item::Progress(record)
        }
    }
}

/// Whether `item` already carries a tag (well formed or not).
pub fn is_tagged(item: &Item) -> bool {
    match item {
        Item::Output(object) => object.is_tagged(),
        Item::Error(record) => record.details.as_deref().map_or(false, is_tagged_text),
        Item::Warning(text) | Item::Verbose(text) | Item::Debug(text) => is_tagged_text(text),
        Item::Information(record) => is_tagged_text(&record.source),
        Item::Progress(record) => is_tagged_text(&record.activity),
    }
}

/// Removes the tag from `item`.
///
/// When the tag names a live task, the returned scope makes that task ambient
/// and owns the retain taken when the item was tagged. A tag naming a task
/// that has since left the registry is still stripped, but yields no scope.
/// Text that does not match the tag grammar is left exactly as it was.
pub fn decode(item: Item) -> (Item, Option<Scope>) {
    match item {
        Item::Output(object) => {
            let (object, task) = object.unwrap();
            (Item::Output(object), task.map(adopt))
        }
        Item::Error(mut record) => {
            let scope = record.details.as_mut().and_then(strip);
            if record.details_from_message {
                record.details = None;
                record.details_from_message = false;
            }
            (Item::Error(record), scope)
        }
        Item::Warning(mut text) => {
            let scope = strip(&mut text);
            (Item::Warning(text), scope)
        }
        Item::Verbose(mut text) => {
            let scope = strip(&mut text);
            (Item::Verbose(text), scope)
        }
        Item::Debug(mut text) => {
            let scope = strip(&mut text);
            (Item::Debug(text), scope)
        }
        Item::Information(mut record) => {
            let scope = strip(&mut record.source);
            (Item::Information(record), scope)
        }
        Item::Progress(mut record) => {
            let scope = strip(&mut record.activity);
            (Item::Progress(record), scope)
        }
    }
}

/// Prefixes `text` with the tag for `id`.
pub fn tag_text(text: &str, id: TaskId) -> String {
    format!("{}{}{}{}", TAG_OPEN, id, TAG_CLOSE, text)
}

/// Whether `text` starts with a tag opener.
pub fn is_tagged_text(text: &str) -> bool {
    text.starts_with(TAG_OPEN)
}

/// Parses a leading tag: the opening delimiter, one or more ASCII digits
/// that fit in an `i64`, then the closing delimiter. Returns the id and the
/// text after the tag.
pub fn parse_tag(text: &str) -> Option<(TaskId, &str)> {
    let rest = text.strip_prefix(TAG_OPEN)?;
    let digits = rest.find(|ch: char| !ch.is_ascii_digit())?;
    if digits == 0 {
        return None;
    }
    let tail = rest[digits..].strip_prefix(TAG_CLOSE)?;
    let id = rest[..digits].parse::<i64>().ok()?;
    Some((TaskId::from(id), tail))
}

fn strip(text: &mut String) -> Option<Scope> {
    let (id, tag_len) = match parse_tag(text) {
        Some((id, tail)) => (id, text.len() - tail.len()),
        None => return None,
    };
    text.drain(..tag_len);

    match Task::get(id) {
        Some(task) => Some(adopt(task)),
        None => {
            debug!(task = id.get(), "tag names a released task");
            None
        }
    }
}

/// Scope that takes over the retain owned by a tagged item.
fn adopt(task: Task) -> Scope {
    let scope = Scope::new(&task);
    task.release();
    scope
}
