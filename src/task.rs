//! Process-wide registry of live tasks.
//!
//! Every task carries a manual retain count. A task is inserted into the
//! registry exactly once, when it is created, and leaves it the moment its
//! count drops to zero. Leaving is one-way: retaining a released task raises
//! its count again but [`Task::get`] keeps returning `None` for its id.

use crate::scope::{self, Scope};
use crate::sync::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt::{self, Debug, Display};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace};

const SEPARATOR: char = '|';

/// Process-wide task identity.
///
/// Real tasks are numbered from 1 in creation order. The value −1 is reserved
/// for the [placeholder](Task::placeholder) that stands in when no task is
/// ambient.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(i64);

impl TaskId {
    /// Id of the placeholder task.
    pub const PLACEHOLDER: TaskId = TaskId(-1);

    /// The raw id.
    pub fn get(self) -> i64 {
        self.0
    }

    /// Whether this is [`TaskId::PLACEHOLDER`].
    pub fn is_placeholder(self) -> bool {
        self == TaskId::PLACEHOLDER
    }
}

impl From<i64> for TaskId {
    fn from(id: i64) -> Self {
        TaskId(id)
    }
}

impl Display for TaskId {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.0, formatter)
    }
}

static NEXT_ID: AtomicI64 = AtomicI64::new(1);

fn registry() -> &'static RwLock<HashMap<TaskId, Task>> {
    static REGISTRY: OnceLock<RwLock<HashMap<TaskId, Task>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Handle to a logical unit of work.
///
/// Cloning a `Task` copies the handle only; it does not touch the retain
/// count. Ownership of a registry entry is expressed explicitly through
/// [`retain`](Task::retain) and [`release`](Task::release), normally by way of
/// a [`Scope`].
///
/// ```
/// use taskline::Task;
///
/// let task = Task::create("compile");
/// assert_eq!(task.retain_count(), 1);
/// assert!(Task::get(task.id).is_some());
///
/// task.release();
/// assert!(Task::get(task.id).is_none());
/// ```
#[readonly::make]
#[derive(Clone)]
pub struct Task {
    inner: Arc<Inner>,

    /// Identity of this task, unique for the life of the process.
    ///
    /// This field is read-only; writing to its value will not compile.
    #[readonly]
    pub id: TaskId,
}

struct Inner {
    parent: Option<Task>,
    retains: AtomicI64,
    removed: AtomicBool,
    placeholder: bool,
    names: Mutex<Names>,
}

struct Names {
    name: Arc<str>,
    full: Option<Derived>,
    formatted: Option<Derived>,
}

/// Cached string together with the input it was derived from. The input is
/// compared by pointer, so a parent that recomputed its own full name is
/// noticed even when the text happens to be equal.
struct Derived {
    from: Option<Arc<str>>,
    value: Arc<str>,
}

impl Task {
    /// Creates a task whose parent is the ambient task of the calling thread,
    /// registers it, and returns it with a retain count of 1.
    pub fn create(name: &str) -> Task {
        let parent = scope::current();
        let id = TaskId(NEXT_ID.fetch_add(1, Ordering::Relaxed));
        let task = Task {
            inner: Arc::new(Inner {
                parent,
                retains: AtomicI64::new(1),
                removed: AtomicBool::new(false),
                placeholder: false,
                names: Mutex::new(Names::new(name)),
            }),
            id,
        };
        registry().write().insert(id, task.clone());
        trace!(
            task = id.0,
            parent = ?task.parent().map(|parent| parent.id.0),
            task_name = name,
            "task created"
        );
        task
    }

    /// Looks up a live task. Returns `None` for ids that were never issued and
    /// for tasks whose retain count has ever reached zero.
    pub fn get(id: TaskId) -> Option<Task> {
        registry().read().get(&id).cloned()
    }

    /// The stateless stand-in used where no real task is ambient.
    ///
    /// It has id −1 and an empty name, is never registered, and ignores
    /// retain and release.
    pub fn placeholder() -> Task {
        static PLACEHOLDER: OnceLock<Task> = OnceLock::new();
        PLACEHOLDER
            .get_or_init(|| Task {
                inner: Arc::new(Inner {
                    parent: None,
                    retains: AtomicI64::new(0),
                    removed: AtomicBool::new(true),
                    placeholder: true,
                    names: Mutex::new(Names::new("")),
                }),
                id: TaskId::PLACEHOLDER,
            })
            .clone()
    }

    /// Task that was ambient when this one was created.
    pub fn parent(&self) -> Option<&Task> {
        self.inner.parent.as_ref()
    }

    /// Takes one more unit of ownership. Does not re-register a released task.
    pub fn retain(&self) {
        if self.inner.placeholder {
            return;
        }
        self.inner.retains.fetch_add(1, Ordering::AcqRel);
    }

    /// Drops one unit of ownership. The count saturates at zero; the release
    /// that takes it from 1 to 0 removes the task from the registry for good.
    pub fn release(&self) {
        if self.inner.placeholder {
            return;
        }

        let retains = &self.inner.retains;
        let mut current = retains.load(Ordering::Acquire);
        loop {
            match current {
                0 => return,
                1 => {
                    // Decide and unregister under the write lock so that a
                    // concurrent `get` never sees an entry whose count is 0.
                    let mut map = registry().write();
                    match retains.compare_exchange(1, 0, Ordering::AcqRel, Ordering::Acquire) {
                        Ok(_) => {
                            self.inner.removed.store(true, Ordering::Release);
                            map.remove(&self.id);
                            drop(map);
                            debug!(task = self.id.0, "task released");
                            return;
                        }
                        Err(actual) => current = actual,
                    }
                }
                _ => match retains.compare_exchange_weak(
                    current,
                    current - 1,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => return,
                    Err(actual) => current = actual,
                },
            }
        }
    }

    /// Current retain count.
    pub fn retain_count(&self) -> i64 {
        self.inner.retains.load(Ordering::Acquire)
    }

    /// Whether this task can still be found through [`Task::get`].
    pub fn is_registered(&self) -> bool {
        !self.inner.removed.load(Ordering::Acquire)
    }

    /// This task's own name, without its ancestors.
    pub fn name(&self) -> Arc<str> {
        self.inner.names.lock().name.clone()
    }

    /// Renames this task. Cached names of this task are rebuilt on next use;
    /// descendants notice the change lazily.
    pub fn set_name(&self, name: &str) {
        let mut names = self.inner.names.lock();
        names.name = Arc::from(name);
        names.full = None;
        names.formatted = None;
    }

    /// Names of every ancestor and this task joined with `|`, skipping empty
    /// names.
    ///
    /// A child's cached value follows its parent while the parent is alive;
    /// once the parent task has been released it is only refreshed on the
    /// child's own reads, like any other read.
    pub fn full_name(&self) -> Arc<str> {
        let mut names = self.inner.names.lock();
        let parent = self.inner.parent.as_ref().map(Task::full_name);
        names.full_name(parent)
    }

    /// `[full name]: `, or the empty string when the full name is empty.
    pub fn formatted_name(&self) -> Arc<str> {
        let mut names = self.inner.names.lock();
        let parent = self.inner.parent.as_ref().map(Task::full_name);
        let full = names.full_name(parent);
        names.formatted_name(full)
    }

    /// Makes this task ambient on the current thread until the returned scope
    /// is disposed.
    pub fn enter(&self) -> Scope {
        Scope::new(self)
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Task {}

impl Debug for Task {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter
            .debug_tuple("Task")
            .field(&self.id.0)
            .field(&self.name())
            .finish()
    }
}

impl Names {
    fn new(name: &str) -> Self {
        Names {
            name: Arc::from(name),
            full: None,
            formatted: None,
        }
    }

    fn full_name(&mut self, parent: Option<Arc<str>>) -> Arc<str> {
        if let Some(cached) = &self.full {
            if same(&cached.from, &parent) {
                return cached.value.clone();
            }
        }

        let value = match &parent {
            Some(parent) => join(parent, &self.name),
            None => self.name.clone(),
        };
        self.full = Some(Derived {
            from: parent,
            value: value.clone(),
        });
        value
    }

    fn formatted_name(&mut self, full: Arc<str>) -> Arc<str> {
        if let Some(cached) = &self.formatted {
            if same(&cached.from, &Some(full.clone())) {
                return cached.value.clone();
            }
        }

        let value: Arc<str> = Arc::from(format_header(&full));
        self.formatted = Some(Derived {
            from: Some(full),
            value: value.clone(),
        });
        value
    }
}

fn same(a: &Option<Arc<str>>, b: &Option<Arc<str>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

fn join(parent: &Arc<str>, name: &Arc<str>) -> Arc<str> {
    if name.is_empty() {
        parent.clone()
    } else if parent.is_empty() {
        name.clone()
    } else {
        Arc::from(format!("{}{}{}", parent, SEPARATOR, name))
    }
}

/// Renders the bracketed header shown in front of a task's lines.
pub(crate) fn format_header(text: &str) -> String {
    if text.is_empty() {
        String::new()
    } else {
        format!("[{}]: ", text)
    }
}

#[cfg(test)]
struct _Test
where
    Task: Send + Sync;

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn ids_increase() {
        let first = Task::create("a");
        let second = Task::create("b");
        assert!(first.id.get() >= 1);
        assert!(second.id > first.id);
        first.release();
        second.release();
    }

    #[test]
    fn release_then_retain_stays_unregistered() {
        let task = Task::create("short lived");
        assert_eq!(task.retain_count(), 1);
        assert_eq!(Task::get(task.id), Some(task.clone()));

        task.release();
        assert_eq!(task.retain_count(), 0);
        assert!(Task::get(task.id).is_none());
        assert!(!task.is_registered());

        task.retain();
        assert_eq!(task.retain_count(), 1);
        assert!(Task::get(task.id).is_none());
        assert!(!task.is_registered());
    }

    #[test]
    fn release_saturates_at_zero() {
        let task = Task::create("");
        task.release();
        task.release();
        task.release();
        assert_eq!(task.retain_count(), 0);
    }

    #[test]
    fn retained_task_survives_one_release() {
        let task = Task::create("kept");
        task.retain();
        task.release();
        assert_eq!(task.retain_count(), 1);
        assert!(Task::get(task.id).is_some());
        task.release();
        assert!(Task::get(task.id).is_none());
    }

    #[test]
    fn concurrent_retain_release_balances() {
        let task = Task::create("contended");
        thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..1000 {
                        task.retain();
                        task.release();
                    }
                });
            }
        });
        assert_eq!(task.retain_count(), 1);
        assert!(Task::get(task.id).is_some());
        task.release();
        assert!(Task::get(task.id).is_none());
    }

    #[test]
    fn racing_releases_unregister_exactly_once() {
        for _ in 0..2000 {
            let task = Task::create("racing");
            task.retain();
            let id = task.id;
            thread::scope(|scope| {
                scope.spawn(|| task.release());
                scope.spawn(|| task.release());
                scope.spawn(|| {
                    task.retain();
                    task.release();
                });
                scope.spawn(|| {
                    let map = registry().read();
                    if let Some(found) = map.get(&id) {
                        assert!(found.retain_count() > 0);
                    }
                });
                scope.spawn(|| {
                    if let Some(found) = Task::get(id) {
                        assert_eq!(found, task);
                    }
                });
            });
            assert_eq!(task.retain_count(), 0);
            assert!(!task.is_registered());
            assert!(Task::get(id).is_none());
        }
    }

    #[test]
    fn parent_is_the_ambient_task() {
        let outer = scope::begin("build");
        let child = Task::create("link");
        assert_eq!(child.parent(), Some(outer.task()));
        assert_eq!(&*child.full_name(), "build|link");
        assert_eq!(&*child.formatted_name(), "[build|link]: ");
        child.release();
    }

    #[test]
    fn empty_names_are_skipped_when_joining() {
        let outer = scope::begin("");
        let child = Task::create("test");
        assert_eq!(&*child.full_name(), "test");
        child.release();
        drop(outer);

        let outer = scope::begin("suite");
        let child = Task::create("");
        assert_eq!(&*child.full_name(), "suite");
        child.release();
        drop(outer);

        let lonely = Task::create("");
        assert_eq!(&*lonely.full_name(), "");
        assert_eq!(&*lonely.formatted_name(), "");
        lonely.release();
    }

    #[test]
    fn renaming_a_parent_heals_the_child() {
        let outer = scope::begin("old");
        let child = Task::create("leaf");
        assert_eq!(&*child.full_name(), "old|leaf");

        outer.task().set_name("new");
        assert_eq!(&*outer.task().name(), "new");
        assert_eq!(&*child.full_name(), "new|leaf");
        assert_eq!(&*child.formatted_name(), "[new|leaf]: ");

        child.set_name("tip");
        assert_eq!(&*child.formatted_name(), "[new|tip]: ");
        child.release();
    }

    #[test]
    fn placeholder_ignores_counting() {
        let placeholder = Task::placeholder();
        assert!(placeholder.id.is_placeholder());
        placeholder.retain();
        placeholder.release();
        assert_eq!(placeholder.retain_count(), 0);
        assert!(!placeholder.is_registered());
        assert!(Task::get(TaskId::PLACEHOLDER).is_none());
        assert_eq!(&*placeholder.formatted_name(), "");
    }
}
