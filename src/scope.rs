//! The ambient ("current") task of each thread.
//!
//! Every thread has its own slot. A [`Scope`] makes a task ambient for as long
//! as it lives, and scopes on one thread must end in the reverse order they
//! began. Threads spawned from inside a scope start with an empty slot; use
//! [`inherit`] to carry the ambient task along explicitly.

use crate::error::Error;
use crate::task::Task;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::thread;
use tracing::error;

struct Ambient {
    task: Option<Task>,
    depth: usize,
}

thread_local! {
    static AMBIENT: RefCell<Ambient> = const {
        RefCell::new(Ambient {
            task: None,
            depth: 0,
        })
    };
}

/// Returns the ambient task of the calling thread.
pub fn current() -> Option<Task> {
    AMBIENT.with(|ambient| ambient.borrow().task.clone())
}

/// Creates a task named `name` as a child of the ambient task and makes it
/// ambient.
///
/// The returned scope owns the task's only retain, so the task leaves the
/// registry when the scope ends unless something else retained it meanwhile.
///
/// ```
/// use taskline::{scope, Task};
///
/// let outer = scope::begin("deploy");
/// let id = outer.task().id;
/// assert_eq!(scope::current().map(|task| task.id), Some(id));
///
/// drop(outer);
/// assert!(scope::current().is_none());
/// assert!(Task::get(id).is_none());
/// ```
pub fn begin(name: &str) -> Scope {
    let task = Task::create(name);
    let scope = Scope::new(&task);
    task.release();
    scope
}

/// Wraps `f` so that it runs with the calling thread's ambient task, wherever
/// it is eventually called.
///
/// The ambient task is retained until the closure has run (or has been
/// dropped without running).
///
/// ```
/// use taskline::scope;
///
/// let _outer = scope::begin("parent");
/// let expected = scope::current().map(|task| task.id);
///
/// let job = scope::inherit(|| scope::current().map(|task| task.id));
/// let seen = std::thread::spawn(job).join().unwrap();
/// assert_eq!(seen, expected);
/// ```
pub fn inherit<F, R>(f: F) -> impl FnOnce() -> R + Send
where
    F: FnOnce() -> R + Send,
{
    let carried = Carried(current().map(|task| {
        task.retain();
        task
    }));
    move || {
        let carried = carried;
        let _scope = carried.0.as_ref().map(Scope::new);
        f()
    }
}

struct Carried(Option<Task>);

impl Drop for Carried {
    fn drop(&mut self) {
        if let Some(task) = self.0.take() {
            task.release();
        }
    }
}

/// Makes one task ambient on the current thread.
///
/// Ends when [`dispose`](Scope::dispose) is called or the scope is dropped.
/// Ending a scope while a scope nested inside it is still live is a usage
/// error: `dispose` reports it as [`Error::ScopeOrder`] and changes nothing,
/// and dropping such a scope panics.
#[must_use = "the task stops being ambient when the scope is dropped"]
pub struct Scope {
    task: Task,
    previous: Option<Task>,
    depth: usize,
    disposed: bool,
    // Bound to the thread whose slot it changed.
    _not_send: PhantomData<*const ()>,
}

impl Scope {
    /// Retains `task` and makes it ambient, remembering what was ambient
    /// before.
    pub fn new(task: &Task) -> Scope {
        task.retain();
        let (previous, depth) = AMBIENT.with(|ambient| {
            let mut ambient = ambient.borrow_mut();
            ambient.depth += 1;
            (ambient.task.replace(task.clone()), ambient.depth)
        });
        Scope {
            task: task.clone(),
            previous,
            depth,
            disposed: false,
            _not_send: PhantomData,
        }
    }

    /// The task this scope made ambient.
    pub fn task(&self) -> &Task {
        &self.task
    }

    /// Whether this scope has already ended.
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Restores the previously ambient task and releases this scope's retain.
    /// Disposing twice is a no-op.
    pub fn dispose(&mut self) -> Result<(), Error> {
        if self.disposed {
            return Ok(());
        }

        AMBIENT.with(|ambient| {
            let mut ambient = ambient.borrow_mut();
            if ambient.depth != self.depth {
                return Err(Error::ScopeOrder {
                    scope: self.task.id,
                    current: ambient.task.as_ref().map(|task| task.id),
                });
            }
            ambient.task = self.previous.take();
            ambient.depth -= 1;
            Ok(())
        })?;

        self.disposed = true;
        self.task.release();
        Ok(())
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        if let Err(err) = self.dispose() {
            if thread::panicking() {
                error!(task = self.task.id.get(), label = err.as_label(), "{}", err);
            } else {
                panic!("{}", err);
            }
        }
    }
}
