//! Tasks: a body, the context it runs in, and its completion flag.

use crate::context::{ExecutionContext, Stack, switch_to};
use crate::error::fatal;
use crate::registry::{Registry, Shared};
use std::cell::{Cell, OnceCell, UnsafeCell};
use std::fmt;
use std::rc::Weak;

/// Boxed task body, already holding its start parameter.
pub(crate) type Body = Box<dyn FnOnce(&Registry)>;

/// Identifies a task within one registry: its position in registration
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) usize);

impl TaskId {
    /// Position in registration order.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A cooperative unit of work.
///
/// Created by [`Registry::create_task`] and handed to
/// [`Registry::register`], which takes ownership of it.
pub struct Task {
    pub(crate) core: Box<TaskCore>,
}

/// Heap-pinned part of a task. The entry trampoline receives its address,
/// so it must not move once the context is built.
pub(crate) struct TaskCore {
    pub(crate) context: UnsafeCell<ExecutionContext>,
    body: Cell<Option<Body>>,
    finished: Cell<bool>,
    resumptions: Cell<u64>,
    /// Set when the task is registered.
    owner: OnceCell<Weak<Shared>>,
}

impl Task {
    pub(crate) fn new(body: Body, stack: Stack) -> Self {
        let core = Box::new(TaskCore {
            context: UnsafeCell::new(ExecutionContext::root()),
            body: Cell::new(Some(body)),
            finished: Cell::new(false),
            resumptions: Cell::new(0),
            owner: OnceCell::new(),
        });
        let arg = &*core as *const TaskCore as usize;
        // Through the cell, so `arg` stays a valid shared pointer.
        unsafe { *core.context.get() = ExecutionContext::new(task_entry, arg, stack) };
        Task { core }
    }

    /// Whether the body has returned.
    pub fn is_finished(&self) -> bool {
        self.core.finished.get()
    }

    /// How many times the dispatcher switched into this task.
    pub fn resumptions(&self) -> u64 {
        self.core.resumptions.get()
    }

    /// Usable bytes of this task's stack.
    pub fn stack_size(&self) -> usize {
        unsafe { (*self.core.context.get()).stack_size() }.unwrap_or(0)
    }

    pub(crate) fn bind(&self, owner: Weak<Shared>) {
        if self.core.owner.set(owner).is_err() {
            fatal("task registered twice");
        }
    }

    pub(crate) fn record_resumption(&self) {
        self.core.resumptions.set(self.core.resumptions.get() + 1);
    }

    pub(crate) fn context(&self) -> *mut ExecutionContext {
        self.core.context.get()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("finished", &self.is_finished())
            .field("resumptions", &self.resumptions())
            .finish_non_exhaustive()
    }
}

/// First code run on a task stack.
///
/// Runs the body, flags the task finished, then hands control back to the
/// dispatcher for good. Everything owned here is dropped before that last
/// switch since this frame is never unwound.
extern "C" fn task_entry(arg: usize) -> ! {
    let core = unsafe { &*(arg as *const TaskCore) };

    let dispatcher = {
        let Some(registry) = core
            .owner
            .get()
            .and_then(Weak::upgrade)
            .map(Registry::from_shared)
        else {
            fatal("task started without a registry");
        };

        if let Some(body) = core.body.take() {
            body(&registry);
        }
        core.finished.set(true);

        registry.dispatcher_context()
    };

    unsafe { switch_to(core.context.get(), dispatcher) };
    fatal("finished task was resumed");
}
