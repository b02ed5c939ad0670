//! Round-robin registry of cooperative tasks.
//!
//! # Example
//!
//! ```
//! use mycoroutine::Registry;
//!
//! fn count(registry: &Registry, label: &'static str) {
//!     for i in 0..3 {
//!         println!("{label}: {i}");
//!         registry.yield_now();
//!     }
//! }
//!
//! let registry = Registry::new();
//! registry.register(registry.create_task(count, "first")).unwrap();
//! registry.register(registry.create_task(count, "second")).unwrap();
//! let stats = registry.start().unwrap();
//! assert_eq!(stats.completed, 2);
//! ```

use crate::config::SchedulerConfig;
use crate::context::{ExecutionContext, Stack, switch_to};
use crate::error::{SchedulerError, fatal};
use crate::ring::Ring;
use crate::task::{Task, TaskId};
use log::{debug, trace};
use std::cell::{Cell, RefCell, UnsafeCell};
use std::fmt;
use std::rc::Rc;

/// Where the scheduler is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Accepting registrations, not started yet.
    Idle,
    /// Inside the dispatcher loop, between two switches.
    Dispatching,
    /// Control is inside a task.
    Running,
    /// Every task finished; `start` has returned or is about to.
    Finished,
}

/// Counters kept by the dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Switches from the dispatcher into a task body.
    pub resumptions: u64,
    /// Tasks whose body has returned.
    pub completed: usize,
}

/// Handle to a single-threaded scheduler.
///
/// Clones share the same scheduler. Every task body receives a
/// `&Registry` so it can call [`Registry::yield_now`].
#[derive(Clone)]
pub struct Registry {
    shared: Rc<Shared>,
}

/// Scheduler state behind the handle.
///
/// The dispatcher context gets the address of this struct as its entry
/// argument, so it lives behind an `Rc` and never moves. `RefCell` borrows
/// of the ring are always released before a context switch.
pub(crate) struct Shared {
    config: SchedulerConfig,
    /// Runs `dispatcher_entry` on its own stack.
    dispatcher: UnsafeCell<ExecutionContext>,
    /// Whoever called `start`.
    root: UnsafeCell<ExecutionContext>,
    ring: RefCell<Ring<Task>>,
    current: Cell<Option<TaskId>>,
    state: Cell<SchedulerState>,
    stats: Cell<DispatchStats>,
}

impl Registry {
    /// Create a scheduler with the default configuration.
    pub fn new() -> Self {
        Self::build(SchedulerConfig::default())
    }

    /// Create a scheduler after validating `config`.
    pub fn with_config(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: SchedulerConfig) -> Self {
        let shared = Rc::new(Shared {
            config,
            dispatcher: UnsafeCell::new(ExecutionContext::root()),
            root: UnsafeCell::new(ExecutionContext::root()),
            ring: RefCell::new(Ring::new()),
            current: Cell::new(None),
            state: Cell::new(SchedulerState::Idle),
            stats: Cell::new(DispatchStats::default()),
        });

        let arg = Rc::as_ptr(&shared) as usize;
        let context = ExecutionContext::new(dispatcher_entry, arg, Stack::new(config.stack_size));
        // Nothing else can reach the dispatcher context yet.
        unsafe { *shared.dispatcher.get() = context };

        debug!("registry created (stack size {})", config.stack_size);
        Registry { shared }
    }

    pub(crate) fn from_shared(shared: Rc<Shared>) -> Self {
        Registry { shared }
    }

    /// Create a task running `entry(registry, param)`.
    ///
    /// The task does nothing until it is registered and the scheduler is
    /// started.
    pub fn create_task<P: 'static>(&self, entry: fn(&Registry, P), param: P) -> Task {
        self.create_task_with(move |registry| entry(registry, param))
    }

    /// Create a task from a closure.
    pub fn create_task_with<F>(&self, body: F) -> Task
    where
        F: FnOnce(&Registry) + 'static,
    {
        Task::new(Box::new(body), Stack::new(self.shared.config.stack_size))
    }

    /// Enroll a task at the end of the rotation.
    ///
    /// The first task registered becomes the current task and runs first.
    pub fn register(&self, task: Task) -> Result<TaskId, SchedulerError> {
        if self.shared.state.get() != SchedulerState::Idle {
            return Err(SchedulerError::AlreadyStarted);
        }

        task.bind(Rc::downgrade(&self.shared));
        let (id, len) = {
            let mut ring = self.shared.ring.borrow_mut();
            (TaskId(ring.push(task)), ring.len())
        };
        if self.shared.current.get().is_none() {
            self.shared.current.set(Some(id));
        }

        debug!("registered task {id} ({len} in rotation)");
        Ok(id)
    }

    /// Create and register a closure task in one step.
    pub fn spawn<F>(&self, body: F) -> Result<TaskId, SchedulerError>
    where
        F: FnOnce(&Registry) + 'static,
    {
        self.register(self.create_task_with(body))
    }

    /// Hand control to the dispatcher until every task has finished.
    ///
    /// A task that neither yields nor returns keeps this from ever
    /// returning.
    pub fn start(&self) -> Result<DispatchStats, SchedulerError> {
        let shared = &*self.shared;
        if shared.state.get() != SchedulerState::Idle {
            return Err(SchedulerError::AlreadyStarted);
        }
        if shared.ring.borrow().is_empty() {
            return Err(SchedulerError::NoTasks);
        }

        debug!("starting dispatcher with {} tasks", self.len());
        shared.state.set(SchedulerState::Dispatching);
        unsafe { switch_to(shared.root.get(), shared.dispatcher.get()) };

        let stats = shared.stats.get();
        debug!(
            "dispatcher returned: {} tasks, {} resumptions",
            stats.completed, stats.resumptions
        );
        Ok(stats)
    }

    /// Give control back to the dispatcher; returns when this task is
    /// next scheduled.
    ///
    /// # Panics
    /// If no task of this registry is running. Inside a coroutine the
    /// panic cannot unwind and the process aborts.
    pub fn yield_now(&self) {
        let shared = &*self.shared;
        let current = match (shared.state.get(), shared.current.get()) {
            (SchedulerState::Running, Some(current)) => current,
            (state, _) => panic!("yield_now called outside of a running task (state: {state:?})"),
        };

        let Some(context) = shared.ring.borrow().get(current.0).map(Task::context) else {
            fatal("current task is not in the rotation");
        };

        trace!("task {current} yields");
        unsafe { switch_to(context, shared.dispatcher.get()) };
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SchedulerState {
        self.shared.state.get()
    }

    /// The task running now, or the last one that ran. `None` until a
    /// task is registered.
    pub fn current_task(&self) -> Option<TaskId> {
        self.shared.current.get()
    }

    /// Number of registered tasks.
    pub fn len(&self) -> usize {
        self.shared.ring.borrow().len()
    }

    /// Whether no task has been registered.
    pub fn is_empty(&self) -> bool {
        self.shared.ring.borrow().is_empty()
    }

    /// `None` for an id this registry never handed out.
    pub fn is_finished(&self, id: TaskId) -> Option<bool> {
        self.shared.ring.borrow().get(id.0).map(Task::is_finished)
    }

    /// How many times the dispatcher switched into task `id`.
    pub fn resumptions(&self, id: TaskId) -> Option<u64> {
        self.shared.ring.borrow().get(id.0).map(Task::resumptions)
    }

    /// Task ids in rotation order, starting from the head.
    pub fn ring_order(&self) -> Vec<TaskId> {
        let ring = self.shared.ring.borrow();
        match ring.head() {
            Some(head) => ring.walk_from(head).map(TaskId).collect(),
            None => Vec::new(),
        }
    }

    /// Counters accumulated by the dispatcher so far.
    pub fn stats(&self) -> DispatchStats {
        self.shared.stats.get()
    }

    /// Configuration this registry was built with.
    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    pub(crate) fn dispatcher_context(&self) -> *mut ExecutionContext {
        self.shared.dispatcher.get()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("state", &self.state())
            .field("tasks", &self.len())
            .field("current", &self.current_task())
            .field("stats", &self.stats())
            .finish()
    }
}

impl Shared {
    /// The dispatcher loop.
    ///
    /// The first selection starts from the tail so the head runs first;
    /// after that each walk starts just past the task that last ran.
    /// Returns once a full turn finds nothing left to run.
    fn dispatch(&self) {
        trace!("main context: get control");
        let Some(mut cursor) = self.ring.borrow().tail() else {
            return;
        };

        loop {
            let selected = {
                let ring = self.ring.borrow();
                ring.find_after(cursor, |task| !task.is_finished())
                    .and_then(|index| ring.get(index).map(|task| (index, task.context())))
            };
            let Some((index, context)) = selected else {
                break;
            };

            cursor = index;
            let id = TaskId(index);
            self.current.set(Some(id));
            self.record_resumption(index);

            trace!("main coroutine: switch to task {id}");
            self.state.set(SchedulerState::Running);
            unsafe { switch_to(self.dispatcher.get(), context) };
            self.state.set(SchedulerState::Dispatching);

            if self.ring.borrow().get(index).is_some_and(Task::is_finished) {
                let mut stats = self.stats.get();
                stats.completed += 1;
                self.stats.set(stats);
                debug!("task {id} finished");
            }
        }

        debug!("all tasks finished");
    }

    fn record_resumption(&self, index: usize) {
        if let Some(task) = self.ring.borrow().get(index) {
            task.record_resumption();
        }
        let mut stats = self.stats.get();
        stats.resumptions += 1;
        self.stats.set(stats);
    }
}

/// Entry point of the dispatcher context.
extern "C" fn dispatcher_entry(arg: usize) -> ! {
    let shared = unsafe { &*(arg as *const Shared) };

    shared.dispatch();
    shared.state.set(SchedulerState::Finished);

    unsafe { switch_to(shared.dispatcher.get(), shared.root.get()) };
    fatal("dispatcher resumed after shutdown");
}
