//! Task definitions: the resumable unit of work.
//!
//! A task advances through an explicit state machine, one bounded step at
//! a time. The generator-style body of the original design is expressed
//! here as a [`Behavior`] whose `step` method returns a [`Transition`]
//! telling the scheduler what to do next. A step must never block the
//! scheduler thread; blocking work belongs behind a thread bridge.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::bridge::BlockingWork;
use super::errors::{RuntimeError, RuntimeResult};
use super::ipc::Message;
use super::mailbox::Mailbox;
use super::postoffice::{LinkId, Postoffice};

/// Unique task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Get the inner value.
    #[inline]
    pub fn inner(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "task({})", self.0)
    }
}

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh process-unique task id.
///
/// Safe to call from any thread; bridge threads allocate ids too.
#[inline]
pub(crate) fn next_task_id() -> TaskId {
    TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
}

/// Task lifecycle state.
///
/// `Created -> Running <-> Paused -> Terminating -> Terminated`.
/// A task only reaches `Terminated` once the coordination tree confirms
/// it has no live children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Instantiated but not yet scheduled.
    Created,
    /// Runnable; in or eligible for the ready queue.
    Running,
    /// Voluntarily suspended; waiting for a message, wake, or timer.
    Paused,
    /// Finished its own work; waiting for children to terminate.
    Terminating,
    /// Fully done; removed from the run set.
    Terminated,
}

impl TaskState {
    /// Convert from u8 (for atomic storage).
    #[inline]
    pub fn from_u8(val: u8) -> Self {
        match val {
            0 => TaskState::Created,
            1 => TaskState::Running,
            2 => TaskState::Paused,
            3 => TaskState::Terminating,
            4 => TaskState::Terminated,
            _ => TaskState::Created,
        }
    }

    /// Convert to u8 (for atomic storage).
    #[inline]
    pub fn as_u8(&self) -> u8 {
        match self {
            TaskState::Created => 0,
            TaskState::Running => 1,
            TaskState::Paused => 2,
            TaskState::Terminating => 3,
            TaskState::Terminated => 4,
        }
    }

    /// True once the task has begun tearing down.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Terminating | TaskState::Terminated)
    }
}

/// What a task step asks the scheduler to do next.
#[derive(Debug)]
pub enum Transition {
    /// More work pending; keep the task in the ready queue.
    Continue,
    /// No ready input; suspend until a message arrives or an explicit wake.
    Pause,
    /// Suspend; resume no earlier than the given duration from now.
    Sleep(Duration),
    /// The task is done; begin the teardown sequence.
    Terminate,
}

/// A resumable unit of work.
///
/// Each call to `step` executes a small bounded slice and returns control
/// to the scheduler. A fault (`Err`) terminates the task with an error
/// payload on its `"signal"` outbox; it never propagates into the
/// scheduler loop.
pub trait Behavior: Send {
    /// Execute one slice of work.
    fn step(
        &mut self,
        cx: &mut TaskContext<'_>,
    ) -> anyhow::Result<Transition>;
}

impl<F> Behavior for F
where
    F: FnMut(&mut TaskContext<'_>) -> anyhow::Result<Transition> + Send,
{
    fn step(
        &mut self,
        cx: &mut TaskContext<'_>,
    ) -> anyhow::Result<Transition> {
        self(cx)
    }
}

/// Default inbox names every task is created with.
pub const DEFAULT_INBOXES: [&str; 2] = ["inbox", "control"];
/// Default outbox names every task is created with.
pub const DEFAULT_OUTBOXES: [&str; 2] = ["outbox", "signal"];

/// Builder describing a task's identity and port set.
///
/// Every task gets the default boxes; extra named boxes are declared
/// here. The behavior (or bridge work) is supplied at activation.
#[derive(Default)]
pub struct TaskDef {
    pub(crate) name: Option<String>,
    pub(crate) extra_inboxes: SmallVec<[String; 2]>,
    pub(crate) extra_outboxes: SmallVec<[String; 2]>,
}

impl TaskDef {
    /// Describe a task with the default port set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a debug name for the task.
    pub fn name(
        mut self,
        name: impl Into<String>,
    ) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Declare an additional named inbox beyond the defaults.
    pub fn with_inbox(
        mut self,
        name: impl Into<String>,
    ) -> Self {
        self.extra_inboxes.push(name.into());
        self
    }

    /// Declare an additional named outbox beyond the defaults.
    pub fn with_outbox(
        mut self,
        name: impl Into<String>,
    ) -> Self {
        self.extra_outboxes.push(name.into());
        self
    }
}

impl fmt::Debug for TaskDef {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("TaskDef")
            .field("name", &self.name)
            .field("extra_inboxes", &self.extra_inboxes)
            .field("extra_outboxes", &self.extra_outboxes)
            .finish()
    }
}

/// A spawn requested during a step, applied by the scheduler afterwards.
pub(crate) enum PendingSpawn {
    Task {
        id: TaskId,
        def: TaskDef,
        behavior: Box<dyn Behavior>,
    },
    Bridge {
        id: TaskId,
        def: TaskDef,
        work: Box<dyn BlockingWork>,
    },
}

/// The API a task step sees.
///
/// Gives access to the task's own mailboxes, wiring operations, and child
/// spawning. Spawns are deferred: the child gets its id immediately but is
/// registered and enqueued once the current step returns.
pub struct TaskContext<'a> {
    id: TaskId,
    inboxes: &'a IndexMap<String, Arc<Mailbox>>,
    outboxes: &'a IndexMap<String, Arc<Mailbox>>,
    postoffice: &'a mut Postoffice,
    spawned: &'a mut Vec<PendingSpawn>,
}

impl<'a> TaskContext<'a> {
    pub(crate) fn new(
        id: TaskId,
        inboxes: &'a IndexMap<String, Arc<Mailbox>>,
        outboxes: &'a IndexMap<String, Arc<Mailbox>>,
        postoffice: &'a mut Postoffice,
        spawned: &'a mut Vec<PendingSpawn>,
    ) -> Self {
        Self {
            id,
            inboxes,
            outboxes,
            postoffice,
            spawned,
        }
    }

    /// This task's id.
    #[inline]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Pop the head message of the named inbox, or `None` if empty.
    pub fn recv(
        &mut self,
        inbox: &str,
    ) -> RuntimeResult<Option<Message>> {
        let mbox = self.inboxes.get(inbox).ok_or_else(|| RuntimeError::UnknownPort {
            task: self.id,
            name: inbox.to_string(),
        })?;
        Ok(mbox.try_recv())
    }

    /// True if the named inbox has at least one message queued.
    ///
    /// Unknown names report `false`; checking readiness is not a wiring
    /// operation.
    #[inline]
    pub fn data_ready(
        &self,
        inbox: &str,
    ) -> bool {
        self.inboxes.get(inbox).is_some_and(|m| m.peek_ready())
    }

    /// True if *any* inbox has a message queued.
    #[inline]
    pub fn any_ready(&self) -> bool {
        self.inboxes.values().any(|m| m.peek_ready())
    }

    /// True if a shutdown control message is waiting in the control inbox.
    ///
    /// Non-destructive; the message stays queued for a later `recv`.
    pub fn shutdown_requested(&self) -> bool {
        self.inboxes
            .get("control")
            .is_some_and(|m| m.contains_shutdown())
    }

    /// Append a message to the named outbox.
    ///
    /// Never blocks. The scheduler routes the outbox along its linkage
    /// after the current step returns.
    pub fn send(
        &mut self,
        outbox: &str,
        msg: impl Into<Message>,
    ) -> RuntimeResult<()> {
        let mbox = self.outboxes.get(outbox).ok_or_else(|| RuntimeError::UnknownPort {
            task: self.id,
            name: outbox.to_string(),
        })?;
        mbox.send(msg.into());
        Ok(())
    }

    /// Spawn a child task.
    ///
    /// The child is recorded under this task in the coordination tree, so
    /// this task will not reach `Terminated` before the child has.
    pub fn spawn(
        &mut self,
        def: TaskDef,
        behavior: impl Behavior + 'static,
    ) -> TaskId {
        let id = next_task_id();
        self.spawned.push(PendingSpawn::Task {
            id,
            def,
            behavior: Box::new(behavior),
        });
        id
    }

    /// Spawn a child thread bridge running blocking work.
    pub fn spawn_bridge(
        &mut self,
        def: TaskDef,
        work: impl BlockingWork,
    ) -> TaskId {
        let id = next_task_id();
        self.spawned.push(PendingSpawn::Bridge {
            id,
            def,
            work: Box::new(work),
        });
        id
    }

    /// Create a linkage from one task's outbox to another's inbox.
    pub fn link(
        &mut self,
        source: (TaskId, &str),
        dest: (TaskId, &str),
    ) -> RuntimeResult<LinkId> {
        self.postoffice.link(source, dest)
    }

    /// Remove a linkage. Idempotent.
    #[inline]
    pub fn unlink(
        &mut self,
        link: LinkId,
    ) {
        self.postoffice.unlink(link);
    }
}
