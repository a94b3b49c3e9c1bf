//! Round-robin scheduler for cooperative tasks.
//!
//! A single logical run loop owns every activated task and drives each
//! one step at a time in strict turn-taking, so cooperative tasks never
//! need locking between them. Bridge threads run concurrently and talk
//! to the loop only through shared mailboxes and a wake channel.
//!
//! The loop keeps running until it is explicitly stopped or the system
//! is quiescent: no task is runnable, no timer is armed, and no bridge
//! is alive that could still produce an event.

#[cfg(test)]
mod tests;

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{unbounded, Receiver, Sender};
use indexmap::IndexMap;
use tracing::{debug, error, trace, warn};

use super::bridge::{spawn_bridge_thread, BlockingWork, BridgeIo, WakeEvent};
use super::errors::{RuntimeError, RuntimeResult};
use super::ipc::{Control, Message};
use super::mailbox::{Mailbox, MailboxDirection};
use super::postoffice::{LinkId, LinkInfo, Postoffice};
use super::task::{
    next_task_id, Behavior, PendingSpawn, TaskContext, TaskDef, TaskId, TaskState, Transition,
    DEFAULT_INBOXES, DEFAULT_OUTBOXES,
};
use super::tracker::SpawnTracker;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How long a bridge may ignore a shutdown request before it is
    /// reported as unresponsive and written off.
    pub bridge_grace: Duration,
    /// Upper bound on how long an idle loop blocks waiting for bridge
    /// events before re-checking timers and deadlines.
    pub idle_poll: Duration,
    /// Optional delay after every worked tick (debugging aid).
    pub slowmo: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            bridge_grace: Duration::from_secs(1),
            idle_poll: Duration::from_millis(10),
            slowmo: None,
        }
    }
}

/// What a single tick accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// One task step was executed.
    Worked,
    /// Nothing runnable right now, but a timer or bridge could still
    /// produce work.
    Idle,
    /// Nothing runnable and no event source left: the graph is done.
    Quiescent,
}

struct BridgeState {
    handle: Option<thread::JoinHandle<()>>,
    done: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    deadline: Option<Instant>,
    /// Set when the bridge blew its shutdown grace period and was
    /// abandoned; its thread is detached and it no longer counts as a
    /// live event source.
    written_off: bool,
}

enum Runner {
    Cooperative { behavior: Option<Box<dyn Behavior>> },
    Bridge(BridgeState),
}

struct TaskEntry {
    name: String,
    state: TaskState,
    inboxes: IndexMap<String, Arc<Mailbox>>,
    outboxes: IndexMap<String, Arc<Mailbox>>,
    runner: Runner,
}

/// The single scheduling authority for a task graph.
pub struct Scheduler {
    config: SchedulerConfig,
    tasks: IndexMap<TaskId, TaskEntry>,
    ready: VecDeque<TaskId>,
    /// Tasks currently in `ready`; a task id appears there at most once.
    queued: HashSet<TaskId>,
    timers: BinaryHeap<Reverse<(Instant, TaskId)>>,
    postoffice: Postoffice,
    tracker: SpawnTracker,
    wake_tx: Sender<WakeEvent>,
    wake_rx: Receiver<WakeEvent>,
    stop_flag: Arc<AtomicBool>,
    live_bridges: usize,
    pending_spawns: Vec<PendingSpawn>,
}

impl Scheduler {
    /// Create a scheduler with default configuration.
    #[inline]
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    /// Create a scheduler with custom configuration.
    pub fn with_config(config: SchedulerConfig) -> Self {
        let (wake_tx, wake_rx) = unbounded();
        Self {
            config,
            tasks: IndexMap::new(),
            ready: VecDeque::new(),
            queued: HashSet::new(),
            timers: BinaryHeap::new(),
            postoffice: Postoffice::new(),
            tracker: SpawnTracker::new(),
            wake_tx,
            wake_rx,
            stop_flag: Arc::new(AtomicBool::new(false)),
            live_bridges: 0,
            pending_spawns: Vec::new(),
        }
    }

    /// Activate a cooperative task with no parent.
    pub fn activate(
        &mut self,
        def: TaskDef,
        behavior: impl Behavior + 'static,
    ) -> RuntimeResult<TaskId> {
        if self.stop_flag.load(Ordering::SeqCst) {
            return Err(RuntimeError::SchedulerStopped);
        }
        let id = next_task_id();
        self.install_task(id, def, Box::new(behavior), None)?;
        Ok(id)
    }

    /// Activate a thread bridge with no parent.
    pub fn activate_bridge(
        &mut self,
        def: TaskDef,
        work: impl BlockingWork,
    ) -> RuntimeResult<TaskId> {
        if self.stop_flag.load(Ordering::SeqCst) {
            return Err(RuntimeError::SchedulerStopped);
        }
        let id = next_task_id();
        self.install_bridge(id, def, Box::new(work), None)?;
        Ok(id)
    }

    fn make_boxes(
        def: &TaskDef,
    ) -> (
        IndexMap<String, Arc<Mailbox>>,
        IndexMap<String, Arc<Mailbox>>,
    ) {
        let mut inboxes = IndexMap::new();
        for name in DEFAULT_INBOXES {
            inboxes.insert(name.to_string(), Arc::new(Mailbox::new()));
        }
        for name in &def.extra_inboxes {
            inboxes.insert(name.clone(), Arc::new(Mailbox::new()));
        }
        let mut outboxes = IndexMap::new();
        for name in DEFAULT_OUTBOXES {
            outboxes.insert(name.to_string(), Arc::new(Mailbox::new()));
        }
        for name in &def.extra_outboxes {
            outboxes.insert(name.clone(), Arc::new(Mailbox::new()));
        }
        (inboxes, outboxes)
    }

    fn register_ports(
        &mut self,
        id: TaskId,
        inboxes: &IndexMap<String, Arc<Mailbox>>,
        outboxes: &IndexMap<String, Arc<Mailbox>>,
    ) {
        for (name, mbox) in inboxes {
            self.postoffice
                .register_port(id, name, MailboxDirection::Inbound, mbox.clone());
        }
        for (name, mbox) in outboxes {
            self.postoffice
                .register_port(id, name, MailboxDirection::Outbound, mbox.clone());
        }
    }

    fn install_task(
        &mut self,
        id: TaskId,
        def: TaskDef,
        behavior: Box<dyn Behavior>,
        parent: Option<TaskId>,
    ) -> RuntimeResult<()> {
        let (inboxes, outboxes) = Self::make_boxes(&def);
        self.register_ports(id, &inboxes, &outboxes);
        match parent {
            Some(parent) => self.tracker.register_child(parent, id)?,
            None => self.tracker.register_root(id),
        }
        let name = def.name.unwrap_or_else(|| format!("task({})", id.inner()));
        debug!("activating {} ({})", id, name);
        self.tasks.insert(
            id,
            TaskEntry {
                name,
                state: TaskState::Created,
                inboxes,
                outboxes,
                runner: Runner::Cooperative {
                    behavior: Some(behavior),
                },
            },
        );
        self.enqueue(id);
        Ok(())
    }

    fn install_bridge(
        &mut self,
        id: TaskId,
        def: TaskDef,
        work: Box<dyn BlockingWork>,
        parent: Option<TaskId>,
    ) -> RuntimeResult<()> {
        let (inboxes, outboxes) = Self::make_boxes(&def);
        self.register_ports(id, &inboxes, &outboxes);
        match parent {
            Some(parent) => self.tracker.register_child(parent, id)?,
            None => self.tracker.register_root(id),
        }
        let name = def.name.unwrap_or_else(|| format!("bridge({})", id.inner()));
        debug!("activating {} ({}) on its own thread", id, name);

        let done = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(AtomicBool::new(false));
        let io = BridgeIo::new(
            id,
            inboxes.clone(),
            outboxes.clone(),
            shutdown.clone(),
            self.wake_tx.clone(),
        );
        let handle = spawn_bridge_thread(id, io, work, done.clone());

        self.tasks.insert(
            id,
            TaskEntry {
                name,
                state: TaskState::Running,
                inboxes,
                outboxes,
                runner: Runner::Bridge(BridgeState {
                    handle: Some(handle),
                    done,
                    shutdown,
                    deadline: None,
                    written_off: false,
                }),
            },
        );
        self.live_bridges += 1;
        Ok(())
    }

    /// Push a runnable task onto the ready queue, at most once.
    fn enqueue(
        &mut self,
        id: TaskId,
    ) {
        if self.queued.insert(id) {
            self.ready.push_back(id);
        }
    }

    /// Make a paused task runnable again. No-op for bridges and tasks
    /// that have begun tearing down.
    fn wake(
        &mut self,
        id: TaskId,
    ) {
        let Some(entry) = self.tasks.get(&id) else {
            return;
        };
        if entry.state.is_terminal() || matches!(entry.runner, Runner::Bridge(_)) {
            return;
        }
        self.enqueue(id);
    }

    /// Current lifecycle state of a task. `None` once the task has been
    /// terminated and pruned, or if it was never known.
    pub fn state_of(
        &self,
        id: TaskId,
    ) -> Option<TaskState> {
        self.tasks.get(&id).map(|e| e.state)
    }

    /// Debug name of a task.
    pub fn name_of(
        &self,
        id: TaskId,
    ) -> Option<&str> {
        self.tasks.get(&id).map(|e| e.name.as_str())
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

    /// Snapshot of the current wiring.
    #[inline]
    pub fn wiring(&self) -> Vec<LinkInfo> {
        self.postoffice.links()
    }

    /// Register a task's inbox under a service name.
    pub fn register_service(
        &mut self,
        name: &str,
        task: TaskId,
        inbox: &str,
    ) -> RuntimeResult<()> {
        // Validate the endpoint now; service consumers should never see
        // a dangling address.
        self.postoffice.port(task, inbox)?;
        self.tracker.register_service(name, task, inbox)
    }

    /// Remove a registered service by name.
    #[inline]
    pub fn deregister_service(
        &mut self,
        name: &str,
    ) -> RuntimeResult<()> {
        self.tracker.deregister_service(name)
    }

    /// Look up the `(task, inbox)` behind a service name.
    #[inline]
    pub fn lookup_service(
        &self,
        name: &str,
    ) -> RuntimeResult<(TaskId, String)> {
        self.tracker.lookup_service(name)
    }

    /// Look up a port's mailbox by `(task, name)`, for external
    /// non-blocking access and introspection.
    #[inline]
    pub fn port(
        &self,
        task: TaskId,
        name: &str,
    ) -> RuntimeResult<Arc<Mailbox>> {
        self.postoffice.port(task, name)
    }

    /// Inject a message into a task's inbox from outside the graph and
    /// wake the task.
    pub fn send_to(
        &mut self,
        task: TaskId,
        inbox: &str,
        msg: impl Into<Message>,
    ) -> RuntimeResult<()> {
        let mbox = self.postoffice.port(task, inbox)?;
        mbox.send(msg.into());
        self.wake(task);
        Ok(())
    }

    /// Ask a task to terminate at its convenience.
    pub fn request_stop(
        &mut self,
        id: TaskId,
    ) -> RuntimeResult<()> {
        self.deliver_shutdown(id, Control::ShutdownRequested)
    }

    /// Ask a task to terminate as soon as safely possible.
    pub fn request_stop_now(
        &mut self,
        id: TaskId,
    ) -> RuntimeResult<()> {
        self.deliver_shutdown(id, Control::ShutdownNow)
    }

    fn deliver_shutdown(
        &mut self,
        id: TaskId,
        ctl: Control,
    ) -> RuntimeResult<()> {
        let grace = self.config.bridge_grace;
        let entry = self
            .tasks
            .get_mut(&id)
            .ok_or(RuntimeError::UnknownTask(id))?;
        if entry.state == TaskState::Terminated {
            return Ok(());
        }
        debug!("delivering {} to {}", ctl, id);
        if let Some(control) = entry.inboxes.get("control") {
            control.send(Message::control(ctl));
        }
        if let Runner::Bridge(bridge) = &mut entry.runner {
            bridge.shutdown.store(true, Ordering::SeqCst);
            if !bridge.written_off && bridge.deadline.is_none() {
                bridge.deadline = Some(Instant::now() + grace);
            }
        } else {
            self.wake(id);
        }
        Ok(())
    }

    /// Request the run loop to stop at the next boundary. Live bridges
    /// are asked to shut down so their threads can exit.
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        let bridges: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|(_, e)| matches!(e.runner, Runner::Bridge(_)) && !e.state.is_terminal())
            .map(|(id, _)| *id)
            .collect();
        for id in bridges {
            let _ = self.deliver_shutdown(id, Control::ShutdownNow);
        }
        debug!("stop requested");
    }

    /// True once `stop` has been called.
    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.stop_flag.load(Ordering::SeqCst)
    }

    /// Execute at most one task step, plus any pending event processing.
    pub fn tick(&mut self) -> RuntimeResult<TickOutcome> {
        if self.stop_flag.load(Ordering::SeqCst) {
            return Ok(TickOutcome::Quiescent);
        }

        self.drain_wake_events()?;
        self.check_bridge_deadlines()?;
        self.promote_timers();

        let Some(id) = self.pop_ready() else {
            return Ok(self.idle_outcome());
        };
        self.step_task(id)?;
        Ok(TickOutcome::Worked)
    }

    /// Run until the graph is quiescent or `stop` is called.
    ///
    /// Blocks on the bridge wake channel while idle, bounded by the next
    /// timer deadline and the configured idle poll interval, so paused
    /// graphs do not busy-spin.
    pub fn run(&mut self) -> RuntimeResult<()> {
        loop {
            if self.stop_flag.load(Ordering::SeqCst) {
                debug!("run loop stopping on request");
                return Ok(());
            }
            match self.tick()? {
                TickOutcome::Worked => {
                    if let Some(delay) = self.config.slowmo {
                        thread::sleep(delay);
                    }
                }
                TickOutcome::Idle => {
                    let timeout = self
                        .next_deadline()
                        .map(|t| t.saturating_duration_since(Instant::now()))
                        .map_or(self.config.idle_poll, |d| d.min(self.config.idle_poll));
                    if let Ok(event) = self.wake_rx.recv_timeout(timeout) {
                        self.handle_wake(event)?;
                    }
                    // On timeout the next tick re-checks timers and
                    // bridge deadlines.
                }
                TickOutcome::Quiescent => {
                    debug!("quiescent: run loop returning");
                    return Ok(());
                }
            }
        }
    }

    fn idle_outcome(&self) -> TickOutcome {
        if self.timers.is_empty() && self.live_bridges == 0 {
            TickOutcome::Quiescent
        } else {
            TickOutcome::Idle
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        let timer = self.timers.peek().map(|Reverse((t, _))| *t);
        let bridge = self
            .tasks
            .values()
            .filter_map(|e| match &e.runner {
                Runner::Bridge(b) if !b.done.load(Ordering::SeqCst) => b.deadline,
                _ => None,
            })
            .min();
        match (timer, bridge) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn drain_wake_events(&mut self) -> RuntimeResult<()> {
        let events: Vec<WakeEvent> = self.wake_rx.try_iter().collect();
        for event in events {
            self.handle_wake(event)?;
        }
        Ok(())
    }

    fn handle_wake(
        &mut self,
        event: WakeEvent,
    ) -> RuntimeResult<()> {
        match event {
            WakeEvent::Output(id) => {
                self.route_and_wake(id);
                Ok(())
            }
            WakeEvent::Done(id) => self.finish_bridge(id),
        }
    }

    fn check_bridge_deadlines(&mut self) -> RuntimeResult<()> {
        let now = Instant::now();
        let expired = self.tasks.iter().find_map(|(id, entry)| match &entry.runner {
            Runner::Bridge(bridge)
                if !bridge.written_off
                    && !bridge.done.load(Ordering::SeqCst)
                    && bridge.deadline.is_some_and(|d| now >= d) =>
            {
                Some(*id)
            }
            _ => None,
        });
        let Some(id) = expired else {
            return Ok(());
        };
        // Reported exactly once: after the write-off the rest of the
        // graph keeps running without this bridge.
        self.write_off_bridge(id)?;
        Err(RuntimeError::BridgeUnresponsive {
            task: id,
            grace: self.config.bridge_grace,
        })
    }

    /// Abandon a bridge that ignored its shutdown request: detach its
    /// thread, stop counting it as a live event source, and start the
    /// normal teardown cascade for its subtree.
    fn write_off_bridge(
        &mut self,
        id: TaskId,
    ) -> RuntimeResult<()> {
        let Some(entry) = self.tasks.get_mut(&id) else {
            return Ok(());
        };
        error!(
            "{} ({}) ignored shutdown past the {:?} grace period, detaching its thread",
            id, entry.name, self.config.bridge_grace
        );
        entry.state = TaskState::Terminating;
        if let Runner::Bridge(bridge) = &mut entry.runner {
            bridge.deadline = None;
            bridge.written_off = true;
            // Never joined: the thread is stuck in its blocking call.
            drop(bridge.handle.take());
        }
        self.live_bridges -= 1;

        self.tracker.mark_done(id)?;
        let children = self.tracker.children(id);
        if children.is_empty() {
            self.try_finalize(id)
        } else {
            for child in children {
                self.deliver_shutdown(child, Control::ShutdownRequested)?;
            }
            Ok(())
        }
    }

    fn promote_timers(&mut self) {
        let now = Instant::now();
        while let Some(&Reverse((deadline, id))) = self.timers.peek() {
            if deadline > now {
                break;
            }
            self.timers.pop();
            trace!("timer fired for {}", id);
            self.wake(id);
        }
    }

    fn pop_ready(&mut self) -> Option<TaskId> {
        while let Some(id) = self.ready.pop_front() {
            self.queued.remove(&id);
            match self.tasks.get(&id) {
                Some(entry) if !entry.state.is_terminal() => return Some(id),
                _ => continue, // terminated while queued
            }
        }
        None
    }

    /// Execute exactly one step of the given task and apply its
    /// disposition.
    fn step_task(
        &mut self,
        id: TaskId,
    ) -> RuntimeResult<()> {
        let result = {
            let Self {
                tasks,
                postoffice,
                pending_spawns,
                ..
            } = self;
            let Some(entry) = tasks.get_mut(&id) else {
                return Ok(());
            };
            let mut behavior = match &mut entry.runner {
                Runner::Cooperative { behavior } => match behavior.take() {
                    Some(behavior) => behavior,
                    None => return Ok(()),
                },
                // bridges never step on the scheduler thread
                Runner::Bridge(_) => return Ok(()),
            };
            if entry.state == TaskState::Created {
                trace!("{} first scheduled", id);
            }
            entry.state = TaskState::Running;

            let result = {
                let mut cx = TaskContext::new(
                    id,
                    &entry.inboxes,
                    &entry.outboxes,
                    postoffice,
                    pending_spawns,
                );
                behavior.step(&mut cx)
            };
            if let Runner::Cooperative { behavior: slot } = &mut entry.runner {
                *slot = Some(behavior);
            }
            result
        };

        self.route_and_wake(id);
        self.apply_pending_spawns(id)?;

        match result {
            Ok(Transition::Continue) => {
                self.enqueue(id);
            }
            Ok(Transition::Pause) => {
                // A message may have arrived during the step; losing that
                // wakeup would strand the task.
                if self.any_inbox_ready(id) {
                    self.enqueue(id);
                } else if let Some(entry) = self.tasks.get_mut(&id) {
                    entry.state = TaskState::Paused;
                }
            }
            Ok(Transition::Sleep(duration)) => {
                if let Some(entry) = self.tasks.get_mut(&id) {
                    entry.state = TaskState::Paused;
                }
                self.timers.push(Reverse((Instant::now() + duration, id)));
                trace!("{} sleeping for {:?}", id, duration);
            }
            Ok(Transition::Terminate) => {
                self.begin_teardown(id, None)?;
            }
            Err(fault) => {
                warn!("{} step faulted: {:#}", id, fault);
                self.begin_teardown(id, Some(fault))?;
            }
        }
        Ok(())
    }

    fn any_inbox_ready(
        &self,
        id: TaskId,
    ) -> bool {
        self.tasks
            .get(&id)
            .is_some_and(|e| e.inboxes.values().any(|m| m.peek_ready()))
    }

    fn route_and_wake(
        &mut self,
        id: TaskId,
    ) {
        let woken = self.postoffice.route_from(id);
        for dest in woken {
            self.wake(dest);
        }
    }

    fn apply_pending_spawns(
        &mut self,
        parent: TaskId,
    ) -> RuntimeResult<()> {
        // Activation order must match spawn order.
        for spawn in std::mem::take(&mut self.pending_spawns) {
            match spawn {
                PendingSpawn::Task { id, def, behavior } => {
                    self.install_task(id, def, behavior, Some(parent))?;
                }
                PendingSpawn::Bridge { id, def, work } => {
                    self.install_bridge(id, def, work, Some(parent))?;
                }
            }
        }
        Ok(())
    }

    /// A task finished its own work (or faulted): flush its output, emit
    /// the finished control message, and start the shutdown cascade.
    fn begin_teardown(
        &mut self,
        id: TaskId,
        fault: Option<anyhow::Error>,
    ) -> RuntimeResult<()> {
        let Some(entry) = self.tasks.get_mut(&id) else {
            return Ok(());
        };
        entry.state = TaskState::Terminating;
        debug!("{} ({}) terminating", id, entry.name);

        let farewell = match fault {
            Some(fault) => Control::TaskFailed {
                task: id,
                reason: format!("{fault:#}"),
            },
            None => Control::ProducerFinished,
        };
        if let Some(signal) = entry.outboxes.get("signal") {
            signal.send(Message::control(farewell));
        }
        self.route_and_wake(id);

        self.tracker.mark_done(id)?;
        let children = self.tracker.children(id);
        if children.is_empty() {
            self.try_finalize(id)
        } else {
            // Children get to flush before the parent is reported
            // finished.
            for child in children {
                self.deliver_shutdown(child, Control::ShutdownRequested)?;
            }
            Ok(())
        }
    }

    /// Finalize a task whose coordination node has become prunable, then
    /// walk up the spawn tree finalizing parents that were only waiting
    /// on their children.
    fn try_finalize(
        &mut self,
        id: TaskId,
    ) -> RuntimeResult<()> {
        let mut current = Some(id);
        while let Some(task) = current {
            if !self.tracker.prunable(task) {
                break;
            }
            if let Some(entry) = self.tasks.shift_remove(&task) {
                if let Runner::Bridge(mut bridge) = entry.runner {
                    if let Some(handle) = bridge.handle.take() {
                        // Only reached after the done flag is set, so
                        // this join does not block the loop.
                        let _ = handle.join();
                    }
                    // A written-off bridge already gave up its live slot.
                    if !bridge.written_off {
                        self.live_bridges -= 1;
                    }
                }
            }
            self.postoffice.unregister_task(task);
            self.tracker.deregister_services_of(task);
            let parent = self.tracker.prune(task)?;
            debug!("{} terminated", task);

            current = match parent {
                Some(parent) => {
                    let waiting = self
                        .tasks
                        .get(&parent)
                        .is_some_and(|e| e.state == TaskState::Terminating);
                    if waiting {
                        Some(parent)
                    } else {
                        // A parent paused waiting on its children gets a
                        // wakeup when one of them goes away.
                        self.wake(parent);
                        None
                    }
                }
                None => None,
            };
        }
        Ok(())
    }

    /// A bridge's work function returned: route its farewell signal and
    /// run the same teardown path as a cooperative task.
    fn finish_bridge(
        &mut self,
        id: TaskId,
    ) -> RuntimeResult<()> {
        let Some(entry) = self.tasks.get_mut(&id) else {
            return Ok(());
        };
        if entry.state.is_terminal() {
            return Ok(());
        }
        entry.state = TaskState::Terminating;
        debug!("{} ({}) bridge finished", id, entry.name);
        self.route_and_wake(id);

        self.tracker.mark_done(id)?;
        let children = self.tracker.children(id);
        if children.is_empty() {
            self.try_finalize(id)
        } else {
            for child in children {
                self.deliver_shutdown(child, Control::ShutdownRequested)?;
            }
            Ok(())
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if !self.is_stopped() {
            self.stop();
        }
    }
}
