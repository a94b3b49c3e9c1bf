//! Thread bridge: blocking work behind the port interface.
//!
//! A bridge runs a blocking unit of work on its own OS thread while
//! exposing the same named mailboxes as a cooperative task, so it can be
//! wired into the graph and tracked in the coordination tree like any
//! other task. The shared mailboxes are the only state crossing the
//! thread boundary; `send`/`try_recv` stay non-blocking on the
//! cooperative side.
//!
//! Shutdown is cooperative here too: the work function is expected to
//! poll [`BridgeIo::shutdown_requested`] (or use the timeout receive) and
//! return at its next safe point. A bridge that ignores shutdown past the
//! configured grace period is a fatal condition reported by the
//! scheduler - the runtime does not guess how to reclaim an
//! uncooperative thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::Sender;
use indexmap::IndexMap;
use tracing::{debug, error};

use super::errors::{RuntimeError, RuntimeResult};
use super::ipc::{Control, Message};
use super::mailbox::Mailbox;
use super::task::TaskId;

/// Events bridge threads push to the scheduler's wake channel.
#[derive(Debug, Clone, Copy)]
pub(crate) enum WakeEvent {
    /// A bridge produced output that needs routing.
    Output(TaskId),
    /// A bridge's work function returned.
    Done(TaskId),
}

/// A blocking unit of work adapted to the port/message model.
pub trait BlockingWork: Send + 'static {
    /// Run to completion on the bridge thread.
    ///
    /// May block freely, but must observe shutdown: check
    /// [`BridgeIo::shutdown_requested`] between blocking operations and
    /// return once it reports true.
    fn run(
        &mut self,
        io: &BridgeIo,
    ) -> anyhow::Result<()>;
}

impl<F> BlockingWork for F
where
    F: FnMut(&BridgeIo) -> anyhow::Result<()> + Send + 'static,
{
    fn run(
        &mut self,
        io: &BridgeIo,
    ) -> anyhow::Result<()> {
        self(io)
    }
}

/// Thread-side access to a bridge's mailboxes.
pub struct BridgeIo {
    id: TaskId,
    inboxes: IndexMap<String, Arc<Mailbox>>,
    outboxes: IndexMap<String, Arc<Mailbox>>,
    shutdown: Arc<AtomicBool>,
    wake_tx: Sender<WakeEvent>,
}

impl BridgeIo {
    pub(crate) fn new(
        id: TaskId,
        inboxes: IndexMap<String, Arc<Mailbox>>,
        outboxes: IndexMap<String, Arc<Mailbox>>,
        shutdown: Arc<AtomicBool>,
        wake_tx: Sender<WakeEvent>,
    ) -> Self {
        Self {
            id,
            inboxes,
            outboxes,
            shutdown,
            wake_tx,
        }
    }

    /// This bridge's task id.
    #[inline]
    pub fn id(&self) -> TaskId {
        self.id
    }

    fn inbox(
        &self,
        name: &str,
    ) -> RuntimeResult<&Arc<Mailbox>> {
        self.inboxes.get(name).ok_or_else(|| RuntimeError::UnknownPort {
            task: self.id,
            name: name.to_string(),
        })
    }

    /// Pop the head message of the named inbox without blocking.
    pub fn try_recv(
        &self,
        inbox: &str,
    ) -> RuntimeResult<Option<Message>> {
        Ok(self.inbox(inbox)?.try_recv())
    }

    /// Blocking receive with a timeout; the idiomatic bridge loop is
    /// `recv_timeout` + a shutdown check per iteration.
    pub fn recv_timeout(
        &self,
        inbox: &str,
        timeout: Duration,
    ) -> RuntimeResult<Option<Message>> {
        Ok(self.inbox(inbox)?.recv_timeout(timeout))
    }

    /// True if the named inbox has a message queued.
    pub fn data_ready(
        &self,
        inbox: &str,
    ) -> bool {
        self.inboxes.get(inbox).is_some_and(|m| m.peek_ready())
    }

    /// Append a message to the named outbox and nudge the scheduler to
    /// route it. Non-blocking.
    pub fn send(
        &self,
        outbox: &str,
        msg: impl Into<Message>,
    ) -> RuntimeResult<()> {
        let mbox = self.outboxes.get(outbox).ok_or_else(|| RuntimeError::UnknownPort {
            task: self.id,
            name: outbox.to_string(),
        })?;
        mbox.send(msg.into());
        // The scheduler may already be gone during teardown; that is fine.
        let _ = self.wake_tx.send(WakeEvent::Output(self.id));
        Ok(())
    }

    /// True once the scheduler has asked this bridge to terminate, or a
    /// shutdown control message is waiting in the control inbox.
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
            || self
                .inboxes
                .get("control")
                .is_some_and(|m| m.contains_shutdown())
    }
}

/// Spawn the OS thread driving a bridge's work function.
///
/// The wrapper emits the finished (or failed) control message on the
/// bridge's `"signal"` outbox, then flags completion and wakes the
/// scheduler.
pub(crate) fn spawn_bridge_thread(
    id: TaskId,
    io: BridgeIo,
    mut work: Box<dyn BlockingWork>,
    done: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name(format!("weft-bridge-{}", id.inner()))
        .spawn(move || {
            debug!("{} bridge thread started", id);
            match work.run(&io) {
                Ok(()) => {
                    let _ = io.send("signal", Control::ProducerFinished);
                }
                Err(fault) => {
                    error!("{} bridge work failed: {:#}", id, fault);
                    let _ = io.send(
                        "signal",
                        Control::TaskFailed {
                            task: id,
                            reason: format!("{fault:#}"),
                        },
                    );
                }
            }
            done.store(true, Ordering::SeqCst);
            let _ = io.wake_tx.send(WakeEvent::Done(id));
            debug!("{} bridge thread exiting", id);
        })
        .expect("Failed to spawn bridge thread")
}
