//! Mailbox: a named, directional, FIFO message queue.
//!
//! Every task owns a fixed set of mailboxes created with it. A mailbox is
//! unbounded and insertion-ordered; `send` never blocks and `try_recv`
//! never blocks. There is deliberately no backpressure at this layer -
//! flow control, where needed, belongs to the components wired on top.
//!
//! The queue is the single piece of state shared between the scheduler
//! thread and bridge threads, so it is protected by a mutex and carries a
//! condvar so a bridge thread can park on an empty inbox.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use super::ipc::Message;

/// Which way messages flow through a mailbox, from its owner's view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxDirection {
    /// Messages arrive here; the owner consumes them.
    Inbound,
    /// The owner produces messages here; linkages carry them away.
    Outbound,
}

impl fmt::Display for MailboxDirection {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(match self {
            MailboxDirection::Inbound => "inbound",
            MailboxDirection::Outbound => "outbound",
        })
    }
}

/// A FIFO, unbounded message queue owned by one task.
#[derive(Debug, Default)]
pub struct Mailbox {
    queue: Mutex<VecDeque<Message>>,
    arrived: Condvar,
}

impl Mailbox {
    /// Create a new empty mailbox.
    #[inline]
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            arrived: Condvar::new(),
        }
    }

    /// Append a message to the tail. Never blocks, never fails.
    pub fn send(
        &self,
        msg: Message,
    ) {
        let mut queue = self.queue.lock();
        queue.push_back(msg);
        self.arrived.notify_all();
    }

    /// Remove and return the head message, or `None` if empty.
    #[inline]
    pub fn try_recv(&self) -> Option<Message> {
        self.queue.lock().pop_front()
    }

    /// True if at least one message is queued.
    #[inline]
    pub fn peek_ready(&self) -> bool {
        !self.queue.lock().is_empty()
    }

    /// Number of queued messages.
    #[inline]
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// True if no messages are queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Blocking receive with a timeout.
    ///
    /// Only bridge threads use this; the cooperative side must stick to
    /// `try_recv`.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> Option<Message> {
        let mut queue = self.queue.lock();
        if let Some(msg) = queue.pop_front() {
            return Some(msg);
        }
        self.arrived.wait_for(&mut queue, timeout);
        queue.pop_front()
    }

    /// True if a shutdown control message is anywhere in the queue.
    ///
    /// Non-destructive: used by bridges to observe a pending shutdown
    /// without consuming data queued ahead of it.
    pub fn contains_shutdown(&self) -> bool {
        self.queue.lock().iter().any(Message::is_shutdown)
    }

    /// Move every queued message into `dst`, preserving order.
    ///
    /// Returns the number of messages transferred. This is the linkage
    /// transfer primitive; per-link FIFO order follows from it.
    pub fn drain_into(
        &self,
        dst: &Mailbox,
    ) -> usize {
        let mut src = self.queue.lock();
        if src.is_empty() {
            return 0;
        }
        let moved = src.len();
        {
            let mut dst_queue = dst.queue.lock();
            dst_queue.extend(src.drain(..));
        }
        dst.arrived.notify_all();
        moved
    }

    /// Discard all queued messages, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let mut queue = self.queue.lock();
        let dropped = queue.len();
        queue.clear();
        dropped
    }
}
