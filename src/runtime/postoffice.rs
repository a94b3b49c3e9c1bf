//! Postoffice: the linkage registry.
//!
//! Resolves `(task, port name)` addresses to mailboxes and carries
//! messages along declared linkages - directed edges from one task's
//! outbox to another task's inbox. Wiring errors are reported
//! synchronously to the caller; nothing here is deferred.
//!
//! Ordering within a single linkage is preserved. Ordering across
//! independent linkages is unspecified (routing walks tasks in activation
//! order, but callers must not rely on it).
//!
//! In-flight policy: removing a linkage discards any messages still
//! queued in the source outbox (at-most-once per link). Messages already
//! transferred to the destination inbox stay there.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::{debug, trace};

use super::errors::{RuntimeError, RuntimeResult};
use super::mailbox::{Mailbox, MailboxDirection};
use super::task::TaskId;

/// Handle to a linkage, used to remove it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(pub u64);

impl fmt::Display for LinkId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "link({})", self.0)
    }
}

/// Introspection snapshot of one linkage.
#[derive(Debug, Clone)]
pub struct LinkInfo {
    /// The linkage handle.
    pub id: LinkId,
    /// Source `(task, outbox)`.
    pub source: (TaskId, String),
    /// Destination `(task, inbox)`.
    pub dest: (TaskId, String),
}

struct PortEntry {
    mailbox: Arc<Mailbox>,
    direction: MailboxDirection,
}

struct LinkEdge {
    id: LinkId,
    dest: (TaskId, String),
}

/// Registry of named ports and the linkages between them.
#[derive(Default)]
pub struct Postoffice {
    ports: IndexMap<(TaskId, String), PortEntry>,
    owners: HashSet<TaskId>,
    outboxes_of: HashMap<TaskId, SmallVec<[String; 4]>>,
    /// Keyed by source: at most one outgoing linkage per outbox.
    links: IndexMap<(TaskId, String), LinkEdge>,
    by_id: HashMap<LinkId, (TaskId, String)>,
    next_link: u64,
}

impl Postoffice {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named port under a task's identity.
    pub(crate) fn register_port(
        &mut self,
        task: TaskId,
        name: &str,
        direction: MailboxDirection,
        mailbox: Arc<Mailbox>,
    ) {
        self.owners.insert(task);
        if direction == MailboxDirection::Outbound {
            self.outboxes_of.entry(task).or_default().push(name.to_string());
        }
        self.ports
            .insert((task, name.to_string()), PortEntry { mailbox, direction });
    }

    /// Look up a port's mailbox by `(task, name)`.
    pub fn port(
        &self,
        task: TaskId,
        name: &str,
    ) -> RuntimeResult<Arc<Mailbox>> {
        self.resolve(task, name).map(|entry| entry.mailbox.clone())
    }

    fn resolve(
        &self,
        task: TaskId,
        name: &str,
    ) -> RuntimeResult<&PortEntry> {
        if !self.owners.contains(&task) {
            return Err(RuntimeError::UnknownTask(task));
        }
        self.ports
            .get(&(task, name.to_string()))
            .ok_or_else(|| RuntimeError::UnknownPort {
                task,
                name: name.to_string(),
            })
    }

    /// Create a linkage from an outbox to an inbox.
    ///
    /// Endpoints are validated now; unknown tasks or ports fail
    /// synchronously. An outbox that is already linked has its edge
    /// replaced (last-writer-wins for wiring; messages already delivered
    /// are unaffected). Fan-in is allowed: many sources may feed one inbox.
    pub fn link(
        &mut self,
        source: (TaskId, &str),
        dest: (TaskId, &str),
    ) -> RuntimeResult<LinkId> {
        let src_entry = self.resolve(source.0, source.1)?;
        if src_entry.direction != MailboxDirection::Outbound {
            return Err(RuntimeError::WrongPortDirection {
                task: source.0,
                name: source.1.to_string(),
                expected: MailboxDirection::Outbound,
            });
        }
        let dst_entry = self.resolve(dest.0, dest.1)?;
        if dst_entry.direction != MailboxDirection::Inbound {
            return Err(RuntimeError::WrongPortDirection {
                task: dest.0,
                name: dest.1.to_string(),
                expected: MailboxDirection::Inbound,
            });
        }

        let id = LinkId(self.next_link);
        self.next_link += 1;

        let key = (source.0, source.1.to_string());
        if let Some(old) = self.links.insert(
            key.clone(),
            LinkEdge {
                id,
                dest: (dest.0, dest.1.to_string()),
            },
        ) {
            self.by_id.remove(&old.id);
            debug!(
                "relinked {}:{} away from {}:{}",
                source.0, source.1, old.dest.0, old.dest.1
            );
        }
        self.by_id.insert(id, key);

        debug!(
            "{} wired {}:{} -> {}:{}",
            id, source.0, source.1, dest.0, dest.1
        );
        Ok(id)
    }

    /// Remove a linkage. Idempotent: removing a linkage that no longer
    /// exists is a no-op.
    pub fn unlink(
        &mut self,
        link: LinkId,
    ) {
        let Some(source) = self.by_id.remove(&link) else {
            return;
        };
        self.links.shift_remove(&source);
        // Discard messages the link never carried.
        if let Some(entry) = self.ports.get(&source) {
            let dropped = entry.mailbox.clear();
            if dropped > 0 {
                debug!("{} removed, discarding {} queued messages", link, dropped);
            } else {
                debug!("{} removed", link);
            }
        }
    }

    /// Remove every linkage touching the given task.
    pub(crate) fn unlink_task(
        &mut self,
        task: TaskId,
    ) {
        let doomed: Vec<LinkId> = self
            .links
            .iter()
            .filter(|(src, edge)| src.0 == task || edge.dest.0 == task)
            .map(|(_, edge)| edge.id)
            .collect();
        for link in doomed {
            self.unlink(link);
        }
    }

    /// Tear down a destroyed task: all its linkages and ports go away.
    pub(crate) fn unregister_task(
        &mut self,
        task: TaskId,
    ) {
        self.unlink_task(task);
        self.ports.retain(|(owner, _), _| *owner != task);
        self.outboxes_of.remove(&task);
        self.owners.remove(&task);
        trace!("{} ports unregistered", task);
    }

    /// Transfer queued messages from every outbox of `task` along its
    /// linkages, preserving per-link order.
    ///
    /// Returns the owners of destination inboxes that received at least
    /// one message, so the scheduler can wake them.
    pub(crate) fn route_from(
        &mut self,
        task: TaskId,
    ) -> SmallVec<[TaskId; 4]> {
        let mut woken: SmallVec<[TaskId; 4]> = SmallVec::new();
        let Some(names) = self.outboxes_of.get(&task) else {
            return woken;
        };
        for name in names {
            let key = (task, name.clone());
            let Some(edge) = self.links.get(&key) else {
                continue;
            };
            let Some(src) = self.ports.get(&key) else {
                continue;
            };
            let Some(dst) = self.ports.get(&edge.dest) else {
                continue;
            };
            let moved = src.mailbox.drain_into(&dst.mailbox);
            if moved > 0 {
                trace!("{} messages {}:{} -> {}:{}", moved, task, name, edge.dest.0, edge.dest.1);
                if !woken.contains(&edge.dest.0) {
                    woken.push(edge.dest.0);
                }
            }
        }
        woken
    }

    /// Snapshot of the current wiring, for introspection and debugging.
    pub fn links(&self) -> Vec<LinkInfo> {
        self.links
            .iter()
            .map(|(source, edge)| LinkInfo {
                id: edge.id,
                source: source.clone(),
                dest: edge.dest.clone(),
            })
            .collect()
    }

    /// True if the linkage still exists.
    #[inline]
    pub fn is_linked(
        &self,
        link: LinkId,
    ) -> bool {
        self.by_id.contains_key(&link)
    }
}
