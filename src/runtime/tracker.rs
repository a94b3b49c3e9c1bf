//! Spawn tracker: the shutdown coordination tree.
//!
//! One node per task in a forest keyed by task id. A parent's node keeps
//! lookup-only references to its children - it never owns their lifetime,
//! it only sequences shutdown: a node cannot be pruned while any child
//! node remains, so teardown collapses the spawn tree depth-first,
//! leaves-first. No parent is ever reported finished while a descendant
//! is still live, even one running on a bridge thread.
//!
//! The tracker also carries the named service registry, so a component can
//! offer a well-known inbox for others to wire to without holding a
//! reference to it.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use tracing::{debug, error};

use super::errors::{RuntimeError, RuntimeResult};
use super::task::TaskId;

#[derive(Debug)]
struct Node {
    parent: Option<TaskId>,
    children: HashSet<TaskId>,
    done: bool,
}

/// Parent/child bookkeeping for shutdown sequencing.
#[derive(Debug, Default)]
pub struct SpawnTracker {
    nodes: HashMap<TaskId, Node>,
    services: IndexMap<String, (TaskId, String)>,
}

impl SpawnTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a task with no parent.
    pub(crate) fn register_root(
        &mut self,
        id: TaskId,
    ) {
        self.nodes.insert(
            id,
            Node {
                parent: None,
                children: HashSet::new(),
                done: false,
            },
        );
    }

    /// Record a dynamically spawned child under its parent.
    pub(crate) fn register_child(
        &mut self,
        parent: TaskId,
        child: TaskId,
    ) -> RuntimeResult<()> {
        let parent_node = self
            .nodes
            .get_mut(&parent)
            .ok_or(RuntimeError::UnknownTask(parent))?;
        parent_node.children.insert(child);
        self.nodes.insert(
            child,
            Node {
                parent: Some(parent),
                children: HashSet::new(),
                done: false,
            },
        );
        debug!("{} spawned {}", parent, child);
        Ok(())
    }

    /// Mark a task's own work as finished. The node is retained until all
    /// of its children have been pruned.
    pub(crate) fn mark_done(
        &mut self,
        id: TaskId,
    ) -> RuntimeResult<()> {
        let node = self.nodes.get_mut(&id).ok_or(RuntimeError::UnknownTask(id))?;
        node.done = true;
        Ok(())
    }

    /// True once the task is done and has no remaining children.
    pub fn prunable(
        &self,
        id: TaskId,
    ) -> bool {
        self.nodes
            .get(&id)
            .is_some_and(|n| n.done && n.children.is_empty())
    }

    /// Remove a prunable node, detaching it from its parent.
    ///
    /// Returns the parent id so the caller can re-check whether the
    /// parent became prunable in turn. A recorded parent whose node has
    /// vanished means spawn bookkeeping was corrupted; that is fatal
    /// since it would break shutdown ordering.
    pub(crate) fn prune(
        &mut self,
        id: TaskId,
    ) -> RuntimeResult<Option<TaskId>> {
        debug_assert!(self.prunable(id), "prune called on a live node");
        let Some(node) = self.nodes.remove(&id) else {
            return Ok(None);
        };
        let Some(parent) = node.parent else {
            return Ok(None);
        };
        match self.nodes.get_mut(&parent) {
            Some(parent_node) => {
                parent_node.children.remove(&id);
                Ok(Some(parent))
            }
            None => {
                error!("coordination tree corrupted: {} has no node for parent {}", id, parent);
                Err(RuntimeError::TrackerCorrupted { child: id, parent })
            }
        }
    }

    /// The task's live children, if any.
    pub fn children(
        &self,
        id: TaskId,
    ) -> Vec<TaskId> {
        self.nodes
            .get(&id)
            .map(|n| n.children.iter().copied().collect())
            .unwrap_or_default()
    }

    /// The task's parent, if it was spawned by another task.
    #[inline]
    pub fn parent(
        &self,
        id: TaskId,
    ) -> Option<TaskId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    /// True while the task has a node in the tree.
    #[inline]
    pub fn contains(
        &self,
        id: TaskId,
    ) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Register a named inbox as a service other components can look up.
    pub(crate) fn register_service(
        &mut self,
        name: &str,
        task: TaskId,
        inbox: &str,
    ) -> RuntimeResult<()> {
        if self.services.contains_key(name) {
            return Err(RuntimeError::DuplicateService(name.to_string()));
        }
        self.services
            .insert(name.to_string(), (task, inbox.to_string()));
        debug!("service {:?} -> {}:{}", name, task, inbox);
        Ok(())
    }

    /// Remove a registered service.
    pub(crate) fn deregister_service(
        &mut self,
        name: &str,
    ) -> RuntimeResult<()> {
        self.services
            .shift_remove(name)
            .map(|_| ())
            .ok_or_else(|| RuntimeError::UnknownService(name.to_string()))
    }

    /// Look up the `(task, inbox)` behind a service name.
    pub fn lookup_service(
        &self,
        name: &str,
    ) -> RuntimeResult<(TaskId, String)> {
        self.services
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::UnknownService(name.to_string()))
    }

    /// Drop all services registered by the given task.
    pub(crate) fn deregister_services_of(
        &mut self,
        task: TaskId,
    ) {
        self.services.retain(|_, (owner, _)| *owner != task);
    }
}
