//! Runtime system
//!
//! This module contains the task model, message ports, wiring, and the
//! cooperative scheduler.

pub mod bridge;
pub mod errors;
pub mod ipc;
pub mod mailbox;
pub mod postoffice;
pub mod scheduler;
pub mod task;
pub mod tracker;

pub use bridge::{BlockingWork, BridgeIo};
pub use errors::{RuntimeError, RuntimeResult};
pub use ipc::{Control, Message};
pub use mailbox::{Mailbox, MailboxDirection};
pub use postoffice::{LinkId, LinkInfo, Postoffice};
pub use scheduler::{Scheduler, SchedulerConfig, TickOutcome};
pub use task::{Behavior, TaskContext, TaskDef, TaskId, TaskState, Transition};
pub use tracker::SpawnTracker;
