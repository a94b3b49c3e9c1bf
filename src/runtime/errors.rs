//! Runtime errors.

use std::time::Duration;

use thiserror::Error;

use super::mailbox::MailboxDirection;
use super::task::TaskId;

/// Runtime result
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Runtime errors
///
/// Wiring errors are reported synchronously to the caller performing the
/// wiring operation. `TrackerCorrupted` and `BridgeUnresponsive` are fatal
/// invariant violations; the runtime never retries anything on its own.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Unknown task: {0}")]
    UnknownTask(TaskId),

    #[error("Unknown port {name:?} on {task}")]
    UnknownPort {
        /// The task that was addressed.
        task: TaskId,
        /// The port name that failed to resolve.
        name: String,
    },

    #[error("Port {name:?} on {task} is not {expected}")]
    WrongPortDirection {
        /// The task that owns the port.
        task: TaskId,
        /// The port that resolved with the other direction.
        name: String,
        /// The direction the operation required.
        expected: MailboxDirection,
    },

    #[error("Service already registered: {0:?}")]
    DuplicateService(String),

    #[error("Unknown service: {0:?}")]
    UnknownService(String),

    #[error("Coordination tree corrupted: {child} reported termination but parent {parent} has no node")]
    TrackerCorrupted {
        /// The child whose termination could not be recorded.
        child: TaskId,
        /// The parent recorded at spawn time.
        parent: TaskId,
    },

    #[error("Bridge {task} ignored shutdown for longer than {grace:?}")]
    BridgeUnresponsive {
        /// The unresponsive bridge task.
        task: TaskId,
        /// The configured grace period that elapsed.
        grace: Duration,
    },

    #[error("Scheduler has been stopped")]
    SchedulerStopped,
}
