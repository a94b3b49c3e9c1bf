//! Control-message vocabulary.
//!
//! A small closed set of typed control messages flows through the same
//! ports as ordinary data. Components forward the control message they
//! received out of their `"signal"` outbox when they terminate, so
//! shutdown can cascade along wiring chains.

use std::any::Any;
use std::fmt;

use super::task::TaskId;

/// Control messages understood by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    /// No more output will ever be sent on this link.
    ProducerFinished,
    /// Please terminate at your convenience.
    ShutdownRequested,
    /// Terminate as soon as safely possible.
    ShutdownNow,
    /// A task step faulted; carries the error payload.
    TaskFailed {
        /// The task that faulted.
        task: TaskId,
        /// Rendered fault message.
        reason: String,
    },
}

impl Control {
    /// True for either shutdown request flavour.
    #[inline]
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Control::ShutdownRequested | Control::ShutdownNow)
    }
}

impl fmt::Display for Control {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Control::ProducerFinished => write!(f, "producer-finished"),
            Control::ShutdownRequested => write!(f, "shutdown-requested"),
            Control::ShutdownNow => write!(f, "shutdown-now"),
            Control::TaskFailed { task, reason } => {
                write!(f, "task-failed({task}: {reason})")
            }
        }
    }
}

/// A message travelling through a port.
///
/// Data payloads are opaque to the runtime; control messages are typed.
pub enum Message {
    /// Arbitrary payload.
    Data(Box<dyn Any + Send>),
    /// Runtime control message.
    Control(Control),
}

impl Message {
    /// Wrap an arbitrary value as a data message.
    #[inline]
    pub fn data<T: Any + Send>(value: T) -> Self {
        Message::Data(Box::new(value))
    }

    /// Wrap a control message.
    #[inline]
    pub fn control(ctl: Control) -> Self {
        Message::Control(ctl)
    }

    /// Borrow the control message, if this is one.
    #[inline]
    pub fn as_control(&self) -> Option<&Control> {
        match self {
            Message::Control(ctl) => Some(ctl),
            Message::Data(_) => None,
        }
    }

    /// Borrow the data payload as `T`, if this is a data message of that type.
    #[inline]
    pub fn downcast_data<T: Any>(&self) -> Option<&T> {
        match self {
            Message::Data(payload) => payload.downcast_ref::<T>(),
            Message::Control(_) => None,
        }
    }

    /// True if this is a shutdown control message.
    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.as_control().is_some_and(Control::is_shutdown)
    }
}

impl fmt::Debug for Message {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Message::Data(_) => f.write_str("Message::Data(..)"),
            Message::Control(ctl) => write!(f, "Message::Control({ctl})"),
        }
    }
}

impl From<Control> for Message {
    fn from(ctl: Control) -> Self {
        Message::Control(ctl)
    }
}
