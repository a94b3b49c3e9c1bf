//! Weft Cooperative Component Runtime
//!
//! A runtime for graphs of small communicating components: resumable
//! tasks with named message ports, wired together by a postoffice and
//! driven round-robin by a single-threaded scheduler. Blocking work
//! runs behind thread bridges that present the same port interface.
//!
//! # Example
//!
//! ```
//! use weft::runtime::{Message, Scheduler, TaskContext, TaskDef, Transition};
//!
//! let mut sched = Scheduler::new();
//!
//! let sink = sched
//!     .activate(TaskDef::new().name("sink"), |cx: &mut TaskContext<'_>| {
//!         while let Some(msg) = cx.recv("inbox")? {
//!             if let Some(n) = msg.downcast_data::<u32>() {
//!                 println!("got {n}");
//!             }
//!         }
//!         if cx.recv("control")?.is_some() {
//!             return Ok(Transition::Terminate);
//!         }
//!         Ok(Transition::Pause)
//!     })
//!     .unwrap();
//!
//! let mut n = 0u32;
//! let source = sched
//!     .activate(TaskDef::new().name("source"), move |cx: &mut TaskContext<'_>| {
//!         n += 1;
//!         cx.send("outbox", Message::data(n))?;
//!         if n == 3 {
//!             Ok(Transition::Terminate)
//!         } else {
//!             Ok(Transition::Continue)
//!         }
//!     })
//!     .unwrap();
//!
//! sched.link((source, "outbox"), (sink, "inbox")).unwrap();
//! sched.link((source, "signal"), (sink, "control")).unwrap();
//! sched.run().unwrap();
//! ```

#![doc(html_root_url = "https://docs.rs/weft")]
#![warn(rust_2018_idioms)]

// Public modules
pub mod runtime;

// Utility modules
pub mod util;

// Re-exports
pub use runtime::{
    Behavior, BlockingWork, BridgeIo, Control, LinkId, Message, RuntimeError, RuntimeResult,
    Scheduler, SchedulerConfig, TaskContext, TaskDef, TaskId, TaskState, TickOutcome, Transition,
};

/// Runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Runtime name
pub const NAME: &str = "Weft";
