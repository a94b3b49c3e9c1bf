//! Property tests for message delivery using proptest.

use std::sync::Arc;

use parking_lot::Mutex;
use proptest::prelude::*;
use weft::{BridgeIo, Message, Scheduler, TaskContext, TaskDef, Transition};

fn collector(
    log: Arc<Mutex<Vec<u32>>>,
) -> impl FnMut(&mut TaskContext<'_>) -> anyhow::Result<Transition> {
    move |cx| {
        while let Some(msg) = cx.recv("inbox")? {
            if let Some(n) = msg.downcast_data::<u32>() {
                log.lock().push(*n);
            }
        }
        if cx.recv("control")?.is_some() {
            return Ok(Transition::Terminate);
        }
        Ok(Transition::Pause)
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Whatever a source sends over one link arrives complete and in
    /// order, regardless of payload count or batching.
    #[test]
    fn link_delivery_is_fifo_and_lossless(
        values in prop::collection::vec(any::<u32>(), 0..64),
        batch in 1usize..8,
    ) {
        let mut sched = Scheduler::new();
        let collected = Arc::new(Mutex::new(Vec::new()));
        let sink = sched
            .activate(TaskDef::new(), collector(collected.clone()))
            .unwrap();

        let to_send = values.clone();
        let mut cursor = 0usize;
        let source = sched
            .activate(TaskDef::new(), move |cx: &mut TaskContext<'_>| {
                // Send a batch per step to vary routing interleavings.
                for _ in 0..batch {
                    if cursor == to_send.len() {
                        return Ok(Transition::Terminate);
                    }
                    cx.send("outbox", Message::data(to_send[cursor]))?;
                    cursor += 1;
                }
                Ok(Transition::Continue)
            })
            .unwrap();

        sched.link((source, "outbox"), (sink, "inbox")).unwrap();
        sched.link((source, "signal"), (sink, "control")).unwrap();

        sched.run().unwrap();
        prop_assert_eq!(&*collected.lock(), &values);
    }

    /// FIFO order survives the thread boundary of a bridge.
    #[test]
    fn bridge_delivery_is_fifo_and_lossless(
        values in prop::collection::vec(any::<u32>(), 0..64),
    ) {
        let mut sched = Scheduler::new();
        let collected = Arc::new(Mutex::new(Vec::new()));
        let sink = sched
            .activate(TaskDef::new(), collector(collected.clone()))
            .unwrap();

        let to_send = values.clone();
        let bridge = sched
            .activate_bridge(TaskDef::new(), move |io: &BridgeIo| {
                for n in &to_send {
                    io.send("outbox", Message::data(*n))?;
                }
                Ok(())
            })
            .unwrap();

        sched.link((bridge, "outbox"), (sink, "inbox")).unwrap();
        sched.link((bridge, "signal"), (sink, "control")).unwrap();

        sched.run().unwrap();
        prop_assert_eq!(&*collected.lock(), &values);
    }
}
