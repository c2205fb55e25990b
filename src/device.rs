//! Owned aggregate of the queues and router, plus the loop-side processing
//! steps.
//!
//! On the target hardware the queues and application state sit between
//! interrupt handlers and the main loop. Instead of file-scope globals the
//! whole arrangement is one owned value: the receive path hands frames in
//! through [`DeviceContext::frame_received`], and the polling loop calls the
//! `process_*` methods in sequence.
//!
//! Concurrency contract (single core, no threads):
//!
//! - `frame_received` is the interrupt-context entry. It must never block,
//!   so it only performs a bounded push; when the receive queue is full the
//!   frame is dropped with no retry.
//! - The loop pops the receive queue one frame at a time; on real hardware
//!   interrupts are masked only for the duration of that pop, and the frame
//!   is then processed with interrupts enabled. There is exactly one
//!   consumer, so the core needs no further synchronization.
//! - The transmit queue is written and drained only by the loop. A frame is
//!   removed only after the hardware mailbox accepts it; when no mailbox is
//!   free the drain stops and retries on the next loop iteration.
//!
//! Tests exercise the same contract by direct sequential calls; no real
//! interrupts are required.

use crate::battery::SocEstimator;
use crate::frame::CanFrame;
use crate::queue::{FrameQueue, QUEUE_CAPACITY};
use crate::router::MessageRouter;

/// Hardware transmit slot abstraction.
///
/// `try_send` hands a frame to the bus controller for the frame's
/// destination channel. It returns `false` when no transmit mailbox is free
/// or the controller refuses the frame; the caller keeps the frame queued
/// and retries later.
pub trait CanMailbox {
    fn try_send(&mut self, frame: &CanFrame) -> bool;
}

/// Elapsed milliseconds between two readings of a wrapping 32-bit tick
/// counter.
///
/// Handles the wrap from `u32::MAX` to 0:
/// `tick_difference(0, u32::MAX) == 1`.
pub fn tick_difference(current_tick: u32, last_tick: u32) -> u32 {
    if current_tick >= last_tick {
        current_tick - last_tick
    } else {
        u32::MAX - last_tick + current_tick + 1
    }
}

/// The bridge device: receive queue, transmit queue and router in one owned
/// value.
#[derive(Debug)]
pub struct DeviceContext<M> {
    rx_queue: FrameQueue<QUEUE_CAPACITY>,
    tx_queue: FrameQueue<QUEUE_CAPACITY>,
    router: MessageRouter<M>,
    /// Baseline of the wrapping tick counter; `None` until the first tick.
    last_tick: Option<u32>,
}

impl<M: SocEstimator> DeviceContext<M> {
    pub fn new(router: MessageRouter<M>) -> Self {
        Self {
            rx_queue: FrameQueue::new(),
            tx_queue: FrameQueue::new(),
            router,
            last_tick: None,
        }
    }

    pub fn router(&self) -> &MessageRouter<M> {
        &self.router
    }

    /// Interrupt-context entry point: enqueue one received frame.
    ///
    /// Non-blocking by construction; returns `false` when the receive queue
    /// was full and the frame was dropped.
    pub fn frame_received(&mut self, frame: CanFrame) -> bool {
        self.rx_queue.push(frame)
    }

    /// Drain the receive queue through the router, in receive order.
    pub fn process_rx(&mut self) {
        // Each pop is the minimal critical section on real hardware; the
        // routing below runs with interrupts enabled.
        while let Some(frame) = self.rx_queue.pop() {
            self.router.on_frame(&frame, &mut self.tx_queue);
        }
    }

    /// Hand queued frames to the transmit hardware.
    ///
    /// Peek-then-conditional-pop: a frame leaves the queue only once the
    /// mailbox has accepted it, so a refused frame is retried on the next
    /// call in its original position.
    pub fn process_tx(&mut self, mailbox: &mut impl CanMailbox) {
        while let Some(frame) = self.tx_queue.peek().copied() {
            if !mailbox.try_send(&frame) {
                break;
            }
            self.tx_queue.pop();
        }
    }

    /// Advance time from a wrapping millisecond tick counter.
    ///
    /// The first call only records the baseline; later calls forward the
    /// elapsed time whenever the counter has moved.
    pub fn process_tick(&mut self, current_tick: u32) {
        let Some(last) = self.last_tick else {
            self.last_tick = Some(current_tick);
            return;
        };
        if current_tick == last {
            return;
        }
        let elapsed = tick_difference(current_tick, last);
        self.last_tick = Some(current_tick);
        self.router.on_tick(elapsed, &mut self.tx_queue);
    }

    /// Frames waiting for a free transmit mailbox.
    pub fn pending_tx(&self) -> usize {
        self.tx_queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battery::BatteryModel;
    use crate::frame::BusChannel;

    /// Mailbox double with a configurable number of free slots.
    struct SlottedMailbox {
        free_slots: usize,
        sent: Vec<CanFrame>,
    }

    impl SlottedMailbox {
        fn new(free_slots: usize) -> Self {
            Self {
                free_slots,
                sent: Vec::new(),
            }
        }
    }

    impl CanMailbox for SlottedMailbox {
        fn try_send(&mut self, frame: &CanFrame) -> bool {
            if self.free_slots == 0 {
                return false;
            }
            self.free_slots -= 1;
            self.sent.push(*frame);
            true
        }
    }

    fn context() -> DeviceContext<BatteryModel> {
        DeviceContext::new(MessageRouter::new(BatteryModel::new(90.0)))
    }

    #[test]
    fn tick_difference_handles_overflow() {
        assert_eq!(tick_difference(1005, 1000), 5);
        assert_eq!(tick_difference(1000, 1000), 0);
        assert_eq!(tick_difference(0, u32::MAX), 1);
        assert_eq!(tick_difference(10, u32::MAX - 5), 16);
    }

    #[test]
    fn rx_overflow_drops_frames_without_blocking() {
        let mut ctx = context();
        for i in 0..QUEUE_CAPACITY {
            assert!(ctx.frame_received(CanFrame::new(0x100 + i as u32, &[])));
        }
        assert!(!ctx.frame_received(CanFrame::new(0x999, &[])));
    }

    #[test]
    fn frames_flow_rx_to_tx_in_receive_order() {
        let mut ctx = context();
        for i in 0..5u32 {
            let mut frame = CanFrame::new(0x400 + i, &[i as u8]);
            frame.channel = BusChannel::A;
            assert!(ctx.frame_received(frame));
        }

        ctx.process_rx();
        assert_eq!(ctx.pending_tx(), 5);

        let mut mailbox = SlottedMailbox::new(16);
        ctx.process_tx(&mut mailbox);
        assert_eq!(ctx.pending_tx(), 0);
        let ids: Vec<u32> = mailbox.sent.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![0x400, 0x401, 0x402, 0x403, 0x404]);
        assert!(mailbox.sent.iter().all(|f| f.channel == BusChannel::B));
    }

    #[test]
    fn refused_frames_stay_queued_for_the_next_iteration() {
        let mut ctx = context();
        for i in 0..3u32 {
            ctx.frame_received(CanFrame::new(0x500 + i, &[]));
        }
        ctx.process_rx();

        // Only one mailbox slot free: the drain must stop after one frame.
        let mut mailbox = SlottedMailbox::new(1);
        ctx.process_tx(&mut mailbox);
        assert_eq!(mailbox.sent.len(), 1);
        assert_eq!(mailbox.sent[0].id, 0x500);
        assert_eq!(ctx.pending_tx(), 2);

        // Next loop iteration with freed slots picks up where it left off.
        let mut mailbox = SlottedMailbox::new(8);
        ctx.process_tx(&mut mailbox);
        assert_eq!(mailbox.sent[0].id, 0x501);
        assert_eq!(mailbox.sent[1].id, 0x502);
        assert_eq!(ctx.pending_tx(), 0);
    }

    #[test]
    fn tick_processing_skips_when_time_has_not_moved() {
        let mut ctx = context();
        ctx.process_tick(0);
        ctx.process_tick(500);
        assert_eq!(ctx.pending_tx(), 0);
        ctx.process_tick(500); // no time elapsed
        assert_eq!(ctx.pending_tx(), 0);
        ctx.process_tick(1000);
        // One second elapsed: heartbeat queued for both channels.
        assert_eq!(ctx.pending_tx(), 2);
        assert_eq!(ctx.router().uptime_seconds(), 1);
    }

    #[test]
    fn tick_survives_counter_wraparound() {
        let mut ctx = context();
        ctx.process_tick(u32::MAX - 400); // baseline
        assert_eq!(ctx.pending_tx(), 0);
        ctx.process_tick(599); // wraps: 400 + 1 + 599 = 1000 ms elapsed
        assert_eq!(ctx.pending_tx(), 2);
    }
}
