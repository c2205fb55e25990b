//! Per-frame dispatch between the two CAN channels.
//!
//! Every inbound frame produces at most one outbound frame on the opposite
//! channel. Telemetry (`0x373`) feeds the SoC estimator and passes through
//! untouched, the SoC frame (`0x374`) is rewritten with the bridge's own
//! estimate (and withheld entirely until the estimator is ready), diagnostic
//! commands (`0x721`) are consumed, and everything else is forwarded as-is.

use crate::battery::SocEstimator;
use crate::diagnostic::Diagnostic;
use crate::frame::CanFrame;
use crate::protocol::{BatteryData, SocData};
use crate::queue::FrameQueue;

/// Routes frames between the channels and owns the periodic heartbeat
/// cadence.
///
/// Generic over the estimator so tests can substitute a double for the real
/// [`crate::battery::BatteryModel`].
#[derive(Debug)]
pub struct MessageRouter<M> {
    estimator: M,
    diagnostic: Diagnostic,
    uptime_ticks: u32,
    one_second_countdown: i32,
    uptime_seconds: u32,
}

impl<M: SocEstimator> MessageRouter<M> {
    pub fn new(estimator: M) -> Self {
        Self {
            estimator,
            diagnostic: Diagnostic::new(),
            uptime_ticks: 0,
            one_second_countdown: 1000,
            uptime_seconds: 0,
        }
    }

    pub fn estimator(&self) -> &M {
        &self.estimator
    }

    pub fn diagnostic(&self) -> &Diagnostic {
        &self.diagnostic
    }

    /// Whole seconds since the router started ticking.
    pub fn uptime_seconds(&self) -> u32 {
        self.uptime_seconds
    }

    /// Handle one received frame, queueing the response (if any) for
    /// transmission on the opposite channel.
    pub fn on_frame<const N: usize>(&mut self, frame: &CanFrame, tx_queue: &mut FrameQueue<N>) {
        let mut response = *frame;
        let mut forward = true;

        if frame.id == BatteryData::MESSAGE_ID {
            let msg = BatteryData::new(frame);
            self.estimator.update(
                msg.cell_min_voltage(),
                msg.pack_current(),
                BatteryData::RECURRENCE_MS,
            );
            // Telemetry itself is forwarded unmodified.
        } else if frame.id == SocData::MESSAGE_ID {
            let mut msg = SocData::new(&mut response);
            // Overrides first; the overlay below must not undo them.
            self.diagnostic.apply_overrides(&mut msg);
            msg.set_battery_capacity(self.estimator.capacity());
            msg.set_soc1(self.estimator.soc1());
            msg.set_soc2(self.estimator.soc2());
            // Withhold the frame until the model has something to report.
            forward = self.estimator.is_initialized();
            if !forward {
                log::trace!("SoC frame withheld, estimator not initialized");
            }
        } else if frame.id == Diagnostic::COMMAND_MESSAGE_ID {
            forward = false;
            self.diagnostic.process_command(frame);
        }

        if forward {
            response.channel = frame.channel.other();
            if !tx_queue.push(response) {
                log::warn!("transmit queue full, dropping frame {:#05x}", response.id);
            }
        }
    }

    /// Advance the uptime clock by `ms` milliseconds, emitting the heartbeat
    /// once per second.
    ///
    /// The countdown adds 1000 back instead of resetting, so fractions of a
    /// second carried into the next period do not accumulate drift.
    pub fn on_tick<const N: usize>(&mut self, ms: u32, tx_queue: &mut FrameQueue<N>) {
        self.uptime_ticks = self.uptime_ticks.wrapping_add(ms);

        self.one_second_countdown -= ms as i32;
        if self.one_second_countdown <= 0 {
            self.one_second_countdown += 1000;
            self.uptime_seconds += 1;
            self.diagnostic
                .send_diagnostic_data(tx_queue, self.uptime_seconds);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::BusChannel;
    use crate::units::{CellTemperature, CellVoltage};

    /// Recording estimator double.
    #[derive(Default)]
    struct FakeEstimator {
        updates: Vec<(u8, f32, u32)>,
        soc1: f32,
        soc2: f32,
        capacity: f32,
        initialized: bool,
    }

    impl SocEstimator for FakeEstimator {
        fn update(&mut self, cell_min_voltage: CellVoltage, pack_current: f32, delta_t_ms: u32) {
            self.updates
                .push((cell_min_voltage.raw(), pack_current, delta_t_ms));
        }

        fn soc1(&self) -> f32 {
            self.soc1
        }

        fn soc2(&self) -> f32 {
            self.soc2
        }

        fn capacity(&self) -> f32 {
            self.capacity
        }

        fn is_initialized(&self) -> bool {
            self.initialized
        }
    }

    fn router() -> MessageRouter<FakeEstimator> {
        MessageRouter::new(FakeEstimator::default())
    }

    #[test]
    fn unknown_frame_passes_through_with_flipped_channel() {
        let mut router = router();
        let mut tx: FrameQueue<8> = FrameQueue::new();

        let mut frame = CanFrame::new(0x123, &[0x11, 0x22, 0x33, 0x44, 0x55]);
        frame.extended = true;
        frame.channel = BusChannel::A;
        router.on_frame(&frame, &mut tx);

        assert_eq!(tx.len(), 1);
        let sent = tx.pop().unwrap();
        assert_eq!(sent.id, frame.id);
        assert_eq!(sent.dlc, frame.dlc);
        assert_eq!(sent.extended, frame.extended);
        assert_eq!(sent.remote, frame.remote);
        assert_eq!(sent.data, frame.data);
        assert_eq!(sent.channel, BusChannel::B);

        // And the other direction.
        frame.channel = BusChannel::B;
        router.on_frame(&frame, &mut tx);
        assert_eq!(tx.pop().unwrap().channel, BusChannel::A);
        assert!(router.estimator().updates.is_empty());
    }

    #[test]
    fn telemetry_updates_estimator_and_forwards_unmodified() {
        let mut router = router();
        let mut tx: FrameQueue<8> = FrameQueue::new();

        // Min cell 4.10 V (byte 200), pack current +10 A, received on B.
        let mut frame = CanFrame::new(BatteryData::MESSAGE_ID, &[0u8; 8]);
        frame.data[0] = 205;
        frame.data[1] = CellVoltage::from_volts(4.10).raw();
        frame.data[2] = 0x83;
        frame.data[3] = 0xA4;
        frame.channel = BusChannel::B;

        router.on_frame(&frame, &mut tx);

        assert_eq!(router.estimator().updates.len(), 1);
        let (byte, current, delta) = router.estimator().updates[0];
        assert_eq!(byte, 200);
        assert!((current - 10.0).abs() < 0.001);
        assert_eq!(delta, 10);

        let sent = tx.pop().unwrap();
        assert_eq!(sent.data, frame.data);
        assert_eq!(sent.channel, BusChannel::A);
    }

    #[test]
    fn soc_frame_is_withheld_until_initialized() {
        let mut router = router();
        let mut tx: FrameQueue<8> = FrameQueue::new();

        let frame = CanFrame::new(SocData::MESSAGE_ID, &[80, 80, 0, 0, 70, 68, 80, 0]);
        router.on_frame(&frame, &mut tx);
        assert!(tx.is_empty());
    }

    #[test]
    fn soc_frame_is_overlaid_once_initialized() {
        let mut router = router();
        router.estimator.initialized = true;
        router.estimator.soc1 = 52.5;
        router.estimator.soc2 = 80.0;
        router.estimator.capacity = 45.0;
        let mut tx: FrameQueue<8> = FrameQueue::new();

        // Input reports 35% / 35% / 40 Ah, temperatures 18/15 degC.
        let mut frame = CanFrame::new(SocData::MESSAGE_ID, &[80, 80, 0, 0, 68, 65, 80, 0]);
        frame.channel = BusChannel::A;
        router.on_frame(&frame, &mut tx);

        let mut sent = tx.pop().unwrap();
        assert_eq!(sent.channel, BusChannel::B);
        let msg = SocData::new(&mut sent);
        assert!((msg.soc1() - 52.5).abs() < 0.3);
        assert!((msg.soc2() - 80.0).abs() < 0.3);
        assert!((msg.battery_capacity() - 45.0).abs() < 0.3);
        // No override active: temperatures come through untouched.
        assert_eq!(msg.cell_max_temperature().celsius(), 18.0);
        assert_eq!(msg.cell_min_temperature().celsius(), 15.0);
    }

    #[test]
    fn soc_frame_keeps_overridden_temperatures() {
        let mut router = router();
        router.estimator.initialized = true;
        router.estimator.soc1 = 50.0;
        router.estimator.soc2 = 50.0;
        router.estimator.capacity = 45.0;
        let mut tx: FrameQueue<8> = FrameQueue::new();

        let command = CanFrame::new(
            Diagnostic::COMMAND_MESSAGE_ID,
            &[
                Diagnostic::FUNCTION_SET_TEMPERATURE_OVERRIDE,
                CellTemperature::from_celsius(30.0).to_can_byte(),
                CellTemperature::from_celsius(32.0).to_can_byte(),
            ],
        );
        router.on_frame(&command, &mut tx);
        // Command frames never reach the other channel.
        assert!(tx.is_empty());

        let frame = CanFrame::new(SocData::MESSAGE_ID, &[80, 80, 0, 0, 68, 65, 80, 0]);
        router.on_frame(&frame, &mut tx);

        let mut sent = tx.pop().unwrap();
        let msg = SocData::new(&mut sent);
        assert_eq!(msg.cell_min_temperature().celsius(), 30.0);
        assert_eq!(msg.cell_max_temperature().celsius(), 32.0);
        assert!((msg.soc1() - 50.0).abs() < 0.3);
    }

    #[test]
    fn full_transmit_queue_drops_the_response() {
        let mut router = router();
        let mut tx: FrameQueue<1> = FrameQueue::new();

        let frame = CanFrame::new(0x200, &[1, 2, 3]);
        router.on_frame(&frame, &mut tx);
        router.on_frame(&frame, &mut tx);

        assert_eq!(tx.len(), 1);
    }

    #[test]
    fn heartbeat_fires_once_per_second_without_drift() {
        let mut router = router();
        let mut tx: FrameQueue<16> = FrameQueue::new();

        router.on_tick(999, &mut tx);
        assert!(tx.is_empty());
        router.on_tick(1, &mut tx);
        // One heartbeat, duplicated across both channels.
        assert_eq!(tx.len(), 2);
        assert_eq!(router.uptime_seconds(), 1);

        // 1500 + 400 + 100 ms = exactly two more seconds of uptime: the
        // leftover 500 ms of the first tick must carry over.
        router.on_tick(1500, &mut tx);
        assert_eq!(router.uptime_seconds(), 2);
        router.on_tick(400, &mut tx);
        assert_eq!(router.uptime_seconds(), 2);
        router.on_tick(100, &mut tx);
        assert_eq!(router.uptime_seconds(), 3);
        assert_eq!(tx.len(), 6);

        let hb = tx.pop().unwrap();
        assert_eq!(hb.id, Diagnostic::HEARTBEAT_MESSAGE_ID);
        assert_eq!(&hb.data[4..8], &1u32.to_be_bytes());
    }
}
