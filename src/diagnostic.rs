//! Diagnostic command channel and the temperature override it controls.

use crate::frame::{BusChannel, CanFrame};
use crate::protocol::SocData;
use crate::queue::FrameQueue;
use crate::units::CellTemperature;

/// Firmware version reported in the heartbeat frame.
pub const FIRMWARE_VERSION_MAJOR: u8 = 1;
pub const FIRMWARE_VERSION_MINOR: u8 = 1;

/// Time- and frame-boxed override of the min/max cell temperature fields of
/// the SoC frame.
///
/// An override carries a frame budget. Every application attempt while the
/// budget is nonzero consumes one frame, whether or not the safety gate lets
/// the mutation through, so a rejected override still expires on schedule.
#[derive(Debug, Clone, Default)]
pub struct TemperatureOverride {
    override_min: CellTemperature,
    override_max: CellTemperature,
    remaining_frames: u32,
    last_original_min: CellTemperature,
    last_original_max: CellTemperature,
}

impl TemperatureOverride {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install an override for the next `frame_count` applications,
    /// unconditionally replacing any active one.
    pub fn set_override(
        &mut self,
        min_temp: CellTemperature,
        max_temp: CellTemperature,
        frame_count: u32,
    ) {
        self.override_min = min_temp;
        self.override_max = max_temp;
        self.remaining_frames = frame_count;
    }

    /// Try to apply the override to one SoC frame.
    ///
    /// Returns `true` when the temperature fields were rewritten. The
    /// mutation is rejected (but the frame budget still consumed) when it
    /// would report an implausible jump:
    ///
    /// - cooling below 25 °C while the pack reads above 25 °C;
    /// - heating a pack at or below 10 °C by more than 10 °C.
    pub fn apply_override(&mut self, msg: &mut SocData<'_>) -> bool {
        if self.remaining_frames == 0 {
            return false;
        }

        let current_max = msg.cell_max_temperature().celsius();

        if current_max > 25.0 && self.override_max.celsius() < 25.0 {
            self.remaining_frames -= 1;
            log::debug!(
                "temperature override rejected: cooling from {current_max} degC"
            );
            return false;
        }

        if current_max <= 10.0 && self.override_max.celsius() > current_max + 10.0 {
            self.remaining_frames -= 1;
            log::debug!(
                "temperature override rejected: heating from {current_max} degC"
            );
            return false;
        }

        self.last_original_min = msg.cell_min_temperature();
        self.last_original_max = msg.cell_max_temperature();

        msg.set_cell_min_temperature(self.override_min);
        msg.set_cell_max_temperature(self.override_max);

        self.remaining_frames -= 1;
        true
    }

    /// Active iff the frame budget has not run out.
    pub fn is_active(&self) -> bool {
        self.remaining_frames > 0
    }

    /// Expire the override immediately.
    pub fn clear(&mut self) {
        self.remaining_frames = 0;
    }

    /// Frame budget left on the current override.
    pub fn remaining_frames(&self) -> u32 {
        self.remaining_frames
    }

    /// Min temperature recorded the last time the override was applied.
    pub fn original_min_temp(&self) -> CellTemperature {
        self.last_original_min
    }

    /// Max temperature recorded the last time the override was applied.
    pub fn original_max_temp(&self) -> CellTemperature {
        self.last_original_max
    }
}

/// Parses diagnostic command frames and emits the periodic diagnostic
/// heartbeat.
#[derive(Debug, Clone, Default)]
pub struct Diagnostic {
    temperature_override: TemperatureOverride,
}

impl Diagnostic {
    /// Identifier of inbound diagnostic command frames.
    pub const COMMAND_MESSAGE_ID: u32 = 0x721;
    /// Identifier of the outbound heartbeat frame.
    pub const HEARTBEAT_MESSAGE_ID: u32 = 0x720;
    /// Command function code: set the cell temperature override.
    pub const FUNCTION_SET_TEMPERATURE_OVERRIDE: u8 = 0x01;

    /// Override lifetime, expressed in occurrences of the overlaid frame.
    const OVERRIDE_FRAME_BUDGET: u32 = 10_000 / SocData::RECURRENCE_MS;

    pub fn new() -> Self {
        Self::default()
    }

    /// Handle one diagnostic command frame.
    ///
    /// Byte 0 selects the function; frames too short for the function are
    /// ignored, as are unknown function codes.
    pub fn process_command(&mut self, frame: &CanFrame) {
        if frame.dlc < 1 {
            log::warn!("diagnostic command without function code ignored");
            return;
        }

        match frame.data[0] {
            Self::FUNCTION_SET_TEMPERATURE_OVERRIDE => self.process_set_temperature_override(frame),
            function => {
                log::debug!("unknown diagnostic function {function:#04x} ignored");
            }
        }
    }

    /// Function 1: bytes 1/2 carry the override min/max temperature in the
    /// usual CAN encoding; the override runs for 10 seconds of frames.
    fn process_set_temperature_override(&mut self, frame: &CanFrame) {
        if frame.dlc < 3 {
            log::warn!("set-temperature-override command too short, ignored");
            return;
        }

        let min_temp = CellTemperature::from_can_byte(frame.data[1]);
        let max_temp = CellTemperature::from_can_byte(frame.data[2]);
        log::info!(
            "temperature override set: min={} degC max={} degC for {} frames",
            min_temp.celsius(),
            max_temp.celsius(),
            Self::OVERRIDE_FRAME_BUDGET
        );
        self.temperature_override
            .set_override(min_temp, max_temp, Self::OVERRIDE_FRAME_BUDGET);
    }

    /// Apply any active override to a SoC frame.
    pub fn apply_overrides(&mut self, msg: &mut SocData<'_>) -> bool {
        self.temperature_override.apply_override(msg)
    }

    /// State of the temperature override.
    pub fn temperature_override(&self) -> &TemperatureOverride {
        &self.temperature_override
    }

    /// Queue the diagnostic heartbeat on both channels.
    ///
    /// Layout: bytes 0-1 firmware version major/minor, bytes 2-3 the min/max
    /// temperature recorded by the last applied override, bytes 4-7 uptime
    /// seconds big-endian.
    pub fn send_diagnostic_data<const N: usize>(
        &self,
        tx_queue: &mut FrameQueue<N>,
        seconds: u32,
    ) {
        let mut frame = CanFrame {
            id: Self::HEARTBEAT_MESSAGE_ID,
            dlc: 8,
            ..CanFrame::default()
        };
        frame.data[0] = FIRMWARE_VERSION_MAJOR;
        frame.data[1] = FIRMWARE_VERSION_MINOR;
        frame.data[2] = self.temperature_override.original_min_temp().to_can_byte();
        frame.data[3] = self.temperature_override.original_max_temp().to_can_byte();
        frame.data[4..8].copy_from_slice(&seconds.to_be_bytes());

        frame.channel = BusChannel::A;
        tx_queue.push(frame);
        frame.channel = BusChannel::B;
        tx_queue.push(frame);
    }
}
