//! Codecs for the BMU frames the bridge intercepts.
//!
//! Both codecs are thin views over a [`CanFrame`] payload with fixed byte
//! offsets. The declared `dlc` is deliberately not checked: the upstream BMU
//! always sends 8 data bytes and receivers on this bus read the fixed
//! offsets regardless, so short frames decode the zeroed tail instead of
//! erroring.
//!
//! Layouts (multi-byte fields big-endian):
//!
//! - `0x373`, every 10 ms: D0 max cell voltage, D1 min cell voltage,
//!   D2-D3 pack current `(u16 - 32700) / 100` A, D4-D5 pack voltage
//!   `u16 / 10` V.
//! - `0x374`, every 100 ms: D0/D1 SoC `(byte - 10) / 2` %, D4/D5 max/min
//!   cell temperature, D6 capacity `byte / 2` Ah.

use crate::frame::CanFrame;
use crate::units::{CellTemperature, CellVoltage};

fn clamp_to_u8(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

/// Read-only view of the periodic battery telemetry frame (`0x373`).
pub struct BatteryData<'a> {
    frame: &'a CanFrame,
}

impl<'a> BatteryData<'a> {
    pub const MESSAGE_ID: u32 = 0x373;
    /// Transmission period of the frame on the bus.
    pub const RECURRENCE_MS: u32 = 10;

    pub fn new(frame: &'a CanFrame) -> Self {
        Self { frame }
    }

    /// Maximum cell voltage across the pack (byte 0).
    pub fn cell_max_voltage(&self) -> CellVoltage {
        CellVoltage::from_raw(self.frame.data[0])
    }

    /// Minimum cell voltage across the pack (byte 1).
    pub fn cell_min_voltage(&self) -> CellVoltage {
        CellVoltage::from_raw(self.frame.data[1])
    }

    /// Pack current in amps; positive while charging.
    ///
    /// The wire value carries a 32700 unit offset as the calibrated zero
    /// point.
    pub fn pack_current(&self) -> f32 {
        let raw = u16::from_be_bytes([self.frame.data[2], self.frame.data[3]]);
        (raw as i32 - 32700) as f32 / 100.0
    }

    /// Pack voltage in volts.
    pub fn pack_voltage(&self) -> f32 {
        let raw = u16::from_be_bytes([self.frame.data[4], self.frame.data[5]]);
        raw as f32 / 10.0
    }
}

/// Read/write view of the periodic SoC and temperature frame (`0x374`).
///
/// This is the frame the bridge rewrites before forwarding: the SoC and
/// capacity fields are replaced with the bridge's own estimate and the
/// temperature fields may be overridden diagnostically.
pub struct SocData<'a> {
    frame: &'a mut CanFrame,
}

impl<'a> SocData<'a> {
    pub const MESSAGE_ID: u32 = 0x374;
    /// Transmission period of the frame on the bus.
    pub const RECURRENCE_MS: u32 = 100;

    pub fn new(frame: &'a mut CanFrame) -> Self {
        Self { frame }
    }

    /// State of charge 1 in percent (byte 0).
    pub fn soc1(&self) -> f32 {
        (self.frame.data[0] as i32 - 10) as f32 / 2.0
    }

    /// State of charge 2 in percent (byte 1).
    pub fn soc2(&self) -> f32 {
        (self.frame.data[1] as i32 - 10) as f32 / 2.0
    }

    /// Maximum cell temperature (byte 4).
    pub fn cell_max_temperature(&self) -> CellTemperature {
        CellTemperature::from_can_byte(self.frame.data[4])
    }

    /// Minimum cell temperature (byte 5).
    pub fn cell_min_temperature(&self) -> CellTemperature {
        CellTemperature::from_can_byte(self.frame.data[5])
    }

    /// Battery capacity at 100% in amp-hours (byte 6).
    pub fn battery_capacity(&self) -> f32 {
        self.frame.data[6] as f32 / 2.0
    }

    /// Raw payload byte; indices past the payload read as 0.
    pub fn raw_data(&self, index: u8) -> u8 {
        if index > 7 {
            return 0;
        }
        self.frame.data[index as usize]
    }

    /// Encode state of charge 1. The input is clamped to [0, 100] and the
    /// wire byte saturates.
    pub fn set_soc1(&mut self, soc: f32) {
        let soc = soc.clamp(0.0, 100.0);
        self.frame.data[0] = clamp_to_u8((soc * 2.0 + 10.0).round() as i32);
    }

    /// Encode state of charge 2, same formula as SoC1 on byte 1.
    pub fn set_soc2(&mut self, soc: f32) {
        let soc = soc.clamp(0.0, 100.0);
        self.frame.data[1] = clamp_to_u8((soc * 2.0 + 10.0).round() as i32);
    }

    /// Encode the maximum cell temperature.
    pub fn set_cell_max_temperature(&mut self, temp: CellTemperature) {
        self.frame.data[4] = temp.to_can_byte();
    }

    /// Encode the minimum cell temperature.
    pub fn set_cell_min_temperature(&mut self, temp: CellTemperature) {
        self.frame.data[5] = temp.to_can_byte();
    }

    /// Encode the battery capacity in amp-hours, saturating at the byte
    /// range.
    pub fn set_battery_capacity(&mut self, capacity_ah: f32) {
        self.frame.data[6] = clamp_to_u8((capacity_ah * 2.0).round() as i32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn battery_data_decodes_fixed_offsets() {
        let mut frame = CanFrame::new(BatteryData::MESSAGE_ID, &[0u8; 8]);
        frame.data[0] = 205; // 4.15 V
        frame.data[1] = 200; // 4.10 V
        // 33700 = 0x83A4 -> (33700 - 32700) / 100 = 10 A
        frame.data[2] = 0x83;
        frame.data[3] = 0xA4;
        // 3301 -> 330.1 V
        frame.data[4] = 0x0C;
        frame.data[5] = 0xE5;

        let msg = BatteryData::new(&frame);
        assert_eq!(msg.cell_max_voltage().raw(), 205);
        assert_eq!(msg.cell_min_voltage(), CellVoltage::from_volts(4.10));
        assert!((msg.pack_current() - 10.0).abs() < 0.001);
        assert!((msg.pack_voltage() - 330.1).abs() < 0.001);
    }

    #[test]
    fn battery_data_negative_current() {
        let mut frame = CanFrame::new(BatteryData::MESSAGE_ID, &[0u8; 8]);
        // 31700 = 0x7BD4 -> -10 A (discharging)
        frame.data[2] = 0x7B;
        frame.data[3] = 0xD4;
        let msg = BatteryData::new(&frame);
        assert!((msg.pack_current() + 10.0).abs() < 0.001);
    }

    #[test]
    fn soc_data_round_trips_fields() {
        let mut frame = CanFrame::new(SocData::MESSAGE_ID, &[0u8; 8]);
        let mut msg = SocData::new(&mut frame);

        msg.set_soc1(52.5);
        msg.set_soc2(80.0);
        msg.set_cell_max_temperature(CellTemperature::from_celsius(32.0));
        msg.set_cell_min_temperature(CellTemperature::from_celsius(30.0));
        msg.set_battery_capacity(45.0);

        assert_eq!(msg.raw_data(0), 115); // 52.5 * 2 + 10
        assert_eq!(msg.raw_data(1), 170);
        assert_eq!(msg.raw_data(4), 82);
        assert_eq!(msg.raw_data(5), 80);
        assert_eq!(msg.raw_data(6), 90);

        assert!((msg.soc1() - 52.5).abs() < 0.001);
        assert!((msg.soc2() - 80.0).abs() < 0.001);
        assert_eq!(msg.cell_max_temperature().celsius(), 32.0);
        assert_eq!(msg.cell_min_temperature().celsius(), 30.0);
        assert!((msg.battery_capacity() - 45.0).abs() < 0.001);
    }

    #[test]
    fn soc_encodes_saturate_instead_of_wrapping() {
        let mut frame = CanFrame::new(SocData::MESSAGE_ID, &[0u8; 8]);
        let mut msg = SocData::new(&mut frame);

        msg.set_soc1(250.0);
        assert_eq!(msg.raw_data(0), 210); // clamped to 100% first
        msg.set_soc1(-5.0);
        assert_eq!(msg.raw_data(0), 10);

        msg.set_battery_capacity(500.0);
        assert_eq!(msg.raw_data(6), 255);
        msg.set_battery_capacity(-1.0);
        assert_eq!(msg.raw_data(6), 0);
    }

    #[test]
    fn raw_data_out_of_range_reads_zero() {
        let mut frame = CanFrame::new(SocData::MESSAGE_ID, &[0xFF; 8]);
        let msg = SocData::new(&mut frame);
        assert_eq!(msg.raw_data(7), 0xFF);
        assert_eq!(msg.raw_data(8), 0);
        assert_eq!(msg.raw_data(255), 0);
    }

    #[test]
    fn codecs_ignore_declared_length() {
        // A short frame still decodes the fixed offsets: the payload array is
        // always 8 bytes and the zeroed tail is read as-is.
        let mut frame = CanFrame::new(SocData::MESSAGE_ID, &[115, 170]);
        assert_eq!(frame.dlc, 2);
        let mut msg = SocData::new(&mut frame);
        assert!((msg.soc1() - 52.5).abs() < 0.001);
        assert_eq!(msg.cell_max_temperature().to_can_byte(), 0);
        msg.set_battery_capacity(45.0);
        assert_eq!(msg.raw_data(6), 90);
        assert_eq!(frame.dlc, 2); // dlc is never touched by the codec
    }
}
