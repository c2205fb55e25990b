//! Battery state of charge estimation.
//!
//! The model keeps two estimates side by side:
//!
//! - SoC1: pure coulomb counting (amp-hour integration of the pack current);
//! - SoC2: coulomb counting, recalibrated from the cell voltage curve once
//!   the pack has been at rest long enough for the voltage to be trustworthy.
//!
//! The model starts uninitialized and seeds both estimates from the voltage
//! curve after 20 consecutive valid voltage samples.

use crate::units::CellVoltage;

/// Interface between the message router and the SoC model.
///
/// The router only needs the update entry point and the reported outputs, so
/// it is generic over this trait and tests can drive it with a recording
/// double instead of the real model.
pub trait SocEstimator {
    /// Feed one telemetry sample into the model.
    fn update(&mut self, cell_min_voltage: CellVoltage, pack_current: f32, delta_t_ms: u32);

    /// State of charge from coulomb counting, percent. 0 until initialized.
    fn soc1(&self) -> f32;

    /// State of charge from the voltage/coulomb hybrid, percent. 0 until
    /// initialized.
    fn soc2(&self) -> f32;

    /// Total battery capacity in amp-hours.
    fn capacity(&self) -> f32;

    /// Whether the initialization sample window has completed.
    fn is_initialized(&self) -> bool;
}

// Voltage curve breakpoints, encoded. See voltage_to_soc2.
const V3_00: CellVoltage = CellVoltage::from_raw(90);
const V3_47: CellVoltage = CellVoltage::from_raw(137);
const V3_60: CellVoltage = CellVoltage::from_raw(150);
const V3_72: CellVoltage = CellVoltage::from_raw(162);
const V3_81: CellVoltage = CellVoltage::from_raw(171);
const V3_92: CellVoltage = CellVoltage::from_raw(182);
const V4_00: CellVoltage = CellVoltage::from_raw(190);

/// Dual-estimate battery state of charge model.
#[derive(Debug, Clone)]
pub struct BatteryModel {
    capacity: f32,
    remaining_ah1: f32,
    remaining_ah2: f32,
    rest_time_ms: u32,
    initialized: bool,
    valid_sample_count: u8,
    last_voltage: CellVoltage,
}

impl BatteryModel {
    /// Pack current magnitude below which the battery counts as at rest.
    const REST_CURRENT_THRESHOLD_A: f32 = 2.0;
    /// Rest duration after which the voltage-based SoC is trusted.
    const REST_TIME_THRESHOLD_MS: u32 = 60_000;
    /// Consecutive valid samples required before the model initializes.
    const INIT_SAMPLES_REQUIRED: u8 = 20;

    const MS_PER_HOUR: f32 = 3_600_000.0;

    /// Create an uninitialized model for a pack of the given capacity in
    /// amp-hours.
    pub fn new(capacity_ah: f32) -> Self {
        Self {
            capacity: capacity_ah,
            remaining_ah1: capacity_ah,
            remaining_ah2: capacity_ah,
            rest_time_ms: 0,
            initialized: false,
            valid_sample_count: 0,
            last_voltage: CellVoltage::from_volts(2.76),
        }
    }

    /// Remaining amp-hours from coulomb counting.
    pub fn remaining_ah1(&self) -> f32 {
        self.remaining_ah1
    }

    /// Remaining amp-hours from the voltage/coulomb hybrid.
    pub fn remaining_ah2(&self) -> f32 {
        self.remaining_ah2
    }

    /// Number of valid samples seen so far during initialization.
    pub fn valid_sample_count(&self) -> u8 {
        self.valid_sample_count
    }

    /// Revert to the construction-time state.
    pub fn reset(&mut self) {
        self.remaining_ah1 = self.capacity;
        self.remaining_ah2 = self.capacity;
        self.rest_time_ms = 0;
        self.initialized = false;
        self.valid_sample_count = 0;
        self.last_voltage = CellVoltage::from_volts(2.76);
    }

    fn clamp_remaining(&self, remaining_ah: f32) -> f32 {
        remaining_ah.clamp(0.0, self.capacity)
    }

    fn soc_from_remaining(&self, remaining_ah: f32) -> f32 {
        100.0 * remaining_ah / self.capacity
    }

    fn seed_from_voltage(&self) -> f32 {
        Self::voltage_to_soc2(self.last_voltage) * self.capacity / 100.0
    }

    /// State of charge from the cell voltage, piecewise linear over the
    /// encoded byte.
    ///
    /// The segments correspond to the breakpoints 2.75, 3.00, 3.47, 3.60,
    /// 3.72, 3.81, 3.92, 4.00 and 4.20 V of the discharge curve; the result
    /// is clamped to [0, 100] and is monotonic non-decreasing in the byte.
    pub fn voltage_to_soc2(cell_min_voltage: CellVoltage) -> f32 {
        let x = cell_min_voltage.raw() as f32;
        let soc = if cell_min_voltage < CellVoltage::CURVE_MIN {
            0.0
        } else if cell_min_voltage < V3_00 {
            0.04082 * x - 2.6533
        } else if cell_min_voltage < V3_47 {
            0.33497 * x - 29.1273
        } else if cell_min_voltage < V3_60 {
            1.32143 * x - 164.0727
        } else if cell_min_voltage < V3_72 {
            1.83199 * x - 241.0661
        } else if cell_min_voltage < V3_81 {
            0.89213 * x - 88.6147
        } else if cell_min_voltage < V3_92 {
            1.31098 * x - 160.1942
        } else if cell_min_voltage < V4_00 {
            1.00031 * x - 103.6209
        } else if cell_min_voltage < CellVoltage::CURVE_MAX {
            1.35913 * x - 171.6887
        } else {
            113.727 // above the last breakpoint the curve saturates
        };
        soc.clamp(0.0, 100.0)
    }
}

impl SocEstimator for BatteryModel {
    fn update(&mut self, cell_min_voltage: CellVoltage, pack_current: f32, delta_t_ms: u32) {
        // A reading outside the curve bounds is ignored completely: no state
        // changes, and the initialization counter does not advance.
        if cell_min_voltage < CellVoltage::CURVE_MIN || cell_min_voltage > CellVoltage::CURVE_MAX {
            return;
        }
        self.last_voltage = cell_min_voltage;

        if !self.initialized {
            self.valid_sample_count += 1;
            if self.valid_sample_count >= Self::INIT_SAMPLES_REQUIRED {
                self.remaining_ah1 = self.seed_from_voltage();
                self.remaining_ah2 = self.remaining_ah1;
                self.initialized = true;
            }
            // No coulomb integration until initialized.
            return;
        }

        // Amp-milliseconds to amp-hours.
        let delta_ah = pack_current * delta_t_ms as f32 / Self::MS_PER_HOUR;
        self.remaining_ah1 += delta_ah;
        self.remaining_ah2 += delta_ah;

        self.remaining_ah1 = self.clamp_remaining(self.remaining_ah1);

        if pack_current.abs() < Self::REST_CURRENT_THRESHOLD_A {
            self.rest_time_ms += delta_t_ms;
        } else {
            self.rest_time_ms = 0;
        }

        if self.rest_time_ms > Self::REST_TIME_THRESHOLD_MS {
            // At rest long enough: trust the voltage and recalibrate SoC2.
            // This repeats on every update until the rest window is broken.
            self.remaining_ah2 = self.seed_from_voltage();
        } else {
            self.remaining_ah2 = self.clamp_remaining(self.remaining_ah2);
        }
    }

    fn soc1(&self) -> f32 {
        if !self.initialized {
            return 0.0;
        }
        self.soc_from_remaining(self.remaining_ah1)
    }

    fn soc2(&self) -> f32 {
        if !self.initialized {
            return 0.0;
        }
        self.soc_from_remaining(self.remaining_ah2)
    }

    fn capacity(&self) -> f32 {
        self.capacity
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}
