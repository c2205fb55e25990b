#![cfg_attr(docsrs, feature(doc_cfg))]
//! # bmubridge_lib
//!
//! This crate implements the application layer of a dual-channel CAN bridge
//! sitting between an EV battery management unit (BMU) and the rest of the
//! vehicle. Frames are forwarded between the two channels; on the way
//! through, the bridge:
//!
//! - feeds the periodic battery telemetry frame (`0x373`) into its own
//!   state-of-charge model ([`battery::BatteryModel`]), a coulomb counter
//!   cross-checked against a voltage curve while the pack is at rest;
//! - rewrites the SoC/temperature frame (`0x374`) with the model's output,
//!   withholding it until the model has initialized;
//! - accepts diagnostic commands (`0x721`) that can temporarily override the
//!   reported cell temperatures under safety constraints, and emits a
//!   per-second diagnostic heartbeat (`0x720`).
//!
//! The core ([`router::MessageRouter`], [`device::DeviceContext`] and the
//! frame codecs in [`protocol`]) is transport-free and fully exercised by
//! direct calls; the hardware boundary is the pair of bounded
//! [`queue::FrameQueue`]s and the [`device::CanMailbox`] trait.
//!
//! ## Features
//!
//! This crate uses a feature-based system to keep dependencies minimal.
//!
//! - `default`: Enables `bin-dependencies`, which is intended for compiling
//!   the `bmubridge` command-line tool.
//!
//! ### Transport Features
//! - `socketcan`: Enables the Linux SocketCAN transport
//!   ([`socketcan::CanBridgePorts`]) used to run the bridge on a host.
//!
//! ### Utility Features
//! - `serde`: Enables `serde` support for the frame types.
//! - `bin-dependencies`: Enables all features required by the `bmubridge`
//!   binary executable (currently `socketcan` and `serde`).

/// Contains error types for the library.
mod error;

/// Battery state of charge estimation.
pub mod battery;
/// The device aggregate tying queues and router together.
pub mod device;
/// Diagnostic commands, temperature override and heartbeat.
pub mod diagnostic;
/// The CAN frame value type.
pub mod frame;
/// Byte-exact codecs for the intercepted frames.
pub mod protocol;
/// Fixed-capacity frame FIFO.
pub mod queue;
/// Per-frame dispatch between the channels.
pub mod router;
/// Byte-encoded physical units.
pub mod units;

pub use error::Error;

/// Linux SocketCAN transport for the bridge.
#[cfg_attr(docsrs, doc(cfg(feature = "socketcan")))]
#[cfg(feature = "socketcan")]
pub mod socketcan;
