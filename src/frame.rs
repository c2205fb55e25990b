//! CAN frame value type shared by both bus channels.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Physical CAN channel a frame was received on or is destined for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BusChannel {
    /// First CAN channel (index 0).
    #[default]
    A,
    /// Second CAN channel (index 1).
    B,
}

impl BusChannel {
    /// The opposite channel. Forwarded frames always cross the bridge.
    pub const fn other(self) -> Self {
        match self {
            BusChannel::A => BusChannel::B,
            BusChannel::B => BusChannel::A,
        }
    }

    /// Numeric channel index (0 or 1).
    pub const fn index(self) -> u8 {
        match self {
            BusChannel::A => 0,
            BusChannel::B => 1,
        }
    }

    /// Channel for a numeric index; any nonzero index maps to channel B.
    pub const fn from_index(index: u8) -> Self {
        if index == 0 {
            BusChannel::A
        } else {
            BusChannel::B
        }
    }
}

/// A single CAN frame.
///
/// The payload is always carried as a full 8-byte array; `dlc` is the
/// declared length from the bus. The frame codecs read and write fixed
/// payload offsets without consulting `dlc` — receivers on this bus do the
/// same, so the permissive behavior is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CanFrame {
    /// Frame identifier (11-bit standard or 29-bit extended).
    pub id: u32,
    /// Declared data length code (0-8).
    pub dlc: u8,
    /// Extended (29-bit) identifier flag.
    pub extended: bool,
    /// Remote transmission request flag.
    pub remote: bool,
    /// Origin channel on receipt, destination channel on transmit.
    pub channel: BusChannel,
    /// Payload bytes.
    pub data: [u8; 8],
}

impl CanFrame {
    /// Build a standard-id data frame from a payload slice (at most 8 bytes
    /// are used).
    pub fn new(id: u32, payload: &[u8]) -> Self {
        let dlc = payload.len().min(8);
        let mut data = [0u8; 8];
        data[..dlc].copy_from_slice(&payload[..dlc]);
        Self {
            id,
            dlc: dlc as u8,
            extended: false,
            remote: false,
            channel: BusChannel::A,
            data,
        }
    }
}

impl Default for CanFrame {
    fn default() -> Self {
        Self {
            id: 0,
            dlc: 0,
            extended: false,
            remote: false,
            channel: BusChannel::A,
            data: [0u8; 8],
        }
    }
}
