//! SocketCAN transport for running the bridge on a Linux host.
//!
//! The pair of nonblocking sockets stands in for the two CAN controllers of
//! the target hardware: `try_receive` plays the receive-interrupt role and
//! the [`CanMailbox`] implementation plays the transmit mailbox, reporting
//! `WouldBlock` as "no free mailbox" so the drain loop backs off exactly as
//! it does on the device.

use crate::device::CanMailbox;
use crate::error::Error;
use crate::frame::{BusChannel, CanFrame};
use socketcan::{CanSocket, EmbeddedFrame, ExtendedId, Id, Socket, StandardId};

/// The two host CAN interfaces the bridge forwards between.
pub struct CanBridgePorts {
    sockets: [CanSocket; 2],
}

impl CanBridgePorts {
    /// Open both interfaces (e.g. `can0`/`can1` or `vcan0`/`vcan1`) in
    /// nonblocking mode.
    pub fn open(interface_a: &str, interface_b: &str) -> Result<Self, Error> {
        let socket_a = CanSocket::open(interface_a)?;
        let socket_b = CanSocket::open(interface_b)?;
        socket_a.set_nonblocking(true)?;
        socket_b.set_nonblocking(true)?;
        Ok(Self {
            sockets: [socket_a, socket_b],
        })
    }

    /// Poll both channels once and return the first pending frame, tagged
    /// with its origin channel. `Ok(None)` means both channels were idle.
    pub fn try_receive(&mut self) -> Result<Option<CanFrame>, Error> {
        for channel in [BusChannel::A, BusChannel::B] {
            let socket = &self.sockets[channel.index() as usize];
            match socket.read_frame() {
                Ok(received) => {
                    if let Some(frame) = from_socketcan(&received, channel) {
                        log::trace!("rx ch{} {:#05x}", channel.index(), frame.id);
                        return Ok(Some(frame));
                    }
                    // Error frames from the controller are not bridged.
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }
}

impl CanMailbox for CanBridgePorts {
    fn try_send(&mut self, frame: &CanFrame) -> bool {
        let encoded = match to_socketcan(frame) {
            Ok(encoded) => encoded,
            Err(e) => {
                // Consume the frame: retrying an unencodable frame would
                // wedge the transmit queue forever.
                log::warn!("dropping unencodable tx frame: {e}");
                return true;
            }
        };
        let socket = &self.sockets[frame.channel.index() as usize];
        match socket.write_frame(&encoded) {
            Ok(()) => {
                log::trace!("tx ch{} {:#05x}", frame.channel.index(), frame.id);
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => false,
            Err(e) => {
                log::warn!("CAN write failed on ch{}: {e}", frame.channel.index());
                false
            }
        }
    }
}

/// Open an interface, send one frame, and close it again.
///
/// Used for one-shot command injection (e.g. the diagnostic override
/// command); the socket stays blocking so the send completes or errors.
pub fn send_single(interface: &str, frame: &CanFrame) -> Result<(), Error> {
    let socket = CanSocket::open(interface)?;
    let encoded = to_socketcan(frame)?;
    socket.write_frame(&encoded)?;
    Ok(())
}

fn frame_id(frame: &CanFrame) -> Result<Id, Error> {
    if frame.extended {
        ExtendedId::new(frame.id)
            .map(Id::Extended)
            .ok_or(Error::InvalidId(frame.id))
    } else {
        u16::try_from(frame.id)
            .ok()
            .and_then(StandardId::new)
            .map(Id::Standard)
            .ok_or(Error::InvalidId(frame.id))
    }
}

fn to_socketcan(frame: &CanFrame) -> Result<socketcan::CanFrame, Error> {
    let id = frame_id(frame)?;
    let dlc = frame.dlc.min(8) as usize;
    if frame.remote {
        socketcan::CanFrame::new_remote(id, dlc).ok_or(Error::InvalidId(frame.id))
    } else {
        socketcan::CanFrame::new(id, &frame.data[..dlc]).ok_or(Error::InvalidId(frame.id))
    }
}

fn from_socketcan(frame: &socketcan::CanFrame, channel: BusChannel) -> Option<CanFrame> {
    let (id, extended) = match frame.id() {
        Id::Standard(id) => (id.as_raw() as u32, false),
        Id::Extended(id) => (id.as_raw(), true),
    };
    match frame {
        socketcan::CanFrame::Data(data) => {
            let payload = data.data();
            let mut out = CanFrame {
                id,
                dlc: data.dlc() as u8,
                extended,
                remote: false,
                channel,
                data: [0u8; 8],
            };
            out.data[..payload.len().min(8)].copy_from_slice(&payload[..payload.len().min(8)]);
            Some(out)
        }
        socketcan::CanFrame::Remote(remote) => Some(CanFrame {
            id,
            dlc: remote.dlc() as u8,
            extended,
            remote: true,
            channel,
            data: [0u8; 8],
        }),
        socketcan::CanFrame::Error(_) => None,
    }
}
