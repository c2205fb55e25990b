/// Errors surfaced by the transport layer.
///
/// The frame codecs and the estimator never fail: malformed input is ignored
/// and numeric conversions saturate, per the bus contract. Errors only arise
/// where the bridge touches the host CAN interfaces.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An I/O error from the underlying CAN socket.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// A frame identifier that does not fit the selected identifier format.
    #[error("invalid CAN identifier {0:#x}")]
    InvalidId(u32),
}
