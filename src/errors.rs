use thiserror::Error;

pub type Result<T> = std::result::Result<T, P2pError>;

/// Domain error codes shared across the channel core.
///
/// Success is `Ok(())`, so any `P2pError` handed to a stop path is a
/// termination code by construction. The enum is `Clone` because a single
/// code is fanned out to every pending subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum P2pError {
    /// The registry or subsystem has been stopped.
    #[error("service stopped")]
    ServiceStopped,

    /// This channel has been stopped.
    #[error("channel stopped")]
    ChannelStopped,

    /// Illegal state transition, such as starting a running channel.
    #[error("operation failed")]
    OperationFailed,

    /// Framing violation: invalid heading, wrong magic, oversize payload,
    /// checksum mismatch or trailing bytes.
    #[error("bad stream")]
    BadStream,

    /// A channel with the same authority or nonce is already registered.
    #[error("address in use")]
    AddressInUse,

    /// The channel is not in the registry.
    #[error("not found")]
    NotFound,

    /// Surfaced from the socket layer with the OS classification.
    #[error("i/o failure: {0:?}")]
    Io(std::io::ErrorKind),

    /// Payload parse failure for a known command.
    #[error("decode failure: {0}")]
    Decode(String),
}

impl From<std::io::Error> for P2pError {
    fn from(err: std::io::Error) -> Self {
        P2pError::Io(err.kind())
    }
}
