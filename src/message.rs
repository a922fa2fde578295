use super::command::Command;
use super::errors::Result;
use super::heading::Heading;
use super::HEADER_SIZE;

/// A typed p2p message with a versioned wire codec.
///
/// `decode` reads off the front of the slice; the caller decides whether
/// leftover bytes are acceptable.
pub trait NetMessage: Sized {
    /// Wire command tag for this message type.
    const COMMAND: Command;

    fn encode(&self, version: u32) -> Result<Vec<u8>>;

    fn decode(reader: &mut &[u8], version: u32) -> Result<Self>;
}

/// Serialize a complete frame, heading followed by payload:
/// https://developer.bitcoin.org/reference/p2p_networking.html#message-headers
pub fn serialize<M: NetMessage>(message: &M, version: u32, magic: u32) -> Result<Vec<u8>> {
    let payload = message.encode(version)?;
    let heading = Heading::new(magic, M::COMMAND, &payload);

    let mut buffer = Vec::with_capacity(HEADER_SIZE + payload.len());
    buffer.extend_from_slice(&heading.to_bytes());
    buffer.extend_from_slice(&payload);

    Ok(buffer)
}
