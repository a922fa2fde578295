use byteorder::{LittleEndian, ReadBytesExt};
use sha2::{Digest, Sha256};

use super::command::Command;
use super::errors::{P2pError, Result};
use super::{
    CHECKSUM_SIZE, HEADER_CHECKSUM_RANGE, HEADER_COMMAND_NAME_RANGE, HEADER_MAGIC_RANGE,
    HEADER_PAYLOAD_LEN_RANGE, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};

/// The fixed 24-byte frame preamble preceding every payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub magic: u32,
    pub command: Command,
    pub payload_size: u32,
    pub checksum: u32,
}

impl Heading {
    pub fn new(magic: u32, command: Command, payload: &[u8]) -> Self {
        Self {
            magic,
            command,
            payload_size: payload.len() as u32,
            checksum: checksum(payload),
        }
    }

    /// Largest payload permitted for any supported protocol version.
    ///
    /// The cap is the maximum over all versions, so a version that lowered
    /// it could never shrink a preallocated payload buffer.
    pub fn maximum_payload_size(_version: u32) -> usize {
        MAX_PAYLOAD_SIZE
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buffer = [0u8; HEADER_SIZE];
        buffer[HEADER_MAGIC_RANGE].copy_from_slice(&self.magic.to_le_bytes());
        buffer[HEADER_COMMAND_NAME_RANGE].copy_from_slice(&self.command.to_bytes());
        buffer[HEADER_PAYLOAD_LEN_RANGE].copy_from_slice(&self.payload_size.to_le_bytes());
        buffer[HEADER_CHECKSUM_RANGE].copy_from_slice(&self.checksum.to_le_bytes());
        buffer
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != HEADER_SIZE {
            return Err(P2pError::BadStream);
        }

        // magic uint32 (4 bytes)
        let magic = (&bytes[HEADER_MAGIC_RANGE]).read_u32::<LittleEndian>()?;

        // command name char[12]
        let command = Command::from_bytes(&bytes[HEADER_COMMAND_NAME_RANGE])?;

        // payload length uint32 (4 bytes)
        let payload_size = (&bytes[HEADER_PAYLOAD_LEN_RANGE]).read_u32::<LittleEndian>()?;

        // checksum char[4]
        let checksum = (&bytes[HEADER_CHECKSUM_RANGE]).read_u32::<LittleEndian>()?;

        Ok(Self {
            magic,
            command,
            payload_size,
            checksum,
        })
    }
}

/// First 4 bytes of SHA256(SHA256(payload)), as the little-endian u32
/// carried in the heading.
pub fn checksum(payload: &[u8]) -> u32 {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    let hash = hasher.finalize();

    let mut hasher = Sha256::new();
    hasher.update(hash);
    let hash = hasher.finalize();

    let mut buffer = [0u8; CHECKSUM_SIZE];
    buffer.copy_from_slice(&hash[..CHECKSUM_SIZE]);

    u32::from_le_bytes(buffer)
}
