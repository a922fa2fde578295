use super::errors::{P2pError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    MainNet,
    TestNet,
    RegTest,
}

impl Network {
    /// Wire magic as the little-endian u32 carried in the heading.
    pub fn magic(self) -> u32 {
        u32::from_le_bytes(self.to_bytes())
    }

    pub fn to_bytes(self) -> [u8; 4] {
        match self {
            Network::MainNet => [0xf9, 0xbe, 0xb4, 0xd9],
            Network::TestNet => [0x0b, 0x11, 0x09, 0x07],
            Network::RegTest => [0xfa, 0xbf, 0xb5, 0xda],
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        match bytes {
            [0xf9, 0xbe, 0xb4, 0xd9] => Ok(Self::MainNet),
            [0x0b, 0x11, 0x09, 0x07] => Ok(Self::TestNet),
            [0xfa, 0xbf, 0xb5, 0xda] => Ok(Self::RegTest),
            _ => Err(P2pError::BadStream),
        }
    }

    pub fn from_magic(magic: u32) -> Result<Self> {
        Network::from_bytes(&magic.to_le_bytes())
    }
}
