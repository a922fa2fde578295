use super::errors::{P2pError, Result};
use super::COMMAND_NAME_SIZE;

/// Wire command tag, carried as 12 NUL-padded ASCII bytes in the heading.
///
/// Tags this crate does not know are preserved as [`Command::Unknown`]; the
/// read loop consumes and drops their payloads without dispatching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Version,
    Verack,
    Ping,
    Pong,
    GetAddr,
    Addr,
    Unknown(String),
}

impl Command {
    pub fn as_str(&self) -> &str {
        match self {
            Command::Version => "version",
            Command::Verack => "verack",
            Command::Ping => "ping",
            Command::Pong => "pong",
            Command::GetAddr => "getaddr",
            Command::Addr => "addr",
            Command::Unknown(name) => name,
        }
    }

    /// 12-byte NUL-padded wire form.
    pub fn to_bytes(&self) -> [u8; COMMAND_NAME_SIZE] {
        let name = self.as_str().as_bytes();
        debug_assert!(name.len() <= COMMAND_NAME_SIZE);

        let mut padded = [0u8; COMMAND_NAME_SIZE];
        padded[..name.len()].copy_from_slice(name);
        padded
    }

    /// Parse the command field of a heading. A NUL before the end of the
    /// name must be followed only by NULs; anything else is a framing error.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != COMMAND_NAME_SIZE {
            return Err(P2pError::BadStream);
        }

        let end = bytes
            .iter()
            .position(|&byte| byte == 0x00)
            .unwrap_or(COMMAND_NAME_SIZE);
        let (name, padding) = bytes.split_at(end);

        if name.is_empty()
            || !name.iter().all(|byte| byte.is_ascii_graphic())
            || padding.iter().any(|&byte| byte != 0x00)
        {
            return Err(P2pError::BadStream);
        }

        // Validated as ASCII above.
        let name = std::str::from_utf8(name).map_err(|_| P2pError::BadStream)?;

        Ok(match name {
            "version" => Self::Version,
            "verack" => Self::Verack,
            "ping" => Self::Ping,
            "pong" => Self::Pong,
            "getaddr" => Self::GetAddr,
            "addr" => Self::Addr,
            _ => Self::Unknown(name.to_string()),
        })
    }
}
