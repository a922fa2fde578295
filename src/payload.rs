use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::{
    io::{self, Read, Write},
    net::SocketAddr,
};

use super::command::Command;
use super::errors::{P2pError, Result};
use super::message::NetMessage;
use super::{BIP31_VERSION, RELAY_VERSION};

/// addr messages with more entries than this are rejected.
const MAX_ADDRESSES: u64 = 1000;

fn decode_failure(err: io::Error) -> P2pError {
    P2pError::Decode(err.to_string())
}

pub struct ServiceFlags(u64);

impl ServiceFlags {
    /// This node is not a full node. It may not be able to provide any data except for the transactions it originates.
    pub const UNNAMED: ServiceFlags = ServiceFlags(0);

    /// This is a full node and can be asked for full blocks. It should implement all protocol features available in its self-reported protocol version
    pub const NODE_NETWORK: ServiceFlags = ServiceFlags(0x1);

    /// This is a full node capable of responding to the getutxo protocol request. This is not supported by any currently-maintained Bitcoin node.
    pub const NODE_GETUTXO: ServiceFlags = ServiceFlags(0x2);

    /// This is a full node capable and willing to handle bloom-filtered connections.
    pub const NODE_BLOOM: ServiceFlags = ServiceFlags(0x4);

    /// This is a full node that can be asked for blocks and transactions including witness data.
    pub const NODE_WITNESS: ServiceFlags = ServiceFlags(0x8);

    /// This is a full node that supports Xtreme Thinblocks. This is not supported by any currently-maintained Bitcoin node.
    pub const NODE_XTHIN: ServiceFlags = ServiceFlags(0x10);

    /// This is the same as NODE_NETWORK but the node has at least the last 288 blocks (last 2 days).
    pub const NODE_NETWORK_LIMITED: ServiceFlags = ServiceFlags(0x0400);

    /// Gets the integer representation of this ServiceFlags
    pub fn to_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for ServiceFlags {
    fn from(n: u64) -> Self {
        ServiceFlags(n)
    }
}

/// A peer endpoint as carried inside version and addr payloads: service
/// flags, a 16-byte IP (IPv4 mapped into IPv6) and a big-endian port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkAddress {
    pub services: u64,
    pub ip: [u8; 16],
    pub port: u16,
}

impl NetworkAddress {
    pub fn from_socket_addr(services: u64, socket: SocketAddr) -> Self {
        let ip = match socket.ip() {
            std::net::IpAddr::V4(x) => x.to_ipv6_mapped(),
            std::net::IpAddr::V6(x) => x,
        }
        .octets();

        Self {
            services,
            ip,
            port: socket.port(),
        }
    }

    fn write_into(&self, buffer: &mut Vec<u8>) -> io::Result<()> {
        buffer.write_u64::<LittleEndian>(self.services)?;
        buffer.write_all(&self.ip)?;
        buffer.write_u16::<byteorder::BigEndian>(self.port)?;
        Ok(())
    }

    fn read_from(reader: &mut &[u8]) -> io::Result<Self> {
        let services = reader.read_u64::<LittleEndian>()?;
        let mut ip = [0u8; 16];
        reader.read_exact(&mut ip)?;
        let port = reader.read_u16::<byteorder::BigEndian>()?;

        Ok(Self { services, ip, port })
    }
}

/// An addr entry: the address plus the moment it was last known good.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampedAddress {
    pub timestamp: u32,
    pub address: NetworkAddress,
}

/// The version message payload:
/// https://developer.bitcoin.org/reference/p2p_networking.html#version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub version: i32,
    pub services: u64,
    pub timestamp: i64,
    pub receiver: NetworkAddress,
    pub sender: NetworkAddress,
    pub nonce: u64,
    pub user_agent: String,
    pub start_height: i32,
    pub relay: bool,
}

impl Version {
    fn write_into(&self, buffer: &mut Vec<u8>, version: u32) -> io::Result<()> {
        buffer.write_i32::<LittleEndian>(self.version)?;
        buffer.write_u64::<LittleEndian>(self.services)?;
        buffer.write_i64::<LittleEndian>(self.timestamp)?;
        self.receiver.write_into(buffer)?;
        self.sender.write_into(buffer)?;
        buffer.write_u64::<LittleEndian>(self.nonce)?;
        write_var_int(buffer, self.user_agent.len() as u64)?;
        buffer.write_all(self.user_agent.as_bytes())?;
        buffer.write_i32::<LittleEndian>(self.start_height)?;
        if version >= RELAY_VERSION {
            buffer.write_u8(self.relay.into())?;
        }
        Ok(())
    }

    fn read_from(reader: &mut &[u8], version: u32) -> io::Result<Self> {
        Ok(Self {
            version: reader.read_i32::<LittleEndian>()?,
            services: reader.read_u64::<LittleEndian>()?,
            timestamp: reader.read_i64::<LittleEndian>()?,
            receiver: NetworkAddress::read_from(reader)?,
            sender: NetworkAddress::read_from(reader)?,
            nonce: reader.read_u64::<LittleEndian>()?,
            user_agent: {
                let length = read_var_int(reader)? as usize;
                let mut bytes = vec![0u8; length];
                reader.read_exact(&mut bytes)?;
                String::from_utf8(bytes)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?
            },
            start_height: reader.read_i32::<LittleEndian>()?,
            relay: if version >= RELAY_VERSION {
                reader.read_u8()? != 0x00
            } else {
                false
            },
        })
    }
}

impl NetMessage for Version {
    const COMMAND: Command = Command::Version;

    fn encode(&self, version: u32) -> Result<Vec<u8>> {
        let mut buffer = vec![];
        self.write_into(&mut buffer, version)?;
        Ok(buffer)
    }

    fn decode(reader: &mut &[u8], version: u32) -> Result<Self> {
        Version::read_from(reader, version).map_err(decode_failure)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verack;

impl NetMessage for Verack {
    const COMMAND: Command = Command::Verack;

    fn encode(&self, _version: u32) -> Result<Vec<u8>> {
        Ok(vec![])
    }

    fn decode(_reader: &mut &[u8], _version: u32) -> Result<Self> {
        Ok(Verack)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ping {
    pub nonce: u64,
}

impl NetMessage for Ping {
    const COMMAND: Command = Command::Ping;

    fn encode(&self, version: u32) -> Result<Vec<u8>> {
        let mut buffer = vec![];
        if version >= BIP31_VERSION {
            buffer.write_u64::<LittleEndian>(self.nonce)?;
        }
        Ok(buffer)
    }

    fn decode(reader: &mut &[u8], version: u32) -> Result<Self> {
        // The nonce exists from BIP 31 on; before that a ping is bare.
        let nonce = if version >= BIP31_VERSION {
            reader.read_u64::<LittleEndian>().map_err(decode_failure)?
        } else {
            0
        };

        Ok(Self { nonce })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pong {
    pub nonce: u64,
}

impl NetMessage for Pong {
    const COMMAND: Command = Command::Pong;

    fn encode(&self, _version: u32) -> Result<Vec<u8>> {
        let mut buffer = vec![];
        buffer.write_u64::<LittleEndian>(self.nonce)?;
        Ok(buffer)
    }

    fn decode(reader: &mut &[u8], _version: u32) -> Result<Self> {
        let nonce = reader.read_u64::<LittleEndian>().map_err(decode_failure)?;
        Ok(Self { nonce })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetAddr;

impl NetMessage for GetAddr {
    const COMMAND: Command = Command::GetAddr;

    fn encode(&self, _version: u32) -> Result<Vec<u8>> {
        Ok(vec![])
    }

    fn decode(_reader: &mut &[u8], _version: u32) -> Result<Self> {
        Ok(GetAddr)
    }
}

/// Known-peer gossip payload: up to 1000 timestamped addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Addr {
    pub addresses: Vec<TimestampedAddress>,
}

impl Addr {
    fn write_into(&self, buffer: &mut Vec<u8>) -> io::Result<()> {
        write_var_int(buffer, self.addresses.len() as u64)?;
        for entry in &self.addresses {
            buffer.write_u32::<LittleEndian>(entry.timestamp)?;
            entry.address.write_into(buffer)?;
        }
        Ok(())
    }

    fn read_from(reader: &mut &[u8]) -> io::Result<Self> {
        let count = read_var_int(reader)?;
        if count > MAX_ADDRESSES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "addr exceeds 1000-entry limit",
            ));
        }

        let mut addresses = Vec::with_capacity(count as usize);
        for _ in 0..count {
            addresses.push(TimestampedAddress {
                timestamp: reader.read_u32::<LittleEndian>()?,
                address: NetworkAddress::read_from(reader)?,
            });
        }

        Ok(Self { addresses })
    }
}

impl NetMessage for Addr {
    const COMMAND: Command = Command::Addr;

    fn encode(&self, _version: u32) -> Result<Vec<u8>> {
        let mut buffer = vec![];
        self.write_into(&mut buffer)?;
        Ok(buffer)
    }

    fn decode(reader: &mut &[u8], _version: u32) -> Result<Self> {
        Addr::read_from(reader).map_err(decode_failure)
    }
}

/// CompactSize length prefix:
/// https://developer.bitcoin.org/reference/transactions.html#compactsize-unsigned-integers
fn write_var_int(buffer: &mut Vec<u8>, value: u64) -> io::Result<()> {
    match value {
        0..=0xfc => buffer.write_u8(value as u8),
        0xfd..=0xffff => {
            buffer.write_u8(0xfd)?;
            buffer.write_u16::<LittleEndian>(value as u16)
        }
        0x10000..=0xffff_ffff => {
            buffer.write_u8(0xfe)?;
            buffer.write_u32::<LittleEndian>(value as u32)
        }
        _ => {
            buffer.write_u8(0xff)?;
            buffer.write_u64::<LittleEndian>(value)
        }
    }
}

fn read_var_int(reader: &mut &[u8]) -> io::Result<u64> {
    match reader.read_u8()? {
        0xfd => Ok(reader.read_u16::<LittleEndian>()? as u64),
        0xfe => Ok(reader.read_u32::<LittleEndian>()? as u64),
        0xff => reader.read_u64::<LittleEndian>(),
        n => Ok(n as u64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PROTOCOL_VERSION;
    use quickcheck::TestResult;
    use quickcheck_macros::quickcheck;

    fn test_version() -> Version {
        Version {
            version: PROTOCOL_VERSION as i32,
            services: ServiceFlags::NODE_NETWORK.to_u64(),
            timestamp: 1700000000,
            receiver: NetworkAddress::from_socket_addr(
                ServiceFlags::NODE_NETWORK.to_u64(),
                "93.184.216.34:8333".parse().unwrap(),
            ),
            sender: NetworkAddress::from_socket_addr(
                ServiceFlags::NODE_NETWORK.to_u64(),
                "10.0.0.1:8333".parse().unwrap(),
            ),
            nonce: 0x1234567890abcdef,
            user_agent: "/btc-p2p-net:0.1.0/".to_string(),
            start_height: 820000,
            relay: true,
        }
    }

    #[quickcheck]
    fn test_ping_round_trip(nonce: u64) -> TestResult {
        let ping = Ping { nonce };
        let bytes = ping.encode(PROTOCOL_VERSION).unwrap();
        let decoded = Ping::decode(&mut bytes.as_slice(), PROTOCOL_VERSION).unwrap();
        TestResult::from_bool(decoded == ping)
    }

    #[test]
    fn test_ping_has_no_nonce_before_bip31() {
        let ping = Ping { nonce: 7 };
        assert!(ping.encode(BIP31_VERSION - 1).unwrap().is_empty());

        let mut reader: &[u8] = &[];
        let decoded = Ping::decode(&mut reader, BIP31_VERSION - 1).unwrap();
        assert_eq!(decoded.nonce, 0);
    }

    #[test]
    fn test_ping_nonce_is_little_endian() {
        let bytes = [0x01u8, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        let ping = Ping::decode(&mut bytes.as_slice(), PROTOCOL_VERSION).unwrap();
        assert_eq!(ping.nonce, 0x0807060504030201);
    }

    #[test]
    fn test_version_round_trip() {
        let version = test_version();
        let bytes = version.encode(PROTOCOL_VERSION).unwrap();
        let mut reader = bytes.as_slice();
        let decoded = Version::decode(&mut reader, PROTOCOL_VERSION).unwrap();

        assert_eq!(decoded, version);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_version_relay_gated_below_bip37() {
        let version = test_version();
        let gated = RELAY_VERSION - 1;

        let bytes = version.encode(gated).unwrap();
        assert_eq!(bytes.len(), version.encode(PROTOCOL_VERSION).unwrap().len() - 1);

        let decoded = Version::decode(&mut bytes.as_slice(), gated).unwrap();
        assert!(!decoded.relay);
    }

    #[test]
    fn test_version_truncated_payload_fails() {
        let bytes = test_version().encode(PROTOCOL_VERSION).unwrap();
        let result = Version::decode(&mut &bytes[..10], PROTOCOL_VERSION);
        assert!(matches!(result, Err(P2pError::Decode(_))));
    }

    #[test]
    fn test_addr_round_trip() {
        let addr = Addr {
            addresses: vec![
                TimestampedAddress {
                    timestamp: 1700000100,
                    address: NetworkAddress::from_socket_addr(1, "1.2.3.4:8333".parse().unwrap()),
                },
                TimestampedAddress {
                    timestamp: 1700000200,
                    address: NetworkAddress::from_socket_addr(1, "5.6.7.8:8334".parse().unwrap()),
                },
            ],
        };

        let bytes = addr.encode(PROTOCOL_VERSION).unwrap();
        let decoded = Addr::decode(&mut bytes.as_slice(), PROTOCOL_VERSION).unwrap();
        assert_eq!(decoded, addr);
    }

    #[test]
    fn test_addr_rejects_over_limit() {
        // count varint 0xfd + u16 = 1001, no entries follow
        let mut bytes = vec![0xfd];
        bytes.extend_from_slice(&1001u16.to_le_bytes());

        let result = Addr::decode(&mut bytes.as_slice(), PROTOCOL_VERSION);
        assert!(matches!(result, Err(P2pError::Decode(_))));
    }

    #[test]
    fn test_var_int_boundaries() {
        for value in [0u64, 0xfc, 0xfd, 0xffff, 0x10000, 0xffff_ffff, u64::MAX] {
            let mut buffer = vec![];
            write_var_int(&mut buffer, value).unwrap();
            assert_eq!(read_var_int(&mut buffer.as_slice()).unwrap(), value);
        }
    }
}
