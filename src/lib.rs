#![deny(unused_must_use, rust_2018_idioms)]

//! Bitcoin p2p wire channel core
//!
//! This crate turns a raw, byte-oriented socket into a typed, asynchronous,
//! multi-subscriber message channel obeying the Bitcoin p2p framing rules:
//! https://developer.bitcoin.org/reference/p2p_networking.html#message-headers
//!
//! A [`Channel`] drives a framed read loop over a [`Socket`], dispatches
//! incoming messages to typed subscribers and serializes outbound sends.
//! [`Acceptor`] yields inbound channels and [`Connections`] holds the live
//! channel set of a node.

mod acceptor;
mod channel;
mod command;
mod connections;
mod dispatch;
mod errors;
mod heading;
mod message;
mod network;
mod payload;
mod proxy;
mod socket;
mod subscriber;

pub use acceptor::Acceptor;
pub use channel::Channel;
pub use command::Command;
pub use connections::Connections;
pub use dispatch::{Dispatch, MessageSubscriber};
pub use errors::{P2pError, Result};
pub use heading::{checksum, Heading};
pub use message::{serialize, NetMessage};
pub use network::Network;
pub use payload::{
    Addr, GetAddr, NetworkAddress, Ping, Pong, ServiceFlags, TimestampedAddress, Verack, Version,
};
pub use proxy::{ChannelHooks, Proxy};
pub use socket::Socket;
pub use subscriber::{StopSubscriber, TypedSubscriber};

/// Protocol version for the BTC proto
/// https://developer.bitcoin.org/reference/p2p_networking.html#protocol-versions
pub const PROTOCOL_VERSION: u32 = 70015;

/// Pings and pongs carry a nonce from this version on (BIP 31).
pub const BIP31_VERSION: u32 = 60001;

/// The version message carries the relay flag from this version on (BIP 37).
pub const RELAY_VERSION: u32 = 70001;

/// Message format for the BTC proto:
/// https://developer.bitcoin.org/reference/p2p_networking.html#message-headers

/// Size of the network magic in the message heading
pub(crate) const MAGIC_SIZE: usize = 4;

/// Max size for the command name in the message heading
pub(crate) const COMMAND_NAME_SIZE: usize = 12;

/// Size of the payload length which is a uint32 in the message heading
pub(crate) const PAYLOAD_LEN_SIZE: usize = 4;

/// Size of the checksum in the message heading
pub(crate) const CHECKSUM_SIZE: usize = 4;

/// Total size of the message heading
pub const HEADER_SIZE: usize = MAGIC_SIZE + COMMAND_NAME_SIZE + PAYLOAD_LEN_SIZE + CHECKSUM_SIZE;

// 32 MB
pub const MAX_PAYLOAD_SIZE: usize = 32 * 1024 * 1024;

/// Position of the network magic in the message heading
pub(crate) const HEADER_MAGIC_RANGE: std::ops::Range<usize> = 0..4;

/// Position of the command name in the message heading
pub(crate) const HEADER_COMMAND_NAME_RANGE: std::ops::Range<usize> = 4..16;

/// Position of the payload length in the message heading
pub(crate) const HEADER_PAYLOAD_LEN_RANGE: std::ops::Range<usize> = 16..20;

/// Position of the checksum in the message heading
pub(crate) const HEADER_CHECKSUM_RANGE: std::ops::Range<usize> = 20..24;
