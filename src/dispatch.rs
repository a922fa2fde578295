use super::command::Command;
use super::errors::{P2pError, Result};
use super::message::NetMessage;
use super::payload::{Addr, GetAddr, Ping, Pong, Verack, Version};
use super::subscriber::TypedSubscriber;

/// Maps a message type onto its fan-out registry inside a
/// [`MessageSubscriber`]. One impl per known command keys compile-time
/// subscription and dispatch.
pub trait Dispatch<M: NetMessage> {
    fn subscriber(&self) -> &TypedSubscriber<M>;
}

/// Aggregate of typed subscribers, one per known command.
///
/// [`load`](Self::load) parses a payload under the negotiated version and
/// relays the concrete message to that command's subscribers. Unknown
/// commands succeed without dispatch; their payloads are dropped.
pub struct MessageSubscriber {
    version: TypedSubscriber<Version>,
    verack: TypedSubscriber<Verack>,
    ping: TypedSubscriber<Ping>,
    pong: TypedSubscriber<Pong>,
    getaddr: TypedSubscriber<GetAddr>,
    addr: TypedSubscriber<Addr>,
}

macro_rules! dispatch {
    ($message:ty, $field:ident) => {
        impl Dispatch<$message> for MessageSubscriber {
            fn subscriber(&self) -> &TypedSubscriber<$message> {
                &self.$field
            }
        }
    };
}

dispatch!(Version, version);
dispatch!(Verack, verack);
dispatch!(Ping, ping);
dispatch!(Pong, pong);
dispatch!(GetAddr, getaddr);
dispatch!(Addr, addr);

impl MessageSubscriber {
    pub fn new() -> Self {
        Self {
            version: TypedSubscriber::new(),
            verack: TypedSubscriber::new(),
            ping: TypedSubscriber::new(),
            pong: TypedSubscriber::new(),
            getaddr: TypedSubscriber::new(),
            addr: TypedSubscriber::new(),
        }
    }

    /// Arm every contained subscriber.
    pub fn start(&self) {
        self.version.start();
        self.verack.start();
        self.ping.start();
        self.pong.start();
        self.getaddr.start();
        self.addr.start();
    }

    /// Refuse new subscriptions on every contained subscriber.
    pub fn stop(&self) {
        self.version.stop(P2pError::ChannelStopped);
        self.verack.stop(P2pError::ChannelStopped);
        self.ping.stop(P2pError::ChannelStopped);
        self.pong.stop(P2pError::ChannelStopped);
        self.getaddr.stop(P2pError::ChannelStopped);
        self.addr.stop(P2pError::ChannelStopped);
    }

    /// Relay `code` to every pending handler of every contained subscriber.
    pub fn broadcast(&self, code: P2pError) {
        self.version.relay(Err(code.clone()));
        self.verack.relay(Err(code.clone()));
        self.ping.relay(Err(code.clone()));
        self.pong.relay(Err(code.clone()));
        self.getaddr.relay(Err(code.clone()));
        self.addr.relay(Err(code));
    }

    pub fn subscribe<M, F>(&self, handler: F)
    where
        M: NetMessage + Clone,
        Self: Dispatch<M>,
        F: FnOnce(Result<M>) + Send + 'static,
    {
        <Self as Dispatch<M>>::subscriber(self).subscribe(handler);
    }

    /// Parse `payload` as `command` under `version` and relay the result.
    ///
    /// The parser must consume the payload exactly; trailing bytes are a
    /// framing error. Unknown commands are consumed and dropped.
    pub fn load(&self, command: &Command, version: u32, payload: &[u8]) -> Result<()> {
        let mut reader = payload;
        match command {
            Command::Version => self.relay_parsed::<Version>(&mut reader, version)?,
            Command::Verack => self.relay_parsed::<Verack>(&mut reader, version)?,
            Command::Ping => self.relay_parsed::<Ping>(&mut reader, version)?,
            Command::Pong => self.relay_parsed::<Pong>(&mut reader, version)?,
            Command::GetAddr => self.relay_parsed::<GetAddr>(&mut reader, version)?,
            Command::Addr => self.relay_parsed::<Addr>(&mut reader, version)?,
            Command::Unknown(_) => return Ok(()),
        }

        if !reader.is_empty() {
            return Err(P2pError::BadStream);
        }

        Ok(())
    }

    fn relay_parsed<M>(&self, reader: &mut &[u8], version: u32) -> Result<()>
    where
        M: NetMessage + Clone,
        Self: Dispatch<M>,
    {
        let message = M::decode(reader, version)?;
        <Self as Dispatch<M>>::subscriber(self).relay(Ok(message));
        Ok(())
    }
}

impl Default for MessageSubscriber {
    fn default() -> Self {
        Self::new()
    }
}
