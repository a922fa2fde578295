use std::net::SocketAddr;
use std::sync::Arc;

use super::dispatch::{Dispatch, MessageSubscriber};
use super::errors::{P2pError, Result};
use super::message::NetMessage;
use super::network::Network;
use super::proxy::{ChannelHooks, NoopHooks, Proxy};
use super::socket::Socket;

/// A live peer connection: the proxy plus its registry identity.
///
/// Identified by both the peer authority and a local nonce minted at
/// construction, used to detect connecting to ourselves. Handles are cheap
/// to clone and all refer to the same underlying channel.
#[derive(Clone)]
pub struct Channel {
    proxy: Arc<Proxy>,
    nonce: u64,
}

impl Channel {
    pub fn new(socket: Socket, network: Network, protocol_maximum: u32) -> Self {
        Self::with_hooks(socket, network, protocol_maximum, Box::new(NoopHooks))
    }

    /// Construct with session hooks for activity and stop notifications.
    pub fn with_hooks(
        socket: Socket,
        network: Network,
        protocol_maximum: u32,
        hooks: Box<dyn ChannelHooks>,
    ) -> Self {
        Self {
            proxy: Arc::new(Proxy::new(socket, network, protocol_maximum, hooks)),
            nonce: rand::random(),
        }
    }

    /// Local nonce minted for self-connection detection.
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn authority(&self) -> SocketAddr {
        self.proxy.authority()
    }

    pub fn negotiated_version(&self) -> u32 {
        self.proxy.negotiated_version()
    }

    pub fn set_negotiated_version(&self, value: u32) {
        self.proxy.set_negotiated_version(value)
    }

    pub fn stopped(&self) -> bool {
        self.proxy.stopped()
    }

    /// Begin reading messages; see [`Proxy::start`].
    pub fn start<F>(&self, handler: F)
    where
        F: FnOnce(Result<()>),
    {
        Arc::clone(&self.proxy).start(handler)
    }

    pub fn stop(&self, code: P2pError) {
        self.proxy.stop(code)
    }

    pub async fn send<M: NetMessage>(&self, message: &M) -> Result<()> {
        self.proxy.send(message).await
    }

    pub fn subscribe<M, F>(&self, handler: F)
    where
        M: NetMessage + Clone,
        MessageSubscriber: Dispatch<M>,
        F: FnOnce(Result<M>) + Send + 'static,
    {
        self.proxy.subscribe(handler)
    }

    pub fn subscribe_stop<F>(&self, handler: F)
    where
        F: FnOnce(P2pError) + Send + 'static,
    {
        self.proxy.subscribe_stop(handler)
    }

    /// Two handles are the same channel iff they share a proxy.
    pub fn same(&self, other: &Channel) -> bool {
        Arc::ptr_eq(&self.proxy, &other.proxy)
    }

    #[cfg(test)]
    pub(crate) fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PROTOCOL_VERSION;
    use tokio::net::{TcpListener, TcpStream};

    async fn channel_pair() -> (Channel, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let client = TcpStream::connect(address).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();

        let channel = Channel::new(
            Socket::new(server).unwrap(),
            Network::MainNet,
            PROTOCOL_VERSION,
        );
        (channel, client)
    }

    #[tokio::test]
    async fn test_clones_share_identity() {
        let (channel, _client) = channel_pair().await;
        let clone = channel.clone();

        assert!(channel.same(&clone));
        assert_eq!(channel.nonce(), clone.nonce());
        assert_eq!(channel.authority(), clone.authority());
    }

    #[tokio::test]
    async fn test_distinct_channels_have_distinct_identity() {
        let (a, _client_a) = channel_pair().await;
        let (b, _client_b) = channel_pair().await;

        assert!(!a.same(&b));
        assert_ne!(a.nonce(), b.nonce());
    }

    #[tokio::test]
    async fn test_nonce_is_stable() {
        let (channel, _client) = channel_pair().await;
        assert_eq!(channel.nonce(), channel.nonce());
    }
}
