use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{RwLock, RwLockUpgradableReadGuard};

use super::channel::Channel;
use super::errors::{P2pError, Result};

/// Thread-safe set of live channels.
///
/// No two stored channels share an authority and no two share a nonce.
/// Reads take the lock in shared mode; it is upgraded to exclusive only
/// when a mutation is actually required.
pub struct Connections {
    channels: RwLock<Vec<Channel>>,
    stopped: AtomicBool,
}

impl Connections {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Reserve for the expected connection count up front.
    pub fn with_capacity(expected: usize) -> Self {
        Self {
            channels: RwLock::new(Vec::with_capacity(expected)),
            stopped: AtomicBool::new(false),
        }
    }

    /// Store a channel, refusing duplicates by authority or nonce.
    pub fn store(&self, channel: &Channel) -> Result<()> {
        let authority = channel.authority();
        let nonce = channel.nonce();

        let guard = self.channels.upgradable_read();

        if self.stopped.load(Ordering::SeqCst) {
            return Err(P2pError::ServiceStopped);
        }

        let found = guard
            .iter()
            .any(|entry| entry.authority() == authority || entry.nonce() == nonce);
        if found {
            return Err(P2pError::AddressInUse);
        }

        let mut guard = RwLockUpgradableReadGuard::upgrade(guard);
        guard.push(channel.clone());
        Ok(())
    }

    /// Remove a channel by identity.
    pub fn remove(&self, channel: &Channel) -> Result<()> {
        let guard = self.channels.upgradable_read();

        let Some(index) = guard.iter().position(|entry| entry.same(channel)) else {
            return Err(P2pError::NotFound);
        };

        let mut guard = RwLockUpgradableReadGuard::upgrade(guard);
        guard.remove(index);
        Ok(())
    }

    pub fn exists(&self, authority: SocketAddr) -> bool {
        self.channels
            .read()
            .iter()
            .any(|entry| entry.authority() == authority)
    }

    pub fn count(&self) -> usize {
        self.channels.read().len()
    }

    /// Stop every stored channel. Idempotent.
    ///
    /// The list is snapshotted and the lock released before any channel is
    /// stopped: stop handlers are expected to call back into
    /// [`remove`](Self::remove), and must not find the registry locked.
    pub fn stop(&self, code: P2pError) {
        let channels = {
            let guard = self.channels.upgradable_read();
            if self.stopped.swap(true, Ordering::SeqCst) {
                Vec::new()
            } else {
                // Once stopped the list cannot grow, but must copy to
                // escape the lock.
                guard.clone()
            }
        };

        for channel in channels {
            channel.stop(code.clone());
        }
    }
}

impl Default for Connections {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Network;
    use crate::socket::Socket;
    use crate::PROTOCOL_VERSION;
    use std::sync::Arc;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::mpsc;
    use tokio::time::{timeout, Duration};

    /// Channels built by connecting to one listener share its authority.
    struct Harness {
        listener: TcpListener,
        accepted: Vec<TcpStream>,
    }

    impl Harness {
        async fn new() -> Self {
            Self {
                listener: TcpListener::bind("127.0.0.1:0").await.unwrap(),
                accepted: Vec::new(),
            }
        }

        async fn outbound_channel(&mut self) -> Channel {
            let address = self.listener.local_addr().unwrap();
            let client = TcpStream::connect(address).await.unwrap();
            let (server, _) = self.listener.accept().await.unwrap();
            self.accepted.push(server);

            Channel::new(
                Socket::new(client).unwrap(),
                Network::MainNet,
                PROTOCOL_VERSION,
            )
        }
    }

    #[tokio::test]
    async fn test_store_and_count() {
        let mut harness = Harness::new().await;
        let connections = Connections::new();

        let channel = harness.outbound_channel().await;
        assert_eq!(connections.count(), 0);
        connections.store(&channel).unwrap();
        assert_eq!(connections.count(), 1);
        assert!(connections.exists(channel.authority()));
    }

    #[tokio::test]
    async fn test_duplicate_authority_is_rejected() {
        let mut harness = Harness::new().await;
        let connections = Connections::new();

        // Both point at the same listener, so they share an authority.
        let a = harness.outbound_channel().await.with_nonce(1);
        let b = harness.outbound_channel().await.with_nonce(2);
        assert_eq!(a.authority(), b.authority());

        connections.store(&a).unwrap();
        assert_eq!(connections.store(&b), Err(P2pError::AddressInUse));
        assert_eq!(connections.count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_nonce_is_rejected() {
        let mut harness_a = Harness::new().await;
        let mut harness_b = Harness::new().await;
        let connections = Connections::new();

        let a = harness_a.outbound_channel().await.with_nonce(7);
        let b = harness_b.outbound_channel().await.with_nonce(7);
        assert_ne!(a.authority(), b.authority());

        connections.store(&a).unwrap();
        assert_eq!(connections.store(&b), Err(P2pError::AddressInUse));
    }

    #[tokio::test]
    async fn test_remove_twice_is_not_found() {
        let mut harness = Harness::new().await;
        let connections = Connections::new();

        let channel = harness.outbound_channel().await;
        connections.store(&channel).unwrap();

        connections.remove(&channel).unwrap();
        assert_eq!(connections.remove(&channel), Err(P2pError::NotFound));
        assert_eq!(connections.count(), 0);
    }

    #[tokio::test]
    async fn test_store_after_stop_is_service_stopped() {
        let mut harness = Harness::new().await;
        let connections = Connections::new();

        connections.stop(P2pError::ServiceStopped);

        let channel = harness.outbound_channel().await;
        assert_eq!(
            connections.store(&channel),
            Err(P2pError::ServiceStopped)
        );
    }

    #[tokio::test]
    async fn test_stop_stops_each_channel_once() {
        let mut harness = Harness::new().await;
        let connections = Arc::new(Connections::new());

        let channel = harness.outbound_channel().await;
        channel.start(|result| result.unwrap());
        connections.store(&channel).unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let registry = Arc::clone(&connections);
        let stored = channel.clone();
        channel.subscribe_stop(move |code| {
            // Stop handlers remove their channel from the registry.
            let _ = registry.remove(&stored);
            tx.send(code).unwrap();
        });

        connections.stop(P2pError::ServiceStopped);
        connections.stop(P2pError::ServiceStopped);

        let code = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(code.unwrap(), P2pError::ServiceStopped);
        assert!(rx.try_recv().is_err());

        assert_eq!(connections.count(), 0);
        assert!(channel.stopped());
    }
}
