use std::net::SocketAddr;
use std::sync::OnceLock;

use tokio::net::{TcpListener, TcpSocket};
use tokio_util::sync::CancellationToken;

use super::channel::Channel;
use super::errors::{P2pError, Result};
use super::network::Network;
use super::socket::Socket;

const LISTEN_BACKLOG: u32 = 1024;

/// Creates inbound channels, thread and lock safe.
///
/// [`listen`](Self::listen) binds once; [`accept`](Self::accept) yields
/// channels until [`stop`](Self::stop), after which accepts complete with
/// `ServiceStopped`.
pub struct Acceptor {
    network: Network,
    protocol_maximum: u32,
    listener: OnceLock<TcpListener>,
    stopped: CancellationToken,
}

impl Acceptor {
    pub fn new(network: Network, protocol_maximum: u32) -> Self {
        Self {
            network,
            protocol_maximum,
            listener: OnceLock::new(),
            stopped: CancellationToken::new(),
        }
    }

    /// Start the listener on the specified port with address reuse.
    pub fn listen(&self, port: u16) -> Result<()> {
        if self.stopped.is_cancelled() {
            return Err(P2pError::ServiceStopped);
        }

        let socket = TcpSocket::new_v4()?;
        socket.set_reuseaddr(true)?;
        socket.bind(SocketAddr::from(([0, 0, 0, 0], port)))?;
        let listener = socket.listen(LISTEN_BACKLOG)?;

        self.listener
            .set(listener)
            .map_err(|_| P2pError::OperationFailed)
    }

    /// The bound address, once listening.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        let listener = self.listener.get().ok_or(P2pError::OperationFailed)?;
        Ok(listener.local_addr()?)
    }

    /// Accept the next connection available, until canceled.
    pub async fn accept(&self) -> Result<Channel> {
        let listener = self.listener.get().ok_or(P2pError::OperationFailed)?;

        tokio::select! {
            biased;
            _ = self.stopped.cancelled() => Err(P2pError::ServiceStopped),
            result = listener.accept() => {
                let (stream, _) = result?;
                stream.set_nodelay(true)?;
                let socket = Socket::new(stream)?;
                Ok(Channel::new(socket, self.network, self.protocol_maximum))
            }
        }
    }

    /// Cancel the listener and all outstanding accept attempts. Idempotent.
    pub fn stop(&self) {
        self.stopped.cancel();
    }
}
