use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::errors::{P2pError, Result};

/// Owns a stream endpoint, thread safe.
///
/// Reads are serialized against each other, as are writes; a read and a
/// write may proceed in parallel. Queued writers complete in FIFO order.
/// [`close`](Self::close) may be called from any thread at any time and
/// makes pending and future operations complete with `ChannelStopped`.
pub struct Socket {
    authority: SocketAddr,
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    closed: CancellationToken,
}

impl Socket {
    pub fn new(stream: TcpStream) -> std::io::Result<Self> {
        let authority = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();

        Ok(Self {
            authority,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            closed: CancellationToken::new(),
        })
    }

    /// Remote endpoint identity, cached at construction.
    pub fn authority(&self) -> SocketAddr {
        self.authority
    }

    /// Fill `buffer` from the stream or fail.
    pub async fn read_exact(&self, buffer: &mut [u8]) -> Result<()> {
        let mut reader = self.reader.lock().await;
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(P2pError::ChannelStopped),
            result = reader.read_exact(buffer) => {
                result?;
                Ok(())
            }
        }
    }

    /// Write all of `buffer` to the stream or fail.
    pub async fn write_all(&self, buffer: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(P2pError::ChannelStopped),
            result = writer.write_all(buffer) => {
                result?;
                Ok(())
            }
        }
    }

    /// Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}
