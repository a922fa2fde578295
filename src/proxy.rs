use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use super::command::Command;
use super::dispatch::{Dispatch, MessageSubscriber};
use super::errors::{P2pError, Result};
use super::heading::{checksum, Heading};
use super::message::{serialize, NetMessage};
use super::network::Network;
use super::socket::Socket;
use super::subscriber::StopSubscriber;
use super::HEADER_SIZE;

/// Hooks into the surrounding channel abstraction, injected at
/// construction.
pub trait ChannelHooks: Send + Sync {
    /// A frame arrived; liveness timers should reset.
    fn on_activity(&self) {}

    /// The channel is stopping; timers should cancel.
    fn on_stopping(&self) {}
}

/// Hook set for channels without a surrounding session layer.
pub(crate) struct NoopHooks;

impl ChannelHooks for NoopHooks {}

/// Manages all socket communication for one peer, thread safe.
///
/// Born stopped. [`start`](Self::start) begins the framed read cycle, which
/// runs until [`stop`](Self::stop) or a terminal read error. The heading
/// and payload buffers are owned by the read task; at most one read is
/// outstanding, so sequential ordering replaces a lock.
pub struct Proxy {
    protocol_magic: u32,
    authority: SocketAddr,
    socket: Arc<Socket>,
    started: AtomicBool,
    stopped: AtomicBool,
    version: AtomicU32,
    max_payload: usize,
    message_subscriber: MessageSubscriber,
    stop_subscriber: StopSubscriber,
    hooks: Box<dyn ChannelHooks>,
}

impl Proxy {
    pub fn new(
        socket: Socket,
        network: Network,
        protocol_maximum: u32,
        hooks: Box<dyn ChannelHooks>,
    ) -> Self {
        let socket = Arc::new(socket);

        Self {
            protocol_magic: network.magic(),
            authority: socket.authority(),
            socket,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(true),
            version: AtomicU32::new(protocol_maximum),
            max_payload: Heading::maximum_payload_size(protocol_maximum),
            message_subscriber: MessageSubscriber::new(),
            stop_subscriber: StopSubscriber::new(),
            hooks,
        }
    }

    // Properties.
    // ------------------------------------------------------------------

    /// The authority of the far end of this socket.
    pub fn authority(&self) -> SocketAddr {
        self.authority
    }

    /// The negotiated protocol version of this socket.
    pub fn negotiated_version(&self) -> u32 {
        self.version.load(Ordering::SeqCst)
    }

    /// Save the negotiated protocol version.
    /// The value should be the lesser of own max and peer min.
    pub fn set_negotiated_version(&self, value: u32) {
        self.version.store(value, Ordering::SeqCst);
    }

    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    // Start sequence.
    // ------------------------------------------------------------------

    /// Begin the read cycle. The completion handler runs before the first
    /// read is issued, so subscriptions made inside it cannot miss a
    /// message. A proxy starts at most once; it cannot be restarted.
    pub fn start<F>(self: Arc<Self>, handler: F)
    where
        F: FnOnce(Result<()>),
    {
        if self.started.swap(true, Ordering::SeqCst) {
            handler(Err(P2pError::OperationFailed));
            return;
        }

        self.stopped.store(false, Ordering::SeqCst);
        self.stop_subscriber.start();
        self.message_subscriber.start();

        // Allow for subscription before first read, so no messages are missed.
        handler(Ok(()));

        // Start the read cycle. The task keeps the proxy alive.
        tokio::spawn(async move { self.read_loop().await });
    }

    // Subscriptions.
    // ------------------------------------------------------------------

    /// Subscribe to messages of the specified type on the socket.
    pub fn subscribe<M, F>(&self, handler: F)
    where
        M: NetMessage + Clone,
        MessageSubscriber: Dispatch<M>,
        F: FnOnce(Result<M>) + Send + 'static,
    {
        self.message_subscriber.subscribe(handler);
    }

    /// Subscribe to the stop event.
    pub fn subscribe_stop<F>(&self, handler: F)
    where
        F: FnOnce(P2pError) + Send + 'static,
    {
        self.stop_subscriber.subscribe(handler);
    }

    // Read cycle (read continues until stop).
    // ------------------------------------------------------------------

    async fn read_loop(self: Arc<Self>) {
        let mut heading_buffer = [0u8; HEADER_SIZE];
        // Preallocated to the payload cap; resizes below never reallocate.
        let mut payload_buffer: Vec<u8> = Vec::with_capacity(self.max_payload);

        loop {
            if self.stopped() {
                return;
            }
            let Some(heading) = self.read_heading(&mut heading_buffer).await else {
                return;
            };
            if self.stopped() {
                return;
            }
            if !self.read_payload(&heading, &mut payload_buffer).await {
                return;
            }
        }
    }

    async fn read_heading(&self, buffer: &mut [u8; HEADER_SIZE]) -> Option<Heading> {
        if let Err(code) = self.socket.read_exact(buffer).await {
            if !self.stopped() {
                tracing::debug!("Heading read failure [{}] {}", self.authority, code);
                self.stop(code);
            }
            return None;
        }

        let heading = match Heading::from_bytes(buffer) {
            Ok(heading) => heading,
            Err(_) => {
                tracing::warn!("Invalid heading from [{}]", self.authority);
                self.stop(P2pError::BadStream);
                return None;
            }
        };

        if heading.magic != self.protocol_magic {
            tracing::warn!(
                "Invalid heading magic ({:#010x}) from [{}]",
                heading.magic,
                self.authority
            );
            self.stop(P2pError::BadStream);
            return None;
        }

        if heading.payload_size as usize > self.max_payload {
            tracing::warn!(
                "Oversized payload indicated by {} heading from [{}] ({} bytes)",
                heading.command.as_str(),
                self.authority,
                heading.payload_size
            );
            self.stop(P2pError::BadStream);
            return None;
        }

        self.hooks.on_activity();
        Some(heading)
    }

    async fn read_payload(&self, heading: &Heading, buffer: &mut Vec<u8>) -> bool {
        // Within the preallocated capacity; this does not reallocate.
        buffer.resize(heading.payload_size as usize, 0);

        if let Err(code) = self.socket.read_exact(&mut buffer[..]).await {
            if !self.stopped() {
                tracing::debug!("Payload read failure [{}] {}", self.authority, code);
                self.stop(code);
            }
            return false;
        }

        if heading.checksum != checksum(buffer) {
            tracing::warn!(
                "Invalid {} payload from [{}] bad checksum",
                heading.command.as_str(),
                self.authority
            );
            self.stop(P2pError::BadStream);
            return false;
        }

        match self
            .message_subscriber
            .load(&heading.command, self.negotiated_version(), buffer)
        {
            Ok(()) => {}
            Err(P2pError::BadStream) => {
                tracing::warn!(
                    "Invalid {} payload from [{}] trailing bytes",
                    heading.command.as_str(),
                    self.authority
                );
                self.stop(P2pError::BadStream);
                return false;
            }
            Err(code) => {
                tracing::warn!(
                    "Invalid {} payload from [{}] {}",
                    heading.command.as_str(),
                    self.authority,
                    code
                );
                self.stop(code);
                return false;
            }
        }

        tracing::debug!(
            "Valid {} payload from [{}] ({} bytes)",
            heading.command.as_str(),
            self.authority,
            heading.payload_size
        );

        self.hooks.on_activity();
        true
    }

    // Message send sequence.
    // ------------------------------------------------------------------

    /// Serialize and send a message on the socket. Concurrent sends
    /// complete in FIFO order.
    pub async fn send<M: NetMessage>(&self, message: &M) -> Result<()> {
        let buffer = serialize(message, self.negotiated_version(), self.protocol_magic)?;
        self.do_send(M::COMMAND, buffer).await
    }

    async fn do_send(&self, command: Command, buffer: Vec<u8>) -> Result<()> {
        if self.stopped() {
            return Err(P2pError::ChannelStopped);
        }

        tracing::debug!(
            "Sending {} to [{}] ({} bytes)",
            command.as_str(),
            self.authority,
            buffer.len()
        );

        let result = self.socket.write_all(&buffer).await;
        if let Err(code) = &result {
            tracing::debug!(
                "Failure sending {} byte message to [{}] {}",
                buffer.len(),
                self.authority,
                code
            );
        }

        result
    }

    // Stop sequence.
    // ------------------------------------------------------------------

    /// Stop reading and sending on this socket.
    ///
    /// Not short-circuited on the stopped flag: the broadcast side effects
    /// must occur at least once, and every sub-step is itself idempotent.
    /// No lock is held while subscriber callbacks run.
    pub fn stop(&self, code: P2pError) {
        self.stopped.store(true, Ordering::SeqCst);

        // Prevent subscription after stop, then flush pending handlers.
        self.message_subscriber.stop();
        self.message_subscriber.broadcast(P2pError::ChannelStopped);

        // Prevent subscription after stop, then deliver the terminal code.
        self.stop_subscriber.stop(code.clone());
        self.stop_subscriber.relay(code);

        // Give the surrounding channel opportunity to terminate timers.
        self.hooks.on_stopping();

        // The socket is internally guarded against concurrent use.
        self.socket.close();
    }
}

impl Drop for Proxy {
    fn drop(&mut self) {
        debug_assert!(self.stopped(), "the channel was not stopped");
    }
}
