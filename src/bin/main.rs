use std::sync::Arc;

use anyhow::Result;
use btc_p2p_net::{
    Acceptor, Channel, Connections, Network, P2pError, Ping, Pong, PROTOCOL_VERSION,
};

const LISTEN_PORT: u16 = 8333;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let connections = Arc::new(Connections::with_capacity(8));
    let acceptor = Arc::new(Acceptor::new(Network::MainNet, PROTOCOL_VERSION));

    acceptor.listen(LISTEN_PORT)?;
    tracing::info!("Listening on port {}", LISTEN_PORT);

    let accept_loop = {
        let connections = Arc::clone(&connections);
        let acceptor = Arc::clone(&acceptor);

        tokio::spawn(async move {
            loop {
                match acceptor.accept().await {
                    Ok(channel) => attach(&connections, channel),
                    Err(P2pError::ServiceStopped) => break,
                    Err(err) => tracing::error!("Failed to accept connection: {}", err),
                }
            }
        })
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("Stopping {} connections", connections.count());

    acceptor.stop();
    connections.stop(P2pError::ServiceStopped);
    accept_loop.await?;

    Ok(())
}

/// Register an inbound channel and start serving pings on it.
fn attach(connections: &Arc<Connections>, channel: Channel) {
    if let Err(err) = connections.store(&channel) {
        tracing::warn!("Rejected channel from {}: {}", channel.authority(), err);
        channel.stop(P2pError::ChannelStopped);
        return;
    }

    tracing::info!("Accepted channel from {}", channel.authority());

    let registry = Arc::clone(connections);
    let stored = channel.clone();
    channel.start(move |result| {
        if let Err(err) = result {
            tracing::warn!("Failed to start channel: {}", err);
            return;
        }

        let removal = stored.clone();
        let registry = Arc::clone(&registry);
        stored.subscribe_stop(move |code| {
            tracing::info!("Channel {} stopped: {}", removal.authority(), code);
            let _ = registry.remove(&removal);
        });

        expect_ping(&stored);
    });
}

/// Answer the next ping with a pong, then re-arm.
fn expect_ping(channel: &Channel) {
    let subscription = channel.clone();
    channel.subscribe::<Ping, _>(move |event| {
        let Ok(ping) = event else { return };

        // Re-arm before answering so the next ping is not missed.
        expect_ping(&subscription);

        let responder = subscription.clone();
        tokio::spawn(async move {
            if let Err(err) = responder.send(&Pong { nonce: ping.nonce }).await {
                tracing::debug!("Failed to send pong to {}: {}", responder.authority(), err);
            }
        });
    });
}
