//! Per-client WebSocket task

use crate::control::{ControlError, ControlHandle};
use crate::protocol::Command;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Transport-level liveness settings
#[derive(Clone, Copy, Debug)]
pub struct Keepalive {
    pub interval: Duration,
    pub timeout: Duration,
}

async fn pong_overdue(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Decodes one frame and runs it through the control worker.
///
/// Malformed frames are logged and dropped; only a dead worker is an error.
async fn dispatch(
    control: &ControlHandle,
    peer: SocketAddr,
    payload: &[u8],
) -> Result<(), ControlError> {
    match Command::decode(payload) {
        Ok(command) => {
            debug!("{} -> {:?}", peer, command);
            control.execute(command).await?;
        }
        Err(e) => warn!("Dropping message from {}: {}", peer, e),
    }
    Ok(())
}

/// Serves one client from handshake to disconnect.
///
/// The client is registered after the handshake and always unregistered on
/// the way out, whatever ended the connection.
pub async fn serve_client(
    stream: TcpStream,
    peer: SocketAddr,
    control: ControlHandle,
    keepalive: Keepalive,
    shutdown: CancellationToken,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not disable Nagle for {}: {}", peer, e);
    }

    // bounded by shutdown and the keepalive timeout
    let ws = tokio::select! {
        _ = shutdown.cancelled() => {
            debug!("Shutdown during handshake with {}", peer);
            return;
        }
        handshake = time::timeout(keepalive.timeout, accept_async(stream)) => match handshake {
            Ok(Ok(ws)) => ws,
            Ok(Err(e)) => {
                warn!("WebSocket handshake with {} failed: {}", peer, e);
                return;
            }
            Err(_) => {
                warn!("WebSocket handshake with {} timed out", peer);
                return;
            }
        },
    };

    let id = match control.connect(peer).await {
        Ok(id) => id,
        Err(e) => {
            error!("Cannot register {}: {}", peer, e);
            return;
        }
    };

    let (mut ws_sink, mut ws_stream) = ws.split();
    let mut ping_timer = time::interval_at(Instant::now() + keepalive.interval, keepalive.interval);
    let mut pong_deadline: Option<Instant> = None;

    let reason = loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = ws_sink.send(Message::Close(None)).await;
                break "server shutdown";
            }

            _ = ping_timer.tick() => {
                if pong_deadline.is_none() {
                    if ws_sink.send(Message::Ping(Vec::new())).await.is_err() {
                        break "ping failed";
                    }
                    pong_deadline = Some(Instant::now() + keepalive.timeout);
                }
            }

            _ = pong_overdue(pong_deadline) => {
                break "keepalive timeout";
            }

            frame = ws_stream.next() => {
                let result = match frame {
                    Some(Ok(Message::Text(text))) => dispatch(&control, peer, text.as_bytes()).await,
                    Some(Ok(Message::Binary(bytes))) => dispatch(&control, peer, &bytes).await,
                    Some(Ok(Message::Pong(_))) => {
                        pong_deadline = None;
                        Ok(())
                    }
                    Some(Ok(Message::Close(_))) => break "closed by client",
                    // pings are answered by tungstenite itself
                    Some(Ok(_)) => Ok(()),
                    Some(Err(e)) => {
                        warn!("Transport error from {}: {}", peer, e);
                        break "transport error";
                    }
                    None => break "stream ended",
                };
                if let Err(e) = result {
                    error!("Dropping {}: {}", peer, e);
                    break "control worker gone";
                }
            }
        }
    };

    info!("Connection {} ({}) ended: {}", peer, id, reason);
    if let Err(e) = control.disconnect(id).await {
        error!("Failed to unregister {}: {}", id, e);
    }
}
