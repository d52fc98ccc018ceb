//! WebSocket front end
//!
//! Accepts clients on one TCP listener and gives each its own task. Tasks
//! only decode frames and forward them to the control worker; they hold no
//! control state of their own.

pub mod connection;

use crate::config::ServerConfig;
use crate::control::ControlHandle;
use connection::{serve_client, Keepalive};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read listener address: {0}")]
    LocalAddr(#[source] std::io::Error),
}

pub struct WsServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    keepalive: Keepalive,
}

impl WsServer {
    pub async fn bind(config: &ServerConfig) -> Result<Self, ServerError> {
        Self::bind_with(
            config.bind_addr(),
            Keepalive {
                interval: config.ping_interval(),
                timeout: config.ping_timeout(),
            },
        )
        .await
    }

    pub async fn bind_with(addr: SocketAddr, keepalive: Keepalive) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr().map_err(ServerError::LocalAddr)?;
        Ok(Self {
            listener,
            local_addr,
            keepalive,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts clients until `shutdown` fires, then waits for every
    /// connection task to unregister its client.
    pub async fn run(self, control: ControlHandle, shutdown: CancellationToken) {
        let tasks = TaskTracker::new();
        info!("Listening on ws://{}", self.local_addr);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        info!("Client connected from {}", peer);
                        tasks.spawn(serve_client(
                            stream,
                            peer,
                            control.clone(),
                            self.keepalive,
                            shutdown.clone(),
                        ));
                    }
                    Err(e) => {
                        error!("Accept failed: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
            }
        }

        tasks.close();
        info!("Waiting for {} connection(s) to close", tasks.len());
        tasks.wait().await;
        info!("WebSocket server stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{ControlCore, ControlState};
    use crate::device::testing::{FakeProbe, PadCall};
    use crate::device::{select_output, KeyboardSettings};
    use futures_util::SinkExt;
    use std::net::Ipv4Addr;
    use tokio::task::JoinHandle;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message;

    struct Bridge {
        probe: FakeProbe,
        control: ControlHandle,
        addr: SocketAddr,
        shutdown: CancellationToken,
        server: JoinHandle<()>,
    }

    async fn start(keepalive: Keepalive) -> Bridge {
        let probe = FakeProbe::all();
        let (control, _worker) = ControlHandle::spawn(ControlCore::new(
            ControlState::new(900.0),
            select_output(&probe, KeyboardSettings::default()),
        ));
        let server = WsServer::bind_with(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)), keepalive)
            .await
            .unwrap();
        let addr = server.local_addr();
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(server.run(control.clone(), shutdown.clone()));
        Bridge {
            probe,
            control,
            addr,
            shutdown,
            server,
        }
    }

    fn relaxed() -> Keepalive {
        Keepalive {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(30),
        }
    }

    async fn wait_until(control: &ControlHandle, pred: impl Fn(&ControlState) -> bool) {
        for _ in 0..200 {
            if pred(&control.snapshot().await.unwrap()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached: {:?}", control.snapshot().await);
    }

    #[tokio::test]
    async fn update_reaches_device_and_disconnect_neutralizes() {
        let bridge = start(relaxed()).await;
        let (mut ws, _) = connect_async(format!("ws://{}", bridge.addr)).await.unwrap();

        ws.send(Message::Text(
            r#"{"command":"update","data":{"steering":450,"accelerator":80,"brake":0}}"#.into(),
        ))
        .await
        .unwrap();
        wait_until(&bridge.control, |s| s.accelerator() > 0.0).await;

        let committed = bridge.probe.pad.committed();
        assert!((committed.steering - 0.5).abs() < 1e-6);
        assert!((committed.right_trigger - 0.8).abs() < 1e-6);
        assert_eq!(committed.left_trigger, 0.0);

        ws.close(None).await.unwrap();
        wait_until(&bridge.control, |s| s.is_neutral()).await;

        assert!(bridge.probe.pad.calls().contains(&PadCall::Reset));
        assert_eq!(bridge.probe.pad.committed(), Default::default());

        bridge.shutdown.cancel();
        bridge.server.await.unwrap();
    }

    #[tokio::test]
    async fn malformed_frame_keeps_connection_open() {
        let bridge = start(relaxed()).await;
        let (mut ws, _) = connect_async(format!("ws://{}", bridge.addr)).await.unwrap();

        ws.send(Message::Text("{not json".into())).await.unwrap();
        ws.send(Message::Text(
            r#"{"command":"handbrake_press"}"#.into(),
        ))
        .await
        .unwrap();

        wait_until(&bridge.control, |s| s.handbrake_engaged()).await;
        let state = bridge.control.snapshot().await.unwrap();
        assert_eq!(state.steering_angle(), 0.0);
        assert_eq!(state.accelerator(), 0.0);

        bridge.shutdown.cancel();
        bridge.server.await.unwrap();
    }

    #[tokio::test]
    async fn second_client_keeps_state_when_first_leaves() {
        let bridge = start(relaxed()).await;
        let url = format!("ws://{}", bridge.addr);
        let (mut first, _) = connect_async(url.as_str()).await.unwrap();
        let (_second, _) = connect_async(url.as_str()).await.unwrap();

        first
            .send(Message::Text(
                r#"{"command":"update","data":{"steering":-120}}"#.into(),
            ))
            .await
            .unwrap();
        wait_until(&bridge.control, |s| s.steering_angle() == -120.0).await;

        first.close(None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(
            bridge.control.snapshot().await.unwrap().steering_angle(),
            -120.0
        );

        bridge.shutdown.cancel();
        bridge.server.await.unwrap();
    }

    #[tokio::test]
    async fn silent_client_is_dropped_after_keepalive_timeout() {
        let bridge = start(Keepalive {
            interval: Duration::from_millis(200),
            timeout: Duration::from_millis(100),
        })
        .await;
        // never polled after the send, so pings go unanswered
        let (mut ws, _) = connect_async(format!("ws://{}", bridge.addr)).await.unwrap();
        ws.send(Message::Text(
            r#"{"command":"update","data":{"brake":100}}"#.into(),
        ))
        .await
        .unwrap();

        wait_until(&bridge.control, |s| s.brake() == 1.0).await;
        wait_until(&bridge.control, |s| s.is_neutral()).await;

        bridge.shutdown.cancel();
        bridge.server.await.unwrap();
    }

    #[tokio::test]
    async fn stalled_handshake_does_not_block_shutdown() {
        let bridge = start(relaxed()).await;
        // plain TCP, no upgrade request
        let _stalled = tokio::net::TcpStream::connect(bridge.addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        bridge.shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(3), bridge.server)
            .await
            .expect("server kept waiting on the stalled peer")
            .unwrap();
        assert!(bridge.control.snapshot().await.unwrap().is_neutral());
    }
}
