pub mod config;
pub mod control;
pub mod device;
pub mod protocol;
pub mod server;
pub mod session;

use crate::config::Config;
use crate::control::{ControlCore, ControlHandle, ControlState};
use crate::device::{platform_probe, select_output, DeviceKind};
use crate::server::WsServer;
use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::str::FromStr;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = Config::default_path()?;
    let config = Config::load_or_init(&config_path).await?;
    info!("Using config {}", config_path.display());

    // Output device first, so a missing backend shows up before clients do
    let probe = platform_probe();
    let device = select_output(probe.as_ref(), config.keyboard);
    let device_kind = device.kind();
    let state = ControlState::new(config.steering.max_rotation);
    let (control, worker) = ControlHandle::spawn(ControlCore::new(state, device));

    let server = WsServer::bind(&config.server)
        .await
        .map_err(|e| eyre!("Failed to start WebSocket server: {}", e))?;
    print_banner(&server, &config, device_kind);

    run_until(server, control, worker, tokio::signal::ctrl_c()).await
}

/// Serves until `signal` resolves, then stops the server and releases all
/// inputs. A failing signal source is returned as an error, after the same
/// orderly shutdown.
async fn run_until(
    server: WsServer,
    control: ControlHandle,
    worker: JoinHandle<()>,
    signal: impl Future<Output = io::Result<()>>,
) -> Result<()> {
    let shutdown = CancellationToken::new();
    let server_task = tokio::spawn(server.run(control.clone(), shutdown.clone()));

    let signal = signal.await;
    match &signal {
        Ok(()) => info!("Ctrl+C received, shutting down"),
        Err(e) => error!("Cannot listen for Ctrl+C, shutting down: {}", e),
    }

    shutdown.cancel();
    if let Err(e) = server_task.await {
        error!("Server task failed: {}", e);
    }
    if let Err(e) = control.shutdown().await {
        warn!("Control worker already stopped: {}", e);
    }
    worker.await?;

    signal.map_err(|e| eyre!("Shutdown signal unavailable: {}", e))?;
    info!("Bye");
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|value| Level::from_str(&value).ok())
        .unwrap_or(Level::INFO);

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

/// Address other machines on the LAN can reach us at.
///
/// Connecting a UDP socket sends nothing; it only makes the OS pick the
/// outbound interface.
fn lan_ip() -> IpAddr {
    UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|socket| {
            socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
            socket.local_addr()
        })
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

fn print_banner(server: &WsServer, config: &Config, device: DeviceKind) {
    let addr = server.local_addr();
    let reachable = if addr.ip().is_unspecified() {
        lan_ip()
    } else {
        addr.ip()
    };
    let max = config.steering.max_rotation;

    info!("Wheel bridge ready");
    info!("  WebSocket:  ws://{}:{}", reachable, addr.port());
    info!("  Output:     {}", device);
    info!(
        "  Steering:   {}° to {}° ({:.1} turns lock to lock)",
        -max,
        max,
        2.0 * max / 360.0
    );
    if device == DeviceKind::None {
        warn!("No virtual input device available, commands only update internal state");
    }
}
