//! The single owner of the control core
//!
//! Connection tasks never touch the state directly. They send a
//! [`ControlAction`] through a [`ControlHandle`] and wait for the oneshot
//! reply. The worker runs on tokio's blocking pool because device writes may
//! block in the driver, and it handles one action at a time, which gives the
//! whole system a single mutation pipeline.

use crate::control::core::ControlCore;
#[cfg(test)]
use crate::control::state::ControlState;
use crate::protocol::Command;
use crate::session::ClientId;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

macro_rules! respond {
    ($response_tx:expr, $value:expr) => {
        if $response_tx.send($value).is_err() {
            error!("Failed to send control response");
        }
    };
}

const ACTION_QUEUE: usize = 256;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("control worker is not running")]
    WorkerGone,
}

#[derive(Debug)]
pub enum ControlAction {
    Connect {
        peer: SocketAddr,
        response_tx: oneshot::Sender<ClientId>,
    },
    Disconnect {
        id: ClientId,
        response_tx: oneshot::Sender<()>,
    },
    Execute {
        command: Command,
        response_tx: oneshot::Sender<bool>,
    },
    #[cfg(test)]
    Snapshot {
        response_tx: oneshot::Sender<ControlState>,
    },
    Shutdown {
        response_tx: oneshot::Sender<()>,
    },
}

/// Cloneable front door to the control worker
#[derive(Clone, Debug)]
pub struct ControlHandle {
    tx: mpsc::Sender<ControlAction>,
}

impl ControlHandle {
    /// Moves `core` onto a dedicated worker and returns a handle to it.
    pub fn spawn(core: ControlCore) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(ACTION_QUEUE);
        let worker = tokio::task::spawn_blocking(move || run_worker(core, rx));
        (Self { tx }, worker)
    }

    async fn request<T>(
        &self,
        action: impl FnOnce(oneshot::Sender<T>) -> ControlAction,
    ) -> Result<T, ControlError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(action(response_tx))
            .await
            .map_err(|_| ControlError::WorkerGone)?;
        response_rx.await.map_err(|_| ControlError::WorkerGone)
    }

    pub async fn connect(&self, peer: SocketAddr) -> Result<ClientId, ControlError> {
        self.request(|response_tx| ControlAction::Connect { peer, response_tx })
            .await
    }

    pub async fn disconnect(&self, id: ClientId) -> Result<(), ControlError> {
        self.request(|response_tx| ControlAction::Disconnect { id, response_tx })
            .await
    }

    /// Runs one command to completion (mutation and device apply).
    pub async fn execute(&self, command: Command) -> Result<bool, ControlError> {
        self.request(|response_tx| ControlAction::Execute {
            command,
            response_tx,
        })
        .await
    }

    #[cfg(test)]
    pub async fn snapshot(&self) -> Result<ControlState, ControlError> {
        self.request(|response_tx| ControlAction::Snapshot { response_tx })
            .await
    }

    /// Releases all inputs and stops the worker.
    pub async fn shutdown(&self) -> Result<(), ControlError> {
        self.request(|response_tx| ControlAction::Shutdown { response_tx })
            .await
    }
}

fn run_worker(mut core: ControlCore, mut rx: mpsc::Receiver<ControlAction>) {
    info!("Control worker started with {} output", core.device_kind());

    while let Some(action) = rx.blocking_recv() {
        debug!("Control action: {:?}", action);
        match action {
            ControlAction::Connect { peer, response_tx } => {
                respond!(response_tx, core.connect(peer));
            }
            ControlAction::Disconnect { id, response_tx } => {
                core.disconnect(id);
                respond!(response_tx, ());
            }
            ControlAction::Execute {
                command,
                response_tx,
            } => {
                respond!(response_tx, core.execute(command));
            }
            #[cfg(test)]
            ControlAction::Snapshot { response_tx } => {
                respond!(response_tx, core.state().clone());
            }
            ControlAction::Shutdown { response_tx } => {
                core.shutdown();
                respond!(response_tx, ());
                info!("Control worker stopped");
                return;
            }
        }
    }

    // every handle dropped without an explicit shutdown
    core.shutdown();
    info!("Control worker stopped, all handles dropped");
}
