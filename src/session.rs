//! Registry of connected clients
//!
//! There is no per-client control state. The registry only answers one
//! question the control core cares about: did the last client just leave?

use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use tracing::{info, warn};

/// Process-unique connection identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Debug)]
pub struct ClientInfo {
    pub peer: SocketAddr,
    pub connected_at: DateTime<Local>,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    clients: HashMap<ClientId, ClientInfo>,
    next_id: u64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    #[cfg(test)]
    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.contains_key(&id)
    }

    /// Adds a client and returns its fresh id.
    pub fn register(&mut self, peer: SocketAddr) -> ClientId {
        let id = ClientId(self.next_id);
        self.next_id += 1;
        self.clients.insert(
            id,
            ClientInfo {
                peer,
                connected_at: Local::now(),
            },
        );
        info!(
            "Client connected: {} ({}). Total: {}",
            peer,
            id,
            self.clients.len()
        );
        id
    }

    /// Removes a client. Returns `true` only when this removal emptied the
    /// registry, i.e. the caller has to put the controls back to neutral.
    pub fn unregister(&mut self, id: ClientId) -> bool {
        match self.clients.remove(&id) {
            Some(client) => {
                let session = Local::now() - client.connected_at;
                info!(
                    "Client disconnected: {} ({}) after {}s. Total: {}",
                    client.peer,
                    id,
                    session.num_seconds(),
                    self.clients.len()
                );
                self.is_empty()
            }
            None => {
                warn!("Unregister for unknown client {}", id);
                false
            }
        }
    }
}
