//! Client registry actor.
//!
//! One task owns the set of connected clients and services register,
//! deregister and broadcast requests over a command channel, keeping lock
//! acquisitions out of the broadcast hot path. Fan-out is non-blocking per
//! client; a client whose channel is full or closed misses the message and
//! its own task handles the disconnect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::protocol::Envelope;

/// Identifies one connected client.
pub type ClientId = u64;

/// Capacity of each client's fan-out channel.
const CLIENT_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the actor's command channel.
const COMMAND_CHANNEL_CAPACITY: usize = 64;

enum RegistryCommand {
    Register {
        id: ClientId,
        sender: mpsc::Sender<Envelope>,
    },
    Deregister {
        id: ClientId,
    },
    Broadcast {
        envelope: Envelope,
    },
}

/// Handle to the registry actor. Cheap to clone.
#[derive(Clone)]
pub struct RegistryHandle {
    commands: mpsc::Sender<RegistryCommand>,
    next_id: Arc<AtomicU64>,
}

impl RegistryHandle {
    /// Spawn the registry actor and return its handle.
    pub fn spawn() -> Self {
        let (commands, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        tokio::spawn(run_registry(rx));
        Self {
            commands,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Register a new client; returns its id and the receiving end of its
    /// fan-out channel.
    pub async fn register(&self) -> (ClientId, mpsc::Receiver<Envelope>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(CLIENT_CHANNEL_CAPACITY);
        let _ = self
            .commands
            .send(RegistryCommand::Register { id, sender })
            .await;
        (id, receiver)
    }

    /// Remove a client from the registry.
    pub async fn deregister(&self, id: ClientId) {
        let _ = self.commands.send(RegistryCommand::Deregister { id }).await;
    }

    /// Fan an envelope out to every registered client.
    pub async fn broadcast(&self, envelope: Envelope) {
        let _ = self
            .commands
            .send(RegistryCommand::Broadcast { envelope })
            .await;
    }
}

async fn run_registry(mut commands: mpsc::Receiver<RegistryCommand>) {
    let mut clients: HashMap<ClientId, mpsc::Sender<Envelope>> = HashMap::new();

    while let Some(command) = commands.recv().await {
        match command {
            RegistryCommand::Register { id, sender } => {
                clients.insert(id, sender);
                monpulse_metrics::gateway::WS_CLIENTS.set(clients.len() as i64);
                info!(client = id, total = clients.len(), "websocket client registered");
            }
            RegistryCommand::Deregister { id } => {
                clients.remove(&id);
                monpulse_metrics::gateway::WS_CLIENTS.set(clients.len() as i64);
                info!(client = id, total = clients.len(), "websocket client deregistered");
            }
            RegistryCommand::Broadcast { envelope } => {
                for (id, sender) in &clients {
                    // Do not mutate the registry on failure; the client's
                    // own task observes its dead socket and deregisters.
                    if sender.try_send(envelope.clone()).is_err() {
                        debug!(client = id, "fan-out skipped slow or closed client");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol;

    #[tokio::test]
    async fn test_broadcast_reaches_all_registered_clients() {
        let registry = RegistryHandle::spawn();
        let (_id_a, mut rx_a) = registry.register().await;
        let (_id_b, mut rx_b) = registry.register().await;

        registry.broadcast(protocol::vote_distance_message()).await;

        let got_a = rx_a.recv().await.expect("client a receives");
        let got_b = rx_b.recv().await.expect("client b receives");
        assert_eq!(got_a.key, "vote_distance");
        assert_eq!(got_b.key, "vote_distance");
    }

    #[tokio::test]
    async fn test_dead_client_does_not_stall_others() {
        let registry = RegistryHandle::spawn();
        let (id_dead, rx_dead) = registry.register().await;
        drop(rx_dead);
        let (_id_live, mut rx_live) = registry.register().await;

        registry.broadcast(protocol::vote_distance_message()).await;
        let got = rx_live.recv().await.expect("live client receives");
        assert_eq!(got.key, "vote_distance");

        // Deregistering the dead client is the owner task's job; doing it
        // here must not break further broadcasts.
        registry.deregister(id_dead).await;
        registry.broadcast(protocol::vote_distance_message()).await;
        assert!(rx_live.recv().await.is_some());
    }
}
