//! Message routing toward destination chains
//!
//! The listener hands every translated message to a [`Router`]. Delivery is
//! fire-and-forget from the listener's point of view: a rejected message is
//! logged and the listener moves on. Redelivery, if any, belongs to the
//! router.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::DispatchError;
use crate::types::{ChainId, Message};

/// Destination-side message sink
#[async_trait]
pub trait Router: Send + Sync {
    async fn send(&self, message: Message) -> Result<(), DispatchError>;
}

/// Routes messages to per-destination writer queues.
///
/// Each destination chain registers a bounded queue; messages for chains
/// without a registered writer are rejected.
#[derive(Debug, Default)]
pub struct ChainRouter {
    writers: HashMap<ChainId, mpsc::Sender<Message>>,
}

impl ChainRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the writer queue for a destination chain, replacing any previous one
    pub fn register(&mut self, chain: ChainId, writer: mpsc::Sender<Message>) {
        if self.writers.insert(chain, writer).is_some() {
            warn!(chain_id = %chain, "Replaced existing writer registration");
        } else {
            info!(chain_id = %chain, "Registered writer for destination chain");
        }
    }

    pub fn destinations(&self) -> Vec<ChainId> {
        let mut chains: Vec<_> = self.writers.keys().copied().collect();
        chains.sort();
        chains
    }
}

#[async_trait]
impl Router for ChainRouter {
    async fn send(&self, message: Message) -> Result<(), DispatchError> {
        let dest = message.destination();
        let writer = self
            .writers
            .get(&dest)
            .ok_or(DispatchError::UnknownDestination(dest))?;

        writer
            .send(message)
            .await
            .map_err(|_| DispatchError::WriterClosed(dest))
    }
}

/// Spawn a writer that drains a destination queue and logs each message.
///
/// Stands in for the destination chain's execution stage, which lives
/// outside this service.
pub fn spawn_logging_writer(
    chain: ChainId,
    capacity: usize,
) -> (mpsc::Sender<Message>, JoinHandle<u64>) {
    let (tx, mut rx) = mpsc::channel::<Message>(capacity.max(1));

    let handle = tokio::spawn(async move {
        let mut delivered = 0u64;
        while let Some(message) = rx.recv().await {
            delivered += 1;
            info!(
                chain_id = %chain,
                source = %message.source(),
                nonce = %message.nonce(),
                kind = %message.transfer_type(),
                resource_id = %message.resource_id(),
                "Received message for destination chain"
            );
        }
        info!(chain_id = %chain, delivered, "Writer queue closed");
        delivered
    });

    (tx, handle)
}
