//! Client-facing TCP listener.
//!
//! Each accepted socket carries a `SessionSlot`; while `max_connections`
//! slots are out, `accept` waits instead of taking more clients.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::ListenerConfig;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("cannot listen on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("accept failed: {0}")]
    Accept(std::io::Error),
    #[error("listener closed")]
    Closed,
}

/// The proxy's listening socket plus its session limit.
#[derive(Debug)]
pub struct Listener {
    socket: TcpListener,
    slots: Arc<Semaphore>,
    max_connections: usize,
}

/// One occupied session slot, released on drop.
#[derive(Debug)]
pub struct SessionSlot(#[allow(dead_code)] OwnedSemaphorePermit);

impl Listener {
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let socket = TcpListener::bind(&config.bind_address)
            .await
            .map_err(|source| ListenerError::Bind {
                address: config.bind_address.clone(),
                source,
            })?;

        Ok(Self {
            socket,
            slots: Arc::new(Semaphore::new(config.max_connections)),
            max_connections: config.max_connections,
        })
    }

    /// Wait for a free slot, then for the next client.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, SessionSlot), ListenerError> {
        let slot = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;
        let (stream, peer_addr) = self.socket.accept().await.map_err(ListenerError::Accept)?;

        tracing::trace!(peer_addr = %peer_addr, free_slots = self.slots.available_permits(), "Client accepted");
        Ok((stream, peer_addr, SessionSlot(slot)))
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn free_slots(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}
