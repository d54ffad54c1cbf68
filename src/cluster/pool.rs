//! Per-node connection cache for the cluster client.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use crate::core::multiplexed::MultiplexedConnection;
use crate::core::{open, ConnectOptions};
use crate::Result;

/// One multiplexed connection per node, keyed by `host:port`.
#[derive(Debug)]
pub(crate) struct ConnectionPool {
    options: ConnectOptions,
    connections: RwLock<HashMap<String, MultiplexedConnection>>,
}

impl ConnectionPool {
    /// Creates an empty pool; every connection it opens runs the handshake
    /// described by `options`.
    pub(crate) fn new(options: ConnectOptions) -> Self {
        Self {
            options,
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the live connection to `address`, opening one if needed.
    pub(crate) async fn get_or_connect(&self, address: &str) -> Result<MultiplexedConnection> {
        if let Some(conn) = self.connections.read().await.get(address) {
            if !conn.is_closed() {
                return Ok(conn.clone());
            }
        }

        debug!(address, "opening cluster node connection");
        let conn = open(address, &self.options).await?;

        let mut connections = self.connections.write().await;
        match connections.get(address) {
            // Another task won the race.
            Some(existing) if !existing.is_closed() => Ok(existing.clone()),
            _ => {
                connections.insert(address.to_string(), conn.clone());
                Ok(conn)
            }
        }
    }

    /// Drops the cached connection to `address`.
    pub(crate) async fn remove(&self, address: &str) {
        if self.connections.write().await.remove(address).is_some() {
            debug!(address, "dropped cluster node connection");
        }
    }

    /// Number of cached connections.
    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.connections.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_reuses_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let accepted = tokio::spawn(async move {
            let mut sockets = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                sockets.push(socket);
            }
        });

        let pool = ConnectionPool::new(ConnectOptions::default());
        let first = pool.get_or_connect(&address).await.unwrap();
        let _second = pool.get_or_connect(&address).await.unwrap();
        assert_eq!(pool.len().await, 1);
        assert!(!first.is_closed());

        pool.remove(&address).await;
        assert_eq!(pool.len().await, 0);
        accepted.abort();
    }

    #[tokio::test]
    async fn test_replaces_closed_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            // Close the first socket straight away, keep later ones open.
            let (mut first, _) = listener.accept().await.unwrap();
            first.shutdown().await.ok();
            drop(first);
            let mut sockets = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                sockets.push(socket);
            }
        });

        let pool = ConnectionPool::new(ConnectOptions::default());
        let first = pool.get_or_connect(&address).await.unwrap();
        let err = first
            .send_command(crate::core::command::ping().into_frame())
            .await
            .unwrap_err();
        assert!(err.is_connection_error());

        // The background tasks wind down once the socket is gone.
        for _ in 0..100 {
            if first.is_closed() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(first.is_closed());

        let second = pool.get_or_connect(&address).await.unwrap();
        assert!(!second.is_closed());
        assert_eq!(pool.len().await, 1);
    }

    #[tokio::test]
    async fn test_connect_failure_is_not_cached() {
        let pool = ConnectionPool::new(ConnectOptions::default());
        assert!(pool.get_or_connect("127.0.0.1:1").await.is_err());
        assert_eq!(pool.len().await, 0);
    }
}
