use std::{future::Future, time::Duration};

use crate::{
    connection::{Connection, TcpConnection},
    error::{RedisError, RedisResult},
};

/// Opens connections to `host:port` addresses. Dialers never retry on their
/// own; retry policy belongs to the resolver and the pool.
pub trait Dialer: Send + Sync + 'static {
    type Conn: Connection;

    fn dial(
        &self,
        network: &str,
        address: &str,
    ) -> impl Future<Output = RedisResult<Self::Conn>> + Send;

    /// Like `dial`, with explicit timeouts. A zero duration means no timeout.
    fn dial_timeout(
        &self,
        network: &str,
        address: &str,
        connect_timeout: Duration,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> impl Future<Output = RedisResult<Self::Conn>> + Send;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

impl Dialer for TcpDialer {
    type Conn = TcpConnection;

    async fn dial(&self, network: &str, address: &str) -> RedisResult<TcpConnection> {
        self.dial_timeout(
            network,
            address,
            Duration::ZERO,
            Duration::ZERO,
            Duration::ZERO,
        )
        .await
    }

    async fn dial_timeout(
        &self,
        network: &str,
        address: &str,
        connect_timeout: Duration,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> RedisResult<TcpConnection> {
        if network != "tcp" {
            return Err(RedisError::InvalidConfig(format!(
                "unsupported network {}",
                network
            )));
        }

        TcpConnection::connect(address, connect_timeout, read_timeout, write_timeout).await
    }
}
