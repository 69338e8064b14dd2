use std::{future::Future, time::Duration};

use bytes::BytesMut;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    sync::Mutex,
    time,
};
use tracing::debug;

use crate::{
    command::Command,
    error::{RedisError, RedisResult},
    resp::RespValue,
};

/// A single connection to a Redis-speaking endpoint.
///
/// Connections fail closed: after `close` or a transport failure every later
/// `execute` returns an error. Reconnecting is left to whoever owns the
/// connection.
pub trait Connection: Send + Sync + 'static {
    /// Sends `cmd` and waits for its reply. Error replies come back as
    /// `RedisError::Server`.
    fn execute(&self, cmd: &Command) -> impl Future<Output = RedisResult<RespValue>> + Send;

    fn close(&self) -> impl Future<Output = RedisResult<()>> + Send;
}

struct Stream {
    socket: TcpStream,
    buffer: BytesMut,
}

/// RESP over a plain TCP socket.
pub struct TcpConnection {
    address: String,
    read_timeout: Duration,
    write_timeout: Duration,
    stream: Mutex<Option<Stream>>,
}

impl TcpConnection {
    /// Opens a connection to `address`. A zero duration disables the
    /// corresponding timeout.
    pub async fn connect(
        address: &str,
        connect_timeout: Duration,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> RedisResult<Self> {
        let socket = with_timeout(connect_timeout, TcpStream::connect(address)).await??;
        socket.set_nodelay(true)?;

        debug!(address = %address, "connected");

        Ok(Self {
            address: address.to_string(),
            read_timeout,
            write_timeout,
            stream: Mutex::new(Some(Stream {
                socket,
                buffer: BytesMut::with_capacity(1024),
            })),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn round_trip(&self, stream: &mut Stream, cmd: &Command) -> RedisResult<RespValue> {
        write_to_stream(&mut stream.socket, &cmd.encode(), self.write_timeout).await?;

        loop {
            if let Some(value) = RespValue::decode(&mut stream.buffer)? {
                return Ok(value);
            }

            let number_of_bytes =
                with_timeout(self.read_timeout, stream.socket.read_buf(&mut stream.buffer))
                    .await??;

            if number_of_bytes == 0 {
                return Err(RedisError::ConnectionClosed);
            }
        }
    }
}

impl Connection for TcpConnection {
    async fn execute(&self, cmd: &Command) -> RedisResult<RespValue> {
        let mut stream_guard = self.stream.lock().await;

        let Some(stream) = stream_guard.as_mut() else {
            return Err(RedisError::ConnectionClosed);
        };

        match self.round_trip(stream, cmd).await {
            Ok(RespValue::Error(msg)) => Err(RedisError::Server(msg)),
            Ok(reply) => Ok(reply),
            Err(e) => {
                debug!(address = %self.address, error = %e, "dropping broken connection");
                *stream_guard = None;
                Err(e)
            }
        }
    }

    async fn close(&self) -> RedisResult<()> {
        let mut stream_guard = self.stream.lock().await;

        if let Some(mut stream) = stream_guard.take() {
            stream.socket.shutdown().await?;
        }

        Ok(())
    }
}

async fn write_to_stream<W>(writer: &mut W, data: &[u8], timeout: Duration) -> RedisResult<()>
where
    W: AsyncWriteExt + Unpin,
{
    with_timeout(timeout, writer.write_all(data)).await??;
    with_timeout(timeout, writer.flush()).await??;

    Ok(())
}

/// Bounds `fut` by `timeout`, where a zero timeout means "wait forever".
async fn with_timeout<F, T>(timeout: Duration, fut: F) -> RedisResult<T>
where
    F: Future<Output = T>,
{
    if timeout.is_zero() {
        return Ok(fut.await);
    }

    time::timeout(timeout, fut)
        .await
        .map_err(|_| RedisError::Io(format!("i/o timeout after {:?}", timeout)))
}
