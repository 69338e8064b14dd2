use std::time::Duration;

use thiserror::Error;

use crate::resp::{RespError, RespValue};

/// Error replies a demoted master sends back for write commands. Older servers
/// say "slave", newer ones "replica".
pub const READ_ONLY_MARKERS: [&str; 2] = [
    "You can't write against a read only slave.",
    "You can't write against a read only replica.",
];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RedisError {
    #[error("You must include a MasterName in your sentinel config")]
    NoMasterName,
    #[error("Sentinel does not know the master: {0}")]
    MasterNameNotKnown(String),
    #[error("Node: {0} does not contain a port")]
    MalformedServerNode(String),
    #[error("Failed to connect to a sentinel")]
    NoSentinelFound,
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("RESP parse error: {0}")]
    Resp(#[from] RespError),
    #[error("{0}")]
    Server(String),
    #[error("nil returned")]
    Nil,
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),
    #[error("connection pool exhausted")]
    PoolExhausted,
    #[error("connection pool closed")]
    PoolClosed,
    #[error("waitfor: timed out waiting {:?}; {}", .timeout, timeout_detail(.last_error))]
    Timeout {
        timeout: Duration,
        last_error: Option<Box<RedisError>>,
    },
}

fn timeout_detail(last_error: &Option<Box<RedisError>>) -> String {
    match last_error {
        Some(e) => format!("last error: '{}'", e),
        None => "function did not return".to_string(),
    }
}

impl RedisError {
    /// Whether this error means the node we talked to has been demoted to a
    /// replica. Looks through a timeout at the error that caused it.
    pub fn is_read_only(&self) -> bool {
        match self {
            RedisError::Server(msg) => READ_ONLY_MARKERS.iter().any(|m| msg.contains(m)),
            RedisError::Timeout {
                last_error: Some(e),
                ..
            } => e.is_read_only(),
            _ => false,
        }
    }

    /// Whether the connection that produced this error can no longer be
    /// trusted and must not go back to a pool.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            RedisError::Io(_)
                | RedisError::ConnectionClosed
                | RedisError::Resp(_)
                | RedisError::Timeout { .. }
        )
    }

    /// Whether repeating the same operation might succeed. Read-only errors
    /// are excluded: they need a new master, not another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            RedisError::NoMasterName
            | RedisError::MalformedServerNode(_)
            | RedisError::InvalidConfig(_)
            | RedisError::PoolClosed => false,
            e => !e.is_read_only(),
        }
    }

    pub fn as_string(&self) -> String {
        match self {
            RedisError::Server(msg) => RespValue::Error(msg.clone()).encode_string(),
            e => RespValue::Error(format!("ERR {}", e)).encode_string(),
        }
    }
}

impl From<std::io::Error> for RedisError {
    fn from(e: std::io::Error) -> Self {
        RedisError::Io(e.to_string())
    }
}

pub type RedisResult<T> = Result<T, RedisError>;
