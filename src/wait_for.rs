//! Retry an operation until it succeeds or a deadline passes.
//!
//! Every attempt runs in its own tokio task, so an attempt that hangs cannot
//! keep the deadline from firing. When the deadline passes the in-flight
//! attempt is abandoned: its task is detached and left to finish on its own.

use std::{fmt, future::Future, time::Duration};

use thiserror::Error;
use tokio::time::{self, Instant};

use crate::error::RedisError;

/// Classifies errors into ones worth another attempt and ones that are final.
pub trait Retry {
    fn is_retryable(&self) -> bool;
}

impl Retry for RedisError {
    fn is_retryable(&self) -> bool {
        RedisError::is_retryable(self)
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum WaitError<E: fmt::Display> {
    #[error("waitfor: interval ({interval:?}) must be shorter than timeout ({timeout:?})")]
    InvalidInterval { interval: Duration, timeout: Duration },
    #[error("{0}")]
    Failed(E),
    #[error("waitfor: timed out waiting {:?}; {}", .timeout, last_error_detail(.last_error))]
    TimedOut {
        timeout: Duration,
        last_error: Option<E>,
    },
    #[error("waitfor: attempt aborted: {0}")]
    Aborted(String),
}

fn last_error_detail<E: fmt::Display>(last_error: &Option<E>) -> String {
    match last_error {
        Some(e) => format!("last error: '{}'", e),
        None => "function did not return".to_string(),
    }
}

/// Repeatedly runs `f` until it returns `Ok`, sleeping `interval` after every
/// retryable failure, for at most `timeout` overall.
///
/// # Returns
///
/// * `Ok(T)` - The first successful result
/// * `Err(WaitError::Failed)` - An attempt failed with a non-retryable error
/// * `Err(WaitError::TimedOut)` - The deadline passed; carries the last error seen, if any
/// * `Err(WaitError::InvalidInterval)` - `interval` is longer than `timeout`
pub async fn func<F, Fut, T, E>(
    mut f: F,
    interval: Duration,
    timeout: Duration,
) -> Result<T, WaitError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Retry + fmt::Display + Send + 'static,
{
    if interval > timeout {
        return Err(WaitError::InvalidInterval { interval, timeout });
    }

    let deadline = Instant::now() + timeout;
    let mut last_error: Option<E> = None;

    loop {
        if Instant::now() >= deadline {
            return Err(WaitError::TimedOut {
                timeout,
                last_error,
            });
        }

        let attempt = tokio::spawn(f());

        match time::timeout_at(deadline, attempt).await {
            Err(_) => {
                return Err(WaitError::TimedOut {
                    timeout,
                    last_error,
                });
            }
            Ok(Err(join_error)) => return Err(WaitError::Aborted(join_error.to_string())),
            Ok(Ok(Ok(value))) => return Ok(value),
            Ok(Ok(Err(e))) => {
                if !e.is_retryable() {
                    return Err(WaitError::Failed(e));
                }

                last_error = Some(e);
                time::sleep(interval).await;
            }
        }
    }
}

impl From<WaitError<RedisError>> for RedisError {
    fn from(e: WaitError<RedisError>) -> Self {
        match e {
            WaitError::Failed(e) => e,
            WaitError::TimedOut {
                timeout,
                last_error,
            } => RedisError::Timeout {
                timeout,
                last_error: last_error.map(Box::new),
            },
            e @ WaitError::InvalidInterval { .. } => RedisError::InvalidConfig(e.to_string()),
            e @ WaitError::Aborted(_) => RedisError::Io(e.to_string()),
        }
    }
}
