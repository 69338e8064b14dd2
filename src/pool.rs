//! A bounded pool of connections to one address.
//!
//! Semantics follow the classic redigo pool: `max_active` caps the number of
//! open connections (0 means no cap), at most `max_idle` connections are kept
//! around between uses, idle connections older than `idle_timeout` are
//! evicted, and every idle connection is checked with `PING` before it is
//! handed out again. `get` never blocks waiting for a free slot; callers that
//! want to wait wrap it in `wait_for::func`.
//!
//! Connections are dialed with `io_timeout` as connect, read and write
//! timeout, so a checked-out connection stuck on a silent peer errors out,
//! gets marked broken and frees its slot.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use tokio::time::Instant;
use tracing::debug;

use crate::{
    command::Command,
    connection::Connection,
    dialer::Dialer,
    error::{RedisError, RedisResult},
    resp::RespValue,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolOptions {
    pub max_active: usize,
    pub max_idle: usize,
    pub idle_timeout: Duration,
    /// Connect, read and write timeout of every pooled connection (0 means none)
    pub io_timeout: Duration,
}

struct IdleConnection<C> {
    conn: C,
    since: Instant,
}

struct PoolState<C> {
    // Most recently returned first.
    idle: VecDeque<IdleConnection<C>>,
    // Open connections, idle or checked out, including dials in progress.
    active: usize,
    closed: bool,
}

pub struct Pool<D: Dialer> {
    dialer: Arc<D>,
    address: String,
    options: PoolOptions,
    generation: u64,
    state: Mutex<PoolState<D::Conn>>,
}

impl<D: Dialer> Pool<D> {
    pub fn new(dialer: Arc<D>, address: &str, options: PoolOptions, generation: u64) -> Self {
        Self {
            dialer,
            address: address.to_string(),
            options,
            generation,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                active: 0,
                closed: false,
            }),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Incremented every time the owning client replaces its pool.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn active_count(&self) -> usize {
        self.lock_state().active
    }

    pub fn idle_count(&self) -> usize {
        self.lock_state().idle.len()
    }

    pub fn is_closed(&self) -> bool {
        self.lock_state().closed
    }

    fn lock_state(&self) -> MutexGuard<'_, PoolState<D::Conn>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hands out a healthy connection, reusing an idle one when possible.
    ///
    /// # Returns
    ///
    /// * `Ok(PooledConnection)` - A connection that goes back to the pool when dropped
    /// * `Err(RedisError::PoolExhausted)` - `max_active` connections are already open
    /// * `Err(RedisError::PoolClosed)` - The pool has been closed
    /// * `Err(RedisError)` - Dialing a new connection failed
    pub async fn get(self: &Arc<Self>) -> RedisResult<PooledConnection<D>> {
        loop {
            let candidate = {
                let mut state = self.lock_state();

                if state.closed {
                    return Err(RedisError::PoolClosed);
                }

                self.evict_stale(&mut state);

                match state.idle.pop_front() {
                    Some(idle) => Some(idle.conn),
                    None => {
                        if self.options.max_active > 0 && state.active >= self.options.max_active
                        {
                            return Err(RedisError::PoolExhausted);
                        }

                        state.active += 1;
                        None
                    }
                }
            };

            match candidate {
                Some(conn) => match conn.execute(&Command::new("PING")).await {
                    Ok(_) => return Ok(PooledConnection::new(Arc::clone(self), conn)),
                    Err(e) => {
                        debug!(address = %self.address, error = %e, "discarding unhealthy idle connection");
                        self.release_slot();
                    }
                },
                None => match self
                    .dialer
                    .dial_timeout(
                        "tcp",
                        &self.address,
                        self.options.io_timeout,
                        self.options.io_timeout,
                        self.options.io_timeout,
                    )
                    .await
                {
                    Ok(conn) => return Ok(PooledConnection::new(Arc::clone(self), conn)),
                    Err(e) => {
                        self.release_slot();
                        return Err(e);
                    }
                },
            }
        }
    }

    /// Marks the pool closed and closes every idle connection. Connections
    /// still checked out are dropped when they come back.
    pub async fn close(&self) {
        let drained: Vec<D::Conn> = {
            let mut state = self.lock_state();
            state.closed = true;
            let drained: Vec<D::Conn> = state.idle.drain(..).map(|idle| idle.conn).collect();
            state.active -= drained.len();
            drained
        };

        for conn in drained {
            if let Err(e) = conn.close().await {
                debug!(address = %self.address, error = %e, "error closing idle connection");
            }
        }
    }

    fn evict_stale(&self, state: &mut PoolState<D::Conn>) {
        if self.options.idle_timeout.is_zero() {
            return;
        }

        let now = Instant::now();

        while let Some(oldest) = state.idle.back() {
            if now.duration_since(oldest.since) < self.options.idle_timeout {
                break;
            }

            state.idle.pop_back();
            state.active -= 1;
        }
    }

    fn release_slot(&self) {
        let mut state = self.lock_state();
        state.active = state.active.saturating_sub(1);
    }

    fn put(&self, conn: D::Conn, broken: bool) {
        let mut state = self.lock_state();

        if broken || state.closed {
            state.active = state.active.saturating_sub(1);
            return;
        }

        state.idle.push_front(IdleConnection {
            conn,
            since: Instant::now(),
        });

        if state.idle.len() > self.options.max_idle {
            state.idle.pop_back();
            state.active -= 1;
        }
    }
}

/// A connection checked out of a `Pool`.
pub struct PooledConnection<D: Dialer> {
    pool: Arc<Pool<D>>,
    conn: Option<D::Conn>,
    broken: AtomicBool,
}

impl<D: Dialer> PooledConnection<D> {
    fn new(pool: Arc<Pool<D>>, conn: D::Conn) -> Self {
        Self {
            pool,
            conn: Some(conn),
            broken: AtomicBool::new(false),
        }
    }

    /// Keeps the connection from going back to the pool on drop.
    pub fn mark_broken(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    pub fn is_broken(&self) -> bool {
        self.broken.load(Ordering::SeqCst)
    }
}

impl<D: Dialer> Connection for PooledConnection<D> {
    async fn execute(&self, cmd: &Command) -> RedisResult<RespValue> {
        let Some(conn) = self.conn.as_ref() else {
            return Err(RedisError::ConnectionClosed);
        };

        conn.execute(cmd).await
    }

    async fn close(&self) -> RedisResult<()> {
        self.mark_broken();

        match self.conn.as_ref() {
            Some(conn) => conn.close().await,
            None => Ok(()),
        }
    }
}

impl<D: Dialer> Drop for PooledConnection<D> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.put(conn, self.is_broken());
        }
    }
}
