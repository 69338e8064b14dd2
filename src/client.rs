//! Sentinel-aware client: a pool bound to the resolved master, bounded
//! retries per call, and a single rebuild-and-retry when the master turns out
//! to have been demoted.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::{
    command::Command,
    config::RedisConfig,
    connection::Connection,
    dialer::{Dialer, TcpDialer},
    error::{RedisError, RedisResult},
    pool::{Pool, PoolOptions},
    resp::RespValue,
    sentinel::{MasterInfo, SentinelResolver},
    wait_for,
};

/// How often `execute` retries getting a connection or running a command.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1);

pub struct SentinelClient<D: Dialer = TcpDialer> {
    dialer: Arc<D>,
    resolver: SentinelResolver<D>,
    call_timeout: Duration,
    pool_options: PoolOptions,
    pool: RwLock<Arc<Pool<D>>>,
    rebuild_lock: Mutex<()>,
    rebuilds: AtomicU64,
}

impl SentinelClient<TcpDialer> {
    /// Resolves the master over TCP and returns a ready client.
    pub async fn connect(config: RedisConfig) -> RedisResult<Self> {
        Self::with_dialer(config, TcpDialer).await
    }
}

impl<D: Dialer> SentinelClient<D> {
    /// Resolves the master through `dialer` and returns a ready client. Fails
    /// instead of returning a client without a master.
    pub async fn with_dialer(config: RedisConfig, dialer: D) -> RedisResult<Self> {
        config.validate()?;

        let dialer = Arc::new(dialer);
        let resolver = SentinelResolver::new(Arc::clone(&dialer), &config);
        let pool_options = PoolOptions {
            max_active: config.pool_size,
            max_idle: config.max_idle,
            idle_timeout: config.timeout,
            io_timeout: config.call_timeout,
        };

        let master = resolver.resolve().await?;
        let pool = Pool::new(Arc::clone(&dialer), &master.master_addr, pool_options, 0);

        Ok(Self {
            dialer,
            resolver,
            call_timeout: config.call_timeout,
            pool_options,
            pool: RwLock::new(Arc::new(pool)),
            rebuild_lock: Mutex::new(()),
            rebuilds: AtomicU64::new(0),
        })
    }

    /// Address of the master the current pool talks to.
    pub async fn master_addr(&self) -> String {
        self.current_pool().await.address().to_string()
    }

    /// How many times the pool has been rebuilt since construction.
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds.load(Ordering::SeqCst)
    }

    pub async fn sentinels(&self) -> Vec<String> {
        self.resolver.servers().await
    }

    /// Re-probes the sentinels for the master address and the sentinel that
    /// reported it.
    pub async fn info(&self) -> Option<MasterInfo> {
        self.resolver.info().await
    }

    async fn current_pool(&self) -> Arc<Pool<D>> {
        Arc::clone(&*self.pool.read().await)
    }

    /// Runs `cmd` against the master.
    ///
    /// Getting a connection and running the command are each retried every
    /// `POLL_INTERVAL` for up to the call timeout. If the node answers that it
    /// is a read-only replica, the master is resolved again, the pool is
    /// replaced, and the command is sent exactly once more.
    pub async fn execute(&self, cmd: Command) -> RedisResult<RespValue> {
        let (pool, result) = self.execute_on_current(&cmd).await;

        let error = match result {
            Err(e) if e.is_read_only() => e,
            result => return result,
        };

        warn!(master = %pool.address(), command = %cmd.name(), "master is read-only, rebuilding connection pool");

        if let Err(rebuild_error) = self.rebuild_from(pool.generation()).await {
            warn!(error = %rebuild_error, "rebuilding connection pool failed");
            return Err(error);
        }

        let (_, result) = self.execute_on_current(&cmd).await;
        result
    }

    /// Runs `cmd` on the current pool, moving to its replacement once if
    /// another caller closes it meanwhile. Returns the pool that answered.
    async fn execute_on_current(&self, cmd: &Command) -> (Arc<Pool<D>>, RedisResult<RespValue>) {
        let pool = self.current_pool().await;

        match self.execute_on(&pool, cmd).await {
            Err(RedisError::PoolClosed) => {
                let pool = self.current_pool().await;
                let result = self.execute_on(&pool, cmd).await;
                (pool, result)
            }
            result => (pool, result),
        }
    }

    /// Resolves the master again and replaces the pool.
    ///
    /// Not bounded by the call timeout: sentinel queries have no read
    /// timeout, and callers hitting a read-only master wait for it.
    pub async fn rebuild(&self) -> RedisResult<()> {
        let generation = self.current_pool().await.generation();
        self.rebuild_from(generation).await
    }

    /// Replaces the pool with generation `seen`. Callers that lose the race
    /// find the pool already replaced and return without resolving again.
    async fn rebuild_from(&self, seen: u64) -> RedisResult<()> {
        let _rebuild_guard = self.rebuild_lock.lock().await;

        if self.current_pool().await.generation() != seen {
            debug!(generation = seen, "connection pool already rebuilt");
            return Ok(());
        }

        let master = self.resolver.resolve().await?;
        let pool = Arc::new(Pool::new(
            Arc::clone(&self.dialer),
            &master.master_addr,
            self.pool_options,
            seen + 1,
        ));

        let old = std::mem::replace(&mut *self.pool.write().await, pool);
        self.rebuilds.fetch_add(1, Ordering::SeqCst);

        info!(master = %master.master_addr, previous = %old.address(), "connection pool rebuilt");

        old.close().await;

        Ok(())
    }

    async fn execute_on(&self, pool: &Arc<Pool<D>>, cmd: &Command) -> RedisResult<RespValue> {
        let conn = wait_for::func(
            || {
                let pool = Arc::clone(pool);
                async move { pool.get().await }
            },
            POLL_INTERVAL,
            self.call_timeout,
        )
        .await?;

        let conn = Arc::new(conn);

        let result = wait_for::func(
            || {
                let conn = Arc::clone(&conn);
                let cmd = cmd.clone();
                async move { conn.execute(&cmd).await }
            },
            POLL_INTERVAL,
            self.call_timeout,
        )
        .await
        .map_err(RedisError::from);

        if let Err(e) = &result {
            if e.is_connection_error() {
                conn.mark_broken();
            }
        }

        result
    }
}
