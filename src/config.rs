//! Configuration for the sentinel client.

use std::time::Duration;

use crate::{
    error::{RedisError, RedisResult},
    sentinel::validate_nodes,
};

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(240);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(300);
pub const DEFAULT_POOL_SIZE: usize = 10;
pub const DEFAULT_MAX_IDLE: usize = 3;

/// Which port to pair with the master ip a sentinel reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterPort {
    /// Use the port from the sentinel's reply.
    FromSentinel,
    /// Ignore the reported port and always use this one.
    Fixed(u16),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RedisConfig {
    /// Name sentinels know the master set by
    pub master_name: String,

    /// Sentinel addresses (`host:port`), tried in order
    pub nodes: Vec<String>,

    /// Upper bound for getting a connection and, separately, for running one command
    pub call_timeout: Duration,

    /// Idle connections older than this are evicted from the pool
    pub timeout: Duration,

    /// Maximum open connections to the master (0 means unbounded)
    pub pool_size: usize,

    /// Maximum idle connections kept between calls
    pub max_idle: usize,

    /// Connect timeout used when probing sentinels and master candidates
    pub sentinel_probe_timeout: Duration,

    pub master_port: MasterPort,

    /// Move the sentinel that resolved the master to the front of `nodes`
    pub promote_sentinel: bool,
}

impl RedisConfig {
    /// Creates a config from a master name and a comma-separated node list,
    /// with defaults for everything else.
    pub fn new(master_name: &str, nodes: &str) -> Self {
        Self {
            master_name: master_name.to_string(),
            nodes: split_nodes(nodes),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            timeout: DEFAULT_IDLE_TIMEOUT,
            pool_size: DEFAULT_POOL_SIZE,
            max_idle: DEFAULT_MAX_IDLE,
            sentinel_probe_timeout: DEFAULT_PROBE_TIMEOUT,
            master_port: MasterPort::FromSentinel,
            promote_sentinel: true,
        }
    }

    /// Reads `<PREFIX>_*` variables from the process environment.
    pub fn from_env(prefix: &str) -> RedisResult<Self> {
        Self::from_lookup(prefix, |key| std::env::var(key).ok())
    }

    /// Builds a config from `<PREFIX>_MASTER_NAME`, `<PREFIX>_NODES`,
    /// `<PREFIX>_CALL_TIMEOUT_MS`, `<PREFIX>_TIMEOUT_MS`, `<PREFIX>_POOL_SIZE`,
    /// `<PREFIX>_MAX_IDLE`, `<PREFIX>_PROBE_TIMEOUT_MS`, `<PREFIX>_MASTER_PORT`
    /// and `<PREFIX>_PROMOTE_SENTINEL`. Missing keys keep their defaults.
    pub fn from_lookup<F>(prefix: &str, lookup: F) -> RedisResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{}_{}", prefix, name));

        let mut config = Self::new(
            &get("MASTER_NAME").unwrap_or_default(),
            &get("NODES").unwrap_or_default(),
        );

        if let Some(ms) = get("CALL_TIMEOUT_MS") {
            config.call_timeout = Duration::from_millis(parse_value("CALL_TIMEOUT_MS", &ms)?);
        }

        if let Some(ms) = get("TIMEOUT_MS") {
            config.timeout = Duration::from_millis(parse_value("TIMEOUT_MS", &ms)?);
        }

        if let Some(size) = get("POOL_SIZE") {
            config.pool_size = parse_value("POOL_SIZE", &size)?;
        }

        if let Some(idle) = get("MAX_IDLE") {
            config.max_idle = parse_value("MAX_IDLE", &idle)?;
        }

        if let Some(ms) = get("PROBE_TIMEOUT_MS") {
            config.sentinel_probe_timeout =
                Duration::from_millis(parse_value("PROBE_TIMEOUT_MS", &ms)?);
        }

        if let Some(port) = get("MASTER_PORT") {
            config.master_port = match port.as_str() {
                "" | "sentinel" => MasterPort::FromSentinel,
                port => MasterPort::Fixed(parse_value("MASTER_PORT", port)?),
            };
        }

        if let Some(promote) = get("PROMOTE_SENTINEL") {
            config.promote_sentinel = parse_value("PROMOTE_SENTINEL", &promote)?;
        }

        Ok(config)
    }

    /// Checks what can be checked without touching the network.
    pub fn validate(&self) -> RedisResult<()> {
        if self.master_name.is_empty() {
            return Err(RedisError::NoMasterName);
        }

        if self.nodes.is_empty() {
            return Err(RedisError::InvalidConfig(
                "at least one node is required".to_string(),
            ));
        }

        validate_nodes(&self.nodes)?;

        if self.call_timeout <= crate::client::POLL_INTERVAL {
            return Err(RedisError::InvalidConfig(format!(
                "call timeout {:?} must be longer than the {:?} poll interval",
                self.call_timeout,
                crate::client::POLL_INTERVAL
            )));
        }

        Ok(())
    }
}

fn split_nodes(nodes: &str) -> Vec<String> {
    nodes
        .split(',')
        .map(str::trim)
        .filter(|node| !node.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_value<T: std::str::FromStr>(name: &str, value: &str) -> RedisResult<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| RedisError::InvalidConfig(format!("invalid value {:?} for {}", value, name)))
}
