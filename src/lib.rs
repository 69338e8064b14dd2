//! A Redis client that finds its master through Redis Sentinel.
//!
//! The crate is layered bottom-up:
//!
//! - `resp`, `command` and `reply` speak the wire protocol and coerce replies
//! - `connection` and `dialer` abstract single connections so tests can swap
//!   the network out
//! - `sentinel` asks sentinels for the master and confirms it with
//!   `INFO replication`
//! - `pool` and `client` keep connections to the master, retry calls for a
//!   bounded time and rebuild themselves when the master gets demoted
//! - `instance` exposes typed commands (GET, SET, INCR, SADD, ...) on top
//!
//! ```no_run
//! use mcredis::{config::RedisConfig, instance::RedisInstance};
//!
//! # async fn demo() -> mcredis::error::RedisResult<()> {
//! let config = RedisConfig::new("mymaster", "10.0.0.1:26379,10.0.0.2:26379");
//! let redis = RedisInstance::connect(config).await?;
//!
//! redis.set("greeting", "hello").await?;
//! let hits = redis.incr("hits").await?;
//! # let _ = hits;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod client;
pub mod command;
pub mod config;
pub mod connection;
pub mod dialer;
pub mod error;
pub mod instance;
pub mod pool;
pub mod reply;
pub mod resp;
pub mod sentinel;
pub mod wait_for;

pub use client::SentinelClient;
pub use config::RedisConfig;
pub use error::{RedisError, RedisResult};
pub use instance::{RedisCommander, RedisInstance};
