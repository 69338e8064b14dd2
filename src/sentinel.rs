//! Master discovery through Redis Sentinel.
//!
//! Each configured node is asked, in order, which address it currently
//! believes is the master for our master name. A sentinel's answer only
//! counts once the master itself confirms `role:master` in its replication
//! info; a sentinel with a stale view is skipped like an unreachable one.

use std::{sync::Arc, time::Duration};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
    command::Command,
    config::{MasterPort, RedisConfig},
    connection::Connection,
    dialer::Dialer,
    error::{RedisError, RedisResult},
    reply::from_reply,
    resp::RespValue,
};

pub const DEFAULT_MASTER_PORT: u16 = 6379;

/// Where a resolution ended up: the confirmed master and the sentinel that
/// pointed at it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterInfo {
    pub master_addr: String,
    pub sentinel_addr: String,
}

pub struct SentinelResolver<D: Dialer> {
    dialer: Arc<D>,
    master_name: String,
    servers: RwLock<Vec<String>>,
    probe_timeout: Duration,
    master_port: MasterPort,
    promote_sentinel: bool,
}

impl<D: Dialer> SentinelResolver<D> {
    pub fn new(dialer: Arc<D>, config: &RedisConfig) -> Self {
        Self {
            dialer,
            master_name: config.master_name.clone(),
            servers: RwLock::new(config.nodes.clone()),
            probe_timeout: config.sentinel_probe_timeout,
            master_port: config.master_port,
            promote_sentinel: config.promote_sentinel,
        }
    }

    /// The sentinel list in the order the next resolution will try it.
    pub async fn servers(&self) -> Vec<String> {
        self.servers.read().await.clone()
    }

    /// Finds and confirms the current master.
    ///
    /// # Returns
    ///
    /// * `Ok(MasterInfo)` - A sentinel named a master and that master confirmed its role
    /// * `Err(RedisError::NoMasterName)` - No master name is configured
    /// * `Err(RedisError::MalformedServerNode)` - A node address has no port; nothing was dialed
    /// * `Err(RedisError::MasterNameNotKnown)` - Some sentinel answered but did not know the name,
    ///   and no other sentinel produced a confirmed master
    /// * `Err(RedisError::NoSentinelFound)` - No sentinel produced a confirmed master
    pub async fn resolve(&self) -> RedisResult<MasterInfo> {
        if self.master_name.is_empty() {
            return Err(RedisError::NoMasterName);
        }

        let servers = self.servers().await;
        validate_nodes(&servers)?;

        let mut name_unknown = false;

        for server in servers.iter() {
            let sentinel = match self
                .dialer
                .dial_timeout(
                    "tcp",
                    server,
                    self.probe_timeout,
                    Duration::ZERO,
                    Duration::ZERO,
                )
                .await
            {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(sentinel = %server, error = %e, "could not reach sentinel");
                    continue;
                }
            };

            let master_addr = self.query_master_addr(&sentinel).await;
            close_quietly(&sentinel, server).await;

            let master_addr = match master_addr {
                Ok(addr) => addr,
                Err(e @ RedisError::MasterNameNotKnown(_)) => {
                    warn!(sentinel = %server, error = %e, "sentinel does not know the master");
                    name_unknown = true;
                    continue;
                }
                Err(e) => {
                    warn!(sentinel = %server, error = %e, "sentinel query failed");
                    continue;
                }
            };

            if !self.confirm_master(&master_addr).await {
                warn!(sentinel = %server, master = %master_addr, "sentinel points at a node that is not master");
                continue;
            }

            if self.promote_sentinel {
                self.promote(server).await;
            }

            info!(sentinel = %server, master = %master_addr, "resolved redis master");

            return Ok(MasterInfo {
                master_addr,
                sentinel_addr: server.clone(),
            });
        }

        if name_unknown {
            Err(RedisError::MasterNameNotKnown(self.master_name.clone()))
        } else {
            Err(RedisError::NoSentinelFound)
        }
    }

    /// Asks the sentinels for the master address again, without confirming it
    /// against the master. Returns `None` when no sentinel answers.
    pub async fn info(&self) -> Option<MasterInfo> {
        let servers = self.servers().await;

        for server in servers.iter() {
            let Ok(sentinel) = self
                .dialer
                .dial_timeout(
                    "tcp",
                    server,
                    self.probe_timeout,
                    Duration::ZERO,
                    Duration::ZERO,
                )
                .await
            else {
                continue;
            };

            let master_addr = self.query_master_addr(&sentinel).await;
            close_quietly(&sentinel, server).await;

            if let Ok(master_addr) = master_addr {
                return Some(MasterInfo {
                    master_addr,
                    sentinel_addr: server.clone(),
                });
            }
        }

        None
    }

    async fn query_master_addr(&self, sentinel: &D::Conn) -> RedisResult<String> {
        let reply = sentinel
            .execute(
                &Command::new("SENTINEL")
                    .arg("get-master-addr-by-name")
                    .arg(&self.master_name),
            )
            .await?;

        match reply {
            RespValue::Null => Err(RedisError::MasterNameNotKnown(self.master_name.clone())),
            RespValue::Array(elements) => construct_master_address(&elements, self.master_port),
            other => Err(RedisError::UnexpectedReply(format!(
                "sentinel replied with {} to get-master-addr-by-name",
                other.type_name()
            ))),
        }
    }

    async fn confirm_master(&self, master_addr: &str) -> bool {
        let master = match self
            .dialer
            .dial_timeout(
                "tcp",
                master_addr,
                self.probe_timeout,
                self.probe_timeout,
                self.probe_timeout,
            )
            .await
        {
            Ok(conn) => conn,
            Err(e) => {
                debug!(master = %master_addr, error = %e, "could not reach master candidate");
                return false;
            }
        };

        let replication = master
            .execute(&Command::new("INFO").arg("replication"))
            .await
            .and_then(from_reply::<String>);
        close_quietly(&master, master_addr).await;

        match replication {
            Ok(replication) => replication.contains("role:master"),
            Err(e) => {
                debug!(master = %master_addr, error = %e, "INFO replication failed");
                false
            }
        }
    }

    async fn promote(&self, server: &str) {
        let mut servers = self.servers.write().await;

        if let Some(pos) = servers.iter().position(|s| s == server) {
            let promoted = servers.remove(pos);
            servers.insert(0, promoted);
        }
    }
}

/// Every node must be a `host:port` address.
pub fn validate_nodes(nodes: &[String]) -> RedisResult<()> {
    for node in nodes {
        if !node.contains(':') {
            return Err(RedisError::MalformedServerNode(node.clone()));
        }
    }

    Ok(())
}

fn construct_master_address(elements: &[RespValue], master_port: MasterPort) -> RedisResult<String> {
    let Some(ip) = elements.first().and_then(RespValue::as_str) else {
        return Err(RedisError::UnexpectedReply(
            "sentinel reply has no master ip".to_string(),
        ));
    };

    let port = match master_port {
        MasterPort::Fixed(port) => port,
        MasterPort::FromSentinel => elements
            .get(1)
            .and_then(RespValue::as_str)
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(DEFAULT_MASTER_PORT),
    };

    Ok(format!("{}:{}", ip, port))
}

async fn close_quietly<C: Connection>(conn: &C, address: &str) {
    if let Err(e) = conn.close().await {
        debug!(address = %address, error = %e, "error closing probe connection");
    }
}
