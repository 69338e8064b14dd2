use std::future::Future;

use tracing::debug;
use uuid::Uuid;

use crate::{
    client::SentinelClient,
    command::{Command, ToArg},
    config::RedisConfig,
    dialer::Dialer,
    error::RedisResult,
    reply::{from_reply, FromReply},
    resp::RespValue,
    sentinel::MasterInfo,
};

/// Something that can run raw commands against Redis.
pub trait RedisCommander: Send + Sync {
    fn execute(&self, cmd: Command) -> impl Future<Output = RedisResult<RespValue>> + Send;

    fn get_info(&self) -> impl Future<Output = Option<MasterInfo>> + Send;
}

impl<D: Dialer> RedisCommander for SentinelClient<D> {
    async fn execute(&self, cmd: Command) -> RedisResult<RespValue> {
        SentinelClient::execute(self, cmd).await
    }

    async fn get_info(&self) -> Option<MasterInfo> {
        self.info().await
    }
}

/// Typed commands on top of a `RedisCommander`.
pub struct RedisInstance<C: RedisCommander = SentinelClient> {
    commander: C,
}

impl RedisInstance<SentinelClient> {
    pub async fn connect(config: RedisConfig) -> RedisResult<Self> {
        Ok(Self::new(SentinelClient::connect(config).await?))
    }
}

impl<C: RedisCommander> RedisInstance<C> {
    pub fn new(commander: C) -> Self {
        Self { commander }
    }

    pub fn commander(&self) -> &C {
        &self.commander
    }

    /// Runs an arbitrary command and returns the raw reply.
    pub async fn execute(&self, cmd: Command) -> RedisResult<RespValue> {
        self.query(cmd).await
    }

    /// Runs an arbitrary command and coerces the reply into `T`.
    pub async fn query<T: FromReply>(&self, cmd: Command) -> RedisResult<T> {
        from_reply(self.commander.execute(cmd).await?)
    }

    pub async fn get_info(&self) -> Option<MasterInfo> {
        self.commander.get_info().await
    }

    pub async fn ping(&self) -> RedisResult<()> {
        self.query(Command::new("PING")).await
    }

    pub async fn set<V: ToArg>(&self, key: &str, value: V) -> RedisResult<()> {
        self.query(Command::new("SET").arg(key).arg(value)).await
    }

    /// Stores `data` under `key`, expiring after `ttl` seconds when `ttl` is
    /// positive and never otherwise.
    pub async fn set_ex<V: ToArg>(&self, key: &str, data: V, ttl: u64) -> RedisResult<()> {
        if ttl > 0 {
            self.query(Command::new("SETEX").arg(key).arg(ttl).arg(data))
                .await
        } else {
            self.set(key, data).await
        }
    }

    pub async fn get(&self, key: &str) -> RedisResult<RespValue> {
        self.query(Command::new("GET").arg(key)).await
    }

    pub async fn get_int(&self, key: &str) -> RedisResult<i64> {
        self.query(Command::new("GET").arg(key)).await
    }

    /// Value stored at `key`, or an empty vector if there is none.
    pub async fn get_bytes(&self, key: &str) -> RedisResult<Vec<u8>> {
        let data: Option<Vec<u8>> = self.query(Command::new("GET").arg(key)).await?;
        Ok(data.unwrap_or_default())
    }

    pub async fn del(&self, key: &str) -> RedisResult<()> {
        self.query(Command::new("DEL").arg(key)).await
    }

    pub async fn incr(&self, key: &str) -> RedisResult<i64> {
        self.query(Command::new("INCR").arg(key)).await
    }

    pub async fn decr(&self, key: &str) -> RedisResult<i64> {
        self.query(Command::new("DECR").arg(key)).await
    }

    /// Returns 1 if the timeout was set, 0 if the key does not exist.
    pub async fn expire(&self, key: &str, ttl: u64) -> RedisResult<i64> {
        self.query(Command::new("EXPIRE").arg(key).arg(ttl)).await
    }

    pub async fn exists(&self, key: &str) -> RedisResult<bool> {
        self.query(Command::new("EXISTS").arg(key)).await
    }

    pub async fn set_add<I, T>(&self, key: &str, members: I) -> RedisResult<()>
    where
        I: IntoIterator<Item = T>,
        T: ToArg,
    {
        self.query(Command::new("SADD").arg(key).args_from(members))
            .await
    }

    pub async fn get_members_of_set(&self, key: &str) -> RedisResult<Vec<String>> {
        self.query(Command::new("SMEMBERS").arg(key)).await
    }

    /// Members of the set at `key` that are in none of the sets at `keys`.
    pub async fn set_diff<I, T>(&self, key: &str, keys: I) -> RedisResult<Vec<String>>
    where
        I: IntoIterator<Item = T>,
        T: ToArg,
    {
        self.query(Command::new("SDIFF").arg(key).args_from(keys))
            .await
    }

    /// Stores `data` under a fresh random UUID and returns the key.
    ///
    /// Uniqueness is best effort: the key is probed with `GET` before it is
    /// written, and nothing stops another writer from taking it in between.
    pub async fn set_with_uuid(&self, data: &[u8], ttl: u64) -> RedisResult<String> {
        self.set_with_key_generator(data, ttl, || Uuid::new_v4().to_string())
            .await
    }

    /// Like `set_with_uuid`, drawing candidate keys from `next_key` until one
    /// has no data stored under it.
    pub async fn set_with_key_generator<F>(
        &self,
        data: &[u8],
        ttl: u64,
        mut next_key: F,
    ) -> RedisResult<String>
    where
        F: FnMut() -> String,
    {
        loop {
            let key = next_key();

            if self.get_bytes(&key).await?.is_empty() {
                self.set_ex(&key, data, ttl).await?;
                return Ok(key);
            }

            debug!(key = %key, "generated key is already taken");
        }
    }
}
