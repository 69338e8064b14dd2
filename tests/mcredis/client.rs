use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use mcredis::{
    client::SentinelClient,
    command::Command,
    config::RedisConfig,
    error::{RedisError, RedisResult},
    resp::RespValue,
};

use crate::test_utils::{
    master_addr_reply, ok, pong, read_only_error, replication_info, spawn_resp_server,
    test_config, FakeDialer, ServerAction,
};

const OLD_MASTER: &str = "10.0.0.1:6379";
const NEW_MASTER: &str = "10.0.0.2:6379";
const THIRD_MASTER: &str = "10.0.0.3:6379";

/// A cluster whose master moves from 10.0.0.1 to 10.0.0.2 the first time a
/// write reaches the old master. `writes_to_old` counts those writes.
fn failover_dialer(failed_over: Arc<AtomicBool>, writes_to_old: Arc<AtomicUsize>) -> FakeDialer {
    FakeDialer::new(move |address: &str, cmd: &Command| -> RedisResult<RespValue> {
        let moved = failed_over.load(Ordering::SeqCst);

        match (address, cmd.name()) {
            ("s:1", "SENTINEL") if moved => Ok(master_addr_reply("10.0.0.2", "6379")),
            ("s:1", "SENTINEL") => Ok(master_addr_reply("10.0.0.1", "6379")),
            (OLD_MASTER, "INFO") if moved => Ok(replication_info("slave")),
            (_, "INFO") => Ok(replication_info("master")),
            (_, "PING") => Ok(pong()),
            (OLD_MASTER, "SET") => {
                writes_to_old.fetch_add(1, Ordering::SeqCst);
                failed_over.store(true, Ordering::SeqCst);
                Err(read_only_error())
            }
            (_, "SET") => Ok(ok()),
            (_, "GET") => Ok(RespValue::from(address)),
            _ => Err(RedisError::Server("ERR unexpected".to_string())),
        }
    })
}

#[tokio::test]
async fn test_client_construction_resolves_master() {
    let dialer = failover_dialer(Arc::default(), Arc::default());

    let client = SentinelClient::with_dialer(test_config("s:1"), dialer.clone())
        .await
        .unwrap();

    assert_eq!(client.master_addr().await, OLD_MASTER);
    assert_eq!(client.rebuild_count(), 0);
    assert_eq!(client.sentinels().await, vec!["s:1"]);
    assert_eq!(
        client.execute(Command::new("GET").arg("k")).await,
        Ok(RespValue::from(OLD_MASTER))
    );
    assert_eq!(
        client.info().await.map(|info| info.sentinel_addr),
        Some("s:1".to_string())
    );
}

#[tokio::test]
async fn test_client_construction_failures() {
    let mut short_timeout = test_config("s:1");
    short_timeout.call_timeout = Duration::from_millis(1);

    let test_cases = vec![
        (test_config("down:1,down:2"), RedisError::NoSentinelFound),
        (RedisConfig::new("", "s:1"), RedisError::NoMasterName),
        (
            test_config("s:1,localhost"),
            RedisError::MalformedServerNode("localhost".to_string()),
        ),
        (
            test_config(""),
            RedisError::InvalidConfig("at least one node is required".to_string()),
        ),
        (
            short_timeout,
            RedisError::InvalidConfig(
                "call timeout 1ms must be longer than the 1ms poll interval".to_string(),
            ),
        ),
    ];

    for (config, expected) in test_cases {
        let dialer =
            failover_dialer(Arc::default(), Arc::default()).with_unreachable(&["down:1", "down:2"]);

        let result = SentinelClient::with_dialer(config.clone(), dialer).await;

        assert_eq!(result.err(), Some(expected), "connecting with {:?}", config);
    }
}

#[tokio::test]
async fn test_client_fails_over_on_read_only_error() {
    let writes_to_old = Arc::new(AtomicUsize::new(0));
    let dialer = failover_dialer(Arc::default(), Arc::clone(&writes_to_old));
    let client = SentinelClient::with_dialer(test_config("s:1"), dialer.clone())
        .await
        .unwrap();

    let result = client.execute(Command::new("SET").arg("k").arg("v")).await;

    assert_eq!(result, Ok(ok()));
    assert_eq!(client.rebuild_count(), 1);
    assert_eq!(writes_to_old.load(Ordering::SeqCst), 1);
    assert_eq!(client.master_addr().await, NEW_MASTER);

    // Later writes go straight to the new master.
    assert_eq!(client.execute(Command::new("SET").arg("k").arg("w")).await, Ok(ok()));
    assert_eq!(client.rebuild_count(), 1);
    assert_eq!(writes_to_old.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_client_retries_read_only_error_only_once() {
    // Sentinel keeps pointing at a node that refuses writes.
    let dialer = FakeDialer::new(|address: &str, cmd: &Command| match cmd.name() {
        "SENTINEL" => Ok(master_addr_reply("10.0.0.1", "6379")),
        "INFO" => Ok(replication_info("master")),
        "PING" => Ok(pong()),
        _ => Err(RedisError::Server(format!(
            "READONLY You can't write against a read only replica. ({})",
            address
        ))),
    });
    let client = SentinelClient::with_dialer(test_config("s:1"), dialer.clone())
        .await
        .unwrap();

    let result = client.execute(Command::new("SET").arg("k").arg("v")).await;

    assert!(matches!(&result, Err(e) if e.is_read_only()), "got {:?}", result);
    assert_eq!(client.rebuild_count(), 1);
    assert_eq!(dialer.dial_count("s:1"), 2);
}

#[tokio::test]
async fn test_client_returns_read_only_error_when_rebuild_fails() {
    let failed_over = Arc::new(AtomicBool::new(false));
    let dialer = {
        let failed_over = Arc::clone(&failed_over);
        FakeDialer::new(move |_: &str, cmd: &Command| match cmd.name() {
            "SENTINEL" if failed_over.load(Ordering::SeqCst) => Ok(RespValue::Null),
            "SENTINEL" => Ok(master_addr_reply("10.0.0.1", "6379")),
            "INFO" => Ok(replication_info("master")),
            "PING" => Ok(pong()),
            _ => {
                failed_over.store(true, Ordering::SeqCst);
                Err(read_only_error())
            }
        })
    };
    let client = SentinelClient::with_dialer(test_config("s:1"), dialer)
        .await
        .unwrap();

    let result = client.execute(Command::new("DEL").arg("k")).await;

    assert_eq!(result, Err(read_only_error()));
    assert_eq!(client.rebuild_count(), 0);
    assert_eq!(client.master_addr().await, OLD_MASTER);
}

#[tokio::test]
async fn test_client_concurrent_read_only_errors_rebuild_once() {
    let dialer = failover_dialer(Arc::default(), Arc::default());
    let client = Arc::new(
        SentinelClient::with_dialer(test_config("s:1"), dialer)
            .await
            .unwrap(),
    );

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                client
                    .execute(Command::new("SET").arg(format!("k{}", i)).arg("v"))
                    .await
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap(), Ok(ok()));
    }

    assert_eq!(client.rebuild_count(), 1);
    assert_eq!(client.master_addr().await, NEW_MASTER);
}

#[tokio::test]
async fn test_client_times_out_on_connection_errors() {
    let dialer = FakeDialer::new(|_: &str, cmd: &Command| match cmd.name() {
        "SENTINEL" => Ok(master_addr_reply("10.0.0.1", "6379")),
        "INFO" => Ok(replication_info("master")),
        "PING" => Ok(pong()),
        _ => Err(RedisError::Io("connection reset by peer".to_string())),
    });
    let mut config = test_config("s:1");
    config.call_timeout = Duration::from_millis(50);
    let client = SentinelClient::with_dialer(config, dialer).await.unwrap();

    let result = client.execute(Command::new("GET").arg("k")).await;

    assert_eq!(
        result,
        Err(RedisError::Timeout {
            timeout: Duration::from_millis(50),
            last_error: Some(Box::new(RedisError::Io(
                "connection reset by peer".to_string()
            ))),
        })
    );
    assert_eq!(client.rebuild_count(), 0);
}

#[tokio::test]
async fn test_client_read_only_error_after_pool_replaced_still_fails_over() {
    // Sentinel answers 10.0.0.1, then 10.0.0.2, then 10.0.0.3. The first
    // write reaching 10.0.0.2 finds it already demoted.
    let stage = Arc::new(AtomicUsize::new(0));
    let dialer = {
        let stage = Arc::clone(&stage);
        FakeDialer::new(move |address: &str, cmd: &Command| match (address, cmd.name()) {
            ("s:1", "SENTINEL") => Ok(match stage.load(Ordering::SeqCst) {
                0 => master_addr_reply("10.0.0.1", "6379"),
                1 => master_addr_reply("10.0.0.2", "6379"),
                _ => master_addr_reply("10.0.0.3", "6379"),
            }),
            (_, "INFO") => Ok(replication_info("master")),
            (_, "PING") => Ok(pong()),
            (NEW_MASTER, "SET")
                if stage
                    .compare_exchange(1, 2, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok() =>
            {
                Err(read_only_error())
            }
            (_, "SET") => Ok(ok()),
            (_, "GET") => Ok(RespValue::from(address)),
            _ => Err(RedisError::Server("ERR unexpected".to_string())),
        })
    };
    let mut config = test_config("s:1");
    config.pool_size = 1;
    config.call_timeout = Duration::from_secs(1);
    let client = Arc::new(
        SentinelClient::with_dialer(config, dialer.clone())
            .await
            .unwrap(),
    );

    // A reader takes the only slot of the first pool and stays in its dial,
    // so the writer keeps waiting for a connection from that pool.
    let gate = dialer.gate(OLD_MASTER);
    let reader = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.execute(Command::new("GET").arg("k")).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let writer = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.execute(Command::new("SET").arg("k").arg("v")).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    stage.store(1, Ordering::SeqCst);
    client.rebuild().await.unwrap();

    assert_eq!(writer.await.unwrap(), Ok(ok()));
    assert_eq!(client.rebuild_count(), 2);
    assert_eq!(client.master_addr().await, THIRD_MASTER);

    gate.add_permits(1);
    assert_eq!(reader.await.unwrap(), Ok(RespValue::from(OLD_MASTER)));
}

#[tokio::test]
async fn test_client_recovers_slots_held_by_hung_commands() {
    let hanging = Arc::new(AtomicBool::new(true));
    let master = {
        let hanging = Arc::clone(&hanging);
        spawn_resp_server(move |args| match args.first().map(String::as_str) {
            Some("INFO") => ServerAction::Reply(replication_info("master")),
            Some("PING") => ServerAction::Reply(pong()),
            Some("GET") if hanging.load(Ordering::SeqCst) => ServerAction::Hang,
            Some("GET") => ServerAction::Reply(RespValue::bulk("v")),
            _ => ServerAction::Reply(RespValue::Error("ERR unknown command".to_string())),
        })
        .await
    };
    let (ip, port) = master.split_once(':').unwrap();
    let reply = master_addr_reply(ip, port);
    let sentinel = spawn_resp_server(move |_| ServerAction::Reply(reply.clone())).await;

    let mut config = test_config(&sentinel);
    config.pool_size = 2;
    let client = SentinelClient::connect(config).await.unwrap();

    for _ in 0..2 {
        let result = client.execute(Command::new("GET").arg("k")).await;
        assert!(
            matches!(result, Err(RedisError::Timeout { .. })),
            "got {:?}",
            result
        );
    }

    // Both slots come back once the hung reads hit their i/o timeout.
    hanging.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(
        client.execute(Command::new("GET").arg("k")).await,
        Ok(RespValue::bulk("v"))
    );
}

#[tokio::test]
async fn test_client_explicit_rebuild() {
    let failed_over = Arc::new(AtomicBool::new(false));
    let dialer = failover_dialer(Arc::clone(&failed_over), Arc::default());
    let client = SentinelClient::with_dialer(test_config("s:1"), dialer)
        .await
        .unwrap();

    failed_over.store(true, Ordering::SeqCst);
    client.rebuild().await.unwrap();

    assert_eq!(client.rebuild_count(), 1);
    assert_eq!(client.master_addr().await, NEW_MASTER);
    assert_eq!(
        client.execute(Command::new("GET").arg("k")).await,
        Ok(RespValue::from(NEW_MASTER))
    );
}

#[tokio::test]
async fn test_client_over_loopback() {
    let master = spawn_resp_server(|args| match args.first().map(String::as_str) {
        Some("INFO") => ServerAction::Reply(replication_info("master")),
        Some("PING") => ServerAction::Reply(pong()),
        Some("INCR") => ServerAction::Reply(RespValue::Integer(1)),
        _ => ServerAction::Reply(RespValue::Error("ERR unknown command".to_string())),
    })
    .await;
    let (ip, port) = master.split_once(':').unwrap();
    let reply = master_addr_reply(ip, port);

    let sentinel = spawn_resp_server(move |_| ServerAction::Reply(reply.clone())).await;

    let client = SentinelClient::connect(test_config(&sentinel)).await.unwrap();

    assert_eq!(client.master_addr().await, master);
    assert_eq!(
        client.execute(Command::new("INCR").arg("hits")).await,
        Ok(RespValue::Integer(1))
    );
}
