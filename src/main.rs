use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use mcredis::{cli::ProbeArgs, config::RedisConfig, instance::RedisInstance};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .compact()
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        error!(error = %format!("{:#}", e), "probe failed");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = ProbeArgs::new(std::env::args()).context("parsing command line")?;
    let config = args.apply(
        RedisConfig::from_env(&args.prefix)
            .with_context(|| format!("loading {}_* configuration", args.prefix))?,
    );

    info!(master_name = %config.master_name, nodes = ?config.nodes, "connecting through sentinels");

    let redis = RedisInstance::connect(config)
        .await
        .context("resolving redis master")?;

    match redis.get_info().await {
        Some(master) => info!(
            master = %master.master_addr,
            sentinel = %master.sentinel_addr,
            "sentinel reports master"
        ),
        None => warn!("no sentinel answered the info probe"),
    }

    if args.ping {
        redis.ping().await.context("PING against master")?;
        info!("master answered PING");
    }

    Ok(())
}
