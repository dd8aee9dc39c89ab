use std::sync::Arc;

use clap::Parser;
use common_base::point::Point;
use influxdb_cluster::config::DEFAULT_BIND_ADDRESS;
use influxdb_cluster::{ShardStore, ShardWriteServer};
use serde::Deserialize;
use serde::Serialize;
use tracing::{debug, info, Level};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Parser)]
#[clap(about, version, author)]
struct Config {
    #[clap(long, default_value = DEFAULT_BIND_ADDRESS)]
    pub bind_address: String,

    #[clap(long, default_value = "info")]
    pub log_level: String,
}

/// LogStore accepts every write and logs the points.
struct LogStore;

#[async_trait::async_trait]
impl ShardStore for LogStore {
    async fn write_shard(&self, shard_id: u64, points: Vec<Point>) -> anyhow::Result<()> {
        info!("shard {}: {} points", shard_id, points.len());
        for p in &points {
            debug!("shard {}: {:?}", shard_id, p);
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    let level: Level = config.log_level.parse()?;
    tracing_subscriber::fmt().with_max_level(level).init();
    info!("config: {:?}", config);

    let server = ShardWriteServer::with_config(
        Arc::new(LogStore),
        &influxdb_cluster::Config {
            bind_address: config.bind_address,
        },
    );
    server.open().await?;
    if let Some(addr) = server.addr() {
        println!("listening on {}", addr);
    }

    tokio::signal::ctrl_c().await?;
    server.close().await?;

    Ok(())
}
