use std::sync::Arc;

use clap::Parser;
use common_base::point::{FieldValue, Fields, Point, Tags};
use influxdb_cluster::{MetaClient, NodeInfo, ShardWriter};
use influxdb_utils::time::now_unix_nano;
use serde::Deserialize;
use serde::Serialize;
use tracing::{info, Level};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Parser)]
#[clap(about, version, author)]
struct Config {
    /// address of the shard write server
    #[clap(long)]
    pub host: String,

    #[clap(long, default_value_t = 1)]
    pub shard_id: u64,

    #[clap(long, default_value_t = 1)]
    pub owner_id: u64,

    #[clap(long)]
    pub measurement: String,

    /// key=value, repeatable
    #[clap(long = "tag")]
    pub tags: Vec<String>,

    /// key=value, repeatable. `100i` and `100` are integers.
    #[clap(long = "field", required = true)]
    pub fields: Vec<String>,

    /// unix nanoseconds, defaults to now
    #[clap(long)]
    pub time: Option<i64>,

    #[clap(long, default_value = "info")]
    pub log_level: String,
}

/// StaticMetaClient resolves every node to one host.
struct StaticMetaClient {
    host: String,
}

#[async_trait::async_trait]
impl MetaClient for StaticMetaClient {
    async fn node(&self, node_id: u64) -> anyhow::Result<NodeInfo> {
        Ok(NodeInfo::new(node_id, self.host.clone()))
    }
}

fn parse_pair(s: &str) -> anyhow::Result<(&str, &str)> {
    s.split_once('=')
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| anyhow::anyhow!("expected key=value, got {:?}", s))
}

fn parse_field_value(s: &str) -> FieldValue {
    if let Some(v) = s.strip_suffix('i').and_then(|v| v.parse::<i64>().ok()) {
        return FieldValue::Integer(v);
    }
    if let Ok(v) = s.parse::<i64>() {
        return FieldValue::Integer(v);
    }
    if let Ok(v) = s.parse::<f64>() {
        if v.is_finite() {
            return FieldValue::Float(v);
        }
    }
    match s {
        "t" | "T" | "true" | "True" | "TRUE" => FieldValue::Boolean(true),
        "f" | "F" | "false" | "False" | "FALSE" => FieldValue::Boolean(false),
        _ => FieldValue::String(s.trim_matches('"').to_string()),
    }
}

fn build_point(config: &Config, unix_nano: i64) -> anyhow::Result<Point> {
    let tags = config
        .tags
        .iter()
        .map(|t| parse_pair(t))
        .collect::<anyhow::Result<Tags>>()?;

    let mut fields = Fields::new();
    for f in &config.fields {
        let (k, v) = parse_pair(f)?;
        fields.insert(k.to_string(), parse_field_value(v));
    }

    Point::new(config.measurement.as_str(), tags, fields, unix_nano)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    let level: Level = config.log_level.parse()?;
    tracing_subscriber::fmt().with_max_level(level).init();

    let unix_nano = match config.time {
        Some(t) => t,
        None => now_unix_nano(),
    };
    let point = build_point(&config, unix_nano)?;
    info!("writing {:?} to shard {}", point, config.shard_id);

    let writer = ShardWriter::new(Arc::new(StaticMetaClient {
        host: config.host.clone(),
    }));
    let res = writer
        .write(config.shard_id, config.owner_id, vec![point])
        .await;
    writer.close().await?;
    res?;

    println!("ok");
    Ok(())
}
