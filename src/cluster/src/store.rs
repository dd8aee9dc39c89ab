use common_base::point::Point;

/// ShardStore is the local storage engine that persists points for the shards
/// this node owns.
#[async_trait]
pub trait ShardStore: Send + Sync {
    async fn write_shard(&self, shard_id: u64, points: Vec<Point>) -> anyhow::Result<()>;
}
