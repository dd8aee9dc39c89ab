use std::io;
use std::sync::Arc;

use bytes::Bytes;
use common_base::point::Point;
use tracing::debug;

use crate::error::{ClusterError, Result};
use crate::meta::MetaClient;
use crate::pool::{Connection, ConnectionPool};
use crate::rpc::{
    read_tlv, write_tlv, WriteShardRequest, WriteShardResponse, WRITE_SHARD_REQUEST_MESSAGE,
    WRITE_SHARD_RESPONSE_MESSAGE,
};

/// ShardWriter forwards points to the node that owns a shard.
///
/// Connections are dialed on first use and cached per host until the writer
/// is closed or the connection fails. The owner's address is looked up again
/// on every write.
pub struct ShardWriter {
    meta: Arc<dyn MetaClient>,
    pool: ConnectionPool,
}

impl ShardWriter {
    pub fn new(meta: Arc<dyn MetaClient>) -> Self {
        Self {
            meta,
            pool: ConnectionPool::new(),
        }
    }

    /// write sends `points` for `shard_id` to node `owner_id` and waits for
    /// the owner to apply them.
    ///
    /// A write the owner's store rejects returns `ClusterError::WriteShard`.
    /// Transport failures are returned as is and drop the cached connection,
    /// as does cancelling the returned future before the response arrives.
    pub async fn write(&self, shard_id: u64, owner_id: u64, points: Vec<Point>) -> Result<()> {
        let node = self.meta.node(owner_id).await.map_err(ClusterError::Meta)?;

        let n = points.len();
        let buf = WriteShardRequest::new(shard_id, points).encode()?;

        let mut conn = self.pool.acquire(&node.host).await?;
        let resp = match conn.stream() {
            Some(stream) => exchange(stream, &buf).await,
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "no connection").into()),
        };

        match resp {
            Ok(resp) => {
                conn.release();
                debug!(
                    "write shard {} to node {} ({}): {} points, {:?}",
                    shard_id, node.id, node.host, n, resp
                );
                resp.into_result()
            }
            Err(e) => {
                conn.invalidate();
                Err(e)
            }
        }
    }

    /// close shuts down every cached connection and returns the first error.
    /// The writer stays usable, later writes dial new connections.
    pub async fn close(&self) -> Result<()> {
        self.pool.close().await
    }

    /// connection_count returns the number of cached connections.
    pub fn connection_count(&self) -> usize {
        self.pool.len()
    }
}

async fn exchange(stream: &mut Connection, buf: &Bytes) -> Result<WriteShardResponse> {
    write_tlv(stream, WRITE_SHARD_REQUEST_MESSAGE, buf).await?;

    match read_tlv(stream).await? {
        Some((WRITE_SHARD_RESPONSE_MESSAGE, buf)) => WriteShardResponse::decode(buf),
        Some((typ, _)) => Err(ClusterError::UnknownMessageType(typ)),
        None => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed before write shard response",
        )
        .into()),
    }
}
