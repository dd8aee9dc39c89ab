/// NodeInfo describes a cluster member.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeInfo {
    pub id: u64,
    pub host: String,
}

impl NodeInfo {
    pub fn new(id: u64, host: impl Into<String>) -> Self {
        Self {
            id,
            host: host.into(),
        }
    }
}

/// MetaClient resolves node ids to their network address.
#[async_trait]
pub trait MetaClient: Send + Sync {
    async fn node(&self, node_id: u64) -> anyhow::Result<NodeInfo>;
}
