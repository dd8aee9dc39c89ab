use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClusterError>;

#[derive(Error, Debug)]
pub enum ClusterError {
    /// Returned by every `close` after the first one.
    #[error("server already closed")]
    ServerClosed,

    /// Returned by `open` when no bind address was configured.
    #[error("bind address required")]
    BindAddressRequired,

    /// The remote shard store rejected a write.
    #[error("error code {code}: {message}")]
    WriteShard { code: u32, message: String },

    #[error("max message size of {max} exceeded: {size}")]
    MessageTooLarge { size: u64, max: u64 },

    #[error("unknown message type: {0}")]
    UnknownMessageType(u8),

    #[error("malformed message: {0}")]
    Malformed(String),

    /// Node lookup failed.
    #[error(transparent)]
    Meta(anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ClusterError {
    /// is_transport reports whether the error left the connection it happened
    /// on in an unknown state.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ClusterError::Io(_)
                | ClusterError::MessageTooLarge { .. }
                | ClusterError::UnknownMessageType(_)
                | ClusterError::Malformed(_)
        )
    }
}
