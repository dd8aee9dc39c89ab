use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::io::BufStream;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ClusterError, Result};
use crate::rpc::{
    read_tlv, write_tlv, WriteShardRequest, WriteShardResponse, WRITE_SHARD_ERROR_CODE,
    WRITE_SHARD_REQUEST_MESSAGE, WRITE_SHARD_RESPONSE_MESSAGE,
};
use crate::store::ShardStore;

/// Counters kept by the shard write server.
#[derive(Default)]
struct Statistics {
    write_shard_req: AtomicU64,
    write_shard_points_req: AtomicU64,
    write_shard_fail: AtomicU64,
}

/// ServerStatistics is a point in time copy of the server counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStatistics {
    /// Number of write shard requests received.
    pub write_shard_req: u64,
    /// Number of points received in write shard requests.
    pub write_shard_points_req: u64,
    /// Number of write shard requests the local store failed.
    pub write_shard_fail: u64,
}

enum State {
    Created,
    Open(Running),
    Closed,
}

struct Running {
    addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    accept: JoinHandle<()>,
}

/// ShardWriteServer accepts write shard requests forwarded by other nodes and
/// applies them to the local store.
///
/// Each accepted connection is served by its own task which handles one
/// request at a time, so responses come back in request order.
pub struct ShardWriteServer {
    store: Arc<dyn ShardStore>,
    bind_address: String,

    state: Mutex<State>,
    stats: Arc<Statistics>,
}

impl ShardWriteServer {
    pub fn new(store: Arc<dyn ShardStore>, bind_address: impl Into<String>) -> Self {
        Self {
            store,
            bind_address: bind_address.into(),
            state: Mutex::new(State::Created),
            stats: Arc::new(Statistics::default()),
        }
    }

    pub fn with_config(store: Arc<dyn ShardStore>, config: &Config) -> Self {
        Self::new(store, config.bind_address.clone())
    }

    /// open binds the listener and starts accepting connections. Opening an
    /// open server does nothing.
    pub async fn open(&self) -> Result<()> {
        match &*self.lock_state() {
            State::Created => {}
            State::Open(_) => return Ok(()),
            State::Closed => return Err(ClusterError::ServerClosed),
        }

        if self.bind_address.is_empty() {
            return Err(ClusterError::BindAddressRequired);
        }

        let listener = TcpListener::bind(self.bind_address.as_str()).await?;
        let addr = listener.local_addr()?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let accept = tokio::spawn(accept_loop(
            listener,
            self.store.clone(),
            self.stats.clone(),
            shutdown_rx,
        ));

        let mut state = self.lock_state();
        match &*state {
            State::Created => {
                info!("shard write server listening on {}", addr);
                *state = State::Open(Running {
                    addr,
                    shutdown,
                    accept,
                });
                Ok(())
            }
            // lost a race against a concurrent open or close
            other => {
                let closed = matches!(other, State::Closed);
                let _ = shutdown.send(true);
                accept.abort();
                if closed {
                    Err(ClusterError::ServerClosed)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// close stops the listener and every connection handler. Only the first
    /// call succeeds, later calls return `ClusterError::ServerClosed`.
    pub async fn close(&self) -> Result<()> {
        let prev = std::mem::replace(&mut *self.lock_state(), State::Closed);
        match prev {
            State::Closed => Err(ClusterError::ServerClosed),
            State::Created => Ok(()),
            State::Open(running) => {
                let _ = running.shutdown.send(true);
                if let Err(e) = running.accept.await {
                    warn!("shard write server accept loop: {}", e);
                }
                info!("shard write server on {} closed", running.addr);
                Ok(())
            }
        }
    }

    /// addr returns the bound address while the server is open.
    pub fn addr(&self) -> Option<SocketAddr> {
        match &*self.lock_state() {
            State::Open(running) => Some(running.addr),
            _ => None,
        }
    }

    pub fn statistics(&self) -> ServerStatistics {
        ServerStatistics {
            write_shard_req: self.stats.write_shard_req.load(Ordering::Relaxed),
            write_shard_points_req: self.stats.write_shard_points_req.load(Ordering::Relaxed),
            write_shard_fail: self.stats.write_shard_fail.load(Ordering::Relaxed),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, State> {
        // the state is replaced wholesale, a poisoned guard still holds a valid value
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

async fn accept_loop(
    listener: TcpListener,
    store: Arc<dyn ShardStore>,
    stats: Arc<Statistics>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            res = listener.accept() => match res {
                Ok((stream, peer)) => {
                    debug!("accepted connection from {}", peer);
                    let store = store.clone();
                    let stats = stats.clone();
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_conn(stream, store, stats, shutdown).await {
                            warn!("connection from {}: {}", peer, e);
                        }
                    });
                }
                Err(e) => warn!("accept error: {}", e),
            },
        }
    }
}

async fn handle_conn(
    stream: TcpStream,
    store: Arc<dyn ShardStore>,
    stats: Arc<Statistics>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let mut stream = BufStream::new(stream);

    loop {
        if *shutdown.borrow() {
            return Ok(());
        }

        let frame = tokio::select! {
            biased;
            _ = shutdown.changed() => return Ok(()),
            frame = read_tlv(&mut stream) => frame?,
        };

        let (typ, buf) = match frame {
            Some(frame) => frame,
            None => return Ok(()),
        };

        match typ {
            WRITE_SHARD_REQUEST_MESSAGE => {
                let resp = handle_write_shard_request(buf, store.as_ref(), &stats).await?;
                write_tlv(&mut stream, WRITE_SHARD_RESPONSE_MESSAGE, &resp.encode()?).await?;
            }
            _ => return Err(ClusterError::UnknownMessageType(typ)),
        }
    }
}

async fn handle_write_shard_request(
    buf: Bytes,
    store: &dyn ShardStore,
    stats: &Statistics,
) -> Result<WriteShardResponse> {
    let req = WriteShardRequest::decode(buf)?;

    stats.write_shard_req.fetch_add(1, Ordering::Relaxed);
    stats
        .write_shard_points_req
        .fetch_add(req.points.len() as u64, Ordering::Relaxed);
    debug!(
        "write shard request: shard {}, {} points",
        req.shard_id,
        req.points.len()
    );

    match store.write_shard(req.shard_id, req.points).await {
        Ok(()) => Ok(WriteShardResponse::Success),
        Err(e) => {
            stats.write_shard_fail.fetch_add(1, Ordering::Relaxed);
            Ok(WriteShardResponse::error(WRITE_SHARD_ERROR_CODE, e.to_string()))
        }
    }
}
