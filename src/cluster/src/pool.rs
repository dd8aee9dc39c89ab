use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::error::Result;

pub type Connection = BufStream<TcpStream>;

type Slot = Arc<AsyncMutex<Option<Connection>>>;

/// ConnectionPool caches at most one connection per host.
///
/// Every host owns a slot guarded by its own async lock: a caller holds the
/// slot for a whole request/response exchange, so a connection never carries
/// two requests at once, and a slow dial to one host never blocks another.
pub struct ConnectionPool {
    slots: Mutex<HashMap<String, Slot>>,
    live: Arc<AtomicUsize>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// acquire returns exclusive use of the connection to `host`, dialing one
    /// if none is cached.
    pub async fn acquire(&self, host: &str) -> Result<PooledConnection> {
        let slot = self.slot(host);
        let mut guard = slot.lock_owned().await;

        if guard.is_none() {
            debug!("dialing {}", host);
            let stream = TcpStream::connect(host).await?;
            stream.set_nodelay(true)?;
            *guard = Some(BufStream::new(stream));
            self.live.fetch_add(1, Ordering::Relaxed);
        }

        Ok(PooledConnection {
            guard,
            live: self.live.clone(),
            reusable: false,
        })
    }

    /// len returns the number of cached connections.
    pub fn len(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// close shuts down every cached connection. It waits for exchanges in
    /// flight, keeps going past failures and returns the first one. Hosts
    /// nobody is using are forgotten.
    pub async fn close(&self) -> Result<()> {
        let slots: Vec<(String, Slot)> = self
            .lock_slots()
            .iter()
            .map(|(host, slot)| (host.clone(), slot.clone()))
            .collect();

        let mut first_err = None;
        for (host, slot) in slots {
            let conn = slot.lock().await.take();
            {
                let mut map = self.lock_slots();
                // only the map and this loop hold the slot
                let idle = Arc::strong_count(&slot) == 2
                    && map.get(&host).map_or(false, |s| Arc::ptr_eq(s, &slot));
                if idle {
                    map.remove(&host);
                }
            }

            if let Some(mut conn) = conn {
                self.live.fetch_sub(1, Ordering::Relaxed);
                if let Err(e) = conn.shutdown().await {
                    warn!("closing connection to {}: {}", host, e);
                    first_err.get_or_insert(e);
                }
            }
        }

        match first_err {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn slot(&self, host: &str) -> Slot {
        self.lock_slots()
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(None)))
            .clone()
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new()
    }
}

/// PooledConnection holds a host's slot until dropped.
///
/// The connection goes back to the pool only after `release`. Dropping it any
/// other way, including cancelling the exchange midway, drops the connection
/// so a response left on the wire is never read by the next caller.
pub struct PooledConnection {
    guard: OwnedMutexGuard<Option<Connection>>,
    live: Arc<AtomicUsize>,
    reusable: bool,
}

impl PooledConnection {
    pub fn stream(&mut self) -> Option<&mut Connection> {
        (*self.guard).as_mut()
    }

    /// release keeps the connection cached for the next acquire.
    pub fn release(mut self) {
        self.reusable = true;
    }

    /// invalidate drops the connection so the next acquire dials again.
    pub fn invalidate(mut self) {
        self.reusable = false;
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if !self.reusable && self.guard.take().is_some() {
            debug!("dropping unreleased connection");
            self.live.fetch_sub(1, Ordering::Relaxed);
        }
    }
}
