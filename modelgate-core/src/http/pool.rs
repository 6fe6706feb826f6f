//! Pooled HTTP clients keyed by provider and endpoint
//!
//! Each (provider id, endpoint URL) pair owns one `reqwest::Client` and a
//! semaphore bounding its in-flight requests. A call holds a `PoolSlot` for
//! its whole lifetime, streaming body included, and the slot goes back to the
//! semaphore when it is dropped on any exit path.

use super::error::{FaultKind, TransportFault};
use crate::config::TransportConfig;
use reqwest::{Client, ClientBuilder};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

/// Default user agent
const USER_AGENT: &str = concat!("modelgate/", env!("CARGO_PKG_VERSION"));

/// Identity of a pooled client
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub provider_id: String,
    pub endpoint: String,
}

impl PoolKey {
    pub fn new(provider_id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            endpoint: endpoint.into(),
        }
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.provider_id, self.endpoint)
    }
}

struct PoolEntry {
    permits: Arc<Semaphore>,
    client: Mutex<Option<(Client, u64)>>,
}

/// Scoped concurrency slot; releasing it is dropping it
#[derive(Debug)]
pub struct PoolSlot {
    _permit: OwnedSemaphorePermit,
}

/// A client checked out of the pool together with its slot
pub struct PooledClient {
    pub client: Client,
    /// Identifies this client instance for eviction
    pub generation: u64,
    pub slot: PoolSlot,
}

pub struct ConnectionPool {
    settings: TransportConfig,
    entries: RwLock<HashMap<PoolKey, Arc<PoolEntry>>>,
    next_generation: AtomicU64,
    closed: AtomicBool,
}

impl ConnectionPool {
    pub fn new(settings: TransportConfig) -> Self {
        Self {
            settings,
            entries: RwLock::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &TransportConfig {
        &self.settings
    }

    /// Wait for a slot on `key`, then hand out its client, building one if needed
    pub async fn acquire(&self, key: &PoolKey) -> Result<PooledClient, TransportFault> {
        if self.is_closed() {
            return Err(shut_down());
        }
        let entry = self.entry(key)?;

        let permit = Arc::clone(&entry.permits)
            .acquire_owned()
            .await
            .map_err(|_| shut_down())?;

        let (client, generation) = {
            let mut guard = entry
                .client
                .lock()
                .map_err(|_| TransportFault::new(FaultKind::Setup, "connection pool poisoned"))?;
            match guard.as_ref() {
                Some((client, generation)) => (client.clone(), *generation),
                None => {
                    let client = self.build_client()?;
                    let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                    debug!(pool = %key, generation, "created pooled client");
                    *guard = Some((client.clone(), generation));
                    (client, generation)
                }
            }
        };

        Ok(PooledClient {
            client,
            generation,
            slot: PoolSlot { _permit: permit },
        })
    }

    /// Discard the client for `key` if it is still the given generation.
    ///
    /// The semaphore survives eviction so the concurrency bound stays strict
    /// for calls that still hold slots.
    pub fn evict(&self, key: &PoolKey, generation: u64) {
        let Some(entry) = self.existing(key) else {
            return;
        };
        if let Ok(mut guard) = entry.client.lock() {
            if matches!(guard.as_ref(), Some((_, current)) if *current == generation) {
                info!(pool = %key, generation, "evicting pooled client after transport fault");
                *guard = None;
            }
        };
    }

    /// Close every semaphore and drop every client; later acquires fail
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Ok(mut entries) = self.entries.write() {
            for entry in entries.values() {
                entry.permits.close();
            }
            entries.clear();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of live clients
    pub fn client_count(&self) -> usize {
        self.entries
            .read()
            .map(|entries| {
                entries
                    .values()
                    .filter(|e| e.client.lock().map(|c| c.is_some()).unwrap_or(false))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Free slots for `key`, if the key has been used
    pub fn available_slots(&self, key: &PoolKey) -> Option<usize> {
        self.existing(key).map(|e| e.permits.available_permits())
    }

    fn existing(&self, key: &PoolKey) -> Option<Arc<PoolEntry>> {
        self.entries.read().ok()?.get(key).cloned()
    }

    fn entry(&self, key: &PoolKey) -> Result<Arc<PoolEntry>, TransportFault> {
        if let Some(entry) = self.existing(key) {
            return Ok(entry);
        }

        let mut entries = self
            .entries
            .write()
            .map_err(|_| TransportFault::new(FaultKind::Setup, "connection pool poisoned"))?;
        let entry = entries.entry(key.clone()).or_insert_with(|| {
            Arc::new(PoolEntry {
                permits: Arc::new(Semaphore::new(self.settings.max_connections)),
                client: Mutex::new(None),
            })
        });
        Ok(Arc::clone(entry))
    }

    fn build_client(&self) -> Result<Client, TransportFault> {
        ClientBuilder::new()
            .pool_max_idle_per_host(self.settings.max_idle_connections)
            .pool_idle_timeout(Duration::from_secs(self.settings.idle_timeout_secs))
            .connect_timeout(Duration::from_millis(self.settings.connect_timeout_ms))
            .user_agent(USER_AGENT)
            .gzip(true)
            .build()
            .map_err(|e| {
                TransportFault::new(FaultKind::Setup, format!("failed to build HTTP client: {}", e))
            })
    }
}

fn shut_down() -> TransportFault {
    TransportFault::new(FaultKind::Setup, "connection pool is shut down")
}
