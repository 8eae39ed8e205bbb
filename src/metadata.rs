//! Throttled, best-effort cache of database metadata.
//!
//! Catalogs and databases are refreshed together behind a leading-edge
//! throttle. Per-key listings (tables, schemas, columns) are fetched on first
//! use, kept indefinitely and revalidated in the background at most once per
//! interval. Failed fetches are logged and cached as empty lists.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::time::Instant;

use crate::database::{Column, DatabaseClient, TableHandle};
use crate::error::Result;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

fn read<T: Clone>(lock: &RwLock<T>) -> T {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
}

fn write<T>(lock: &RwLock<T>, value: T) {
    *lock.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = value;
}

fn degrade<T>(what: &'static str, result: Result<Vec<T>>) -> Vec<T> {
    result.unwrap_or_else(|err| {
        tracing::warn!(request = what, error = %err, "metadata fetch failed, using empty result");
        Vec::new()
    })
}

struct Slot<V> {
    value: RwLock<Option<Arc<V>>>,
    /// Held while a fetch is in flight; stores when the last fetch started.
    gate: Arc<tokio::sync::Mutex<Option<Instant>>>,
}

impl<V> Default for Slot<V> {
    fn default() -> Self {
        Self {
            value: RwLock::new(None),
            gate: Arc::new(tokio::sync::Mutex::new(None)),
        }
    }
}

/// Single-flight cache keyed by `K`.
pub struct KeyedCache<K, V> {
    slots: Mutex<HashMap<K, Arc<Slot<V>>>>,
}

impl<K, V> Default for KeyedCache<K, V> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> KeyedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Send + Sync + 'static,
{
    fn slot(&self, key: &K) -> Arc<Slot<V>> {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(key.clone())
            .or_default()
            .clone()
    }

    /// Cached value without fetching.
    pub fn peek(&self, key: &K) -> Option<Arc<V>> {
        let slot = self
            .slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()?;
        read(&slot.value)
    }

    /// Return the cached value, fetching it first if absent.
    ///
    /// Concurrent first requests share one fetch. A present value is returned
    /// immediately; if the last fetch is older than `interval` a refresh is
    /// spawned in the background.
    pub async fn get_or_fetch<F, Fut>(&self, key: &K, interval: Duration, fetch: F) -> Arc<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let slot = self.slot(key);

        let cached = read(&slot.value);
        if let Some(value) = cached {
            if let Ok(mut gate) = slot.gate.clone().try_lock_owned() {
                if gate.map_or(true, |at| at.elapsed() >= interval) {
                    *gate = Some(Instant::now());
                    let pending = fetch();
                    let slot = slot.clone();
                    tokio::spawn(async move {
                        let fresh = pending.await;
                        write(&slot.value, Some(Arc::new(fresh)));
                        drop(gate);
                    });
                }
            }
            return value;
        }

        let mut gate = slot.gate.lock().await;
        let filled = read(&slot.value);
        if let Some(value) = filled {
            return value;
        }
        *gate = Some(Instant::now());
        let fresh = Arc::new(fetch().await);
        write(&slot.value, Some(fresh.clone()));
        fresh
    }
}

pub struct MetadataCache {
    db: Arc<dyn DatabaseClient>,
    interval_ms: AtomicU64,
    last_refresh: tokio::sync::Mutex<Option<Instant>>,
    catalogs: RwLock<Arc<Vec<String>>>,
    databases: RwLock<Arc<Vec<String>>>,
    tables_by_database: KeyedCache<String, Vec<String>>,
    schemas_by_catalog: KeyedCache<String, Vec<String>>,
    tables_by_schema: KeyedCache<(String, String), Vec<String>>,
    columns_by_table: KeyedCache<TableHandle, Vec<Column>>,
}

impl std::fmt::Debug for MetadataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataCache")
            .field("interval", &self.interval())
            .field("catalogs", &read(&self.catalogs).len())
            .field("databases", &read(&self.databases).len())
            .finish()
    }
}

impl MetadataCache {
    pub fn new(db: Arc<dyn DatabaseClient>, interval: Duration) -> Self {
        Self {
            db,
            interval_ms: AtomicU64::new(interval.as_millis() as u64),
            last_refresh: tokio::sync::Mutex::new(None),
            catalogs: RwLock::new(Arc::new(Vec::new())),
            databases: RwLock::new(Arc::new(Vec::new())),
            tables_by_database: KeyedCache::default(),
            schemas_by_catalog: KeyedCache::default(),
            tables_by_schema: KeyedCache::default(),
            columns_by_table: KeyedCache::default(),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.load(Ordering::Relaxed))
    }

    pub fn set_interval(&self, interval: Duration) {
        self.interval_ms
            .store(interval.as_millis() as u64, Ordering::Relaxed);
    }

    /// Refresh catalogs and databases unless a refresh started within the
    /// throttle interval. Returns whether a fetch was issued.
    pub async fn refresh(&self) -> bool {
        let mut last = self.last_refresh.lock().await;
        if let Some(at) = *last {
            if at.elapsed() < self.interval() {
                return false;
            }
        }
        *last = Some(Instant::now());

        let (catalogs, databases) = tokio::join!(self.db.list_catalogs(), self.db.list_databases());
        let catalogs = degrade("listCatalogs", catalogs);
        let databases = degrade("listDatabases", databases);
        tracing::debug!(
            catalogs = catalogs.len(),
            databases = databases.len(),
            "refreshed database metadata"
        );
        write(&self.catalogs, Arc::new(catalogs));
        write(&self.databases, Arc::new(databases));
        true
    }

    /// Catalogs from the last refresh; refreshes first when due.
    pub async fn catalogs(&self) -> Arc<Vec<String>> {
        self.refresh().await;
        read(&self.catalogs)
    }

    pub async fn databases(&self) -> Arc<Vec<String>> {
        self.refresh().await;
        read(&self.databases)
    }

    pub async fn tables(&self, database: &str) -> Arc<Vec<String>> {
        let db = self.db.clone();
        let key = database.to_string();
        let database = key.clone();
        self.tables_by_database
            .get_or_fetch(&key, self.interval(), move || async move {
                degrade("listTables", db.list_tables(&database).await)
            })
            .await
    }

    pub async fn schemas(&self, catalog: &str) -> Arc<Vec<String>> {
        let db = self.db.clone();
        let key = catalog.to_string();
        let catalog = key.clone();
        self.schemas_by_catalog
            .get_or_fetch(&key, self.interval(), move || async move {
                degrade("getSchemasByCatalog", db.get_schemas_by_catalog(&catalog).await)
            })
            .await
    }

    pub async fn catalog_tables(&self, catalog: &str, schema: &str) -> Arc<Vec<String>> {
        let db = self.db.clone();
        let key = (catalog.to_string(), schema.to_string());
        let (catalog, schema) = key.clone();
        self.tables_by_schema
            .get_or_fetch(&key, self.interval(), move || async move {
                degrade(
                    "getTablesByCatalogAndSchema",
                    db.get_tables_by_catalog_and_schema(&catalog, &schema).await,
                )
            })
            .await
    }

    pub async fn columns(&self, table: &TableHandle) -> Arc<Vec<Column>> {
        let db = self.db.clone();
        let handle = table.clone();
        self.columns_by_table
            .get_or_fetch(table, self.interval(), move || async move {
                degrade("getSchema", db.get_schema(&handle).await)
            })
            .await
    }

    /// Cached table list for `database`, without fetching.
    pub fn cached_tables(&self, database: &str) -> Option<Arc<Vec<String>>> {
        self.tables_by_database.peek(&database.to_string())
    }
}
