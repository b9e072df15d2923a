//! In-process backend used to drive the connection state machine in tests.

#![allow(dead_code)]

use cachet_store::driver::{Client, Collection, Driver};
use cachet_store::{Connection, ConnectionOptions, Document, StoreError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const PARTITION: &str = "unit-testing";
pub const USERNAME: &str = "tester";
pub const PASSWORD: &str = "secret";

/// Failure injection knobs.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    pub connect: Option<String>,
    pub connect_delay: Duration,
    pub open: Option<String>,
    pub open_delay: Duration,
    pub null_collection: bool,
    pub find: Option<String>,
    pub upsert: Option<String>,
    pub remove: Option<String>,
}

#[derive(Debug, Default)]
pub struct Backend {
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub opens: AtomicUsize,
    /// find/upsert/remove/purge calls.
    pub record_calls: AtomicUsize,
    pub upserts: AtomicUsize,
    faults: Mutex<Faults>,
    tables: Mutex<HashMap<String, HashMap<String, Document>>>,
}

impl Backend {
    pub fn faults(&self) -> Faults {
        self.faults.lock().clone()
    }

    pub fn set_faults(&self, faults: Faults) {
        *self.faults.lock() = faults;
    }

    pub fn update_faults(&self, f: impl FnOnce(&mut Faults)) {
        f(&mut self.faults.lock());
    }

    /// Writes a raw document, bypassing the codec.
    pub fn seed(&self, table: &str, id: &str, document: Document) {
        self.tables.lock().entry(table.to_owned()).or_default().insert(id.to_owned(), document);
    }

    pub fn raw(&self, table: &str, id: &str) -> Option<Document> {
        self.tables.lock().get(table).and_then(|t| t.get(id).cloned())
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryDriver {
    pub backend: Arc<Backend>,
}

#[derive(Debug, Clone)]
pub struct MemoryClient {
    backend: Arc<Backend>,
}

#[derive(Debug, Clone)]
pub struct MemoryCollection {
    backend: Arc<Backend>,
    table: String,
}

impl Driver for MemoryDriver {
    type Client = MemoryClient;

    async fn connect(&self, options: &ConnectionOptions) -> Result<MemoryClient, StoreError> {
        self.backend.connects.fetch_add(1, Ordering::SeqCst);
        let faults = self.backend.faults();

        if !faults.connect_delay.is_zero() {
            tokio::time::sleep(faults.connect_delay).await;
        }

        if let Some(message) = faults.connect {
            return Err(StoreError::backend(message));
        }

        if let Some(credentials) = options.credentials()
            && credentials != (USERNAME, PASSWORD)
        {
            return Err(StoreError::backend("Authentication failed"));
        }

        Ok(MemoryClient { backend: Arc::clone(&self.backend) })
    }
}

impl Client for MemoryClient {
    type Collection = MemoryCollection;

    async fn collection(&self, name: &str) -> Result<Option<MemoryCollection>, StoreError> {
        self.backend.opens.fetch_add(1, Ordering::SeqCst);
        let faults = self.backend.faults();

        if !faults.open_delay.is_zero() {
            tokio::time::sleep(faults.open_delay).await;
        }

        if let Some(message) = faults.open {
            return Err(StoreError::backend(message));
        }
        if faults.null_collection {
            return Ok(None);
        }

        self.backend.tables.lock().entry(name.to_owned()).or_default();
        Ok(Some(MemoryCollection { backend: Arc::clone(&self.backend), table: name.to_owned() }))
    }

    async fn version(&self) -> Result<String, StoreError> {
        Ok(format!("memory-{}", env!("CARGO_PKG_VERSION")))
    }

    fn close(self) {
        self.backend.closes.fetch_add(1, Ordering::SeqCst);
    }
}

impl Collection for MemoryCollection {
    async fn find_one(&self, id: &str) -> Result<Option<Document>, StoreError> {
        self.backend.record_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.backend.faults().find {
            return Err(StoreError::backend(message));
        }
        Ok(self.backend.raw(&self.table, id))
    }

    async fn upsert(&self, id: &str, document: Document) -> Result<(), StoreError> {
        self.backend.record_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.backend.faults().upsert {
            return Err(StoreError::backend(message));
        }
        self.backend.upserts.fetch_add(1, Ordering::SeqCst);
        self.backend.seed(&self.table, id, document);
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        self.backend.record_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.backend.faults().remove {
            return Err(StoreError::backend(message));
        }
        if let Some(table) = self.backend.tables.lock().get_mut(&self.table) {
            table.remove(id);
        }
        Ok(())
    }

    async fn purge_expired(&self, now: i64) -> Result<u64, StoreError> {
        self.backend.record_calls.fetch_add(1, Ordering::SeqCst);
        let mut tables = self.backend.tables.lock();
        let Some(table) = tables.get_mut(&self.table) else { return Ok(0) };

        let before = table.len();
        table.retain(|_, doc| {
            let stored = doc.get("stored").and_then(serde_json::Value::as_i64).unwrap_or(0);
            let ttl = doc.get("ttl").and_then(serde_json::Value::as_i64).unwrap_or(0);
            stored + ttl > now
        });
        Ok((before - table.len()) as u64)
    }
}

pub fn options() -> ConnectionOptions {
    ConnectionOptions::builder(PARTITION).build().expect("valid options")
}

pub fn connection() -> (Connection<MemoryDriver>, Arc<Backend>) {
    let driver = MemoryDriver::default();
    let backend = Arc::clone(&driver.backend);
    (Connection::with_driver(driver, options()), backend)
}

pub async fn started() -> (Connection<MemoryDriver>, Arc<Backend>) {
    let (conn, backend) = connection();
    conn.start().await.expect("start");
    (conn, backend)
}
