//! [SurrealDB](https://surrealdb.com) implementation of the driver traits.
//!
//! The partition becomes the database (`USE NS <namespace> DB <partition>`), each
//! segment becomes a schemaless table and each cache record lives under
//! `<segment>:<id>`. The `any` engine accepts `mem://`, `ws://` and `http://` URLs.

use super::{Client, Collection, Driver};
use crate::codec::Document;
use crate::error::{StoreError, StoreErrorExt};
use crate::options::ConnectionOptions;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use surrealdb::Surreal;
use surrealdb::engine::any::{Any, connect};
use surrealdb::opt::auth::Root;
use surrealdb::types::{SurrealValue, Value};
use tracing::{debug, info, instrument};

/// Connects through the SurrealDB `any` engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct SurrealDriver;

/// An open SurrealDB session scoped to the partition database.
#[derive(Debug, Clone)]
pub struct SurrealClient {
    db: Surreal<Any>,
}

/// Handle to the table backing one segment.
#[derive(Debug, Clone)]
pub struct SurrealCollection {
    db: Surreal<Any>,
    table: Arc<str>,
}

impl SurrealCollection {
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The underlying session, for maintenance queries the adapter does not cover.
    #[must_use]
    pub const fn session(&self) -> &Surreal<Any> {
        &self.db
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, SurrealValue)]
struct StoredRecord {
    key: Option<String>,
    value: Option<String>,
    stored: Option<i64>,
    ttl: Option<i64>,
}

impl StoredRecord {
    fn from_document(document: Document) -> Result<Self, StoreError> {
        serde_json::from_value(document).map_err(|e| StoreError::Encoding {
            message: e.to_string().into(),
            context: Some("Preparing record for write".into()),
        })
    }

    fn into_document(self) -> Result<Document, StoreError> {
        serde_json::to_value(self).map_err(|e| StoreError::Encoding {
            message: e.to_string().into(),
            context: Some("Reading stored record".into()),
        })
    }
}

impl Driver for SurrealDriver {
    type Client = SurrealClient;

    #[instrument(skip(self, options), fields(url = %options.url(), db = options.partition()))]
    async fn connect(&self, options: &ConnectionOptions) -> Result<SurrealClient, StoreError> {
        let url = options.url();

        let db = connect(&url).await.map_err(StoreError::backend).context("Initializing engine")?;

        if let Some((username, password)) = options.credentials() {
            db.signin(Root { username: username.to_owned(), password: password.to_owned() })
                .await
                .map_err(StoreError::backend)
                .context("Signing in")?;
        }

        db.use_ns(options.namespace())
            .use_db(options.partition())
            .await
            .map_err(StoreError::backend)
            .context("Activating session")?;

        let version = db.version().await.map_or_else(|_| "unknown".to_owned(), |v| v.to_string());
        info!(ns = options.namespace(), db = options.partition(), %version, "SurrealDB session opened");

        Ok(SurrealClient { db })
    }
}

impl Client for SurrealClient {
    type Collection = SurrealCollection;

    async fn collection(&self, name: &str) -> Result<Option<SurrealCollection>, StoreError> {
        let query = format!("DEFINE TABLE IF NOT EXISTS {} SCHEMALESS", quote_ident(name));

        self.db
            .query(&query)
            .await
            .map_err(StoreError::backend)?
            .check()
            .map_err(StoreError::backend)
            .context(format!("Defining table {name}"))?;

        debug!(table = name, "Table ready");
        Ok(Some(SurrealCollection { db: self.db.clone(), table: Arc::from(name) }))
    }

    async fn version(&self) -> Result<String, StoreError> {
        self.db.version().await.map(|v| v.to_string()).map_err(StoreError::backend)
    }

    fn close(self) {
        debug!("SurrealDB session released");
    }
}

impl Collection for SurrealCollection {
    async fn find_one(&self, id: &str) -> Result<Option<Document>, StoreError> {
        // Read untyped: a row of the wrong shape reaches the codec as an empty
        // document and is reported as a structure error, not a backend one.
        let row: Option<Value> =
            self.db.select((self.table.as_ref(), id)).await.map_err(StoreError::backend)?;

        let Some(row) = row.filter(|v| !matches!(v, Value::None | Value::Null)) else {
            return Ok(None);
        };

        match StoredRecord::from_value(row) {
            Ok(record) => record.into_document().map(Some),
            Err(e) => {
                debug!(table = %self.table, id, error = %e, "Stored row has an unexpected shape");
                Ok(Some(Document::Null))
            },
        }
    }

    async fn upsert(&self, id: &str, document: Document) -> Result<(), StoreError> {
        let record = StoredRecord::from_document(document)?;

        let _: Option<StoredRecord> = self
            .db
            .upsert((self.table.as_ref(), id))
            .content(record)
            .await
            .map_err(StoreError::backend)?;

        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        let _: Option<StoredRecord> =
            self.db.delete((self.table.as_ref(), id)).await.map_err(StoreError::backend)?;

        Ok(())
    }

    async fn purge_expired(&self, now: i64) -> Result<u64, StoreError> {
        let query = format!(
            "DELETE {} WHERE stored + ttl <= $now RETURN BEFORE",
            quote_ident(&self.table)
        );

        let removed = self
            .db
            .query(&query)
            .bind(("now", now))
            .await
            .map_err(StoreError::backend)?
            .take::<Vec<StoredRecord>>(0)
            .map_err(StoreError::backend)
            .context(format!("Purging {}", self.table))?;

        Ok(u64::try_from(removed.len()).unwrap_or(u64::MAX))
    }
}

/// Escapes a table name into a backtick-quoted SurrealQL identifier.
fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
}
