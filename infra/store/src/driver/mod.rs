//! Backend seam of the adapter.
//!
//! A [`Driver`] opens a [`Client`], a client opens one [`Collection`] per segment,
//! and a collection stores [`Document`]s by record id. The SurrealDB implementation
//! lives in [`surreal`]; anything else implementing these traits (an in-process
//! fake, for instance) can back a [`Connection`](crate::Connection) as well.

pub mod surreal;

use crate::codec::Document;
use crate::error::StoreError;
use crate::options::ConnectionOptions;
use std::future::Future;

/// Opens client sessions against a backend.
pub trait Driver: Send + Sync + 'static {
    type Client: Client;

    /// Connects, authenticates when credentials are configured, and selects the
    /// partition.
    fn connect(
        &self,
        options: &ConnectionOptions,
    ) -> impl Future<Output = Result<Self::Client, StoreError>> + Send;
}

/// An open backend session.
pub trait Client: Clone + Send + Sync + 'static {
    type Collection: Collection;

    /// Opens (creating if needed) the container backing `name`.
    ///
    /// `Ok(None)` means the backend reported success without handing out a handle;
    /// the connection turns that into [`StoreError::NullCollection`].
    fn collection(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<Self::Collection>, StoreError>> + Send;

    /// Version string reported by the backend.
    fn version(&self) -> impl Future<Output = Result<String, StoreError>> + Send;

    /// Releases the session. Dropping it must be enough for the default.
    fn close(self)
    where
        Self: Sized,
    {
    }
}

/// A storage container holding the records of one segment.
pub trait Collection: Clone + Send + Sync + 'static {
    fn find_one(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<Document>, StoreError>> + Send;

    /// Inserts or replaces the record stored under `id`.
    fn upsert(
        &self,
        id: &str,
        document: Document,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Removes the record stored under `id`; a missing record is not an error.
    fn remove(&self, id: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Physically deletes records whose `stored + ttl` is at or before `now`.
    /// Returns how many were removed.
    fn purge_expired(&self, now: i64) -> impl Future<Output = Result<u64, StoreError>> + Send;
}
