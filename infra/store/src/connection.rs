use crate::codec::{self, CachedItem};
use crate::driver::surreal::SurrealDriver;
use crate::driver::{Client, Collection, Driver};
use crate::error::{StoreError, StoreErrorExt};
use crate::options::ConnectionOptions;
use crate::segment::validate_segment_name;
use moka::future::Cache;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Semaphore, SemaphorePermit, oneshot};
use tracing::{debug, info, instrument, trace, warn};

type Outcome = Result<(), StoreError>;
type CollectionOf<D> = <<D as Driver>::Client as Client>::Collection;

/// Address of a cache entry: a segment (namespace) and a record id within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key {
    pub segment: String,
    pub id: String,
}

impl Key {
    pub fn new(segment: impl Into<String>, id: impl Into<String>) -> Self {
        Self { segment: segment.into(), id: id.into() }
    }

    fn validate(&self) -> Result<(), StoreError> {
        if self.segment.is_empty() || self.id.is_empty() {
            return Err(StoreError::InvalidKey {
                message: "segment and id must be non-empty".into(),
                context: None,
            });
        }
        Ok(())
    }
}

/// Observable lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
    Stopped,
}

/// Collection handles of one session, keyed by segment.
type Handles<C> = Cache<String, <C as Client>::Collection>;

enum Phase<C: Client> {
    Disconnected,
    Connecting { waiters: Vec<oneshot::Sender<Outcome>> },
    /// The handle cache lives and dies with the session it was opened on.
    Ready { client: C, collections: Handles<C> },
    Stopped,
}

/// Current phase plus an epoch bumped on every attempt and every stop, so a
/// connect that completes after `stop` can tell it is stale.
struct Lifecycle<C: Client> {
    phase: Phase<C>,
    epoch: u64,
}

struct ConnectionInner<D: Driver> {
    driver: D,
    options: ConnectionOptions,
    lifecycle: Mutex<Lifecycle<D::Client>>,
    permits: Semaphore,
}

/// Cache storage connection backed by a document store.
///
/// Cloning is cheap; clones share the same session, state and collection cache.
pub struct Connection<D: Driver = SurrealDriver> {
    inner: Arc<ConnectionInner<D>>,
}

impl<D: Driver> Clone for Connection<D> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<D: Driver> fmt::Debug for Connection<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("options", &self.inner.options)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Connection<SurrealDriver> {
    /// Creates a SurrealDB-backed connection. Nothing is opened until [`start`](Self::start).
    #[must_use]
    pub fn new(options: ConnectionOptions) -> Self {
        Self::with_driver(SurrealDriver, options)
    }
}

impl<D: Driver> Connection<D> {
    /// Creates a connection over a custom [`Driver`].
    #[must_use]
    pub fn with_driver(driver: D, options: ConnectionOptions) -> Self {
        let permits = Semaphore::new(options.pool_size());
        Self {
            inner: Arc::new(ConnectionInner {
                driver,
                options,
                lifecycle: Mutex::new(Lifecycle { phase: Phase::Disconnected, epoch: 0 }),
                permits,
            }),
        }
    }

    #[must_use]
    pub fn options(&self) -> &ConnectionOptions {
        &self.inner.options
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        match self.inner.lifecycle.lock().phase {
            Phase::Disconnected => ConnectionState::Disconnected,
            Phase::Connecting { .. } => ConnectionState::Connecting,
            Phase::Ready { .. } => ConnectionState::Ready,
            Phase::Stopped => ConnectionState::Stopped,
        }
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self.inner.lifecycle.lock().phase, Phase::Ready { .. })
    }

    /// Opens the backend session.
    ///
    /// Idempotent: returns immediately once ready. Calls made while an attempt is
    /// in flight wait for that attempt and receive its outcome, so any number of
    /// concurrent callers share a single connection attempt. The attempt runs on
    /// its own task and completes even if every caller stops waiting.
    ///
    /// A failed attempt leaves the connection disconnected; calling `start` again
    /// retries.
    ///
    /// # Errors
    /// * [`StoreError::Backend`] if the backend is unreachable or rejects the credentials.
    /// * [`StoreError::ConnectionNotReady`] if [`stop`](Self::stop) interrupts the attempt.
    pub async fn start(&self) -> Result<(), StoreError> {
        let waiter = {
            let mut guard = self.inner.lifecycle.lock();
            let lifecycle = &mut *guard;
            let (tx, rx) = oneshot::channel();

            match &mut lifecycle.phase {
                Phase::Ready { .. } => return Ok(()),
                Phase::Connecting { waiters } => waiters.push(tx),
                Phase::Disconnected | Phase::Stopped => {
                    lifecycle.epoch += 1;
                    lifecycle.phase = Phase::Connecting { waiters: vec![tx] };

                    let this = self.clone();
                    let epoch = lifecycle.epoch;
                    tokio::spawn(async move { this.complete_start(epoch).await });
                },
            }
            rx
        };

        waiter.await.unwrap_or_else(|_| {
            Err(StoreError::Internal {
                message: "connection attempt was abandoned".into(),
                context: None,
            })
        })
    }

    async fn complete_start(self, epoch: u64) {
        let options = &self.inner.options;
        info!(url = %options.url(), partition = options.partition(), "Connecting cache store");

        let attempt = self.inner.driver.connect(options).await;

        let (waiters, outcome) = {
            let mut guard = self.inner.lifecycle.lock();
            let lifecycle = &mut *guard;

            let current = lifecycle.epoch == epoch
                && matches!(lifecycle.phase, Phase::Connecting { .. });
            if !current {
                drop(guard);
                debug!(epoch, "Discarding connection attempt interrupted by stop");
                if let Ok(client) = attempt {
                    client.close();
                }
                return;
            }

            let waiters = match &mut lifecycle.phase {
                Phase::Connecting { waiters } => std::mem::take(waiters),
                _ => Vec::new(),
            };

            match attempt {
                Ok(client) => {
                    lifecycle.phase = Phase::Ready { client, collections: Cache::builder().build() };
                    (waiters, Ok(()))
                },
                Err(err) => {
                    lifecycle.phase = Phase::Disconnected;
                    (waiters, Err(err))
                },
            }
        };

        match &outcome {
            Ok(()) => info!(waiters = waiters.len(), "Cache store ready"),
            Err(err) => warn!(error = %err, waiters = waiters.len(), "Cache store connection failed"),
        }

        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }

    /// Closes the session, forgets every collection handle and moves to
    /// [`ConnectionState::Stopped`]. Safe to call repeatedly or before `start`.
    ///
    /// Callers waiting on an in-flight `start` are released with
    /// [`StoreError::ConnectionNotReady`].
    pub fn stop(&self) {
        let previous = {
            let mut lifecycle = self.inner.lifecycle.lock();
            lifecycle.epoch += 1;
            std::mem::replace(&mut lifecycle.phase, Phase::Stopped)
        };

        match previous {
            Phase::Ready { client, collections } => {
                drop(collections);
                client.close();
                info!(partition = self.inner.options.partition(), "Cache store stopped");
            },
            Phase::Connecting { waiters } => {
                warn!(waiters = waiters.len(), "Cache store stopped while connecting");
                for waiter in waiters {
                    let _ = waiter.send(Err(StoreError::ConnectionNotReady {
                        context: Some("stopped while connecting".into()),
                    }));
                }
            },
            Phase::Disconnected | Phase::Stopped => {},
        }
    }

    /// Checks `name` against the backend naming rules for this partition.
    ///
    /// # Errors
    /// Returns [`StoreError::InvalidSegmentName`]; see
    /// [`validate_segment_name`](crate::validate_segment_name).
    pub fn validate_segment_name(&self, name: &str) -> Result<(), StoreError> {
        validate_segment_name(self.inner.options.partition(), name)
    }

    /// Fully qualified address of a key, `"{partition}.{segment}:{id}"`.
    #[must_use]
    pub fn generate_key(&self, key: &Key) -> String {
        format!("{}.{}:{}", self.inner.options.partition(), key.segment, key.id)
    }

    /// Resolves the collection backing `segment`, opening it on first use.
    ///
    /// Handles are memoized per segment for the lifetime of the session and are
    /// released by [`stop`](Self::stop). Concurrent first accesses to the same
    /// segment share one open call.
    ///
    /// # Errors
    /// * [`StoreError::ConnectionNotReady`] when not started.
    /// * [`StoreError::InvalidSegmentName`] for a bad segment.
    /// * [`StoreError::NullCollection`] when the backend hands out no handle.
    /// * [`StoreError::Backend`] when opening fails.
    #[instrument(skip(self))]
    pub async fn collection(&self, segment: &str) -> Result<CollectionOf<D>, StoreError> {
        let (client, collections) =
            self.ready_client().ok_or(StoreError::ConnectionNotReady { context: None })?;

        self.validate_segment_name(segment)?;

        collections
            .try_get_with(segment.to_owned(), async {
                debug!(segment, "Opening collection");
                let _permit = self.permit().await?;
                client.collection(segment).await?.ok_or_else(|| StoreError::NullCollection {
                    message: "Received null collection object".into(),
                    context: Some(segment.to_owned().into()),
                })
            })
            .await
            .map_err(Arc::unwrap_or_clone)
    }

    /// Reads a cached item. Absent and expired records yield `Ok(None)`.
    ///
    /// # Errors
    /// * [`StoreError::ConnectionNotStarted`] when not started.
    /// * [`StoreError::InvalidKey`] / [`StoreError::InvalidSegmentName`] for a bad key.
    /// * [`StoreError::Encoding`] when the stored record is malformed.
    /// * [`StoreError::Backend`] when the lookup fails.
    #[instrument(skip(self), fields(key = %self.generate_key(key)))]
    pub async fn get<T>(&self, key: &Key) -> Result<Option<CachedItem<T>>, StoreError>
    where
        T: DeserializeOwned,
    {
        self.ensure_started()?;
        key.validate()?;

        let collection = self.collection(&key.segment).await?;
        let document = {
            let _permit = self.permit().await?;
            collection.find_one(&key.id).await?
        };

        let Some(document) = document else {
            trace!("Cache miss");
            return Ok(None);
        };

        let hit = codec::decode(&document, now_ms())?;
        if hit.is_none() {
            trace!("Cache entry expired");
        }
        Ok(hit)
    }

    /// Stores `value` under `key` for `ttl` milliseconds, replacing any previous
    /// record. A `ttl` of zero or less is accepted and nothing is written.
    ///
    /// The value is encoded before any backend call, so an encoding failure never
    /// leaves a partial write behind.
    ///
    /// # Errors
    /// * [`StoreError::ConnectionNotStarted`] when not started.
    /// * [`StoreError::InvalidKey`] / [`StoreError::InvalidSegmentName`] for a bad key.
    /// * [`StoreError::InvalidTtl`] when `ttl` exceeds [`MAX_TTL_MS`](crate::MAX_TTL_MS).
    /// * [`StoreError::Encoding`] when the value cannot be serialized (e.g. it is cyclic).
    /// * [`StoreError::Backend`] when the write fails.
    #[instrument(skip(self, value), fields(key = %self.generate_key(key)))]
    pub async fn set<T>(&self, key: &Key, value: &T, ttl: i64) -> Result<(), StoreError>
    where
        T: Serialize + ?Sized,
    {
        self.ensure_started()?;
        key.validate()?;
        self.validate_segment_name(&key.segment)?;

        if ttl <= 0 {
            trace!(ttl, "Skipping write for non-positive ttl");
            return Ok(());
        }

        let document = codec::encode(&key.id, value, ttl, now_ms())?;
        let collection = self.collection(&key.segment).await?;

        let _permit = self.permit().await?;
        collection.upsert(&key.id, document).await
    }

    /// Removes the record under `key`. Removing a missing record succeeds.
    ///
    /// # Errors
    /// * [`StoreError::ConnectionNotStarted`] when not started.
    /// * [`StoreError::InvalidKey`] / [`StoreError::InvalidSegmentName`] for a bad key.
    /// * [`StoreError::Backend`] when the delete fails.
    #[instrument(skip(self), fields(key = %self.generate_key(key)))]
    pub async fn drop(&self, key: &Key) -> Result<(), StoreError> {
        self.ensure_started()?;
        key.validate()?;

        let collection = self.collection(&key.segment).await?;

        let _permit = self.permit().await?;
        collection.remove(&key.id).await
    }

    /// Physically deletes the expired records of `segment`, returning how many
    /// were removed. Reads never depend on this; it only reclaims space.
    ///
    /// # Errors
    /// Same as [`drop`](Self::drop) minus the key checks, plus segment validation.
    #[instrument(skip(self))]
    pub async fn purge_expired(&self, segment: &str) -> Result<u64, StoreError> {
        self.ensure_started()?;

        let collection = self.collection(segment).await?;

        let removed = {
            let _permit = self.permit().await?;
            collection.purge_expired(now_ms()).await.context(format!("Purging {segment}"))?
        };

        debug!(segment, removed, "Purged expired records");
        Ok(removed)
    }

    /// Asks the open session for the backend version.
    ///
    /// # Errors
    /// [`StoreError::ConnectionNotStarted`] unless ready, or the backend's own error.
    pub async fn backend_version(&self) -> Result<String, StoreError> {
        let (client, _) =
            self.ready_client().ok_or(StoreError::ConnectionNotStarted { context: None })?;
        let _permit = self.permit().await?;
        client.version().await.context("Reading backend version")
    }

    fn ensure_started(&self) -> Result<(), StoreError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(StoreError::ConnectionNotStarted { context: None })
        }
    }

    fn ready_client(&self) -> Option<(D::Client, Handles<D::Client>)> {
        let lifecycle = self.inner.lifecycle.lock();
        match &lifecycle.phase {
            Phase::Ready { client, collections } => Some((client.clone(), collections.clone())),
            _ => None,
        }
    }

    async fn permit(&self) -> Result<SemaphorePermit<'_>, StoreError> {
        self.inner.permits.acquire().await.map_err(|e| StoreError::Internal {
            message: e.to_string().into(),
            context: Some("Acquiring backend permit".into()),
        })
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_need_both_parts() {
        assert!(Key::new("test", "x").validate().is_ok());
        assert!(matches!(Key::new("", "x").validate(), Err(StoreError::InvalidKey { .. })));
        assert!(matches!(Key::new("test", "").validate(), Err(StoreError::InvalidKey { .. })));
    }

    #[test]
    fn new_connection_is_disconnected() {
        let options = ConnectionOptions::builder("unit-testing").build().unwrap();
        let conn = Connection::new(options);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(!conn.is_ready());

        conn.stop();
        conn.stop();
        assert_eq!(conn.state(), ConnectionState::Stopped);
    }

    #[test]
    fn generated_keys_are_qualified() {
        let options = ConnectionOptions::builder("unit-testing").build().unwrap();
        let conn = Connection::new(options);
        assert_eq!(conn.generate_key(&Key::new("test", "x")), "unit-testing.test:x");
    }
}
