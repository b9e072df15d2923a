//! # Cache Store
//!
//! A storage adapter that lets a caching layer persist TTL-bound values in
//! [SurrealDB](https://surrealdb.com), one table per cache segment.
//!
//! ## Key Features
//! - **Single-flight start**: concurrent [`Connection::start`] calls share one
//!   connection attempt and all observe its outcome.
//! - **Lazy expiry**: records past `stored + ttl` read as absent; no sweeper is needed.
//! - **Segment isolation**: segment names are validated against the backend naming
//!   rules and mapped onto memoized collection handles.
//! - **Pluggable backend**: the [`driver`] traits decouple the state machine from
//!   SurrealDB.
//!
//! ## Example
//!
//! ```rust
//! use cachet_store::{Connection, ConnectionOptions, Key, StoreError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), StoreError> {
//!     let options = ConnectionOptions::builder("sessions").endpoint("mem://").build()?;
//!     let conn = Connection::new(options);
//!     conn.start().await?;
//!
//!     let key = Key::new("users", "42");
//!     conn.set(&key, "ada", 60_000).await?;
//!
//!     let hit = conn.get::<String>(&key).await?;
//!     assert_eq!(hit.map(|h| h.item).as_deref(), Some("ada"));
//!
//!     conn.stop();
//!     Ok(())
//! }
//! ```

mod codec;
mod connection;
pub mod driver;
mod error;
mod options;
mod segment;

pub use codec::{CachedItem, Document, MAX_TTL_MS, decode, encode};
pub use connection::{Connection, ConnectionState, Key};
pub use error::{SegmentError, StoreError, StoreErrorExt};
pub use options::{ConnectionOptions, ConnectionOptionsBuilder, StoreConfig};
pub use segment::{
    MAX_QUALIFIED_NAME_LEN, RESERVED_PARTITIONS, RESERVED_SEGMENT_PREFIX, validate_partition_name,
    validate_segment_name,
};
