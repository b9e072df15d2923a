//! Record layout and the value codec.
//!
//! A record is persisted as `{ key, value, stored, ttl }` where `value` is the JSON
//! text of the cached item, `stored` the write instant in milliseconds since the
//! epoch and `ttl` the lifetime in milliseconds.

use crate::error::StoreError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::ser::Formatter;
use serde_json::{Value, json};
use std::io;

/// Largest ttl the backend expiry arithmetic can represent (`i32::MAX` ms).
pub const MAX_TTL_MS: i64 = i32::MAX as i64;

/// Nesting depth at which a value is considered cyclic.
const MAX_NESTING: usize = 128;

const CIRCULAR: &str = "Converting circular structure to JSON";
const BAD_STRUCTURE: &str = "Incorrect record structure";
const BAD_VALUE: &str = "Bad value content";

/// Driver-neutral representation of a persisted record.
pub type Document = Value;

/// A decoded cache hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedItem<T> {
    pub item: T,
    /// Write instant, milliseconds since the Unix epoch.
    pub stored: i64,
    /// Lifetime in milliseconds.
    pub ttl: i64,
}

impl<T> CachedItem<T> {
    #[must_use]
    pub const fn expires_at(&self) -> i64 {
        self.stored.saturating_add(self.ttl)
    }

    /// Milliseconds left before the item expires, clamped at zero.
    #[must_use]
    pub fn remaining_ttl(&self, now: i64) -> i64 {
        (self.expires_at() - now).max(0)
    }
}

/// Builds the document stored for `id`.
///
/// # Errors
/// * [`StoreError::InvalidTtl`] when `ttl` exceeds [`MAX_TTL_MS`].
/// * [`StoreError::Encoding`] when the value is cyclic (or nested deeper than the
///   serializer allows) or its `Serialize` impl fails.
pub fn encode<T>(id: &str, value: &T, ttl: i64, now: i64) -> Result<Document, StoreError>
where
    T: Serialize + ?Sized,
{
    if ttl > MAX_TTL_MS {
        return Err(StoreError::InvalidTtl {
            message: format!("Invalid ttl (greater than {MAX_TTL_MS})").into(),
            context: None,
        });
    }

    let payload = to_json(value)?;
    Ok(json!({ "key": id, "value": payload, "stored": now, "ttl": ttl }))
}

/// Decodes a persisted document, returning `Ok(None)` once it has expired.
///
/// # Errors
/// * [`StoreError::Encoding`] `"Incorrect record structure"` when `value`, `stored`
///   or `ttl` is missing or has the wrong shape.
/// * [`StoreError::Encoding`] `"Bad value content"` when `value` does not parse into `T`.
pub fn decode<T>(document: &Document, now: i64) -> Result<Option<CachedItem<T>>, StoreError>
where
    T: DeserializeOwned,
{
    let (Some(payload), Some(stored), Some(ttl)) = (
        document.get("value").and_then(Value::as_str),
        document.get("stored").and_then(Value::as_i64),
        document.get("ttl").and_then(Value::as_i64),
    ) else {
        return Err(StoreError::encoding(BAD_STRUCTURE));
    };

    let item = serde_json::from_str(payload).map_err(|_| StoreError::encoding(BAD_VALUE))?;
    let hit = CachedItem { item, stored, ttl };

    if hit.expires_at() <= now {
        return Ok(None);
    }

    Ok(Some(hit))
}

fn to_json<T>(value: &T) -> Result<String, StoreError>
where
    T: Serialize + ?Sized,
{
    let mut buf = Vec::with_capacity(128);
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, NestingGuard::default());

    value.serialize(&mut serializer).map_err(|e| {
        if e.is_io() { StoreError::encoding(CIRCULAR) } else { StoreError::encoding(e.to_string()) }
    })?;

    String::from_utf8(buf).map_err(|e| StoreError::Internal {
        message: e.to_string().into(),
        context: Some("Serializer produced invalid UTF-8".into()),
    })
}

/// Compact JSON formatter that aborts once arrays/objects nest past [`MAX_NESTING`].
///
/// A reference cycle (`Rc<RefCell<_>>` pointing back at itself) never terminates
/// under serde, so bounded depth is how it gets detected.
#[derive(Debug, Default)]
struct NestingGuard {
    depth: usize,
}

impl NestingGuard {
    fn descend(&mut self) -> io::Result<()> {
        if self.depth >= MAX_NESTING {
            return Err(io::Error::other(CIRCULAR));
        }
        self.depth += 1;
        Ok(())
    }

    const fn ascend(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}

impl Formatter for NestingGuard {
    fn begin_array<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.descend()?;
        writer.write_all(b"[")
    }

    fn end_array<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.ascend();
        writer.write_all(b"]")
    }

    fn begin_object<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.descend()?;
        writer.write_all(b"{")
    }

    fn end_object<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.ascend();
        writer.write_all(b"}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Serialize)]
    struct Node {
        a: u8,
        next: Option<Rc<RefCell<Node>>>,
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Profile {
        name: String,
        tags: Vec<String>,
    }

    #[test]
    fn encode_builds_the_record_layout() {
        let doc = encode("x", "123", 500, 1_000).unwrap();
        assert_eq!(doc, json!({ "key": "x", "value": "\"123\"", "stored": 1_000, "ttl": 500 }));
    }

    #[test]
    fn decode_returns_the_item_before_expiry() {
        let profile = Profile { name: "ada".into(), tags: vec!["a".into(), "b".into()] };
        let doc = encode("p", &profile, 100, 1_000).unwrap();

        let hit = decode::<Profile>(&doc, 1_099).unwrap().expect("still fresh");
        assert_eq!(hit.item, profile);
        assert_eq!(hit.stored, 1_000);
        assert_eq!(hit.ttl, 100);
        assert_eq!(hit.remaining_ttl(1_050), 50);
    }

    #[test]
    fn decode_treats_the_expiry_instant_as_expired() {
        let doc = encode("x", &1, 100, 1_000).unwrap();
        assert!(decode::<i32>(&doc, 1_100).unwrap().is_none());
        assert!(decode::<i32>(&doc, 5_000).unwrap().is_none());
    }

    #[test]
    fn ttl_limit_is_inclusive() {
        assert!(encode("x", "v", MAX_TTL_MS, 0).is_ok());

        let err = encode("x", "v", MAX_TTL_MS + 1, 0).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTtl { .. }));
        assert_eq!(err.message(), "Invalid ttl (greater than 2147483647)");
    }

    #[test]
    fn cyclic_values_fail_to_encode() {
        let node = Rc::new(RefCell::new(Node { a: 1, next: None }));
        node.borrow_mut().next = Some(Rc::clone(&node));

        let err = encode("x", &node, 10, 0).unwrap_err();
        assert!(matches!(err, StoreError::Encoding { .. }));
        assert_eq!(err.message(), CIRCULAR);

        node.borrow_mut().next = None;
    }

    #[test]
    fn moderately_nested_values_encode() {
        let mut value = json!(1);
        for _ in 0..(MAX_NESTING - 1) {
            value = json!([value]);
        }
        assert!(encode("x", &value, 10, 0).is_ok());
    }

    #[test]
    fn missing_fields_are_a_structure_error() {
        let err = decode::<String>(&json!({ "value": false }), 0).unwrap_err();
        assert_eq!(err.message(), BAD_STRUCTURE);

        let err = decode::<String>(&json!({ "value": "\"x\"", "stored": true, "ttl": 1 }), 0)
            .unwrap_err();
        assert_eq!(err.message(), BAD_STRUCTURE);

        let err = decode::<String>(&json!("not a record"), 0).unwrap_err();
        assert_eq!(err.message(), BAD_STRUCTURE);
    }

    #[test]
    fn unparsable_payload_is_a_value_error() {
        let doc = json!({ "value": "test", "stored": 1, "ttl": 1_000 });
        let err = decode::<String>(&doc, 0).unwrap_err();
        assert_eq!(err.message(), BAD_VALUE);

        let doc = encode("x", "text", 1_000, 0).unwrap();
        let err = decode::<u32>(&doc, 0).unwrap_err();
        assert_eq!(err.message(), BAD_VALUE);
    }
}
