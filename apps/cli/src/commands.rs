//! Subcommand handlers. Results go to stdout; diagnostics go through `tracing`.

use anyhow::{Context, Result};
use cachet_store::{CachedItem, Connection, Key, validate_segment_name};
use serde_json::{Value, json};

pub async fn ping(conn: &Connection) -> Result<()> {
    let version = conn.backend_version().await?;
    let options = conn.options();
    println!("ok {} ({}/{}) {version}", options.url(), options.namespace(), options.partition());
    Ok(())
}

pub async fn get(conn: &Connection, segment: String, id: String) -> Result<()> {
    let key = Key::new(segment, id);

    match conn.get::<Value>(&key).await? {
        Some(hit) => {
            let output = describe_hit(hit, chrono::Utc::now().timestamp_millis());
            println!("{}", serde_json::to_string_pretty(&output)?);
        },
        None => {
            tracing::info!(key = %conn.generate_key(&key), "Not found");
            println!("null");
        },
    }
    Ok(())
}

fn describe_hit(hit: CachedItem<Value>, now: i64) -> Value {
    let remaining = hit.remaining_ttl(now);
    json!({ "item": hit.item, "stored": hit.stored, "ttl": hit.ttl, "remaining_ttl": remaining })
}

pub async fn set(conn: &Connection, segment: String, id: String, raw: &str, ttl: i64) -> Result<()> {
    let value: Value = serde_json::from_str(raw).context("Value must be valid JSON")?;
    let key = Key::new(segment, id);

    conn.set(&key, &value, ttl).await?;
    println!("stored {}", conn.generate_key(&key));
    Ok(())
}

pub async fn drop(conn: &Connection, segment: String, id: String) -> Result<()> {
    let key = Key::new(segment, id);

    conn.drop(&key).await?;
    println!("dropped {}", conn.generate_key(&key));
    Ok(())
}

pub async fn purge(conn: &Connection, segment: &str) -> Result<()> {
    let removed = conn.purge_expired(segment).await?;
    println!("purged {removed}");
    Ok(())
}

/// Offline: only the partition from config/flags is needed.
pub fn check_segment(partition: &str, name: &str) -> Result<()> {
    validate_segment_name(partition, name)?;
    println!("valid {partition}.{name}");
    Ok(())
}
