//! Canonical hashing of serializable values
//!
//! Used to fingerprint fire logs and configurations so that two runs can be
//! compared for replay identity without keeping both traces around.
//!
//! The canonical form is compact JSON with object keys in byte order. It is
//! streamed straight into the hasher, so no intermediate string is built.
//! `serde_json` turns non-finite floats into `null`; fields that may hold an
//! infinity go through `core::time::lossless` to keep their digests distinct.

use crate::scheduler::SchedulerError;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Compute a deterministic SHA-256 hex digest of `value`
pub fn canonical_hash<T: Serialize + ?Sized>(value: &T) -> Result<String, SchedulerError> {
    let tree = serde_json::to_value(value).map_err(serialization)?;

    let mut hasher = Sha256::new();
    write_canonical(&tree, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

fn write_canonical(value: &Value, hasher: &mut Sha256) -> Result<(), SchedulerError> {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_unstable_by(|a, b| a.0.cmp(b.0));

            hasher.update(b"{");
            for (i, (key, field)) in entries.into_iter().enumerate() {
                if i > 0 {
                    hasher.update(b",");
                }
                serde_json::to_writer(&mut *hasher, key).map_err(serialization)?;
                hasher.update(b":");
                write_canonical(field, hasher)?;
            }
            hasher.update(b"}");
        }
        Value::Array(items) => {
            hasher.update(b"[");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    hasher.update(b",");
                }
                write_canonical(item, hasher)?;
            }
            hasher.update(b"]");
        }
        leaf => serde_json::to_writer(&mut *hasher, leaf).map_err(serialization)?,
    }
    Ok(())
}

fn serialization(e: serde_json::Error) -> SchedulerError {
    SchedulerError::Serialization(e.to_string())
}
