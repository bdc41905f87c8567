use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// One decoded JSON object, carried as an untyped key/value map. The
/// engine imposes no schema; callers convert at the boundary via
/// [`convert_record`].
pub type Record = serde_json::Map<String, Value>;

/// Capability expected of records that carry their own sort key.
/// The key is compared as a raw string, byte-wise lexicographic.
pub trait SortableRecord {
    fn sort_key(&self) -> String;
}

/// Pairs a precomputed sort key with its payload. Only the
/// calculated-key sort path writes envelopes to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortEnvelope {
    pub key: String,
    pub record: Value,
}

impl SortableRecord for SortEnvelope {
    fn sort_key(&self) -> String {
        self.key.clone()
    }
}

/// Re-decodes a generic record into the caller's shape. This round-trip
/// is the abstraction boundary between the untyped stream and typed
/// consumers.
pub fn convert_record<T: DeserializeOwned>(record: Record) -> Result<T> {
    serde_json::from_value(Value::Object(record)).map_err(Error::conversion)
}
