//! Versioned persistence envelope.
//!
//! Every structure written to the key-value store is wrapped in a tagged
//! envelope carrying a schema version, so the on-disk format can evolve
//! without silent corruption. Decoding is the migration step: blobs from
//! older versions deserialize through serde defaults for fields added
//! since (queue item status, for one), and future versions are rejected
//! outright.

use crate::{error::Result, Error, SchemaVersion, STATE_SCHEMA_VERSION};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// A persisted value tagged with its schema version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Versioned<T> {
    /// Schema version the blob was written with
    pub schema_version: SchemaVersion,
    /// The wrapped structure
    pub data: T,
}

impl<T> Versioned<T> {
    /// Wrap a value at the current schema version.
    pub fn new(data: T) -> Self {
        Self {
            schema_version: STATE_SCHEMA_VERSION,
            data,
        }
    }
}

/// Encode a value into its versioned JSON blob.
pub fn encode<T: Serialize>(data: &T) -> Result<String> {
    serde_json::to_string(&Versioned::new(data)).map_err(|e| Error::InvalidState(e.to_string()))
}

/// Decode a versioned JSON blob, migrating older versions.
pub fn decode<T: DeserializeOwned>(json: &str) -> Result<T> {
    let envelope: Versioned<serde_json::Value> =
        serde_json::from_str(json).map_err(|e| Error::InvalidState(e.to_string()))?;

    if envelope.schema_version > STATE_SCHEMA_VERSION {
        return Err(Error::UnsupportedSchemaVersion {
            supported: STATE_SCHEMA_VERSION,
            actual: envelope.schema_version,
        });
    }

    serde_json::from_value(envelope.data).map_err(|e| Error::InvalidState(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EntityKind, MutationOp, MutationRecord, SyncQueue};
    use serde_json::json;

    #[test]
    fn encode_stamps_current_version() {
        let queue = SyncQueue::new();
        let blob = encode(&queue).unwrap();
        assert!(blob.contains(&format!("\"schemaVersion\":{STATE_SCHEMA_VERSION}")));
    }

    #[test]
    fn roundtrip() {
        let mut queue = SyncQueue::new();
        queue.enqueue(
            MutationRecord::new(
                "m-1",
                "owner-1",
                "e-1",
                EntityKind::HabitLog,
                MutationOp::Create,
                json!({"habit": "run", "completed": true}),
                100,
            ),
            100,
        );

        let blob = encode(&queue).unwrap();
        let restored: SyncQueue = decode(&blob).unwrap();
        assert_eq!(queue, restored);
    }

    #[test]
    fn rejects_future_version() {
        let blob = format!(
            "{{\"schemaVersion\":{},\"data\":{{\"items\":[]}}}}",
            STATE_SCHEMA_VERSION + 1
        );
        let result: Result<SyncQueue> = decode(&blob);
        assert_eq!(
            result,
            Err(Error::UnsupportedSchemaVersion {
                supported: STATE_SCHEMA_VERSION,
                actual: STATE_SCHEMA_VERSION + 1,
            })
        );
    }

    #[test]
    fn garbage_is_invalid_state() {
        let result: Result<SyncQueue> = decode("not json");
        assert!(matches!(result, Err(Error::InvalidState(_))));
    }

    #[test]
    fn older_blob_decodes_through_defaults() {
        // A version-0 queue blob written before `status` existed.
        let blob = r#"{
            "schemaVersion": 0,
            "data": {"items": [{
                "mutation": {
                    "id": "m-1",
                    "ownerId": "owner-1",
                    "entityId": "e-1",
                    "entity": "moodCheckin",
                    "op": "create",
                    "payload": {"mood": 4},
                    "contentHash": "abc",
                    "createdAt": 100
                },
                "enqueuedAt": 100
            }]}
        }"#;

        let queue: SyncQueue = decode(blob).unwrap();
        assert_eq!(queue.len(), 1);
        assert!(queue.next_pending().is_some());
    }
}
