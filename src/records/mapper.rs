//! Translation between the camelCase wire form and stored records.
//!
//! The typed structs in this module's parent are the storage representation
//! for both store backends, so mapping is a serde round trip plus validation.

use serde_json::{Map, Value};
use thiserror::Error;

use super::{with_entity, Collection, Entity, FieldErrors, Record};

#[derive(Debug, Error)]
pub enum MapError {
    #[error("invalid {collection} record: {source}")]
    Invalid {
        collection: Collection,
        #[source]
        source: serde_json::Error,
    },

    #[error("record failed validation")]
    Validation(FieldErrors),

    #[error("failed to encode record: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Stored record -> camelCase JSON object.
pub fn to_wire(record: &Record) -> Result<Value, MapError> {
    serde_json::to_value(record).map_err(MapError::Encode)
}

/// camelCase JSON object -> validated record of `collection`.
///
/// Absent optional fields become `None`, absent flags `false` and absent
/// `breaks` an empty list. Unknown fields are ignored.
pub fn to_storage(collection: Collection, wire: Value) -> Result<Record, MapError> {
    with_entity!(collection, E => decode::<E>(wire))
}

fn decode<E: Entity>(wire: Value) -> Result<Record, MapError> {
    let entity: E = serde_json::from_value(wire).map_err(|source| MapError::Invalid {
        collection: E::COLLECTION,
        source,
    })?;
    entity.validate().map_err(MapError::Validation)?;
    Ok(entity.into())
}

/// Forces `id` on a wire object, replacing whatever the body carried.
pub fn with_id(wire: Value, id: &str) -> Value {
    let mut object = match wire {
        Value::Object(object) => object,
        // Non-objects fail in `to_storage` with a serde error naming the type.
        other => return other,
    };
    object.insert("id".into(), Value::String(id.to_string()));
    Value::Object(object)
}

/// Wire object for a deleted record in a sync pull.
pub fn tombstone(id: &str) -> Value {
    let mut object = Map::new();
    object.insert("id".into(), Value::String(id.to_string()));
    object.insert("_deleted".into(), Value::Bool(true));
    Value::Object(object)
}
