//! Entity to flat JSON record conversion, for the route layer.

use chrono::DateTime;
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::entity::{Column, Entity, FieldKind, FieldValue};
use crate::error::ErrorCode;

pub type Record = Map<String, Value>;

#[derive(Debug, Error)]
#[error("{code}: failed to convert `{field}` as {kind}")]
pub struct ConversionError {
    pub code: ErrorCode,
    pub field: &'static str,
    pub kind: FieldKind,
}

/// Renders every declared column of `entity`, skipping names that start with
/// an underscore. Null renders as `""`. A column whose value cannot be
/// rendered gets a `ConversionError` marker instead of failing the record.
pub fn to_record<E: Entity>(entity: &E) -> Record {
    let mut record = Map::new();
    for &field in E::FIELDS {
        let name = field.name();
        if name.starts_with('_') {
            continue;
        }
        let value = match entity.get(field) {
            FieldValue::Null => Value::String(String::new()),
            value => render(name, field.kind(), value).unwrap_or_else(|err| {
                tracing::warn!(error = %err, "serialization fell back to a marker");
                Value::String(err.to_string())
            }),
        };
        record.insert(name.to_string(), value);
    }
    record
}

fn render(field: &'static str, kind: FieldKind, value: FieldValue) -> Result<Value, ConversionError> {
    let failed = || ConversionError {
        code: ErrorCode::ConversionError,
        field,
        kind,
    };

    match kind {
        FieldKind::Timestamp => match value {
            FieldValue::Timestamp(at) => Ok(Value::String(at.to_rfc3339())),
            FieldValue::Text(text) => DateTime::parse_from_rfc3339(&text)
                .map(|at| Value::String(at.to_rfc3339()))
                .map_err(|_| failed()),
            _ => Err(failed()),
        },
        FieldKind::Guid => match value {
            FieldValue::Guid(uuid) => Ok(Value::String(uuid.to_string())),
            FieldValue::Text(text) => Uuid::parse_str(&text)
                .map(|uuid| Value::String(uuid.to_string()))
                .map_err(|_| failed()),
            _ => Err(failed()),
        },
        FieldKind::Enum => match value {
            FieldValue::Enum(member) => Ok(Value::String(member.name.to_string())),
            FieldValue::Text(text) => Ok(Value::String(text)),
            _ => Err(failed()),
        },
        _ => Ok(plain(value)),
    }
}

fn plain(value: FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::String(String::new()),
        FieldValue::Integer(number) => Value::from(number),
        FieldValue::Text(text) => Value::String(text),
        FieldValue::Binary(bytes) => Value::String(hex::encode(bytes)),
        FieldValue::Guid(uuid) => Value::String(uuid.to_string()),
        FieldValue::Enum(member) => Value::String(member.name.to_string()),
        FieldValue::Timestamp(at) => Value::String(at.to_rfc3339()),
        FieldValue::IntegerList(list) => Value::from(list),
    }
}
