//! Field tables and dynamic values shared by every persisted entity.
//!
//! Each entity declares its columns once as a field enum ([`Column`]) with a
//! [`FieldKind`] tag per column. The repository and the serializer walk that
//! table instead of reflecting over the type at runtime.

use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Storage-level kind of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Guid,
    Integer,
    SmallInteger,
    Text,
    Binary,
    /// Enum stored as its ordinal.
    Enum,
    Timestamp,
    IntegerList,
}

impl FieldKind {
    pub fn name(self) -> &'static str {
        match self {
            FieldKind::Guid => "guid",
            FieldKind::Integer => "integer",
            FieldKind::SmallInteger => "small integer",
            FieldKind::Text => "text",
            FieldKind::Binary => "binary",
            FieldKind::Enum => "enum",
            FieldKind::Timestamp => "timestamp",
            FieldKind::IntegerList => "integer list",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An enum member as seen by the storage layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumMember {
    pub name: &'static str,
    pub ordinal: i64,
}

/// A single column value, detached from any entity type.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Integer(i64),
    Text(String),
    Binary(Vec<u8>),
    Guid(Uuid),
    Enum(EnumMember),
    Timestamp(DateTime<Utc>),
    IntegerList(Vec<i64>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Integer(_) => "integer",
            FieldValue::Text(_) => "text",
            FieldValue::Binary(_) => "binary",
            FieldValue::Guid(_) => "guid",
            FieldValue::Enum(_) => "enum",
            FieldValue::Timestamp(_) => "timestamp",
            FieldValue::IntegerList(_) => "integer list",
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Integer(value.into())
    }
}

impl From<i16> for FieldValue {
    fn from(value: i16) -> Self {
        FieldValue::Integer(value.into())
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        FieldValue::Binary(value)
    }
}

impl From<Uuid> for FieldValue {
    fn from(value: Uuid) -> Self {
        FieldValue::Guid(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(value)
    }
}

impl From<Vec<i64>> for FieldValue {
    fn from(value: Vec<i64>) -> Self {
        FieldValue::IntegerList(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FieldValue::Null, Into::into)
    }
}

/// A value that does not fit the column it was assigned to.
#[derive(Debug, Error)]
pub enum ValueError {
    #[error("column `{field}` cannot hold a {found} value")]
    Kind {
        field: &'static str,
        found: &'static str,
    },

    #[error("column `{field}` holds at most {max} bytes, got {len}")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
}

impl ValueError {
    pub fn new(field: &'static str, value: &FieldValue) -> Self {
        ValueError::Kind {
            field,
            found: value.type_name(),
        }
    }
}

/// One entry of an entity's field table.
pub trait Column: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    fn name(self) -> &'static str;
    fn kind(self) -> FieldKind;
}

/// A record type persisted in its own table.
pub trait Entity: Clone + Default + fmt::Debug + Send + Sync + Unpin + 'static {
    type Field: Column;

    const TABLE: &'static str;

    /// Every column, in declaration order.
    const FIELDS: &'static [Self::Field];

    /// Primary key columns.
    const KEY: &'static [Self::Field];

    /// Key column filled in by the store on insert, if any.
    const GENERATED_KEY: Option<Self::Field> = None;

    fn get(&self, field: Self::Field) -> FieldValue;

    fn set(&mut self, field: Self::Field, value: FieldValue) -> Result<(), ValueError>;

    /// Checks constraints the column types alone don't carry. Runs before
    /// every write.
    fn validate(&self) -> Result<(), ValueError> {
        Ok(())
    }

    /// The identifier as handed to callers.
    fn id_string(&self) -> String;
}

// Conversions used by `Entity::set` implementations.

pub(crate) fn expect_integer(field: &'static str, value: FieldValue) -> Result<i64, ValueError> {
    match value {
        FieldValue::Integer(value) => Ok(value),
        other => Err(ValueError::new(field, &other)),
    }
}

pub(crate) fn expect_optional_integer(
    field: &'static str,
    value: FieldValue,
) -> Result<Option<i64>, ValueError> {
    match value {
        FieldValue::Null => Ok(None),
        other => expect_integer(field, other).map(Some),
    }
}

pub(crate) fn expect_text(field: &'static str, value: FieldValue) -> Result<String, ValueError> {
    match value {
        FieldValue::Text(value) => Ok(value),
        other => Err(ValueError::new(field, &other)),
    }
}

pub(crate) fn expect_optional_text(
    field: &'static str,
    value: FieldValue,
) -> Result<Option<String>, ValueError> {
    match value {
        FieldValue::Null => Ok(None),
        other => expect_text(field, other).map(Some),
    }
}

pub(crate) fn expect_guid(field: &'static str, value: FieldValue) -> Result<Uuid, ValueError> {
    match value {
        FieldValue::Guid(value) => Ok(value),
        FieldValue::Text(ref text) => {
            Uuid::parse_str(text).map_err(|_| ValueError::new(field, &value))
        }
        other => Err(ValueError::new(field, &other)),
    }
}
