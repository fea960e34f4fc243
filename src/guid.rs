//! Portable GUID column type.
//!
//! The rest of the crate only ever sees [`Uuid`]. What actually goes over the
//! wire to the store depends on the engine: PostgreSQL keeps a native `UUID`
//! column, every other engine gets a `CHAR(32)` column holding the 128-bit
//! value as lowercase hex.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use crate::dialect::Dialect;

#[derive(Debug, Error)]
pub enum GuidError {
    #[error("invalid GUID `{value}`: {source}")]
    Parse {
        value: String,
        #[source]
        source: uuid::Error,
    },
}

/// A GUID as handed to the codec: either already parsed or still text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuidValue {
    Uuid(Uuid),
    Text(String),
}

impl GuidValue {
    pub fn to_uuid(&self) -> Result<Uuid, GuidError> {
        match self {
            GuidValue::Uuid(value) => Ok(*value),
            GuidValue::Text(text) => parse(text),
        }
    }
}

impl From<Uuid> for GuidValue {
    fn from(value: Uuid) -> Self {
        GuidValue::Uuid(value)
    }
}

impl From<&str> for GuidValue {
    fn from(value: &str) -> Self {
        GuidValue::Text(value.to_string())
    }
}

impl From<String> for GuidValue {
    fn from(value: String) -> Self {
        GuidValue::Text(value)
    }
}

fn parse(text: &str) -> Result<Uuid, GuidError> {
    Uuid::parse_str(text.trim()).map_err(|source| GuidError::Parse {
        value: text.to_string(),
        source,
    })
}

/// Converts GUIDs to and from one engine's storage representation.
pub trait GuidCodec: fmt::Debug + Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Column type used when declaring a GUID column.
    fn column_type(&self) -> &'static str;

    /// Storage form of `value`. `None` stays `None`.
    fn encode(&self, value: Option<&GuidValue>) -> Result<Option<String>, GuidError>;

    /// Parses whatever the store returned; both the hex and the hyphenated
    /// forms are accepted regardless of engine.
    fn decode(&self, raw: Option<&str>) -> Result<Option<Uuid>, GuidError> {
        raw.map(parse).transpose()
    }

    /// SQL for a bound GUID parameter.
    fn bind_sql(&self, placeholder: &str) -> String {
        placeholder.to_string()
    }

    /// SQL selecting a GUID column so it comes back as text.
    fn select_sql(&self, column: &str) -> String {
        column.to_string()
    }
}

/// Engines with a native UUID type. Values travel as the canonical
/// hyphenated string.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeGuidCodec;

impl GuidCodec for NativeGuidCodec {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn column_type(&self) -> &'static str {
        "UUID"
    }

    fn encode(&self, value: Option<&GuidValue>) -> Result<Option<String>, GuidError> {
        value
            .map(|value| Ok(value.to_uuid()?.to_string()))
            .transpose()
    }

    fn bind_sql(&self, placeholder: &str) -> String {
        format!("CAST({placeholder} AS UUID)")
    }

    fn select_sql(&self, column: &str) -> String {
        format!("CAST({column} AS TEXT) AS {column}")
    }
}

/// Engines without a UUID type. Values are stored as 32 hex characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct HexGuidCodec;

pub const HEX_GUID_WIDTH: usize = 32;

impl GuidCodec for HexGuidCodec {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn column_type(&self) -> &'static str {
        "CHAR(32)"
    }

    fn encode(&self, value: Option<&GuidValue>) -> Result<Option<String>, GuidError> {
        value
            .map(|value| {
                let uuid = value.to_uuid()?;
                Ok(format!("{:032x}", uuid.as_u128()))
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codecs() -> Vec<Box<dyn GuidCodec>> {
        vec![Box::new(NativeGuidCodec), Box::new(HexGuidCodec)]
    }

    #[test]
    fn encode_then_decode_is_identity() {
        let samples = [
            Uuid::nil(),
            Uuid::from_u128(u128::MAX),
            Uuid::new_v4(),
            Uuid::parse_str("00000000-0000-0000-0000-0000000000ff").unwrap(),
        ];
        for codec in codecs() {
            for uuid in samples {
                let stored = codec.encode(Some(&GuidValue::Uuid(uuid))).unwrap();
                let loaded = codec.decode(stored.as_deref()).unwrap();
                assert_eq!(loaded, Some(uuid), "{:?}", codec.dialect());
            }
        }
    }

    #[test]
    fn decode_then_encode_is_identity() {
        let uuid = Uuid::new_v4();
        for codec in codecs() {
            let stored = codec.encode(Some(&uuid.into())).unwrap().unwrap();
            let loaded = codec.decode(Some(&stored)).unwrap().unwrap();
            let again = codec.encode(Some(&loaded.into())).unwrap().unwrap();
            assert_eq!(again, stored);
        }
    }

    #[test]
    fn null_passes_through() {
        for codec in codecs() {
            assert_eq!(codec.encode(None).unwrap(), None);
            assert_eq!(codec.decode(None).unwrap(), None);
        }
    }

    #[test]
    fn hex_form_is_32_lowercase_hex_chars() {
        let codec = HexGuidCodec;
        for _ in 0..50 {
            let stored = codec
                .encode(Some(&Uuid::new_v4().into()))
                .unwrap()
                .unwrap();
            assert_eq!(stored.len(), HEX_GUID_WIDTH);
            assert!(stored
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        }
        assert_eq!(
            codec.encode(Some(&Uuid::nil().into())).unwrap().unwrap(),
            "0".repeat(32)
        );
        assert_eq!(codec.column_type(), "CHAR(32)");
    }

    #[test]
    fn text_is_parsed_before_encoding() {
        let text: GuidValue = "6F9619FF-8B86-D011-B42D-00C04FC964FF".into();
        assert_eq!(
            HexGuidCodec.encode(Some(&text)).unwrap().as_deref(),
            Some("6f9619ff8b86d011b42d00c04fc964ff")
        );
        assert_eq!(
            NativeGuidCodec.encode(Some(&text)).unwrap().as_deref(),
            Some("6f9619ff-8b86-d011-b42d-00c04fc964ff")
        );

        let hex: GuidValue = "6F9619FF8B86D011B42D00C04FC964FF".into();
        assert_eq!(
            NativeGuidCodec.encode(Some(&hex)).unwrap().as_deref(),
            Some("6f9619ff-8b86-d011-b42d-00c04fc964ff")
        );

        for codec in codecs() {
            let err = codec.encode(Some(&"not-a-uuid".into())).unwrap_err();
            assert!(matches!(err, GuidError::Parse { .. }), "{:?}", codec.dialect());
        }
    }

    #[test]
    fn native_codec_uses_canonical_form() {
        let uuid = Uuid::parse_str("6f9619ff8b86d011b42d00c04fc964ff").unwrap();
        let stored = NativeGuidCodec.encode(Some(&uuid.into())).unwrap();
        assert_eq!(
            stored.as_deref(),
            Some("6f9619ff-8b86-d011-b42d-00c04fc964ff")
        );
        assert_eq!(NativeGuidCodec.column_type(), "UUID");
        assert_eq!(NativeGuidCodec.bind_sql("$1"), "CAST($1 AS UUID)");
    }

    #[test]
    fn decode_accepts_both_forms() {
        let uuid = Uuid::new_v4();
        let hyphenated = uuid.to_string();
        let hex = uuid.simple().to_string();
        for codec in codecs() {
            assert_eq!(codec.decode(Some(&hyphenated)).unwrap(), Some(uuid));
            assert_eq!(codec.decode(Some(&hex)).unwrap(), Some(uuid));
            assert!(codec.decode(Some("xyz")).is_err());
        }
    }
}
