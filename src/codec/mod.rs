//! Attribute type mapping and value codecs.
//!
//! [`classify`] maps every [`AttributeType`] onto one [`WireCategory`]; a
//! [`ValueCodec`] is resolved once per attribute from that category and then
//! converts values in both directions.
//!
//! | category  | wire value                         |
//! |-----------|------------------------------------|
//! | Boolean   | INTEGER 1 / 0                      |
//! | Integer   | INTEGER, saturated to the width    |
//! | Long      | Counter64 (two's complement bits)  |
//! | Float     | OCTET STRING, decimal text         |
//! | BigNumber | OCTET STRING, plain decimal text   |
//! | Text      | OCTET STRING, UTF-8                |
//! | UnixTime  | OCTET STRING, per [`DateFormatter`] |
//! | Buffer    | OCTET STRING, big-endian elements  |
//! | Blob      | OCTET STRING                       |
//! | Fallback  | OCTET STRING, display text; read-only |

mod buffer;
mod number;
mod tabular;
mod text;
mod time;

pub use buffer::{BlobKind, BufferKind};
pub use number::{BigKind, FloatWidth, IntegerWidth};
pub use tabular::{flatten, infer_type};
pub use text::TextKind;
pub use time::{DateFormatter, RFC1903, RFC1903_HUMAN_READABLE};

use bytes::Bytes;

use crate::attribute::{AttributeType, AttributeValue};
use crate::error::ConversionError;
use crate::value::Value;

/// Wire-type category of an abstract attribute type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireCategory {
    Boolean,
    Integer,
    Long,
    Float,
    BigNumber,
    Text,
    UnixTime,
    Buffer,
    Blob,
    Table,
    Fallback,
}

/// Total mapping from abstract type to wire category.
pub fn classify(attr_type: &AttributeType) -> WireCategory {
    match attr_type {
        AttributeType::Bool => WireCategory::Boolean,
        AttributeType::Byte | AttributeType::Short | AttributeType::Int => WireCategory::Integer,
        AttributeType::Long => WireCategory::Long,
        AttributeType::Float | AttributeType::Double => WireCategory::Float,
        AttributeType::BigInt | AttributeType::BigDecimal => WireCategory::BigNumber,
        AttributeType::Char | AttributeType::String | AttributeType::ObjectName => {
            WireCategory::Text
        }
        AttributeType::Date => WireCategory::UnixTime,
        AttributeType::ByteArray | AttributeType::BoolArray => WireCategory::Blob,
        AttributeType::ByteBuffer
        | AttributeType::CharBuffer
        | AttributeType::ShortBuffer
        | AttributeType::IntBuffer
        | AttributeType::LongBuffer
        | AttributeType::FloatBuffer
        | AttributeType::DoubleBuffer => WireCategory::Buffer,
        AttributeType::Array(_) | AttributeType::Table(_) => WireCategory::Table,
        AttributeType::Other(_) => WireCategory::Fallback,
    }
}

/// Bidirectional converter between native values and wire values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueCodec {
    Boolean,
    Integer(IntegerWidth),
    Long,
    Float(FloatWidth),
    BigNumber(BigKind),
    Text(TextKind),
    UnixTime(DateFormatter),
    Buffer(BufferKind),
    Blob(BlobKind),
    Fallback,
}

impl ValueCodec {
    /// Resolve the codec for one scalar type.
    ///
    /// Tabular types have no scalar codec and resolve to `Fallback`; table
    /// objects resolve one codec per column instead.
    pub fn for_type(attr_type: &AttributeType, display_format: Option<&str>) -> Self {
        match attr_type {
            AttributeType::Bool => Self::Boolean,
            AttributeType::Byte => Self::Integer(IntegerWidth::Byte),
            AttributeType::Short => Self::Integer(IntegerWidth::Short),
            AttributeType::Int => Self::Integer(IntegerWidth::Int),
            AttributeType::Long => Self::Long,
            AttributeType::Float => Self::Float(FloatWidth::Float),
            AttributeType::Double => Self::Float(FloatWidth::Double),
            AttributeType::BigInt => Self::BigNumber(BigKind::Integer),
            AttributeType::BigDecimal => Self::BigNumber(BigKind::Decimal),
            AttributeType::Char => Self::Text(TextKind::Char),
            AttributeType::String => Self::Text(TextKind::String),
            AttributeType::ObjectName => Self::Text(TextKind::ObjectName),
            AttributeType::Date => Self::UnixTime(DateFormatter::from_name(display_format)),
            AttributeType::ByteArray => Self::Blob(BlobKind::Bytes),
            AttributeType::BoolArray => Self::Blob(BlobKind::Bools),
            AttributeType::ByteBuffer => Self::Buffer(BufferKind::Byte),
            AttributeType::CharBuffer => Self::Buffer(BufferKind::Char),
            AttributeType::ShortBuffer => Self::Buffer(BufferKind::Short),
            AttributeType::IntBuffer => Self::Buffer(BufferKind::Int),
            AttributeType::LongBuffer => Self::Buffer(BufferKind::Long),
            AttributeType::FloatBuffer => Self::Buffer(BufferKind::Float),
            AttributeType::DoubleBuffer => Self::Buffer(BufferKind::Double),
            AttributeType::Array(_) | AttributeType::Table(_) | AttributeType::Other(_) => {
                Self::Fallback
            }
        }
    }

    pub fn category(&self) -> WireCategory {
        match self {
            Self::Boolean => WireCategory::Boolean,
            Self::Integer(_) => WireCategory::Integer,
            Self::Long => WireCategory::Long,
            Self::Float(_) => WireCategory::Float,
            Self::BigNumber(_) => WireCategory::BigNumber,
            Self::Text(_) => WireCategory::Text,
            Self::UnixTime(_) => WireCategory::UnixTime,
            Self::Buffer(_) => WireCategory::Buffer,
            Self::Blob(_) => WireCategory::Blob,
            Self::Fallback => WireCategory::Fallback,
        }
    }

    pub fn is_writable(&self) -> bool {
        !matches!(self, Self::Fallback)
    }

    /// Value reported when the resource cannot be read.
    pub fn default_value(&self) -> Value {
        match self {
            Self::Boolean | Self::Integer(_) => Value::Integer(0),
            Self::Long => Value::Counter64(0),
            _ => Value::OctetString(Bytes::new()),
        }
    }

    pub fn to_wire(&self, value: &AttributeValue) -> Result<Value, ConversionError> {
        match self {
            Self::Boolean => number::bool_to_wire(value),
            Self::Integer(width) => number::integer_to_wire(*width, value),
            Self::Long => number::long_to_wire(value),
            Self::Float(_) => number::float_to_wire(value),
            Self::BigNumber(_) => number::big_to_wire(value),
            Self::Text(_) => text::text_to_wire(value),
            Self::UnixTime(formatter) => formatter.to_wire(value),
            Self::Buffer(_) => buffer::buffer_to_wire(value),
            Self::Blob(_) => buffer::blob_to_wire(value),
            Self::Fallback => Ok(text::fallback_to_wire(value)),
        }
    }

    pub fn from_wire(&self, value: &Value) -> Result<AttributeValue, ConversionError> {
        match self {
            Self::Boolean => number::bool_from_wire(value),
            Self::Integer(width) => number::integer_from_wire(*width, value),
            Self::Long => number::long_from_wire(value),
            Self::Float(width) => number::float_from_wire(*width, value),
            Self::BigNumber(kind) => number::big_from_wire(*kind, value),
            Self::Text(kind) => text::text_from_wire(*kind, value),
            Self::UnixTime(formatter) => formatter.from_wire(value),
            Self::Buffer(kind) => buffer::buffer_from_wire(*kind, value),
            Self::Blob(kind) => buffer::blob_from_wire(*kind, value),
            Self::Fallback => Err(ConversionError::ReadOnly),
        }
    }
}

fn wrong_type(expected: &'static str, actual: &Value) -> ConversionError {
    ConversionError::WrongType {
        expected,
        actual: actual.type_name(),
    }
}

fn unsupported(expected: &str, actual: &AttributeValue) -> ConversionError {
    ConversionError::Unsupported(format!("{} (got {})", expected, infer_type(actual)))
}

/// UTF-8 content of an OCTET STRING.
fn octet_text(value: &Value) -> Result<String, ConversionError> {
    match value {
        Value::OctetString(data) => String::from_utf8(data.to_vec())
            .map_err(|e| ConversionError::Malformed(format!("invalid UTF-8: {}", e))),
        other => Err(wrong_type("OCTET STRING", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::ColumnDescriptor;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_classify_is_total() {
        let cases = [
            (AttributeType::Bool, WireCategory::Boolean),
            (AttributeType::Byte, WireCategory::Integer),
            (AttributeType::Long, WireCategory::Long),
            (AttributeType::Double, WireCategory::Float),
            (AttributeType::BigDecimal, WireCategory::BigNumber),
            (AttributeType::ObjectName, WireCategory::Text),
            (AttributeType::Date, WireCategory::UnixTime),
            (AttributeType::ShortBuffer, WireCategory::Buffer),
            (AttributeType::BoolArray, WireCategory::Blob),
            (
                AttributeType::Table(vec![ColumnDescriptor::new("a", AttributeType::Int)]),
                WireCategory::Table,
            ),
            (AttributeType::Other("Thing".into()), WireCategory::Fallback),
        ];
        for (attr_type, category) in cases {
            assert_eq!(classify(&attr_type), category, "{}", attr_type);
        }
    }

    #[test]
    fn test_codec_category_agrees_with_classify() {
        for attr_type in [
            AttributeType::Short,
            AttributeType::Float,
            AttributeType::BigInt,
            AttributeType::Char,
            AttributeType::LongBuffer,
            AttributeType::ByteArray,
        ] {
            assert_eq!(
                ValueCodec::for_type(&attr_type, None).category(),
                classify(&attr_type)
            );
        }
    }

    #[test]
    fn test_boolean_scenario() {
        let codec = ValueCodec::for_type(&AttributeType::Bool, None);
        assert_eq!(codec.to_wire(&AttributeValue::Bool(true)).unwrap(), Value::Integer(1));
        assert_eq!(
            codec.from_wire(&Value::Integer(0)).unwrap(),
            AttributeValue::Bool(false)
        );
    }

    #[test]
    fn test_fallback_is_read_only() {
        let codec = ValueCodec::for_type(&AttributeType::Other("Thing".into()), None);
        assert!(!codec.is_writable());
        assert_eq!(
            codec.to_wire(&AttributeValue::Other("x".into())).unwrap(),
            Value::OctetString(Bytes::from_static(b"x"))
        );
        let err = codec
            .from_wire(&Value::OctetString(Bytes::from_static(b"x")))
            .unwrap_err();
        assert_eq!(err, ConversionError::ReadOnly);
        assert_eq!(err.to_string(), "attribute is read-only");
    }

    #[test]
    fn test_date_uses_display_format() {
        let codec = ValueCodec::for_type(&AttributeType::Date, Some("%Y"));
        let time = Utc.with_ymd_and_hms(2031, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            codec.to_wire(&AttributeValue::Date(time)).unwrap(),
            Value::OctetString(Bytes::from_static(b"2031"))
        );
    }

    #[test]
    fn test_mismatched_native_value() {
        let codec = ValueCodec::for_type(&AttributeType::Long, None);
        let err = codec.to_wire(&AttributeValue::String("7".into())).unwrap_err();
        assert!(matches!(err, ConversionError::Unsupported(_)));
    }

    #[test]
    fn test_default_values() {
        assert_eq!(ValueCodec::Boolean.default_value(), Value::Integer(0));
        assert_eq!(ValueCodec::Long.default_value(), Value::Counter64(0));
        assert_eq!(
            ValueCodec::Text(TextKind::String).default_value(),
            Value::OctetString(Bytes::new())
        );
    }
}
