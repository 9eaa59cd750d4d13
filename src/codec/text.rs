//! Text and fallback codecs.

use bytes::Bytes;

use super::{octet_text, unsupported};
use crate::attribute::AttributeValue;
use crate::error::ConversionError;
use crate::value::Value;

/// Flavour of a text attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKind {
    Char,
    String,
    ObjectName,
}

pub(super) fn text_to_wire(value: &AttributeValue) -> Result<Value, ConversionError> {
    let text = match value {
        AttributeValue::Char(c) => c.to_string(),
        AttributeValue::String(s) | AttributeValue::ObjectName(s) => s.clone(),
        other => return Err(unsupported("text", other)),
    };
    Ok(Value::OctetString(Bytes::from(text)))
}

pub(super) fn text_from_wire(kind: TextKind, value: &Value) -> Result<AttributeValue, ConversionError> {
    let text = octet_text(value)?;
    match kind {
        TextKind::String => Ok(AttributeValue::String(text)),
        TextKind::ObjectName => Ok(AttributeValue::ObjectName(text)),
        TextKind::Char => {
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(AttributeValue::Char(c)),
                _ => Err(ConversionError::Malformed(format!(
                    "expected a single character, got '{}'",
                    text
                ))),
            }
        }
    }
}

/// Best effort: whatever the value displays as.
pub(super) fn fallback_to_wire(value: &AttributeValue) -> Value {
    Value::OctetString(Bytes::from(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_is_one_character_string() {
        let wire = text_to_wire(&AttributeValue::Char('é')).unwrap();
        assert_eq!(wire, Value::OctetString(Bytes::from("é")));
        assert_eq!(
            text_from_wire(TextKind::Char, &wire).unwrap(),
            AttributeValue::Char('é')
        );
        assert!(text_from_wire(TextKind::Char, &Value::OctetString(Bytes::from("ab"))).is_err());
        assert!(text_from_wire(TextKind::Char, &Value::OctetString(Bytes::new())).is_err());
    }

    #[test]
    fn test_invalid_utf8_is_malformed() {
        let err = text_from_wire(
            TextKind::String,
            &Value::OctetString(Bytes::from_static(&[0xff, 0xfe])),
        )
        .unwrap_err();
        assert!(matches!(err, ConversionError::Malformed(_)));
    }

    #[test]
    fn test_object_name_keeps_kind() {
        let wire = text_to_wire(&AttributeValue::ObjectName("app:type=Cache".into())).unwrap();
        assert_eq!(
            text_from_wire(TextKind::ObjectName, &wire).unwrap(),
            AttributeValue::ObjectName("app:type=Cache".into())
        );
    }

    #[test]
    fn test_fallback_uses_display_text() {
        assert_eq!(
            fallback_to_wire(&AttributeValue::Other("Thing{a=1}".into())),
            Value::OctetString(Bytes::from("Thing{a=1}"))
        );
    }
}
