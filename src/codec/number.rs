//! Boolean, integer-family, long, floating point and arbitrary-precision codecs.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use bytes::Bytes;
use num::BigInt;

use super::{octet_text, unsupported, wrong_type};
use crate::attribute::AttributeValue;
use crate::error::ConversionError;
use crate::value::Value;

pub(super) fn bool_to_wire(value: &AttributeValue) -> Result<Value, ConversionError> {
    match value {
        AttributeValue::Bool(v) => Ok(Value::Integer(i32::from(*v))),
        other => Err(unsupported("Bool", other)),
    }
}

pub(super) fn bool_from_wire(value: &Value) -> Result<AttributeValue, ConversionError> {
    match value {
        Value::Integer(v) => Ok(AttributeValue::Bool(*v == 1)),
        other => Err(wrong_type("INTEGER", other)),
    }
}

/// Width of an integer-family attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegerWidth {
    Byte,
    Short,
    Int,
}

impl IntegerWidth {
    fn bounds(self) -> (i64, i64) {
        match self {
            Self::Byte => (i64::from(i8::MIN), i64::from(i8::MAX)),
            Self::Short => (i64::from(i16::MIN), i64::from(i16::MAX)),
            Self::Int => (i64::from(i32::MIN), i64::from(i32::MAX)),
        }
    }

    /// Clamp into this width. Never wraps.
    pub fn saturate(self, value: i64) -> i32 {
        let (min, max) = self.bounds();
        // bounds are within i32
        value.clamp(min, max) as i32
    }

    fn native(self, value: i32) -> AttributeValue {
        let value = self.saturate(i64::from(value));
        match self {
            Self::Byte => AttributeValue::Byte(value as i8),
            Self::Short => AttributeValue::Short(value as i16),
            Self::Int => AttributeValue::Int(value),
        }
    }
}

pub(super) fn integer_to_wire(
    width: IntegerWidth,
    value: &AttributeValue,
) -> Result<Value, ConversionError> {
    let wide = match value {
        AttributeValue::BigInt(v) => {
            // out of i64 range saturates by sign
            i64::try_from(v).unwrap_or(if v.sign() == num::bigint::Sign::Minus {
                i64::MIN
            } else {
                i64::MAX
            })
        }
        other => other
            .as_i64()
            .ok_or_else(|| unsupported("integer", other))?,
    };
    Ok(Value::Integer(width.saturate(wide)))
}

pub(super) fn integer_from_wire(
    width: IntegerWidth,
    value: &Value,
) -> Result<AttributeValue, ConversionError> {
    match value {
        Value::Integer(v) => Ok(width.native(*v)),
        Value::Counter32(v) | Value::Gauge32(v) => {
            Ok(width.native(width.saturate(i64::from(*v))))
        }
        other => Err(wrong_type("INTEGER", other)),
    }
}

/// Longs travel as Counter64 carrying the two's complement bit pattern.
pub(super) fn long_to_wire(value: &AttributeValue) -> Result<Value, ConversionError> {
    let v = value.as_i64().ok_or_else(|| unsupported("Long", value))?;
    Ok(Value::Counter64(v as u64))
}

pub(super) fn long_from_wire(value: &Value) -> Result<AttributeValue, ConversionError> {
    match value {
        Value::Counter64(v) => Ok(AttributeValue::Long(*v as i64)),
        Value::Integer(v) => Ok(AttributeValue::Long(i64::from(*v))),
        Value::Counter32(v) | Value::Gauge32(v) => Ok(AttributeValue::Long(i64::from(*v))),
        other => Err(wrong_type("Counter64", other)),
    }
}

/// Floating point precision of a float attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatWidth {
    Float,
    Double,
}

pub(super) fn float_to_wire(value: &AttributeValue) -> Result<Value, ConversionError> {
    let text = match value {
        AttributeValue::Float(v) => v.to_string(),
        AttributeValue::Double(v) => v.to_string(),
        other => return Err(unsupported("Float", other)),
    };
    Ok(Value::OctetString(Bytes::from(text)))
}

pub(super) fn float_from_wire(
    width: FloatWidth,
    value: &Value,
) -> Result<AttributeValue, ConversionError> {
    let text = octet_text(value)?;
    let text = text.trim();
    let parsed = match width {
        FloatWidth::Float => f32::from_str(text).map(AttributeValue::Float).ok(),
        FloatWidth::Double => f64::from_str(text).map(AttributeValue::Double).ok(),
    };
    parsed.ok_or_else(|| ConversionError::Malformed(format!("'{}' is not a number", text)))
}

/// Arbitrary-precision number kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BigKind {
    Integer,
    Decimal,
}

pub(super) fn big_to_wire(value: &AttributeValue) -> Result<Value, ConversionError> {
    let text = match value {
        AttributeValue::BigInt(v) => v.to_string(),
        AttributeValue::BigDecimal(v) => v.to_plain_string(),
        other => return Err(unsupported("BigNumber", other)),
    };
    Ok(Value::OctetString(Bytes::from(text)))
}

pub(super) fn big_from_wire(kind: BigKind, value: &Value) -> Result<AttributeValue, ConversionError> {
    let text = octet_text(value)?;
    let text = text.trim();
    let malformed = || ConversionError::Malformed(format!("'{}' is not a decimal number", text));
    match kind {
        BigKind::Integer => BigInt::from_str(text)
            .map(AttributeValue::BigInt)
            .map_err(|_| malformed()),
        BigKind::Decimal => BigDecimal::from_str(text)
            .map(AttributeValue::BigDecimal)
            .map_err(|_| malformed()),
    }
}
