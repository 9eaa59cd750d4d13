//! Byte arrays, bool bitsets and numeric buffers as opaque octet strings.
//!
//! Numeric buffers are packed big-endian, one element after another, and
//! split back per element width on read.

use bytes::{BufMut, Bytes, BytesMut};

use super::{unsupported, wrong_type};
use crate::attribute::AttributeValue;
use crate::error::ConversionError;
use crate::value::Value;

/// Blob attribute kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobKind {
    Bytes,
    /// Bit `i` lives in byte `i / 8` at position `i % 8`.
    Bools,
}

/// Numeric buffer element kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl BufferKind {
    pub fn element_width(self) -> usize {
        match self {
            Self::Byte => 1,
            Self::Char | Self::Short => 2,
            Self::Int | Self::Float => 4,
            Self::Long | Self::Double => 8,
        }
    }
}

fn octets(value: &Value) -> Result<&Bytes, ConversionError> {
    match value {
        Value::OctetString(data) | Value::Opaque(data) => Ok(data),
        other => Err(wrong_type("OCTET STRING", other)),
    }
}

pub(super) fn blob_to_wire(value: &AttributeValue) -> Result<Value, ConversionError> {
    match value {
        AttributeValue::ByteArray(data) => Ok(Value::OctetString(Bytes::copy_from_slice(data))),
        AttributeValue::BoolArray(bits) => Ok(Value::OctetString(pack_bits(bits))),
        other => Err(unsupported("blob", other)),
    }
}

pub(super) fn blob_from_wire(kind: BlobKind, value: &Value) -> Result<AttributeValue, ConversionError> {
    let data = octets(value)?;
    Ok(match kind {
        BlobKind::Bytes => AttributeValue::ByteArray(data.to_vec()),
        BlobKind::Bools => AttributeValue::BoolArray(unpack_bits(data)),
    })
}

fn pack_bits(bits: &[bool]) -> Bytes {
    let mut packed = vec![0u8; bits.len().div_ceil(8)];
    for (i, _) in bits.iter().enumerate().filter(|(_, set)| **set) {
        packed[i / 8] |= 1 << (i % 8);
    }
    Bytes::from(packed)
}

/// The bit count is not carried, so trailing padding bits come back as `false`.
fn unpack_bits(data: &[u8]) -> Vec<bool> {
    (0..data.len() * 8)
        .map(|i| data[i / 8] & (1 << (i % 8)) != 0)
        .collect()
}

pub(super) fn buffer_to_wire(value: &AttributeValue) -> Result<Value, ConversionError> {
    let mut buf = BytesMut::new();
    match value {
        AttributeValue::ByteBuffer(v) => buf.put_slice(v),
        AttributeValue::CharBuffer(v) => v.iter().for_each(|x| buf.put_u16(*x)),
        AttributeValue::ShortBuffer(v) => v.iter().for_each(|x| buf.put_i16(*x)),
        AttributeValue::IntBuffer(v) => v.iter().for_each(|x| buf.put_i32(*x)),
        AttributeValue::LongBuffer(v) => v.iter().for_each(|x| buf.put_i64(*x)),
        AttributeValue::FloatBuffer(v) => v.iter().for_each(|x| buf.put_f32(*x)),
        AttributeValue::DoubleBuffer(v) => v.iter().for_each(|x| buf.put_f64(*x)),
        other => return Err(unsupported("buffer", other)),
    }
    Ok(Value::OctetString(buf.freeze()))
}

pub(super) fn buffer_from_wire(
    kind: BufferKind,
    value: &Value,
) -> Result<AttributeValue, ConversionError> {
    let data = octets(value)?;
    let width = kind.element_width();
    if data.len() % width != 0 {
        return Err(ConversionError::Malformed(format!(
            "{} bytes is not a multiple of element width {}",
            data.len(),
            width
        )));
    }

    fn elements<const N: usize, T>(data: &[u8], decode: fn([u8; N]) -> T) -> Vec<T> {
        data.chunks_exact(N)
            .map(|chunk| {
                let mut raw = [0u8; N];
                raw.copy_from_slice(chunk);
                decode(raw)
            })
            .collect()
    }

    Ok(match kind {
        BufferKind::Byte => AttributeValue::ByteBuffer(data.to_vec()),
        BufferKind::Char => AttributeValue::CharBuffer(elements(data, u16::from_be_bytes)),
        BufferKind::Short => AttributeValue::ShortBuffer(elements(data, i16::from_be_bytes)),
        BufferKind::Int => AttributeValue::IntBuffer(elements(data, i32::from_be_bytes)),
        BufferKind::Long => AttributeValue::LongBuffer(elements(data, i64::from_be_bytes)),
        BufferKind::Float => AttributeValue::FloatBuffer(elements(data, f32::from_be_bytes)),
        BufferKind::Double => AttributeValue::DoubleBuffer(elements(data, f64::from_be_bytes)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_array_bit_layout() {
        let bits = vec![true, false, false, false, false, false, false, false, false, true];
        let wire = blob_to_wire(&AttributeValue::BoolArray(bits.clone())).unwrap();
        assert_eq!(wire, Value::OctetString(Bytes::from_static(&[0x01, 0x02])));

        let AttributeValue::BoolArray(back) = blob_from_wire(BlobKind::Bools, &wire).unwrap() else {
            panic!("expected bool array");
        };
        assert_eq!(back.len(), 16);
        assert_eq!(&back[..10], &bits[..]);
        assert!(back[10..].iter().all(|b| !b));
    }

    #[test]
    fn test_int_buffer_big_endian() {
        let wire = buffer_to_wire(&AttributeValue::IntBuffer(vec![1, -1])).unwrap();
        assert_eq!(
            wire,
            Value::OctetString(Bytes::from_static(&[0, 0, 0, 1, 0xff, 0xff, 0xff, 0xff]))
        );
        assert_eq!(
            buffer_from_wire(BufferKind::Int, &wire).unwrap(),
            AttributeValue::IntBuffer(vec![1, -1])
        );
    }

    #[test]
    fn test_buffer_width_mismatch() {
        let err = buffer_from_wire(
            BufferKind::Long,
            &Value::OctetString(Bytes::from_static(&[1, 2, 3])),
        )
        .unwrap_err();
        assert!(matches!(err, ConversionError::Malformed(_)));
    }

    #[test]
    fn test_double_and_char_buffers() {
        let value = AttributeValue::DoubleBuffer(vec![1.5, -0.25]);
        let wire = buffer_to_wire(&value).unwrap();
        assert_eq!(buffer_from_wire(BufferKind::Double, &wire).unwrap(), value);

        let chars = AttributeValue::CharBuffer("hi".encode_utf16().collect());
        let wire = buffer_to_wire(&chars).unwrap();
        assert_eq!(wire, Value::OctetString(Bytes::from_static(&[0, b'h', 0, b'i'])));
        assert_eq!(buffer_from_wire(BufferKind::Char, &wire).unwrap(), chars);
    }

    #[test]
    fn test_blob_rejects_integer() {
        assert!(matches!(
            blob_from_wire(BlobKind::Bytes, &Value::Integer(3)),
            Err(ConversionError::WrongType { .. })
        ));
    }
}
