//! BER decoding.
//!
//! [`Decoder`] walks a `Bytes` buffer without copying: octet strings and
//! nested sequences are returned as slices of the original allocation.
//! Every read is bounds-checked and reports the absolute offset on error.

use bytes::Bytes;

use super::length::MAX_LENGTH;
use super::tag;
use crate::error::{DecodeErrorKind, Error, Result};
use crate::oid::Oid;

/// Bounded BER reader.
#[derive(Debug, Clone)]
pub struct Decoder {
    data: Bytes,
    pos: usize,
    base: usize,
}

impl Decoder {
    /// Create a decoder over a complete buffer.
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            pos: 0,
            base: 0,
        }
    }

    /// Create a decoder over a byte slice (copies the slice).
    pub fn from_slice(data: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(data))
    }

    /// Absolute offset of the next unread octet.
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    /// True when every octet has been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Octets not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn err(&self, kind: DecodeErrorKind) -> Error {
        Error::decode(self.offset(), kind)
    }

    /// Look at the next tag without consuming it.
    pub fn peek_tag(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    /// Read one tag octet.
    pub fn read_tag(&mut self) -> Result<u8> {
        let tag = self
            .peek_tag()
            .ok_or_else(|| self.err(DecodeErrorKind::TruncatedData))?;
        self.pos += 1;
        Ok(tag)
    }

    /// Read a definite length.
    pub fn read_length(&mut self) -> Result<usize> {
        let first = self.read_tag()?;
        if first < 0x80 {
            return self.check_fits(first as usize);
        }
        if first == 0x80 {
            return Err(self.err(DecodeErrorKind::IndefiniteLength));
        }

        let octets = (first & 0x7F) as usize;
        if octets > 4 {
            return Err(self.err(DecodeErrorKind::LengthTooLong { octets }));
        }
        let mut len = 0usize;
        for _ in 0..octets {
            len = (len << 8) | self.read_tag()? as usize;
        }
        if len > MAX_LENGTH {
            return Err(self.err(DecodeErrorKind::LengthExceedsMax {
                length: len,
                max: MAX_LENGTH,
            }));
        }
        self.check_fits(len)
    }

    fn check_fits(&self, len: usize) -> Result<usize> {
        if len > self.remaining() {
            return Err(self.err(DecodeErrorKind::InsufficientData {
                needed: len,
                available: self.remaining(),
            }));
        }
        Ok(len)
    }

    /// Read `len` raw octets.
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes> {
        self.check_fits(len)?;
        let out = self.data.slice(self.pos..self.pos + len);
        self.pos += len;
        Ok(out)
    }

    fn expect_tag(&mut self, expected: u8) -> Result<()> {
        let actual = self.read_tag()?;
        if actual != expected {
            return Err(Error::decode(
                self.offset() - 1,
                DecodeErrorKind::UnexpectedTag { expected, actual },
            ));
        }
        Ok(())
    }

    /// Read an INTEGER.
    pub fn read_integer(&mut self) -> Result<i32> {
        self.expect_tag(tag::universal::INTEGER)?;
        let len = self.read_length()?;
        self.read_integer_value(len)
    }

    /// Read the content octets of a signed 32-bit integer.
    ///
    /// Non-minimal encodings are accepted when the value fits.
    pub fn read_integer_value(&mut self, len: usize) -> Result<i32> {
        if len == 0 {
            return Err(self.err(DecodeErrorKind::ZeroLengthInteger));
        }
        if len > 8 {
            return Err(self.err(DecodeErrorKind::IntegerOverflow));
        }
        let bytes = self.read_bytes(len)?;
        let mut value: i64 = if bytes[0] & 0x80 != 0 { -1 } else { 0 };
        for &b in bytes.iter() {
            value = (value << 8) | i64::from(b);
        }
        i32::try_from(value).map_err(|_| self.err(DecodeErrorKind::IntegerOverflow))
    }

    /// Read the content octets of an unsigned 32-bit value.
    pub fn read_unsigned32_value(&mut self, len: usize) -> Result<u32> {
        let value = self.read_unsigned_value(len, 5)?;
        u32::try_from(value).map_err(|_| self.err(DecodeErrorKind::IntegerOverflow))
    }

    /// Read the content octets of a Counter64.
    pub fn read_integer64_value(&mut self, len: usize) -> Result<u64> {
        if len > 9 {
            return Err(self.err(DecodeErrorKind::Integer64TooLong { length: len }));
        }
        self.read_unsigned_value(len, 9)
    }

    fn read_unsigned_value(&mut self, len: usize, max_len: usize) -> Result<u64> {
        if len == 0 {
            return Err(self.err(DecodeErrorKind::ZeroLengthInteger));
        }
        if len > max_len {
            return Err(self.err(DecodeErrorKind::IntegerOverflow));
        }
        let bytes = self.read_bytes(len)?;
        let mut value: u64 = 0;
        for (i, &b) in bytes.iter().enumerate() {
            if i == 0 && len == max_len && b != 0 {
                return Err(self.err(DecodeErrorKind::IntegerOverflow));
            }
            value = (value << 8) | u64::from(b);
        }
        Ok(value)
    }

    /// Read an OCTET STRING.
    pub fn read_octet_string(&mut self) -> Result<Bytes> {
        let tag = self.read_tag()?;
        if tag == tag::universal::OCTET_STRING_CONSTRUCTED {
            return Err(self.err(DecodeErrorKind::ConstructedOctetString));
        }
        if tag != tag::universal::OCTET_STRING {
            return Err(Error::decode(
                self.offset() - 1,
                DecodeErrorKind::UnexpectedTag {
                    expected: tag::universal::OCTET_STRING,
                    actual: tag,
                },
            ));
        }
        let len = self.read_length()?;
        self.read_bytes(len)
    }

    /// Read a NULL.
    pub fn read_null(&mut self) -> Result<()> {
        self.expect_tag(tag::universal::NULL)?;
        if self.read_length()? != 0 {
            return Err(self.err(DecodeErrorKind::InvalidNull));
        }
        Ok(())
    }

    /// Read an OBJECT IDENTIFIER.
    pub fn read_oid(&mut self) -> Result<Oid> {
        self.expect_tag(tag::universal::OBJECT_IDENTIFIER)?;
        let len = self.read_length()?;
        self.read_oid_value(len)
    }

    /// Read the content octets of an OBJECT IDENTIFIER.
    pub fn read_oid_value(&mut self, len: usize) -> Result<Oid> {
        let offset = self.offset();
        let bytes = self.read_bytes(len)?;
        Oid::from_ber(&bytes).map_err(|_| Error::decode(offset, DecodeErrorKind::InvalidOidEncoding))
    }

    /// Enter a SEQUENCE, returning a decoder bounded to its contents.
    pub fn read_sequence(&mut self) -> Result<Decoder> {
        self.read_constructed(tag::universal::SEQUENCE)
    }

    /// Enter a constructed value with the given tag.
    pub fn read_constructed(&mut self, expected: u8) -> Result<Decoder> {
        self.expect_tag(expected)?;
        let len = self.read_length()?;
        self.sub_decoder(len)
    }

    /// Split off the next `len` octets as an independent decoder.
    pub fn sub_decoder(&mut self, len: usize) -> Result<Decoder> {
        let base = self.offset();
        let data = self.read_bytes(len)?;
        Ok(Decoder { data, pos: 0, base })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ber::EncodeBuf;

    #[test]
    fn test_read_integer_variants() {
        assert_eq!(Decoder::from_slice(&[0x02, 0x01, 0x7F]).read_integer().unwrap(), 127);
        assert_eq!(Decoder::from_slice(&[0x02, 0x01, 0xFF]).read_integer().unwrap(), -1);
        // non-minimal but in range
        assert_eq!(
            Decoder::from_slice(&[0x02, 0x03, 0x00, 0x00, 0x05]).read_integer().unwrap(),
            5
        );
        assert!(Decoder::from_slice(&[0x02, 0x00]).read_integer().is_err());
        assert!(
            Decoder::from_slice(&[0x02, 0x05, 0x01, 0x00, 0x00, 0x00, 0x00])
                .read_integer()
                .is_err()
        );
    }

    #[test]
    fn test_read_length_forms() {
        let mut data = vec![0x04, 0x81, 0x80];
        data.extend(std::iter::repeat_n(0xAA, 0x80));
        let s = Decoder::from_slice(&data).read_octet_string().unwrap();
        assert_eq!(s.len(), 0x80);

        let err = Decoder::from_slice(&[0x04, 0x80]).read_octet_string();
        assert!(err.is_err());
    }

    #[test]
    fn test_truncated_reports_offset() {
        let err = Decoder::from_slice(&[0x30, 0x05, 0x02, 0x01]).read_sequence().unwrap_err();
        match err {
            Error::Decode { offset, kind } => {
                assert_eq!(offset, 2);
                assert!(matches!(kind, DecodeErrorKind::InsufficientData { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_constructed_octet_string_rejected() {
        let err = Decoder::from_slice(&[0x24, 0x00]).read_octet_string().unwrap_err();
        assert!(matches!(
            err,
            Error::Decode {
                kind: DecodeErrorKind::ConstructedOctetString,
                ..
            }
        ));
    }

    #[test]
    fn test_sequence_roundtrip_with_encoder() {
        let mut buf = EncodeBuf::new();
        buf.push_sequence(|b| {
            b.push_octet_string(b"public");
            b.push_oid(&crate::oid!(1, 3, 6, 1));
            b.push_integer(-42);
        });
        let mut dec = Decoder::new(buf.finish());
        let mut seq = dec.read_sequence().unwrap();
        assert_eq!(seq.read_integer().unwrap(), -42);
        assert_eq!(seq.read_oid().unwrap(), crate::oid!(1, 3, 6, 1));
        assert_eq!(&seq.read_octet_string().unwrap()[..], b"public");
        assert!(seq.is_empty());
        assert!(dec.is_empty());
    }
}
