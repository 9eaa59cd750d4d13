//! UsmSecurityParameters (RFC 3414 2.4).

use bytes::Bytes;

use crate::ber::{Decoder, EncodeBuf, tag};
use crate::error::{DecodeErrorKind, Error, Result};

/// Decoded USM security parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsmSecurityParams {
    pub engine_id: Bytes,
    pub engine_boots: u32,
    pub engine_time: u32,
    pub username: Bytes,
    pub auth_params: Bytes,
    pub priv_params: Bytes,
    /// Absolute offset of the auth params content within the whole message,
    /// filled in by decoding.
    pub auth_params_offset: Option<usize>,
}

impl UsmSecurityParams {
    /// Parameters for an outgoing message with a zeroed MAC placeholder.
    pub fn new(
        engine_id: Bytes,
        engine_boots: u32,
        engine_time: u32,
        username: Bytes,
        mac_len: usize,
        priv_params: Bytes,
    ) -> Self {
        Self {
            engine_id,
            engine_boots,
            engine_time,
            username,
            auth_params: Bytes::from(vec![0u8; mac_len]),
            priv_params,
            auth_params_offset: None,
        }
    }

    /// Encode into standalone bytes.
    ///
    /// Also returns the offset of the auth params content within them.
    pub fn encode(&self) -> (Bytes, usize) {
        let mut buf = EncodeBuf::with_capacity(128);
        let mut auth_mark = 0;
        buf.push_sequence(|buf| {
            buf.push_octet_string(&self.priv_params);
            buf.push_bytes(&self.auth_params);
            auth_mark = buf.len();
            buf.push_length(self.auth_params.len());
            buf.push_tag(tag::universal::OCTET_STRING);
            buf.push_octet_string(&self.username);
            buf.push_integer(self.engine_time as i32);
            buf.push_integer(self.engine_boots as i32);
            buf.push_octet_string(&self.engine_id);
        });
        let total = buf.len();
        (buf.finish(), total - auth_mark)
    }

    /// Decode from a decoder bounded to the msgSecurityParameters content.
    ///
    /// The decoder's offsets must be absolute within the whole message so
    /// that `auth_params_offset` can be used for HMAC verification.
    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let mut seq = decoder.read_sequence()?;
        let engine_id = seq.read_octet_string()?;
        let engine_boots = read_non_negative(&mut seq)?;
        let engine_time = read_non_negative(&mut seq)?;
        let username = seq.read_octet_string()?;

        let tag = seq.read_tag()?;
        if tag != tag::universal::OCTET_STRING {
            return Err(Error::decode(
                seq.offset() - 1,
                DecodeErrorKind::UnexpectedTag {
                    expected: tag::universal::OCTET_STRING,
                    actual: tag,
                },
            ));
        }
        let len = seq.read_length()?;
        let auth_params_offset = seq.offset();
        let auth_params = seq.read_bytes(len)?;
        let priv_params = seq.read_octet_string()?;

        Ok(Self {
            engine_id,
            engine_boots,
            engine_time,
            username,
            auth_params,
            priv_params,
            auth_params_offset: Some(auth_params_offset),
        })
    }
}

fn read_non_negative(decoder: &mut Decoder) -> Result<u32> {
    let offset = decoder.offset();
    let value = decoder.read_integer()?;
    u32::try_from(value).map_err(|_| Error::decode(offset, DecodeErrorKind::IntegerOverflow))
}
