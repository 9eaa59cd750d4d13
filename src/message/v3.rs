//! SNMPv3 message format (RFC 3412 6).

use bytes::Bytes;

use super::SecurityLevel;
use crate::ber::{Decoder, EncodeBuf, tag};
use crate::error::{DecodeErrorKind, Error, Result};
use crate::pdu::Pdu;
use crate::v3::UsmSecurityParams;
use crate::version::Version;

/// msgSecurityModel value for USM.
pub const USM_SECURITY_MODEL: i32 = 3;

/// Smallest msgMaxSize a peer may advertise (RFC 3412).
const MIN_MSG_MAX_SIZE: i32 = 484;

const FLAG_AUTH: u8 = 0x01;
const FLAG_PRIV: u8 = 0x02;
const FLAG_REPORTABLE: u8 = 0x04;

/// msgFlags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgFlags {
    pub level: SecurityLevel,
    pub reportable: bool,
}

impl MsgFlags {
    pub fn new(level: SecurityLevel, reportable: bool) -> Self {
        Self { level, reportable }
    }

    fn to_byte(self) -> u8 {
        let mut byte = 0;
        if self.level.requires_auth() {
            byte |= FLAG_AUTH;
        }
        if self.level.requires_priv() {
            byte |= FLAG_PRIV;
        }
        if self.reportable {
            byte |= FLAG_REPORTABLE;
        }
        byte
    }

    fn from_byte(byte: u8, offset: usize) -> Result<Self> {
        let level = match (byte & FLAG_AUTH != 0, byte & FLAG_PRIV != 0) {
            (false, false) => SecurityLevel::NoAuthNoPriv,
            (true, false) => SecurityLevel::AuthNoPriv,
            (true, true) => SecurityLevel::AuthPriv,
            (false, true) => return Err(Error::decode(offset, DecodeErrorKind::InvalidMsgFlags)),
        };
        Ok(Self {
            level,
            reportable: byte & FLAG_REPORTABLE != 0,
        })
    }
}

/// msgGlobalData.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderData {
    pub msg_id: i32,
    pub max_size: i32,
    pub flags: MsgFlags,
    pub security_model: i32,
}

impl HeaderData {
    pub fn new(msg_id: i32, max_size: i32, flags: MsgFlags) -> Self {
        Self {
            msg_id,
            max_size,
            flags,
            security_model: USM_SECURITY_MODEL,
        }
    }

    fn encode(&self, buf: &mut EncodeBuf) {
        buf.push_sequence(|buf| {
            buf.push_integer(self.security_model);
            buf.push_octet_string(&[self.flags.to_byte()]);
            buf.push_integer(self.max_size);
            buf.push_integer(self.msg_id);
        });
    }

    fn decode(decoder: &mut Decoder) -> Result<Self> {
        let mut seq = decoder.read_sequence()?;
        let msg_id = seq.read_integer()?;
        let offset = seq.offset();
        let max_size = seq.read_integer()?;
        if max_size < MIN_MSG_MAX_SIZE {
            return Err(Error::decode(
                offset,
                DecodeErrorKind::MsgMaxSizeTooSmall {
                    value: max_size,
                    minimum: MIN_MSG_MAX_SIZE,
                },
            ));
        }
        let offset = seq.offset();
        let flags = seq.read_octet_string()?;
        let flags = MsgFlags::from_byte(flags.first().copied().unwrap_or(0), offset)?;
        let offset = seq.offset();
        let security_model = seq.read_integer()?;
        if security_model != USM_SECURITY_MODEL {
            return Err(Error::decode(
                offset,
                DecodeErrorKind::UnknownSecurityModel(security_model),
            ));
        }
        Ok(Self {
            msg_id,
            max_size,
            flags,
            security_model,
        })
    }
}

/// ScopedPDU.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedPdu {
    pub context_engine_id: Bytes,
    pub context_name: Bytes,
    pub pdu: Pdu,
}

impl ScopedPdu {
    pub fn new(context_engine_id: Bytes, context_name: Bytes, pdu: Pdu) -> Self {
        Self {
            context_engine_id,
            context_name,
            pdu,
        }
    }

    fn encode_into(&self, buf: &mut EncodeBuf) {
        buf.push_sequence(|buf| {
            self.pdu.encode(buf);
            buf.push_octet_string(&self.context_name);
            buf.push_octet_string(&self.context_engine_id);
        });
    }

    /// Serialize alone, as the plaintext input to encryption.
    pub fn encode(&self) -> Bytes {
        let mut buf = EncodeBuf::new();
        self.encode_into(&mut buf);
        buf.finish()
    }

    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let mut seq = decoder.read_sequence()?;
        let context_engine_id = seq.read_octet_string()?;
        let context_name = seq.read_octet_string()?;
        let pdu = Pdu::decode(&mut seq)?;
        Ok(Self {
            context_engine_id,
            context_name,
            pdu,
        })
    }
}

/// msgData: plaintext or encrypted scoped PDU.
#[derive(Debug, Clone, PartialEq)]
pub enum ScopedPduData {
    Plaintext(ScopedPdu),
    Encrypted(Bytes),
}

/// A decoded v3 message.
#[derive(Debug, Clone)]
pub struct V3Message {
    pub header: HeaderData,
    pub security: UsmSecurityParams,
    pub data: ScopedPduData,
    /// The complete datagram, kept for HMAC verification.
    pub raw: Bytes,
}

impl V3Message {
    /// Decode after msgVersion has been consumed from `seq`.
    pub(crate) fn decode_from_sequence(seq: &mut Decoder, raw: Bytes) -> Result<Self> {
        let header = HeaderData::decode(seq)?;

        let offset = seq.offset();
        let tag = seq.read_tag()?;
        if tag != tag::universal::OCTET_STRING {
            return Err(Error::decode(
                offset,
                DecodeErrorKind::UnexpectedTag {
                    expected: tag::universal::OCTET_STRING,
                    actual: tag,
                },
            ));
        }
        let len = seq.read_length()?;
        let mut params = seq.sub_decoder(len)?;
        let security = UsmSecurityParams::decode(&mut params)?;

        let data = match seq.peek_tag() {
            Some(tag::universal::OCTET_STRING) => {
                if !header.flags.level.requires_priv() {
                    return Err(Error::decode(
                        seq.offset(),
                        DecodeErrorKind::UnexpectedTag {
                            expected: tag::universal::SEQUENCE,
                            actual: tag::universal::OCTET_STRING,
                        },
                    ));
                }
                ScopedPduData::Encrypted(seq.read_octet_string()?)
            }
            _ => ScopedPduData::Plaintext(ScopedPdu::decode(seq)?),
        };

        Ok(Self {
            header,
            security,
            data,
            raw,
        })
    }

    /// Encode a message.
    ///
    /// Returns the datagram and, when the MAC placeholder is non-empty, the
    /// absolute offset of msgAuthenticationParameters for signing.
    pub fn encode(
        header: &HeaderData,
        security: &UsmSecurityParams,
        data: &ScopedPduData,
    ) -> (Vec<u8>, Option<usize>) {
        let (params, inner_offset) = security.encode();
        let mut buf = EncodeBuf::new();
        let mut mark = 0;
        buf.push_sequence(|buf| {
            match data {
                ScopedPduData::Plaintext(scoped) => scoped.encode_into(buf),
                ScopedPduData::Encrypted(ciphertext) => buf.push_octet_string(ciphertext),
            }
            buf.push_bytes(&params);
            mark = buf.len();
            buf.push_length(params.len());
            buf.push_tag(tag::universal::OCTET_STRING);
            header.encode(buf);
            buf.push_integer(Version::V3.as_i32());
        });
        let total = buf.len();
        let auth_offset =
            (!security.auth_params.is_empty()).then_some(total - mark + inner_offset);
        (buf.finish_vec(), auth_offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::oid;
    use crate::pdu::PduType;
    use crate::varbind::VarBind;

    fn sample(level: SecurityLevel, mac_len: usize) -> (Vec<u8>, Option<usize>) {
        let header = HeaderData::new(1001, 65507, MsgFlags::new(level, true));
        let security = UsmSecurityParams::new(
            Bytes::from_static(b"\x80\x00\x1f\x88\x05engine"),
            1,
            42,
            Bytes::from_static(b"alice"),
            mac_len,
            Bytes::new(),
        );
        let scoped = ScopedPdu::new(
            Bytes::from_static(b"\x80\x00\x1f\x88\x05engine"),
            Bytes::new(),
            Pdu::new(
                PduType::GetRequest,
                5,
                vec![VarBind::null(oid!(1, 3, 6, 1, 2, 1, 1, 3, 0))],
            ),
        );
        V3Message::encode(&header, &security, &ScopedPduData::Plaintext(scoped))
    }

    #[test]
    fn test_roundtrip_and_auth_offset() {
        let (bytes, offset) = sample(SecurityLevel::AuthNoPriv, 12);
        let offset = offset.unwrap();
        assert_eq!(&bytes[offset..offset + 12], &[0u8; 12]);

        let Message::V3(msg) = Message::decode(Bytes::from(bytes)).unwrap() else {
            panic!("expected v3");
        };
        assert_eq!(msg.header.msg_id, 1001);
        assert_eq!(msg.header.flags.level, SecurityLevel::AuthNoPriv);
        assert!(msg.header.flags.reportable);
        assert_eq!(msg.security.auth_params_offset, Some(offset));
        let ScopedPduData::Plaintext(scoped) = msg.data else {
            panic!("expected plaintext");
        };
        assert_eq!(scoped.pdu.request_id, 5);
    }

    #[test]
    fn test_no_auth_has_no_offset() {
        let (_, offset) = sample(SecurityLevel::NoAuthNoPriv, 0);
        assert!(offset.is_none());
    }

    #[test]
    fn test_priv_without_auth_rejected() {
        assert!(MsgFlags::from_byte(FLAG_PRIV, 0).is_err());
        let flags = MsgFlags::from_byte(FLAG_AUTH | FLAG_PRIV, 0).unwrap();
        assert_eq!(flags.level, SecurityLevel::AuthPriv);
        assert!(!flags.reportable);
    }
}
