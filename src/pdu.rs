//! Protocol data units.
//!
//! Every PDU the agent handles shares the RFC 3416 layout
//! `request-id, error-status, error-index, variable-bindings`. GETBULK
//! reuses the two middle fields for non-repeaters and max-repetitions.
//! The v1 Trap-PDU has its own layout and is never accepted inbound.

use crate::ber::{Decoder, EncodeBuf, tag};
use crate::error::{DecodeErrorKind, Error, ErrorStatus, Result};
use crate::varbind::{VarBind, decode_varbind_list, encode_varbind_list};

/// PDU type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PduType {
    GetRequest = tag::pdu::GET_REQUEST,
    GetNextRequest = tag::pdu::GET_NEXT_REQUEST,
    Response = tag::pdu::RESPONSE,
    SetRequest = tag::pdu::SET_REQUEST,
    GetBulkRequest = tag::pdu::GET_BULK_REQUEST,
    InformRequest = tag::pdu::INFORM_REQUEST,
    TrapV2 = tag::pdu::TRAP_V2,
    Report = tag::pdu::REPORT,
}

impl PduType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            tag::pdu::GET_REQUEST => Some(Self::GetRequest),
            tag::pdu::GET_NEXT_REQUEST => Some(Self::GetNextRequest),
            tag::pdu::RESPONSE => Some(Self::Response),
            tag::pdu::SET_REQUEST => Some(Self::SetRequest),
            tag::pdu::GET_BULK_REQUEST => Some(Self::GetBulkRequest),
            tag::pdu::INFORM_REQUEST => Some(Self::InformRequest),
            tag::pdu::TRAP_V2 => Some(Self::TrapV2),
            tag::pdu::REPORT => Some(Self::Report),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Confirmed-class PDUs expect a Response.
    pub fn is_confirmed(self) -> bool {
        matches!(
            self,
            Self::GetRequest
                | Self::GetNextRequest
                | Self::GetBulkRequest
                | Self::SetRequest
                | Self::InformRequest
        )
    }
}

impl std::fmt::Display for PduType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::GetRequest => "GetRequest",
            Self::GetNextRequest => "GetNextRequest",
            Self::Response => "Response",
            Self::SetRequest => "SetRequest",
            Self::GetBulkRequest => "GetBulkRequest",
            Self::InformRequest => "InformRequest",
            Self::TrapV2 => "SNMPv2-Trap",
            Self::Report => "Report",
        };
        f.write_str(name)
    }
}

/// A request, response, notification or report PDU.
#[derive(Debug, Clone, PartialEq)]
pub struct Pdu {
    pub pdu_type: PduType,
    pub request_id: i32,
    /// Error status, or non-repeaters for GETBULK.
    pub error_status: i32,
    /// 1-based error index, or max-repetitions for GETBULK.
    pub error_index: i32,
    pub varbinds: Vec<VarBind>,
}

impl Pdu {
    /// A PDU with zeroed error fields.
    pub fn new(pdu_type: PduType, request_id: i32, varbinds: Vec<VarBind>) -> Self {
        Self {
            pdu_type,
            request_id,
            error_status: 0,
            error_index: 0,
            varbinds,
        }
    }

    /// A GETBULK request.
    pub fn get_bulk(
        request_id: i32,
        non_repeaters: i32,
        max_repetitions: i32,
        varbinds: Vec<VarBind>,
    ) -> Self {
        Self {
            pdu_type: PduType::GetBulkRequest,
            request_id,
            error_status: non_repeaters,
            error_index: max_repetitions,
            varbinds,
        }
    }

    /// An SNMPv2-Trap carrying the given bindings.
    pub fn trap_v2(request_id: i32, varbinds: Vec<VarBind>) -> Self {
        Self::new(PduType::TrapV2, request_id, varbinds)
    }

    /// A Response echoing this PDU's request id with new bindings.
    pub fn response(&self, varbinds: Vec<VarBind>) -> Self {
        Self::new(PduType::Response, self.request_id, varbinds)
    }

    /// An error Response echoing the request's bindings.
    pub fn error_response(&self, status: ErrorStatus, index: i32) -> Self {
        Self {
            pdu_type: PduType::Response,
            request_id: self.request_id,
            error_status: status.as_i32(),
            error_index: index,
            varbinds: self.varbinds.clone(),
        }
    }

    /// GETBULK non-repeaters, clamped to the binding count.
    pub fn non_repeaters(&self) -> usize {
        (self.error_status.max(0) as usize).min(self.varbinds.len())
    }

    /// GETBULK max-repetitions, negative values treated as zero.
    pub fn max_repetitions(&self) -> usize {
        self.error_index.max(0) as usize
    }

    pub fn error_status(&self) -> ErrorStatus {
        ErrorStatus::from_i32(self.error_status)
    }

    pub fn encode(&self, buf: &mut EncodeBuf) {
        buf.push_constructed(self.pdu_type.tag(), |buf| {
            encode_varbind_list(buf, &self.varbinds);
            buf.push_integer(self.error_index);
            buf.push_integer(self.error_status);
            buf.push_integer(self.request_id);
        });
    }

    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let offset = decoder.offset();
        let tag = decoder.read_tag()?;
        let pdu_type = PduType::from_tag(tag)
            .ok_or_else(|| Error::decode(offset, DecodeErrorKind::UnknownPduType(tag)))?;

        let len = decoder.read_length()?;
        let mut body = decoder.sub_decoder(len)?;
        let request_id = body.read_integer()?;
        let error_status = body.read_integer()?;
        let error_index = body.read_integer()?;
        let varbinds = decode_varbind_list(&mut body)?;

        Ok(Self {
            pdu_type,
            request_id,
            error_status,
            error_index,
            varbinds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid;
    use crate::value::Value;

    #[test]
    fn test_pdu_roundtrip() {
        let pdu = Pdu::new(
            PduType::SetRequest,
            77,
            vec![VarBind::new(oid!(1, 3, 6, 1, 4, 1, 99, 1), Value::Integer(0))],
        );
        let mut buf = EncodeBuf::new();
        pdu.encode(&mut buf);
        let bytes = buf.finish();
        assert_eq!(bytes[0], 0xA3);
        assert_eq!(Pdu::decode(&mut Decoder::new(bytes)).unwrap(), pdu);
    }

    #[test]
    fn test_v1_trap_rejected() {
        let err = Pdu::decode(&mut Decoder::from_slice(&[0xA4, 0x00])).unwrap_err();
        assert!(matches!(
            err,
            Error::Decode {
                kind: DecodeErrorKind::UnknownPduType(0xA4),
                ..
            }
        ));
    }

    #[test]
    fn test_bulk_parameters_clamped() {
        let pdu = Pdu::get_bulk(1, 5, -3, vec![VarBind::null(oid!(1, 3))]);
        assert_eq!(pdu.non_repeaters(), 1);
        assert_eq!(pdu.max_repetitions(), 0);
    }

    #[test]
    fn test_error_response_keeps_bindings() {
        let request = Pdu::new(PduType::GetRequest, 9, vec![VarBind::null(oid!(1, 3, 6))]);
        let response = request.error_response(ErrorStatus::NoAccess, 1);
        assert_eq!(response.pdu_type, PduType::Response);
        assert_eq!(response.error_status(), ErrorStatus::NoAccess);
        assert_eq!(response.varbinds, request.varbinds);
    }
}
