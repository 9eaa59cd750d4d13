//! Request context passed to every handler call.

use std::net::SocketAddr;

use bytes::Bytes;

use crate::message::SecurityLevel;
use crate::pdu::PduType;
use crate::version::Version;

use super::SecurityModel;

/// Who is asking, and under which access rights.
///
/// Built by the agent after authentication and VACM resolution. Handlers may
/// use it for logging or additional checks; the agent has already enforced
/// the read and write views.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub source: SocketAddr,
    pub version: Version,
    pub security_model: SecurityModel,
    /// Community for v1/v2c, user name for v3.
    pub security_name: Bytes,
    pub security_level: SecurityLevel,
    pub context_name: Bytes,
    pub request_id: i32,
    pub pdu_type: PduType,
    pub group_name: Option<Bytes>,
    pub read_view: Option<Bytes>,
    pub write_view: Option<Bytes>,
    /// Agent-allocated id shared by every phase of one SET PDU.
    pub transaction_id: u64,
}

#[cfg(test)]
impl RequestContext {
    pub(crate) fn test_context() -> Self {
        Self::test_transaction(1)
    }

    pub(crate) fn test_transaction(transaction_id: u64) -> Self {
        Self {
            source: "127.0.0.1:40000".parse().unwrap(),
            version: Version::V2c,
            security_model: SecurityModel::V2c,
            security_name: Bytes::from_static(b"private"),
            security_level: SecurityLevel::NoAuthNoPriv,
            context_name: Bytes::new(),
            request_id: 1,
            pdu_type: PduType::SetRequest,
            group_name: None,
            read_view: None,
            write_view: None,
            transaction_id,
        }
    }
}
