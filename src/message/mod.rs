//! SNMP message framing.
//!
//! v1 and v2c share the community layout; v3 carries a header, security
//! parameters and a (possibly encrypted) scoped PDU. [`Message::decode`]
//! peeks the version and dispatches.

mod community;
mod v3;

pub use community::CommunityMessage;
pub use v3::{HeaderData, MsgFlags, ScopedPdu, ScopedPduData, V3Message, USM_SECURITY_MODEL};

use bytes::Bytes;

use crate::ber::Decoder;
use crate::error::{DecodeErrorKind, Error, Result};
use crate::version::Version;

/// SNMPv3 security level, ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum SecurityLevel {
    #[default]
    NoAuthNoPriv,
    AuthNoPriv,
    AuthPriv,
}

impl SecurityLevel {
    /// VACM securityLevel value (RFC 3415).
    pub fn as_i32(self) -> i32 {
        match self {
            Self::NoAuthNoPriv => 1,
            Self::AuthNoPriv => 2,
            Self::AuthPriv => 3,
        }
    }

    pub fn requires_auth(self) -> bool {
        self >= Self::AuthNoPriv
    }

    pub fn requires_priv(self) -> bool {
        self == Self::AuthPriv
    }
}

impl std::fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoAuthNoPriv => write!(f, "noAuthNoPriv"),
            Self::AuthNoPriv => write!(f, "authNoPriv"),
            Self::AuthPriv => write!(f, "authPriv"),
        }
    }
}

impl std::str::FromStr for SecurityLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['_', '-'], "").as_str() {
            "noauthnopriv" | "none" | "1" => Ok(Self::NoAuthNoPriv),
            "authnopriv" | "auth" | "2" => Ok(Self::AuthNoPriv),
            "authpriv" | "priv" | "3" => Ok(Self::AuthPriv),
            _ => Err(format!("unknown security level '{}'", s)),
        }
    }
}

/// An inbound message of any version.
#[derive(Debug, Clone)]
pub enum Message {
    Community(CommunityMessage),
    V3(V3Message),
}

impl Message {
    /// Decode a datagram.
    pub fn decode(data: Bytes) -> Result<Self> {
        let mut outer = Decoder::new(data.clone());
        let mut seq = outer.read_sequence()?;
        let offset = seq.offset();
        let raw_version = seq.read_integer()?;
        let version = Version::from_i32(raw_version)
            .ok_or_else(|| Error::decode(offset, DecodeErrorKind::UnknownVersion(raw_version)))?;

        match version {
            Version::V3 => Ok(Message::V3(V3Message::decode_from_sequence(&mut seq, data)?)),
            _ => Ok(Message::Community(CommunityMessage::decode_from_sequence(
                &mut seq, version,
            )?)),
        }
    }

    pub fn version(&self) -> Version {
        match self {
            Message::Community(m) => m.version,
            Message::V3(_) => Version::V3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_level_ordering_and_parse() {
        assert!(SecurityLevel::AuthPriv > SecurityLevel::AuthNoPriv);
        assert!(SecurityLevel::AuthNoPriv > SecurityLevel::NoAuthNoPriv);
        assert_eq!("authPriv".parse::<SecurityLevel>().unwrap(), SecurityLevel::AuthPriv);
        assert_eq!("AUTH_NO_PRIV".parse::<SecurityLevel>().unwrap(), SecurityLevel::AuthNoPriv);
        assert_eq!("noAuthNoPriv".parse::<SecurityLevel>().unwrap(), SecurityLevel::NoAuthNoPriv);
        assert!("bogus".parse::<SecurityLevel>().is_err());
    }

    #[test]
    fn test_unknown_version_rejected() {
        let data = Bytes::from_static(&[0x30, 0x03, 0x02, 0x01, 0x07]);
        let err = Message::decode(data).unwrap_err();
        assert!(matches!(
            err,
            Error::Decode {
                kind: DecodeErrorKind::UnknownVersion(7),
                ..
            }
        ));
    }
}
