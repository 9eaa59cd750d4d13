//! SNMPv3 User-based Security Model (RFC 3414, RFC 3826, RFC 7860).
//!
//! The agent is always the authoritative engine, so this module only holds
//! what the authoritative side needs: key localization, HMAC, DES/AES
//! privacy, the USM parameter block, the local engine and the user table.

pub mod auth;
mod engine;
mod privacy;
mod usm;
mod user;

pub use auth::{LocalizedKey, MasterKey};
pub use engine::{
    LocalEngine, MAX_ENGINE_TIME, TIME_WINDOW, UsmReport, UsmStats, generate_engine_id,
};
pub use privacy::{PrivKey, SaltCounter};
pub use usm::UsmSecurityParams;
pub use user::{UsmUser, UsmUserTable};

/// Key extension strategy for privacy key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum KeyExtension {
    /// Standard RFC 3414 derivation.
    #[default]
    None,
    /// Blumenthal key extension (draft-blumenthal-aes-usm-04) for AES-192/256.
    Blumenthal,
}

/// Error returned when parsing a protocol name fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseProtocolError {
    input: String,
    kind: ProtocolKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProtocolKind {
    Auth,
    Priv,
}

impl std::fmt::Display for ParseProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ProtocolKind::Auth => write!(
                f,
                "unknown authentication protocol '{}'; expected one of: MD5, SHA, SHA-224, SHA-256, SHA-384, SHA-512",
                self.input
            ),
            ProtocolKind::Priv => write!(
                f,
                "unknown privacy protocol '{}'; expected one of: DES, AES, AES-128, AES-192, AES-256",
                self.input
            ),
        }
    }
}

impl std::error::Error for ParseProtocolError {}

/// Authentication protocol identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthProtocol {
    /// HMAC-MD5-96 (RFC 3414)
    Md5,
    /// HMAC-SHA-96 (RFC 3414)
    Sha1,
    /// HMAC-SHA-224 (RFC 7860)
    Sha224,
    /// HMAC-SHA-256 (RFC 7860)
    Sha256,
    /// HMAC-SHA-384 (RFC 7860)
    Sha384,
    /// HMAC-SHA-512 (RFC 7860)
    Sha512,
}

impl std::fmt::Display for AuthProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Md5 => write!(f, "MD5"),
            Self::Sha1 => write!(f, "SHA"),
            Self::Sha224 => write!(f, "SHA-224"),
            Self::Sha256 => write!(f, "SHA-256"),
            Self::Sha384 => write!(f, "SHA-384"),
            Self::Sha512 => write!(f, "SHA-512"),
        }
    }
}

impl std::str::FromStr for AuthProtocol {
    type Err = ParseProtocolError;

    /// Accepts the common spellings, including the `HMAC-*` forms used in
    /// configuration files (`HMAC-MD5-96`, `HMAC-SHA-96`, `HMAC-SHA-256`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let name = upper.strip_prefix("HMAC-").unwrap_or(&upper);
        let name = name.strip_suffix("-96").unwrap_or(name);
        match name {
            "MD5" => Ok(Self::Md5),
            "SHA" | "SHA1" | "SHA-1" => Ok(Self::Sha1),
            "SHA224" | "SHA-224" | "SHA128-224" => Ok(Self::Sha224),
            "SHA256" | "SHA-256" | "SHA192-256" => Ok(Self::Sha256),
            "SHA384" | "SHA-384" | "SHA256-384" => Ok(Self::Sha384),
            "SHA512" | "SHA-512" | "SHA384-512" => Ok(Self::Sha512),
            _ => Err(ParseProtocolError {
                input: s.to_string(),
                kind: ProtocolKind::Auth,
            }),
        }
    }
}

impl AuthProtocol {
    /// Digest output length, also the localized key length.
    pub fn digest_len(self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha1 => 20,
            Self::Sha224 => 28,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// Truncated MAC length carried in msgAuthenticationParameters.
    pub fn mac_len(self) -> usize {
        match self {
            Self::Md5 | Self::Sha1 => 12,
            Self::Sha224 => 16,
            Self::Sha256 => 24,
            Self::Sha384 => 32,
            Self::Sha512 => 48,
        }
    }
}

/// Privacy protocol identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrivProtocol {
    /// DES-CBC (RFC 3414)
    Des,
    /// AES-128-CFB (RFC 3826)
    Aes128,
    /// AES-192-CFB (draft-blumenthal-aes-usm-04)
    Aes192,
    /// AES-256-CFB (draft-blumenthal-aes-usm-04)
    Aes256,
}

impl std::fmt::Display for PrivProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Des => write!(f, "DES"),
            Self::Aes128 => write!(f, "AES"),
            Self::Aes192 => write!(f, "AES-192"),
            Self::Aes256 => write!(f, "AES-256"),
        }
    }
}

impl std::str::FromStr for PrivProtocol {
    type Err = ParseProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        match upper.as_str() {
            "DES" | "CBC-DES" | "DES-CBC" => Ok(Self::Des),
            "AES" | "AES128" | "AES-128" | "CFB128-AES-128" => Ok(Self::Aes128),
            "AES192" | "AES-192" | "CFB128-AES-192" => Ok(Self::Aes192),
            "AES256" | "AES-256" | "CFB128-AES-256" => Ok(Self::Aes256),
            _ => Err(ParseProtocolError {
                input: s.to_string(),
                kind: ProtocolKind::Priv,
            }),
        }
    }
}

impl PrivProtocol {
    /// Localized key bytes consumed by the cipher.
    pub fn key_len(self) -> usize {
        match self {
            Self::Des => 16, // 8 key + 8 pre-IV
            Self::Aes128 => 16,
            Self::Aes192 => 24,
            Self::Aes256 => 32,
        }
    }

    /// Length of msgPrivacyParameters.
    pub fn salt_len(self) -> usize {
        8
    }

    pub(crate) fn key_extension_for(self, auth_protocol: AuthProtocol) -> KeyExtension {
        if auth_protocol.digest_len() >= self.key_len() {
            return KeyExtension::None;
        }
        match self {
            Self::Aes192 | Self::Aes256 => KeyExtension::Blumenthal,
            Self::Des | Self::Aes128 => KeyExtension::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_protocol_from_str() {
        assert_eq!("md5".parse::<AuthProtocol>().unwrap(), AuthProtocol::Md5);
        assert_eq!("HMAC-MD5-96".parse::<AuthProtocol>().unwrap(), AuthProtocol::Md5);
        assert_eq!("SHA".parse::<AuthProtocol>().unwrap(), AuthProtocol::Sha1);
        assert_eq!("hmac-sha-96".parse::<AuthProtocol>().unwrap(), AuthProtocol::Sha1);
        assert_eq!("SHA-256".parse::<AuthProtocol>().unwrap(), AuthProtocol::Sha256);
        assert_eq!("HMAC192-SHA256".parse::<AuthProtocol>().ok(), None);
        assert!("invalid".parse::<AuthProtocol>().is_err());
    }

    #[test]
    fn test_priv_protocol_from_str() {
        assert_eq!("des".parse::<PrivProtocol>().unwrap(), PrivProtocol::Des);
        assert_eq!("AES".parse::<PrivProtocol>().unwrap(), PrivProtocol::Aes128);
        assert_eq!("aes-256".parse::<PrivProtocol>().unwrap(), PrivProtocol::Aes256);
        let err = "3DES".parse::<PrivProtocol>().unwrap_err();
        assert!(err.to_string().contains("privacy protocol"));
    }

    #[test]
    fn test_key_extension_selection() {
        assert_eq!(
            PrivProtocol::Aes256.key_extension_for(AuthProtocol::Sha1),
            KeyExtension::Blumenthal
        );
        assert_eq!(
            PrivProtocol::Aes256.key_extension_for(AuthProtocol::Sha256),
            KeyExtension::None
        );
        assert_eq!(
            PrivProtocol::Des.key_extension_for(AuthProtocol::Md5),
            KeyExtension::None
        );
    }
}
