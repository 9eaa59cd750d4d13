//! Key localization and message authentication (RFC 3414 A.2, RFC 7860).

use digest::Digest;
use hmac::{Hmac, Mac};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::AuthProtocol;

/// Bytes of repeated password hashed when deriving a master key.
const EXPANSION_LEN: usize = 1_048_576;

macro_rules! with_digest {
    ($protocol:expr, $d:ident => $body:expr) => {
        match $protocol {
            AuthProtocol::Md5 => {
                type $d = md5::Md5;
                $body
            }
            AuthProtocol::Sha1 => {
                type $d = sha1::Sha1;
                $body
            }
            AuthProtocol::Sha224 => {
                type $d = sha2::Sha224;
                $body
            }
            AuthProtocol::Sha256 => {
                type $d = sha2::Sha256;
                $body
            }
            AuthProtocol::Sha384 => {
                type $d = sha2::Sha384;
                $body
            }
            AuthProtocol::Sha512 => {
                type $d = sha2::Sha512;
                $body
            }
        }
    };
}

/// Hash the concatenation of `parts` with the protocol's digest.
pub(crate) fn hash(protocol: AuthProtocol, parts: &[&[u8]]) -> Vec<u8> {
    with_digest!(protocol, D => {
        let mut hasher = D::new();
        for part in parts {
            hasher.update(part);
        }
        hasher.finalize().to_vec()
    })
}

/// Non-localized key derived from a passphrase (Ku).
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    #[zeroize(skip)]
    protocol: AuthProtocol,
    key: Vec<u8>,
}

impl MasterKey {
    /// Password-to-key algorithm: hash one megabyte of the repeated password.
    ///
    /// An empty password yields an all-zero key of digest length; callers
    /// reject empty passphrases before getting here.
    pub fn from_password(protocol: AuthProtocol, password: &[u8]) -> Self {
        if password.is_empty() {
            return Self {
                protocol,
                key: vec![0; protocol.digest_len()],
            };
        }
        let key = with_digest!(protocol, D => {
            let mut hasher = D::new();
            let mut block = [0u8; 64];
            let mut index = 0;
            for _ in 0..EXPANSION_LEN / 64 {
                for byte in block.iter_mut() {
                    *byte = password[index % password.len()];
                    index += 1;
                }
                hasher.update(block);
            }
            block.zeroize();
            hasher.finalize().to_vec()
        });
        Self { protocol, key }
    }

    pub fn protocol(&self) -> AuthProtocol {
        self.protocol
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    /// Localize to an engine: `H(Ku || engineID || Ku)`.
    pub fn localize(&self, engine_id: &[u8]) -> LocalizedKey {
        LocalizedKey {
            protocol: self.protocol,
            key: hash(self.protocol, &[&self.key, engine_id, &self.key]),
        }
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("protocol", &self.protocol)
            .finish_non_exhaustive()
    }
}

/// Key localized to one authoritative engine (Kul).
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct LocalizedKey {
    #[zeroize(skip)]
    protocol: AuthProtocol,
    key: Vec<u8>,
}

impl LocalizedKey {
    /// Derive from a passphrase and engine id in one step.
    pub fn from_password(protocol: AuthProtocol, password: &[u8], engine_id: &[u8]) -> Self {
        MasterKey::from_password(protocol, password).localize(engine_id)
    }

    pub fn protocol(&self) -> AuthProtocol {
        self.protocol
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    /// Full-length HMAC over `data`, truncated to the protocol's MAC length.
    pub fn compute_hmac(&self, data: &[u8]) -> Vec<u8> {
        let mut mac = with_digest!(self.protocol, D => {
            let mut mac = <Hmac<D> as Mac>::new_from_slice(&self.key)
                .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        });
        mac.truncate(self.protocol.mac_len());
        mac
    }

    /// Constant-time comparison of a received MAC against `data`.
    pub fn verify_hmac(&self, data: &[u8], received: &[u8]) -> bool {
        if received.len() != self.protocol.mac_len() {
            return false;
        }
        self.compute_hmac(data).ct_eq(received).into()
    }

    /// Sign a whole message in place; `offset` locates the zeroed MAC field.
    pub fn sign_in_place(&self, message: &mut [u8], offset: usize) {
        let mac = self.compute_hmac(message);
        message[offset..offset + mac.len()].copy_from_slice(&mac);
    }

    /// Verify a whole message whose MAC sits at `offset`.
    pub fn verify_message(&self, message: &[u8], offset: usize) -> bool {
        let len = self.protocol.mac_len();
        let Some(received) = message.get(offset..offset + len) else {
            return false;
        };
        let mut zeroed = message.to_vec();
        zeroed[offset..offset + len].fill(0);
        self.verify_hmac(&zeroed, received)
    }
}

impl std::fmt::Debug for LocalizedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalizedKey")
            .field("protocol", &self.protocol)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENGINE_ID: [u8; 12] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2];

    #[test]
    fn test_rfc3414_md5_vector() {
        let master = MasterKey::from_password(AuthProtocol::Md5, b"maplesyrup");
        assert_eq!(
            hex::encode(master.as_bytes()),
            "9faf3283884e92834ebc9847d8edd963"
        );
        let local = master.localize(&ENGINE_ID);
        assert_eq!(
            hex::encode(local.as_bytes()),
            "526f5eed9fcce26f8964c2930787d82b"
        );
    }

    #[test]
    fn test_rfc3414_sha1_vector() {
        let local = LocalizedKey::from_password(AuthProtocol::Sha1, b"maplesyrup", &ENGINE_ID);
        assert_eq!(
            hex::encode(local.as_bytes()),
            "6695febc9288e36282235fc7151f128497b38f3f"
        );
    }

    #[test]
    fn test_sign_and_verify_message() {
        let key = LocalizedKey::from_password(AuthProtocol::Sha256, b"authpass1", &ENGINE_ID);
        let mut message = vec![0xAAu8; 80];
        message[20..44].fill(0);
        key.sign_in_place(&mut message, 20);
        assert!(key.verify_message(&message, 20));

        message[70] ^= 1;
        assert!(!key.verify_message(&message, 20));
    }

    #[test]
    fn test_mac_length_enforced() {
        let key = LocalizedKey::from_password(AuthProtocol::Md5, b"authpass1", &ENGINE_ID);
        assert!(!key.verify_hmac(b"data", &[0u8; 11]));
    }
}
