//! Privacy: DES-CBC (RFC 3414 8) and AES-CFB (RFC 3826).

use std::sync::atomic::{AtomicU64, Ordering};

use aes::{Aes128, Aes192, Aes256};
use bytes::Bytes;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use cfb_mode::cipher::AsyncStreamCipher;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::auth::{MasterKey, hash};
use super::{AuthProtocol, KeyExtension, PrivProtocol};
use crate::error::{CryptoErrorKind, Error, Result};

const DES_BLOCK: usize = 8;

/// Monotonic salt source shared by every encryption the engine performs.
#[derive(Debug)]
pub struct SaltCounter(AtomicU64);

impl SaltCounter {
    /// Start from a random value so restarts do not reuse salts.
    pub fn new() -> Self {
        let mut seed = [0u8; 8];
        if getrandom::fill(&mut seed).is_err() {
            tracing::warn!(target: "snmp_gateway::v3", "random salt seed unavailable, starting at zero");
        }
        Self(AtomicU64::new(u64::from_be_bytes(seed)))
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for SaltCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Localized privacy key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PrivKey {
    #[zeroize(skip)]
    protocol: PrivProtocol,
    key: Vec<u8>,
}

impl PrivKey {
    /// Derive from a passphrase, hashed with the user's auth protocol and
    /// localized to `engine_id`. Extended when the digest is too short.
    pub fn from_password(
        auth_protocol: AuthProtocol,
        protocol: PrivProtocol,
        password: &[u8],
        engine_id: &[u8],
    ) -> Self {
        let localized = MasterKey::from_password(auth_protocol, password).localize(engine_id);
        let mut key = localized.as_bytes().to_vec();

        if protocol.key_extension_for(auth_protocol) == KeyExtension::Blumenthal {
            while key.len() < protocol.key_len() {
                let next = hash(auth_protocol, &[&key]);
                key.extend_from_slice(&next);
            }
        }
        key.truncate(protocol.key_len());
        Self { protocol, key }
    }

    pub fn protocol(&self) -> PrivProtocol {
        self.protocol
    }

    /// Encrypt a serialized scoped PDU.
    ///
    /// Returns the ciphertext and the msgPrivacyParameters (salt).
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        engine_boots: u32,
        engine_time: u32,
        salt: &SaltCounter,
    ) -> Result<(Bytes, Bytes)> {
        let counter = salt.next();
        match self.protocol {
            PrivProtocol::Des => {
                let mut salt_bytes = [0u8; 8];
                salt_bytes[..4].copy_from_slice(&engine_boots.to_be_bytes());
                salt_bytes[4..].copy_from_slice(&(counter as u32).to_be_bytes());
                let iv = self.des_iv(&salt_bytes);

                let padded_len = plaintext.len().div_ceil(DES_BLOCK) * DES_BLOCK;
                let mut buf = vec![0u8; padded_len];
                buf[..plaintext.len()].copy_from_slice(plaintext);
                let encryptor = cbc::Encryptor::<des::Des>::new_from_slices(&self.key[..8], &iv)
                    .map_err(|_| Error::encrypt(None, CryptoErrorKind::InvalidKeyLength))?;
                encryptor
                    .encrypt_padded_mut::<NoPadding>(&mut buf, padded_len)
                    .map_err(|_| {
                        Error::encrypt(
                            None,
                            CryptoErrorKind::InvalidCiphertextLength {
                                length: padded_len,
                                block_size: DES_BLOCK,
                            },
                        )
                    })?;
                Ok((Bytes::from(buf), Bytes::copy_from_slice(&salt_bytes)))
            }
            PrivProtocol::Aes128 | PrivProtocol::Aes192 | PrivProtocol::Aes256 => {
                let salt_bytes = counter.to_be_bytes();
                let iv = aes_iv(engine_boots, engine_time, &salt_bytes);
                let mut buf = plaintext.to_vec();
                self.aes_apply(&iv, &mut buf, true)
                    .map_err(|kind| Error::encrypt(None, kind))?;
                Ok((Bytes::from(buf), Bytes::copy_from_slice(&salt_bytes)))
            }
        }
    }

    /// Decrypt an encryptedPDU.
    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        engine_boots: u32,
        engine_time: u32,
        priv_params: &[u8],
    ) -> Result<Bytes> {
        if priv_params.len() != self.protocol.salt_len() {
            return Err(Error::decrypt(
                None,
                CryptoErrorKind::InvalidPrivParamsLength {
                    expected: self.protocol.salt_len(),
                    actual: priv_params.len(),
                },
            ));
        }

        match self.protocol {
            PrivProtocol::Des => {
                if ciphertext.len() % DES_BLOCK != 0 {
                    return Err(Error::decrypt(
                        None,
                        CryptoErrorKind::InvalidCiphertextLength {
                            length: ciphertext.len(),
                            block_size: DES_BLOCK,
                        },
                    ));
                }
                let iv = self.des_iv(priv_params);
                let mut buf = ciphertext.to_vec();
                let decryptor = cbc::Decryptor::<des::Des>::new_from_slices(&self.key[..8], &iv)
                    .map_err(|_| Error::decrypt(None, CryptoErrorKind::InvalidKeyLength))?;
                decryptor
                    .decrypt_padded_mut::<NoPadding>(&mut buf)
                    .map_err(|_| {
                        Error::decrypt(
                            None,
                            CryptoErrorKind::InvalidCiphertextLength {
                                length: ciphertext.len(),
                                block_size: DES_BLOCK,
                            },
                        )
                    })?;
                Ok(Bytes::from(buf))
            }
            PrivProtocol::Aes128 | PrivProtocol::Aes192 | PrivProtocol::Aes256 => {
                let iv = aes_iv(engine_boots, engine_time, priv_params);
                let mut buf = ciphertext.to_vec();
                self.aes_apply(&iv, &mut buf, false)
                    .map_err(|kind| Error::decrypt(None, kind))?;
                Ok(Bytes::from(buf))
            }
        }
    }

    /// DES IV: pre-IV (second half of the key) XOR salt.
    fn des_iv(&self, salt: &[u8]) -> [u8; 8] {
        let mut iv = [0u8; 8];
        for (i, byte) in iv.iter_mut().enumerate() {
            *byte = self.key[8 + i] ^ salt[i];
        }
        iv
    }

    fn aes_apply(
        &self,
        iv: &[u8; 16],
        buf: &mut [u8],
        encrypt: bool,
    ) -> std::result::Result<(), CryptoErrorKind> {
        macro_rules! run {
            ($cipher:ty) => {
                if encrypt {
                    cfb_mode::Encryptor::<$cipher>::new_from_slices(&self.key, iv)
                        .map_err(|_| CryptoErrorKind::InvalidKeyLength)?
                        .encrypt(buf)
                } else {
                    cfb_mode::Decryptor::<$cipher>::new_from_slices(&self.key, iv)
                        .map_err(|_| CryptoErrorKind::InvalidKeyLength)?
                        .decrypt(buf)
                }
            };
        }
        match self.protocol {
            PrivProtocol::Aes128 => run!(Aes128),
            PrivProtocol::Aes192 => run!(Aes192),
            PrivProtocol::Aes256 => run!(Aes256),
            PrivProtocol::Des => return Err(CryptoErrorKind::NoPrivKey),
        }
        Ok(())
    }
}

impl std::fmt::Debug for PrivKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivKey")
            .field("protocol", &self.protocol)
            .finish_non_exhaustive()
    }
}

/// AES IV: engineBoots || engineTime || salt (RFC 3826 3.1.2.1).
fn aes_iv(engine_boots: u32, engine_time: u32, salt: &[u8]) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[..4].copy_from_slice(&engine_boots.to_be_bytes());
    iv[4..8].copy_from_slice(&engine_time.to_be_bytes());
    iv[8..].copy_from_slice(&salt[..8]);
    iv
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENGINE_ID: &[u8] = &[0x80, 0x00, 0x1F, 0x88, 0x05, 1, 2, 3, 4];

    fn roundtrip(auth: AuthProtocol, protocol: PrivProtocol) {
        let key = PrivKey::from_password(auth, protocol, b"privpass1", ENGINE_ID);
        let salt = SaltCounter::new();
        let plaintext = b"scoped pdu bytes that are not block aligned";
        let (ciphertext, params) = key.encrypt(plaintext, 3, 1200, &salt).unwrap();
        assert_ne!(&ciphertext[..plaintext.len()], &plaintext[..]);

        let decrypted = key.decrypt(&ciphertext, 3, 1200, &params).unwrap();
        assert_eq!(&decrypted[..plaintext.len()], &plaintext[..]);
    }

    #[test]
    fn test_des_roundtrip_pads_to_block() {
        roundtrip(AuthProtocol::Md5, PrivProtocol::Des);
        let key = PrivKey::from_password(AuthProtocol::Md5, PrivProtocol::Des, b"p", ENGINE_ID);
        let (ciphertext, _) = key.encrypt(&[1, 2, 3], 0, 0, &SaltCounter::new()).unwrap();
        assert_eq!(ciphertext.len(), 8);
    }

    #[test]
    fn test_aes_roundtrip_all_key_sizes() {
        roundtrip(AuthProtocol::Sha1, PrivProtocol::Aes128);
        roundtrip(AuthProtocol::Sha1, PrivProtocol::Aes192);
        roundtrip(AuthProtocol::Md5, PrivProtocol::Aes256);
        roundtrip(AuthProtocol::Sha512, PrivProtocol::Aes256);
    }

    #[test]
    fn test_decrypt_rejects_bad_params() {
        let key = PrivKey::from_password(AuthProtocol::Sha1, PrivProtocol::Des, b"p", ENGINE_ID);
        assert!(key.decrypt(&[0u8; 16], 0, 0, &[0u8; 7]).is_err());
        assert!(key.decrypt(&[0u8; 15], 0, 0, &[0u8; 8]).is_err());
    }

    #[test]
    fn test_salt_counter_advances() {
        let salt = SaltCounter::new();
        let first = salt.next();
        assert_eq!(salt.next(), first.wrapping_add(1));
    }
}
