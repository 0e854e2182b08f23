//! Public-key encrypted session keys (RFC 4880 §5.1).
//!
//! ```text
//! PKESK v3: version(1) = 3 || key id(8) || algorithm(1) || ciphertext
//!   RSA:  MPI(m^e mod n)
//!   ECDH: MPI(0x40 || ephemeral point) || len(1) || AES-wrapped key
//!
//! recovered m: symmetric algorithm(1) || key || sum16(key)(2)
//! ```

use std::fmt;

use rsa::traits::PublicKeyParts;
use rsa::Pkcs1v15Encrypt;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use super::cfb::SymmetricAlgorithm;
use super::ecdh::{self, KdfParams};
use super::keyring::{KeyId, PublicKeyAlgorithm, PublicParams, SecretKey, UnlockedKey};
use super::packet::{read_array, read_mpi, read_u8, read_vec};
use crate::error::DecryptError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionKeyCiphertext {
    Rsa { c: Vec<u8> },
    Ecdh { ephemeral: Vec<u8>, wrapped: Vec<u8> },
    Other,
}

/// One recipient entry of an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedSessionKey {
    pub key_id: KeyId,
    pub algorithm: PublicKeyAlgorithm,
    pub ciphertext: SessionKeyCiphertext,
}

impl EncryptedSessionKey {
    pub fn parse(body: &[u8]) -> Result<Self, DecryptError> {
        let mut r = body;
        let version = read_u8(&mut r)?;
        if version != 3 {
            return Err(DecryptError::UnsupportedFormat(format!(
                "session key packet version {}",
                version
            )));
        }
        let key_id = KeyId::from_bytes(read_array(&mut r)?);
        let algorithm = PublicKeyAlgorithm::from_u8(read_u8(&mut r)?);

        let ciphertext = match algorithm {
            PublicKeyAlgorithm::Rsa => SessionKeyCiphertext::Rsa { c: read_mpi(&mut r)? },
            PublicKeyAlgorithm::Ecdh => {
                let ephemeral = read_mpi(&mut r)?;
                let len = read_u8(&mut r)? as usize;
                let wrapped = read_vec(&mut r, len)?;
                SessionKeyCiphertext::Ecdh { ephemeral, wrapped }
            }
            _ => SessionKeyCiphertext::Other,
        };

        Ok(Self {
            key_id,
            algorithm,
            ciphertext,
        })
    }
}

/// Recovered symmetric key for the bulk data packet.
pub struct SessionKey {
    pub algorithm: SymmetricAlgorithm,
    pub key: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKey")
            .field("algorithm", &self.algorithm)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl SessionKey {
    /// Split and check `algorithm || key || sum16(key)`.
    pub fn from_decrypted(m: &[u8]) -> Result<Self, DecryptError> {
        let (&algo, rest) = m.split_first().ok_or(DecryptError::WrongPasswordOrCorruptData)?;
        let algorithm = SymmetricAlgorithm::from_u8(algo);
        let key_len = algorithm
            .key_len()
            .ok_or(DecryptError::WrongPasswordOrCorruptData)?;
        if rest.len() != key_len + 2 {
            return Err(DecryptError::WrongPasswordOrCorruptData);
        }

        let (key, sum) = rest.split_at(key_len);
        let expected = key.iter().fold(0u16, |acc, &b| acc.wrapping_add(b as u16));
        if !bool::from(expected.to_be_bytes()[..].ct_eq(sum)) {
            return Err(DecryptError::WrongPasswordOrCorruptData);
        }

        Ok(Self {
            algorithm,
            key: Zeroizing::new(key.to_vec()),
        })
    }
}

/// Recover the session key from `pkesk` with the matching unlocked key.
pub fn decrypt_session_key(
    pkesk: &EncryptedSessionKey,
    entry: &SecretKey,
    unlocked: &UnlockedKey,
) -> Result<SessionKey, DecryptError> {
    match (&pkesk.ciphertext, unlocked) {
        (SessionKeyCiphertext::Rsa { c }, UnlockedKey::Rsa(key)) => {
            let size = key.size();
            if c.len() > size {
                return Err(DecryptError::WrongPasswordOrCorruptData);
            }
            // MPIs drop leading zeros; PKCS#1 wants the full modulus width
            let mut padded = vec![0u8; size];
            padded[size - c.len()..].copy_from_slice(c);

            let m = key
                .decrypt_blinded(&mut rand_core::OsRng, Pkcs1v15Encrypt, &padded)
                .map(Zeroizing::new)
                .map_err(|_| DecryptError::WrongPasswordOrCorruptData)?;
            SessionKey::from_decrypted(&m)
        }
        (SessionKeyCiphertext::Ecdh { ephemeral, wrapped }, UnlockedKey::Cv25519(secret)) => {
            let (curve_oid, kdf_hash, kdf_cipher) = match entry.public_params() {
                PublicParams::Ecdh {
                    curve_oid,
                    kdf_hash,
                    kdf_cipher,
                    ..
                } => (curve_oid, *kdf_hash, *kdf_cipher),
                _ => {
                    return Err(DecryptError::KeyDerivation(
                        "recipient key has no ECDH parameters".into(),
                    ))
                }
            };
            let params = KdfParams {
                curve_oid,
                hash: kdf_hash,
                cipher: kdf_cipher,
                fingerprint: entry.fingerprint(),
            };
            let m = ecdh::unwrap_session_key(secret, &params, ephemeral, wrapped)?;
            let m = ecdh::strip_padding(&m).ok_or(DecryptError::WrongPasswordOrCorruptData)?;
            SessionKey::from_decrypted(m)
        }
        (SessionKeyCiphertext::Other, _) => Err(DecryptError::UnsupportedFormat(format!(
            "session key encrypted with {:?}",
            pkesk.algorithm
        ))),
        _ => Err(DecryptError::UnsupportedFormat(format!(
            "session key algorithm {:?} does not match recipient key {}",
            pkesk.algorithm,
            entry.key_id()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_sum(algo: u8, key: &[u8]) -> Vec<u8> {
        let sum = key.iter().fold(0u16, |a, &b| a.wrapping_add(b as u16));
        let mut m = vec![algo];
        m.extend_from_slice(key);
        m.extend_from_slice(&sum.to_be_bytes());
        m
    }

    #[test]
    fn session_key_checks() {
        let key = [0xA5u8; 16];
        let sk = SessionKey::from_decrypted(&with_sum(7, &key)).unwrap();
        assert_eq!(sk.algorithm, SymmetricAlgorithm::Aes128);
        assert_eq!(&sk.key[..], &key);

        let mut bad_sum = with_sum(7, &key);
        *bad_sum.last_mut().unwrap() ^= 1;
        assert!(matches!(
            SessionKey::from_decrypted(&bad_sum),
            Err(DecryptError::WrongPasswordOrCorruptData)
        ));

        // AES-256 id with a 16-byte key
        assert!(matches!(
            SessionKey::from_decrypted(&with_sum(9, &key)),
            Err(DecryptError::WrongPasswordOrCorruptData)
        ));
        assert!(matches!(
            SessionKey::from_decrypted(&with_sum(99, &key)),
            Err(DecryptError::WrongPasswordOrCorruptData)
        ));
        assert!(SessionKey::from_decrypted(&[]).is_err());
    }

    #[test]
    fn debug_is_redacted() {
        let sk = SessionKey::from_decrypted(&with_sum(7, &[0x42; 16])).unwrap();
        assert!(!format!("{:?}", sk).contains("66"));
    }

    #[test]
    fn parse_rsa_entry() {
        let mut body = vec![3, 1, 2, 3, 4, 5, 6, 7, 8, 1];
        body.extend_from_slice(&[0x00, 0x10, 0xAB, 0xCD]);
        let pkesk = EncryptedSessionKey::parse(&body).unwrap();
        assert_eq!(pkesk.key_id, KeyId(0x0102030405060708));
        assert_eq!(pkesk.algorithm, PublicKeyAlgorithm::Rsa);
        assert_eq!(pkesk.ciphertext, SessionKeyCiphertext::Rsa { c: vec![0xAB, 0xCD] });
    }

    #[test]
    fn parse_ecdh_entry() {
        let mut body = vec![3, 0, 0, 0, 0, 0, 0, 0, 9, 18];
        body.extend_from_slice(&[0x00, 0x07, 0x40]);
        body.extend_from_slice(&[3, 1, 2, 3]);
        let pkesk = EncryptedSessionKey::parse(&body).unwrap();
        assert_eq!(
            pkesk.ciphertext,
            SessionKeyCiphertext::Ecdh { ephemeral: vec![0x40], wrapped: vec![1, 2, 3] }
        );
    }

    #[test]
    fn parse_rejects_other_versions_and_truncation() {
        assert!(matches!(
            EncryptedSessionKey::parse(&[6, 0]),
            Err(DecryptError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            EncryptedSessionKey::parse(&[3, 1, 2]),
            Err(DecryptError::IoTruncated(_))
        ));
    }
}
