//! ECDH session key unwrapping over Curve25519 (RFC 6637 §7, §8).
//!
//! Z   = X25519(recipient secret, ephemeral point)
//! KEK = Hash(00 00 00 01 || Z || param)[..kek_len]
//! m   = AESKeyUnwrap(KEK, wrapped), then PKCS#5 padding removed by the caller

use aes_kw::{KekAes128, KekAes192, KekAes256};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use super::cfb::SymmetricAlgorithm;
use super::keyring::FINGERPRINT_BYTES;
use super::s2k::HashAlgorithm;
use crate::error::DecryptError;

const ECDH_ALGORITHM_ID: u8 = 18;
const ANONYMOUS_SENDER: &[u8; 20] = b"Anonymous Sender    ";
const NATIVE_POINT_PREFIX: u8 = 0x40;

/// Recipient-side KDF inputs taken from the public key.
pub struct KdfParams<'a> {
    pub curve_oid: &'a [u8],
    pub hash: HashAlgorithm,
    pub cipher: SymmetricAlgorithm,
    pub fingerprint: &'a [u8; FINGERPRINT_BYTES],
}

impl KdfParams<'_> {
    /// oid_len || oid || 18 || 03 01 hash cipher || "Anonymous Sender    " || fingerprint
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.curve_oid.len() + 5 + 20 + FINGERPRINT_BYTES);
        out.push(self.curve_oid.len() as u8);
        out.extend_from_slice(self.curve_oid);
        out.push(ECDH_ALGORITHM_ID);
        out.extend_from_slice(&[0x03, 0x01, self.hash.id(), self.cipher.id()]);
        out.extend_from_slice(ANONYMOUS_SENDER);
        out.extend_from_slice(self.fingerprint);
        out
    }
}

/// Recover the padded session key blob `m`.
pub fn unwrap_session_key(
    secret: &StaticSecret,
    params: &KdfParams<'_>,
    ephemeral: &[u8],
    wrapped: &[u8],
) -> Result<Zeroizing<Vec<u8>>, DecryptError> {
    if ephemeral.len() != 33 || ephemeral[0] != NATIVE_POINT_PREFIX {
        return Err(DecryptError::MalformedHeader("bad Curve25519 ephemeral point".into()));
    }
    let mut point = [0u8; 32];
    point.copy_from_slice(&ephemeral[1..]);

    let shared = secret.diffie_hellman(&PublicKey::from(point));
    if !shared.was_contributory() {
        return Err(DecryptError::WrongPasswordOrCorruptData);
    }

    let kek_len = match params.cipher {
        SymmetricAlgorithm::Aes128 => 16,
        SymmetricAlgorithm::Aes192 => 24,
        SymmetricAlgorithm::Aes256 => 32,
        other => {
            return Err(DecryptError::KeyDerivation(format!(
                "ECDH key wrap cipher {:?}",
                other
            )))
        }
    };

    let param = params.encode();
    let digest = params
        .hash
        .digest(&[&[0, 0, 0, 1], shared.as_bytes(), &param])?;
    if digest.len() < kek_len {
        return Err(DecryptError::KeyDerivation(format!(
            "{:?} is too short for a {}-byte KEK",
            params.hash, kek_len
        )));
    }

    if wrapped.len() < 16 || wrapped.len() % 8 != 0 {
        return Err(DecryptError::WrongPasswordOrCorruptData);
    }
    let mut out = Zeroizing::new(vec![0u8; wrapped.len() - 8]);
    let kek = &digest[..kek_len];
    let unwrapped = match kek_len {
        16 => KekAes128::from(to_array::<16>(kek)).unwrap(wrapped, &mut out),
        24 => KekAes192::from(to_array::<24>(kek)).unwrap(wrapped, &mut out),
        _ => KekAes256::from(to_array::<32>(kek)).unwrap(wrapped, &mut out),
    };
    unwrapped.map_err(|_| DecryptError::WrongPasswordOrCorruptData)?;
    Ok(out)
}

fn to_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

/// Remove PKCS#5 padding from an unwrapped ECDH session key blob.
pub fn strip_padding(m: &[u8]) -> Option<&[u8]> {
    let pad = *m.last()? as usize;
    if pad == 0 || pad > 8 || pad > m.len() {
        return None;
    }
    let (body, padding) = m.split_at(m.len() - pad);
    padding.iter().all(|&b| b as usize == pad).then_some(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::keyring::CURVE25519_OID;

    #[test]
    fn param_layout() {
        let fp = [0xAAu8; 20];
        let params = KdfParams {
            curve_oid: CURVE25519_OID,
            hash: HashAlgorithm::Sha256,
            cipher: SymmetricAlgorithm::Aes128,
            fingerprint: &fp,
        };
        let encoded = params.encode();
        assert_eq!(encoded.len(), 1 + 10 + 1 + 4 + 20 + 20);
        assert_eq!(encoded[0], 10);
        assert_eq!(&encoded[11..16], &[18, 3, 1, 8, 7]);
        assert_eq!(&encoded[16..36], b"Anonymous Sender    ");
        assert_eq!(&encoded[36..], &fp);
    }

    #[test]
    fn padding() {
        assert_eq!(strip_padding(&[9, 1, 2, 3, 3, 3]), Some(&[9u8, 1, 2][..]));
        assert_eq!(strip_padding(&[9, 1, 2, 3, 2, 3]), None);
        assert_eq!(strip_padding(&[9, 0]), None);
        assert_eq!(strip_padding(&[]), None);
    }

    #[test]
    fn low_order_point_rejected() {
        let secret = StaticSecret::from([7u8; 32]);
        let fp = [0u8; 20];
        let params = KdfParams {
            curve_oid: CURVE25519_OID,
            hash: HashAlgorithm::Sha256,
            cipher: SymmetricAlgorithm::Aes128,
            fingerprint: &fp,
        };
        let mut ephemeral = [0u8; 33];
        ephemeral[0] = 0x40;
        assert!(matches!(
            unwrap_session_key(&secret, &params, &ephemeral, &[0u8; 40]),
            Err(DecryptError::WrongPasswordOrCorruptData)
        ));
    }

    #[test]
    fn compressed_point_rejected() {
        let secret = StaticSecret::from([7u8; 32]);
        let fp = [0u8; 20];
        let params = KdfParams {
            curve_oid: CURVE25519_OID,
            hash: HashAlgorithm::Sha256,
            cipher: SymmetricAlgorithm::Aes128,
            fingerprint: &fp,
        };
        assert!(matches!(
            unwrap_session_key(&secret, &params, &[0x02; 33], &[0u8; 40]),
            Err(DecryptError::MalformedHeader(_))
        ));
    }
}
