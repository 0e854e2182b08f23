//! Password key derivation for the symmetric containers.
//!
//! salted: D0 = "", Di = MD5(D(i-1) || password || salt), key || iv = D1 || D2 || D3
//! legacy: key = SHA-256(password), iv read from the stream

use md5::Md5;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const KEY_BYTES: usize = 32;
pub const IV_BYTES: usize = 16;
pub const SALT_BYTES: usize = 8;

/// key[32] || iv[16]
const DERIVED_BYTES: usize = KEY_BYTES + IV_BYTES;
const MD5_BYTES: usize = 16;

/// AES-256 key and CBC IV. Cleared on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    key: [u8; KEY_BYTES],
    iv: [u8; IV_BYTES],
}

impl KeyMaterial {
    pub fn new(key: [u8; KEY_BYTES], iv: [u8; IV_BYTES]) -> Self {
        Self { key, iv }
    }

    /// Filled in place by the derivations so no unscrubbed copy is left.
    fn zeroed() -> Self {
        Self::new([0u8; KEY_BYTES], [0u8; IV_BYTES])
    }

    pub fn key(&self) -> &[u8; KEY_BYTES] {
        &self.key
    }

    pub fn iv(&self) -> &[u8; IV_BYTES] {
        &self.iv
    }
}

impl core::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("KeyMaterial([REDACTED])")
    }
}

/// OpenSSL `EVP_BytesToKey` with MD5, one iteration.
pub fn derive_salted(password: &str, salt: &[u8; SALT_BYTES]) -> KeyMaterial {
    let mut buf = zeroize::Zeroizing::new([0u8; DERIVED_BYTES]);
    let mut prev = zeroize::Zeroizing::new([0u8; MD5_BYTES]);
    let mut filled = 0;

    while filled < DERIVED_BYTES {
        let mut h = Md5::new();
        if filled > 0 {
            h.update(&prev[..]);
        }
        h.update(password.as_bytes());
        h.update(salt);
        h.finalize_into((&mut *prev).into());

        let n = (DERIVED_BYTES - filled).min(MD5_BYTES);
        buf[filled..filled + n].copy_from_slice(&prev[..n]);
        filled += n;
    }

    let mut km = KeyMaterial::zeroed();
    km.key.copy_from_slice(&buf[..KEY_BYTES]);
    km.iv.copy_from_slice(&buf[KEY_BYTES..]);
    km
}

/// Unsalted single SHA-256 of the password. The IV comes from the stream.
pub fn derive_legacy(password: &str, iv: &[u8; IV_BYTES]) -> KeyMaterial {
    let mut km = KeyMaterial::zeroed();
    let mut h = Sha256::new();
    h.update(password.as_bytes());
    h.finalize_into((&mut km.key).into());
    km.iv = *iv;
    km
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn salted_matches_openssl() {
        // openssl enc -aes-256-cbc -md md5 -pass pass:hunter2 -S 0102030405060708 -P
        let km = derive_salted("hunter2", &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(
            hex::encode_upper(km.key()),
            "DD076B4BCD49C33676D8185C3DD67E935D3B7324FF7D8E1074D9734059F0971E"
        );
        assert_eq!(hex::encode_upper(km.iv()), "FEB9D83342D7AF5BEAE1FCD7AA9415A6");
    }

    #[test]
    fn legacy_is_plain_sha256() {
        let km = derive_legacy("pw", &[0u8; IV_BYTES]);
        assert_eq!(
            hex::encode(km.key()),
            "30c952fab122c3f9759f02a6d95c3758b246b4fee239957b2d4fee46e26170c4"
        );
        assert_eq!(km.iv(), &[0u8; IV_BYTES]);
    }

    #[test]
    fn salt_changes_output() {
        let a = derive_salted("pw", &[0u8; 8]);
        let b = derive_salted("pw", &[1u8; 8]);
        assert_ne!(a.key(), b.key());
        assert_ne!(a.iv(), b.iv());
    }

    #[test]
    fn zeroize_clears_in_place() {
        let mut km = derive_salted("hunter2", &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_ne!(km.key(), &[0u8; KEY_BYTES]);
        km.zeroize();
        assert_eq!(km.key(), &[0u8; KEY_BYTES]);
        assert_eq!(km.iv(), &[0u8; IV_BYTES]);
    }

    #[test]
    fn debug_does_not_leak() {
        let km = derive_legacy("pw", &[0u8; IV_BYTES]);
        assert_eq!(format!("{:?}", km), "KeyMaterial([REDACTED])");
    }
}
