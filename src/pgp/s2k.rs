//! String-to-key specifiers (RFC 4880 §3.7).

use std::io::Read;

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use zeroize::Zeroizing;

use super::packet::{read_array, read_u8, read_vec};
use crate::error::DecryptError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
    Other(u8),
}

impl HashAlgorithm {
    pub fn from_u8(id: u8) -> Self {
        match id {
            1 => Self::Md5,
            2 => Self::Sha1,
            8 => Self::Sha256,
            9 => Self::Sha384,
            10 => Self::Sha512,
            other => Self::Other(other),
        }
    }

    pub fn id(self) -> u8 {
        match self {
            Self::Md5 => 1,
            Self::Sha1 => 2,
            Self::Sha256 => 8,
            Self::Sha384 => 9,
            Self::Sha512 => 10,
            Self::Other(id) => id,
        }
    }

    /// Hash the concatenation of `parts`.
    pub fn digest(self, parts: &[&[u8]]) -> Result<Zeroizing<Vec<u8>>, DecryptError> {
        fn run<D: Digest>(parts: &[&[u8]]) -> Zeroizing<Vec<u8>> {
            let mut h = D::new();
            for p in parts {
                h.update(p);
            }
            Zeroizing::new(h.finalize().to_vec())
        }
        Ok(match self {
            Self::Md5 => run::<Md5>(parts),
            Self::Sha1 => run::<Sha1>(parts),
            Self::Sha256 => run::<Sha256>(parts),
            Self::Sha384 => run::<Sha384>(parts),
            Self::Sha512 => run::<Sha512>(parts),
            Self::Other(id) => {
                return Err(DecryptError::KeyDerivation(format!("unknown hash algorithm {}", id)))
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum S2k {
    Simple {
        hash: HashAlgorithm,
    },
    Salted {
        hash: HashAlgorithm,
        salt: [u8; 8],
    },
    IteratedSalted {
        hash: HashAlgorithm,
        salt: [u8; 8],
        count: u32,
    },
    /// GnuPG extension 101: the secret lives elsewhere (offline primary key
    /// or smartcard).
    GnuStub,
}

/// Decode the one-byte iteration count.
pub fn decode_count(c: u8) -> u32 {
    (16 + (c as u32 & 15)) << ((c as u32 >> 4) + 6)
}

impl S2k {
    pub fn read<R: Read>(r: &mut R) -> Result<Self, DecryptError> {
        let kind = read_u8(r)?;
        let hash = HashAlgorithm::from_u8(read_u8(r)?);
        Ok(match kind {
            0 => S2k::Simple { hash },
            1 => S2k::Salted {
                hash,
                salt: read_array(r)?,
            },
            3 => {
                let salt = read_array(r)?;
                let count = decode_count(read_u8(r)?);
                S2k::IteratedSalted { hash, salt, count }
            }
            101 => {
                let marker: [u8; 3] = read_array(r)?;
                if &marker != b"GNU" {
                    return Err(DecryptError::KeyDerivation("unknown S2K extension".into()));
                }
                match read_u8(r)? {
                    1 => {}
                    2 => {
                        let len = read_u8(r)? as usize;
                        read_vec(r, len)?;
                    }
                    mode => {
                        return Err(DecryptError::KeyDerivation(format!(
                            "unknown GnuPG S2K mode {}",
                            mode
                        )))
                    }
                }
                S2k::GnuStub
            }
            other => {
                return Err(DecryptError::KeyDerivation(format!("unknown S2K type {}", other)))
            }
        })
    }

    /// Derive `key_len` bytes from `passphrase`. Longer keys use extra hash
    /// contexts preloaded with 1, 2, ... zero bytes.
    pub fn derive_key(&self, passphrase: &str, key_len: usize) -> Result<Zeroizing<Vec<u8>>, DecryptError> {
        let pw = passphrase.as_bytes();
        let (hash, salt, count): (HashAlgorithm, &[u8], usize) = match self {
            S2k::Simple { hash } => (*hash, &[][..], 0),
            S2k::Salted { hash, salt } => (*hash, &salt[..], 0),
            S2k::IteratedSalted { hash, salt, count } => (*hash, &salt[..], *count as usize),
            S2k::GnuStub => {
                return Err(DecryptError::UnsupportedFormat(
                    "secret key is a GnuPG stub (offline or on a smartcard)".into(),
                ))
            }
        };

        match hash {
            HashAlgorithm::Md5 => Ok(derive::<Md5>(pw, salt, count, key_len)),
            HashAlgorithm::Sha1 => Ok(derive::<Sha1>(pw, salt, count, key_len)),
            HashAlgorithm::Sha256 => Ok(derive::<Sha256>(pw, salt, count, key_len)),
            HashAlgorithm::Sha384 => Ok(derive::<Sha384>(pw, salt, count, key_len)),
            HashAlgorithm::Sha512 => Ok(derive::<Sha512>(pw, salt, count, key_len)),
            HashAlgorithm::Other(id) => Err(DecryptError::KeyDerivation(format!(
                "unsupported S2K hash {}",
                id
            ))),
        }
    }
}

fn derive<D: Digest>(pw: &[u8], salt: &[u8], count: usize, key_len: usize) -> Zeroizing<Vec<u8>> {
    let mut out = Zeroizing::new(Vec::with_capacity(key_len));
    let mut preload = 0usize;

    while out.len() < key_len {
        let mut h = D::new();
        for _ in 0..preload {
            h.update([0u8]);
        }

        let unit = salt.len() + pw.len();
        if count == 0 {
            h.update(salt);
            h.update(pw);
        } else {
            // always hash at least one full salt || passphrase
            let mut left = count.max(unit);
            while left >= unit {
                h.update(salt);
                h.update(pw);
                left -= unit;
            }
            if left > 0 {
                if left <= salt.len() {
                    h.update(&salt[..left]);
                } else {
                    h.update(salt);
                    h.update(&pw[..left - salt.len()]);
                }
            }
        }

        let digest = h.finalize();
        let take = (key_len - out.len()).min(digest.len());
        out.extend_from_slice(&digest[..take]);
        preload += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_decoding() {
        assert_eq!(decode_count(0x60), 65536);
        assert_eq!(decode_count(0xff), 65_011_712);
        assert_eq!(decode_count(0), 1024);
    }

    #[test]
    fn simple_is_plain_hash() {
        let s2k = S2k::Simple { hash: HashAlgorithm::Sha256 };
        let key = s2k.derive_key("pw", 32).unwrap();
        assert_eq!(
            hex::encode(&key[..]),
            "30c952fab122c3f9759f02a6d95c3758b246b4fee239957b2d4fee46e26170c4"
        );
    }

    #[test]
    fn second_context_is_zero_preloaded() {
        let s2k = S2k::Simple { hash: HashAlgorithm::Sha1 };
        let key = s2k.derive_key("pw", 32).unwrap();
        let first = Sha1::digest(b"pw");
        let second = Sha1::digest(b"\x00pw");
        assert_eq!(&key[..20], first.as_slice());
        assert_eq!(&key[20..], &second[..12]);
    }

    #[test]
    fn iterated_with_small_count_hashes_once() {
        let salt = [1u8; 8];
        let iterated = S2k::IteratedSalted { hash: HashAlgorithm::Sha1, salt, count: 1 };
        let salted = S2k::Salted { hash: HashAlgorithm::Sha1, salt };
        assert_eq!(
            iterated.derive_key("passphrase", 16).unwrap(),
            salted.derive_key("passphrase", 16).unwrap()
        );
    }

    #[test]
    fn iterated_partial_tail() {
        // count = 2.5 units of salt || "ab"
        let salt = [7u8; 8];
        let s2k = S2k::IteratedSalted { hash: HashAlgorithm::Sha256, salt, count: 25 };
        let mut stream = Vec::new();
        stream.extend_from_slice(&salt);
        stream.extend_from_slice(b"ab");
        stream.extend_from_slice(&salt);
        stream.extend_from_slice(b"ab");
        stream.extend_from_slice(&salt[..5]);
        assert_eq!(&s2k.derive_key("ab", 32).unwrap()[..], Sha256::digest(&stream).as_slice());
    }

    #[test]
    fn parse_iterated() {
        let bytes = [3u8, 2, 1, 2, 3, 4, 5, 6, 7, 8, 0x60];
        let s2k = S2k::read(&mut &bytes[..]).unwrap();
        assert_eq!(
            s2k,
            S2k::IteratedSalted {
                hash: HashAlgorithm::Sha1,
                salt: [1, 2, 3, 4, 5, 6, 7, 8],
                count: 65536
            }
        );
    }

    #[test]
    fn gnu_stub_cannot_derive() {
        let bytes = [101u8, 0, b'G', b'N', b'U', 1];
        let s2k = S2k::read(&mut &bytes[..]).unwrap();
        assert_eq!(s2k, S2k::GnuStub);
        assert!(matches!(
            s2k.derive_key("x", 16),
            Err(DecryptError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn unknown_type_and_hash() {
        assert!(matches!(
            S2k::read(&mut &[42u8, 2][..]),
            Err(DecryptError::KeyDerivation(_))
        ));
        let s2k = S2k::Simple { hash: HashAlgorithm::Other(77) };
        assert!(matches!(s2k.derive_key("x", 16), Err(DecryptError::KeyDerivation(_))));
    }
}
