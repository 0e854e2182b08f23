//! Secret key ring (RFC 4880 §5.5, §12.2).
//!
//! Only version 4 secret keys and subkeys are loaded. Public parameters are
//! parsed for every common algorithm so fingerprints are always right, but
//! only RSA and Curve25519 ECDH keys can be unlocked for decryption.

use std::collections::HashMap;
use std::fmt;
use std::io::Read;

use rsa::{BigUint, RsaPrivateKey};
use sha1::{Digest, Sha1};
use subtle::ConstantTimeEq;
use x25519_dalek::StaticSecret;
use zeroize::Zeroizing;

use super::armor;
use super::cfb::{BlockCipher, Cfb, SymmetricAlgorithm, BLOCK_BYTES};
use super::packet::{read_array, read_header, read_mpi, read_u16, read_u8, read_vec, PacketBody, Tag};
use super::s2k::{HashAlgorithm, S2k};
use crate::error::DecryptError;

/// Key packets larger than this are not keys we can use.
const MAX_KEY_PACKET: usize = 64 * 1024;

pub const FINGERPRINT_BYTES: usize = 20;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Low 64 bits of a v4 fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(pub u64);

impl KeyId {
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        KeyId(u64::from_be_bytes(bytes))
    }

    pub fn from_fingerprint(fp: &[u8; FINGERPRINT_BYTES]) -> Self {
        let mut id = [0u8; 8];
        id.copy_from_slice(&fp[FINGERPRINT_BYTES - 8..]);
        Self::from_bytes(id)
    }

    /// All-zero ids mark anonymous recipients.
    pub fn is_wildcard(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

impl From<u64> for KeyId {
    fn from(id: u64) -> Self {
        KeyId(id)
    }
}

// ---------------------------------------------------------------------------
// Key material
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicKeyAlgorithm {
    Rsa,
    Elgamal,
    Dsa,
    Ecdh,
    Ecdsa,
    EdDsa,
    Other(u8),
}

impl PublicKeyAlgorithm {
    pub fn from_u8(id: u8) -> Self {
        match id {
            1..=3 => Self::Rsa,
            16 => Self::Elgamal,
            17 => Self::Dsa,
            18 => Self::Ecdh,
            19 => Self::Ecdsa,
            22 => Self::EdDsa,
            other => Self::Other(other),
        }
    }
}

/// OID 1.3.6.1.4.1.3029.1.5.1
pub const CURVE25519_OID: &[u8] = &[0x2B, 0x06, 0x01, 0x04, 0x01, 0x97, 0x55, 0x01, 0x05, 0x01];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicParams {
    Rsa {
        n: Vec<u8>,
        e: Vec<u8>,
    },
    Ecdh {
        curve_oid: Vec<u8>,
        /// 0x40 || native point for Curve25519
        point: Vec<u8>,
        kdf_hash: HashAlgorithm,
        kdf_cipher: SymmetricAlgorithm,
    },
    /// Parsed for the fingerprint only.
    Other(PublicKeyAlgorithm),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Checksum {
    Sum16,
    Sha1,
}

#[derive(Clone)]
enum SecretMaterial {
    Plain(Zeroizing<Vec<u8>>),
    Encrypted {
        checksum: Checksum,
        cipher: SymmetricAlgorithm,
        s2k: S2k,
        iv: Vec<u8>,
        data: Vec<u8>,
    },
    /// Loaded for its identity, but the secret part cannot be recovered.
    Unavailable(Unusable),
}

#[derive(Debug, Clone)]
enum Unusable {
    /// GnuPG S2K extension 101: offline primary key or smartcard.
    Stub,
    /// Protection cipher or mode we do not implement.
    Protection(String),
    /// S2K specifier that cannot produce a key.
    S2k(String),
}

impl Unusable {
    fn error(&self) -> DecryptError {
        match self {
            Unusable::Stub => DecryptError::UnsupportedFormat(
                "secret key is a GnuPG stub (offline or on a smartcard)".into(),
            ),
            Unusable::Protection(reason) => DecryptError::UnsupportedFormat(reason.clone()),
            Unusable::S2k(reason) => DecryptError::KeyDerivation(reason.clone()),
        }
    }
}

/// One secret key or subkey, still locked.
#[derive(Clone)]
pub struct SecretKey {
    key_id: KeyId,
    fingerprint: [u8; FINGERPRINT_BYTES],
    created: u32,
    algorithm: PublicKeyAlgorithm,
    public: PublicParams,
    secret: SecretMaterial,
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .field("created", &self.created)
            .finish_non_exhaustive()
    }
}

/// Private key usable for session key recovery. Cleared on drop by the
/// underlying key types.
pub enum UnlockedKey {
    Rsa(RsaPrivateKey),
    Cv25519(StaticSecret),
}

impl fmt::Debug for UnlockedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnlockedKey::Rsa(_) => f.write_str("UnlockedKey::Rsa([REDACTED])"),
            UnlockedKey::Cv25519(_) => f.write_str("UnlockedKey::Cv25519([REDACTED])"),
        }
    }
}

impl SecretKey {
    pub fn key_id(&self) -> KeyId {
        self.key_id
    }

    pub fn fingerprint(&self) -> &[u8; FINGERPRINT_BYTES] {
        &self.fingerprint
    }

    pub fn created(&self) -> u32 {
        self.created
    }

    pub fn algorithm(&self) -> PublicKeyAlgorithm {
        self.algorithm
    }

    pub fn public_params(&self) -> &PublicParams {
        &self.public
    }

    pub fn is_protected(&self) -> bool {
        matches!(self.secret, SecretMaterial::Encrypted { .. })
    }

    /// False for stubs and keys whose protection we cannot undo; `unlock`
    /// on those always fails.
    pub fn is_available(&self) -> bool {
        !matches!(self.secret, SecretMaterial::Unavailable(_))
    }

    /// Parse a v4 secret key packet body. `Ok(None)` for key versions we
    /// skip.
    pub fn parse(body: &[u8]) -> Result<Option<Self>, DecryptError> {
        let mut r = body;
        let version = read_u8(&mut r)?;
        if version != 4 {
            tracing::debug!(version, "skipping non-v4 secret key");
            return Ok(None);
        }
        let created = u32::from_be_bytes(read_array(&mut r)?);
        let algo_id = read_u8(&mut r)?;
        let algorithm = PublicKeyAlgorithm::from_u8(algo_id);

        let public = match algorithm {
            PublicKeyAlgorithm::Rsa => PublicParams::Rsa {
                n: read_mpi(&mut r)?,
                e: read_mpi(&mut r)?,
            },
            PublicKeyAlgorithm::Elgamal => {
                skip_mpis(&mut r, 3)?;
                PublicParams::Other(algorithm)
            }
            PublicKeyAlgorithm::Dsa => {
                skip_mpis(&mut r, 4)?;
                PublicParams::Other(algorithm)
            }
            PublicKeyAlgorithm::Ecdh => {
                let curve_oid = read_oid(&mut r)?;
                let point = read_mpi(&mut r)?;
                let kdf_len = read_u8(&mut r)? as usize;
                let kdf = read_vec(&mut r, kdf_len)?;
                if kdf.len() != 3 || kdf[0] != 1 {
                    return Err(DecryptError::MalformedHeader("bad ECDH KDF parameters".into()));
                }
                PublicParams::Ecdh {
                    curve_oid,
                    point,
                    kdf_hash: HashAlgorithm::from_u8(kdf[1]),
                    kdf_cipher: SymmetricAlgorithm::from_u8(kdf[2]),
                }
            }
            PublicKeyAlgorithm::Ecdsa | PublicKeyAlgorithm::EdDsa => {
                read_oid(&mut r)?;
                read_mpi(&mut r)?;
                PublicParams::Other(algorithm)
            }
            PublicKeyAlgorithm::Other(id) => {
                tracing::debug!(algorithm = id, "skipping key with unknown algorithm");
                return Ok(None);
            }
        };

        let public_len = body.len() - r.len();
        let fingerprint = fingerprint(&body[..public_len]);
        let key_id = KeyId::from_fingerprint(&fingerprint);

        let usage = read_u8(&mut r)?;
        let secret = match usage {
            0 => SecretMaterial::Plain(Zeroizing::new(r.to_vec())),
            254 | 255 => {
                let cipher = SymmetricAlgorithm::from_u8(read_u8(&mut r)?);
                match S2k::read(&mut r) {
                    Ok(S2k::GnuStub) => SecretMaterial::Unavailable(Unusable::Stub),
                    Ok(s2k) => encrypted(&mut r, cipher, s2k, usage)?,
                    Err(DecryptError::KeyDerivation(reason)) => {
                        SecretMaterial::Unavailable(Unusable::S2k(reason))
                    }
                    Err(e) => return Err(e),
                }
            }
            253 => SecretMaterial::Unavailable(Unusable::Protection("AEAD key protection".into())),
            legacy_cipher => {
                // pre-S2K keys: the usage octet is the cipher, key = MD5(passphrase)
                let cipher = SymmetricAlgorithm::from_u8(legacy_cipher);
                encrypted(&mut r, cipher, S2k::Simple { hash: HashAlgorithm::Md5 }, usage)?
            }
        };

        Ok(Some(SecretKey {
            key_id,
            fingerprint,
            created,
            algorithm,
            public,
            secret,
        }))
    }

    /// Decrypt and check the secret material.
    pub fn unlock(&self, passphrase: &str) -> Result<UnlockedKey, DecryptError> {
        let plain = match &self.secret {
            SecretMaterial::Unavailable(unusable) => return Err(unusable.error()),
            SecretMaterial::Plain(bytes) => {
                let body = strip_checksum(bytes, Checksum::Sum16)
                    .ok_or(DecryptError::WrongPasswordOrCorruptData)?;
                Zeroizing::new(body.to_vec())
            }
            SecretMaterial::Encrypted {
                checksum,
                cipher,
                s2k,
                iv,
                data,
            } => {
                let key_len = cipher.key_len().ok_or_else(|| {
                    DecryptError::UnsupportedFormat(format!("key protection cipher {:?}", cipher))
                })?;
                let key = s2k.derive_key(passphrase, key_len)?;
                let block = BlockCipher::new(*cipher, &key)?;

                let mut register = [0u8; BLOCK_BYTES];
                register.copy_from_slice(iv);
                let mut buf = Zeroizing::new(data.clone());
                Cfb::new(block, register, false).decrypt(&mut buf);

                let body = strip_checksum(&buf, *checksum)
                    .ok_or(DecryptError::WrongPassphrase(self.key_id))?;
                Zeroizing::new(body.to_vec())
            }
        };

        self.private_key(&plain)
    }

    fn private_key(&self, plain: &[u8]) -> Result<UnlockedKey, DecryptError> {
        let mut r = plain;
        match &self.public {
            PublicParams::Rsa { n, e } => {
                let d = Zeroizing::new(read_mpi(&mut r)?);
                let p = Zeroizing::new(read_mpi(&mut r)?);
                let q = Zeroizing::new(read_mpi(&mut r)?);
                let key = RsaPrivateKey::from_components(
                    BigUint::from_bytes_be(n),
                    BigUint::from_bytes_be(e),
                    BigUint::from_bytes_be(&d),
                    vec![BigUint::from_bytes_be(&p), BigUint::from_bytes_be(&q)],
                )
                .map_err(|_| DecryptError::WrongPasswordOrCorruptData)?;
                Ok(UnlockedKey::Rsa(key))
            }
            PublicParams::Ecdh { curve_oid, .. } if curve_oid.as_slice() == CURVE25519_OID => {
                let scalar = Zeroizing::new(read_mpi(&mut r)?);
                if scalar.len() > 32 {
                    return Err(DecryptError::MalformedHeader("Curve25519 secret too long".into()));
                }
                // stored big-endian, X25519 wants little-endian
                let mut native = Zeroizing::new([0u8; 32]);
                for (i, b) in scalar.iter().rev().enumerate() {
                    native[i] = *b;
                }
                Ok(UnlockedKey::Cv25519(StaticSecret::from(*native)))
            }
            PublicParams::Ecdh { .. } => Err(DecryptError::UnsupportedFormat(
                "ECDH curve other than Curve25519".into(),
            )),
            PublicParams::Other(algo) => Err(DecryptError::UnsupportedFormat(format!(
                "public-key algorithm {:?} cannot decrypt",
                algo
            ))),
        }
    }
}

fn encrypted(
    r: &mut &[u8],
    cipher: SymmetricAlgorithm,
    s2k: S2k,
    usage: u8,
) -> Result<SecretMaterial, DecryptError> {
    let Some(iv_len) = cipher.block_len() else {
        return Ok(SecretMaterial::Unavailable(Unusable::Protection(format!(
            "key protection cipher {:?}",
            cipher
        ))));
    };
    let iv = read_vec(r, iv_len)?;
    Ok(SecretMaterial::Encrypted {
        checksum: if usage == 254 { Checksum::Sha1 } else { Checksum::Sum16 },
        cipher,
        s2k,
        iv,
        data: r.to_vec(),
    })
}

/// Split off and verify the trailing checksum, in constant time.
fn strip_checksum(data: &[u8], checksum: Checksum) -> Option<&[u8]> {
    match checksum {
        Checksum::Sha1 => {
            let split = data.len().checked_sub(20)?;
            let (body, tag) = data.split_at(split);
            bool::from(Sha1::digest(body).as_slice().ct_eq(tag)).then_some(body)
        }
        Checksum::Sum16 => {
            let split = data.len().checked_sub(2)?;
            let (body, tag) = data.split_at(split);
            let sum = body.iter().fold(0u16, |acc, &b| acc.wrapping_add(b as u16));
            bool::from(sum.to_be_bytes()[..].ct_eq(tag)).then_some(body)
        }
    }
}

/// v4 fingerprint: SHA-1(0x99 || len[2] || public key packet body).
pub fn fingerprint(public: &[u8]) -> [u8; FINGERPRINT_BYTES] {
    let mut h = Sha1::new();
    h.update([0x99]);
    h.update((public.len() as u16).to_be_bytes());
    h.update(public);
    h.finalize().into()
}

fn read_oid(r: &mut &[u8]) -> Result<Vec<u8>, DecryptError> {
    let len = read_u8(r)? as usize;
    if len == 0 || len == 0xFF {
        return Err(DecryptError::MalformedHeader("reserved curve OID length".into()));
    }
    read_vec(r, len)
}

fn skip_mpis(r: &mut &[u8], count: usize) -> Result<(), DecryptError> {
    for _ in 0..count {
        let bits = read_u16(r)? as usize;
        read_vec(r, (bits + 7) / 8)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Ring
// ---------------------------------------------------------------------------

/// Secret keys indexed by key id. Immutable once loaded.
#[derive(Debug, Default, Clone)]
pub struct SecretKeyRing {
    keys: HashMap<KeyId, SecretKey>,
}

impl SecretKeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every v4 secret key and subkey from a transferable secret key
    /// export, binary or armored.
    pub fn from_reader<R: Read>(source: R) -> Result<Self, DecryptError> {
        let mut input = armor::dearmor(source)?;
        let mut ring = Self::new();

        while let Some(header) = read_header(&mut input)? {
            let mut body = PacketBody::new(&mut input, header.length);
            match header.tag {
                Tag::SecretKey | Tag::SecretSubkey => {
                    let bytes = body.read_bounded(MAX_KEY_PACKET)?;
                    if let Some(key) = SecretKey::parse(&bytes)? {
                        tracing::debug!(
                            key_id = %key.key_id(),
                            algorithm = ?key.algorithm(),
                            available = key.is_available(),
                            "loaded secret key"
                        );
                        ring.insert(key);
                    }
                }
                Tag::PublicKey
                | Tag::PublicSubkey
                | Tag::UserId
                | Tag::UserAttribute
                | Tag::Signature
                | Tag::Trust
                | Tag::Marker => {
                    body.skip()?;
                }
                other => {
                    return Err(DecryptError::MalformedHeader(format!(
                        "unexpected {:?} packet in key ring",
                        other
                    )))
                }
            }
        }

        Ok(ring)
    }

    pub fn insert(&mut self, key: SecretKey) {
        self.keys.insert(key.key_id(), key);
    }

    /// Register `key` under an additional identifier.
    pub fn insert_as(&mut self, id: KeyId, key: SecretKey) {
        self.keys.insert(id, key);
    }

    pub fn get(&self, id: KeyId) -> Option<&SecretKey> {
        self.keys.get(&id)
    }

    pub fn contains(&self, id: KeyId) -> bool {
        self.keys.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key ids in ascending order.
    pub fn key_ids(&self) -> Vec<KeyId> {
        let mut ids: Vec<KeyId> = self.keys.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn unlock(&self, id: KeyId, passphrase: &str) -> Result<UnlockedKey, DecryptError> {
        self.get(id)
            .ok_or(DecryptError::NoMatchingPrivateKey)?
            .unlock(passphrase)
    }
}
