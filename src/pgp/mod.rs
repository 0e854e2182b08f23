//! OpenPGP public-key envelopes.
//!
//! Only the subset needed to open messages encrypted to RSA or Curve25519
//! keys: no signing, no encryption, no web of trust.

mod armor;
mod cfb;
mod ecdh;
mod keyring;
mod mdc;
mod message;
mod packet;
mod s2k;
mod session;

pub use cfb::SymmetricAlgorithm;
pub use keyring::{
    fingerprint, KeyId, PublicKeyAlgorithm, PublicParams, SecretKey, SecretKeyRing, UnlockedKey,
    FINGERPRINT_BYTES,
};
pub use message::{decrypt_envelope, inspect, EnvelopeInfo, MAX_SESSION_KEY_PACKET};
pub use s2k::HashAlgorithm;
pub use session::{EncryptedSessionKey, SessionKey, SessionKeyCiphertext};

