//! Symmetric container header detection.
//!
//! Format:
//!   salted: "Salted__"[8] || salt[8] || ciphertext
//!   legacy: iv[16] || ciphertext

use std::io::Read;

use crate::error::DecryptError;
use crate::kdf::{self, KeyMaterial, IV_BYTES, SALT_BYTES};

pub const SALTED_MAGIC: &[u8; 8] = b"Salted__";

/// Bytes consumed from the stream before ciphertext starts, for both variants.
pub const HEADER_BYTES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionHeader {
    Salted { salt: [u8; SALT_BYTES] },
    Legacy { iv: [u8; IV_BYTES] },
}

impl EncryptionHeader {
    pub fn kind(&self) -> &'static str {
        match self {
            EncryptionHeader::Salted { .. } => "salted",
            EncryptionHeader::Legacy { .. } => "legacy",
        }
    }

    pub fn derive(&self, password: &str) -> KeyMaterial {
        match self {
            EncryptionHeader::Salted { salt } => kdf::derive_salted(password, salt),
            EncryptionHeader::Legacy { iv } => kdf::derive_legacy(password, iv),
        }
    }
}

/// Consume the 16-byte header from `source`, leaving it at the first
/// ciphertext byte.
pub fn sniff<R: Read>(source: &mut R) -> Result<EncryptionHeader, DecryptError> {
    let mut first = [0u8; 8];
    read_header(source, &mut first)?;

    let mut second = [0u8; 8];
    read_header(source, &mut second)?;

    if &first == SALTED_MAGIC {
        return Ok(EncryptionHeader::Salted { salt: second });
    }

    let mut iv = [0u8; IV_BYTES];
    iv[..8].copy_from_slice(&first);
    iv[8..].copy_from_slice(&second);
    Ok(EncryptionHeader::Legacy { iv })
}

fn read_header<R: Read>(source: &mut R, buf: &mut [u8]) -> Result<(), DecryptError> {
    source.read_exact(buf).map_err(DecryptError::from_read)
}
