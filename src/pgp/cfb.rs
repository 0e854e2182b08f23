//! OpenPGP CFB mode (RFC 4880 §13.9).
//!
//! Integrity-protected data and secret key material use plain CFB. Legacy
//! symmetrically encrypted data (tag 9) resynchronizes the register after the
//! `block + 2` byte random prefix.

use std::io::{self, Read};

use aes::cipher::{BlockEncrypt, KeyInit};
use aes::{Aes128, Aes192, Aes256, Block};
use zeroize::Zeroize;

use crate::error::DecryptError;

pub const BLOCK_BYTES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymmetricAlgorithm {
    Plaintext,
    Idea,
    TripleDes,
    Cast5,
    Blowfish,
    Aes128,
    Aes192,
    Aes256,
    Twofish,
    Camellia128,
    Camellia192,
    Camellia256,
    Other(u8),
}

impl SymmetricAlgorithm {
    pub fn from_u8(id: u8) -> Self {
        match id {
            0 => Self::Plaintext,
            1 => Self::Idea,
            2 => Self::TripleDes,
            3 => Self::Cast5,
            4 => Self::Blowfish,
            7 => Self::Aes128,
            8 => Self::Aes192,
            9 => Self::Aes256,
            10 => Self::Twofish,
            11 => Self::Camellia128,
            12 => Self::Camellia192,
            13 => Self::Camellia256,
            other => Self::Other(other),
        }
    }

    pub fn id(self) -> u8 {
        match self {
            Self::Plaintext => 0,
            Self::Idea => 1,
            Self::TripleDes => 2,
            Self::Cast5 => 3,
            Self::Blowfish => 4,
            Self::Aes128 => 7,
            Self::Aes192 => 8,
            Self::Aes256 => 9,
            Self::Twofish => 10,
            Self::Camellia128 => 11,
            Self::Camellia192 => 12,
            Self::Camellia256 => 13,
            Self::Other(id) => id,
        }
    }

    pub fn key_len(self) -> Option<usize> {
        match self {
            Self::Idea | Self::Cast5 | Self::Blowfish | Self::Aes128 | Self::Camellia128 => Some(16),
            Self::TripleDes | Self::Aes192 | Self::Camellia192 => Some(24),
            Self::Aes256 | Self::Twofish | Self::Camellia256 => Some(32),
            Self::Plaintext | Self::Other(_) => None,
        }
    }

    pub fn block_len(self) -> Option<usize> {
        match self {
            Self::Idea | Self::TripleDes | Self::Cast5 | Self::Blowfish => Some(8),
            Self::Aes128
            | Self::Aes192
            | Self::Aes256
            | Self::Twofish
            | Self::Camellia128
            | Self::Camellia192
            | Self::Camellia256 => Some(16),
            Self::Plaintext | Self::Other(_) => None,
        }
    }
}

/// The block ciphers we can actually run.
pub enum BlockCipher {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
}

impl BlockCipher {
    pub fn new(algo: SymmetricAlgorithm, key: &[u8]) -> Result<Self, DecryptError> {
        let bad_key = || DecryptError::WrongPasswordOrCorruptData;
        Ok(match algo {
            SymmetricAlgorithm::Aes128 => {
                Self::Aes128(Aes128::new_from_slice(key).map_err(|_| bad_key())?)
            }
            SymmetricAlgorithm::Aes192 => {
                Self::Aes192(Aes192::new_from_slice(key).map_err(|_| bad_key())?)
            }
            SymmetricAlgorithm::Aes256 => {
                Self::Aes256(Aes256::new_from_slice(key).map_err(|_| bad_key())?)
            }
            other => {
                return Err(DecryptError::UnsupportedFormat(format!(
                    "symmetric algorithm {:?}",
                    other
                )))
            }
        })
    }

    fn encrypt_block(&self, block: &mut [u8; BLOCK_BYTES]) {
        let b = Block::from_mut_slice(block);
        match self {
            Self::Aes128(c) => c.encrypt_block(b),
            Self::Aes192(c) => c.encrypt_block(b),
            Self::Aes256(c) => c.encrypt_block(b),
        }
    }
}

/// Byte-granular CFB decryption state.
pub struct Cfb {
    cipher: BlockCipher,
    register: [u8; BLOCK_BYTES],
    keystream: [u8; BLOCK_BYTES],
    ciphertext: [u8; BLOCK_BYTES],
    pos: usize,
    offset: u64,
    resync: bool,
}

impl Cfb {
    pub fn new(cipher: BlockCipher, iv: [u8; BLOCK_BYTES], resync: bool) -> Self {
        let mut cfb = Self {
            cipher,
            register: iv,
            keystream: [0u8; BLOCK_BYTES],
            ciphertext: [0u8; BLOCK_BYTES],
            pos: 0,
            offset: 0,
            resync,
        };
        cfb.next_keystream();
        cfb
    }

    fn next_keystream(&mut self) {
        self.keystream = self.register;
        self.cipher.encrypt_block(&mut self.keystream);
        self.pos = 0;
    }

    pub fn decrypt(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            let c = *byte;
            *byte = c ^ self.keystream[self.pos];
            self.ciphertext[self.pos] = c;
            self.pos += 1;
            self.offset += 1;

            if self.resync && self.offset == BLOCK_BYTES as u64 + 2 {
                self.register.copy_within(2.., 0);
                self.register[BLOCK_BYTES - 2..].copy_from_slice(&self.ciphertext[..2]);
                self.next_keystream();
            } else if self.pos == BLOCK_BYTES {
                self.register = self.ciphertext;
                self.next_keystream();
            }
        }
    }
}

impl Drop for Cfb {
    fn drop(&mut self) {
        self.register.zeroize();
        self.keystream.zeroize();
        self.ciphertext.zeroize();
    }
}

/// Decrypting reader over an encrypted packet body.
pub struct CfbReader<R> {
    inner: R,
    cfb: Cfb,
}

impl<R: Read> CfbReader<R> {
    pub fn new(inner: R, cfb: Cfb) -> Self {
        Self { inner, cfb }
    }
}

impl<R: Read> Read for CfbReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.cfb.decrypt(&mut buf[..n]);
        Ok(n)
    }
}
