//! One-time cryptographic provider initialization.
//!
//! Runs known-answer tests for every primitive the engine relies on. The
//! result is computed once per process; later calls return the cached
//! outcome.

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes256, Block};
use md5::Md5;
use once_cell::sync::OnceCell;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::error::DecryptError;

static SELF_TEST: OnceCell<Result<(), &'static str>> = OnceCell::new();

// FIPS-197 appendix C.3
const AES256_KEY: [u8; 32] = [
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f,
    0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x1b, 0x1c, 0x1d, 0x1e, 0x1f,
];
const AES256_PT: [u8; 16] = [
    0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff,
];
const AES256_CT: [u8; 16] = [
    0x8e, 0xa2, 0xb7, 0xca, 0x51, 0x67, 0x45, 0xbf, 0xea, 0xfc, 0x49, 0x90, 0x4b, 0x49, 0x60, 0x89,
];

const MD5_ABC: [u8; 16] = [
    0x90, 0x01, 0x50, 0x98, 0x3c, 0xd2, 0x4f, 0xb0, 0xd6, 0x96, 0x3f, 0x7d, 0x28, 0xe1, 0x7f, 0x72,
];
const SHA1_ABC: [u8; 20] = [
    0xa9, 0x99, 0x3e, 0x36, 0x47, 0x06, 0x81, 0x6a, 0xba, 0x3e, 0x25, 0x71, 0x78, 0x50, 0xc2, 0x6c,
    0x9c, 0xd0, 0xd8, 0x9d,
];
const SHA256_ABC: [u8; 32] = [
    0xba, 0x78, 0x16, 0xbf, 0x8f, 0x01, 0xcf, 0xea, 0x41, 0x41, 0x40, 0xde, 0x5d, 0xae, 0x22, 0x23,
    0xb0, 0x03, 0x61, 0xa3, 0x96, 0x17, 0x7a, 0x9c, 0xb4, 0x10, 0xff, 0x61, 0xf2, 0x00, 0x15, 0xad,
];

/// Initialize the provider. Idempotent and safe to call from any thread.
pub fn init() -> Result<(), DecryptError> {
    let outcome = *SELF_TEST.get_or_init(|| {
        let outcome = self_test();
        match outcome {
            Ok(()) => tracing::debug!("crypto provider self test passed"),
            Err(what) => tracing::error!(primitive = what, "crypto provider self test failed"),
        }
        outcome
    });
    outcome.map_err(DecryptError::SelfTestFailed)
}

fn self_test() -> Result<(), &'static str> {
    let cipher = Aes256::new(&AES256_KEY.into());
    let mut block = Block::from(AES256_PT);
    cipher.encrypt_block(&mut block);
    if block.as_slice() != AES256_CT {
        return Err("aes-256 encrypt");
    }
    cipher.decrypt_block(&mut block);
    if block.as_slice() != AES256_PT {
        return Err("aes-256 decrypt");
    }

    if Md5::digest(b"abc").as_slice() != MD5_ABC {
        return Err("md5");
    }
    if Sha1::digest(b"abc").as_slice() != SHA1_ABC {
        return Err("sha-1");
    }
    if Sha256::digest(b"abc").as_slice() != SHA256_ABC {
        return Err("sha-256");
    }
    Ok(())
}
