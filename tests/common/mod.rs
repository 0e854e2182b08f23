#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use aes::cipher::{BlockEncrypt, KeyInit};
use aes::{Aes256Enc, Block};
use blob_decrypt::{derive_legacy, derive_salted, SecretKeyRing};

pub const KEY_PASSPHRASE: &str = "pass";
pub const RSA_PRIMARY: u64 = 0x623F_AB77_677E_282A;
pub const RSA_SUBKEY: u64 = 0x9D33_4425_CBF4_7563;
pub const CV25519_SUBKEY: u64 = 0xDC37_C930_0DA9_B06F;

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn fixture(name: &str) -> Vec<u8> {
    fs::read(fixture_path(name)).unwrap()
}

/// Plaintext of the `*_pattern*` fixtures.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

pub fn rsa_ring() -> SecretKeyRing {
    SecretKeyRing::from_reader(&fixture("rsa_secret_key.asc")[..]).unwrap()
}

pub fn cv25519_ring() -> SecretKeyRing {
    SecretKeyRing::from_reader(&fixture("cv25519_secret_key.gpg")[..]).unwrap()
}

/// AES-256-CBC with PKCS#7 padding.
pub fn encrypt_cbc(key: &[u8; 32], iv: &[u8; 16], plaintext: &[u8]) -> Vec<u8> {
    let cipher = Aes256Enc::new(key.into());
    let pad = 16 - plaintext.len() % 16;
    let mut data = plaintext.to_vec();
    data.extend(std::iter::repeat(pad as u8).take(pad));

    let mut chain = *iv;
    for chunk in data.chunks_exact_mut(16) {
        for (b, c) in chunk.iter_mut().zip(chain.iter()) {
            *b ^= c;
        }
        cipher.encrypt_block(Block::from_mut_slice(chunk));
        chain.copy_from_slice(chunk);
    }
    data
}

/// Same bytes as `openssl enc -aes-256-cbc -md md5 -S <salt>`.
pub fn salted_container(password: &str, salt: [u8; 8], plaintext: &[u8]) -> Vec<u8> {
    let km = derive_salted(password, &salt);
    let mut out = b"Salted__".to_vec();
    out.extend_from_slice(&salt);
    out.extend_from_slice(&encrypt_cbc(km.key(), km.iv(), plaintext));
    out
}

pub fn legacy_container(password: &str, iv: [u8; 16], plaintext: &[u8]) -> Vec<u8> {
    let km = derive_legacy(password, &iv);
    let mut out = iv.to_vec();
    out.extend_from_slice(&encrypt_cbc(km.key(), &iv, plaintext));
    out
}
