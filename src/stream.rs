//! Streaming AES-256-CBC decryption with PKCS#7 padding.
//!
//! One fixed buffer of `BUFFER_SIZE + 16` bytes. Every full buffer yields
//! exactly `BUFFER_SIZE` plaintext bytes; the last ciphertext block is always
//! held back so that padding is only checked on the true final block.

use std::io::{self, Read, Write};

use aes::cipher::{BlockDecrypt, KeyInit};
use aes::{Aes256Dec, Block};
use subtle::{Choice, ConstantTimeEq, ConstantTimeGreater};
use zeroize::Zeroizing;

use crate::error::DecryptError;
use crate::kdf::KeyMaterial;
use crate::progress::ProgressSink;

pub const BLOCK_BYTES: usize = 16;
pub const BUFFER_SIZE: usize = 8192;

/// Progress fires each time this many plaintext bytes have been written.
pub const PROGRESS_INTERVAL: u64 = BUFFER_SIZE as u64 * 1000;

/// Decrypt everything `source` yields into `sink`. Returns plaintext bytes
/// written.
pub fn decrypt_cbc<R: Read, W: Write>(
    source: &mut R,
    sink: &mut W,
    key: &KeyMaterial,
    mut progress: Option<&mut dyn ProgressSink>,
) -> Result<u64, DecryptError> {
    let cipher = Aes256Dec::new(key.key().into());
    let mut chain = Zeroizing::new(*key.iv());
    let mut buf = Zeroizing::new([0u8; BUFFER_SIZE + BLOCK_BYTES]);
    let mut held = 0usize;
    let mut written = 0u64;

    loop {
        held += read_full(source, &mut buf[held..])?;
        if held < buf.len() {
            break;
        }

        cbc_decrypt_in_place(&cipher, &mut chain, &mut buf[..BUFFER_SIZE]);
        emit(sink, &buf[..BUFFER_SIZE], &mut written, &mut progress)?;

        buf.copy_within(BUFFER_SIZE.., 0);
        held = BLOCK_BYTES;
    }

    if held == 0 {
        return Err(DecryptError::truncated("no ciphertext blocks"));
    }
    if held % BLOCK_BYTES != 0 {
        return Err(DecryptError::truncated("partial final cipher block"));
    }

    cbc_decrypt_in_place(&cipher, &mut chain, &mut buf[..held]);
    let pad = padding_len(&buf[held - BLOCK_BYTES..held])?;
    emit(sink, &buf[..held - pad], &mut written, &mut progress)?;

    tracing::trace!(bytes = written, "cbc stream finished");
    Ok(written)
}

fn cbc_decrypt_in_place(cipher: &Aes256Dec, chain: &mut [u8; BLOCK_BYTES], data: &mut [u8]) {
    for chunk in data.chunks_exact_mut(BLOCK_BYTES) {
        let mut ct = [0u8; BLOCK_BYTES];
        ct.copy_from_slice(chunk);

        let block = Block::from_mut_slice(chunk);
        cipher.decrypt_block(block);
        for (p, c) in chunk.iter_mut().zip(chain.iter()) {
            *p ^= c;
        }
        *chain = ct;
    }
}

/// Validate PKCS#7 padding on the final block without branching on its
/// contents.
fn padding_len(last: &[u8]) -> Result<usize, DecryptError> {
    let pad = last[BLOCK_BYTES - 1];
    let mut ok: Choice = !pad.ct_eq(&0) & !pad.ct_gt(&(BLOCK_BYTES as u8));

    for (i, &b) in last.iter().enumerate() {
        let from_end = (BLOCK_BYTES - i) as u8;
        let in_pad = !from_end.ct_gt(&pad);
        ok &= !in_pad | b.ct_eq(&pad);
    }

    if bool::from(ok) {
        Ok(pad as usize)
    } else {
        Err(DecryptError::WrongPasswordOrCorruptData)
    }
}

fn emit<W: Write>(
    sink: &mut W,
    data: &[u8],
    written: &mut u64,
    progress: &mut Option<&mut dyn ProgressSink>,
) -> Result<(), DecryptError> {
    if data.is_empty() {
        return Ok(());
    }
    sink.write_all(data).map_err(DecryptError::Output)?;
    *written += data.len() as u64;

    if *written % PROGRESS_INTERVAL == 0 {
        if let Some(p) = progress.as_deref_mut() {
            p.on_progress(*written);
        }
    }
    Ok(())
}

/// Fill `buf` unless the source ends first. Returns bytes read.
pub(crate) fn read_full<R: Read>(source: &mut R, buf: &mut [u8]) -> Result<usize, DecryptError> {
    let mut n = 0;
    while n < buf.len() {
        match source.read(&mut buf[n..]) {
            Ok(0) => break,
            Ok(k) => n += k,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(DecryptError::from_read(e)),
        }
    }
    Ok(n)
}
