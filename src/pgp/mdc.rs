//! Modification detection code (RFC 4880 §5.13, §5.14).
//!
//! The last 22 bytes of a tag 18 plaintext are an MDC packet:
//! `0xD3 0x14 || SHA-1(prefix || data || 0xD3 0x14)`. They are held back from
//! the packet parser and checked once the stream is exhausted.

use std::io::{self, Read};

use sha1::{Digest, Sha1};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::error::DecryptError;

pub const MDC_PACKET_BYTES: usize = 22;
const MDC_HEADER: [u8; 2] = [0xD3, 0x14];
const WINDOW: usize = 8192;

pub struct MdcReader<R> {
    inner: R,
    hasher: Option<Sha1>,
    buf: Box<[u8]>,
    start: usize,
    end: usize,
    eof: bool,
}

impl<R: Read> MdcReader<R> {
    /// Hash and hold back the trailing MDC packet.
    pub fn protected(inner: R) -> Self {
        Self::new(inner, Some(Sha1::new()))
    }

    /// No MDC to check: bytes pass straight through.
    pub fn unprotected(inner: R) -> Self {
        Self::new(inner, None)
    }

    fn new(inner: R, hasher: Option<Sha1>) -> Self {
        Self {
            inner,
            hasher,
            buf: vec![0u8; WINDOW + MDC_PACKET_BYTES].into_boxed_slice(),
            start: 0,
            end: 0,
            eof: false,
        }
    }

    pub fn is_protected(&self) -> bool {
        self.hasher.is_some()
    }

    fn holdback(&self) -> usize {
        if self.is_protected() {
            MDC_PACKET_BYTES
        } else {
            0
        }
    }

    /// Top up the window until more than the held-back tail is buffered.
    fn fill(&mut self) -> io::Result<()> {
        if self.start > 0 {
            self.buf.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }
        while !self.eof && self.end <= self.holdback() {
            let n = self.inner.read(&mut self.buf[self.end..])?;
            if n == 0 {
                self.eof = true;
            }
            self.end += n;
        }
        // opportunistic top-up so small reads do not each hit the cipher
        if !self.eof && self.end < self.buf.len() {
            let n = self.inner.read(&mut self.buf[self.end..])?;
            if n == 0 {
                self.eof = true;
            }
            self.end += n;
        }
        Ok(())
    }

    /// Check the trailing MDC packet. Only meaningful once `read` has
    /// returned 0; unprotected streams always pass.
    pub fn verify(&mut self) -> Result<(), DecryptError> {
        if !self.is_protected() {
            return Ok(());
        }
        let mut probe = [0u8; 1];
        if self.read(&mut probe).map_err(DecryptError::from_read)? != 0 {
            return Err(DecryptError::MalformedHeader("data after literal packet".into()));
        }

        let tail = &self.buf[self.start..self.end];
        if tail.len() != MDC_PACKET_BYTES || tail[..2] != MDC_HEADER {
            return Err(DecryptError::IntegrityCheckFailed);
        }

        let mut hasher = match self.hasher.take() {
            Some(h) => h,
            None => return Ok(()),
        };
        hasher.update(MDC_HEADER);
        let digest = hasher.finalize();

        if bool::from(digest.as_slice().ct_eq(&tail[2..])) {
            Ok(())
        } else {
            Err(DecryptError::IntegrityCheckFailed)
        }
    }
}

impl<R: Read> Read for MdcReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        if self.end - self.start <= self.holdback() {
            self.fill()?;
        }

        let available = (self.end - self.start).saturating_sub(self.holdback());
        let n = available.min(out.len());
        let chunk = &self.buf[self.start..self.start + n];
        out[..n].copy_from_slice(chunk);
        if let Some(h) = self.hasher.as_mut() {
            h.update(chunk);
        }
        self.start += n;
        Ok(n)
    }
}

impl<R> Drop for MdcReader<R> {
    fn drop(&mut self) {
        self.buf.zeroize();
    }
}
