//! Base64 transport wrapping for symmetric containers.
//!
//! `openssl enc -a` wraps its output at 64 columns, so whitespace is dropped
//! before the bytes reach the base64 decoder.

use std::io::{self, Read};

use base64::engine::general_purpose::STANDARD;
use base64::read::DecoderReader;

/// Streaming base64 decoder over `inner`, tolerant of line breaks.
pub fn base64_reader<R: Read>(inner: R) -> DecoderReader<'static, base64::engine::GeneralPurpose, StripWhitespace<R>> {
    DecoderReader::new(StripWhitespace::new(inner), &STANDARD)
}

/// Drops ASCII whitespace from the wrapped reader.
pub struct StripWhitespace<R> {
    inner: R,
}

impl<R: Read> StripWhitespace<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: Read> Read for StripWhitespace<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let n = self.inner.read(buf)?;
            if n == 0 {
                return Ok(0);
            }

            let mut kept = 0;
            for i in 0..n {
                let b = buf[i];
                if !b.is_ascii_whitespace() {
                    buf[kept] = b;
                    kept += 1;
                }
            }
            // a chunk of pure whitespace is not end of stream
            if kept > 0 {
                return Ok(kept);
            }
        }
    }
}
