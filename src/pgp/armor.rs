//! ASCII armor (RFC 4880 §6).
//!
//! ```text
//! -----BEGIN PGP MESSAGE-----
//! Key: value            (optional headers)
//!                       (blank line)
//! base64 body lines
//! =XXXX                 (optional CRC-24, base64 of 3 bytes)
//! -----END PGP MESSAGE-----
//! ```
//!
//! Decoding is line-at-a-time; the checksum is verified when the end line
//! is reached.

use std::io::{self, BufRead, BufReader, Read};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::DecryptError;

const CRC24_INIT: u32 = 0x00B7_04CE;
const CRC24_POLY: u32 = 0x0186_4CFB;

/// Longest line we accept before calling the armor malformed.
const MAX_LINE: usize = 16 * 1024;

pub fn crc24(mut crc: u32, data: &[u8]) -> u32 {
    for &b in data {
        crc ^= (b as u32) << 16;
        for _ in 0..8 {
            crc <<= 1;
            if crc & 0x0100_0000 != 0 {
                crc ^= CRC24_POLY;
            }
        }
    }
    crc & 0x00FF_FFFF
}

/// Binary or armored input, decided by the first byte.
pub enum Dearmored<R> {
    Binary(BufReader<R>),
    Armored(ArmorReader<BufReader<R>>),
}

impl<R: Read> Dearmored<R> {
    pub fn is_armored(&self) -> bool {
        matches!(self, Dearmored::Armored(_))
    }
}

impl<R: Read> Read for Dearmored<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Dearmored::Binary(r) => r.read(buf),
            Dearmored::Armored(r) => r.read(buf),
        }
    }
}

/// Peek at `source` and strip armor if present.
///
/// Every OpenPGP packet header has the high bit set, so anything else is
/// taken as armor.
pub fn dearmor<R: Read>(source: R) -> Result<Dearmored<R>, DecryptError> {
    let mut reader = BufReader::new(source);
    let first = reader.fill_buf().map_err(DecryptError::from_read)?;
    let armored = matches!(first.first(), Some(b) if b & 0x80 == 0);

    if armored {
        Ok(Dearmored::Armored(ArmorReader::new(reader)))
    } else {
        Ok(Dearmored::Binary(reader))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    BeginLine,
    Headers,
    Body,
    Done,
}

pub struct ArmorReader<R> {
    inner: R,
    state: State,
    line: String,
    /// base64 characters not yet forming a full quad
    carry: String,
    decoded: Vec<u8>,
    pos: usize,
    crc: u32,
    expected_crc: Option<u32>,
}

impl<R: BufRead> ArmorReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            state: State::BeginLine,
            line: String::new(),
            carry: String::new(),
            decoded: Vec::new(),
            pos: 0,
            crc: CRC24_INIT,
            expected_crc: None,
        }
    }

    /// Next raw line, or `None` at end of input.
    fn next_line(&mut self) -> Result<Option<&str>, DecryptError> {
        self.line.clear();
        let n = (&mut self.inner)
            .take(MAX_LINE as u64 + 1)
            .read_line(&mut self.line)
            .map_err(|e| match e.kind() {
                io::ErrorKind::InvalidData => DecryptError::MalformedHeader("armor is not text".into()),
                _ => DecryptError::from_read(e),
            })?;
        if n == 0 {
            return Ok(None);
        }
        if n > MAX_LINE {
            return Err(DecryptError::MalformedHeader("armor line too long".into()));
        }
        Ok(Some(self.line.as_str()))
    }

    /// Advance until at least one decoded byte is buffered or the armor ends.
    fn fill(&mut self) -> Result<(), DecryptError> {
        self.decoded.clear();
        self.pos = 0;

        while self.decoded.is_empty() && self.state != State::Done {
            let state = self.state;
            let line = match self.next_line()? {
                Some(l) => l.trim().to_string(),
                None => return Err(DecryptError::truncated("armor ended before END line")),
            };

            match state {
                State::BeginLine => {
                    if line.starts_with("-----BEGIN PGP ") {
                        self.state = State::Headers;
                    } else if !line.is_empty() {
                        return Err(DecryptError::MalformedHeader(
                            "input is neither an OpenPGP packet nor armor".into(),
                        ));
                    }
                }
                State::Headers => {
                    if line.is_empty() {
                        self.state = State::Body;
                    } else if !line.contains(": ") {
                        // no header block at all, this is already body
                        self.state = State::Body;
                        self.body_line(&line)?;
                    }
                }
                State::Body => self.body_line(&line)?,
                State::Done => {}
            }
        }
        Ok(())
    }

    fn body_line(&mut self, line: &str) -> Result<(), DecryptError> {
        if line.starts_with("-----END PGP ") {
            return self.finish();
        }
        if line.is_empty() {
            return Ok(());
        }
        if let Some(sum) = line.strip_prefix('=') {
            if self.expected_crc.is_some() {
                return Err(DecryptError::MalformedHeader("duplicate armor checksum".into()));
            }
            let bytes = STANDARD
                .decode(sum)
                .map_err(|_| DecryptError::MalformedHeader("invalid armor checksum".into()))?;
            if bytes.len() != 3 {
                return Err(DecryptError::MalformedHeader("invalid armor checksum".into()));
            }
            self.expected_crc =
                Some(((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | bytes[2] as u32);
            return Ok(());
        }
        if self.expected_crc.is_some() {
            return Err(DecryptError::MalformedHeader("armor data after checksum".into()));
        }

        self.carry.push_str(line);
        let whole = self.carry.len() / 4 * 4;
        if whole == 0 {
            return Ok(());
        }
        STANDARD
            .decode_vec(&self.carry[..whole], &mut self.decoded)
            .map_err(|_| DecryptError::MalformedHeader("invalid armor body".into()))?;
        self.carry.drain(..whole);
        self.crc = crc24(self.crc, &self.decoded);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), DecryptError> {
        if !self.carry.is_empty() {
            return Err(DecryptError::MalformedHeader("armor body is not whole base64".into()));
        }
        if let Some(expected) = self.expected_crc {
            if expected != self.crc {
                return Err(DecryptError::MalformedHeader("armor checksum mismatch".into()));
            }
        }
        self.state = State::Done;
        Ok(())
    }
}

impl<R: BufRead> Read for ArmorReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos == self.decoded.len() {
            self.fill().map_err(DecryptError::into_io)?;
        }
        let n = buf.len().min(self.decoded.len() - self.pos);
        buf[..n].copy_from_slice(&self.decoded[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
