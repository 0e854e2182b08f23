//! Packet framing (RFC 4880 §4.2).
//!
//! Old format: 0b10tttt_ll, ll = 0 (1-byte len) | 1 (2) | 2 (4) | 3 (until EOF)
//! New format: 0b11tttttt, then 1/2/5 length octets or a partial body chunk

use std::io::{self, Read};

use zeroize::Zeroizing;

use crate::error::DecryptError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    PublicKeyEncryptedSessionKey,
    Signature,
    SymmetricKeyEncryptedSessionKey,
    OnePassSignature,
    SecretKey,
    PublicKey,
    SecretSubkey,
    CompressedData,
    SymmetricallyEncryptedData,
    Marker,
    LiteralData,
    Trust,
    UserId,
    PublicSubkey,
    UserAttribute,
    SymEncryptedIntegrityProtectedData,
    ModificationDetectionCode,
    AeadEncryptedData,
    Other(u8),
}

impl Tag {
    pub fn from_u8(tag: u8) -> Self {
        match tag {
            1 => Tag::PublicKeyEncryptedSessionKey,
            2 => Tag::Signature,
            3 => Tag::SymmetricKeyEncryptedSessionKey,
            4 => Tag::OnePassSignature,
            5 => Tag::SecretKey,
            6 => Tag::PublicKey,
            7 => Tag::SecretSubkey,
            8 => Tag::CompressedData,
            9 => Tag::SymmetricallyEncryptedData,
            10 => Tag::Marker,
            11 => Tag::LiteralData,
            12 => Tag::Trust,
            13 => Tag::UserId,
            14 => Tag::PublicSubkey,
            17 => Tag::UserAttribute,
            18 => Tag::SymEncryptedIntegrityProtectedData,
            19 => Tag::ModificationDetectionCode,
            20 => Tag::AeadEncryptedData,
            other => Tag::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyLength {
    Fixed(u32),
    /// First chunk of a partial-length body; more length octets follow it.
    Partial(u32),
    /// Old-format length type 3: the body runs to the end of the input.
    Indeterminate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub tag: Tag,
    pub length: BodyLength,
}

/// Read one packet header. `Ok(None)` means the input ended cleanly before
/// any header byte.
pub fn read_header<R: Read>(r: &mut R) -> Result<Option<Header>, DecryptError> {
    let mut first = [0u8; 1];
    loop {
        match r.read(&mut first) {
            Ok(0) => return Ok(None),
            Ok(_) => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(DecryptError::from_read(e)),
        }
    }
    let b = first[0];

    if b & 0x80 == 0 {
        return Err(DecryptError::MalformedHeader(format!(
            "invalid packet header byte 0x{:02x}",
            b
        )));
    }

    if b & 0x40 != 0 {
        let tag = Tag::from_u8(b & 0x3F);
        let length = read_new_length(r)?;
        return Ok(Some(Header { tag, length }));
    }

    let tag = Tag::from_u8((b >> 2) & 0x0F);
    let length = match b & 0x03 {
        0 => BodyLength::Fixed(read_u8(r)? as u32),
        1 => BodyLength::Fixed(read_u16(r)? as u32),
        2 => BodyLength::Fixed(read_u32(r)?),
        _ => BodyLength::Indeterminate,
    };
    Ok(Some(Header { tag, length }))
}

fn read_new_length<R: Read>(r: &mut R) -> Result<BodyLength, DecryptError> {
    let b = read_u8(r)?;
    Ok(match b {
        0..=191 => BodyLength::Fixed(b as u32),
        192..=223 => {
            let b2 = read_u8(r)?;
            BodyLength::Fixed((((b as u32) - 192) << 8) + b2 as u32 + 192)
        }
        224..=254 => BodyLength::Partial(1 << (b & 0x1F)),
        255 => BodyLength::Fixed(read_u32(r)?),
    })
}

/// Streaming view of one packet body, following partial-length chunks.
pub struct PacketBody<R> {
    inner: R,
    /// bytes left in the current chunk
    remaining: u32,
    more_chunks: bool,
    indeterminate: bool,
}

impl<R: Read> PacketBody<R> {
    pub fn new(inner: R, length: BodyLength) -> Self {
        match length {
            BodyLength::Fixed(n) => Self {
                inner,
                remaining: n,
                more_chunks: false,
                indeterminate: false,
            },
            BodyLength::Partial(n) => Self {
                inner,
                remaining: n,
                more_chunks: true,
                indeterminate: false,
            },
            BodyLength::Indeterminate => Self {
                inner,
                remaining: 0,
                more_chunks: false,
                indeterminate: true,
            },
        }
    }

    /// Read the rest of the body into memory, refusing bodies over `limit`.
    pub fn read_bounded(&mut self, limit: usize) -> Result<Zeroizing<Vec<u8>>, DecryptError> {
        let mut out = Zeroizing::new(Vec::new());
        let n = (&mut *self)
            .take(limit as u64 + 1)
            .read_to_end(&mut out)
            .map_err(DecryptError::from_read)?;
        if n > limit {
            return Err(DecryptError::MalformedHeader("packet body too large".into()));
        }
        Ok(out)
    }

    /// Discard whatever is left of the body.
    pub fn skip(&mut self) -> Result<u64, DecryptError> {
        io::copy(self, &mut io::sink()).map_err(DecryptError::from_read)
    }
}

impl<R: Read> Read for PacketBody<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.indeterminate {
            return self.inner.read(buf);
        }

        while self.remaining == 0 {
            if !self.more_chunks {
                return Ok(0);
            }
            match read_new_length(&mut self.inner).map_err(DecryptError::into_io)? {
                BodyLength::Partial(n) => self.remaining = n,
                BodyLength::Fixed(n) => {
                    self.remaining = n;
                    self.more_chunks = false;
                }
                BodyLength::Indeterminate => {
                    return Err(DecryptError::MalformedHeader("bad partial body length".into()).into_io())
                }
            }
        }

        let want = buf.len().min(self.remaining as usize);
        let n = self.inner.read(&mut buf[..want])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "packet body ended early",
            ));
        }
        self.remaining -= n as u32;
        Ok(n)
    }
}

// ---------------------------------------------------------------------------
// Scalar and MPI readers
// ---------------------------------------------------------------------------

pub(crate) fn read_array<R: Read, const N: usize>(r: &mut R) -> Result<[u8; N], DecryptError> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf).map_err(DecryptError::from_read)?;
    Ok(buf)
}

pub(crate) fn read_u8<R: Read>(r: &mut R) -> Result<u8, DecryptError> {
    Ok(read_array::<R, 1>(r)?[0])
}

pub(crate) fn read_u16<R: Read>(r: &mut R) -> Result<u16, DecryptError> {
    Ok(u16::from_be_bytes(read_array(r)?))
}

pub(crate) fn read_u32<R: Read>(r: &mut R) -> Result<u32, DecryptError> {
    Ok(u32::from_be_bytes(read_array(r)?))
}

pub(crate) fn read_vec<R: Read>(r: &mut R, len: usize) -> Result<Vec<u8>, DecryptError> {
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).map_err(DecryptError::from_read)?;
    Ok(buf)
}

/// Multiprecision integer: bit count[2] || big-endian magnitude.
pub(crate) fn read_mpi<R: Read>(r: &mut R) -> Result<Vec<u8>, DecryptError> {
    let bits = read_u16(r)? as usize;
    read_vec(r, (bits + 7) / 8)
}
