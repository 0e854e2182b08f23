//! Encrypted message processing (RFC 4880 §11.3).
//!
//! ```text
//! [Marker] PKESK* [SKESK*] (SEIPD v1 | SED)
//!                               |
//!                     CFB ( prefix(18) || [Compressed] Literal || MDC(22) )
//! ```
//!
//! Each stage either hands a stream to the next one or fails the whole
//! message; nothing is retried.

use std::io::{self, Read, Write};

use flate2::read::{DeflateDecoder, ZlibDecoder};
use zeroize::Zeroizing;

use super::armor;
use super::cfb::{BlockCipher, Cfb, CfbReader, BLOCK_BYTES};
use super::keyring::{KeyId, SecretKeyRing};
use super::mdc::MdcReader;
use super::packet::{read_array, read_header, read_u8, read_vec, BodyLength, Header, PacketBody, Tag};
use super::session::{decrypt_session_key, EncryptedSessionKey};
use crate::error::DecryptError;
use crate::stream::BUFFER_SIZE;

/// Session key packets larger than this are rejected.
pub const MAX_SESSION_KEY_PACKET: usize = 64 * 1024;

/// Random prefix: one block plus two quick-check bytes.
const PREFIX_BYTES: usize = BLOCK_BYTES + 2;

const SEIPD_VERSION: u8 = 1;

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Everything before the encrypted data packet.
#[derive(Debug, Clone)]
struct Envelope {
    recipients: Vec<EncryptedSessionKey>,
    /// Tag 18 with an MDC, as opposed to legacy tag 9.
    integrity_protected: bool,
    data_length: BodyLength,
}

/// Summary of an envelope for display, without decrypting anything.
#[derive(Debug, Clone)]
pub struct EnvelopeInfo {
    pub armored: bool,
    pub integrity_protected: bool,
    pub recipients: Vec<KeyId>,
}

/// Read packets up to and including the header of the encrypted data
/// packet. For tag 18 the version octet is consumed as well.
fn read_envelope<R: Read>(input: &mut R) -> Result<Envelope, DecryptError> {
    let mut recipients = Vec::new();

    loop {
        let header = read_header(input)?
            .ok_or_else(|| DecryptError::MalformedHeader("no encrypted data packet".into()))?;
        let mut body = PacketBody::new(&mut *input, header.length);

        match header.tag {
            Tag::Marker => {
                body.skip()?;
            }
            Tag::PublicKeyEncryptedSessionKey => {
                let bytes = body.read_bounded(MAX_SESSION_KEY_PACKET)?;
                let pkesk = EncryptedSessionKey::parse(&bytes)?;
                tracing::trace!(key_id = %pkesk.key_id, algorithm = ?pkesk.algorithm, "recipient");
                recipients.push(pkesk);
            }
            Tag::SymmetricKeyEncryptedSessionKey => {
                body.skip()?;
            }
            Tag::SymEncryptedIntegrityProtectedData => {
                let version = read_u8(&mut body)?;
                if version != SEIPD_VERSION {
                    return Err(DecryptError::UnsupportedFormat(format!(
                        "encrypted data packet version {}",
                        version
                    )));
                }
                return Ok(Envelope {
                    recipients,
                    integrity_protected: true,
                    data_length: body_length_after_version(header),
                });
            }
            Tag::SymmetricallyEncryptedData => {
                return Ok(Envelope {
                    recipients,
                    integrity_protected: false,
                    data_length: header.length,
                });
            }
            Tag::AeadEncryptedData => {
                return Err(DecryptError::UnsupportedFormat("AEAD encrypted data".into()))
            }
            other => {
                return Err(DecryptError::MalformedHeader(format!(
                    "unexpected {:?} packet before encrypted data",
                    other
                )))
            }
        }
    }
}

/// The version octet has been read out of the first chunk.
fn body_length_after_version(header: Header) -> BodyLength {
    match header.length {
        BodyLength::Fixed(n) => BodyLength::Fixed(n.saturating_sub(1)),
        BodyLength::Partial(n) => BodyLength::Partial(n.saturating_sub(1)),
        BodyLength::Indeterminate => BodyLength::Indeterminate,
    }
}

/// List the recipients of a message.
pub fn inspect<R: Read>(source: R) -> Result<EnvelopeInfo, DecryptError> {
    let mut input = armor::dearmor(source)?;
    let armored = input.is_armored();
    let envelope = read_envelope(&mut input)?;
    Ok(EnvelopeInfo {
        armored,
        integrity_protected: envelope.integrity_protected,
        recipients: envelope.recipients.iter().map(|r| r.key_id).collect(),
    })
}

// ---------------------------------------------------------------------------
// Decryption
// ---------------------------------------------------------------------------

/// Decrypt an OpenPGP message for one of the keys in `ring`, writing the
/// literal data to `sink`. Returns the number of literal bytes written.
///
/// On [`DecryptError::IntegrityCheckFailed`] the literal data has already
/// been written and must be discarded.
pub fn decrypt_envelope<R: Read, W: Write>(
    source: R,
    sink: &mut W,
    ring: &SecretKeyRing,
    passphrase: &str,
) -> Result<u64, DecryptError> {
    let mut input = armor::dearmor(source)?;
    tracing::debug!(armored = input.is_armored(), "reading envelope");

    let envelope = read_envelope(&mut input)?;

    let recipient = envelope
        .recipients
        .iter()
        .find(|r| !r.key_id.is_wildcard() && ring.contains(r.key_id))
        .ok_or(DecryptError::NoMatchingPrivateKey)?;
    let entry = ring.get(recipient.key_id).ok_or(DecryptError::NoMatchingPrivateKey)?;
    tracing::debug!(key_id = %recipient.key_id, subkey = %entry.key_id(), "matched recipient");

    let unlocked = entry.unlock(passphrase)?;
    let session_key = decrypt_session_key(recipient, entry, &unlocked)?;
    drop(unlocked);
    tracing::debug!(algorithm = ?session_key.algorithm, "recovered session key");

    let cipher = BlockCipher::new(session_key.algorithm, &session_key.key)?;
    drop(session_key);

    let written = {
        let body = PacketBody::new(&mut input, envelope.data_length);
        let cfb = Cfb::new(cipher, [0u8; BLOCK_BYTES], !envelope.integrity_protected);
        let plain = CfbReader::new(body, cfb);
        let mut plain = if envelope.integrity_protected {
            MdcReader::protected(plain)
        } else {
            MdcReader::unprotected(plain)
        };

        check_prefix(&mut plain)?;
        let written = read_content(&mut plain, sink)?;

        io::copy(&mut plain, &mut io::sink()).map_err(DecryptError::from_read)?;
        let verified = plain.verify();
        tracing::debug!(
            protected = plain.is_protected(),
            ok = verified.is_ok(),
            "integrity check"
        );
        verified?;
        written
    };

    // runs the armor checksum, if any
    io::copy(&mut input, &mut io::sink()).map_err(DecryptError::from_read)?;
    Ok(written)
}

/// The last two prefix bytes repeat the two before them.
fn check_prefix<R: Read>(plain: &mut R) -> Result<(), DecryptError> {
    let prefix: Zeroizing<[u8; PREFIX_BYTES]> = Zeroizing::new(read_array(plain)?);
    if prefix[BLOCK_BYTES - 2..BLOCK_BYTES] != prefix[BLOCK_BYTES..] {
        return Err(DecryptError::WrongPasswordOrCorruptData);
    }
    Ok(())
}

/// Optional compressed data packet around the literal data packet.
fn read_content<R: Read, W: Write>(plain: &mut R, sink: &mut W) -> Result<u64, DecryptError> {
    let header = read_header(plain)?
        .ok_or_else(|| DecryptError::MalformedHeader("encrypted data is empty".into()))?;
    if header.tag != Tag::CompressedData {
        return read_literal(header, plain, sink);
    }

    let mut body = PacketBody::new(&mut *plain, header.length);
    let algorithm = read_u8(&mut body)?;
    tracing::debug!(algorithm, "compressed data");

    let written = match algorithm {
        0 => literal_then_drain(&mut body, sink)?,
        1 => literal_then_drain(&mut DeflateDecoder::new(&mut body), sink)?,
        2 => literal_then_drain(&mut ZlibDecoder::new(&mut body), sink)?,
        3 => return Err(DecryptError::UnsupportedFormat("BZip2 compression".into())),
        other => {
            return Err(DecryptError::UnsupportedFormat(format!(
                "compression algorithm {}",
                other
            )))
        }
    };
    // compressor trailer and padding, if the decoder stopped short
    body.skip()?;
    Ok(written)
}

fn literal_then_drain<R: Read, W: Write>(r: &mut R, sink: &mut W) -> Result<u64, DecryptError> {
    let header = read_header(r)?
        .ok_or_else(|| DecryptError::MalformedHeader("compressed data is empty".into()))?;
    let written = read_literal(header, r, sink)?;
    io::copy(r, &mut io::sink()).map_err(DecryptError::from_read)?;
    Ok(written)
}

/// Stream a literal data packet body to `sink`.
fn read_literal<R: Read, W: Write>(
    header: Header,
    r: &mut R,
    sink: &mut W,
) -> Result<u64, DecryptError> {
    match header.tag {
        Tag::LiteralData => {}
        Tag::OnePassSignature | Tag::Signature => {
            return Err(DecryptError::UnsupportedMessageType(
                "signed messages are not supported".into(),
            ))
        }
        Tag::CompressedData => {
            return Err(DecryptError::MalformedHeader("nested compressed data".into()))
        }
        other => {
            return Err(DecryptError::MalformedHeader(format!(
                "expected literal data, found {:?}",
                other
            )))
        }
    }

    let mut body = PacketBody::new(r, header.length);
    let format = read_u8(&mut body)?;
    let name_len = read_u8(&mut body)? as usize;
    let name = read_vec(&mut body, name_len)?;
    let date = u32::from_be_bytes(read_array(&mut body)?);
    tracing::trace!(
        format = %(format as char),
        name = %String::from_utf8_lossy(&name),
        date,
        "literal data"
    );

    let mut buf = Zeroizing::new(vec![0u8; BUFFER_SIZE]);
    let mut written = 0u64;
    loop {
        let n = match body.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(DecryptError::from_read(e)),
        };
        sink.write_all(&buf[..n]).map_err(DecryptError::Output)?;
        written += n as u64;
    }
    Ok(written)
}
