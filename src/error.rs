//! Error taxonomy shared by both decryption paths.
//!
//! Every failure reaches the caller as a single [`DecryptError`]. Streaming
//! layers implement [`std::io::Read`], so they smuggle typed errors through
//! [`io::Error`] with [`DecryptError::into_io`] and the entry points recover
//! them with [`DecryptError::from_read`].

use std::io;

use thiserror::Error;

use crate::pgp::KeyId;

#[derive(Debug, Error)]
pub enum DecryptError {
    /// The container or packet structure is not what the format requires.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// Well-formed input that uses an algorithm or feature we do not handle.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Padding, quick-check or session key checksum failed. A wrong password
    /// and corrupted ciphertext are indistinguishable here.
    #[error("wrong password or corrupt data")]
    WrongPasswordOrCorruptData,

    #[error("no matching private key for any recipient")]
    NoMatchingPrivateKey,

    #[error("wrong passphrase for key {0}")]
    WrongPassphrase(KeyId),

    #[error("unsupported message type: {0}")]
    UnsupportedMessageType(String),

    /// The modification detection code did not match. Output already written
    /// must be discarded.
    #[error("integrity check failed")]
    IntegrityCheckFailed,

    #[error("input truncated or unreadable")]
    IoTruncated(#[source] io::Error),

    #[error("failed to write output")]
    Output(#[source] io::Error),

    #[error("cryptographic self test failed: {0}")]
    SelfTestFailed(&'static str),
}

impl DecryptError {
    /// Map an error raised while reading input.
    ///
    /// Typed errors wrapped by [`DecryptError::into_io`] are unwrapped as-is.
    /// `InvalidData` comes from the decoding layers (base64, deflate) and
    /// means the decrypted bytes were garbage. flate2 reports a corrupt
    /// stream as `InvalidInput`.
    pub(crate) fn from_read(err: io::Error) -> Self {
        let typed = err
            .get_ref()
            .map_or(false, |inner| inner.is::<DecryptError>());
        if !typed {
            return match err.kind() {
                io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput => {
                    DecryptError::WrongPasswordOrCorruptData
                }
                _ => DecryptError::IoTruncated(err),
            };
        }
        match err.into_inner().map(|inner| inner.downcast::<DecryptError>()) {
            Some(Ok(inner)) => *inner,
            _ => DecryptError::MalformedHeader("unrecognised inner error".into()),
        }
    }

    pub(crate) fn into_io(self) -> io::Error {
        match self {
            DecryptError::IoTruncated(err) => err,
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }

    pub(crate) fn truncated(what: &str) -> Self {
        DecryptError::IoTruncated(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("unexpected end of input: {}", what),
        ))
    }
}
