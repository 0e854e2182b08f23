//! # blob-decrypt
//!
//! Streaming decryption of encrypted blobs.
//!
//! Two container families are understood:
//!
//! - **Symmetric**: OpenSSL `enc -aes-256-cbc` output. Either the salted
//!   form (`Salted__` || salt || ciphertext, key and IV from
//!   `EVP_BytesToKey` with MD5) or the legacy form (IV || ciphertext, key =
//!   SHA-256 of the password). Optionally base64 wrapped.
//! - **Envelope**: OpenPGP messages encrypted to an RSA or Curve25519 key,
//!   binary or ASCII armored.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::fs::File;
//!
//! let mut out = Vec::new();
//! let n = blob_decrypt::decrypt_symmetric(
//!     File::open("report.csv.enc")?,
//!     &mut out,
//!     "hunter2",
//!     false,
//!     None,
//! )?;
//! assert_eq!(n as usize, out.len());
//!
//! let ring = blob_decrypt::SecretKeyRing::from_reader(File::open("key.asc")?)?;
//! blob_decrypt::decrypt_envelope(File::open("report.csv.gpg")?, &mut out, &ring, "pass")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Guarantees
//!
//! - **Bounded memory**: input is streamed through fixed-size buffers.
//! - **Typed errors**: every failure is one [`DecryptError`] variant.
//! - **Scrubbed secrets**: derived keys, session keys and unlocked private
//!   keys are zeroized on every exit path.
//!
//! ## Caller Obligations
//!
//! Plaintext is written as it is produced. On any error, including
//! [`DecryptError::IntegrityCheckFailed`], whatever reached the sink must be
//! discarded.

#![deny(unsafe_code)]

// ---------------------------------------------------------------------------
// Modules
// ---------------------------------------------------------------------------

pub mod config;
mod encoding;
mod error;
mod header;
mod kdf;
pub mod pgp;
mod progress;
pub mod provider;
pub mod secrets;
mod stream;

use std::io::{Read, Write};

pub use config::{output_name, Config, ConfigError, Mode};
pub use error::DecryptError;
pub use header::{sniff, EncryptionHeader, HEADER_BYTES, SALTED_MAGIC};
pub use kdf::{derive_legacy, derive_salted, KeyMaterial};
pub use pgp::{EnvelopeInfo, KeyId, SecretKey, SecretKeyRing};
pub use progress::ProgressSink;
pub use secrets::{EnvSecretSource, SecretError, SecretSource, StaticSecrets};
pub use stream::{BUFFER_SIZE, PROGRESS_INTERVAL};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Decrypt an OpenSSL-style AES-256-CBC container from `source` into `sink`.
///
/// Set `is_base64` when the container is base64 text; whitespace inside it
/// is ignored. `progress` receives the cumulative plaintext count every
/// [`PROGRESS_INTERVAL`] bytes.
///
/// Returns the number of plaintext bytes written.
pub fn decrypt_symmetric<R: Read, W: Write>(
    source: R,
    mut sink: W,
    password: &str,
    is_base64: bool,
    progress: Option<&mut dyn ProgressSink>,
) -> Result<u64, DecryptError> {
    provider::init()?;

    if is_base64 {
        let mut decoded = encoding::base64_reader(source);
        symmetric_inner(&mut decoded, &mut sink, password, progress)
    } else {
        let mut source = source;
        symmetric_inner(&mut source, &mut sink, password, progress)
    }
}

fn symmetric_inner<R: Read, W: Write>(
    source: &mut R,
    sink: &mut W,
    password: &str,
    progress: Option<&mut dyn ProgressSink>,
) -> Result<u64, DecryptError> {
    let header = header::sniff(source)?;
    tracing::debug!(kind = header.kind(), "symmetric container");

    let key = header.derive(password);
    let written = stream::decrypt_cbc(source, sink, &key, progress)?;
    sink.flush().map_err(DecryptError::Output)?;
    Ok(written)
}

/// Decrypt an OpenPGP message addressed to a key in `ring`.
///
/// The first recipient whose key id is in the ring is used; its secret key
/// is unlocked with `passphrase`. Returns the number of literal data bytes
/// written.
pub fn decrypt_envelope<R: Read, W: Write>(
    source: R,
    mut sink: W,
    ring: &SecretKeyRing,
    passphrase: &str,
) -> Result<u64, DecryptError> {
    provider::init()?;
    let written = pgp::decrypt_envelope(source, &mut sink, ring, passphrase)?;
    sink.flush().map_err(DecryptError::Output)?;
    Ok(written)
}

/// What kind of container `source` holds, without decrypting it.
#[derive(Debug, Clone)]
pub enum ContainerInfo {
    Symmetric(EncryptionHeader),
    Envelope(EnvelopeInfo),
}

/// Describe a symmetric container's header.
pub fn inspect_symmetric<R: Read>(source: R, is_base64: bool) -> Result<ContainerInfo, DecryptError> {
    let header = if is_base64 {
        header::sniff(&mut encoding::base64_reader(source))?
    } else {
        let mut source = source;
        header::sniff(&mut source)?
    };
    Ok(ContainerInfo::Symmetric(header))
}

/// List the recipients of an OpenPGP message.
pub fn inspect_envelope<R: Read>(source: R) -> Result<ContainerInfo, DecryptError> {
    pgp::inspect(source).map(ContainerInfo::Envelope)
}
