//! Environment-driven configuration.
//!
//! | variable                 | used by   | meaning                              |
//! |--------------------------|-----------|--------------------------------------|
//! | `BLOB_DECRYPT_MODE`      | both      | `symmetric` (default) or `envelope`  |
//! | `ENCRYPTION_SECRET_NAME` | symmetric | secret holding the container password|
//! | `INPUT_BASE64`           | symmetric | `true`/`false`, default `false`      |
//! | `PRIVATE_KEY_PATH`       | envelope  | secret key ring file                 |
//! | `PASSPHRASE_SECRET_NAME` | envelope  | secret holding the key passphrase    |

use std::path::PathBuf;

use thiserror::Error;

pub const ENV_MODE: &str = "BLOB_DECRYPT_MODE";
pub const ENV_ENCRYPTION_SECRET_NAME: &str = "ENCRYPTION_SECRET_NAME";
pub const ENV_INPUT_BASE64: &str = "INPUT_BASE64";
pub const ENV_PRIVATE_KEY_PATH: &str = "PRIVATE_KEY_PATH";
pub const ENV_PASSPHRASE_SECRET_NAME: &str = "PASSPHRASE_SECRET_NAME";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    Missing(&'static str),

    #[error("environment variable {name} has invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Symmetric {
        secret_name: String,
        base64: bool,
    },
    Envelope {
        private_key_path: PathBuf,
        passphrase_secret_name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub mode: Mode,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any name → value lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &'static str| -> Option<String> {
            lookup(name).filter(|v| !v.trim().is_empty())
        };
        let require = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let mode = match get(ENV_MODE).as_deref().map(str::trim) {
            None | Some("symmetric") => Mode::Symmetric {
                secret_name: require(ENV_ENCRYPTION_SECRET_NAME)?,
                base64: match get(ENV_INPUT_BASE64) {
                    None => false,
                    Some(v) => parse_bool(ENV_INPUT_BASE64, &v)?,
                },
            },
            Some("envelope") => Mode::Envelope {
                private_key_path: PathBuf::from(require(ENV_PRIVATE_KEY_PATH)?),
                passphrase_secret_name: require(ENV_PASSPHRASE_SECRET_NAME)?,
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: ENV_MODE,
                    value: other.to_string(),
                })
            }
        };

        Ok(Self { mode })
    }
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        }),
    }
}

/// Name for the decrypted copy of `input`: known encrypted extensions are
/// stripped, anything else gets `.dec` appended.
pub fn output_name(input: &str) -> String {
    for ext in [".enc", ".gpg", ".pgp", ".asc"] {
        if let Some(stem) = input.strip_suffix(ext) {
            if !stem.is_empty() && !stem.ends_with('/') {
                return stem.to_string();
            }
        }
    }
    format!("{}.dec", input)
}
