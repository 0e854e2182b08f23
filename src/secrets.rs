//! Secret lookup for passwords and passphrases.
//!
//! The engine itself never fetches secrets; callers resolve them through a
//! [`SecretSource`] and hand plain strings to the entry points.

use std::collections::HashMap;

use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecretError {
    #[error("secret not found: {0}")]
    NotFound(String),

    #[error("secret {0} is empty")]
    Empty(String),

    #[error("secret {0} is not valid UTF-8")]
    NotUtf8(String),
}

/// A named-secret store.
pub trait SecretSource {
    fn get_secret(&self, name: &str) -> Result<Zeroizing<String>, SecretError>;

    /// Password for a symmetric container. Empty values are rejected.
    fn get_password(&self, name: &str) -> Result<Zeroizing<String>, SecretError> {
        let value = self.get_secret(name)?;
        if value.is_empty() {
            return Err(SecretError::Empty(name.to_string()));
        }
        Ok(value)
    }
}

/// Reads secrets from environment variables, optionally under a prefix.
#[derive(Debug, Clone, Default)]
pub struct EnvSecretSource {
    prefix: String,
}

impl EnvSecretSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// `with_prefix("APP_")` resolves `db` as `APP_db`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }
}

impl SecretSource for EnvSecretSource {
    fn get_secret(&self, name: &str) -> Result<Zeroizing<String>, SecretError> {
        let var = format!("{}{}", self.prefix, name);
        match std::env::var(&var) {
            Ok(v) => Ok(Zeroizing::new(v)),
            Err(std::env::VarError::NotPresent) => Err(SecretError::NotFound(var)),
            Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::NotUtf8(var)),
        }
    }
}

/// In-memory secrets, for embedding and tests.
#[derive(Default)]
pub struct StaticSecrets {
    values: HashMap<String, Zeroizing<String>>,
}

impl StaticSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), Zeroizing::new(value.into()));
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }
}

impl SecretSource for StaticSecrets {
    fn get_secret(&self, name: &str) -> Result<Zeroizing<String>, SecretError> {
        self.values
            .get(name)
            .cloned()
            .ok_or_else(|| SecretError::NotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_lookup() {
        let s = StaticSecrets::new().with("pw", "hunter2");
        assert_eq!(s.get_password("pw").unwrap().as_str(), "hunter2");
        assert_eq!(
            s.get_password("other").unwrap_err(),
            SecretError::NotFound("other".into())
        );
    }

    #[test]
    fn empty_password_rejected() {
        let s = StaticSecrets::new().with("pw", "");
        assert_eq!(s.get_password("pw").unwrap_err(), SecretError::Empty("pw".into()));
        // raw secrets may be empty (a key with no passphrase)
        assert!(s.get_secret("pw").unwrap().is_empty());
    }

    #[test]
    fn env_prefix_applies() {
        std::env::set_var("BLOB_DECRYPT_TEST_SECRET_a1", "value");
        let s = EnvSecretSource::with_prefix("BLOB_DECRYPT_TEST_SECRET_");
        assert_eq!(s.get_secret("a1").unwrap().as_str(), "value");
        assert_eq!(
            s.get_secret("missing").unwrap_err(),
            SecretError::NotFound("BLOB_DECRYPT_TEST_SECRET_missing".into())
        );
    }
}
