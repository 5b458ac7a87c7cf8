//! Service principal secret storage
//!
//! `credential.client_secret` holds either the secret itself or a
//! `keyring:<entry>` reference into the OS keyring. References only resolve
//! in builds with the `secure-storage` feature.

use super::error::{ConfigError, Result};
use std::fmt;

const KEYRING_PREFIX: &str = "keyring:";

#[cfg(feature = "secure-storage")]
const KEYRING_SERVICE: &str = "warehousectl";

/// A secret as written in the config file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoredSecret<'a> {
    /// Name of an OS keyring entry
    Keyring(&'a str),
    Plaintext(&'a str),
}

impl<'a> StoredSecret<'a> {
    pub fn parse(value: &'a str) -> Self {
        match value.strip_prefix(KEYRING_PREFIX) {
            Some(entry) => StoredSecret::Keyring(entry),
            None => StoredSecret::Plaintext(value),
        }
    }

    pub fn is_keyring(&self) -> bool {
        matches!(self, StoredSecret::Keyring(_))
    }

    /// The secret itself, read from the keyring if needed
    pub fn reveal(&self) -> Result<String> {
        match *self {
            StoredSecret::Plaintext(value) => Ok(value.to_string()),
            StoredSecret::Keyring(entry) => read_keyring(entry),
        }
    }
}

/// Where newly entered secrets are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretBackend {
    Keyring,
    Plaintext,
}

impl SecretBackend {
    /// The keyring when it is compiled in and reachable, plaintext otherwise
    pub fn detect() -> Self {
        #[cfg(feature = "secure-storage")]
        {
            if keyring::Entry::new(KEYRING_SERVICE, "__probe__").is_ok() {
                return SecretBackend::Keyring;
            }
        }
        SecretBackend::Plaintext
    }

    /// Save `secret` under `entry` and return the value for the config file
    pub fn save(self, entry: &str, secret: &str) -> Result<String> {
        match self {
            SecretBackend::Keyring => {
                write_keyring(entry, secret)?;
                Ok(format!("{}{}", KEYRING_PREFIX, entry))
            }
            SecretBackend::Plaintext => Ok(secret.to_string()),
        }
    }
}

impl fmt::Display for SecretBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretBackend::Keyring => write!(f, "keyring"),
            SecretBackend::Plaintext => write!(f, "plaintext"),
        }
    }
}

#[cfg(feature = "secure-storage")]
fn read_keyring(entry: &str) -> Result<String> {
    keyring::Entry::new(KEYRING_SERVICE, entry)
        .and_then(|e| e.get_password())
        .map_err(|e| ConfigError::Secret(format!("keyring entry '{}': {}", entry, e)))
}

#[cfg(not(feature = "secure-storage"))]
fn read_keyring(entry: &str) -> Result<String> {
    Err(ConfigError::Secret(format!(
        "'{}{}' needs a build with the secure-storage feature",
        KEYRING_PREFIX, entry
    )))
}

#[cfg(feature = "secure-storage")]
fn write_keyring(entry: &str, secret: &str) -> Result<()> {
    keyring::Entry::new(KEYRING_SERVICE, entry)
        .and_then(|e| e.set_password(secret))
        .map_err(|e| ConfigError::Secret(format!("keyring entry '{}': {}", entry, e)))
}

#[cfg(not(feature = "secure-storage"))]
fn write_keyring(entry: &str, _secret: &str) -> Result<()> {
    Err(ConfigError::Secret(format!(
        "cannot store '{}' without the secure-storage feature",
        entry
    )))
}
