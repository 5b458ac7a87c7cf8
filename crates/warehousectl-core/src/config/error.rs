//! Configuration errors

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Cannot encode config: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("Unknown config key '{key}'")]
    UnknownKey { key: String },

    #[error("Invalid value '{value}' for '{key}': expected {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: String,
    },

    /// A stored secret could not be turned into its value
    #[error("Client secret unavailable: {0}")]
    Secret(String),

    #[error("No home directory to place the config file in")]
    NoConfigDir,
}

pub type Result<T> = std::result::Result<T, ConfigError>;
