//! Configuration: credentials, proxies and timeouts
//!
//! Replaces a process-wide credential singleton with an explicit [`Auth`]
//! object constructed once at startup and passed by reference into the
//! request engine.

mod auth;
mod secret;

pub use auth::Auth;
pub use secret::SecretString;

use thiserror::Error;

/// Failures while constructing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("API key must be non-empty")]
    EmptyKey,

    #[error("environment variable {var} is not set")]
    MissingEnv { var: String },

    #[error("key file {path} does not name a non-empty regular file")]
    InvalidKeyFile { path: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
