//! Error types for the command-line client.

use std::path::PathBuf;

use cedros_pay::{ErrorCode, PaymentError};

/// Errors that end a CLI invocation.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// The config file exists but cannot be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// Config file path.
        path: PathBuf,
        /// The I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML of the expected shape.
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// The TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// Neither the config nor the command line names a backend.
    #[error("no server URL: set `manager.serverUrl` in the config, pass --server-url, or set CEDROS_SERVER_URL")]
    MissingServerUrl,

    /// A payment command was given no keypair.
    #[error("no keypair: set `keypair` in the config, pass --keypair, or set CEDROS_KEYPAIR")]
    MissingKeypair,

    /// The keypair file is unreadable or malformed.
    #[error("invalid keypair {}: {reason}", path.display())]
    Keypair {
        /// Keypair file path.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// The payment operation failed.
    #[error(transparent)]
    Payment(#[from] PaymentError),

    /// A result could not be rendered as JSON.
    #[error("cannot render output: {0}")]
    Output(#[from] serde_json::Error),
}

impl CliError {
    /// The payment error code, if this is a payment failure.
    #[must_use]
    pub const fn code(&self) -> Option<&ErrorCode> {
        match self {
            Self::Payment(err) => Some(&err.code),
            _ => None,
        }
    }
}
