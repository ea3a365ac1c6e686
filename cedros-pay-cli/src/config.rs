//! CLI configuration.
//!
//! Loads a TOML file, then expands environment variables inside its string
//! values. Variables use `$VAR` or `${VAR}` syntax; unresolved variables are
//! left as they are. Keys and non-string values are never expanded, so a
//! variable cannot change the shape of the document.
//!
//! # Example Configuration
//!
//! ```toml
//! keypair = "${HOME}/.config/solana/id.json"
//! computeUnitPrice = 5000
//!
//! [manager]
//! serverUrl = "https://pay.example.com"
//! solanaCluster = "devnet"
//! stripePublicKey = "$STRIPE_PUBLIC_KEY"
//! timeoutMs = 10000
//!
//! [manager.x402.retry]
//! maxRetries = 2
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to configuration file (default: `cedros.toml`)
//! - `CEDROS_SERVER_URL` - Override `manager.serverUrl`
//! - `CEDROS_KEYPAIR` - Override `keypair`

use std::path::{Path, PathBuf};

use cedros_pay_http::ManagerConfig;
use serde::Deserialize;

use crate::error::CliError;

/// Top-level CLI configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CliConfig {
    /// Path to a Solana keypair file (JSON array of 64 bytes).
    #[serde(default)]
    pub keypair: Option<PathBuf>,

    /// Priority fee in micro-lamports per compute unit.
    #[serde(default)]
    pub compute_unit_price: Option<u64>,

    /// Backend and resilience settings.
    #[serde(default)]
    pub manager: Option<ManagerConfig>,
}

impl CliConfig {
    /// Loads configuration from `path`, expanding environment variables.
    ///
    /// A missing file yields the default (empty) configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Read`] or [`CliError::Parse`].
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let content = if path.exists() {
            std::fs::read_to_string(path).map_err(|source| CliError::Read {
                path: path.to_owned(),
                source,
            })?
        } else {
            String::new()
        };
        Self::parse(&content, |name| std::env::var(name).ok()).map_err(|source| CliError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    /// Parses TOML text, expanding variables in string values through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns the TOML error.
    pub fn parse(
        content: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, toml::de::Error> {
        let mut document = toml::Value::Table(toml::from_str(content)?);
        expand_value(&mut document, &lookup);
        document.try_into()
    }

    /// The manager config, with `server_url` taking precedence over the file.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::MissingServerUrl`] if no server URL is known.
    pub fn manager_config(&self, server_url: Option<&str>) -> Result<ManagerConfig, CliError> {
        match (self.manager.clone(), server_url) {
            (Some(mut config), Some(url)) => {
                config.server_url = url.to_owned();
                Ok(config)
            }
            (Some(config), None) => Ok(config),
            (None, Some(url)) => Ok(ManagerConfig::new(url)),
            (None, None) => Err(CliError::MissingServerUrl),
        }
    }
}

/// Expands every string inside `value`.
fn expand_value<F: Fn(&str) -> Option<String>>(value: &mut toml::Value, lookup: &F) {
    match value {
        toml::Value::String(text) => *text = expand_vars(text, lookup),
        toml::Value::Array(items) => {
            for item in items {
                expand_value(item, lookup);
            }
        }
        toml::Value::Table(table) => {
            for item in table.values_mut() {
                expand_value(item, lookup);
            }
        }
        _ => {}
    }
}

/// Expands `$VAR` and `${VAR}` through `lookup`.
fn expand_vars(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            output.push(ch);
            continue;
        }
        let braced = chars.next_if_eq(&'{').is_some();
        let mut name = String::new();
        let mut closed = false;
        while let Some(&c) = chars.peek() {
            if braced && c == '}' {
                chars.next();
                closed = true;
                break;
            }
            if !braced && !(c.is_ascii_alphanumeric() || c == '_') {
                break;
            }
            name.push(c);
            chars.next();
        }

        match lookup(&name).filter(|_| !name.is_empty()) {
            Some(value) => output.push_str(&value),
            None => {
                output.push('$');
                if braced {
                    output.push('{');
                }
                output.push_str(&name);
                if closed {
                    output.push('}');
                }
            }
        }
    }

    output
}
