//! Command-line client for Cedros Pay.
//!
//! Requests quotes, pays them with a local Solana keypair (self-paid or
//! server-sponsored), and opens hosted card checkout sessions. Output is
//! JSON on stdout; logs go to stderr.
//!
//! # Modules
//!
//! - [`cli`] - Argument definitions
//! - [`commands`] - Command execution
//! - [`config`] - TOML configuration with environment variable expansion
//! - [`keypair`] - Solana keypair files
//! - [`error`] - [`CliError`]

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod keypair;

pub use cli::{Cli, Command};
pub use commands::run;
pub use config::CliConfig;
pub use error::CliError;
