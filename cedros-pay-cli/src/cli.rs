//! Command-line definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Pay for Cedros-protected resources with Solana stablecoins or a card.
#[derive(Debug, Parser)]
#[command(name = "cedros-pay", version, about)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "CONFIG", default_value = "cedros.toml", global = true)]
    pub config: PathBuf,

    /// Base URL of the Cedros backend, overriding the config file.
    #[arg(short, long, env = "CEDROS_SERVER_URL", global = true)]
    pub server_url: Option<String>,

    /// Command to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Discover the backend's route prefix and print the resolved endpoints.
    Health,

    /// Request a quote for a resource without paying.
    Quote {
        /// Resource identifier.
        resource: String,

        /// Coupon code to apply.
        #[arg(long)]
        coupon: Option<String>,
    },

    /// Pay for a resource with the configured Solana keypair.
    Pay {
        /// Resource identifier.
        resource: String,

        /// Coupon code to apply.
        #[arg(long)]
        coupon: Option<String>,

        /// Keypair file, overriding the config file.
        #[arg(short, long, env = "CEDROS_KEYPAIR")]
        keypair: Option<PathBuf>,

        /// Let the server build and sponsor the transaction.
        #[arg(long)]
        gasless: bool,
    },

    /// Open a hosted card checkout session for a resource.
    Checkout {
        /// Resource identifier.
        resource: String,

        /// Where to send the buyer after payment.
        #[arg(long)]
        success_url: Option<String>,

        /// Where to send the buyer on cancel.
        #[arg(long)]
        cancel_url: Option<String>,

        /// Pre-filled customer email.
        #[arg(long)]
        email: Option<String>,

        /// Coupon code to apply.
        #[arg(long)]
        coupon: Option<String>,
    },
}
