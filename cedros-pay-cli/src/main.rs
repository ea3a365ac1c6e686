//! The `cedros-pay` binary.
//!
//! # Usage
//!
//! ```bash
//! # Quote a resource
//! cedros-pay --server-url https://pay.example.com quote article-42
//!
//! # Pay with the keypair named in cedros.toml
//! cedros-pay pay article-42
//!
//! # Let the server sponsor the network fee
//! cedros-pay pay article-42 --gasless --keypair ~/.config/solana/id.json
//!
//! # Configure logging level
//! RUST_LOG=cedros_pay=debug cedros-pay health
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to TOML configuration file (default: `cedros.toml`)
//! - `CEDROS_SERVER_URL` - Override the backend URL
//! - `CEDROS_KEYPAIR` - Override the keypair path
//! - `RUST_LOG` - Log level filter (default: `info`)

use cedros_pay_cli::Cli;
use cedros_pay_http::CancelSignal;
use clap::Parser;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    #[cfg(feature = "telemetry")]
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cancel = CancelSignal::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel("interrupted");
            }
        })
    };

    let result = cedros_pay_cli::run(cli, &cancel).await;
    interrupt.abort();

    match result {
        Ok(output) => {
            #[allow(clippy::print_stdout)]
            {
                println!("{output:#}");
            }
        }
        Err(e) => {
            #[cfg(feature = "telemetry")]
            tracing::error!(code = ?e.code(), "command failed: {e}");

            #[allow(clippy::print_stderr)]
            {
                eprintln!("error: {e}");
            }
            std::process::exit(1);
        }
    }
}
