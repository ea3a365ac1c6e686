//! Solana clusters and the stablecoin mints accepted on each.
//!
//! Quotes name an asset by mint address. Unless a manager is configured with
//! `allow_unknown_mint`, a quote whose asset is not listed here for the
//! configured cluster is refused before any transaction is built.

use std::fmt;
use std::str::FromStr;

use serde_with::{DeserializeFromStr, SerializeDisplay};

use crate::error::{ErrorCode, PaymentError};

/// A Solana cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, SerializeDisplay, DeserializeFromStr)]
pub enum SolanaCluster {
    /// `mainnet-beta`
    #[default]
    MainnetBeta,
    /// `devnet`
    Devnet,
    /// `testnet`
    Testnet,
}

impl SolanaCluster {
    /// Cluster name as used in configuration, e.g. `"mainnet-beta"`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MainnetBeta => "mainnet-beta",
            Self::Devnet => "devnet",
            Self::Testnet => "testnet",
        }
    }

    /// x402 network name for requirements on this cluster.
    #[must_use]
    pub const fn network_name(self) -> &'static str {
        match self {
            Self::MainnetBeta => "solana",
            Self::Devnet => "solana-devnet",
            Self::Testnet => "solana-testnet",
        }
    }

    /// Public RPC endpoint for the cluster.
    #[must_use]
    pub const fn default_rpc_url(self) -> &'static str {
        match self {
            Self::MainnetBeta => "https://api.mainnet-beta.solana.com",
            Self::Devnet => "https://api.devnet.solana.com",
            Self::Testnet => "https://api.testnet.solana.com",
        }
    }

    /// Stablecoins accepted on the cluster.
    #[must_use]
    pub const fn known_assets(self) -> &'static [KnownAsset] {
        match self {
            Self::MainnetBeta => MAINNET_ASSETS,
            Self::Devnet => DEVNET_ASSETS,
            Self::Testnet => &[],
        }
    }

    /// Looks up a known asset by mint address.
    #[must_use]
    pub fn known_asset(self, mint: &str) -> Option<&'static KnownAsset> {
        self.known_assets().iter().find(|a| a.mint == mint)
    }
}

impl fmt::Display for SolanaCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognised cluster name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown Solana cluster `{0}`")]
pub struct UnknownCluster(pub String);

impl FromStr for SolanaCluster {
    type Err = UnknownCluster;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet-beta" | "mainnet" | "solana" => Ok(Self::MainnetBeta),
            "devnet" | "solana-devnet" => Ok(Self::Devnet),
            "testnet" | "solana-testnet" => Ok(Self::Testnet),
            other => Err(UnknownCluster(other.to_owned())),
        }
    }
}

/// A stablecoin mint known to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownAsset {
    /// Ticker, e.g. `"USDC"`.
    pub symbol: &'static str,
    /// Base58 mint address.
    pub mint: &'static str,
    /// Token decimals.
    pub decimals: u8,
}

const MAINNET_ASSETS: &[KnownAsset] = &[
    KnownAsset {
        symbol: "USDC",
        mint: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
        decimals: 6,
    },
    KnownAsset {
        symbol: "USDT",
        mint: "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB",
        decimals: 6,
    },
    KnownAsset {
        symbol: "PYUSD",
        mint: "2b1kV6DkPAnxd5ixfnxCpjxmKwqjjaYmCZfHsFu24GXo",
        decimals: 6,
    },
];

const DEVNET_ASSETS: &[KnownAsset] = &[KnownAsset {
    symbol: "USDC",
    mint: "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU",
    decimals: 6,
}];

/// Refuses assets that are not known on `cluster`, unless `allow_unknown` is set.
///
/// # Errors
///
/// Returns [`ErrorCode::UnknownAsset`] for an unlisted mint.
pub fn check_asset(
    cluster: SolanaCluster,
    mint: &str,
    allow_unknown: bool,
) -> Result<(), PaymentError> {
    if allow_unknown || cluster.known_asset(mint).is_some() {
        return Ok(());
    }
    Err(PaymentError::new(
        ErrorCode::UnknownAsset,
        format!("Token mint {mint} is not an accepted stablecoin on {cluster}"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_names() {
        assert_eq!("devnet".parse::<SolanaCluster>().unwrap(), SolanaCluster::Devnet);
        assert_eq!(
            "solana".parse::<SolanaCluster>().unwrap(),
            SolanaCluster::MainnetBeta
        );
        assert!("localnet".parse::<SolanaCluster>().is_err());
        assert_eq!(
            serde_json::to_string(&SolanaCluster::MainnetBeta).unwrap(),
            "\"mainnet-beta\""
        );
    }

    #[test]
    fn test_known_asset_lookup() {
        let usdc = SolanaCluster::MainnetBeta
            .known_asset("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v")
            .unwrap();
        assert_eq!(usdc.symbol, "USDC");
        assert!(
            SolanaCluster::Devnet
                .known_asset("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v")
                .is_none()
        );
    }

    #[test]
    fn test_check_asset() {
        let mint = "So11111111111111111111111111111111111111112";
        let err = check_asset(SolanaCluster::MainnetBeta, mint, false).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownAsset);
        assert!(check_asset(SolanaCluster::MainnetBeta, mint, true).is_ok());
    }
}
