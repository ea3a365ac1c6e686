//! Keypair files in the Solana CLI format: a JSON array of 64 bytes.

use std::path::Path;

use solana_keypair::Keypair;

use crate::error::CliError;

/// Reads a keypair file.
///
/// # Errors
///
/// Returns [`CliError::Keypair`] if the file cannot be read, is not a JSON
/// byte array, or does not hold a valid keypair.
pub fn load_keypair(path: &Path) -> Result<Keypair, CliError> {
    let invalid = |reason: String| CliError::Keypair {
        path: path.to_owned(),
        reason,
    };
    let content = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
    let bytes: Vec<u8> = serde_json::from_str(&content).map_err(|e| invalid(e.to_string()))?;
    Keypair::try_from(bytes.as_slice()).map_err(|e| invalid(e.to_string()))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use solana_signer::Signer;

    use super::*;

    fn temp_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("cedros-pay-{}-{name}", std::process::id()));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_keypair() {
        let keypair = Keypair::new();
        let json = serde_json::to_string(&keypair.to_bytes().to_vec()).unwrap();
        let path = temp_file("valid.json", &json);

        let loaded = load_keypair(&path).unwrap();
        assert_eq!(loaded.pubkey(), keypair.pubkey());
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_rejects_malformed_keypair() {
        let path = temp_file("short.json", "[1, 2, 3]");
        assert!(matches!(load_keypair(&path), Err(CliError::Keypair { .. })));
        std::fs::remove_file(&path).unwrap();

        let path = temp_file("text.json", "not json");
        assert!(matches!(load_keypair(&path), Err(CliError::Keypair { .. })));
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(
            load_keypair(Path::new("/nonexistent/id.json")),
            Err(CliError::Keypair { .. })
        ));
    }
}
