//! Token and key management commands.

use std::sync::Arc;

use slymetrics::config::Config;
use slymetrics::secrets::{SecretEnv, SecretKind, SecretStore};
use slymetrics::store::FileOptionStore;

use crate::cli::TokenKind;

fn open_secrets(config: &Config) -> Result<SecretStore, Box<dyn std::error::Error>> {
    let store = FileOptionStore::open(config.options_path())?;
    Ok(SecretStore::new(Arc::new(store), SecretEnv::from_process())?)
}

impl From<TokenKind> for SecretKind {
    fn from(kind: TokenKind) -> Self {
        match kind {
            TokenKind::Bearer => SecretKind::BearerToken,
            TokenKind::ApiKey => SecretKind::ApiKey,
        }
    }
}

/// Shows both secrets, or regenerates one of them.
pub fn command_tokens(
    regenerate: Option<TokenKind>,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let secrets = open_secrets(config)?;

    if let Some(kind) = regenerate {
        let kind = SecretKind::from(kind);
        let token = secrets.regenerate(kind)?;
        println!("✅ New {}: {}", kind.label(), token);
        return Ok(());
    }

    for kind in secrets.ensure_tokens()? {
        println!("ℹ️  Generated missing {}", kind.label());
    }
    for kind in [SecretKind::BearerToken, SecretKind::ApiKey] {
        let value = secrets.get(kind).unwrap_or_default();
        let origin = if secrets.is_env_managed(kind) {
            " (from environment)"
        } else {
            ""
        };
        println!("{}{}: {}", kind.label(), origin, value);
    }
    Ok(())
}

/// Rotates the stored encryption key.
pub fn command_rotate_key(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let secrets = open_secrets(config)?;
    secrets.rotate_encryption_key()?;
    println!(
        "✅ Encryption key rotated, secrets re-encrypted in {}",
        config.options_path().display()
    );
    Ok(())
}
