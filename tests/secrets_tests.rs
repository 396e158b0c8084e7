//! Integration tests for persisted secrets.
//!
//! These tests run the secret store over a real options file.

use std::sync::Arc;
use tempfile::TempDir;

use slymetrics::crypto::{generate_key_material, SecretCipher};
use slymetrics::error::SecretError;
use slymetrics::secrets::{
    KeySource, SecretEnv, SecretKind, SecretStore, API_KEY_OPTION, BEARER_OPTION,
    ENCRYPTION_KEY_OPTION,
};
use slymetrics::store::{FileOptionStore, OptionStore};

fn open(dir: &TempDir, env: SecretEnv) -> (Arc<FileOptionStore>, SecretStore) {
    let options = Arc::new(FileOptionStore::open(dir.path().join("options.json")).unwrap());
    let secrets = SecretStore::new(options.clone(), env).unwrap();
    (options, secrets)
}

#[test]
fn test_tokens_survive_restart() {
    let dir = TempDir::new().unwrap();
    let (options, secrets) = open(&dir, SecretEnv::default());
    let generated = secrets.ensure_tokens().unwrap();
    assert_eq!(generated, vec![SecretKind::BearerToken, SecretKind::ApiKey]);

    let bearer = secrets.bearer_token().unwrap();
    assert_eq!(bearer.len(), 64);
    assert!(bearer.chars().all(|c| c.is_ascii_hexdigit()));

    // Stored values are sealed, never the plaintext.
    let stored = options.get(BEARER_OPTION).unwrap();
    assert_ne!(stored, bearer);

    let (_, reopened) = open(&dir, SecretEnv::default());
    assert_eq!(reopened.key_source(), KeySource::Stored);
    assert_eq!(reopened.bearer_token().as_deref(), Some(bearer.as_str()));
    assert!(reopened.ensure_tokens().unwrap().is_empty());
}

#[test]
fn test_rotation_keeps_secrets_readable() {
    let dir = TempDir::new().unwrap();
    let (options, secrets) = open(&dir, SecretEnv::default());
    secrets.ensure_tokens().unwrap();
    let bearer = secrets.bearer_token().unwrap();
    let api_key = secrets.api_key().unwrap();
    let old_key = options.get(ENCRYPTION_KEY_OPTION).unwrap();
    let old_sealed = options.get(API_KEY_OPTION).unwrap();

    secrets.rotate_encryption_key().unwrap();

    assert_ne!(options.get(ENCRYPTION_KEY_OPTION).unwrap(), old_key);
    assert_ne!(options.get(API_KEY_OPTION).unwrap(), old_sealed);
    assert_eq!(secrets.bearer_token().as_deref(), Some(bearer.as_str()));
    assert_eq!(secrets.api_key().as_deref(), Some(api_key.as_str()));

    // The old key no longer opens the new ciphertext.
    let old_cipher = SecretCipher::from_key_material(&old_key).unwrap();
    assert!(old_cipher
        .decrypt(&options.get(API_KEY_OPTION).unwrap())
        .is_err());

    let (_, reopened) = open(&dir, SecretEnv::default());
    assert_eq!(reopened.api_key().as_deref(), Some(api_key.as_str()));
}

#[test]
fn test_environment_supplied_secrets() {
    let dir = TempDir::new().unwrap();
    let env = SecretEnv {
        encryption_key: Some(generate_key_material()),
        bearer_token: Some("from-env".into()),
    };
    let (options, secrets) = open(&dir, env);

    assert_eq!(secrets.key_source(), KeySource::Environment);
    assert!(options.get(ENCRYPTION_KEY_OPTION).is_none());
    assert_eq!(secrets.bearer_token().as_deref(), Some("from-env"));

    assert_eq!(secrets.ensure_tokens().unwrap(), vec![SecretKind::ApiKey]);
    assert!(matches!(
        secrets.regenerate(SecretKind::BearerToken),
        Err(SecretError::EnvironmentManaged(_))
    ));
    assert!(matches!(
        secrets.rotate_encryption_key(),
        Err(SecretError::EnvironmentManaged(_))
    ));
}

#[test]
fn test_unusable_environment_key_degrades() {
    let dir = TempDir::new().unwrap();
    let env = SecretEnv {
        encryption_key: Some("not base64 !!".into()),
        bearer_token: None,
    };
    let (_, secrets) = open(&dir, env);
    assert_eq!(secrets.key_source(), KeySource::Degraded);

    let token = secrets.regenerate(SecretKind::ApiKey).unwrap();
    assert_eq!(secrets.api_key().as_deref(), Some(token.as_str()));
}
