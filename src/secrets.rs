//! Bearer token and API key management.
//!
//! Both secrets live encrypted in the option store. The bearer token may instead
//! come from the environment, but only together with an environment encryption
//! key; an environment-supplied secret is never regenerated at runtime. The
//! encryption key itself comes from the environment or is generated once and
//! kept in the option store.

use rand::RngCore;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use crate::crypto::{generate_key_material, SecretCipher};
use crate::error::SecretError;
use crate::store::OptionStore;

pub const ENV_ENCRYPTION_KEY: &str = "SLYMETRICS_ENCRYPTION_KEY";
pub const ENV_BEARER_TOKEN: &str = "SLYMETRICS_BEARER_TOKEN";

pub const BEARER_OPTION: &str = "slymetrics_auth_token";
pub const API_KEY_OPTION: &str = "slymetrics_api_key";
pub const ENCRYPTION_KEY_OPTION: &str = "slymetrics_encryption_key";

const TOKEN_BYTES: usize = 32;

/// Secret-related environment variables, captured once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretEnv {
    pub encryption_key: Option<String>,
    pub bearer_token: Option<String>,
}

impl SecretEnv {
    pub fn from_process() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            encryption_key: var(ENV_ENCRYPTION_KEY),
            bearer_token: var(ENV_BEARER_TOKEN),
        }
    }

    /// The environment bearer token only counts with an environment key.
    pub fn managed_bearer(&self) -> Option<&str> {
        match (&self.encryption_key, &self.bearer_token) {
            (Some(_), Some(token)) => Some(token.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretKind {
    BearerToken,
    ApiKey,
}

impl SecretKind {
    pub fn option_name(&self) -> &'static str {
        match self {
            SecretKind::BearerToken => BEARER_OPTION,
            SecretKind::ApiKey => API_KEY_OPTION,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SecretKind::BearerToken => "bearer token",
            SecretKind::ApiKey => "API key",
        }
    }
}

/// Where the active encryption key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Environment,
    Stored,
    /// No usable key; secrets are only base64 encoded.
    Degraded,
}

/// 64 hex characters from 32 random bytes.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

struct ActiveKey {
    cipher: Arc<SecretCipher>,
    source: KeySource,
}

pub struct SecretStore {
    options: Arc<dyn OptionStore>,
    env: SecretEnv,
    active: RwLock<ActiveKey>,
}

impl SecretStore {
    pub fn new(options: Arc<dyn OptionStore>, env: SecretEnv) -> Result<Self, SecretError> {
        let active = Self::load_key(options.as_ref(), &env)?;
        Ok(Self {
            options,
            env,
            active: RwLock::new(active),
        })
    }

    fn load_key(options: &dyn OptionStore, env: &SecretEnv) -> Result<ActiveKey, SecretError> {
        let (material, source) = match &env.encryption_key {
            Some(material) => (material.clone(), KeySource::Environment),
            None => match options.get(ENCRYPTION_KEY_OPTION) {
                Some(material) => (material, KeySource::Stored),
                None => {
                    let material = generate_key_material();
                    options.set(ENCRYPTION_KEY_OPTION, &material)?;
                    info!("Generated new encryption key for stored secrets");
                    (material, KeySource::Stored)
                }
            },
        };

        match SecretCipher::from_key_material(&material) {
            Ok(cipher) => Ok(ActiveKey {
                cipher: Arc::new(cipher),
                source,
            }),
            Err(e) => {
                warn!(
                    "Encryption key unusable ({}); stored secrets are only base64 encoded. \
                     Security is degraded until a valid key is configured",
                    e
                );
                Ok(ActiveKey {
                    cipher: Arc::new(SecretCipher::encoded_only()),
                    source: KeySource::Degraded,
                })
            }
        }
    }

    fn cipher(&self) -> Arc<SecretCipher> {
        let active = self.active.read().unwrap_or_else(|e| e.into_inner());
        active.cipher.clone()
    }

    pub fn key_source(&self) -> KeySource {
        let active = self.active.read().unwrap_or_else(|e| e.into_inner());
        active.source
    }

    pub fn bearer_from_env(&self) -> bool {
        self.env.managed_bearer().is_some()
    }

    /// Whether `kind` is supplied by the environment.
    pub fn is_env_managed(&self, kind: SecretKind) -> bool {
        kind == SecretKind::BearerToken && self.bearer_from_env()
    }

    fn decrypted(&self, option: &str) -> Option<String> {
        let stored = self.options.get(option)?;
        match self.cipher().decrypt(&stored) {
            Ok(value) if !value.is_empty() => Some(value),
            Ok(_) => None,
            Err(e) => {
                debug!("Stored secret {} could not be decrypted: {}", option, e);
                None
            }
        }
    }

    fn store_encrypted(&self, option: &str, value: &str) -> Result<(), SecretError> {
        let sealed = self.cipher().encrypt(value)?;
        self.options.set(option, &sealed)?;
        Ok(())
    }

    /// Current value of a secret. Unreadable stored values count as missing.
    pub fn get(&self, kind: SecretKind) -> Option<String> {
        if kind == SecretKind::BearerToken {
            if let Some(token) = self.env.managed_bearer() {
                return Some(token.to_string());
            }
        }
        self.decrypted(kind.option_name())
    }

    pub fn bearer_token(&self) -> Option<String> {
        self.get(SecretKind::BearerToken)
    }

    pub fn api_key(&self) -> Option<String> {
        self.get(SecretKind::ApiKey)
    }

    /// Generates every missing secret that is not environment supplied.
    /// Returns the kinds that were generated.
    pub fn ensure_tokens(&self) -> Result<Vec<SecretKind>, SecretError> {
        let mut generated = Vec::new();
        for kind in [SecretKind::BearerToken, SecretKind::ApiKey] {
            if self.is_env_managed(kind) || self.get(kind).is_some() {
                continue;
            }
            self.store_encrypted(kind.option_name(), &generate_token())?;
            info!("Generated new {}", kind.label());
            generated.push(kind);
        }
        Ok(generated)
    }

    /// Replaces a stored secret with a fresh token and returns it.
    pub fn regenerate(&self, kind: SecretKind) -> Result<String, SecretError> {
        if self.is_env_managed(kind) {
            return Err(SecretError::EnvironmentManaged(kind.label()));
        }
        let token = generate_token();
        self.store_encrypted(kind.option_name(), &token)?;
        info!("Regenerated {}", kind.label());
        Ok(token)
    }

    /// Generates a new stored encryption key and re-encrypts the stored secrets
    /// with it.
    pub fn rotate_encryption_key(&self) -> Result<(), SecretError> {
        if self.env.encryption_key.is_some() {
            return Err(SecretError::EnvironmentManaged("encryption key"));
        }

        let current: Vec<(&'static str, String)> = [SecretKind::BearerToken, SecretKind::ApiKey]
            .iter()
            .filter_map(|kind| {
                self.decrypted(kind.option_name())
                    .map(|value| (kind.option_name(), value))
            })
            .collect();

        let material = generate_key_material();
        let cipher = SecretCipher::from_key_material(&material)?;
        let resealed = current
            .iter()
            .map(|(option, value)| cipher.encrypt(value).map(|sealed| (*option, sealed)))
            .collect::<Result<Vec<_>, _>>()?;

        self.options.set(ENCRYPTION_KEY_OPTION, &material)?;
        for (option, sealed) in &resealed {
            self.options.set(option, sealed)?;
        }

        let mut active = self.active.write().unwrap_or_else(|e| e.into_inner());
        *active = ActiveKey {
            cipher: Arc::new(cipher),
            source: KeySource::Stored,
        };
        info!("Rotated encryption key, re-encrypted {} secrets", resealed.len());
        Ok(())
    }
}

impl std::fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretStore")
            .field("key_source", &self.key_source())
            .field("bearer_from_env", &self.bearer_from_env())
            .finish()
    }
}
