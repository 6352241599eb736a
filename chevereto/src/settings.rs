//! Per-user Chevereto connection settings.
//!
//! The record lives in the settings store as four flat keys under the
//! `chevereto.` prefix. It is validated and normalized once, when saved.
use config_store::{ConfigBatch, ConfigStore, ConfigValue, StoreError};
use serde::{Deserialize, Serialize};

/// Key prefix shared by every setting of this integration.
pub const INTEGRATION: &str = "chevereto";

const ENABLED: &str = "enabled";
const DOMAIN: &str = "domain";
const API_KEY: &str = "api_key";
const ALBUM_ID: &str = "album_id";

fn key(field: &str) -> String {
    format!("{INTEGRATION}.{field}")
}

#[derive(thiserror::Error, Debug)]
pub enum SettingsError {
    #[error("Domain and API Key are required to enable Chevereto")]
    MissingCredentials,

    #[error("Failed to load Chevereto settings")]
    Load(#[source] StoreError),

    #[error("Failed to save Chevereto settings")]
    Save(#[source] StoreError),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub enabled: bool,
    /// Base URL of the Chevereto instance, without trailing slashes.
    pub domain: String,
    pub api_key: String,
    /// Destination album. Empty means no album.
    pub album_id: String,
}

/// Trims whitespace and strips every trailing `/`.
pub fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_end_matches('/').to_string()
}

impl ConnectionSettings {
    /// Canonicalizes the record before it is persisted. Enabling requires both
    /// a domain and an API key.
    pub fn normalize(self) -> Result<Self, SettingsError> {
        let domain = normalize_domain(&self.domain);
        let api_key = self.api_key.trim().to_string();

        if self.enabled && (domain.is_empty() || api_key.is_empty()) {
            return Err(SettingsError::MissingCredentials);
        }

        Ok(ConnectionSettings {
            domain,
            api_key,
            ..self
        })
    }

    /// True when the record carries everything needed to reach the remote.
    pub fn has_credentials(&self) -> bool {
        !self.domain.trim().is_empty() && !self.api_key.trim().is_empty()
    }

    /// Reads the record for `user_id`. Keys that were never written take
    /// their default value.
    pub async fn load(store: &dyn ConfigStore, user_id: &str) -> Result<Self, SettingsError> {
        let enabled = store
            .get_bool(user_id, &key(ENABLED))
            .await
            .map_err(SettingsError::Load)?;
        let domain = store
            .get_string(user_id, &key(DOMAIN))
            .await
            .map_err(SettingsError::Load)?;
        let api_key = store
            .get_string(user_id, &key(API_KEY))
            .await
            .map_err(SettingsError::Load)?;
        let album_id = store
            .get_string(user_id, &key(ALBUM_ID))
            .await
            .map_err(SettingsError::Load)?;

        Ok(ConnectionSettings {
            enabled: enabled.unwrap_or_default(),
            domain: domain.unwrap_or_default(),
            api_key: api_key.unwrap_or_default(),
            album_id: album_id.unwrap_or_default(),
        })
    }

    /// Writes all four keys in one batch.
    pub async fn save(&self, store: &dyn ConfigStore, user_id: &str) -> Result<(), SettingsError> {
        store
            .set_batch(user_id, self.to_batch())
            .await
            .map_err(SettingsError::Save)
    }

    fn to_batch(&self) -> ConfigBatch {
        ConfigBatch::from([
            (key(ENABLED), ConfigValue::from(self.enabled)),
            (key(DOMAIN), ConfigValue::from(self.domain.as_str())),
            (key(API_KEY), ConfigValue::from(self.api_key.as_str())),
            (key(ALBUM_ID), ConfigValue::from(self.album_id.as_str())),
        ])
    }
}
