//! Generation settings and their durable key/value storage.
//!
//! Persisted settings live under a single key as a JSON object. Loading is
//! a shallow merge over defaults: recognized, well-typed fields win, anything
//! else is ignored, and unreadable data falls back to defaults.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::ClientError;

/// Storage key holding the serialized settings object.
pub const SETTINGS_STORAGE_KEY: &str = "cognicore-settings";

pub const DEFAULT_MODEL: &str = "google-ai-studio/gemini-2.5-flash";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

/// User-configurable generation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// Partial update for `set_settings`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsPatch {
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl SettingsPatch {
    pub fn model(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..Default::default()
        }
    }
}

impl Settings {
    /// Shallow merge of a patch. Temperature is clamped into `[0, 1]`,
    /// a zero token budget and a blank model are ignored.
    pub fn merged(&self, patch: &SettingsPatch) -> Settings {
        let mut merged = self.clone();
        if let Some(model) = patch.model.as_deref().map(str::trim) {
            if !model.is_empty() {
                merged.model = model.to_string();
            }
        }
        if let Some(temperature) = patch.temperature.filter(|t| t.is_finite()) {
            merged.temperature = temperature.clamp(0.0, 1.0);
        }
        if let Some(max_tokens) = patch.max_tokens.filter(|n| *n > 0) {
            merged.max_tokens = max_tokens;
        }
        merged
    }

    /// Merge a persisted JSON object over these settings.
    ///
    /// Unknown keys and wrong-typed or out-of-range values are skipped;
    /// a document that is not a JSON object is an error.
    pub fn merge_persisted(&self, raw: &str) -> Result<Settings, ClientError> {
        let Value::Object(map) = serde_json::from_str::<Value>(raw)? else {
            return Err(ClientError::Validation(
                "persisted settings are not a JSON object".to_string(),
            ));
        };

        let mut merged = self.clone();
        if let Some(model) = map
            .get("model")
            .and_then(Value::as_str)
            .filter(|m| !m.trim().is_empty())
        {
            merged.model = model.to_string();
        }
        if let Some(temperature) = map
            .get("temperature")
            .and_then(Value::as_f64)
            .filter(|t| (0.0..=1.0).contains(t))
        {
            merged.temperature = temperature;
        }
        if let Some(max_tokens) = map
            .get("maxTokens")
            .and_then(Value::as_u64)
            .filter(|n| *n > 0)
            .and_then(|n| u32::try_from(n).ok())
        {
            merged.max_tokens = max_tokens;
        }
        Ok(merged)
    }
}

/// Durable local key/value persistence
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, ClientError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), ClientError>;
}

/// Read persisted settings and merge them over the defaults.
/// Never fails: storage and parse errors leave the defaults in place.
pub async fn load_settings(store: &dyn SettingsStore) -> Settings {
    let defaults = Settings::default();
    let raw = match store.get(SETTINGS_STORAGE_KEY).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return defaults,
        Err(e) => {
            debug!(
                component = "settings",
                event = "settings.load_failed",
                error = %e,
                "Could not read persisted settings, using defaults"
            );
            return defaults;
        }
    };

    match defaults.merge_persisted(&raw) {
        Ok(settings) => settings,
        Err(e) => {
            debug!(
                component = "settings",
                event = "settings.parse_failed",
                error = %e,
                "Ignoring malformed persisted settings"
            );
            defaults
        }
    }
}

/// Write the full settings object under `SETTINGS_STORAGE_KEY`.
pub async fn save_settings(
    store: &dyn SettingsStore,
    settings: &Settings,
) -> Result<(), ClientError> {
    let raw = serde_json::to_string(settings)?;
    store.set(SETTINGS_STORAGE_KEY, &raw).await
}

/// JSON file holding a flat `{key: value}` object.
pub struct FileSettingsStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn read_all(&self) -> Result<HashMap<String, String>, ClientError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) if raw.trim().is_empty() => Ok(HashMap::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl SettingsStore for FileSettingsStore {
    async fn get(&self, key: &str) -> Result<Option<String>, ClientError> {
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), ClientError> {
        let _guard = self.write_lock.lock().await;
        // Corrupt files are overwritten.
        let mut entries = self.read_all().await.unwrap_or_default();
        entries.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&entries)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Process-local store, for ephemeral runs and tests.
#[derive(Default)]
pub struct MemorySettingsStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: &str, value: &str) -> Self {
        let store = Self::default();
        store.insert(key, value);
        store
    }

    fn insert(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }

    /// Current raw value under `key`
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn get(&self, key: &str) -> Result<Option<String>, ClientError> {
        Ok(self.raw(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), ClientError> {
        self.insert(key, value);
        Ok(())
    }
}
