//! Connector-side configuration: base URL and per-target API keys.

use me_types::AppResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::paths;

/// Key under `api_keys` that acts as the fallback for any target without
/// its own entry.
pub const DEFAULT_KEY: &str = "default";

/// Connector configuration document.
///
/// Schema: `{baseUrl?: string, apiKeys?: {default?: string, [targetId]: string}}`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Remote endpoint base URL. Absent means the built-in public endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// API keys by target id, plus the optional `default` fallback entry.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub api_keys: HashMap<String, String>,
}

impl ClientConfig {
    /// Look up the API key for a target: exact entry first, then `default`.
    pub fn api_key_for(&self, target_id: &str) -> Option<&str> {
        self.api_keys
            .get(target_id)
            .or_else(|| self.api_keys.get(DEFAULT_KEY))
            .map(String::as_str)
    }
}

/// Loads and saves [`ClientConfig`] from an ordered list of candidate paths.
#[derive(Debug, Clone)]
pub struct ClientConfigStore {
    candidates: Vec<PathBuf>,
}

impl ClientConfigStore {
    /// Store over the default candidate paths
    /// (`~/.mcpeverything/config.json`, `~/.config/mcpeverything/config.json`).
    pub fn new() -> AppResult<Self> {
        Ok(Self {
            candidates: paths::candidate_config_files()?,
        })
    }

    /// Store over explicit candidate paths. Used by tests and by callers
    /// that relocate the config directory.
    pub fn with_candidates(candidates: Vec<PathBuf>) -> Self {
        Self { candidates }
    }

    /// Load the first candidate that exists and parses as JSON.
    ///
    /// A file that exists but fails to parse is logged and skipped; if no
    /// candidate yields a config, an empty one is returned. This is never
    /// an error.
    pub fn load(&self) -> ClientConfig {
        for path in &self.candidates {
            if !path.exists() {
                continue;
            }
            let contents = match std::fs::read_to_string(path) {
                Ok(c) => c,
                Err(e) => {
                    warn!("Failed to read config file {}: {}", path.display(), e);
                    continue;
                }
            };
            match serde_json::from_str::<ClientConfig>(&contents) {
                Ok(config) => {
                    debug!("Loaded connector config from {}", path.display());
                    return config;
                }
                Err(e) => {
                    warn!(
                        "Config file {} is not valid JSON, ignoring: {}",
                        path.display(),
                        e
                    );
                }
            }
        }
        ClientConfig::default()
    }

    /// Write `config` to the primary candidate path as pretty-printed JSON,
    /// creating the parent directory if absent.
    pub fn save(&self, config: &ClientConfig) -> AppResult<()> {
        let path = self
            .candidates
            .first()
            .cloned()
            .unwrap_or(paths::config_file()?);
        if let Some(parent) = path.parent() {
            paths::ensure_dir_exists(&parent.to_path_buf())?;
        }
        let json = serde_json::to_string_pretty(config)?;
        std::fs::write(&path, json)?;
        debug!("Saved connector config to {}", path.display());
        Ok(())
    }
}
