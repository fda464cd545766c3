//! Worker configuration

use std::path::Path;

use gamemaster_net::{UrlPattern, UrlPatternSet};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServiceWorkerError};

/// Immutable worker configuration, fixed for one deployed version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Cache name prefix; the store is named `<prefix>-v<version>`.
    pub cache_prefix: String,

    /// Deployed version, broadcast to clients after activation.
    pub version: String,

    /// Root-relative paths that must be cached before install succeeds.
    pub static_assets: Vec<String>,

    /// URL substrings that are never intercepted.
    pub bypass_hosts: Vec<String>,

    /// Path suffixes served network-first.
    pub document_extensions: Vec<String>,

    /// Last-resort fallback for document requests.
    pub root_document: String,

    /// Served to failed navigations that miss the cache
    pub navigation_fallback: String,

    /// Body of the synthetic 503 response.
    pub offline_body: String,

    /// Activate as soon as install finishes instead of waiting for old clients.
    pub skip_waiting_on_install: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            cache_prefix: "gamemaster".to_string(),
            version: "6".to_string(),
            static_assets: vec![
                "./".to_string(),
                "./index.html".to_string(),
                "./games.json".to_string(),
                "./manifest.json".to_string(),
            ],
            bypass_hosts: vec![
                "generativelanguage.googleapis.com".to_string(),
                "fonts.googleapis.com".to_string(),
                "fonts.gstatic.com".to_string(),
                "wikipedia.org".to_string(),
            ],
            document_extensions: vec![
                ".html".to_string(),
                ".htm".to_string(),
                ".json".to_string(),
            ],
            root_document: "./".to_string(),
            navigation_fallback: "./index.html".to_string(),
            offline_body: "Offline".to_string(),
            skip_waiting_on_install: true,
        }
    }
}

impl WorkerConfig {
    /// Name of the cache store owned by this version.
    pub fn cache_name(&self) -> String {
        format!("{}-v{}", self.cache_prefix, self.version)
    }

    /// Same configuration for a different deployed version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_prefix.trim().is_empty() {
            return Err(ServiceWorkerError::config("cache_prefix must not be empty"));
        }
        if self.version.trim().is_empty() {
            return Err(ServiceWorkerError::config("version must not be empty"));
        }
        let relative = [&self.root_document, &self.navigation_fallback]
            .into_iter()
            .chain(self.static_assets.iter());
        for path in relative {
            if !is_root_relative(path) {
                return Err(ServiceWorkerError::config(format!(
                    "'{path}' is not a root-relative path"
                )));
            }
        }
        if self.bypass_hosts.iter().any(|h| h.is_empty()) {
            return Err(ServiceWorkerError::config("bypass_hosts must not contain empty entries"));
        }
        Ok(())
    }

    pub(crate) fn bypass_patterns(&self) -> UrlPatternSet {
        UrlPatternSet::contains_any(&self.bypass_hosts)
    }

    pub(crate) fn document_patterns(&self) -> UrlPatternSet {
        self.document_extensions
            .iter()
            .map(|ext| UrlPattern::suffix(&ext.to_ascii_lowercase()))
            .collect()
    }
}

fn is_root_relative(path: &str) -> bool {
    path.starts_with("./") || (path.starts_with('/') && !path.starts_with("//"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cache_name() {
        let config = WorkerConfig::default();
        assert_eq!(config.cache_name(), "gamemaster-v6");
        assert_eq!(config.with_version("7").cache_name(), "gamemaster-v7");
    }

    #[test]
    fn test_default_manifest() {
        let config = WorkerConfig::default();
        assert_eq!(
            config.static_assets,
            vec!["./", "./index.html", "./games.json", "./manifest.json"]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = WorkerConfig::from_json_str(r#"{"version": "9"}"#).unwrap();
        assert_eq!(config.version, "9");
        assert_eq!(config.cache_prefix, "gamemaster");
        assert_eq!(config.bypass_hosts.len(), 4);
    }

    #[test]
    fn test_rejects_empty_version() {
        let err = WorkerConfig::from_json_str(r#"{"version": ""}"#).unwrap_err();
        assert!(matches!(err, ServiceWorkerError::Config(_)));
    }

    #[test]
    fn test_rejects_absolute_asset() {
        let json = r#"{"static_assets": ["https://cdn.example/app.js"]}"#;
        assert!(WorkerConfig::from_json_str(json).is_err());

        let json = r#"{"static_assets": ["//cdn.example/app.js"]}"#;
        assert!(WorkerConfig::from_json_str(json).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.json");
        std::fs::write(&path, r#"{"version": "12", "offline_body": "No signal"}"#).unwrap();

        let config = WorkerConfig::load(&path).unwrap();
        assert_eq!(config.cache_name(), "gamemaster-v12");
        assert_eq!(config.offline_body, "No signal");
    }

    #[test]
    fn test_json_roundtrip_is_stable() {
        let config = WorkerConfig::default();
        let json = config.to_json_pretty().unwrap();
        assert_eq!(WorkerConfig::from_json_str(&json).unwrap(), config);
    }
}
