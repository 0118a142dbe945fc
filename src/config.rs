/// Application configuration
///
/// Loaded from `$WARKAH_CONFIG` or `<config dir>/warkah-kasih/config.toml`.
/// Every field has a default so a missing file or a partial file still
/// starts the app; API keys can also come from the environment.
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::AppError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub gemini: GeminiConfig,
    pub firebase: FirebaseConfig,
    pub previews: PreviewConfig,
}

/// Gemini inference endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-2.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
        }
    }
}

/// Firebase project settings (auth + Firestore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirebaseConfig {
    pub api_key: String,
    pub project_id: String,
    /// Namespace under `artifacts/` holding the shared config document.
    pub app_id: String,
    pub auth_base_url: String,
    /// Secure Token service, used to refresh expiring ID tokens.
    pub token_base_url: String,
    /// Serves both the REST writes and the gRPC listen channel.
    pub firestore_base_url: String,
}

impl Default for FirebaseConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            project_id: String::new(),
            app_id: String::new(),
            auth_base_url: "https://identitytoolkit.googleapis.com".to_string(),
            token_base_url: "https://securetoken.googleapis.com".to_string(),
            firestore_base_url: "https://firestore.googleapis.com".to_string(),
        }
    }
}

/// Where preview copies of uploaded images are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Defaults to `<cache dir>/warkah-kasih/previews`.
    pub dir: Option<PathBuf>,
}

impl PreviewConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            let mut path = dirs::cache_dir()
                .or_else(dirs::home_dir)
                .unwrap_or_else(std::env::temp_dir);
            path.push("warkah-kasih");
            path.push("previews");
            path
        })
    }
}

impl AppConfig {
    /// Load the config file if present, then apply environment overrides.
    pub fn load() -> Result<Self, AppError> {
        let path = Self::default_path();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            info!(path = %path.display(), "no config file, using defaults");
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.warn_missing();
        Ok(config)
    }

    /// Parse a TOML config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let content = std::fs::read_to_string(path).map_err(|source| AppError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&content).map_err(|source| AppError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "📁 config loaded");
        Ok(config)
    }

    /// `$WARKAH_CONFIG`, else `<config dir>/warkah-kasih/config.toml`.
    pub fn default_path() -> PathBuf {
        if let Some(path) = std::env::var_os("WARKAH_CONFIG") {
            return PathBuf::from(path);
        }
        let mut path = dirs::config_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(std::env::temp_dir);
        path.push("warkah-kasih");
        path.push("config.toml");
        path
    }

    /// Environment keys win over the file. `API_KEY` is accepted for Gemini
    /// when `GEMINI_API_KEY` is unset.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("GEMINI_API_KEY").or_else(|| non_empty("API_KEY")) {
            self.gemini.api_key = key;
        }
        if let Some(key) = non_empty("FIREBASE_API_KEY") {
            self.firebase.api_key = key;
        }
    }

    fn warn_missing(&self) {
        if self.gemini.api_key.is_empty() {
            warn!("Gemini API key is not set; AI requests will be rejected");
        }
        if self.firebase.api_key.is_empty() || self.firebase.project_id.is_empty() {
            warn!("Firebase project is not configured; sign-in and remote config will fail");
        }
    }
}
