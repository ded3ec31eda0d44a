//! Configuration management for linefix
//!
//! Stores settings in ~/.config/linefix/config.json. Environment variables
//! override whatever the file says; the resolved [`Config`] is then passed
//! explicitly to the pieces that need it.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_MODEL: &str = "gemini-1.5-pro-latest";
pub const DEFAULT_FALLBACK_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_SERVER_MODEL: &str = "gemini-2.5-pro";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_PORT: u16 = 5174;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Google Generative Language API key. Usually supplied via GOOGLE_API_KEY.
    pub api_key: Option<String>,
    /// Model used by the command-line fixer.
    pub model: String,
    /// Tried once when the primary model call fails.
    pub fallback_model: String,
    /// Default model for web requests that don't name one.
    pub server_model: String,
    pub timeout_secs: u64,
    /// Interpreter used to execute snippets (`/api/run`).
    pub python: Option<PathBuf>,
    pub port: u16,
    pub static_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            fallback_model: DEFAULT_FALLBACK_MODEL.to_string(),
            server_model: DEFAULT_SERVER_MODEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            python: None,
            port: DEFAULT_PORT,
            static_dir: PathBuf::from("static"),
        }
    }
}

impl Config {
    fn sanitize(&mut self) {
        if self
            .api_key
            .as_deref()
            .is_some_and(|key| key.trim().is_empty())
        {
            self.api_key = None;
        }
        if self.model.trim().is_empty() {
            self.model = DEFAULT_MODEL.to_string();
        }
        if self.fallback_model.trim().is_empty() {
            self.fallback_model = DEFAULT_FALLBACK_MODEL.to_string();
        }
        if self.server_model.trim().is_empty() {
            self.server_model = DEFAULT_SERVER_MODEL.to_string();
        }
        self.timeout_secs = self.timeout_secs.max(1);
    }

    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("linefix"))
    }

    /// Where the config file lives, if a config directory exists.
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load the config file (if any) and apply environment overrides.
    pub fn load() -> Self {
        let from_file = Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default();
        from_file.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Load config from `path`, or return default.
    ///
    /// A file that fails to parse is moved aside to `config.json.corrupt` so
    /// the next save doesn't silently destroy it.
    pub fn load_from(path: &Path) -> Self {
        if let Ok(content) = fs::read_to_string(path) {
            match serde_json::from_str::<Config>(&content) {
                Ok(mut config) => {
                    config.sanitize();
                    return config;
                }
                Err(err) => {
                    preserve_corrupt_config(path, &content);
                    tracing::warn!(
                        path = %path.display(),
                        "config file was corrupted ({}); a backup was saved and defaults were loaded",
                        err
                    );
                }
            }
        }
        Self::default()
    }

    /// Overlay values from the environment. `lookup` is `std::env::var` in
    /// production and a map in tests.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("GOOGLE_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(model) = non_empty("LINEFIX_MODEL") {
            self.model = model;
        }
        if let Some(model) = non_empty("FAST_MODEL") {
            self.server_model = model;
        }
        if let Some(python) = non_empty("VENV_PY") {
            self.python = Some(PathBuf::from(python));
        }
        if let Some(port) = non_empty("PORT") {
            match port.trim().parse::<u16>() {
                Ok(port) => self.port = port,
                Err(_) => tracing::warn!(%port, "ignoring invalid PORT"),
            }
        }

        self.sanitize();
        self
    }

    /// Interpreter for snippet execution: configured path, then a project
    /// `.venv`, then `python3` from PATH.
    pub fn python_interpreter(&self, project_root: &Path) -> PathBuf {
        if let Some(python) = &self.python {
            return python.clone();
        }
        let venv = project_root.join(".venv").join("bin").join("python");
        if venv.exists() {
            return venv;
        }
        PathBuf::from("python3")
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Write the config as private (0600) JSON, sanitized first.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        let mut sanitized = self.clone();
        sanitized.sanitize();
        let content = serde_json::to_string_pretty(&sanitized)?;
        crate::fs::write_private(path, &content)
    }

    /// Get the config file location for display
    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "~/.config/linefix/config.json".to_string())
    }
}

fn preserve_corrupt_config(path: &Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}
