//! `linefix config`: show the saved settings or update them in place.

use anyhow::Result;
use linefix_adapters::Config;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Fields to change. Anything left `None` keeps its stored value.
#[derive(Debug, Default)]
pub struct ConfigUpdate {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub fallback_model: Option<String>,
    pub server_model: Option<String>,
    pub timeout_secs: Option<u64>,
    pub port: Option<u16>,
    pub python: Option<PathBuf>,
}

impl ConfigUpdate {
    fn is_empty(&self) -> bool {
        self.api_key.is_none()
            && self.model.is_none()
            && self.fallback_model.is_none()
            && self.server_model.is_none()
            && self.timeout_secs.is_none()
            && self.port.is_none()
            && self.python.is_none()
    }

    fn apply_to(self, config: &mut Config) {
        if let Some(api_key) = self.api_key {
            config.api_key = Some(api_key);
        }
        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(model) = self.fallback_model {
            config.fallback_model = model;
        }
        if let Some(model) = self.server_model {
            config.server_model = model;
        }
        if let Some(timeout) = self.timeout_secs {
            config.timeout_secs = timeout;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(python) = self.python {
            config.python = Some(python);
        }
    }
}

pub fn run(update: ConfigUpdate) -> Result<()> {
    let path = Config::config_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    update_file(&path, update, &mut std::io::stdout().lock())
}

/// Only the file is read and written here; environment overrides are left
/// out so they never get persisted.
pub fn update_file(path: &Path, update: ConfigUpdate, out: &mut dyn Write) -> Result<()> {
    let mut config = Config::load_from(path);
    if !update.is_empty() {
        update.apply_to(&mut config);
        config.save_to(path)?;
        tracing::info!(path = %path.display(), "saved configuration");
        writeln!(out, "Saved settings to {}.", path.display())?;
    }

    let stored = Config::load_from(path);
    let api_key = if stored.has_api_key() {
        "set"
    } else {
        "not set (GOOGLE_API_KEY is used when exported)"
    };
    writeln!(out, "api_key:        {}", api_key)?;
    writeln!(out, "model:          {}", stored.model)?;
    writeln!(out, "fallback_model: {}", stored.fallback_model)?;
    writeln!(out, "server_model:   {}", stored.server_model)?;
    writeln!(out, "timeout_secs:   {}", stored.timeout_secs)?;
    writeln!(out, "port:           {}", stored.port)?;
    match &stored.python {
        Some(python) => writeln!(out, "python:         {}", python.display())?,
        None => writeln!(out, "python:         (auto)")?,
    }
    Ok(())
}
