use crate::errors::AppError;
use linefix_adapters::Config;
use linefix_engine::{ClientConfig, CompletionModel, LlmClient};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Shared handler state. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<AppInner>,
}

pub struct AppInner {
    /// `None` when no API key is configured; model routes then fail with 500.
    pub llm: Option<Arc<dyn CompletionModel>>,
    /// Model used when a request doesn't name one.
    pub default_model: String,
    pub python: PathBuf,
    pub static_dir: PathBuf,
}

impl AppState {
    pub fn new(inner: AppInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn from_config(config: &Config, project_root: &Path) -> anyhow::Result<Self> {
        let llm: Option<Arc<dyn CompletionModel>> = match &config.api_key {
            Some(api_key) => {
                let client = LlmClient::new(ClientConfig::new(
                    api_key.clone(),
                    config.server_model.clone(),
                    Duration::from_secs(config.timeout_secs),
                ))?;
                Some(Arc::new(client))
            }
            None => {
                tracing::warn!("GOOGLE_API_KEY is not set; model routes will fail");
                None
            }
        };

        Ok(Self::new(AppInner {
            llm,
            default_model: config.server_model.clone(),
            python: config.python_interpreter(project_root),
            static_dir: config.static_dir.clone(),
        }))
    }

    pub fn require_llm(&self) -> Result<&dyn CompletionModel, AppError> {
        self.inner
            .llm
            .as_deref()
            .ok_or_else(|| AppError::Internal("GOOGLE_API_KEY is not set on the server".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_disables_model_routes() {
        let state = AppState::from_config(&Config::default(), Path::new(".")).unwrap();
        let err = state.require_llm().err().unwrap();
        assert_eq!(err.to_string(), "GOOGLE_API_KEY is not set on the server");
        assert_eq!(state.inner.default_model, "gemini-2.5-pro");
    }

    #[test]
    fn key_enables_client() {
        let config = Config {
            api_key: Some("test-key".into()),
            ..Config::default()
        };
        let state = AppState::from_config(&config, Path::new(".")).unwrap();
        assert!(state.require_llm().is_ok());
    }
}
