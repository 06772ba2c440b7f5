//! Configuration: TOML file schema, resolution and validation.
//!
//! Resolution order is command line / environment, then the file, then
//! built-in defaults: the binary collects its flags into [`ConfigOverrides`],
//! fills the gaps from the file and resolves the rest.

pub mod types;

pub use types::*;

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    Parse { path: PathBuf, message: String },
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
    #[error("Invalid setting: {0}")]
    Invalid(String),
}

/// Read and parse a config file.
pub fn load_file_config(path: impl AsRef<Path>) -> Result<FileConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn fill<T: Clone>(slot: &mut Option<T>, fallback: &Option<T>) {
    if slot.is_none() {
        *slot = fallback.clone();
    }
}

/// Settings as collected from flags and environment. `None` means unset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub toolkit: Option<Toolkit>,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub skip_tls_verify: Option<bool>,
    pub default_project: Option<String>,
    pub default_environment: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_model: Option<String>,
    pub llm_base_url: Option<String>,
    pub natural_language: Option<String>,
    pub show_reasoning: Option<bool>,
    pub max_tool_invocations: Option<usize>,
    pub memory_window: Option<usize>,
    pub auto_approve: Option<bool>,
    pub helm_path: Option<String>,
    pub artifact_hub_url: Option<String>,
}

impl ConfigOverrides {
    /// Fill every unset value from the file.
    pub fn apply_file(mut self, file: &FileConfig) -> Self {
        fill(&mut self.toolkit, &file.agent.toolkit);
        fill(&mut self.api_url, &file.platform.api_url);
        fill(&mut self.api_key, &file.platform.api_key);
        fill(&mut self.skip_tls_verify, &file.platform.skip_tls_verify);
        fill(&mut self.default_project, &file.platform.default_project);
        fill(&mut self.default_environment, &file.platform.default_environment);
        fill(&mut self.llm_api_key, &file.llm.api_key);
        fill(&mut self.llm_model, &file.llm.model);
        fill(&mut self.llm_base_url, &file.llm.base_url);
        fill(&mut self.natural_language, &file.agent.natural_language);
        fill(&mut self.show_reasoning, &file.agent.show_reasoning);
        fill(&mut self.max_tool_invocations, &file.agent.max_tool_invocations);
        fill(&mut self.memory_window, &file.agent.memory_window);
        fill(&mut self.auto_approve, &file.agent.auto_approve);
        fill(&mut self.helm_path, &file.kubernetes.helm_path);
        fill(&mut self.artifact_hub_url, &file.kubernetes.artifact_hub_url);
        self
    }

    /// Resolve remaining gaps with defaults.
    pub fn resolve(self) -> AppConfig {
        let defaults = AppConfig::default();
        AppConfig {
            toolkit: self.toolkit.unwrap_or(defaults.toolkit),
            api_url: self.api_url.unwrap_or(defaults.api_url),
            api_key: self.api_key.unwrap_or(defaults.api_key),
            skip_tls_verify: self.skip_tls_verify.unwrap_or(defaults.skip_tls_verify),
            default_project: self.default_project.filter(|p| !p.is_empty()),
            default_environment: self.default_environment.filter(|e| !e.is_empty()),
            llm_api_key: self.llm_api_key.unwrap_or(defaults.llm_api_key),
            llm_model: self.llm_model.unwrap_or(defaults.llm_model),
            llm_base_url: self.llm_base_url.filter(|u| !u.is_empty()),
            natural_language: self.natural_language.unwrap_or(defaults.natural_language),
            show_reasoning: self.show_reasoning.unwrap_or(defaults.show_reasoning),
            max_tool_invocations: self
                .max_tool_invocations
                .unwrap_or(defaults.max_tool_invocations),
            memory_window: self.memory_window.unwrap_or(defaults.memory_window),
            auto_approve: self.auto_approve.unwrap_or(defaults.auto_approve),
            helm_path: self
                .helm_path
                .filter(|p| !p.trim().is_empty())
                .unwrap_or(defaults.helm_path),
            artifact_hub_url: self
                .artifact_hub_url
                .filter(|u| !u.trim().is_empty())
                .unwrap_or(defaults.artifact_hub_url),
        }
    }
}

impl AppConfig {
    /// Platform URL and key are only required by the platform toolkit; the
    /// Kubernetes toolkit reads the local kubeconfig instead.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.toolkit == Toolkit::Platform {
            self.validate_platform()?;
        }
        if self.llm_api_key.trim().is_empty() {
            return Err(ConfigError::Missing("LLM API key (--llm-api-key / OPENAI_API_KEY)"));
        }
        if self.llm_model.trim().is_empty() {
            return Err(ConfigError::Missing("LLM model"));
        }
        if self.max_tool_invocations == 0 {
            return Err(ConfigError::Invalid(
                "max_tool_invocations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_platform(&self) -> Result<(), ConfigError> {
        if self.api_url.trim().is_empty() {
            return Err(ConfigError::Missing("platform API URL (--api-url / DECKHAND_API_URL)"));
        }
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "platform API URL must be http(s): {}",
                self.api_url
            )));
        }
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::Missing("platform API key (--api-key / DECKHAND_API_KEY)"));
        }
        Ok(())
    }
}
