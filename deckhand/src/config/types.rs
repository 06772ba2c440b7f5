use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::agent::{DEFAULT_MAX_TOOL_INVOCATIONS, DEFAULT_MEMORY_WINDOW};
use crate::kubernetes::ARTIFACT_HUB_URL;

pub const DEFAULT_LLM_MODEL: &str = "gpt-4";
pub const DEFAULT_NATURAL_LANGUAGE: &str = "English";
pub const DEFAULT_HELM_PATH: &str = "helm";

/// Which capability catalog the agent runs with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Toolkit {
    #[default]
    Platform,
    Kubernetes,
}

impl fmt::Display for Toolkit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Toolkit::Platform => write!(f, "platform"),
            Toolkit::Kubernetes => write!(f, "kubernetes"),
        }
    }
}

impl FromStr for Toolkit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "platform" => Ok(Toolkit::Platform),
            "kubernetes" | "k8s" => Ok(Toolkit::Kubernetes),
            other => Err(format!("unknown toolkit '{}', expected platform or kubernetes", other)),
        }
    }
}

/// On-disk configuration file. Every key is optional; command-line flags and
/// environment variables win over anything set here.
///
/// ```toml
/// [platform]
/// api_url = "https://platform.example.com"
/// api_key = "..."
///
/// [llm]
/// model = "gpt-4"
///
/// [agent]
/// toolkit = "platform"
/// natural_language = "English"
/// max_tool_invocations = 10
///
/// [kubernetes]
/// helm_path = "helm"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub platform: PlatformSection,
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub kubernetes: KubernetesSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformSection {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub skip_tls_verify: Option<bool>,
    pub default_project: Option<String>,
    pub default_environment: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub toolkit: Option<Toolkit>,
    pub natural_language: Option<String>,
    pub show_reasoning: Option<bool>,
    pub max_tool_invocations: Option<usize>,
    /// Completed turns replayed into the prompt; 0 keeps all of them.
    pub memory_window: Option<usize>,
    pub auto_approve: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesSection {
    /// Helm binary, looked up on `PATH` unless absolute.
    pub helm_path: Option<String>,
    pub artifact_hub_url: Option<String>,
}

/// Fully resolved settings the console runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub toolkit: Toolkit,
    pub api_url: String,
    pub api_key: String,
    pub skip_tls_verify: bool,
    pub default_project: Option<String>,
    pub default_environment: Option<String>,
    pub llm_api_key: String,
    pub llm_model: String,
    pub llm_base_url: Option<String>,
    pub natural_language: String,
    pub show_reasoning: bool,
    pub max_tool_invocations: usize,
    pub memory_window: usize,
    pub auto_approve: bool,
    pub helm_path: String,
    pub artifact_hub_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            toolkit: Toolkit::Platform,
            api_url: String::new(),
            api_key: String::new(),
            skip_tls_verify: false,
            default_project: None,
            default_environment: None,
            llm_api_key: String::new(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            llm_base_url: None,
            natural_language: DEFAULT_NATURAL_LANGUAGE.to_string(),
            show_reasoning: true,
            max_tool_invocations: DEFAULT_MAX_TOOL_INVOCATIONS,
            memory_window: DEFAULT_MEMORY_WINDOW,
            auto_approve: false,
            helm_path: DEFAULT_HELM_PATH.to_string(),
            artifact_hub_url: ARTIFACT_HUB_URL.to_string(),
        }
    }
}
