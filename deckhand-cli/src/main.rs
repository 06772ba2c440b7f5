//! deckhand console
//!
//! Interactive natural-language console for the application platform or a
//! Kubernetes cluster:
//! - Resolves the starting project/environment (platform toolkit)
//! - Builds the capability catalog of the selected toolkit
//! - Runs the query loop until `exit`, `quit` or Ctrl-D
//!
//! Usage:
//!   deckhand --api-url <URL> --api-key <KEY> [--config deckhand.toml]
//!   deckhand --toolkit kubernetes

use anyhow::Context as _;
use clap::Parser;
use deckhand::agent::{
    ConversationMemory, PromptBuilder, Session, TurnExecutor, KUBERNETES_PROMPT_PREFIX,
};
use deckhand::approval::{ApprovalGate, AutoApproveGate, ConsoleApprovalGate};
use deckhand::capabilities::{
    default_registry, kubernetes_registry, CapabilityRegistry, CatalogDeps, Inform,
    KubernetesDeps,
};
use deckhand::cli::{OutputFormatter, ReadlineConsole, ReasoningPrinter};
use deckhand::config::{load_file_config, AppConfig, ConfigOverrides, Toolkit};
use deckhand::context::{resolve_initial_context, ContextStore};
use deckhand::kubernetes::{ArtifactHub, ClusterClient, Helm};
use deckhand::llm::{LanguageModel, OpenAiChatModel, OpenAiConfig};
use deckhand::platform::{PlatformClient, PlatformConfig};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{info, warn};

/// Stops the completion before the model invents a tool result.
const OBSERVATION_STOP: &str = "\nObservation:";

/// Console CLI arguments
#[derive(Parser, Debug)]
#[command(name = "deckhand")]
#[command(about = "Natural-language operator console for application platforms")]
struct Args {
    /// Path to a configuration file (TOML format)
    #[arg(long, env = "DECKHAND_CONFIG")]
    config: Option<PathBuf>,

    /// Capability catalog: platform or kubernetes (default: platform)
    #[arg(long, env = "DECKHAND_TOOLKIT")]
    toolkit: Option<Toolkit>,

    /// Platform API base URL
    #[arg(long, env = "DECKHAND_API_URL")]
    api_url: Option<String>,

    /// Platform API key
    #[arg(long, env = "DECKHAND_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// API key of the OpenAI-compatible model endpoint
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    llm_api_key: Option<String>,

    /// Model name (default: gpt-4)
    #[arg(long, env = "DECKHAND_LLM_MODEL")]
    llm_model: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint
    #[arg(long, env = "DECKHAND_LLM_BASE_URL")]
    llm_base_url: Option<String>,

    /// Language the assistant answers in (default: English)
    #[arg(long, env = "DECKHAND_NATURAL_LANGUAGE")]
    natural_language: Option<String>,

    /// Print the model's reasoning for every decision (default: true)
    #[arg(
        long,
        env = "DECKHAND_SHOW_REASONING",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    show_reasoning: Option<bool>,

    /// Accept invalid TLS certificates from the platform
    #[arg(long, env = "DECKHAND_SKIP_TLS_VERIFY")]
    skip_tls_verify: bool,

    /// Project to start in (default: first available)
    #[arg(long, env = "DECKHAND_DEFAULT_PROJECT")]
    default_project: Option<String>,

    /// Environment to start in (default: first in the project)
    #[arg(long, env = "DECKHAND_DEFAULT_ENVIRONMENT")]
    default_environment: Option<String>,

    /// Capability invocations allowed per query (default: 10)
    #[arg(long)]
    max_tool_invocations: Option<usize>,

    /// Completed turns replayed to the model, 0 for all (default: 20)
    #[arg(long)]
    memory_window: Option<usize>,

    /// Helm binary used by the kubernetes toolkit (default: helm)
    #[arg(long, env = "DECKHAND_HELM_PATH")]
    helm_path: Option<String>,

    /// Approve every gated action without asking
    #[arg(long, short = 'y')]
    yes: bool,

    /// Debug logging
    #[arg(long, short = 'v')]
    verbose: bool,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            toolkit: self.toolkit,
            api_url: self.api_url.clone(),
            api_key: self.api_key.clone(),
            skip_tls_verify: self.skip_tls_verify.then_some(true),
            default_project: self.default_project.clone(),
            default_environment: self.default_environment.clone(),
            llm_api_key: self.llm_api_key.clone(),
            llm_model: self.llm_model.clone(),
            llm_base_url: self.llm_base_url.clone(),
            natural_language: self.natural_language.clone(),
            show_reasoning: self.show_reasoning,
            max_tool_invocations: self.max_tool_invocations,
            memory_window: self.memory_window,
            auto_approve: self.yes.then_some(true),
            helm_path: self.helm_path.clone(),
            artifact_hub_url: None,
        }
    }

    /// Merge with the config file if one is given.
    /// CLI arguments and environment take precedence over file values.
    fn merge_with_config(&self) -> anyhow::Result<AppConfig> {
        let mut overrides = self.overrides();
        if let Some(path) = &self.config {
            let file = load_file_config(path)?;
            info!("Loaded configuration from: {}", path.display());
            overrides = overrides.apply_file(&file);
        }
        let config = overrides.resolve();
        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { "deckhand=debug" } else { "deckhand=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.parse()?),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
    Ok(())
}

/// Registry and starting state of the selected toolkit.
struct Catalog {
    registry: CapabilityRegistry,
    context: ContextStore,
    prompt: PromptBuilder,
    informs: UnboundedReceiver<Inform>,
}

async fn platform_catalog(
    config: &AppConfig,
    model: Arc<dyn LanguageModel>,
    show_reasoning: Arc<AtomicBool>,
) -> anyhow::Result<Catalog> {
    info!("Platform API: {}", config.api_url);
    if config.skip_tls_verify {
        warn!("TLS certificate verification is disabled");
    }
    let client = PlatformClient::new(PlatformConfig {
        skip_tls_verify: config.skip_tls_verify,
        ..PlatformConfig::new(&config.api_url, &config.api_key)
    })?;

    let initial = resolve_initial_context(
        &client,
        config.default_project.as_deref(),
        config.default_environment.as_deref(),
    )
    .await
    .context("Failed to resolve the initial project/environment")?;

    let (inform_tx, informs) = mpsc::unbounded_channel();
    let registry = default_registry(CatalogDeps {
        client,
        model,
        show_reasoning,
        inform: inform_tx,
    })?;
    Ok(Catalog {
        registry,
        context: ContextStore::new(initial),
        prompt: PromptBuilder::new(config.natural_language.clone()),
        informs,
    })
}

async fn kubernetes_catalog(
    config: &AppConfig,
    model: Arc<dyn LanguageModel>,
    show_reasoning: Arc<AtomicBool>,
) -> anyhow::Result<Catalog> {
    let cluster = ClusterClient::try_default()
        .await
        .context("Failed to load the kubeconfig")?;
    let kinds = cluster
        .kinds()
        .await
        .context("Failed to discover cluster resource kinds")?;
    info!("Kubernetes cluster serves {} resource kinds", kinds.len());

    let registry = kubernetes_registry(KubernetesDeps {
        cluster,
        helm: Helm::new(&config.helm_path),
        hub: ArtifactHub::new(&config.artifact_hub_url),
        model,
        show_reasoning,
    })?;
    // Nothing sends informs in this toolkit.
    let (_, informs) = mpsc::unbounded_channel();
    Ok(Catalog {
        registry,
        context: ContextStore::default(),
        prompt: PromptBuilder::new(config.natural_language.clone())
            .with_prefix(KUBERNETES_PROMPT_PREFIX),
        informs,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose)?;
    let config = args.merge_with_config()?;

    info!("deckhand starting with the {} toolkit", config.toolkit);
    info!("LLM model: {}", config.llm_model);

    let mut llm_config = OpenAiConfig::new(&config.llm_api_key, &config.llm_model)
        .with_stop([OBSERVATION_STOP]);
    llm_config.base_url = config.llm_base_url.clone();
    let model: Arc<dyn LanguageModel> = Arc::new(OpenAiChatModel::new(llm_config)?);

    let show_reasoning = Arc::new(AtomicBool::new(config.show_reasoning));
    let Catalog {
        registry,
        context,
        prompt,
        mut informs,
    } = match config.toolkit {
        Toolkit::Platform => platform_catalog(&config, model.clone(), show_reasoning.clone()).await?,
        Toolkit::Kubernetes => {
            kubernetes_catalog(&config, model.clone(), show_reasoning.clone()).await?
        }
    };

    let gate: Arc<dyn ApprovalGate> = if config.auto_approve {
        warn!("Gated actions will run without confirmation (--yes)");
        Arc::new(AutoApproveGate)
    } else {
        Arc::new(ConsoleApprovalGate::new())
    };

    let output = OutputFormatter::new();
    let executor = TurnExecutor::new(model, Arc::new(registry), gate, context)
        .with_prompt(prompt)
        .with_observer(Arc::new(ReasoningPrinter::new(show_reasoning, output.clone())))
        .with_max_tool_invocations(config.max_tool_invocations);
    let mut session = Session::new(executor, ConversationMemory::new(config.memory_window));

    let mut console = ReadlineConsole::new()?;
    session.run(&mut console, &mut informs, &output).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_args_parsing() {
        let args = Args::try_parse_from([
            "deckhand",
            "--api-url",
            "https://platform.local",
            "--api-key",
            "platform-key",
            "--llm-api-key",
            "sk-test",
            "--memory-window",
            "0",
            "--yes",
        ])
        .unwrap();

        assert_eq!(args.api_url.as_deref(), Some("https://platform.local"));
        assert_eq!(args.memory_window, Some(0));
        assert!(args.yes);
        assert_eq!(args.show_reasoning, None);

        let config = args.merge_with_config().unwrap();
        assert!(config.show_reasoning);
        assert_eq!(config.toolkit, Toolkit::Platform);
        assert!(config.auto_approve);
        assert_eq!(config.memory_window, 0);
        assert_eq!(config.llm_model, "gpt-4");
        assert_eq!(config.max_tool_invocations, 10);
    }

    #[test]
    fn test_cli_wins_over_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[platform]\napi_url = \"https://file.local\"\napi_key = \"file-key\"\n\n[llm]\napi_key = \"sk-file\"\nmodel = \"gpt-3.5-turbo\"\n\n[agent]\nshow_reasoning = false"
        )
        .unwrap();
        let path = file.path().to_string_lossy().to_string();

        let args = Args::try_parse_from([
            "deckhand",
            "--config",
            path.as_str(),
            "--llm-model",
            "gpt-4o",
        ])
        .unwrap();
        let config = args.merge_with_config().unwrap();

        assert_eq!(config.api_url, "https://file.local");
        assert_eq!(config.llm_model, "gpt-4o");
        assert!(!config.show_reasoning);
        assert!(!config.auto_approve);
    }

    #[test]
    fn test_show_reasoning_flag_takes_a_value() {
        let base = ["deckhand", "--llm-api-key", "sk-test", "--toolkit", "kubernetes"];

        let bare = Args::try_parse_from(base.iter().copied().chain(["--show-reasoning"])).unwrap();
        assert_eq!(bare.show_reasoning, Some(true));

        let off = Args::try_parse_from(base.iter().copied().chain(["--show-reasoning", "false"]))
            .unwrap();
        assert_eq!(off.show_reasoning, Some(false));
        let config = off.merge_with_config().unwrap();
        assert!(!config.show_reasoning);
        assert_eq!(config.toolkit, Toolkit::Kubernetes);
    }
}
