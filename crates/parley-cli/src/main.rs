//! # parley-cli
//!
//! Command-line interface for Parley.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use figment::providers::{Format, Toml};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use parley_agent::{Agent, AgentBuilder, AgentConfig, AgentError};
use parley_core::{Config, HttpTransport, ProviderError, ReqwestTransport};
use parley_mcp::McpClientRegistry;
use parley_providers::{
    validate_config, DecisionEngine, ModelCatalog, OpenAiCompatibleDriver, SharedCatalog,
};
use parley_store::{MemoryStore, MemoryType, OfflineQueue, SqliteStorage, Storage};

mod commands;
mod output;

/// Application context containing shared state.
pub struct AppContext {
    pub config: Config,
    pub transport: Arc<dyn HttpTransport>,
}

impl AppContext {
    /// Built-in catalog plus the `[[models]]` entries from configuration.
    pub fn catalog(&self) -> SharedCatalog {
        let mut catalog = ModelCatalog::with_defaults();
        catalog.register_all(&self.config.models);
        catalog.shared()
    }

    pub fn decisions(&self) -> DecisionEngine {
        DecisionEngine::new(self.catalog())
    }

    pub fn registry(&self) -> McpClientRegistry {
        McpClientRegistry::new(self.transport.clone())
    }

    /// Open the configured database.
    pub fn storage(&self) -> anyhow::Result<Arc<dyn Storage>> {
        let storage = SqliteStorage::open_configured(&self.config.storage)?;
        if let Some(path) = storage.path() {
            tracing::debug!(path = %path.display(), "Opened storage");
        }
        Ok(Arc::new(storage))
    }

    /// Assemble a fully wired agent.
    pub async fn agent(&self, config: AgentConfig) -> anyhow::Result<Agent> {
        validate_config(&self.config).into_result()?;

        let storage = self.storage()?;
        let memory = MemoryStore::load(storage.clone()).await?;
        let queue = OfflineQueue::load(storage).await?;

        let agent = AgentBuilder::new()
            .driver(Arc::new(OpenAiCompatibleDriver::new(self.transport.clone())))
            .decisions(self.decisions())
            .tools(Arc::new(self.registry()))
            .memory(Arc::new(memory))
            .queue(Arc::new(queue))
            .config(config)
            .build()?;
        Ok(agent)
    }
}

/// Parley - agent orchestration for OpenAI-compatible endpoints and MCP tools
#[derive(Parser)]
#[command(name = "parley")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Extra configuration file, merged over the standard locations
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one chat turn, streaming the answer to stdout
    Chat(ChatArgs),
    /// Show which model and tool mode would be used for a prompt
    Decide(DecideArgs),
    /// List known providers
    Providers,
    /// List catalog models
    Models {
        /// Only models of this provider
        #[arg(short, long)]
        provider: Option<String>,
    },
    /// Inspect configured MCP servers
    Mcp {
        #[command(subcommand)]
        action: McpAction,
    },
    /// Manage requests queued after transport failures
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
    /// Manage long-term memories
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args)]
pub struct ChatArgs {
    /// Prompt text; read from stdin when omitted
    #[arg(value_name = "PROMPT")]
    prompt: Vec<String>,

    /// Attach an image (path or URL); repeatable
    #[arg(short, long, value_name = "PATH")]
    image: Vec<String>,

    /// Do not offer MCP tools to the model
    #[arg(long)]
    no_tools: bool,

    /// Maximum tool-calling depth (at least 1)
    #[arg(long, value_parser = parse_max_depth)]
    max_depth: Option<usize>,

    /// Model to use; empty selects automatically
    #[arg(short, long)]
    model: Option<String>,

    /// Provider to use
    #[arg(long)]
    provider: Option<String>,

    /// System prompt
    #[arg(short, long)]
    system: Option<String>,

    /// Queue the request if the endpoint is unreachable
    #[arg(long)]
    queue: bool,
}

#[derive(clap::Args)]
pub struct DecideArgs {
    /// Prompt text
    #[arg(value_name = "PROMPT", required = true)]
    prompt: Vec<String>,

    /// Number of available tools (defaults to the enabled server count)
    #[arg(long)]
    tools: Option<usize>,

    /// Pretend the prompt carries an image
    #[arg(long)]
    image: bool,

    /// Model to use; empty selects automatically
    #[arg(short, long)]
    model: Option<String>,

    /// Provider to use
    #[arg(long)]
    provider: Option<String>,
}

#[derive(Subcommand)]
pub enum McpAction {
    /// List tools from every enabled server
    Tools {
        /// Only this server
        #[arg(short, long)]
        server: Option<String>,
    },
    /// List resources
    Resources {
        #[arg(short, long)]
        server: Option<String>,
    },
    /// List prompts
    Prompts {
        #[arg(short, long)]
        server: Option<String>,
    },
    /// Call a tool directly
    Call {
        /// Server id
        server: String,
        /// Tool name as published by the server
        tool: String,
        /// Arguments as a JSON object
        #[arg(default_value = "{}")]
        arguments: String,
    },
}

#[derive(Subcommand)]
pub enum QueueAction {
    /// List queued requests
    List,
    /// Replay queued requests
    Flush,
    /// Drop every queued request
    Clear,
}

#[derive(Subcommand)]
pub enum MemoryAction {
    /// Store a memory
    Add {
        /// Memory text
        content: String,
        /// user, task, fact or system
        #[arg(short = 't', long = "type", default_value = "user")]
        kind: MemoryType,
        /// Importance in [0, 1]
        #[arg(short, long, default_value = "0.5")]
        importance: f32,
        /// Lifetime in seconds
        #[arg(long)]
        ttl: Option<i64>,
    },
    /// List stored memories
    List,
    /// Remove one memory
    Remove {
        /// Memory id
        id: String,
    },
    /// Remove every memory
    Clear,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration (secrets redacted)
    Show,
    /// Validate the effective configuration
    Validate,
}

fn parse_max_depth(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(depth) => Ok(depth),
        Err(e) => Err(e.to_string()),
    }
}

fn load_config(extra: Option<&PathBuf>) -> Result<Config, figment::Error> {
    let mut figment = Config::figment();
    if let Some(path) = extra {
        figment = figment.merge(Toml::file(path));
    }
    figment.extract()
}

fn init_logging(verbose: bool, config_level: &str) {
    // Logs go to stderr so streamed answers on stdout stay clean.
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config_level))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Recovery hint for errors raised by the model endpoint.
fn suggestion(error: &anyhow::Error) -> Option<&'static str> {
    if let Some(AgentError::Provider(e)) = error.downcast_ref::<AgentError>() {
        return e.recovery_suggestion();
    }
    if let Some(e) = error.downcast_ref::<ProviderError>() {
        return e.recovery_suggestion();
    }
    error
        .downcast_ref::<parley_core::Error>()
        .and_then(parley_core::Error::recovery_suggestion)
}

async fn dispatch(command: Commands, ctx: &AppContext) -> anyhow::Result<()> {
    match command {
        Commands::Chat(args) => commands::chat::run(args, ctx).await,
        Commands::Decide(args) => commands::decide::run(args, ctx),
        Commands::Providers => {
            commands::provider::list_providers(ctx);
            Ok(())
        }
        Commands::Models { provider } => {
            commands::provider::list_models(provider.as_deref(), ctx);
            Ok(())
        }
        Commands::Mcp { action } => commands::mcp::handle(action, ctx).await,
        Commands::Queue { action } => commands::queue::handle(action, ctx).await,
        Commands::Memory { action } => commands::memory::handle(action, ctx).await,
        Commands::Config { action } => commands::config::handle(action, ctx),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = load_config(cli.config.as_ref());
    let level = loaded
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "warn".to_string());
    init_logging(cli.verbose, &level);

    let config = loaded.unwrap_or_else(|e| {
        tracing::warn!("Failed to load config, using defaults: {}", e);
        Config::default()
    });

    let result = match ReqwestTransport::new() {
        Ok(transport) => {
            let transport: Arc<dyn HttpTransport> = Arc::new(transport);
            let ctx = AppContext { config, transport };
            dispatch(cli.command, &ctx).await
        }
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            if let Some(hint) = suggestion(&e) {
                eprintln!("  Suggestion: {}", hint);
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_chat_flags() {
        let cli = Cli::try_parse_from([
            "parley", "chat", "what", "is", "this", "--image", "a.png", "-i", "b.png", "--no-tools",
            "--max-depth", "2",
        ])
        .unwrap();
        let Commands::Chat(args) = cli.command else {
            panic!("expected chat");
        };
        assert_eq!(args.prompt, vec!["what", "is", "this"]);
        assert_eq!(args.image, vec!["a.png", "b.png"]);
        assert!(args.no_tools);
        assert_eq!(args.max_depth, Some(2));
    }

    #[test]
    fn test_zero_max_depth_rejected() {
        assert!(Cli::try_parse_from(["parley", "chat", "hi", "--max-depth", "0"]).is_err());
        assert!(Cli::try_parse_from(["parley", "chat", "hi", "--max-depth", "-1"]).is_err());
        let cli = Cli::try_parse_from(["parley", "chat", "hi", "--max-depth", "1"]).unwrap();
        let Commands::Chat(args) = cli.command else {
            panic!("expected chat");
        };
        assert_eq!(args.max_depth, Some(1));
    }

    #[test]
    fn test_parse_memory_add() {
        let cli = Cli::try_parse_from([
            "parley", "memory", "add", "likes tea", "--type", "fact", "--importance", "0.8",
        ])
        .unwrap();
        match cli.command {
            Commands::Memory {
                action: MemoryAction::Add { kind, importance, ttl, .. },
            } => {
                assert_eq!(kind, MemoryType::Fact);
                assert_eq!(importance, 0.8);
                assert_eq!(ttl, None);
            }
            _ => panic!("expected memory add"),
        }
        assert!(Cli::try_parse_from(["parley", "memory", "add", "x", "--type", "mood"]).is_err());
    }

    #[test]
    fn test_suggestion_for_endpoint_errors() {
        let err = anyhow::Error::from(AgentError::Provider(ProviderError::api_error(
            "openai", 401, "bad key",
        )));
        assert_eq!(
            suggestion(&err),
            Some("Check that your API key is valid and not expired")
        );
        assert_eq!(suggestion(&anyhow::anyhow!("plain")), None);
    }

    #[test]
    fn test_decide_requires_prompt() {
        assert!(Cli::try_parse_from(["parley", "decide"]).is_err());
    }

    #[test]
    fn test_extra_config_file_merged() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[endpoint]\nprovider = \"groq\"\n\n[agent]\nmax_depth = 2\n\n[[servers]]\nid = \"w\"\nname = \"Weather\"\nurl = \"http://localhost:9000/mcp\""
        )
        .unwrap();

        let config = load_config(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(config.endpoint.provider, "groq");
        assert_eq!(config.agent.max_depth, 2);
        assert_eq!(config.servers.len(), 1);
        assert!(config.servers[0].enabled);
    }
}
