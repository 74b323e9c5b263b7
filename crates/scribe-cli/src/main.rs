//! Scribe CLI - platform content generation with resilient model calls
//!
//! Usage:
//!   scribe init [path]                              Write default .scribe/config.toml
//!   scribe generate --platform <p> --brief <text>   Generate a single post
//!   scribe batch --platform <p> --brief <text> -n N Generate N posts in one run
//!   scribe context show <plan_id>                   Show a saved batch context

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use scribe_agent::{
    get_auth_token, AgentOperation, AnthropicClient, BackoffPolicy, CircuitBreaker,
    GenerationRequest, Model,
};
use scribe_context::ContextManager;
use scribe_core::{Platform, ScribeConfig};
use scribe_orchestrator::{build_post_prompt, BatchPlan, BatchRunner, SYSTEM_PROMPT};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Breaker name for the single remote dependency
const MODEL_CIRCUIT: &str = "anthropic";

#[derive(Parser)]
#[command(name = "scribe")]
#[command(author, version, about = "Platform content generation with resilient model calls")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Project directory containing .scribe/
    #[arg(short = 'C', long, default_value = ".", global = true)]
    dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default .scribe/config.toml
    Init {
        /// Project path (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Generate a single post
    Generate {
        #[arg(short, long)]
        platform: CliPlatform,

        /// What the post should be about
        #[arg(short, long)]
        brief: String,

        /// Override the configured model (opus, sonnet, haiku)
        #[arg(short, long)]
        model: Option<CliModel>,
    },

    /// Generate several posts, carrying learnings from one to the next
    Batch {
        #[arg(short, long)]
        platform: CliPlatform,

        #[arg(short, long)]
        brief: String,

        /// Number of posts
        #[arg(short = 'n', long, default_value = "5")]
        count: usize,

        /// Batch identifier (generated when omitted)
        #[arg(long)]
        plan_id: Option<String>,

        #[arg(short, long)]
        model: Option<CliModel>,
    },

    /// Inspect saved batch contexts
    Context {
        #[command(subcommand)]
        action: ContextCommands,
    },
}

#[derive(Subcommand)]
enum ContextCommands {
    /// Print the learnings and stats of a batch
    Show {
        /// Batch identifier
        plan_id: String,
    },
}

/// CLI-friendly model enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliModel {
    Opus,
    Sonnet,
    Haiku,
}

impl From<CliModel> for Model {
    fn from(m: CliModel) -> Self {
        match m {
            CliModel::Opus => Model::Opus,
            CliModel::Sonnet => Model::Sonnet,
            CliModel::Haiku => Model::Haiku,
        }
    }
}

/// CLI-friendly platform enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliPlatform {
    Linkedin,
    Instagram,
    Youtube,
    #[value(alias = "x")]
    Twitter,
    Email,
}

impl From<CliPlatform> for Platform {
    fn from(p: CliPlatform) -> Self {
        match p {
            CliPlatform::Linkedin => Platform::Linkedin,
            CliPlatform::Instagram => Platform::Instagram,
            CliPlatform::Youtube => Platform::Youtube,
            CliPlatform::Twitter => Platform::Twitter,
            CliPlatform::Email => Platform::Email,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Init { path } => cmd_init(&path),
        Commands::Generate {
            platform,
            brief,
            model,
        } => cmd_generate(&cli.dir, platform.into(), brief, model).await,
        Commands::Batch {
            platform,
            brief,
            count,
            plan_id,
            model,
        } => cmd_batch(&cli.dir, platform.into(), brief, count, plan_id, model).await,
        Commands::Context { action } => match action {
            ContextCommands::Show { plan_id } => cmd_context_show(&cli.dir, &plan_id),
        },
    }
}

fn cmd_init(path: &Path) -> Result<()> {
    info!("Initializing Scribe in {:?}", path);

    let config_path = path.join(".scribe/config.toml");
    if config_path.exists() {
        println!("Config already exists: {}", config_path.display());
        return Ok(());
    }

    ScribeConfig::write_default(path).context("Failed to write default config")?;
    std::fs::create_dir_all(path.join(".scribe/context"))?;

    println!("Initialized Scribe in {:?}", path);
    println!("Created:");
    println!("  .scribe/config.toml");
    println!("  .scribe/context/");
    Ok(())
}

async fn cmd_generate(
    dir: &Path,
    platform: Platform,
    brief: String,
    model: Option<CliModel>,
) -> Result<()> {
    let config = load_config(dir)?;
    let operation = build_operation("create_post", &config, model)?;

    // A single post is a batch of one with no history
    let plan = BatchPlan::new(platform, brief, 1);
    let context = ContextManager::with_config(&plan.plan_id, &config.context);
    let prompt = build_post_prompt(
        &plan,
        1,
        &context.get_compacted_learnings(),
        context.get_target_score(),
    );
    let request = GenerationRequest::new(platform, prompt).with_system(SYSTEM_PROMPT);

    let outcome = operation.run(&request).await;
    println!("{}", serde_json::to_string_pretty(&outcome.report())?);

    let message = outcome.user_message();
    match outcome.completed() {
        Some(generation) => {
            println!("\n{}", generation.text);
            Ok(())
        }
        None => bail!(message),
    }
}

async fn cmd_batch(
    dir: &Path,
    platform: Platform,
    brief: String,
    count: usize,
    plan_id: Option<String>,
    model: Option<CliModel>,
) -> Result<()> {
    if count == 0 {
        bail!("--count must be at least 1");
    }

    let config = load_config(dir)?;
    let operation = build_operation("create_post", &config, model)?;

    let mut plan = BatchPlan::new(platform, brief, count);
    if let Some(id) = plan_id {
        plan = plan.with_plan_id(id);
    }
    // Reject bad ids before any model call
    let saved_to = context_path(dir, &plan.plan_id)?;
    let context = ContextManager::with_config(&plan.plan_id, &config.context);

    let mut runner = BatchRunner::new(operation, context).with_activity_log(dir.join(".scribe"));
    let report = runner.run(&plan).await;

    runner
        .context()
        .save(&saved_to)
        .with_context(|| format!("Failed to save context to {}", saved_to.display()))?;

    println!("Batch {}: {}", report.plan_id, report.stop_reason);
    println!(
        "  {} completed, {} failed, {} deferred",
        report.completed(),
        report.failed(),
        report.deferred()
    );
    println!("\n{}", runner.context().get_compacted_learnings());
    println!("{}", serde_json::to_string_pretty(&report.stats)?);
    println!("\nContext saved to {}", saved_to.display());

    if report.completed() == 0 {
        bail!("No posts were generated");
    }
    Ok(())
}

fn cmd_context_show(dir: &Path, plan_id: &str) -> Result<()> {
    let path = context_path(dir, plan_id)?;
    let context = ContextManager::load(&path)
        .with_context(|| format!("No saved context for batch {} at {}", plan_id, path.display()))?;

    println!("{}", context.get_compacted_learnings());
    println!("Next target score: {}/25", context.get_target_score());
    println!("{}", serde_json::to_string_pretty(&context.get_stats())?);
    Ok(())
}

fn load_config(dir: &Path) -> Result<ScribeConfig> {
    ScribeConfig::load_or_default(dir).context("Failed to load .scribe/config.toml")
}

fn build_operation(
    name: &str,
    config: &ScribeConfig,
    model: Option<CliModel>,
) -> Result<AgentOperation<AnthropicClient>> {
    let client = match model {
        Some(model) => {
            let api_key = get_auth_token(&config.models.api_key_env)?;
            AnthropicClient::new(api_key, model.into())?
                .with_max_tokens(config.models.max_tokens)
        }
        None => AnthropicClient::from_config(&config.models)?,
    };
    info!(model = %client.model(), "Using model");

    let breaker = Arc::new(CircuitBreaker::from_config(MODEL_CIRCUIT, &config.circuit));
    let policy = BackoffPolicy::from_config(&config.retry);
    Ok(AgentOperation::from_config(
        name,
        breaker,
        policy,
        &config.operation,
        Arc::new(client),
    ))
}

fn context_path(dir: &Path, plan_id: &str) -> Result<PathBuf> {
    validate_plan_id(plan_id)?;
    Ok(dir.join(".scribe/context").join(format!("{}.json", plan_id)))
}

/// Plan ids become file names under `.scribe/context`
fn validate_plan_id(plan_id: &str) -> Result<()> {
    if plan_id.is_empty() {
        bail!("Plan id must not be empty");
    }
    if plan_id.starts_with('.') {
        bail!("Invalid plan id {:?}: must not start with '.'", plan_id);
    }
    if let Some(c) = plan_id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        bail!("Invalid plan id {:?}: character {:?} not allowed", plan_id, c);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_batch() {
        let cli = Cli::try_parse_from([
            "scribe", "batch", "-p", "x", "-b", "Launch week", "-n", "3", "--plan-id", "launch",
        ])
        .unwrap();
        match cli.command {
            Commands::Batch {
                platform,
                count,
                plan_id,
                ..
            } => {
                assert_eq!(Platform::from(platform), Platform::Twitter);
                assert_eq!(count, 3);
                assert_eq!(plan_id.as_deref(), Some("launch"));
            }
            _ => panic!("expected batch command"),
        }
    }

    #[test]
    fn test_context_path() {
        assert_eq!(
            context_path(Path::new("/work"), "launch").unwrap(),
            PathBuf::from("/work/.scribe/context/launch.json")
        );
        assert_eq!(
            context_path(Path::new("/work"), "launch-2.v1").unwrap(),
            PathBuf::from("/work/.scribe/context/launch-2.v1.json")
        );
    }

    #[test]
    fn test_context_path_rejects_unsafe_plan_ids() {
        let unsafe_ids = [
            "",
            "../../x",
            "..",
            ".hidden",
            "a/b",
            "a\\b",
            "/etc/passwd",
            "launch week",
        ];
        for plan_id in unsafe_ids {
            assert!(
                context_path(Path::new("/work"), plan_id).is_err(),
                "accepted {:?}",
                plan_id
            );
        }
    }

    #[test]
    fn test_generated_plan_ids_are_valid() {
        let plan = BatchPlan::new(Platform::Email, "brief", 1);
        assert!(validate_plan_id(&plan.plan_id).is_ok());
    }

    #[test]
    fn test_context_show_rejects_traversal() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let err = cmd_context_show(temp_dir.path(), "../../x").unwrap_err();
        assert!(err.to_string().contains("Invalid plan id"));
    }
}
