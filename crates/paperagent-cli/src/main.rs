use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tokio::runtime::Runtime;
use tracing::info;
use tracing_subscriber::EnvFilter;

use paperagent_core::{
    log_run_completion, AgentSettings, ArxivConfig, ConfigLoader, LlmPlanner, OpenAiChatClient,
    ResearchAgent, RunRequest,
};
use paperagent_tools::default_catalog;

#[derive(Parser, Debug)]
#[command(name = "paperagent", version, about = "arXiv research agent")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a research session for a query.
    Run(RunArgs),
    /// Inspect the available research tools.
    Tools(ToolsArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Query to research.
    #[arg(long)]
    query: String,

    /// User attribution recorded in the run context and logs.
    #[arg(long, default_value = "cli")]
    user_id: String,

    /// Optional document the research is anchored to.
    #[arg(long)]
    document_id: Option<String>,

    /// Path to the configuration file (defaults to PAPERAGENT_CONFIG or ./config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured iteration cap.
    #[arg(long)]
    max_iterations: Option<u32>,
}

#[derive(Args, Debug)]
struct ToolsArgs {
    #[command(subcommand)]
    action: ToolsAction,
}

#[derive(Subcommand, Debug)]
enum ToolsAction {
    /// List all registered tool names.
    List {
        /// Path to the configuration file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Show the argument contract of one tool.
    Describe {
        /// Tool name as listed by `tools list`.
        name: String,

        /// Path to the configuration file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,paperagent_core=info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let rt = Runtime::new()?;
    rt.block_on(async move {
        match cli.command {
            Command::Run(args) => run_command(args).await?,
            Command::Tools(args) => tools_command(args).await?,
        }
        Ok::<(), anyhow::Error>(())
    })?;

    Ok(())
}

async fn run_command(args: RunArgs) -> Result<()> {
    let config = ConfigLoader::load(args.config)?;
    let api_key = config.llm_api_key()?;

    let client = OpenAiChatClient::new(
        config.llm.endpoint.clone(),
        config.llm.model.clone(),
        api_key,
    )?;
    let planner = std::sync::Arc::new(LlmPlanner::new(client));
    let catalog = default_catalog(&config.arxiv)?;

    let mut settings = AgentSettings::new()
        .with_max_iterations(config.agent.max_iterations)
        .with_iteration_pause(Duration::from_millis(config.agent.iteration_pause_ms))
        .with_max_consecutive_rejections(config.agent.max_consecutive_rejections);
    if let Some(max_iterations) = args.max_iterations {
        settings = settings.with_max_iterations(max_iterations);
    }

    let agent = ResearchAgent::new(catalog, planner).with_settings(settings);

    let mut request = RunRequest::new(&args.query, &args.user_id);
    if let Some(document_id) = args.document_id {
        request = request.with_document_id(document_id);
    }
    let run_id = request.run_id.clone();

    info!(run_id = %run_id, query = %args.query, "starting research run");
    let outcome = agent.run(request).await;
    log_run_completion(&run_id, &outcome)?;

    if let Some(summary) = &outcome.final_summary {
        println!("{}", summary.summary);
        println!();
        println!(
            "papers analyzed: {}  iterations: {}  tools used: {}",
            summary.stats.papers_analyzed,
            summary.stats.iterations_completed,
            summary.stats.tools_used,
        );
    }

    if !outcome.success {
        anyhow::bail!(
            "research run failed: {}",
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

async fn tools_command(args: ToolsArgs) -> Result<()> {
    match args.action {
        ToolsAction::List { config } => {
            let catalog = default_catalog(&arxiv_config(config))?;
            for name in catalog.list_tool_names() {
                println!("{name}");
            }
        }
        ToolsAction::Describe { name, config } => {
            let catalog = default_catalog(&arxiv_config(config))?;
            let descriptor = catalog.describe(&name)?;
            println!("{}: {}", descriptor.name, descriptor.description);
            if !descriptor.required_args.is_empty() {
                println!("  required: {}", descriptor.required_args.join(", "));
            }
            for group in &descriptor.any_of {
                println!("  one of: {}", group.join(", "));
            }
            if !descriptor.optional_args.is_empty() {
                println!("  optional: {}", descriptor.optional_args.join(", "));
            }
            if !descriptor.returns.is_empty() {
                println!("  returns: {}", descriptor.returns);
            }
        }
    }
    Ok(())
}

/// Tool inspection does not need the LLM credentials a full config load
/// enforces; fall back to arXiv defaults when no config is readable.
fn arxiv_config(path: Option<PathBuf>) -> ArxivConfig {
    ConfigLoader::load(path)
        .map(|config| config.arxiv)
        .unwrap_or_default()
}
