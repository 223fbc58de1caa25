//! penny - a cheap, single-session chat sidekick

mod repl;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use penny_ai::OpenAiClient;
use penny_session::{FileGateway, PersistenceGateway, SessionEngine};

/// penny - a cheap, single-session chat sidekick
#[derive(Parser, Debug)]
#[command(name = "penny")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Model to use for this run (gpt-4o, gpt-4o-mini, o1-preview)
    #[arg(short, long)]
    model: Option<String>,

    /// Retain trailing history in outbound context for this run
    #[arg(long)]
    retain: bool,

    /// Disable context retention for this run
    #[arg(long)]
    no_retain: bool,

    /// Run a single prompt and exit
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    subcommand: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Save credentials and preferences
    Configure {
        /// OpenAI API key
        #[arg(long)]
        api_key: Option<String>,

        /// OpenAI organization ID
        #[arg(long)]
        organization: Option<String>,

        /// OpenAI project ID
        #[arg(long)]
        project: Option<String>,

        /// Default chat model
        #[arg(long)]
        model: Option<String>,

        /// Summary language ("auto" detects from content)
        #[arg(long)]
        summary_language: Option<String>,

        /// Retain trailing history in outbound context
        #[arg(long)]
        retain_context: Option<bool>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let gateway = Arc::new(FileGateway::new());

    if let Some(Command::Configure {
        api_key,
        organization,
        project,
        model,
        summary_language,
        retain_context,
    }) = args.subcommand
    {
        return configure(
            &gateway,
            api_key,
            organization,
            project,
            model,
            summary_language,
            retain_context,
        )
        .await;
    }

    let stored = gateway.load().await?;
    let client = Arc::new(OpenAiClient::new(stored.config.credentials.clone()));
    let mut engine = SessionEngine::load(client, gateway).await;

    if let Some(model) = args.model {
        engine.set_model(model.parse()?);
    }
    if args.retain {
        engine.set_retain_context(true);
    } else if args.no_retain {
        engine.set_retain_context(false);
    }

    match args.command {
        Some(prompt) => repl::one_shot(&mut engine, prompt).await,
        None => repl::run(&mut engine).await,
    }
}

async fn configure(
    gateway: &FileGateway,
    api_key: Option<String>,
    organization: Option<String>,
    project: Option<String>,
    model: Option<String>,
    summary_language: Option<String>,
    retain_context: Option<bool>,
) -> anyhow::Result<()> {
    let mut config = gateway.load().await?.config;

    if let Some(api_key) = api_key {
        config.credentials.api_key = api_key;
    }
    if let Some(organization) = organization {
        config.credentials.organization = organization;
    }
    if let Some(project) = project {
        config.credentials.project = project;
    }
    if let Some(model) = model {
        config.model = model.parse()?;
    }
    if let Some(summary_language) = summary_language {
        config.summary_language = summary_language;
    }
    if let Some(retain_context) = retain_context {
        config.retain_context = retain_context;
    }

    gateway.save_settings(&config).await?;
    println!("Options saved.");
    Ok(())
}
