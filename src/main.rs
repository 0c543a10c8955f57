//! UrbanQ - multi-agent question answering over urban-planning codes
//!
//! A CLI tool that routes a question to specialist agents, reranks and
//! validates their answers, refines once when validation fails and
//! composes the final response.
//!
//! Exit codes:
//!   0 - Answered (including low-confidence answers)
//!   1 - Technical fault, invalid arguments or configuration error

mod agent;
mod analysis;
mod cli;
mod config;
mod context;
mod error;
mod memory;
mod models;
mod orchestrator;
mod routing;
mod synthesis;
mod validation;

use agent::SpecialistRegistry;
use anyhow::{Context as _, Result};
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE};
use memory::{InMemorySessionStore, JsonlSessionStore, SessionStore};
use models::{FailureResponse, SubmitOptions, SubmitRequest, SubmitResponse};
use orchestrator::{Collaborators, Orchestrator};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use validation::{HttpKnowledgeBase, KnowledgeBase, StaticKnowledgeBase};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Config is read before logging so `general.verbose` can set the level
    let (mut config, origin) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(config.log_level(args.quiet));

    info!("UrbanQ v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    origin.log();

    match run(args, config).await {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("Startup failed: {:#}", e);
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .urbanq.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("{} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("Created {} with default settings.", CONFIG_FILE);
    println!("Edit it to point at your agents, synthesizer and knowledge base.");
    Ok(())
}

/// Initialize logging at the given level.
fn init_logging(level: tracing::Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Answer the query. Returns the exit code.
async fn run(args: Args, config: Config) -> Result<i32> {
    let orchestrator = Orchestrator::new(&config, collaborators(&config)?)?;

    let request = SubmitRequest {
        query: args.query_text().to_string(),
        session_id: args.session.clone(),
        options: SubmitOptions {
            model: args.model.clone(),
            skip_refinement: args.skip_refinement,
        },
    };

    match orchestrator.submit(request).await {
        Ok(response) => {
            print_response(&response, args.format)?;
            Ok(0)
        }
        Err(e) => {
            error!("Request failed: {}", e);
            println!("{}", serde_json::to_string_pretty(&FailureResponse::from_error(&e))?);
            Ok(1)
        }
    }
}

/// Build the external collaborators from configuration.
fn collaborators(config: &Config) -> Result<Collaborators> {
    let specialists = SpecialistRegistry::over_http(&config.agents)?;
    if config.agents.use_stubs {
        warn!("Stub agents enabled: failing specialists are replaced by fixed answers");
    }

    let knowledge: Arc<dyn KnowledgeBase> = match config.knowledge.endpoint {
        Some(ref endpoint) => {
            info!("Knowledge base: {}", endpoint);
            Arc::new(HttpKnowledgeBase::new(endpoint, config.knowledge.timeout_seconds)?)
        }
        None => {
            debug!("Knowledge base: static vocabulary from configuration");
            Arc::new(StaticKnowledgeBase::from_config(&config.knowledge))
        }
    };

    let generator = synthesis::generator::from_config(&config.model)?;
    if config.model.endpoint.is_none() {
        info!("No synthesizer configured, answers use the structured fallback");
    }

    let store: Arc<dyn SessionStore> = match config.memory.path {
        Some(ref path) => {
            info!("Session memory: {}", path);
            Arc::new(JsonlSessionStore::new(path))
        }
        None => Arc::new(InMemorySessionStore::new()),
    };

    Ok(Collaborators {
        specialists,
        knowledge,
        generator,
        store,
    })
}

fn print_response(response: &SubmitResponse, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(response)
                .context("Failed to serialize response")?;
            println!("{}", json);
        }
        OutputFormat::Text => {
            let metadata = &response.metadata;
            println!("{}", response.response);
            println!();
            println!(
                "Confidence: {:.0}% | {}{}",
                response.confidence * 100.0,
                metadata.validation.summary,
                if metadata.was_refined { " | refined" } else { "" }
            );
            println!("Session: {}", metadata.session_id);
        }
    }
    Ok(())
}

/// Where the configuration came from, logged once logging is up.
enum ConfigOrigin {
    Explicit(PathBuf),
    DefaultFile,
    BuiltIn,
    Unreadable(String),
}

impl ConfigOrigin {
    fn log(&self) {
        match self {
            ConfigOrigin::Explicit(path) => info!("Loaded config from: {}", path.display()),
            ConfigOrigin::DefaultFile => info!("Loaded default config from {}", CONFIG_FILE),
            ConfigOrigin::BuiltIn => debug!("No config file found, using defaults"),
            ConfigOrigin::Unreadable(e) => warn!("Failed to load config: {}", e),
        }
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<(Config, ConfigOrigin)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, ConfigOrigin::Explicit(config_path.clone())));
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok((config, ConfigOrigin::DefaultFile)),
        Ok(None) => Ok((Config::default(), ConfigOrigin::BuiltIn)),
        Err(e) => Ok((Config::default(), ConfigOrigin::Unreadable(format!("{:#}", e)))),
    }
}
