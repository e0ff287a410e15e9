//! WaniKanify - replace learned vocabulary on web pages
//!
//! Command line front end: every subcommand maps to one of the menu
//! operations (run, refresh, set API key, auto-run) of the library.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tracing_appender::{non_blocking, rolling};

use wanikanify::api::WaniKaniClient;
use wanikanify::cli::{Args, Commands, ConfigAction};
use wanikanify::config::{Config, FORMAT_VERSION};
use wanikanify::dom::Document;
use wanikanify::error::KanifyError;
use wanikanify::refresh::{RefreshOutcome, SkipReason};
use wanikanify::storage::FileStore;
use wanikanify::ui::TerminalUi;
use wanikanify::vocab::VocabMap;
use wanikanify::workflow::{RunOutcome, Workflow};

const DEFAULT_CONFIG_FILE: &str = "wanikanify.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration
    let config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if Path::new(DEFAULT_CONFIG_FILE).exists() {
                Config::from_file(DEFAULT_CONFIG_FILE)?
            } else {
                Config::default()
            }
        }
    };

    // Setup logging to both console and file
    setup_logging(args.verbose, &config.storage.log_dir())?;
    info!("Starting WaniKanify");

    if let Commands::Config { action } = &args.command {
        return handle_config(action, &config);
    }

    let store = Arc::new(FileStore::open(config.storage.state_path())?);
    let client = WaniKaniClient::new(config.api.clone())?.with_progress(true);
    let workflow = Workflow::new(config, Arc::new(client), store.clone(), Arc::new(TerminalUi::new()));

    match args.command {
        Commands::Run { input, output, refresh } => {
            let mut document = read_document(&input)?;
            let outcome = workflow.run_now(&mut document, refresh).await?;
            report_run(&outcome);
            write_document(&document, output.as_deref())?;
        }
        Commands::Open { input, output } => {
            let mut document = read_document(&input)?;
            let outcome = workflow.on_page_load(&mut document).await?;
            report_run(&outcome);
            write_document(&document, output.as_deref())?;
        }
        Commands::Refresh => {
            match workflow.refresh_vocabulary().await? {
                RefreshOutcome::Updated(map) => println!("Vocabulary updated: {} entries", map.len()),
                RefreshOutcome::Unchanged(map) => println!("Vocabulary unchanged: {} entries", map.len()),
                RefreshOutcome::Skipped(reason) => println!("Refresh skipped: {:?}", reason),
            }
        }
        Commands::SetApiKey { key } => {
            match key {
                Some(key) => {
                    workflow.set_api_key_value(&key)?;
                    println!("API key saved.");
                }
                None => match workflow.set_api_key()? {
                    Some(_) => println!("API key saved."),
                    None => println!("API key unchanged."),
                },
            }
        }
        Commands::AutoRun { state } => {
            workflow.set_auto_run(state.enabled())?;
            println!("Auto-run {}", if state.enabled() { "enabled" } else { "disabled" });
        }
        Commands::Status => {
            let state = workflow.state()?;
            let vocab_size = match state.vocab.as_deref().filter(|raw| !raw.trim().is_empty()) {
                None => "none".to_string(),
                Some(raw) => VocabMap::from_stored(raw)
                    .map(|map| format!("{} surface forms", map.len()))
                    .unwrap_or_else(|_| "corrupt".to_string()),
            };

            println!("\nWaniKanify status:");
            println!("{:<18} {}", "API key", state.api_key.as_deref().map(mask_key).unwrap_or_else(|| "not set".to_string()));
            println!("{:<18} {}", "Vocabulary", vocab_size);
            println!("{:<18} {}", "Last refresh", state.refresh.last_refresh_minute.map(format_minute).unwrap_or_else(|| "never".to_string()));
            println!("{:<18} {:?} (current {})", "Format version", state.refresh.format_version, FORMAT_VERSION);
            println!("{:<18} {}", "Refresh pending", state.refresh.force_refresh);
            println!("{:<18} {}", "Auto-run", state.auto_run);
            println!("{:<18} {}", "State file", store.path().display());
        }
        Commands::Lookup { phrase } => {
            match workflow.lookup(&phrase)? {
                Some(translation) => println!("{} -> {}", phrase, translation),
                None => println!("'{}' is not in your vocabulary", phrase),
            }
        }
        Commands::Clear => {
            workflow.clear_vocab()?;
            println!("Stored vocabulary cleared.");
        }
        Commands::Config { .. } => unreachable!("handled above"),
    }

    info!("WaniKanify completed successfully");
    Ok(())
}

fn handle_config(action: &ConfigAction, config: &Config) -> Result<()> {
    match action {
        ConfigAction::Init { path, force } => {
            if path.exists() && !force {
                return Err(KanifyError::Config(format!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                )).into());
            }
            Config::default().save_to_file(path)?;
            println!("Wrote default configuration to {}", path.display());
        }
        ConfigAction::Show => {
            println!("{}", toml::to_string_pretty(config)?);
        }
    }
    Ok(())
}

fn read_document(path: &Path) -> Result<Document> {
    if !path.exists() {
        return Err(KanifyError::FileNotFound(path.display().to_string()).into());
    }
    let html = std::fs::read_to_string(path)?;
    Ok(Document::parse(&html))
}

fn write_document(document: &Document, output: Option<&Path>) -> Result<()> {
    let html = document.to_html();
    match output {
        Some(path) => {
            std::fs::write(path, html)?;
            info!("Wrote {}", path.display());
        }
        None => println!("{}", html),
    }
    Ok(())
}

fn report_run(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Substituted { markers, refreshed } => {
            info!("Replaced {} phrases{}", markers, if *refreshed { " after refreshing" } else { "" });
        }
        RunOutcome::RefreshSkipped(SkipReason::MissingApiKey) => {
            println!("No API key entered, page left unchanged.");
        }
        RunOutcome::RefreshSkipped(reason) => info!("Vocabulary refresh skipped: {:?}", reason),
        RunOutcome::AutoRunDisabled => info!("Auto-run is disabled, page left unchanged"),
    }
}

fn mask_key(key: &str) -> String {
    let visible: String = key.chars().take(4).collect();
    format!("{}{}", visible, "*".repeat(key.chars().count().saturating_sub(4)))
}

fn format_minute(minute: i64) -> String {
    chrono::DateTime::from_timestamp(minute * 60, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| minute.to_string())
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool, log_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(log_dir, "wanikanify.log");
    let (non_blocking_file, _guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(_guard);

    // Determine log level
    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    // Console output goes to stderr so rewritten HTML on stdout stays clean
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(verbose)
        .with_line_number(verbose);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer);

    subscriber.try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized - console: {}, file: {}",
          log_level, log_dir.join("wanikanify.log").display());

    Ok(())
}
