//! prlens: AI code review for pull requests and merge requests.
//!
//! Entry point and error handling boundary. Uses `anyhow` for
//! ergonomic error propagation and user-facing messages.

mod cli;

use prlens::cache;
use prlens::config;
use prlens::constants;
use prlens::env;
use prlens::orchestrator;
use prlens::popup;
use prlens::providers;
use prlens::render;
use prlens::source;

use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use cli::args::{CacheAction, Cli, Command, ReviewArgs};
use config::{CacheConfig, Config};
use env::Env;
use orchestrator::{ReviewOrchestrator, ReviewState};
use popup::{Popup, PopupCommand};

#[tokio::main]
async fn main() {
    init_tracing();
    let code = match run().await {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(err) => {
            eprintln!("Error: {err:#}");
            1
        }
    };
    // Exit explicitly: an interactive session may still hold a blocking
    // stdin read that would keep the runtime alive.
    process::exit(code);
}

/// Log to stderr, filtered by `PRLENS_LOG` (default: warnings only).
fn init_tracing() {
    let filter = EnvFilter::try_from_env(constants::ENV_LOG)
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Returns whether the command succeeded.
async fn run() -> Result<bool> {
    let cli = Cli::parse();

    match cli.command {
        Command::Review(args) => run_review(*args).await,
        Command::Cache { action } => run_cache(action).map(|_| true),
        Command::Version => run_version().map(|_| true),
    }
}

/// Print detailed version and build information.
fn run_version() -> Result<()> {
    use colored::Colorize;

    println!(
        "{} {}",
        constants::APP_NAME.bold(),
        constants::VERSION.green().bold()
    );
    println!("{}     {}", "target:".dimmed(), constants::TARGET);
    Ok(())
}

fn load_config() -> Result<Config> {
    let cwd = std::env::current_dir().context("failed to determine working directory")?;
    Config::load(Some(cwd.as_path()), &Env::real()).context("failed to load configuration")
}

fn build_cache(config: &CacheConfig) -> cache::ResultCache {
    let store: Arc<dyn cache::SessionStore> = match config.dir {
        Some(ref dir) => Arc::new(cache::FileStore::new_with_dir(dir.clone())),
        None => cache::default_store(),
    };
    cache::ResultCache::new(store, config.enabled)
}

/// Manage the session cache.
fn run_cache(action: CacheAction) -> Result<()> {
    let config = load_config()?;
    let cache = build_cache(&CacheConfig {
        enabled: true,
        ..config.cache
    });

    match action {
        CacheAction::Clear => {
            let stats = cache.clear().context("failed to clear cache")?;
            println!(
                "Cleared {} cached review(s) ({}).",
                stats.entries,
                stats.human_size(),
            );
        }
        CacheAction::Stats => {
            let stats = cache.stats().context("failed to read cache stats")?;
            println!("Cache entries: {}", stats.entries);
            println!("Cache size:    {}", stats.human_size());
        }
        CacheAction::Path => match cache.path() {
            Some(p) => println!("{}", p.display()),
            None => bail!("no session directory on this platform; reviews are cached in memory only"),
        },
    }

    Ok(())
}

/// Review one pull/merge request.
async fn run_review(args: ReviewArgs) -> Result<bool> {
    let mut config = load_config()?;
    args.apply_to(&mut config);

    let mut settings = config
        .review
        .settings()
        .context("invalid review configuration")?;
    if !args.interactive {
        // Nothing stays on screen to dismiss in one-shot mode.
        settings.dismiss_delay = Duration::ZERO;
    }
    if !config.provider.has_credential() {
        tracing::debug!(backend = %config.provider.backend, "no credential configured");
    }

    let client = providers::build_client(&config.provider).context("failed to set up chat backend")?;
    let source = Arc::new(
        source::HttpContextSource::new().context("failed to set up HTTP client")?,
    );
    let cache = build_cache(&config.cache);

    let label = match source::resolve_target(&args.url, &settings.gitlab_hosts) {
        Ok(target) => {
            if args.rerun {
                cache.evict(&target.identity());
            }
            target.display_name
        }
        Err(_) => args.url.clone(),
    };

    if atty::is(atty::Stream::Stderr) {
        cli::print_header(&args.url, &config.provider.backend.to_string());
    }

    let sink = render::TerminalSink::stdout(label)
        .output_file(args.output.clone())
        .interactive(args.interactive);
    let mut orchestrator =
        ReviewOrchestrator::new(client, source, cache, Box::new(sink), settings);

    let state = if args.interactive {
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(read_commands(tx));
        let mut popup = Popup::new(orchestrator);
        popup.run(&args.url, args.title.as_deref(), rx).await
    } else {
        orchestrator.open(&args.url, args.title.as_deref()).await;
        orchestrator.close();
        orchestrator.state().clone()
    };

    Ok(!matches!(state, ReviewState::Failed(_)))
}

/// Forward typed commands from stdin until EOF or `q`.
async fn read_commands(tx: mpsc::Sender<PopupCommand>) {
    use tokio::io::AsyncBufReadExt;

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match PopupCommand::from_key(&line) {
            Some(command) => {
                if tx.send(command).await.is_err() || command == PopupCommand::Quit {
                    break;
                }
            }
            None if line.trim().is_empty() => {}
            None => eprintln!("Unknown command '{}': use r, o or q.", line.trim()),
        }
    }
}
