pub mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::api::AppState;
use crate::build::{
    BuildCommand, BuildExecutor, BuildRun, BuildState, BuildTrigger, CommandRunner, StatusStore,
};
use crate::notify::{BuildWebhook, FanoutNotifier, LogNotifier, WebhookNotifier};

pub use config::{BuildArgs, BuildSettings, BuildhookConfig};

#[derive(Parser)]
#[command(name = "buildhook", version, about = "Content-triggered site build runner")]
pub struct Cli {
    /// Path to a .env file to load (default: auto-detect .env in cwd)
    #[arg(long, global = true)]
    dotenv: Option<PathBuf>,

    /// Path to a YAML config file (default: auto-detect buildhook.yaml in cwd)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST API server
    Serve {
        /// Host to bind to (default: 0.0.0.0)
        #[arg(long, env = "HOST")]
        host: Option<String>,

        /// Port to listen on (default: 3000)
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,

        #[command(flatten)]
        build: BuildArgs,
    },

    /// Run one build in the foreground and print its final status
    Run {
        /// Action label passed to the script (create, update, delete, ...)
        action: String,

        /// Identifier of the changed article
        article_id: Option<String>,

        /// Print the final status as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        build: BuildArgs,
    },

    /// Show the build status of a running server
    Status {
        /// Base URL of the server
        #[arg(long, default_value = "http://127.0.0.1:3000", env = "BUILDHOOK_URL")]
        url: String,
    },
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    // Load .env file
    load_dotenv(cli.dotenv.as_deref());

    match cli.command {
        Commands::Serve { host, port, build } => {
            let file = BuildhookConfig::load(cli.config.as_deref())?;
            let host = host
                .or_else(|| file.host.clone())
                .unwrap_or_else(|| "0.0.0.0".to_string());
            let port = port.or(file.port).unwrap_or(3000);
            let settings = BuildSettings::resolve(build, &file);

            let trigger = build_trigger(&settings);
            crate::api::serve(&host, port, Arc::new(AppState::new(trigger))).await
        }
        Commands::Run {
            action,
            article_id,
            json,
            build,
        } => {
            let file = BuildhookConfig::load(cli.config.as_deref())?;
            let settings = BuildSettings::resolve(build, &file);
            cmd_run(&settings, &action, &article_id.unwrap_or_default(), json).await
        }
        Commands::Status { url } => cmd_status(&url).await,
    }
}

/// Wire the status store, executor, notifiers and trigger from resolved settings.
pub fn build_trigger(settings: &BuildSettings) -> Arc<BuildTrigger> {
    let store = Arc::new(StatusStore::with_capacity(settings.max_log_lines));
    let executor = build_executor(settings, store.clone());

    let mut trigger = BuildTrigger::new(store, executor);
    if let Some(ref url) = settings.trigger_webhook_url {
        trigger = trigger.with_webhook(BuildWebhook::new(url.clone()));
    }
    Arc::new(trigger)
}

/// `None` when no build script is configured.
pub fn build_executor(
    settings: &BuildSettings,
    store: Arc<StatusStore>,
) -> Option<Arc<BuildExecutor>> {
    let script = settings.script.clone()?;

    let mut notifier = FanoutNotifier::new().with(Arc::new(LogNotifier));
    if let Some(ref url) = settings.notify_webhook_url {
        notifier = notifier.with(Arc::new(WebhookNotifier::new(url.clone())));
    }

    let mut command = BuildCommand::new(script).with_timeout(settings.timeout);
    command.interpreter = settings.interpreter.clone();
    command.cwd = settings.build_dir.clone();

    Some(Arc::new(BuildExecutor::new(
        store,
        Arc::new(CommandRunner::new()),
        Arc::new(notifier),
        command,
    )))
}

/// Load environment variables from a .env file.
/// If an explicit path is given, load from that path (error if missing).
/// Otherwise, auto-detect .env in the current working directory (silently skip if absent).
fn load_dotenv(explicit_path: Option<&std::path::Path>) {
    match explicit_path {
        Some(path) => match dotenvy::from_path(path) {
            Ok(()) => info!("Loaded env from {}", path.display()),
            Err(e) => {
                eprintln!(
                    "Warning: Failed to load dotenv file '{}': {}",
                    path.display(),
                    e
                );
            }
        },
        None => match dotenvy::dotenv() {
            Ok(path) => info!("Loaded env from {}", path.display()),
            Err(dotenvy::Error::Io(_)) => {}
            Err(e) => {
                eprintln!("Warning: Failed to parse .env file: {}", e);
            }
        },
    }
}

async fn cmd_run(settings: &BuildSettings, action: &str, article_id: &str, json: bool) -> Result<()> {
    let store = Arc::new(StatusStore::with_capacity(settings.max_log_lines));
    let executor = build_executor(settings, store.clone()).ok_or_else(|| {
        anyhow::anyhow!("No build script configured (use --script or BUILD_SCRIPT_PATH)")
    })?;

    println!(
        "Building: {} {} {} {}",
        executor.command().interpreter.display(),
        executor.command().script.display(),
        action,
        article_id
    );

    let result = executor.execute(action, article_id).await;
    let run = store.snapshot();

    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        print_run(&run);
    }

    match result {
        Ok(_) => Ok(()),
        Err(failure) => Err(anyhow::Error::new(failure).context("Build failed")),
    }
}

async fn cmd_status(url: &str) -> Result<()> {
    let endpoint = format!("{}/api/build/status", url.trim_end_matches('/'));
    let run: BuildRun = reqwest::get(&endpoint)
        .await
        .with_context(|| format!("Failed to reach {}", endpoint))?
        .error_for_status()?
        .json()
        .await
        .with_context(|| "Failed to parse build status")?;

    print_run(&run);
    Ok(())
}

fn print_run(run: &BuildRun) {
    let status_icon = match run.state {
        BuildState::Success => "✓",
        BuildState::Failed => "✗",
        BuildState::Running => "⟳",
        BuildState::Idle => "○",
    };
    println!("{} {}", status_icon, run.state);

    if run.state == BuildState::Idle {
        println!("No build has run yet.");
        return;
    }

    println!("Action:     {}", run.action);
    println!("Article ID: {}", run.article_id);
    if let Some(started) = run.start_time {
        println!("Started:    {}", started.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(duration) = run.duration() {
        println!("Duration:   {}ms", duration.num_milliseconds());
    }

    println!("\nLogs:");
    if run.truncated > 0 {
        println!("  ... ({} earlier lines dropped)", run.truncated);
    }
    for line in &run.logs {
        println!("  {}", line);
    }
}
