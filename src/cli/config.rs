use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::Args;
use serde::Deserialize;

use crate::build::executor::{DEFAULT_BUILD_TIMEOUT, DEFAULT_INTERPRETER};
use crate::build::status::DEFAULT_MAX_LOG_LINES;

/// Configuration loaded from `buildhook.yaml`.
/// Every field is optional; CLI flags and env vars take precedence.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct BuildhookConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub build_script: Option<String>,
    pub interpreter: Option<String>,
    pub build_dir: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_log_lines: Option<usize>,
    /// Chat incoming-webhook that receives build failure reports.
    pub notify_webhook_url: Option<String>,
    /// Remote build service that receives every trigger.
    pub trigger_webhook_url: Option<String>,
}

impl BuildhookConfig {
    /// Load configuration from a YAML file.
    ///
    /// - If `path` is `Some`, load that specific file (error if missing).
    /// - If `path` is `None`, auto-detect `buildhook.yaml` in cwd; return defaults if absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file_path = match path {
            Some(p) => {
                if !p.exists() {
                    anyhow::bail!("Config file not found: {}", p.display());
                }
                p.to_path_buf()
            }
            None => {
                let default_path = Path::new("buildhook.yaml");
                if !default_path.exists() {
                    return Ok(Self::default());
                }
                default_path.to_path_buf()
            }
        };

        let contents = std::fs::read_to_string(&file_path)
            .with_context(|| format!("Failed to read config file: {}", file_path.display()))?;

        let config: BuildhookConfig = serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", file_path.display()))?;

        Ok(config)
    }
}

/// Build options shared by `serve` and `run`. Each one overrides the YAML file.
#[derive(Args, Debug, Default, Clone)]
pub struct BuildArgs {
    /// Build script handed to the interpreter; builds are disabled when unset
    #[arg(long, env = "BUILD_SCRIPT_PATH")]
    pub script: Option<PathBuf>,

    /// Interpreter that runs the build script (default: /bin/bash)
    #[arg(long, env = "BUILD_INTERPRETER")]
    pub interpreter: Option<PathBuf>,

    /// Working directory for the build (default: inherit)
    #[arg(long, env = "BUILD_DIR")]
    pub build_dir: Option<PathBuf>,

    /// Hard timeout per build in seconds (default: 300)
    #[arg(long, env = "BUILD_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Number of log lines kept for the current build (default: 1000)
    #[arg(long, env = "BUILD_MAX_LOG_LINES")]
    pub max_log_lines: Option<usize>,

    /// Incoming-webhook URL that receives build failure reports
    #[arg(long, env = "SLACK_WEBHOOK_URL")]
    pub notify_webhook_url: Option<String>,

    /// Remote build webhook that receives every trigger
    #[arg(long, env = "WEBHOOK_URL")]
    pub trigger_webhook_url: Option<String>,
}

/// Fully resolved build settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSettings {
    pub script: Option<PathBuf>,
    pub interpreter: PathBuf,
    pub build_dir: Option<PathBuf>,
    pub timeout: Duration,
    pub max_log_lines: usize,
    pub notify_webhook_url: Option<String>,
    pub trigger_webhook_url: Option<String>,
}

impl BuildSettings {
    /// Merge CLI/env values over the config file over built-in defaults.
    /// Empty strings count as unset.
    pub fn resolve(args: BuildArgs, file: &BuildhookConfig) -> Self {
        let script = args
            .script
            .filter(|p| !p.as_os_str().is_empty())
            .or_else(|| non_empty(&file.build_script).map(PathBuf::from));

        let interpreter = args
            .interpreter
            .filter(|p| !p.as_os_str().is_empty())
            .or_else(|| non_empty(&file.interpreter).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_INTERPRETER));

        let build_dir = args
            .build_dir
            .or_else(|| non_empty(&file.build_dir).map(PathBuf::from));

        let timeout = args
            .timeout_secs
            .or(file.timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_BUILD_TIMEOUT);

        let max_log_lines = args
            .max_log_lines
            .or(file.max_log_lines)
            .unwrap_or(DEFAULT_MAX_LOG_LINES);

        Self {
            script,
            interpreter,
            build_dir,
            timeout,
            max_log_lines,
            notify_webhook_url: args
                .notify_webhook_url
                .filter(|s| !s.is_empty())
                .or_else(|| non_empty(&file.notify_webhook_url).map(str::to_string)),
            trigger_webhook_url: args
                .trigger_webhook_url
                .filter(|s| !s.is_empty())
                .or_else(|| non_empty(&file.trigger_webhook_url).map(str::to_string)),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}
