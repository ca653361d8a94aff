//! Command-line interface for bookstack-export.
//!
//! One flat command: load the config, then export once or keep exporting
//! every `run_interval` seconds.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{debug, error, info};

use crate::adapters::{HttpClient, NotifyHandler, ObjectStore, S3Store};
use crate::config::ResolvedConfig;
use crate::core::{Orchestrator, RunSummary};

/// bookstack-export - Archive a BookStack wiki to tar/gzip
#[derive(Parser, Debug)]
#[command(name = "bookstack-export")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short = 'c', long, default_value = "data/config.yml")]
    pub config_file: PathBuf,

    /// Directory for archives (overrides `output_path` in the config)
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Log verbosity
    #[arg(short = 'v', long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Directive for `tracing_subscriber::EnvFilter`
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let config = ResolvedConfig::load(&self.config_file, self.output_dir.as_deref())?;

        let client = HttpClient::new(&config.http, &config.headers)?;
        let store = match &config.object_storage {
            Some(settings) => Some(
                S3Store::connect(settings)
                    .await
                    .context("Failed to configure object storage")?,
            ),
            None => None,
        };
        let notifier_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http.timeout))
            .build()
            .context("Failed to build notification HTTP client")?;
        let notifications = NotifyHandler::from_config(&config.notifications, notifier_client);

        let orchestrator = Orchestrator::new(
            &config,
            &client,
            store.as_ref().map(|s| s as &dyn ObjectStore),
        );

        if config.run_interval == 0 {
            run_once(&orchestrator, &notifications).await?;
            return Ok(());
        }

        let interval = Duration::from_secs(config.run_interval);
        loop {
            // A failed run is already reported; the schedule keeps going
            if let Err(e) = run_once(&orchestrator, &notifications).await {
                debug!(error = %e, "Run failed, continuing schedule");
            }
            info!(seconds = config.run_interval, "Waiting for next run");
            tokio::time::sleep(interval).await;
        }
    }
}

/// One run plus its notification
async fn run_once(orchestrator: &Orchestrator<'_>, notifications: &NotifyHandler) -> Result<RunSummary> {
    match orchestrator.run().await {
        Ok(summary) => {
            notifications.do_notify(None).await;
            Ok(summary)
        }
        Err(e) => {
            error!("Export run failed: {:#}", e);
            notifications.do_notify(Some(&e)).await;
            Err(e)
        }
    }
}
