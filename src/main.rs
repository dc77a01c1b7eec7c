use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};

use recap::clients::{DiscordClient, LlmClient, SummaryRelay, WebhookClient};
use recap::core::cancel::CancellationToken;
use recap::core::checkpoint::{CheckpointStore, format_timestamp};
use recap::core::config::AppConfig;
use recap::core::models::{ChannelOutcome, RunReport};
use recap::worker::{Orchestrator, OrchestratorSettings, RunStatus, SummaryJob, SummarySink};

#[derive(Debug, Parser)]
#[command(name = "recap", version, about = "Incremental Discord channel summaries")]
struct Cli {
    /// TOML config file (defaults to $RECAP_CONFIG_PATH, then ./recap.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Summarize every configured channel once
    Run,
    /// Summarize on a timer every SUMMARY_INTERVAL_HOURS until interrupted
    Watch,
    /// Show configured channels and stored checkpoints
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    recap::setup_logging();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    if matches!(cli.command, Command::Status) {
        print_status(&config);
        return Ok(ExitCode::SUCCESS);
    }

    let discord = DiscordClient::from_config(&config)?;
    let llm = LlmClient::from_config(&config)?;
    let webhook = match &config.webhook_url {
        Some(url) => Some(WebhookClient::new(url.clone(), config.request_timeout())?),
        None => None,
    };

    let mut orchestrator = Orchestrator::new(
        &discord,
        &llm,
        SummarySink::new(&config.summary_dir, config.include_raw_messages),
        OrchestratorSettings::from_config(&config),
    );
    if let Some(webhook) = &webhook {
        orchestrator = orchestrator.with_relay(webhook as &dyn SummaryRelay);
    }
    let job = SummaryJob::new(
        orchestrator,
        config.channels.clone(),
        CheckpointStore::new(&config.checkpoint_file),
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight channels");
            on_signal.cancel();
        }
    });

    match cli.command {
        Command::Run => match job.run_once(&cancel).await? {
            RunStatus::Completed(report) => print_report(&report),
            RunStatus::LockHeld => println!("Another run is in progress, skipped."),
        },
        Command::Watch => {
            let every = config.watch_period();
            info!(
                "Summarizing {} channel(s) every {} hour(s)",
                config.channels.len(),
                config.summary_interval_hours
            );
            job.run_periodic(every, &cancel).await;
        }
        Command::Status => {}
    }

    Ok(ExitCode::SUCCESS)
}

fn print_report(report: &RunReport) {
    for outcome in &report.outcomes {
        match outcome {
            ChannelOutcome::Advanced {
                channel,
                messages_count,
                record_path,
                ..
            } => println!(
                "{}: {} messages -> {}",
                channel.name,
                messages_count,
                record_path.display()
            ),
            ChannelOutcome::Skipped { channel, reason } => {
                println!("{channel}: skipped ({reason})");
            }
        }
    }
    println!(
        "{} channel(s) summarized, {} skipped",
        report.advanced_count(),
        report.skipped_count()
    );
}

fn print_status(config: &AppConfig) {
    println!("Channels: {}", config.channels.len());
    for channel in &config.channels {
        println!("  {channel}");
    }
    println!("Interval: {} hour(s)", config.summary_interval_hours);
    println!("Max messages per channel: {}", config.max_messages_per_channel);
    println!("Summary directory: {}", config.summary_dir.display());

    let store = CheckpointStore::new(&config.checkpoint_file);
    let checkpoints = store.load();
    println!("Checkpoints ({}):", store.path().display());
    if checkpoints.is_empty() {
        println!("  none");
    }
    for (channel, ts) in &checkpoints {
        println!("  {channel}: {}", format_timestamp(*ts));
    }
}
