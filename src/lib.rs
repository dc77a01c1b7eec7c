/// Recap - periodic, incremental summaries of Discord channels.
///
/// Every run picks up the messages each configured channel received since its
/// last checkpoint, asks an OpenAI-compatible model for a summary, writes the
/// summary to disk (and optionally a webhook), and only then moves the
/// channel's checkpoint forward.
///
/// # Architecture
///
/// - `core`: configuration, domain models, checkpoint store, run lock, cancellation
/// - `clients`: Discord REST source, chat-completions generator, webhook relay
/// - `worker`: resolver, paginated fetcher, summarizer, sink and the orchestrator
///
/// # Example
///
/// ```no_run
/// use recap::clients::{DiscordClient, LlmClient};
/// use recap::core::cancel::CancellationToken;
/// use recap::core::checkpoint::CheckpointStore;
/// use recap::core::config::AppConfig;
/// use recap::worker::{Orchestrator, OrchestratorSettings, RunStatus, SummaryJob, SummarySink};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     recap::setup_logging();
///
///     let config = AppConfig::load(None)?;
///     let discord = DiscordClient::from_config(&config)?;
///     let llm = LlmClient::from_config(&config)?;
///
///     let orchestrator = Orchestrator::new(
///         &discord,
///         &llm,
///         SummarySink::new(&config.summary_dir, config.include_raw_messages),
///         OrchestratorSettings::from_config(&config),
///     );
///     let job = SummaryJob::new(
///         orchestrator,
///         config.channels.clone(),
///         CheckpointStore::new(&config.checkpoint_file),
///     );
///
///     if let RunStatus::Completed(report) = job.run_once(&CancellationToken::new()).await? {
///         println!("{} channel(s) summarized", report.advanced_count());
///     }
///     Ok(())
/// }
/// ```
// Module declarations
pub mod clients;
pub mod core;
pub mod errors;
pub mod prompt;
pub mod utils;
pub mod worker;

/// Configure structured logging.
///
/// `LOG_FORMAT=json` selects JSON lines, anything else the human-readable
/// format. Verbosity comes from `RECAP_LOG` (an `EnvFilter` directive), then
/// `LOG_LEVEL`, defaulting to `info`. Calling it more than once is harmless.
///
/// # Example
///
/// ```
/// recap::setup_logging();
/// ```
pub fn setup_logging() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::prelude::*;

    let filter = std::env::var("RECAP_LOG")
        .ok()
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .or_else(|| {
            std::env::var("LOG_LEVEL")
                .ok()
                .and_then(|level| EnvFilter::try_new(level.trim().to_lowercase()).ok())
        })
        .unwrap_or_else(|| EnvFilter::new("info"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.trim().eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let result = if json {
        let fmt_layer = tracing_subscriber::fmt::layer().json().with_target(true);
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr);
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("Logging already initialised");
    }
}
