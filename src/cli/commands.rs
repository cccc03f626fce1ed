//! CLI command definitions for reviewflow.

use std::io::Read;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use redis::aio::ConnectionManager;
use tracing::{error, info};

use crate::analyzer::CodeAnalyzer;
use crate::cache::RedisCache;
use crate::config::AppConfig;
use crate::github::GitHubClient;
use crate::health;
use crate::notifier::SlackNotifier;
use crate::producer::{Producer, WebhookEvent};
use crate::queue::JobQueue;
use crate::readiness::await_ready;
use crate::store::{Database, JobStore};
use crate::summarizer::LlmSummarizer;
use crate::worker::{Collaborators, ReviewPipeline, Worker, WorkerConfig};

/// Webhook-driven PR review pipeline.
#[derive(Parser)]
#[command(name = "reviewflow")]
#[command(about = "Queue-backed PR review pipeline: submit events, run workers, probe health")]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the worker loop: dequeue jobs and drive them to a terminal status.
    Worker(WorkerArgs),

    /// Submit a webhook event payload to the queue.
    Submit(SubmitArgs),

    /// Print queue and store liveness plus queue depth as JSON.
    Status,
}

/// Arguments for `reviewflow worker`.
#[derive(Parser, Debug)]
pub struct WorkerArgs {
    /// Identifier used in logs, useful when running several workers.
    #[arg(long, default_value = "worker-0")]
    pub worker_id: String,
}

/// Arguments for `reviewflow submit`.
#[derive(Parser, Debug)]
pub struct SubmitArgs {
    /// Path to a JSON webhook payload; reads stdin when omitted.
    #[arg(short, long)]
    pub file: Option<String>,
}

/// Parses command-line arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Dispatches a parsed CLI invocation.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("failed to load configuration")?;

    match cli.command {
        Commands::Worker(args) => run_worker(config, args).await,
        Commands::Submit(args) => run_submit(config, args).await,
        Commands::Status => run_status(config).await,
    }
}

/// Connects to Redis once; the queue and cache share the connection.
async fn connect_redis(config: &AppConfig) -> anyhow::Result<ConnectionManager> {
    let client = redis::Client::open(config.redis_url.as_str())
        .with_context(|| format!("invalid Redis URL {}", config.redis_url))?;
    let manager = ConnectionManager::new(client)
        .await
        .context("failed to connect to Redis")?;
    Ok(manager)
}

async fn run_worker(config: AppConfig, args: WorkerArgs) -> anyhow::Result<()> {
    let store = Arc::new(
        Database::connect_lazy(&config.database_url).context("invalid database URL")?,
    );

    // Gate startup on the store: queue and cache are often up before the
    // database finishes initializing in a fresh deployment.
    await_ready(&config.store_ready, || store.probe_ready())
        .await
        .context("job record store never became ready")?;

    store
        .run_migrations()
        .await
        .context("schema bootstrap failed")?;

    let redis = connect_redis(&config).await?;
    let queue = Arc::new(JobQueue::from_connection(redis.clone(), &config.queue_name));
    let cache = Arc::new(RedisCache::from_connection(redis));

    let deps = Collaborators {
        store,
        cache,
        analyzer: Arc::new(CodeAnalyzer::new()),
        summarizer: Arc::new(LlmSummarizer::new(
            config.llm_api_base.clone(),
            config.llm_api_key.clone(),
            config.llm_model.clone(),
        )),
        code_host: Arc::new(GitHubClient::new(config.github_token.clone())),
        notifier: Arc::new(SlackNotifier::new(config.slack_webhook_url.clone())),
    };

    let worker_config = WorkerConfig::default()
        .with_poll_timeout(config.poll_timeout)
        .with_error_backoff(config.error_backoff)
        .with_cache_ttl(config.cache_ttl)
        .with_persist_retry(config.persist_retry);

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
            return;
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    let pipeline = ReviewPipeline::new(deps, worker_config);
    let worker = Worker::new(args.worker_id, queue, pipeline, shutdown_rx);
    worker.run().await;

    Ok(())
}

async fn run_submit(config: AppConfig, args: SubmitArgs) -> anyhow::Result<()> {
    let payload = match args.file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read payload from {path}"))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read payload from stdin")?;
            buffer
        }
    };

    let event: WebhookEvent =
        serde_json::from_str(&payload).context("payload is not a valid webhook event")?;

    let queue = JobQueue::connect(&config.redis_url, &config.queue_name)
        .await
        .context("failed to connect to the queue")?;

    let receipt = Producer::new(&queue)
        .submit(event)
        .await
        .context("submission rejected")?;

    println!("{}", serde_json::to_string_pretty(&receipt)?);
    Ok(())
}

async fn run_status(config: AppConfig) -> anyhow::Result<()> {
    let queue = JobQueue::connect(&config.redis_url, &config.queue_name)
        .await
        .context("failed to connect to the queue")?;
    let store = Database::connect_lazy(&config.database_url).context("invalid database URL")?;

    let report = health::check(&queue, &store).await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.healthy {
        Ok(())
    } else {
        anyhow::bail!("one or more dependencies are down")
    }
}
