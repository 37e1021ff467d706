//! Background worker binary.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use emploi_feed::{DetectorConfig, LexiconDetector};
use emploi_notify::{spawn_batcher, BatcherConfig, DeliveryLimiter, HttpPushProvider, PushProviderConfig};
use emploi_queue::{JobDispatcher, JobQueue};
use emploi_store::{PgStore, StoreConfig};
use emploi_worker::{metrics, JobExecutor, ProcessingContext, QueueBatchSink, WorkerConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // rustls 0.23 needs an explicit crypto provider
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        eprintln!("rustls crypto provider was already installed");
    }

    init_tracing();

    info!("Starting emploi-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let store = match PgStore::connect(&StoreConfig::from_env()).await {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    let queue = match JobQueue::from_env() {
        Ok(q) => Arc::new(q),
        Err(e) => {
            error!("Failed to create job queue: {}", e);
            std::process::exit(1);
        }
    };

    let detector = match LexiconDetector::new(&DetectorConfig::from_env()) {
        Ok(d) => Arc::new(d),
        Err(e) => {
            error!("Failed to build content detector: {}", e);
            std::process::exit(1);
        }
    };

    let provider_config = PushProviderConfig::from_env();
    if provider_config.api_key.is_empty() {
        warn!("PUSH_PROVIDER_API_KEY is empty, the provider will likely refuse batches");
    }
    let provider = match HttpPushProvider::new(&provider_config) {
        Ok(p) => Arc::new(p),
        Err(e) => {
            error!("Failed to create push provider client: {}", e);
            std::process::exit(1);
        }
    };
    let limiter = Arc::new(DeliveryLimiter::new(
        provider_config.batches_per_second,
        provider_config.burst,
    ));

    let dispatcher: Arc<dyn JobDispatcher> = queue.clone();
    let (notifier, batcher) = spawn_batcher(
        BatcherConfig::from_env(),
        Arc::new(QueueBatchSink::new(dispatcher)),
    );

    if config.metrics_port != 0 {
        match metrics::init_metrics(config.metrics_port) {
            Ok(()) => info!("Prometheus metrics on port {}", config.metrics_port),
            Err(e) => warn!("Failed to install Prometheus exporter: {}", e),
        }
    }

    let ctx = Arc::new(ProcessingContext::new(
        config.clone(),
        store,
        detector,
        notifier,
        provider,
        limiter,
    ));
    let executor = Arc::new(JobExecutor::new(config, queue, ctx));

    let signal_executor = Arc::clone(&executor);
    let signal_task = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
        signal_executor.shutdown();
    });

    let result = executor.run().await;
    signal_task.abort();
    if let Err(e) = result {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    // Dropping the executor drops the last sender; the batcher then flushes
    drop(executor);
    if tokio::time::timeout(Duration::from_secs(10), batcher).await.is_err() {
        warn!("Notification batcher did not flush in time");
    }

    info!("Worker shutdown complete");
}

/// Colored output for dev, JSON when `LOG_FORMAT=json`.
fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("emploi=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }
}
