//! Process wiring: store, broker, consumers and HTTP in one lifecycle
//!
//! `main.rs` stays a thin wrapper around [`run`]. Startup order is store,
//! broker, consumer loops, then the HTTP listener; shutdown runs the other
//! way round and waits for every in-flight message.

use crate::config::{AuditLogConfig, BrokerKind, StoreKind};
use crate::consumer::{ConsumerReport, MessageHandler};
use crate::coordinator::LifecycleCoordinator;
use crate::dlq::{DlqHandler, MemoryDlqHandler};
use crate::error::Result;
use crate::identity::verifier_from_config;
use crate::provider::memory::MemoryProvider;
use crate::provider::nats::NatsProvider;
use crate::provider::EventProvider;
use crate::server::{self, AppState};
use crate::storage::memory::MemoryLogStore;
use crate::storage::postgres::PgLogStore;
use crate::storage::LogStore;
use crate::writer::IdempotentWriter;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Open the configured record store, creating its schema when needed
pub async fn connect_store(config: &AuditLogConfig) -> Result<Arc<dyn LogStore>> {
    match config.store {
        StoreKind::Postgres => {
            let store = PgLogStore::connect(&config.database).await?;
            store.ensure_schema().await?;
            Ok(Arc::new(store))
        }
        StoreKind::Memory => {
            tracing::warn!("Using in-memory store, records are lost on exit");
            Ok(Arc::new(MemoryLogStore::new()))
        }
    }
}

/// Connect the configured broker
pub async fn connect_provider(config: &AuditLogConfig) -> Result<Arc<dyn EventProvider>> {
    match config.broker {
        BrokerKind::Nats => Ok(Arc::new(NatsProvider::connect(config.nats.clone()).await?)),
        BrokerKind::Memory => {
            tracing::warn!("Using in-memory broker, only local publishes are delivered");
            Ok(Arc::new(MemoryProvider::new()))
        }
    }
}

/// Run until Ctrl-C
pub async fn run(config: AuditLogConfig) -> Result<Vec<ConsumerReport>> {
    run_until(config, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown signal received");
    })
    .await
}

/// Run until `shutdown` resolves, returning one report per subscription
pub async fn run_until<F>(config: AuditLogConfig, shutdown: F) -> Result<Vec<ConsumerReport>>
where
    F: Future<Output = ()> + Send + 'static,
{
    config.validate()?;

    let store = connect_store(&config).await?;
    let provider = connect_provider(&config).await?;
    let dlq: Arc<dyn DlqHandler> = Arc::new(MemoryDlqHandler::new(config.dead_letter.capacity));
    let verifier = verifier_from_config(&config.identity)?;

    let state = AppState::new(store.clone(), verifier, dlq.clone(), &config.identity.header)?
        .with_provider(provider.clone());

    let handler = MessageHandler::new(
        IdempotentWriter::new(store.clone()),
        dlq,
        config.consumer.retry_delay(),
    );
    let mut coordinator =
        LifecycleCoordinator::new(provider.clone(), handler, config.consumer.clone());
    coordinator.start(&config.subscriptions)?;

    let stop = CancellationToken::new();
    let signal = stop.clone();
    tokio::spawn(async move {
        shutdown.await;
        signal.cancel();
    });

    let served = server::serve(&config.server, state, stop.clone().cancelled_owned()).await;
    if let Err(ref e) = served {
        tracing::error!("HTTP server failed: {}", e);
    }

    coordinator.shutdown();
    let reports = coordinator.wait().await;

    for report in &reports {
        tracing::info!(
            binding = %report.binding,
            received = report.stats.received,
            stored = report.stats.stored,
            duplicates = report.stats.duplicates,
            dropped = report.stats.dropped,
            rejected = report.stats.rejected,
            error = ?report.error,
            "Consumer report"
        );
    }

    served?;
    Ok(reports)
}
