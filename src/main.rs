use std::sync::Arc;

use signal_fusion::application::{CycleActor, CycleOrchestrator, DataPorts, OutputSinks};
use signal_fusion::config::EngineConfig;
use signal_fusion::domain::repositories::SignalSink;
use signal_fusion::domain::services::DefaultIndicatorEngine;
use signal_fusion::infrastructure::{
    InMemorySignalSink, LoggingNotificationSink, MarketSnapshot, SnapshotStore,
};
use signal_fusion::persistence::{init_database, SqliteSignalRepository};
use signal_fusion::rate_limit::create_rate_limiter;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = dotenvy::dotenv() {
        // A missing .env is normal; anything else is worth a line
        if !e.not_found() {
            eprintln!("Failed to load .env: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signal_fusion=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = EngineConfig::from_env();
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(e.into());
    }

    let snapshot_path =
        std::env::var("SNAPSHOT_PATH").unwrap_or_else(|_| "data/snapshot.json".to_string());
    let snapshot = MarketSnapshot::load(&snapshot_path).await?;

    let store = Arc::new(SnapshotStore::new(snapshot));
    let limiter = create_rate_limiter(config.lookups_per_minute)?;
    let ports = DataPorts {
        market: store.clone(),
        fundamentals: store.clone(),
        events: store,
        indicators: Arc::new(DefaultIndicatorEngine::default()),
    }
    .throttled(limiter);

    let repository = match std::env::var("DATABASE_URL") {
        Ok(url) => match init_database(&url).await {
            Ok(pool) => Some(Arc::new(SqliteSignalRepository::new(pool))),
            Err(e) => {
                warn!(error = %e, "Database unavailable, signals kept in memory only");
                None
            }
        },
        Err(_) => None,
    };
    let signals: Arc<dyn SignalSink> = match &repository {
        Some(repository) => repository.clone(),
        None => Arc::new(InMemorySignalSink::new()),
    };
    let sinks = OutputSinks {
        signals,
        notifications: Arc::new(LoggingNotificationSink::new()),
    };

    let orchestrator = Arc::new(CycleOrchestrator::new(config, ports, sinks)?);
    let mut actor = CycleActor::new(orchestrator);
    if let Some(repository) = repository {
        actor = actor.with_report_store(repository);
    }
    let handle = actor.spawn();

    let report = handle.run_cycle().await?;
    info!(
        analyzed = report.companies_analyzed,
        emitted = report.actionable_insights.len(),
        "Cycle complete"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);

    handle.shutdown().await?;
    Ok(())
}
