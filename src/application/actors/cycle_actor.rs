//! Cycle actor
//!
//! Owns the orchestrator in its own task and runs cycles one at a time, in the
//! order requests arrive. The external scheduler only holds a `CycleHandle`.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use crate::application::orchestrator::{CycleOrchestrator, CycleReport};
use crate::domain::errors::EngineError;
use crate::domain::services::CacheStats;
use crate::persistence::SqliteSignalRepository;

/// Messages that can be sent to the cycle actor
#[derive(Debug)]
pub enum CycleMessage {
    /// Run one analysis cycle and reply with its report
    RunCycle {
        reply: oneshot::Sender<CycleReport>,
    },
    /// Result cache counters
    GetCacheStats {
        reply: oneshot::Sender<CacheStats>,
    },
    /// Shutdown the actor
    Shutdown,
}

pub struct CycleActor {
    orchestrator: Arc<CycleOrchestrator>,
    reports: Option<Arc<SqliteSignalRepository>>,
}

impl CycleActor {
    pub fn new(orchestrator: Arc<CycleOrchestrator>) -> Self {
        CycleActor {
            orchestrator,
            reports: None,
        }
    }

    /// Persist every cycle summary after it completes
    pub fn with_report_store(mut self, repository: Arc<SqliteSignalRepository>) -> Self {
        self.reports = Some(repository);
        self
    }

    /// Spawn the actor and return a handle to it
    pub fn spawn(self) -> CycleHandle {
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(self.run(rx));
        CycleHandle { tx }
    }

    async fn run(self, mut rx: mpsc::Receiver<CycleMessage>) {
        info!("Cycle actor started");
        while let Some(msg) = rx.recv().await {
            match msg {
                CycleMessage::RunCycle { reply } => {
                    let report = self.orchestrator.run_cycle().await;
                    if let Some(repository) = &self.reports {
                        if let Err(e) = repository.save_cycle_report(&report).await {
                            error!(cycle_id = report.cycle_id, error = %e, "Failed to persist cycle report");
                        }
                    }
                    if reply.send(report).is_err() {
                        warn!("Cycle requester went away before the report was ready");
                    }
                }
                CycleMessage::GetCacheStats { reply } => {
                    let _ = reply.send(self.orchestrator.cache_stats().await);
                }
                CycleMessage::Shutdown => {
                    info!("Cycle actor shutting down");
                    break;
                }
            }
        }
    }
}

/// Cloneable entry point for schedulers
#[derive(Clone)]
pub struct CycleHandle {
    tx: mpsc::Sender<CycleMessage>,
}

impl CycleHandle {
    pub async fn run_cycle(&self) -> Result<CycleReport, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(CycleMessage::RunCycle { reply }).await?;
        Ok(rx.await?)
    }

    pub async fn cache_stats(&self) -> Result<CacheStats, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(CycleMessage::GetCacheStats { reply }).await?;
        Ok(rx.await?)
    }

    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.tx.send(CycleMessage::Shutdown).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::orchestrator::{DataPorts, OutputSinks};
    use crate::config::EngineConfig;
    use crate::domain::services::DefaultIndicatorEngine;
    use crate::infrastructure::sinks::{InMemorySignalSink, LoggingNotificationSink};
    use crate::infrastructure::snapshot::{MarketSnapshot, SnapshotStore};

    fn orchestrator() -> Arc<CycleOrchestrator> {
        let store = Arc::new(SnapshotStore::new(MarketSnapshot::default()));
        let ports = DataPorts {
            market: store.clone(),
            fundamentals: store.clone(),
            events: store,
            indicators: Arc::new(DefaultIndicatorEngine::default()),
        };
        let sinks = OutputSinks {
            signals: Arc::new(InMemorySignalSink::new()),
            notifications: Arc::new(LoggingNotificationSink::new()),
        };
        Arc::new(CycleOrchestrator::new(EngineConfig::default(), ports, sinks).unwrap())
    }

    #[tokio::test]
    async fn test_cycles_run_in_sequence() {
        let handle = CycleActor::new(orchestrator()).spawn();

        let (first, second) = tokio::join!(handle.run_cycle(), handle.run_cycle());
        let mut ids = vec![first.unwrap().cycle_id, second.unwrap().cycle_id];
        ids.sort();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_shutdown_closes_mailbox() {
        let handle = CycleActor::new(orchestrator()).spawn();
        handle.shutdown().await.unwrap();
        tokio::task::yield_now().await;

        let result = handle.run_cycle().await;
        assert!(matches!(result, Err(EngineError::ActorUnavailable(_))));
    }

    #[tokio::test]
    async fn test_cache_stats_reply() {
        let handle = CycleActor::new(orchestrator()).spawn();
        let stats = handle.cache_stats().await.unwrap();
        assert_eq!(stats.hits, 0);
    }
}
