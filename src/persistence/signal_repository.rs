use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::application::orchestrator::CycleReport;
use crate::domain::entities::CompositeSignal;
use crate::domain::errors::ProviderError;
use crate::domain::repositories::SignalSink;
use crate::persistence::{run_migrations, DatabaseError};

/// Stores admitted composites and cycle summaries in SQLite
pub struct SqliteSignalRepository {
    pool: SqlitePool,
}

impl SqliteSignalRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SqliteSignalRepository { pool }
    }

    /// Create the tables on a pool that did not come from `init_database`
    pub async fn init(&self) -> Result<(), DatabaseError> {
        run_migrations(&self.pool).await
    }

    /// Most recently generated composites first
    pub async fn get_recent(&self, limit: i64) -> Result<Vec<CompositeSignal>, ProviderError> {
        let rows = sqlx::query(
            r#"
            SELECT payload FROM composite_signals
            ORDER BY generated_at DESC, entity ASC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let payload = row.get::<String, _>("payload");
                serde_json::from_str(&payload).map_err(ProviderError::from)
            })
            .collect()
    }

    pub async fn get_by_entity(
        &self,
        entity: &str,
        limit: i64,
    ) -> Result<Vec<CompositeSignal>, ProviderError> {
        let rows = sqlx::query(
            r#"
            SELECT payload FROM composite_signals
            WHERE entity = ?
            ORDER BY generated_at DESC
            LIMIT ?
            "#,
        )
        .bind(entity)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let payload = row.get::<String, _>("payload");
                serde_json::from_str(&payload).map_err(ProviderError::from)
            })
            .collect()
    }

    pub async fn count(&self) -> Result<i64, ProviderError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM composite_signals")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn save_cycle_report(&self, report: &CycleReport) -> Result<i64, ProviderError> {
        let summary = serde_json::to_string(&report.summary)?;
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO cycle_reports (started_at, finished_at, timed_out, summary)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(report.started_at)
        .bind(report.finished_at)
        .bind(report.timed_out)
        .bind(summary)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Drop composites generated before `cutoff`
    pub async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, ProviderError> {
        let result = sqlx::query("DELETE FROM composite_signals WHERE generated_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SignalSink for SqliteSignalRepository {
    async fn store(&self, signal: &CompositeSignal) -> Result<bool, ProviderError> {
        let payload = serde_json::to_string(signal)?;
        let result = sqlx::query(
            r#"
            INSERT INTO composite_signals
            (entity, action, confidence, urgency, risk_level, payload, generated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(entity, generated_at) DO UPDATE SET
                action = excluded.action,
                confidence = excluded.confidence,
                urgency = excluded.urgency,
                risk_level = excluded.risk_level,
                payload = excluded.payload
            "#,
        )
        .bind(&signal.entity)
        .bind(signal.action.as_str())
        .bind(signal.confidence.value())
        .bind(format!("{:?}", signal.urgency))
        .bind(format!("{:?}", signal.risk_level))
        .bind(payload)
        .bind(signal.generated_at)
        .execute(&self.pool)
        .await?;

        debug!(entity = %signal.entity, rows = result.rows_affected(), "Composite persisted");
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{RiskLevel, SignalAction, SignalSource, TimeHorizon, Urgency};
    use crate::domain::value_objects::{Confidence, Price};
    use crate::persistence::init_database;
    use chrono::{Duration, TimeZone};
    use std::collections::BTreeSet;

    fn composite(entity: &str, confidence: f64, generated_at: DateTime<Utc>) -> CompositeSignal {
        CompositeSignal {
            entity: entity.to_string(),
            action: SignalAction::Buy,
            confidence: Confidence::new(confidence).unwrap(),
            contributing_sources: BTreeSet::from([SignalSource::Fundamental, SignalSource::Event]),
            reason: "Composite signal (2 factors): a; b".to_string(),
            reasons: vec!["a".to_string(), "b".to_string()],
            risk_level: RiskLevel::Low,
            position_size_pct: 4.0,
            reference_price: Some(Price::new(100.0).unwrap()),
            stop_loss: Some(Price::new(97.0).unwrap()),
            target_price: Some(Price::new(106.0).unwrap()),
            urgency: Urgency::High,
            time_horizon: TimeHorizon::MediumTerm,
            buy_score: confidence,
            sell_score: 0.0,
            component_count: 2,
            event_corroboration: 1,
            generated_at,
        }
    }

    async fn repository() -> SqliteSignalRepository {
        SqliteSignalRepository::new(init_database("sqlite::memory:").await.unwrap())
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_init_on_plain_pool() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let repo = SqliteSignalRepository::new(pool);
        repo.init().await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_store_and_read_back() {
        let repo = repository().await;
        let signal = composite("TCS", 0.8, at(10));

        assert!(repo.store(&signal).await.unwrap());
        let recent = repo.get_recent(10).await.unwrap();
        assert_eq!(recent, vec![signal]);
    }

    #[tokio::test]
    async fn test_same_window_replaces_row() {
        let repo = repository().await;
        repo.store(&composite("TCS", 0.7, at(10))).await.unwrap();
        repo.store(&composite("TCS", 0.9, at(10))).await.unwrap();

        assert_eq!(repo.count().await.unwrap(), 1);
        let stored = repo.get_by_entity("TCS", 5).await.unwrap();
        assert_eq!(stored[0].confidence.value(), 0.9);
    }

    #[tokio::test]
    async fn test_recent_ordering_and_retention() {
        let repo = repository().await;
        repo.store(&composite("A", 0.7, at(8))).await.unwrap();
        repo.store(&composite("B", 0.7, at(12))).await.unwrap();
        repo.store(&composite("C", 0.7, at(10))).await.unwrap();

        let entities: Vec<String> = repo
            .get_recent(2)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.entity)
            .collect();
        assert_eq!(entities, vec!["B".to_string(), "C".to_string()]);

        let removed = repo.delete_older_than(at(12) - Duration::minutes(30)).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(repo.count().await.unwrap(), 1);
    }
}
