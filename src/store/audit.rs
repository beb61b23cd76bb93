//! C7 AuditLog: an append-only table, separate from `sessions`, so a banned
//! participant or a moderation report survives even after the session that
//! produced it is cleaned up.

use crate::store::AuditLog;
use async_trait::async_trait;
use sqlx::{Any, Pool};

#[derive(Clone, Debug)]
pub struct SqlAuditLog(Pool<Any>);

impl SqlAuditLog {
    pub fn new(pool: Pool<Any>) -> Self {
        Self(pool)
    }
}

#[async_trait]
impl AuditLog for SqlAuditLog {
    async fn record(&self, session_id: &str, event: &str, detail: serde_json::Value) -> eyre::Result<()> {
        sqlx::query("INSERT INTO audit_log (session_id, event, detail, recorded_at_millis) VALUES (?1, ?2, ?3, ?4)")
            .bind(session_id)
            .bind(event)
            .bind(detail.to_string())
            .bind(chrono::Utc::now().timestamp_millis())
            .execute(&self.0)
            .await?;
        tracing::info!(session_id, event, "audit event recorded");
        Ok(())
    }
}

/// A no-op log for tests and for deployments that don't need audit
/// persistence; still emits a `tracing` event so operators see the event
/// stream in logs even without the database table.
pub struct TracingOnlyAuditLog;

#[async_trait]
impl AuditLog for TracingOnlyAuditLog {
    async fn record(&self, session_id: &str, event: &str, detail: serde_json::Value) -> eyre::Result<()> {
        tracing::info!(session_id, event, %detail, "audit event (not persisted)");
        Ok(())
    }
}
