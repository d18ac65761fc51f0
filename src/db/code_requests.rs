use super::{interval_secs, PgStore};
use crate::domain::CodeRequest;
use crate::ports::{CodeRequestRepository, RepositoryError};
use async_trait::async_trait;
use sqlx::types::Json;
use std::time::Duration;

#[async_trait]
impl CodeRequestRepository for PgStore {
    async fn find(&self, id: i64) -> Result<Option<CodeRequest>, RepositoryError> {
        let request = sqlx::query_as::<_, CodeRequest>("SELECT * FROM code_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(request)
    }

    async fn list_for_telegram_id(
        &self,
        telegram_id: i64,
        limit: i64,
    ) -> Result<Vec<CodeRequest>, RepositoryError> {
        let requests = sqlx::query_as::<_, CodeRequest>(
            "SELECT * FROM code_requests WHERE telegram_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2",
        )
        .bind(telegram_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(requests)
    }

    async fn mark_completed(
        &self,
        id: i64,
        codes: &[String],
        artifact_path: Option<&str>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE code_requests
            SET status = 'completed', codes = $2, artifact_path = $3, last_error = NULL, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(Json(codes))
        .bind(artifact_path)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: i64,
        error: &str,
        partial_codes: &[String],
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE code_requests
            SET status = 'failed', codes = $3, last_error = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(Json(partial_codes))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reschedule(
        &self,
        id: i64,
        error: &str,
        retry_in: Duration,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE code_requests
            SET last_error = $2, next_attempt_at = NOW() + make_interval(secs => $3), updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(interval_secs(retry_in))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn claim_due(
        &self,
        limit: i64,
        lease: Duration,
    ) -> Result<Vec<CodeRequest>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query_as::<_, CodeRequest>(
            r#"
            WITH due AS (
                SELECT id FROM code_requests
                WHERE status = 'pending' AND next_attempt_at <= NOW()
                ORDER BY next_attempt_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE code_requests c
            SET attempts = c.attempts + 1,
                next_attempt_at = NOW() + make_interval(secs => $2),
                updated_at = NOW()
            FROM due
            WHERE c.id = due.id
            RETURNING c.*
            "#,
        )
        .bind(limit)
        .bind(interval_secs(lease))
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(claimed)
    }
}
