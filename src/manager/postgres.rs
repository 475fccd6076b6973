//! PostgreSQL implementation of `ApprovalStore`.
//!
//! Each request is one row: the routing and filter columns are materialized, and the
//! full typestate request is kept as JSONB in `body`. Writes are guarded by the
//! `version` column (`UPDATE ... WHERE id = $1 AND version = $n`), so two reviewers
//! racing on one request cannot both win.

use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::{Postgres, QueryBuilder};

use super::{ApprovalFilter, ApprovalStore};
use crate::approval::{
    AnyApprovalRequest, ApprovalRequest, ApprovalRequestId, ApprovalState, NotTreated,
};
use crate::error::{CountersignError, Result};

/// PostgreSQL implementation of the ApprovalStore trait.
///
/// # Example
/// ```ignore
/// use countersign::manager::postgres::PostgresApprovalStore;
/// use sqlx::PgPool;
///
/// let pool = PgPool::connect("postgresql://localhost/countersign").await?;
/// countersign::migrator().run(&pool).await?;
/// let store = Arc::new(PostgresApprovalStore::new(pool));
/// ```
pub struct PostgresApprovalStore {
    pool: PgPool,
}

impl PostgresApprovalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn decode(body: serde_json::Value) -> Result<AnyApprovalRequest> {
        serde_json::from_value(body).map_err(|e| {
            CountersignError::Other(anyhow!("Failed to decode stored approval request: {}", e))
        })
    }
}

#[async_trait]
impl ApprovalStore for PostgresApprovalStore {
    #[tracing::instrument(skip(self, request), fields(approval_id = %request.data.id))]
    async fn insert(&self, request: &ApprovalRequest<NotTreated>) -> Result<()> {
        let any = AnyApprovalRequest::from(request.clone());
        let body = serde_json::to_value(&any)?;

        sqlx::query(
            r#"
            INSERT INTO approval_requests (
                id, handler_type, request_type, maker_username, status, version, body, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(request.data.id.0)
        .bind(request.data.handler_type.as_str())
        .bind(&request.data.request_type)
        .bind(&request.data.maker.username)
        .bind(any.status().as_str())
        .bind(request.data.version)
        .bind(body)
        .bind(request.data.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                CountersignError::Validation(format!(
                    "approval request {} already exists",
                    request.data.id
                ))
            }
            other => other.into(),
        })?;

        Ok(())
    }

    #[tracing::instrument(skip(self, request), fields(approval_id = %request.data.id, version = request.data.version))]
    async fn persist<T: ApprovalState + Clone + 'static>(
        &self,
        request: &ApprovalRequest<T>,
    ) -> Result<()>
    where
        AnyApprovalRequest: From<ApprovalRequest<T>>,
    {
        let id = request.data.id;
        let expected = request.data.version - 1;
        let any = AnyApprovalRequest::from(request.clone());
        let body = serde_json::to_value(&any)?;

        let rows_affected = sqlx::query(
            r#"
            UPDATE approval_requests SET
                status = $2,
                version = $3,
                body = $4,
                updated_at = NOW()
            WHERE id = $1 AND version = $5
            "#,
        )
        .bind(id.0)
        .bind(any.status().as_str())
        .bind(request.data.version)
        .bind(body)
        .bind(expected)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            let stored_version: Option<i64> =
                sqlx::query_scalar("SELECT version FROM approval_requests WHERE id = $1")
                    .bind(id.0)
                    .fetch_optional(&self.pool)
                    .await?;

            return Err(match stored_version {
                Some(stored_version) => {
                    tracing::debug!(expected, stored_version, "Rejecting stale write");
                    CountersignError::VersionConflict { id, expected }
                }
                None => CountersignError::ApprovalRequestNotFound(id),
            });
        }

        Ok(())
    }

    async fn get(&self, id: ApprovalRequestId) -> Result<AnyApprovalRequest> {
        let body: Option<serde_json::Value> =
            sqlx::query_scalar("SELECT body FROM approval_requests WHERE id = $1")
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;

        match body {
            Some(body) => Self::decode(body),
            None => Err(CountersignError::ApprovalRequestNotFound(id)),
        }
    }

    async fn list(&self, filter: ApprovalFilter) -> Result<Vec<AnyApprovalRequest>> {
        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT body FROM approval_requests WHERE TRUE");

        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(handler_type) = &filter.handler_type {
            query
                .push(" AND handler_type = ")
                .push_bind(handler_type.as_str().to_string());
        }
        if let Some(maker) = &filter.maker {
            query.push(" AND maker_username = ").push_bind(maker.clone());
        }
        query.push(" ORDER BY created_at DESC");
        if let Some(limit) = filter.limit {
            query
                .push(" LIMIT ")
                .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let bodies: Vec<serde_json::Value> = query
            .build_query_scalar::<serde_json::Value>()
            .fetch_all(&self.pool)
            .await?;

        bodies.into_iter().map(Self::decode).collect()
    }
}
