use super::{interval_secs, PgStore};
use crate::domain::{CodeRequest, NewCodeRequest, Order, OrderDraft, OrderItem};
use crate::ports::{CreatedOrder, OrderRepository, RepositoryError};
use async_trait::async_trait;
use sqlx::types::Json;
use std::time::Duration;

#[async_trait]
impl OrderRepository for PgStore {
    async fn create_with_code_request(
        &self,
        draft: &OrderDraft,
        request: &NewCodeRequest,
        first_retry_in: Duration,
    ) -> Result<CreatedOrder, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let order = sqlx::query_as::<_, Order>(
            "INSERT INTO orders (user_id, total_amount, status) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(draft.user_id)
        .bind(&draft.total_amount)
        .bind(draft.status())
        .fetch_one(&mut *tx)
        .await?;

        let mut items = Vec::with_capacity(draft.items.len());
        for item in &draft.items {
            let row = sqlx::query_as::<_, OrderItem>(
                "INSERT INTO order_items (order_id, gtin, quantity, unit_price) VALUES ($1, $2, $3, $4) RETURNING *",
            )
            .bind(order.id)
            .bind(item.gtin.as_str())
            .bind(item.quantity)
            .bind(&item.unit_price)
            .fetch_one(&mut *tx)
            .await?;
            items.push(row);
        }

        // The request is written with its first attempt already counted; the
        // caller makes that attempt right after commit and the retry job only
        // sees it once the lease runs out.
        let code_request = sqlx::query_as::<_, CodeRequest>(
            r#"
            INSERT INTO code_requests
                (order_id, user_id, telegram_id, inn, request_data, status, attempts, next_attempt_at)
            VALUES ($1, $2, $3, $4, $5, 'pending', 1, NOW() + make_interval(secs => $6))
            RETURNING *
            "#,
        )
        .bind(order.id)
        .bind(draft.user_id)
        .bind(request.telegram_id)
        .bind(&request.payload.inn)
        .bind(Json(&request.payload))
        .bind(interval_secs(first_retry_in))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            order_id = order.id,
            items = items.len(),
            total = %order.total_amount,
            "Order persisted"
        );

        Ok(CreatedOrder {
            order,
            items,
            code_request,
        })
    }

    async fn find(&self, order_id: i64) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(order)
    }
}
