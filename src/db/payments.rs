use super::PgStore;
use crate::domain::{NewPayment, Payment};
use crate::ports::{PaymentRepository, RepositoryError};
use async_trait::async_trait;

#[async_trait]
impl PaymentRepository for PgStore {
    async fn create_for_order(&self, payment: &NewPayment) -> Result<Payment, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (order_id, amount, currency, status, transaction_id)
            VALUES ($1, $2, $3, 'pending', $4)
            RETURNING *
            "#,
        )
        .bind(payment.order_id)
        .bind(&payment.amount)
        .bind(&payment.currency)
        .bind(payment.transaction_id)
        .fetch_one(&mut *tx)
        .await?;

        // created -> pending, or refresh the reference of an order that is
        // already waiting for a payment
        let moved = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'pending', payment_reference = $2, updated_at = NOW()
            WHERE id = $1 AND status IN ('created', 'pending')
            "#,
        )
        .bind(payment.order_id)
        .bind(row.id.to_string())
        .execute(&mut *tx)
        .await?;

        if moved.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(RepositoryError::Conflict(format!(
                "order {} is no longer payable",
                payment.order_id
            )));
        }

        tx.commit().await?;
        Ok(row)
    }

    async fn find(&self, payment_id: i64) -> Result<Option<Payment>, RepositoryError> {
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
            .bind(payment_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(payment)
    }

    async fn find_for_telegram_user(
        &self,
        payment_id: i64,
        telegram_id: i64,
    ) -> Result<Option<Payment>, RepositoryError> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            SELECT p.* FROM payments p
            JOIN orders o ON o.id = p.order_id
            JOIN users u ON u.id = o.user_id
            WHERE p.id = $1 AND u.telegram_id = $2
            "#,
        )
        .bind(payment_id)
        .bind(telegram_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(payment)
    }

    async fn complete_if_pending(
        &self,
        payment_id: i64,
        gateway_reference: Option<&str>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'completed',
                completed_at = NOW(),
                gateway_reference = COALESCE($2, gateway_reference)
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(payment_id)
        .bind(gateway_reference)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
