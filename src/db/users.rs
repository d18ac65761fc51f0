use super::PgStore;
use crate::domain::{Registration, User};
use crate::ports::{RepositoryError, UpsertedUser, UserRepository};
use async_trait::async_trait;

#[derive(sqlx::FromRow)]
struct UpsertRow {
    #[sqlx(flatten)]
    user: User,
    inserted: bool,
}

#[async_trait]
impl UserRepository for PgStore {
    async fn upsert(
        &self,
        registration: &Registration,
        api_key: &str,
    ) -> Result<UpsertedUser, RepositoryError> {
        // xmax is 0 only for a row this statement inserted
        let row = sqlx::query_as::<_, UpsertRow>(
            r#"
            INSERT INTO users (telegram_id, inn, email, first_name, last_name, middle_name, username, api_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (telegram_id) DO UPDATE SET
                inn = EXCLUDED.inn,
                email = EXCLUDED.email,
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                middle_name = EXCLUDED.middle_name,
                username = EXCLUDED.username,
                api_key = EXCLUDED.api_key,
                last_active = NOW()
            RETURNING *, (xmax = 0) AS inserted
            "#,
        )
        .bind(registration.telegram_id)
        .bind(&registration.inn)
        .bind(&registration.email)
        .bind(&registration.first_name)
        .bind(&registration.last_name)
        .bind(&registration.middle_name)
        .bind(&registration.username)
        .bind(api_key)
        .fetch_one(&self.pool)
        .await?;

        Ok(UpsertedUser {
            user: row.user,
            created: row.inserted,
        })
    }

    async fn find_by_telegram_id(&self, telegram_id: i64) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE telegram_id = $1")
            .bind(telegram_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_api_key(&self, api_key: &str) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE api_key = $1")
            .bind(api_key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn touch(&self, user_id: i64) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE users SET last_active = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
