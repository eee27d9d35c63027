use async_trait::async_trait;
use guidely_core::repository::{AccountDirectory, RepoResult};
use guidely_core::AccountRole;
use sqlx::PgPool;

pub struct PgAccountDirectory {
    pool: PgPool,
}

impl PgAccountDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountDirectory for PgAccountDirectory {
    async fn role_of(&self, user_id: i64) -> RepoResult<Option<AccountRole>> {
        let role: Option<String> = sqlx::query_scalar("SELECT role FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(role.map(|r| r.parse::<AccountRole>()).transpose()?)
    }
}
