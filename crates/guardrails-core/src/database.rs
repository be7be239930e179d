use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Advisory lock key taken during init-time DDL coordination (§5), decoded from the
/// hex pair spec.md names (`0x5A6F58584941_4752`).
const INIT_ADVISORY_LOCK_KEY: i64 = 0x5A6F_5858_4941_4752_u64 as i64;

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        Self::run_init(&pool).await?;

        Ok(Self { pool })
    }

    /// Takes the advisory lock on a dedicated connection, runs migrations, releases it.
    async fn run_init(pool: &PgPool) -> anyhow::Result<()> {
        let mut conn = pool.acquire().await?;
        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(INIT_ADVISORY_LOCK_KEY)
            .execute(&mut *conn)
            .await?;

        let result = sqlx::migrate!("../../migrations").run(pool).await;

        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(INIT_ADVISORY_LOCK_KEY)
            .execute(&mut *conn)
            .await?;

        result?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
