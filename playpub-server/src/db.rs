use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create builds table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS builds (
            id UUID PRIMARY KEY,
            status VARCHAR(20) NOT NULL,
            progress SMALLINT NOT NULL DEFAULT 0,
            error TEXT,
            output_ref TEXT,
            config JSONB NOT NULL,
            start_time TIMESTAMPTZ NOT NULL,
            started_at TIMESTAMPTZ,
            finished_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create build logs table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS build_logs (
            build_id UUID NOT NULL REFERENCES builds(id) ON DELETE CASCADE,
            seq INTEGER NOT NULL,
            timestamp TIMESTAMPTZ NOT NULL,
            message TEXT NOT NULL,
            PRIMARY KEY (build_id, seq)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_builds_start_time ON builds(start_time DESC)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_builds_status ON builds(status)")
        .execute(pool)
        .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
