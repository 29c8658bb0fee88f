use sqlx::SqlitePool;

async fn is_applied(pool: &SqlitePool, name: &str) -> anyhow::Result<bool> {
    let applied: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?")
        .bind(name)
        .fetch_one(pool)
        .await?;
    Ok(applied)
}

async fn mark_applied(pool: &SqlitePool, name: &str) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO _migrations (name) VALUES (?)")
        .bind(name)
        .execute(pool)
        .await?;
    tracing::info!("Applied migration: {}", name);
    Ok(())
}

pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    // Enable WAL mode for better concurrent access
    sqlx::query("PRAGMA journal_mode=WAL").execute(pool).await?;
    sqlx::query("PRAGMA foreign_keys=ON").execute(pool).await?;

    // Create migrations tracking table
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .execute(pool)
    .await?;

    // 001: schema + programme catalogue seed
    if !is_applied(pool, "001_init").await? {
        let migration_sql = include_str!("../migrations/001_init.sql");
        for statement in migration_sql.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed).execute(pool).await?;
            }
        }
        mark_applied(pool, "001_init").await?;
    }

    // 002: query-path indexes
    if !is_applied(pool, "002_indexes").await? {
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_date ON sessions(date)")
            .execute(pool)
            .await
            .ok();
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sessions_programme_date ON sessions(programme_id, date)",
        )
        .execute(pool)
        .await
        .ok();
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_bookings_session ON bookings(session_id)")
            .execute(pool)
            .await
            .ok();
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_bookings_status ON bookings(status)")
            .execute(pool)
            .await
            .ok();
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_bookings_email ON bookings(parent_email)")
            .execute(pool)
            .await
            .ok();
        mark_applied(pool, "002_indexes").await?;
    }

    tracing::info!("Database migrations up to date");
    Ok(())
}
