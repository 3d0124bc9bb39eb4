//! PostgreSQL pool and migrations

use crate::config::DatabaseSettings;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

/// Open the pool described by the `database` settings section
pub async fn create_pool(settings: &DatabaseSettings) -> Result<PgPool, sqlx::Error> {
    info!(
        "Connecting to {} (pool {}..{})",
        mask_password(&settings.url),
        settings.min_connections,
        settings.max_connections
    );

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(Duration::from_millis(settings.connect_timeout_ms))
        .idle_timeout(Some(Duration::from_secs(settings.idle_timeout_secs)))
        .connect(&settings.url)
        .await?;

    info!("Database pool ready");
    Ok(pool)
}

/// Apply `migrations/` (voice_calls, voice_events)
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations applied");
    Ok(())
}

/// Replace the password in a connection URL for logging
pub fn mask_password(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) if parsed.password().is_some() => {
            if parsed.set_password(Some("****")).is_ok() {
                parsed.to_string()
            } else {
                "<unprintable database url>".to_string()
            }
        }
        Ok(parsed) => parsed.to_string(),
        Err(_) => "<invalid database url>".to_string(),
    }
}
