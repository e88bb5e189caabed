use postgresql_embedded::PostgreSQL;
use tracing::info;

use super::SHARED_RUNTIME;
use crate::pool::{ConnectionPool, PhysicalConnection};
use crate::postgres::PgPool;

/// Represents a running embedded `PostgreSQL` instance.
pub struct EmbeddedPostgres {
    pub postgresql: PostgreSQL,
    pub port: u16,
    pub database_url: String,
    /// Working configuration with the embedded server's host, port and credentials
    pub config: deadpool_postgres::Config,
}

/// Set up an embedded `PostgreSQL` instance and create `cfg.dbname` in it.
///
/// Blocks on a shared runtime, so call it from synchronous test code.
///
/// # Errors
/// Returns an error if `cfg.dbname` is missing, if the embedded server cannot
/// be set up or started, or if the post-start connectivity check fails.
pub fn setup_postgres_embedded(
    cfg: &deadpool_postgres::Config,
) -> Result<EmbeddedPostgres, Box<dyn std::error::Error>> {
    let db_name = cfg.dbname.clone().ok_or("dbname is required")?;

    SHARED_RUNTIME.block_on(async {
        let mut postgresql = PostgreSQL::default();

        // Setup PostgreSQL binaries (bundled, so no download conflicts)
        postgresql.setup().await?;
        postgresql.start().await?;

        let settings = postgresql.settings();
        let port = settings.port;
        let host = settings.host.clone();
        let user = settings.username.clone();
        let password = settings.password.clone();

        postgresql.create_database(&db_name).await?;

        let database_url = format!("postgres://{user}:{password}@{host}:{port}/{db_name}");
        info!(port, "embedded postgres started");

        let mut final_cfg = cfg.clone();
        final_cfg.port = Some(port);
        final_cfg.host = Some(host);
        final_cfg.user = Some(user);
        final_cfg.password = Some(password);

        // Quick connection test
        let pool = PgPool::new(final_cfg.clone())?;
        let mut conn = pool.checkout().await?;
        conn.batch_execute("SELECT 1").await?;
        conn.release();
        pool.drain();

        Ok(EmbeddedPostgres {
            postgresql,
            port,
            database_url,
            config: final_cfg,
        })
    })
}

/// Stop a previously started embedded `PostgreSQL` instance.
pub fn stop_postgres_embedded(postgres: EmbeddedPostgres) {
    let EmbeddedPostgres { postgresql, .. } = postgres;
    SHARED_RUNTIME.block_on(async move {
        let _ = postgresql.stop().await;
    });
}
