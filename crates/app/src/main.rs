use std::{net::SocketAddr, sync::Arc, time::Duration};

use migration::{Migrator, MigratorTrait};
use settings::Database;

mod settings;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let settings = settings::Settings::new()?;
    let mut tasks = tokio::task::JoinSet::new();

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "ledger={level},server={level},engine={level},migration={level}",
            level = settings.app.level
        ))
        .init();

    let Some(server) = settings.server else {
        tracing::warn!("no [server] settings found, nothing to run");
        return Ok(());
    };
    tracing::info!("Found server settings...");

    let db = parse_database(&server.database).await?;
    let mut builder = engine::Engine::builder().database(db.clone());
    if let Some(secs) = settings.engine.cache_ttl_secs {
        builder = builder.cache_ttl(Duration::from_secs(secs));
    }
    if let Some(ms) = settings.engine.lock_timeout_ms {
        builder = builder.lock_timeout(Duration::from_millis(ms));
    }
    let engine = Arc::new(builder.build().await?);

    let bind = server.bind.unwrap_or_else(|| "127.0.0.1".to_string());
    let addr: SocketAddr = format!("{}:{}", bind, server.port).parse()?;
    let server_engine = Arc::clone(&engine);
    tasks.spawn(async move {
        server::run(server_engine, db, addr).await;
    });

    let interval = settings.jobs.auto_debit_interval_secs;
    if interval > 0 {
        tasks.spawn(auto_debit_job(engine, Duration::from_secs(interval)));
    } else {
        tracing::info!("auto-debit job disabled");
    }

    while tasks.join_next().await.is_some() {
        tasks.shutdown().await;
    }

    Ok(())
}

/// Settles due auto-debit rows of every user, once per `period`.
async fn auto_debit_job(engine: Arc<engine::Engine>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        match engine.run_auto_debit_sweep().await {
            Ok(0) => tracing::debug!("auto-debit sweep: nothing due"),
            Ok(settled) => tracing::info!(settled, "auto-debit sweep completed"),
            Err(err) => tracing::error!("auto-debit sweep failed: {err}"),
        }
    }
}

async fn parse_database(config: &Database) -> Result<sea_orm::DatabaseConnection, BoxError> {
    let url = match config {
        Database::Memory => String::from("sqlite::memory:"),
        Database::Sqlite(path) => format!("sqlite:{}?mode=rwc", path),
    };

    let database = sea_orm::Database::connect(url).await?;
    Migrator::up(&database, None).await?;
    Ok(database)
}
