use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, info};

use snipshare::session::MemorySessionStore;
use snipshare::static_files::StaticFiles;
use snipshare::store::{self, Argon2Hasher, SystemClock};
use snipshare::{App, Config, Server};

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env().context("reading configuration")?;

    let pool = store::connect(&config.database_url, config.db_max_connections)
        .await
        .with_context(|| format!("connecting to {}", config.database_url))?;
    store::migrate(&pool).await.context("applying migrations")?;

    let sessions = Arc::new(MemorySessionStore::new());
    spawn_session_purge(Arc::clone(&sessions));

    let app = App::new(
        pool,
        Arc::new(SystemClock),
        Arc::new(Argon2Hasher::default()),
        sessions,
        config.session.clone(),
        StaticFiles::new(&config.static_dir),
    );

    info!(static_dir = %config.static_dir.display(), "starting");
    Server::bind(config.addr).serve(app.routes()).await?;
    Ok(())
}

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "snipshare=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

fn spawn_session_purge(sessions: Arc<MemorySessionStore>) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            tick.tick().await;
            let purged = sessions.purge_expired().await;
            if purged > 0 {
                debug!(purged, "expired sessions removed");
            }
        }
    });
}
