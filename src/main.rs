use std::net::SocketAddr;
use std::sync::Arc;

use hostelwatch_backend_sqlite::db;
use hostelwatch_backend_sqlite::pipeline::alert::{AlertSink, LogNotifier, PushoverNotifier};
use hostelwatch_backend_sqlite::pipeline::inference::HttpInference;
use hostelwatch_backend_sqlite::utils::config::Config;
use hostelwatch_backend_sqlite::utils::logging;
use hostelwatch_backend_sqlite::AppState;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cfg = Config::from_env();
    let db_path = cfg.db_path();
    if let Some(dir) = db_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::create_dir_all(cfg.photo_dir())?;
    let pool = db::create_pool(&db_path, cfg.db_pool_size)?;

    let Some(url) = cfg.inference_url.clone() else {
        anyhow::bail!("HOSTELWATCH_INFERENCE_URL must point at the detector/embedder service");
    };
    // Blocking reqwest clients must be built off the async workers
    let timeout = cfg.inference_timeout();
    let inference = Arc::new(tokio::task::spawn_blocking(move || HttpInference::new(&url, timeout)).await??);

    let sink: Arc<dyn AlertSink> = match (cfg.pushover_token.clone(), cfg.pushover_user.clone()) {
        (Some(token), Some(user)) => {
            Arc::new(tokio::task::spawn_blocking(move || PushoverNotifier::new(token, user, timeout)).await??)
        }
        _ => {
            warn!("no pushover credentials; alerts will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let port = cfg.port;
    let state = AppState::build(cfg, pool, inference.clone(), inference, sink).await?;
    info!(identities = state.cache.len(), boundary = state.boundary.get().is_some(), "state ready");

    let app = hostelwatch_backend_sqlite::api::routes::router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening" = %addr);
    axum::serve(listener, app).await?;
    Ok(())
}
