pub mod utils;
pub mod stats;
pub mod models;
pub mod db;
pub mod pipeline;
pub mod api;
pub mod error;

use std::sync::Arc;
use std::time::Instant;

use pipeline::alert::{self, AlertSink};
use pipeline::cache::EmbeddingCache;
use pipeline::decision::DecisionEngine;
use pipeline::geofence::BoundaryStore;
use pipeline::inference::{Detector, Embedder, FramePipeline, PipelineConfig};
use pipeline::photos::PhotoStore;
use pipeline::recorder::EventRecorder;
use utils::config::Config;

pub struct AppState {
    pub started_at: Instant,
    pub config: Config,
    pub pool: db::DbPool,
    pub stats: Arc<stats::Stats>,
    pub cache: Arc<EmbeddingCache>,
    pub engine: Arc<DecisionEngine>,
    pub boundary: Arc<BoundaryStore>,
    pub frames: Arc<FramePipeline>,
    pub recorder: Arc<EventRecorder>,
}

impl AppState {
    /// Wire every service from config: loads the cache and boundary from the
    /// store and starts the alert workers. Must run inside a tokio runtime.
    pub async fn build(
        config: Config,
        pool: db::DbPool,
        detector: Arc<dyn Detector>,
        embedder: Arc<dyn Embedder>,
        sink: Arc<dyn AlertSink>,
    ) -> anyhow::Result<Arc<Self>> {
        let stats = Arc::new(stats::Stats::new());
        let cache = Arc::new(EmbeddingCache::new());
        let boundary = Arc::new(BoundaryStore::new());
        {
            let pool = pool.clone();
            let cache = cache.clone();
            let boundary = boundary.clone();
            tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
                let conn = pool.get()?;
                cache.load(&conn)?;
                boundary.load(&conn)?;
                Ok(())
            })
            .await??;
        }

        let alerts = alert::start_alert_workers(config.alert_workers, config.alert_queue, sink, stats.clone());
        let photos = Arc::new(PhotoStore::new(config.photo_dir())?);
        let recorder = Arc::new(EventRecorder::new(pool.clone(), photos, alerts));
        let frames = Arc::new(FramePipeline::new(
            detector,
            embedder,
            PipelineConfig {
                detector_cutoff: config.detector_cutoff,
                crop_size: config.crop_size,
                timeout: config.inference_timeout(),
                workers: config.inference_workers,
            },
        ));
        let engine = Arc::new(DecisionEngine::with_linear_scan(config.decision()));

        Ok(Arc::new(Self {
            started_at: Instant::now(),
            config,
            pool,
            stats,
            cache,
            engine,
            boundary,
            frames,
            recorder,
        }))
    }
}
