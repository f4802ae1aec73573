use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::pipeline::decision::DecisionConfig;

#[derive(Clone, Debug)]
pub struct Config {
    pub data: PathBuf,
    pub port: u16,
    pub match_threshold: f32,
    pub ambiguity_margin: f32,
    pub confidence_scale: f32,
    pub ambiguous_confidence_cap: f32,
    pub detector_cutoff: f32,
    pub crop_size: u32,
    pub inference_timeout_ms: u64,
    pub inference_workers: usize,
    pub inference_url: Option<String>,
    pub alert_workers: usize,
    pub alert_queue: usize,
    pub pushover_token: Option<String>,
    pub pushover_user: Option<String>,
    pub min_training_faces: usize,
    pub db_pool_size: u32,
}

impl Config {
    pub fn from_env() -> Self {
        let data = env::var("HOSTELWATCH_DATA").unwrap_or_else(|_| "/hostelwatch-data".to_string());
        let port = env::var("HOSTELWATCH_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(9171);
        let match_threshold = env::var("HOSTELWATCH_MATCH_THRESHOLD").ok().and_then(|v| v.parse().ok()).unwrap_or(0.9);
        let ambiguity_margin = env::var("HOSTELWATCH_AMBIGUITY_MARGIN").ok().and_then(|v| v.parse().ok()).unwrap_or(0.09);
        let confidence_scale = env::var("HOSTELWATCH_CONFIDENCE_SCALE").ok().and_then(|v| v.parse().ok()).unwrap_or(100.0);
        let ambiguous_confidence_cap = env::var("HOSTELWATCH_AMBIGUOUS_CONFIDENCE_CAP").ok().and_then(|v| v.parse().ok()).unwrap_or(50.0);
        let detector_cutoff = env::var("HOSTELWATCH_DETECTOR_CUTOFF").ok().and_then(|v| v.parse().ok()).unwrap_or(0.9);
        let crop_size = env::var("HOSTELWATCH_CROP_SIZE").ok().and_then(|v| v.parse().ok()).unwrap_or(160);
        let inference_timeout_ms = env::var("HOSTELWATCH_INFERENCE_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(10_000);
        let inference_workers = env::var("HOSTELWATCH_INFERENCE_WORKERS").ok().and_then(|v| v.parse().ok()).unwrap_or(4);
        let inference_url = env::var("HOSTELWATCH_INFERENCE_URL").ok().filter(|v| !v.is_empty());
        let alert_workers = env::var("HOSTELWATCH_ALERT_WORKERS").ok().and_then(|v| v.parse().ok()).unwrap_or(2);
        let alert_queue = env::var("HOSTELWATCH_ALERT_QUEUE").ok().and_then(|v| v.parse().ok()).unwrap_or(256);
        let pushover_token = env::var("HOSTELWATCH_PUSHOVER_TOKEN").ok().filter(|v| !v.is_empty());
        let pushover_user = env::var("HOSTELWATCH_PUSHOVER_USER").ok().filter(|v| !v.is_empty());
        let min_training_faces = env::var("HOSTELWATCH_MIN_TRAINING_FACES").ok().and_then(|v| v.parse().ok()).unwrap_or(15);
        let db_pool_size = env::var("HOSTELWATCH_DB_POOL_SIZE").ok().and_then(|v| v.parse().ok()).unwrap_or(8);
        Self {
            data: PathBuf::from(data),
            port,
            match_threshold,
            ambiguity_margin,
            confidence_scale,
            ambiguous_confidence_cap,
            detector_cutoff,
            crop_size,
            inference_timeout_ms,
            inference_workers: inference_workers.max(1),
            inference_url,
            alert_workers: alert_workers.max(1),
            alert_queue: alert_queue.max(1),
            pushover_token,
            pushover_user,
            min_training_faces,
            db_pool_size: db_pool_size.max(1),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data.join("db").join("hostelwatch.db")
    }

    pub fn photo_dir(&self) -> PathBuf {
        self.data.join("photos")
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }

    /// Decision parameters handed to the engine at construction.
    pub fn decision(&self) -> DecisionConfig {
        DecisionConfig {
            threshold: self.match_threshold,
            ambiguity_margin: self.ambiguity_margin,
            confidence_scale: self.confidence_scale,
            ambiguous_confidence_cap: self.ambiguous_confidence_cap,
        }
    }
}
