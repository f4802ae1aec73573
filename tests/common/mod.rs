#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use hostelwatch_backend_sqlite::db::{self, writer};
use hostelwatch_backend_sqlite::models::event::{BoundingBox, Detection};
use hostelwatch_backend_sqlite::models::identity::Role;
use hostelwatch_backend_sqlite::pipeline::alert::{Alert, AlertSink};
use hostelwatch_backend_sqlite::pipeline::inference::{Detector, Embedder};
use hostelwatch_backend_sqlite::utils::config::Config;
use hostelwatch_backend_sqlite::{api, AppState};
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use parking_lot::Mutex;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde_json::Value;
use tempfile::TempDir;

pub const DIM: usize = 8;
pub const FRAME_SIZE: u32 = 128;
const BACKGROUND: [u8; 3] = [40, 40, 40];

/// A face the fake detector reports. The frame paints its box in `color`
/// and the fake embedder maps that color back to `embedding`.
#[derive(Debug, Clone)]
pub struct FakeFace {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub color: [u8; 3],
    pub embedding: Vec<f32>,
}

/// 32x32 face at (x, y) with a detector confidence well above the cutoff.
pub fn face_at(x: f32, y: f32, color: [u8; 3], embedding: Vec<f32>) -> FakeFace {
    FakeFace { bbox: BoundingBox { x, y, width: 32.0, height: 32.0 }, confidence: 0.99, color, embedding }
}

/// Standard basis vector.
pub fn axis(i: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[i] = 1.0;
    v
}

/// Unit vector at Euclidean distance `distance` from `axis(from)`, tilted toward `axis(toward)`.
pub fn at_distance(from: usize, toward: usize, distance: f64) -> Vec<f32> {
    let theta = 2.0 * (distance / 2.0).asin();
    let mut v = vec![0.0; DIM];
    v[from] = theta.cos() as f32;
    v[toward] = theta.sin() as f32;
    v
}

/// Detector and embedder stand-in driven by the faces it was given.
pub struct FakeInference {
    faces: Mutex<Vec<FakeFace>>,
    delay: Mutex<Duration>,
    failing: Mutex<bool>,
}

impl FakeInference {
    pub fn new(faces: Vec<FakeFace>) -> Self {
        Self { faces: Mutex::new(faces), delay: Mutex::new(Duration::ZERO), failing: Mutex::new(false) }
    }

    pub fn set_faces(&self, faces: Vec<FakeFace>) {
        *self.faces.lock() = faces;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// Make the detector fail with a message that must never reach clients.
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }
}

impl Detector for FakeInference {
    fn detect(&self, _image: &DynamicImage) -> anyhow::Result<Vec<Detection>> {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if *self.failing.lock() {
            anyhow::bail!("detector crashed loading /opt/secret/model.onnx");
        }
        Ok(self.faces.lock().iter().map(|f| Detection { bbox: f.bbox, confidence: f.confidence }).collect())
    }
}

impl Embedder for FakeInference {
    fn embed(&self, crops: &[DynamicImage]) -> anyhow::Result<Vec<Vec<f32>>> {
        let faces = self.faces.lock();
        crops
            .iter()
            .map(|crop| {
                let rgb = crop.to_rgb8();
                let px = rgb.get_pixel(rgb.width() / 2, rgb.height() / 2).0;
                faces
                    .iter()
                    .min_by_key(|f| color_distance(f.color, px))
                    .map(|f| f.embedding.clone())
                    .ok_or_else(|| anyhow::anyhow!("no face painted in {:?}", px))
            })
            .collect()
    }
}

fn color_distance(a: [u8; 3], b: [u8; 3]) -> u32 {
    a.iter().zip(b.iter()).map(|(x, y)| (*x as i32 - *y as i32).unsigned_abs()).sum()
}

/// PNG frame with every face box filled in its color.
pub fn render_frame(faces: &[FakeFace]) -> Vec<u8> {
    let mut img = RgbImage::from_pixel(FRAME_SIZE, FRAME_SIZE, Rgb(BACKGROUND));
    for f in faces {
        let x0 = f.bbox.x.max(0.0) as u32;
        let y0 = f.bbox.y.max(0.0) as u32;
        let x1 = ((f.bbox.x + f.bbox.width) as u32).min(FRAME_SIZE);
        let y1 = ((f.bbox.y + f.bbox.height) as u32).min(FRAME_SIZE);
        for y in y0..y1 {
            for x in x0..x1 {
                img.put_pixel(x, y, Rgb(f.color));
            }
        }
    }
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img).write_to(&mut out, ImageOutputFormat::Png).unwrap();
    out.into_inner()
}

/// Alert sink that keeps every message it is handed.
#[derive(Default)]
pub struct RecordingSink {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<String> {
        self.alerts.lock().iter().map(|a| a.message.clone()).collect()
    }

    pub fn with_photo(&self) -> usize {
        self.alerts.lock().iter().filter(|a| a.photo.is_some()).count()
    }
}

impl AlertSink for RecordingSink {
    fn notify(&self, alert: &Alert) -> anyhow::Result<()> {
        self.alerts.lock().push(alert.clone());
        Ok(())
    }
}

pub fn test_config(tmp: &TempDir) -> Config {
    Config {
        data: tmp.path().to_path_buf(),
        port: 0,
        match_threshold: 0.9,
        ambiguity_margin: 0.09,
        confidence_scale: 100.0,
        ambiguous_confidence_cap: 50.0,
        detector_cutoff: 0.9,
        crop_size: 16,
        inference_timeout_ms: 2_000,
        inference_workers: 4,
        inference_url: None,
        alert_workers: 1,
        alert_queue: 64,
        pushover_token: None,
        pushover_user: None,
        min_training_faces: 3,
        db_pool_size: 4,
    }
}

/// An enrolled identity to seed before the server starts. An empty
/// `embedding` enrolls the user without a trained vector.
pub struct Seed {
    pub user_id: &'static str,
    pub role: Role,
    pub embedding: Vec<f32>,
}

pub fn seed(user_id: &'static str, role: Role, embedding: Vec<f32>) -> Seed {
    Seed { user_id, role, embedding }
}

/// Running server on an ephemeral port, with handles on its collaborators.
pub struct TestApp {
    pub tmp: TempDir,
    pub state: Arc<AppState>,
    pub fake: Arc<FakeInference>,
    pub sink: Arc<RecordingSink>,
    pub base: String,
    pub client: reqwest::Client,
}

pub async fn spawn_app(seeds: Vec<Seed>, faces: Vec<FakeFace>) -> TestApp {
    spawn_app_with(seeds, faces, |_| {}).await
}

pub async fn spawn_app_with(seeds: Vec<Seed>, faces: Vec<FakeFace>, tweak: impl FnOnce(&mut Config)) -> TestApp {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(&tmp);
    tweak(&mut config);
    std::fs::create_dir_all(config.db_path().parent().unwrap()).unwrap();
    let pool = db::create_pool(config.db_path(), config.db_pool_size).unwrap();
    {
        let conn = pool.get().unwrap();
        for s in &seeds {
            writer::upsert_user(&conn, s.user_id, s.role, &format!("Resident {}", s.user_id)).unwrap();
            if !s.embedding.is_empty() {
                writer::replace_embedding(&conn, s.user_id, &s.embedding).unwrap();
            }
        }
    }

    let fake = Arc::new(FakeInference::new(faces));
    let sink = Arc::new(RecordingSink::default());
    let state = AppState::build(config, pool, fake.clone(), fake.clone(), sink.clone()).await.unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = api::routes::router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp { tmp, state, fake, sink, base: format!("http://{}", addr), client: reqwest::Client::new() }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub async fn get_json(&self, path: &str) -> (StatusCode, Value) {
        let resp = self.client.get(self.url(path)).send().await.unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }

    pub async fn post_json(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let resp = self.client.post(self.url(path)).json(&body).send().await.unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }

    /// Multipart POST with one `image` part per upload.
    pub async fn post_images(&self, path: &str, images: Vec<Vec<u8>>) -> (StatusCode, Value) {
        let mut form = Form::new();
        for (i, bytes) in images.into_iter().enumerate() {
            let part = Part::bytes(bytes).file_name(format!("frame{}.png", i)).mime_str("image/png").unwrap();
            form = form.part("image", part);
        }
        let resp = self.client.post(self.url(path)).multipart(form).send().await.unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }

    /// Upload the frame the fake detector currently describes.
    pub async fn post_frame(&self, path: &str, faces: &[FakeFace]) -> (StatusCode, Value) {
        self.post_images(path, vec![render_frame(faces)]).await
    }

    pub fn count(&self, sql: &str) -> i64 {
        let conn = self.state.pool.get().unwrap();
        conn.query_row(sql, [], |r| r.get(0)).unwrap()
    }

    pub fn photo_files(&self, prefix: &str) -> Vec<String> {
        std::fs::read_dir(self.state.config.photo_dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|n| n.starts_with(prefix))
            .collect()
    }

    /// Poll until the sink holds at least `n` alerts or the deadline passes.
    pub async fn wait_for_alerts(&self, n: usize) -> Vec<String> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let messages = self.sink.messages();
            if messages.len() >= n || tokio::time::Instant::now() >= deadline {
                return messages;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}
