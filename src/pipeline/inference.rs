use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use bytes::Bytes;
use image::imageops::FilterType;
use image::DynamicImage;
use serde::Deserialize;
use tokio::sync::Semaphore;

use crate::error::{ProcessError, RecognitionFailure};
use crate::models::event::{BoundingBox, Detection};
use crate::pipeline::cache::normalize;
use crate::pipeline::photos::encode_jpeg;

/// Face detector collaborator. Blocking; always called from the blocking pool.
pub trait Detector: Send + Sync {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<Detection>>;
}

/// Embedding network collaborator. Returns one raw vector per crop, in order.
pub trait Embedder: Send + Sync {
    fn embed(&self, crops: &[DynamicImage]) -> Result<Vec<Vec<f32>>>;
}

#[derive(Deserialize)]
struct WireDetection {
    #[serde(rename = "box")]
    bbox: [f32; 4],
    confidence: f32,
}

#[derive(Deserialize)]
struct WireEmbeddings {
    embeddings: Vec<Vec<f32>>,
}

/// Detector and embedder served by an inference sidecar over HTTP.
pub struct HttpInference {
    client: reqwest::blocking::Client,
    base: String,
}

impl HttpInference {
    /// Build on a blocking-capable thread; the blocking client owns its own runtime.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base: base_url.trim_end_matches('/').to_string() })
    }

    fn jpeg_part(img: &DynamicImage, name: &str) -> Result<reqwest::blocking::multipart::Part> {
        Ok(reqwest::blocking::multipart::Part::bytes(encode_jpeg(img)?)
            .file_name(name.to_string())
            .mime_str("image/jpeg")?)
    }
}

impl Detector for HttpInference {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<Detection>> {
        let form = reqwest::blocking::multipart::Form::new().part("image", Self::jpeg_part(image, "frame.jpg")?);
        let resp = self
            .client
            .post(format!("{}/detect", self.base))
            .multipart(form)
            .send()
            .context("detector request")?
            .error_for_status()?;
        let wire: Vec<WireDetection> = resp.json().context("detector response")?;
        Ok(wire
            .into_iter()
            .map(|w| Detection {
                bbox: BoundingBox { x: w.bbox[0], y: w.bbox[1], width: w.bbox[2], height: w.bbox[3] },
                confidence: w.confidence,
            })
            .collect())
    }
}

impl Embedder for HttpInference {
    fn embed(&self, crops: &[DynamicImage]) -> Result<Vec<Vec<f32>>> {
        let mut form = reqwest::blocking::multipart::Form::new();
        for (i, crop) in crops.iter().enumerate() {
            form = form.part("crop", Self::jpeg_part(crop, &format!("crop{}.jpg", i + 1))?);
        }
        let resp = self
            .client
            .post(format!("{}/embed", self.base))
            .multipart(form)
            .send()
            .context("embedder request")?
            .error_for_status()?;
        let wire: WireEmbeddings = resp.json().context("embedder response")?;
        Ok(wire.embeddings)
    }
}

/// A qualifying face, embedded and ready for matching.
#[derive(Debug, Clone)]
pub struct AnalyzedFace {
    /// 1-based position in the detector output.
    pub face: usize,
    pub bbox: BoundingBox,
    /// Unresized crop, kept for the event photo.
    pub crop: DynamicImage,
    /// Unit-length embedding.
    pub embedding: Vec<f32>,
}

#[derive(Debug, Default)]
pub struct AnalyzedFrame {
    pub faces: Vec<AnalyzedFace>,
    /// Faces under the detector cutoff, by 1-based index.
    pub skipped: Vec<usize>,
    /// Qualifying faces the caller's filter rejected.
    pub excluded: Vec<usize>,
    pub detected: usize,
    /// Seconds from detection start to embeddings returned.
    pub detection_latency: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub detector_cutoff: f32,
    pub crop_size: u32,
    pub timeout: Duration,
    pub workers: usize,
}

/// Decode, detect, crop and embed one upload.
///
/// Every collaborator call runs on the blocking pool, holds one permit of a
/// shared semaphore and is abandoned after `timeout`.
pub struct FramePipeline {
    detector: Arc<dyn Detector>,
    embedder: Arc<dyn Embedder>,
    permits: Arc<Semaphore>,
    config: PipelineConfig,
}

/// NaN confidences never pass.
fn passes_cutoff(confidence: f32, cutoff: f32) -> bool {
    confidence >= cutoff
}

fn crop_face(image: &DynamicImage, bbox: &BoundingBox) -> Option<DynamicImage> {
    let (iw, ih) = (image.width() as i64, image.height() as i64);
    let x0 = (bbox.x.floor() as i64).clamp(0, iw);
    let y0 = (bbox.y.floor() as i64).clamp(0, ih);
    let x1 = ((bbox.x + bbox.width).ceil() as i64).clamp(0, iw);
    let y1 = ((bbox.y + bbox.height).ceil() as i64).clamp(0, ih);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(image.crop_imm(x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32))
}

impl FramePipeline {
    pub fn new(detector: Arc<dyn Detector>, embedder: Arc<dyn Embedder>, config: PipelineConfig) -> Self {
        Self { detector, embedder, permits: Arc::new(Semaphore::new(config.workers.max(1))), config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run `f` on the blocking pool under a permit and the inference deadline.
    async fn run_blocking<T, F>(&self, f: F) -> Result<T, ProcessError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let permits = self.permits.clone();
        // The deadline covers the wait for a permit as well as the call itself.
        let bounded = tokio::time::timeout(self.config.timeout, async move {
            let permit = permits.acquire_owned().await.map_err(ProcessError::internal)?;
            let joined = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                f()
            })
            .await?;
            Ok::<_, ProcessError>(joined)
        });
        match bounded.await {
            Err(_) => Err(RecognitionFailure::Timeout.into()),
            Ok(joined) => joined?.map_err(|e| RecognitionFailure::Inference(e).into()),
        }
    }

    fn qualifies(&self, confidence: f32) -> bool {
        passes_cutoff(confidence, self.config.detector_cutoff)
    }

    pub async fn decode(&self, upload: Bytes) -> Result<Arc<DynamicImage>, ProcessError> {
        let decoded = tokio::task::spawn_blocking(move || image::load_from_memory(&upload)).await?;
        decoded
            .map(Arc::new)
            .map_err(|e| ProcessError::input(format!("Failed to decode image: {}", e)))
    }

    pub async fn detect(&self, image: Arc<DynamicImage>) -> Result<Vec<Detection>, ProcessError> {
        let detector = self.detector.clone();
        self.run_blocking(move || detector.detect(&image)).await
    }

    /// Embed crops resized to the fixed crop size. Returns raw vectors.
    pub async fn embed(&self, crops: Vec<DynamicImage>) -> Result<Vec<Vec<f32>>, ProcessError> {
        let embedder = self.embedder.clone();
        let size = self.config.crop_size;
        let expected = crops.len();
        let vectors = self
            .run_blocking(move || {
                let resized: Vec<DynamicImage> =
                    crops.iter().map(|c| c.resize_exact(size, size, FilterType::Triangle)).collect();
                embedder.embed(&resized)
            })
            .await?;
        if vectors.len() != expected {
            return Err(RecognitionFailure::Inference(anyhow::anyhow!(
                "embedder returned {} vectors for {} crops",
                vectors.len(),
                expected
            ))
            .into());
        }
        Ok(vectors)
    }

    /// Full recognition front half for one upload.
    ///
    /// `keep` sees each face above the cutoff and can drop it before embedding
    /// (the geofence path uses it for containment). Fails with `NoFaces` or
    /// `NoQualifyingFaces`; a frame whose qualifying faces were all dropped by
    /// `keep` comes back with no faces.
    pub async fn analyze_where<F>(&self, upload: Bytes, keep: F) -> Result<AnalyzedFrame, ProcessError>
    where
        F: Fn(&Detection) -> bool + Send,
    {
        let image = self.decode(upload).await?;
        let started = Instant::now();
        let detections = self.detect(image.clone()).await?;
        if detections.is_empty() {
            return Err(RecognitionFailure::NoFaces.into());
        }

        let mut frame = AnalyzedFrame { detected: detections.len(), ..Default::default() };
        let mut kept: Vec<(usize, BoundingBox, DynamicImage)> = Vec::new();
        for (i, det) in detections.iter().enumerate() {
            let face = i + 1;
            if !self.qualifies(det.confidence) {
                tracing::debug!(face, confidence = det.confidence, "face skipped (low confidence)");
                frame.skipped.push(face);
                continue;
            }
            let Some(crop) = crop_face(&image, &det.bbox) else {
                tracing::debug!(face, "face skipped (box outside image)");
                frame.skipped.push(face);
                continue;
            };
            if !keep(det) {
                frame.excluded.push(face);
                continue;
            }
            kept.push((face, det.bbox, crop));
        }
        if kept.is_empty() && frame.excluded.is_empty() {
            return Err(RecognitionFailure::NoQualifyingFaces.into());
        }
        if kept.is_empty() {
            frame.detection_latency = started.elapsed().as_secs_f64();
            return Ok(frame);
        }

        let vectors = self.embed(kept.iter().map(|(_, _, c)| c.clone()).collect()).await?;
        frame.detection_latency = started.elapsed().as_secs_f64();
        for ((face, bbox, crop), raw) in kept.into_iter().zip(vectors) {
            let Some(embedding) = normalize(&raw) else {
                tracing::warn!(face, "embedder returned a zero vector; skipping face");
                frame.skipped.push(face);
                continue;
            };
            frame.faces.push(AnalyzedFace { face, bbox, crop, embedding });
        }
        if frame.faces.is_empty() {
            return Err(RecognitionFailure::NoQualifyingFaces.into());
        }
        Ok(frame)
    }

    pub async fn analyze(&self, upload: Bytes) -> Result<AnalyzedFrame, ProcessError> {
        self.analyze_where(upload, |_| true).await
    }

    /// Raw embedding of the first qualifying face in a training photo, if any.
    /// Undecodable photos and photos without a usable face yield `None`.
    pub async fn training_embedding(&self, upload: Bytes) -> Result<Option<Vec<f32>>, ProcessError> {
        let image = match self.decode(upload).await {
            Ok(image) => image,
            Err(ProcessError::Input(msg)) => {
                tracing::debug!(reason = %msg, "training photo skipped");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let detections = self.detect(image.clone()).await?;
        let Some(crop) = detections
            .iter()
            .find(|d| self.qualifies(d.confidence))
            .and_then(|d| crop_face(&image, &d.bbox))
        else {
            return Ok(None);
        };
        let mut vectors = self.embed(vec![crop]).await?;
        Ok(vectors.pop())
    }
}
