use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use chrono::Local;
use image::DynamicImage;

/// Which negative outcome a stored photo belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoKind {
    Visitor,
    Breach,
}

impl PhotoKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            PhotoKind::Visitor => "visitor",
            PhotoKind::Breach => "breach",
        }
    }
}

pub fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buf = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut buf), image::ImageOutputFormat::Jpeg(90))?;
    Ok(buf)
}

/// Writes face crops for visitor and breach events.
///
/// Names carry a microsecond timestamp, a per-store sequence number and the
/// face index, so two faces never share a file within one process.
pub struct PhotoStore {
    dir: PathBuf,
    seq: AtomicU64,
}

/// A photo persisted to disk, with the bytes kept for alert attachments.
#[derive(Debug, Clone)]
pub struct StoredPhoto {
    pub file_name: String,
    pub path: PathBuf,
    pub jpeg: Vec<u8>,
}

impl PhotoStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).with_context(|| format!("creating photo dir {}", dir.display()))?;
        Ok(Self { dir, seq: AtomicU64::new(0) })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn next_name(&self, kind: PhotoKind, face: usize) -> String {
        let ts = Local::now().format("%Y%m%d_%H%M%S_%6f");
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("{}_{}_{}_face{}.jpg", kind.prefix(), ts, seq, face)
    }

    pub fn save(&self, kind: PhotoKind, face: usize, crop: &DynamicImage) -> Result<StoredPhoto> {
        let jpeg = encode_jpeg(crop)?;
        let file_name = self.next_name(kind, face);
        let path = self.dir.join(&file_name);
        std::fs::write(&path, &jpeg).with_context(|| format!("writing {}", path.display()))?;
        Ok(StoredPhoto { file_name, path, jpeg })
    }

    /// Resolve a served photo name. Anything that could leave the directory is refused.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
            return None;
        }
        Some(self.dir.join(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_names_are_unique_and_shaped() {
        let tmp = TempDir::new().unwrap();
        let store = PhotoStore::new(tmp.path()).unwrap();
        let a = store.next_name(PhotoKind::Visitor, 1);
        let b = store.next_name(PhotoKind::Visitor, 1);
        assert_ne!(a, b);
        assert!(a.starts_with("visitor_"));
        assert!(a.ends_with("_face1.jpg"));
        // visitor_YYYYmmdd_HHMMSS_ffffff_seq_faceN.jpg
        let parts: Vec<&str> = a.trim_end_matches(".jpg").split('_').collect();
        assert_eq!(parts.len(), 6);
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2].len(), 6);
        assert_eq!(parts[3].len(), 6);
        assert!(store.next_name(PhotoKind::Breach, 3).starts_with("breach_"));
    }

    #[test]
    fn test_save_writes_jpeg() {
        let tmp = TempDir::new().unwrap();
        let store = PhotoStore::new(tmp.path().join("photos")).unwrap();
        let img = DynamicImage::ImageRgb8(image::RgbImage::new(8, 8));
        let stored = store.save(PhotoKind::Visitor, 2, &img).unwrap();
        assert!(stored.path.exists());
        assert_eq!(&stored.jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(store.resolve(&stored.file_name), Some(stored.path.clone()));
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let tmp = TempDir::new().unwrap();
        let store = PhotoStore::new(tmp.path()).unwrap();
        assert!(store.resolve("../hostelwatch.db").is_none());
        assert!(store.resolve("a/b.jpg").is_none());
        assert!(store.resolve("").is_none());
    }
}
