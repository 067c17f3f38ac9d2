//! Media synchronization: download, validate and recompress record images.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::RemoteSource;
use crate::config::media_url;
use crate::models::{Domain, FileRef};

use super::error::{io_err, SyncError};

/// Extensions we know how to recompress (compared case-insensitively).
pub const ALLOWED_EXTENSIONS: [&str; 5] = ["webp", "jpg", "jpeg", "png", "gif"];

/// Longest edge a stored image may have.
pub const MAX_DIMENSION: u32 = 2000;

/// Lossy encoding quality used when re-saving JPEGs.
pub const JPEG_QUALITY: u8 = 95;

/// Extension used when the uploaded file name has none.
const FALLBACK_EXTENSION: &str = "bin";

pub fn is_allowed_extension(ext: &str) -> bool {
    ALLOWED_EXTENSIONS.iter().any(|a| a.eq_ignore_ascii_case(ext))
}

/// Extension of the file a media URL points at.
pub fn extension_of_url(url: &str) -> Option<&str> {
    let file = url.rsplit('/').next()?;
    file.rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty())
}

/// Only non-empty ASCII alphanumerics are safe in a stored file name and a
/// public URL.
fn is_clean_extension(ext: &str) -> bool {
    !ext.is_empty() && ext.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Extension of the path part of a download URL, ignoring host, query and
/// fragment.
fn url_path_extension(url: &str) -> Option<&str> {
    let url = url.split(['?', '#']).next()?;
    let rest = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let (_, path) = rest.split_once('/')?;
    extension_of_url(path)
}

/// Lowercase extension a downloaded file is stored under: the uploaded
/// name's when clean, else the download URL path's, else `bin`.
///
/// Externally hosted files often carry the URL itself as their name, so the
/// name alone is not trusted.
pub fn media_extension(file: &FileRef) -> String {
    file.extension()
        .filter(|ext| is_clean_extension(ext))
        .or_else(|| url_path_extension(&file.url).filter(|ext| is_clean_extension(ext)))
        .unwrap_or(FALLBACK_EXTENSION)
        .to_ascii_lowercase()
}

/// Target size for an image whose longer edge exceeds `max`, keeping the
/// aspect ratio. `None` when no resize is needed.
pub fn bounded_dimensions(width: u32, height: u32, max: u32) -> Option<(u32, u32)> {
    if width <= max && height <= max {
        return None;
    }
    let (w, h, max) = (width as u64, height as u64, max as u64);
    let (new_w, new_h) = if w > h {
        (max, h * max / w)
    } else {
        (w * max / h, max)
    };
    Some((new_w.max(1) as u32, new_h.max(1) as u32))
}

#[derive(Debug, Error)]
pub enum CompressError {
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not determine image format")]
    UnknownFormat,
}

/// Recompresses an image file in place.
///
/// Not idempotent: each call decodes and re-encodes the file again, so it
/// must run exactly once per freshly downloaded file.
pub trait ImageCompressor: Send + Sync {
    fn compress(&self, path: &Path) -> Result<(), CompressError>;
}

/// Downscales oversized images and re-saves them with high-quality settings.
#[derive(Debug, Clone)]
pub struct ResizingCompressor {
    pub max_dimension: u32,
    pub jpeg_quality: u8,
}

impl Default for ResizingCompressor {
    fn default() -> Self {
        Self {
            max_dimension: MAX_DIMENSION,
            jpeg_quality: JPEG_QUALITY,
        }
    }
}

impl ImageCompressor for ResizingCompressor {
    fn compress(&self, path: &Path) -> Result<(), CompressError> {
        let reader = ImageReader::open(path)?.with_guessed_format()?;
        let format = reader.format().ok_or(CompressError::UnknownFormat)?;
        let mut img = reader.decode()?;

        if let Some((w, h)) = bounded_dimensions(img.width(), img.height(), self.max_dimension) {
            debug!(from_w = img.width(), from_h = img.height(), w, h, "Downscaling image");
            img = img.resize_exact(w, h, FilterType::Lanczos3);
        }

        // Encode fully before touching the file so a failure leaves the
        // downloaded bytes intact.
        let mut buf = Cursor::new(Vec::new());
        match format {
            ImageFormat::Jpeg => {
                let encoder = JpegEncoder::new_with_quality(&mut buf, self.jpeg_quality);
                DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)?;
            }
            ImageFormat::Png => {
                let encoder = PngEncoder::new_with_quality(
                    &mut buf,
                    CompressionType::Best,
                    PngFilterType::Adaptive,
                );
                img.write_with_encoder(encoder)?;
            }
            other => img.write_to(&mut buf, other)?,
        }

        std::fs::write(path, buf.into_inner())?;
        Ok(())
    }
}

/// Media files of one domain, stored as `<record_id>.<ext>`.
#[derive(Clone)]
pub struct MediaSync {
    domain: Domain,
    dir: PathBuf,
    api_url: String,
    compressor: Arc<dyn ImageCompressor>,
}

impl MediaSync {
    pub fn new(
        domain: Domain,
        dir: impl Into<PathBuf>,
        api_url: impl Into<String>,
        compressor: Arc<dyn ImageCompressor>,
    ) -> Self {
        Self {
            domain,
            dir: dir.into(),
            api_url: api_url.into(),
            compressor,
        }
    }

    pub fn path_for(&self, record_id: &str, ext: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", record_id, ext))
    }

    pub fn url_for(&self, record_id: &str, ext: &str) -> String {
        media_url(&self.api_url, self.domain, &format!("{}.{}", record_id, ext))
    }

    /// Resolve the media reference for one record.
    ///
    /// Stale records reuse the cached extension without downloading. Fresh
    /// records are downloaded, recompressed when the extension is
    /// recognized, and moved into place. Download and write failures abort
    /// the pass; compression problems only warn.
    pub async fn sync(
        &self,
        source: &dyn RemoteSource,
        record_id: &str,
        file: Option<&FileRef>,
        cached_url: Option<&str>,
        stale: bool,
    ) -> Result<Option<String>, SyncError> {
        let Some(file) = file else {
            return Ok(None);
        };

        if stale {
            let ext = cached_url
                .and_then(extension_of_url)
                .filter(|ext| is_clean_extension(ext))
                .map(str::to_string)
                .unwrap_or_else(|| media_extension(file));
            return Ok(Some(self.url_for(record_id, &ext)));
        }

        let ext = media_extension(file);
        let bytes = source.download(&file.url).await?;

        let target = self.path_for(record_id, &ext);
        let staging = self.dir.join(format!("{}.{}.tmp", record_id, ext));
        std::fs::write(&staging, &bytes).map_err(|e| io_err(&staging, e))?;

        if is_allowed_extension(&ext) {
            let compressor = Arc::clone(&self.compressor);
            let path = staging.clone();
            match tokio::task::spawn_blocking(move || compressor.compress(&path)).await? {
                Ok(()) => debug!(domain = %self.domain, record = record_id, "Recompressed media"),
                Err(e) => warn!(
                    domain = %self.domain,
                    record = record_id,
                    error = %e,
                    "Image recompression failed, keeping original bytes"
                ),
            }
        } else {
            warn!(
                domain = %self.domain,
                record = record_id,
                file = %file.name,
                "Unrecognized image extension, skipping recompression"
            );
        }

        if let Err(e) = std::fs::rename(&staging, &target) {
            let _ = std::fs::remove_file(&staging);
            return Err(io_err(&target, e));
        }

        info!(domain = %self.domain, record = record_id, bytes = bytes.len(), "Downloaded media");
        Ok(Some(self.url_for(record_id, &ext)))
    }

    /// Files stored for `record_id` as `(file name, extension)`. Staging
    /// files never match since their stem still carries the extension.
    fn stored_files(&self, record_id: &str) -> Result<Vec<(String, String)>, SyncError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&self.dir, e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&self.dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some((stem, ext)) = name.rsplit_once('.') {
                if stem == record_id && !ext.is_empty() {
                    files.push((name.clone(), ext.to_string()));
                }
            }
        }
        Ok(files)
    }

    fn remove_files(&self, names: Vec<String>) -> Result<usize, SyncError> {
        let mut removed = 0;
        for name in names {
            let path = self.dir.join(&name);
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_err(&path, e)),
            }
        }
        Ok(removed)
    }

    /// Remove any media file stored for a record under an allowed extension,
    /// in any letter case. Returns how many files were deleted.
    pub fn purge(&self, record_id: &str) -> Result<usize, SyncError> {
        let names = self
            .stored_files(record_id)?
            .into_iter()
            .filter(|(_, ext)| is_allowed_extension(ext))
            .map(|(name, _)| name)
            .collect();
        let removed = self.remove_files(names)?;
        if removed > 0 {
            info!(domain = %self.domain, record = record_id, removed, "Purged media");
        }
        Ok(removed)
    }

    /// Remove files left behind by a refreshed record: everything stored for
    /// it except the file `current_url` points at.
    pub fn prune_replaced(&self, record_id: &str, current_url: Option<&str>) -> Result<usize, SyncError> {
        let keep = current_url.and_then(|url| url.rsplit('/').next());
        let names = self
            .stored_files(record_id)?
            .into_iter()
            .map(|(name, _)| name)
            .filter(|name| Some(name.as_str()) != keep)
            .collect();
        let removed = self.remove_files(names)?;
        if removed > 0 {
            info!(domain = %self.domain, record = record_id, removed, "Removed replaced media");
        }
        Ok(removed)
    }
}
