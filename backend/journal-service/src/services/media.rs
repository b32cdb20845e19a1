//! Media preparation before upload
//!
//! HEIC/HEIF photos from phones are converted to JPEG so every client can
//! render them. Conversion goes through [`ImageTranscoder`] on the blocking
//! thread pool. When it fails the original bytes are stored as HEIC under a
//! generated name.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use rand::Rng;
use std::sync::Arc;

pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";
pub const HEIC_CONTENT_TYPE: &str = "image/heic";
const JPEG_QUALITY: u8 = 80;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// A file as received from the client
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub filename: String,
    pub content_type: String,
    pub body: Bytes,
}

/// A file ready for key resolution and upload
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedFile {
    pub filename: String,
    pub content_type: String,
    pub body: Bytes,
    pub converted: bool,
}

#[derive(Debug, thiserror::Error)]
#[error("image conversion failed: {0}")]
pub struct TranscodeError(pub String);

/// Converts image bytes to JPEG
pub trait ImageTranscoder: Send + Sync {
    fn to_jpeg(&self, body: &[u8]) -> Result<Vec<u8>, TranscodeError>;
}

fn encode_jpeg(rgb: &RgbImage) -> Result<Vec<u8>, TranscodeError> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .encode_image(rgb)
        .map_err(|e| TranscodeError(e.to_string()))?;
    Ok(out)
}

/// Transcoder backed by the `image` crate.
///
/// Decodes whatever formats the crate was built with, which does not include
/// HEIC. Builds with the `heic` feature use [`HeifTranscoder`] instead.
pub struct ImageCrateTranscoder;

impl ImageTranscoder for ImageCrateTranscoder {
    fn to_jpeg(&self, body: &[u8]) -> Result<Vec<u8>, TranscodeError> {
        let decoded =
            image::load_from_memory(body).map_err(|e| TranscodeError(e.to_string()))?;
        encode_jpeg(&decoded.to_rgb8())
    }
}

#[cfg(feature = "heic")]
pub use heif::HeifTranscoder;

#[cfg(feature = "heic")]
mod heif {
    use super::{encode_jpeg, ImageTranscoder, TranscodeError};
    use libheif_rs::{ColorSpace, HeifContext, HeifError, LibHeif, RgbChroma};

    /// HEIC/HEIF decoding through libheif, JPEG encoding through `image`
    pub struct HeifTranscoder;

    fn heif_err(e: HeifError) -> TranscodeError {
        TranscodeError(e.to_string())
    }

    impl ImageTranscoder for HeifTranscoder {
        fn to_jpeg(&self, body: &[u8]) -> Result<Vec<u8>, TranscodeError> {
            let lib = LibHeif::new();
            let ctx = HeifContext::read_from_bytes(body).map_err(heif_err)?;
            let handle = ctx.primary_image_handle().map_err(heif_err)?;
            let decoded = lib
                .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgb), None)
                .map_err(heif_err)?;

            let planes = decoded.planes();
            let plane = planes
                .interleaved
                .ok_or_else(|| TranscodeError("decoded image has no RGB plane".to_string()))?;

            let (width, height) = (plane.width, plane.height);
            let row_bytes = width as usize * 3;
            let mut pixels = Vec::with_capacity(row_bytes * height as usize);
            for row in plane.data.chunks(plane.stride).take(height as usize) {
                pixels.extend_from_slice(&row[..row_bytes]);
            }

            let rgb = image::RgbImage::from_raw(width, height, pixels)
                .ok_or_else(|| TranscodeError("decoded plane is truncated".to_string()))?;
            encode_jpeg(&rgb)
        }
    }
}

/// Transcoder used by the service binary
pub fn default_transcoder() -> Arc<dyn ImageTranscoder> {
    #[cfg(feature = "heic")]
    {
        Arc::new(HeifTranscoder)
    }
    #[cfg(not(feature = "heic"))]
    {
        tracing::warn!("built without the heic feature; HEIC uploads are stored unconverted");
        Arc::new(ImageCrateTranscoder)
    }
}

/// HEIC detection by content type or `.heic` / `.heif` extension
pub fn is_heic(content_type: &str, filename: &str) -> bool {
    let lower = filename.to_ascii_lowercase();
    content_type.eq_ignore_ascii_case("image/heic")
        || content_type.eq_ignore_ascii_case("image/heif")
        || lower.ends_with(".heic")
        || lower.ends_with(".heif")
}

/// `trip_<YYYYMMDD>_<6 base36 chars>.<ext>`
pub fn converted_filename(extension: &str) -> String {
    let date_stamp = chrono::Utc::now().format("%Y%m%d");
    let mut rng = rand::thread_rng();
    let token: String = (0..6)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("trip_{}_{}.{}", date_stamp, token, extension)
}

fn passthrough(file: IncomingFile) -> PreparedFile {
    PreparedFile {
        filename: file.filename,
        content_type: file.content_type,
        body: file.body,
        converted: false,
    }
}

fn unconverted_heic(file: IncomingFile) -> PreparedFile {
    PreparedFile {
        filename: converted_filename("heic"),
        content_type: HEIC_CONTENT_TYPE.to_string(),
        body: file.body,
        converted: false,
    }
}

/// Convert HEIC input to JPEG; pass everything else through untouched.
///
/// CPU-bound for HEIC input; async callers go through [`prepare_file_blocking`].
pub fn prepare_file(file: IncomingFile, transcoder: &dyn ImageTranscoder) -> PreparedFile {
    if !is_heic(&file.content_type, &file.filename) {
        return passthrough(file);
    }

    tracing::debug!(original = %file.filename, "converting HEIC to JPEG");

    match transcoder.to_jpeg(&file.body) {
        Ok(jpeg) => PreparedFile {
            filename: converted_filename("jpg"),
            content_type: JPEG_CONTENT_TYPE.to_string(),
            body: Bytes::from(jpeg),
            converted: true,
        },
        Err(err) => {
            tracing::warn!(
                original = %file.filename,
                error = %err,
                "HEIC conversion failed, storing original bytes"
            );
            unconverted_heic(file)
        }
    }
}

/// [`prepare_file`] with the conversion moved onto the blocking thread pool
pub async fn prepare_file_blocking(
    file: IncomingFile,
    transcoder: Arc<dyn ImageTranscoder>,
) -> PreparedFile {
    if !is_heic(&file.content_type, &file.filename) {
        return passthrough(file);
    }

    let original = file.clone();
    match tokio::task::spawn_blocking(move || prepare_file(file, transcoder.as_ref())).await {
        Ok(prepared) => prepared,
        Err(err) => {
            tracing::error!(original = %original.filename, error = %err, "HEIC conversion task panicked");
            unconverted_heic(original)
        }
    }
}
