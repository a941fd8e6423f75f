//! EXIF reading and writing for JPEG images.
//!
//! The pipeline talks to EXIF through the [`ExifAdapter`] trait so the PNG
//! path can be exercised without it and other EXIF backends can be plugged in.
//! [`JpegExifAdapter`] is the default backend:
//!
//! - [`decode`]: pull the APP1 EXIF segment out of a JPEG and read its descriptive tags
//! - [`encode`]: put an EXIF segment into another JPEG, replacing any existing one

mod reader;
mod writer;

pub use reader::decode;
pub use writer::encode;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// EXIF taken from a JPEG, ready to be written into another one.
///
/// `tiff` is the complete APP1 payload after the `Exif\0\0` header, so writing
/// it back reproduces every IFD and tag. The remaining fields are decoded for
/// display only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExifDirectory {
    #[serde(with = "base64_bytes")]
    pub tiff: Vec<u8>,
    /// Entries across IFD0, the Exif sub-IFD and the GPS sub-IFD.
    pub tag_count: usize,
    /// `UserComment`, where A1111-style tools keep generation parameters.
    pub user_comment: Option<String>,
    pub image_description: Option<String>,
}

/// An EXIF backend.
///
/// Implement this trait to swap the EXIF library used for JPEG images.
///
/// # Example
///
/// ```rust,no_run
/// use genmeta::exif::{ExifAdapter, JpegExifAdapter};
///
/// # async fn example() -> anyhow::Result<()> {
/// let adapter = JpegExifAdapter;
/// let source = std::fs::read("original.jpg")?;
/// let target = std::fs::read("edited.jpg")?;
/// let exif = adapter.decode(&source).await?;
/// let output = adapter.encode(&exif, &target).await?;
/// std::fs::write("edited-meta.jpg", output)?;
/// # Ok(())
/// # }
/// ```
#[async_trait::async_trait]
pub trait ExifAdapter: Send + Sync {
    /// The display name of this backend.
    fn name(&self) -> &str;
    /// Read the EXIF directory of a JPEG. Fails when there is none or it does not parse.
    async fn decode(&self, jpeg: &[u8]) -> Result<ExifDirectory>;
    /// Return a copy of `jpeg` carrying `exif`.
    async fn encode(&self, exif: &ExifDirectory, jpeg: &[u8]) -> Result<Vec<u8>>;
}

/// Default backend built on `img-parts` and `nom-exif`.
///
/// Parsing runs on the blocking thread pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegExifAdapter;

#[async_trait::async_trait]
impl ExifAdapter for JpegExifAdapter {
    fn name(&self) -> &str {
        "img-parts/nom-exif"
    }

    async fn decode(&self, jpeg: &[u8]) -> Result<ExifDirectory> {
        let bytes = jpeg.to_vec();
        tokio::task::spawn_blocking(move || decode(&bytes))
            .await
            .context("EXIF decode task failed")?
    }

    async fn encode(&self, exif: &ExifDirectory, jpeg: &[u8]) -> Result<Vec<u8>> {
        let exif = exif.clone();
        let bytes = jpeg.to_vec();
        tokio::task::spawn_blocking(move || encode(&exif, &bytes))
            .await
            .context("EXIF encode task failed")?
    }
}

/// Whether `payload` starts with a TIFF header in either byte order.
fn is_tiff(payload: &[u8]) -> bool {
    payload.starts_with(b"II*\0") || payload.starts_with(b"MM\0*")
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}
