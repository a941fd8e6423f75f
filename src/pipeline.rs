//! Format dispatch for the two boundary operations and the single-slot
//! metadata cache that connects them.
//!
//! The free functions [`extract`] and [`inject`] are stateless. [`Session`]
//! owns an EXIF backend and a [`MetadataCache`] and is what an application
//! normally holds on to.

use std::path::Path;
use tokio::sync::{Mutex, MutexGuard};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::exif::{ExifAdapter, JpegExifAdapter};
use crate::metadata::{ImageKind, Metadata};
use crate::png::{self, RECOGNIZED_KEYWORDS};

/// Start of every JPEG: SOI followed by the next marker's 0xFF.
const JPEG_SIGNATURE: [u8; 3] = [0xFF, 0xD8, 0xFF];

fn check_jpeg_signature(bytes: &[u8]) -> Result<()> {
    if bytes.starts_with(&JPEG_SIGNATURE) {
        Ok(())
    } else {
        Err(Error::InvalidFormat(ImageKind::Jpeg))
    }
}

/// Extract generation metadata from an image of the declared kind.
///
/// Returns `Ok(None)` when the image simply carries none. For JPEG, a missing
/// or unparsable EXIF segment is reported the same way.
pub async fn extract(
    adapter: &dyn ExifAdapter,
    bytes: &[u8],
    kind: ImageKind,
) -> Result<Option<Metadata>> {
    extract_with(adapter, bytes, kind, &RECOGNIZED_KEYWORDS).await
}

/// Like [`extract`] with a caller-supplied PNG keyword set.
pub async fn extract_with<S: AsRef<str> + Sync>(
    adapter: &dyn ExifAdapter,
    bytes: &[u8],
    kind: ImageKind,
    keywords: &[S],
) -> Result<Option<Metadata>> {
    match kind {
        ImageKind::WebP => Err(Error::UnsupportedFormat(kind)),
        ImageKind::Png => {
            let entries = png::extract_text_with(bytes, keywords)?;
            Ok(entries.map(|entries| Metadata::Png { entries }))
        }
        ImageKind::Jpeg => {
            check_jpeg_signature(bytes)?;
            match adapter.decode(bytes).await {
                Ok(exif) => Ok(Some(Metadata::Jpeg { exif })),
                Err(e) => {
                    log::debug!("{}: no usable EXIF ({e:#})", adapter.name());
                    Ok(None)
                }
            }
        }
    }
}

/// Write `cached` into a copy of `bytes`.
///
/// The declared kind must match the kind the metadata came from; nothing is
/// read from `bytes` until that holds.
pub async fn inject(
    adapter: &dyn ExifAdapter,
    bytes: &[u8],
    kind: ImageKind,
    cached: &Metadata,
) -> Result<Vec<u8>> {
    match (kind, cached) {
        (ImageKind::WebP, _) => Err(Error::UnsupportedFormat(kind)),
        (ImageKind::Png, Metadata::Png { entries }) => png::inject_text(bytes, entries),
        (ImageKind::Jpeg, Metadata::Jpeg { exif }) => {
            check_jpeg_signature(bytes)?;
            adapter
                .encode(exif, bytes)
                .await
                .map_err(Error::AdapterFailure)
        }
        (target, cached) => Err(Error::FormatMismatch {
            cached: cached.kind(),
            target,
        }),
    }
}

/// Output of a successful injection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedImage {
    pub bytes: Vec<u8>,
    /// File name to save under, derived from the target's name.
    pub file_name: String,
}

impl ProcessedImage {
    /// `edit.png` with suffix `-meta` becomes `edit-meta.png`. Directories are dropped.
    pub fn suggested_name(original: &str, suffix: &str) -> String {
        let path = Path::new(original);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        match path.extension() {
            Some(ext) => format!("{stem}{suffix}.{}", ext.to_string_lossy()),
            None => format!("{stem}{suffix}"),
        }
    }
}

/// Holds the most recently extracted metadata.
///
/// One slot; each successful extraction replaces it. Access is serialized
/// through an async mutex so an extraction in flight cannot interleave with
/// another one or with an injection.
#[derive(Debug, Default)]
pub struct MetadataCache {
    slot: Mutex<Option<Metadata>>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the cached metadata, if any.
    pub async fn get(&self) -> Option<Metadata> {
        self.slot.lock().await.clone()
    }

    /// The format tag of the cached metadata.
    pub async fn kind(&self) -> Option<ImageKind> {
        self.slot.lock().await.as_ref().map(Metadata::kind)
    }

    /// Replace the cached metadata.
    pub async fn set(&self, metadata: Metadata) {
        *self.slot.lock().await = Some(metadata);
    }

    /// Lock the slot for the duration of a multi-step operation.
    pub(crate) async fn lock(&self) -> MutexGuard<'_, Option<Metadata>> {
        self.slot.lock().await
    }
}

/// An EXIF backend plus the metadata cache, configured from [`Config`].
///
/// # Example
///
/// ```rust,no_run
/// use genmeta::config::Config;
/// use genmeta::metadata::ImageKind;
/// use genmeta::pipeline::Session;
///
/// # async fn example() -> anyhow::Result<()> {
/// let session = Session::new(&Config::default());
///
/// let original = std::fs::read("original.png")?;
/// if session.extract(&original, ImageKind::Png).await?.is_none() {
///     println!("No generation metadata found");
///     return Ok(());
/// }
///
/// let edited = std::fs::read("edited.png")?;
/// let processed = session.inject(&edited, ImageKind::Png, "edited.png").await?;
/// std::fs::write(&processed.file_name, &processed.bytes)?;
/// # Ok(())
/// # }
/// ```
pub struct Session {
    adapter: Box<dyn ExifAdapter>,
    cache: MetadataCache,
    keywords: Vec<String>,
    suffix: String,
}

impl Session {
    /// A session using the default JPEG EXIF backend.
    pub fn new(config: &Config) -> Self {
        Self::with_adapter(Box::new(JpegExifAdapter), config)
    }

    pub fn with_adapter(adapter: Box<dyn ExifAdapter>, config: &Config) -> Self {
        Self {
            adapter,
            cache: MetadataCache::new(),
            keywords: config.keywords.clone(),
            suffix: config.output.suffix.clone(),
        }
    }

    /// Extract metadata and cache it.
    ///
    /// The cache is only written when metadata was found; errors and empty
    /// results leave the previous value in place.
    pub async fn extract(&self, bytes: &[u8], kind: ImageKind) -> Result<Option<Metadata>> {
        let mut slot = self.cache.lock().await;
        let found = extract_with(self.adapter.as_ref(), bytes, kind, self.keywords.as_slice()).await?;
        match &found {
            Some(metadata) => {
                log::info!("Cached {}", metadata.summary());
                *slot = Some(metadata.clone());
            }
            None => log::info!("No generation metadata found in {kind} image"),
        }
        Ok(found)
    }

    /// Inject the cached metadata into `bytes`.
    ///
    /// `file_name` is the target's name and only feeds [`ProcessedImage::file_name`].
    pub async fn inject(
        &self,
        bytes: &[u8],
        kind: ImageKind,
        file_name: &str,
    ) -> Result<ProcessedImage> {
        let slot = self.cache.lock().await;
        let cached = slot.as_ref().ok_or(Error::EmptyCache)?;
        let output = inject(self.adapter.as_ref(), bytes, kind, cached).await?;
        log::info!(
            "Injected {} into {kind} image ({} -> {} bytes)",
            cached.summary(),
            bytes.len(),
            output.len()
        );
        Ok(ProcessedImage {
            bytes: output,
            file_name: ProcessedImage::suggested_name(file_name, &self.suffix),
        })
    }

    /// Put previously saved metadata back into the cache.
    pub async fn restore(&self, metadata: Metadata) {
        self.cache.set(metadata).await;
    }

    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exif::ExifDirectory;
    use crate::exif::tests::{jpeg_with_exif, plain_jpeg, tiff_with};
    use crate::png::TextEntry;
    use crate::png::tests::minimal_png;
    use std::io::Cursor;

    /// Backend whose every call fails.
    struct BrokenAdapter;

    #[async_trait::async_trait]
    impl ExifAdapter for BrokenAdapter {
        fn name(&self) -> &str {
            "broken"
        }

        async fn decode(&self, _jpeg: &[u8]) -> anyhow::Result<ExifDirectory> {
            anyhow::bail!("decoder exploded")
        }

        async fn encode(&self, _exif: &ExifDirectory, _jpeg: &[u8]) -> anyhow::Result<Vec<u8>> {
            anyhow::bail!("encoder exploded")
        }
    }

    fn session() -> Session {
        Session::new(&Config::default())
    }

    fn png_metadata(entries: &[(&str, &str)]) -> Metadata {
        Metadata::Png {
            entries: entries.iter().map(|(k, t)| TextEntry::new(*k, *t)).collect(),
        }
    }

    /// A PNG written by a real encoder.
    fn encoded_png() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(4, 3, image::Rgba([10, 20, 30, 255]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    // ── PNG path ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn png_roundtrip_through_session() {
        let source = png::inject_text(
            &minimal_png(),
            &[TextEntry::new("parameters", "best quality, 1girl")],
        )
        .unwrap();
        let session = session();

        let found = session.extract(&source, ImageKind::Png).await.unwrap();
        assert_eq!(found, Some(png_metadata(&[("parameters", "best quality, 1girl")])));

        let out = session
            .inject(&minimal_png(), ImageKind::Png, "edited.png")
            .await
            .unwrap();
        assert_eq!(out.file_name, "edited-meta.png");

        let again = extract(&JpegExifAdapter, &out.bytes, ImageKind::Png).await.unwrap();
        assert_eq!(again, found);
    }

    #[tokio::test]
    async fn png_multiple_keywords_keep_order() {
        let cached = png_metadata(&[("workflow", "{\"nodes\":[]}"), ("prompt", "{\"4\":{}}")]);
        let out = inject(&JpegExifAdapter, &minimal_png(), ImageKind::Png, &cached)
            .await
            .unwrap();
        let found = extract(&JpegExifAdapter, &out, ImageKind::Png).await.unwrap();
        assert_eq!(found, Some(cached));
    }

    #[tokio::test]
    async fn png_without_text_is_none() {
        let found = extract(&JpegExifAdapter, &encoded_png(), ImageKind::Png).await.unwrap();
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn injected_png_still_decodes() {
        let cached = png_metadata(&[("parameters", "masterpiece, steps: 20")]);
        let out = inject(&JpegExifAdapter, &encoded_png(), ImageKind::Png, &cached)
            .await
            .unwrap();

        let img = image::load_from_memory_with_format(&out, image::ImageFormat::Png).unwrap();
        assert_eq!((img.width(), img.height()), (4, 3));
        assert_eq!(
            extract(&JpegExifAdapter, &out, ImageKind::Png).await.unwrap(),
            Some(cached)
        );
    }

    #[tokio::test]
    async fn configured_keywords_apply() {
        let source = png::inject_text(
            &minimal_png(),
            &[TextEntry::new("Comment", "hi"), TextEntry::new("parameters", "p")],
        )
        .unwrap();
        let mut config = Config::default();
        config.keywords = vec!["Comment".to_string()];
        let session = Session::new(&config);

        let found = session.extract(&source, ImageKind::Png).await.unwrap();
        assert_eq!(found, Some(png_metadata(&[("Comment", "hi")])));
    }

    // ── guards ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn broken_signature_fails_both_operations() {
        let mut png = minimal_png();
        png[0] = 0;
        let cached = png_metadata(&[("parameters", "x")]);

        let err = extract(&JpegExifAdapter, &png, ImageKind::Png).await.unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(ImageKind::Png)));
        let err = inject(&JpegExifAdapter, &png, ImageKind::Png, &cached).await.unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(ImageKind::Png)));

        let mut jpeg = plain_jpeg();
        jpeg[1] = 0;
        let err = extract(&JpegExifAdapter, &jpeg, ImageKind::Jpeg).await.unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(ImageKind::Jpeg)));

        let jpeg_cached = Metadata::Jpeg {
            exif: ExifDirectory {
                tiff: tiff_with("a castle", "Steps: 30"),
                tag_count: 3,
                user_comment: Some("Steps: 30".to_string()),
                image_description: Some("a castle".to_string()),
            },
        };
        // Rejected before the backend runs, so the broken one is never reached
        let err = inject(&BrokenAdapter, &jpeg, ImageKind::Jpeg, &jpeg_cached)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(ImageKind::Jpeg)));
    }

    #[tokio::test]
    async fn format_mismatch_is_rejected() {
        let session = session();
        session.restore(png_metadata(&[("parameters", "x")])).await;

        let err = session
            .inject(&plain_jpeg(), ImageKind::Jpeg, "edited.jpg")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::FormatMismatch {
                cached: ImageKind::Png,
                target: ImageKind::Jpeg
            }
        ));
    }

    #[tokio::test]
    async fn mismatch_checked_before_reading_target() {
        let cached = png_metadata(&[("parameters", "x")]);
        let err = inject(&JpegExifAdapter, b"not an image", ImageKind::Jpeg, &cached)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FormatMismatch { .. }));
    }

    #[tokio::test]
    async fn webp_is_unsupported() {
        let cached = png_metadata(&[("parameters", "x")]);
        let err = extract(&JpegExifAdapter, b"RIFF....WEBP", ImageKind::WebP)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(ImageKind::WebP)));
        let err = inject(&JpegExifAdapter, b"RIFF....WEBP", ImageKind::WebP, &cached)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(ImageKind::WebP)));
    }

    #[tokio::test]
    async fn inject_without_extract_fails() {
        let err = session()
            .inject(&minimal_png(), ImageKind::Png, "a.png")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmptyCache));
    }

    // ── cache behavior ───────────────────────────────────────────────

    #[tokio::test]
    async fn failed_or_empty_extract_keeps_cache() {
        let session = session();
        let cached = png_metadata(&[("prompt", "{}")]);
        session.restore(cached.clone()).await;

        assert_eq!(session.extract(&minimal_png(), ImageKind::Png).await.unwrap(), None);
        assert!(session.extract(b"junk", ImageKind::Png).await.is_err());
        assert!(session.extract(b"junk", ImageKind::WebP).await.is_err());
        assert_eq!(session.cache().get().await, Some(cached));
    }

    #[tokio::test]
    async fn latest_extract_wins() {
        let session = session();
        let first = png::inject_text(&minimal_png(), &[TextEntry::new("prompt", "1")]).unwrap();
        let second = png::inject_text(&minimal_png(), &[TextEntry::new("prompt", "2")]).unwrap();

        session.extract(&first, ImageKind::Png).await.unwrap();
        session.extract(&second, ImageKind::Png).await.unwrap();
        assert_eq!(session.cache().get().await, Some(png_metadata(&[("prompt", "2")])));
        assert_eq!(session.cache().kind().await, Some(ImageKind::Png));
    }

    #[tokio::test]
    async fn concurrent_extracts_do_not_interleave() {
        let session = session();
        let first = png::inject_text(&minimal_png(), &[TextEntry::new("prompt", "a")]).unwrap();
        let second = jpeg_with_exif("second source", "Steps: 12");

        let (a, b) = tokio::join!(
            session.extract(&first, ImageKind::Png),
            session.extract(&second, ImageKind::Jpeg)
        );
        let a = a.unwrap().unwrap();
        let b = b.unwrap().unwrap();
        let cached = session.cache().get().await.unwrap();
        assert!(cached == a || cached == b);
    }

    // ── JPEG path ────────────────────────────────────────────────────

    #[tokio::test]
    async fn jpeg_roundtrip_through_session() {
        let session = session();
        let source = jpeg_with_exif("a castle", "Steps: 30, Seed: 1234");

        let found = session.extract(&source, ImageKind::Jpeg).await.unwrap().unwrap();
        assert_eq!(found.kind(), ImageKind::Jpeg);

        let out = session
            .inject(&plain_jpeg(), ImageKind::Jpeg, "dir/edit.jpeg")
            .await
            .unwrap();
        assert_eq!(out.file_name, "edit-meta.jpeg");
        assert_eq!(
            extract(&JpegExifAdapter, &out.bytes, ImageKind::Jpeg).await.unwrap(),
            Some(found)
        );
    }

    #[tokio::test]
    async fn jpeg_without_exif_is_none() {
        let found = extract(&JpegExifAdapter, &plain_jpeg(), ImageKind::Jpeg).await.unwrap();
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn decode_failure_downgrades_to_none() {
        let found = extract(&BrokenAdapter, &plain_jpeg(), ImageKind::Jpeg).await.unwrap();
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn encode_failure_is_surfaced() {
        let cached = extract(
            &JpegExifAdapter,
            &jpeg_with_exif("a castle", "Steps: 30"),
            ImageKind::Jpeg,
        )
        .await
        .unwrap()
        .unwrap();

        let err = inject(&BrokenAdapter, &plain_jpeg(), ImageKind::Jpeg, &cached)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AdapterFailure(_)));
        assert!(err.to_string().contains("encoder exploded"));
    }

    // ── naming ───────────────────────────────────────────────────────

    #[test]
    fn suggested_names() {
        let name = ProcessedImage::suggested_name;
        assert_eq!(name("edit.png", "-meta"), "edit-meta.png");
        assert_eq!(name("/tmp/x/photo.final.jpg", "_sd"), "photo.final_sd.jpg");
        assert_eq!(name("noext", "-meta"), "noext-meta");
        assert_eq!(name("", "-meta"), "image-meta");
    }
}
