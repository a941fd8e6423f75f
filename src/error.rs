use crate::metadata::ImageKind;

/// Errors surfaced by the extract and inject operations.
///
/// "This image carries no generation metadata" is not an error: extraction
/// returns `Ok(None)` for it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The byte stream does not start with the signature of the declared type.
    #[error("not a valid {0} file (signature mismatch)")]
    InvalidFormat(ImageKind),

    /// The declared type is recognized but deliberately not handled.
    #[error("{0} images are not supported")]
    UnsupportedFormat(ImageKind),

    /// Cached metadata was taken from one format and the target is another.
    #[error("cached metadata came from a {cached} image but the target is {target}")]
    FormatMismatch { cached: ImageKind, target: ImageKind },

    /// A `tEXt` keyword is empty or contains a NUL byte.
    #[error("invalid tEXt keyword {0:?}")]
    InvalidKeyword(String),

    /// A `tEXt` payload does not fit in a PNG chunk length field.
    #[error("text for keyword {keyword:?} is too long for a PNG chunk ({len} bytes)")]
    TextTooLong { keyword: String, len: usize },

    /// Inject was requested before anything was extracted.
    #[error("no metadata has been extracted yet")]
    EmptyCache,

    /// The EXIF adapter failed while writing the target image.
    #[error("EXIF adapter failed: {0:#}")]
    AdapterFailure(anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
