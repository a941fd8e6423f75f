use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::exif::ExifDirectory;
use crate::png::TextEntry;

/// The declared type of an image file.
///
/// Callers declare the type (from a file extension or MIME type); the codecs
/// then verify the signature themselves.
///
/// # Example
///
/// ```rust
/// use genmeta::metadata::ImageKind;
/// use std::path::Path;
///
/// assert_eq!(ImageKind::from_path(Path::new("out.PNG")), Some(ImageKind::Png));
/// assert_eq!(ImageKind::from_mime("image/jpeg"), Some(ImageKind::Jpeg));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Png,
    Jpeg,
    /// Recognized only so it can be rejected explicitly.
    WebP,
}

impl ImageKind {
    /// Determine the image kind from a file path extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Determine the image kind from a MIME type such as `image/png`.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_lowercase().as_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Png => "PNG",
            Self::Jpeg => "JPEG",
            Self::WebP => "WebP",
        })
    }
}

/// Generation metadata taken from a source image, tagged by source format.
///
/// Serializes as `{"format": "png", "entries": [...]}` or
/// `{"format": "jpg", "exif": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format")]
pub enum Metadata {
    /// Recognized `tEXt` entries, in file order.
    #[serde(rename = "png")]
    Png { entries: Vec<TextEntry> },
    /// The EXIF directory of a JPEG.
    #[serde(rename = "jpg")]
    Jpeg { exif: ExifDirectory },
}

impl Metadata {
    /// The image kind this metadata can be injected into.
    pub fn kind(&self) -> ImageKind {
        match self {
            Self::Png { .. } => ImageKind::Png,
            Self::Jpeg { .. } => ImageKind::Jpeg,
        }
    }

    /// One-line description for status output.
    pub fn summary(&self) -> String {
        match self {
            Self::Png { entries } => {
                let keys: Vec<&str> = entries.iter().map(|e| e.keyword.as_str()).collect();
                format!("PNG text: {}", keys.join(", "))
            }
            Self::Jpeg { exif } => format!("JPEG EXIF: {} tag(s)", exif.tag_count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_path() {
        assert_eq!(ImageKind::from_path(Path::new("a.png")), Some(ImageKind::Png));
        assert_eq!(ImageKind::from_path(Path::new("a.JPG")), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::from_path(Path::new("a.jpeg")), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::from_path(Path::new("a.webp")), Some(ImageKind::WebP));
        assert_eq!(ImageKind::from_path(Path::new("a.gif")), None);
        assert_eq!(ImageKind::from_path(Path::new("noext")), None);
    }

    #[test]
    fn kind_from_mime() {
        assert_eq!(ImageKind::from_mime("image/png"), Some(ImageKind::Png));
        assert_eq!(ImageKind::from_mime("IMAGE/JPEG"), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::from_mime("image/webp"), Some(ImageKind::WebP));
        assert_eq!(ImageKind::from_mime("text/plain"), None);
    }

    #[test]
    fn png_metadata_json_shape() {
        let meta = Metadata::Png {
            entries: vec![TextEntry::new("parameters", "steps: 20")],
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["format"], "png");
        assert_eq!(json["entries"][0]["keyword"], "parameters");

        let back: Metadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, meta);
        assert_eq!(back.kind(), ImageKind::Png);
    }

    #[test]
    fn summary_lists_keywords() {
        let meta = Metadata::Png {
            entries: vec![TextEntry::new("prompt", "{}"), TextEntry::new("workflow", "{}")],
        };
        assert_eq!(meta.summary(), "PNG text: prompt, workflow");
    }
}
