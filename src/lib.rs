//! # genmeta
//!
//! Carry AI generation metadata from an original image into an edited copy.
//!
//! Image generators record their settings inside the file: A1111-style tools
//! write a `parameters` text chunk, ComfyUI writes `prompt` and `workflow`,
//! and JPEG exports keep them in EXIF. Editing the image in another program
//! usually drops all of it. This crate extracts that metadata from the
//! original, holds it in a single-slot cache, and writes it back into the
//! edited image.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use genmeta::config::Config;
//! use genmeta::metadata::ImageKind;
//! use genmeta::pipeline::Session;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(Some("config.json".as_ref()))?;
//!     let session = Session::new(&config);
//!
//!     let original = std::fs::read("original.png")?;
//!     match session.extract(&original, ImageKind::Png).await? {
//!         Some(metadata) => println!("Found {}", metadata.summary()),
//!         None => return Ok(()),
//!     }
//!
//!     let edited = std::fs::read("edited.png")?;
//!     let processed = session.inject(&edited, ImageKind::Png, "edited.png").await?;
//!     std::fs::write(&processed.file_name, &processed.bytes)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Lower-Level Usage
//!
//! The PNG chunk codec works on plain byte slices:
//!
//! ```rust
//! use genmeta::png::{self, TextEntry};
//!
//! # fn demo(png_bytes: &[u8]) -> genmeta::Result<()> {
//! let entries = vec![TextEntry::new("parameters", "masterpiece, Steps: 20")];
//! let tagged = png::inject_text(png_bytes, &entries)?;
//! assert_eq!(png::extract_text(&tagged)?, Some(entries));
//! # Ok(())
//! # }
//! ```
//!
//! ## Supported Formats
//!
//! | Format | Metadata carried |
//! |--------|------------------|
//! | PNG (`.png`) | `tEXt` chunks with a recognized keyword |
//! | JPEG (`.jpg`, `.jpeg`) | The whole EXIF segment |
//! | WebP (`.webp`) | Recognized, always rejected |
//!
//! ## Modules
//!
//! - [`png`]: chunk walking, CRC-32, `tEXt` extraction and injection
//! - [`exif`]: JPEG EXIF backend behind the [`exif::ExifAdapter`] trait
//! - [`metadata`]: image kinds and the tagged [`Metadata`] value
//! - [`pipeline`]: format dispatch, the metadata cache and [`Session`]
//! - [`config`]: configuration loading and saving
//! - [`error`]: the crate error type

pub mod config;
pub mod error;
pub mod exif;
pub mod metadata;
pub mod pipeline;
pub mod png;

pub use error::{Error, Result};
pub use metadata::{ImageKind, Metadata};
pub use pipeline::Session;
pub use png::TextEntry;
