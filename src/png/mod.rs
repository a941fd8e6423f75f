//! PNG chunk reader and `tEXt` writer.
//!
//! A PNG file is an 8-byte signature followed by chunks. Each chunk is laid
//! out as:
//!
//! ```text
//! [length: u32 BE][type: 4 ASCII bytes][data: `length` bytes][crc: u32 BE]
//! ```
//!
//! where the CRC covers `type ++ data`. Generation tools store their settings
//! in uncompressed `tEXt` chunks whose data is `keyword ++ 0x00 ++ text`:
//! A1111-style tools use `parameters`, node-graph tools use `prompt` and
//! `workflow`.
//!
//! Reading tolerates bad CRCs and a truncated tail. Writing always emits
//! correct CRCs and never touches the input buffer.

mod crc;

pub use crc::crc32;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::metadata::ImageKind;

/// The fixed 8-byte PNG signature.
pub const SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Chunk type of uncompressed Latin-1/UTF-8 text.
pub const TEXT_CHUNK: &[u8; 4] = b"tEXt";

/// Keywords that carry generation metadata.
pub const RECOGNIZED_KEYWORDS: [&str; 3] = ["parameters", "prompt", "workflow"];

// length + type + crc
const CHUNK_OVERHEAD: usize = 12;

// PNG limits chunk data length to 2^31 - 1.
const MAX_CHUNK_DATA: usize = i32::MAX as usize;

/// One keyword/text pair of a `tEXt` chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEntry {
    pub keyword: String,
    pub text: String,
}

impl TextEntry {
    pub fn new(keyword: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            text: text.into(),
        }
    }

    /// Length of the chunk data: keyword, separator, text.
    fn data_len(&self) -> usize {
        self.keyword.len() + 1 + self.text.len()
    }

    /// Length of the complete encoded chunk.
    pub fn chunk_len(&self) -> usize {
        CHUNK_OVERHEAD + self.data_len()
    }

    fn validate(&self) -> Result<()> {
        self.validate_within(MAX_CHUNK_DATA)
    }

    fn validate_within(&self, max_data: usize) -> Result<()> {
        if self.keyword.is_empty() || self.keyword.contains('\0') {
            return Err(Error::InvalidKeyword(self.keyword.clone()));
        }
        if self.data_len() > max_data {
            return Err(Error::TextTooLong {
                keyword: self.keyword.clone(),
                len: self.text.len(),
            });
        }
        Ok(())
    }

    /// Append this entry as a complete `tEXt` chunk.
    fn write_chunk(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.data_len() as u32).to_be_bytes());
        let crc_start = out.len();
        out.extend_from_slice(TEXT_CHUNK);
        out.extend_from_slice(self.keyword.as_bytes());
        out.push(0);
        out.extend_from_slice(self.text.as_bytes());
        let crc = crc32(&out[crc_start..]);
        out.extend_from_slice(&crc.to_be_bytes());
    }

    /// Split `tEXt` data at the first NUL. `None` when there is no separator.
    fn parse(data: &[u8]) -> Option<Self> {
        let nul = data.iter().position(|&b| b == 0)?;
        Some(Self {
            keyword: String::from_utf8_lossy(&data[..nul]).into_owned(),
            text: String::from_utf8_lossy(&data[nul + 1..]).into_owned(),
        })
    }
}

/// A chunk borrowed from a PNG byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PngChunk<'a> {
    /// Offset of the length field within the file.
    pub offset: usize,
    pub kind: [u8; 4],
    pub data: &'a [u8],
    /// CRC as stored in the file, not recomputed.
    pub crc: u32,
}

impl PngChunk<'_> {
    /// The chunk type as text, e.g. `IHDR`.
    pub fn kind_str(&self) -> String {
        String::from_utf8_lossy(&self.kind).into_owned()
    }

    /// Whether the stored CRC matches `type ++ data`.
    pub fn crc_matches(&self) -> bool {
        crc::chunk_crc(&self.kind, self.data) == self.crc
    }

    /// Bytes this chunk occupies in the file.
    pub fn total_len(&self) -> usize {
        CHUNK_OVERHEAD + self.data.len()
    }
}

/// Iterator over the chunks following the signature.
///
/// Stops at the end of the buffer. A chunk whose declared length runs past the
/// end ends iteration with a warning instead of reading out of bounds.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = PngChunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.bytes.len() {
            return None;
        }
        let offset = self.offset;
        let Some(chunk) = read_chunk(self.bytes, offset) else {
            log::warn!("Truncated PNG chunk at offset {offset}, ignoring the rest of the file");
            self.offset = self.bytes.len();
            return None;
        };
        self.offset += chunk.total_len();
        Some(chunk)
    }
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let raw: [u8; 4] = bytes.get(at..at.checked_add(4)?)?.try_into().ok()?;
    Some(u32::from_be_bytes(raw))
}

fn read_chunk(bytes: &[u8], offset: usize) -> Option<PngChunk<'_>> {
    let length = read_u32(bytes, offset)? as usize;
    let kind: [u8; 4] = bytes.get(offset + 4..offset + 8)?.try_into().ok()?;
    let data_start = offset + 8;
    let data_end = data_start.checked_add(length)?;
    let data = bytes.get(data_start..data_end)?;
    let crc = read_u32(bytes, data_end)?;
    Some(PngChunk {
        offset,
        kind,
        data,
        crc,
    })
}

fn check_signature(bytes: &[u8]) -> Result<()> {
    if bytes.starts_with(&SIGNATURE) {
        Ok(())
    } else {
        Err(Error::InvalidFormat(ImageKind::Png))
    }
}

/// Iterate the chunks of a PNG file after validating its signature.
pub fn chunks(bytes: &[u8]) -> Result<Chunks<'_>> {
    check_signature(bytes)?;
    Ok(Chunks {
        bytes,
        offset: SIGNATURE.len(),
    })
}

/// Collect the recognized `tEXt` entries of a PNG file, in file order.
///
/// Returns `Ok(None)` when the file has none.
///
/// Keyword and text are decoded as UTF-8 with invalid sequences replaced by
/// U+FFFD. Latin-1 text outside ASCII therefore does not survive a round trip
/// through [`inject_text`] byte for byte.
pub fn extract_text(bytes: &[u8]) -> Result<Option<Vec<TextEntry>>> {
    extract_text_with(bytes, &RECOGNIZED_KEYWORDS)
}

/// Like [`extract_text`] with a caller-supplied keyword set.
pub fn extract_text_with<S: AsRef<str>>(
    bytes: &[u8],
    keywords: &[S],
) -> Result<Option<Vec<TextEntry>>> {
    let mut entries = Vec::new();

    for chunk in chunks(bytes)? {
        if chunk.kind != *TEXT_CHUNK {
            continue;
        }
        if !chunk.crc_matches() {
            log::warn!("tEXt chunk at offset {} has a bad CRC, reading it anyway", chunk.offset);
        }
        let Some(entry) = TextEntry::parse(chunk.data) else {
            log::debug!("Skipping tEXt chunk without separator at offset {}", chunk.offset);
            continue;
        };
        if keywords.iter().any(|k| k.as_ref() == entry.keyword) {
            log::debug!("Found '{}' ({} bytes)", entry.keyword, entry.text.len());
            entries.push(entry);
        }
    }

    if entries.is_empty() {
        Ok(None)
    } else {
        Ok(Some(entries))
    }
}

/// Insert `entries` as `tEXt` chunks directly after the header chunk.
///
/// The header chunk is trusted to be `IHDR`. Existing `tEXt` chunks are left
/// in place, so injecting a keyword that is already present yields a
/// duplicate.
pub fn inject_text(bytes: &[u8], entries: &[TextEntry]) -> Result<Vec<u8>> {
    check_signature(bytes)?;
    for entry in entries {
        entry.validate()?;
    }

    let header = read_chunk(bytes, SIGNATURE.len()).ok_or(Error::InvalidFormat(ImageKind::Png))?;
    let header_end = header.offset + header.total_len();

    let extra: usize = entries.iter().map(TextEntry::chunk_len).sum();
    let mut out = Vec::with_capacity(bytes.len() + extra);
    out.extend_from_slice(&bytes[..header_end]);
    for entry in entries {
        entry.write_chunk(&mut out);
    }
    out.extend_from_slice(&bytes[header_end..]);

    log::debug!(
        "Inserted {} tEXt chunk(s), {} bytes, after {}",
        entries.len(),
        extra,
        header.kind_str()
    );
    Ok(out)
}
