use anyhow::Result;
use img_parts::jpeg::{Jpeg, JpegSegment};
use img_parts::{Bytes, ImageEXIF};

use super::{ExifDirectory, is_tiff};

const MARKER_APP1: u8 = 0xE1;
const EXIF_PREFIX: &[u8] = b"Exif\0\0";

/// Write `exif` into a copy of `jpeg_bytes`, replacing any EXIF segment it has.
///
/// Every other segment is preserved byte for byte. The EXIF segment keeps the
/// target's original position, or goes right after APP0 when the target had
/// none, so it precedes any XMP APP1.
pub fn encode(exif: &ExifDirectory, jpeg_bytes: &[u8]) -> Result<Vec<u8>> {
    if !is_tiff(&exif.tiff) {
        anyhow::bail!("EXIF payload is not a TIFF structure");
    }

    let mut jpeg = Jpeg::from_bytes(Bytes::copy_from_slice(jpeg_bytes))
        .map_err(|e| anyhow::anyhow!("Failed to parse JPEG: {e}"))?;

    let orig_exif_pos = find_exif_segment_pos(jpeg.segments());
    jpeg.set_exif(Some(Bytes::from(exif.tiff.clone())));

    // set_exif() inserts at a fixed index, which may land after XMP.
    if let Some(new_pos) = find_exif_segment_pos(jpeg.segments()) {
        let target_pos = orig_exif_pos.unwrap_or(1);
        if target_pos < new_pos {
            let segments = jpeg.segments_mut();
            let seg = segments.remove(new_pos);
            segments.insert(target_pos, seg);
        }
    }

    let output = jpeg.encoder().bytes();
    log::debug!(
        "Wrote {} byte EXIF segment, output {} bytes",
        exif.tiff.len(),
        output.len()
    );
    Ok(output.to_vec())
}

/// Find the position of the EXIF APP1 segment.
fn find_exif_segment_pos(segments: &[JpegSegment]) -> Option<usize> {
    segments
        .iter()
        .position(|s| s.marker() == MARKER_APP1 && s.contents().starts_with(EXIF_PREFIX))
}
