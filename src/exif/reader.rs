use anyhow::{Context, Result};
use img_parts::jpeg::Jpeg;
use img_parts::{Bytes, ImageEXIF};
use nom_exif::{EntryValue, Exif, ExifIter, ExifTag, MediaParser, MediaSource};
use std::io::Cursor;

use super::{ExifDirectory, is_tiff};

/// Read the EXIF directory of a JPEG.
///
/// Fails when the bytes are not a JPEG, carry no EXIF segment, or the
/// segment is not a TIFF structure. Callers on the extract path treat every
/// failure as "no metadata". Tags nom-exif cannot read only leave the
/// descriptive fields empty; the payload is still carried over.
pub fn decode(jpeg_bytes: &[u8]) -> Result<ExifDirectory> {
    let jpeg = Jpeg::from_bytes(Bytes::copy_from_slice(jpeg_bytes))
        .map_err(|e| anyhow::anyhow!("Failed to parse JPEG: {e}"))?;
    let tiff = jpeg.exif().context("JPEG has no EXIF segment")?;
    if !is_tiff(&tiff) {
        anyhow::bail!("EXIF segment is not a TIFF structure");
    }

    let mut dir = ExifDirectory {
        tiff: tiff.to_vec(),
        tag_count: 0,
        user_comment: None,
        image_description: None,
    };

    let mut parser = MediaParser::new();
    let ms = MediaSource::seekable(Cursor::new(jpeg_bytes.to_vec()))
        .context("Failed to open JPEG for EXIF parsing")?;
    let iter: ExifIter = match parser.parse(ms) {
        Ok(iter) => iter,
        Err(e) => {
            log::debug!("nom-exif could not read EXIF, keeping raw payload: {e}");
            return Ok(dir);
        }
    };

    // Entries of IFD0 and its Exif/GPS sub-IFDs, pointer entries included
    dir.tag_count = iter
        .clone_and_rewind()
        .filter(|entry| entry.ifd_index() == 0)
        .count();

    let exif: Exif = iter.into();
    dir.image_description = exif.get(ExifTag::ImageDescription).and_then(entry_to_string);
    dir.user_comment = exif
        .get(ExifTag::UserComment)
        .and_then(|val| user_comment_to_string(val, dir.tiff.starts_with(b"MM")));

    log::debug!(
        "Decoded EXIF: {} tag(s), {} payload bytes",
        dir.tag_count,
        dir.tiff.len()
    );
    Ok(dir)
}

/// Convert an EntryValue to an Option<String>.
fn entry_to_string(val: &EntryValue) -> Option<String> {
    let s = val.to_string();
    let s = s.trim_end_matches('\0').trim().trim_matches('"').to_string();
    if s.is_empty() { None } else { Some(s) }
}

/// UserComment is UNDEFINED: an 8-byte character code followed by text.
/// Some writers store it as plain ASCII instead.
fn user_comment_to_string(val: &EntryValue, big_endian: bool) -> Option<String> {
    let EntryValue::Undefined(raw) = val else {
        return entry_to_string(val);
    };
    if raw.len() < 8 {
        return None;
    }
    let (code, body) = raw.split_at(8);
    let text = match code {
        b"UNICODE\0" => decode_utf16(body, big_endian),
        // ASCII, undefined and anything else: treat as UTF-8
        _ => String::from_utf8_lossy(body).into_owned(),
    };
    let text = text.trim_end_matches('\0').trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Writers disagree on the byte order of UNICODE comments; sniff it from the
/// first code unit and fall back to the TIFF byte order.
fn decode_utf16(body: &[u8], big_endian: bool) -> String {
    let be = match body {
        [0, b, ..] if *b != 0 => true,
        [b, 0, ..] if *b != 0 => false,
        _ => big_endian,
    };
    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|p| {
            if be {
                u16::from_be_bytes([p[0], p[1]])
            } else {
                u16::from_le_bytes([p[0], p[1]])
            }
        })
        .collect();
    String::from_utf16_lossy(&units)
}
