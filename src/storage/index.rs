//! Gallery index file format
//!
//! One record per line, `|`-separated:
//! `id|locator|created_at_millis|encoded_ocr_json|ocr_processed`.
//! The locator is percent-encoded so paths may contain the delimiter. The OCR
//! blob is a percent-encoded JSON array and is empty when no result is cached.
//! Ids never contain the delimiter or line breaks; the store rejects them.
//! Lines are joined with `\n` with no trailing newline.

use std::borrow::Cow;
use tracing::warn;

use super::gallery::GalleryImage;
use crate::vision::OcrResult;

/// Field separator
pub const DELIMITER: char = '|';

/// Whether `id` can be stored verbatim in an index line
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && !id.contains([DELIMITER, '\n', '\r'])
}

/// Serialize one record as an index line
pub fn encode_line(image: &GalleryImage) -> Result<String, serde_json::Error> {
    let blob = match &image.ocr_result {
        Some(results) => urlencoding::encode(&serde_json::to_string(results)?).into_owned(),
        None => String::new(),
    };

    Ok(format!(
        "{id}{d}{locator}{d}{ts}{d}{blob}{d}{processed}",
        id = image.id,
        locator = urlencoding::encode(&image.locator),
        ts = image.created_at,
        processed = image.ocr_processed,
        d = DELIMITER,
    ))
}

/// Serialize a whole collection in order
pub fn encode_index(images: &[GalleryImage]) -> Result<String, serde_json::Error> {
    let lines = images
        .iter()
        .map(encode_line)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(lines.join("\n"))
}

/// Parse one index line. Malformed lines yield `None`.
pub fn decode_line(line: &str) -> Option<GalleryImage> {
    let parts: Vec<&str> = line.split(DELIMITER).collect();
    if parts.len() < 3 {
        return None;
    }

    let id = parts[0];
    let locator = urlencoding::decode(parts[1]).ok()?;
    if id.is_empty() || locator.is_empty() {
        return None;
    }
    let created_at = parts[2].trim().parse::<i64>().ok()?;

    let mut ocr_processed = parts
        .get(4)
        .and_then(|s| s.trim().parse::<bool>().ok())
        .unwrap_or(false);

    let ocr_result = match parts.get(3).filter(|blob| !blob.is_empty()) {
        Some(blob) => match decode_blob(blob) {
            Some(results) => Some(results),
            None => {
                warn!("Discarding unreadable OCR cache for image {}", id);
                ocr_processed = false;
                None
            }
        },
        None => None,
    };

    Some(GalleryImage {
        id: id.to_string(),
        locator: locator.into_owned(),
        created_at,
        ocr_result,
        ocr_processed,
    })
}

/// Parse a whole index, skipping blank and malformed lines
pub fn decode_index(content: &str) -> Vec<GalleryImage> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let decoded = decode_line(line);
            if decoded.is_none() {
                warn!("Skipping malformed index line: {:?}", line);
            }
            decoded
        })
        .collect()
}

fn decode_blob(blob: &str) -> Option<Vec<OcrResult>> {
    // Form encoding writes spaces as '+'; a literal '+' is always "%2B".
    let blob: Cow<'_, str> = if blob.contains('+') {
        Cow::Owned(blob.replace('+', " "))
    } else {
        Cow::Borrowed(blob)
    };
    let json = urlencoding::decode(&blob).ok()?;
    serde_json::from_str(&json).ok()
}
