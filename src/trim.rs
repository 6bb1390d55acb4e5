//! Trimmer/repairer — recover the tightest plausible file from a sampled
//! byte range.
//!
//! Each arm returns the smallest byte run that still parses as its type,
//! or `None` when no structural end can be recovered.  Trimming borrows
//! from the sample; only the JPEG arm ever synthesizes bytes (a missing
//! EOI marker is appended after stripping trailing zero padding), and only
//! then is `repaired` set.
//!
//! MP4 recovery is trimming only: the sample is cut at the end of the last
//! fully-parseable top-level box, and a candidate without at least one
//! `mdat` or `moov` box is not recoverable.

use std::borrow::Cow;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::validate::CarvedType;

/// A recovered byte run.  `bytes` borrows from the sample unless the
/// repairer had to synthesize a terminator.
#[derive(Debug)]
pub struct Trimmed<'a> {
    pub bytes:    Cow<'a, [u8]>,
    pub repaired: bool,
}

impl<'a> Trimmed<'a> {
    fn borrowed(bytes: &'a [u8]) -> Self {
        Self { bytes: Cow::Borrowed(bytes), repaired: false }
    }

    fn repaired(bytes: Vec<u8>) -> Self {
        Self { bytes: Cow::Owned(bytes), repaired: true }
    }
}

/// Offset of the first occurrence of `needle` at or after `from`.
fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| from + p)
}

/// Offset of the last occurrence of `needle` in `haystack`.
fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

/// Recover the tightest byte run of `ty` from `blob`, or `None`.
pub fn trim_or_repair(blob: &[u8], ty: CarvedType) -> Option<Trimmed<'_>> {
    match ty {
        CarvedType::Jpeg  => trim_jpeg(blob),
        CarvedType::Png   => trim_png(blob),
        CarvedType::Zip   => trim_zip(blob),
        CarvedType::Mp4   => trim_mp4(blob),
        CarvedType::Other => Some(Trimmed::borrowed(blob)),
    }
}

fn trim_jpeg(blob: &[u8]) -> Option<Trimmed<'_>> {
    let start = find(blob, &[0xFF, 0xD8], 0)?;

    if let Some(eoi) = find(blob, &[0xFF, 0xD9], start + 2) {
        return Some(Trimmed::borrowed(&blob[start..eoi + 2]));
    }

    // No EOI: strip trailing zero padding and close the image ourselves.
    let body = &blob[start..];
    let kept = body.iter().rposition(|&b| b != 0x00).map_or(0, |p| p + 1);
    let mut fixed = body[..kept].to_vec();
    fixed.extend_from_slice(&[0xFF, 0xD9]);
    Some(Trimmed::repaired(fixed))
}

fn trim_png(blob: &[u8]) -> Option<Trimmed<'_>> {
    let start = find(blob, &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A], 0)?;
    // IEND is followed by its 4-byte CRC; both must be inside the sample.
    let iend = find(blob, b"IEND", start + 8)?;
    let end = iend + 8;
    if end > blob.len() {
        return None;
    }
    Some(Trimmed::borrowed(&blob[start..end]))
}

fn trim_zip(blob: &[u8]) -> Option<Trimmed<'_>> {
    let start = find(blob, &[0x50, 0x4B, 0x03, 0x04], 0)?;
    // Bind to the last EOCD so nested/concatenated archives keep their
    // central directory.
    let eocd = rfind(blob, &[0x50, 0x4B, 0x05, 0x06]).filter(|&p| p > start)?;
    if eocd + 22 > blob.len() {
        return None;
    }
    let comment_len = LittleEndian::read_u16(&blob[eocd + 20..eocd + 22]) as usize;
    let end = eocd + 22 + comment_len;
    if end > blob.len() {
        // Comment runs past the sample; the record is cut mid-field.
        return None;
    }
    Some(Trimmed::borrowed(&blob[start..end]))
}

fn trim_mp4(blob: &[u8]) -> Option<Trimmed<'_>> {
    let ftyp = find(blob, b"ftyp", 0).filter(|&p| p >= 4)?;
    let start = ftyp - 4;

    // Walk top-level boxes, keeping everything that parses completely.
    let mut pos = start;
    let mut end = start;
    let mut has_media = false;
    while pos + 8 <= blob.len() {
        let size32 = BigEndian::read_u32(&blob[pos..pos + 4]);
        let box_type = &blob[pos + 4..pos + 8];
        let box_end = match size32 {
            0 => blob.len(),
            1 => {
                if pos + 16 > blob.len() {
                    break;
                }
                let size64 = BigEndian::read_u64(&blob[pos + 8..pos + 16]) as usize;
                if size64 < 16 {
                    break;
                }
                pos + size64
            }
            s if (s as usize) < 8 => break,
            s => pos + s as usize,
        };
        if box_end > blob.len() {
            break;
        }
        if box_type == b"mdat" || box_type == b"moov" {
            has_media = true;
        }
        end = box_end;
        pos = box_end;
    }

    if !has_media || end <= start {
        return None;
    }
    Some(Trimmed::borrowed(&blob[start..end]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cyclic(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 255) as u8).collect()
    }

    #[test]
    fn jpeg_trims_to_first_eoi() {
        let mut blob = vec![0xFF, 0xD8, 0xFF, 0xDB];
        blob.extend(cyclic(512));
        blob.extend_from_slice(&[0xFF, 0xD9]);
        blob.extend(cyclic(4096)); // slack after the image

        let t = trim_or_repair(&blob, CarvedType::Jpeg).unwrap();
        assert!(!t.repaired);
        assert_eq!(t.bytes.len(), 518);
        assert!(t.bytes.ends_with(&[0xFF, 0xD9]));
    }

    #[test]
    fn jpeg_repair_strips_zeros_and_appends_eoi() {
        let mut blob = vec![0xFF, 0xD8, 0xFF];
        blob.extend((0..1200u32).map(|i| (i % 254) as u8 + 1));
        blob.extend_from_slice(&[0u8; 2048]);

        let t = trim_or_repair(&blob, CarvedType::Jpeg).unwrap();
        assert!(t.repaired);
        assert_eq!(t.bytes.len(), 1203 + 2);
        assert!(t.bytes.ends_with(&[0xFF, 0xD9]));
    }

    #[test]
    fn jpeg_without_soi_is_unrecoverable() {
        assert!(trim_or_repair(&cyclic(64), CarvedType::Jpeg).is_none());
    }

    #[test]
    fn png_trims_through_iend_crc() {
        let mut blob = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        blob.extend_from_slice(&13u32.to_be_bytes());
        blob.extend_from_slice(b"IHDR");
        blob.extend_from_slice(&[0u8; 13 + 4]);
        blob.extend_from_slice(&0u32.to_be_bytes());
        blob.extend_from_slice(b"IEND");
        blob.extend_from_slice(&[0xAE, 0x42, 0x60, 0x82]);
        let png_len = blob.len();
        blob.extend(cyclic(1024));

        let t = trim_or_repair(&blob, CarvedType::Png).unwrap();
        assert!(!t.repaired);
        assert_eq!(t.bytes.len(), png_len);
    }

    #[test]
    fn png_without_iend_is_unrecoverable() {
        let mut blob = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        blob.extend(cyclic(256));
        assert!(trim_or_repair(&blob, CarvedType::Png).is_none());
    }

    #[test]
    fn zip_trims_through_eocd_and_comment() {
        let zip = crate::validate::testdata::tiny_zip();
        let mut blob = zip.clone();
        blob.extend(cyclic(2048));

        let t = trim_or_repair(&blob, CarvedType::Zip).unwrap();
        assert!(!t.repaired);
        assert_eq!(t.bytes.as_ref(), zip.as_slice());
    }

    #[test]
    fn zip_with_truncated_comment_is_unrecoverable() {
        let mut zip = crate::validate::testdata::tiny_zip();
        let len = zip.len();
        zip[len - 2] = 50; // declare a 50-byte comment that is not there
        assert!(trim_or_repair(&zip, CarvedType::Zip).is_none());
    }

    #[test]
    fn mp4_trims_to_last_complete_box() {
        let mut blob = crate::validate::testdata::tiny_mp4();
        let good_len = blob.len();
        // A trailing box whose declared size overruns the sample.
        blob.extend_from_slice(&9999u32.to_be_bytes());
        blob.extend_from_slice(b"free");
        blob.extend(cyclic(16));

        let t = trim_or_repair(&blob, CarvedType::Mp4).unwrap();
        assert!(!t.repaired);
        assert_eq!(t.bytes.len(), good_len);
    }

    #[test]
    fn mp4_without_media_boxes_is_unrecoverable() {
        let mut blob = Vec::new();
        blob.extend_from_slice(&16u32.to_be_bytes());
        blob.extend_from_slice(b"ftyp");
        blob.extend_from_slice(b"isom");
        blob.extend_from_slice(&0x200u32.to_be_bytes());
        blob.extend_from_slice(&16u32.to_be_bytes());
        blob.extend_from_slice(b"free");
        blob.extend_from_slice(&[0u8; 8]);
        assert!(trim_or_repair(&blob, CarvedType::Mp4).is_none());
    }

    #[test]
    fn unknown_types_pass_through_untouched() {
        let blob = cyclic(128);
        let t = trim_or_repair(&blob, CarvedType::Other).unwrap();
        assert!(!t.repaired);
        assert_eq!(t.bytes.as_ref(), blob.as_slice());
    }
}
