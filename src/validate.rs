//! False-positive rejection — the entropy gate and the per-type structural
//! validators.
//!
//! # Entropy gate
//!
//! Shannon entropy over the byte-frequency distribution of the sampled
//! blob.  Runs of zeroes or regular padding that happen to contain a magic
//! sequence score far below the 3.0 threshold; real image/container data
//! scores 6–8.
//!
//! # Structural validators
//!
//! Each carveable type gets a strict walk of its container structure and a
//! `tolerant` mode that accepts truncated-but-plausible blobs so the
//! repairer can have a go at them.  Validators are pure functions over the
//! sampled bytes; dispatch is a tagged enum keyed by the signature's type
//! name, and unknown names are accepted as-is.
//!
//! Verification order inside each validator is cheapest-first: magic
//! bytes, then fixed fields, then the full walk.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Entropy acceptance threshold, in bits per byte.
pub const ENTROPY_THRESHOLD: f64 = 3.0;

/// Shannon entropy of the byte distribution of `data`; 0.0 for an empty
/// buffer, 8.0 for uniformly distributed bytes.
pub fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut counts = [0u64; 256];
    for &b in data {
        counts[b as usize] += 1;
    }
    let len = data.len() as f64;
    let mut entropy = 0.0;
    for &count in counts.iter().filter(|&&c| c > 0) {
        let p = count as f64 / len;
        entropy -= p * p.log2();
    }
    entropy
}

/// Accepts iff the blob's entropy exceeds `threshold`.
#[inline]
pub fn check_entropy(data: &[u8], threshold: f64) -> bool {
    shannon_entropy(data) > threshold
}

// ── Type dispatch ────────────────────────────────────────────────────────────

/// Structural family of a registered signature, derived from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarvedType {
    Jpeg,
    Png,
    Mp4,
    /// ZIP containers, including ZIP-derived formats such as DOCX.
    Zip,
    /// No structural rules known; always accepted.
    Other,
}

impl CarvedType {
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "JPEG" | "JPG"  => CarvedType::Jpeg,
            "PNG"           => CarvedType::Png,
            "MP4"           => CarvedType::Mp4,
            "ZIP" | "DOCX"  => CarvedType::Zip,
            _               => CarvedType::Other,
        }
    }
}

/// Structural validation for a sampled blob.
///
/// `tolerant` accepts truncated-but-plausible candidates (the repairer's
/// feedstock); strict mode demands a complete, well-terminated container.
pub fn validate_structure(blob: &[u8], ty: CarvedType, tolerant: bool) -> bool {
    match ty {
        CarvedType::Jpeg  => validate_jpeg(blob, tolerant),
        CarvedType::Png   => validate_png(blob, tolerant),
        CarvedType::Mp4   => validate_mp4(blob, tolerant),
        CarvedType::Zip   => validate_zip(blob, tolerant),
        CarvedType::Other => true,
    }
}

// ── JPEG ─────────────────────────────────────────────────────────────────────

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];
/// SOF0, SOF2, DQT — at least one must appear in a decodable image.
const JPEG_MARKERS: [[u8; 2]; 3] = [[0xFF, 0xC0], [0xFF, 0xC2], [0xFF, 0xDB]];

fn validate_jpeg(blob: &[u8], tolerant: bool) -> bool {
    if !blob.starts_with(&JPEG_SOI) {
        return false;
    }
    // Tolerant mode only needs the SOI; a truncated body may have lost
    // every other marker and still be worth repairing.
    if tolerant {
        return true;
    }

    let has_marker = JPEG_MARKERS
        .iter()
        .any(|m| blob.windows(2).any(|w| w == m));
    if !has_marker {
        return false;
    }

    // Carved samples routinely drag in trailing zero padding; the EOI
    // check applies to the unpadded image.
    let trimmed_len = blob.iter().rposition(|&b| b != 0x00).map_or(0, |p| p + 1);
    blob[..trimmed_len].ends_with(&JPEG_EOI)
}

// ── PNG ──────────────────────────────────────────────────────────────────────

const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

fn validate_png(blob: &[u8], tolerant: bool) -> bool {
    if !blob.starts_with(&PNG_SIGNATURE) {
        return false;
    }

    // Chunk stream: length:u32-BE | type:4 | data | crc:u32-BE, where the
    // CRC covers type || data.
    let mut pos = PNG_SIGNATURE.len();
    while pos + 8 <= blob.len() {
        let length = BigEndian::read_u32(&blob[pos..pos + 4]) as usize;
        let chunk_type = &blob[pos + 4..pos + 8];
        let data_end = pos + 8 + length;
        let chunk_end = data_end + 4;

        if chunk_end > blob.len() {
            // Truncated mid-chunk; nothing after this is walkable.
            return false;
        }

        if !tolerant {
            let mut hasher = crc32fast::Hasher::new();
            hasher.update(&blob[pos + 4..data_end]);
            let stored = BigEndian::read_u32(&blob[data_end..chunk_end]);
            if hasher.finalize() != stored {
                return false;
            }
        }

        if chunk_type == b"IEND" {
            // Strict: the walk must consume the sample exactly.
            return tolerant || chunk_end == blob.len();
        }
        pos = chunk_end;
    }
    false
}

// ── MP4 / ISO-BMFF ───────────────────────────────────────────────────────────

/// Parsed size of the box starting at `pos`, or `None` when the header
/// itself is malformed.  `(header_len, box_end)`; a size-0 box runs to the
/// end of the stream.
fn mp4_box_at(blob: &[u8], pos: usize) -> Option<(usize, usize)> {
    if pos + 8 > blob.len() {
        return None;
    }
    let size32 = BigEndian::read_u32(&blob[pos..pos + 4]);
    match size32 {
        0 => Some((8, blob.len())),
        1 => {
            if pos + 16 > blob.len() {
                return None;
            }
            let size64 = BigEndian::read_u64(&blob[pos + 8..pos + 16]) as usize;
            if size64 < 16 {
                return None;
            }
            pos.checked_add(size64).map(|end| (16, end))
        }
        s if (s as usize) < 8 => None,
        s => pos.checked_add(s as usize).map(|end| (8, end)),
    }
}

fn validate_mp4(blob: &[u8], tolerant: bool) -> bool {
    // First box must be ftyp with a sane header.
    let (header_len, first_end) = match mp4_box_at(blob, 0) {
        Some(b) => b,
        None => return false,
    };
    if blob.len() < header_len + 4 || &blob[4..8] != b"ftyp" {
        return false;
    }
    // Major brand sits right after the box header and must carry a value.
    let brand_end = header_len + 4;
    if first_end < brand_end || blob[header_len..brand_end] == [0, 0, 0, 0] {
        return false;
    }
    if first_end > blob.len() {
        // ftyp declares more bytes than the sample holds.
        return tolerant;
    }

    // Walk the remaining top-level boxes.
    let mut pos = first_end;
    while pos < blob.len() {
        let (_, end) = match mp4_box_at(blob, pos) {
            Some(b) => b,
            // Partial trailing box header.
            None => return tolerant,
        };
        if end > blob.len() {
            // Declared size overruns the sample.
            return tolerant;
        }
        if &blob[pos + 4..pos + 8] == b"ftyp" && !tolerant {
            // A second ftyp means two concatenated files.
            return false;
        }
        pos = end;
    }
    true
}

// ── ZIP / DOCX ───────────────────────────────────────────────────────────────

const ZIP_LOCAL_HEADER:   [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
const ZIP_CENTRAL_HEADER: [u8; 4] = [0x50, 0x4B, 0x01, 0x02];
const ZIP_EOCD:           [u8; 4] = [0x50, 0x4B, 0x05, 0x06];

/// Fixed EOCD length excluding the trailing comment.
const ZIP_EOCD_LEN: usize = 22;
/// EOCD search span: fixed record plus the maximum 65 535-byte comment.
const ZIP_EOCD_SEARCH: usize = ZIP_EOCD_LEN + u16::MAX as usize;

/// Offset of the last occurrence of `needle` in `haystack`.
fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

/// Parsed End-Of-Central-Directory record.
struct Eocd {
    pos:           usize,
    disk_no:       u16,
    cd_start_disk: u16,
    entries_disk:  u16,
    total_entries: u16,
    cd_size:       u32,
    cd_offset:     u32,
    comment_len:   u16,
}

fn find_eocd(blob: &[u8]) -> Option<Eocd> {
    let tail_start = blob.len().saturating_sub(ZIP_EOCD_SEARCH);
    let pos = tail_start + rfind(&blob[tail_start..], &ZIP_EOCD)?;
    if pos + ZIP_EOCD_LEN > blob.len() {
        return None;
    }
    let r = &blob[pos..];
    Some(Eocd {
        pos,
        disk_no:       LittleEndian::read_u16(&r[4..6]),
        cd_start_disk: LittleEndian::read_u16(&r[6..8]),
        entries_disk:  LittleEndian::read_u16(&r[8..10]),
        total_entries: LittleEndian::read_u16(&r[10..12]),
        cd_size:       LittleEndian::read_u32(&r[12..16]),
        cd_offset:     LittleEndian::read_u32(&r[16..20]),
        comment_len:   LittleEndian::read_u16(&r[20..22]),
    })
}

/// Walk central-directory entries, verifying each one's local header.
/// Returns the number of entries that walked cleanly.
fn walk_central_directory(blob: &[u8], eocd: &Eocd) -> u16 {
    let cd_end = eocd.pos;
    let mut pos = eocd.cd_offset as usize;
    let mut walked: u16 = 0;

    while walked < eocd.total_entries && pos + 46 <= cd_end {
        if blob[pos..pos + 4] != ZIP_CENTRAL_HEADER {
            break;
        }
        let name_len    = LittleEndian::read_u16(&blob[pos + 28..pos + 30]) as usize;
        let extra_len   = LittleEndian::read_u16(&blob[pos + 30..pos + 32]) as usize;
        let comment_len = LittleEndian::read_u16(&blob[pos + 32..pos + 34]) as usize;
        let local_off   = LittleEndian::read_u32(&blob[pos + 42..pos + 46]) as usize;

        // Every entry must point back at a real local file header.
        if local_off + 4 > blob.len() || blob[local_off..local_off + 4] != ZIP_LOCAL_HEADER {
            break;
        }

        pos += 46 + name_len + extra_len + comment_len;
        walked += 1;
    }
    walked
}

/// Note: only the classic EOCD record is recognized; ZIP64 EOCD-locator
/// records are not parsed in either mode.
fn validate_zip(blob: &[u8], tolerant: bool) -> bool {
    let eocd = match find_eocd(blob) {
        Some(e) => e,
        None => return false,
    };

    let eocd_end = eocd.pos + ZIP_EOCD_LEN + eocd.comment_len as usize;
    let cd_fits = (eocd.cd_offset as u64 + eocd.cd_size as u64) <= eocd.pos as u64;
    if eocd_end > blob.len()
        || !cd_fits
        || eocd.disk_no != 0
        || eocd.cd_start_disk != 0
        || eocd.entries_disk != eocd.total_entries
    {
        return false;
    }

    if tolerant {
        return true;
    }
    walk_central_directory(blob, &eocd) == eocd.total_entries
}


#[cfg(test)]
mod tests {
    use super::testdata::{noise, tiny_mp4, tiny_png, tiny_zip};
    use super::*;

    // ── Entropy gate ─────────────────────────────────────────────────────

    #[test]
    fn entropy_rejects_zero_runs() {
        assert!(!check_entropy(&[0u8; 4096], ENTROPY_THRESHOLD));
    }

    #[test]
    fn entropy_accepts_uniform_noise() {
        assert!(check_entropy(&noise(4096, 7), ENTROPY_THRESHOLD));
    }

    #[test]
    fn entropy_of_empty_buffer_is_zero() {
        assert_eq!(shannon_entropy(&[]), 0.0);
    }

    #[test]
    fn entropy_of_single_value_is_zero() {
        assert_eq!(shannon_entropy(&[0x41u8; 128]), 0.0);
    }

    #[test]
    fn entropy_of_uniform_distribution_is_eight() {
        let all: Vec<u8> = (0..=255u8).collect();
        assert!((shannon_entropy(&all) - 8.0).abs() < 1e-9);
    }

    // ── JPEG ─────────────────────────────────────────────────────────────

    #[test]
    fn jpeg_strict_accepts_terminated_image() {
        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0];
        jpeg.extend_from_slice(&[0xFF, 0xDB]);
        jpeg.extend_from_slice(&noise(256, 3));
        jpeg.extend_from_slice(&[0xFF, 0xD9]);
        assert!(validate_jpeg(&jpeg, false));
    }

    #[test]
    fn jpeg_strict_ignores_trailing_zero_padding() {
        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xDB];
        jpeg.extend_from_slice(&[0xFF, 0xD9]);
        jpeg.extend_from_slice(&[0u8; 64]);
        assert!(validate_jpeg(&jpeg, false));
    }

    #[test]
    fn jpeg_strict_rejects_missing_eoi() {
        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xDB];
        jpeg.extend_from_slice(&noise(128, 5));
        jpeg.push(0x00);
        assert!(!validate_jpeg(&jpeg, false));
    }

    #[test]
    fn jpeg_strict_rejects_missing_markers() {
        // SOI and EOI but no SOF/DQT in between (filler avoids 0xFF).
        let mut jpeg = vec![0xFF, 0xD8];
        jpeg.extend((0..128u32).map(|i| (i % 255) as u8));
        jpeg.extend_from_slice(&[0xFF, 0xD9]);
        assert!(!validate_jpeg(&jpeg, false));
    }

    #[test]
    fn jpeg_tolerant_needs_only_the_soi() {
        assert!(validate_jpeg(&[0xFF, 0xD8, 0x01, 0x02], true));
        assert!(!validate_jpeg(&[0xFF, 0xD9, 0x01, 0x02], true));
    }

    // ── PNG ──────────────────────────────────────────────────────────────

    #[test]
    fn png_strict_accepts_exact_chunk_stream() {
        assert!(validate_png(&tiny_png(), false));
    }

    #[test]
    fn png_strict_rejects_trailing_slack() {
        let mut png = tiny_png();
        png.extend_from_slice(&[0xAA; 16]);
        assert!(!validate_png(&png, false));
        // Tolerant mode stops at the first IEND.
        assert!(validate_png(&png, true));
    }

    #[test]
    fn png_strict_rejects_corrupt_crc() {
        let mut png = tiny_png();
        let last = png.len() - 1;
        png[last] ^= 0xFF; // IEND crc
        assert!(!validate_png(&png, false));
        assert!(validate_png(&png, true));
    }

    #[test]
    fn png_rejects_truncated_chunk() {
        let mut png = tiny_png();
        png.truncate(png.len() - 6); // cut into the IEND chunk
        assert!(!validate_png(&png, false));
        assert!(!validate_png(&png, true));
    }

    // ── MP4 ──────────────────────────────────────────────────────────────

    #[test]
    fn mp4_strict_accepts_box_walk_to_eof() {
        assert!(validate_mp4(&tiny_mp4(), false));
    }

    #[test]
    fn mp4_rejects_zeroed_major_brand() {
        let mut mp4 = tiny_mp4();
        mp4[8..12].fill(0);
        assert!(!validate_mp4(&mp4, false));
        assert!(!validate_mp4(&mp4, true));
    }

    #[test]
    fn mp4_strict_rejects_box_overrun() {
        let mut mp4 = tiny_mp4();
        let len = mp4.len();
        mp4[16..20].copy_from_slice(&1000u32.to_be_bytes()); // mdat claims 1000 B
        assert!(mp4.len() == len);
        assert!(!validate_mp4(&mp4, false));
        assert!(validate_mp4(&mp4, true));
    }

    #[test]
    fn mp4_strict_rejects_nested_ftyp() {
        let mut mp4 = tiny_mp4();
        mp4.extend_from_slice(&tiny_mp4());
        assert!(!validate_mp4(&mp4, false));
        assert!(validate_mp4(&mp4, true));
    }

    #[test]
    fn mp4_accepts_size_zero_final_box() {
        let mut mp4 = Vec::new();
        mp4.extend_from_slice(&16u32.to_be_bytes());
        mp4.extend_from_slice(b"ftyp");
        mp4.extend_from_slice(b"isom");
        mp4.extend_from_slice(&0x200u32.to_be_bytes());
        mp4.extend_from_slice(&0u32.to_be_bytes()); // to end of stream
        mp4.extend_from_slice(b"mdat");
        mp4.extend_from_slice(&noise(64, 9));
        assert!(validate_mp4(&mp4, false));
    }

    // ── ZIP ──────────────────────────────────────────────────────────────

    #[test]
    fn zip_strict_accepts_walked_central_directory() {
        assert!(validate_zip(&tiny_zip(), false));
    }

    #[test]
    fn zip_rejects_missing_eocd() {
        let mut zip = tiny_zip();
        zip.truncate(zip.len() - ZIP_EOCD_LEN);
        assert!(!validate_zip(&zip, false));
        assert!(!validate_zip(&zip, true));
    }

    #[test]
    fn zip_rejects_multi_disk_archive() {
        let mut zip = tiny_zip();
        let eocd = rfind(&zip, &ZIP_EOCD).unwrap();
        zip[eocd + 4] = 1; // disk_no
        assert!(!validate_zip(&zip, false));
        assert!(!validate_zip(&zip, true));
    }

    #[test]
    fn zip_strict_rejects_entry_count_mismatch() {
        let mut zip = tiny_zip();
        let eocd = rfind(&zip, &ZIP_EOCD).unwrap();
        zip[eocd + 8] = 2;  // entries on disk
        zip[eocd + 10] = 2; // total entries
        assert!(!validate_zip(&zip, false));
        assert!(validate_zip(&zip, true));
    }

    #[test]
    fn zip_strict_rejects_dangling_local_offset() {
        let mut zip = tiny_zip();
        let cd = rfind(&zip, &ZIP_CENTRAL_HEADER).unwrap();
        zip[cd + 42] = 7; // local header offset now points into file data
        assert!(!validate_zip(&zip, false));
        assert!(validate_zip(&zip, true));
    }

    // ── Dispatch ─────────────────────────────────────────────────────────

    #[test]
    fn type_dispatch_by_name() {
        assert_eq!(CarvedType::from_name("JPEG"), CarvedType::Jpeg);
        assert_eq!(CarvedType::from_name("docx"), CarvedType::Zip);
        assert_eq!(CarvedType::from_name("GIF"), CarvedType::Other);
        assert!(validate_structure(b"anything", CarvedType::Other, false));
    }
}
