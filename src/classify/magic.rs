//! Magic-number sniffing of leading content bytes.

/// Generic binary content type returned when no signature matches.
pub const OCTET_STREAM: &str = "application/octet-stream";

const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47];
const GIF: &[u8] = b"GIF8";
const RIFF: &[u8] = b"RIFF";
const WEBP: &[u8] = b"WEBP";
const FTYP: &[u8] = b"ftyp";
const EBML: &[u8] = &[0x1A, 0x45, 0xDF, 0xA3];

/// Classifies content by its leading bytes.
///
/// Recognizes JPEG, PNG, GIF, WEBP (`RIFF` at 0 and `WEBP` at 8), MP4
/// (`ftyp` at 4) and WebM/Matroska (EBML header). Anything else, including a
/// buffer too short to hold a signature, is `application/octet-stream`.
#[must_use]
pub fn mime_from_bytes(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(JPEG) {
        "image/jpeg"
    } else if bytes.starts_with(PNG) {
        "image/png"
    } else if bytes.starts_with(GIF) {
        "image/gif"
    } else if bytes.starts_with(RIFF) && bytes.get(8..12) == Some(WEBP) {
        "image/webp"
    } else if bytes.get(4..8) == Some(FTYP) {
        "video/mp4"
    } else if bytes.starts_with(EBML) {
        "video/webm"
    } else {
        OCTET_STREAM
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_from_bytes_jpeg() {
        assert_eq!(mime_from_bytes(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00]), "image/jpeg");
    }

    #[test]
    fn test_mime_from_bytes_png() {
        assert_eq!(
            mime_from_bytes(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]),
            "image/png"
        );
    }

    #[test]
    fn test_mime_from_bytes_gif() {
        assert_eq!(mime_from_bytes(b"GIF89a...."), "image/gif");
    }

    #[test]
    fn test_mime_from_bytes_webp_needs_both_markers() {
        assert_eq!(mime_from_bytes(b"RIFF\x24\x00\x00\x00WEBPVP8 "), "image/webp");
        assert_eq!(mime_from_bytes(b"RIFF\x24\x00\x00\x00WAVEfmt "), OCTET_STREAM);
    }

    #[test]
    fn test_mime_from_bytes_mp4_ftyp_at_offset_four() {
        assert_eq!(mime_from_bytes(b"\x00\x00\x00\x18ftypmp42"), "video/mp4");
        assert_eq!(mime_from_bytes(b"ftyp\x00\x00\x00\x00"), OCTET_STREAM);
    }

    #[test]
    fn test_mime_from_bytes_webm() {
        assert_eq!(mime_from_bytes(&[0x1A, 0x45, 0xDF, 0xA3, 0x9F]), "video/webm");
    }

    #[test]
    fn test_mime_from_bytes_unrecognized_and_short() {
        assert_eq!(mime_from_bytes(b"<!DOCTYPE html>"), OCTET_STREAM);
        assert_eq!(mime_from_bytes(&[0xFF, 0xD8]), OCTET_STREAM);
        assert_eq!(mime_from_bytes(&[]), OCTET_STREAM);
    }
}
