//! Filename sanitization and collision-safe path resolution for downloads.

use std::path::{Component, Path, PathBuf};

use tracing::debug;
use url::Url;

/// Guesses a file extension (with leading dot) from a Content-Type value.
pub(crate) fn extension_from_content_type(content_type: &str) -> &'static str {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    match mime.as_str() {
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "image/gif" => ".gif",
        "image/webp" => ".webp",
        "image/avif" => ".avif",
        "image/svg+xml" => ".svg",
        "video/mp4" => ".mp4",
        "video/webm" => ".webm",
        "video/quicktime" => ".mov",
        "video/mp2t" => ".ts",
        "video/iso.segment" => ".m4s",
        "audio/mpeg" => ".mp3",
        "audio/mp4" => ".m4a",
        "audio/ogg" => ".ogg",
        "audio/wav" => ".wav",
        "application/vnd.apple.mpegurl" | "application/x-mpegurl" => ".m3u8",
        "application/dash+xml" => ".mpd",
        "text/html" => ".html",
        _ => ".bin",
    }
}

/// Parses a Content-Disposition header to extract the filename.
///
/// Handles both:
/// - `attachment; filename="clip.mp4"`
/// - `attachment; filename=clip.mp4`
/// - `attachment; filename*=UTF-8''clip.mp4` (RFC 5987)
pub(crate) fn parse_content_disposition(header: &str) -> Option<String> {
    if let Some(pos) = header.find("filename*=") {
        let value = header[pos + 10..].trim();
        // charset'language'encoded_value
        if let Some(quote_pos) = value.find("''") {
            let encoded = &value[quote_pos + 2..];
            let end = encoded.find(';').unwrap_or(encoded.len());
            if let Ok(decoded) = urlencoding::decode(encoded[..end].trim()) {
                return Some(decoded.into_owned());
            }
        }
    }

    if let Some(pos) = header.find("filename=") {
        let value = header[pos + 9..].trim();
        if let Some(stripped) = value.strip_prefix('"') {
            if let Some(end) = stripped.find('"') {
                return Some(stripped[..end].to_string());
            }
        } else {
            let end = value.find(';').unwrap_or(value.len());
            let filename = value[..end].trim();
            if !filename.is_empty() {
                return Some(filename.to_string());
            }
        }
    }

    None
}

/// Sanitizes a filename for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems:
/// / \ : * ? " < > |
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    }
}

/// Appends an extension derived from `content_type` when `name` has none.
pub(crate) fn with_inferred_extension(name: &str, content_type: Option<&str>) -> String {
    if name.rfind('.').is_some_and(|pos| pos > 0 && pos + 1 < name.len()) {
        return name.to_string();
    }
    let extension = content_type.map_or(".bin", extension_from_content_type);
    format!("{name}{extension}")
}

/// Filename from the URL's last path segment, percent-decoded.
pub(crate) fn filename_from_response_url(url: &Url) -> Option<String> {
    let last = url.path_segments()?.next_back()?;
    if last.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(last).unwrap_or_else(|e| {
        debug!(segment = %last, error = %e, "URL decoding failed, using raw segment");
        last.into()
    });
    Some(sanitize_filename(&decoded))
}

/// Resolves a unique file path, adding a numeric suffix if the file exists.
///
/// Example: `clip.mp4`, then `clip_1.mp4`, `clip_2.mp4`, ...
pub(crate) fn resolve_unique_path(dir: &Path, filename: &str) -> PathBuf {
    let filename = {
        let sanitized = sanitize_filename(filename);
        if sanitized.contains('/')
            || sanitized.contains('\\')
            || sanitized.trim_matches('_').is_empty()
        {
            "download.bin".to_string()
        } else {
            sanitized
        }
    };
    let base_path = dir.join(&filename);

    if !base_path.exists() {
        return base_path;
    }

    let (stem, ext) = match filename.rfind('.') {
        Some(pos) if pos > 0 => (&filename[..pos], &filename[pos..]),
        _ => (filename.as_str(), ""),
    };

    for i in 1..1000 {
        let candidate = dir.join(format!("{stem}_{i}{ext}"));
        if !candidate.exists() {
            return candidate;
        }
    }

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    dir.join(format!("{stem}_{timestamp}{ext}"))
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::Component;

    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_filename_removes_invalid_chars() {
        assert_eq!(sanitize_filename("clip/name.mp4"), "clip_name.mp4");
        assert_eq!(sanitize_filename("clip\\name.mp4"), "clip_name.mp4");
        assert_eq!(sanitize_filename("clip:name.mp4"), "clip_name.mp4");
        assert_eq!(sanitize_filename("clip<name>.mp4"), "clip_name_.mp4");
        assert_eq!(sanitize_filename("clip|name?.mp4"), "clip_name_.mp4");
    }

    #[test]
    fn test_sanitize_filename_rewrites_dot_segments() {
        assert_eq!(sanitize_filename("."), "_");
        assert_eq!(sanitize_filename(".."), "__");
    }

    #[test]
    fn test_sanitize_filename_preserves_valid_chars() {
        assert_eq!(sanitize_filename("holiday photo (1).jpg"), "holiday photo (1).jpg");
        assert_eq!(sanitize_filename("日本語.png"), "日本語.png");
    }

    #[test]
    fn test_parse_content_disposition_variants() {
        assert_eq!(
            parse_content_disposition(r#"attachment; filename="clip.mp4""#),
            Some("clip.mp4".to_string())
        );
        assert_eq!(
            parse_content_disposition("attachment; filename=clip.mp4; size=10"),
            Some("clip.mp4".to_string())
        );
        assert_eq!(
            parse_content_disposition("attachment; filename*=UTF-8''my%20clip.mp4"),
            Some("my clip.mp4".to_string())
        );
        assert_eq!(parse_content_disposition("inline"), None);
    }

    #[test]
    fn test_extension_from_content_type() {
        assert_eq!(extension_from_content_type("image/webp"), ".webp");
        assert_eq!(extension_from_content_type("video/MP4; codecs=avc1"), ".mp4");
        assert_eq!(extension_from_content_type("application/x-mpegURL"), ".m3u8");
        assert_eq!(extension_from_content_type("application/x-unknown"), ".bin");
    }

    #[test]
    fn test_with_inferred_extension() {
        assert_eq!(with_inferred_extension("photo.jpg", Some("image/png")), "photo.jpg");
        assert_eq!(with_inferred_extension("photo", Some("image/png")), "photo.png");
        assert_eq!(with_inferred_extension("photo.", None), "photo..bin");
        assert_eq!(with_inferred_extension(".hidden", Some("video/mp4")), ".hidden.mp4");
    }

    #[test]
    fn test_filename_from_response_url() {
        let url = Url::parse("https://a.com/media/My%20Clip.mp4?x=1").unwrap();
        assert_eq!(filename_from_response_url(&url).as_deref(), Some("My Clip.mp4"));
        let url = Url::parse("https://a.com/").unwrap();
        assert_eq!(filename_from_response_url(&url), None);
    }

    #[test]
    fn test_resolve_unique_path_with_conflicts() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(
            resolve_unique_path(temp_dir.path(), "clip.mp4"),
            temp_dir.path().join("clip.mp4")
        );

        std::fs::write(temp_dir.path().join("clip.mp4"), b"1").unwrap();
        std::fs::write(temp_dir.path().join("clip_1.mp4"), b"2").unwrap();
        assert_eq!(
            resolve_unique_path(temp_dir.path(), "clip.mp4"),
            temp_dir.path().join("clip_2.mp4")
        );
    }

    #[test]
    fn test_resolve_unique_path_protects_against_traversal() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();

        assert_eq!(resolve_unique_path(base, ".."), base.join("download.bin"));
        for malicious in ["../../etc/passwd", "subdir/../../../etc/passwd", "a/\\b\\c"] {
            let path = resolve_unique_path(base, malicious);
            assert!(path.starts_with(base), "escaped output dir: {}", path.display());
            assert!(
                !path.components().any(|c| c == Component::ParentDir),
                "resolved path must not have .. component: {}",
                path.display()
            );
        }
    }
}
