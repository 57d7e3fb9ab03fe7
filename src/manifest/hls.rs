//! HLS playlist parsing.

use crate::classify;

/// Segment extensions recognised in media playlists.
const SEGMENT_EXTENSIONS: &[&str] = &["ts", "mp4", "m4s"];

/// Returns the raw segment references of a media playlist, in file order.
///
/// Comment and tag lines (`#...`) and blank lines are skipped, as are lines
/// that do not end in a segment extension (variant playlists, keys).
pub(crate) fn segment_references(playlist: &str) -> Vec<&str> {
    playlist
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| {
            classify::extension_of(line)
                .is_some_and(|ext| SEGMENT_EXTENSIONS.contains(&ext.as_str()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_references_skip_tags_and_blank_lines() {
        let playlist = "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:10\n\n#EXTINF:10.0,\nseg0.ts\n#EXTINF:10.0,\n  seg1.ts  \n#EXTINF:9.5,\nhttps://cdn.example.com/seg2.ts?token=x\n#EXT-X-ENDLIST\n";
        assert_eq!(
            segment_references(playlist),
            vec!["seg0.ts", "seg1.ts", "https://cdn.example.com/seg2.ts?token=x"]
        );
    }

    #[test]
    fn test_segment_references_fmp4_and_crlf() {
        let playlist = "#EXTM3U\r\n#EXT-X-MAP:URI=\"init.mp4\"\r\n#EXTINF:4,\r\nchunk-1.m4s\r\n#EXTINF:4,\r\nchunk-2.m4s\r\n";
        assert_eq!(segment_references(playlist), vec!["chunk-1.m4s", "chunk-2.m4s"]);
    }

    #[test]
    fn test_segment_references_ignore_variant_playlists() {
        let playlist = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=800000\nlow/index.m3u8\n#EXT-X-STREAM-INF:BANDWIDTH=2000000\nhigh/index.m3u8\n";
        assert!(segment_references(playlist).is_empty());
    }
}
