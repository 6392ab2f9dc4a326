//! Content types for published files, resolved from the file extension.

use std::path::Path;

pub const HLS_PLAYLIST: &str = "application/vnd.apple.mpegurl";
pub const MPEG_TS: &str = "video/mp2t";
pub const MP4: &str = "video/mp4";
pub const OCTET_STREAM: &str = "application/octet-stream";

pub fn content_type_for(path: impl AsRef<Path>) -> &'static str {
    let extension = path
        .as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("m3u8") => HLS_PLAYLIST,
        Some("ts") => MPEG_TS,
        Some("mp4") => MP4,
        _ => OCTET_STREAM,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("master.m3u8"), HLS_PLAYLIST);
        assert_eq!(content_type_for("720p/segment_3.TS"), MPEG_TS);
        assert_eq!(content_type_for("source.mp4"), MP4);
        assert_eq!(content_type_for("thumbnail.webp"), OCTET_STREAM);
        assert_eq!(content_type_for("no_extension"), OCTET_STREAM);
    }
}
