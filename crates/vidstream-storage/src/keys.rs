//! Shared key generation for storage backends.
//!
//! Key format: `videos/{video_id}/...`, with per-variant files under `{height}p/`.

use vidstream_core::models::Variant;
use vidstream_core::VideoId;

pub const MASTER_PLAYLIST: &str = "master.m3u8";
pub const VARIANT_PLAYLIST: &str = "playlist.m3u8";
/// Segment filename pattern handed to the encoder.
pub const SEGMENT_PATTERN: &str = "segment_%d.ts";

/// Destination prefix for every file of one asset.
pub fn video_prefix(video_id: &VideoId) -> String {
    format!("videos/{}", video_id)
}

/// Variant sub-manifest path relative to the asset prefix, e.g. `720p/playlist.m3u8`.
pub fn variant_playlist_path(height: u32) -> String {
    format!("{}/{}", Variant::directory_name(height), VARIANT_PLAYLIST)
}

pub fn master_playlist_key(video_id: &VideoId) -> String {
    join(&video_prefix(video_id), MASTER_PLAYLIST)
}

/// Join a prefix and a relative path with exactly one `/`.
pub fn join(prefix: &str, relative: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let relative = relative.trim_start_matches('/');
    if prefix.is_empty() {
        relative.to_string()
    } else {
        format!("{}/{}", prefix, relative)
    }
}
