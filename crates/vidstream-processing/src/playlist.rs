//! HLS master playlist rendering.

use vidstream_core::models::Variant;

pub struct PlaylistBuilder;

impl PlaylistBuilder {
    /// Render the master playlist. Entries keep the order of `variants`.
    pub fn build(variants: &[Variant]) -> String {
        let mut playlist = String::from("#EXTM3U\n#EXT-X-VERSION:3\n\n");

        for variant in variants {
            playlist.push_str(&format!(
                "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}\n{}\n",
                variant.bandwidth,
                variant.resolution(),
                variant.playlist_path
            ));
        }

        playlist
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(height: u32, bitrate_kbps: u32) -> Variant {
        Variant {
            height,
            width: Variant::width_for_height(height),
            bitrate_kbps,
            buffer_size_kbps: bitrate_kbps * 2,
            bandwidth: bitrate_kbps as u64 * 1000,
            playlist_path: format!("{}p/playlist.m3u8", height),
        }
    }

    #[test]
    fn test_master_playlist_layout() {
        let playlist = PlaylistBuilder::build(&[variant(720, 3500), variant(360, 1500)]);
        let lines: Vec<&str> = playlist.lines().collect();

        assert_eq!(lines[0], "#EXTM3U");
        assert_eq!(lines[1], "#EXT-X-VERSION:3");
        let first = lines
            .iter()
            .position(|l| l.starts_with("#EXT-X-STREAM-INF"))
            .unwrap();
        assert_eq!(
            lines[first],
            "#EXT-X-STREAM-INF:BANDWIDTH=3500000,RESOLUTION=1280x720"
        );
        assert_eq!(lines[first + 1], "720p/playlist.m3u8");
        assert_eq!(
            lines[first + 2],
            "#EXT-X-STREAM-INF:BANDWIDTH=1500000,RESOLUTION=640x360"
        );
        assert_eq!(lines[first + 3], "360p/playlist.m3u8");
    }

    #[test]
    fn test_empty_variant_list_is_header_only() {
        assert_eq!(PlaylistBuilder::build(&[]), "#EXTM3U\n#EXT-X-VERSION:3\n\n");
    }
}
