//! Source analysis via ffprobe.

use std::path::{Component, Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use vidstream_core::models::SourceMetadata;

/// Reads duration, dimensions and frame rate from a media file.
#[async_trait]
pub trait SourceProbe: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<SourceMetadata>;
}

/// Validate that a path doesn't contain shell metacharacters or dangerous sequences
fn validate_path(path: &str) -> Result<()> {
    let dangerous_chars = [';', '|', '&', '$', '`', '<', '>', '\n', '\r'];
    if path.chars().any(|c| dangerous_chars.contains(&c)) {
        return Err(anyhow!("Path contains dangerous characters: {}", path));
    }
    Ok(())
}

fn validate_source_path(path: &Path) -> Result<PathBuf> {
    validate_path(&path.to_string_lossy())?;
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(anyhow!(
            "Path contains directory traversal: {}",
            path.display()
        ));
    }
    path.canonicalize()
        .with_context(|| format!("Source file is not accessible: {}", path.display()))
}

pub struct FfprobeProbe {
    ffprobe_path: String,
}

impl FfprobeProbe {
    pub fn new(ffprobe_path: impl Into<String>) -> Result<Self> {
        let ffprobe_path = ffprobe_path.into();
        validate_path(&ffprobe_path)
            .context("Invalid ffprobe_path: contains dangerous characters")?;

        if !ffprobe_path.chars().all(|c| {
            c.is_alphanumeric() || c == '/' || c == '-' || c == '_' || c == '.' || c == '\\'
        }) {
            return Err(anyhow!("Invalid ffprobe_path: contains unsafe characters"));
        }

        Ok(Self { ffprobe_path })
    }
}

#[async_trait]
impl SourceProbe for FfprobeProbe {
    #[tracing::instrument(skip(self), fields(
        process.executable.name = "ffprobe",
        process.executable.path = %self.ffprobe_path,
        ffmpeg.operation = "probe"
    ))]
    async fn probe(&self, path: &Path) -> Result<SourceMetadata> {
        let start = std::time::Instant::now();
        let validated_path = validate_source_path(path)?;

        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
                "-select_streams",
                "v:0",
            ])
            .arg(&validated_path)
            .kill_on_drop(true)
            .output()
            .await
            .context("Failed to execute ffprobe")?;

        if !output.status.success() {
            return Err(anyhow!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr)
            ));
        }

        let metadata = parse_probe_output(&output.stdout)?;

        tracing::info!(
            duration_ms = start.elapsed().as_millis(),
            video_duration = metadata.duration,
            width = metadata.width,
            height = metadata.height,
            framerate = ?metadata.framerate,
            codec = %metadata.codec,
            "Video probe completed"
        );

        Ok(metadata)
    }
}

/// Parse `ffprobe -print_format json -show_format -show_streams` output.
pub fn parse_probe_output(stdout: &[u8]) -> Result<SourceMetadata> {
    let probe_data: serde_json::Value =
        serde_json::from_slice(stdout).context("Failed to parse ffprobe output")?;

    let stream = probe_data["streams"]
        .get(0)
        .ok_or_else(|| anyhow!("No video stream found"))?;

    let format = &probe_data["format"];

    // Some containers only carry the duration on the stream.
    let duration = format["duration"]
        .as_str()
        .or_else(|| stream["duration"].as_str())
        .and_then(|d| d.parse::<f64>().ok())
        .ok_or_else(|| anyhow!("Could not parse duration"))?;

    let width = stream["width"]
        .as_u64()
        .ok_or_else(|| anyhow!("Could not parse width"))? as u32;

    let height = stream["height"]
        .as_u64()
        .ok_or_else(|| anyhow!("Could not parse height"))? as u32;

    let codec = stream["codec_name"]
        .as_str()
        .unwrap_or("unknown")
        .to_string();

    let bitrate = format["bit_rate"]
        .as_str()
        .and_then(|b| b.parse::<u64>().ok());

    let framerate = stream["avg_frame_rate"]
        .as_str()
        .and_then(parse_rational)
        .or_else(|| stream["r_frame_rate"].as_str().and_then(parse_rational));

    Ok(SourceMetadata {
        duration,
        width,
        height,
        codec,
        bitrate,
        framerate,
    })
}

/// `"30000/1001"` -> 29.97; `"0/0"` -> None.
fn parse_rational(raw: &str) -> Option<f32> {
    let (num, den) = raw.split_once('/')?;
    let num: f32 = num.trim().parse().ok()?;
    let den: f32 = den.trim().parse().ok()?;
    if den == 0.0 || num == 0.0 {
        return None;
    }
    Some(num / den)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_output() {
        let stdout = br#"{
            "streams": [{
                "codec_name": "h264",
                "width": 1920,
                "height": 1080,
                "avg_frame_rate": "30000/1001",
                "r_frame_rate": "30/1"
            }],
            "format": {"duration": "12.480000", "bit_rate": "4800000"}
        }"#;

        let metadata = parse_probe_output(stdout).unwrap();
        assert_eq!(metadata.width, 1920);
        assert_eq!(metadata.height, 1080);
        assert_eq!(metadata.codec, "h264");
        assert_eq!(metadata.bitrate, Some(4_800_000));
        assert!((metadata.duration - 12.48).abs() < 1e-9);
        assert!((metadata.framerate.unwrap() - 29.97).abs() < 0.01);
    }

    #[test]
    fn test_falls_back_to_r_frame_rate_and_stream_duration() {
        let stdout = br#"{
            "streams": [{"width": 640, "height": 360, "avg_frame_rate": "0/0",
                         "r_frame_rate": "25/1", "duration": "3.0"}],
            "format": {}
        }"#;

        let metadata = parse_probe_output(stdout).unwrap();
        assert_eq!(metadata.framerate, Some(25.0));
        assert_eq!(metadata.duration, 3.0);
        assert_eq!(metadata.codec, "unknown");
        assert_eq!(metadata.bitrate, None);
    }

    #[test]
    fn test_no_video_stream_is_an_error() {
        let err = parse_probe_output(br#"{"streams": [], "format": {"duration": "1"}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("No video stream"));
        assert!(parse_probe_output(b"not json").is_err());
    }

    #[test]
    fn test_rejects_unsafe_binary_path() {
        assert!(FfprobeProbe::new("ffprobe; rm -rf /").is_err());
        assert!(FfprobeProbe::new("/usr/bin/ffprobe").is_ok());
    }

    #[tokio::test]
    async fn test_missing_source_fails_before_spawning() {
        let probe = FfprobeProbe::new("ffprobe").unwrap();
        let err = probe
            .probe(Path::new("/nonexistent/vidstream/source"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not accessible"));
    }
}
