//! Segmented HLS encoding via ffmpeg.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use vidstream_core::EncodingConfig;
use vidstream_storage::keys::{SEGMENT_PATTERN, VARIANT_PLAYLIST};

use super::planner::VariantSpec;

/// Number of stderr lines kept for the error message of a failed run.
const STDERR_TAIL_LINES: usize = 20;

/// Receives fractional completion (0.0..=100.0) of one encode.
pub trait ProgressSink: Send + Sync {
    fn report(&self, percent: f64);
}

impl<F> ProgressSink for F
where
    F: Fn(f64) + Send + Sync,
{
    fn report(&self, percent: f64) {
        self(percent)
    }
}

/// One variant to encode into `output_dir`.
#[derive(Debug, Clone)]
pub struct EncodeJob {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub spec: VariantSpec,
    /// Probed source duration, used to turn encoder timestamps into percent.
    pub duration_secs: f64,
    pub segment_duration: u32,
}

impl EncodeJob {
    pub fn playlist_path(&self) -> PathBuf {
        self.output_dir.join(VARIANT_PLAYLIST)
    }

    pub fn segment_pattern(&self) -> PathBuf {
        self.output_dir.join(SEGMENT_PATTERN)
    }
}

/// Produces a variant playlist plus its segments. Returns once the output is
/// complete; progress is pushed to the sink while it runs.
#[async_trait]
pub trait Encoder: Send + Sync {
    async fn encode(&self, job: &EncodeJob, progress: &dyn ProgressSink) -> Result<()>;
}

pub struct FfmpegEncoder {
    ffmpeg_path: String,
    encoding: EncodingConfig,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg_path: impl Into<String>, encoding: EncodingConfig) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            encoding,
        }
    }

    pub fn build_args(&self, job: &EncodeJob) -> Vec<String> {
        let spec = &job.spec;
        let mut args: Vec<String> = vec!["-y".into(), "-hide_banner".into()];

        args.extend(spec.profile.input_options.iter().cloned());
        args.extend([
            "-i".to_string(),
            job.input.to_string_lossy().to_string(),
            "-c:v".to_string(),
            spec.profile.codec.clone(),
        ]);
        args.extend(spec.profile.output_options.iter().cloned());

        args.extend([
            "-b:v".to_string(),
            spec.bitrate(),
            "-maxrate".to_string(),
            spec.bitrate(),
            "-bufsize".to_string(),
            spec.bufsize(),
            "-g".to_string(),
            spec.gop_size.to_string(),
            "-keyint_min".to_string(),
            spec.keyint_min.to_string(),
            "-sc_threshold".to_string(),
            "0".to_string(),
            "-vf".to_string(),
            spec.profile.scale_filter(spec.height),
            "-crf".to_string(),
            self.encoding.crf.to_string(),
            "-threads".to_string(),
            "0".to_string(),
            "-c:a".to_string(),
            self.encoding.audio_codec.clone(),
            "-b:a".to_string(),
            self.encoding.audio_bitrate.clone(),
            "-ac".to_string(),
            self.encoding.audio_channels.to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            "-f".to_string(),
            "hls".to_string(),
            "-hls_time".to_string(),
            job.segment_duration.to_string(),
            "-hls_list_size".to_string(),
            "0".to_string(),
            "-hls_playlist_type".to_string(),
            "vod".to_string(),
            "-hls_segment_filename".to_string(),
            job.segment_pattern().to_string_lossy().to_string(),
            "-progress".to_string(),
            "pipe:1".to_string(),
            "-nostats".to_string(),
            job.playlist_path().to_string_lossy().to_string(),
        ]);

        args
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    #[tracing::instrument(skip(self, job, progress), fields(
        process.executable.name = "ffmpeg",
        ffmpeg.operation = "hls",
        height = job.spec.height,
        codec = %job.spec.profile.codec
    ))]
    async fn encode(&self, job: &EncodeJob, progress: &dyn ProgressSink) -> Result<()> {
        let start = std::time::Instant::now();
        tokio::fs::create_dir_all(&job.output_dir)
            .await
            .context("Failed to create variant output directory")?;

        let mut child = Command::new(&self.ffmpeg_path)
            .args(self.build_args(job))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context("Failed to execute ffmpeg")?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("ffmpeg stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("ffmpeg stderr was not captured"))?;

        let stderr_task = tokio::spawn(async move {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            tail.into_iter().collect::<Vec<_>>().join("\n")
        });

        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines
            .next_line()
            .await
            .context("Failed to read ffmpeg progress")?
        {
            if let Some(percent) = parse_progress_line(&line, job.duration_secs) {
                progress.report(percent);
            }
        }

        let status = child.wait().await.context("Failed to wait for ffmpeg")?;
        let stderr_tail = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(anyhow!("FFmpeg failed ({}): {}", status, stderr_tail));
        }

        progress.report(100.0);
        tracing::info!(
            duration_ms = start.elapsed().as_millis(),
            "Variant encoded"
        );
        Ok(())
    }
}

/// Turn one `-progress` key=value line into percent of `duration_secs`.
fn parse_progress_line(line: &str, duration_secs: f64) -> Option<f64> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "progress" if value == "end" => Some(100.0),
        // Both keys carry microseconds despite the name of the second.
        "out_time_us" | "out_time_ms" if duration_secs > 0.0 => {
            let micros: f64 = value.parse().ok()?;
            Some((micros / 1_000_000.0 / duration_secs * 100.0).clamp(0.0, 100.0))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::planner::{EncoderProfile, HardwareAcceleration, VariantPlanner};
    use vidstream_core::models::SourceMetadata;
    use vidstream_core::BitrateLadder;

    fn job() -> EncodeJob {
        let planner = VariantPlanner::new(
            vec![720],
            BitrateLadder::default(),
            EncoderProfile::for_acceleration(
                HardwareAcceleration::Software,
                &EncodingConfig::default(),
            ),
        );
        let spec = planner
            .plan(&SourceMetadata {
                duration: 10.0,
                width: 1280,
                height: 720,
                codec: "h264".to_string(),
                bitrate: None,
                framerate: Some(30.0),
            })
            .unwrap()
            .remove(0);

        EncodeJob {
            input: PathBuf::from("/tmp/in/source"),
            output_dir: PathBuf::from("/tmp/out/720p"),
            spec,
            duration_secs: 10.0,
            segment_duration: 5,
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> &'a str {
        let index = args.iter().position(|a| a == flag).unwrap();
        &args[index + 1]
    }

    #[test]
    fn test_build_args_rate_control() {
        let args = FfmpegEncoder::new("ffmpeg", EncodingConfig::default()).build_args(&job());

        assert_eq!(value_after(&args, "-c:v"), "libx264");
        assert_eq!(value_after(&args, "-b:v"), "3500k");
        assert_eq!(value_after(&args, "-maxrate"), "3500k");
        assert_eq!(value_after(&args, "-bufsize"), "7000k");
        assert_eq!(value_after(&args, "-g"), "60");
        assert_eq!(value_after(&args, "-keyint_min"), "30");
        assert_eq!(value_after(&args, "-sc_threshold"), "0");
        assert_eq!(value_after(&args, "-vf"), "scale=-2:720");
        assert_eq!(value_after(&args, "-crf"), "23");
        assert_eq!(value_after(&args, "-preset"), "veryfast");
    }

    #[test]
    fn test_build_args_hls_output() {
        let args = FfmpegEncoder::new("ffmpeg", EncodingConfig::default()).build_args(&job());

        assert_eq!(value_after(&args, "-f"), "hls");
        assert_eq!(value_after(&args, "-hls_time"), "5");
        assert_eq!(value_after(&args, "-hls_list_size"), "0");
        assert_eq!(
            value_after(&args, "-hls_segment_filename"),
            "/tmp/out/720p/segment_%d.ts"
        );
        assert_eq!(value_after(&args, "-c:a"), "aac");
        assert_eq!(value_after(&args, "-b:a"), "128k");
        assert_eq!(value_after(&args, "-ac"), "2");
        assert_eq!(args.last().unwrap(), "/tmp/out/720p/playlist.m3u8");
        assert_eq!(value_after(&args, "-i"), "/tmp/in/source");
    }

    #[test]
    fn test_parse_progress_lines() {
        assert_eq!(parse_progress_line("out_time_us=5000000", 10.0), Some(50.0));
        assert_eq!(parse_progress_line("out_time_ms=2500000", 10.0), Some(25.0));
        assert_eq!(parse_progress_line("out_time_us=99000000", 10.0), Some(100.0));
        assert_eq!(parse_progress_line("progress=end", 10.0), Some(100.0));
        assert_eq!(parse_progress_line("progress=continue", 10.0), None);
        assert_eq!(parse_progress_line("out_time_us=N/A", 10.0), None);
        assert_eq!(parse_progress_line("out_time_us=100", 0.0), None);
        assert_eq!(parse_progress_line("frame=42", 10.0), None);
    }

    #[test]
    fn test_closure_is_a_progress_sink() {
        let seen = std::sync::Mutex::new(Vec::new());
        let sink = |p: f64| seen.lock().unwrap().push(p);
        sink.report(12.5);
        assert_eq!(*seen.lock().unwrap(), vec![12.5]);
    }
}
