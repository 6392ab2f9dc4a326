//! Configuration module
//!
//! Process-wide settings for the upload receiver, the transcode pipeline, the
//! storage gateway and the HTTP transport. Everything is read from the environment
//! once at startup (after loading `.env`), validated, and then shared immutably.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;

const DEFAULT_PORT: u16 = 4000;
const MAX_FRAGMENT_BYTES: usize = 64 * 1024 * 1024;
const UPLOAD_SESSION_TIMEOUT_SECS: u64 = 3600;
const UPLOAD_REAP_INTERVAL_SECS: u64 = 300;
const DEFAULT_RESOLUTIONS: &str = "1080,720,480,360";
const DEFAULT_BITRATES: &str = "1080:5000,720:3500,480:2500,0:1500";
const SEGMENT_DURATION_SECS: u32 = 5;
const VIDEO_CRF: u8 = 23;
const STORAGE_UPLOAD_CONCURRENCY: usize = 4;
const PROGRESS_CHANNEL_CAPACITY: usize = 64;

/// One rung of the bitrate table: sources planned at `min_height` or above get
/// `bitrate_kbps`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BitrateTier {
    pub min_height: u32,
    pub bitrate_kbps: u32,
}

/// Height to bitrate lookup, kept sorted by `min_height` descending.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitrateLadder {
    tiers: Vec<BitrateTier>,
}

impl BitrateLadder {
    pub fn new(mut tiers: Vec<BitrateTier>) -> Self {
        tiers.sort_by(|a, b| b.min_height.cmp(&a.min_height));
        tiers.dedup_by_key(|t| t.min_height);
        Self { tiers }
    }

    /// Parse `"1080:5000,720:3500,0:1500"`.
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let mut tiers = Vec::new();
        for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (height, bitrate) = entry.split_once(':').ok_or_else(|| {
                AppError::Configuration(format!(
                    "VIDEO_BITRATES entry '{}' must be <min_height>:<kbps>",
                    entry
                ))
            })?;
            let min_height = height.trim().parse::<u32>().map_err(|_| {
                AppError::Configuration(format!("Invalid height in VIDEO_BITRATES: {}", entry))
            })?;
            let bitrate_kbps = bitrate.trim().parse::<u32>().map_err(|_| {
                AppError::Configuration(format!("Invalid bitrate in VIDEO_BITRATES: {}", entry))
            })?;
            tiers.push(BitrateTier {
                min_height,
                bitrate_kbps,
            });
        }
        Ok(Self::new(tiers))
    }

    pub fn tiers(&self) -> &[BitrateTier] {
        &self.tiers
    }

    pub fn has_floor(&self) -> bool {
        self.tiers.iter().any(|t| t.min_height == 0)
    }

    /// Bitrate for a target height: the first tier whose threshold the height reaches.
    pub fn bitrate_for(&self, height: u32) -> Option<u32> {
        self.tiers
            .iter()
            .find(|t| height >= t.min_height)
            .map(|t| t.bitrate_kbps)
    }
}

impl Default for BitrateLadder {
    fn default() -> Self {
        Self::new(vec![
            BitrateTier {
                min_height: 1080,
                bitrate_kbps: 5000,
            },
            BitrateTier {
                min_height: 720,
                bitrate_kbps: 3500,
            },
            BitrateTier {
                min_height: 480,
                bitrate_kbps: 2500,
            },
            BitrateTier {
                min_height: 0,
                bitrate_kbps: 1500,
            },
        ])
    }
}

/// Requested hardware encoder. `Auto` defers to the host probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HardwareAccelMode {
    Auto,
    None,
    VideoToolbox,
    Nvenc,
    Vaapi,
}

impl FromStr for HardwareAccelMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "auto" => Ok(HardwareAccelMode::Auto),
            "none" | "software" | "off" => Ok(HardwareAccelMode::None),
            "videotoolbox" => Ok(HardwareAccelMode::VideoToolbox),
            "nvenc" => Ok(HardwareAccelMode::Nvenc),
            "vaapi" => Ok(HardwareAccelMode::Vaapi),
            other => Err(AppError::Configuration(format!(
                "Invalid VIDEO_HWACCEL value: {}",
                other
            ))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub environment: String,
    pub max_fragment_bytes: usize,
}

#[derive(Clone, Debug)]
pub struct UploadConfig {
    pub fragment_dir: PathBuf,
    pub assembled_dir: PathBuf,
    pub work_dir: PathBuf,
    pub session_timeout: Duration,
    pub reap_interval: Duration,
}

/// Software encoder and audio settings.
#[derive(Clone, Debug)]
pub struct EncodingConfig {
    pub crf: u8,
    pub preset: String,
    pub tune: String,
    pub profile: String,
    pub level: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub audio_channels: u8,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            crf: VIDEO_CRF,
            preset: "veryfast".to_string(),
            tune: "film".to_string(),
            profile: "high".to_string(),
            level: "4.1".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate: "128k".to_string(),
            audio_channels: 2,
        }
    }
}

#[derive(Clone, Debug)]
pub struct VideoConfig {
    /// Target heights, descending.
    pub resolutions: Vec<u32>,
    pub bitrates: BitrateLadder,
    pub segment_duration: u32,
    pub encoding: EncodingConfig,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub hwaccel: HardwareAccelMode,
}

/// S3-compatible remote backend. Only present when every required value is set.
#[derive(Clone, Debug)]
pub struct RemoteStorageConfig {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub public_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct LocalStorageConfig {
    pub path: PathBuf,
    pub base_url: String,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub remote: Option<RemoteStorageConfig>,
    pub local: LocalStorageConfig,
    pub upload_concurrency: usize,
}

#[derive(Clone, Debug)]
pub struct ProgressConfig {
    pub channel_capacity: usize,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub upload: UploadConfig,
    pub video: VideoConfig,
    pub storage: StorageConfig,
    pub progress: ProgressConfig,
}

/// Read `key`, falling back to `default` when unset or unparsable.
fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

fn first_set<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter()
        .filter_map(|key| lookup(key))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn parse_resolutions(raw: &str) -> Result<Vec<u32>, AppError> {
    let mut heights = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.trim_end_matches('p').parse::<u32>().map_err(|_| {
                AppError::Configuration(format!("Invalid height in VIDEO_RESOLUTIONS: {}", s))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    heights.sort_unstable_by(|a, b| b.cmp(a));
    heights.dedup();
    Ok(heights)
}

fn remote_from_lookup<F>(lookup: &F) -> Option<RemoteStorageConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let account_id = first_set(lookup, &["R2_ACCOUNT_ID"]);
    let endpoint = first_set(lookup, &["S3_ENDPOINT"]).or_else(|| {
        account_id
            .as_ref()
            .map(|account| format!("https://{}.r2.cloudflarestorage.com", account))
    });
    let region = first_set(lookup, &["S3_REGION", "AWS_REGION"]).or_else(|| {
        // R2 ignores the region but the signer still needs one.
        account_id.as_ref().map(|_| "auto".to_string())
    });
    let bucket = first_set(lookup, &["S3_BUCKET", "R2_BUCKET_NAME"]);
    let access_key_id = first_set(lookup, &["S3_ACCESS_KEY_ID", "R2_ACCESS_KEY_ID"]);
    let secret_access_key = first_set(lookup, &["S3_SECRET_ACCESS_KEY", "R2_SECRET_ACCESS_KEY"]);
    let public_url = first_set(lookup, &["STORAGE_PUBLIC_URL", "R2_PUBLIC_URL"]);

    match (bucket, region, access_key_id, secret_access_key) {
        (Some(bucket), Some(region), Some(access_key_id), Some(secret_access_key)) => {
            Some(RemoteStorageConfig {
                bucket,
                region,
                endpoint,
                access_key_id,
                secret_access_key,
                public_url,
            })
        }
        (bucket, region, key, secret) => {
            let any_set = bucket.is_some()
                || key.is_some()
                || secret.is_some()
                || account_id.is_some()
                || (region.is_some() && endpoint.is_some());
            if any_set {
                tracing::warn!(
                    has_bucket = bucket.is_some(),
                    has_region = region.is_some(),
                    has_access_key = key.is_some(),
                    has_secret = secret.is_some(),
                    "Remote storage is partially configured; using local storage only"
                );
            }
            None
        }
    }
}

impl Config {
    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.server.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. `from_env` is this over `std::env`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let temp_root = env::temp_dir().join("vidstream");

        let server = ServerConfig {
            port: match lookup("PORT") {
                Some(raw) => raw.trim().parse().map_err(|_| {
                    AppError::Configuration("PORT must be a valid number".to_string())
                })?,
                None => DEFAULT_PORT,
            },
            environment: first_set(&lookup, &["ENVIRONMENT", "APP_ENV"])
                .unwrap_or_else(|| "development".to_string()),
            max_fragment_bytes: parse_or(&lookup, "MAX_FRAGMENT_BYTES", MAX_FRAGMENT_BYTES),
        };

        let upload = UploadConfig {
            fragment_dir: first_set(&lookup, &["UPLOAD_FRAGMENT_DIR"])
                .map(PathBuf::from)
                .unwrap_or_else(|| temp_root.join("fragments")),
            assembled_dir: first_set(&lookup, &["UPLOAD_ASSEMBLED_DIR"])
                .map(PathBuf::from)
                .unwrap_or_else(|| temp_root.join("assembled")),
            work_dir: first_set(&lookup, &["PROCESSING_WORK_DIR"])
                .map(PathBuf::from)
                .unwrap_or_else(|| temp_root.join("work")),
            session_timeout: Duration::from_secs(parse_or(
                &lookup,
                "UPLOAD_SESSION_TIMEOUT_SECS",
                UPLOAD_SESSION_TIMEOUT_SECS,
            )),
            reap_interval: Duration::from_secs(parse_or(
                &lookup,
                "UPLOAD_REAP_INTERVAL_SECS",
                UPLOAD_REAP_INTERVAL_SECS,
            )),
        };

        let defaults = EncodingConfig::default();
        let video = VideoConfig {
            resolutions: parse_resolutions(
                &lookup("VIDEO_RESOLUTIONS").unwrap_or_else(|| DEFAULT_RESOLUTIONS.to_string()),
            )?,
            bitrates: BitrateLadder::parse(
                &lookup("VIDEO_BITRATES").unwrap_or_else(|| DEFAULT_BITRATES.to_string()),
            )?,
            segment_duration: parse_or(&lookup, "SEGMENT_DURATION", SEGMENT_DURATION_SECS),
            encoding: EncodingConfig {
                crf: parse_or(&lookup, "VIDEO_CRF", defaults.crf),
                preset: first_set(&lookup, &["VIDEO_PRESET"]).unwrap_or(defaults.preset),
                ..defaults
            },
            ffmpeg_path: first_set(&lookup, &["FFMPEG_PATH"])
                .unwrap_or_else(|| "ffmpeg".to_string()),
            ffprobe_path: first_set(&lookup, &["FFPROBE_PATH"])
                .unwrap_or_else(|| "ffprobe".to_string()),
            hwaccel: lookup("VIDEO_HWACCEL")
                .map(|raw| raw.parse())
                .transpose()?
                .unwrap_or(HardwareAccelMode::Auto),
        };

        let storage = StorageConfig {
            remote: remote_from_lookup(&lookup),
            local: LocalStorageConfig {
                path: PathBuf::from(
                    lookup("LOCAL_STORAGE_PATH").unwrap_or_else(|| "./uploads".to_string()),
                ),
                base_url: first_set(&lookup, &["LOCAL_STORAGE_BASE_URL"])
                    .unwrap_or_else(|| "/uploads".to_string()),
            },
            upload_concurrency: parse_or(
                &lookup,
                "STORAGE_UPLOAD_CONCURRENCY",
                STORAGE_UPLOAD_CONCURRENCY,
            ),
        };

        let progress = ProgressConfig {
            channel_capacity: parse_or(
                &lookup,
                "PROGRESS_CHANNEL_CAPACITY",
                PROGRESS_CHANNEL_CAPACITY,
            ),
        };

        let config = Config {
            server,
            upload,
            video,
            storage,
            progress,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.video.resolutions.is_empty() {
            return Err(AppError::Configuration(
                "VIDEO_RESOLUTIONS must list at least one height".to_string(),
            ));
        }
        if self.video.resolutions.contains(&0) {
            return Err(AppError::Configuration(
                "VIDEO_RESOLUTIONS must not contain a zero height".to_string(),
            ));
        }
        if !self.video.bitrates.has_floor() {
            return Err(AppError::Configuration(
                "VIDEO_BITRATES must contain a floor tier (0:<kbps>)".to_string(),
            ));
        }
        if self.video.segment_duration == 0 {
            return Err(AppError::Configuration(
                "SEGMENT_DURATION must be greater than zero".to_string(),
            ));
        }
        if self.video.encoding.crf > 51 {
            return Err(AppError::Configuration(
                "VIDEO_CRF must be between 0 and 51".to_string(),
            ));
        }
        if self.storage.upload_concurrency == 0 {
            return Err(AppError::Configuration(
                "STORAGE_UPLOAD_CONCURRENCY must be greater than zero".to_string(),
            ));
        }
        if self.storage.local.path.as_os_str().is_empty() {
            return Err(AppError::Configuration(
                "LOCAL_STORAGE_PATH must be set; local storage is the fallback backend"
                    .to_string(),
            ));
        }
        if self.progress.channel_capacity == 0 {
            return Err(AppError::Configuration(
                "PROGRESS_CHANNEL_CAPACITY must be greater than zero".to_string(),
            ));
        }
        if self.server.max_fragment_bytes == 0 {
            return Err(AppError::Configuration(
                "MAX_FRAGMENT_BYTES must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
