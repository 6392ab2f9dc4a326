//! Variant planning: which renditions to encode and how.

use std::path::Path;
use std::sync::OnceLock;

use vidstream_core::models::{SourceMetadata, Variant};
use vidstream_core::{AppError, BitrateLadder, EncodingConfig, HardwareAccelMode, VideoConfig};

const DEFAULT_FRAMERATE: f64 = 30.0;
const VAAPI_DEVICE: &str = "/dev/dri/renderD128";

/// H.264 encoder family used for every variant of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareAcceleration {
    VideoToolbox,
    Nvenc,
    Vaapi,
    Software,
}

impl HardwareAcceleration {
    /// Probe the host once per process.
    pub fn detect() -> Self {
        static DETECTED: OnceLock<HardwareAcceleration> = OnceLock::new();
        *DETECTED.get_or_init(|| {
            let detected = if cfg!(target_os = "macos") {
                HardwareAcceleration::VideoToolbox
            } else if cfg!(target_os = "windows") {
                HardwareAcceleration::Nvenc
            } else if cfg!(target_os = "linux") && Path::new(VAAPI_DEVICE).exists() {
                HardwareAcceleration::Vaapi
            } else {
                HardwareAcceleration::Software
            };
            tracing::info!(acceleration = ?detected, "Hardware acceleration detected");
            detected
        })
    }

    pub fn resolve(mode: HardwareAccelMode) -> Self {
        match mode {
            HardwareAccelMode::Auto => Self::detect(),
            HardwareAccelMode::None => HardwareAcceleration::Software,
            HardwareAccelMode::VideoToolbox => HardwareAcceleration::VideoToolbox,
            HardwareAccelMode::Nvenc => HardwareAcceleration::Nvenc,
            HardwareAccelMode::Vaapi => HardwareAcceleration::Vaapi,
        }
    }

    pub fn codec(&self) -> &'static str {
        match self {
            HardwareAcceleration::VideoToolbox => "h264_videotoolbox",
            HardwareAcceleration::Nvenc => "h264_nvenc",
            HardwareAcceleration::Vaapi => "h264_vaapi",
            HardwareAcceleration::Software => "libx264",
        }
    }
}

/// Codec choice plus the codec-specific arguments around it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderProfile {
    pub acceleration: HardwareAcceleration,
    pub codec: String,
    /// Placed before `-i`.
    pub input_options: Vec<String>,
    /// Placed right after `-c:v`.
    pub output_options: Vec<String>,
}

impl EncoderProfile {
    pub fn for_acceleration(acceleration: HardwareAcceleration, encoding: &EncodingConfig) -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        let (input_options, output_options) = match acceleration {
            HardwareAcceleration::VideoToolbox => (Vec::new(), strings(&["-allow_sw", "1"])),
            HardwareAcceleration::Nvenc => (Vec::new(), strings(&["-preset", "p4", "-tune", "hq"])),
            HardwareAcceleration::Vaapi => (
                strings(&["-vaapi_device", VAAPI_DEVICE]),
                Vec::new(),
            ),
            HardwareAcceleration::Software => (
                Vec::new(),
                vec![
                    "-preset".to_string(),
                    encoding.preset.clone(),
                    "-tune".to_string(),
                    encoding.tune.clone(),
                    "-profile:v".to_string(),
                    encoding.profile.clone(),
                    "-level".to_string(),
                    encoding.level.clone(),
                ],
            ),
        };

        Self {
            acceleration,
            codec: acceleration.codec().to_string(),
            input_options,
            output_options,
        }
    }

    /// VAAPI frames must be uploaded to the device after scaling.
    pub fn scale_filter(&self, height: u32) -> String {
        match self.acceleration {
            HardwareAcceleration::Vaapi => format!("scale=-2:{},format=nv12,hwupload", height),
            _ => format!("scale=-2:{}", height),
        }
    }
}

/// Everything the encoder needs to produce one rendition.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantSpec {
    pub height: u32,
    pub width: u32,
    pub bitrate_kbps: u32,
    pub buffer_size_kbps: u32,
    pub gop_size: u32,
    pub keyint_min: u32,
    pub profile: EncoderProfile,
}

impl VariantSpec {
    pub fn bitrate(&self) -> String {
        format!("{}k", self.bitrate_kbps)
    }

    pub fn bufsize(&self) -> String {
        format!("{}k", self.buffer_size_kbps)
    }

    pub fn bandwidth(&self) -> u64 {
        self.bitrate_kbps as u64 * 1000
    }

    pub fn directory_name(&self) -> String {
        Variant::directory_name(self.height)
    }

    pub fn playlist_path(&self) -> String {
        vidstream_storage::keys::variant_playlist_path(self.height)
    }

    pub fn to_variant(&self) -> Variant {
        Variant {
            height: self.height,
            width: self.width,
            bitrate_kbps: self.bitrate_kbps,
            buffer_size_kbps: self.buffer_size_kbps,
            bandwidth: self.bandwidth(),
            playlist_path: self.playlist_path(),
        }
    }
}

/// Maps probed source properties onto the configured ladder. Pure: the same
/// source always yields the same plan.
#[derive(Debug, Clone)]
pub struct VariantPlanner {
    resolutions: Vec<u32>,
    bitrates: BitrateLadder,
    profile: EncoderProfile,
}

impl VariantPlanner {
    /// `resolutions` is sorted descending and deduplicated.
    pub fn new(mut resolutions: Vec<u32>, bitrates: BitrateLadder, profile: EncoderProfile) -> Self {
        resolutions.sort_unstable_by(|a, b| b.cmp(a));
        resolutions.dedup();
        Self {
            resolutions,
            bitrates,
            profile,
        }
    }

    pub fn from_config(config: &VideoConfig) -> Self {
        let acceleration = HardwareAcceleration::resolve(config.hwaccel);
        Self::new(
            config.resolutions.clone(),
            config.bitrates.clone(),
            EncoderProfile::for_acceleration(acceleration, &config.encoding),
        )
    }

    pub fn profile(&self) -> &EncoderProfile {
        &self.profile
    }

    pub fn plan(&self, source: &SourceMetadata) -> Result<Vec<VariantSpec>, AppError> {
        if source.height == 0 {
            return Err(AppError::AnalysisFailed(
                "source reports a zero height".to_string(),
            ));
        }
        if self.resolutions.is_empty() {
            return Err(AppError::Configuration(
                "resolution ladder is empty".to_string(),
            ));
        }

        let fps = source
            .framerate
            .map(f64::from)
            .filter(|f| f.is_finite() && *f > 0.0)
            .unwrap_or(DEFAULT_FRAMERATE);

        let mut heights: Vec<u32> = self
            .resolutions
            .iter()
            .copied()
            .filter(|h| *h <= source.height)
            .collect();

        if heights.is_empty() {
            // Encoders want even dimensions.
            let height = (source.height & !1).max(2);
            heights.push(height);
        }

        heights
            .into_iter()
            .map(|height| self.spec_for(height, fps))
            .collect()
    }

    fn spec_for(&self, height: u32, fps: f64) -> Result<VariantSpec, AppError> {
        let bitrate_kbps = self.bitrates.bitrate_for(height).ok_or_else(|| {
            AppError::Configuration(format!("no bitrate tier covers {}p", height))
        })?;

        Ok(VariantSpec {
            height,
            width: Variant::width_for_height(height),
            bitrate_kbps,
            buffer_size_kbps: bitrate_kbps * 2,
            gop_size: (fps * 2.0).round() as u32,
            keyint_min: fps.round() as u32,
            profile: self.profile.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planner() -> VariantPlanner {
        VariantPlanner::new(
            vec![720, 1080, 360, 480],
            BitrateLadder::default(),
            EncoderProfile::for_acceleration(
                HardwareAcceleration::Software,
                &EncodingConfig::default(),
            ),
        )
    }

    fn source(height: u32, framerate: Option<f32>) -> SourceMetadata {
        SourceMetadata {
            duration: 12.0,
            width: Variant::width_for_height(height),
            height,
            codec: "h264".to_string(),
            bitrate: None,
            framerate,
        }
    }

    #[test]
    fn test_1080p_at_30fps() {
        let plan = planner().plan(&source(1080, Some(30.0))).unwrap();
        let top = &plan[0];
        assert_eq!(top.height, 1080);
        assert_eq!(top.width, 1920);
        assert_eq!(top.bitrate(), "5000k");
        assert_eq!(top.bufsize(), "10000k");
        assert_eq!(top.gop_size, 60);
        assert_eq!(top.keyint_min, 30);
        assert_eq!(
            plan.iter().map(|s| s.height).collect::<Vec<_>>(),
            vec![1080, 720, 480, 360]
        );
    }

    #[test]
    fn test_never_upscales() {
        let plan = planner().plan(&source(720, Some(25.0))).unwrap();
        assert_eq!(
            plan.iter().map(|s| s.height).collect::<Vec<_>>(),
            vec![720, 480, 360]
        );
        assert_eq!(plan[0].bitrate_kbps, 3500);
        assert_eq!(plan[2].bitrate_kbps, 1500);
        assert_eq!(plan[0].gop_size, 50);
    }

    #[test]
    fn test_tiny_source_gets_one_native_variant() {
        let plan = planner().plan(&source(241, Some(23.976))).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].height, 240);
        assert_eq!(plan[0].bitrate_kbps, 1500);
        assert_eq!(plan[0].gop_size, 48);
        assert_eq!(plan[0].keyint_min, 24);
    }

    #[test]
    fn test_missing_framerate_defaults_to_30() {
        let plan = planner().plan(&source(480, None)).unwrap();
        assert_eq!(plan[0].gop_size, 60);
        assert_eq!(plan[0].keyint_min, 30);
    }

    #[test]
    fn test_zero_height_is_analysis_failure() {
        assert!(matches!(
            planner().plan(&source(0, Some(30.0))),
            Err(AppError::AnalysisFailed(_))
        ));
    }

    #[test]
    fn test_plan_is_deterministic() {
        let p = planner();
        assert_eq!(
            p.plan(&source(1080, Some(29.97))).unwrap(),
            p.plan(&source(1080, Some(29.97))).unwrap()
        );
    }

    #[test]
    fn test_variant_record_from_spec() {
        let plan = planner().plan(&source(720, Some(30.0))).unwrap();
        let variant = plan[0].to_variant();
        assert_eq!(variant.bandwidth, 3_500_000);
        assert_eq!(variant.buffer_size_kbps, 7000);
        assert_eq!(variant.playlist_path, "720p/playlist.m3u8");
        assert_eq!(variant.resolution(), "1280x720");
    }

    #[test]
    fn test_software_profile_options() {
        let profile = EncoderProfile::for_acceleration(
            HardwareAcceleration::Software,
            &EncodingConfig::default(),
        );
        assert_eq!(profile.codec, "libx264");
        assert_eq!(
            profile.output_options,
            vec!["-preset", "veryfast", "-tune", "film", "-profile:v", "high", "-level", "4.1"]
        );
        assert_eq!(profile.scale_filter(720), "scale=-2:720");
    }

    #[test]
    fn test_explicit_mode_overrides_probe() {
        assert_eq!(
            HardwareAcceleration::resolve(HardwareAccelMode::None),
            HardwareAcceleration::Software
        );
        let vaapi = EncoderProfile::for_acceleration(
            HardwareAcceleration::resolve(HardwareAccelMode::Vaapi),
            &EncodingConfig::default(),
        );
        assert_eq!(vaapi.codec, "h264_vaapi");
        assert_eq!(vaapi.input_options, vec!["-vaapi_device", VAAPI_DEVICE]);
    }
}
