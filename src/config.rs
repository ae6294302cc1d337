use anyhow::{anyhow, Result};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use crate::annotate::{DEFAULT_JPEG_QUALITY, DEFAULT_SNAPSHOT_PATH};
use crate::cooldown::DEFAULT_COOLDOWN;
use crate::detect::{yolo::YoloParams, COCO_CAT, COCO_LABELS, DEFAULT_CONFIDENCE_THRESHOLD};
use crate::motion::{DEFAULT_AREA_THRESHOLD, DEFAULT_PIXEL_CUTOFF};
use crate::notify::DEFAULT_TELEGRAM_API;

const DEFAULT_DEVICE: &str = "/dev/video0";
const DEFAULT_WIDTH: u32 = 1920;
const DEFAULT_HEIGHT: u32 = 1080;
const DEFAULT_MODEL: &str = "yolov5n.onnx";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;
const DEFAULT_RETRY_DELAY_SECS: u64 = 5;

/// Model value that selects the scripted stub backend.
pub const STUB_MODEL: &str = "stub";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CatwatchConfigFile {
    camera: Option<CameraConfigFile>,
    motion: Option<MotionConfigFile>,
    detector: Option<DetectorConfigFile>,
    telegram: Option<TelegramConfigFile>,
    timing: Option<TimingConfigFile>,
    snapshot: Option<SnapshotConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct MotionConfigFile {
    pixel_cutoff: Option<u8>,
    area_threshold: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
    model: Option<String>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    target_class: Option<usize>,
    confidence_threshold: Option<f32>,
    score_floor: Option<f32>,
    iou_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TelegramConfigFile {
    api_base: Option<String>,
    bot_token: Option<String>,
    chat_id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TimingConfigFile {
    poll_interval_secs: Option<u64>,
    cooldown_secs: Option<u64>,
    retry_delay_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SnapshotConfigFile {
    path: Option<PathBuf>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Clone)]
pub struct CatwatchConfig {
    pub camera: CameraSettings,
    pub motion: MotionSettings,
    pub detector: DetectorSettings,
    /// `None` when no bot token is configured (notifications are only logged).
    pub telegram: Option<TelegramSettings>,
    pub timing: TimingSettings,
    pub snapshot: SnapshotSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraSettings {
    /// `/dev/videoN`, `stub://name`, or an `http(s)://` snapshot URL.
    pub device: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotionSettings {
    pub pixel_cutoff: u8,
    pub area_threshold: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    /// ONNX model path, or `stub`.
    pub model: String,
    pub target_class: usize,
    pub confidence_threshold: f32,
    pub yolo: YoloParams,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramSettings {
    pub api_base: String,
    pub bot_token: String,
    pub chat_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingSettings {
    pub poll_interval: Duration,
    pub cooldown: Duration,
    pub retry_delay: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotSettings {
    pub path: PathBuf,
    pub jpeg_quality: u8,
}

impl Default for CatwatchConfig {
    fn default() -> Self {
        Self::from_file(CatwatchConfigFile::default())
    }
}

impl CatwatchConfig {
    /// Load from `CATWATCH_CONFIG` (if set), then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CATWATCH_CONFIG").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Load from an explicit file (JSON, or TOML by extension), then apply env overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => CatwatchConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CatwatchConfigFile) -> Self {
        let camera = file.camera.unwrap_or_default();
        let motion = file.motion.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let timing = file.timing.unwrap_or_default();
        let snapshot = file.snapshot.unwrap_or_default();
        let yolo_defaults = YoloParams::default();

        let telegram = file.telegram.and_then(|tg| {
            let has_credentials = tg.bot_token.is_some() || tg.chat_id.is_some();
            has_credentials.then(|| TelegramSettings {
                api_base: tg
                    .api_base
                    .unwrap_or_else(|| DEFAULT_TELEGRAM_API.to_string()),
                bot_token: tg.bot_token.unwrap_or_default(),
                chat_id: tg.chat_id.unwrap_or_default(),
            })
        });

        Self {
            camera: CameraSettings {
                device: camera.device.unwrap_or_else(|| DEFAULT_DEVICE.to_string()),
                width: camera.width.unwrap_or(DEFAULT_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_HEIGHT),
            },
            motion: MotionSettings {
                pixel_cutoff: motion.pixel_cutoff.unwrap_or(DEFAULT_PIXEL_CUTOFF),
                area_threshold: motion.area_threshold.unwrap_or(DEFAULT_AREA_THRESHOLD),
            },
            detector: DetectorSettings {
                model: detector.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                target_class: detector.target_class.unwrap_or(COCO_CAT),
                confidence_threshold: detector
                    .confidence_threshold
                    .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
                yolo: YoloParams {
                    input_width: detector.input_width.unwrap_or(yolo_defaults.input_width),
                    input_height: detector.input_height.unwrap_or(yolo_defaults.input_height),
                    score_floor: detector.score_floor.unwrap_or(yolo_defaults.score_floor),
                    iou_threshold: detector
                        .iou_threshold
                        .unwrap_or(yolo_defaults.iou_threshold),
                    max_detections: yolo_defaults.max_detections,
                },
            },
            telegram,
            timing: TimingSettings {
                poll_interval: Duration::from_secs(
                    timing
                        .poll_interval_secs
                        .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
                ),
                cooldown: timing
                    .cooldown_secs
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_COOLDOWN),
                retry_delay: Duration::from_secs(
                    timing.retry_delay_secs.unwrap_or(DEFAULT_RETRY_DELAY_SECS),
                ),
            },
            snapshot: SnapshotSettings {
                path: snapshot
                    .path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_PATH)),
                jpeg_quality: snapshot.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(device) = non_empty_env("CATWATCH_DEVICE") {
            self.camera.device = device;
        }
        if let Some(model) = non_empty_env("CATWATCH_MODEL_PATH") {
            self.detector.model = model;
        }
        if let Some(path) = non_empty_env("CATWATCH_SNAPSHOT_PATH") {
            self.snapshot.path = PathBuf::from(path);
        }

        let token = non_empty_env("CATWATCH_BOT_TOKEN");
        let chat_id = non_empty_env("CATWATCH_CHAT_ID");
        let api_base = non_empty_env("CATWATCH_TELEGRAM_API");
        if token.is_some() || chat_id.is_some() || api_base.is_some() {
            let telegram = self.telegram.get_or_insert_with(|| TelegramSettings {
                api_base: DEFAULT_TELEGRAM_API.to_string(),
                bot_token: String::new(),
                chat_id: String::new(),
            });
            if let Some(token) = token {
                telegram.bot_token = token;
            }
            if let Some(chat_id) = chat_id {
                telegram.chat_id = chat_id;
            }
            if let Some(api_base) = api_base {
                telegram.api_base = api_base;
            }
        }

        if let Some(secs) = env_secs("CATWATCH_COOLDOWN_SECS")? {
            self.timing.cooldown = secs;
        }
        if let Some(secs) = env_secs("CATWATCH_POLL_INTERVAL_SECS")? {
            self.timing.poll_interval = secs;
        }
        if let Some(secs) = env_secs("CATWATCH_RETRY_DELAY_SECS")? {
            self.timing.retry_delay = secs;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.camera.device.trim().is_empty() {
            return Err(anyhow!("camera device must not be empty"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera resolution must be non-zero"));
        }
        if self.detector.model.trim().is_empty() {
            return Err(anyhow!("detector model must not be empty"));
        }
        if self.detector.target_class >= COCO_LABELS.len() {
            return Err(anyhow!(
                "detector target_class {} is outside the {} COCO classes",
                self.detector.target_class,
                COCO_LABELS.len()
            ));
        }
        for (name, value) in [
            ("confidence_threshold", self.detector.confidence_threshold),
            ("score_floor", self.detector.yolo.score_floor),
            ("iou_threshold", self.detector.yolo.iou_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("detector {} must be within 0..=1", name));
            }
        }
        if self.detector.yolo.input_width == 0 || self.detector.yolo.input_height == 0 {
            return Err(anyhow!("detector input size must be non-zero"));
        }
        if self.timing.poll_interval.is_zero() {
            return Err(anyhow!("poll interval must be greater than zero"));
        }
        if self.timing.retry_delay.is_zero() {
            return Err(anyhow!("capture retry delay must be greater than zero"));
        }
        if !(1..=100).contains(&self.snapshot.jpeg_quality) {
            return Err(anyhow!("snapshot jpeg_quality must be within 1..=100"));
        }
        if let Some(telegram) = &self.telegram {
            validate_telegram(telegram)?;
        }
        Ok(())
    }
}

fn validate_telegram(telegram: &TelegramSettings) -> Result<()> {
    static TOKEN_RE: OnceLock<Regex> = OnceLock::new();
    static CHAT_RE: OnceLock<Regex> = OnceLock::new();
    let token_re = TOKEN_RE.get_or_init(|| {
        Regex::new(r"^[0-9]+:[A-Za-z0-9_-]+$").expect("static regex is valid")
    });
    let chat_re = CHAT_RE.get_or_init(|| {
        Regex::new(r"^(-?[0-9]+|@[A-Za-z][A-Za-z0-9_]{4,})$").expect("static regex is valid")
    });

    if !token_re.is_match(&telegram.bot_token) {
        return Err(anyhow!(
            "telegram bot_token must look like <bot id>:<secret>"
        ));
    }
    if !chat_re.is_match(&telegram.chat_id) {
        return Err(anyhow!(
            "telegram chat_id must be a numeric id or an @channel name"
        ));
    }
    if !(telegram.api_base.starts_with("https://") || telegram.api_base.starts_with("http://")) {
        return Err(anyhow!("telegram api_base must be an http(s) URL"));
    }
    Ok(())
}

fn read_config_file(path: &Path) -> Result<CatwatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_secs(key: &str) -> Result<Option<Duration>> {
    match non_empty_env(key) {
        Some(value) => {
            let seconds: u64 = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("{} must be an integer number of seconds", key))?;
            Ok(Some(Duration::from_secs(seconds)))
        }
        None => Ok(None),
    }
}
