use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8808";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;
const DEFAULT_NMS_THRESHOLD: f32 = 0.45;

#[derive(Debug, Deserialize, Default)]
struct AppConfigFile {
    listen_addr: Option<String>,
    scratch_dir: Option<PathBuf>,
    weights_root: Option<PathBuf>,
    detect: Option<DetectConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectConfigFile {
    backend: Option<String>,
    input_size: Option<u32>,
    confidence_threshold: Option<f32>,
    nms_threshold: Option<f32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Tract,
    Stub,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "tract" => Ok(BackendKind::Tract),
            "stub" => Ok(BackendKind::Stub),
            other => Err(anyhow!(
                "unknown detector backend '{}' (expected 'tract' or 'stub')",
                other
            )),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub listen_addr: String,
    /// Transient artifacts (uploads, annotated outputs) live here.
    pub scratch_dir: PathBuf,
    /// Weight-file candidates are resolved relative to this directory.
    pub weights_root: PathBuf,
    pub detect: DetectSettings,
}

#[derive(Clone, Debug)]
pub struct DetectSettings {
    pub backend: BackendKind,
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub nms_threshold: f32,
}

impl AppConfig {
    /// Reads the TOML file named by `SITEWATCH_CONFIG` when set, then applies
    /// per-field environment overrides, then validates.
    pub fn load() -> Result<Self> {
        let file_cfg = match std::env::var("SITEWATCH_CONFIG").ok() {
            Some(path) => read_config_file(Path::new(&path))?,
            None => AppConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AppConfigFile) -> Result<Self> {
        let detect_file = file.detect.unwrap_or_default();
        let backend = match detect_file.backend {
            Some(name) => name.parse()?,
            None => BackendKind::Tract,
        };
        Ok(Self {
            listen_addr: file
                .listen_addr
                .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
            scratch_dir: file.scratch_dir.unwrap_or_else(std::env::temp_dir),
            weights_root: file.weights_root.unwrap_or_else(|| PathBuf::from(".")),
            detect: DetectSettings {
                backend,
                input_size: detect_file.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
                confidence_threshold: detect_file
                    .confidence_threshold
                    .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
                nms_threshold: detect_file
                    .nms_threshold
                    .unwrap_or(DEFAULT_NMS_THRESHOLD),
            },
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("SITEWATCH_LISTEN_ADDR") {
            self.listen_addr = addr;
        }
        if let Ok(dir) = std::env::var("SITEWATCH_SCRATCH_DIR") {
            self.scratch_dir = PathBuf::from(dir);
        }
        if let Ok(root) = std::env::var("SITEWATCH_WEIGHTS_ROOT") {
            self.weights_root = PathBuf::from(root);
        }
        if let Ok(backend) = std::env::var("SITEWATCH_BACKEND") {
            self.detect.backend = backend.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.listen_addr
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid listen address '{}'", self.listen_addr))?;
        if self.detect.input_size == 0 {
            return Err(anyhow!("detect.input_size must be non-zero"));
        }
        for (name, value) in [
            ("confidence_threshold", self.detect.confidence_threshold),
            ("nms_threshold", self.detect.nms_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("detect.{} must be within [0, 1]", name));
            }
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<AppConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("failed to parse config file {}", path.display()))
}
