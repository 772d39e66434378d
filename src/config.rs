use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{MarketError, MarketResult};

/// Environment variable that points at an explicit config file.
pub const CONFIG_ENV: &str = "MARKETHAND_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub images: ImagesConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub locator: LocatorConfig,
    #[serde(default)]
    pub input: InputConfig,
    /// Declared UI map. Parents must appear before their children.
    #[serde(default)]
    pub elements: Vec<ElementEntry>,
    /// Directory the config was loaded from; relative paths resolve against it.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagesConfig {
    #[serde(default = "default_images_dir")]
    pub dir: PathBuf,
    /// Create an empty directory instead of failing when `dir` is missing.
    #[serde(default = "default_true")]
    pub create_if_missing: bool,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            dir: default_images_dir(),
            create_if_missing: true,
        }
    }
}

fn default_images_dir() -> PathBuf {
    PathBuf::from("images")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Falls back to the platform default install location.
    #[serde(default)]
    pub tesseract_path: Option<PathBuf>,
    /// Extra arguments passed to tesseract before the output format.
    #[serde(default = "default_ocr_args")]
    pub args: Vec<String>,
    #[serde(default)]
    pub language: Option<String>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tesseract_path: None,
            args: default_ocr_args(),
            language: None,
        }
    }
}

fn default_ocr_args() -> Vec<String> {
    vec!["--psm".to_string(), "8".to_string()]
}

impl OcrConfig {
    pub fn resolved_tesseract_path(&self) -> PathBuf {
        self.tesseract_path
            .clone()
            .unwrap_or_else(default_tesseract_path)
    }
}

#[cfg(target_os = "windows")]
fn default_tesseract_path() -> PathBuf {
    PathBuf::from(r"C:\Program Files\Tesseract-OCR\tesseract.exe")
}

#[cfg(target_os = "macos")]
fn default_tesseract_path() -> PathBuf {
    PathBuf::from("/usr/local/bin/tesseract")
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn default_tesseract_path() -> PathBuf {
    PathBuf::from("/usr/bin/tesseract")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocatorConfig {
    /// Match confidence for waits and visibility checks.
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Match confidence for image clicks.
    #[serde(default = "default_click_confidence")]
    pub click_confidence: f64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_text_poll_interval_ms")]
    pub text_poll_interval_ms: u64,
    #[serde(default = "default_recovery_every_ms")]
    pub recovery_every_ms: u64,
    /// Image clicked while a wait keeps failing (disconnect dialogs etc).
    #[serde(default)]
    pub recovery_image: Option<String>,
    #[serde(default = "default_visible_timeout_ms")]
    pub visible_timeout_ms: u64,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            confidence: default_confidence(),
            click_confidence: default_click_confidence(),
            poll_interval_ms: default_poll_interval_ms(),
            text_poll_interval_ms: default_text_poll_interval_ms(),
            recovery_every_ms: default_recovery_every_ms(),
            recovery_image: None,
            visible_timeout_ms: default_visible_timeout_ms(),
        }
    }
}

impl LocatorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn text_poll_interval(&self) -> Duration {
        Duration::from_millis(self.text_poll_interval_ms)
    }

    pub fn recovery_every(&self) -> Duration {
        Duration::from_millis(self.recovery_every_ms)
    }

    pub fn visible_timeout(&self) -> Duration {
        Duration::from_millis(self.visible_timeout_ms)
    }
}

fn default_confidence() -> f64 {
    0.85
}

fn default_click_confidence() -> f64 {
    0.9
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_text_poll_interval_ms() -> u64 {
    1000
}

fn default_recovery_every_ms() -> u64 {
    5000
}

fn default_visible_timeout_ms() -> u64 {
    6000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Delay before every element click.
    #[serde(default = "default_pre_click_delay_ms")]
    pub pre_click_delay_ms: u64,
    /// Delay before searching the screen for an image to click.
    #[serde(default = "default_image_settle_ms")]
    pub image_settle_ms: u64,
    /// Delay after an image click so the UI can react.
    #[serde(default = "default_after_image_click_ms")]
    pub after_image_click_ms: u64,
    /// Abort clicks while the pointer is parked at the screen origin.
    #[serde(default)]
    pub fail_safe: bool,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            pre_click_delay_ms: default_pre_click_delay_ms(),
            image_settle_ms: default_image_settle_ms(),
            after_image_click_ms: default_after_image_click_ms(),
            fail_safe: false,
        }
    }
}

fn default_pre_click_delay_ms() -> u64 {
    300
}

fn default_image_settle_ms() -> u64 {
    500
}

fn default_after_image_click_ms() -> u64 {
    2000
}

/// One declared element of the UI map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ElementEntry {
    pub name: String,
    /// Offset from the parent, or absolute screen position for roots.
    #[serde(default)]
    pub offset: Option<[i32; 2]>,
    #[serde(default)]
    pub parent: Option<String>,
    /// Reference image name; defaults to `name`, empty string disables it.
    #[serde(default)]
    pub image: Option<String>,
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Image directory with relative paths anchored at the config file.
    pub fn images_dir(&self) -> PathBuf {
        resolve_relative(self.base_dir.as_deref(), &self.images.dir)
    }
}

fn resolve_relative(base: Option<&Path>, path: &Path) -> PathBuf {
    match base {
        Some(base) if path.is_relative() => base.join(path),
        _ => path.to_path_buf(),
    }
}

fn resolve_config_path() -> MarketResult<PathBuf> {
    if let Ok(explicit) = std::env::var(CONFIG_ENV) {
        let candidate = PathBuf::from(explicit);
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config found via {CONFIG_ENV}");
            return Ok(candidate);
        }
        return Err(MarketError::Config(format!(
            "{CONFIG_ENV} points at {} which does not exist",
            candidate.display()
        )));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    if let Some(config_dir) = dirs::config_dir() {
        let candidate = config_dir.join("markethand").join("config.toml");
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config found in user config dir");
            return Ok(candidate);
        }
    }

    Err(MarketError::Config(
        "config.toml not found next to executable, in working directory or user config dir".into(),
    ))
}

/// Load the config from an explicit path, or resolve it when `None`.
pub fn load_config(path: Option<&Path>) -> MarketResult<AppConfig> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => resolve_config_path()?,
    };
    let content = std::fs::read_to_string(&path)?;
    let mut config = parse_config(&content)?;
    config.base_dir = path.parent().map(Path::to_path_buf);
    tracing::info!(
        path = %path.display(),
        elements = config.elements.len(),
        "config loaded"
    );
    Ok(config)
}

pub fn parse_config(content: &str) -> MarketResult<AppConfig> {
    let config: AppConfig = toml::from_str(content)?;
    for (field, value) in [
        ("locator.confidence", config.locator.confidence),
        ("locator.click_confidence", config.locator.click_confidence),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(MarketError::Config(format!(
                "{field} must be within 0..=1, got {value}"
            )));
        }
    }
    Ok(config)
}

pub fn save_config(config: &AppConfig, path: &Path) -> MarketResult<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}
