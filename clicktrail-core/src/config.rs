//! Audit configuration.
//!
//! Values are read once from the environment (or any other key lookup) and
//! may then be overridden field by field by the CLI before validation.

use clicktrail_scanner::Viewport;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Base URL must be an absolute http(s) URL: {0}")]
    InvalidBaseUrl(String),

    #[error("Invalid viewport '{0}' (expected desktop, mobile or name:WIDTHxHEIGHT)")]
    InvalidViewport(String),

    #[error("At least one viewport is required")]
    NoViewports,

    #[error("max_pages must be at least 1")]
    ZeroMaxPages,

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
}

/// Which browser capability drives the audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriverKind {
    #[default]
    Chrome,
    Http,
}

impl FromStr for DriverKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chrome" | "chromium" => Ok(DriverKind::Chrome),
            "http" | "static" => Ok(DriverKind::Http),
            other => Err(format!("unknown driver '{}'", other)),
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverKind::Chrome => f.write_str("chrome"),
            DriverKind::Http => f.write_str("http"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditConfig {
    pub base_url: String,
    pub max_depth: usize,
    pub max_pages: usize,
    pub out_dir: PathBuf,
    pub viewports: Vec<Viewport>,
    pub nav_timeout: Duration,
    pub click_timeout: Duration,
    pub settle_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_elements_per_page: usize,
    pub screenshots: bool,
    pub driver: DriverKind,
    pub headless: bool,
    pub chrome_path: Option<String>,
    pub parallel_viewports: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            max_depth: 5,
            max_pages: 50,
            out_dir: PathBuf::from("audit-output"),
            viewports: vec![Viewport::desktop(), Viewport::mobile()],
            nav_timeout: Duration::from_millis(15_000),
            click_timeout: Duration::from_millis(5_000),
            settle_timeout: Duration::from_millis(3_000),
            idle_timeout: Duration::from_millis(5_000),
            max_elements_per_page: 100,
            screenshots: true,
            driver: DriverKind::Chrome,
            headless: true,
            chrome_path: None,
            parallel_viewports: false,
        }
    }
}

impl AuditConfig {
    /// Read the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup. Missing or empty
    /// keys keep their defaults. The result is validated.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(url) = get("BASE_URL") {
            config.base_url = url.trim().to_string();
        }
        if let Some(value) = get("MAX_DEPTH") {
            config.max_depth = parse_number("MAX_DEPTH", &value)?;
        }
        if let Some(value) = get("MAX_PAGES") {
            config.max_pages = parse_number("MAX_PAGES", &value)?;
        }
        if let Some(dir) = get("OUT_DIR") {
            config.out_dir = expand_path(&dir);
        }
        if let Some(value) = get("VIEWPORTS") {
            config.viewports = parse_viewports(&value)?;
        }
        if let Some(value) = get("NAV_TIMEOUT_MS") {
            config.nav_timeout = parse_millis("NAV_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = get("CLICK_TIMEOUT_MS") {
            config.click_timeout = parse_millis("CLICK_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = get("SETTLE_TIMEOUT_MS") {
            config.settle_timeout = parse_millis("SETTLE_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = get("IDLE_TIMEOUT_MS") {
            config.idle_timeout = parse_millis("IDLE_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = get("MAX_ELEMENTS") {
            config.max_elements_per_page = parse_number("MAX_ELEMENTS", &value)?;
        }
        if let Some(value) = get("SCREENSHOTS") {
            config.screenshots = parse_bool("SCREENSHOTS", &value)?;
        }
        if let Some(value) = get("DRIVER") {
            config.driver = value
                .parse()
                .map_err(|reason| invalid("DRIVER", &value, reason))?;
        }
        if let Some(value) = get("HEADLESS") {
            config.headless = parse_bool("HEADLESS", &value)?;
        }
        if let Some(path) = get("CHROME_PATH") {
            config.chrome_path = Some(expand_path(&path).display().to_string());
        }
        if let Some(value) = get("PARALLEL_VIEWPORTS") {
            config.parallel_viewports = parse_bool("PARALLEL_VIEWPORTS", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match Url::parse(&self.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {}
            _ => return Err(ConfigError::InvalidBaseUrl(self.base_url.clone())),
        }

        if self.max_pages == 0 {
            return Err(ConfigError::ZeroMaxPages);
        }
        if self.viewports.is_empty() {
            return Err(ConfigError::NoViewports);
        }

        let timeouts = [
            ("nav_timeout", self.nav_timeout),
            ("click_timeout", self.click_timeout),
            ("settle_timeout", self.settle_timeout),
            ("idle_timeout", self.idle_timeout),
        ];
        for (name, timeout) in timeouts {
            if timeout.is_zero() {
                return Err(ConfigError::ZeroTimeout(name));
            }
        }

        Ok(())
    }

    /// Viewport used for the discovery crawl.
    pub fn primary_viewport(&self) -> &Viewport {
        &self.viewports[0]
    }

    /// Screenshot root directory, or `None` when screenshots are disabled.
    pub fn screenshot_root(&self) -> Option<PathBuf> {
        self.screenshots.then(|| self.out_dir.join("screenshots"))
    }
}

/// Parse a comma-separated viewport list such as `desktop,tablet:768x1024`.
pub fn parse_viewports(value: &str) -> Result<Vec<Viewport>, ConfigError> {
    let mut viewports: Vec<Viewport> = Vec::new();

    for item in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let viewport: Viewport = item
            .parse()
            .map_err(|_| ConfigError::InvalidViewport(item.to_string()))?;
        if !viewports.iter().any(|v| v.name == viewport.name) {
            viewports.push(viewport);
        }
    }

    if viewports.is_empty() {
        return Err(ConfigError::NoViewports);
    }
    Ok(viewports)
}

/// Tilde-expand a user-supplied path.
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path.trim()).as_ref())
}

fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse_number(key: &'static str, value: &str) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|e: std::num::ParseIntError| invalid(key, value, e.to_string()))
}

fn parse_millis(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let millis: u64 = value
        .trim()
        .parse()
        .map_err(|e: std::num::ParseIntError| invalid(key, value, e.to_string()))?;
    Ok(Duration::from_millis(millis))
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value, "expected true or false")),
    }
}
