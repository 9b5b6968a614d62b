use std::env;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, REFERER, USER_AGENT};

use crate::error::{Result, ScrapeError};

const DEFAULT_LIST_URL: &str = "https://shiraoka-housedo.com/list/";
const DEFAULT_BASE_URL: &str = "https://shiraoka-housedo.com";
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/106.0.0.0 Safari/537.36";
const DEFAULT_ACCEPT_LANGUAGE: &str = "ja,en-US;q=0.9";

/// Everything one run needs. Built once, never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    pub list_url: String,
    pub base_url: String,
    pub user_agent: String,
    pub accept_language: String,
    pub output_dir: PathBuf,
    pub csv_file: String,
    pub json_file: String,
    pub history_file: String,
    pub image_dir: String,
    pub max_items: NonZeroUsize,
    pub skip_processed: bool,
    pub page_delay_ms: u64,
    pub image_delay_ms: u64,
    pub image_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            list_url: DEFAULT_LIST_URL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: DEFAULT_ACCEPT_LANGUAGE.to_string(),
            output_dir: PathBuf::from("."),
            csv_file: "export.csv".to_string(),
            json_file: "export.json".to_string(),
            history_file: "scraping_history.json".to_string(),
            image_dir: "images".to_string(),
            max_items: NonZeroUsize::new(15).unwrap_or(NonZeroUsize::MIN),
            skip_processed: true,
            page_delay_ms: 1000,
            image_delay_ms: 500,
            image_timeout_secs: 10,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let d = Self::default();

        Ok(Self {
            list_url: env_or("LIST_URL", d.list_url),
            base_url: env_or("BASE_URL", d.base_url),
            user_agent: env_or("USER_AGENT", d.user_agent),
            accept_language: env_or("ACCEPT_LANGUAGE", d.accept_language),
            output_dir: env::var("OUTPUT_DIR").map(PathBuf::from).unwrap_or(d.output_dir),
            csv_file: env_or("CSV_FILE", d.csv_file),
            json_file: env_or("JSON_FILE", d.json_file),
            history_file: env_or("HISTORY_FILE", d.history_file),
            image_dir: env_or("IMAGE_DIR", d.image_dir),
            max_items: match env::var("MAX_ITEMS") {
                Ok(v) => parse_max_items(&v)?,
                Err(_) => d.max_items,
            },
            skip_processed: match env::var("SKIP_PROCESSED") {
                Ok(v) => parse_flag("SKIP_PROCESSED", &v)?,
                Err(_) => d.skip_processed,
            },
            page_delay_ms: parse_env("PAGE_DELAY_MS", d.page_delay_ms)?,
            image_delay_ms: parse_env("IMAGE_DELAY_MS", d.image_delay_ms)?,
            image_timeout_secs: parse_env("IMAGE_TIMEOUT_SECS", d.image_timeout_secs)?,
        })
    }

    pub fn csv_path(&self) -> PathBuf {
        self.output_dir.join(&self.csv_file)
    }

    pub fn json_path(&self) -> PathBuf {
        self.output_dir.join(&self.json_file)
    }

    pub fn history_path(&self) -> PathBuf {
        self.output_dir.join(&self.history_file)
    }

    pub fn image_path(&self) -> PathBuf {
        self.output_dir.join(&self.image_dir)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn image_delay(&self) -> Duration {
        Duration::from_millis(self.image_delay_ms)
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.image_timeout_secs)
    }

    /// Headers sent with every request. The catalog page doubles as referer.
    pub fn request_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, header_value(&self.user_agent)?);
        headers.insert(ACCEPT_LANGUAGE, header_value(&self.accept_language)?);
        headers.insert(REFERER, header_value(&self.list_url)?);
        Ok(headers)
    }

    pub fn with_output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.output_dir = dir.as_ref().to_path_buf();
        self
    }
}

/// Requested item count must be a positive integer.
pub fn parse_max_items(raw: &str) -> Result<NonZeroUsize> {
    let n: i64 = raw
        .trim()
        .parse()
        .map_err(|_| ScrapeError::Validation(format!("item count must be a number, got {raw:?}")))?;

    usize::try_from(n)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| ScrapeError::Validation(format!("item count must be at least 1, got {n}")))
}

/// `true/false`, `1/0`, `yes/no`, `on/off`, any case.
pub fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "on" => Ok(true),
        "false" | "0" | "no" | "n" | "off" => Ok(false),
        _ => Err(ScrapeError::Validation(format!("{key} must be a yes/no flag, got {raw:?}"))),
    }
}

fn env_or(key: &str, default: String) -> String {
    env::var(key).unwrap_or(default)
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(v) => v
            .trim()
            .parse()
            .map_err(|_| ScrapeError::Validation(format!("{key} has an invalid value: {v:?}"))),
        Err(_) => Ok(default),
    }
}

fn header_value(v: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(v).map_err(|e| ScrapeError::Validation(format!("bad header value {v:?}: {e}")))
}
