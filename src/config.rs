use std::path::PathBuf;
use std::str::FromStr;

use crate::pipeline::extraction::ThresholdConfig;
use crate::pipeline::structuring::GenerationOptions;

/// Application-level constants
pub const APP_NAME: &str = "MediMitra";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default Ollama endpoint for both the text and the vision model.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Default model for prescription structuring and for vision OCR.
pub const DEFAULT_MODEL: &str = "dcarrascosa/medgemma-1.5-4b-it";

/// Default HTTP timeout for a single model call (5 minutes).
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

const ENV_SCHEDULE_FILE: &str = "MEDIMITRA_SCHEDULE_FILE";
const ENV_DATABASE_PATH: &str = "MEDIMITRA_DATABASE_PATH";
const ENV_OLLAMA_URL: &str = "MEDIMITRA_OLLAMA_URL";
const ENV_TEXT_MODEL: &str = "MEDIMITRA_TEXT_MODEL";
const ENV_VISION_MODEL: &str = "MEDIMITRA_VISION_MODEL";
const ENV_REQUEST_TIMEOUT: &str = "MEDIMITRA_REQUEST_TIMEOUT_SECS";
const ENV_THRESHOLD_BLOCK: &str = "MEDIMITRA_THRESHOLD_BLOCK_SIZE";
const ENV_THRESHOLD_C: &str = "MEDIMITRA_THRESHOLD_C";
const ENV_TEMPERATURE: &str = "MEDIMITRA_TEMPERATURE";

/// Get the application data directory
/// ~/MediMitra/ on all platforms, current directory if no home is known.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default location of the family schedule file.
pub fn default_schedule_path() -> PathBuf {
    app_data_dir().join("schedule.json")
}

/// Default location of the member/medicine document database.
pub fn default_database_path() -> PathBuf {
    app_data_dir().join("medimitra.db")
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "info,medimitra_lib=debug"
}

/// Everything needed to assemble the prescription pipeline at startup.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub schedule_path: PathBuf,
    pub database_path: PathBuf,
    pub ollama_url: String,
    pub text_model: String,
    pub vision_model: String,
    pub request_timeout_secs: u64,
    pub threshold: ThresholdConfig,
    pub generation: GenerationOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            schedule_path: default_schedule_path(),
            database_path: default_database_path(),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            text_model: DEFAULT_MODEL.to_string(),
            vision_model: DEFAULT_MODEL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            threshold: ThresholdConfig::default(),
            generation: GenerationOptions::default(),
        }
    }
}

impl PipelineConfig {
    /// Read overrides from `MEDIMITRA_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Unset keys keep defaults;
    /// unparseable numbers keep defaults and log a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let threshold = ThresholdConfig {
            block_size: parse_or(&lookup, ENV_THRESHOLD_BLOCK, defaults.threshold.block_size),
            constant: parse_or(&lookup, ENV_THRESHOLD_C, defaults.threshold.constant),
        };
        let threshold = if threshold.is_valid() {
            threshold
        } else {
            tracing::warn!(
                block_size = threshold.block_size,
                "Threshold block size must be odd and at least 3, using default"
            );
            ThresholdConfig {
                block_size: defaults.threshold.block_size,
                ..threshold
            }
        };

        let generation = GenerationOptions {
            temperature: parse_or(&lookup, ENV_TEMPERATURE, defaults.generation.temperature),
            ..defaults.generation
        };

        Self {
            schedule_path: lookup(ENV_SCHEDULE_FILE)
                .map(PathBuf::from)
                .unwrap_or(defaults.schedule_path),
            database_path: lookup(ENV_DATABASE_PATH)
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            ollama_url: lookup(ENV_OLLAMA_URL).unwrap_or(defaults.ollama_url),
            text_model: lookup(ENV_TEXT_MODEL).unwrap_or(defaults.text_model),
            vision_model: lookup(ENV_VISION_MODEL).unwrap_or(defaults.vision_model),
            request_timeout_secs: parse_or(
                &lookup,
                ENV_REQUEST_TIMEOUT,
                defaults.request_timeout_secs,
            ),
            threshold,
            generation,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Ignoring unparseable config override");
            default
        }),
    }
}
