use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use upscaler_core::types::{DevicePreference, ResampleMode};
use upscaler_core::validation::DEFAULT_MAX_OUTPUT_PIXELS;

/// A configuration variable that is set but cannot be parsed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {var}")]
    Invalid { var: &'static str, value: String },
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `127.0.0.1`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `120`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for running jobs, in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Maximum multipart body size (default: 50 MiB).
    pub max_upload_bytes: usize,
    /// Root directory for result artifacts.
    pub output_dir: PathBuf,
    /// Directory holding per-scale weight files, if weights are checked.
    pub weights_dir: Option<PathBuf>,
    pub device: DevicePreference,
    /// Worker-pool size for upscale jobs (default: `2`).
    pub max_concurrent_jobs: usize,
    /// Substituted for unrecognised resampling modes.
    pub default_resample_mode: ResampleMode,
    /// Bound on a single progress send attempt, in milliseconds.
    pub progress_send_timeout_ms: u64,
    /// Largest accepted output image, in pixels (default: 8192 x 8192).
    pub max_output_pixels: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
            cors_origins: vec!["http://localhost:3000".into()],
            request_timeout_secs: 120,
            shutdown_timeout_secs: 30,
            max_upload_bytes: 50 * 1024 * 1024,
            output_dir: PathBuf::from("results/images"),
            weights_dir: None,
            device: DevicePreference::Auto,
            max_concurrent_jobs: 2,
            default_resample_mode: ResampleMode::Bicubic,
            progress_send_timeout_ms: 250,
            max_output_pixels: DEFAULT_MAX_OUTPUT_PIXELS,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                 |
    /// |----------------------------|-------------------------|
    /// | `HOST`                     | `127.0.0.1`             |
    /// | `PORT`                     | `8000`                  |
    /// | `CORS_ORIGINS`             | `http://localhost:3000` |
    /// | `REQUEST_TIMEOUT_SECS`     | `120`                   |
    /// | `SHUTDOWN_TIMEOUT_SECS`    | `30`                    |
    /// | `MAX_UPLOAD_BYTES`         | `52428800`              |
    /// | `OUTPUT_DIR`               | `results/images`        |
    /// | `WEIGHTS_DIR`              | unset                   |
    /// | `DEVICE`                   | `auto`                  |
    /// | `MAX_CONCURRENT_JOBS`      | `2`                     |
    /// | `DEFAULT_RESAMPLE_MODE`    | `bicubic`               |
    /// | `PROGRESS_SEND_TIMEOUT_MS` | `250`                   |
    /// | `MAX_OUTPUT_PIXELS`        | `67108864`              |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let cors_origins = match var("CORS_ORIGINS") {
            Some(raw) => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => defaults.cors_origins,
        };

        Ok(Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: parse_or(&var, "PORT", defaults.port)?,
            cors_origins,
            request_timeout_secs: parse_or(
                &var,
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            )?,
            shutdown_timeout_secs: parse_or(
                &var,
                "SHUTDOWN_TIMEOUT_SECS",
                defaults.shutdown_timeout_secs,
            )?,
            max_upload_bytes: parse_or(&var, "MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            output_dir: var("OUTPUT_DIR").map(PathBuf::from).unwrap_or(defaults.output_dir),
            weights_dir: var("WEIGHTS_DIR").map(PathBuf::from),
            device: parse_or(&var, "DEVICE", defaults.device)?,
            max_concurrent_jobs: parse_or(
                &var,
                "MAX_CONCURRENT_JOBS",
                defaults.max_concurrent_jobs,
            )?
            .max(1),
            default_resample_mode: parse_or(
                &var,
                "DEFAULT_RESAMPLE_MODE",
                defaults.default_resample_mode,
            )?,
            progress_send_timeout_ms: parse_or(
                &var,
                "PROGRESS_SEND_TIMEOUT_MS",
                defaults.progress_send_timeout_ms,
            )?,
            max_output_pixels: parse_or(&var, "MAX_OUTPUT_PIXELS", defaults.max_output_pixels)?,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn progress_send_timeout(&self) -> Duration {
        Duration::from_millis(self.progress_send_timeout_ms)
    }
}

fn parse_or<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match var(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            var: name,
            value: raw,
        }),
    }
}
