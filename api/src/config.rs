use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_ENGINE_PROGRAM: &str = "python3";
pub const DEFAULT_ENGINE_ARGS: &str = "model.py";
pub const DEFAULT_ENGINE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_ENGINE_MAX_OUTPUT_BYTES: usize = 1024 * 1024;
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 12;

/// How the prediction engine process is launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Executable to run, looked up on PATH when not absolute.
    pub program: String,
    /// Arguments placed before the ten prediction parameters (e.g. the script path).
    pub leading_args: Vec<String>,
    pub workdir: Option<PathBuf>,
    pub timeout: Duration,
    pub max_output_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_ENGINE_PROGRAM.to_string(),
            leading_args: split_args(DEFAULT_ENGINE_ARGS),
            workdir: None,
            timeout: Duration::from_secs(DEFAULT_ENGINE_TIMEOUT_SECS),
            max_output_bytes: DEFAULT_ENGINE_MAX_OUTPUT_BYTES,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            program: lookup("CROPREC_ENGINE_PROGRAM")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.program),
            leading_args: lookup("CROPREC_ENGINE_ARGS")
                .map(|v| split_args(&v))
                .unwrap_or(defaults.leading_args),
            workdir: lookup("CROPREC_ENGINE_WORKDIR")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            timeout: lookup("CROPREC_ENGINE_TIMEOUT_SECS")
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_output_bytes: lookup("CROPREC_ENGINE_MAX_OUTPUT_BYTES")
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|bytes| *bytes > 0)
                .unwrap_or(defaults.max_output_bytes),
        }
    }
}

fn split_args(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

/// Process-wide settings read once at start-up.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub require_https: bool,
    pub session_ttl: chrono::Duration,
    pub engine: EngineConfig,
}

impl AppConfig {
    /// Read configuration from the environment. `DATABASE_URL` is mandatory.
    pub fn from_env() -> Result<Self, String> {
        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())?;

        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let require_https = std::env::var("CROPREC_REQUIRE_HTTPS")
            .map(|v| v == "true")
            .unwrap_or(false);

        let ttl_hours = std::env::var("CROPREC_SESSION_TTL_HOURS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|h| *h > 0)
            .unwrap_or(DEFAULT_SESSION_TTL_HOURS);

        Ok(Self {
            database_url,
            port,
            require_https,
            session_ttl: chrono::Duration::hours(ttl_hours),
            engine: EngineConfig::from_env(),
        })
    }
}
