//! Runtime configuration with environment overrides.
//!
//! Every knob has a default suitable for local use and a `VENEER_*`
//! environment variable override, checked once at startup.

use std::path::PathBuf;

/// Top-level runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Port for the operator REST surface.
    pub http_port: u16,
    /// Deadline for one target-page fetch attempt, in milliseconds.
    pub fetch_timeout_ms: u64,
    /// Attempt ceiling for transient fetch failures.
    pub max_fetch_attempts: u32,
    /// Confidence floor used for low-confidence annotation.
    pub confidence_floor: f32,
    /// Directory holding persisted theme adapters.
    pub adapter_dir: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            http_port: 8787,
            fetch_timeout_ms: 10_000,
            max_fetch_attempts: 3,
            confidence_floor: crate::discovery::scorer::DEFAULT_CONFIDENCE_FLOOR,
            adapter_dir: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".veneer")
                .join("adapters"),
        }
    }
}

impl RuntimeConfig {
    /// Defaults overlaid with any `VENEER_*` environment overrides.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(port) = env_parse("VENEER_HTTP_PORT") {
            cfg.http_port = port;
        }
        if let Some(ms) = env_parse("VENEER_FETCH_TIMEOUT_MS") {
            cfg.fetch_timeout_ms = ms;
        }
        if let Some(attempts) = env_parse("VENEER_FETCH_ATTEMPTS") {
            cfg.max_fetch_attempts = attempts;
        }
        if let Some(floor) = env_parse::<f32>("VENEER_CONFIDENCE_FLOOR") {
            cfg.confidence_floor = floor.clamp(0.0, 1.0);
        }
        if let Ok(dir) = std::env::var("VENEER_ADAPTER_DIR") {
            if !dir.trim().is_empty() {
                cfg.adapter_dir = PathBuf::from(dir);
            }
        }
        cfg
    }

    /// The fetch-related subset handed to the job runner.
    pub fn runner(&self) -> crate::job::runner::RunnerConfig {
        crate::job::runner::RunnerConfig {
            fetch_timeout_ms: self.fetch_timeout_ms,
            max_fetch_attempts: self.max_fetch_attempts,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.trim().parse().ok()
}
