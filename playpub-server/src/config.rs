//! Server configuration
//!
//! Defines all configurable parameters for the build server: bind address,
//! job store selection, upload location, worker pacing and the supervisory
//! sweep policy.

use std::path::PathBuf;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to
    pub bind_addr: String,

    /// PostgreSQL URL; builds are kept in memory when unset
    pub database_url: Option<String>,

    /// Root directory holding one sub-directory per build
    pub upload_dir: PathBuf,

    /// Pause taken at every stage checkpoint
    pub stage_delay: Duration,

    /// Maximum number of builds executing at once
    pub max_concurrent_builds: usize,

    /// Ceiling after which a non-terminal build is failed by the sweeper
    pub job_timeout: Duration,

    /// How often the sweeper runs
    pub sweep_interval: Duration,

    /// How long finished builds are kept; forever when unset
    pub retention: Option<Duration>,

    /// External packaging executable; the simulated packager is used when unset
    pub packager_command: Option<String>,

    /// Extra arguments passed to the packaging executable
    pub packager_args: Vec<String>,

    /// Upper bound for a submission body, in bytes
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    /// Creates a configuration with defaults
    pub fn new() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            database_url: None,
            upload_dir: PathBuf::from("uploads"),
            stage_delay: Duration::from_millis(1000),
            max_concurrent_builds: 4,
            job_timeout: Duration::from_secs(1800),
            sweep_interval: Duration::from_secs(30),
            retention: None,
            packager_command: None,
            packager_args: Vec::new(),
            max_upload_bytes: 512 * 1024 * 1024,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Recognised environment variables (all optional):
    /// - PLAYPUB_BIND_ADDR (default: 0.0.0.0:8000)
    /// - DATABASE_URL
    /// - PLAYPUB_UPLOAD_DIR (default: uploads)
    /// - PLAYPUB_STAGE_DELAY_MS (default: 1000)
    /// - PLAYPUB_MAX_CONCURRENT_BUILDS (default: 4)
    /// - PLAYPUB_JOB_TIMEOUT (seconds, default: 1800)
    /// - PLAYPUB_SWEEP_INTERVAL (seconds, default: 30)
    /// - PLAYPUB_RETENTION (seconds)
    /// - PLAYPUB_PACKAGER_CMD
    /// - PLAYPUB_PACKAGER_ARGS (whitespace separated)
    /// - PLAYPUB_MAX_UPLOAD_MB (default: 512)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::new();

        let number = |key: &str| -> anyhow::Result<Option<u64>> {
            lookup(key)
                .filter(|s| !s.trim().is_empty())
                .map(|s| {
                    s.trim()
                        .parse::<u64>()
                        .map_err(|_| anyhow::anyhow!("{} must be a non-negative integer, got '{}'", key, s))
                })
                .transpose()
        };

        let text = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());

        Ok(Self {
            bind_addr: text("PLAYPUB_BIND_ADDR").unwrap_or(defaults.bind_addr),
            database_url: text("DATABASE_URL"),
            upload_dir: text("PLAYPUB_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            stage_delay: number("PLAYPUB_STAGE_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.stage_delay),
            max_concurrent_builds: number("PLAYPUB_MAX_CONCURRENT_BUILDS")?
                .map(|n| n as usize)
                .unwrap_or(defaults.max_concurrent_builds),
            job_timeout: number("PLAYPUB_JOB_TIMEOUT")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.job_timeout),
            sweep_interval: number("PLAYPUB_SWEEP_INTERVAL")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            retention: number("PLAYPUB_RETENTION")?.map(Duration::from_secs),
            packager_command: text("PLAYPUB_PACKAGER_CMD"),
            packager_args: text("PLAYPUB_PACKAGER_ARGS")
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            max_upload_bytes: match number("PLAYPUB_MAX_UPLOAD_MB")? {
                Some(mb) => megabytes(mb)?,
                None => defaults.max_upload_bytes,
            },
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        if self.upload_dir.as_os_str().is_empty() {
            anyhow::bail!("upload_dir cannot be empty");
        }

        if self.max_concurrent_builds == 0 {
            anyhow::bail!("max_concurrent_builds must be greater than 0");
        }

        if self.job_timeout.is_zero() {
            anyhow::bail!("job_timeout must be greater than 0");
        }

        if self.sweep_interval.is_zero() {
            anyhow::bail!("sweep_interval must be greater than 0");
        }

        if self.max_upload_bytes == 0 {
            anyhow::bail!("max_upload_bytes must be greater than 0");
        }

        if let Some(url) = &self.database_url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                anyhow::bail!("DATABASE_URL must be a postgres:// URL");
            }
        }

        Ok(())
    }
}

fn megabytes(mb: u64) -> anyhow::Result<usize> {
    usize::try_from(mb)
        .ok()
        .and_then(|mb| mb.checked_mul(1024 * 1024))
        .ok_or_else(|| anyhow::anyhow!("PLAYPUB_MAX_UPLOAD_MB is too large: {}", mb))
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
