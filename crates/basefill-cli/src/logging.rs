use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// HTTP stack targets that are held to `warn` whatever the base level.
pub const QUIET_TARGETS: &[&str] = &["reqwest", "hyper", "hyper_util", "h2", "rustls"];

/// How the process logs. Built once from CLI flags and config, then handed
/// to [`init`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Base filter, e.g. `info` or `basefill_scrape=debug,info`.
    pub level: String,
    /// One JSON object per line instead of human-readable output.
    pub json: bool,
    pub quiet_targets: Vec<String>,
}

impl LoggingConfig {
    pub fn new(level: impl Into<String>, json: bool) -> Self {
        Self {
            level: level.into(),
            json,
            quiet_targets: QUIET_TARGETS.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// `RUST_LOG` replaces the base level when set; quiet targets apply
    /// either way.
    pub fn filter(&self) -> Result<EnvFilter> {
        let mut filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
            Ok(env) if !env.trim().is_empty() => EnvFilter::try_new(env)
                .with_context(|| format!("invalid {}", EnvFilter::DEFAULT_ENV))?,
            _ => EnvFilter::try_new(&self.level)
                .with_context(|| format!("invalid log level '{}'", self.level))?,
        };
        for target in &self.quiet_targets {
            filter = filter.add_directive(format!("{target}=warn").parse()?);
        }
        Ok(filter)
    }
}

/// Install the global subscriber. Call once, before any work starts.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.filter()?)
        .with_target(true);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))
}
