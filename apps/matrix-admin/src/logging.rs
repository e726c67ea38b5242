//! Log setup for the admin binary.
//!
//! The filter is taken from `MATRIX_LOGLEVEL`, then `RUST_LOG`, and falls
//! back to [`DEFAULT_FILTER`]. The subscriber is scoped: it is active while
//! the returned [`Logging`] guard lives.

use tracing::dispatcher::DefaultGuard;
use tracing_subscriber::EnvFilter;

pub const LOGLEVEL_ENV: &str = "MATRIX_LOGLEVEL";
pub const DEFAULT_FILTER: &str = "warn,matrix=info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub filter: String,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            ansi: true,
        }
    }
}

impl LoggingConfig {
    /// Reads the filter from the environment.
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var(LOGLEVEL_ENV).ok(),
            std::env::var(EnvFilter::DEFAULT_ENV).ok(),
        )
    }

    fn from_vars(matrix: Option<String>, rust_log: Option<String>) -> Self {
        let filter = [matrix, rust_log]
            .into_iter()
            .flatten()
            .map(|f| f.trim().to_string())
            .find(|f| !f.is_empty())
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());
        Self {
            filter,
            ..Self::default()
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.filter).unwrap_or_else(|e| {
            eprintln!("invalid log filter {:?} ({e}), using {DEFAULT_FILTER:?}", self.filter);
            EnvFilter::new(DEFAULT_FILTER)
        })
    }
}

/// Installed log subscriber. Dropping it removes the subscriber.
pub struct Logging {
    _guard: DefaultGuard,
}

impl Logging {
    pub fn install(config: &LoggingConfig) -> Self {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(config.env_filter())
            .with_ansi(config.ansi)
            .with_writer(std::io::stderr)
            .finish();
        Self {
            _guard: tracing::subscriber::set_default(subscriber),
        }
    }
}
