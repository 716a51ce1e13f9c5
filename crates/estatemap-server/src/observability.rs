//! Tracing setup for the EstateMap host.
//!
//! [`init_from_config`] installs a `fmt` subscriber filtered by
//! `[logging].level`. A parseable `RUST_LOG` wins over the configured level,
//! so per-target filters such as `estatemap_cache=debug` need no config
//! change. The filter sits behind a reload layer and [`apply_logging_level`]
//! swaps it at runtime.
//!
//! Only the first initialization in a process installs a subscriber; later
//! calls are no-ops and report `false`.

use std::sync::OnceLock;

use tracing_subscriber::filter::ParseError;
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

use crate::config::LoggingConfig;

type FilterHandle = reload::Handle<EnvFilter, Registry>;

static FILTER_HANDLE: OnceLock<FilterHandle> = OnceLock::new();

const FALLBACK_LEVEL: &str = "info";

/// Why a runtime level change was refused.
#[derive(Debug, thiserror::Error)]
pub enum LogLevelError {
    #[error("tracing was not initialized through estatemap_server::observability")]
    NotInitialized,

    #[error("invalid log filter '{filter}': {source}")]
    InvalidFilter { filter: String, source: ParseError },

    #[error("subscriber is gone: {0}")]
    Reload(#[from] reload::Error),
}

/// Initialize tracing at `info`.
pub fn init_tracing() -> bool {
    init_tracing_with_level(FALLBACK_LEVEL)
}

/// Initialize tracing at `level`, unless `RUST_LOG` is set.
///
/// An unparseable `level` falls back to `info` with a warning once the
/// subscriber is up. Returns whether this call installed the subscriber.
pub fn init_tracing_with_level(level: &str) -> bool {
    let (filter, rejected) = match base_filter(level) {
        Ok(filter) => (filter, None),
        Err(e) => (EnvFilter::new(FALLBACK_LEVEL), Some(e)),
    };

    let (reload_layer, handle) = reload::Layer::new(filter);
    let installed = tracing_subscriber::registry()
        .with(reload_layer)
        .with(fmt::layer())
        .try_init()
        .is_ok();

    if installed {
        let _ = FILTER_HANDLE.set(handle);
        if let Some(e) = rejected {
            tracing::warn!(level = %level, error = %e, "invalid log level, using {FALLBACK_LEVEL}");
        }
    }
    installed
}

/// Initialize tracing from the `[logging]` section.
pub fn init_from_config(logging: &LoggingConfig) -> bool {
    init_tracing_with_level(&logging.level)
}

/// Replace the active filter with `level`.
///
/// `RUST_LOG` is not consulted; an explicit change overrides it.
pub fn apply_logging_level(level: &str) -> Result<(), LogLevelError> {
    let handle = FILTER_HANDLE.get().ok_or(LogLevelError::NotInitialized)?;
    let filter = parse_filter(level)?;
    handle.reload(filter)?;
    tracing::info!(level = %level, "log level changed");
    Ok(())
}

fn base_filter(level: &str) -> Result<EnvFilter, LogLevelError> {
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
    }
    parse_filter(level)
}

fn parse_filter(level: &str) -> Result<EnvFilter, LogLevelError> {
    EnvFilter::try_new(level).map_err(|source| LogLevelError::InvalidFilter {
        filter: level.to_string(),
        source,
    })
}
