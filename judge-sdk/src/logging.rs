//! Structured logging setup

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

use crate::config::{ConfigProvider, ConfigProviderExt};
use crate::error::{JudgeError, Result};

static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Configuration for the logging system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive (trace, debug, info, warn, error) when `RUST_LOG` is unset
    pub level: String,
    /// Emit one JSON object per event instead of human readable lines
    pub json_format: bool,
    /// Service name attached to the startup event
    pub service_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            service_name: "judge-sdk".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Read `log_level`, `log_json` and `service_name`
    pub fn from_provider<P: ConfigProvider + ?Sized>(provider: &P) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            level: provider.get_string_or("log_level", &defaults.level),
            json_format: provider.get_bool_or("log_json", defaults.json_format)?,
            service_name: provider.get_string_or("service_name", &defaults.service_name),
        })
    }
}

/// Install the global tracing subscriber
///
/// Safe to call more than once; only the first call has an effect.
pub fn init_logging(config: Option<LoggingConfig>) -> Result<()> {
    if LOGGING_INITIALIZED.load(Ordering::SeqCst) {
        return Ok(());
    }

    let config = config.unwrap_or_default();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = Registry::default().with(filter);

    let installed = if config.json_format {
        let json_layer = fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true);
        tracing::subscriber::set_global_default(subscriber.with(json_layer))
    } else {
        let text_layer = fmt::layer().with_target(true).with_thread_ids(true);
        tracing::subscriber::set_global_default(subscriber.with(text_layer))
    };

    if let Err(e) = installed {
        // Another subscriber owns the process; later calls become no-ops.
        LOGGING_INITIALIZED.store(true, Ordering::SeqCst);
        return Err(JudgeError::configuration(format!(
            "Failed to set global subscriber: {}",
            e
        )));
    }

    LOGGING_INITIALIZED.store(true, Ordering::SeqCst);

    tracing::info!(
        service = %config.service_name,
        level = %config.level,
        json = config.json_format,
        "Logging initialized"
    );

    Ok(())
}

/// Whether [`init_logging`] has completed
pub fn is_initialized() -> bool {
    LOGGING_INITIALIZED.load(Ordering::SeqCst)
}
