//! Structured logging for the service.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// The `[log]` section of the service config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracingConfig {
    /// Directive used when `RUST_LOG` is unset, e.g. `info,pipeline=debug`
    #[serde(default = "default_filter")]
    pub filter: String,
    /// One JSON object per line instead of human-readable output
    #[serde(default)]
    pub json: bool,
    /// Log span open and close
    #[serde(default)]
    pub span_events: bool,
}

fn default_filter() -> String {
    "info,tower_http=info".to_string()
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
            span_events: false,
        }
    }
}

impl TracingConfig {
    /// Apply `LOG_JSON`, which hosting platforms set to get JSON logs
    /// without touching the config file.
    pub fn with_env(mut self) -> Self {
        if let Ok(value) = std::env::var("LOG_JSON") {
            self.json = self.json || truthy(&value);
        }
        self
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.filter))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }

    fn fmt_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let spans = if self.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        if self.json {
            fmt::layer()
                .json()
                .with_span_events(spans)
                .with_current_span(true)
                .with_file(true)
                .with_line_number(true)
                .boxed()
        } else {
            fmt::layer().with_span_events(spans).with_target(true).boxed()
        }
    }
}

fn truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `config.filter`. Returns false when a subscriber
/// was already installed.
pub fn init_tracing(config: &TracingConfig) -> bool {
    let config = config.clone().with_env();
    let installed = tracing_subscriber::registry()
        .with(config.fmt_layer())
        .with(config.env_filter())
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(filter = %config.filter, json = config.json, "Logging initialized");
    }
    installed
}
