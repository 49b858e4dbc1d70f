use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info,weex=debug,weewx=debug";

/// Log line layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Human readable, for terminals
    Pretty,
}

impl LogFormat {
    /// `WEEWX_LOG_FORMAT=pretty` selects terminal output; anything else is JSON
    pub fn from_env() -> Self {
        match std::env::var("WEEWX_LOG_FORMAT").as_deref() {
            Ok("pretty") | Ok("text") => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

/// Filter from RUST_LOG, defaulting to "info,weex=debug,weewx=debug"
pub fn env_filter() -> EnvFilter {
    let directives = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.to_string());
    EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize logging with the format chosen by the environment.
pub fn init(service_name: &str) {
    init_with(service_name, LogFormat::from_env());
}

/// Initialize logging. A second call is a no-op.
pub fn init_with(service_name: &str, format: LogFormat) {
    let registry = tracing_subscriber::registry().with(env_filter());
    let installed = match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };

    if installed.is_ok() {
        tracing::info!(service = %service_name, ?format, "Logging initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init_with("weewx-test", LogFormat::Pretty);
        init_with("weewx-test", LogFormat::Json);
        tracing::debug!("still logging");
    }
}
