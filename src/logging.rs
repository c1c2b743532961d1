//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

use crate::config::{ENV_LOG, LoggingConfig};

/// Install a global `fmt` subscriber for the configured level.
///
/// `PADDOCK_LOG` takes priority over `config.level`. Returns `false` when a
/// global subscriber was already installed, which makes repeated calls from
/// tests harmless.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let filter = build_filter(config, std::env::var(ENV_LOG).ok().as_deref());
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let installed =
        if config.json { builder.json().try_init() } else { builder.compact().try_init() };
    installed.is_ok()
}

fn build_filter(config: &LoggingConfig, env_override: Option<&str>) -> EnvFilter {
    let directive = env_override.filter(|v| !v.trim().is_empty()).unwrap_or(&config.level);
    EnvFilter::try_new(directive).unwrap_or_else(|e| {
        eprintln!("Invalid log filter '{}' ({}), falling back to info", directive, e);
        EnvFilter::new("info")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_wins_and_bad_directives_fall_back() {
        let config = LoggingConfig { level: "warn".to_string(), json: false };
        assert_eq!(build_filter(&config, None).to_string(), "warn");
        assert_eq!(build_filter(&config, Some("paddock=debug")).to_string(), "paddock=debug");
        assert_eq!(build_filter(&config, Some(" ")).to_string(), "warn");

        let broken = LoggingConfig { level: "paddock=loud".to_string(), json: false };
        assert_eq!(build_filter(&broken, None).to_string(), "info");
    }

    #[test]
    fn init_is_idempotent() {
        let config = LoggingConfig::default();
        init_tracing(&config);
        assert!(!init_tracing(&config));
    }
}
