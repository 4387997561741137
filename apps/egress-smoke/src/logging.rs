//! Tracing/logging bootstrap for the smoke binary.

use std::env;

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,egress_smoke=debug,egress_runtime=debug";

/// Initialize global tracing subscriber with severity gating from environment.
///
/// Precedence:
/// 1) `RUST_LOG`
/// 2) `EGRESS_SMOKE_LOG`
/// 3) `EGRESS_LOG`
/// 4) internal default filter
pub fn init() {
    let env_filter = filter_from_lookup(|key| env::var(key).ok());
    let _ = tracing_subscriber::fmt()
        .with_target(true)
        .with_thread_ids(true)
        .with_env_filter(env_filter)
        .try_init();
}

fn filter_from_lookup<F>(lookup: F) -> EnvFilter
where
    F: Fn(&str) -> Option<String>,
{
    for key in ["RUST_LOG", "EGRESS_SMOKE_LOG", "EGRESS_LOG"] {
        if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty())
            && let Ok(filter) = EnvFilter::try_new(value)
        {
            return filter;
        }
    }

    EnvFilter::new(DEFAULT_FILTER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_default_filter() {
        let filter = filter_from_lookup(|_| None);
        assert_eq!(filter.to_string(), EnvFilter::new(DEFAULT_FILTER).to_string());
    }

    #[test]
    fn prefers_rust_log_over_app_specific_keys() {
        let filter = filter_from_lookup(|key| match key {
            "RUST_LOG" => Some("warn".to_owned()),
            "EGRESS_SMOKE_LOG" => Some("trace".to_owned()),
            _ => None,
        });
        assert_eq!(filter.to_string(), "warn");
    }

    #[test]
    fn skips_blank_values() {
        let filter = filter_from_lookup(|key| match key {
            "RUST_LOG" => Some("  ".to_owned()),
            "EGRESS_LOG" => Some("error".to_owned()),
            _ => None,
        });
        assert_eq!(filter.to_string(), "error");
    }
}
