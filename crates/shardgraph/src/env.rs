use std::env;
use std::sync::OnceLock;

static SHARDGRAPH_GATHER_VALIDATE: OnceLock<bool> = OnceLock::new();

fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

/// Whether gather handles check height and feature-shape agreement by default.
///
/// Unset or blank means enabled.
pub(crate) fn gather_validate_enabled() -> bool {
    *SHARDGRAPH_GATHER_VALIDATE.get_or_init(|| {
        validate_setting(env::var("SHARDGRAPH_GATHER_VALIDATE").ok().as_deref())
    })
}

fn validate_setting(raw: Option<&str>) -> bool {
    match raw {
        Some(value) if !value.trim().is_empty() => parse_bool(value),
        _ => true,
    }
}
