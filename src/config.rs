//! Runtime configuration, loaded from environment variables only. The
//! full settings surface (project-level TOML, host-mapped handler
//! bindings) lives in the installer; this struct covers the small,
//! closed set of knobs the core engines themselves consult.

use std::path::PathBuf;
use std::str::FromStr;

/// Process-wide configuration, read once at handler startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// How long an autonomous state may sit idle before `sweep_expired`
    /// reclaims it. `LOOPGUARD_AUTONOMOUS_TTL_SECS`.
    pub autonomous_ttl_secs: u64,
    /// Character budget for a memory injection when the host does not
    /// already inject native project memory. `LOOPGUARD_MEMORY_BUDGET_CHARS`.
    pub memory_budget_chars: usize,
    /// Where hook binaries append structured debug logs.
    /// `LOOPGUARD_DEBUG_LOG`.
    pub debug_log_path: PathBuf,
    /// Whether memory retrieval may query concept entities across other
    /// projects once the local budget is exhausted.
    /// `LOOPGUARD_CROSS_PROJECT_RECALL`.
    pub cross_project_recall_enabled: bool,
    /// Whether the secondary, non-gating stop-advisory judge runs.
    /// `LOOPGUARD_ADVISORY_STOP_JUDGE`.
    pub advisory_stop_judge_enabled: bool,
    /// Wall-clock budget given to each dispatched handler before the
    /// dispatcher force-terminates it and returns passthrough.
    /// `LOOPGUARD_HANDLER_TIMEOUT_SECS`.
    pub handler_timeout_secs: u64,
    /// Character budget used instead of `memory_budget_chars` when the
    /// host already injects its own native project memory (avoids
    /// duplicating context). `LOOPGUARD_MEMORY_BUDGET_CHARS_NATIVE`.
    pub memory_budget_chars_with_native: usize,
    /// External search MCP server name that `WebSearch` invocations are
    /// redirected to when configured. `LOOPGUARD_SEARCH_MCP`.
    pub search_mcp: Option<String>,
}

impl Config {
    /// Loads configuration from the environment, falling back to the
    /// documented defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        Config {
            autonomous_ttl_secs: env_or("LOOPGUARD_AUTONOMOUS_TTL_SECS", default_ttl_secs()),
            memory_budget_chars: env_or(
                "LOOPGUARD_MEMORY_BUDGET_CHARS",
                default_memory_budget_chars(),
            ),
            debug_log_path: std::env::var("LOOPGUARD_DEBUG_LOG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_debug_log_path()),
            cross_project_recall_enabled: env_flag("LOOPGUARD_CROSS_PROJECT_RECALL", false),
            advisory_stop_judge_enabled: env_flag("LOOPGUARD_ADVISORY_STOP_JUDGE", true),
            handler_timeout_secs: env_or(
                "LOOPGUARD_HANDLER_TIMEOUT_SECS",
                default_handler_timeout_secs(),
            ),
            memory_budget_chars_with_native: env_or(
                "LOOPGUARD_MEMORY_BUDGET_CHARS_NATIVE",
                default_memory_budget_chars_with_native(),
            ),
            search_mcp: std::env::var("LOOPGUARD_SEARCH_MCP").ok(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            autonomous_ttl_secs: default_ttl_secs(),
            memory_budget_chars: default_memory_budget_chars(),
            debug_log_path: default_debug_log_path(),
            cross_project_recall_enabled: false,
            advisory_stop_judge_enabled: true,
            handler_timeout_secs: default_handler_timeout_secs(),
            memory_budget_chars_with_native: default_memory_budget_chars_with_native(),
            search_mcp: None,
        }
    }
}

fn default_ttl_secs() -> u64 {
    8 * 60 * 60
}

fn default_memory_budget_chars() -> usize {
    1200
}

fn default_memory_budget_chars_with_native() -> usize {
    600
}

fn default_handler_timeout_secs() -> u64 {
    10
}

fn default_debug_log_path() -> PathBuf {
    user_config_root().join("loopguard-debug.log")
}

/// `<user-config-root>/` from the filesystem layout: the per-user
/// directory that holds the cross-project autonomous-state copy and the
/// per-project memory stores.
pub fn user_config_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".loopguard")
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.autonomous_ttl_secs, 8 * 60 * 60);
        assert_eq!(cfg.memory_budget_chars, 1200);
        assert!(!cfg.cross_project_recall_enabled);
        assert!(cfg.advisory_stop_judge_enabled);
    }
}
