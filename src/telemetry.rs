//! Structured logging for hook binaries. Per spec.md §9 ("Global mutable
//! state"), the debug log is append-only and never consulted for
//! correctness — only for post-hoc diagnosis — so initialization failures
//! here are swallowed rather than propagated.

use std::path::Path;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs a non-blocking, rolling-free file writer pointed at
/// `debug_log_path`, filtered by `RUST_LOG` (default `info`). Returns the
/// guard that must be held for the duration of `main` to flush buffered
/// writes on exit; dropping it early silently truncates the tail of the
/// log, which is acceptable here since the log is diagnostic-only.
///
/// Hook stderr is shown directly to the agent (spec.md §6), so tracing
/// output is never written there — only to the file.
pub fn init(debug_log_path: &Path) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let dir = debug_log_path.parent().unwrap_or_else(|| Path::new("."));
    if std::fs::create_dir_all(dir).is_err() {
        return None;
    }
    let file_name = debug_log_path
        .file_name()
        .map(|n| n.to_owned())
        .unwrap_or_else(|| "loopguard-debug.log".into());

    let appender = tracing_appender::rolling::never(dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_target(true)
        .with_ansi(false);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();

    Some(guard)
}

/// Escapes control characters so a value taken from untrusted hook input
/// (tool args, agent self-report text) can't forge log lines via embedded
/// newlines.
pub fn sanitize_for_log(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_escapes_newlines() {
        assert_eq!(sanitize_for_log("line1\nline2"), "line1\\nline2");
    }
}
