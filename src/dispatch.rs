//! Event dispatcher (C9): reads one JSON document from standard input,
//! normalizes it into [`Event`], and gives every hook binary a uniform way
//! to enforce its per-handler timeout and render a [`Decision`] back onto
//! standard output/error with the right exit code.
//!
//! Each binary in `src/bin/` is the single entry point for one lifecycle
//! event kind; this module is what they all share.

use std::io::Read;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

/// The raw JSON document a host sends on stdin, before normalization.
/// Every field is optional since the shape sent varies by event kind
/// (spec.md §6).
#[derive(Debug, Default, serde::Deserialize)]
struct RawEvent {
    session_id: Option<String>,
    cwd: Option<String>,
    tool_name: Option<String>,
    #[serde(default)]
    tool_input: Value,
    message: Option<String>,
    #[serde(default)]
    stop_hook_active: bool,
    hook_event_name: Option<String>,
    prompt: Option<String>,
}

/// The normalized view every handler works from. `cwd` always resolves to
/// something (falls back to the process's working directory per the
/// `InputError` policy in spec.md §7); `session_id` falls back to an empty
/// string, which simply never matches any real autonomous state's owner.
#[derive(Debug, Clone)]
pub struct Event {
    pub session_id: String,
    pub cwd: PathBuf,
    pub tool_name: Option<String>,
    pub tool_input: Value,
    pub message: Option<String>,
    pub stop_hook_active: bool,
    pub hook_event_name: Option<String>,
    pub prompt: Option<String>,
}

/// Reads and normalizes the event from standard input. Malformed or empty
/// JSON is an [`crate::errors::LoopguardError::Input`]-class condition the
/// spec says to recover from by deriving `cwd` from the process, not by
/// failing the handler — so this never returns `Err` for that reason; it
/// only surfaces a hard I/O failure reading stdin itself.
pub fn read_event() -> Event {
    let mut buf = String::new();
    let _ = std::io::stdin().read_to_string(&mut buf);

    let raw: RawEvent = if buf.trim().is_empty() {
        RawEvent::default()
    } else {
        serde_json::from_str(&buf).unwrap_or_default()
    };

    let cwd = raw
        .cwd
        .map(PathBuf::from)
        .filter(|p| p.is_absolute())
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    Event {
        session_id: raw.session_id.unwrap_or_default(),
        cwd,
        tool_name: raw.tool_name,
        tool_input: raw.tool_input,
        message: raw.message,
        stop_hook_active: raw.stop_hook_active,
        hook_event_name: raw.hook_event_name,
        prompt: raw.prompt,
    }
}

/// A handler's verdict, uniform across every lifecycle event kind. Not
/// every variant is meaningful for every event (e.g. `Block` only applies
/// to Stop) but keeping one type avoids a combinatorial explosion of
/// per-event decision enums.
#[derive(Debug, Clone)]
pub enum Decision {
    /// Explicit permission grant (PreToolUse/PermissionRequest).
    Allow,
    /// Explicit permission denial, with agent-facing explanation.
    Deny(String),
    /// No opinion; the host's default behavior applies.
    Passthrough,
    /// Stop is blocked; `reason` is the full checklist text (phase 1) or
    /// the short hard-gate failure (phase 2). Maps to exit code 2.
    Block(String),
    /// Additional structured context to inject (SessionStart, UserPromptSubmit).
    Context(String),
}

#[derive(Serialize)]
struct HookSpecificOutput<'a> {
    #[serde(rename = "hookEventName", skip_serializing_if = "Option::is_none")]
    hook_event_name: Option<&'a str>,
    #[serde(rename = "permissionDecision", skip_serializing_if = "Option::is_none")]
    permission_decision: Option<&'static str>,
    #[serde(
        rename = "permissionDecisionReason",
        skip_serializing_if = "Option::is_none"
    )]
    permission_decision_reason: Option<&'a str>,
    #[serde(rename = "additionalContext", skip_serializing_if = "Option::is_none")]
    additional_context: Option<&'a str>,
}

#[derive(Serialize)]
struct HookOutput<'a> {
    #[serde(rename = "hookSpecificOutput", skip_serializing_if = "Option::is_none")]
    hook_specific_output: Option<HookSpecificOutput<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    decision: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

/// Renders `decision` to stdout (JSON payload, when one applies) and
/// stderr (agent-facing explanation), and returns the process exit code.
/// Exit codes are only significant on Stop and pre-action deny paths
/// (spec.md §6); everything else exits 0 regardless of the payload.
pub fn render(event_name: &str, decision: &Decision) -> i32 {
    match decision {
        Decision::Allow => {
            emit_json(&HookOutput {
                hook_specific_output: Some(HookSpecificOutput {
                    hook_event_name: Some(event_name),
                    permission_decision: Some("allow"),
                    permission_decision_reason: Some("autonomous mode active"),
                    additional_context: None,
                }),
                decision: None,
                reason: None,
            });
            0
        }
        Decision::Deny(reason) => {
            eprintln!("{reason}");
            emit_json(&HookOutput {
                hook_specific_output: Some(HookSpecificOutput {
                    hook_event_name: Some(event_name),
                    permission_decision: Some("deny"),
                    permission_decision_reason: Some(reason),
                    additional_context: None,
                }),
                decision: None,
                reason: None,
            });
            0
        }
        Decision::Passthrough => 0,
        Decision::Block(reason) => {
            eprintln!("{reason}");
            2
        }
        Decision::Context(text) => {
            emit_json(&HookOutput {
                hook_specific_output: Some(HookSpecificOutput {
                    hook_event_name: Some(event_name),
                    permission_decision: None,
                    permission_decision_reason: None,
                    additional_context: Some(text),
                }),
                decision: None,
                reason: None,
            });
            0
        }
    }
}

fn emit_json<T: Serialize>(payload: &T) {
    if let Ok(text) = serde_json::to_string(payload) {
        println!("{text}");
    }
}

/// Runs `handler` on a worker thread and waits up to `timeout`. On
/// expiry, returns `Decision::Passthrough` immediately without waiting
/// for the worker to finish — per spec.md §5, the dispatcher "enforces
/// termination" at the process level (the orphaned thread is abandoned
/// when the process exits at the end of `main`, since no hook performs
/// unbounded I/O beyond the stdin read already completed by this point).
pub fn with_timeout<F>(timeout: Duration, handler: F) -> Decision
where
    F: FnOnce() -> Decision + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(handler());
    });
    match rx.recv_timeout(timeout) {
        Ok(decision) => decision,
        Err(_) => {
            tracing::warn!("handler exceeded timeout, returning passthrough");
            Decision::Passthrough
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_block_returns_exit_code_2() {
        assert_eq!(render("Stop", &Decision::Block("nope".to_string())), 2);
    }

    #[test]
    fn render_allow_returns_exit_code_0() {
        assert_eq!(render("PreToolUse", &Decision::Allow), 0);
    }

    #[test]
    fn with_timeout_returns_passthrough_on_expiry() {
        let decision = with_timeout(Duration::from_millis(20), || {
            std::thread::sleep(Duration::from_secs(5));
            Decision::Allow
        });
        assert!(matches!(decision, Decision::Passthrough));
    }

    #[test]
    fn with_timeout_returns_handler_result_when_fast() {
        let decision = with_timeout(Duration::from_secs(5), || Decision::Allow);
        assert!(matches!(decision, Decision::Allow));
    }
}
