//! PreToolUse hook: runs the pre-action gates (dangerous-command deny-list,
//! plan-mode enforcer, deploy enforcer, search redirection) ahead of
//! auto-approval, per the `deny > allow > passthrough` composition rule.

use std::time::Duration;

use loopguard::autonomous::{self, Lookup};
use loopguard::config::Config;
use loopguard::dispatch::{self, Decision, Event};
use loopguard::gates::{self, GateDecision};

const EVENT_NAME: &str = "PreToolUse";

fn main() {
    let cfg = Config::from_env();
    let _guard = loopguard::telemetry::init(&cfg.debug_log_path);
    let event = dispatch::read_event();
    let timeout = Duration::from_secs(cfg.handler_timeout_secs);
    let decision = dispatch::with_timeout(timeout, move || handle(event, cfg));
    std::process::exit(dispatch::render(EVENT_NAME, &decision));
}

fn handle(event: Event, cfg: Config) -> Decision {
    let tool_name = event.tool_name.as_deref().unwrap_or("");

    if let Some(target) = gates::search_redirect_target(tool_name, cfg.search_mcp.as_deref()) {
        return Decision::Deny(format!(
            "redirect: use the '{target}' MCP tool instead of the built-in web search"
        ));
    }

    let state = match autonomous::read(&event.cwd, &event.session_id, &cfg) {
        Ok(Lookup::Active(state)) => Some(state),
        _ => None,
    };

    let composed = gates::compose([
        gates::dangerous_command_guard(tool_name, &event.tool_input),
        gates::plan_mode_enforcer(tool_name, &event.tool_input, state.as_ref()),
        gates::deploy_enforcer(tool_name, &event.tool_input, state.as_ref()),
    ]);

    if let GateDecision::Deny(message) = composed {
        return Decision::Deny(message);
    }

    match loopguard::approver::decide(&event.cwd, &event.session_id, &cfg) {
        Ok(decision) => decision,
        Err(_) => Decision::Passthrough,
    }
}
