//! PermissionRequest hook: the host's explicit elevation ask. Same gate
//! composition as PreToolUse, since a permission request still names a
//! tool and input the dangerous-command and deploy gates must see.

use std::time::Duration;

use loopguard::autonomous::{self, Lookup};
use loopguard::config::Config;
use loopguard::dispatch::{self, Decision, Event};
use loopguard::gates::{self, GateDecision};

const EVENT_NAME: &str = "PermissionRequest";

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
