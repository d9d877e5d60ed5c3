//! Stop hook (C10): the two-phase completion contract. A first attempt
//! renders the full checklist and blocks on any failing gate; a retry
//! (`stop_hook_active=true`) re-evaluates the same seven hard gates and
//! only then allows, since the contract does not blindly allow on retry.

use std::time::Duration;

use loopguard::autonomous::{self, Lookup};
use loopguard::checkpoint;
use loopguard::config::Config;
use loopguard::dispatch::{self, Decision, Event};
use loopguard::validator::{self, ValidationContext};
use loopguard::version;

const EVENT_NAME: &str = "Stop";

fn main() {
    let cfg = Config::from_env();
    let _guard = loopguard::telemetry::init(&cfg.debug_log_path);
    let event = dispatch::read_event();
    let timeout = Duration::from_secs(cfg.handler_timeout_secs);
    let decision = dispatch::with_timeout(timeout, move || handle(event, cfg));
    std::process::exit(dispatch::render(EVENT_NAME, &decision));
}

fn handle(event: Event, cfg: Config) -> Decision {
    let mode = match autonomous::read(&event.cwd, &event.session_id, &cfg) {
        Ok(Lookup::Active(state)) => Some(state.mode),
        _ => None,
    };

    // No active autonomous contract means Stop has nothing to enforce.
    let Some(mode) = mode else {
        return Decision::Passthrough;
    };

    let checkpoint = match checkpoint::load(&event.cwd) {
        Ok(checkpoint) => checkpoint,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load completion checkpoint");
            return Decision::Block(
                "Stop blocked — no readable completion-checkpoint.json. Write a self-report \
                 and reflection before stopping."
                    .to_string(),
            );
        }
    };

    let ctx = ValidationContext {
        project_root: &event.cwd,
        current_version: version::current_version(&event.cwd),
        mode: Some(mode),
        has_web_assets: validator::project_has_web_assets(&event.cwd),
        has_mobile_assets: validator::project_has_mobile_assets(&event.cwd),
    };

    let failures = validator::evaluate(&checkpoint, &ctx);

    if !failures.is_empty() {
        let text = validator::render_checklist(&failures, !event.stop_hook_active);
        return Decision::Block(text);
    }

    let memory_root = validator::memory_root_for(&event.cwd);
    if let Err(e) = validator::record_completion(&memory_root, &checkpoint) {
        tracing::warn!(error = %e, "failed to record completion memory event");
    }

    Decision::Passthrough
}
