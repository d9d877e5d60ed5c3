//! PreCompact hook: compacts the core-assertions log ahead of the host
//! discarding context, and reminds the agent of the active autonomous
//! contract so it survives the compaction.

use std::time::Duration;

use loopguard::autonomous::{self, Lookup};
use loopguard::config::Config;
use loopguard::dispatch::{self, Decision, Event};
use loopguard::memory::store;
use loopguard::project;

const EVENT_NAME: &str = "PreCompact";

fn main() {
    let cfg = Config::from_env();
    let _guard = loopguard::telemetry::init(&cfg.debug_log_path);
    let event = dispatch::read_event();
    let timeout = Duration::from_secs(cfg.handler_timeout_secs);
    let decision = dispatch::with_timeout(timeout, move || handle(event, cfg));
    std::process::exit(dispatch::render(EVENT_NAME, &decision));
}

fn handle(event: Event, cfg: Config) -> Decision {
    let project_id = project::ProjectId::resolve(&event.cwd);
    let memory_root = project::memory_root(&loopguard::config::user_config_root(), &project_id);
    let _ = store::compact_assertions(&memory_root);

    let state = match autonomous::read(&event.cwd, &event.session_id, &cfg) {
        Ok(Lookup::Active(state)) => Some(state),
        _ => None,
    };

    let _ = autonomous::touch(&event.cwd, &event.session_id, &cfg);

    let Some(state) = state else {
        return Decision::Passthrough;
    };

    Decision::Context(format!(
        "Autonomous mode '{}' is active (iteration {}). The completion contract \
         (self-report + reflection in .claude/completion-checkpoint.json) still applies \
         after compaction.",
        state.mode, state.iteration
    ))
}
