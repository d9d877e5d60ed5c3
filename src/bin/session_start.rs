//! SessionStart hook: sweeps any expired autonomous state, compacts the
//! core-assertions log, and injects whatever memory the project's recent
//! edits and the session's opening message make relevant.

use std::time::Duration;

use loopguard::autonomous::{self, Lookup};
use loopguard::config::Config;
use loopguard::dispatch::{self, Decision, Event};
use loopguard::memory::retrieval;
use loopguard::memory::store;
use loopguard::{injection, project};

const EVENT_NAME: &str = "SessionStart";

fn main() {
    let cfg = Config::from_env();
    let _guard = loopguard::telemetry::init(&cfg.debug_log_path);
    let event = dispatch::read_event();
    let timeout = Duration::from_secs(cfg.handler_timeout_secs);
    let decision = dispatch::with_timeout(timeout, move || handle(event, cfg));
    std::process::exit(dispatch::render(EVENT_NAME, &decision));
}

fn handle(event: Event, cfg: Config) -> Decision {
    let _ = autonomous::sweep_expired(&event.cwd, &cfg);

    let project_id = project::ProjectId::resolve(&event.cwd);
    let user_memory_root = loopguard::config::user_config_root().join("memory");
    let memory_root = project::memory_root(&loopguard::config::user_config_root(), &project_id);
    let _ = store::compact_assertions(&memory_root);

    let mut entities = injection::touched_file_entities(&event.cwd);
    if let Some(message) = &event.message {
        entities.extend(retrieval::extract_entities(message));
    }
    entities.sort();
    entities.dedup();

    let mode = match autonomous::read(&event.cwd, &event.session_id, &cfg) {
        Ok(Lookup::Active(state)) => Some(state.mode),
        _ => None,
    };

    injection::inject_memory(
        &event.cwd,
        &memory_root,
        &user_memory_root,
        &cfg,
        entities,
        mode,
    )
}
