//! UserPromptSubmit hook: treats the prompt itself as the query context and
//! injects any matching memory ahead of the agent reading it.

use std::time::Duration;

use loopguard::autonomous::{self, Lookup};
use loopguard::config::Config;
use loopguard::dispatch::{self, Decision, Event};
use loopguard::memory::retrieval;
use loopguard::{injection, project};

const EVENT_NAME: &str = "UserPromptSubmit";

fn main() {
    let cfg = Config::from_env();
    let _guard = loopguard::telemetry::init(&cfg.debug_log_path);
    let event = dispatch::read_event();
    let timeout = Duration::from_secs(cfg.handler_timeout_secs);
    let decision = dispatch::with_timeout(timeout, move || handle(event, cfg));
    std::process::exit(dispatch::render(EVENT_NAME, &decision));
}

fn handle(event: Event, cfg: Config) -> Decision {
    let Some(prompt) = event.prompt.as_deref() else {
        return Decision::Passthrough;
    };

    let mut entities = retrieval::extract_entities(prompt);
    entities.extend(injection::touched_file_entities(&event.cwd));
    entities.sort();
    entities.dedup();

    let mode = match autonomous::read(&event.cwd, &event.session_id, &cfg) {
        Ok(Lookup::Active(state)) => Some(state.mode),
        _ => None,
    };

    let project_id = project::ProjectId::resolve(&event.cwd);
    let memory_root = project::memory_root(&loopguard::config::user_config_root(), &project_id);
    let user_memory_root = loopguard::config::user_config_root().join("memory");

    injection::inject_memory(
        &event.cwd,
        &memory_root,
        &user_memory_root,
        &cfg,
        entities,
        mode,
    )
}
