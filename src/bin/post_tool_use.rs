//! PostToolUse hook: runs the cascade engine on every action that might
//! have changed the tree, advances the iteration counter on edit-class
//! tools, and injects memory on exploration-class tools (Read/Grep/Glob),
//! where recalled lessons are most useful to the agent's next move.

use std::time::Duration;

use loopguard::autonomous::{self, Lookup};
use loopguard::cascade;
use loopguard::config::Config;
use loopguard::dispatch::{self, Decision, Event};
use loopguard::memory::retrieval;
use loopguard::{injection, project};

const EVENT_NAME: &str = "PostToolUse";

fn main() {
    let cfg = Config::from_env();
    let _guard = loopguard::telemetry::init(&cfg.debug_log_path);
    let event = dispatch::read_event();
    let timeout = Duration::from_secs(cfg.handler_timeout_secs);
    let decision = dispatch::with_timeout(timeout, move || handle(event, cfg));
    std::process::exit(dispatch::render(EVENT_NAME, &decision));
}

fn handle(event: Event, cfg: Config) -> Decision {
    match cascade::run(&event.cwd) {
        Ok(resets) => {
            for reset in &resets {
                tracing::info!(flag = %reset.flag, current = %reset.current_version, "cascade reset stale proven flag");
            }
        }
        Err(e) => tracing::warn!(error = %e, "cascade run failed"),
    }

    let tool_name = event.tool_name.as_deref().unwrap_or("");
    if matches!(tool_name, "Write" | "Edit" | "MultiEdit" | "NotebookEdit") {
        let _ = autonomous::advance_iteration(&event.cwd, &event.session_id, &cfg);
    } else {
        let _ = autonomous::touch(&event.cwd, &event.session_id, &cfg);
    }

    if !matches!(tool_name, "Read" | "Grep" | "Glob") {
        return Decision::Passthrough;
    }

    let mut entities = injection::touched_file_entities(&event.cwd);
    entities.extend(retrieval::extract_entities(&event.tool_input.to_string()));
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
