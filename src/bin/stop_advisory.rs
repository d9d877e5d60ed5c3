//! Stop-advisory judge: a non-blocking heuristic sanity check on the
//! reflection's genuineness, surfaced as a reminder rather than a gate.
//! Never denies or blocks — it only ever emits [`Decision::Context`] or
//! passes through, so a false positive never costs the agent a retry.

use std::time::Duration;

use loopguard::checkpoint;
use loopguard::config::Config;
use loopguard::dispatch::{self, Decision, Event};

const EVENT_NAME: &str = "Stop";

/// Phrases common to a reflection written to satisfy the schema rather
/// than to actually describe what happened.
const BOILERPLATE_PHRASES: &[&str] = &[
    "everything works",
    "all good",
    "no issues",
    "looks good to me",
    "should be fine",
    "made some changes",
    "fixed the issue",
    "updated the code",
];

fn main() {
    let cfg = Config::from_env();
    let _guard = loopguard::telemetry::init(&cfg.debug_log_path);
    let event = dispatch::read_event();
    let timeout = Duration::from_secs(cfg.handler_timeout_secs);
    let decision = dispatch::with_timeout(timeout, move || handle(event, cfg));
    std::process::exit(dispatch::render(EVENT_NAME, &decision));
}

fn handle(event: Event, cfg: Config) -> Decision {
    if !cfg.advisory_stop_judge_enabled {
        return Decision::Passthrough;
    }

    let checkpoint = match checkpoint::load(&event.cwd) {
        Ok(checkpoint) => checkpoint,
        Err(_) => return Decision::Passthrough,
    };

    let mut concerns = Vec::new();

    if looks_generic(&checkpoint.reflection.key_insight) {
        concerns.push(
            "key_insight reads like boilerplate rather than a specific lesson from this session",
        );
    }
    if looks_generic(&checkpoint.reflection.what_was_done) {
        concerns.push("what_was_done is too terse to tell what actually changed");
    }
    if checkpoint.reflection.search_terms.len() < 2 {
        concerns.push("search_terms won't be distinctive enough to recall this later");
    }

    if concerns.is_empty() {
        return Decision::Passthrough;
    }

    let mut text = String::from("Advisory (non-blocking): this reflection may be boilerplate:\n");
    for concern in &concerns {
        text.push_str("- ");
        text.push_str(concern);
        text.push('\n');
    }
    Decision::Context(text)
}

fn looks_generic(text: &str) -> bool {
    let lower = text.to_lowercase();
    let word_count = text.split_whitespace().count();
    word_count < 8 || BOILERPLATE_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_short_generic_insight() {
        assert!(looks_generic("fixed the issue"));
    }

    #[test]
    fn accepts_specific_insight() {
        assert!(!looks_generic(
            "Guard token clears behind a single helper so 401 paths don't diverge across callers."
        ));
    }
}
