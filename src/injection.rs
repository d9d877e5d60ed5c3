//! Shared context-injection plumbing used by the SessionStart,
//! UserPromptSubmit, and PostToolUse hook binaries: builds a
//! [`QueryContext`] and runs the full selection pipeline from
//! [`crate::memory::retrieval`] under the configured budget.

use std::path::Path;

use chrono::Utc;

use crate::autonomous::Mode;
use crate::config::Config;
use crate::dispatch::Decision;
use crate::memory::retrieval::{self, CrossProjectCandidates, QueryContext};
use crate::memory::{injection_history, manifest, store};
use crate::project::ProjectId;

const CANDIDATE_POOL: usize = 200;
const NATIVE_MEMORY_FILE: &str = "CLAUDE.md";

/// Entity seeds drawn from the working tree's uncommitted diff (staged and
/// unstaged), so a fresh session or a post-edit tool event naturally biases
/// toward files the agent is already touching. Empty outside a repository.
pub fn touched_file_entities(cwd: &Path) -> Vec<String> {
    let Ok(repo) = git2::Repository::discover(cwd) else {
        return Vec::new();
    };
    let head_tree = repo.head().ok().and_then(|h| h.peel_to_tree().ok());
    let mut opts = git2::DiffOptions::new();
    opts.include_untracked(true).recurse_untracked_dirs(true);
    let Ok(diff) = repo.diff_tree_to_workdir_with_index(head_tree.as_ref(), Some(&mut opts)) else {
        return Vec::new();
    };
    diff.deltas()
        .filter_map(|delta| delta.new_file().path().and_then(|p| p.to_str()).map(str::to_string))
        .collect()
}

/// Resolves, scores, and packs memory events from `memory_root` into a
/// single injectable [`Decision::Context`] under the configured budget, or
/// `Decision::Passthrough` when nothing clears the entity gate. Records the
/// selection back into the manifest's `injected` counters and the durable
/// prefix-hash dedup history so a later invocation doesn't repeat it.
/// `user_memory_root` is `<user-config-root>/memory/`, the parent directory
/// of every project's store, consulted only when cross-project recall is
/// enabled.
pub fn inject_memory(
    cwd: &Path,
    memory_root: &Path,
    user_memory_root: &Path,
    cfg: &Config,
    entities: Vec<String>,
    mode: Option<Mode>,
) -> Decision {
    let candidates = match store::list_recent(memory_root, CANDIDATE_POOL) {
        Ok(events) if !events.is_empty() => events,
        _ => return Decision::Passthrough,
    };

    let native_memory_content = std::fs::read_to_string(cwd.join(NATIVE_MEMORY_FILE)).ok();
    let budget = if native_memory_content.is_some() {
        cfg.memory_budget_chars_with_native
    } else {
        cfg.memory_budget_chars
    };

    let history = injection_history::load(memory_root);
    let problem_type_entities = entities.iter().cloned().collect();
    let ctx = QueryContext {
        entities,
        problem_type_entities,
        mode,
    };
    let now = Utc::now();

    let mut selections = retrieval::select_for_injection(
        &candidates,
        &ctx,
        budget,
        &history,
        native_memory_content.as_deref(),
        now,
    );
    let local_count = selections.len();

    if cfg.cross_project_recall_enabled {
        let spent: usize = selections.iter().map(|s| s.excerpt.chars().count()).sum();
        let remaining = budget.saturating_sub(spent);
        if remaining > 0 {
            let other_roots: Vec<_> = store::list_all_project_roots(user_memory_root)
                .into_iter()
                .filter(|root| root != memory_root)
                .collect();
            let other_events: Vec<_> = other_roots
                .iter()
                .map(|root| store::list_recent(root, CANDIDATE_POOL).unwrap_or_default())
                .collect();
            let pools: Vec<CrossProjectCandidates<'_>> = other_roots
                .iter()
                .zip(other_events.iter())
                .map(|(root, events)| CrossProjectCandidates {
                    project_id: ProjectId::from_hex(
                        root.file_name().and_then(|n| n.to_str()).unwrap_or_default(),
                    ),
                    events,
                })
                .collect();
            selections.extend(retrieval::select_cross_project(&pools, &ctx, remaining, now));
        }
    }

    if selections.is_empty() {
        return Decision::Passthrough;
    }

    let mut prefix_hashes = Vec::new();
    let mut injected_ids = Vec::new();
    for (i, selection) in selections.iter().enumerate() {
        injected_ids.push(selection.event_id.clone());
        if i < local_count {
            if let Some(event) = candidates.iter().find(|e| e.id == selection.event_id) {
                prefix_hashes.push(retrieval::prefix_hash(&event.content));
            }
        }
    }
    let _ = injection_history::record(memory_root, &prefix_hashes);
    let _ = manifest::record_injected(memory_root, &injected_ids);

    let mut text = String::from("Relevant memory from past sessions in this project:\n");
    for selection in &selections {
        text.push_str("- ");
        text.push_str(&selection.excerpt);
        text.push('\n');
    }
    Decision::Context(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::Category;
    use crate::memory::event::MemoryEvent;

    #[test]
    fn no_candidates_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let user_root = tempfile::tempdir().unwrap();
        let cfg = Config::default();
        let decision = inject_memory(
            dir.path(),
            &dir.path().join("memory-root"),
            user_root.path(),
            &cfg,
            vec!["auth".to_string()],
            None,
        );
        assert!(matches!(decision, Decision::Passthrough));
    }

    #[test]
    fn matching_event_is_injected_as_context() {
        let project_dir = tempfile::tempdir().unwrap();
        let memory_root = tempfile::tempdir().unwrap();
        let user_root = tempfile::tempdir().unwrap();
        let cfg = Config::default();

        let event = MemoryEvent::new(
            "lesson",
            "stop",
            Category::Bugfix,
            "guard token clears behind one helper",
            vec!["auth".to_string(), "logout".to_string()],
        );
        store::append_event(memory_root.path(), &event).unwrap();

        let decision = inject_memory(
            project_dir.path(),
            memory_root.path(),
            user_root.path(),
            &cfg,
            vec!["auth".to_string(), "logout".to_string()],
            None,
        );
        match decision {
            Decision::Context(text) => assert!(text.contains("guard token")),
            other => panic!("expected Context, got {other:?}"),
        }
    }
}
