//! Version-aware dependency graph over proven flags. On every post-action
//! event that might change the tree, recomputes the current code version
//! and resets any flag whose stamp no longer matches, then transitively
//! resets everything downstream of it.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::checkpoint::{self, CompletionCheckpoint};
use crate::errors::Result;
use crate::version;

/// The DAG from spec §4.5: `linters_pass` gates `deployed`, which in turn
/// gates the three verification flags. `validation_tests_passed` has no
/// dependents.
fn dependency_edges() -> HashMap<&'static str, &'static [&'static str]> {
    let mut edges: HashMap<&'static str, &'static [&'static str]> = HashMap::new();
    edges.insert("linters_pass", &["deployed"]);
    edges.insert(
        "deployed",
        &["web_testing_done", "console_errors_checked", "api_testing_done"],
    );
    edges
}

/// One flag the engine reset this pass, for the Stop validator's stale-proof
/// message and for tests asserting idempotence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reset {
    pub flag: String,
    pub stamped_version: Option<String>,
    pub current_version: String,
}

/// Recomputes the current version and resets every stale proven flag
/// (known or extra) plus everything transitively downstream of it.
/// Idempotent: running twice in a row against the same on-disk state
/// yields an empty second result, since the first pass already cleared
/// every stale stamp.
pub fn run(project_root: &Path) -> Result<Vec<Reset>> {
    let current = version::current_version(project_root);
    let checkpoint = checkpoint::load(project_root)?;
    let resets = compute_resets(&checkpoint, &current);

    for reset in &resets {
        checkpoint::reset_field(project_root, &reset.flag)?;
    }

    Ok(resets)
}

/// Pure computation over an in-memory checkpoint, exposed separately from
/// [`run`] so the idempotence property can be tested without touching the
/// filesystem or git.
pub fn compute_resets(checkpoint: &CompletionCheckpoint, current_version: &str) -> Vec<Reset> {
    let edges = dependency_edges();
    let mut to_reset: HashSet<String> = HashSet::new();

    for (flag, asserted, stamped) in checkpoint.self_report.proven_flags() {
        if !asserted {
            continue;
        }
        let stale = match &stamped {
            Some(v) => v != current_version,
            None => true,
        };
        if stale {
            to_reset.insert(flag);
        }
    }

    // Transitive closure over the static DAG edges for anything we're
    // resetting; extra/category-specific flags have no known dependents
    // and simply reset themselves.
    let mut frontier: Vec<String> = to_reset.iter().cloned().collect();
    while let Some(flag) = frontier.pop() {
        if let Some(children) = edges.get(flag.as_str()) {
            for child in *children {
                if to_reset.insert(child.to_string()) {
                    frontier.push(child.to_string());
                }
            }
        }
    }

    let flags_by_name: HashMap<String, (bool, Option<String>)> = checkpoint
        .self_report
        .proven_flags()
        .into_iter()
        .map(|(name, asserted, stamped)| (name, (asserted, stamped)))
        .collect();

    let mut resets: Vec<Reset> = to_reset
        .into_iter()
        .filter(|flag| {
            // Only emit a Reset entry for flags actually present (asserted
            // true) in the checkpoint; a downstream flag the agent never
            // claimed has nothing to invalidate.
            flags_by_name
                .get(flag)
                .map(|(asserted, _)| *asserted)
                .unwrap_or(false)
        })
        .map(|flag| {
            let stamped = flags_by_name.get(&flag).and_then(|(_, v)| v.clone());
            Reset {
                flag,
                stamped_version: stamped,
                current_version: current_version.to_string(),
            }
        })
        .collect();

    resets.sort_by(|a, b| a.flag.cmp(&b.flag));
    resets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::SelfReport;

    fn checkpoint_with(linters_pass: bool, linters_at: Option<&str>, deployed: bool, deployed_at: Option<&str>) -> CompletionCheckpoint {
        let mut report = SelfReport::default();
        report.linters_pass = linters_pass;
        report.linters_pass_at_version = linters_at.map(str::to_string);
        report.deployed = deployed;
        report.deployed_at_version = deployed_at.map(str::to_string);
        report.web_testing_done = deployed;
        report.web_testing_done_at_version = deployed_at.map(str::to_string);
        CompletionCheckpoint {
            self_report: report,
            ..Default::default()
        }
    }

    #[test]
    fn stale_deployed_cascades_to_web_testing() {
        // S2: deployed stamped at abc1234, tree now dirty at a new version.
        let checkpoint = checkpoint_with(true, Some("abc1234"), true, Some("abc1234"));
        let resets = compute_resets(&checkpoint, "abc1234-dirty-11ff22ee33dd");
        let names: Vec<_> = resets.iter().map(|r| r.flag.as_str()).collect();
        assert!(names.contains(&"deployed"));
        assert!(names.contains(&"web_testing_done"));
    }

    #[test]
    fn fresh_flags_are_not_reset() {
        let checkpoint = checkpoint_with(true, Some("abc1234"), true, Some("abc1234"));
        let resets = compute_resets(&checkpoint, "abc1234");
        assert!(resets.is_empty());
    }

    #[test]
    fn cascade_is_idempotent() {
        let checkpoint = checkpoint_with(true, Some("abc1234"), true, Some("abc1234"));
        let first = compute_resets(&checkpoint, "new-version");

        let mut after = checkpoint.clone();
        for reset in &first {
            after.self_report.reset_field(&reset.flag);
        }
        let second = compute_resets(&after, "new-version");
        assert!(second.is_empty());
    }
}
