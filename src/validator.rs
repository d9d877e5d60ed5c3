//! Completion validator (C10): enforces the Stop completion contract.
//! Two-phase behavior (spec.md §4.9) — a first attempt renders the full
//! compliance checklist and blocks on any failure; a retry with
//! `stop_hook_active=true` re-evaluates the same hard gates (it "does not
//! blindly allow", per spec.md §7) and allows once they all pass. Both
//! phases run the identical seven hard gates; the difference is purely in
//! how much explanatory text accompanies a block.

use std::path::Path;

use crate::autonomous::Mode;
use crate::checkpoint::{self, CompletionCheckpoint};
use crate::errors::{Result, SchemaError};
use crate::memory::event::MemoryEvent;
use crate::memory::{manifest, store};
use crate::project::ProjectId;

/// One failed contract clause, numbered for the agent-facing checklist
/// per spec.md §7 ("a numbered checklist of exactly which contract
/// clauses failed, with paths and expected vs. actual values").
#[derive(Debug, Clone)]
pub struct GateFailure {
    pub clause: &'static str,
    pub detail: String,
}

/// What the validator needs to know about the project beyond the
/// checkpoint itself: the current code version and which artifact-gated
/// categories actually apply here.
#[derive(Debug, Clone)]
pub struct ValidationContext<'a> {
    pub project_root: &'a Path,
    pub current_version: String,
    pub mode: Option<Mode>,
    pub has_web_assets: bool,
    pub has_mobile_assets: bool,
}

/// Evaluates every hard gate from spec.md §4.9 against `checkpoint`.
/// An empty result means Stop is allowed.
pub fn evaluate(checkpoint: &CompletionCheckpoint, ctx: &ValidationContext<'_>) -> Vec<GateFailure> {
    let mut failures = Vec::new();

    // Gate 1: job complete and nothing remains.
    if !checkpoint.self_report.is_job_complete {
        failures.push(GateFailure {
            clause: "1. is_job_complete",
            detail: "self_report.is_job_complete is false or absent".to_string(),
        });
    }
    if !checkpoint.reflection.remains_none() {
        failures.push(GateFailure {
            clause: "1. what_remains",
            detail: format!(
                "expected \"none\", got {:?}",
                checkpoint.reflection.what_remains
            ),
        });
    }

    // Gate 2: reflection structural validity.
    if let Err(err) = checkpoint::validate_structure(checkpoint) {
        failures.push(GateFailure {
            clause: "2. reflection schema",
            detail: schema_error_detail(&err),
        });
    }

    // Gate 3: every present proven flag's stamp matches current version.
    for (flag, asserted, stamped) in checkpoint.self_report.proven_flags() {
        if !asserted {
            continue;
        }
        let fresh = stamped.as_deref() == Some(ctx.current_version.as_str());
        if !fresh {
            failures.push(GateFailure {
                clause: "3. version-stamp consistency",
                detail: format!(
                    "{flag} stamped at {}, current is {}",
                    stamped.as_deref().unwrap_or("<missing>"),
                    ctx.current_version
                ),
            });
        }
    }

    // Gate 4: code changes require a fresh linters_pass.
    if checkpoint.self_report.code_changes_made {
        let fresh_lint = checkpoint.self_report.linters_pass
            && checkpoint.self_report.linters_pass_at_version.as_deref()
                == Some(ctx.current_version.as_str());
        if !fresh_lint {
            failures.push(GateFailure {
                clause: "4. linters_pass",
                detail: "code_changes_made=true requires linters_pass=true at current version"
                    .to_string(),
            });
        }
    }

    // Gate 5: web verification artifact, when the mode requires it and
    // the project actually has web assets to verify.
    if let Some(mode) = &ctx.mode {
        if mode.requires_web_verification() && ctx.has_web_assets {
            if let Err(err) =
                crate::artifacts::validate_web_smoke(ctx.project_root, &ctx.current_version)
            {
                failures.push(GateFailure {
                    clause: "5. web_testing artifact",
                    detail: err.to_string(),
                });
            }
        }

        // Gate 6: mobile verification artifact.
        if mode.requires_mobile_verification() && ctx.has_mobile_assets {
            if let Err(err) =
                crate::artifacts::validate_mobile_smoke(ctx.project_root, &ctx.current_version)
            {
                failures.push(GateFailure {
                    clause: "6. mobile_testing artifact",
                    detail: err.to_string(),
                });
            }
        }

        // Gate 7: fix-targeted validation tests.
        if checkpoint.self_report.code_changes_made && mode.requires_validation_tests() {
            if let Err(err) = crate::artifacts::validate_validation_tests(
                ctx.project_root,
                &ctx.current_version,
            ) {
                failures.push(GateFailure {
                    clause: "7. validation_tests artifact",
                    detail: err.to_string(),
                });
            }
        }
    }

    failures
}

fn schema_error_detail(err: &SchemaError) -> String {
    match err {
        SchemaError::MissingField { field } => format!("missing required field: {field}"),
        SchemaError::InvalidField { field, reason } => format!("{field}: {reason}"),
        SchemaError::StaleProof {
            flag,
            stamped,
            current,
        } => format!("{flag} stamped at {stamped}, current is {current}"),
    }
}

/// Renders `failures` as the numbered, agent-facing checklist text
/// described in spec.md §7. `phase1` controls only the heading text —
/// both phases enumerate the same failing clauses.
pub fn render_checklist(failures: &[GateFailure], phase1: bool) -> String {
    let heading = if phase1 {
        "Stop blocked — completion contract not satisfied:"
    } else {
        "Stop blocked on retry — hard gates still failing:"
    };
    let mut out = String::from(heading);
    out.push('\n');
    for (i, failure) in failures.iter().enumerate() {
        out.push_str(&format!("{}. [{}] {}\n", i + 1, failure.clause, failure.detail));
    }
    out
}

/// Heuristic detection of whether this project has web assets worth a
/// browser smoke test: a `package.json` with a front-end framework
/// dependency, or a plain `index.html` at the root.
pub fn project_has_web_assets(project_root: &Path) -> bool {
    let package_json = project_root.join("package.json");
    if let Ok(contents) = std::fs::read_to_string(&package_json) {
        const FRONTEND_MARKERS: &[&str] = &["react", "vue", "svelte", "next", "vite", "angular"];
        if FRONTEND_MARKERS.iter().any(|m| contents.contains(m)) {
            return true;
        }
    }
    project_root.join("index.html").exists()
}

/// Heuristic detection of mobile assets: an `ios/` or `android/`
/// directory, or a Maestro flow config.
pub fn project_has_mobile_assets(project_root: &Path) -> bool {
    project_root.join("ios").is_dir()
        || project_root.join("android").is_dir()
        || project_root.join(".maestro").is_dir()
}

/// On a successful allow, emits a MemoryEvent summarizing the session
/// (LESSON-first content, entities from `search_terms` plus filenames
/// mentioned in `what_was_done`) and credits any cited memory ids back
/// into the manifest (spec.md §4.9).
pub fn record_completion(
    project_memory_root: &Path,
    checkpoint: &CompletionCheckpoint,
) -> Result<MemoryEvent> {
    let mut entities: Vec<String> = checkpoint.reflection.search_terms.clone();
    entities.extend(mentioned_filenames(&checkpoint.reflection.what_was_done));
    entities.sort();
    entities.dedup();

    let category = checkpoint
        .reflection
        .category
        .unwrap_or(crate::checkpoint::Category::Pattern);

    let mut content = checkpoint.reflection.key_insight.clone();
    if !checkpoint.reflection.what_was_done.is_empty() {
        content.push_str("\n\n");
        content.push_str(&checkpoint.reflection.what_was_done);
    }

    let mut event = MemoryEvent::new("lesson", "stop", category, content, entities);
    if let Some(evidence) = &checkpoint.evidence {
        if let Some(notes) = &evidence.notes {
            if event.meta.is_empty() {
                event
                    .meta
                    .insert("evidence_notes".to_string(), notes.clone().into());
            }
        }
    }

    store::append_event(project_memory_root, &event)?;

    if let Some(evidence) = &checkpoint.evidence {
        if !evidence.memory_that_helped.is_empty() {
            manifest::record_cited(project_memory_root, &evidence.memory_that_helped)?;
        }
    }

    Ok(event)
}

fn mentioned_filenames(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|tok| tok.trim_matches(|c: char| !c.is_alphanumeric() && c != '.' && c != '/' && c != '_' && c != '-'))
        .filter(|tok| {
            tok.contains('.')
                && tok.rsplit_once('.').map(|(_, ext)| !ext.is_empty() && ext.len() <= 5).unwrap_or(false)
        })
        .map(str::to_string)
        .collect()
}

/// Convenience for callers that only need the project id to locate the
/// memory store, mirroring the pattern used by the other hook binaries.
pub fn memory_root_for(project_root: &Path) -> std::path::PathBuf {
    let id = ProjectId::resolve(project_root);
    crate::project::memory_root(&crate::config::user_config_root(), &id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{Category, Reflection, SelfReport};

    fn compliant_checkpoint(version: &str) -> CompletionCheckpoint {
        CompletionCheckpoint {
            self_report: SelfReport {
                is_job_complete: true,
                code_changes_made: true,
                linters_pass: true,
                linters_pass_at_version: Some(version.to_string()),
                ..Default::default()
            },
            reflection: Reflection {
                what_was_done: "Implemented logout button".to_string(),
                what_remains: "none".to_string(),
                key_insight: "Guard token clears behind a single helper so 401 paths don't diverge."
                    .to_string(),
                search_terms: vec!["auth".to_string(), "logout".to_string()],
                category: Some(Category::Pattern),
            },
            evidence: None,
        }
    }

    #[test]
    fn s1_clean_completion_has_no_failures() {
        let checkpoint = compliant_checkpoint("abc1234");
        let ctx = ValidationContext {
            project_root: Path::new("/tmp"),
            current_version: "abc1234".to_string(),
            mode: None,
            has_web_assets: false,
            has_mobile_assets: false,
        };
        assert!(evaluate(&checkpoint, &ctx).is_empty());
    }

    #[test]
    fn s2_stale_deployed_flag_blocks() {
        let mut checkpoint = compliant_checkpoint("abc1234");
        checkpoint.self_report.deployed = true;
        checkpoint.self_report.deployed_at_version = Some("abc1234".to_string());
        let ctx = ValidationContext {
            project_root: Path::new("/tmp"),
            current_version: "abc1234-dirty-11ff22ee33dd".to_string(),
            mode: None,
            has_web_assets: false,
            has_mobile_assets: false,
        };
        let failures = evaluate(&checkpoint, &ctx);
        assert!(failures.iter().any(|f| f.detail.contains("deployed")));
    }

    #[test]
    fn what_remains_non_none_blocks() {
        let mut checkpoint = compliant_checkpoint("abc1234");
        checkpoint.reflection.what_remains = "fix the footer".to_string();
        let ctx = ValidationContext {
            project_root: Path::new("/tmp"),
            current_version: "abc1234".to_string(),
            mode: None,
            has_web_assets: false,
            has_mobile_assets: false,
        };
        assert!(!evaluate(&checkpoint, &ctx).is_empty());
    }

    #[test]
    fn key_insight_of_exactly_50_chars_blocks_51_passes() {
        let mut checkpoint = compliant_checkpoint("abc1234");
        checkpoint.reflection.key_insight = "a".repeat(50);
        let ctx = ValidationContext {
            project_root: Path::new("/tmp"),
            current_version: "abc1234".to_string(),
            mode: None,
            has_web_assets: false,
            has_mobile_assets: false,
        };
        assert!(!evaluate(&checkpoint, &ctx).is_empty());

        checkpoint.reflection.key_insight = "a".repeat(51);
        assert!(evaluate(&checkpoint, &ctx).is_empty());
    }

    #[test]
    fn s4_health_only_urls_block_when_web_required() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".claude/web-smoke")).unwrap();
        crate::io::write_json(
            &dir.path().join(".claude/web-smoke/summary.json"),
            &crate::artifacts::WebSmokeSummary {
                passed: true,
                tested_at: chrono::Utc::now(),
                tested_at_version: "abc1234".to_string(),
                urls_tested: vec!["https://app.example.com/health".to_string()],
                console_clean: true,
                details: Default::default(),
            },
        )
        .unwrap();

        let checkpoint = compliant_checkpoint("abc1234");
        let ctx = ValidationContext {
            project_root: dir.path(),
            current_version: "abc1234".to_string(),
            mode: Some(Mode::melt()),
            has_web_assets: true,
            has_mobile_assets: false,
        };
        let failures = evaluate(&checkpoint, &ctx);
        assert!(failures.iter().any(|f| f.clause.contains("web_testing")));
    }

    #[test]
    fn record_completion_derives_entities_from_search_terms_and_filenames() {
        let dir = tempfile::tempdir().unwrap();
        let mut checkpoint = compliant_checkpoint("abc1234");
        checkpoint.reflection.what_was_done = "Fixed navbar.tsx rendering bug".to_string();
        let event = record_completion(dir.path(), &checkpoint).unwrap();
        assert!(event.entities.contains(&"navbar.tsx".to_string()));
        assert!(event.entities.contains(&"auth".to_string()));
    }
}
