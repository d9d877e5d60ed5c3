//! The agent's self-report and reflection at an attempted termination.
//! Schema-validated on load, versioned per field, and the target of the
//! cascade engine's `reset_field` resets.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{Result, SchemaError};
use crate::io;
use crate::redact;

/// Category the agent assigns its reflection to; constrains what the
/// completion validator's category-specific rules enforce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Bugfix,
    Gotcha,
    Architecture,
    Pattern,
    Config,
    Refactor,
}

/// Every boolean asserting a proven fact carries a version stamp sibling
/// in the wire schema (`<field>`/`<field>_at_version`); this is the known
/// set named in the data model. Additional category-specific flags travel
/// through `extra` and are surfaced uniformly via [`CompletionCheckpoint::proven_flags`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelfReport {
    #[serde(default)]
    pub is_job_complete: bool,
    #[serde(default)]
    pub code_changes_made: bool,

    #[serde(default)]
    pub linters_pass: bool,
    pub linters_pass_at_version: Option<String>,

    #[serde(default)]
    pub deployed: bool,
    pub deployed_at_version: Option<String>,

    #[serde(default)]
    pub web_testing_done: bool,
    pub web_testing_done_at_version: Option<String>,

    #[serde(default)]
    pub console_errors_checked: bool,
    pub console_errors_checked_at_version: Option<String>,

    #[serde(default)]
    pub api_testing_done: bool,
    pub api_testing_done_at_version: Option<String>,

    #[serde(default)]
    pub validation_tests_passed: bool,
    pub validation_tests_passed_at_version: Option<String>,

    /// Category-specific or forward-compatible flags not named above.
    /// Preserved verbatim across load/save so a newer agent build's
    /// additional proven flags survive a round trip through this version
    /// of the toolkit.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

const KNOWN_FLAGS: &[&str] = &[
    "linters_pass",
    "deployed",
    "web_testing_done",
    "console_errors_checked",
    "api_testing_done",
    "validation_tests_passed",
];

impl SelfReport {
    fn known_flag(&self, name: &str) -> Option<(bool, Option<String>)> {
        match name {
            "linters_pass" => Some((self.linters_pass, self.linters_pass_at_version.clone())),
            "deployed" => Some((self.deployed, self.deployed_at_version.clone())),
            "web_testing_done" => Some((
                self.web_testing_done,
                self.web_testing_done_at_version.clone(),
            )),
            "console_errors_checked" => Some((
                self.console_errors_checked,
                self.console_errors_checked_at_version.clone(),
            )),
            "api_testing_done" => Some((
                self.api_testing_done,
                self.api_testing_done_at_version.clone(),
            )),
            "validation_tests_passed" => Some((
                self.validation_tests_passed,
                self.validation_tests_passed_at_version.clone(),
            )),
            _ => None,
        }
    }

    fn set_known_flag(&mut self, name: &str, value: bool, at_version: Option<String>) -> bool {
        match name {
            "linters_pass" => {
                self.linters_pass = value;
                self.linters_pass_at_version = at_version;
            }
            "deployed" => {
                self.deployed = value;
                self.deployed_at_version = at_version;
            }
            "web_testing_done" => {
                self.web_testing_done = value;
                self.web_testing_done_at_version = at_version;
            }
            "console_errors_checked" => {
                self.console_errors_checked = value;
                self.console_errors_checked_at_version = at_version;
            }
            "api_testing_done" => {
                self.api_testing_done = value;
                self.api_testing_done_at_version = at_version;
            }
            "validation_tests_passed" => {
                self.validation_tests_passed = value;
                self.validation_tests_passed_at_version = at_version;
            }
            _ => return false,
        }
        true
    }

    /// Every proven flag present in this report, known or extra, as
    /// `(name, asserted, stamped_version)`. Used by both the cascade
    /// engine (to find what needs resetting) and the completion validator
    /// (hard gate 3: every present flag's stamp must equal current
    /// version).
    pub fn proven_flags(&self) -> Vec<(String, bool, Option<String>)> {
        let mut out = Vec::new();
        for name in KNOWN_FLAGS {
            if let Some((asserted, version)) = self.known_flag(name) {
                out.push((name.to_string(), asserted, version));
            }
        }
        for key in self.extra.keys() {
            if let Some(base) = key.strip_suffix("_at_version") {
                if KNOWN_FLAGS.contains(&base) {
                    continue;
                }
                let asserted = self
                    .extra
                    .get(base)
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let version = self
                    .extra
                    .get(key)
                    .and_then(Value::as_str)
                    .map(str::to_string);
                out.push((base.to_string(), asserted, version));
            }
        }
        out
    }

    /// Resets `field` to `false` and clears its version stamp, known or
    /// extra. Used by the cascade engine; a no-op (returns `false`) if the
    /// field isn't present at all, so callers can distinguish "reset" from
    /// "nothing to reset".
    pub fn reset_field(&mut self, field: &str) -> bool {
        if self.set_known_flag(field, false, None) {
            return true;
        }
        if self.extra.contains_key(field) {
            self.extra.insert(field.to_string(), Value::Bool(false));
            self.extra.remove(&format!("{field}_at_version"));
            return true;
        }
        false
    }
}

/// The five required reflection fields plus free-form search terms.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Reflection {
    pub what_was_done: String,
    pub what_remains: String,
    pub key_insight: String,
    #[serde(default)]
    pub search_terms: Vec<String>,
    pub category: Option<Category>,
}

impl Reflection {
    /// `what_remains` passes the stop contract iff it is, case-insensitively
    /// and trimmed, exactly `"none"`.
    pub fn remains_none(&self) -> bool {
        self.what_remains.trim().eq_ignore_ascii_case("none")
    }
}

/// Optional supporting evidence: tested URLs, artifact pointers, and the
/// ids of memory events the agent credits with helping, fed back into
/// the manifest's `cited` counters on a successful Stop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(default)]
    pub urls_tested: Vec<String>,
    #[serde(default)]
    pub artifact_paths: Vec<String>,
    #[serde(default)]
    pub memory_that_helped: Vec<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionCheckpoint {
    #[serde(default)]
    pub self_report: SelfReport,
    #[serde(default)]
    pub reflection: Reflection,
    pub evidence: Option<Evidence>,
}

fn checkpoint_path(project_root: &Path) -> PathBuf {
    project_root.join(".claude").join("completion-checkpoint.json")
}

/// Loads the checkpoint, schema-validating structural fields. A missing
/// file yields the default (empty) checkpoint, not an error; a present
/// but unparseable file is a [`crate::errors::StateError::Corrupt`].
pub fn load(project_root: &Path) -> Result<CompletionCheckpoint> {
    io::read_json_or_default(&checkpoint_path(project_root), CompletionCheckpoint::default())
}

/// Validates structural invariants the JSON schema alone can't express:
/// required-field presence and minimum lengths. Called by the completion
/// validator before consistency checks; kept separate from [`load`] so
/// callers that only want to inspect state (the cascade engine, the admin
/// CLI) don't pay for reflection validation they don't need.
pub fn validate_structure(checkpoint: &CompletionCheckpoint) -> std::result::Result<(), SchemaError> {
    let reflection = &checkpoint.reflection;
    if reflection.what_was_done.chars().count() < 20 {
        return Err(SchemaError::InvalidField {
            field: "what_was_done",
            reason: "must be at least 20 characters".to_string(),
        });
    }
    if reflection.key_insight.chars().count() < 51 {
        return Err(SchemaError::InvalidField {
            field: "key_insight",
            reason: "must be more than 50 characters".to_string(),
        });
    }
    if !(2..=7).contains(&reflection.search_terms.len()) {
        return Err(SchemaError::InvalidField {
            field: "search_terms",
            reason: "must list between 2 and 7 terms".to_string(),
        });
    }
    if reflection.category.is_none() {
        return Err(SchemaError::MissingField { field: "category" });
    }
    Ok(())
}

/// Redacts anything secret-shaped out of the self-report's extra fields
/// and the reflection/evidence free text, then writes through C1.
pub fn save(project_root: &Path, mut checkpoint: CompletionCheckpoint) -> Result<()> {
    checkpoint.reflection.what_was_done =
        redact::redact_secrets(&checkpoint.reflection.what_was_done).into_owned();
    checkpoint.reflection.key_insight =
        redact::redact_secrets(&checkpoint.reflection.key_insight).into_owned();
    if let Some(evidence) = checkpoint.evidence.as_mut() {
        if let Some(notes) = evidence.notes.as_mut() {
            *notes = redact::redact_secrets(notes).into_owned();
        }
    }
    let mut extra = Value::Object(checkpoint.self_report.extra.clone());
    redact::redact_json(&mut extra);
    if let Value::Object(map) = extra {
        checkpoint.self_report.extra = map;
    }
    io::write_json(&checkpoint_path(project_root), &checkpoint)
}

/// Resets `field` on the persisted checkpoint, used exclusively by the
/// cascade engine. Locked via C1 so a concurrent save doesn't race the
/// read-modify-write.
pub fn reset_field(project_root: &Path, field: &str) -> Result<bool> {
    let lock_path = project_root.join(".claude").join(".completion-checkpoint.lock");
    io::atomic::with_exclusive_lock(&lock_path, || {
        let mut checkpoint = load(project_root)?;
        let changed = checkpoint.self_report.reset_field(field);
        if changed {
            io::write_json(&checkpoint_path(project_root), &checkpoint)?;
        }
        Ok(changed)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remains_none_is_case_and_whitespace_insensitive() {
        let mut reflection = Reflection::default();
        reflection.what_remains = "  NoNe  ".to_string();
        assert!(reflection.remains_none());
        reflection.what_remains = "none, but tests".to_string();
        assert!(!reflection.remains_none());
    }

    #[test]
    fn proven_flags_lists_known_and_extra() {
        let mut report = SelfReport::default();
        report.linters_pass = true;
        report.linters_pass_at_version = Some("abc1234".to_string());
        report
            .extra
            .insert("api_contract_checked".to_string(), Value::Bool(true));
        report.extra.insert(
            "api_contract_checked_at_version".to_string(),
            Value::String("abc1234".to_string()),
        );

        let flags = report.proven_flags();
        assert!(flags
            .iter()
            .any(|(name, asserted, v)| name == "linters_pass" && *asserted && v.as_deref() == Some("abc1234")));
        assert!(flags
            .iter()
            .any(|(name, asserted, v)| name == "api_contract_checked" && *asserted && v.as_deref() == Some("abc1234")));
    }

    #[test]
    fn reset_field_clears_known_flag_and_stamp() {
        let mut report = SelfReport::default();
        report.deployed = true;
        report.deployed_at_version = Some("abc1234".to_string());
        assert!(report.reset_field("deployed"));
        assert!(!report.deployed);
        assert!(report.deployed_at_version.is_none());
    }

    #[test]
    fn structural_validation_rejects_short_fields() {
        let checkpoint = CompletionCheckpoint::default();
        assert!(validate_structure(&checkpoint).is_err());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut checkpoint = CompletionCheckpoint::default();
        checkpoint.reflection.what_was_done = "Implemented logout button cleanly".to_string();
        save(dir.path(), checkpoint).unwrap();
        let loaded = load(dir.path()).unwrap();
        assert_eq!(loaded.reflection.what_was_done, "Implemented logout button cleanly");
    }
}
