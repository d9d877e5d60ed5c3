//! Auto-approver (C11): for any pre-tool or permission event, emits
//! `allow` when an active, unexpired autonomous state owns the caller.
//! No state file, no elevation — the only precondition is C4's `read`,
//! which makes the security surface auditable (spec.md §4.10).

use std::path::Path;

use crate::autonomous::{self, Lookup};
use crate::config::Config;
use crate::dispatch::Decision;
use crate::errors::Result;

/// Consults C4 for `cwd`/`session_id` and returns `Allow` iff an active
/// state owns the caller. Ownership mismatch or no state at all yields
/// `Passthrough`, never `Deny` (spec.md §7's `OwnershipMismatch` policy:
/// "auto-approver yields passthrough, never denies" — absence of
/// elevation is not the same as an explicit refusal, which stays the
/// host's permission UI's call).
pub fn decide(cwd: &Path, session_id: &str, cfg: &Config) -> Result<Decision> {
    match autonomous::read(cwd, session_id, cfg)? {
        Lookup::Active(_) => Ok(Decision::Allow),
        Lookup::Inactive => Ok(Decision::Passthrough),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autonomous::Mode;

    #[test]
    fn active_matching_session_allows() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::default();
        autonomous::activate(Mode::melt(), "S1", dir.path()).unwrap();
        let decision = decide(dir.path(), "S1", &cfg).unwrap();
        assert!(matches!(decision, Decision::Allow));
    }

    #[test]
    fn no_state_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::default();
        let decision = decide(dir.path(), "unrelated", &cfg).unwrap();
        assert!(matches!(decision, Decision::Passthrough));
    }

    #[test]
    fn ownership_mismatch_passes_through_never_denies() {
        let repo_a = tempfile::tempdir().unwrap();
        let repo_b = tempfile::tempdir().unwrap();
        let cfg = Config::default();
        autonomous::activate(Mode::melt(), "S3a", repo_a.path()).unwrap();
        let decision = decide(repo_b.path(), "S3b", &cfg).unwrap();
        assert!(matches!(decision, Decision::Passthrough));
    }
}
