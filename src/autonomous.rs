//! Process-wide, session-scoped, TTL-governed autonomous mode state.
//! Gates every tool invocation (via [`crate::approver`]) and anchors the
//! completion contract enforced by [`crate::validator`].

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::errors::Result;
use crate::io;

/// The operating mode an autonomous session was activated under. Backed
/// by a plain string rather than a closed enum: the set of modes is
/// open-ended ("melt, repair, burndown, improve, godo-style quick, …"
/// per the data model), so new mode names round-trip without a schema
/// change even though a handful of well-known ones drive behavior below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mode(pub String);

impl Mode {
    pub fn melt() -> Mode {
        Mode("melt".to_string())
    }

    /// Debugging-flavored modes receive the recency/category boost in
    /// memory retrieval (spec §4.7).
    pub fn is_debugging(&self) -> bool {
        matches!(self.0.as_str(), "repair" | "burndown")
    }

    /// Whether this mode's completion contract requires a web-verification
    /// artifact before Stop is allowed.
    pub fn requires_web_verification(&self) -> bool {
        matches!(self.0.as_str(), "melt" | "improve")
    }

    /// Whether this mode's completion contract requires a fix-targeted
    /// validation-tests artifact before Stop is allowed.
    pub fn requires_validation_tests(&self) -> bool {
        matches!(self.0.as_str(), "repair" | "burndown" | "melt")
    }

    /// Whether this mode's completion contract requires a mobile-smoke
    /// artifact before Stop is allowed.
    pub fn requires_mobile_verification(&self) -> bool {
        matches!(self.0.as_str(), "melt")
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Mode {
    fn from(s: &str) -> Self {
        Mode(s.to_string())
    }
}

/// Multi-agent coordination descriptor: which of a worktree fleet this
/// state belongs to, and whether it holds deploy authority.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Coordination {
    #[serde(default)]
    pub coordinator: bool,
    #[serde(default)]
    pub parallel_mode: bool,
    pub agent_id: Option<String>,
    pub worktree_path: Option<PathBuf>,
}

/// An active autonomous-mode descriptor, persisted in both a project-
/// scoped and a user-scoped copy so the contract survives the agent
/// changing directories mid-session (spec §4.3, S6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutonomousState {
    pub mode: Mode,
    pub session_id: String,
    pub origin_project: PathBuf,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    #[serde(default)]
    pub iteration: u64,
    #[serde(default)]
    pub plan_mode_completed: bool,
    #[serde(flatten)]
    pub coordination: Coordination,
}

/// Result of [`read`]: either an autonomous state was found and its
/// ownership checks out for the caller, or it is absent/inapplicable.
pub enum Lookup {
    Active(AutonomousState),
    Inactive,
}

fn project_state_path(cwd: &Path) -> PathBuf {
    cwd.join(".claude").join("autonomous-state.json")
}

fn user_state_path() -> PathBuf {
    crate::config::user_config_root().join("autonomous-state.json")
}

/// Activates autonomous mode: writes both the project- and user-scoped
/// descriptors. `cwd` becomes `origin_project`.
pub fn activate(mode: Mode, session_id: &str, cwd: &Path) -> Result<AutonomousState> {
    let now = Utc::now();
    let state = AutonomousState {
        mode,
        session_id: session_id.to_string(),
        origin_project: cwd.to_path_buf(),
        started_at: now,
        last_activity_at: now,
        iteration: 1,
        plan_mode_completed: false,
        coordination: Coordination::default(),
    };
    persist_both(cwd, &state)?;
    Ok(state)
}

/// Reads the active autonomous state applicable to `cwd`/`session_id`, if
/// any. Ownership rule (spec §4.3): the project-scoped copy applies when
/// `cwd` is itself (or at/below) the state's `origin_project`; otherwise
/// the user-scoped copy applies only when `session_id` matches exactly,
/// which is how cross-directory continuation (S6) works without leaking
/// state across unrelated sessions.
pub fn read(cwd: &Path, session_id: &str, cfg: &Config) -> Result<Lookup> {
    if let Some(state) = load_valid(&project_state_path(cwd), cfg)? {
        if cwd.starts_with(&state.origin_project) || state.session_id == session_id {
            return Ok(Lookup::Active(state));
        }
    }

    if let Some(state) = load_valid(&user_state_path(), cfg)? {
        if state.session_id == session_id || cwd.starts_with(&state.origin_project) {
            return Ok(Lookup::Active(state));
        }
    }

    Ok(Lookup::Inactive)
}

fn load_valid(path: &Path, cfg: &Config) -> Result<Option<AutonomousState>> {
    let state: Option<AutonomousState> = match io::atomic::read_json(path) {
        io::ReadOutcome::Found(s) => Some(s),
        io::ReadOutcome::Missing => None,
        io::ReadOutcome::Corrupt(_) => None,
    };
    Ok(state.filter(|s| !is_expired(s, cfg)))
}

fn is_expired(state: &AutonomousState, cfg: &Config) -> bool {
    let ttl = chrono::Duration::seconds(cfg.autonomous_ttl_secs as i64);
    Utc::now() - state.last_activity_at > ttl
}

/// Bumps `last_activity_at` (and, when the caller is mid an iteration
/// boundary, `iteration`) on both scoped copies.
pub fn touch(cwd: &Path, session_id: &str, cfg: &Config) -> Result<()> {
    if let Lookup::Active(mut state) = read(cwd, session_id, cfg)? {
        state.last_activity_at = Utc::now();
        persist_both(cwd, &state)?;
    }
    Ok(())
}

/// Marks the plan-mode gate satisfied and advances the iteration counter,
/// used by the gates module once plan-mode output is observed.
pub fn advance_iteration(cwd: &Path, session_id: &str, cfg: &Config) -> Result<()> {
    if let Lookup::Active(mut state) = read(cwd, session_id, cfg)? {
        state.iteration += 1;
        state.last_activity_at = Utc::now();
        persist_both(cwd, &state)?;
    }
    Ok(())
}

pub fn complete_plan_mode(cwd: &Path, session_id: &str, cfg: &Config) -> Result<()> {
    if let Lookup::Active(mut state) = read(cwd, session_id, cfg)? {
        state.plan_mode_completed = true;
        state.last_activity_at = Utc::now();
        persist_both(cwd, &state)?;
    }
    Ok(())
}

/// Deactivates autonomous mode by removing both scoped copies.
pub fn deactivate(cwd: &Path) -> Result<()> {
    for path in [project_state_path(cwd), user_state_path()] {
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| crate::errors::LoopguardError::Io {
                path: path.clone(),
                message: e.to_string(),
            })?;
        }
    }
    Ok(())
}

/// Reads the project-scoped state file directly, with no ownership or
/// expiry filtering. For the admin CLI's `show-state`, which wants to
/// display whatever is on disk rather than decide whether to honor it.
pub fn inspect(cwd: &Path) -> Option<AutonomousState> {
    match io::atomic::read_json(&project_state_path(cwd)) {
        io::ReadOutcome::Found(state) => Some(state),
        _ => None,
    }
}

/// Reclaims any autonomous state whose `last_activity_at` has aged past
/// the TTL with no live owner. Only ever invoked at session start, never
/// mid-flight, per spec §5's shared-resource policy.
pub fn sweep_expired(cwd: &Path, cfg: &Config) -> Result<bool> {
    let mut swept = false;
    for path in [project_state_path(cwd), user_state_path()] {
        if let io::ReadOutcome::Found(state) = io::atomic::read_json::<AutonomousState>(&path) {
            if is_expired(&state, cfg) {
                let _ = std::fs::remove_file(&path);
                swept = true;
            }
        }
    }
    Ok(swept)
}

fn persist_both(cwd: &Path, state: &AutonomousState) -> Result<()> {
    io::write_json(&project_state_path(cwd), state)?;
    io::write_json(&user_state_path(), state)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Config {
        Config {
            autonomous_ttl_secs: 3600,
            ..Config::default()
        }
    }

    #[test]
    fn activate_then_read_round_trips_in_project_scope() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = cfg();
        activate(Mode::melt(), "S1", dir.path()).unwrap();
        match read(dir.path(), "S1", &cfg).unwrap() {
            Lookup::Active(state) => assert_eq!(state.session_id, "S1"),
            Lookup::Inactive => panic!("expected active state"),
        }
    }

    #[test]
    fn unrelated_session_and_cwd_is_inactive() {
        let repo_a = tempfile::tempdir().unwrap();
        let repo_b = tempfile::tempdir().unwrap();
        let cfg = cfg();
        activate(Mode::melt(), "S3a", repo_a.path()).unwrap();
        // S3b has no state of its own and neither matches session nor cwd.
        match read(repo_b.path(), "S3b", &cfg).unwrap() {
            Lookup::Active(_) => panic!("expected inactive for unrelated session"),
            Lookup::Inactive => {}
        }
    }

    #[test]
    fn matching_session_id_is_active_from_any_cwd() {
        let repo_a = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let cfg = cfg();
        activate(Mode::melt(), "S6", repo_a.path()).unwrap();
        match read(scratch.path(), "S6", &cfg).unwrap() {
            Lookup::Active(state) => assert_eq!(state.session_id, "S6"),
            Lookup::Inactive => panic!("expected cross-directory continuation to work"),
        }
    }

    #[test]
    fn expired_state_is_not_returned() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = cfg();
        cfg.autonomous_ttl_secs = 0;
        activate(Mode::melt(), "S1", dir.path()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        match read(dir.path(), "S1", &cfg).unwrap() {
            Lookup::Active(_) => panic!("expected expiry"),
            Lookup::Inactive => {}
        }
    }
}
