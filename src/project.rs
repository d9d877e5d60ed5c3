//! Deterministic project identity: the hex digest used to segment every
//! memory, assertion, and counter store by project without persisting a
//! mutable registry of known projects.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Opaque, stable identifier for a project. Derived on demand from the
/// repository's remote URL when one is configured, falling back to the
/// canonicalized repository root. Never persisted except as a path
/// component; recomputing it for the same repository always yields the
/// same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectId(String);

impl ProjectId {
    /// Resolves the identity of the repository containing (or equal to)
    /// `cwd`. Falls back to hashing `cwd` itself when no git repository is
    /// found, so the toolkit still segments state sanely outside a repo.
    pub fn resolve(cwd: &Path) -> Self {
        match git2::Repository::discover(cwd) {
            Ok(repo) => {
                if let Some(url) = remote_url(&repo) {
                    return Self::from_seed(&canonical_seed(&url));
                }
                let root = repo
                    .workdir()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| cwd.to_path_buf());
                Self::from_seed(&canonical_seed(&path_seed(&root)))
            }
            Err(_) => Self::from_seed(&canonical_seed(&path_seed(cwd))),
        }
    }

    fn from_seed(seed: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(seed.as_bytes());
        ProjectId(hex::encode(hasher.finalize()))
    }

    /// Reconstructs a `ProjectId` from an already-resolved hex digest, e.g.
    /// a `memory/<project-id>/` directory name discovered on disk. Skips
    /// rehashing since the directory name already *is* the digest.
    pub fn from_hex(digest: impl Into<String>) -> Self {
        ProjectId(digest.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn remote_url(repo: &git2::Repository) -> Option<String> {
    repo.find_remote("origin")
        .ok()
        .and_then(|r| r.url().map(str::to_string))
}

fn path_seed(path: &Path) -> String {
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

fn canonical_seed(raw: &str) -> String {
    raw.trim().trim_end_matches(".git").to_string()
}

/// The directory under `<user-config-root>/memory/` where this project's
/// events, manifest, and core-assertions live.
pub fn memory_root(user_config_root: &Path, id: &ProjectId) -> PathBuf {
    user_config_root.join("memory").join(id.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_path_resolves_to_same_id() {
        let dir = tempfile::tempdir().unwrap();
        let a = ProjectId::resolve(dir.path());
        let b = ProjectId::resolve(dir.path());
        assert_eq!(a, b);
    }

    #[test]
    fn different_paths_resolve_to_different_ids() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        assert_ne!(ProjectId::resolve(a.path()), ProjectId::resolve(b.path()));
    }

    #[test]
    fn canonical_seed_strips_dot_git_suffix() {
        assert_eq!(
            canonical_seed("git@github.com:acme/repo.git"),
            "git@github.com:acme/repo"
        );
    }
}
