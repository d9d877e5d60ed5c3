//! Derives the short code fingerprint ("CodeVersion") that stamps every
//! proven flag: the current commit id, plus a content digest of the
//! working-tree diff when the tree is dirty. Pure read; the engine may
//! memoize per event but this module never caches.

use std::path::Path;

use sha2::{Digest, Sha256};

/// Returned by [`current_version`] when `repo_root` is not inside a git
/// repository. Any field stamped with this sentinel is never considered
/// version-valid, since it can never equal a later real commit id.
pub const NO_REPO: &str = "no-repo";

/// Combines the commit id with a 12-character digest of the uncommitted
/// diff when the tree is dirty. A clean tree yields just the commit id.
pub fn current_version(repo_root: &Path) -> String {
    let repo = match git2::Repository::discover(repo_root) {
        Ok(repo) => repo,
        Err(_) => return NO_REPO.to_string(),
    };

    let commit_id = match head_commit_id(&repo) {
        Some(id) => id,
        None => return NO_REPO.to_string(),
    };

    match diff_digest(&repo) {
        Some(digest) => format!("{commit_id}-dirty-{digest}"),
        None => commit_id,
    }
}

/// Whether the working tree has any staged or unstaged changes relative
/// to `HEAD`.
pub fn is_dirty(repo_root: &Path) -> bool {
    match git2::Repository::discover(repo_root) {
        Ok(repo) => diff_digest(&repo).is_some(),
        Err(_) => false,
    }
}

fn head_commit_id(repo: &git2::Repository) -> Option<String> {
    let head = repo.head().ok()?;
    let commit = head.peel_to_commit().ok()?;
    Some(commit.id().to_string())
}

/// `None` for a clean tree; otherwise the first 12 hex characters of the
/// SHA-256 over the unified diff between `HEAD` and the working tree
/// (index + working directory), so the digest changes whenever the actual
/// content changes rather than merely when a file's mtime does.
fn diff_digest(repo: &git2::Repository) -> Option<String> {
    let head_tree = repo.head().ok()?.peel_to_tree().ok();

    let mut opts = git2::DiffOptions::new();
    opts.include_untracked(true).recurse_untracked_dirs(true);

    let diff = repo
        .diff_tree_to_workdir_with_index(head_tree.as_ref(), Some(&mut opts))
        .ok()?;

    if diff.deltas().len() == 0 {
        return None;
    }

    let mut hasher = Sha256::new();
    let mut any_bytes = false;
    diff.print(git2::DiffFormat::Patch, |_delta, _hunk, line| {
        any_bytes = true;
        hasher.update(line.content());
        true
    })
    .ok()?;

    if !any_bytes {
        // Deltas exist (e.g. mode-only changes) but produced no patch
        // text; hash the delta count so the tree still registers dirty.
        hasher.update(diff.deltas().len().to_le_bytes());
    }

    let digest = hex::encode(hasher.finalize());
    Some(digest[..12].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outside_repo_returns_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(current_version(dir.path()), NO_REPO);
        assert!(!is_dirty(dir.path()));
    }
}
