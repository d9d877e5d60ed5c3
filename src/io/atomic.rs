use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::errors::{LoopguardError, Result, StateError};

/// Outcome of a read that must distinguish "never written" from
/// "written but unparseable" from "couldn't even touch the filesystem".
/// Callers that only care about success/failure should prefer
/// [`read_json_or_default`]; this is for callers (validators, the admin
/// CLI) that need to react differently to each case.
#[derive(Debug)]
pub enum ReadOutcome<T> {
    Found(T),
    Missing,
    Corrupt(String),
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| LoopguardError::Io {
            path: parent.to_path_buf(),
            message: e.to_string(),
        })?;
    }
    Ok(())
}

/// Writes `obj` to a sibling temp file, fsyncs it, then atomically renames
/// it onto `path`. A crash at any point before the rename leaves the
/// previous contents of `path` untouched; a crash after leaves the new
/// contents in place. `path` is never observed half-written.
pub fn write_json<T: Serialize>(path: &Path, obj: &T) -> Result<()> {
    ensure_parent(path)?;
    let parent = path.parent().unwrap_or_else(|| Path::new("."));

    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| LoopguardError::Io {
        path: parent.to_path_buf(),
        message: e.to_string(),
    })?;

    let bytes = serde_json::to_vec_pretty(obj).map_err(|e| LoopguardError::Io {
        path: path.to_path_buf(),
        message: format!("serialize: {e}"),
    })?;
    tmp.write_all(&bytes).map_err(|e| LoopguardError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    tmp.as_file().sync_all().map_err(|e| LoopguardError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    tmp.persist(path).map_err(|e| LoopguardError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(())
}

/// Appends one JSON-serialized line to `path` under an exclusive advisory
/// lock held on the file itself for the duration of the write. Two
/// concurrent appenders never interleave partial lines; readers either see
/// the line fully or not at all, per the platform's append-mode guarantee
/// for writes under `O_APPEND`/one lock at a time.
pub fn append_jsonl<T: Serialize>(path: &Path, obj: &T) -> Result<()> {
    ensure_parent(path)?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| LoopguardError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    file.lock_exclusive().map_err(|e| StateError::LockFailed {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let result = (|| -> Result<()> {
        let mut line = serde_json::to_string(obj).map_err(|e| LoopguardError::Io {
            path: path.to_path_buf(),
            message: format!("serialize: {e}"),
        })?;
        line.push('\n');
        file.write_all(line.as_bytes())
            .map_err(|e| LoopguardError::Io {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        file.sync_all().map_err(|e| LoopguardError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(())
    })();

    FileExt::unlock(&file).ok();
    result
}

/// Reads and deserializes `path`, distinguishing missing from corrupt.
/// Never mutates `path`; corrupt JSON is reported, not repaired.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> ReadOutcome<T> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return ReadOutcome::Missing,
        Err(e) => return ReadOutcome::Corrupt(e.to_string()),
    };

    match serde_json::from_str(&contents) {
        Ok(value) => ReadOutcome::Found(value),
        Err(e) => ReadOutcome::Corrupt(e.to_string()),
    }
}

/// Convenience wrapper over [`read_json`] for callers that have a sane
/// default for "never written" but still need to fail loudly on corruption
/// rather than silently clobber it with the default.
pub fn read_json_or_default<T: DeserializeOwned>(path: &Path, default: T) -> Result<T> {
    match read_json(path) {
        ReadOutcome::Found(value) => Ok(value),
        ReadOutcome::Missing => Ok(default),
        ReadOutcome::Corrupt(message) => Err(StateError::Corrupt {
            path: path.to_path_buf(),
            message,
        }
        .into()),
    }
}

/// Opens `path` for reading under a shared advisory lock, for callers that
/// need a read-modify-write cycle (e.g. the cascade engine touching the
/// checkpoint) without racing a concurrent writer's rename.
pub fn with_exclusive_lock<F, R>(lock_path: &Path, f: F) -> Result<R>
where
    F: FnOnce() -> Result<R>,
{
    ensure_parent(lock_path)?;
    let lock_file = OpenOptions::new()
        .create(true)
        .write(true)
        .open(lock_path)
        .map_err(|e| LoopguardError::Io {
            path: lock_path.to_path_buf(),
            message: e.to_string(),
        })?;

    lock_file.lock_exclusive().map_err(|e| StateError::LockFailed {
        path: lock_path.to_path_buf(),
        message: e.to_string(),
    })?;

    let result = f();
    FileExt::unlock(&lock_file).ok();
    result
}

/// Removes any `.tmp*` leftovers from a crashed writer in `dir`. Called
/// opportunistically before the next write to that directory, never on a
/// read path.
pub fn sweep_temp_files(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    let entries = fs::read_dir(dir).map_err(|e| LoopguardError::Io {
        path: dir.to_path_buf(),
        message: e.to_string(),
    })?;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_tmp = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.contains(".tmp"))
            .unwrap_or(false);
        if is_tmp {
            let _ = fs::remove_file(&path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Doc {
        value: u32,
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/doc.json");
        write_json(&path, &Doc { value: 7 }).unwrap();
        match read_json::<Doc>(&path) {
            ReadOutcome::Found(d) => assert_eq!(d, Doc { value: 7 }),
            other => panic!("expected Found, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_reports_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.json");
        assert!(matches!(read_json::<Doc>(&path), ReadOutcome::Missing));
    }

    #[test]
    fn corrupt_file_reports_corrupt_and_is_not_overwritten() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        fs::write(&path, b"{not json").unwrap();
        assert!(matches!(read_json::<Doc>(&path), ReadOutcome::Corrupt(_)));
        let after = fs::read_to_string(&path).unwrap();
        assert_eq!(after, "{not json");
    }

    #[test]
    fn read_json_or_default_falls_back_only_on_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        let value = read_json_or_default(&path, Doc { value: 99 }).unwrap();
        assert_eq!(value, Doc { value: 99 });

        fs::write(&path, b"{bad").unwrap();
        assert!(read_json_or_default(&path, Doc { value: 1 }).is_err());
    }

    #[test]
    fn append_jsonl_preserves_prior_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        append_jsonl(&path, &Doc { value: 1 }).unwrap();
        append_jsonl(&path, &Doc { value: 2 }).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            serde_json::from_str::<Doc>(lines[0]).unwrap(),
            Doc { value: 1 }
        );
        assert_eq!(
            serde_json::from_str::<Doc>(lines[1]).unwrap(),
            Doc { value: 2 }
        );
    }

    #[test]
    fn sweep_temp_files_removes_only_tmp_entries() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("doc.json"), b"{}").unwrap();
        fs::write(dir.path().join("doc.json.tmp123"), b"partial").unwrap();
        sweep_temp_files(dir.path()).unwrap();
        assert!(dir.path().join("doc.json").exists());
        assert!(!dir.path().join("doc.json.tmp123").exists());
    }
}
