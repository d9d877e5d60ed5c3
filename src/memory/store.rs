//! Append-only per-project memory event store (C7). Writes are strictly
//! additive — one file per event — so two writers never collide on a
//! path; only the manifest update is serialized.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::event::MemoryEvent;
use super::manifest::{self, events_dir};
use crate::errors::Result;
use crate::io;

const RETENTION_DAYS: i64 = 90;
const EVENT_CAP: usize = 500;
const GRACE_PERIOD_MINUTES: i64 = 60;

/// Appends `event` as its own file and records it in the manifest. Never
/// mutates an existing event file.
pub fn append_event(project_memory_root: &Path, event: &MemoryEvent) -> Result<()> {
    let path = events_dir(project_memory_root).join(event.file_name());
    io::write_json(&path, event)?;
    manifest::record_append(project_memory_root, &event.id)?;
    Ok(())
}

/// Reads a single event by id. Discoverable even if the manifest is lost,
/// since the filename alone identifies it.
pub fn read(project_memory_root: &Path, id: &str) -> Result<Option<MemoryEvent>> {
    let path = events_dir(project_memory_root).join(format!("{id}.json"));
    match io::atomic::read_json::<MemoryEvent>(&path) {
        io::ReadOutcome::Found(event) => Ok(Some(event)),
        io::ReadOutcome::Missing => Ok(None),
        io::ReadOutcome::Corrupt(message) => Err(crate::errors::StateError::Corrupt {
            path,
            message,
        }
        .into()),
    }
}

/// The `n` most recently appended events, newest last ids in the manifest
/// resolved against their files. Falls back to a full directory scan if
/// the manifest itself can't be read (keeps reads working even when the
/// manifest is corrupt, per the error taxonomy in spec §7).
pub fn list_recent(project_memory_root: &Path, n: usize) -> Result<Vec<MemoryEvent>> {
    let manifest = manifest::load(project_memory_root).unwrap_or_default();
    let ids: Vec<String> = if manifest.recent_ids.is_empty() {
        scan_all_ids(project_memory_root)?
    } else {
        manifest.recent_ids
    };

    let mut events: Vec<MemoryEvent> = ids
        .iter()
        .rev()
        .take(n)
        .filter_map(|id| read(project_memory_root, id).ok().flatten())
        .collect();
    events.sort_by_key(|e| e.ts);
    events.reverse();
    Ok(events)
}

fn scan_all_ids(project_memory_root: &Path) -> Result<Vec<String>> {
    let dir = events_dir(project_memory_root);
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut ids = Vec::new();
    for entry in std::fs::read_dir(&dir).map_err(|e| crate::errors::LoopguardError::Io {
        path: dir.clone(),
        message: e.to_string(),
    })? {
        let entry = entry.map_err(|e| crate::errors::LoopguardError::Io {
            path: dir.clone(),
            message: e.to_string(),
        })?;
        if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
            ids.push(stem.to_string());
        }
    }
    ids.sort();
    Ok(ids)
}

/// Enforces the 90-day/500-event retention budget, LRU by timestamp,
/// never touching an event less than an hour old. Returns the ids it
/// removed.
pub fn gc(project_memory_root: &Path) -> Result<Vec<String>> {
    let dir = events_dir(project_memory_root);
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let now = Utc::now();
    let mut all: Vec<MemoryEvent> = Vec::new();
    for id in scan_all_ids(project_memory_root)? {
        if let Some(event) = read(project_memory_root, &id)? {
            all.push(event);
        }
    }
    all.sort_by_key(|e| e.ts);

    let cutoff = now - Duration::days(RETENTION_DAYS);
    let grace = now - Duration::minutes(GRACE_PERIOD_MINUTES);

    let mut removed = Vec::new();

    // Age-based eviction first.
    let mut survivors: Vec<MemoryEvent> = Vec::new();
    for event in all {
        if event.ts < cutoff && event.ts < grace {
            removed.push(event.id.clone());
            remove_event_file(project_memory_root, &event.id)?;
        } else {
            survivors.push(event);
        }
    }

    // Count-based eviction: oldest-first, still respecting the grace
    // window, until at or under the cap.
    if survivors.len() > EVENT_CAP {
        let overflow = survivors.len() - EVENT_CAP;
        let mut evicted = 0;
        let mut remaining = Vec::with_capacity(survivors.len());
        for event in survivors {
            if evicted < overflow && event.ts < grace {
                removed.push(event.id.clone());
                remove_event_file(project_memory_root, &event.id)?;
                evicted += 1;
            } else {
                remaining.push(event);
            }
        }
        survivors = remaining;
    }
    let _ = survivors;

    if !removed.is_empty() {
        manifest::rebuild(project_memory_root)?;
    }
    Ok(removed)
}

/// Lists every project's memory root under `<user-config-root>/memory/`,
/// for cross-project concept recall (spec §4.7). Each entry is the
/// project-id directory itself, ready to pass to [`list_recent`].
pub fn list_all_project_roots(user_memory_root: &Path) -> Vec<std::path::PathBuf> {
    let Ok(entries) = std::fs::read_dir(user_memory_root) else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .map(|e| e.path())
        .collect()
}

fn remove_event_file(project_memory_root: &Path, id: &str) -> Result<()> {
    let path = events_dir(project_memory_root).join(format!("{id}.json"));
    if path.exists() {
        std::fs::remove_file(&path).map_err(|e| crate::errors::LoopguardError::Io {
            path,
            message: e.to_string(),
        })?;
    }
    Ok(())
}

/// One entry in the persistent core-assertions log: a durable fact the
/// agent or validator wants remembered regardless of event-store churn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreAssertion {
    pub topic: String,
    pub assertion: String,
    pub ts: DateTime<Utc>,
}

const CORE_ASSERTION_TOPIC_CAP: usize = 20;

fn core_assertions_path(project_memory_root: &Path) -> std::path::PathBuf {
    project_memory_root.join("core-assertions.jsonl")
}

/// Appends one assertion. Last-write-wins per topic is enforced at
/// [`compact_assertions`] time, not on append, since appends must stay
/// lock-free-append-only per C1's contract.
pub fn append_assertion(project_memory_root: &Path, topic: &str, assertion: &str) -> Result<()> {
    let entry = CoreAssertion {
        topic: topic.to_string(),
        assertion: assertion.to_string(),
        ts: Utc::now(),
    };
    io::append_jsonl(&core_assertions_path(project_memory_root), &entry)
}

/// Reads all lines, keeps only the most recent entry per topic, and
/// LRU-evicts down to the 20-topic cap, rewriting the file atomically.
/// Called at session start.
pub fn compact_assertions(project_memory_root: &Path) -> Result<Vec<CoreAssertion>> {
    let path = core_assertions_path(project_memory_root);
    let contents = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(crate::errors::LoopguardError::Io {
                path,
                message: e.to_string(),
            })
        }
    };

    let mut by_topic: std::collections::HashMap<String, CoreAssertion> =
        std::collections::HashMap::new();
    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(entry) = serde_json::from_str::<CoreAssertion>(line) {
            by_topic
                .entry(entry.topic.clone())
                .and_modify(|existing| {
                    if entry.ts > existing.ts {
                        *existing = entry.clone();
                    }
                })
                .or_insert(entry);
        }
    }

    let mut entries: Vec<CoreAssertion> = by_topic.into_values().collect();
    entries.sort_by_key(|e| e.ts);
    if entries.len() > CORE_ASSERTION_TOPIC_CAP {
        let overflow = entries.len() - CORE_ASSERTION_TOPIC_CAP;
        entries.drain(0..overflow);
    }

    let tmp = path.with_extension("jsonl.rewrite");
    {
        use std::io::Write;
        let mut file = std::fs::File::create(&tmp).map_err(|e| crate::errors::LoopguardError::Io {
            path: tmp.clone(),
            message: e.to_string(),
        })?;
        for entry in &entries {
            let mut line = serde_json::to_string(entry).unwrap_or_default();
            line.push('\n');
            file.write_all(line.as_bytes())
                .map_err(|e| crate::errors::LoopguardError::Io {
                    path: tmp.clone(),
                    message: e.to_string(),
                })?;
        }
        file.sync_all().ok();
    }
    std::fs::rename(&tmp, &path).map_err(|e| crate::errors::LoopguardError::Io {
        path: path.clone(),
        message: e.to_string(),
    })?;

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::Category;

    #[test]
    fn append_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let event = MemoryEvent::new("lesson", "stop", Category::Bugfix, "fixed it", vec![]);
        append_event(dir.path(), &event).unwrap();
        let read_back = read(dir.path(), &event.id).unwrap().unwrap();
        assert_eq!(read_back.content, event.content);
    }

    #[test]
    fn list_recent_orders_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let a = MemoryEvent::new("lesson", "stop", Category::Bugfix, "first", vec![]);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = MemoryEvent::new("lesson", "stop", Category::Bugfix, "second", vec![]);
        append_event(dir.path(), &a).unwrap();
        append_event(dir.path(), &b).unwrap();
        let recent = list_recent(dir.path(), 10).unwrap();
        assert_eq!(recent[0].content, "second");
        assert_eq!(recent[1].content, "first");
    }

    #[test]
    fn compact_assertions_keeps_latest_per_topic() {
        let dir = tempfile::tempdir().unwrap();
        append_assertion(dir.path(), "auth", "uses JWT").unwrap();
        append_assertion(dir.path(), "auth", "uses JWT with refresh tokens").unwrap();
        let compacted = compact_assertions(dir.path()).unwrap();
        assert_eq!(compacted.len(), 1);
        assert_eq!(compacted[0].assertion, "uses JWT with refresh tokens");
    }

    #[test]
    fn list_all_project_roots_finds_only_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("proj-a")).unwrap();
        std::fs::create_dir_all(dir.path().join("proj-b")).unwrap();
        std::fs::write(dir.path().join("stray-file"), b"x").unwrap();
        let mut roots = list_all_project_roots(dir.path());
        roots.sort();
        assert_eq!(roots.len(), 2);
    }
}
