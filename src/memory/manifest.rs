//! Per-project index over the memory event store: total count, recent
//! ids, and per-event utility counters. Can always be rebuilt by scanning
//! `events/`, so its loss never loses data (spec §7).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::io;

const RECENT_ID_CAP: usize = 50;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventCounters {
    #[serde(default)]
    pub injected: u64,
    #[serde(default)]
    pub cited: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub recent_ids: Vec<String>,
    #[serde(default)]
    pub counters: HashMap<String, EventCounters>,
    /// Ids promoted into `promoted-events.json`'s sidecar tracking.
    #[serde(default)]
    pub promoted_ids: Vec<String>,
}

pub fn manifest_path(project_memory_root: &Path) -> PathBuf {
    project_memory_root.join("manifest.json")
}

pub fn events_dir(project_memory_root: &Path) -> PathBuf {
    project_memory_root.join("events")
}

pub fn load(project_memory_root: &Path) -> Result<Manifest> {
    io::read_json_or_default(&manifest_path(project_memory_root), Manifest::default())
}

pub fn save(project_memory_root: &Path, manifest: &Manifest) -> Result<()> {
    io::write_json(&manifest_path(project_memory_root), manifest)
}

/// Records a newly appended event in the manifest: bumps the total,
/// pushes the id onto the recent list (capped), and seeds its counters.
pub fn record_append(project_memory_root: &Path, event_id: &str) -> Result<()> {
    let lock_path = project_memory_root.join(".manifest.lock");
    io::atomic::with_exclusive_lock(&lock_path, || {
        let mut manifest = load(project_memory_root)?;
        manifest.total_count += 1;
        manifest.recent_ids.push(event_id.to_string());
        if manifest.recent_ids.len() > RECENT_ID_CAP {
            let overflow = manifest.recent_ids.len() - RECENT_ID_CAP;
            manifest.recent_ids.drain(0..overflow);
        }
        manifest
            .counters
            .entry(event_id.to_string())
            .or_insert_with(EventCounters::default);
        save(project_memory_root, &manifest)
    })
}

/// Increments `injected` for each event id that was selected for context
/// injection this invocation.
pub fn record_injected(project_memory_root: &Path, event_ids: &[String]) -> Result<()> {
    if event_ids.is_empty() {
        return Ok(());
    }
    let lock_path = project_memory_root.join(".manifest.lock");
    io::atomic::with_exclusive_lock(&lock_path, || {
        let mut manifest = load(project_memory_root)?;
        for id in event_ids {
            manifest.counters.entry(id.clone()).or_default().injected += 1;
        }
        save(project_memory_root, &manifest)
    })
}

/// Increments `cited` for each event id the agent credited in its
/// checkpoint's `memory_that_helped` list, on a successful Stop.
pub fn record_cited(project_memory_root: &Path, event_ids: &[String]) -> Result<()> {
    if event_ids.is_empty() {
        return Ok(());
    }
    let lock_path = project_memory_root.join(".manifest.lock");
    io::atomic::with_exclusive_lock(&lock_path, || {
        let mut manifest = load(project_memory_root)?;
        for id in event_ids {
            manifest.counters.entry(id.clone()).or_default().cited += 1;
        }
        save(project_memory_root, &manifest)
    })
}

/// Rebuilds the manifest from scratch by scanning `events/`, discarding
/// stale counters for events that no longer exist. Utility counters for
/// surviving events are preserved from the prior manifest when present.
pub fn rebuild(project_memory_root: &Path) -> Result<Manifest> {
    let prior = load(project_memory_root).unwrap_or_default();
    let dir = events_dir(project_memory_root);

    let mut ids_with_ts: Vec<(String, DateTime<Utc>)> = Vec::new();
    if dir.exists() {
        for entry in std::fs::read_dir(&dir).map_err(|e| crate::errors::LoopguardError::Io {
            path: dir.clone(),
            message: e.to_string(),
        })? {
            let entry = entry.map_err(|e| crate::errors::LoopguardError::Io {
                path: dir.clone(),
                message: e.to_string(),
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let io::ReadOutcome::Found(event) =
                io::atomic::read_json::<super::event::MemoryEvent>(&path)
            {
                ids_with_ts.push((event.id.clone(), event.ts));
            }
        }
    }
    ids_with_ts.sort_by_key(|(_, ts)| *ts);

    let total_count = ids_with_ts.len() as u64;
    let recent_ids: Vec<String> = ids_with_ts
        .iter()
        .rev()
        .take(RECENT_ID_CAP)
        .map(|(id, _)| id.clone())
        .rev()
        .collect();

    let mut counters = HashMap::new();
    for (id, _) in &ids_with_ts {
        let preserved = prior.counters.get(id).cloned().unwrap_or_default();
        counters.insert(id.clone(), preserved);
    }

    let rebuilt = Manifest {
        total_count,
        recent_ids,
        counters,
        promoted_ids: prior.promoted_ids,
    };
    save(project_memory_root, &rebuilt)?;
    Ok(rebuilt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_append_updates_total_and_recent() {
        let dir = tempfile::tempdir().unwrap();
        record_append(dir.path(), "evt_1").unwrap();
        record_append(dir.path(), "evt_2").unwrap();
        let manifest = load(dir.path()).unwrap();
        assert_eq!(manifest.total_count, 2);
        assert_eq!(manifest.recent_ids, vec!["evt_1", "evt_2"]);
    }

    #[test]
    fn rebuild_from_empty_events_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = rebuild(dir.path()).unwrap();
        assert_eq!(manifest.total_count, 0);
    }
}
