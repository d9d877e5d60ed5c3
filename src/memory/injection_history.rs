//! Durable record of recently injected events' prefix hashes, so the
//! retrieval engine's dedup guard (spec §4.7) survives across the
//! short-lived processes that make each injection decision.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::retrieval::InjectionHistoryEntry;
use crate::errors::Result;
use crate::io;

const CAP: usize = 32;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredEntry {
    prefix_hash: String,
    injected_at: chrono::DateTime<Utc>,
}

fn path(project_memory_root: &Path) -> PathBuf {
    project_memory_root.join("injection-history.json")
}

pub fn load(project_memory_root: &Path) -> Vec<InjectionHistoryEntry> {
    let entries: Vec<StoredEntry> =
        io::read_json_or_default(&path(project_memory_root), Vec::new()).unwrap_or_default();
    entries
        .into_iter()
        .map(|e| InjectionHistoryEntry {
            prefix_hash: e.prefix_hash,
            injected_at: e.injected_at,
        })
        .collect()
}

/// Appends `new_hashes` (computed by the caller from the events actually
/// selected this invocation) and truncates to the cap.
pub fn record(project_memory_root: &Path, new_hashes: &[String]) -> Result<()> {
    if new_hashes.is_empty() {
        return Ok(());
    }
    let mut entries: Vec<StoredEntry> =
        io::read_json_or_default(&path(project_memory_root), Vec::new())?;
    let now = Utc::now();
    for hash in new_hashes {
        entries.push(StoredEntry {
            prefix_hash: hash.clone(),
            injected_at: now,
        });
    }
    if entries.len() > CAP {
        let overflow = entries.len() - CAP;
        entries.drain(0..overflow);
    }
    io::write_json(&path(project_memory_root), &entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        record(dir.path(), &["abc".to_string()]).unwrap();
        let loaded = load(dir.path());
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].prefix_hash, "abc");
    }

    #[test]
    fn caps_at_32_entries() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..40 {
            record(dir.path(), &[format!("hash{i}")]).unwrap();
        }
        assert_eq!(load(dir.path()).len(), CAP);
    }
}
