//! The immutable unit of the memory store: one JSON document per event,
//! created on successful Stop or explicit capture.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::checkpoint::Category;

/// Schema version of [`MemoryEvent`] itself, bumped whenever the on-disk
/// shape changes in a way readers need to branch on.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEvent {
    pub id: String,
    pub ts: DateTime<Utc>,
    #[serde(default = "default_schema_version")]
    pub v: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub source: String,
    pub category: Category,
    pub problem_type: Option<String>,
    pub content: String,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub meta: serde_json::Map<String, serde_json::Value>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl MemoryEvent {
    pub fn new(
        kind: impl Into<String>,
        source: impl Into<String>,
        category: Category,
        content: impl Into<String>,
        entities: Vec<String>,
    ) -> Self {
        let ts = Utc::now();
        MemoryEvent {
            id: new_id(ts),
            ts,
            v: SCHEMA_VERSION,
            kind: kind.into(),
            source: source.into(),
            category,
            problem_type: None,
            content: content.into(),
            entities,
            meta: serde_json::Map::new(),
        }
    }

    /// File name this event lives under within a project's `events/`
    /// directory, per the filesystem layout (`evt_<ts>-<seq>-<rand>.json`).
    pub fn file_name(&self) -> String {
        format!("{}.json", self.id)
    }
}

/// `evt_<ts>-<seq>-<rand>`: timestamp orders events lexically by filename,
/// the random suffix guarantees uniqueness under concurrent writers in the
/// same millisecond without any shared counter.
fn new_id(ts: DateTime<Utc>) -> String {
    let mut rng = rand::rng();
    let seq: u16 = rng.random();
    let rand_suffix: u32 = rng.random();
    format!("evt_{}-{:04x}-{:08x}", ts.timestamp_millis(), seq, rand_suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_events_get_distinct_ids() {
        let a = MemoryEvent::new("lesson", "stop", Category::Bugfix, "fixed it", vec![]);
        let b = MemoryEvent::new("lesson", "stop", Category::Bugfix, "fixed it", vec![]);
        assert_ne!(a.id, b.id);
    }
}
