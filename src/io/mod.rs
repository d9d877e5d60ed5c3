//! Crash-safe filesystem primitives. Every other store in this crate
//! persists exclusively through this module; no component opens a state
//! file directly.

pub mod atomic;

pub use atomic::{append_jsonl, read_json, read_json_or_default, write_json, ReadOutcome};
