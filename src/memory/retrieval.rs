//! Entity-gated, recency-and-overlap scored selection of memory events for
//! context injection, under a character budget.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};

use super::event::MemoryEvent;
use crate::autonomous::Mode;
use crate::checkpoint::Category;
use crate::project::ProjectId;

/// Events scoring below this after the entity gate are dropped before
/// selection; the gate itself (zero overlap) is a harder cutoff applied
/// first, per spec §8's "entity gate" testable property.
const SCORE_FLOOR: f64 = 0.15;

/// Cross-project concept matches need a stronger signal than local recall
/// before they're worth surfacing out of their originating project.
const CROSS_PROJECT_OVERLAP_THRESHOLD: f64 = 0.5;

const PREFIX_GUARD_LEN: usize = 40;
const PREFIX_GUARD_RECENT_MINUTES: i64 = 60;
const PREFIX_GUARD_LOOKBACK: usize = 8;

const NATIVE_MEMORY_DEDUP_THRESHOLD: f64 = 0.6;

/// What the caller is trying to find memory for: recent tool inputs, the
/// user's prompt, and the current project's entity seeds, all flattened
/// into one entity list plus the subset that are "problem-type" concept
/// labels (used only for the debugging boost).
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    pub entities: Vec<String>,
    pub problem_type_entities: HashSet<String>,
    pub mode: Option<Mode>,
}

/// A scored, budget-clipped candidate ready for injection.
#[derive(Debug, Clone)]
pub struct Selection {
    pub event_id: String,
    pub excerpt: String,
    pub score: f64,
}

fn is_path_like(entity: &str) -> bool {
    entity.contains('/') || entity.contains('.')
}

fn stem(entity: &str) -> String {
    Path::new(entity)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| entity.to_string())
}

/// Tiered match between one event entity and one query entity. Higher tier
/// wins; callers take the max over all pairs. Exact equality (file
/// basename or bare concept keyword alike) is the top tier (1.0); lesser
/// tiers only apply once exact equality is ruled out.
fn pair_tier(event_entity: &str, query_entity: &str) -> f64 {
    let (e, q) = (event_entity, query_entity);
    if e == q {
        return 1.0;
    }
    if is_path_like(e) && is_path_like(q) {
        let (es, qs) = (stem(e), stem(q));
        if !es.is_empty() && es == qs {
            return 0.6;
        }
    }
    if e.eq_ignore_ascii_case(q) {
        return 0.5;
    }
    if e.len() > 2 && q.len() > 2 && (e.contains(q) || q.contains(e)) {
        return 0.35;
    }
    if is_path_like(e) && is_path_like(q) {
        let e_dir = e.rsplit_once('/').map(|(d, _)| d);
        let q_dir = q.rsplit_once('/').map(|(d, _)| d);
        if let (Some(ed), Some(_)) = (e_dir, q_dir) {
            if q.starts_with(ed) {
                return 0.3;
            }
        }
        if let (Some(_), Some(qd)) = (e_dir, q_dir) {
            if e.starts_with(qd) {
                return 0.3;
            }
        }
    }
    0.0
}

/// Max tiered match between an event's entities and the query's entities.
/// Zero means no overlap at all — the entity gate.
fn entity_overlap(event_entities: &[String], query_entities: &[String]) -> f64 {
    event_entities
        .iter()
        .flat_map(|e| query_entities.iter().map(move |q| pair_tier(e, q)))
        .fold(0.0_f64, f64::max)
}

/// Linear ramp from 1.0 at `age=0` to 0.5 at 48 hours, then exponential
/// decay with a 7-day half-life anchored at 0.5. Continuous at the 48h
/// boundary by construction (both branches evaluate to exactly 0.5 there).
fn recency_score(age: Duration) -> f64 {
    let hours = age.num_seconds() as f64 / 3600.0;
    if hours <= 48.0 {
        1.0 - 0.5 * (hours / 48.0)
    } else {
        let days_past = (hours - 48.0) / 24.0;
        0.5 * 0.5_f64.powf(days_past / 7.0)
    }
}

fn debugging_boost(event: &MemoryEvent, ctx: &QueryContext) -> f64 {
    let Some(mode) = ctx.mode.as_ref() else {
        return 0.0;
    };
    if !mode.is_debugging() {
        return 0.0;
    }
    let mut boost = 0.0;
    if matches!(event.category, Category::Bugfix | Category::Config) {
        boost += 0.10;
    }
    if event
        .entities
        .iter()
        .any(|e| ctx.problem_type_entities.contains(e))
    {
        boost += 0.05;
    }
    boost
}

/// Final relevance score for one event against a query context, or `None`
/// if the entity gate rejects it outright.
pub fn score(event: &MemoryEvent, ctx: &QueryContext, now: DateTime<Utc>) -> Option<f64> {
    if event.kind == "bootstrap" {
        return None;
    }
    let overlap = entity_overlap(&event.entities, &ctx.entities);
    if overlap <= 0.0 {
        return None;
    }
    let age = now - event.ts;
    let recency = recency_score(age.max(Duration::zero()));
    let boost = debugging_boost(event, ctx);
    Some(0.5 * overlap + 0.5 * recency + boost)
}

/// Hash of an event's first 40 characters, used both by the in-process
/// dedup guard below and by callers that persist an
/// [`InjectionHistoryEntry`] across process invocations.
pub fn prefix_hash(content: &str) -> String {
    let prefix: String = content.chars().take(PREFIX_GUARD_LEN).collect();
    let mut hasher = Sha256::new();
    hasher.update(prefix.as_bytes());
    hex::encode(hasher.finalize())
}

/// One previously injected event's prefix hash and when it was injected,
/// used to dedup against reinjecting the same lesson too soon.
#[derive(Debug, Clone)]
pub struct InjectionHistoryEntry {
    pub prefix_hash: String,
    pub injected_at: DateTime<Utc>,
}

fn guarded_by_prefix_history(
    event: &MemoryEvent,
    history: &[InjectionHistoryEntry],
    now: DateTime<Utc>,
) -> bool {
    let hash = prefix_hash(&event.content);
    let recent_cutoff = now - Duration::minutes(PREFIX_GUARD_RECENT_MINUTES);
    let lookback = history
        .iter()
        .rev()
        .take(PREFIX_GUARD_LOOKBACK)
        .collect::<Vec<_>>();
    history.iter().any(|h| h.prefix_hash == hash && h.injected_at >= recent_cutoff)
        || lookback.iter().any(|h| h.prefix_hash == hash)
}

/// Pulls a query's entity seeds out of free text — recent tool input JSON
/// rendered to a string, the user's prompt, or similar — by keeping
/// path-like tokens whole and splitting everything else into lowercase
/// words longer than 3 characters. Used by the hook binaries to build a
/// [`QueryContext`] without duplicating this tokenization in each one.
pub fn extract_entities(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for token in text.split_whitespace() {
        let trimmed = token.trim_matches(|c: char| !c.is_alphanumeric() && c != '/' && c != '.' && c != '_' && c != '-');
        if trimmed.is_empty() {
            continue;
        }
        if is_path_like(trimmed) {
            out.push(trimmed.to_string());
        } else {
            for word in significant_words(trimmed) {
                out.push(word);
            }
        }
    }
    out.sort();
    out.dedup();
    out
}

fn significant_words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 3)
        .map(|w| w.to_ascii_lowercase())
        .collect()
}

fn overlaps_native_memory(event: &MemoryEvent, native_memory_content: &str) -> bool {
    let native_words = significant_words(native_memory_content);
    if native_words.is_empty() {
        return false;
    }
    let event_words = significant_words(&event.content);
    if event_words.is_empty() {
        return false;
    }
    let shared = event_words.intersection(&native_words).count();
    (shared as f64 / event_words.len() as f64) > NATIVE_MEMORY_DEDUP_THRESHOLD
}

fn excerpt_budget_for_rank(rank: usize) -> usize {
    match rank {
        0 => 600,
        1 => 350,
        _ => 200,
    }
}

fn excerpt(content: &str, max_chars: usize) -> String {
    content.chars().take(max_chars).collect()
}

/// Selects events from `candidates` for injection under character budget
/// `budget_chars`, applying the entity gate, recency/overlap scoring, the
/// prefix-hash dedup guard, and native-memory dedup, in that order, then
/// packs excerpts top-down (600/350/200 chars) until the budget runs out.
pub fn select_for_injection(
    candidates: &[MemoryEvent],
    ctx: &QueryContext,
    budget_chars: usize,
    injection_history: &[InjectionHistoryEntry],
    native_memory_content: Option<&str>,
    now: DateTime<Utc>,
) -> Vec<Selection> {
    let mut scored: Vec<(f64, &MemoryEvent)> = candidates
        .iter()
        .filter_map(|event| {
            let s = score(event, ctx, now)?;
            if s < SCORE_FLOOR {
                return None;
            }
            if guarded_by_prefix_history(event, injection_history, now) {
                return None;
            }
            if let Some(native) = native_memory_content {
                if overlaps_native_memory(event, native) {
                    return None;
                }
            }
            Some((s, event))
        })
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut selections = Vec::new();
    let mut spent = 0usize;
    for (rank, (s, event)) in scored.into_iter().enumerate() {
        let max_chars = excerpt_budget_for_rank(rank);
        if spent >= budget_chars {
            break;
        }
        let remaining = budget_chars - spent;
        let take = max_chars.min(remaining);
        let text = excerpt(&event.content, take);
        spent += text.chars().count();
        selections.push(Selection {
            event_id: event.id.clone(),
            excerpt: text,
            score: s,
        });
    }
    selections
}

/// One project's contribution to a cross-project concept query: its id
/// and the events to consider (file-path entities are stripped by the
/// caller before invoking this, since cross-project recall matches
/// concepts, not paths).
pub struct CrossProjectCandidates<'a> {
    pub project_id: ProjectId,
    pub events: &'a [MemoryEvent],
}

/// Fills any budget left over after local selection by scanning other
/// projects' concept-entity matches at a higher overlap threshold. Per
/// the resolved priority (project-local recall always exhausts its
/// budget first), this only ever runs with `remaining_budget_chars`
/// computed from what [`select_for_injection`] didn't spend.
pub fn select_cross_project(
    pools: &[CrossProjectCandidates<'_>],
    ctx: &QueryContext,
    remaining_budget_chars: usize,
    now: DateTime<Utc>,
) -> Vec<Selection> {
    if remaining_budget_chars == 0 {
        return Vec::new();
    }
    let concept_entities: Vec<String> = ctx
        .entities
        .iter()
        .filter(|e| !is_path_like(e))
        .cloned()
        .collect();
    let concept_ctx = QueryContext {
        entities: concept_entities,
        problem_type_entities: ctx.problem_type_entities.clone(),
        mode: ctx.mode.clone(),
    };

    let mut scored: Vec<(f64, &MemoryEvent)> = pools
        .iter()
        .flat_map(|pool| pool.events.iter())
        .filter_map(|event| {
            let overlap = entity_overlap(&event.entities, &concept_ctx.entities);
            if overlap < CROSS_PROJECT_OVERLAP_THRESHOLD {
                return None;
            }
            score(event, &concept_ctx, now).map(|s| (s, event))
        })
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut selections = Vec::new();
    let mut spent = 0usize;
    for (rank, (s, event)) in scored.into_iter().enumerate() {
        if spent >= remaining_budget_chars {
            break;
        }
        let max_chars = excerpt_budget_for_rank(rank).min(remaining_budget_chars - spent);
        let text = excerpt(&event.content, max_chars);
        spent += text.chars().count();
        selections.push(Selection {
            event_id: event.id.clone(),
            excerpt: text,
            score: s,
        });
    }
    selections
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str, entities: &[&str], content: &str, age: Duration) -> MemoryEvent {
        MemoryEvent {
            id: id.to_string(),
            ts: Utc::now() - age,
            v: 1,
            kind: "lesson".to_string(),
            source: "stop".to_string(),
            category: Category::Pattern,
            problem_type: None,
            content: content.to_string(),
            entities: entities.iter().map(|s| s.to_string()).collect(),
            meta: serde_json::Map::new(),
        }
    }

    #[test]
    fn zero_overlap_is_gated_out() {
        let e = event("e1", &["billing"], "irrelevant", Duration::zero());
        let ctx = QueryContext {
            entities: vec!["auth".to_string(), "logout".to_string()],
            ..Default::default()
        };
        assert!(score(&e, &ctx, Utc::now()).is_none());
    }

    #[test]
    fn recency_is_continuous_at_48_hours() {
        let just_under = recency_score(Duration::hours(48) - Duration::seconds(1));
        let at = recency_score(Duration::hours(48));
        let just_over = recency_score(Duration::hours(48) + Duration::seconds(1));
        assert!((at - 0.5).abs() < 1e-9);
        assert!((just_under - 0.5).abs() < 0.01);
        assert!((just_over - 0.5).abs() < 0.01);
    }

    #[test]
    fn s5_scenario_ranks_exact_file_match_first() {
        let e1 = event("E1", &["auth", "token"], "auth lesson", Duration::zero());
        let e2 = event("E2", &["billing"], "billing lesson", Duration::zero());
        let e3 = event(
            "E3",
            &["auth", "logout", "navbar.tsx"],
            "logout lesson",
            Duration::zero(),
        );
        let ctx = QueryContext {
            entities: vec!["auth".to_string(), "logout".to_string()],
            ..Default::default()
        };
        let now = Utc::now();
        let s1 = score(&e1, &ctx, now);
        let s2 = score(&e2, &ctx, now);
        let s3 = score(&e3, &ctx, now);
        assert!(s1.is_some());
        assert!(s2.is_none());
        assert!(s3.unwrap() > s1.unwrap());
    }

    #[test]
    fn budget_packs_top_event_at_600_next_at_350() {
        let long_content = "x".repeat(1000);
        let e1 = event("E1", &["auth"], &long_content, Duration::zero());
        let e3 = event("E3", &["auth", "logout"], &long_content, Duration::zero());
        let ctx = QueryContext {
            entities: vec!["auth".to_string(), "logout".to_string()],
            ..Default::default()
        };
        let selections = select_for_injection(&[e1, e3], &ctx, 1200, &[], None, Utc::now());
        assert_eq!(selections[0].excerpt.len(), 600);
        assert_eq!(selections[1].excerpt.len(), 350);
    }

    #[test]
    fn extract_entities_keeps_paths_whole_and_splits_prose() {
        let entities = extract_entities("please fix src/auth/login.rs for the logout flow");
        assert!(entities.contains(&"src/auth/login.rs".to_string()));
        assert!(entities.contains(&"logout".to_string()));
        assert!(!entities.contains(&"the".to_string()));
    }

    #[test]
    fn prefix_guard_skips_recently_injected_event() {
        let e = event("E1", &["auth"], "a repeated lesson body text", Duration::zero());
        let ctx = QueryContext {
            entities: vec!["auth".to_string()],
            ..Default::default()
        };
        let now = Utc::now();
        let history = vec![InjectionHistoryEntry {
            prefix_hash: prefix_hash(&e.content),
            injected_at: now - Duration::minutes(5),
        }];
        let selections = select_for_injection(&[e], &ctx, 1200, &history, None, now);
        assert!(selections.is_empty());
    }
}
