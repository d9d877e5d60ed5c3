//! loopguard — a lifecycle-hook toolkit that turns an interactive coding
//! agent into an autonomous execute-verify loop.
//!
//! Short-lived processes read one JSON document from standard input,
//! consult on-disk state scoped by project, and return allow/block/advise
//! decisions plus optional structured context. This crate is the core:
//! four coupled engines —
//!
//! - **Autonomous state** ([`autonomous`]): a TTL-governed, session-scoped
//!   state machine that gates tool invocations and anchors the completion
//!   contract.
//! - **Completion checkpoint** ([`checkpoint`], [`validator`]): the
//!   agent's self-report and reflection, validated for structural honesty
//!   and on-disk consistency before Stop is allowed.
//! - **Cascade invalidation** ([`cascade`]): a version-aware dependency
//!   graph that resets downstream "proven true" flags when upstream code
//!   changes.
//! - **Compound memory** ([`memory`]): a content-addressed event log with
//!   scored retrieval and budget-aware injection.
//!
//! Everything persists through [`io`]'s crash-safe atomic writers, is
//! segmented per-project via [`project`], and is stamped with the code
//! fingerprint from [`version`]. [`gates`] and [`approver`] implement the
//! pre-action and auto-approval side; [`artifacts`] reads external
//! verification summaries; [`dispatch`] is the shared plumbing every
//! `src/bin/*` hook binary is built on.

pub mod approver;
pub mod artifacts;
pub mod autonomous;
pub mod cascade;
pub mod checkpoint;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod gates;
pub mod injection;
pub mod io;
pub mod memory;
pub mod project;
pub mod redact;
pub mod telemetry;
pub mod validator;
pub mod version;
