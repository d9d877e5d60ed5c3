use std::path::PathBuf;
use thiserror::Error;

/// The central error type for the loopguard toolkit.
///
/// Mirrors the taxonomy in the design notes: gates and the completion
/// validator surface these via a blocking exit plus stderr explanation;
/// every other handler logs them to the debug file and falls back to
/// passthrough rather than propagating a failure to the host.
#[derive(Error, Debug)]
pub enum LoopguardError {
    #[error("I/O error at {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Version observer error: {0}")]
    Version(#[from] GitError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("Input error: {0}")]
    Input(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Corrupt or missing on-disk state. Validators fail closed on this;
/// non-gating handlers log and passthrough.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("state file missing: {path}")]
    Missing { path: PathBuf },

    #[error("state file at {path} is not valid JSON: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("autonomous state owned by a different session ({owner}), cwd not under origin")]
    OwnershipMismatch { owner: String },

    #[error("lock on {path} could not be acquired: {message}")]
    LockFailed { path: PathBuf, message: String },
}

/// Checkpoint self-report fails structural or consistency validation.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("required field '{field}' missing or wrong type")]
    MissingField { field: &'static str },

    #[error("field '{field}' failed validation: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("proven flag '{flag}' is stale: stamped at {stamped}, current is {current}")]
    StaleProof {
        flag: String,
        stamped: String,
        current: String,
    },
}

#[derive(Error, Debug)]
pub enum GitError {
    #[error("not inside a git repository")]
    NoRepo,

    #[error("failed to read repository state: {0}")]
    Repo(String),
}

/// A required verification artifact (web/mobile/validation-test summary) is
/// missing or structurally defective.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("artifact missing: {path}")]
    Missing { path: PathBuf },

    #[error("artifact at {path} malformed: {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("artifact at {path} stamped at {stamped}, current is {current}")]
    Stale {
        path: PathBuf,
        stamped: String,
        current: String,
    },

    #[error("artifact at {path} only covers health endpoints: {urls:?}")]
    HealthOnly { path: PathBuf, urls: Vec<String> },
}

pub type Result<T> = std::result::Result<T, LoopguardError>;
