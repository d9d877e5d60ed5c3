//! Readers for the three external verification artifact kinds (C13).
//! Each carries a `passed` bool and a `tested_at_version` string;
//! structural defects fail closed rather than being treated as "not
//! tested".

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{ArtifactError, Result};
use crate::io;

/// URLs that, on their own, don't count as having exercised the
/// application — a configurable deny-list preventing trivial
/// "I pinged /health" claims (spec S4).
const HEALTH_ONLY_MARKERS: &[&str] = &["/health", "/healthz", "/ping", "/status", "/readyz", "/livez"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSmokeSummary {
    pub passed: bool,
    pub tested_at: DateTime<Utc>,
    pub tested_at_version: String,
    #[serde(default)]
    pub urls_tested: Vec<String>,
    #[serde(default)]
    pub console_clean: bool,
    #[serde(default)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MobileSmokeSummary {
    pub passed: bool,
    pub tested_at: DateTime<Utc>,
    pub tested_at_version: String,
    pub platform: String,
    pub device: String,
    #[serde(default)]
    pub flows_executed: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    pub expected: String,
    pub actual: String,
    pub passed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationTestsSummary {
    pub passed: bool,
    pub total_tests: u32,
    pub passed_tests: u32,
    pub failed_tests: u32,
    pub tested_at_version: String,
    #[serde(default)]
    pub tests: Vec<TestCase>,
}

fn web_smoke_path(project_root: &Path) -> PathBuf {
    project_root.join(".claude").join("web-smoke").join("summary.json")
}

fn mobile_smoke_path(project_root: &Path) -> PathBuf {
    project_root
        .join(".claude")
        .join("maestro-smoke")
        .join("summary.json")
}

fn validation_tests_path(project_root: &Path) -> PathBuf {
    project_root
        .join(".claude")
        .join("validation-tests")
        .join("summary.json")
}

fn read_artifact<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    match io::atomic::read_json(path) {
        io::ReadOutcome::Found(value) => Ok(value),
        io::ReadOutcome::Missing => Err(ArtifactError::Missing {
            path: path.to_path_buf(),
        }
        .into()),
        io::ReadOutcome::Corrupt(message) => Err(ArtifactError::Malformed {
            path: path.to_path_buf(),
            message,
        }
        .into()),
    }
}

fn check_version(path: &Path, stamped: &str, current: &str) -> Result<()> {
    if stamped != current {
        return Err(ArtifactError::Stale {
            path: path.to_path_buf(),
            stamped: stamped.to_string(),
            current: current.to_string(),
        }
        .into());
    }
    Ok(())
}

fn is_health_only(urls: &[String]) -> bool {
    !urls.is_empty()
        && urls
            .iter()
            .all(|u| HEALTH_ONLY_MARKERS.iter().any(|marker| u.contains(marker)))
}

/// Reads and validates the web-smoke artifact against `current_version`.
/// Fails with [`ArtifactError::HealthOnly`] when every tested URL is a
/// health-check endpoint (spec S4).
pub fn validate_web_smoke(project_root: &Path, current_version: &str) -> Result<WebSmokeSummary> {
    let path = web_smoke_path(project_root);
    let summary: WebSmokeSummary = read_artifact(&path)?;
    check_version(&path, &summary.tested_at_version, current_version)?;
    if !summary.passed {
        return Err(ArtifactError::Malformed {
            path,
            message: "passed=false".to_string(),
        }
        .into());
    }
    if is_health_only(&summary.urls_tested) {
        return Err(ArtifactError::HealthOnly {
            path,
            urls: summary.urls_tested,
        }
        .into());
    }
    Ok(summary)
}

pub fn validate_mobile_smoke(
    project_root: &Path,
    current_version: &str,
) -> Result<MobileSmokeSummary> {
    let path = mobile_smoke_path(project_root);
    let summary: MobileSmokeSummary = read_artifact(&path)?;
    check_version(&path, &summary.tested_at_version, current_version)?;
    if !summary.passed {
        return Err(ArtifactError::Malformed {
            path,
            message: "passed=false".to_string(),
        }
        .into());
    }
    Ok(summary)
}

pub fn validate_validation_tests(
    project_root: &Path,
    current_version: &str,
) -> Result<ValidationTestsSummary> {
    let path = validation_tests_path(project_root);
    let summary: ValidationTestsSummary = read_artifact(&path)?;
    check_version(&path, &summary.tested_at_version, current_version)?;
    if summary.failed_tests != 0 {
        return Err(ArtifactError::Malformed {
            path,
            message: format!("{} tests failing", summary.failed_tests),
        }
        .into());
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn web_summary(version: &str, urls: Vec<&str>) -> WebSmokeSummary {
        WebSmokeSummary {
            passed: true,
            tested_at: Utc::now(),
            tested_at_version: version.to_string(),
            urls_tested: urls.into_iter().map(str::to_string).collect(),
            console_clean: true,
            details: serde_json::Map::new(),
        }
    }

    #[test]
    fn health_only_urls_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        io::write_json(
            &web_smoke_path(dir.path()),
            &web_summary("abc1234", vec!["https://app.example.com/health"]),
        )
        .unwrap();
        let err = validate_web_smoke(dir.path(), "abc1234").unwrap_err();
        assert!(matches!(err, crate::errors::LoopguardError::Artifact(ArtifactError::HealthOnly { .. })));
    }

    #[test]
    fn real_page_passes_at_matching_version() {
        let dir = tempfile::tempdir().unwrap();
        io::write_json(
            &web_smoke_path(dir.path()),
            &web_summary("abc1234", vec!["https://app.example.com/dashboard"]),
        )
        .unwrap();
        assert!(validate_web_smoke(dir.path(), "abc1234").is_ok());
    }

    #[test]
    fn stale_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        io::write_json(
            &web_smoke_path(dir.path()),
            &web_summary("abc1234", vec!["https://app.example.com/dashboard"]),
        )
        .unwrap();
        assert!(validate_web_smoke(dir.path(), "def5678").is_err());
    }

    #[test]
    fn missing_artifact_is_reported_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = validate_web_smoke(dir.path(), "abc1234").unwrap_err();
        assert!(matches!(err, crate::errors::LoopguardError::Artifact(ArtifactError::Missing { .. })));
    }
}
