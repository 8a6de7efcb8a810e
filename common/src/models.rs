use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::ValidationError;

// ============================================================================
// Configuration Models
// ============================================================================

/// Open-ended mapping from key to a loosely-typed value
pub type ConfigMap = serde_json::Map<String, serde_json::Value>;

/// MigrationConfig is the caller-supplied configuration for one run.
///
/// Both sides are plain maps at this layer; each executor decodes the keys it
/// understands. Deserialization rejects a `null` or non-object side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationConfig {
    pub source: ConfigMap,
    pub destination: ConfigMap,
}

impl MigrationConfig {
    pub fn new(source: ConfigMap, destination: ConfigMap) -> Self {
        Self {
            source,
            destination,
        }
    }

    /// Decode a typed view of the source map
    pub fn decode_source<T: DeserializeOwned>(&self) -> Result<T, ValidationError> {
        decode_section("source", &self.source)
    }

    /// Decode a typed view of the destination map
    pub fn decode_destination<T: DeserializeOwned>(&self) -> Result<T, ValidationError> {
        decode_section("destination", &self.destination)
    }
}

fn decode_section<T: DeserializeOwned>(
    section: &str,
    map: &ConfigMap,
) -> Result<T, ValidationError> {
    serde_json::from_value(serde_json::Value::Object(map.clone()))
        .map_err(|e| ValidationError::invalid(section, e.to_string()))
}

/// ValidationResult is the aggregate outcome of pre-flight configuration checks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// A passing result with no warnings
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Build a result from collected problems; valid iff `errors` is empty
    pub fn from_parts(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

// ============================================================================
// Job Models
// ============================================================================

/// JobState tracks a migration job through its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Created,
    Validating,
    Invalid,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Invalid | JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Created => "created",
            JobState::Validating => "validating",
            JobState::Invalid => "invalid",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    /// Whether the lifecycle allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Created, JobState::Validating)
                | (JobState::Validating, JobState::Invalid)
                | (JobState::Validating, JobState::Running)
                | (JobState::Running, JobState::Completed)
                | (JobState::Running, JobState::Failed)
                | (JobState::Running, JobState::Cancelled)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(JobState::Created),
            "validating" => Ok(JobState::Validating),
            "invalid" => Ok(JobState::Invalid),
            "running" => Ok(JobState::Running),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            "cancelled" => Ok(JobState::Cancelled),
            _ => Err(format!("Invalid job state: {}", s)),
        }
    }
}

/// Severity of a log-message event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

/// EventKind is the payload of one job event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    PhaseChanged { index: usize, name: String },
    Progress { percent: u8, message: String },
    Log { severity: Severity, message: String },
    StateChanged { state: JobState },
}

/// JobEvent is one entry of a job's append-only event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    /// Position in the job's log, starting at 1
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl EventKind {
    /// Stable snake_case name, matching the serialized `type` tag
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::PhaseChanged { .. } => "phase_changed",
            EventKind::Progress { .. } => "progress",
            EventKind::Log { .. } => "log",
            EventKind::StateChanged { .. } => "state_changed",
        }
    }
}

impl JobEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, EventKind::StateChanged { state } if state.is_terminal())
    }
}

/// Discovery metadata for one registered executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorDescriptor {
    pub executor_type: String,
    pub phases: Vec<String>,
}

/// Point-in-time view of a job, returned by status queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: Uuid,
    pub executor_type: String,
    pub state: JobState,
    pub phase: usize,
    pub phases: Vec<String>,
    pub progress: u8,
    pub log_tail: Vec<JobEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationResult>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Compact listing entry for a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: Uuid,
    pub executor_type: String,
    pub state: JobState,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_rejects_null_side() {
        let raw = json!({ "source": null, "destination": {} });
        assert!(serde_json::from_value::<MigrationConfig>(raw).is_err());
    }

    #[test]
    fn test_config_accepts_mixed_values() {
        let raw = json!({
            "source": { "url": "https://example.com", "retries": 3, "tags": ["a", "b"] },
            "destination": { "path": "/tmp/out", "options": { "overwrite": true } }
        });
        let config: MigrationConfig = serde_json::from_value(raw).unwrap();
        assert_eq!(config.source.len(), 3);
        assert_eq!(config.destination["options"]["overwrite"], json!(true));
    }

    #[test]
    fn test_decode_source_reports_section() {
        #[derive(Debug, Deserialize)]
        struct Source {
            #[allow(dead_code)]
            url: String,
        }

        let mut source = ConfigMap::new();
        source.insert("url".to_string(), json!(42));
        let config = MigrationConfig::new(source, ConfigMap::new());

        let err = config.decode_source::<Source>().unwrap_err();
        assert!(err.to_string().contains("source"));
    }

    #[test]
    fn test_validation_result_from_parts() {
        let result = ValidationResult::from_parts(vec![], vec!["note".to_string()]);
        assert!(result.valid);

        let result = ValidationResult::from_parts(vec!["bad".to_string()], vec![]);
        assert!(!result.valid);
    }

    #[test]
    fn test_job_state_transitions() {
        assert!(JobState::Created.can_transition_to(JobState::Validating));
        assert!(JobState::Running.can_transition_to(JobState::Cancelled));
        assert!(!JobState::Validating.can_transition_to(JobState::Cancelled));
        assert!(!JobState::Completed.can_transition_to(JobState::Failed));
        assert!(!JobState::Invalid.can_transition_to(JobState::Running));
    }

    #[test]
    fn test_job_state_round_trips_through_str() {
        for state in [
            JobState::Created,
            JobState::Validating,
            JobState::Invalid,
            JobState::Running,
            JobState::Completed,
            JobState::Failed,
            JobState::Cancelled,
        ] {
            assert_eq!(state.as_str().parse::<JobState>().unwrap(), state);
        }
        assert!("paused".parse::<JobState>().is_err());
    }

    #[test]
    fn test_event_serializes_flat() {
        let event = JobEvent {
            sequence: 1,
            timestamp: Utc::now(),
            kind: EventKind::PhaseChanged {
                index: 1,
                name: "Export".to_string(),
            },
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "phase_changed");
        assert_eq!(value["type"], event.kind.name());
        assert_eq!(value["index"], 1);
        assert_eq!(value["sequence"], 1);
    }
}
