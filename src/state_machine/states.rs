use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a job as reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Build decided necessary, not yet dispatched
    Created,
    /// An identical job is already in flight
    Duplicate,
    /// Upstream data unchanged since the last successful build
    UpToDate,
    /// Build request enqueued
    Submitted,
    /// Assembly, build or post-build bookkeeping failed
    Failed,
    /// Build succeeded and post-build steps ran
    Completed,
}

impl JobState {
    /// Check if this is a terminal state (no further transitions expected)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Duplicate | Self::UpToDate | Self::Failed | Self::Completed
        )
    }

    /// Check if a build for this job may still be running
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Created | Self::Submitted)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Duplicate => write!(f, "duplicate"),
            Self::UpToDate => write!(f, "up_to_date"),
            Self::Submitted => write!(f, "submitted"),
            Self::Failed => write!(f, "failed"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "duplicate" => Ok(Self::Duplicate),
            "up_to_date" => Ok(Self::UpToDate),
            "submitted" => Ok(Self::Submitted),
            "failed" => Ok(Self::Failed),
            "completed" => Ok(Self::Completed),
            _ => Err(format!("Invalid job state: {s}")),
        }
    }
}

/// State of the build attached to a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildState {
    /// No build will run for this job
    None,
    /// Build required or duplicated but not dispatched by this job
    NotScheduled,
    /// Build request is on the queue or running
    Scheduled,
    /// Builder reported failure
    Failed,
    /// Builder reported success
    Succeeded,
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::NotScheduled => write!(f, "not_scheduled"),
            Self::Scheduled => write!(f, "scheduled"),
            Self::Failed => write!(f, "failed"),
            Self::Succeeded => write!(f, "succeeded"),
        }
    }
}

impl std::str::FromStr for BuildState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "not_scheduled" => Ok(Self::NotScheduled),
            "scheduled" => Ok(Self::Scheduled),
            "failed" => Ok(Self::Failed),
            "succeeded" => Ok(Self::Succeeded),
            _ => Err(format!("Invalid build state: {s}")),
        }
    }
}

/// A `(JobState, BuildState)` combination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatePair {
    pub job: JobState,
    pub build: BuildState,
}

impl StatePair {
    pub const CREATED: Self = Self::new(JobState::Created, BuildState::NotScheduled);
    pub const DUPLICATE: Self = Self::new(JobState::Duplicate, BuildState::NotScheduled);
    pub const UP_TO_DATE: Self = Self::new(JobState::UpToDate, BuildState::None);
    pub const ASSEMBLY_FAILED: Self = Self::new(JobState::Failed, BuildState::None);
    pub const SUBMITTED: Self = Self::new(JobState::Submitted, BuildState::Scheduled);
    pub const BUILD_FAILED: Self = Self::new(JobState::Failed, BuildState::Failed);
    pub const COMPLETED: Self = Self::new(JobState::Completed, BuildState::Succeeded);
    pub const COMPLETION_FAILED: Self = Self::new(JobState::Failed, BuildState::Succeeded);

    /// Every pair a persisted job may hold
    pub const LEGAL: [StatePair; 8] = [
        Self::CREATED,
        Self::DUPLICATE,
        Self::UP_TO_DATE,
        Self::ASSEMBLY_FAILED,
        Self::SUBMITTED,
        Self::BUILD_FAILED,
        Self::COMPLETED,
        Self::COMPLETION_FAILED,
    ];

    pub const fn new(job: JobState, build: BuildState) -> Self {
        Self { job, build }
    }

    pub fn is_legal(&self) -> bool {
        Self::LEGAL.contains(self)
    }
}

impl fmt::Display for StatePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.job, self.build)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_state_terminal_check() {
        assert!(JobState::Duplicate.is_terminal());
        assert!(JobState::UpToDate.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::Completed.is_terminal());
        assert!(!JobState::Created.is_terminal());
        assert!(!JobState::Submitted.is_terminal());
    }

    #[test]
    fn test_state_string_conversion() {
        assert_eq!(JobState::UpToDate.to_string(), "up_to_date");
        assert_eq!("submitted".parse::<JobState>().unwrap(), JobState::Submitted);
        assert_eq!(BuildState::NotScheduled.to_string(), "not_scheduled");
        assert_eq!("succeeded".parse::<BuildState>().unwrap(), BuildState::Succeeded);
        assert!("running".parse::<JobState>().is_err());
    }

    #[test]
    fn test_legal_pairs() {
        assert!(StatePair::COMPLETION_FAILED.is_legal());
        assert!(!StatePair::new(JobState::Completed, BuildState::Failed).is_legal());
        assert!(!StatePair::new(JobState::Created, BuildState::None).is_legal());

        let distinct: std::collections::HashSet<_> = StatePair::LEGAL.iter().collect();
        assert_eq!(distinct.len(), 8);
    }

    #[test]
    fn test_state_serde() {
        let json = serde_json::to_string(&BuildState::NotScheduled).unwrap();
        assert_eq!(json, "\"not_scheduled\"");

        let parsed: JobState = serde_json::from_str("\"up_to_date\"").unwrap();
        assert_eq!(parsed, JobState::UpToDate);
    }
}
