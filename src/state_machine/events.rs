use super::errors::{StateMachineError, StateMachineResult};
use super::states::StatePair;
use serde::{Deserialize, Serialize};

/// Named transitions of the job/build lifecycle
///
/// Every change to a job's state pair goes through exactly one of these
/// signals; there is no generic setter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobSignal {
    BuildRequired,
    BuildDuplicated,
    NoBuildRequired,
    AssemblyError,
    BuildScheduled,
    BuildFailure,
    Completed,
    CompletionFailure,
}

impl JobSignal {
    /// Get a string representation of the signal for logging
    pub fn signal_type(&self) -> &'static str {
        match self {
            Self::BuildRequired => "build_required",
            Self::BuildDuplicated => "build_duplicated",
            Self::NoBuildRequired => "no_build_required",
            Self::AssemblyError => "assembly_error",
            Self::BuildScheduled => "build_scheduled",
            Self::BuildFailure => "build_failure",
            Self::Completed => "completed",
            Self::CompletionFailure => "completion_failure",
        }
    }

    /// The pair a job holds after this signal
    pub fn target(&self) -> StatePair {
        match self {
            Self::BuildRequired => StatePair::CREATED,
            Self::BuildDuplicated => StatePair::DUPLICATE,
            Self::NoBuildRequired => StatePair::UP_TO_DATE,
            Self::AssemblyError => StatePair::ASSEMBLY_FAILED,
            Self::BuildScheduled => StatePair::SUBMITTED,
            Self::BuildFailure => StatePair::BUILD_FAILED,
            Self::Completed => StatePair::COMPLETED,
            Self::CompletionFailure => StatePair::COMPLETION_FAILED,
        }
    }

    /// Whether a job that has never been persisted may receive this signal
    pub fn accepts_new_job(&self) -> bool {
        matches!(
            self,
            Self::BuildRequired
                | Self::BuildDuplicated
                | Self::NoBuildRequired
                | Self::AssemblyError
        )
    }

    /// Persisted pairs from which this signal is legal
    pub fn legal_sources(&self) -> &'static [StatePair] {
        match self {
            Self::BuildRequired | Self::BuildDuplicated | Self::NoBuildRequired => &[],
            Self::AssemblyError => &[StatePair::CREATED],
            Self::BuildScheduled => &[StatePair::CREATED],
            Self::BuildFailure | Self::Completed => &[StatePair::SUBMITTED],
            Self::CompletionFailure => &[StatePair::SUBMITTED, StatePair::COMPLETED],
        }
    }

    /// Resolve the target pair, `None` meaning the job was never persisted
    pub fn determine_target(&self, current: Option<StatePair>) -> StateMachineResult<StatePair> {
        let allowed = match current {
            None => self.accepts_new_job(),
            Some(pair) => self.legal_sources().contains(&pair),
        };

        if !allowed {
            return Err(StateMachineError::InvalidTransition {
                from: current.map(|pair| pair.to_string()),
                signal: self.signal_type().to_string(),
            });
        }

        Ok(self.target())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [JobSignal; 8] = [
        JobSignal::BuildRequired,
        JobSignal::BuildDuplicated,
        JobSignal::NoBuildRequired,
        JobSignal::AssemblyError,
        JobSignal::BuildScheduled,
        JobSignal::BuildFailure,
        JobSignal::Completed,
        JobSignal::CompletionFailure,
    ];

    #[test]
    fn test_every_target_is_legal() {
        for signal in ALL {
            assert!(signal.target().is_legal(), "{signal:?}");
        }
    }

    #[test]
    fn test_happy_path_transitions() {
        let created = JobSignal::BuildRequired.determine_target(None).unwrap();
        assert_eq!(created, StatePair::CREATED);

        let submitted = JobSignal::BuildScheduled
            .determine_target(Some(created))
            .unwrap();
        assert_eq!(submitted, StatePair::SUBMITTED);

        let completed = JobSignal::Completed
            .determine_target(Some(submitted))
            .unwrap();
        assert_eq!(completed, StatePair::COMPLETED);

        let post_build_failure = JobSignal::CompletionFailure
            .determine_target(Some(completed))
            .unwrap();
        assert_eq!(post_build_failure, StatePair::COMPLETION_FAILED);
    }

    #[test]
    fn test_out_of_order_transitions_are_rejected() {
        assert!(JobSignal::Completed
            .determine_target(Some(StatePair::CREATED))
            .is_err());
        assert!(JobSignal::BuildScheduled.determine_target(None).is_err());
        assert!(JobSignal::BuildRequired
            .determine_target(Some(StatePair::SUBMITTED))
            .is_err());
        assert!(JobSignal::BuildFailure
            .determine_target(Some(StatePair::COMPLETED))
            .is_err());
    }

    #[test]
    fn test_settled_pairs_accept_no_signal() {
        for pair in [
            StatePair::DUPLICATE,
            StatePair::UP_TO_DATE,
            StatePair::ASSEMBLY_FAILED,
            StatePair::BUILD_FAILED,
            StatePair::COMPLETION_FAILED,
        ] {
            for signal in ALL {
                assert!(
                    signal.determine_target(Some(pair)).is_err(),
                    "{signal:?} from {pair}"
                );
            }
        }
    }
}
