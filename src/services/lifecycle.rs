use crate::core::context::ActorRole;
use crate::db::types::{JobKind, LessonStatus};

/// Kind of actor attempting a lesson transition. Teachers and coordinators
/// both count as `User` here; elevation matters for read scope, not for the
/// transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorKind {
    User,
    System,
}

impl From<ActorRole> for ActorKind {
    fn from(role: ActorRole) -> Self {
        match role {
            ActorRole::Teacher | ActorRole::Coordinator => ActorKind::User,
            ActorRole::System => ActorKind::System,
        }
    }
}

/// Whether `(current -> target)` is a legal transition for the given actor.
///
/// One arm per current state: a new `LessonStatus` variant will not compile
/// until its outgoing transitions are spelled out here. Anything not listed
/// is illegal and leaves the lesson untouched.
pub fn transition_allowed(current: LessonStatus, target: LessonStatus, actor: ActorKind) -> bool {
    use ActorKind::{System, User};
    use LessonStatus::*;

    match current {
        Created => matches!(target, AwaitingTranscription),
        AwaitingTranscription => match actor {
            User => false,
            System => matches!(target, Transcribing | Error),
        },
        Transcribing => match actor {
            User => false,
            System => matches!(target, Transcribed | Error),
        },
        Transcribed => match actor {
            User => false,
            System => matches!(target, Analyzing | Error),
        },
        Analyzing => match actor {
            User => false,
            System => matches!(target, Analyzed | Error),
        },
        Analyzed => match actor {
            // Approval/rejection is the owner's call; the approval workflow
            // drives it together with the Analysis row.
            User => matches!(target, Approved | Rejected),
            System => matches!(target, Approved | Rejected),
        },
        // Reprocess is the single way out, back to the failed stage's
        // upstream status.
        Error => matches!(target, AwaitingTranscription | Transcribed),
        Approved => false,
        Rejected => false,
    }
}

/// The upstream status a reprocess resets to, given the stage that failed,
/// and the job kind to re-enqueue.
pub fn reprocess_target(failed_stage: JobKind) -> Option<(LessonStatus, JobKind)> {
    match failed_stage {
        JobKind::Transcription => Some((LessonStatus::AwaitingTranscription, JobKind::Transcription)),
        JobKind::Analysis => Some((LessonStatus::Transcribed, JobKind::Analysis)),
        JobKind::ReportDiff | JobKind::RejectionFeedback | JobKind::CoverageRefresh => None,
    }
}

/// The lesson status that must hold for a processing job kind to be
/// dispatched (the gate check).
pub fn dispatch_gate(kind: JobKind) -> Option<LessonStatus> {
    match kind {
        JobKind::Transcription => Some(LessonStatus::AwaitingTranscription),
        JobKind::Analysis => Some(LessonStatus::Transcribed),
        JobKind::ReportDiff => Some(LessonStatus::Approved),
        JobKind::RejectionFeedback => Some(LessonStatus::Rejected),
        // Not lesson-bound.
        JobKind::CoverageRefresh => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LessonStatus::*;

    const ALL: [LessonStatus; 9] = [
        Created,
        AwaitingTranscription,
        Transcribing,
        Transcribed,
        Analyzing,
        Analyzed,
        Approved,
        Rejected,
        Error,
    ];

    #[test]
    fn user_transitions_are_the_explicit_set_only() {
        let mut allowed = Vec::new();
        for current in ALL {
            for target in ALL {
                if transition_allowed(current, target, ActorKind::User) {
                    allowed.push((current, target));
                }
            }
        }
        assert_eq!(
            allowed,
            vec![
                (Created, AwaitingTranscription),
                (Analyzed, Approved),
                (Analyzed, Rejected),
                (Error, AwaitingTranscription),
                (Error, Transcribed),
            ]
        );
    }

    #[test]
    fn worker_only_transitions_reject_users() {
        assert!(!transition_allowed(AwaitingTranscription, Transcribing, ActorKind::User));
        assert!(!transition_allowed(Transcribing, Transcribed, ActorKind::User));
        assert!(!transition_allowed(Transcribed, Analyzing, ActorKind::User));
        assert!(!transition_allowed(Analyzing, Analyzed, ActorKind::User));
        assert!(!transition_allowed(Transcribing, Error, ActorKind::User));

        assert!(transition_allowed(AwaitingTranscription, Transcribing, ActorKind::System));
        assert!(transition_allowed(Analyzing, Analyzed, ActorKind::System));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for target in ALL {
            assert!(!transition_allowed(Approved, target, ActorKind::User));
            assert!(!transition_allowed(Approved, target, ActorKind::System));
            assert!(!transition_allowed(Rejected, target, ActorKind::User));
            assert!(!transition_allowed(Rejected, target, ActorKind::System));
        }
    }

    #[test]
    fn error_is_reachable_from_in_flight_states_only() {
        for current in ALL {
            let reachable = transition_allowed(current, Error, ActorKind::System);
            assert_eq!(reachable, current.is_in_flight(), "from {current:?}");
        }
    }

    #[test]
    fn reprocess_targets_match_failed_stage() {
        assert_eq!(
            reprocess_target(JobKind::Transcription),
            Some((AwaitingTranscription, JobKind::Transcription))
        );
        assert_eq!(reprocess_target(JobKind::Analysis), Some((Transcribed, JobKind::Analysis)));
        assert_eq!(reprocess_target(JobKind::CoverageRefresh), None);
    }

    #[test]
    fn dispatch_gates() {
        assert_eq!(dispatch_gate(JobKind::Transcription), Some(AwaitingTranscription));
        assert_eq!(dispatch_gate(JobKind::Analysis), Some(Transcribed));
        assert_eq!(dispatch_gate(JobKind::CoverageRefresh), None);
    }
}
