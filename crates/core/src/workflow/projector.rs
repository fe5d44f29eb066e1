use serde::{Deserialize, Serialize};

use crate::domain::ticket::TicketStatus;
use crate::errors::WorkflowError;

/// Workflow outcomes that touch the ticket's own status field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowEvent {
    PassStarted,
    FinalGateApproved,
    GateRejected,
    Resubmitted,
}

/// Translates workflow outcomes into ticket status transitions. The ticket's
/// operational lifecycle (assigned, in progress, resolved, closed) is owned
/// elsewhere; this projector only covers the approval phase.
#[derive(Clone, Copy, Debug, Default)]
pub struct TicketStatusProjector;

impl TicketStatusProjector {
    pub fn project(
        &self,
        current: TicketStatus,
        event: WorkflowEvent,
    ) -> Result<TicketStatus, WorkflowError> {
        use TicketStatus::{Cancelled, Open, PendingApproval};
        use WorkflowEvent::{FinalGateApproved, GateRejected, PassStarted, Resubmitted};

        match (current, event) {
            (Open, PassStarted) => Ok(PendingApproval),
            (PendingApproval, FinalGateApproved) => Ok(Open),
            (PendingApproval, GateRejected) => Ok(Cancelled),
            (Cancelled, Resubmitted) => Ok(Open),
            _ => Err(WorkflowError::InvalidState { status: current }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{TicketStatusProjector, WorkflowEvent};
    use crate::domain::ticket::TicketStatus;
    use crate::errors::WorkflowError;

    #[test]
    fn approval_phase_round_trip() {
        let projector = TicketStatusProjector;

        let pending = projector
            .project(TicketStatus::Open, WorkflowEvent::PassStarted)
            .expect("open -> pending approval");
        assert_eq!(pending, TicketStatus::PendingApproval);

        let cleared = projector
            .project(pending, WorkflowEvent::FinalGateApproved)
            .expect("pending approval -> open");
        assert_eq!(cleared, TicketStatus::Open);
    }

    #[test]
    fn rejection_cancels_and_resubmission_reopens() {
        let projector = TicketStatusProjector;

        let cancelled = projector
            .project(TicketStatus::PendingApproval, WorkflowEvent::GateRejected)
            .expect("pending approval -> cancelled");
        assert_eq!(cancelled, TicketStatus::Cancelled);

        let reopened = projector
            .project(cancelled, WorkflowEvent::Resubmitted)
            .expect("cancelled -> open");
        assert_eq!(reopened, TicketStatus::Open);
    }

    #[test]
    fn terminal_and_operational_states_reject_approval_events() {
        let projector = TicketStatusProjector;

        for status in [
            TicketStatus::Resolved,
            TicketStatus::Closed,
            TicketStatus::InProgress,
            TicketStatus::Assigned,
        ] {
            let error = projector
                .project(status, WorkflowEvent::FinalGateApproved)
                .expect_err("approval events only apply during the approval phase");
            assert_eq!(error, WorkflowError::InvalidState { status });
        }
    }

    #[test]
    fn resubmission_only_escapes_cancelled() {
        let projector = TicketStatusProjector;

        let error = projector
            .project(TicketStatus::Open, WorkflowEvent::Resubmitted)
            .expect_err("open tickets cannot be resubmitted");
        assert!(matches!(error, WorkflowError::InvalidState { status: TicketStatus::Open }));
    }
}
