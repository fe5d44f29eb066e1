use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ticket::{TeamId, TicketId, UserId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalRecordId(pub String);

impl fmt::Display for ApprovalRecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalLevel {
    LineManager,
    HeadOfDepartment,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    DecideApprovals,
    OverrideApprovals,
}

/// Who may decide a gate. A specific user is recorded when the directory can
/// resolve one at gate creation; otherwise the gate is addressed to any user
/// holding the capability, checked at decision time so role changes between
/// creation and decision are honoured.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Approver {
    Specific { user_id: UserId },
    AnyWithCapability { capability: Capability },
}

/// One approval gate instance for a ticket. Records are immutable once
/// decided and are never deleted: they are the audit trail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub id: ApprovalRecordId,
    pub ticket_id: TicketId,
    /// 1-based pass counter; resubmission starts a new pass.
    pub pass: u32,
    /// 1-based ordering within a pass: line manager before head of department.
    pub sequence: u32,
    pub level: ApprovalLevel,
    pub status: ApprovalStatus,
    pub approver: Approver,
    pub comments: Option<String>,
    pub routed_to_team: Option<TeamId>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApprovalRecord {
    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }

    /// Apply a decision to a copy of the record, mirroring what the
    /// repository's conditional update writes.
    pub fn with_decision(mut self, decision: &ApprovalDecision) -> Self {
        self.status = decision.status;
        self.comments = decision.comments.clone();
        match decision.status {
            ApprovalStatus::Approved => {
                self.routed_to_team = decision.routed_to_team.clone();
                self.approved_at = Some(decision.decided_at);
            }
            ApprovalStatus::Rejected => {
                self.rejected_at = Some(decision.decided_at);
            }
            ApprovalStatus::Pending => {}
        }
        self
    }
}

/// The single mutation an approval record ever receives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovalDecision {
    pub status: ApprovalStatus,
    pub comments: Option<String>,
    pub routed_to_team: Option<TeamId>,
    pub decided_at: DateTime<Utc>,
}

impl ApprovalDecision {
    pub fn approve(
        comments: Option<String>,
        routed_to_team: Option<TeamId>,
        decided_at: DateTime<Utc>,
    ) -> Self {
        Self { status: ApprovalStatus::Approved, comments, routed_to_team, decided_at }
    }

    pub fn reject(comments: String, decided_at: DateTime<Utc>) -> Self {
        Self {
            status: ApprovalStatus::Rejected,
            comments: Some(comments),
            routed_to_team: None,
            decided_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{
        ApprovalDecision, ApprovalLevel, ApprovalRecord, ApprovalRecordId, ApprovalStatus,
        Approver, Capability,
    };
    use crate::domain::ticket::{TeamId, TicketId};

    fn pending_record() -> ApprovalRecord {
        ApprovalRecord {
            id: ApprovalRecordId("apr-1".to_string()),
            ticket_id: TicketId("tkt-1".to_string()),
            pass: 1,
            sequence: 1,
            level: ApprovalLevel::LineManager,
            status: ApprovalStatus::Pending,
            approver: Approver::AnyWithCapability { capability: Capability::DecideApprovals },
            comments: None,
            routed_to_team: None,
            approved_at: None,
            rejected_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn approval_sets_approved_at_and_routing_only() {
        let now = Utc::now();
        let decided = pending_record().with_decision(&ApprovalDecision::approve(
            Some("ok".to_string()),
            Some(TeamId("team-net".to_string())),
            now,
        ));

        assert_eq!(decided.status, ApprovalStatus::Approved);
        assert_eq!(decided.approved_at, Some(now));
        assert_eq!(decided.rejected_at, None);
        assert_eq!(decided.routed_to_team, Some(TeamId("team-net".to_string())));
    }

    #[test]
    fn rejection_sets_rejected_at_and_keeps_timestamps_exclusive() {
        let now = Utc::now();
        let decided = pending_record()
            .with_decision(&ApprovalDecision::reject("insufficient detail".to_string(), now));

        assert_eq!(decided.status, ApprovalStatus::Rejected);
        assert_eq!(decided.rejected_at, Some(now));
        assert_eq!(decided.approved_at, None);
        assert_eq!(decided.comments.as_deref(), Some("insufficient detail"));
    }
}
