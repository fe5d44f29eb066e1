use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::approval::{
    ApprovalDecision, ApprovalRecord, ApprovalRecordId, Capability,
};
use crate::domain::category::CategoryApprovalRule;
use crate::domain::ticket::{CategoryId, DepartmentId, TeamId, Ticket, TicketId, TicketStatus, UserId};

pub mod memory;

pub use memory::{
    FailingNotificationSink, InMemoryApprovalRepository, InMemoryCategoryPolicies,
    InMemoryNotificationSink, InMemoryTicketRepository, InMemoryUserDirectory,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("constraint violation: {0}")]
    Constraint(String),
}

#[async_trait]
pub trait TicketRepository: Send + Sync {
    async fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>, StorageError>;

    async fn insert(&self, ticket: Ticket) -> Result<(), StorageError>;

    /// Guarded conditional write: transition the status only if it still
    /// matches `expected`. Returns whether the caller won the write.
    async fn update_status_if(
        &self,
        id: &TicketId,
        expected: TicketStatus,
        next: TicketStatus,
    ) -> Result<bool, StorageError>;
}

/// Result of an atomic decide-plus-ticket-transition write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Both the decision and the ticket status transition applied.
    Applied,
    /// The record was no longer pending; nothing was written.
    RecordNotPending,
    /// The ticket status no longer matched the expectation; the decision
    /// was rolled back with it.
    TicketStale,
}

#[async_trait]
pub trait ApprovalRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &ApprovalRecordId,
    ) -> Result<Option<ApprovalRecord>, StorageError>;

    /// Insert a new gate. Implementations must refuse a second pending
    /// record for the same ticket.
    async fn insert(&self, record: ApprovalRecord) -> Result<(), StorageError>;

    /// Open the first gate of a pass: transition the ticket's status (only
    /// if it still matches `expected`) and insert the gate as one atomic
    /// write. Returns whether the status expectation held; on a refused
    /// insert the transition is rolled back with it.
    async fn open_pass(
        &self,
        record: ApprovalRecord,
        expected: TicketStatus,
        next: TicketStatus,
    ) -> Result<bool, StorageError>;

    /// Decide a pending record and open the next gate of the same pass as
    /// one atomic write. Returns whether this caller won the decision race;
    /// a lost race writes nothing.
    async fn decide_and_open_next(
        &self,
        id: &ApprovalRecordId,
        decision: &ApprovalDecision,
        next_record: ApprovalRecord,
    ) -> Result<bool, StorageError>;

    /// Decide a pending record and transition its ticket's status (plus the
    /// optional routing override) as one atomic write. Either everything
    /// applies or nothing does.
    async fn decide_and_transition(
        &self,
        id: &ApprovalRecordId,
        decision: &ApprovalDecision,
        ticket_id: &TicketId,
        expected: TicketStatus,
        next: TicketStatus,
        routed_to_team: Option<&TeamId>,
    ) -> Result<TransitionOutcome, StorageError>;

    async fn current_pending(
        &self,
        ticket_id: &TicketId,
    ) -> Result<Option<ApprovalRecord>, StorageError>;

    /// Most recently rejected record for the ticket, across all passes.
    async fn latest_rejected(
        &self,
        ticket_id: &TicketId,
    ) -> Result<Option<ApprovalRecord>, StorageError>;

    /// Lifetime rejection count for the ticket, across all passes.
    async fn rejected_count(&self, ticket_id: &TicketId) -> Result<u32, StorageError>;

    /// Highest pass number recorded for the ticket; 0 when none exist.
    async fn latest_pass(&self, ticket_id: &TicketId) -> Result<u32, StorageError>;

    async fn list_pending(&self) -> Result<Vec<ApprovalRecord>, StorageError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn reporting_manager_of(&self, user: &UserId) -> Result<Option<UserId>, StorageError>;

    async fn department_of(&self, user: &UserId) -> Result<Option<DepartmentId>, StorageError>;

    async fn department_head_of(
        &self,
        department: &DepartmentId,
    ) -> Result<Option<UserId>, StorageError>;

    async fn has_capability(
        &self,
        user: &UserId,
        capability: Capability,
    ) -> Result<bool, StorageError>;
}

#[async_trait]
pub trait CategoryPolicyLookup: Send + Sync {
    async fn approval_rule(
        &self,
        category: &CategoryId,
    ) -> Result<Option<CategoryApprovalRule>, StorageError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ApprovalRequested,
    ApprovalApproved,
    ApprovalRejected,
    TicketResubmitted,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub kind: NotificationKind,
    /// Absent when the gate is capability-addressed rather than assigned to
    /// a specific user.
    pub recipient: Option<UserId>,
    pub ticket_id: TicketId,
    pub record_id: Option<ApprovalRecordId>,
    pub metadata: BTreeMap<String, String>,
}

impl NotificationEvent {
    pub fn new(kind: NotificationKind, recipient: Option<UserId>, ticket_id: TicketId) -> Self {
        Self { kind, recipient, ticket_id, record_id: None, metadata: BTreeMap::new() }
    }

    pub fn with_record(mut self, record_id: ApprovalRecordId) -> Self {
        self.record_id = Some(record_id);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Fire-and-forget delivery. A failed notify must never fail the workflow
/// transition that produced it.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: &NotificationEvent) -> Result<(), String>;
}

/// Emits notifications to the log stream. Used where no real delivery
/// channel is wired up, so workflow activity still leaves a trace.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotificationSink;

impl NotificationSink for TracingNotificationSink {
    fn notify(&self, event: &NotificationEvent) -> Result<(), String> {
        tracing::info!(
            kind = ?event.kind,
            ticket = %event.ticket_id,
            recipient = event.recipient.as_ref().map(|user| user.0.as_str()),
            "workflow notification"
        );
        Ok(())
    }
}
