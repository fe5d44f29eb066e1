use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::approval::{
    ApprovalDecision, ApprovalLevel, ApprovalRecord, ApprovalRecordId, Approver, Capability,
};
use crate::domain::ticket::{TeamId, Ticket, TicketId, TicketStatus, UserId};
use crate::errors::WorkflowError;
use crate::policy::{ApprovalPolicy, GateSpec};
use crate::ports::{
    ApprovalRepository, CategoryPolicyLookup, NotificationEvent, NotificationKind,
    NotificationSink, TicketRepository, TransitionOutcome, UserDirectory,
};
use crate::workflow::guard::ResubmissionGuard;
use crate::workflow::projector::{TicketStatusProjector, WorkflowEvent};

/// Drives the ticket approval state machine. This service is the sole
/// mutator of approval records and of the ticket's approval-phase status.
pub struct ApprovalWorkflowService<A, T, D, C, N> {
    approvals: Arc<A>,
    tickets: Arc<T>,
    directory: Arc<D>,
    categories: Arc<C>,
    notifier: Arc<N>,
    policy: ApprovalPolicy,
    guard: ResubmissionGuard,
    projector: TicketStatusProjector,
}

impl<A, T, D, C, N> ApprovalWorkflowService<A, T, D, C, N>
where
    A: ApprovalRepository,
    T: TicketRepository,
    D: UserDirectory,
    C: CategoryPolicyLookup,
    N: NotificationSink,
{
    pub fn new(
        approvals: Arc<A>,
        tickets: Arc<T>,
        directory: Arc<D>,
        categories: Arc<C>,
        notifier: Arc<N>,
    ) -> Self {
        Self {
            approvals,
            tickets,
            directory,
            categories,
            notifier,
            policy: ApprovalPolicy,
            guard: ResubmissionGuard::default(),
            projector: TicketStatusProjector,
        }
    }

    pub fn with_guard(mut self, guard: ResubmissionGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn resubmission_guard(&self) -> ResubmissionGuard {
        self.guard
    }

    /// Start an approval pass for a ticket. Returns the first gate, or
    /// `None` when the category needs no approval and the ticket stays
    /// actionable.
    pub async fn initiate(
        &self,
        ticket_id: &TicketId,
    ) -> Result<Option<ApprovalRecord>, WorkflowError> {
        let ticket = self.load_ticket(ticket_id).await?;
        let gates = self.required_gates(&ticket).await?;
        let Some(first_gate) = gates.first() else {
            return Ok(None);
        };

        let next_status = self.projector.project(ticket.status, WorkflowEvent::PassStarted)?;
        let pass = self.approvals.latest_pass(&ticket.id).await? + 1;
        let record = self.build_gate(&ticket, first_gate, pass).await?;
        if !self.approvals.open_pass(record.clone(), ticket.status, next_status).await? {
            return Err(self.stale_status_error(&ticket.id).await?);
        }
        self.announce_gate(&ticket, &record);
        Ok(Some(record))
    }

    /// Decide the gate in favour. Advances to the next gate or finalizes the
    /// ticket, applying the routing override when one is given.
    pub async fn approve(
        &self,
        record_id: &ApprovalRecordId,
        acting_user: &UserId,
        comments: Option<String>,
        routed_to_team: Option<TeamId>,
    ) -> Result<ApprovalRecord, WorkflowError> {
        let record = self.load_record(record_id).await?;
        let ticket = self.load_ticket(&record.ticket_id).await?;
        self.guard_decidable(&ticket, &record, acting_user).await?;

        let decision = ApprovalDecision::approve(comments, routed_to_team, Utc::now());
        let gates = self.required_gates(&ticket).await?;
        match gates.iter().find(|gate| gate.sequence == record.sequence + 1) {
            Some(next_gate) => {
                let next_record = self.build_gate(&ticket, next_gate, record.pass).await?;
                if !self
                    .approvals
                    .decide_and_open_next(&record.id, &decision, next_record.clone())
                    .await?
                {
                    return Err(WorkflowError::AlreadyDecided(record.id.clone()));
                }
                self.announce_gate(&ticket, &next_record);
            }
            None => {
                let next_status =
                    self.projector.project(ticket.status, WorkflowEvent::FinalGateApproved)?;
                match self
                    .approvals
                    .decide_and_transition(
                        &record.id,
                        &decision,
                        &ticket.id,
                        ticket.status,
                        next_status,
                        decision.routed_to_team.as_ref(),
                    )
                    .await?
                {
                    TransitionOutcome::Applied => {}
                    TransitionOutcome::RecordNotPending => {
                        return Err(WorkflowError::AlreadyDecided(record.id.clone()));
                    }
                    TransitionOutcome::TicketStale => {
                        return Err(self.stale_status_error(&ticket.id).await?);
                    }
                }
            }
        }
        let decided = record.with_decision(&decision);

        self.emit(
            NotificationEvent::new(
                NotificationKind::ApprovalApproved,
                Some(ticket.requester.clone()),
                ticket.id.clone(),
            )
            .with_record(decided.id.clone())
            .with_metadata("level", level_name(decided.level))
            .with_metadata("decided_by", acting_user.0.clone()),
        );
        Ok(decided)
    }

    /// Decide the gate against. Cancels the ticket and ends the pass;
    /// comments are mandatory so the requester learns why.
    pub async fn reject(
        &self,
        record_id: &ApprovalRecordId,
        acting_user: &UserId,
        comments: &str,
    ) -> Result<ApprovalRecord, WorkflowError> {
        let comments = comments.trim();
        if comments.is_empty() {
            return Err(WorkflowError::Validation(
                "comments are required when rejecting an approval".to_string(),
            ));
        }

        let record = self.load_record(record_id).await?;
        let ticket = self.load_ticket(&record.ticket_id).await?;
        self.guard_decidable(&ticket, &record, acting_user).await?;

        let decision = ApprovalDecision::reject(comments.to_string(), Utc::now());
        let next_status = self.projector.project(ticket.status, WorkflowEvent::GateRejected)?;
        match self
            .approvals
            .decide_and_transition(
                &record.id,
                &decision,
                &ticket.id,
                ticket.status,
                next_status,
                None,
            )
            .await?
        {
            TransitionOutcome::Applied => {}
            TransitionOutcome::RecordNotPending => {
                return Err(WorkflowError::AlreadyDecided(record.id.clone()));
            }
            TransitionOutcome::TicketStale => {
                return Err(self.stale_status_error(&ticket.id).await?);
            }
        }
        let decided = record.with_decision(&decision);

        self.emit(
            NotificationEvent::new(
                NotificationKind::ApprovalRejected,
                Some(ticket.requester.clone()),
                ticket.id.clone(),
            )
            .with_record(decided.id.clone())
            .with_metadata("level", level_name(decided.level))
            .with_metadata("reason", comments)
            .with_metadata("decided_by", acting_user.0.clone()),
        );
        Ok(decided)
    }

    /// Reopen a cancelled ticket after rejection and start a fresh pass.
    /// History is never touched; the guard caps how often this can happen.
    pub async fn resubmit(
        &self,
        ticket_id: &TicketId,
        acting_user: &UserId,
    ) -> Result<Ticket, WorkflowError> {
        let ticket = self.load_ticket(ticket_id).await?;
        if ticket.status != TicketStatus::Cancelled
            || self.approvals.latest_rejected(&ticket.id).await?.is_none()
        {
            return Err(WorkflowError::InvalidState { status: ticket.status });
        }

        let rejected = self.approvals.rejected_count(&ticket.id).await?;
        if !self.guard.allows(rejected) {
            return Err(WorkflowError::ResubmissionLimitExceeded {
                rejected,
                ceiling: self.guard.ceiling(),
            });
        }

        let next_status = self.projector.project(ticket.status, WorkflowEvent::Resubmitted)?;
        if !self.tickets.update_status_if(&ticket.id, ticket.status, next_status).await? {
            return Err(self.stale_status_error(&ticket.id).await?);
        }

        self.emit(
            NotificationEvent::new(
                NotificationKind::TicketResubmitted,
                Some(ticket.requester.clone()),
                ticket.id.clone(),
            )
            .with_metadata("resubmitted_by", acting_user.0.clone())
            .with_metadata("remaining", self.guard.remaining(rejected).to_string()),
        );

        self.initiate(ticket_id).await?;
        self.load_ticket(ticket_id).await
    }

    /// Pending gates the given user may decide, excluding gates on tickets
    /// that have already left the approval phase terminally. Eligibility is
    /// exactly what `approve`/`reject` would accept, so override holders see
    /// every gate they could step into.
    pub async fn pending_approvals_for(
        &self,
        user: &UserId,
    ) -> Result<Vec<ApprovalRecord>, WorkflowError> {
        let mut visible = Vec::new();
        for record in self.approvals.list_pending().await? {
            let Some(ticket) = self.tickets.find_by_id(&record.ticket_id).await? else {
                continue;
            };
            if ticket.status.is_terminal() {
                continue;
            }
            if self.may_decide(user, &record).await? {
                visible.push(record);
            }
        }
        Ok(visible)
    }

    pub async fn ticket(&self, ticket_id: &TicketId) -> Result<Ticket, WorkflowError> {
        self.load_ticket(ticket_id).await
    }

    pub async fn current_approval(
        &self,
        ticket_id: &TicketId,
    ) -> Result<Option<ApprovalRecord>, WorkflowError> {
        Ok(self.approvals.current_pending(ticket_id).await?)
    }

    /// Most recent rejected record, exposed only while the ticket sits in
    /// the cancelled state it caused.
    pub async fn rejected_approval(
        &self,
        ticket_id: &TicketId,
    ) -> Result<Option<ApprovalRecord>, WorkflowError> {
        let ticket = self.load_ticket(ticket_id).await?;
        if ticket.status != TicketStatus::Cancelled {
            return Ok(None);
        }
        Ok(self.approvals.latest_rejected(ticket_id).await?)
    }

    async fn load_ticket(&self, id: &TicketId) -> Result<Ticket, WorkflowError> {
        self.tickets
            .find_by_id(id)
            .await?
            .ok_or_else(|| WorkflowError::TicketNotFound(id.clone()))
    }

    async fn load_record(&self, id: &ApprovalRecordId) -> Result<ApprovalRecord, WorkflowError> {
        self.approvals
            .find_by_id(id)
            .await?
            .ok_or_else(|| WorkflowError::RecordNotFound(id.clone()))
    }

    async fn required_gates(&self, ticket: &Ticket) -> Result<Vec<GateSpec>, WorkflowError> {
        let rule =
            self.categories.approval_rule(&ticket.category_id).await?.unwrap_or_default();
        Ok(self.policy.required_gates(&rule, ticket.amount))
    }

    async fn guard_decidable(
        &self,
        ticket: &Ticket,
        record: &ApprovalRecord,
        acting_user: &UserId,
    ) -> Result<(), WorkflowError> {
        if ticket.status.is_terminal() {
            return Err(WorkflowError::InvalidState { status: ticket.status });
        }
        self.authorize(acting_user, record).await?;
        if !record.is_pending() {
            return Err(WorkflowError::AlreadyDecided(record.id.clone()));
        }
        Ok(())
    }

    /// One shared eligibility rule: the gate's addressee, any holder of an
    /// addressed capability, or an override holder.
    async fn may_decide(
        &self,
        user: &UserId,
        record: &ApprovalRecord,
    ) -> Result<bool, WorkflowError> {
        let addressed = match &record.approver {
            Approver::Specific { user_id } => user_id == user,
            Approver::AnyWithCapability { capability } => {
                self.directory.has_capability(user, *capability).await?
            }
        };
        if addressed {
            return Ok(true);
        }
        Ok(self.directory.has_capability(user, Capability::OverrideApprovals).await?)
    }

    async fn authorize(
        &self,
        user: &UserId,
        record: &ApprovalRecord,
    ) -> Result<(), WorkflowError> {
        if self.may_decide(user, record).await? {
            return Ok(());
        }
        Err(WorkflowError::Forbidden { user: user.clone() })
    }

    async fn build_gate(
        &self,
        ticket: &Ticket,
        gate: &GateSpec,
        pass: u32,
    ) -> Result<ApprovalRecord, WorkflowError> {
        let approver = self.resolve_approver(ticket, gate.level).await?;
        Ok(ApprovalRecord {
            id: ApprovalRecordId(Uuid::new_v4().to_string()),
            ticket_id: ticket.id.clone(),
            pass,
            sequence: gate.sequence,
            level: gate.level,
            status: crate::domain::approval::ApprovalStatus::Pending,
            approver,
            comments: None,
            routed_to_team: None,
            approved_at: None,
            rejected_at: None,
            created_at: Utc::now(),
        })
    }

    fn announce_gate(&self, ticket: &Ticket, record: &ApprovalRecord) {
        let recipient = match &record.approver {
            Approver::Specific { user_id } => Some(user_id.clone()),
            Approver::AnyWithCapability { .. } => None,
        };
        self.emit(
            NotificationEvent::new(
                NotificationKind::ApprovalRequested,
                recipient,
                ticket.id.clone(),
            )
            .with_record(record.id.clone())
            .with_metadata("level", level_name(record.level))
            .with_metadata("requester", ticket.requester.0.clone()),
        );
    }

    async fn resolve_approver(
        &self,
        ticket: &Ticket,
        level: ApprovalLevel,
    ) -> Result<Approver, WorkflowError> {
        let resolved = match level {
            ApprovalLevel::LineManager => {
                self.directory.reporting_manager_of(&ticket.requester).await?
            }
            ApprovalLevel::HeadOfDepartment => {
                match self.directory.department_of(&ticket.requester).await? {
                    Some(department) => {
                        self.directory.department_head_of(&department).await?
                    }
                    None => None,
                }
            }
        };
        Ok(resolved
            .map(|user_id| Approver::Specific { user_id })
            .unwrap_or(Approver::AnyWithCapability {
                capability: Capability::DecideApprovals,
            }))
    }

    /// A guarded status write lost its race: report whatever the status is
    /// now so the caller can refresh.
    async fn stale_status_error(
        &self,
        id: &TicketId,
    ) -> Result<WorkflowError, WorkflowError> {
        Ok(match self.tickets.find_by_id(id).await? {
            Some(ticket) => WorkflowError::InvalidState { status: ticket.status },
            None => WorkflowError::TicketNotFound(id.clone()),
        })
    }

    fn emit(&self, event: NotificationEvent) {
        if let Err(error) = self.notifier.notify(&event) {
            tracing::warn!(kind = ?event.kind, ticket = %event.ticket_id, %error,
                "notification delivery failed; transition stands");
        }
    }
}

fn level_name(level: ApprovalLevel) -> &'static str {
    match level {
        ApprovalLevel::LineManager => "line_manager",
        ApprovalLevel::HeadOfDepartment => "head_of_department",
    }
}
