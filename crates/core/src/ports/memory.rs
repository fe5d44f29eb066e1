use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::RwLock;

use crate::domain::approval::{
    ApprovalDecision, ApprovalRecord, ApprovalRecordId, ApprovalStatus, Capability,
};
use crate::domain::category::CategoryApprovalRule;
use crate::domain::ticket::{
    CategoryId, DepartmentId, TeamId, Ticket, TicketId, TicketStatus, UserId,
};
use crate::ports::{
    ApprovalRepository, CategoryPolicyLookup, NotificationEvent, NotificationSink, StorageError,
    TicketRepository, TransitionOutcome, UserDirectory,
};

/// Tickets and approval records share one lock so the combined writes on
/// [`ApprovalRepository`] are atomic, matching what a database transaction
/// gives the SQL implementations.
#[derive(Debug, Default)]
struct WorkflowState {
    tickets: HashMap<String, Ticket>,
    records: HashMap<String, ApprovalRecord>,
}

impl WorkflowState {
    fn transition_ticket(
        &mut self,
        id: &TicketId,
        expected: TicketStatus,
        next: TicketStatus,
    ) -> bool {
        match self.tickets.get_mut(&id.0) {
            Some(ticket) if ticket.status == expected => {
                ticket.status = next;
                ticket.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }

    fn apply_decision(&mut self, id: &ApprovalRecordId, decision: &ApprovalDecision) -> bool {
        match self.records.get_mut(&id.0) {
            Some(record) if record.is_pending() => {
                *record = record.clone().with_decision(decision);
                true
            }
            _ => false,
        }
    }

    fn insert_record(&mut self, record: ApprovalRecord) -> Result<(), StorageError> {
        let already_pending = self
            .records
            .values()
            .any(|existing| existing.ticket_id == record.ticket_id && existing.is_pending());
        if already_pending {
            return Err(StorageError::Constraint(format!(
                "ticket {} already has a pending approval record",
                record.ticket_id
            )));
        }
        self.records.insert(record.id.0.clone(), record);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryTicketRepository {
    state: Arc<RwLock<WorkflowState>>,
}

#[async_trait::async_trait]
impl TicketRepository for InMemoryTicketRepository {
    async fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>, StorageError> {
        let state = self.state.read().await;
        Ok(state.tickets.get(&id.0).cloned())
    }

    async fn insert(&self, ticket: Ticket) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        state.tickets.insert(ticket.id.0.clone(), ticket);
        Ok(())
    }

    async fn update_status_if(
        &self,
        id: &TicketId,
        expected: TicketStatus,
        next: TicketStatus,
    ) -> Result<bool, StorageError> {
        let mut state = self.state.write().await;
        Ok(state.transition_ticket(id, expected, next))
    }
}

#[derive(Clone, Default)]
pub struct InMemoryApprovalRepository {
    state: Arc<RwLock<WorkflowState>>,
}

impl InMemoryApprovalRepository {
    /// Share storage with a ticket repository so the combined writes see
    /// and mutate the same tickets.
    pub fn linked_to(tickets: &InMemoryTicketRepository) -> Self {
        Self { state: tickets.state.clone() }
    }
}

#[async_trait::async_trait]
impl ApprovalRepository for InMemoryApprovalRepository {
    async fn find_by_id(
        &self,
        id: &ApprovalRecordId,
    ) -> Result<Option<ApprovalRecord>, StorageError> {
        let state = self.state.read().await;
        Ok(state.records.get(&id.0).cloned())
    }

    async fn insert(&self, record: ApprovalRecord) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        state.insert_record(record)
    }

    async fn open_pass(
        &self,
        record: ApprovalRecord,
        expected: TicketStatus,
        next: TicketStatus,
    ) -> Result<bool, StorageError> {
        let mut state = self.state.write().await;
        let pending_exists = state
            .records
            .values()
            .any(|existing| existing.ticket_id == record.ticket_id && existing.is_pending());
        if pending_exists {
            return Err(StorageError::Constraint(format!(
                "ticket {} already has a pending approval record",
                record.ticket_id
            )));
        }
        if !state.transition_ticket(&record.ticket_id, expected, next) {
            return Ok(false);
        }
        state.records.insert(record.id.0.clone(), record);
        Ok(true)
    }

    async fn decide_and_open_next(
        &self,
        id: &ApprovalRecordId,
        decision: &ApprovalDecision,
        next_record: ApprovalRecord,
    ) -> Result<bool, StorageError> {
        let mut state = self.state.write().await;
        if !state.apply_decision(id, decision) {
            return Ok(false);
        }
        state.insert_record(next_record)?;
        Ok(true)
    }

    async fn decide_and_transition(
        &self,
        id: &ApprovalRecordId,
        decision: &ApprovalDecision,
        ticket_id: &TicketId,
        expected: TicketStatus,
        next: TicketStatus,
        routed_to_team: Option<&TeamId>,
    ) -> Result<TransitionOutcome, StorageError> {
        let mut state = self.state.write().await;
        let pending = state.records.get(&id.0).is_some_and(ApprovalRecord::is_pending);
        if !pending {
            return Ok(TransitionOutcome::RecordNotPending);
        }
        if !state.transition_ticket(ticket_id, expected, next) {
            return Ok(TransitionOutcome::TicketStale);
        }
        if let Some(team) = routed_to_team {
            if let Some(ticket) = state.tickets.get_mut(&ticket_id.0) {
                ticket.assigned_team = Some(team.clone());
            }
        }
        state.apply_decision(id, decision);
        Ok(TransitionOutcome::Applied)
    }

    async fn current_pending(
        &self,
        ticket_id: &TicketId,
    ) -> Result<Option<ApprovalRecord>, StorageError> {
        let state = self.state.read().await;
        Ok(state
            .records
            .values()
            .find(|record| record.ticket_id == *ticket_id && record.is_pending())
            .cloned())
    }

    async fn latest_rejected(
        &self,
        ticket_id: &TicketId,
    ) -> Result<Option<ApprovalRecord>, StorageError> {
        let state = self.state.read().await;
        Ok(state
            .records
            .values()
            .filter(|record| {
                record.ticket_id == *ticket_id && record.status == ApprovalStatus::Rejected
            })
            .max_by_key(|record| record.rejected_at)
            .cloned())
    }

    async fn rejected_count(&self, ticket_id: &TicketId) -> Result<u32, StorageError> {
        let state = self.state.read().await;
        let count = state
            .records
            .values()
            .filter(|record| {
                record.ticket_id == *ticket_id && record.status == ApprovalStatus::Rejected
            })
            .count();
        Ok(count as u32)
    }

    async fn latest_pass(&self, ticket_id: &TicketId) -> Result<u32, StorageError> {
        let state = self.state.read().await;
        Ok(state
            .records
            .values()
            .filter(|record| record.ticket_id == *ticket_id)
            .map(|record| record.pass)
            .max()
            .unwrap_or(0))
    }

    async fn list_pending(&self) -> Result<Vec<ApprovalRecord>, StorageError> {
        let state = self.state.read().await;
        let mut pending: Vec<ApprovalRecord> =
            state.records.values().filter(|record| record.is_pending()).cloned().collect();
        pending.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        Ok(pending)
    }
}

/// Static org chart for tests and demos; built once, read concurrently.
#[derive(Clone, Debug, Default)]
pub struct InMemoryUserDirectory {
    managers: HashMap<String, UserId>,
    departments: HashMap<String, DepartmentId>,
    department_heads: HashMap<String, UserId>,
    capabilities: HashMap<String, HashSet<Capability>>,
}

impl InMemoryUserDirectory {
    pub fn with_manager(mut self, user: &str, manager: &str) -> Self {
        self.managers.insert(user.to_string(), UserId(manager.to_string()));
        self
    }

    pub fn with_department(mut self, user: &str, department: &str) -> Self {
        self.departments.insert(user.to_string(), DepartmentId(department.to_string()));
        self
    }

    pub fn with_department_head(mut self, department: &str, head: &str) -> Self {
        self.department_heads.insert(department.to_string(), UserId(head.to_string()));
        self
    }

    pub fn with_capability(mut self, user: &str, capability: Capability) -> Self {
        self.capabilities.entry(user.to_string()).or_default().insert(capability);
        self
    }
}

#[async_trait::async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn reporting_manager_of(&self, user: &UserId) -> Result<Option<UserId>, StorageError> {
        Ok(self.managers.get(&user.0).cloned())
    }

    async fn department_of(&self, user: &UserId) -> Result<Option<DepartmentId>, StorageError> {
        Ok(self.departments.get(&user.0).cloned())
    }

    async fn department_head_of(
        &self,
        department: &DepartmentId,
    ) -> Result<Option<UserId>, StorageError> {
        Ok(self.department_heads.get(&department.0).cloned())
    }

    async fn has_capability(
        &self,
        user: &UserId,
        capability: Capability,
    ) -> Result<bool, StorageError> {
        Ok(self
            .capabilities
            .get(&user.0)
            .is_some_and(|capabilities| capabilities.contains(&capability)))
    }
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryCategoryPolicies {
    rules: HashMap<String, CategoryApprovalRule>,
}

impl InMemoryCategoryPolicies {
    pub fn with_rule(mut self, category: &str, rule: CategoryApprovalRule) -> Self {
        self.rules.insert(category.to_string(), rule);
        self
    }
}

#[async_trait::async_trait]
impl CategoryPolicyLookup for InMemoryCategoryPolicies {
    async fn approval_rule(
        &self,
        category: &CategoryId,
    ) -> Result<Option<CategoryApprovalRule>, StorageError> {
        Ok(self.rules.get(&category.0).cloned())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryNotificationSink {
    events: Arc<Mutex<Vec<NotificationEvent>>>,
}

impl InMemoryNotificationSink {
    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }
}

impl NotificationSink for InMemoryNotificationSink {
    fn notify(&self, event: &NotificationEvent) -> Result<(), String> {
        self.events
            .lock()
            .map(|mut events| events.push(event.clone()))
            .map_err(|_| "notification sink poisoned".to_string())
    }
}

/// Always fails delivery; used to verify transitions survive sink outages.
#[derive(Clone, Copy, Debug, Default)]
pub struct FailingNotificationSink;

impl NotificationSink for FailingNotificationSink {
    fn notify(&self, _event: &NotificationEvent) -> Result<(), String> {
        Err("delivery channel unavailable".to_string())
    }
}
