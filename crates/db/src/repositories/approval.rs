use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};

use deskflow_core::domain::approval::{
    ApprovalDecision, ApprovalLevel, ApprovalRecord, ApprovalRecordId, ApprovalStatus, Approver,
    Capability,
};
use deskflow_core::domain::ticket::{TeamId, TicketId, TicketStatus, UserId};
use deskflow_core::ports::{ApprovalRepository, StorageError, TransitionOutcome};

use super::ticket::ticket_status_as_str;
use super::{decode_error, storage_error};
use crate::DbPool;

pub struct SqlApprovalRepository {
    pool: DbPool,
}

impl SqlApprovalRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_status(s: &str) -> ApprovalStatus {
    match s {
        "approved" => ApprovalStatus::Approved,
        "rejected" => ApprovalStatus::Rejected,
        _ => ApprovalStatus::Pending,
    }
}

pub fn approval_status_as_str(status: &ApprovalStatus) -> &'static str {
    match status {
        ApprovalStatus::Pending => "pending",
        ApprovalStatus::Approved => "approved",
        ApprovalStatus::Rejected => "rejected",
    }
}

fn parse_level(s: &str) -> Result<ApprovalLevel, StorageError> {
    match s {
        "line_manager" => Ok(ApprovalLevel::LineManager),
        "head_of_department" => Ok(ApprovalLevel::HeadOfDepartment),
        other => Err(StorageError::Decode(format!("unknown approval level `{other}`"))),
    }
}

pub fn approval_level_as_str(level: &ApprovalLevel) -> &'static str {
    match level {
        ApprovalLevel::LineManager => "line_manager",
        ApprovalLevel::HeadOfDepartment => "head_of_department",
    }
}

pub fn parse_capability(s: &str) -> Result<Capability, StorageError> {
    match s {
        "decide_approvals" => Ok(Capability::DecideApprovals),
        "override_approvals" => Ok(Capability::OverrideApprovals),
        other => Err(StorageError::Decode(format!("unknown capability `{other}`"))),
    }
}

pub fn capability_as_str(capability: &Capability) -> &'static str {
    match capability {
        Capability::DecideApprovals => "decide_approvals",
        Capability::OverrideApprovals => "override_approvals",
    }
}

const RECORD_COLUMNS: &str = "id, ticket_id, pass, sequence, level, status, approver_user_id,
     required_capability, comments, routed_to_team_id, approved_at, rejected_at, created_at";

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovalRecord, StorageError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let ticket_id: String = row.try_get("ticket_id").map_err(decode_error)?;
    let pass: i64 = row.try_get("pass").map_err(decode_error)?;
    let sequence: i64 = row.try_get("sequence").map_err(decode_error)?;
    let level_str: String = row.try_get("level").map_err(decode_error)?;
    let status_str: String = row.try_get("status").map_err(decode_error)?;
    let approver_user_id: Option<String> =
        row.try_get("approver_user_id").map_err(decode_error)?;
    let required_capability: Option<String> =
        row.try_get("required_capability").map_err(decode_error)?;
    let comments: Option<String> = row.try_get("comments").map_err(decode_error)?;
    let routed_to_team_id: Option<String> =
        row.try_get("routed_to_team_id").map_err(decode_error)?;
    let approved_at_str: Option<String> = row.try_get("approved_at").map_err(decode_error)?;
    let rejected_at_str: Option<String> = row.try_get("rejected_at").map_err(decode_error)?;
    let created_at_str: String = row.try_get("created_at").map_err(decode_error)?;

    let approver = match (approver_user_id, required_capability) {
        (Some(user_id), None) => Approver::Specific { user_id: UserId(user_id) },
        (None, Some(capability)) => {
            Approver::AnyWithCapability { capability: parse_capability(&capability)? }
        }
        _ => {
            return Err(StorageError::Decode(
                "approval record must target a user or a capability".to_string(),
            ))
        }
    };

    let approved_at = approved_at_str
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc));
    let rejected_at = rejected_at_str
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc));
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(ApprovalRecord {
        id: ApprovalRecordId(id),
        ticket_id: TicketId(ticket_id),
        pass: pass as u32,
        sequence: sequence as u32,
        level: parse_level(&level_str)?,
        status: parse_status(&status_str),
        approver,
        comments,
        routed_to_team: routed_to_team_id.map(TeamId),
        approved_at,
        rejected_at,
        created_at,
    })
}

/// The partial unique index on pending records refuses a second open gate
/// for the same ticket; inside a transaction that failure rolls back every
/// write made alongside it.
async fn insert_record(
    conn: &mut SqliteConnection,
    record: &ApprovalRecord,
) -> Result<(), StorageError> {
    let (approver_user_id, required_capability) = match &record.approver {
        Approver::Specific { user_id } => (Some(user_id.0.as_str()), None),
        Approver::AnyWithCapability { capability } => {
            (None, Some(capability_as_str(capability)))
        }
    };

    sqlx::query(
        "INSERT INTO approval_record (id, ticket_id, pass, sequence, level, status,
                                      approver_user_id, required_capability, comments,
                                      routed_to_team_id, approved_at, rejected_at, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&record.id.0)
    .bind(&record.ticket_id.0)
    .bind(record.pass as i64)
    .bind(record.sequence as i64)
    .bind(approval_level_as_str(&record.level))
    .bind(approval_status_as_str(&record.status))
    .bind(approver_user_id)
    .bind(required_capability)
    .bind(&record.comments)
    .bind(record.routed_to_team.as_ref().map(|team| team.0.clone()))
    .bind(record.approved_at.map(|dt| dt.to_rfc3339()))
    .bind(record.rejected_at.map(|dt| dt.to_rfc3339()))
    .bind(record.created_at.to_rfc3339())
    .execute(&mut *conn)
    .await
    .map_err(storage_error)?;

    Ok(())
}

/// Guarded decision write; only a still-pending row is touched.
async fn apply_decision(
    conn: &mut SqliteConnection,
    id: &ApprovalRecordId,
    decision: &ApprovalDecision,
) -> Result<bool, StorageError> {
    let decided_at = decision.decided_at.to_rfc3339();
    let (approved_at, rejected_at) = match decision.status {
        ApprovalStatus::Approved => (Some(decided_at), None),
        ApprovalStatus::Rejected => (None, Some(decided_at)),
        ApprovalStatus::Pending => {
            return Err(StorageError::Constraint(
                "a decision cannot leave the record pending".to_string(),
            ))
        }
    };

    let result = sqlx::query(
        "UPDATE approval_record
         SET status = ?, comments = ?, routed_to_team_id = ?,
             approved_at = ?, rejected_at = ?
         WHERE id = ? AND status = 'pending'",
    )
    .bind(approval_status_as_str(&decision.status))
    .bind(&decision.comments)
    .bind(decision.routed_to_team.as_ref().map(|team| team.0.clone()))
    .bind(approved_at)
    .bind(rejected_at)
    .bind(&id.0)
    .execute(&mut *conn)
    .await
    .map_err(storage_error)?;

    Ok(result.rows_affected() == 1)
}

/// Guarded ticket status write, mirroring `TicketRepository::update_status_if`
/// but usable inside an approval transaction.
async fn transition_ticket(
    conn: &mut SqliteConnection,
    ticket_id: &TicketId,
    expected: TicketStatus,
    next: TicketStatus,
) -> Result<bool, StorageError> {
    let result = sqlx::query(
        "UPDATE ticket SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
    )
    .bind(ticket_status_as_str(&next))
    .bind(Utc::now().to_rfc3339())
    .bind(&ticket_id.0)
    .bind(ticket_status_as_str(&expected))
    .execute(&mut *conn)
    .await
    .map_err(storage_error)?;

    Ok(result.rows_affected() == 1)
}

#[async_trait::async_trait]
impl ApprovalRepository for SqlApprovalRepository {
    async fn find_by_id(
        &self,
        id: &ApprovalRecordId,
    ) -> Result<Option<ApprovalRecord>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM approval_record WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        match row {
            Some(ref r) => Ok(Some(row_to_record(r)?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, record: ApprovalRecord) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire().await.map_err(storage_error)?;
        insert_record(&mut conn, &record).await
    }

    async fn open_pass(
        &self,
        record: ApprovalRecord,
        expected: TicketStatus,
        next: TicketStatus,
    ) -> Result<bool, StorageError> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        if !transition_ticket(&mut tx, &record.ticket_id, expected, next).await? {
            return Ok(false);
        }
        insert_record(&mut tx, &record).await?;
        tx.commit().await.map_err(storage_error)?;
        Ok(true)
    }

    async fn decide_and_open_next(
        &self,
        id: &ApprovalRecordId,
        decision: &ApprovalDecision,
        next_record: ApprovalRecord,
    ) -> Result<bool, StorageError> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        if !apply_decision(&mut tx, id, decision).await? {
            return Ok(false);
        }
        insert_record(&mut tx, &next_record).await?;
        tx.commit().await.map_err(storage_error)?;
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
        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        if !apply_decision(&mut tx, id, decision).await? {
            return Ok(TransitionOutcome::RecordNotPending);
        }
        if !transition_ticket(&mut tx, ticket_id, expected, next).await? {
            return Ok(TransitionOutcome::TicketStale);
        }
        if let Some(team) = routed_to_team {
            sqlx::query(
                "UPDATE ticket SET assigned_team_id = ?, updated_at = ? WHERE id = ?",
            )
            .bind(&team.0)
            .bind(Utc::now().to_rfc3339())
            .bind(&ticket_id.0)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        }
        tx.commit().await.map_err(storage_error)?;
        Ok(TransitionOutcome::Applied)
    }

    async fn current_pending(
        &self,
        ticket_id: &TicketId,
    ) -> Result<Option<ApprovalRecord>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM approval_record
             WHERE ticket_id = ? AND status = 'pending'"
        ))
        .bind(&ticket_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        match row {
            Some(ref r) => Ok(Some(row_to_record(r)?)),
            None => Ok(None),
        }
    }

    async fn latest_rejected(
        &self,
        ticket_id: &TicketId,
    ) -> Result<Option<ApprovalRecord>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM approval_record
             WHERE ticket_id = ? AND status = 'rejected'
             ORDER BY rejected_at DESC LIMIT 1"
        ))
        .bind(&ticket_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        match row {
            Some(ref r) => Ok(Some(row_to_record(r)?)),
            None => Ok(None),
        }
    }

    async fn rejected_count(&self, ticket_id: &TicketId) -> Result<u32, StorageError> {
        let count: i64 = sqlx::query(
            "SELECT COUNT(*) AS count FROM approval_record
             WHERE ticket_id = ? AND status = 'rejected'",
        )
        .bind(&ticket_id.0)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)?
        .try_get("count")
        .map_err(decode_error)?;

        Ok(count as u32)
    }

    async fn latest_pass(&self, ticket_id: &TicketId) -> Result<u32, StorageError> {
        let pass: i64 = sqlx::query(
            "SELECT IFNULL(MAX(pass), 0) AS pass FROM approval_record WHERE ticket_id = ?",
        )
        .bind(&ticket_id.0)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)?
        .try_get("pass")
        .map_err(decode_error)?;

        Ok(pass as u32)
    }

    async fn list_pending(&self) -> Result<Vec<ApprovalRecord>, StorageError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM approval_record
             WHERE status = 'pending' ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.iter().map(row_to_record).collect::<Result<Vec<_>, _>>()
    }
}
