use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use deskflow_core::domain::ticket::{
    CategoryId, TeamId, Ticket, TicketId, TicketPriority, TicketStatus, UserId,
};
use deskflow_core::ports::{StorageError, TicketRepository};

use super::{decode_error, storage_error};
use crate::DbPool;

pub struct SqlTicketRepository {
    pool: DbPool,
}

impl SqlTicketRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_status(s: &str) -> TicketStatus {
    match s {
        "pending_approval" => TicketStatus::PendingApproval,
        "assigned" => TicketStatus::Assigned,
        "in_progress" => TicketStatus::InProgress,
        "resolved" => TicketStatus::Resolved,
        "closed" => TicketStatus::Closed,
        "cancelled" => TicketStatus::Cancelled,
        _ => TicketStatus::Open,
    }
}

pub fn ticket_status_as_str(status: &TicketStatus) -> &'static str {
    match status {
        TicketStatus::Open => "open",
        TicketStatus::PendingApproval => "pending_approval",
        TicketStatus::Assigned => "assigned",
        TicketStatus::InProgress => "in_progress",
        TicketStatus::Resolved => "resolved",
        TicketStatus::Closed => "closed",
        TicketStatus::Cancelled => "cancelled",
    }
}

fn parse_priority(s: &str) -> TicketPriority {
    match s {
        "low" => TicketPriority::Low,
        "high" => TicketPriority::High,
        "urgent" => TicketPriority::Urgent,
        _ => TicketPriority::Medium,
    }
}

pub fn ticket_priority_as_str(priority: &TicketPriority) -> &'static str {
    match priority {
        TicketPriority::Low => "low",
        TicketPriority::Medium => "medium",
        TicketPriority::High => "high",
        TicketPriority::Urgent => "urgent",
    }
}

fn row_to_ticket(row: &sqlx::sqlite::SqliteRow) -> Result<Ticket, StorageError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let subject: String = row.try_get("subject").map_err(decode_error)?;
    let status_str: String = row.try_get("status").map_err(decode_error)?;
    let priority_str: String = row.try_get("priority").map_err(decode_error)?;
    let category_id: String = row.try_get("category_id").map_err(decode_error)?;
    let requester: String = row.try_get("requester_user_id").map_err(decode_error)?;
    let assigned_team: Option<String> =
        row.try_get("assigned_team_id").map_err(decode_error)?;
    let amount_str: Option<String> = row.try_get("amount").map_err(decode_error)?;
    let created_at_str: String = row.try_get("created_at").map_err(decode_error)?;
    let updated_at_str: String = row.try_get("updated_at").map_err(decode_error)?;

    let amount = match amount_str {
        Some(raw) => Some(
            raw.parse::<Decimal>()
                .map_err(|e| StorageError::Decode(format!("ticket amount: {e}")))?,
        ),
        None => None,
    };
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());
    let updated_at = DateTime::parse_from_rfc3339(&updated_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(Ticket {
        id: TicketId(id),
        subject,
        status: parse_status(&status_str),
        priority: parse_priority(&priority_str),
        category_id: CategoryId(category_id),
        requester: UserId(requester),
        assigned_team: assigned_team.map(TeamId),
        amount,
        created_at,
        updated_at,
    })
}

#[async_trait::async_trait]
impl TicketRepository for SqlTicketRepository {
    async fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>, StorageError> {
        let row = sqlx::query(
            "SELECT id, subject, status, priority, category_id, requester_user_id,
                    assigned_team_id, amount, created_at, updated_at
             FROM ticket WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        match row {
            Some(ref r) => Ok(Some(row_to_ticket(r)?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, ticket: Ticket) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO ticket (id, subject, status, priority, category_id,
                                 requester_user_id, assigned_team_id, amount,
                                 created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&ticket.id.0)
        .bind(&ticket.subject)
        .bind(ticket_status_as_str(&ticket.status))
        .bind(ticket_priority_as_str(&ticket.priority))
        .bind(&ticket.category_id.0)
        .bind(&ticket.requester.0)
        .bind(ticket.assigned_team.as_ref().map(|team| team.0.clone()))
        .bind(ticket.amount.map(|amount| amount.to_string()))
        .bind(ticket.created_at.to_rfc3339())
        .bind(ticket.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(())
    }

    async fn update_status_if(
        &self,
        id: &TicketId,
        expected: TicketStatus,
        next: TicketStatus,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE ticket SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(ticket_status_as_str(&next))
        .bind(Utc::now().to_rfc3339())
        .bind(&id.0)
        .bind(ticket_status_as_str(&expected))
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(result.rows_affected() == 1)
    }
}
