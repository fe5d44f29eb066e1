use std::sync::Arc;

use serde::Serialize;

use deskflow_core::config::AppConfig;
use deskflow_core::domain::approval::{ApprovalRecord, ApprovalRecordId};
use deskflow_core::domain::ticket::{TeamId, Ticket, TicketId, UserId};
use deskflow_core::errors::{ErrorClass, WorkflowError};
use deskflow_core::ports::TracingNotificationSink;
use deskflow_core::workflow::ApprovalWorkflowService;
use deskflow_db::{
    DbPool, SqlApprovalRepository, SqlCategoryRepository, SqlTicketRepository, SqlUserDirectory,
};

use crate::commands::{self, CommandFailure, CommandResult};

type Service = ApprovalWorkflowService<
    SqlApprovalRepository,
    SqlTicketRepository,
    SqlUserDirectory,
    SqlCategoryRepository,
    TracingNotificationSink,
>;

pub fn show(ticket: String) -> CommandResult {
    execute("show", move |service| async move {
        let ticket_id = TicketId(ticket);
        let view = TicketView {
            ticket: service.ticket(&ticket_id).await?,
            current_approval: service.current_approval(&ticket_id).await?,
            rejected_approval: service.rejected_approval(&ticket_id).await?,
        };
        Ok(render(&view))
    })
}

pub fn initiate(ticket: String) -> CommandResult {
    execute("initiate", move |service| async move {
        match service.initiate(&TicketId(ticket)).await? {
            Some(record) => Ok(render(&record)),
            None => Ok("no approval required; ticket remains actionable".to_string()),
        }
    })
}

pub fn pending(user: String) -> CommandResult {
    execute("pending", move |service| async move {
        let records = service.pending_approvals_for(&UserId(user)).await?;
        Ok(render(&records))
    })
}

pub fn approve(
    record: String,
    user: String,
    comments: Option<String>,
    route_to: Option<String>,
) -> CommandResult {
    execute("approve", move |service| async move {
        let decided = service
            .approve(
                &ApprovalRecordId(record),
                &UserId(user),
                comments,
                route_to.map(TeamId),
            )
            .await?;
        Ok(render(&decided))
    })
}

pub fn reject(record: String, user: String, comments: String) -> CommandResult {
    execute("reject", move |service| async move {
        let decided =
            service.reject(&ApprovalRecordId(record), &UserId(user), &comments).await?;
        Ok(render(&decided))
    })
}

pub fn resubmit(ticket: String, user: String) -> CommandResult {
    execute("resubmit", move |service| async move {
        let reopened = service.resubmit(&TicketId(ticket), &UserId(user)).await?;
        Ok(render(&reopened))
    })
}

#[derive(Serialize)]
struct TicketView {
    ticket: Ticket,
    current_approval: Option<ApprovalRecord>,
    rejected_approval: Option<ApprovalRecord>,
}

fn render<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|error| format!("<unrenderable payload: {error}>"))
}

fn class_name(class: ErrorClass) -> &'static str {
    match class {
        ErrorClass::Forbidden => "forbidden",
        ErrorClass::Conflict => "conflict",
        ErrorClass::Unprocessable => "unprocessable",
        ErrorClass::NotFound => "not_found",
        ErrorClass::Unavailable => "unavailable",
    }
}

fn build_service(config: &AppConfig, pool: &DbPool) -> Service {
    ApprovalWorkflowService::new(
        Arc::new(SqlApprovalRepository::new(pool.clone())),
        Arc::new(SqlTicketRepository::new(pool.clone())),
        Arc::new(SqlUserDirectory::new(pool.clone())),
        Arc::new(SqlCategoryRepository::new(pool.clone())),
        Arc::new(TracingNotificationSink),
    )
    .with_guard(config.resubmission_guard())
}

fn execute<F, Fut>(command: &'static str, op: F) -> CommandResult
where
    F: FnOnce(Service) -> Fut,
    Fut: std::future::Future<Output = Result<String, WorkflowError>>,
{
    let result = (|| {
        let config = commands::load_config()?;
        let runtime = commands::build_runtime()?;

        runtime.block_on(async {
            let pool = commands::open_pool(&config).await?;
            let outcome = op(build_service(&config, &pool)).await;
            pool.close().await;
            outcome.map_err(|error| {
                CommandFailure::new(class_name(error.class()), error.to_string(), 5)
            })
        })
    })();

    match result {
        Ok(message) => CommandResult::success(command, message),
        Err(failure) => CommandResult::failure(command, failure),
    }
}
