pub mod config;
pub mod domain;
pub mod errors;
pub mod policy;
pub mod ports;
pub mod workflow;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use domain::approval::{
    ApprovalDecision, ApprovalLevel, ApprovalRecord, ApprovalRecordId, ApprovalStatus, Approver,
    Capability,
};
pub use domain::category::CategoryApprovalRule;
pub use domain::ticket::{
    CategoryId, DepartmentId, TeamId, Ticket, TicketId, TicketPriority, TicketStatus, UserId,
};
pub use errors::{ErrorClass, WorkflowError};
pub use policy::{ApprovalPolicy, GateSpec};
pub use ports::{
    ApprovalRepository, CategoryPolicyLookup, NotificationEvent, NotificationKind,
    NotificationSink, StorageError, TicketRepository, TracingNotificationSink,
    TransitionOutcome, UserDirectory,
};
pub use workflow::{ApprovalWorkflowService, ResubmissionGuard, TicketStatusProjector, WorkflowEvent};
