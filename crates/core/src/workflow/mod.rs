pub mod guard;
pub mod projector;
pub mod service;

pub use guard::ResubmissionGuard;
pub use projector::{TicketStatusProjector, WorkflowEvent};
pub use service::ApprovalWorkflowService;
