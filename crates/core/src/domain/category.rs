use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Approval requirements configured on a ticket category.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryApprovalRule {
    pub requires_approval: bool,
    pub requires_hod_approval: bool,
    /// When set, the HOD gate only applies to tickets whose amount exceeds
    /// this value; when unset, HOD approval applies unconditionally.
    pub hod_approval_threshold: Option<Decimal>,
}
