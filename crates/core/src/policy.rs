use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::approval::ApprovalLevel;
use crate::domain::category::CategoryApprovalRule;

/// One gate the policy wants instantiated, in order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateSpec {
    pub level: ApprovalLevel,
    pub sequence: u32,
}

/// Pure decision function mapping a category rule and ticket amount to the
/// ordered list of approval gates. Deterministic for a given snapshot; never
/// touches storage.
#[derive(Clone, Copy, Debug, Default)]
pub struct ApprovalPolicy;

impl ApprovalPolicy {
    pub fn required_gates(
        &self,
        rule: &CategoryApprovalRule,
        amount: Option<Decimal>,
    ) -> Vec<GateSpec> {
        let hod_required = rule.requires_hod_approval
            && match rule.hod_approval_threshold {
                Some(threshold) => amount.is_some_and(|amount| amount > threshold),
                None => true,
            };

        // The HOD gate never stands alone: it always sits behind a line
        // manager gate.
        let lm_required = rule.requires_approval || hod_required;

        let mut gates = Vec::new();
        if lm_required {
            gates.push(GateSpec { level: ApprovalLevel::LineManager, sequence: 1 });
        }
        if hod_required {
            gates.push(GateSpec { level: ApprovalLevel::HeadOfDepartment, sequence: 2 });
        }
        gates
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{ApprovalPolicy, GateSpec};
    use crate::domain::approval::ApprovalLevel;
    use crate::domain::category::CategoryApprovalRule;

    fn gates(rule: &CategoryApprovalRule, amount: Option<Decimal>) -> Vec<GateSpec> {
        ApprovalPolicy.required_gates(rule, amount)
    }

    #[test]
    fn no_approval_required_yields_no_gates() {
        let rule = CategoryApprovalRule::default();
        assert!(gates(&rule, None).is_empty());
        assert!(gates(&rule, Some(Decimal::new(9_999_99, 2))).is_empty());
    }

    #[test]
    fn line_manager_only_when_category_requires_plain_approval() {
        let rule = CategoryApprovalRule { requires_approval: true, ..Default::default() };

        let gates = gates(&rule, None);
        assert_eq!(gates.len(), 1);
        assert_eq!(gates[0].level, ApprovalLevel::LineManager);
        assert_eq!(gates[0].sequence, 1);
    }

    #[test]
    fn hod_gate_added_when_amount_exceeds_threshold() {
        let rule = CategoryApprovalRule {
            requires_approval: true,
            requires_hod_approval: true,
            hod_approval_threshold: Some(Decimal::new(1_000_00, 2)),
        };

        let gates = gates(&rule, Some(Decimal::new(1_500_00, 2)));
        assert_eq!(
            gates,
            vec![
                GateSpec { level: ApprovalLevel::LineManager, sequence: 1 },
                GateSpec { level: ApprovalLevel::HeadOfDepartment, sequence: 2 },
            ]
        );
    }

    #[test]
    fn amount_at_or_below_threshold_skips_hod_gate() {
        let rule = CategoryApprovalRule {
            requires_approval: true,
            requires_hod_approval: true,
            hod_approval_threshold: Some(Decimal::new(1_000_00, 2)),
        };

        let at_threshold = gates(&rule, Some(Decimal::new(1_000_00, 2)));
        assert_eq!(at_threshold.len(), 1);
        assert_eq!(at_threshold[0].level, ApprovalLevel::LineManager);

        let no_amount = gates(&rule, None);
        assert_eq!(no_amount.len(), 1);
    }

    #[test]
    fn hod_without_threshold_applies_unconditionally() {
        let rule = CategoryApprovalRule {
            requires_approval: false,
            requires_hod_approval: true,
            hod_approval_threshold: None,
        };

        let gates = gates(&rule, None);
        assert_eq!(gates.len(), 2);
        assert_eq!(gates[0].level, ApprovalLevel::LineManager);
        assert_eq!(gates[1].level, ApprovalLevel::HeadOfDepartment);
    }

    #[test]
    fn hod_only_category_below_threshold_needs_no_gates() {
        let rule = CategoryApprovalRule {
            requires_approval: false,
            requires_hod_approval: true,
            hod_approval_threshold: Some(Decimal::new(500_00, 2)),
        };

        assert!(gates(&rule, Some(Decimal::new(100_00, 2))).is_empty());
    }
}
