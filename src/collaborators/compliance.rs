//! Rule-based compliance checks over a claim's bundles and audit trail.

use super::{Bundle, ComplianceCheck, ComplianceEngine, ComplianceReport, ComplianceStatus};
use crate::pipeline::{AuditAction, AuditEvent};
use std::collections::HashSet;

pub const PATIENT_IDENTIFIER_RULE: &str = "NRCES-ID-01";
pub const AUDIT_TRAIL_RULE: &str = "NRCES-AUDIT-01";
pub const SOURCE_TRACEABILITY_RULE: &str = "NRCES-IMM-01";

#[derive(Debug, Clone)]
pub struct RuleComplianceEngine {
    /// Actions that must appear in the audit log at evaluation time.
    pub required_audit_actions: Vec<AuditAction>,
}

impl Default for RuleComplianceEngine {
    fn default() -> Self {
        Self {
            required_audit_actions: vec![AuditAction::ConvertStarted],
        }
    }
}

fn status(pass: bool) -> ComplianceStatus {
    if pass {
        ComplianceStatus::Pass
    } else {
        ComplianceStatus::Fail
    }
}

fn first_identifier<'a>(bundle: &'a Bundle, kind: &'a str) -> Option<&'a str> {
    bundle
        .resources_of(kind)
        .next()
        .and_then(|r| r.pointer("/identifier/0/value"))
        .and_then(|v| v.as_str())
        .filter(|v| !v.is_empty())
}

impl RuleComplianceEngine {
    pub fn with_required_actions(actions: impl IntoIterator<Item = AuditAction>) -> Self {
        Self {
            required_audit_actions: actions.into_iter().collect(),
        }
    }

    fn identifier_policy(bundles: &[Bundle]) -> ComplianceCheck {
        let pass = bundles
            .iter()
            .all(|b| first_identifier(b, "Patient").is_some_and(|v| v != "UNKNOWN"));
        ComplianceCheck {
            rule_id: PATIENT_IDENTIFIER_RULE.to_string(),
            title: "Patient identifier policy".to_string(),
            status: status(pass),
        }
    }

    fn audit_policy(&self, audit_log: &[AuditEvent]) -> ComplianceCheck {
        let seen: HashSet<AuditAction> = audit_log.iter().map(|e| e.action).collect();
        let pass = self.required_audit_actions.iter().all(|a| seen.contains(a));
        ComplianceCheck {
            rule_id: AUDIT_TRAIL_RULE.to_string(),
            title: "Audit trail for core actions".to_string(),
            status: status(pass),
        }
    }

    fn source_traceability(bundles: &[Bundle]) -> ComplianceCheck {
        let pass = bundles
            .iter()
            .all(|b| first_identifier(b, "DocumentReference").is_some());
        ComplianceCheck {
            rule_id: SOURCE_TRACEABILITY_RULE.to_string(),
            title: "Immutable source traceability".to_string(),
            status: status(pass),
        }
    }
}

impl ComplianceEngine for RuleComplianceEngine {
    fn evaluate(&self, bundles: &[Bundle], audit_log: &[AuditEvent]) -> ComplianceReport {
        let checks = vec![
            Self::identifier_policy(bundles),
            self.audit_policy(audit_log),
            Self::source_traceability(bundles),
        ];
        let overall_status = status(checks.iter().all(|c| c.status == ComplianceStatus::Pass));
        ComplianceReport {
            overall_status,
            checks,
        }
    }
}
