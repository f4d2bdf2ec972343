//! Approval sub-state of an inbound order.
//!
//! The gate runs alongside the order's main lifecycle: an order can be
//! reviewed while still in draft or after confirmation, and executing it
//! requires both `confirmed` and an approved gate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{DomainError, DomainResult, EmployeeId, ValueObject};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

/// Reviewer's verdict. There is no way to ask for `pending` again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}

impl From<ApprovalDecision> for ApprovalStatus {
    fn from(value: ApprovalDecision) -> Self {
        match value {
            ApprovalDecision::Approved => ApprovalStatus::Approved,
            ApprovalDecision::Rejected => ApprovalStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApprovalGate {
    status: ApprovalStatus,
    reviewer_id: Option<EmployeeId>,
    comment: Option<String>,
    decided_at: Option<DateTime<Utc>>,
}

impl ValueObject for ApprovalGate {}

impl ApprovalGate {
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn status(&self) -> ApprovalStatus {
        self.status
    }

    pub fn reviewer_id(&self) -> Option<EmployeeId> {
        self.reviewer_id
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn decided_at(&self) -> Option<DateTime<Utc>> {
        self.decided_at
    }

    pub fn is_approved(&self) -> bool {
        self.status == ApprovalStatus::Approved
    }

    /// `pending` and `rejected` gates accept a decision; `approved` is final.
    pub fn accepts_decision(&self) -> bool {
        matches!(self.status, ApprovalStatus::Pending | ApprovalStatus::Rejected)
    }

    /// Produce the gate that results from a review.
    pub fn decide(
        &self,
        decision: ApprovalDecision,
        reviewer_id: Option<EmployeeId>,
        comment: Option<String>,
        decided_at: DateTime<Utc>,
    ) -> DomainResult<ApprovalGate> {
        if !self.accepts_decision() {
            return Err(DomainError::invalid_transition(
                "approval already granted and cannot be changed",
            ));
        }
        let comment = comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());

        Ok(ApprovalGate {
            status: decision.into(),
            reviewer_id,
            comment,
            decided_at: Some(decided_at),
        })
    }
}
