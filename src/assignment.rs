use crate::catalog::{ResourceId, UnknownVariant};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentStatus {
    Assigned,
    Deployed,
    Active,
    Completed,
    Cancelled,
    Failed,
}

impl AssignmentStatus {
    pub const ALL: [AssignmentStatus; 6] = [
        AssignmentStatus::Assigned,
        AssignmentStatus::Deployed,
        AssignmentStatus::Active,
        AssignmentStatus::Completed,
        AssignmentStatus::Cancelled,
        AssignmentStatus::Failed,
    ];

    pub const OPEN: [AssignmentStatus; 3] = [
        AssignmentStatus::Assigned,
        AssignmentStatus::Deployed,
        AssignmentStatus::Active,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Assigned => "ASSIGNED",
            AssignmentStatus::Deployed => "DEPLOYED",
            AssignmentStatus::Active => "ACTIVE",
            AssignmentStatus::Completed => "COMPLETED",
            AssignmentStatus::Cancelled => "CANCELLED",
            AssignmentStatus::Failed => "FAILED",
        }
    }

    pub fn is_open(&self) -> bool {
        Self::OPEN.contains(self)
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssignmentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| UnknownVariant {
                kind: "assignment status",
                value: s.to_string(),
            })
    }
}

/// Ledger entry for one resource-to-incident commitment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceAssignment {
    pub id: i64,
    pub resource_id: ResourceId,
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_by: Option<String>,
    pub status: AssignmentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub assigned_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ResourceAssignment {
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAssignment {
    pub resource_id: ResourceId,
    pub conversation_id: String,
    pub assigned_by: Option<String>,
    pub notes: Option<String>,
    pub assigned_at: DateTime<Utc>,
}

impl NewAssignment {
    pub fn new(
        resource_id: ResourceId,
        conversation_id: impl Into<String>,
        assigned_at: DateTime<Utc>,
    ) -> Self {
        Self {
            resource_id,
            conversation_id: conversation_id.into(),
            assigned_by: None,
            notes: None,
            assigned_at,
        }
    }
}
