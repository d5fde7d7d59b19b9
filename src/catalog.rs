use crate::distance::Coordinates;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type ResourceId = i64;

/// Raised when a category or status label does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceCategory {
    Personnel,
    Vehicle,
    Equipment,
    Facility,
    Supply,
}

impl ResourceCategory {
    pub const ALL: [ResourceCategory; 5] = [
        ResourceCategory::Personnel,
        ResourceCategory::Vehicle,
        ResourceCategory::Equipment,
        ResourceCategory::Facility,
        ResourceCategory::Supply,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceCategory::Personnel => "PERSONNEL",
            ResourceCategory::Vehicle => "VEHICLE",
            ResourceCategory::Equipment => "EQUIPMENT",
            ResourceCategory::Facility => "FACILITY",
            ResourceCategory::Supply => "SUPPLY",
        }
    }
}

impl fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceCategory {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == normalized)
            .ok_or_else(|| UnknownVariant {
                kind: "resource category",
                value: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceStatus {
    Available,
    Assigned,
    InUse,
    Maintenance,
    OutOfService,
}

impl ResourceStatus {
    pub const ALL: [ResourceStatus; 5] = [
        ResourceStatus::Available,
        ResourceStatus::Assigned,
        ResourceStatus::InUse,
        ResourceStatus::Maintenance,
        ResourceStatus::OutOfService,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Available => "AVAILABLE",
            ResourceStatus::Assigned => "ASSIGNED",
            ResourceStatus::InUse => "IN_USE",
            ResourceStatus::Maintenance => "MAINTENANCE",
            ResourceStatus::OutOfService => "OUT_OF_SERVICE",
        }
    }

    /// Statuses that only exist while an incident binding is held.
    pub fn requires_binding(&self) -> bool {
        matches!(self, ResourceStatus::Assigned | ResourceStatus::InUse)
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| UnknownVariant {
                kind: "resource status",
                value: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceType {
    pub id: i64,
    pub name: String,
    pub category: ResourceCategory,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewResourceType {
    pub name: String,
    pub category: ResourceCategory,
    #[serde(default)]
    pub description: String,
}

impl NewResourceType {
    pub fn new(
        name: impl Into<String>,
        category: ResourceCategory,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            description: description.into(),
        }
    }
}

/// A provisioned unit in the shared pool.
///
/// `status` is ASSIGNED or IN_USE exactly when `assigned_to_conversation_id`
/// is set; stores keep the two fields in lockstep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub identifier: String,
    pub name: String,
    pub resource_type: ResourceType,
    pub status: ResourceStatus,
    pub capacity: i64,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to_conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Resource {
    pub fn category(&self) -> ResourceCategory {
        self.resource_type.category
    }

    pub fn is_available(&self) -> bool {
        self.status == ResourceStatus::Available
    }

    pub fn is_bound_to(&self, incident_id: &str) -> bool {
        self.assigned_to_conversation_id.as_deref() == Some(incident_id)
    }

    /// Both coordinates present. Range checking is left to the caller.
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }

    /// Case-insensitive substring match against the type name or the
    /// resource's own name. Only ASCII letters fold, which keeps the SQLite
    /// `lower()` filter and this check in agreement.
    ///
    /// Unrelated types that share a substring ("Fire Truck", "Fire Station")
    /// both match; callers relying on this should pair it with a category.
    pub fn matches_type_hint(&self, hint: &str) -> bool {
        let needle = hint.trim().to_ascii_lowercase();
        if needle.is_empty() {
            return true;
        }
        self.resource_type.name.to_ascii_lowercase().contains(&needle)
            || self.name.to_ascii_lowercase().contains(&needle)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewResource {
    pub identifier: String,
    pub name: String,
    pub type_name: String,
    #[serde(default = "default_capacity")]
    pub capacity: i64,
    #[serde(default)]
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

fn default_capacity() -> i64 {
    1
}

impl NewResource {
    pub fn new(
        identifier: impl Into<String>,
        name: impl Into<String>,
        type_name: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            type_name: type_name.into(),
            capacity: default_capacity(),
            location: String::new(),
            latitude: None,
            longitude: None,
        }
    }

    pub fn at(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    pub fn with_capacity(mut self, capacity: i64) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn located(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(type_name: &str, name: &str) -> Resource {
        Resource {
            id: 1,
            identifier: "r-1".into(),
            name: name.into(),
            resource_type: ResourceType {
                id: 1,
                name: type_name.into(),
                category: ResourceCategory::Vehicle,
                description: String::new(),
            },
            status: ResourceStatus::Available,
            capacity: 1,
            location: String::new(),
            latitude: None,
            longitude: None,
            assigned_to_conversation_id: None,
            assigned_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn type_hint_matches_type_or_resource_name() {
        let unit = resource("Ambulance", "Medic Unit 4");
        assert!(unit.matches_type_hint("ambul"));
        assert!(unit.matches_type_hint("MEDIC"));
        assert!(!unit.matches_type_hint("fire"));
    }

    #[test]
    fn labels_parse_case_insensitively() {
        assert_eq!(
            "vehicle".parse::<ResourceCategory>().unwrap(),
            ResourceCategory::Vehicle
        );
        assert_eq!(
            "out-of-service".parse::<ResourceStatus>().unwrap(),
            ResourceStatus::OutOfService
        );
        assert!("boat".parse::<ResourceCategory>().is_err());
    }
}
