//! Fleet-wide status counts.

use crate::catalog::{Resource, ResourceCategory, ResourceStatus};
use crate::error::StoreResult;
use crate::persistence::{ResourceQuery, ResourceStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub total: usize,
    pub available: usize,
    /// ASSIGNED plus IN_USE.
    pub committed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceStats {
    pub total: usize,
    pub available: usize,
    pub assigned: usize,
    pub in_use: usize,
    pub maintenance: usize,
    pub out_of_service: usize,
    pub by_category: BTreeMap<ResourceCategory, CategoryStats>,
}

impl ResourceStats {
    pub fn from_resources<'a>(resources: impl IntoIterator<Item = &'a Resource>) -> Self {
        let mut stats = Self::default();
        for resource in resources {
            stats.total += 1;
            match resource.status {
                ResourceStatus::Available => stats.available += 1,
                ResourceStatus::Assigned => stats.assigned += 1,
                ResourceStatus::InUse => stats.in_use += 1,
                ResourceStatus::Maintenance => stats.maintenance += 1,
                ResourceStatus::OutOfService => stats.out_of_service += 1,
            }
            let category = stats.by_category.entry(resource.category()).or_default();
            category.total += 1;
            if resource.is_available() {
                category.available += 1;
            }
            if resource.status.requires_binding() {
                category.committed += 1;
            }
        }
        stats
    }

    pub async fn collect<S>(store: &S) -> StoreResult<Self>
    where
        S: ResourceStore + ?Sized,
    {
        let resources = store.list_resources(&ResourceQuery::default()).await?;
        Ok(Self::from_resources(&resources))
    }

    /// Share of the fleet committed to incidents, in percent.
    pub fn utilization_percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.assigned + self.in_use) as f64 * 100.0 / self.total as f64
    }
}
