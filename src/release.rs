use crate::assignment::AssignmentStatus;
use crate::catalog::{Resource, ResourceId};
use crate::error::{ReleaseError, StoreResult};
use crate::persistence::{AssignmentLedger, ResourceStore};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseFailure {
    pub resource_id: ResourceId,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseSummary {
    pub released: Vec<ResourceId>,
    pub completed_assignments: usize,
    pub failures: Vec<ReleaseFailure>,
}

impl ReleaseSummary {
    pub fn released_count(&self) -> usize {
        self.released.len()
    }
}

/// Returns committed resources to the pool when an incident winds down.
pub struct ReleaseCoordinator<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for ReleaseCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> ReleaseCoordinator<S>
where
    S: ResourceStore + AssignmentLedger + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Releases each resource from `incident_id` and completes its ledger
    /// entries. Per-resource misses land in `failures`; a store outage stops
    /// the batch.
    #[instrument(skip(self), fields(incident_id = %incident_id))]
    pub async fn release(
        &self,
        resource_ids: &[ResourceId],
        incident_id: &str,
    ) -> Result<ReleaseSummary, ReleaseError> {
        let mut summary = ReleaseSummary::default();
        for &resource_id in resource_ids {
            if let Err(source) = self
                .release_one(resource_id, incident_id, &mut summary)
                .await
            {
                if source.is_fatal() {
                    error!(resource_id, error = %source, "store failure, aborting release");
                    return Err(ReleaseError::Aborted {
                        partial: summary,
                        source,
                    });
                }
                warn!(resource_id, error = %source, "resource not released");
                summary.failures.push(ReleaseFailure {
                    resource_id,
                    reason: source.to_string(),
                });
            }
        }
        info!(
            released = summary.released_count(),
            failed = summary.failures.len(),
            "release complete"
        );
        Ok(summary)
    }

    async fn release_one(
        &self,
        resource_id: ResourceId,
        incident_id: &str,
        summary: &mut ReleaseSummary,
    ) -> StoreResult<()> {
        self.store.release_from(resource_id, incident_id).await?;
        summary.released.push(resource_id);
        summary.completed_assignments += self
            .store
            .close_assignments(
                resource_id,
                Some(incident_id),
                AssignmentStatus::Completed,
                Utc::now(),
            )
            .await?;
        Ok(())
    }

    /// Releases everything currently bound to the incident.
    #[instrument(skip(self), fields(incident_id = %incident_id))]
    pub async fn release_all_for_incident(
        &self,
        incident_id: &str,
    ) -> Result<ReleaseSummary, ReleaseError> {
        let bound = self
            .store
            .bound_to(incident_id)
            .await
            .map_err(|source| ReleaseError::Aborted {
                partial: ReleaseSummary::default(),
                source,
            })?;
        let ids: Vec<ResourceId> = bound.iter().map(|resource| resource.id).collect();
        self.release(&ids, incident_id).await
    }

    /// Clears whatever binding the resource holds and completes every open
    /// ledger entry for it. Safe to repeat.
    #[instrument(skip(self))]
    pub async fn release_resource(&self, resource_id: ResourceId) -> StoreResult<Resource> {
        let resource = self.store.release(resource_id).await?;
        let closed = self
            .store
            .close_assignments(resource_id, None, AssignmentStatus::Completed, Utc::now())
            .await?;
        info!(resource_id, closed, "resource released");
        Ok(resource)
    }

    /// ASSIGNED -> IN_USE, with the ledger entry moved to DEPLOYED.
    #[instrument(skip(self), fields(incident_id = %incident_id))]
    pub async fn deploy(&self, resource_id: ResourceId, incident_id: &str) -> StoreResult<Resource> {
        let resource = self.store.mark_in_use(resource_id, incident_id).await?;
        let deployed = self.store.mark_deployed(resource_id, incident_id).await?;
        if deployed == 0 {
            warn!(resource_id, "no open ledger entry to mark deployed");
        }
        info!(resource_id, "resource deployed");
        Ok(resource)
    }
}

