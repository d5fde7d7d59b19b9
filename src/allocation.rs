use crate::assignment::{NewAssignment, ResourceAssignment};
use crate::catalog::{Resource, ResourceCategory, ResourceId};
use crate::distance::{CoordinateError, Coordinates};
use crate::error::{AllocationError, StoreError};
use crate::persistence::{AssignmentLedger, AvailabilityFilter, ResourceStore};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

fn default_count() -> usize {
    1
}

/// One line of an incident's resource needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ResourceCategory>,
    /// Case-insensitive substring of the type name or resource name.
    #[serde(default, alias = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default = "default_count")]
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_distance_km: Option<f64>,
}

impl Default for ResourceRequirement {
    fn default() -> Self {
        Self {
            category: None,
            type_name: None,
            count: default_count(),
            max_distance_km: None,
        }
    }
}

impl ResourceRequirement {
    pub fn of_category(category: ResourceCategory) -> Self {
        Self {
            category: Some(category),
            ..Self::default()
        }
    }

    pub fn of_type(type_name: impl Into<String>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            ..Self::default()
        }
    }

    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn within_km(mut self, max_distance_km: f64) -> Self {
        self.max_distance_km = Some(max_distance_km);
        self
    }

    pub fn matches(&self, resource: &Resource) -> bool {
        self.category.is_none_or(|c| resource.category() == c)
            && self
                .type_name
                .as_deref()
                .is_none_or(|hint| resource.matches_type_hint(hint))
    }

    /// `"{category} {type} ({count} needed, {available} available)"`, with
    /// absent parts left out.
    pub fn describe_shortfall(&self, available: usize) -> String {
        let mut label = Vec::with_capacity(2);
        if let Some(category) = self.category {
            label.push(category.as_str().to_string());
        }
        if let Some(type_name) = self.type_name.as_deref() {
            label.push(type_name.to_string());
        }
        let label = if label.is_empty() {
            "resource".to_string()
        } else {
            label.join(" ")
        };
        format!(
            "{label} ({} needed, {available} available)",
            self.count
        )
    }

    fn fifo_filter(&self) -> AvailabilityFilter {
        AvailabilityFilter {
            category: self.category,
            type_name_contains: self.type_name.clone(),
            has_coordinates: false,
            limit: Some(self.count),
        }
    }
}

/// Bundle used when an incident arrives without explicit requirements.
pub fn default_requirements() -> Vec<ResourceRequirement> {
    vec![
        ResourceRequirement::of_category(ResourceCategory::Vehicle)
            .with_type("ambulance")
            .within_km(15.0),
        ResourceRequirement::of_category(ResourceCategory::Personnel)
            .with_type("medical")
            .within_km(20.0),
        ResourceRequirement::of_category(ResourceCategory::Equipment)
            .with_type("medical")
            .within_km(25.0),
    ]
}

#[derive(Debug, Clone)]
pub struct AllocationConfig {
    /// Pause between successive commits in FIFO assignment. Zero disables it.
    pub commit_delay: Duration,
    pub default_requirements: Vec<ResourceRequirement>,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            commit_delay: Duration::from_millis(100),
            default_requirements: default_requirements(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignedResource {
    pub resource: Resource,
    pub assignment: ResourceAssignment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationResult {
    /// True iff at least one resource was assigned.
    pub success: bool,
    pub assigned_resources: Vec<AssignedResource>,
    pub unavailable_requirements: Vec<String>,
    pub total_distance_km: f64,
}

impl AllocationResult {
    fn record(&mut self, assigned: AssignedResource) {
        self.total_distance_km += assigned.distance_km.unwrap_or(0.0);
        self.assigned_resources.push(assigned);
        self.success = true;
    }

    fn from_assigned(assigned: Vec<AssignedResource>) -> Self {
        let mut result = Self::default();
        for entry in assigned {
            result.record(entry);
        }
        result
    }

    pub fn average_distance_km(&self) -> Option<f64> {
        let with_distance = self
            .assigned_resources
            .iter()
            .filter(|a| a.distance_km.is_some())
            .count();
        (with_distance > 0).then(|| self.total_distance_km / with_distance as f64)
    }

    pub fn resource_ids(&self) -> Vec<ResourceId> {
        self.assigned_resources
            .iter()
            .map(|a| a.resource.id)
            .collect()
    }
}

/// An incident as handed over by the intake pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub requirements: Vec<ResourceRequirement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_by: Option<String>,
}

impl Incident {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            coordinates: None,
            requirements: Vec::new(),
            assigned_by: None,
        }
    }

    pub fn at(mut self, latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        self.coordinates = Some(Coordinates::new(latitude, longitude)?);
        Ok(self)
    }

    pub fn requiring(mut self, requirement: ResourceRequirement) -> Self {
        self.requirements.push(requirement);
        self
    }
}

/// Selects and commits resources for incidents.
///
/// Holds no state between calls; the store's conditional commit arbitrates
/// between concurrent callers.
pub struct AllocationEngine<S: ?Sized> {
    store: Arc<S>,
    config: AllocationConfig,
}

impl<S: ?Sized> Clone for AllocationEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
        }
    }
}

impl<S> AllocationEngine<S>
where
    S: ResourceStore + AssignmentLedger + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, AllocationConfig::default())
    }

    pub fn with_config(store: Arc<S>, config: AllocationConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &AllocationConfig {
        &self.config
    }

    /// Commits one resource and appends its ledger entry.
    ///
    /// If the ledger refuses the entry the resource is released again, so a
    /// binding never exists without its audit record.
    async fn commit_with_ledger(
        &self,
        resource_id: ResourceId,
        incident_id: &str,
        assigned_by: Option<&str>,
        notes: Option<&str>,
        distance_km: Option<f64>,
    ) -> Result<AssignedResource, StoreError> {
        let at = Utc::now();
        let resource = self.store.commit(resource_id, incident_id, at).await?;
        let entry = NewAssignment {
            resource_id,
            conversation_id: incident_id.to_string(),
            assigned_by: assigned_by.map(str::to_string),
            notes: notes.map(str::to_string),
            assigned_at: at,
        };
        match self.store.record_assignment(entry).await {
            Ok(assignment) => {
                info!(
                    resource_id,
                    resource = %resource.name,
                    incident_id,
                    distance_km,
                    "resource committed"
                );
                Ok(AssignedResource {
                    resource,
                    assignment,
                    distance_km,
                })
            }
            Err(err) => {
                warn!(resource_id, incident_id, error = %err, "ledger append failed, rolling back commit");
                if let Err(rollback) = self.store.release(resource_id).await {
                    error!(resource_id, error = %rollback, "rollback of commit failed");
                }
                Err(err)
            }
        }
    }

    /// Assigns one named resource. Unlike the batch entry points, a lost race
    /// or a missing id is returned to the caller.
    #[instrument(skip(self), fields(incident_id = %incident_id))]
    pub async fn assign_resource(
        &self,
        resource_id: ResourceId,
        incident_id: &str,
        assigned_by: Option<&str>,
    ) -> Result<AssignedResource, AllocationError> {
        Ok(self
            .commit_with_ledger(resource_id, incident_id, assigned_by, None, None)
            .await?)
    }

    /// FIFO assignment over `filter`. On a fatal store error, returns what was
    /// already committed alongside the error.
    async fn assign_fifo(
        &self,
        filter: &AvailabilityFilter,
        incident_id: &str,
        assigned_by: Option<&str>,
        notes: Option<&str>,
    ) -> Result<Vec<AssignedResource>, (Vec<AssignedResource>, StoreError)> {
        if filter.limit == Some(0) {
            return Ok(Vec::new());
        }
        let candidates = self
            .store
            .list_available(filter)
            .await
            .map_err(|err| (Vec::new(), err))?;
        if candidates.is_empty() {
            warn!(?filter, incident_id, "no available resources match");
            return Ok(Vec::new());
        }
        debug!(count = candidates.len(), incident_id, "fifo candidates found");

        let mut assigned = Vec::with_capacity(candidates.len());
        for (idx, candidate) in candidates.iter().enumerate() {
            if idx > 0 && !self.config.commit_delay.is_zero() {
                tokio::time::sleep(self.config.commit_delay).await;
            }
            match self
                .commit_with_ledger(candidate.id, incident_id, assigned_by, notes, None)
                .await
            {
                Ok(entry) => assigned.push(entry),
                Err(err) if err.is_fatal() => {
                    error!(resource_id = candidate.id, error = %err, "store failure, aborting assignment");
                    return Err((assigned, err));
                }
                Err(err) => {
                    warn!(resource_id = candidate.id, error = %err, "candidate skipped");
                }
            }
        }
        info!(
            assigned = assigned.len(),
            candidates = candidates.len(),
            incident_id,
            "fifo assignment complete"
        );
        Ok(assigned)
    }

    /// Assigns up to `count` AVAILABLE resources whose type or name contains
    /// `type_hint`, oldest first. Returns fewer than `count` when the pool
    /// runs short; an empty vector is a normal outcome.
    #[instrument(skip(self), fields(incident_id = %incident_id))]
    pub async fn assign_by_type(
        &self,
        type_hint: &str,
        count: usize,
        incident_id: &str,
        note: Option<&str>,
    ) -> Result<Vec<AssignedResource>, AllocationError> {
        let filter = AvailabilityFilter {
            type_name_contains: Some(type_hint.to_string()),
            limit: Some(count),
            ..AvailabilityFilter::default()
        };
        self.assign_fifo(&filter, incident_id, None, note)
            .await
            .map_err(|(assigned, source)| AllocationError::Aborted {
                partial: Box::new(AllocationResult::from_assigned(assigned)),
                source,
            })
    }

    /// Assigns the closest matching resources for each requirement, in order.
    ///
    /// Shortfalls are reported in `unavailable_requirements`; they are not
    /// errors. A resource claimed (or lost to another caller) for one
    /// requirement is never offered to a later one within the same call.
    #[instrument(skip(self, requirements), fields(incident_id = %incident_id))]
    pub async fn assign_nearest(
        &self,
        incident: Coordinates,
        incident_id: &str,
        requirements: &[ResourceRequirement],
        assigned_by: Option<&str>,
    ) -> Result<AllocationResult, AllocationError> {
        let incident = Coordinates::new(incident.latitude, incident.longitude)?;
        let requirements = if requirements.is_empty() {
            debug!("no requirements given, using default bundle");
            self.config.default_requirements.as_slice()
        } else {
            requirements
        };

        let mut result = AllocationResult::default();
        let pool = match self
            .store
            .list_available(&AvailabilityFilter {
                has_coordinates: true,
                ..AvailabilityFilter::default()
            })
            .await
        {
            Ok(pool) => pool,
            Err(source) => {
                return Err(AllocationError::Aborted {
                    partial: Box::new(result),
                    source,
                });
            }
        };
        let mut claimed: HashSet<ResourceId> = HashSet::new();

        for requirement in requirements {
            if requirement.count == 0 {
                continue;
            }
            let mut ranked: Vec<(&Resource, f64)> = pool
                .iter()
                .filter(|resource| !claimed.contains(&resource.id) && requirement.matches(resource))
                .filter_map(|resource| {
                    let position = resource.coordinates()?;
                    if !position.is_valid() {
                        warn!(
                            resource_id = resource.id,
                            latitude = position.latitude,
                            longitude = position.longitude,
                            "candidate has out-of-range coordinates, skipped"
                        );
                        return None;
                    }
                    let distance = incident.distance_to(&position);
                    distance.is_finite().then_some((resource, distance))
                })
                .collect();
            ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
            if let Some(max_distance) = requirement.max_distance_km {
                ranked.retain(|(_, distance)| *distance <= max_distance);
            }

            let mut committed = 0;
            for (candidate, distance) in ranked {
                if committed == requirement.count {
                    break;
                }
                claimed.insert(candidate.id);
                match self
                    .commit_with_ledger(candidate.id, incident_id, assigned_by, None, Some(distance))
                    .await
                {
                    Ok(entry) => {
                        committed += 1;
                        result.record(entry);
                    }
                    Err(source) if source.is_fatal() => {
                        error!(resource_id = candidate.id, error = %source, "store failure, aborting assignment");
                        return Err(AllocationError::Aborted {
                            partial: Box::new(result),
                            source,
                        });
                    }
                    Err(err) => {
                        warn!(resource_id = candidate.id, error = %err, "candidate skipped");
                    }
                }
            }

            if committed < requirement.count {
                let shortfall = requirement.describe_shortfall(committed);
                warn!(%shortfall, "requirement not fully met");
                result.unavailable_requirements.push(shortfall);
            }
        }

        info!(
            assigned = result.assigned_resources.len(),
            unmet = result.unavailable_requirements.len(),
            total_distance_km = result.total_distance_km,
            "nearest assignment complete"
        );
        Ok(result)
    }

    /// Routes an incident: proximity ranking when coordinates are known,
    /// FIFO per requirement otherwise.
    #[instrument(skip(self, incident), fields(incident_id = %incident.conversation_id))]
    pub async fn dispatch(&self, incident: &Incident) -> Result<AllocationResult, AllocationError> {
        let assigned_by = incident.assigned_by.as_deref();
        if let Some(coordinates) = incident.coordinates {
            return self
                .assign_nearest(
                    coordinates,
                    &incident.conversation_id,
                    &incident.requirements,
                    assigned_by,
                )
                .await;
        }

        let requirements = if incident.requirements.is_empty() {
            self.config.default_requirements.as_slice()
        } else {
            incident.requirements.as_slice()
        };
        let mut result = AllocationResult::default();
        for requirement in requirements {
            if requirement.count == 0 {
                continue;
            }
            match self
                .assign_fifo(
                    &requirement.fifo_filter(),
                    &incident.conversation_id,
                    assigned_by,
                    None,
                )
                .await
            {
                Ok(assigned) => {
                    if assigned.len() < requirement.count {
                        result
                            .unavailable_requirements
                            .push(requirement.describe_shortfall(assigned.len()));
                    }
                    for entry in assigned {
                        result.record(entry);
                    }
                }
                Err((assigned, source)) => {
                    for entry in assigned {
                        result.record(entry);
                    }
                    return Err(AllocationError::Aborted {
                        partial: Box::new(result),
                        source,
                    });
                }
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortfall_text_includes_present_parts() {
        let requirement = ResourceRequirement::of_category(ResourceCategory::Vehicle)
            .with_type("Ambulance")
            .with_count(3);
        assert_eq!(
            requirement.describe_shortfall(1),
            "VEHICLE Ambulance (3 needed, 1 available)"
        );
        assert_eq!(
            ResourceRequirement::of_type("Medical Kit")
                .with_count(2)
                .describe_shortfall(0),
            "Medical Kit (2 needed, 0 available)"
        );
    }

    #[test]
    fn requirement_json_accepts_type_alias() {
        let requirement: ResourceRequirement = serde_json::from_str(
            r#"{"category":"VEHICLE","type":"Ambulance","max_distance_km":15}"#,
        )
        .unwrap();
        assert_eq!(requirement.count, 1);
        assert_eq!(requirement.type_name.as_deref(), Some("Ambulance"));
        assert_eq!(requirement.max_distance_km, Some(15.0));
    }

    #[test]
    fn default_bundle_covers_vehicle_personnel_equipment() {
        let categories: Vec<_> = default_requirements()
            .into_iter()
            .filter_map(|r| r.category)
            .collect();
        assert_eq!(
            categories,
            vec![
                ResourceCategory::Vehicle,
                ResourceCategory::Personnel,
                ResourceCategory::Equipment
            ]
        );
    }
}
