use super::{
    AssignmentLedger, AvailabilityFilter, ResourceQuery, ResourceStore, check_position,
};
use crate::assignment::{AssignmentStatus, NewAssignment, ResourceAssignment};
use crate::catalog::{
    NewResource, NewResourceType, Resource, ResourceId, ResourceStatus, ResourceType,
};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Default)]
struct State {
    resource_types: Vec<ResourceType>,
    resources: Vec<Resource>,
    assignments: Vec<ResourceAssignment>,
    next_type_id: i64,
    next_resource_id: i64,
    next_assignment_id: i64,
}

impl State {
    fn resource_mut(&mut self, id: ResourceId) -> StoreResult<&mut Resource> {
        self.resources
            .iter_mut()
            .find(|resource| resource.id == id)
            .ok_or_else(|| StoreError::not_found("resource", id))
    }

    fn resource(&self, id: ResourceId) -> StoreResult<&Resource> {
        self.resources
            .iter()
            .find(|resource| resource.id == id)
            .ok_or_else(|| StoreError::not_found("resource", id))
    }
}

fn unbind(resource: &mut Resource) {
    resource.status = ResourceStatus::Available;
    resource.assigned_to_conversation_id = None;
    resource.assigned_at = None;
}

/// Process-local store. Every mutation runs under one write guard, which
/// makes the check-and-set in `commit` atomic.
#[derive(Clone, Default)]
pub struct InMemoryResourceStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn insert_resource_type(&self, new: NewResourceType) -> StoreResult<ResourceType> {
        let mut state = self.state.write();
        if state.resource_types.iter().any(|t| t.name == new.name) {
            return Err(StoreError::AlreadyExists {
                entity: "resource type",
                key: new.name,
            });
        }
        state.next_type_id += 1;
        let resource_type = ResourceType {
            id: state.next_type_id,
            name: new.name,
            category: new.category,
            description: new.description,
        };
        state.resource_types.push(resource_type.clone());
        Ok(resource_type)
    }

    async fn insert_resource(&self, new: NewResource) -> StoreResult<Resource> {
        check_position(&new)?;
        let mut state = self.state.write();
        if state
            .resources
            .iter()
            .any(|r| r.identifier == new.identifier)
        {
            return Err(StoreError::AlreadyExists {
                entity: "resource",
                key: new.identifier,
            });
        }
        let resource_type = state
            .resource_types
            .iter()
            .find(|t| t.name == new.type_name)
            .cloned()
            .ok_or_else(|| StoreError::not_found("resource type", &new.type_name))?;
        state.next_resource_id += 1;
        let resource = Resource {
            id: state.next_resource_id,
            identifier: new.identifier,
            name: new.name,
            resource_type,
            status: ResourceStatus::Available,
            capacity: new.capacity,
            location: new.location,
            latitude: new.latitude,
            longitude: new.longitude,
            assigned_to_conversation_id: None,
            assigned_at: None,
            created_at: Utc::now(),
        };
        state.resources.push(resource.clone());
        Ok(resource)
    }

    async fn resource_types(&self) -> StoreResult<Vec<ResourceType>> {
        Ok(self.state.read().resource_types.clone())
    }

    async fn get_resource(&self, id: ResourceId) -> StoreResult<Resource> {
        self.state.read().resource(id).cloned()
    }

    async fn list_resources(&self, query: &ResourceQuery) -> StoreResult<Vec<Resource>> {
        let state = self.state.read();
        Ok(state
            .resources
            .iter()
            .filter(|resource| query.matches(resource))
            .cloned()
            .collect())
    }

    async fn list_available(&self, filter: &AvailabilityFilter) -> StoreResult<Vec<Resource>> {
        let state = self.state.read();
        let matching = state
            .resources
            .iter()
            .filter(|resource| filter.matches(resource))
            .cloned();
        Ok(match filter.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    async fn bound_to(&self, incident_id: &str) -> StoreResult<Vec<Resource>> {
        let state = self.state.read();
        Ok(state
            .resources
            .iter()
            .filter(|resource| resource.is_bound_to(incident_id))
            .cloned()
            .collect())
    }

    async fn commit(
        &self,
        id: ResourceId,
        incident_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Resource> {
        let mut state = self.state.write();
        let resource = state.resource_mut(id)?;
        if resource.status != ResourceStatus::Available {
            return Err(StoreError::Conflict { resource_id: id });
        }
        resource.status = ResourceStatus::Assigned;
        resource.assigned_to_conversation_id = Some(incident_id.to_string());
        resource.assigned_at = Some(at);
        Ok(resource.clone())
    }

    async fn release(&self, id: ResourceId) -> StoreResult<Resource> {
        let mut state = self.state.write();
        let resource = state.resource_mut(id)?;
        if resource.status.requires_binding() || resource.assigned_to_conversation_id.is_some() {
            unbind(resource);
        }
        Ok(resource.clone())
    }

    async fn release_from(&self, id: ResourceId, incident_id: &str) -> StoreResult<Resource> {
        let mut state = self.state.write();
        let resource = state.resource_mut(id)?;
        if !resource.is_bound_to(incident_id) {
            return Err(StoreError::NotFound {
                entity: "binding",
                id: format!("{id}@{incident_id}"),
            });
        }
        unbind(resource);
        Ok(resource.clone())
    }

    async fn mark_in_use(&self, id: ResourceId, incident_id: &str) -> StoreResult<Resource> {
        let mut state = self.state.write();
        let resource = state.resource_mut(id)?;
        if resource.status != ResourceStatus::Assigned || !resource.is_bound_to(incident_id) {
            return Err(StoreError::Conflict { resource_id: id });
        }
        resource.status = ResourceStatus::InUse;
        Ok(resource.clone())
    }

    async fn set_status(&self, id: ResourceId, status: ResourceStatus) -> StoreResult<Resource> {
        if status.requires_binding() {
            return Err(StoreError::InvalidData(format!(
                "status {status} can only be reached through an assignment"
            )));
        }
        let mut state = self.state.write();
        let resource = state.resource_mut(id)?;
        if resource.assigned_to_conversation_id.is_some() {
            return Err(StoreError::Conflict { resource_id: id });
        }
        resource.status = status;
        Ok(resource.clone())
    }
}

#[async_trait]
impl AssignmentLedger for InMemoryResourceStore {
    async fn record_assignment(&self, new: NewAssignment) -> StoreResult<ResourceAssignment> {
        let mut state = self.state.write();
        state.resource(new.resource_id)?;
        if state
            .assignments
            .iter()
            .any(|entry| entry.resource_id == new.resource_id && entry.is_open())
        {
            return Err(StoreError::Conflict {
                resource_id: new.resource_id,
            });
        }
        state.next_assignment_id += 1;
        let entry = ResourceAssignment {
            id: state.next_assignment_id,
            resource_id: new.resource_id,
            conversation_id: new.conversation_id,
            assigned_by: new.assigned_by,
            status: AssignmentStatus::Assigned,
            notes: new.notes,
            assigned_at: new.assigned_at,
            completed_at: None,
        };
        state.assignments.push(entry.clone());
        Ok(entry)
    }

    async fn close_assignments(
        &self,
        resource_id: ResourceId,
        incident_id: Option<&str>,
        status: AssignmentStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<usize> {
        let mut state = self.state.write();
        let mut touched = 0;
        for entry in state.assignments.iter_mut().filter(|entry| {
            entry.resource_id == resource_id
                && entry.is_open()
                && incident_id.is_none_or(|incident| entry.conversation_id == incident)
        }) {
            entry.status = status;
            if !status.is_open() {
                entry.completed_at = Some(at);
            }
            touched += 1;
        }
        Ok(touched)
    }

    async fn mark_deployed(
        &self,
        resource_id: ResourceId,
        incident_id: &str,
    ) -> StoreResult<usize> {
        let mut state = self.state.write();
        let mut touched = 0;
        for entry in state.assignments.iter_mut().filter(|entry| {
            entry.resource_id == resource_id
                && entry.conversation_id == incident_id
                && entry.status == AssignmentStatus::Assigned
        }) {
            entry.status = AssignmentStatus::Deployed;
            touched += 1;
        }
        Ok(touched)
    }

    async fn assignments_for_resource(
        &self,
        resource_id: ResourceId,
    ) -> StoreResult<Vec<ResourceAssignment>> {
        let state = self.state.read();
        Ok(state
            .assignments
            .iter()
            .filter(|entry| entry.resource_id == resource_id)
            .cloned()
            .collect())
    }

    async fn assignments_for_incident(
        &self,
        incident_id: &str,
    ) -> StoreResult<Vec<ResourceAssignment>> {
        let state = self.state.read();
        Ok(state
            .assignments
            .iter()
            .filter(|entry| entry.conversation_id == incident_id)
            .cloned()
            .collect())
    }
}
