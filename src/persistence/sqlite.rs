use super::{
    AssignmentLedger, AvailabilityFilter, ResourceQuery, ResourceStore, check_position,
};
use crate::assignment::{AssignmentStatus, NewAssignment, ResourceAssignment};
use crate::catalog::{
    NewResource, NewResourceType, Resource, ResourceCategory, ResourceId, ResourceStatus,
    ResourceType,
};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params, params_from_iter};
use std::str::FromStr;
use std::sync::Arc;
use tokio::task;

const RESOURCE_SELECT: &str = "SELECT r.id, r.identifier, r.name, r.status, r.capacity, \
     r.location, r.latitude, r.longitude, r.assigned_to_conversation_id, r.assigned_at, \
     r.created_at, t.id, t.name, t.category, t.description \
     FROM resources r JOIN resource_types t ON t.id = r.type_id";

const ASSIGNMENT_SELECT: &str = "SELECT id, resource_id, conversation_id, assigned_by, status, \
     notes, assigned_at, completed_at FROM resource_assignments";

const ORDER_BY_CREATION: &str = " ORDER BY r.created_at ASC, r.id ASC";

/// SQLite-backed store. Blocking rusqlite calls run on the tokio blocking
/// pool against one shared connection.
#[derive(Clone)]
pub struct SqliteResourceStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteResourceStore {
    pub fn new<P: AsRef<std::path::Path>>(path: P) -> StoreResult<Self> {
        let connection = Connection::open(path)?;
        Self::from_connection(connection)
    }

    pub fn in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(connection: Connection) -> StoreResult<Self> {
        Self::initialize_schema(&connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    fn initialize_schema(connection: &Connection) -> StoreResult<()> {
        let ddl = r#"
            PRAGMA foreign_keys = ON;
            CREATE TABLE IF NOT EXISTS resource_types (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                category TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT ''
            );
            CREATE TABLE IF NOT EXISTS resources (
                id INTEGER PRIMARY KEY,
                identifier TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                type_id INTEGER NOT NULL REFERENCES resource_types(id),
                status TEXT NOT NULL DEFAULT 'AVAILABLE',
                capacity INTEGER NOT NULL DEFAULT 1,
                location TEXT NOT NULL DEFAULT '',
                latitude REAL,
                longitude REAL,
                assigned_to_conversation_id TEXT,
                assigned_at TEXT,
                created_at TEXT NOT NULL,
                CHECK ((status IN ('ASSIGNED', 'IN_USE')) = (assigned_to_conversation_id IS NOT NULL))
            );
            CREATE INDEX IF NOT EXISTS resources_status_idx ON resources(status);
            CREATE INDEX IF NOT EXISTS resources_binding_idx
                ON resources(assigned_to_conversation_id);
            CREATE TABLE IF NOT EXISTS resource_assignments (
                id INTEGER PRIMARY KEY,
                resource_id INTEGER NOT NULL REFERENCES resources(id),
                conversation_id TEXT NOT NULL,
                assigned_by TEXT,
                status TEXT NOT NULL,
                notes TEXT,
                assigned_at TEXT NOT NULL,
                completed_at TEXT
            );
            CREATE UNIQUE INDEX IF NOT EXISTS resource_assignments_one_open
                ON resource_assignments(resource_id)
                WHERE status IN ('ASSIGNED', 'DEPLOYED', 'ACTIVE');
            CREATE INDEX IF NOT EXISTS resource_assignments_incident_idx
                ON resource_assignments(conversation_id);
        "#;
        connection.execute_batch(ddl)?;
        Ok(())
    }

    async fn with_connection<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        task::spawn_blocking(move || {
            let mut conn = connection.lock();
            op(&mut conn)
        })
        .await
        .map_err(|err| StoreError::Unavailable(format!("sqlite worker failed: {err}")))?
    }
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

fn resource_from_row(row: &Row<'_>) -> rusqlite::Result<Resource> {
    Ok(Resource {
        id: row.get(0)?,
        identifier: row.get(1)?,
        name: row.get(2)?,
        status: parse_column::<ResourceStatus>(row, 3)?,
        capacity: row.get(4)?,
        location: row.get(5)?,
        latitude: row.get(6)?,
        longitude: row.get(7)?,
        assigned_to_conversation_id: row.get(8)?,
        assigned_at: row.get(9)?,
        created_at: row.get(10)?,
        resource_type: ResourceType {
            id: row.get(11)?,
            name: row.get(12)?,
            category: parse_column::<ResourceCategory>(row, 13)?,
            description: row.get(14)?,
        },
    })
}

fn assignment_from_row(row: &Row<'_>) -> rusqlite::Result<ResourceAssignment> {
    Ok(ResourceAssignment {
        id: row.get(0)?,
        resource_id: row.get(1)?,
        conversation_id: row.get(2)?,
        assigned_by: row.get(3)?,
        status: parse_column::<AssignmentStatus>(row, 4)?,
        notes: row.get(5)?,
        assigned_at: row.get(6)?,
        completed_at: row.get(7)?,
    })
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::ConstraintViolation
    )
}

fn fetch_resource(conn: &Connection, id: ResourceId) -> StoreResult<Resource> {
    let sql = format!("{RESOURCE_SELECT} WHERE r.id = ?1");
    conn.query_row(&sql, params![id], resource_from_row)
        .optional()?
        .ok_or_else(|| StoreError::not_found("resource", id))
}

fn resource_exists(conn: &Connection, id: ResourceId) -> StoreResult<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT id FROM resources WHERE id = ?1", params![id], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(found.is_some())
}

fn query_resources(conn: &Connection, sql: &str, values: Vec<Value>) -> StoreResult<Vec<Resource>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params_from_iter(values), resource_from_row)?;
    let mut resources = Vec::new();
    for resource in rows {
        resources.push(resource?);
    }
    Ok(resources)
}

fn query_assignments(
    conn: &Connection,
    sql: &str,
    value: Value,
) -> StoreResult<Vec<ResourceAssignment>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([value], assignment_from_row)?;
    let mut entries = Vec::new();
    for entry in rows {
        entries.push(entry?);
    }
    Ok(entries)
}

#[async_trait]
impl ResourceStore for SqliteResourceStore {
    async fn insert_resource_type(&self, new: NewResourceType) -> StoreResult<ResourceType> {
        self.with_connection(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO resource_types (name, category, description) VALUES (?1, ?2, ?3)",
                params![new.name, new.category.as_str(), new.description],
            );
            match inserted {
                Ok(_) => Ok(ResourceType {
                    id: conn.last_insert_rowid(),
                    name: new.name,
                    category: new.category,
                    description: new.description,
                }),
                Err(err) if is_constraint_violation(&err) => Err(StoreError::AlreadyExists {
                    entity: "resource type",
                    key: new.name,
                }),
                Err(err) => Err(err.into()),
            }
        })
        .await
    }

    async fn insert_resource(&self, new: NewResource) -> StoreResult<Resource> {
        check_position(&new)?;
        self.with_connection(move |conn| {
            let type_id: Option<i64> = conn
                .query_row(
                    "SELECT id FROM resource_types WHERE name = ?1",
                    params![new.type_name],
                    |row| row.get(0),
                )
                .optional()?;
            let type_id =
                type_id.ok_or_else(|| StoreError::not_found("resource type", &new.type_name))?;
            let inserted = conn.execute(
                "INSERT INTO resources (identifier, name, type_id, status, capacity, location, \
                 latitude, longitude, created_at) \
                 VALUES (?1, ?2, ?3, 'AVAILABLE', ?4, ?5, ?6, ?7, ?8)",
                params![
                    new.identifier,
                    new.name,
                    type_id,
                    new.capacity,
                    new.location,
                    new.latitude,
                    new.longitude,
                    Utc::now()
                ],
            );
            match inserted {
                Ok(_) => fetch_resource(conn, conn.last_insert_rowid()),
                Err(err) if is_constraint_violation(&err) => Err(StoreError::AlreadyExists {
                    entity: "resource",
                    key: new.identifier,
                }),
                Err(err) => Err(err.into()),
            }
        })
        .await
    }

    async fn resource_types(&self) -> StoreResult<Vec<ResourceType>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, name, category, description FROM resource_types ORDER BY id")?;
            let rows = stmt.query_map([], |row| {
                Ok(ResourceType {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    category: parse_column::<ResourceCategory>(row, 2)?,
                    description: row.get(3)?,
                })
            })?;
            let mut types = Vec::new();
            for resource_type in rows {
                types.push(resource_type?);
            }
            Ok(types)
        })
        .await
    }

    async fn get_resource(&self, id: ResourceId) -> StoreResult<Resource> {
        self.with_connection(move |conn| fetch_resource(conn, id)).await
    }

    async fn list_resources(&self, query: &ResourceQuery) -> StoreResult<Vec<Resource>> {
        let query = query.clone();
        self.with_connection(move |conn| {
            let mut sql = format!("{RESOURCE_SELECT} WHERE 1 = 1");
            let mut values = Vec::new();
            if let Some(category) = query.category {
                values.push(Value::Text(category.as_str().to_string()));
                sql.push_str(&format!(" AND t.category = ?{}", values.len()));
            }
            if let Some(status) = query.status {
                values.push(Value::Text(status.as_str().to_string()));
                sql.push_str(&format!(" AND r.status = ?{}", values.len()));
            }
            sql.push_str(ORDER_BY_CREATION);
            query_resources(conn, &sql, values)
        })
        .await
    }

    async fn list_available(&self, filter: &AvailabilityFilter) -> StoreResult<Vec<Resource>> {
        let filter = filter.clone();
        self.with_connection(move |conn| {
            let mut sql = format!("{RESOURCE_SELECT} WHERE r.status = 'AVAILABLE'");
            let mut values = Vec::new();
            if let Some(category) = filter.category {
                values.push(Value::Text(category.as_str().to_string()));
                sql.push_str(&format!(" AND t.category = ?{}", values.len()));
            }
            if let Some(hint) = filter.type_name_contains.as_deref() {
                let needle = hint.trim().to_ascii_lowercase();
                if !needle.is_empty() {
                    values.push(Value::Text(needle));
                    let idx = values.len();
                    sql.push_str(&format!(
                        " AND (instr(lower(t.name), ?{idx}) > 0 OR instr(lower(r.name), ?{idx}) > 0)"
                    ));
                }
            }
            if filter.has_coordinates {
                sql.push_str(" AND r.latitude IS NOT NULL AND r.longitude IS NOT NULL");
            }
            sql.push_str(ORDER_BY_CREATION);
            if let Some(limit) = filter.limit {
                values.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
                sql.push_str(&format!(" LIMIT ?{}", values.len()));
            }
            query_resources(conn, &sql, values)
        })
        .await
    }

    async fn bound_to(&self, incident_id: &str) -> StoreResult<Vec<Resource>> {
        let incident_id = incident_id.to_string();
        self.with_connection(move |conn| {
            let sql = format!("{RESOURCE_SELECT} WHERE r.assigned_to_conversation_id = ?1{ORDER_BY_CREATION}");
            query_resources(conn, &sql, vec![Value::Text(incident_id)])
        })
        .await
    }

    async fn commit(
        &self,
        id: ResourceId,
        incident_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Resource> {
        let incident_id = incident_id.to_string();
        self.with_connection(move |conn| {
            let changed = conn.execute(
                "UPDATE resources SET status = 'ASSIGNED', assigned_to_conversation_id = ?2, \
                 assigned_at = ?3 WHERE id = ?1 AND status = 'AVAILABLE'",
                params![id, incident_id, at],
            )?;
            if changed == 0 {
                return if resource_exists(conn, id)? {
                    Err(StoreError::Conflict { resource_id: id })
                } else {
                    Err(StoreError::not_found("resource", id))
                };
            }
            fetch_resource(conn, id)
        })
        .await
    }

    async fn release(&self, id: ResourceId) -> StoreResult<Resource> {
        self.with_connection(move |conn| {
            conn.execute(
                "UPDATE resources SET status = 'AVAILABLE', assigned_to_conversation_id = NULL, \
                 assigned_at = NULL WHERE id = ?1 AND assigned_to_conversation_id IS NOT NULL",
                params![id],
            )?;
            fetch_resource(conn, id)
        })
        .await
    }

    async fn release_from(&self, id: ResourceId, incident_id: &str) -> StoreResult<Resource> {
        let incident_id = incident_id.to_string();
        self.with_connection(move |conn| {
            let changed = conn.execute(
                "UPDATE resources SET status = 'AVAILABLE', assigned_to_conversation_id = NULL, \
                 assigned_at = NULL WHERE id = ?1 AND assigned_to_conversation_id = ?2",
                params![id, incident_id],
            )?;
            if changed == 0 {
                return if resource_exists(conn, id)? {
                    Err(StoreError::NotFound {
                        entity: "binding",
                        id: format!("{id}@{incident_id}"),
                    })
                } else {
                    Err(StoreError::not_found("resource", id))
                };
            }
            fetch_resource(conn, id)
        })
        .await
    }

    async fn mark_in_use(&self, id: ResourceId, incident_id: &str) -> StoreResult<Resource> {
        let incident_id = incident_id.to_string();
        self.with_connection(move |conn| {
            let changed = conn.execute(
                "UPDATE resources SET status = 'IN_USE' \
                 WHERE id = ?1 AND status = 'ASSIGNED' AND assigned_to_conversation_id = ?2",
                params![id, incident_id],
            )?;
            if changed == 0 {
                return if resource_exists(conn, id)? {
                    Err(StoreError::Conflict { resource_id: id })
                } else {
                    Err(StoreError::not_found("resource", id))
                };
            }
            fetch_resource(conn, id)
        })
        .await
    }

    async fn set_status(&self, id: ResourceId, status: ResourceStatus) -> StoreResult<Resource> {
        if status.requires_binding() {
            return Err(StoreError::InvalidData(format!(
                "status {status} can only be reached through an assignment"
            )));
        }
        self.with_connection(move |conn| {
            let changed = conn.execute(
                "UPDATE resources SET status = ?2 \
                 WHERE id = ?1 AND assigned_to_conversation_id IS NULL",
                params![id, status.as_str()],
            )?;
            if changed == 0 {
                return if resource_exists(conn, id)? {
                    Err(StoreError::Conflict { resource_id: id })
                } else {
                    Err(StoreError::not_found("resource", id))
                };
            }
            fetch_resource(conn, id)
        })
        .await
    }
}

#[async_trait]
impl AssignmentLedger for SqliteResourceStore {
    async fn record_assignment(&self, new: NewAssignment) -> StoreResult<ResourceAssignment> {
        self.with_connection(move |conn| {
            if !resource_exists(conn, new.resource_id)? {
                return Err(StoreError::not_found("resource", new.resource_id));
            }
            let inserted = conn.execute(
                "INSERT INTO resource_assignments \
                 (resource_id, conversation_id, assigned_by, status, notes, assigned_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    new.resource_id,
                    new.conversation_id,
                    new.assigned_by,
                    AssignmentStatus::Assigned.as_str(),
                    new.notes,
                    new.assigned_at
                ],
            );
            match inserted {
                Ok(_) => Ok(ResourceAssignment {
                    id: conn.last_insert_rowid(),
                    resource_id: new.resource_id,
                    conversation_id: new.conversation_id,
                    assigned_by: new.assigned_by,
                    status: AssignmentStatus::Assigned,
                    notes: new.notes,
                    assigned_at: new.assigned_at,
                    completed_at: None,
                }),
                Err(err) if is_constraint_violation(&err) => Err(StoreError::Conflict {
                    resource_id: new.resource_id,
                }),
                Err(err) => Err(err.into()),
            }
        })
        .await
    }

    async fn close_assignments(
        &self,
        resource_id: ResourceId,
        incident_id: Option<&str>,
        status: AssignmentStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<usize> {
        let incident_id = incident_id.map(str::to_string);
        let completed_at = (!status.is_open()).then_some(at);
        self.with_connection(move |conn| {
            let changed = conn.execute(
                "UPDATE resource_assignments SET status = ?1, \
                 completed_at = COALESCE(?2, completed_at) \
                 WHERE resource_id = ?3 AND status IN ('ASSIGNED', 'DEPLOYED', 'ACTIVE') \
                 AND (?4 IS NULL OR conversation_id = ?4)",
                params![status.as_str(), completed_at, resource_id, incident_id],
            )?;
            Ok(changed)
        })
        .await
    }

    async fn mark_deployed(
        &self,
        resource_id: ResourceId,
        incident_id: &str,
    ) -> StoreResult<usize> {
        let incident_id = incident_id.to_string();
        self.with_connection(move |conn| {
            let changed = conn.execute(
                "UPDATE resource_assignments SET status = 'DEPLOYED' \
                 WHERE resource_id = ?1 AND conversation_id = ?2 AND status = 'ASSIGNED'",
                params![resource_id, incident_id],
            )?;
            Ok(changed)
        })
        .await
    }

    async fn assignments_for_resource(
        &self,
        resource_id: ResourceId,
    ) -> StoreResult<Vec<ResourceAssignment>> {
        self.with_connection(move |conn| {
            let sql = format!("{ASSIGNMENT_SELECT} WHERE resource_id = ?1 ORDER BY assigned_at, id");
            query_assignments(conn, &sql, Value::Integer(resource_id))
        })
        .await
    }

    async fn assignments_for_incident(
        &self,
        incident_id: &str,
    ) -> StoreResult<Vec<ResourceAssignment>> {
        let incident_id = incident_id.to_string();
        self.with_connection(move |conn| {
            let sql =
                format!("{ASSIGNMENT_SELECT} WHERE conversation_id = ?1 ORDER BY assigned_at, id");
            query_assignments(conn, &sql, Value::Text(incident_id))
        })
        .await
    }
}
