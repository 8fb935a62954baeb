//! In-memory incident store

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use error_handling_rs::{Error, Result};

use crate::collaborators::IncidentStore;
use crate::models::{Incident, IncidentUpdate};
use crate::workflow::WorkflowStateMachine;

#[derive(Debug, Default)]
pub struct InMemoryIncidentStore {
    incidents: RwLock<HashMap<Uuid, Incident>>,
}

impl InMemoryIncidentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.incidents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.incidents.read().await.is_empty()
    }
}

fn not_found(id: Uuid) -> Error {
    Error::not_found(format!("incident {} not found", id))
        .service("incident-store")
        .context("incident_id", id.to_string())
}

#[async_trait]
impl IncidentStore for InMemoryIncidentStore {
    async fn create(&self, incident: Incident) -> Result<Incident> {
        let mut incidents = self.incidents.write().await;
        if incidents.contains_key(&incident.id) {
            return Err(Error::validation(format!("incident {} already exists", incident.id))
                .service("incident-store"));
        }
        incidents.insert(incident.id, incident.clone());
        Ok(incident)
    }

    async fn get(&self, id: Uuid) -> Result<Incident> {
        self.incidents
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    async fn update(&self, id: Uuid, update: IncidentUpdate) -> Result<Incident> {
        let mut incidents = self.incidents.write().await;
        let incident = incidents.get_mut(&id).ok_or_else(|| not_found(id))?;
        if let Some(change) = &update.status_change {
            if change.from != incident.status {
                return Err(Error::conflict(format!(
                    "incident {} is {}, not {}",
                    id, incident.status, change.from
                ))
                .service("incident-store")
                .context("stored_status", incident.status.as_str()));
            }
            if !WorkflowStateMachine::valid_transition(change.from, change.to) {
                return Err(Error::validation(format!(
                    "invalid transition {} -> {}",
                    change.from, change.to
                ))
                .service("incident-store"));
            }
        }
        update.apply_to(incident, Utc::now());
        Ok(incident.clone())
    }

    async fn list(&self) -> Result<Vec<Incident>> {
        let mut incidents: Vec<Incident> = self.incidents.read().await.values().cloned().collect();
        incidents.sort_by_key(|i| i.created_at);
        Ok(incidents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Alert, IncidentStatus, Severity, StatusChange};
    use error_handling_rs::ErrorKind;
    use serde_json::json;

    fn incident() -> Incident {
        Incident::from_alert(
            Alert {
                title: "Queue backlog".to_string(),
                description: String::new(),
                severity: Severity::P2,
                source: "cloudwatch".to_string(),
                affected_services: vec!["billing-worker".to_string()],
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_create_get_list() {
        let store = InMemoryIncidentStore::new();
        let created = store.create(incident()).await.unwrap();

        assert_eq!(store.get(created.id).await.unwrap(), created);
        assert_eq!(store.list().await.unwrap().len(), 1);
        assert!(store.create(created).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_incident_is_not_found() {
        let store = InMemoryIncidentStore::new();
        let err = store.get(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);

        let err = store
            .update(Uuid::new_v4(), IncidentUpdate::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_update_keeps_unrelated_metadata() {
        let store = InMemoryIncidentStore::new();
        let created = store.create(incident()).await.unwrap();

        store
            .update(created.id, IncidentUpdate::new().metadata("a", json!(1)))
            .await
            .unwrap();
        let updated = store
            .update(created.id, IncidentUpdate::new().metadata("b", json!(2)))
            .await
            .unwrap();

        assert_eq!(updated.metadata["a"], json!(1));
        assert_eq!(updated.metadata["b"], json!(2));
    }

    #[tokio::test]
    async fn test_status_change_must_start_from_stored_status() {
        let store = InMemoryIncidentStore::new();
        let mut local = store.create(incident()).await.unwrap();
        let mut other = local.clone();

        let change = WorkflowStateMachine::transition(
            &mut other,
            IncidentStatus::Escalated,
            None,
            Utc::now(),
        )
        .unwrap();
        store
            .update(other.id, IncidentUpdate::new().status_change(change))
            .await
            .unwrap();

        // The stale copy still believes the incident is RECEIVED
        let change = WorkflowStateMachine::transition(
            &mut local,
            IncidentStatus::Investigating,
            None,
            Utc::now(),
        )
        .unwrap();
        let err = store
            .update(
                local.id,
                IncidentUpdate::new()
                    .status_change(change)
                    .metadata("note", json!("dropped")),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Conflict);
        let stored = store.get(local.id).await.unwrap();
        assert_eq!(stored.status, IncidentStatus::Escalated);
        assert!(stored.metadata.get("note").is_none());
    }

    #[tokio::test]
    async fn test_invalid_edge_is_rejected() {
        let store = InMemoryIncidentStore::new();
        let created = store.create(incident()).await.unwrap();
        let change = StatusChange {
            from: IncidentStatus::Received,
            to: IncidentStatus::Resolved,
            at: Utc::now(),
            reason: None,
        };

        let err = store
            .update(created.id, IncidentUpdate::new().status_change(change))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn test_len_tracks_creates() {
        let store = InMemoryIncidentStore::new();
        tokio_test::block_on(async {
            assert!(store.is_empty().await);
            store.create(incident()).await.unwrap();
            store.create(incident()).await.unwrap();
            assert_eq!(store.len().await, 2);
        });
    }
}
