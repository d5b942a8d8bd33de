//! Incident reports.

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use tracing::{debug, info, warn};

use super::residents::fetch_resident;
use super::{ensure_exists, now, write_audit, Storage};
use crate::error::{Error, Result};
use crate::model::{
    AuditRecord, Incident, IncidentFilter, IncidentStatus, IncidentStatusChange, NewIncident,
    Page,
};

const INCIDENT_COLUMNS: &str = "id, apartment_id, reporter_resident_id, title, description, \
     category, priority, status, assignee, resolution, created_at, updated_at, resolved_at";

fn fetch_incident(conn: &Connection, id: i64) -> Result<Incident> {
    conn.query_row(
        &format!("SELECT {INCIDENT_COLUMNS} FROM incidents WHERE id = ?1"),
        [id],
        row_to_incident,
    )
    .optional()?
    .ok_or_else(|| Error::not_found("incident", id))
}

impl Storage {
    /// Record a new incident in the `open` state.
    ///
    /// A reporter without an apartment files against the reporter's own
    /// apartment.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown apartment or reporter, or a validation
    /// error for a blank title.
    pub fn report_incident(&mut self, input: NewIncident, actor: &str) -> Result<Incident> {
        let mut input = input.normalized()?;
        let tx = self.write_txn()?;
        if let Some(resident_id) = input.reporter_resident_id {
            let reporter = fetch_resident(&tx, resident_id)?;
            input.apartment_id.get_or_insert(reporter.apartment_id);
        }
        if let Some(apartment_id) = input.apartment_id {
            ensure_exists(&tx, "apartments", "apartment", apartment_id)?;
        }

        let reported_at = now();
        tx.execute(
            "INSERT INTO incidents (apartment_id, reporter_resident_id, title, description,
                 category, priority, priority_rank, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            params![
                input.apartment_id,
                input.reporter_resident_id,
                input.title,
                input.description,
                input.category,
                input.priority,
                input.priority.rank(),
                IncidentStatus::Open,
                reported_at,
            ],
        )?;
        let id = tx.last_insert_rowid();
        write_audit(
            &tx,
            &AuditRecord::new(actor, "incident.reported", "incident", id).with_detail(json!({
                "title": input.title,
                "category": input.category,
                "priority": input.priority,
            })),
        )?;
        let incident = fetch_incident(&tx, id)?;
        tx.commit()?;

        info!(
            "Incident {} reported: {} ({})",
            id, incident.title, incident.priority
        );
        Ok(incident)
    }

    /// Get an incident by ID.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no such incident.
    pub fn get_incident(&self, id: i64) -> Result<Incident> {
        fetch_incident(&self.conn, id)
    }

    /// List incidents, most urgent then newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_incidents(&self, filter: &IncidentFilter, page: Page) -> Result<Vec<Incident>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {INCIDENT_COLUMNS} FROM incidents
             WHERE (?1 IS NULL OR status = ?1)
               AND (?2 IS NULL OR priority = ?2)
               AND (?3 IS NULL OR apartment_id = ?3)
             ORDER BY priority_rank DESC, created_at DESC, id DESC LIMIT ?4 OFFSET ?5"
        ))?;
        let incidents = stmt
            .query_map(
                params![
                    filter.status,
                    filter.priority,
                    filter.apartment_id,
                    page.limit,
                    page.offset
                ],
                row_to_incident,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        debug!("Listed {} incidents", incidents.len());
        Ok(incidents)
    }

    /// Move an incident through its workflow.
    ///
    /// Resolving stamps `resolved_at` and requires a resolution note;
    /// reopening clears both.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `InvalidTransition` for a move the workflow does
    /// not allow, or a validation error when resolving without a resolution.
    pub fn update_incident_status(
        &mut self,
        id: i64,
        change: IncidentStatusChange,
        actor: &str,
    ) -> Result<Incident> {
        let change = change.normalized();
        let tx = self.write_txn()?;
        let mut incident = fetch_incident(&tx, id)?;
        let from = incident.status;
        if !from.can_transition_to(change.status) {
            warn!(
                "Rejected incident {} status change {} -> {}",
                id, from, change.status
            );
            return Err(Error::invalid_transition("incident", from, change.status));
        }

        let changed_at = now();
        match change.status {
            IncidentStatus::Resolved => {
                let Some(resolution) = change.resolution.clone() else {
                    return Err(Error::validation(
                        "a resolution is required to resolve an incident",
                    ));
                };
                incident.resolution = Some(resolution);
                incident.resolved_at = Some(changed_at);
            }
            IncidentStatus::Open => {
                incident.resolution = None;
                incident.resolved_at = None;
            }
            IncidentStatus::InProgress | IncidentStatus::Closed => {
                if change.resolution.is_some() {
                    incident.resolution.clone_from(&change.resolution);
                }
            }
        }
        if change.assignee.is_some() {
            incident.assignee.clone_from(&change.assignee);
        }
        incident.status = change.status;
        incident.updated_at = changed_at;

        tx.execute(
            "UPDATE incidents SET status = ?1, assignee = ?2, resolution = ?3, updated_at = ?4,
                 resolved_at = ?5
             WHERE id = ?6",
            params![
                incident.status,
                incident.assignee,
                incident.resolution,
                incident.updated_at,
                incident.resolved_at,
                id
            ],
        )?;
        write_audit(
            &tx,
            &AuditRecord::new(actor, "incident.status_changed", "incident", id).with_detail(
                json!({
                    "from": from,
                    "to": incident.status,
                    "assignee": incident.assignee,
                }),
            ),
        )?;
        tx.commit()?;

        info!("Incident {} moved from {} to {}", id, from, incident.status);
        Ok(incident)
    }
}

fn row_to_incident(row: &rusqlite::Row<'_>) -> rusqlite::Result<Incident> {
    Ok(Incident {
        id: row.get(0)?,
        apartment_id: row.get(1)?,
        reporter_resident_id: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        category: row.get(5)?,
        priority: row.get(6)?,
        status: row.get(7)?,
        assignee: row.get(8)?,
        resolution: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
        resolved_at: row.get(12)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IncidentCategory, Priority};
    use crate::storage::test_support::{self, ACTOR};

    fn report(title: &str, priority: Priority) -> NewIncident {
        NewIncident {
            apartment_id: None,
            reporter_resident_id: None,
            title: title.to_string(),
            description: "Water on the floor".to_string(),
            category: IncidentCategory::Maintenance,
            priority,
        }
    }

    fn change(status: IncidentStatus, resolution: Option<&str>) -> IncidentStatusChange {
        IncidentStatusChange {
            status,
            assignee: None,
            resolution: resolution.map(ToString::to_string),
        }
    }

    #[test]
    fn test_report_defaults_apartment_from_reporter() {
        let mut storage = test_support::storage();
        let apt = test_support::apartment(&mut storage, "A-101", 60.0);
        let resident = test_support::resident(&mut storage, apt.id, "Reporter");

        let mut input = report("Leak", Priority::High);
        input.reporter_resident_id = Some(resident.id);
        let incident = storage.report_incident(input, ACTOR).unwrap();

        assert_eq!(incident.status, IncidentStatus::Open);
        assert_eq!(incident.apartment_id, Some(apt.id));
    }

    #[test]
    fn test_report_unknown_apartment() {
        let mut storage = test_support::storage();
        let mut input = report("Leak", Priority::Low);
        input.apartment_id = Some(40);
        assert!(storage
            .report_incident(input, ACTOR)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_list_orders_urgent_first() {
        let mut storage = test_support::storage();
        storage
            .report_incident(report("Low", Priority::Low), ACTOR)
            .unwrap();
        storage
            .report_incident(report("Urgent", Priority::Urgent), ACTOR)
            .unwrap();
        storage
            .report_incident(report("Medium", Priority::Medium), ACTOR)
            .unwrap();

        let titles: Vec<String> = storage
            .list_incidents(&IncidentFilter::default(), Page::default())
            .unwrap()
            .into_iter()
            .map(|i| i.title)
            .collect();
        assert_eq!(titles, ["Urgent", "Medium", "Low"]);
    }

    #[test]
    fn test_resolve_requires_resolution() {
        let mut storage = test_support::storage();
        let incident = storage
            .report_incident(report("Leak", Priority::High), ACTOR)
            .unwrap();

        let err = storage
            .update_incident_status(incident.id, change(IncidentStatus::Resolved, Some(" ")), ACTOR)
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        let resolved = storage
            .update_incident_status(
                incident.id,
                change(IncidentStatus::Resolved, Some("Pipe replaced")),
                ACTOR,
            )
            .unwrap();
        assert!(resolved.resolved_at.is_some());
        assert_eq!(resolved.resolution.as_deref(), Some("Pipe replaced"));
    }

    #[test]
    fn test_reopen_clears_resolution() {
        let mut storage = test_support::storage();
        let incident = storage
            .report_incident(report("Leak", Priority::High), ACTOR)
            .unwrap();
        storage
            .update_incident_status(
                incident.id,
                change(IncidentStatus::Resolved, Some("Pipe replaced")),
                ACTOR,
            )
            .unwrap();

        let reopened = storage
            .update_incident_status(incident.id, change(IncidentStatus::Open, None), ACTOR)
            .unwrap();
        assert_eq!(reopened.status, IncidentStatus::Open);
        assert!(reopened.resolved_at.is_none());
        assert_eq!(storage.get_incident(incident.id).unwrap(), reopened);
    }

    #[test]
    fn test_closed_is_terminal() {
        let mut storage = test_support::storage();
        let incident = storage
            .report_incident(report("Noise", Priority::Low), ACTOR)
            .unwrap();
        storage
            .update_incident_status(incident.id, change(IncidentStatus::Closed, None), ACTOR)
            .unwrap();

        let err = storage
            .update_incident_status(incident.id, change(IncidentStatus::Open, None), ACTOR)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[test]
    fn test_assignment_is_kept() {
        let mut storage = test_support::storage();
        let incident = storage
            .report_incident(report("Lift", Priority::Urgent), ACTOR)
            .unwrap();
        let mut start = change(IncidentStatus::InProgress, None);
        start.assignee = Some("Technician Tuan".to_string());
        storage
            .update_incident_status(incident.id, start, ACTOR)
            .unwrap();

        let resolved = storage
            .update_incident_status(
                incident.id,
                change(IncidentStatus::Resolved, Some("Cable fixed")),
                ACTOR,
            )
            .unwrap();
        assert_eq!(resolved.assignee.as_deref(), Some("Technician Tuan"));
    }
}
