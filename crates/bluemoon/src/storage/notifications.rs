//! Notices and per-apartment read receipts.

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use tracing::{debug, info};

use super::apartments::fetch_apartment;
use super::{ensure_exists, now, write_audit, Storage};
use crate::error::{Error, Result};
use crate::model::{
    Apartment, ApartmentNotification, Audience, AuditRecord, NewNotification, Notification, Page,
};

const NOTIFICATION_COLUMNS: &str = "id, title, body, audience_kind, audience_building, \
     audience_apartment_id, priority, published_at, expires_at";

/// Matches notices addressed to apartment `?1` in building `?2` that have
/// not expired by `?3`.
const ADDRESSED_TO: &str = "(audience_kind = 'all'
        OR (audience_kind = 'building' AND audience_building = ?2)
        OR (audience_kind = 'apartment' AND audience_apartment_id = ?1))
    AND (expires_at IS NULL OR expires_at > ?3)";

fn fetch_notification(conn: &Connection, id: i64) -> Result<Notification> {
    conn.query_row(
        &format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?1"),
        [id],
        row_to_notification,
    )
    .optional()?
    .ok_or_else(|| Error::not_found("notification", id))
}

fn addressed_to(notification: &Notification, apartment: &Apartment) -> bool {
    match &notification.audience {
        Audience::All => true,
        Audience::Building { building } => *building == apartment.building,
        Audience::Apartment { apartment_id } => *apartment_id == apartment.id,
    }
}

impl Storage {
    /// Publish a notice.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad input or an expiry in the past, or
    /// `NotFound` when addressed to an unknown apartment.
    pub fn publish_notification(
        &mut self,
        input: NewNotification,
        actor: &str,
    ) -> Result<Notification> {
        let published_at = now();
        let input = input.normalized(published_at)?;
        let tx = self.write_txn()?;

        let (building, apartment_id) = match &input.audience {
            Audience::All => (None, None),
            Audience::Building { building } => (Some(building.clone()), None),
            Audience::Apartment { apartment_id } => {
                ensure_exists(&tx, "apartments", "apartment", *apartment_id)?;
                (None, Some(*apartment_id))
            }
        };
        tx.execute(
            "INSERT INTO notifications (title, body, audience_kind, audience_building,
                 audience_apartment_id, priority, published_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                input.title,
                input.body,
                input.audience.kind(),
                building,
                apartment_id,
                input.priority,
                published_at,
                input.expires_at,
            ],
        )?;
        let id = tx.last_insert_rowid();
        write_audit(
            &tx,
            &AuditRecord::new(actor, "notification.published", "notification", id)
                .with_detail(json!({ "title": input.title, "audience": input.audience })),
        )?;
        let notification = fetch_notification(&tx, id)?;
        tx.commit()?;

        info!(
            "Published notification {} to {}",
            id,
            notification.audience.kind()
        );
        Ok(notification)
    }

    /// Get a notice by ID.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no such notice.
    pub fn get_notification(&self, id: i64) -> Result<Notification> {
        fetch_notification(&self.conn, id)
    }

    /// List every notice, newest first, including expired ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_notifications(&self, page: Page) -> Result<Vec<Notification>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications
             ORDER BY published_at DESC, id DESC LIMIT ?1 OFFSET ?2"
        ))?;
        let notifications = stmt
            .query_map(params![page.limit, page.offset], row_to_notification)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(notifications)
    }

    /// Notices currently addressed to an apartment, important ones first.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no such apartment.
    pub fn notifications_for_apartment(
        &self,
        apartment_id: i64,
        unread_only: bool,
    ) -> Result<Vec<ApartmentNotification>> {
        let apartment = fetch_apartment(&self.conn, apartment_id)?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {NOTIFICATION_COLUMNS},
                 EXISTS(SELECT 1 FROM notification_reads r
                        WHERE r.notification_id = notifications.id AND r.apartment_id = ?1)
             FROM notifications
             WHERE {ADDRESSED_TO}
               AND (?4 = 0 OR NOT EXISTS(SELECT 1 FROM notification_reads r
                        WHERE r.notification_id = notifications.id AND r.apartment_id = ?1))
             ORDER BY priority = 'important' DESC, published_at DESC, id DESC"
        ))?;
        let notices = stmt
            .query_map(
                params![apartment.id, apartment.building, now(), unread_only],
                |row| {
                    Ok(ApartmentNotification {
                        notification: row_to_notification(row)?,
                        read: row.get(9)?,
                    })
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        debug!(
            "Apartment {} has {} notices",
            apartment.code,
            notices.len()
        );
        Ok(notices)
    }

    /// Mark a notice read for an apartment. Marking twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown notice or apartment, or a validation
    /// error if the notice is not addressed to the apartment.
    pub fn mark_read(&mut self, notification_id: i64, apartment_id: i64) -> Result<()> {
        let tx = self.write_txn()?;
        let notification = fetch_notification(&tx, notification_id)?;
        let apartment = fetch_apartment(&tx, apartment_id)?;
        if !addressed_to(&notification, &apartment) {
            return Err(Error::validation(format!(
                "notification {notification_id} is not addressed to apartment {}",
                apartment.code
            )));
        }
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO notification_reads (notification_id, apartment_id, read_at)
             VALUES (?1, ?2, ?3)",
            params![notification_id, apartment_id, now()],
        )?;
        tx.commit()?;

        if inserted > 0 {
            debug!(
                "Apartment {} read notification {}",
                apartment.code, notification_id
            );
        }
        Ok(())
    }

    /// Withdraw a notice along with its read receipts.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no such notice.
    pub fn delete_notification(&mut self, id: i64, actor: &str) -> Result<()> {
        let tx = self.write_txn()?;
        let notification = fetch_notification(&tx, id)?;
        tx.execute("DELETE FROM notifications WHERE id = ?1", [id])?;
        write_audit(
            &tx,
            &AuditRecord::new(actor, "notification.deleted", "notification", id)
                .with_detail(json!({ "title": notification.title })),
        )?;
        tx.commit()?;

        info!("Deleted notification {}", id);
        Ok(())
    }
}

fn row_to_notification(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notification> {
    let kind: String = row.get(3)?;
    let audience = Audience::from_columns(&kind, row.get(4)?, row.get(5)?).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.to_string().into())
    })?;
    Ok(Notification {
        id: row.get(0)?,
        title: row.get(1)?,
        body: row.get(2)?,
        audience,
        priority: row.get(6)?,
        published_at: row.get(7)?,
        expires_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::model::NotificationPriority;
    use crate::storage::test_support::{self, ACTOR};

    fn notice(title: &str, audience: Audience) -> NewNotification {
        NewNotification {
            title: title.to_string(),
            body: "Water will be shut off from 9:00 to 11:00.".to_string(),
            audience,
            priority: NotificationPriority::Normal,
            expires_at: None,
        }
    }

    #[test]
    fn test_publish_and_get() {
        let mut storage = test_support::storage();
        let published = storage
            .publish_notification(
                notice(
                    "Maintenance",
                    Audience::Building {
                        building: "Tower A".to_string(),
                    },
                ),
                ACTOR,
            )
            .unwrap();
        let fetched = storage.get_notification(published.id).unwrap();
        assert_eq!(fetched, published);
        assert_eq!(storage.list_notifications(Page::default()).unwrap().len(), 1);
    }

    #[test]
    fn test_publish_to_unknown_apartment() {
        let mut storage = test_support::storage();
        let err = storage
            .publish_notification(notice("Hi", Audience::Apartment { apartment_id: 12 }), ACTOR)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_apartment_sees_its_audiences() {
        let mut storage = test_support::storage();
        let apt = test_support::apartment(&mut storage, "A-101", 60.0);
        let other = test_support::apartment(&mut storage, "A-102", 60.0);

        storage
            .publish_notification(notice("Everyone", Audience::All), ACTOR)
            .unwrap();
        storage
            .publish_notification(
                notice(
                    "Tower A",
                    Audience::Building {
                        building: "Tower A".to_string(),
                    },
                ),
                ACTOR,
            )
            .unwrap();
        storage
            .publish_notification(
                notice(
                    "Tower B",
                    Audience::Building {
                        building: "Tower B".to_string(),
                    },
                ),
                ACTOR,
            )
            .unwrap();
        storage
            .publish_notification(
                notice("Just you", Audience::Apartment { apartment_id: apt.id }),
                ACTOR,
            )
            .unwrap();
        storage
            .publish_notification(
                notice(
                    "Neighbour",
                    Audience::Apartment {
                        apartment_id: other.id,
                    },
                ),
                ACTOR,
            )
            .unwrap();

        let mut titles: Vec<String> = storage
            .notifications_for_apartment(apt.id, false)
            .unwrap()
            .into_iter()
            .map(|n| n.notification.title)
            .collect();
        titles.sort();
        assert_eq!(titles, ["Everyone", "Just you", "Tower A"]);
    }

    #[test]
    fn test_expired_notices_hidden() {
        let mut storage = test_support::storage();
        let apt = test_support::apartment(&mut storage, "A-101", 60.0);
        let published = storage
            .publish_notification(
                NewNotification {
                    expires_at: Some(now() + Duration::hours(1)),
                    ..notice("Soon gone", Audience::All)
                },
                ACTOR,
            )
            .unwrap();
        assert_eq!(storage.notifications_for_apartment(apt.id, false).unwrap().len(), 1);

        storage
            .conn
            .execute(
                "UPDATE notifications SET expires_at = ?1 WHERE id = ?2",
                params![now() - Duration::minutes(1), published.id],
            )
            .unwrap();
        assert!(storage
            .notifications_for_apartment(apt.id, false)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_mark_read_is_idempotent() {
        let mut storage = test_support::storage();
        let apt = test_support::apartment(&mut storage, "A-101", 60.0);
        let published = storage
            .publish_notification(notice("Everyone", Audience::All), ACTOR)
            .unwrap();

        storage.mark_read(published.id, apt.id).unwrap();
        storage.mark_read(published.id, apt.id).unwrap();

        let all = storage.notifications_for_apartment(apt.id, false).unwrap();
        assert!(all[0].read);
        assert!(storage
            .notifications_for_apartment(apt.id, true)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_mark_read_wrong_audience() {
        let mut storage = test_support::storage();
        let apt = test_support::apartment(&mut storage, "A-101", 60.0);
        let published = storage
            .publish_notification(
                notice(
                    "Tower B",
                    Audience::Building {
                        building: "Tower B".to_string(),
                    },
                ),
                ACTOR,
            )
            .unwrap();
        let err = storage.mark_read(published.id, apt.id).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_delete_removes_receipts() {
        let mut storage = test_support::storage();
        let apt = test_support::apartment(&mut storage, "A-101", 60.0);
        let published = storage
            .publish_notification(notice("Everyone", Audience::All), ACTOR)
            .unwrap();
        storage.mark_read(published.id, apt.id).unwrap();

        storage.delete_notification(published.id, ACTOR).unwrap();
        let receipts: i64 = storage
            .conn
            .query_row("SELECT COUNT(*) FROM notification_reads", [], |row| row.get(0))
            .unwrap();
        assert_eq!(receipts, 0);
    }
}
