//! Writes notification events.
//!
//! An event is only ever visible together with its record link and, when
//! the rule names one, its profile link. All three rows are written inside
//! one savepoint.

use crate::{
    error::SecurityResult,
    model::{ProfileRef, Record},
    store::SecurityStore,
    types::RowId,
};

pub struct EventMaterializer;

impl EventMaterializer {
    /// Create one event for `record`.
    ///
    /// Returns `None` when `rule` already has an event for this record and
    /// user, so re-running rules never duplicates notifications.
    pub fn create_event(
        store: &SecurityStore,
        rule: &str,
        description: &str,
        record: &Record,
        trigger: Option<ProfileRef>,
        user: Option<&str>,
    ) -> SecurityResult<Option<RowId>> {
        if store.event_exists(rule, record.kind(), record.id(), user)? {
            log::debug!("{rule} event for {record} (user {user:?}) already exists");
            return Ok(None);
        }

        let event_id = store.atomic(|store| {
            let event_id = store.insert_event(rule, description, record.triggered_at(), user)?;
            store.insert_record_event_link(event_id, record.kind(), record.id())?;
            if let Some(profile) = trigger {
                store.insert_profile_event_link(event_id, profile)?;
            }
            Ok(event_id)
        })?;

        log::debug!("event {event_id}: {rule} for {record} (user {user:?})");
        Ok(Some(event_id))
    }
}
