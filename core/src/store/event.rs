//! Notification event rows and their one-to-one links.

use super::{timestamp_col, to_timestamp, SecurityStore};
use crate::{
    error::SecurityResult,
    model::{Event, ProfileKind, ProfileRef, RecordKind},
    types::RowId,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, types::Value};

/// Filters for listing events, mirroring the query parameters of the
/// events list endpoint.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Empty means every rule.
    pub rules:                Vec<String>,
    /// Inclusive lower bound.
    pub triggered_at_from:    Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub triggered_at_until:   Option<DateTime<Utc>>,
    /// Restrict to events visible to this user: theirs plus user-less ones.
    pub visible_to:           Option<String>,
    pub limit:                Option<usize>,
}

impl SecurityStore {
    pub fn insert_event(
        &self,
        rule: &str,
        description: &str,
        triggered_at: DateTime<Utc>,
        user: Option<&str>,
    ) -> SecurityResult<RowId> {
        self.conn.execute(
            "INSERT INTO event (rule, description, triggered_at, user_id) VALUES (?1, ?2, ?3, ?4)",
            params![rule, description, to_timestamp(triggered_at), user],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn insert_record_event_link(
        &self,
        event_id: RowId,
        record: RecordKind,
        record_id: RowId,
    ) -> SecurityResult<()> {
        let sql = match record {
            RecordKind::Credit => "INSERT INTO credit_event (event_id, credit_id) VALUES (?1, ?2)",
            RecordKind::Disbursement => {
                "INSERT INTO disbursement_event (event_id, disbursement_id) VALUES (?1, ?2)"
            }
        };
        self.conn.execute(sql, params![event_id, record_id])?;
        Ok(())
    }

    pub fn insert_profile_event_link(&self, event_id: RowId, profile: ProfileRef) -> SecurityResult<()> {
        let sql = match profile.kind {
            ProfileKind::Sender => {
                "INSERT INTO sender_profile_event (event_id, sender_profile_id) VALUES (?1, ?2)"
            }
            ProfileKind::Prisoner => {
                "INSERT INTO prisoner_profile_event (event_id, prisoner_profile_id) VALUES (?1, ?2)"
            }
            ProfileKind::Recipient => {
                "INSERT INTO recipient_profile_event (event_id, recipient_profile_id) VALUES (?1, ?2)"
            }
        };
        self.conn.execute(sql, params![event_id, profile.id])?;
        Ok(())
    }

    /// Whether `rule` already produced an event for this record and user.
    pub fn event_exists(
        &self,
        rule: &str,
        record: RecordKind,
        record_id: RowId,
        user: Option<&str>,
    ) -> SecurityResult<bool> {
        let sql = match record {
            RecordKind::Credit => {
                "SELECT COUNT(*) FROM event e
                 JOIN credit_event ce ON ce.event_id = e.id
                 WHERE ce.credit_id = ?1 AND e.rule = ?2 AND e.user_id IS ?3"
            }
            RecordKind::Disbursement => {
                "SELECT COUNT(*) FROM event e
                 JOIN disbursement_event de ON de.event_id = e.id
                 WHERE de.disbursement_id = ?1 AND e.rule = ?2 AND e.user_id IS ?3"
            }
        };
        let count: i64 = self
            .conn
            .query_row(sql, params![record_id, rule, user], |row| row.get(0))?;
        Ok(count > 0)
    }

    /// List events newest first.
    pub fn events(&self, filter: &EventFilter) -> SecurityResult<Vec<Event>> {
        let mut sql = String::from(
            "SELECT e.id, e.rule, e.description, e.triggered_at, e.user_id,
                    ce.credit_id, de.disbursement_id,
                    spe.sender_profile_id, ppe.prisoner_profile_id, rpe.recipient_profile_id
             FROM event e
             LEFT JOIN credit_event ce            ON ce.event_id = e.id
             LEFT JOIN disbursement_event de      ON de.event_id = e.id
             LEFT JOIN sender_profile_event spe   ON spe.event_id = e.id
             LEFT JOIN prisoner_profile_event ppe ON ppe.event_id = e.id
             LEFT JOIN recipient_profile_event rpe ON rpe.event_id = e.id
             WHERE 1 = 1",
        );
        let mut values: Vec<Value> = Vec::new();

        if !filter.rules.is_empty() {
            let placeholders = vec!["?"; filter.rules.len()].join(", ");
            sql.push_str(&format!(" AND e.rule IN ({placeholders})"));
            values.extend(filter.rules.iter().cloned().map(Value::Text));
        }
        if let Some(from) = filter.triggered_at_from {
            sql.push_str(" AND e.triggered_at >= ?");
            values.push(Value::Integer(to_timestamp(from)));
        }
        if let Some(until) = filter.triggered_at_until {
            sql.push_str(" AND e.triggered_at < ?");
            values.push(Value::Integer(to_timestamp(until)));
        }
        if let Some(user) = &filter.visible_to {
            sql.push_str(" AND (e.user_id IS NULL OR e.user_id = ?)");
            values.push(Value::Text(user.clone()));
        }
        sql.push_str(" ORDER BY e.triggered_at DESC, e.id ASC");
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(limit as i64));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let events = stmt
            .query_map(params_from_iter(values), |row| {
                let sender: Option<RowId> = row.get(7)?;
                let prisoner: Option<RowId> = row.get(8)?;
                let recipient: Option<RowId> = row.get(9)?;
                let profile = sender
                    .map(|id| ProfileRef { kind: ProfileKind::Sender, id })
                    .or(prisoner.map(|id| ProfileRef { kind: ProfileKind::Prisoner, id }))
                    .or(recipient.map(|id| ProfileRef { kind: ProfileKind::Recipient, id }));
                Ok(Event {
                    id:              row.get(0)?,
                    rule:            row.get(1)?,
                    description:     row.get(2)?,
                    triggered_at:    timestamp_col(row, 3)?,
                    user:            row.get(4)?,
                    credit_id:       row.get(5)?,
                    disbursement_id: row.get(6)?,
                    profile,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    // ── Test / summary helpers ─────────────────────────────────

    pub fn event_count(&self) -> SecurityResult<i64> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM event", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn event_count_for_rule(&self, rule: &str) -> SecurityResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM event WHERE rule = ?1",
            params![rule],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
