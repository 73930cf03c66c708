//! Disbursement queries.

use super::{enum_col, timestamp_col, to_timestamp, SecurityStore};
use crate::{
    error::{SecurityError, SecurityResult},
    model::{
        Disbursement, DisbursementMethod, DisbursementResolution, NewDisbursement, ProfileKind,
        ProfileRef,
    },
    types::RowId,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

const DISBURSEMENT_COLUMNS: &str =
    "id, amount, created, prisoner_number, prisoner_name, prison, resolution, method,
     recipient_name, sort_code, account_number, roll_number,
     recipient_profile_id, prisoner_profile_id, profiled";

fn disbursement_from_row(row: &Row<'_>) -> rusqlite::Result<Disbursement> {
    Ok(Disbursement {
        id:                   row.get(0)?,
        amount:               row.get(1)?,
        created:              timestamp_col(row, 2)?,
        prisoner_number:      row.get(3)?,
        prisoner_name:        row.get(4)?,
        prison:               row.get(5)?,
        resolution:           enum_col(row, 6, DisbursementResolution::parse)?,
        method:               enum_col(row, 7, DisbursementMethod::parse)?,
        recipient_name:       row.get(8)?,
        sort_code:            row.get(9)?,
        account_number:       row.get(10)?,
        roll_number:          row.get(11)?,
        recipient_profile_id: row.get(12)?,
        prisoner_profile_id:  row.get(13)?,
        profiled:             row.get(14)?,
    })
}

impl SecurityStore {
    pub fn insert_disbursement(&self, d: &NewDisbursement) -> SecurityResult<RowId> {
        self.conn.execute(
            "INSERT INTO disbursement
             (amount, created, prisoner_number, prisoner_name, prison, resolution, method,
              recipient_name, sort_code, account_number, roll_number)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                d.amount,
                to_timestamp(d.created),
                d.prisoner_number,
                d.prisoner_name,
                d.prison,
                d.resolution.as_str(),
                d.method.as_str(),
                d.recipient_name,
                d.sort_code,
                d.account_number,
                d.roll_number,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_disbursement(&self, disbursement_id: RowId) -> SecurityResult<Disbursement> {
        self.conn
            .query_row(
                &format!("SELECT {DISBURSEMENT_COLUMNS} FROM disbursement WHERE id = ?1"),
                params![disbursement_id],
                disbursement_from_row,
            )
            .optional()?
            .ok_or(SecurityError::NotFound { kind: "disbursement", id: disbursement_id })
    }

    /// Sent disbursements the aggregator has not processed yet, in id order.
    pub fn unprofiled_disbursement_ids(&self) -> SecurityResult<Vec<RowId>> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM disbursement
             WHERE profiled = 0 AND resolution = ?1
             ORDER BY id ASC",
        )?;
        let ids = stmt
            .query_map(params![DisbursementResolution::Sent.as_str()], |row| row.get(0))?
            .collect::<Result<Vec<RowId>, _>>()?;
        Ok(ids)
    }

    pub fn mark_disbursement_profiled(
        &self,
        disbursement_id: RowId,
        recipient_profile_id: Option<RowId>,
        prisoner_profile_id: Option<RowId>,
    ) -> SecurityResult<()> {
        self.conn.execute(
            "UPDATE disbursement
             SET recipient_profile_id = ?2, prisoner_profile_id = ?3, profiled = 1
             WHERE id = ?1",
            params![disbursement_id, recipient_profile_id, prisoner_profile_id],
        )?;
        Ok(())
    }

    // ── Rule queries ───────────────────────────────────────────

    /// Disbursements to a recipient profile created in `[since, until]`.
    pub fn count_recipient_disbursements_between(
        &self,
        recipient_profile_id: RowId,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> SecurityResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM disbursement
             WHERE recipient_profile_id = ?1 AND created >= ?2 AND created <= ?3",
            params![recipient_profile_id, to_timestamp(since), to_timestamp(until)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Distinct recipients a prisoner sent money to in `[since, until]`.
    pub fn count_distinct_recipients_for_prisoner(
        &self,
        prisoner_profile_id: RowId,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> SecurityResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT recipient_profile_id) FROM disbursement
             WHERE prisoner_profile_id = ?1 AND recipient_profile_id IS NOT NULL
               AND created >= ?2 AND created <= ?3",
            params![prisoner_profile_id, to_timestamp(since), to_timestamp(until)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Distinct prisoners who sent money to a recipient in `[since, until]`.
    pub fn count_distinct_prisoners_for_recipient(
        &self,
        recipient_profile_id: RowId,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> SecurityResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT prisoner_profile_id) FROM disbursement
             WHERE recipient_profile_id = ?1 AND prisoner_profile_id IS NOT NULL
               AND created >= ?2 AND created <= ?3",
            params![recipient_profile_id, to_timestamp(since), to_timestamp(until)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Disbursements linked to a profile created in `[since, until]`, oldest first.
    pub fn disbursements_for_profile_between(
        &self,
        profile: ProfileRef,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> SecurityResult<Vec<Disbursement>> {
        let column = match profile.kind {
            ProfileKind::Recipient => "recipient_profile_id",
            ProfileKind::Prisoner  => "prisoner_profile_id",
            ProfileKind::Sender    => return Ok(Vec::new()),
        };
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DISBURSEMENT_COLUMNS} FROM disbursement
             WHERE {column} = ?1 AND created >= ?2 AND created <= ?3
             ORDER BY created ASC, id ASC"
        ))?;
        let disbursements = stmt
            .query_map(
                params![profile.id, to_timestamp(since), to_timestamp(until)],
                disbursement_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(disbursements)
    }

    // ── Test / summary helpers ─────────────────────────────────

    pub fn disbursement_count(&self) -> SecurityResult<i64> {
        let count: i64 =
            self.conn.query_row("SELECT COUNT(*) FROM disbursement", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn unprofiled_disbursement_count(&self) -> SecurityResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM disbursement WHERE profiled = 0 AND resolution = ?1",
            params![DisbursementResolution::Sent.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub(crate) fn unflag_all_disbursements(&self) -> SecurityResult<usize> {
        let n = self.conn.execute(
            "UPDATE disbursement
             SET profiled = 0, recipient_profile_id = NULL, prisoner_profile_id = NULL",
            [],
        )?;
        Ok(n)
    }
}
