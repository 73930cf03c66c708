//! Credit queries.

use super::{date_col, date_param, enum_col, timestamp_col, to_timestamp, SecurityStore};
use crate::{
    error::{SecurityError, SecurityResult},
    model::{Credit, CreditResolution, CreditSource, NewCredit, ProfileKind, ProfileRef},
    types::RowId,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

const CREDIT_COLUMNS: &str =
    "id, amount, received_at, prisoner_number, prisoner_dob, prisoner_name, prison,
     resolution, source, sender_name, sort_code, account_number, roll_number,
     cardholder_name, card_number_last_digits, card_expiry_date, postcode, email,
     sender_profile_id, prisoner_profile_id, profiled";

fn credit_from_row(row: &Row<'_>) -> rusqlite::Result<Credit> {
    let source_tag: String = row.get(8)?;
    let source = match source_tag.as_str() {
        "bank_transfer" => CreditSource::BankTransfer {
            sender_name:    row.get(9)?,
            sort_code:      row.get(10)?,
            account_number: row.get(11)?,
            roll_number:    row.get(12)?,
        },
        "online" => CreditSource::Online {
            cardholder_name:         row.get(13)?,
            card_number_last_digits: row.get(14)?,
            card_expiry_date:        row.get(15)?,
            postcode:                row.get(16)?,
            email:                   row.get(17)?,
        },
        _ => CreditSource::Unknown,
    };
    Ok(Credit {
        id:                  row.get(0)?,
        amount:              row.get(1)?,
        received_at:         timestamp_col(row, 2)?,
        prisoner_number:     row.get(3)?,
        prisoner_dob:        date_col(row, 4)?,
        prisoner_name:       row.get(5)?,
        prison:              row.get(6)?,
        resolution:          enum_col(row, 7, CreditResolution::parse)?,
        source,
        sender_profile_id:   row.get(18)?,
        prisoner_profile_id: row.get(19)?,
        profiled:            row.get(20)?,
    })
}

impl SecurityStore {
    pub fn insert_credit(&self, credit: &NewCredit) -> SecurityResult<RowId> {
        let (sender_name, sort_code, account_number, roll_number) = match &credit.source {
            CreditSource::BankTransfer { sender_name, sort_code, account_number, roll_number } => {
                (sender_name.clone(), sort_code.clone(), account_number.clone(), roll_number.clone())
            }
            _ => (None, None, None, None),
        };
        let (cardholder_name, last_digits, expiry, postcode, email) = match &credit.source {
            CreditSource::Online {
                cardholder_name,
                card_number_last_digits,
                card_expiry_date,
                postcode,
                email,
            } => (
                cardholder_name.clone(),
                card_number_last_digits.clone(),
                card_expiry_date.clone(),
                postcode.clone(),
                email.clone(),
            ),
            _ => (None, None, None, None, None),
        };

        self.conn.execute(
            "INSERT INTO credit
             (amount, received_at, prisoner_number, prisoner_dob, prisoner_name, prison,
              resolution, source, sender_name, sort_code, account_number, roll_number,
              cardholder_name, card_number_last_digits, card_expiry_date, postcode, email)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                credit.amount,
                to_timestamp(credit.received_at),
                credit.prisoner_number,
                date_param(credit.prisoner_dob),
                credit.prisoner_name,
                credit.prison,
                credit.resolution.as_str(),
                credit.source.as_str(),
                sender_name,
                sort_code,
                account_number,
                roll_number,
                cardholder_name,
                last_digits,
                expiry,
                postcode,
                email,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_credit(&self, credit_id: RowId) -> SecurityResult<Credit> {
        self.conn
            .query_row(
                &format!("SELECT {CREDIT_COLUMNS} FROM credit WHERE id = ?1"),
                params![credit_id],
                credit_from_row,
            )
            .optional()?
            .ok_or(SecurityError::NotFound { kind: "credit", id: credit_id })
    }

    /// Credited credits the aggregator has not processed yet, in id order.
    pub fn unprofiled_credit_ids(&self) -> SecurityResult<Vec<RowId>> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM credit
             WHERE profiled = 0 AND resolution = ?1
             ORDER BY id ASC",
        )?;
        let ids = stmt
            .query_map(params![CreditResolution::Credited.as_str()], |row| row.get(0))?
            .collect::<Result<Vec<RowId>, _>>()?;
        Ok(ids)
    }

    pub fn mark_credit_profiled(
        &self,
        credit_id: RowId,
        sender_profile_id: Option<RowId>,
        prisoner_profile_id: Option<RowId>,
    ) -> SecurityResult<()> {
        self.conn.execute(
            "UPDATE credit
             SET sender_profile_id = ?2, prisoner_profile_id = ?3, profiled = 1
             WHERE id = ?1",
            params![credit_id, sender_profile_id, prisoner_profile_id],
        )?;
        Ok(())
    }

    pub fn set_credit_resolution(
        &self,
        credit_id: RowId,
        resolution: CreditResolution,
    ) -> SecurityResult<()> {
        self.conn.execute(
            "UPDATE credit SET resolution = ?2 WHERE id = ?1",
            params![credit_id, resolution.as_str()],
        )?;
        Ok(())
    }

    // ── Rule queries ───────────────────────────────────────────

    /// Credits from a sender profile received in `[since, until]`.
    pub fn count_sender_credits_between(
        &self,
        sender_profile_id: RowId,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> SecurityResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM credit
             WHERE sender_profile_id = ?1 AND received_at >= ?2 AND received_at <= ?3",
            params![sender_profile_id, to_timestamp(since), to_timestamp(until)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Distinct senders who paid a prisoner in `[since, until]`.
    pub fn count_distinct_senders_for_prisoner(
        &self,
        prisoner_profile_id: RowId,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> SecurityResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT sender_profile_id) FROM credit
             WHERE prisoner_profile_id = ?1 AND sender_profile_id IS NOT NULL
               AND received_at >= ?2 AND received_at <= ?3",
            params![prisoner_profile_id, to_timestamp(since), to_timestamp(until)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Distinct prisoners a sender paid in `[since, until]`.
    pub fn count_distinct_prisoners_for_sender(
        &self,
        sender_profile_id: RowId,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> SecurityResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT prisoner_profile_id) FROM credit
             WHERE sender_profile_id = ?1 AND prisoner_profile_id IS NOT NULL
               AND received_at >= ?2 AND received_at <= ?3",
            params![sender_profile_id, to_timestamp(since), to_timestamp(until)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Credits linked to a profile received in `[since, until]`, oldest first.
    pub fn credits_for_profile_between(
        &self,
        profile: ProfileRef,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> SecurityResult<Vec<Credit>> {
        let column = match profile.kind {
            ProfileKind::Sender    => "sender_profile_id",
            ProfileKind::Prisoner  => "prisoner_profile_id",
            ProfileKind::Recipient => return Ok(Vec::new()),
        };
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CREDIT_COLUMNS} FROM credit
             WHERE {column} = ?1 AND received_at >= ?2 AND received_at <= ?3
             ORDER BY received_at ASC, id ASC"
        ))?;
        let credits = stmt
            .query_map(
                params![profile.id, to_timestamp(since), to_timestamp(until)],
                credit_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(credits)
    }

    // ── Test / summary helpers ─────────────────────────────────

    pub fn credit_count(&self) -> SecurityResult<i64> {
        let count: i64 =
            self.conn.query_row("SELECT COUNT(*) FROM credit", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn unprofiled_credit_count(&self) -> SecurityResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM credit WHERE profiled = 0 AND resolution = ?1",
            params![CreditResolution::Credited.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub(crate) fn unflag_all_credits(&self) -> SecurityResult<usize> {
        let n = self.conn.execute(
            "UPDATE credit SET profiled = 0, sender_profile_id = NULL, prisoner_profile_id = NULL",
            [],
        )?;
        Ok(n)
    }
}
