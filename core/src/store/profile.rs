//! Sender, prisoner and recipient profile queries.

use super::{date_col, date_param, timestamp_col, to_timestamp, uuid_col, SecurityStore};
use crate::{
    error::{SecurityError, SecurityResult},
    model::{
        BankAccount, DebitCard, PrisonerProfile, ProfileKind, RecipientProfile, SenderProfile,
    },
    types::{Amount, RowId},
};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProfileCounts {
    pub sender:    usize,
    pub prisoner:  usize,
    pub recipient: usize,
}

impl SecurityStore {
    // ── Bank accounts ──────────────────────────────────────────

    pub fn get_or_create_bank_account(&self, account: &BankAccount) -> SecurityResult<RowId> {
        self.conn.execute(
            "INSERT OR IGNORE INTO bank_account (sort_code, account_number, roll_number)
             VALUES (?1, ?2, ?3)",
            params![account.sort_code, account.account_number, account.roll_number],
        )?;
        let id = self.conn.query_row(
            "SELECT id FROM bank_account
             WHERE sort_code = ?1 AND account_number = ?2 AND roll_number = ?3",
            params![account.sort_code, account.account_number, account.roll_number],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn find_bank_account(&self, account: &BankAccount) -> SecurityResult<Option<RowId>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM bank_account
                 WHERE sort_code = ?1 AND account_number = ?2 AND roll_number = ?3",
                params![account.sort_code, account.account_number, account.roll_number],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    // ── Sender profiles ────────────────────────────────────────

    pub fn create_sender_profile(&self, created: DateTime<Utc>) -> SecurityResult<RowId> {
        self.conn.execute(
            "INSERT INTO sender_profile (created) VALUES (?1)",
            params![to_timestamp(created)],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_sender_profile(&self, id: RowId) -> SecurityResult<SenderProfile> {
        self.conn
            .query_row(
                "SELECT id, credit_count, credit_total, created FROM sender_profile WHERE id = ?1",
                params![id],
                |row| {
                    Ok(SenderProfile {
                        id:           row.get(0)?,
                        credit_count: row.get(1)?,
                        credit_total: row.get(2)?,
                        created:      timestamp_col(row, 3)?,
                    })
                },
            )
            .optional()?
            .ok_or(SecurityError::NotFound { kind: "sender profile", id })
    }

    /// Sender profiles already holding these bank transfer details.
    pub fn find_sender_profiles_by_bank_account(
        &self,
        account: &BankAccount,
    ) -> SecurityResult<Vec<RowId>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT sbt.sender_profile_id
             FROM sender_bank_transfer sbt
             JOIN bank_account ba ON ba.id = sbt.bank_account_id
             WHERE ba.sort_code = ?1 AND ba.account_number = ?2 AND ba.roll_number = ?3
             ORDER BY sbt.sender_profile_id",
        )?;
        let ids = stmt
            .query_map(
                params![account.sort_code, account.account_number, account.roll_number],
                |row| row.get(0),
            )?
            .collect::<Result<Vec<RowId>, _>>()?;
        Ok(ids)
    }

    /// Sender profiles already holding this debit card.
    pub fn find_sender_profiles_by_debit_card(&self, card: &DebitCard) -> SecurityResult<Vec<RowId>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT sender_profile_id FROM sender_debit_card
             WHERE card_number_last_digits = ?1 AND card_expiry_date = ?2 AND postcode = ?3
             ORDER BY sender_profile_id",
        )?;
        let ids = stmt
            .query_map(
                params![card.card_number_last_digits, card.card_expiry_date, card.postcode],
                |row| row.get(0),
            )?
            .collect::<Result<Vec<RowId>, _>>()?;
        Ok(ids)
    }

    pub fn add_sender_bank_transfer(
        &self,
        sender_profile_id: RowId,
        bank_account_id: RowId,
        sender_name: &str,
    ) -> SecurityResult<()> {
        let exists: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sender_bank_transfer
             WHERE sender_profile_id = ?1 AND bank_account_id = ?2 AND sender_name = ?3",
            params![sender_profile_id, bank_account_id, sender_name],
            |row| row.get(0),
        )?;
        if exists == 0 {
            self.conn.execute(
                "INSERT INTO sender_bank_transfer (sender_profile_id, bank_account_id, sender_name)
                 VALUES (?1, ?2, ?3)",
                params![sender_profile_id, bank_account_id, sender_name],
            )?;
        }
        Ok(())
    }

    /// Attach card details to a sender profile, reusing the row if the
    /// profile already holds this card. Returns the card details id.
    pub fn add_sender_debit_card(
        &self,
        sender_profile_id: RowId,
        card: &DebitCard,
    ) -> SecurityResult<RowId> {
        let existing: Option<RowId> = self
            .conn
            .query_row(
                "SELECT id FROM sender_debit_card
                 WHERE sender_profile_id = ?1 AND card_number_last_digits = ?2
                   AND card_expiry_date = ?3 AND postcode = ?4",
                params![
                    sender_profile_id,
                    card.card_number_last_digits,
                    card.card_expiry_date,
                    card.postcode
                ],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }
        self.conn.execute(
            "INSERT INTO sender_debit_card
             (sender_profile_id, card_number_last_digits, card_expiry_date, postcode)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                sender_profile_id,
                card.card_number_last_digits,
                card.card_expiry_date,
                card.postcode
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn add_cardholder_name(&self, debit_card_id: RowId, name: &str) -> SecurityResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO cardholder_name (debit_card_id, name) VALUES (?1, ?2)",
            params![debit_card_id, name],
        )?;
        Ok(())
    }

    pub fn add_sender_email(&self, debit_card_id: RowId, email: &str) -> SecurityResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO sender_email (debit_card_id, email) VALUES (?1, ?2)",
            params![debit_card_id, email],
        )?;
        Ok(())
    }

    pub fn add_sender_prison(&self, sender_profile_id: RowId, prison: &str) -> SecurityResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO sender_profile_prison (sender_profile_id, prison) VALUES (?1, ?2)",
            params![sender_profile_id, prison],
        )?;
        Ok(())
    }

    pub fn increment_sender_totals(&self, sender_profile_id: RowId, amount: Amount) -> SecurityResult<()> {
        self.conn.execute(
            "UPDATE sender_profile
             SET credit_count = credit_count + 1, credit_total = credit_total + ?2
             WHERE id = ?1",
            params![sender_profile_id, amount],
        )?;
        Ok(())
    }

    /// Sender and cardholder names seen for a profile, sorted and deduplicated.
    pub fn sender_names(&self, sender_profile_id: RowId) -> SecurityResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT sender_name FROM sender_bank_transfer WHERE sender_profile_id = ?1
             UNION
             SELECT cn.name FROM cardholder_name cn
             JOIN sender_debit_card sdc ON sdc.id = cn.debit_card_id
             WHERE sdc.sender_profile_id = ?1
             ORDER BY 1",
        )?;
        let names = stmt
            .query_map(params![sender_profile_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    pub fn sender_prisons(&self, sender_profile_id: RowId) -> SecurityResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT prison FROM sender_profile_prison WHERE sender_profile_id = ?1 ORDER BY prison",
        )?;
        let prisons = stmt
            .query_map(params![sender_profile_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(prisons)
    }

    // ── Prisoner profiles ──────────────────────────────────────

    /// Prisoner profiles matching a number and date of birth.
    /// Without a date of birth every profile with the number matches.
    pub fn find_prisoner_profiles(
        &self,
        prisoner_number: &str,
        prisoner_dob: Option<NaiveDate>,
    ) -> SecurityResult<Vec<RowId>> {
        let ids = match prisoner_dob {
            Some(dob) => {
                let mut stmt = self.conn.prepare(
                    "SELECT id FROM prisoner_profile
                     WHERE prisoner_number = ?1 AND prisoner_dob = ?2 ORDER BY id",
                )?;
                let rows = stmt
                    .query_map(params![prisoner_number, date_param(Some(dob))], |row| row.get(0))?
                    .collect::<Result<Vec<RowId>, _>>()?;
                rows
            }
            None => {
                let mut stmt = self.conn.prepare(
                    "SELECT id FROM prisoner_profile WHERE prisoner_number = ?1 ORDER BY id",
                )?;
                let rows = stmt
                    .query_map(params![prisoner_number], |row| row.get(0))?
                    .collect::<Result<Vec<RowId>, _>>()?;
                rows
            }
        };
        Ok(ids)
    }

    /// Profiles with this number created before a date of birth was known.
    pub fn find_prisoner_profiles_without_dob(&self, prisoner_number: &str) -> SecurityResult<Vec<RowId>> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM prisoner_profile
             WHERE prisoner_number = ?1 AND prisoner_dob IS NULL ORDER BY id",
        )?;
        let ids = stmt
            .query_map(params![prisoner_number], |row| row.get(0))?
            .collect::<Result<Vec<RowId>, _>>()?;
        Ok(ids)
    }

    pub fn set_prisoner_dob(&self, prisoner_profile_id: RowId, dob: NaiveDate) -> SecurityResult<()> {
        self.conn.execute(
            "UPDATE prisoner_profile SET prisoner_dob = ?2 WHERE id = ?1",
            params![prisoner_profile_id, date_param(Some(dob))],
        )?;
        Ok(())
    }

    pub fn create_prisoner_profile(
        &self,
        prisoner_number: &str,
        prisoner_dob: Option<NaiveDate>,
        prisoner_name: &str,
        single_offender_id: Option<Uuid>,
        created: DateTime<Utc>,
    ) -> SecurityResult<RowId> {
        self.conn.execute(
            "INSERT INTO prisoner_profile
             (prisoner_number, prisoner_dob, prisoner_name, single_offender_id, created)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                prisoner_number,
                date_param(prisoner_dob),
                prisoner_name,
                single_offender_id.map(|u| u.to_string()),
                to_timestamp(created),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_prisoner_profile(&self, id: RowId) -> SecurityResult<PrisonerProfile> {
        self.conn
            .query_row(
                "SELECT id, prisoner_number, prisoner_dob, prisoner_name, single_offender_id,
                        current_prison, credit_count, credit_total,
                        disbursement_count, disbursement_total, created
                 FROM prisoner_profile WHERE id = ?1",
                params![id],
                |row| {
                    Ok(PrisonerProfile {
                        id:                 row.get(0)?,
                        prisoner_number:    row.get(1)?,
                        prisoner_dob:       date_col(row, 2)?,
                        prisoner_name:      row.get(3)?,
                        single_offender_id: uuid_col(row, 4)?,
                        current_prison:     row.get(5)?,
                        credit_count:       row.get(6)?,
                        credit_total:       row.get(7)?,
                        disbursement_count: row.get(8)?,
                        disbursement_total: row.get(9)?,
                        created:            timestamp_col(row, 10)?,
                    })
                },
            )
            .optional()?
            .ok_or(SecurityError::NotFound { kind: "prisoner profile", id })
    }

    pub fn add_prisoner_prison(&self, prisoner_profile_id: RowId, prison: &str) -> SecurityResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO prisoner_profile_prison (prisoner_profile_id, prison)
             VALUES (?1, ?2)",
            params![prisoner_profile_id, prison],
        )?;
        Ok(())
    }

    pub fn add_provided_prisoner_name(&self, prisoner_profile_id: RowId, name: &str) -> SecurityResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO prisoner_provided_name (prisoner_profile_id, name)
             VALUES (?1, ?2)",
            params![prisoner_profile_id, name],
        )?;
        Ok(())
    }

    pub fn link_prisoner_sender(&self, prisoner_profile_id: RowId, sender_profile_id: RowId) -> SecurityResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO prisoner_profile_sender (prisoner_profile_id, sender_profile_id)
             VALUES (?1, ?2)",
            params![prisoner_profile_id, sender_profile_id],
        )?;
        Ok(())
    }

    pub fn link_prisoner_recipient(
        &self,
        prisoner_profile_id: RowId,
        recipient_profile_id: RowId,
    ) -> SecurityResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO prisoner_profile_recipient (prisoner_profile_id, recipient_profile_id)
             VALUES (?1, ?2)",
            params![prisoner_profile_id, recipient_profile_id],
        )?;
        Ok(())
    }

    pub fn increment_prisoner_credit_totals(&self, prisoner_profile_id: RowId, amount: Amount) -> SecurityResult<()> {
        self.conn.execute(
            "UPDATE prisoner_profile
             SET credit_count = credit_count + 1, credit_total = credit_total + ?2
             WHERE id = ?1",
            params![prisoner_profile_id, amount],
        )?;
        Ok(())
    }

    pub fn increment_prisoner_disbursement_totals(
        &self,
        prisoner_profile_id: RowId,
        amount: Amount,
    ) -> SecurityResult<()> {
        self.conn.execute(
            "UPDATE prisoner_profile
             SET disbursement_count = disbursement_count + 1,
                 disbursement_total = disbursement_total + ?2
             WHERE id = ?1",
            params![prisoner_profile_id, amount],
        )?;
        Ok(())
    }

    pub fn prisoner_sender_ids(&self, prisoner_profile_id: RowId) -> SecurityResult<Vec<RowId>> {
        let mut stmt = self.conn.prepare(
            "SELECT sender_profile_id FROM prisoner_profile_sender
             WHERE prisoner_profile_id = ?1 ORDER BY sender_profile_id",
        )?;
        let ids = stmt
            .query_map(params![prisoner_profile_id], |row| row.get(0))?
            .collect::<Result<Vec<RowId>, _>>()?;
        Ok(ids)
    }

    pub fn prisoner_recipient_ids(&self, prisoner_profile_id: RowId) -> SecurityResult<Vec<RowId>> {
        let mut stmt = self.conn.prepare(
            "SELECT recipient_profile_id FROM prisoner_profile_recipient
             WHERE prisoner_profile_id = ?1 ORDER BY recipient_profile_id",
        )?;
        let ids = stmt
            .query_map(params![prisoner_profile_id], |row| row.get(0))?
            .collect::<Result<Vec<RowId>, _>>()?;
        Ok(ids)
    }

    // ── Recipient profiles ─────────────────────────────────────

    pub fn create_recipient_profile(&self, created: DateTime<Utc>) -> SecurityResult<RowId> {
        self.conn.execute(
            "INSERT INTO recipient_profile (created) VALUES (?1)",
            params![to_timestamp(created)],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_recipient_profile(&self, id: RowId) -> SecurityResult<RecipientProfile> {
        self.conn
            .query_row(
                "SELECT id, disbursement_count, disbursement_total, created
                 FROM recipient_profile WHERE id = ?1",
                params![id],
                |row| {
                    Ok(RecipientProfile {
                        id:                 row.get(0)?,
                        disbursement_count: row.get(1)?,
                        disbursement_total: row.get(2)?,
                        created:            timestamp_col(row, 3)?,
                    })
                },
            )
            .optional()?
            .ok_or(SecurityError::NotFound { kind: "recipient profile", id })
    }

    pub fn find_recipient_profiles_by_bank_account(
        &self,
        account: &BankAccount,
    ) -> SecurityResult<Vec<RowId>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT rbt.recipient_profile_id
             FROM recipient_bank_transfer rbt
             JOIN bank_account ba ON ba.id = rbt.bank_account_id
             WHERE ba.sort_code = ?1 AND ba.account_number = ?2 AND ba.roll_number = ?3
             ORDER BY rbt.recipient_profile_id",
        )?;
        let ids = stmt
            .query_map(
                params![account.sort_code, account.account_number, account.roll_number],
                |row| row.get(0),
            )?
            .collect::<Result<Vec<RowId>, _>>()?;
        Ok(ids)
    }

    /// Recipient profiles without bank details: the cheque recipient.
    pub fn find_cheque_recipient_profiles(&self) -> SecurityResult<Vec<RowId>> {
        let mut stmt = self.conn.prepare(
            "SELECT rp.id FROM recipient_profile rp
             WHERE NOT EXISTS (
                 SELECT 1 FROM recipient_bank_transfer rbt WHERE rbt.recipient_profile_id = rp.id
             )
             ORDER BY rp.id",
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<RowId>, _>>()?;
        Ok(ids)
    }

    pub fn add_recipient_bank_transfer(
        &self,
        recipient_profile_id: RowId,
        bank_account_id: RowId,
    ) -> SecurityResult<()> {
        self.conn.execute(
            "INSERT INTO recipient_bank_transfer (recipient_profile_id, bank_account_id)
             SELECT ?1, ?2
             WHERE NOT EXISTS (
                 SELECT 1 FROM recipient_bank_transfer
                 WHERE recipient_profile_id = ?1 AND bank_account_id = ?2
             )",
            params![recipient_profile_id, bank_account_id],
        )?;
        Ok(())
    }

    pub fn add_recipient_prison(&self, recipient_profile_id: RowId, prison: &str) -> SecurityResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO recipient_profile_prison (recipient_profile_id, prison)
             VALUES (?1, ?2)",
            params![recipient_profile_id, prison],
        )?;
        Ok(())
    }

    pub fn increment_recipient_totals(&self, recipient_profile_id: RowId, amount: Amount) -> SecurityResult<()> {
        self.conn.execute(
            "UPDATE recipient_profile
             SET disbursement_count = disbursement_count + 1,
                 disbursement_total = disbursement_total + ?2
             WHERE id = ?1",
            params![recipient_profile_id, amount],
        )?;
        Ok(())
    }

    // ── Totals maintenance ─────────────────────────────────────

    pub fn profile_ids(&self, kind: ProfileKind) -> SecurityResult<Vec<RowId>> {
        let sql = match kind {
            ProfileKind::Sender    => "SELECT id FROM sender_profile ORDER BY id",
            ProfileKind::Prisoner  => "SELECT id FROM prisoner_profile ORDER BY id",
            ProfileKind::Recipient => "SELECT id FROM recipient_profile ORDER BY id",
        };
        let mut stmt = self.conn.prepare(sql)?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<RowId>, _>>()?;
        Ok(ids)
    }

    /// Recompute counts and totals of the given profiles from their linked records.
    pub fn recalculate_totals(&self, kind: ProfileKind, ids: &[RowId]) -> SecurityResult<usize> {
        let sql = match kind {
            ProfileKind::Sender => {
                "UPDATE sender_profile SET
                    credit_count = (SELECT COUNT(*) FROM credit WHERE sender_profile_id = ?1),
                    credit_total = (SELECT COALESCE(SUM(amount), 0) FROM credit WHERE sender_profile_id = ?1)
                 WHERE id = ?1"
            }
            ProfileKind::Prisoner => {
                "UPDATE prisoner_profile SET
                    credit_count = (SELECT COUNT(*) FROM credit WHERE prisoner_profile_id = ?1),
                    credit_total = (SELECT COALESCE(SUM(amount), 0) FROM credit WHERE prisoner_profile_id = ?1),
                    disbursement_count = (SELECT COUNT(*) FROM disbursement WHERE prisoner_profile_id = ?1),
                    disbursement_total = (SELECT COALESCE(SUM(amount), 0) FROM disbursement WHERE prisoner_profile_id = ?1)
                 WHERE id = ?1"
            }
            ProfileKind::Recipient => {
                "UPDATE recipient_profile SET
                    disbursement_count = (SELECT COUNT(*) FROM disbursement WHERE recipient_profile_id = ?1),
                    disbursement_total = (SELECT COALESCE(SUM(amount), 0) FROM disbursement WHERE recipient_profile_id = ?1)
                 WHERE id = ?1"
            }
        };
        let mut stmt = self.conn.prepare(sql)?;
        let mut updated = 0;
        for id in ids {
            updated += stmt.execute(params![id])?;
        }
        Ok(updated)
    }

    /// Delete every profile. Record links fall back to NULL and profile
    /// event links cascade away with their profiles.
    pub fn delete_all_profiles(&self) -> SecurityResult<ProfileCounts> {
        let prisoner = self.conn.execute("DELETE FROM prisoner_profile", [])?;
        let sender = self.conn.execute("DELETE FROM sender_profile", [])?;
        let recipient = self.conn.execute("DELETE FROM recipient_profile", [])?;
        self.unflag_all_credits()?;
        self.unflag_all_disbursements()?;
        Ok(ProfileCounts { sender, prisoner, recipient })
    }

    pub fn profile_counts(&self) -> SecurityResult<ProfileCounts> {
        let count = |sql: &str| -> SecurityResult<usize> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };
        Ok(ProfileCounts {
            sender:    count("SELECT COUNT(*) FROM sender_profile")?,
            prisoner:  count("SELECT COUNT(*) FROM prisoner_profile")?,
            recipient: count("SELECT COUNT(*) FROM recipient_profile")?,
        })
    }
}
