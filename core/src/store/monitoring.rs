//! Which security staff monitor which profiles.

use super::SecurityStore;
use crate::{
    error::SecurityResult,
    model::{BankAccount, DebitCard, ProfileKind, ProfileRef},
    types::RowId,
};
use rusqlite::params;

/// Relations removed by `bulk_unmonitor`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnmonitorCounts {
    pub prisoners:     usize,
    pub bank_accounts: usize,
    pub debit_cards:   usize,
}

impl UnmonitorCounts {
    pub fn total(&self) -> usize {
        self.prisoners + self.bank_accounts + self.debit_cards
    }
}

impl SecurityStore {
    pub fn monitor_prisoner(&self, user: &str, prisoner_profile_id: RowId) -> SecurityResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO monitored_prisoner (user_id, prisoner_profile_id) VALUES (?1, ?2)",
            params![user, prisoner_profile_id],
        )?;
        Ok(())
    }

    pub fn unmonitor_prisoner(&self, user: &str, prisoner_profile_id: RowId) -> SecurityResult<()> {
        self.conn.execute(
            "DELETE FROM monitored_prisoner WHERE user_id = ?1 AND prisoner_profile_id = ?2",
            params![user, prisoner_profile_id],
        )?;
        Ok(())
    }

    /// Bank accounts can be monitored before any money has moved through them.
    pub fn monitor_bank_account(&self, user: &str, account: &BankAccount) -> SecurityResult<()> {
        let bank_account_id = self.get_or_create_bank_account(account)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO monitored_bank_account (user_id, bank_account_id) VALUES (?1, ?2)",
            params![user, bank_account_id],
        )?;
        Ok(())
    }

    pub fn unmonitor_bank_account(&self, user: &str, account: &BankAccount) -> SecurityResult<()> {
        if let Some(bank_account_id) = self.find_bank_account(account)? {
            self.conn.execute(
                "DELETE FROM monitored_bank_account WHERE user_id = ?1 AND bank_account_id = ?2",
                params![user, bank_account_id],
            )?;
        }
        Ok(())
    }

    /// Monitor every known sender card matching these details.
    /// Returns how many card records are now monitored by `user`.
    pub fn monitor_debit_card(&self, user: &str, card: &DebitCard) -> SecurityResult<usize> {
        self.conn.execute(
            "INSERT OR IGNORE INTO monitored_debit_card (user_id, debit_card_id)
             SELECT ?1, id FROM sender_debit_card
             WHERE card_number_last_digits = ?2 AND card_expiry_date = ?3 AND postcode = ?4",
            params![user, card.card_number_last_digits, card.card_expiry_date, card.postcode],
        )?;
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM monitored_debit_card mdc
             JOIN sender_debit_card sdc ON sdc.id = mdc.debit_card_id
             WHERE mdc.user_id = ?1 AND sdc.card_number_last_digits = ?2
               AND sdc.card_expiry_date = ?3 AND sdc.postcode = ?4",
            params![user, card.card_number_last_digits, card.card_expiry_date, card.postcode],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn unmonitor_debit_card(&self, user: &str, card: &DebitCard) -> SecurityResult<()> {
        self.conn.execute(
            "DELETE FROM monitored_debit_card
             WHERE user_id = ?1 AND debit_card_id IN (
                 SELECT id FROM sender_debit_card
                 WHERE card_number_last_digits = ?2 AND card_expiry_date = ?3 AND postcode = ?4
             )",
            params![user, card.card_number_last_digits, card.card_expiry_date, card.postcode],
        )?;
        Ok(())
    }

    /// Users monitoring a profile, sorted.
    ///
    /// Senders are monitored through their cards and bank accounts,
    /// recipients through their bank accounts, prisoners directly.
    pub fn monitoring_users(&self, profile: ProfileRef) -> SecurityResult<Vec<String>> {
        let sql = match profile.kind {
            ProfileKind::Prisoner => {
                "SELECT user_id FROM monitored_prisoner
                 WHERE prisoner_profile_id = ?1
                 ORDER BY user_id"
            }
            ProfileKind::Sender => {
                "SELECT mdc.user_id FROM monitored_debit_card mdc
                 JOIN sender_debit_card sdc ON sdc.id = mdc.debit_card_id
                 WHERE sdc.sender_profile_id = ?1
                 UNION
                 SELECT mba.user_id FROM monitored_bank_account mba
                 JOIN sender_bank_transfer sbt ON sbt.bank_account_id = mba.bank_account_id
                 WHERE sbt.sender_profile_id = ?1
                 ORDER BY 1"
            }
            ProfileKind::Recipient => {
                "SELECT DISTINCT mba.user_id FROM monitored_bank_account mba
                 JOIN recipient_bank_transfer rbt ON rbt.bank_account_id = mba.bank_account_id
                 WHERE rbt.recipient_profile_id = ?1
                 ORDER BY 1"
            }
        };
        let mut stmt = self.conn.prepare(sql)?;
        let users = stmt
            .query_map(params![profile.id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(users)
    }

    /// Remove everything a user monitors.
    pub fn bulk_unmonitor(&self, user: &str) -> SecurityResult<UnmonitorCounts> {
        let prisoners = self.conn.execute(
            "DELETE FROM monitored_prisoner WHERE user_id = ?1",
            params![user],
        )?;
        let bank_accounts = self.conn.execute(
            "DELETE FROM monitored_bank_account WHERE user_id = ?1",
            params![user],
        )?;
        let debit_cards = self.conn.execute(
            "DELETE FROM monitored_debit_card WHERE user_id = ?1",
            params![user],
        )?;
        Ok(UnmonitorCounts { prisoners, bank_accounts, debit_cards })
    }
}
