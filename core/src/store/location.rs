//! Prisoner location feed and current-prison maintenance.

use super::{date_col, date_param, uuid_col, SecurityStore};
use crate::{
    error::SecurityResult,
    model::PrisonerLocation,
    types::RowId,
};
use rusqlite::{params, OptionalExtension};

impl SecurityStore {
    pub fn insert_prisoner_location(&self, location: &PrisonerLocation) -> SecurityResult<RowId> {
        self.conn.execute(
            "INSERT INTO prisoner_location
             (prisoner_number, prisoner_dob, prisoner_name, prison, single_offender_id, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                location.prisoner_number,
                date_param(Some(location.prisoner_dob)),
                location.prisoner_name,
                location.prison,
                location.single_offender_id.map(|u| u.to_string()),
                location.active,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Mark every location of a prisoner inactive, e.g. on release or transfer.
    pub fn deactivate_prisoner_locations(&self, prisoner_number: &str) -> SecurityResult<usize> {
        let n = self.conn.execute(
            "UPDATE prisoner_location SET active = 0 WHERE prisoner_number = ?1",
            params![prisoner_number],
        )?;
        Ok(n)
    }

    /// The most recent active location for a prisoner number.
    pub fn active_prisoner_location(&self, prisoner_number: &str) -> SecurityResult<Option<PrisonerLocation>> {
        let location = self
            .conn
            .query_row(
                "SELECT prisoner_number, prisoner_dob, prisoner_name, prison, single_offender_id, active
                 FROM prisoner_location
                 WHERE prisoner_number = ?1 AND active = 1
                 ORDER BY id DESC LIMIT 1",
                params![prisoner_number],
                |row| {
                    Ok(PrisonerLocation {
                        prisoner_number:    row.get(0)?,
                        prisoner_dob:       date_col(row, 1)?
                            .ok_or(rusqlite::Error::InvalidColumnType(
                                1,
                                "prisoner_dob".into(),
                                rusqlite::types::Type::Null,
                            ))?,
                        prisoner_name:      row.get(2)?,
                        prison:             row.get(3)?,
                        single_offender_id: uuid_col(row, 4)?,
                        active:             row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(location)
    }

    /// Point every prisoner profile at its active location's prison,
    /// clearing it when the prisoner has none. Returns the rows changed.
    pub fn update_current_prisons(&self) -> SecurityResult<usize> {
        let n = self.conn.execute(
            "UPDATE prisoner_profile SET current_prison = (
                 SELECT pl.prison FROM prisoner_location pl
                 WHERE pl.prisoner_number = prisoner_profile.prisoner_number AND pl.active = 1
                 ORDER BY pl.id DESC LIMIT 1
             )
             WHERE current_prison IS NOT (
                 SELECT pl.prison FROM prisoner_location pl
                 WHERE pl.prisoner_number = prisoner_profile.prisoner_number AND pl.active = 1
                 ORDER BY pl.id DESC LIMIT 1
             )",
            [],
        )?;
        Ok(n)
    }
}
