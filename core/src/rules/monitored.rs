use super::{Rule, RuleCode};
use crate::{
    error::SecurityResult,
    model::{ProfileKind, ProfileRef, Record},
    store::SecurityStore,
    types::UserId,
};

/// MONP / MONS / MONR: the record's profile is monitored by someone.
/// Each monitoring user gets their own event.
pub struct MonitoredRule {
    code:        RuleCode,
    profile:     ProfileKind,
    description: String,
}

impl MonitoredRule {
    pub fn prisoner() -> Self {
        Self {
            code:        RuleCode::Monp,
            profile:     ProfileKind::Prisoner,
            description: "Credits or disbursements for prisoners you are monitoring".into(),
        }
    }

    pub fn sender() -> Self {
        Self {
            code:        RuleCode::Mons,
            profile:     ProfileKind::Sender,
            description: "Credits for senders you are monitoring".into(),
        }
    }

    pub fn recipient() -> Self {
        Self {
            code:        RuleCode::Monr,
            profile:     ProfileKind::Recipient,
            description: "Disbursements for recipients you are monitoring".into(),
        }
    }
}

impl Rule for MonitoredRule {
    fn code(&self) -> RuleCode {
        self.code
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn applies_to(&self, record: &Record) -> bool {
        match self.profile {
            ProfileKind::Prisoner  => true,
            ProfileKind::Sender    => matches!(record, Record::Credit(_)),
            ProfileKind::Recipient => matches!(record, Record::Disbursement(_)),
        }
    }

    fn triggered(&self, store: &SecurityStore, record: &Record) -> SecurityResult<bool> {
        match self.event_trigger(record) {
            Some(profile) => Ok(!store.monitoring_users(profile)?.is_empty()),
            None => Ok(false),
        }
    }

    fn event_trigger(&self, record: &Record) -> Option<ProfileRef> {
        record.profile(self.profile)
    }

    fn event_users(&self, store: &SecurityStore, record: &Record) -> SecurityResult<Vec<Option<UserId>>> {
        let Some(profile) = self.event_trigger(record) else {
            return Ok(Vec::new());
        };
        let users = store.monitoring_users(profile)?;
        Ok(users.into_iter().map(Some).collect())
    }
}
