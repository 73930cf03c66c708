use super::{records_within_reach, Rule, RuleCode};
use crate::{
    config::ThresholdConfig,
    error::SecurityResult,
    model::{ProfileKind, ProfileRef, Record, RecordKind},
    store::SecurityStore,
};

/// CSFREQ / DRFREQ: the same sender (or recipient) appears on at least
/// `threshold` records within the period ending at this record.
pub struct FrequencyRule {
    code:        RuleCode,
    record:      RecordKind,
    profile:     ProfileKind,
    limits:      ThresholdConfig,
    description: String,
}

impl FrequencyRule {
    pub fn sender_credits(limits: ThresholdConfig) -> Self {
        Self {
            code:    RuleCode::Csfreq,
            record:  RecordKind::Credit,
            profile: ProfileKind::Sender,
            limits,
            description: format!(
                "Senders sending money {} or more times in {}",
                limits.threshold,
                limits.period.label()
            ),
        }
    }

    pub fn recipient_disbursements(limits: ThresholdConfig) -> Self {
        Self {
            code:    RuleCode::Drfreq,
            record:  RecordKind::Disbursement,
            profile: ProfileKind::Recipient,
            limits,
            description: format!(
                "Recipients getting money {} or more times in {}",
                limits.threshold,
                limits.period.label()
            ),
        }
    }
}

impl Rule for FrequencyRule {
    fn code(&self) -> RuleCode {
        self.code
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn applies_to(&self, record: &Record) -> bool {
        record.kind() == self.record
    }

    fn triggered(&self, store: &SecurityStore, record: &Record) -> SecurityResult<bool> {
        let Some(profile) = self.event_trigger(record) else {
            return Ok(false);
        };
        let until = record.triggered_at();
        let since = self.limits.period.start(until);
        let count = match self.record {
            RecordKind::Credit => store.count_sender_credits_between(profile.id, since, until)?,
            RecordKind::Disbursement => {
                store.count_recipient_disbursements_between(profile.id, since, until)?
            }
        };
        Ok(count >= self.limits.threshold)
    }

    fn covering_records(&self, store: &SecurityStore, record: &Record) -> SecurityResult<Vec<Record>> {
        match self.event_trigger(record) {
            Some(profile) => records_within_reach(store, record, profile, self.limits.period),
            None => Ok(Vec::new()),
        }
    }

    fn event_trigger(&self, record: &Record) -> Option<ProfileRef> {
        if !self.applies_to(record) {
            return None;
        }
        record.profile(self.profile)
    }
}
