use super::{records_within_reach, Rule, RuleCode};
use crate::{
    config::ThresholdConfig,
    error::SecurityResult,
    model::{ProfileKind, ProfileRef, Record, RecordKind},
    store::SecurityStore,
};

/// What is being counted, from the point of view of the triggering profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Counterparty {
    /// CSNUM: distinct senders paying the credit's prisoner.
    SendersOfPrisoner,
    /// DRNUM: distinct recipients paid by the disbursement's prisoner.
    RecipientsOfPrisoner,
    /// CPNUM: distinct prisoners paid by the credit's sender.
    PrisonersOfSender,
    /// DPNUM: distinct prisoners paying the disbursement's recipient.
    PrisonersOfRecipient,
}

impl Counterparty {
    fn record(&self) -> RecordKind {
        match self {
            Self::SendersOfPrisoner | Self::PrisonersOfSender       => RecordKind::Credit,
            Self::RecipientsOfPrisoner | Self::PrisonersOfRecipient => RecordKind::Disbursement,
        }
    }

    fn profile(&self) -> ProfileKind {
        match self {
            Self::SendersOfPrisoner | Self::RecipientsOfPrisoner => ProfileKind::Prisoner,
            Self::PrisonersOfSender    => ProfileKind::Sender,
            Self::PrisonersOfRecipient => ProfileKind::Recipient,
        }
    }
}

/// Distinct-counterparty thresholds over a time period.
pub struct CounterpartyRule {
    code:         RuleCode,
    counterparty: Counterparty,
    limits:       ThresholdConfig,
    description:  String,
}

impl CounterpartyRule {
    fn build(
        code: RuleCode,
        counterparty: Counterparty,
        limits: ThresholdConfig,
        subject: &str,
        counted: &str,
    ) -> Self {
        Self {
            code,
            counterparty,
            limits,
            description: format!(
                "{subject} {} or more {counted} in {}",
                limits.threshold,
                limits.period.label()
            ),
        }
    }

    pub fn senders_per_prisoner(limits: ThresholdConfig) -> Self {
        Self::build(
            RuleCode::Csnum,
            Counterparty::SendersOfPrisoner,
            limits,
            "Prisoners getting money from",
            "senders",
        )
    }

    pub fn recipients_per_prisoner(limits: ThresholdConfig) -> Self {
        Self::build(
            RuleCode::Drnum,
            Counterparty::RecipientsOfPrisoner,
            limits,
            "Prisoners sending money to",
            "recipients",
        )
    }

    pub fn prisoners_per_sender(limits: ThresholdConfig) -> Self {
        Self::build(
            RuleCode::Cpnum,
            Counterparty::PrisonersOfSender,
            limits,
            "Senders sending money to",
            "prisoners",
        )
    }

    pub fn prisoners_per_recipient(limits: ThresholdConfig) -> Self {
        Self::build(
            RuleCode::Dpnum,
            Counterparty::PrisonersOfRecipient,
            limits,
            "Recipients getting money from",
            "prisoners",
        )
    }
}

impl Rule for CounterpartyRule {
    fn code(&self) -> RuleCode {
        self.code
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn applies_to(&self, record: &Record) -> bool {
        record.kind() == self.counterparty.record()
    }

    fn triggered(&self, store: &SecurityStore, record: &Record) -> SecurityResult<bool> {
        let Some(profile) = self.event_trigger(record) else {
            return Ok(false);
        };
        let until = record.triggered_at();
        let since = self.limits.period.start(until);
        let count = match self.counterparty {
            Counterparty::SendersOfPrisoner => {
                store.count_distinct_senders_for_prisoner(profile.id, since, until)?
            }
            Counterparty::RecipientsOfPrisoner => {
                store.count_distinct_recipients_for_prisoner(profile.id, since, until)?
            }
            Counterparty::PrisonersOfSender => {
                store.count_distinct_prisoners_for_sender(profile.id, since, until)?
            }
            Counterparty::PrisonersOfRecipient => {
                store.count_distinct_prisoners_for_recipient(profile.id, since, until)?
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
        record.profile(self.counterparty.profile())
    }
}
