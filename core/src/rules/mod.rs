//! Notification rules.
//!
//! RULE: The rule set is built once from configuration and never mutated.
//! Every rule decides for itself whether a record triggers it; the
//! `EventMaterializer` is the only place events are written.
//!
//! Rule codes:
//!   NWN     amount is not a whole number of pounds
//!   HA      amount at or over the configured limit
//!   CSFREQ  sender sending often          DRFREQ  recipient paid often
//!   CSNUM   prisoner with many senders    DRNUM   prisoner with many recipients
//!   CPNUM   sender paying many prisoners  DPNUM   recipient paid by many prisoners
//!   MONP    monitored prisoner
//!   MONS    monitored sender (credits only)
//!   MONR    monitored recipient (disbursements only)
//!
//! RULE: Windowed rules (FREQ, NUM) give the same events whatever order
//! records are profiled in. A record's window ends at its own timestamp,
//! so when a record is profiled, the records of the same profile whose
//! windows cover it are evaluated again.

mod amount;
mod counterparty;
mod frequency;
mod monitored;

pub use amount::{HighAmountRule, NotWholeNumberRule};
pub use counterparty::CounterpartyRule;
pub use frequency::FrequencyRule;
pub use monitored::MonitoredRule;

use crate::{
    config::SecurityConfig,
    error::{SecurityError, SecurityResult},
    event_materializer::EventMaterializer,
    model::{ProfileRef, Record, RecordKind},
    store::SecurityStore,
    types::{RowId, TimePeriod, UserId},
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuleCode {
    Nwn,
    Ha,
    Csfreq,
    Drfreq,
    Csnum,
    Drnum,
    Cpnum,
    Dpnum,
    Monp,
    Mons,
    Monr,
}

impl RuleCode {
    pub const ALL: [RuleCode; 11] = [
        Self::Nwn,
        Self::Ha,
        Self::Csfreq,
        Self::Drfreq,
        Self::Csnum,
        Self::Drnum,
        Self::Cpnum,
        Self::Dpnum,
        Self::Monp,
        Self::Mons,
        Self::Monr,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nwn    => "NWN",
            Self::Ha     => "HA",
            Self::Csfreq => "CSFREQ",
            Self::Drfreq => "DRFREQ",
            Self::Csnum  => "CSNUM",
            Self::Drnum  => "DRNUM",
            Self::Cpnum  => "CPNUM",
            Self::Dpnum  => "DPNUM",
            Self::Monp   => "MONP",
            Self::Mons   => "MONS",
            Self::Monr   => "MONR",
        }
    }
}

impl FromStr for RuleCode {
    type Err = SecurityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| SecurityError::UnknownRule { code: s.to_string() })
    }
}

impl fmt::Display for RuleCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The contract every rule fulfils.
pub trait Rule: Send + Sync {
    fn code(&self) -> RuleCode;

    /// Human-readable description copied onto every event.
    fn description(&self) -> &str;

    /// Whether the rule can ever trigger for this kind of record.
    fn applies_to(&self, record: &Record) -> bool;

    fn triggered(&self, store: &SecurityStore, record: &Record) -> SecurityResult<bool>;

    /// The profile an event is additionally linked to, if any.
    fn event_trigger(&self, _record: &Record) -> Option<ProfileRef> {
        None
    }

    /// Other records whose window also covers `record`. They are evaluated
    /// again once `record` is profiled.
    fn covering_records(&self, _store: &SecurityStore, _record: &Record) -> SecurityResult<Vec<Record>> {
        Ok(Vec::new())
    }

    /// One event is created per entry; `None` means visible to everyone.
    fn event_users(&self, _store: &SecurityStore, _record: &Record) -> SecurityResult<Vec<Option<UserId>>> {
        Ok(vec![None])
    }

    /// Materialise this rule's events for a triggering record, all or none.
    /// Returns the ids of newly created events; existing ones are not repeated.
    fn create_events(&self, store: &SecurityStore, record: &Record) -> SecurityResult<Vec<RowId>> {
        let users = self.event_users(store, record)?;
        let trigger = self.event_trigger(record);
        store.atomic(|store| {
            let mut created = Vec::new();
            for user in &users {
                let event_id = EventMaterializer::create_event(
                    store,
                    self.code().as_str(),
                    self.description(),
                    record,
                    trigger,
                    user.as_deref(),
                )?;
                created.extend(event_id);
            }
            Ok(created)
        })
    }
}

/// Immutable registry of every rule plus the codes enabled per record kind.
pub struct RuleSet {
    rules:              BTreeMap<RuleCode, Box<dyn Rule>>,
    credit_rules:       Vec<RuleCode>,
    disbursement_rules: Vec<RuleCode>,
}

impl RuleSet {
    pub fn from_config(config: &SecurityConfig) -> SecurityResult<Self> {
        let t = &config.thresholds;
        let all: Vec<Box<dyn Rule>> = vec![
            Box::new(NotWholeNumberRule::new()),
            Box::new(HighAmountRule::new(config.high_amount_limit)),
            Box::new(FrequencyRule::sender_credits(t.csfreq)),
            Box::new(FrequencyRule::recipient_disbursements(t.drfreq)),
            Box::new(CounterpartyRule::senders_per_prisoner(t.csnum)),
            Box::new(CounterpartyRule::recipients_per_prisoner(t.drnum)),
            Box::new(CounterpartyRule::prisoners_per_sender(t.cpnum)),
            Box::new(CounterpartyRule::prisoners_per_recipient(t.dpnum)),
            Box::new(MonitoredRule::prisoner()),
            Box::new(MonitoredRule::sender()),
            Box::new(MonitoredRule::recipient()),
        ];
        let rules: BTreeMap<RuleCode, Box<dyn Rule>> =
            all.into_iter().map(|rule| (rule.code(), rule)).collect();

        let credit_rules = parse_codes(&config.enabled_credit_rules)?;
        let disbursement_rules = parse_codes(&config.enabled_disbursement_rules)?;
        Ok(Self { rules, credit_rules, disbursement_rules })
    }

    pub fn get(&self, code: RuleCode) -> Option<&dyn Rule> {
        self.rules.get(&code).map(|rule| rule.as_ref())
    }

    /// Look a rule up by its code string.
    pub fn lookup(&self, code: &str) -> SecurityResult<&dyn Rule> {
        let code: RuleCode = code.parse()?;
        self.get(code)
            .ok_or_else(|| SecurityError::UnknownRule { code: code.to_string() })
    }

    pub fn enabled_for(&self, kind: RecordKind) -> &[RuleCode] {
        match kind {
            RecordKind::Credit       => &self.credit_rules,
            RecordKind::Disbursement => &self.disbursement_rules,
        }
    }
}

fn parse_codes(codes: &[String]) -> SecurityResult<Vec<RuleCode>> {
    let mut parsed: Vec<RuleCode> = Vec::with_capacity(codes.len());
    for code in codes {
        let code: RuleCode = code.parse()?;
        if !parsed.contains(&code) {
            parsed.push(code);
        }
    }
    Ok(parsed)
}

/// Same-kind records of `profile` whose windows, ending at their own
/// timestamps, reach back to `record`.
fn records_within_reach(
    store: &SecurityStore,
    record: &Record,
    profile: ProfileRef,
    period: TimePeriod,
) -> SecurityResult<Vec<Record>> {
    let since = record.triggered_at();
    let until = period.reach(since);
    let records: Vec<Record> = match record.kind() {
        RecordKind::Credit => store
            .credits_for_profile_between(profile, since, until)?
            .into_iter()
            .map(Record::Credit)
            .collect(),
        RecordKind::Disbursement => store
            .disbursements_for_profile_between(profile, since, until)?
            .into_iter()
            .map(Record::Disbursement)
            .collect(),
    };
    Ok(records.into_iter().filter(|other| other.id() != record.id()).collect())
}

/// A rule that fired for a record, with the events it created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleOutcome {
    pub rule:      RuleCode,
    pub record_id: RowId,
    pub event_ids: Vec<RowId>,
}

/// Runs the enabled rules against profiled records.
pub struct RuleEngine {
    rules: RuleSet,
}

impl RuleEngine {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Evaluate every enabled rule in configured order. Errors abort the
    /// whole record; the caller decides whether that aborts the batch.
    pub fn process(&self, store: &SecurityStore, record: &Record) -> SecurityResult<Vec<RuleOutcome>> {
        let mut outcomes = Vec::new();
        for code in self.rules.enabled_for(record.kind()) {
            let Some(rule) = self.rules.get(*code) else {
                continue;
            };
            if !rule.applies_to(record) {
                log::debug!("{code} does not apply to {record}");
                continue;
            }
            if !rule.triggered(store, record)? {
                continue;
            }
            let event_ids = rule.create_events(store, record)?;
            log::debug!("{code} triggered for {record}: {} new event(s)", event_ids.len());
            outcomes.push(RuleOutcome { rule: *code, record_id: record.id(), event_ids });
        }
        Ok(outcomes)
    }

    /// Evaluate again the records whose windows cover a newly profiled
    /// record. Only outcomes that created new events are returned.
    pub fn process_covering(&self, store: &SecurityStore, record: &Record) -> SecurityResult<Vec<RuleOutcome>> {
        let mut outcomes = Vec::new();
        for code in self.rules.enabled_for(record.kind()) {
            let Some(rule) = self.rules.get(*code) else {
                continue;
            };
            if !rule.applies_to(record) {
                continue;
            }
            for other in rule.covering_records(store, record)? {
                if !rule.triggered(store, &other)? {
                    continue;
                }
                let event_ids = rule.create_events(store, &other)?;
                if event_ids.is_empty() {
                    continue;
                }
                log::debug!("{code} triggered for {other} once {record} was profiled");
                outcomes.push(RuleOutcome { rule: *code, record_id: other.id(), event_ids });
            }
        }
        Ok(outcomes)
    }
}
