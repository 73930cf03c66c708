use super::{Rule, RuleCode};
use crate::{
    error::SecurityResult,
    model::Record,
    store::SecurityStore,
    types::{format_amount, Amount},
};

/// NWN: amounts that are not a whole number of pounds.
pub struct NotWholeNumberRule {
    description: String,
}

impl NotWholeNumberRule {
    pub fn new() -> Self {
        Self {
            description: "Credits or disbursements that are not a whole number".into(),
        }
    }
}

impl Default for NotWholeNumberRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for NotWholeNumberRule {
    fn code(&self) -> RuleCode {
        RuleCode::Nwn
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn applies_to(&self, _record: &Record) -> bool {
        true
    }

    fn triggered(&self, _store: &SecurityStore, record: &Record) -> SecurityResult<bool> {
        Ok(record.amount() % 100 != 0)
    }
}

/// HA: amounts at or over a limit.
pub struct HighAmountRule {
    limit:       Amount,
    description: String,
}

impl HighAmountRule {
    pub fn new(limit: Amount) -> Self {
        Self {
            limit,
            description: format!("Credits or disbursements over {}", format_amount(limit, true)),
        }
    }
}

impl Rule for HighAmountRule {
    fn code(&self) -> RuleCode {
        RuleCode::Ha
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn applies_to(&self, _record: &Record) -> bool {
        true
    }

    fn triggered(&self, _store: &SecurityStore, record: &Record) -> SecurityResult<bool> {
        Ok(record.amount() >= self.limit)
    }
}
