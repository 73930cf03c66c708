use crate::types::{Amount, TimePeriod};
use serde::{Deserialize, Serialize};

/// Defaults for the update command and the standard HA limit of £120.
pub const DEFAULT_BATCH_SIZE: usize = 200;
pub const DEFAULT_HIGH_AMOUNT_LIMIT: Amount = 12000;

/// Look-back window and count threshold of a frequency or counterparty rule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThresholdConfig {
    pub period:    TimePeriod,
    /// Triggers when the count reaches this value.
    pub threshold: i64,
}

impl ThresholdConfig {
    pub fn new(period: TimePeriod, threshold: i64) -> Self {
        Self { period, threshold }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleThresholds {
    /// CSFREQ: credits from one sender.
    pub csfreq: ThresholdConfig,
    /// DRFREQ: disbursements to one recipient.
    pub drfreq: ThresholdConfig,
    /// CSNUM: senders to one prisoner.
    pub csnum:  ThresholdConfig,
    /// DRNUM: recipients of one prisoner.
    pub drnum:  ThresholdConfig,
    /// CPNUM: prisoners one sender pays.
    pub cpnum:  ThresholdConfig,
    /// DPNUM: prisoners paying one recipient.
    pub dpnum:  ThresholdConfig,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            csfreq: ThresholdConfig::new(TimePeriod::Last30Days, 4),
            drfreq: ThresholdConfig::new(TimePeriod::Last30Days, 4),
            csnum:  ThresholdConfig::new(TimePeriod::Last30Days, 4),
            drnum:  ThresholdConfig::new(TimePeriod::Last30Days, 4),
            cpnum:  ThresholdConfig::new(TimePeriod::Last30Days, 4),
            dpnum:  ThresholdConfig::new(TimePeriod::Last30Days, 4),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size:                 usize,
    #[serde(default = "default_high_amount_limit")]
    pub high_amount_limit:          Amount,
    /// Rule codes evaluated against every newly profiled credit.
    pub enabled_credit_rules:       Vec<String>,
    /// Rule codes evaluated against every newly profiled disbursement.
    pub enabled_disbursement_rules: Vec<String>,
    #[serde(default)]
    pub thresholds:                 RuleThresholds,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_high_amount_limit() -> Amount {
    DEFAULT_HIGH_AMOUNT_LIMIT
}

impl Default for SecurityConfig {
    /// Production defaults: only the monitoring rules raise notifications.
    fn default() -> Self {
        Self {
            batch_size:                 DEFAULT_BATCH_SIZE,
            high_amount_limit:          DEFAULT_HIGH_AMOUNT_LIMIT,
            enabled_credit_rules:       vec!["MONP".into(), "MONS".into()],
            enabled_disbursement_rules: vec!["MONP".into()],
            thresholds:                 RuleThresholds::default(),
        }
    }
}

impl SecurityConfig {
    /// Load configuration from the data directory.
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/security/security_config.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: SecurityConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        if config.batch_size < 1 {
            anyhow::bail!("{path}: batch_size must be at least 1");
        }
        Ok(config)
    }

    /// Every rule enabled for the record kinds it applies to, with low
    /// thresholds so small fixtures trigger them.
    pub fn default_test() -> Self {
        let credit_rules = ["NWN", "HA", "CSFREQ", "CSNUM", "CPNUM", "MONP", "MONS"];
        let disbursement_rules = ["NWN", "HA", "DRFREQ", "DRNUM", "DPNUM", "MONP", "MONR"];
        Self {
            batch_size:                 DEFAULT_BATCH_SIZE,
            high_amount_limit:          DEFAULT_HIGH_AMOUNT_LIMIT,
            enabled_credit_rules:       credit_rules.iter().map(|s| s.to_string()).collect(),
            enabled_disbursement_rules: disbursement_rules.iter().map(|s| s.to_string()).collect(),
            thresholds: RuleThresholds {
                csfreq: ThresholdConfig::new(TimePeriod::Last7Days, 3),
                drfreq: ThresholdConfig::new(TimePeriod::Last7Days, 3),
                csnum:  ThresholdConfig::new(TimePeriod::Last30Days, 3),
                drnum:  ThresholdConfig::new(TimePeriod::Last30Days, 3),
                cpnum:  ThresholdConfig::new(TimePeriod::Last30Days, 3),
                dpnum:  ThresholdConfig::new(TimePeriod::Last30Days, 3),
            },
        }
    }
}
