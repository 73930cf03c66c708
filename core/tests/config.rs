//! Loading `security_config.json` from a data directory.

use mtp_security_core::{
    config::{SecurityConfig, DEFAULT_BATCH_SIZE},
    types::TimePeriod,
};
use std::{fs, path::PathBuf};

fn shipped_data_dir() -> String {
    format!("{}/../data", env!("CARGO_MANIFEST_DIR"))
}

fn scratch_data_dir(name: &str, config: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("mtp-security-config-{name}-{}", std::process::id()));
    fs::create_dir_all(dir.join("security")).unwrap();
    fs::write(dir.join("security/security_config.json"), config).unwrap();
    dir
}

#[test]
fn shipped_config_enables_monitoring_rules() {
    let config = SecurityConfig::load(&shipped_data_dir()).unwrap();
    assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
    assert_eq!(config.high_amount_limit, 12000);
    assert_eq!(config.enabled_credit_rules, vec!["MONP", "MONS"]);
    assert_eq!(config.enabled_disbursement_rules, vec!["MONP"]);
    assert_eq!(config.thresholds.csfreq.period, TimePeriod::Last30Days);
    assert_eq!(config.thresholds.dpnum.threshold, 4);
}

#[test]
fn omitted_fields_take_defaults() {
    let dir = scratch_data_dir(
        "defaults",
        r#"{ "enabled_credit_rules": ["HA"], "enabled_disbursement_rules": [] }"#,
    );
    let config = SecurityConfig::load(dir.to_str().unwrap()).unwrap();
    assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
    assert_eq!(config.enabled_credit_rules, vec!["HA"]);
    assert!(config.enabled_disbursement_rules.is_empty());
    assert_eq!(config.thresholds.cpnum.period, TimePeriod::Last30Days);
    fs::remove_dir_all(dir).ok();
}

#[test]
fn zero_batch_size_is_rejected() {
    let dir = scratch_data_dir(
        "zero-batch",
        r#"{ "batch_size": 0, "enabled_credit_rules": [], "enabled_disbursement_rules": [] }"#,
    );
    let err = SecurityConfig::load(dir.to_str().unwrap()).unwrap_err();
    assert!(err.to_string().contains("batch_size must be at least 1"));
    fs::remove_dir_all(dir).ok();
}

#[test]
fn missing_config_names_the_path() {
    let err = SecurityConfig::load("/nonexistent/mtp-data").unwrap_err();
    assert!(err.to_string().contains("/nonexistent/mtp-data/security/security_config.json"));
}
