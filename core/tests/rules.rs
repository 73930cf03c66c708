//! Amount, frequency and counterparty rules.

use chrono::{DateTime, TimeZone, Utc};
use mtp_security_core::{
    config::SecurityConfig,
    engine::{SecurityEngine, UpdateOptions},
    error::SecurityError,
    model::{
        CreditResolution, CreditSource, DisbursementMethod, DisbursementResolution, Event,
        NewCredit, NewDisbursement, ProfileKind,
    },
    store::{EventFilter, SecurityStore},
    types::Amount,
};

fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, 10, 0, 0).unwrap()
}

fn credit(amount: Amount, day: u32, prisoner: &str, account: &str) -> NewCredit {
    NewCredit {
        amount,
        received_at:     at(day),
        prisoner_number: Some(prisoner.into()),
        prisoner_dob:    None,
        prisoner_name:   Some("JAMES HALLS".into()),
        prison:          Some("BXI".into()),
        resolution:      CreditResolution::Credited,
        source:          CreditSource::BankTransfer {
            sender_name:    Some("Mary Halls".into()),
            sort_code:      Some("101010".into()),
            account_number: Some(account.into()),
            roll_number:    None,
        },
    }
}

fn disbursement(amount: Amount, day: u32, prisoner: &str, account: &str) -> NewDisbursement {
    NewDisbursement {
        amount,
        created:         at(day),
        prisoner_number: prisoner.into(),
        prisoner_name:   "JAMES HALLS".into(),
        prison:          "BXI".into(),
        resolution:      DisbursementResolution::Sent,
        method:          DisbursementMethod::BankTransfer,
        recipient_name:  "Jack Halls".into(),
        sort_code:       Some("202020".into()),
        account_number:  Some(account.into()),
        roll_number:     None,
    }
}

fn events_for(engine: &SecurityEngine, rule: &str) -> Vec<Event> {
    engine
        .store
        .events(&EventFilter { rules: vec![rule.into()], ..EventFilter::default() })
        .unwrap()
}

#[test]
fn not_whole_number_triggers_on_pence() {
    let engine = SecurityEngine::build_test().unwrap();
    let pence = engine.store.insert_credit(&credit(1050, 1, "A1111AA", "11111111")).unwrap();
    engine.store.insert_credit(&credit(1000, 2, "B2222BB", "22222222")).unwrap();
    let disbursed = engine.store.insert_disbursement(&disbursement(999, 3, "C3333CC", "33333333")).unwrap();

    let summary = engine.run(&engine.default_options()).unwrap();

    let events = events_for(&engine, "NWN");
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].disbursement_id, Some(disbursed));
    assert_eq!(events[1].credit_id, Some(pence));
    assert_eq!(events[1].description, "Credits or disbursements that are not a whole number");
    assert_eq!(events[1].triggered_at, at(1));
    assert!(events.iter().all(|e| e.user.is_none() && e.profile.is_none()));
    assert_eq!(summary.events_created, 2);
}

#[test]
fn high_amount_triggers_at_the_limit() {
    let engine = SecurityEngine::build_test().unwrap();
    engine.store.insert_credit(&credit(11900, 1, "A1111AA", "11111111")).unwrap();
    let limit = engine.store.insert_credit(&credit(12000, 2, "B2222BB", "22222222")).unwrap();
    engine.store.insert_disbursement(&disbursement(50000, 3, "C3333CC", "33333333")).unwrap();

    engine.run(&engine.default_options()).unwrap();

    let events = events_for(&engine, "HA");
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].credit_id, Some(limit));
    assert_eq!(events[1].description, "Credits or disbursements over £120");
}

#[test]
fn frequent_sender_triggers_on_the_third_credit_in_a_week() {
    let engine = SecurityEngine::build_test().unwrap();
    engine.store.insert_credit(&credit(1000, 1, "A1111AA", "11111111")).unwrap();
    engine.store.insert_credit(&credit(1000, 3, "A1111AA", "11111111")).unwrap();
    let third = engine.store.insert_credit(&credit(1000, 5, "A1111AA", "11111111")).unwrap();

    engine.run(&engine.default_options()).unwrap();

    let events = events_for(&engine, "CSFREQ");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].credit_id, Some(third));
    let sender = engine.store.get_credit(third).unwrap().sender_profile_id.unwrap();
    let profile = events[0].profile.unwrap();
    assert_eq!((profile.kind, profile.id), (ProfileKind::Sender, sender));
    assert_eq!(events[0].description, "Senders sending money 3 or more times in last 7 days");
}

#[test]
fn spread_out_credits_do_not_trigger_frequency() {
    let engine = SecurityEngine::build_test().unwrap();
    for day in [1, 11, 21] {
        engine.store.insert_credit(&credit(1000, day, "A1111AA", "11111111")).unwrap();
    }

    engine.run(&engine.default_options()).unwrap();

    assert!(events_for(&engine, "CSFREQ").is_empty());
}

#[test]
fn frequency_counts_credits_from_earlier_runs() {
    let engine = SecurityEngine::build_test().unwrap();
    engine.store.insert_credit(&credit(1000, 1, "A1111AA", "11111111")).unwrap();
    engine.store.insert_credit(&credit(1000, 2, "A1111AA", "11111111")).unwrap();
    engine.run(&engine.default_options()).unwrap();
    assert!(events_for(&engine, "CSFREQ").is_empty());

    engine.store.insert_credit(&credit(1000, 3, "A1111AA", "11111111")).unwrap();
    engine.run(&engine.default_options()).unwrap();
    assert_eq!(events_for(&engine, "CSFREQ").len(), 1);
}

#[test]
fn credit_profiled_late_completes_a_frequent_sender() {
    let engine = SecurityEngine::build_test().unwrap();
    let mut pending = credit(1000, 1, "A1111AA", "11111111");
    pending.resolution = CreditResolution::Pending;
    let first = engine.store.insert_credit(&pending).unwrap();
    engine.store.insert_credit(&credit(1000, 3, "A1111AA", "11111111")).unwrap();
    let third = engine.store.insert_credit(&credit(1000, 5, "A1111AA", "11111111")).unwrap();
    engine.run(&engine.default_options()).unwrap();
    assert!(events_for(&engine, "CSFREQ").is_empty());

    engine.store.set_credit_resolution(first, CreditResolution::Credited).unwrap();
    let summary = engine.run(&engine.default_options()).unwrap();

    let events = events_for(&engine, "CSFREQ");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].credit_id, Some(third));
    assert_eq!(events[0].triggered_at, at(5));
    assert_eq!(summary.events_created, 1);
}

#[test]
fn frequency_does_not_depend_on_profiling_order() {
    let mut triggered = Vec::new();
    for batch_size in [1, 2, 3] {
        let engine = SecurityEngine::build_test().unwrap();
        for day in [5, 1, 3, 20] {
            engine.store.insert_credit(&credit(1000, day, "A1111AA", "11111111")).unwrap();
        }
        engine.run(&UpdateOptions::new(batch_size)).unwrap();
        let ids: Vec<_> = events_for(&engine, "CSFREQ").iter().map(|e| e.credit_id).collect();
        triggered.push(ids);
    }
    // The day 5 credit was inserted first; the day 20 one has no company.
    assert_eq!(triggered, vec![vec![Some(1)]; 3]);
}

#[test]
fn counterparty_rules_do_not_depend_on_profiling_order() {
    let mut triggered = Vec::new();
    for batch_size in [1, 3] {
        let engine = SecurityEngine::build_test().unwrap();
        engine.store.insert_credit(&credit(1000, 3, "A1111AA", "33333333")).unwrap();
        engine.store.insert_credit(&credit(1000, 1, "A1111AA", "11111111")).unwrap();
        engine.store.insert_credit(&credit(1000, 2, "A1111AA", "22222222")).unwrap();
        engine.run(&UpdateOptions::new(batch_size)).unwrap();
        let ids: Vec<_> = events_for(&engine, "CSNUM").iter().map(|e| e.credit_id).collect();
        triggered.push(ids);
    }
    assert_eq!(triggered, vec![vec![Some(1)]; 2]);
}

#[test]
fn prisoner_with_many_senders_triggers_csnum() {
    let engine = SecurityEngine::build_test().unwrap();
    engine.store.insert_credit(&credit(1000, 1, "A1111AA", "11111111")).unwrap();
    engine.store.insert_credit(&credit(1000, 2, "A1111AA", "22222222")).unwrap();
    let third = engine.store.insert_credit(&credit(1000, 3, "A1111AA", "33333333")).unwrap();

    engine.run(&engine.default_options()).unwrap();

    let events = events_for(&engine, "CSNUM");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].credit_id, Some(third));
    assert_eq!(events[0].profile.unwrap().kind, ProfileKind::Prisoner);
    assert!(events_for(&engine, "CPNUM").is_empty());
}

#[test]
fn sender_paying_many_prisoners_triggers_cpnum() {
    let engine = SecurityEngine::build_test().unwrap();
    engine.store.insert_credit(&credit(1000, 1, "A1111AA", "11111111")).unwrap();
    engine.store.insert_credit(&credit(1000, 2, "B2222BB", "11111111")).unwrap();
    engine.store.insert_credit(&credit(1000, 3, "C3333CC", "11111111")).unwrap();

    engine.run(&engine.default_options()).unwrap();

    let events = events_for(&engine, "CPNUM");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].profile.unwrap().kind, ProfileKind::Sender);
    assert_eq!(events[0].description, "Senders sending money to 3 or more prisoners in last 30 days");
    assert!(events_for(&engine, "CSNUM").is_empty());
}

#[test]
fn disbursement_counterparty_and_frequency_rules() {
    let engine = SecurityEngine::build_test().unwrap();
    // One prisoner paying three recipients.
    engine.store.insert_disbursement(&disbursement(1000, 1, "A1111AA", "11111111")).unwrap();
    engine.store.insert_disbursement(&disbursement(1000, 2, "A1111AA", "22222222")).unwrap();
    engine.store.insert_disbursement(&disbursement(1000, 3, "A1111AA", "33333333")).unwrap();
    // Three prisoners paying one recipient, the third time within a week.
    engine.store.insert_disbursement(&disbursement(1000, 4, "B2222BB", "44444444")).unwrap();
    engine.store.insert_disbursement(&disbursement(1000, 5, "C3333CC", "44444444")).unwrap();
    let last = engine.store.insert_disbursement(&disbursement(1000, 6, "D4444DD", "44444444")).unwrap();

    engine.run(&engine.default_options()).unwrap();

    let drnum = events_for(&engine, "DRNUM");
    assert_eq!(drnum.len(), 1);
    assert_eq!(drnum[0].disbursement_id, Some(3));
    assert_eq!(drnum[0].profile.unwrap().kind, ProfileKind::Prisoner);

    let dpnum = events_for(&engine, "DPNUM");
    assert_eq!(dpnum.len(), 1);
    assert_eq!(dpnum[0].disbursement_id, Some(last));
    assert_eq!(dpnum[0].profile.unwrap().kind, ProfileKind::Recipient);

    let drfreq = events_for(&engine, "DRFREQ");
    assert_eq!(drfreq.len(), 1);
    assert_eq!(drfreq[0].disbursement_id, Some(last));
}

#[test]
fn disabled_rules_never_fire() {
    let store = SecurityStore::in_memory().unwrap();
    store.migrate().unwrap();
    let engine = SecurityEngine::new(store, SecurityConfig::default()).unwrap();
    engine.store.insert_credit(&credit(12345, 1, "A1111AA", "11111111")).unwrap();

    let summary = engine.run(&engine.default_options()).unwrap();
    assert_eq!(summary.records_processed, 1);
    assert_eq!(engine.store.event_count().unwrap(), 0);
}

#[test]
fn rules_that_cannot_apply_are_ignored() {
    let store = SecurityStore::in_memory().unwrap();
    store.migrate().unwrap();
    let mut config = SecurityConfig::default();
    // Recipient rules on credits are accepted but never evaluated.
    config.enabled_credit_rules = vec!["MONR".into(), "DRFREQ".into(), "NWN".into()];
    let engine = SecurityEngine::new(store, config).unwrap();
    engine.store.insert_credit(&credit(1050, 1, "A1111AA", "11111111")).unwrap();

    engine.run(&engine.default_options()).unwrap();
    assert_eq!(engine.store.event_count().unwrap(), 1);
    assert_eq!(engine.store.event_count_for_rule("NWN").unwrap(), 1);
}

#[test]
fn unknown_rule_code_fails_engine_construction() {
    let store = SecurityStore::in_memory().unwrap();
    store.migrate().unwrap();
    let mut config = SecurityConfig::default();
    config.enabled_disbursement_rules.push("MONX".into());
    assert!(matches!(
        SecurityEngine::new(store, config),
        Err(SecurityError::UnknownRule { code }) if code == "MONX"
    ));
}
