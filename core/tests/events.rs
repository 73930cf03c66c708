//! Event materialisation and listing.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use mtp_security_core::{
    engine::SecurityEngine,
    event_materializer::EventMaterializer,
    model::{CreditResolution, CreditSource, NewCredit, ProfileKind, ProfileRef, Record},
    notification::EmailFrequency,
    store::{EventFilter, SecurityStore},
    types::Amount,
};

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
}

fn credit(amount: Amount, received_at: DateTime<Utc>, prisoner: &str, account: &str) -> NewCredit {
    NewCredit {
        amount,
        received_at,
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

fn store_with_credit() -> (SecurityStore, Record) {
    let store = SecurityStore::in_memory().unwrap();
    store.migrate().unwrap();
    let id = store.insert_credit(&credit(1050, at(1, 10), "A1409AE", "11111111")).unwrap();
    let record = Record::Credit(store.get_credit(id).unwrap());
    (store, record)
}

#[test]
fn create_event_links_record_and_profile() {
    let (store, record) = store_with_credit();
    let prisoner = store.create_prisoner_profile("A1409AE", None, "JAMES HALLS", None, at(1, 10)).unwrap();
    let trigger = ProfileRef { kind: ProfileKind::Prisoner, id: prisoner };

    let id = EventMaterializer::create_event(&store, "MONP", "Monitored", &record, Some(trigger), Some("security-a"))
        .unwrap()
        .expect("new event");

    let events = store.events(&EventFilter::default()).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, id);
    assert_eq!(events[0].credit_id, Some(record.id()));
    assert_eq!(events[0].disbursement_id, None);
    assert_eq!(events[0].profile, Some(trigger));
    assert_eq!(events[0].triggered_at, at(1, 10));
}

#[test]
fn create_event_is_idempotent_per_rule_record_and_user() {
    let (store, record) = store_with_credit();

    let first = EventMaterializer::create_event(&store, "NWN", "Pence", &record, None, None).unwrap();
    let repeat = EventMaterializer::create_event(&store, "NWN", "Pence", &record, None, None).unwrap();
    let other_user = EventMaterializer::create_event(&store, "NWN", "Pence", &record, None, Some("security-a")).unwrap();
    let other_rule = EventMaterializer::create_event(&store, "HA", "High", &record, None, None).unwrap();

    assert!(first.is_some());
    assert!(repeat.is_none());
    assert!(other_user.is_some());
    assert!(other_rule.is_some());
    assert_eq!(store.event_count().unwrap(), 3);
}

#[test]
fn failed_link_leaves_no_event_behind() {
    let (store, record) = store_with_credit();
    let missing = ProfileRef { kind: ProfileKind::Sender, id: 9999 };

    let result = EventMaterializer::create_event(&store, "MONS", "Monitored", &record, Some(missing), None);

    assert!(result.is_err());
    assert_eq!(store.event_count().unwrap(), 0);
    assert!(store.events(&EventFilter::default()).unwrap().is_empty());
}

/// Three user-less events on consecutive days plus one for a monitoring user.
fn engine_with_events() -> SecurityEngine {
    let engine = SecurityEngine::build_test().unwrap();
    engine.store.insert_credit(&credit(1050, at(1, 10), "A1111AA", "11111111")).unwrap();
    engine.store.insert_credit(&credit(2050, at(2, 10), "B2222BB", "22222222")).unwrap();
    engine.store.insert_credit(&credit(13000, at(3, 10), "C3333CC", "33333333")).unwrap();
    engine.run(&engine.default_options()).unwrap();

    let prisoner = engine.store.get_credit(1).unwrap().prisoner_profile_id.unwrap();
    engine.store.monitor_prisoner("security-a", prisoner).unwrap();
    engine.store.insert_credit(&credit(1000, at(4, 10), "A1111AA", "44444444")).unwrap();
    engine.run(&engine.default_options()).unwrap();
    engine
}

#[test]
fn events_are_listed_newest_first() {
    let engine = engine_with_events();
    let events = engine.store.events(&EventFilter::default()).unwrap();
    let rules: Vec<_> = events.iter().map(|e| e.rule.as_str()).collect();
    assert_eq!(rules, vec!["MONP", "HA", "NWN", "NWN"]);
    assert!(events.windows(2).all(|w| w[0].triggered_at >= w[1].triggered_at));
}

#[test]
fn events_filter_by_rule_time_and_limit() {
    let engine = engine_with_events();

    let nwn = engine
        .store
        .events(&EventFilter { rules: vec!["NWN".into(), "HA".into()], ..EventFilter::default() })
        .unwrap();
    assert_eq!(nwn.len(), 3);

    let day_two = engine
        .store
        .events(&EventFilter {
            triggered_at_from:  Some(at(2, 0)),
            triggered_at_until: Some(at(3, 10)),
            ..EventFilter::default()
        })
        .unwrap();
    assert_eq!(day_two.len(), 1);
    assert_eq!(day_two[0].credit_id, Some(2));

    let latest = engine
        .store
        .events(&EventFilter { limit: Some(2), ..EventFilter::default() })
        .unwrap();
    assert_eq!(latest.len(), 2);
    assert_eq!(latest[0].rule, "MONP");
}

#[test]
fn users_only_see_their_own_and_shared_events() {
    let engine = engine_with_events();

    let mine = engine
        .store
        .events(&EventFilter { visible_to: Some("security-a".into()), ..EventFilter::default() })
        .unwrap();
    assert_eq!(mine.len(), 4);

    let theirs = engine
        .store
        .events(&EventFilter { visible_to: Some("security-b".into()), ..EventFilter::default() })
        .unwrap();
    assert_eq!(theirs.len(), 3);
    assert!(theirs.iter().all(|e| e.user.is_none()));
}

#[test]
fn daily_digest_selects_yesterdays_events() {
    let engine = engine_with_events();
    let today = NaiveDate::from_ymd_opt(2024, 3, 3).unwrap();
    let period = EmailFrequency::Daily.period(today).unwrap();

    let digest = engine.store.events(&period.event_filter(Some("security-a"))).unwrap();
    assert_eq!(digest.len(), 1);
    assert_eq!(digest[0].credit_id, Some(2));

    // Tuesday 5 March: the week of 26 February, which excludes the Monday event.
    let weekly = EmailFrequency::Weekly.period(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()).unwrap();
    assert_eq!(engine.store.events(&weekly.event_filter(None)).unwrap().len(), 3);
}
