//! Profile aggregation: matching, counters, idempotence and skipping.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use mtp_security_core::{
    engine::SecurityEngine,
    model::{
        CreditResolution, CreditSource, DisbursementMethod, DisbursementResolution, NewCredit,
        NewDisbursement, PrisonerLocation,
    },
    types::Amount,
};
use uuid::Uuid;

fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, 10, 0, 0).unwrap()
}

fn dob(year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, 5, 17).unwrap()
}

fn bank_credit(amount: Amount, day: u32, prisoner: &str, prisoner_dob: Option<NaiveDate>, account: &str) -> NewCredit {
    NewCredit {
        amount,
        received_at:     at(day),
        prisoner_number: Some(prisoner.into()),
        prisoner_dob,
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

fn bank_disbursement(amount: Amount, day: u32, prisoner: &str, account: Option<&str>) -> NewDisbursement {
    NewDisbursement {
        amount,
        created:         at(day),
        prisoner_number: prisoner.into(),
        prisoner_name:   "JAMES HALLS".into(),
        prison:          "BXI".into(),
        resolution:      DisbursementResolution::Sent,
        method:          if account.is_some() {
            DisbursementMethod::BankTransfer
        } else {
            DisbursementMethod::Cheque
        },
        recipient_name:  "Jack Halls".into(),
        sort_code:       account.map(|_| "202020".to_string()),
        account_number:  account.map(str::to_string),
        roll_number:     None,
    }
}

#[test]
fn credit_creates_sender_and_prisoner_profiles() {
    let engine = SecurityEngine::build_test().unwrap();
    let id = engine.store.insert_credit(&bank_credit(2000, 1, "A1409AE", Some(dob(1989)), "12312345")).unwrap();

    let summary = engine.run(&engine.default_options()).unwrap();
    assert_eq!(summary.records_processed, 1);
    assert_eq!(summary.records_skipped, 0);

    let credit = engine.store.get_credit(id).unwrap();
    assert!(credit.profiled);
    let sender_id = credit.sender_profile_id.expect("sender profile");
    let prisoner_id = credit.prisoner_profile_id.expect("prisoner profile");

    let sender = engine.store.get_sender_profile(sender_id).unwrap();
    assert_eq!((sender.credit_count, sender.credit_total), (1, 2000));
    assert_eq!(sender.created, at(1));
    assert_eq!(engine.store.sender_names(sender_id).unwrap(), vec!["Mary Halls".to_string()]);
    assert_eq!(engine.store.sender_prisons(sender_id).unwrap(), vec!["BXI".to_string()]);

    let prisoner = engine.store.get_prisoner_profile(prisoner_id).unwrap();
    assert_eq!(prisoner.prisoner_number, "A1409AE");
    assert_eq!(prisoner.prisoner_dob, Some(dob(1989)));
    assert_eq!((prisoner.credit_count, prisoner.credit_total), (1, 2000));
    assert_eq!(engine.store.prisoner_sender_ids(prisoner_id).unwrap(), vec![sender_id]);
}

#[test]
fn rerunning_the_update_does_not_double_count() {
    let engine = SecurityEngine::build_test().unwrap();
    let id = engine.store.insert_credit(&bank_credit(2000, 1, "A1409AE", Some(dob(1989)), "12312345")).unwrap();

    engine.run(&engine.default_options()).unwrap();
    let again = engine.run(&engine.default_options()).unwrap();
    assert_eq!(again.records_processed, 0);
    assert_eq!(again.batches, 0);

    let credit = engine.store.get_credit(id).unwrap();
    let sender = engine.store.get_sender_profile(credit.sender_profile_id.unwrap()).unwrap();
    assert_eq!(sender.credit_count, 1);
    let prisoner = engine.store.get_prisoner_profile(credit.prisoner_profile_id.unwrap()).unwrap();
    assert_eq!(prisoner.credit_total, 2000);
}

#[test]
fn same_bank_account_reuses_sender_profile() {
    let engine = SecurityEngine::build_test().unwrap();
    engine.store.insert_credit(&bank_credit(2000, 1, "A1409AE", Some(dob(1989)), "12312345")).unwrap();
    engine.store.insert_credit(&bank_credit(3000, 2, "A1409AE", Some(dob(1989)), "12312345")).unwrap();
    engine.store.insert_credit(&bank_credit(500, 3, "A1409AE", Some(dob(1989)), "99998888")).unwrap();

    engine.run(&engine.default_options()).unwrap();

    let counts = engine.store.profile_counts().unwrap();
    assert_eq!(counts.sender, 2);
    assert_eq!(counts.prisoner, 1);

    let first = engine.store.get_credit(1).unwrap();
    let sender = engine.store.get_sender_profile(first.sender_profile_id.unwrap()).unwrap();
    assert_eq!((sender.credit_count, sender.credit_total), (2, 5000));
    let prisoner = engine.store.get_prisoner_profile(first.prisoner_profile_id.unwrap()).unwrap();
    assert_eq!((prisoner.credit_count, prisoner.credit_total), (3, 5500));
    assert_eq!(engine.store.prisoner_sender_ids(prisoner.id).unwrap().len(), 2);
}

#[test]
fn only_credited_credits_are_profiled() {
    let engine = SecurityEngine::build_test().unwrap();
    let mut failed = bank_credit(2000, 1, "A1409AE", Some(dob(1989)), "12312345");
    failed.resolution = CreditResolution::Failed;
    let id = engine.store.insert_credit(&failed).unwrap();

    let summary = engine.run(&engine.default_options()).unwrap();
    assert_eq!(summary.records_processed, 0);
    assert!(!engine.store.get_credit(id).unwrap().profiled);
    assert_eq!(engine.store.profile_counts().unwrap().sender, 0);
}

#[test]
fn pending_credit_is_profiled_once_credited() {
    let engine = SecurityEngine::build_test().unwrap();
    let mut pending = bank_credit(2000, 1, "A1409AE", Some(dob(1989)), "12312345");
    pending.resolution = CreditResolution::Pending;
    let id = engine.store.insert_credit(&pending).unwrap();

    assert_eq!(engine.run(&engine.default_options()).unwrap().records_processed, 0);

    engine.store.set_credit_resolution(id, CreditResolution::Credited).unwrap();
    assert_eq!(engine.store.unprofiled_credit_count().unwrap(), 1);
    assert_eq!(engine.run(&engine.default_options()).unwrap().records_processed, 1);
    assert!(engine.store.get_credit(id).unwrap().profiled);
}

#[test]
fn card_payment_without_email_only_gets_prisoner_profile() {
    let engine = SecurityEngine::build_test().unwrap();
    let mut credit = bank_credit(2000, 1, "A1409AE", Some(dob(1989)), "12312345");
    credit.source = CreditSource::Online {
        cardholder_name:         Some("Mary Halls".into()),
        card_number_last_digits: Some("4444".into()),
        card_expiry_date:        Some("10/27".into()),
        postcode:                Some("SW1A 1AA".into()),
        email:                   None,
    };
    let id = engine.store.insert_credit(&credit).unwrap();

    engine.run(&engine.default_options()).unwrap();

    let credit = engine.store.get_credit(id).unwrap();
    assert!(credit.profiled);
    assert!(credit.sender_profile_id.is_none());
    assert!(credit.prisoner_profile_id.is_some());
}

#[test]
fn ambiguous_prisoner_is_skipped_and_left_unprofiled() {
    let engine = SecurityEngine::build_test().unwrap();
    engine.store.create_prisoner_profile("A1409AE", Some(dob(1989)), "JAMES HALLS", None, at(1)).unwrap();
    engine.store.create_prisoner_profile("A1409AE", Some(dob(1990)), "JAMES HALLS", None, at(1)).unwrap();

    let unclear = engine.store.insert_credit(&bank_credit(2000, 2, "A1409AE", None, "12312345")).unwrap();
    let clear = engine.store.insert_credit(&bank_credit(3000, 3, "A1409AE", Some(dob(1990)), "55556666")).unwrap();

    let summary = engine.run(&engine.default_options()).unwrap();
    assert_eq!(summary.records_processed, 1);
    assert_eq!(summary.records_skipped, 1);

    let skipped = engine.store.get_credit(unclear).unwrap();
    assert!(!skipped.profiled);
    assert!(skipped.sender_profile_id.is_none());
    assert!(engine.store.get_credit(clear).unwrap().profiled);
    // The skipped credit's sender profile was rolled back with it.
    assert_eq!(engine.store.profile_counts().unwrap().sender, 1);

    let log = engine.store.log_for_run(&summary.run_id).unwrap();
    assert!(log.iter().any(|e| e.event_type == "record_skipped"));

    // Still ambiguous on the next run.
    let again = engine.run(&engine.default_options()).unwrap();
    assert_eq!(again.records_skipped, 1);
}

#[test]
fn profile_without_dob_adopts_it_later() {
    let engine = SecurityEngine::build_test().unwrap();
    engine.store.insert_credit(&bank_credit(2000, 1, "A1409AE", None, "12312345")).unwrap();
    engine.store.insert_credit(&bank_credit(3000, 2, "A1409AE", Some(dob(1989)), "12312345")).unwrap();

    engine.run(&engine.default_options()).unwrap();

    assert_eq!(engine.store.profile_counts().unwrap().prisoner, 1);
    let credit = engine.store.get_credit(2).unwrap();
    let prisoner = engine.store.get_prisoner_profile(credit.prisoner_profile_id.unwrap()).unwrap();
    assert_eq!(prisoner.prisoner_dob, Some(dob(1989)));
    assert_eq!(prisoner.credit_count, 2);
}

#[test]
fn disbursement_matches_prisoner_through_location() {
    let engine = SecurityEngine::build_test().unwrap();
    let offender = Uuid::from_u128(0x5ca1_ab1e);
    engine
        .store
        .insert_prisoner_location(&PrisonerLocation {
            prisoner_number:    "A1409AE".into(),
            prisoner_dob:       dob(1989),
            prisoner_name:      "JAMES HALLS".into(),
            prison:             "LEI".into(),
            single_offender_id: Some(offender),
            active:             true,
        })
        .unwrap();
    engine.store.insert_credit(&bank_credit(2000, 1, "A1409AE", Some(dob(1989)), "12312345")).unwrap();
    let id = engine.store.insert_disbursement(&bank_disbursement(1500, 2, "A1409AE", Some("87654321"))).unwrap();

    let summary = engine.run(&engine.default_options()).unwrap();
    assert_eq!(summary.records_processed, 2);

    let counts = engine.store.profile_counts().unwrap();
    assert_eq!((counts.prisoner, counts.recipient), (1, 1));

    let disbursement = engine.store.get_disbursement(id).unwrap();
    assert!(disbursement.profiled);
    let recipient_id = disbursement.recipient_profile_id.unwrap();
    let recipient = engine.store.get_recipient_profile(recipient_id).unwrap();
    assert_eq!((recipient.disbursement_count, recipient.disbursement_total), (1, 1500));

    let prisoner = engine.store.get_prisoner_profile(disbursement.prisoner_profile_id.unwrap()).unwrap();
    assert_eq!(prisoner.single_offender_id, Some(offender));
    assert_eq!(prisoner.current_prison.as_deref(), Some("LEI"));
    assert_eq!((prisoner.disbursement_count, prisoner.disbursement_total), (1, 1500));
    assert_eq!(engine.store.prisoner_recipient_ids(prisoner.id).unwrap(), vec![recipient_id]);
}

#[test]
fn cheques_share_one_recipient_profile() {
    let engine = SecurityEngine::build_test().unwrap();
    engine.store.insert_disbursement(&bank_disbursement(1500, 1, "A1409AE", None)).unwrap();
    engine.store.insert_disbursement(&bank_disbursement(2500, 2, "B2222BB", None)).unwrap();
    engine.store.insert_disbursement(&bank_disbursement(1000, 3, "B2222BB", Some("87654321"))).unwrap();

    engine.run(&engine.default_options()).unwrap();

    let counts = engine.store.profile_counts().unwrap();
    assert_eq!(counts.recipient, 2);
    assert_eq!(counts.prisoner, 2);
    let cheque = engine.store.get_disbursement(1).unwrap().recipient_profile_id.unwrap();
    assert_eq!(engine.store.get_disbursement(2).unwrap().recipient_profile_id, Some(cheque));
    assert_eq!(engine.store.get_recipient_profile(cheque).unwrap().disbursement_total, 4000);
}

#[test]
fn bank_transfer_without_details_has_no_recipient() {
    let engine = SecurityEngine::build_test().unwrap();
    let mut disbursement = bank_disbursement(1500, 1, "A1409AE", Some("87654321"));
    disbursement.account_number = None;
    let id = engine.store.insert_disbursement(&disbursement).unwrap();

    engine.run(&engine.default_options()).unwrap();

    let disbursement = engine.store.get_disbursement(id).unwrap();
    assert!(disbursement.profiled);
    assert!(disbursement.recipient_profile_id.is_none());
    assert!(disbursement.prisoner_profile_id.is_some());
}

#[test]
fn current_prison_follows_active_location() {
    let engine = SecurityEngine::build_test().unwrap();
    engine
        .store
        .insert_prisoner_location(&PrisonerLocation {
            prisoner_number:    "A1409AE".into(),
            prisoner_dob:       dob(1989),
            prisoner_name:      "JAMES HALLS".into(),
            prison:             "LEI".into(),
            single_offender_id: None,
            active:             true,
        })
        .unwrap();
    let id = engine.store.insert_credit(&bank_credit(2000, 1, "A1409AE", Some(dob(1989)), "12312345")).unwrap();

    let summary = engine.run(&engine.default_options()).unwrap();
    assert_eq!(summary.current_prisons_updated, 1);
    let prisoner_id = engine.store.get_credit(id).unwrap().prisoner_profile_id.unwrap();
    assert_eq!(
        engine.store.get_prisoner_profile(prisoner_id).unwrap().current_prison.as_deref(),
        Some("LEI")
    );

    engine.store.deactivate_prisoner_locations("A1409AE").unwrap();
    let summary = engine.run(&engine.default_options()).unwrap();
    assert_eq!(summary.current_prisons_updated, 1);
    assert!(engine.store.get_prisoner_profile(prisoner_id).unwrap().current_prison.is_none());
}
