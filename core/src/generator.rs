//! Deterministic synthetic prisoner money.
//!
//! Used by `security-runner --generate` and the tests. The same seed and
//! record count always produce the same credits, disbursements, prisoner
//! locations and monitored bank accounts.

use crate::{
    error::SecurityResult,
    model::{
        BankAccount, CreditResolution, CreditSource, DisbursementMethod, DisbursementResolution,
        NewCredit, NewDisbursement, PrisonerLocation,
    },
    rng::{RngBank, Stream, StreamRng},
    store::SecurityStore,
    types::Amount,
};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use uuid::Uuid;

const PRISONS: &[&str] = &["BXI", "LEI", "INP", "MDI", "NMI", "WLI"];
const FIRST_NAMES: &[&str] = &[
    "James", "Mary", "Aisha", "Tom", "Priya", "Owen", "Zofia", "Daniel", "Grace", "Kwame",
    "Eilidh", "Mohammed", "Sarah", "Luca", "Niamh", "Ravi",
];
const LAST_NAMES: &[&str] = &[
    "Smith", "Jones", "Khan", "Williams", "Taylor", "Brown", "Nowak", "Evans", "Patel", "Okafor",
    "Murphy", "Campbell", "Ali", "Wright",
];
const POSTCODES: &[&str] = &["SW1A 1AA", "M1 1AE", "B33 8TH", "CR2 6XH", "DN55 1PT", "LS1 4AP"];

/// Days of synthetic history before the generator's end date.
const HISTORY_DAYS: i64 = 90;

/// How many rows of each kind were generated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneratedCounts {
    pub prisoners:          usize,
    pub credits:            usize,
    pub disbursements:      usize,
    pub monitored_accounts: usize,
}

struct Prisoner {
    number: String,
    dob:    NaiveDate,
    name:   String,
    prison: String,
}

enum Sender {
    Bank { name: String, account: BankAccount },
    Card {
        name:        String,
        last_digits: String,
        expiry:      String,
        postcode:    String,
        email:       String,
    },
}

struct Recipient {
    name:    String,
    account: Option<BankAccount>,
}

pub struct DataGenerator {
    bank: RngBank,
    end:  DateTime<Utc>,
}

impl DataGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            bank: RngBank::new(seed),
            end:  Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).single().unwrap_or_default(),
        }
    }

    /// Write `records` credits and disbursements plus the people behind them.
    pub fn populate(&self, store: &SecurityStore, records: usize) -> SecurityResult<GeneratedCounts> {
        let mut population = self.bank.for_stream(Stream::Population);
        let prisoners: Vec<Prisoner> = (0..(records / 10).max(3))
            .map(|_| random_prisoner(&mut population))
            .collect();
        let senders: Vec<Sender> = (0..(records / 6).max(3))
            .map(|_| random_sender(&mut population))
            .collect();
        let recipients: Vec<Recipient> = (0..(records / 12).max(2))
            .map(|_| random_recipient(&mut population))
            .collect();

        let credit_count = records * 2 / 3;
        let disbursement_count = records - credit_count;

        let mut credit_rng = self.bank.for_stream(Stream::Credits);
        let mut credits: Vec<NewCredit> = (0..credit_count)
            .map(|_| self.random_credit(&mut credit_rng, &prisoners, &senders))
            .collect();
        credits.sort_by_key(|c| c.received_at);

        let mut disbursement_rng = self.bank.for_stream(Stream::Disbursements);
        let mut disbursements: Vec<NewDisbursement> = (0..disbursement_count)
            .map(|_| self.random_disbursement(&mut disbursement_rng, &prisoners, &recipients))
            .collect();
        disbursements.sort_by_key(|d| d.created);

        let mut monitoring = self.bank.for_stream(Stream::Monitoring);
        let users: [&str; 3] = ["security-1", "security-2", "security-3"];
        let accounts: Vec<&BankAccount> = senders
            .iter()
            .filter_map(|s| match s {
                Sender::Bank { account, .. } => Some(account),
                Sender::Card { .. } => None,
            })
            .chain(recipients.iter().filter_map(|r| r.account.as_ref()))
            .collect();

        store.atomic(|store| {
            for prisoner in &prisoners {
                store.insert_prisoner_location(&PrisonerLocation {
                    prisoner_number:    prisoner.number.clone(),
                    prisoner_dob:       prisoner.dob,
                    prisoner_name:      prisoner.name.clone(),
                    prison:             prisoner.prison.clone(),
                    single_offender_id: Some(random_uuid(&mut population)),
                    active:             true,
                })?;
            }
            for credit in &credits {
                store.insert_credit(credit)?;
            }
            for disbursement in &disbursements {
                store.insert_disbursement(disbursement)?;
            }
            let mut monitored = 0;
            for account in &accounts {
                if monitoring.chance(0.2) {
                    let user = *monitoring.pick(&users[..]);
                    store.monitor_bank_account(user, account)?;
                    monitored += 1;
                }
            }
            log::info!(
                "generated {} prisoners, {} credits, {} disbursements, {monitored} monitored accounts",
                prisoners.len(),
                credits.len(),
                disbursements.len()
            );
            Ok(GeneratedCounts {
                prisoners:          prisoners.len(),
                credits:            credits.len(),
                disbursements:      disbursements.len(),
                monitored_accounts: monitored,
            })
        })
    }

    fn random_time(&self, rng: &mut StreamRng) -> DateTime<Utc> {
        let minutes = rng.below((HISTORY_DAYS * 24 * 60) as u64) as i64;
        self.end - Duration::days(HISTORY_DAYS) + Duration::minutes(minutes)
    }

    fn random_credit(&self, rng: &mut StreamRng, prisoners: &[Prisoner], senders: &[Sender]) -> NewCredit {
        let prisoner = rng.pick(prisoners);
        let sender = rng.pick(senders);
        let resolution = if rng.chance(0.9) {
            CreditResolution::Credited
        } else {
            *rng.pick(&[CreditResolution::Failed, CreditResolution::Refunded, CreditResolution::Pending])
        };
        let source = match sender {
            Sender::Bank { name, account } => CreditSource::BankTransfer {
                sender_name:    Some(name.clone()),
                sort_code:      Some(account.sort_code.clone()),
                account_number: Some(account.account_number.clone()),
                roll_number:    None,
            },
            Sender::Card { name, last_digits, expiry, postcode, email } => CreditSource::Online {
                cardholder_name:         Some(name.clone()),
                card_number_last_digits: Some(last_digits.clone()),
                card_expiry_date:        Some(expiry.clone()),
                postcode:                Some(postcode.clone()),
                email:                   Some(email.clone()),
            },
        };
        NewCredit {
            amount:          random_amount(rng),
            received_at:     self.random_time(rng),
            prisoner_number: Some(prisoner.number.clone()),
            // Bank transfers often arrive without a date of birth.
            prisoner_dob:    if rng.chance(0.8) { Some(prisoner.dob) } else { None },
            prisoner_name:   Some(prisoner.name.clone()),
            prison:          Some(prisoner.prison.clone()),
            resolution,
            source,
        }
    }

    fn random_disbursement(
        &self,
        rng: &mut StreamRng,
        prisoners: &[Prisoner],
        recipients: &[Recipient],
    ) -> NewDisbursement {
        let prisoner = rng.pick(prisoners);
        let recipient = rng.pick(recipients);
        let resolution = if rng.chance(0.85) {
            DisbursementResolution::Sent
        } else {
            *rng.pick(&[DisbursementResolution::Rejected, DisbursementResolution::Confirmed])
        };
        NewDisbursement {
            amount:          random_amount(rng),
            created:         self.random_time(rng),
            prisoner_number: prisoner.number.clone(),
            prisoner_name:   prisoner.name.clone(),
            prison:          prisoner.prison.clone(),
            resolution,
            method:          if recipient.account.is_some() {
                DisbursementMethod::BankTransfer
            } else {
                DisbursementMethod::Cheque
            },
            recipient_name:  recipient.name.clone(),
            sort_code:       recipient.account.as_ref().map(|a| a.sort_code.clone()),
            account_number:  recipient.account.as_ref().map(|a| a.account_number.clone()),
            roll_number:     None,
        }
    }
}

fn random_name(rng: &mut StreamRng) -> String {
    format!("{} {}", rng.pick(FIRST_NAMES), rng.pick(LAST_NAMES))
}

fn random_prisoner(rng: &mut StreamRng) -> Prisoner {
    let digits = rng.digits(4);
    let suffix: String = (0..2).map(|_| char::from(b'A' + rng.below(26) as u8)).collect();
    let number = format!("A{digits}{suffix}");
    let year = 1960 + rng.below(45) as i32;
    let month = 1 + rng.below(12) as u32;
    let day = 1 + rng.below(28) as u32;
    let dob = NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default();
    Prisoner {
        number,
        dob,
        name: random_name(rng).to_uppercase(),
        prison: rng.pick(PRISONS).to_string(),
    }
}

fn random_bank_account(rng: &mut StreamRng) -> BankAccount {
    BankAccount {
        sort_code:      rng.digits(6),
        account_number: rng.digits(8),
        roll_number:    String::new(),
    }
}

fn random_sender(rng: &mut StreamRng) -> Sender {
    let name = random_name(rng);
    if rng.chance(0.3) {
        Sender::Bank { name, account: random_bank_account(rng) }
    } else {
        let email = format!("{}@example.com", name.to_lowercase().replace(' ', "."));
        Sender::Card {
            name,
            last_digits: rng.digits(4),
            expiry:      format!("{:02}/{}", 1 + rng.below(12), 24 + rng.below(5)),
            postcode:    rng.pick(POSTCODES).to_string(),
            email,
        }
    }
}

fn random_recipient(rng: &mut StreamRng) -> Recipient {
    let name = random_name(rng);
    let account = if rng.chance(0.8) { Some(random_bank_account(rng)) } else { None };
    Recipient { name, account }
}

/// Mostly whole pounds, sometimes with pence, occasionally large.
fn random_amount(rng: &mut StreamRng) -> Amount {
    let pounds = rng.pareto(5.0, 1.5).min(2000.0) as Amount;
    if rng.chance(0.25) {
        pounds * 100 + 1 + rng.below(99) as Amount
    } else {
        pounds * 100
    }
}

fn random_uuid(rng: &mut StreamRng) -> Uuid {
    let high = rng.below(u64::MAX).to_be_bytes();
    let low = rng.below(u64::MAX).to_be_bytes();
    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&high);
    bytes[8..].copy_from_slice(&low);
    Uuid::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_are_positive() {
        let mut rng = RngBank::new(3).for_stream(Stream::Credits);
        for _ in 0..200 {
            assert!(random_amount(&mut rng) >= 500);
        }
    }

    #[test]
    fn prisoner_numbers_look_like_noms_ids() {
        let mut rng = RngBank::new(3).for_stream(Stream::Population);
        let prisoner = random_prisoner(&mut rng);
        assert_eq!(prisoner.number.len(), 7);
        assert!(prisoner.number.starts_with('A'));
    }
}
