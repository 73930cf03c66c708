//! Groups credits and disbursements into sender, prisoner and recipient
//! profiles and keeps the profile counters current.
//!
//! RULE: A record is profiled at most once. Only records whose `profiled`
//! flag is unset are picked up, and the flag is set in the same savepoint
//! as every profile write for that record.
//!
//! A record whose profile cannot be resolved unambiguously is skipped:
//! its writes are rolled back and it stays unprofiled until someone
//! resolves the duplicate profiles and the update is re-run.

use crate::{
    error::{SecurityError, SecurityResult},
    event::PipelineEvent,
    model::{
        BankAccount, Credit, CreditSource, DebitCard, Disbursement, DisbursementMethod,
        ProfileKind, Record, RecordKind,
    },
    store::{ProfileCounts, SecurityStore},
    types::RowId,
};
use chrono::{DateTime, NaiveDate, Utc};

/// What happened to one record.
#[derive(Debug)]
pub enum Aggregated {
    /// Linked to its profiles; carries the updated record for the rules.
    Profiled(Record),
    /// Left unprofiled.
    Skipped { reason: String },
    /// Already profiled by an earlier run.
    AlreadyProfiled,
}

/// Result of aggregating one record, with the audit events it produced.
#[derive(Debug)]
pub struct AggregateOutcome {
    pub result: Aggregated,
    pub events: Vec<PipelineEvent>,
}

#[derive(Debug, Default)]
pub struct ProfileAggregator;

impl ProfileAggregator {
    pub fn new() -> Self {
        Self
    }

    // ── Credits ────────────────────────────────────────────────

    pub fn aggregate_credit(&self, store: &SecurityStore, credit_id: RowId) -> SecurityResult<AggregateOutcome> {
        let credit = store.get_credit(credit_id)?;
        if credit.profiled {
            return Ok(AggregateOutcome { result: Aggregated::AlreadyProfiled, events: Vec::new() });
        }
        let attached = store.atomic(|store| {
            let mut events = Vec::new();
            self.attach_credit_profiles(store, &credit, &mut events)?;
            Ok(events)
        });
        self.finish(store, RecordKind::Credit, credit_id, attached)
    }

    fn attach_credit_profiles(
        &self,
        store: &SecurityStore,
        credit: &Credit,
        events: &mut Vec<PipelineEvent>,
    ) -> SecurityResult<()> {
        let record = format!("credit {}", credit.id);
        let prisoner_profile_id = match (&credit.prisoner_number, &credit.prisoner_name, &credit.prison) {
            (Some(number), Some(name), Some(prison)) => {
                let (id, created) = self.resolve_prisoner(
                    store,
                    &record,
                    number,
                    credit.prisoner_dob,
                    name,
                    credit.received_at,
                )?;
                if created {
                    events.push(profile_created(ProfileKind::Prisoner, id, RecordKind::Credit, credit.id));
                }
                store.add_prisoner_prison(id, prison)?;
                store.add_provided_prisoner_name(id, name)?;
                store.increment_prisoner_credit_totals(id, credit.amount)?;
                Some(id)
            }
            _ => {
                log::info!("{record}: not enough prisoner detail for a prisoner profile");
                None
            }
        };

        let sender_profile_id = if credit.source.has_enough_detail_for_sender_profile() {
            let (id, created) = self.resolve_sender(store, &record, credit)?;
            if created {
                events.push(profile_created(ProfileKind::Sender, id, RecordKind::Credit, credit.id));
            }
            if let Some(prison) = &credit.prison {
                store.add_sender_prison(id, prison)?;
            }
            store.increment_sender_totals(id, credit.amount)?;
            Some(id)
        } else {
            log::info!("{record}: not enough sender detail for a sender profile");
            None
        };

        if let (Some(prisoner), Some(sender)) = (prisoner_profile_id, sender_profile_id) {
            store.link_prisoner_sender(prisoner, sender)?;
        }
        store.mark_credit_profiled(credit.id, sender_profile_id, prisoner_profile_id)?;
        events.push(PipelineEvent::RecordProfiled {
            record:    RecordKind::Credit,
            record_id: credit.id,
            amount:    credit.amount,
        });
        Ok(())
    }

    /// Find the credit's sender by bank account or card, creating the
    /// profile when none matches. Returns `(id, created)`.
    fn resolve_sender(
        &self,
        store: &SecurityStore,
        record: &str,
        credit: &Credit,
    ) -> SecurityResult<(RowId, bool)> {
        match &credit.source {
            CreditSource::BankTransfer { sender_name, sort_code, account_number, roll_number } => {
                let account = BankAccount {
                    sort_code:      sort_code.clone().unwrap_or_default(),
                    account_number: account_number.clone().unwrap_or_default(),
                    roll_number:    roll_number.clone().unwrap_or_default(),
                };
                let candidates = store.find_sender_profiles_by_bank_account(&account)?;
                let (id, created) =
                    pick_or_create(candidates, ProfileKind::Sender, record, || {
                        store.create_sender_profile(credit.received_at)
                    })?;
                let bank_account_id = store.get_or_create_bank_account(&account)?;
                store.add_sender_bank_transfer(id, bank_account_id, sender_name.as_deref().unwrap_or_default())?;
                Ok((id, created))
            }
            CreditSource::Online {
                cardholder_name,
                card_number_last_digits,
                card_expiry_date,
                postcode,
                email,
            } => {
                let card = DebitCard {
                    card_number_last_digits: card_number_last_digits.clone().unwrap_or_default(),
                    card_expiry_date:        card_expiry_date.clone().unwrap_or_default(),
                    postcode:                postcode.clone().unwrap_or_default(),
                };
                let candidates = store.find_sender_profiles_by_debit_card(&card)?;
                let (id, created) =
                    pick_or_create(candidates, ProfileKind::Sender, record, || {
                        store.create_sender_profile(credit.received_at)
                    })?;
                let card_id = store.add_sender_debit_card(id, &card)?;
                if let Some(name) = cardholder_name {
                    store.add_cardholder_name(card_id, name)?;
                }
                if let Some(email) = email {
                    store.add_sender_email(card_id, email)?;
                }
                Ok((id, created))
            }
            CreditSource::Unknown => Err(SecurityError::InvalidArgument(format!(
                "{record}: cannot profile a sender of unknown source"
            ))),
        }
    }

    // ── Disbursements ──────────────────────────────────────────

    pub fn aggregate_disbursement(
        &self,
        store: &SecurityStore,
        disbursement_id: RowId,
    ) -> SecurityResult<AggregateOutcome> {
        let disbursement = store.get_disbursement(disbursement_id)?;
        if disbursement.profiled {
            return Ok(AggregateOutcome { result: Aggregated::AlreadyProfiled, events: Vec::new() });
        }
        let attached = store.atomic(|store| {
            let mut events = Vec::new();
            self.attach_disbursement_profiles(store, &disbursement, &mut events)?;
            Ok(events)
        });
        self.finish(store, RecordKind::Disbursement, disbursement_id, attached)
    }

    fn attach_disbursement_profiles(
        &self,
        store: &SecurityStore,
        d: &Disbursement,
        events: &mut Vec<PipelineEvent>,
    ) -> SecurityResult<()> {
        let record = format!("disbursement {}", d.id);

        let recipient_profile_id = match self.resolve_recipient(store, &record, d)? {
            Some((id, created)) => {
                if created {
                    events.push(profile_created(ProfileKind::Recipient, id, RecordKind::Disbursement, d.id));
                }
                store.add_recipient_prison(id, &d.prison)?;
                store.increment_recipient_totals(id, d.amount)?;
                Some(id)
            }
            None => None,
        };

        // Disbursements carry no date of birth; borrow it from the
        // prisoner's current location when there is one.
        let dob = store
            .active_prisoner_location(&d.prisoner_number)?
            .map(|location| location.prisoner_dob);
        let (prisoner_id, created) =
            self.resolve_prisoner(store, &record, &d.prisoner_number, dob, &d.prisoner_name, d.created)?;
        if created {
            events.push(profile_created(ProfileKind::Prisoner, prisoner_id, RecordKind::Disbursement, d.id));
        }
        store.add_prisoner_prison(prisoner_id, &d.prison)?;
        store.increment_prisoner_disbursement_totals(prisoner_id, d.amount)?;

        if let Some(recipient) = recipient_profile_id {
            store.link_prisoner_recipient(prisoner_id, recipient)?;
        }
        store.mark_disbursement_profiled(d.id, recipient_profile_id, Some(prisoner_id))?;
        events.push(PipelineEvent::RecordProfiled {
            record:    RecordKind::Disbursement,
            record_id: d.id,
            amount:    d.amount,
        });
        Ok(())
    }

    /// Bank transfers resolve by account; every cheque goes to the one
    /// cheque recipient profile.
    fn resolve_recipient(
        &self,
        store: &SecurityStore,
        record: &str,
        d: &Disbursement,
    ) -> SecurityResult<Option<(RowId, bool)>> {
        match d.method {
            DisbursementMethod::BankTransfer => {
                let (Some(sort_code), Some(account_number)) = (&d.sort_code, &d.account_number) else {
                    log::warn!("{record}: bank transfer without bank details, no recipient profile");
                    return Ok(None);
                };
                let account = BankAccount {
                    sort_code:      sort_code.clone(),
                    account_number: account_number.clone(),
                    roll_number:    d.roll_number.clone().unwrap_or_default(),
                };
                let candidates = store.find_recipient_profiles_by_bank_account(&account)?;
                let (id, created) =
                    pick_or_create(candidates, ProfileKind::Recipient, record, || {
                        store.create_recipient_profile(d.created)
                    })?;
                let bank_account_id = store.get_or_create_bank_account(&account)?;
                store.add_recipient_bank_transfer(id, bank_account_id)?;
                Ok(Some((id, created)))
            }
            DisbursementMethod::Cheque => {
                let candidates = store.find_cheque_recipient_profiles()?;
                let resolved = pick_or_create(candidates, ProfileKind::Recipient, record, || {
                    store.create_recipient_profile(d.created)
                })?;
                Ok(Some(resolved))
            }
        }
    }

    // ── Shared ─────────────────────────────────────────────────

    /// Match on number and date of birth, or on number alone when the
    /// date of birth is unknown. Returns `(id, created)`.
    fn resolve_prisoner(
        &self,
        store: &SecurityStore,
        record: &str,
        number: &str,
        dob: Option<NaiveDate>,
        name: &str,
        seen_at: DateTime<Utc>,
    ) -> SecurityResult<(RowId, bool)> {
        let mut candidates = store.find_prisoner_profiles(number, dob)?;
        if let (true, Some(dob)) = (candidates.is_empty(), dob) {
            // Adopt a profile created before the date of birth was known.
            candidates = store.find_prisoner_profiles_without_dob(number)?;
            if let [id] = candidates.as_slice() {
                store.set_prisoner_dob(*id, dob)?;
            }
        }
        pick_or_create(candidates, ProfileKind::Prisoner, record, || {
            let location = store.active_prisoner_location(number)?;
            let single_offender_id = location
                .filter(|l| dob.is_none() || Some(l.prisoner_dob) == dob)
                .and_then(|l| l.single_offender_id);
            store.create_prisoner_profile(number, dob, name, single_offender_id, seen_at)
        })
    }

    fn finish(
        &self,
        store: &SecurityStore,
        kind: RecordKind,
        record_id: RowId,
        attached: SecurityResult<Vec<PipelineEvent>>,
    ) -> SecurityResult<AggregateOutcome> {
        match attached {
            Ok(events) => {
                let record = match kind {
                    RecordKind::Credit       => Record::Credit(store.get_credit(record_id)?),
                    RecordKind::Disbursement => Record::Disbursement(store.get_disbursement(record_id)?),
                };
                Ok(AggregateOutcome { result: Aggregated::Profiled(record), events })
            }
            Err(e) if e.is_resolution_error() => {
                log::warn!("skipping {} {record_id}: {e}", kind.as_str());
                let reason = e.to_string();
                Ok(AggregateOutcome {
                    events: vec![PipelineEvent::RecordSkipped {
                        record: kind,
                        record_id,
                        reason: reason.clone(),
                    }],
                    result: Aggregated::Skipped { reason },
                })
            }
            Err(e) => Err(e),
        }
    }

    // ── Maintenance ────────────────────────────────────────────

    /// Recompute every profile's counts and totals from its linked records.
    pub fn recalculate_totals(
        &self,
        store: &SecurityStore,
        batch_size: usize,
    ) -> SecurityResult<Vec<PipelineEvent>> {
        if batch_size < 1 {
            return Err(SecurityError::InvalidArgument("batch size must be at least 1".into()));
        }
        let mut events = Vec::new();
        for kind in [ProfileKind::Sender, ProfileKind::Prisoner, ProfileKind::Recipient] {
            let ids = store.profile_ids(kind)?;
            if ids.is_empty() {
                log::info!("no {} profiles to update", kind.as_str());
                continue;
            }
            log::info!("updating {} {} profile totals", ids.len(), kind.as_str());
            let mut updated = 0;
            for chunk in ids.chunks(batch_size) {
                updated += store.atomic(|store| store.recalculate_totals(kind, chunk))?;
                log::info!("processed {updated} {} profiles", kind.as_str());
            }
            events.push(PipelineEvent::TotalsRecalculated { kind, profiles: updated });
        }
        Ok(events)
    }

    /// Delete every profile and mark every record unprofiled.
    pub fn delete_profiles(&self, store: &SecurityStore) -> SecurityResult<(ProfileCounts, PipelineEvent)> {
        let counts = store.atomic(|store| store.delete_all_profiles())?;
        log::info!(
            "deleted {} sender, {} prisoner and {} recipient profiles",
            counts.sender,
            counts.prisoner,
            counts.recipient
        );
        let event = PipelineEvent::ProfilesDeleted {
            sender:    counts.sender,
            prisoner:  counts.prisoner,
            recipient: counts.recipient,
        };
        Ok((counts, event))
    }

    pub fn update_current_prisons(&self, store: &SecurityStore) -> SecurityResult<PipelineEvent> {
        let profiles = store.update_current_prisons()?;
        log::info!("updated current prison of {profiles} prisoner profiles");
        Ok(PipelineEvent::CurrentPrisonsUpdated { profiles })
    }
}

/// Exactly one candidate is reused, none means create, more is ambiguous.
fn pick_or_create<F>(
    candidates: Vec<RowId>,
    kind: ProfileKind,
    record: &str,
    create: F,
) -> SecurityResult<(RowId, bool)>
where
    F: FnOnce() -> SecurityResult<RowId>,
{
    match candidates.as_slice() {
        [] => Ok((create()?, true)),
        [id] => Ok((*id, false)),
        _ => Err(SecurityError::AmbiguousProfile {
            kind:       kind.as_str(),
            record:     record.to_string(),
            candidates: candidates.len(),
        }),
    }
}

fn profile_created(kind: ProfileKind, profile_id: RowId, record: RecordKind, record_id: RowId) -> PipelineEvent {
    PipelineEvent::ProfileCreated { kind, profile_id, record, record_id }
}
