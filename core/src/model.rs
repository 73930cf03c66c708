//! Records consumed by the pipeline and the profiles it aggregates them into.
//!
//! Credits and disbursements are owned by upstream systems; this crate
//! only reads them and writes back the profile links.

use crate::types::{Amount, RowId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Credits ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CreditResolution {
    Initial,
    Pending,
    Manual,
    Credited,
    Refunded,
    Failed,
}

impl CreditResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial  => "initial",
            Self::Pending  => "pending",
            Self::Manual   => "manual",
            Self::Credited => "credited",
            Self::Refunded => "refunded",
            Self::Failed   => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "initial"  => Self::Initial,
            "pending"  => Self::Pending,
            "manual"   => Self::Manual,
            "credited" => Self::Credited,
            "refunded" => Self::Refunded,
            "failed"   => Self::Failed,
            _ => return None,
        })
    }
}

/// Where the money came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum CreditSource {
    BankTransfer {
        sender_name:    Option<String>,
        sort_code:      Option<String>,
        account_number: Option<String>,
        roll_number:    Option<String>,
    },
    Online {
        cardholder_name:         Option<String>,
        card_number_last_digits: Option<String>,
        card_expiry_date:        Option<String>,
        postcode:                Option<String>,
        email:                   Option<String>,
    },
    Unknown,
}

impl CreditSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BankTransfer { .. } => "bank_transfer",
            Self::Online { .. }       => "online",
            Self::Unknown             => "unknown",
        }
    }

    /// A sender profile can only be keyed on complete account or card details.
    pub fn has_enough_detail_for_sender_profile(&self) -> bool {
        fn present(v: &Option<String>) -> bool {
            v.as_deref().is_some_and(|s| !s.trim().is_empty())
        }
        match self {
            Self::BankTransfer { sender_name, sort_code, account_number, .. } => {
                present(sender_name) && present(sort_code) && present(account_number)
            }
            Self::Online {
                cardholder_name,
                card_number_last_digits,
                card_expiry_date,
                postcode,
                email,
            } => {
                present(cardholder_name)
                    && present(card_number_last_digits)
                    && present(card_expiry_date)
                    && present(postcode)
                    && present(email)
            }
            Self::Unknown => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credit {
    pub id:                  RowId,
    pub amount:              Amount,
    pub received_at:         DateTime<Utc>,
    pub prisoner_number:     Option<String>,
    pub prisoner_dob:        Option<NaiveDate>,
    pub prisoner_name:       Option<String>,
    pub prison:              Option<String>,
    pub resolution:          CreditResolution,
    pub source:              CreditSource,
    pub sender_profile_id:   Option<RowId>,
    pub prisoner_profile_id: Option<RowId>,
    pub profiled:            bool,
}

/// Insert payload for a credit; the store assigns the id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCredit {
    pub amount:          Amount,
    pub received_at:     DateTime<Utc>,
    pub prisoner_number: Option<String>,
    pub prisoner_dob:    Option<NaiveDate>,
    pub prisoner_name:   Option<String>,
    pub prison:          Option<String>,
    pub resolution:      CreditResolution,
    pub source:          CreditSource,
}

// ── Disbursements ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DisbursementResolution {
    Pending,
    Rejected,
    Preconfirmed,
    Confirmed,
    Sent,
}

impl DisbursementResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending      => "pending",
            Self::Rejected     => "rejected",
            Self::Preconfirmed => "preconfirmed",
            Self::Confirmed    => "confirmed",
            Self::Sent         => "sent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "pending"      => Self::Pending,
            "rejected"     => Self::Rejected,
            "preconfirmed" => Self::Preconfirmed,
            "confirmed"    => Self::Confirmed,
            "sent"         => Self::Sent,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DisbursementMethod {
    BankTransfer,
    Cheque,
}

impl DisbursementMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BankTransfer => "bank_transfer",
            Self::Cheque       => "cheque",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bank_transfer" => Some(Self::BankTransfer),
            "cheque"        => Some(Self::Cheque),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Disbursement {
    pub id:                   RowId,
    pub amount:               Amount,
    pub created:              DateTime<Utc>,
    pub prisoner_number:      String,
    pub prisoner_name:        String,
    pub prison:               String,
    pub resolution:           DisbursementResolution,
    pub method:               DisbursementMethod,
    pub recipient_name:       String,
    pub sort_code:            Option<String>,
    pub account_number:       Option<String>,
    pub roll_number:          Option<String>,
    pub recipient_profile_id: Option<RowId>,
    pub prisoner_profile_id:  Option<RowId>,
    pub profiled:             bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDisbursement {
    pub amount:          Amount,
    pub created:         DateTime<Utc>,
    pub prisoner_number: String,
    pub prisoner_name:   String,
    pub prison:          String,
    pub resolution:      DisbursementResolution,
    pub method:          DisbursementMethod,
    pub recipient_name:  String,
    pub sort_code:       Option<String>,
    pub account_number:  Option<String>,
    pub roll_number:     Option<String>,
}

// ── Financial record ─────────────────────────────────────────────────────────

/// What the rules are evaluated against.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Credit(Credit),
    Disbursement(Disbursement),
}

impl Record {
    pub fn id(&self) -> RowId {
        match self {
            Self::Credit(c)       => c.id,
            Self::Disbursement(d) => d.id,
        }
    }

    pub fn amount(&self) -> Amount {
        match self {
            Self::Credit(c)       => c.amount,
            Self::Disbursement(d) => d.amount,
        }
    }

    /// The moment an event for this record is said to have happened.
    pub fn triggered_at(&self) -> DateTime<Utc> {
        match self {
            Self::Credit(c)       => c.received_at,
            Self::Disbursement(d) => d.created,
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Credit(_)       => RecordKind::Credit,
            Self::Disbursement(_) => RecordKind::Disbursement,
        }
    }

    pub fn prisoner_profile_id(&self) -> Option<RowId> {
        match self {
            Self::Credit(c)       => c.prisoner_profile_id,
            Self::Disbursement(d) => d.prisoner_profile_id,
        }
    }

    pub fn sender_profile_id(&self) -> Option<RowId> {
        match self {
            Self::Credit(c)       => c.sender_profile_id,
            Self::Disbursement(_) => None,
        }
    }

    pub fn recipient_profile_id(&self) -> Option<RowId> {
        match self {
            Self::Credit(_)       => None,
            Self::Disbursement(d) => d.recipient_profile_id,
        }
    }

    /// Resolve a profile reference on this record.
    pub fn profile(&self, kind: ProfileKind) -> Option<ProfileRef> {
        let id = match kind {
            ProfileKind::Sender    => self.sender_profile_id(),
            ProfileKind::Prisoner  => self.prisoner_profile_id(),
            ProfileKind::Recipient => self.recipient_profile_id(),
        }?;
        Some(ProfileRef { kind, id })
    }
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Credit(c)       => write!(f, "credit {}", c.id),
            Self::Disbursement(d) => write!(f, "disbursement {}", d.id),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Credit,
    Disbursement,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credit       => "credit",
            Self::Disbursement => "disbursement",
        }
    }
}

// ── Profiles ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ProfileKind {
    Sender,
    Prisoner,
    Recipient,
}

impl ProfileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sender    => "sender",
            Self::Prisoner  => "prisoner",
            Self::Recipient => "recipient",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ProfileRef {
    pub kind: ProfileKind,
    pub id:   RowId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SenderProfile {
    pub id:           RowId,
    pub credit_count: i64,
    pub credit_total: Amount,
    pub created:      DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrisonerProfile {
    pub id:                 RowId,
    pub prisoner_number:    String,
    pub prisoner_dob:       Option<NaiveDate>,
    pub prisoner_name:      String,
    pub single_offender_id: Option<Uuid>,
    pub current_prison:     Option<String>,
    pub credit_count:       i64,
    pub credit_total:       Amount,
    pub disbursement_count: i64,
    pub disbursement_total: Amount,
    pub created:            DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecipientProfile {
    pub id:                 RowId,
    pub disbursement_count: i64,
    pub disbursement_total: Amount,
    pub created:            DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct BankAccount {
    pub sort_code:      String,
    pub account_number: String,
    pub roll_number:    String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DebitCard {
    pub card_number_last_digits: String,
    pub card_expiry_date:        String,
    pub postcode:                String,
}

/// Upstream prisoner location feed, used to fill in `current_prison`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrisonerLocation {
    pub prisoner_number:    String,
    pub prisoner_dob:       NaiveDate,
    pub prisoner_name:      String,
    pub prison:             String,
    pub single_offender_id: Option<Uuid>,
    pub active:             bool,
}

// ── Events ───────────────────────────────────────────────────────────────────

/// A materialised rule trigger. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    pub id:              RowId,
    pub rule:            String,
    pub description:     String,
    pub triggered_at:    DateTime<Utc>,
    /// `None`: visible to everyone subscribed to the rule.
    pub user:            Option<UserId>,
    pub credit_id:       Option<RowId>,
    pub disbursement_id: Option<RowId>,
    pub profile:         Option<ProfileRef>,
}
