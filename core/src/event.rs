//! The pipeline audit log.
//!
//! Every stage reports what it did as a `PipelineEvent`. The engine persists
//! them to `pipeline_log` so a run can be reconstructed afterwards.
//! These are distinct from notification `Event`s (see `model::Event`), which
//! are the product of the rules.

use crate::{
    model::{ProfileKind, RecordKind},
    types::{Amount, RowId, RunId},
};
use serde::{Deserialize, Serialize};

/// Variants are added over time, never removed or reordered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    // ── Engine ─────────────────────────────────────
    RunStarted {
        run_id:     RunId,
        batch_size: usize,
        mode:       String,
    },
    BatchCompleted {
        batch:     u64,
        records:   usize,
        skipped:   usize,
        events:    usize,
    },
    RunCompleted {
        run_id:            RunId,
        records_processed: usize,
        records_skipped:   usize,
        events_created:    usize,
    },

    // ── Profile aggregation ────────────────────────
    ProfileCreated {
        kind:       ProfileKind,
        profile_id: RowId,
        record:     RecordKind,
        record_id:  RowId,
    },
    RecordProfiled {
        record:    RecordKind,
        record_id: RowId,
        amount:    Amount,
    },
    RecordSkipped {
        record:    RecordKind,
        record_id: RowId,
        reason:    String,
    },
    TotalsRecalculated {
        kind:     ProfileKind,
        profiles: usize,
    },
    ProfilesDeleted {
        sender:    usize,
        prisoner:  usize,
        recipient: usize,
    },
    CurrentPrisonsUpdated {
        profiles: usize,
    },

    // ── Rules ──────────────────────────────────────
    RuleTriggered {
        rule:      String,
        record:    RecordKind,
        record_id: RowId,
        event_ids: Vec<RowId>,
    },
}

impl PipelineEvent {
    /// Stable string name used for the event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::RunStarted { .. }            => "run_started",
            Self::BatchCompleted { .. }        => "batch_completed",
            Self::RunCompleted { .. }          => "run_completed",
            Self::ProfileCreated { .. }        => "profile_created",
            Self::RecordProfiled { .. }        => "record_profiled",
            Self::RecordSkipped { .. }         => "record_skipped",
            Self::TotalsRecalculated { .. }    => "totals_recalculated",
            Self::ProfilesDeleted { .. }       => "profiles_deleted",
            Self::CurrentPrisonsUpdated { .. } => "current_prisons_updated",
            Self::RuleTriggered { .. }         => "rule_triggered",
        }
    }

    /// The pipeline stage that emits this event.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } | Self::BatchCompleted { .. } | Self::RunCompleted { .. } => "engine",
            Self::RuleTriggered { .. } => "rules",
            _ => "aggregator",
        }
    }
}

/// The audit log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineLogEntry {
    pub id:         Option<i64>,
    pub run_id:     RunId,
    pub batch:      u64,
    pub stage:      String,
    pub event_type: String,
    pub payload:    String, // JSON-serialized PipelineEvent
}
