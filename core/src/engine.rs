//! The security pipeline driver.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. Recreate only: delete every profile and unflag every record
//!   2. Credits, in id order, one savepoint per batch:
//!        a. ProfileAggregator  (attach profiles, bump counters)
//!        b. RuleEngine         (evaluate enabled rules)
//!        c. EventMaterializer  (write events, called by the rules)
//!   3. Disbursements, same as 2
//!   4. Current prisons refreshed from prisoner locations, even when
//!      2 or 3 failed
//!
//! RULES:
//!   - A batch either commits completely or not at all.
//!   - Records skipped for ambiguity do not fail the batch.
//!   - Batch size and profiling order never change which events exist.
//!   - Every stage reports to the pipeline log under the run id.

use crate::{
    config::SecurityConfig,
    error::{SecurityError, SecurityResult},
    event::{PipelineEvent, PipelineLogEntry},
    model::{Record, RecordKind},
    profile_aggregator::{Aggregated, ProfileAggregator},
    rules::{RuleEngine, RuleOutcome, RuleSet},
    store::{ProfileCounts, SecurityStore},
    types::{RowId, RunId},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    /// Profile new records and run the rules.
    Update,
    /// Delete all profiles first, then update.
    Recreate,
    /// Only recompute profile counters.
    RecalculateTotals,
}

impl UpdateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Update            => "update",
            Self::Recreate          => "recreate",
            Self::RecalculateTotals => "recalculate_totals",
        }
    }
}

/// Options of one pipeline run, as given on the command line.
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    pub batch_size:         usize,
    pub recreate:           bool,
    pub recalculate_totals: bool,
}

impl UpdateOptions {
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size, recreate: false, recalculate_totals: false }
    }

    pub fn mode(&self) -> SecurityResult<UpdateMode> {
        if self.recreate && self.recalculate_totals {
            return Err(SecurityError::InvalidArgument(
                "cannot recalculate totals when deleting all profiles".into(),
            ));
        }
        if self.batch_size < 1 {
            return Err(SecurityError::InvalidArgument("batch size must be at least 1".into()));
        }
        Ok(match (self.recreate, self.recalculate_totals) {
            (true, _) => UpdateMode::Recreate,
            (_, true) => UpdateMode::RecalculateTotals,
            _ => UpdateMode::Update,
        })
    }
}

/// What a run did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub run_id:                  RunId,
    pub batches:                 u64,
    pub records_processed:       usize,
    pub records_skipped:         usize,
    pub events_created:          usize,
    pub profiles_deleted:        Option<ProfileCounts>,
    pub profiles_recalculated:   usize,
    pub current_prisons_updated: usize,
}

#[derive(Debug, Default)]
struct BatchStats {
    records: usize,
    skipped: usize,
    events:  usize,
}

pub struct SecurityEngine {
    pub store:  SecurityStore,
    config:     SecurityConfig,
    aggregator: ProfileAggregator,
    rules:      RuleEngine,
}

impl SecurityEngine {
    pub fn new(store: SecurityStore, config: SecurityConfig) -> SecurityResult<Self> {
        let rules = RuleEngine::new(RuleSet::from_config(&config)?);
        Ok(Self {
            store,
            config,
            aggregator: ProfileAggregator::new(),
            rules,
        })
    }

    /// Build an engine over a migrated in-memory store with every rule
    /// enabled. For tests only.
    pub fn build_test() -> SecurityResult<Self> {
        let store = SecurityStore::in_memory()?;
        store.migrate()?;
        Self::new(store, SecurityConfig::default_test())
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    /// Default options from configuration.
    pub fn default_options(&self) -> UpdateOptions {
        UpdateOptions::new(self.config.batch_size)
    }

    /// Run the pipeline once.
    pub fn run(&self, options: &UpdateOptions) -> SecurityResult<RunSummary> {
        let mode = options.mode()?;
        let run_id = self.store.insert_run(VERSION, Utc::now())?;
        log::info!("run {run_id}: {} with batch size {}", mode.as_str(), options.batch_size);
        self.record(&run_id, 0, &PipelineEvent::RunStarted {
            run_id:     run_id.clone(),
            batch_size: options.batch_size,
            mode:       mode.as_str().to_string(),
        })?;

        let mut summary = RunSummary { run_id: run_id.clone(), ..RunSummary::default() };
        match mode {
            UpdateMode::RecalculateTotals => {
                for event in self.aggregator.recalculate_totals(&self.store, options.batch_size)? {
                    if let PipelineEvent::TotalsRecalculated { profiles, .. } = &event {
                        summary.profiles_recalculated += profiles;
                    }
                    self.record(&run_id, 0, &event)?;
                }
            }
            UpdateMode::Update | UpdateMode::Recreate => {
                if mode == UpdateMode::Recreate {
                    let (counts, event) = self.aggregator.delete_profiles(&self.store)?;
                    summary.profiles_deleted = Some(counts);
                    self.record(&run_id, 0, &event)?;
                }
                let updated = self.update(&run_id, options.batch_size, &mut summary);

                // Always runs, whatever happened to the update.
                let prisons = self
                    .aggregator
                    .update_current_prisons(&self.store)
                    .and_then(|event| {
                        self.record(&run_id, summary.batches, &event)?;
                        Ok(event)
                    });
                updated?;
                if let PipelineEvent::CurrentPrisonsUpdated { profiles } = prisons? {
                    summary.current_prisons_updated = profiles;
                }
            }
        }

        self.record(&run_id, summary.batches, &PipelineEvent::RunCompleted {
            run_id:            run_id.clone(),
            records_processed: summary.records_processed,
            records_skipped:   summary.records_skipped,
            events_created:    summary.events_created,
        })?;
        self.store.finish_run(&run_id, Utc::now())?;
        log::info!(
            "run {run_id} complete: {} records profiled, {} skipped, {} events",
            summary.records_processed,
            summary.records_skipped,
            summary.events_created
        );
        Ok(summary)
    }

    fn update(&self, run_id: &str, batch_size: usize, summary: &mut RunSummary) -> SecurityResult<()> {
        for kind in [RecordKind::Credit, RecordKind::Disbursement] {
            // Fetched up front so records touched mid-run are not revisited.
            let ids = match kind {
                RecordKind::Credit       => self.store.unprofiled_credit_ids()?,
                RecordKind::Disbursement => self.store.unprofiled_disbursement_ids()?,
            };
            if ids.is_empty() {
                log::info!("no new {} records require profiling", kind.as_str());
                continue;
            }
            log::info!("profiling {} new {} records", ids.len(), kind.as_str());

            for chunk in ids.chunks(batch_size) {
                summary.batches += 1;
                let stats = self.process_batch(run_id, summary.batches, kind, chunk)?;
                summary.records_processed += stats.records;
                summary.records_skipped += stats.skipped;
                summary.events_created += stats.events;
                log::info!(
                    "batch {}: {} {} records profiled, {} skipped, {} events",
                    summary.batches,
                    stats.records,
                    kind.as_str(),
                    stats.skipped,
                    stats.events
                );
            }
        }
        Ok(())
    }

    /// Aggregate a batch, then run the rules over what was profiled.
    fn process_batch(
        &self,
        run_id: &str,
        batch: u64,
        kind: RecordKind,
        ids: &[RowId],
    ) -> SecurityResult<BatchStats> {
        self.store.atomic(|store| {
            let mut stats = BatchStats::default();
            let mut log: Vec<PipelineEvent> = Vec::new();
            let mut profiled: Vec<Record> = Vec::with_capacity(ids.len());

            for &id in ids {
                let outcome = match kind {
                    RecordKind::Credit       => self.aggregator.aggregate_credit(store, id)?,
                    RecordKind::Disbursement => self.aggregator.aggregate_disbursement(store, id)?,
                };
                log.extend(outcome.events);
                match outcome.result {
                    Aggregated::Profiled(record) => profiled.push(record),
                    Aggregated::Skipped { .. } => stats.skipped += 1,
                    Aggregated::AlreadyProfiled => {}
                }
            }

            for record in &profiled {
                let outcomes = self.rules.process(store, record)?;
                stats.events += log_outcomes(&mut log, kind, outcomes);
            }
            // Then the already profiled records whose windows reach this batch.
            for record in &profiled {
                let outcomes = self.rules.process_covering(store, record)?;
                stats.events += log_outcomes(&mut log, kind, outcomes);
            }
            stats.records = profiled.len();

            log.push(PipelineEvent::BatchCompleted {
                batch,
                records: stats.records,
                skipped: stats.skipped,
                events:  stats.events,
            });
            for event in &log {
                self.record(run_id, batch, event)?;
            }
            Ok(stats)
        })
    }

    /// Persist one pipeline event to the audit log.
    fn record(&self, run_id: &str, batch: u64, event: &PipelineEvent) -> SecurityResult<()> {
        let entry = PipelineLogEntry {
            id:         None,
            run_id:     run_id.to_string(),
            batch,
            stage:      event.stage().to_string(),
            event_type: event.type_name().to_string(),
            payload:    serde_json::to_string(event)?,
        };
        self.store.append_log(&entry)
    }
}

/// Append one `RuleTriggered` per outcome; returns the new event count.
fn log_outcomes(log: &mut Vec<PipelineEvent>, kind: RecordKind, outcomes: Vec<RuleOutcome>) -> usize {
    let mut events = 0;
    for outcome in outcomes {
        events += outcome.event_ids.len();
        log.push(PipelineEvent::RuleTriggered {
            rule:      outcome.rule.to_string(),
            record:    kind,
            record_id: outcome.record_id,
            event_ids: outcome.event_ids,
        });
    }
    events
}
