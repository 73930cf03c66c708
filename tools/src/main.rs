//! security-runner: headless runner for the security profile update.
//!
//! Usage:
//!   security-runner --db security.db --generate 500 --seed 7
//!   security-runner --db security.db --batch-size 100
//!   security-runner --db security.db --recreate
//!   security-runner --db security.db --recalculate-totals
//!   security-runner --db security.db --events --rule MONP --user security-1 --json
//!   security-runner --db security.db --events --frequency weekly
//!   security-runner --db security.db --unmonitor security-2

use anyhow::{bail, Result};
use chrono::Utc;
use mtp_security_core::{
    config::SecurityConfig,
    engine::{RunSummary, SecurityEngine, UpdateOptions},
    generator::DataGenerator,
    model::Event,
    notification::EmailFrequency,
    store::{EventFilter, SecurityStore},
    types::format_amount,
};
use std::env;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let db = arg_value(&args, "--db").unwrap_or(":memory:");
    let data_dir = arg_value(&args, "--data-dir").unwrap_or("./data");
    let seed = parse_arg(&args, "--seed", 42u64);
    let generate = parse_arg(&args, "--generate", 0usize);
    let json = has_flag(&args, "--json");

    let config = SecurityConfig::load(data_dir)?;
    let options = UpdateOptions {
        batch_size:         parse_arg(&args, "--batch-size", config.batch_size),
        recreate:           has_flag(&args, "--recreate"),
        recalculate_totals: has_flag(&args, "--recalculate-totals"),
    };
    // Reject bad combinations before touching the database.
    let mode = options.mode()?;

    if !json {
        println!("security-runner");
        println!("  db:         {db}");
        println!("  data_dir:   {data_dir}");
        println!("  mode:       {}", mode.as_str());
        println!("  batch size: {}", options.batch_size);
        println!();
    }

    let store = if db == ":memory:" {
        SecurityStore::in_memory()?
    } else {
        SecurityStore::open(db)?
    };
    store.migrate()?;
    log::info!("opened {}", store.path().unwrap_or("in-memory database"));

    if let Some(user) = arg_value(&args, "--unmonitor") {
        let removed = store.bulk_unmonitor(user)?;
        println!(
            "{user} no longer monitors {} prisoners, {} bank accounts and {} cards",
            removed.prisoners, removed.bank_accounts, removed.debit_cards
        );
        return Ok(());
    }

    if generate > 0 {
        let counts = DataGenerator::new(seed).populate(&store, generate)?;
        if !json {
            println!(
                "generated {} credits and {} disbursements for {} prisoners (seed {seed})",
                counts.credits, counts.disbursements, counts.prisoners
            );
        }
    }

    let engine = SecurityEngine::new(store, config)?;

    if has_flag(&args, "--events") {
        let filter = event_filter(&args)?;
        let events = engine.store.events(&filter)?;
        if json {
            println!("{}", serde_json::to_string_pretty(&events)?);
        } else {
            print_events(&events);
        }
        return Ok(());
    }

    let summary = engine.run(&options)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&engine, &summary)?;
    }
    Ok(())
}

fn event_filter(args: &[String]) -> Result<EventFilter> {
    let mut filter = EventFilter {
        rules:      args
            .windows(2)
            .filter(|w| w[0] == "--rule")
            .map(|w| w[1].clone())
            .collect(),
        visible_to: arg_value(args, "--user").map(str::to_string),
        limit:      arg_value(args, "--limit").and_then(|l| l.parse().ok()),
        ..EventFilter::default()
    };
    if let Some(frequency) = arg_value(args, "--frequency") {
        let frequency: EmailFrequency = frequency.parse().map_err(anyhow::Error::msg)?;
        let Some(period) = frequency.period(Utc::now().date_naive()) else {
            bail!("--frequency never selects no events");
        };
        filter.triggered_at_from = Some(period.start);
        filter.triggered_at_until = Some(period.end);
    }
    Ok(filter)
}

fn print_events(events: &[Event]) {
    println!("=== EVENTS ({}) ===", events.len());
    for event in events {
        let record = match (event.credit_id, event.disbursement_id) {
            (Some(id), _) => format!("credit {id}"),
            (_, Some(id)) => format!("disbursement {id}"),
            _ => "-".to_string(),
        };
        let profile = event
            .profile
            .map(|p| format!("{} profile {}", p.kind.as_str(), p.id))
            .unwrap_or_default();
        println!(
            "  {} | {:<6} | {:<18} | {:<12} | {profile}",
            event.triggered_at.format("%Y-%m-%d %H:%M"),
            event.rule,
            record,
            event.user.as_deref().unwrap_or("everyone"),
        );
    }
}

fn print_summary(engine: &SecurityEngine, summary: &RunSummary) -> Result<()> {
    let profiles = engine.store.profile_counts()?;
    println!("=== RUN SUMMARY ===");
    println!("  run_id:            {}", summary.run_id);
    println!("  batches:           {}", summary.batches);
    println!("  records profiled:  {}", summary.records_processed);
    println!("  records skipped:   {}", summary.records_skipped);
    println!("  events created:    {}", summary.events_created);
    if let Some(deleted) = summary.profiles_deleted {
        println!(
            "  profiles deleted:  {} sender, {} prisoner, {} recipient",
            deleted.sender, deleted.prisoner, deleted.recipient
        );
    }
    if summary.profiles_recalculated > 0 {
        println!("  totals recomputed: {} profiles", summary.profiles_recalculated);
    }
    println!("  current prisons:   {} updated", summary.current_prisons_updated);
    println!(
        "  profiles:          {} sender, {} prisoner, {} recipient",
        profiles.sender, profiles.prisoner, profiles.recipient
    );
    println!(
        "  still unprofiled:  {} credits, {} disbursements",
        engine.store.unprofiled_credit_count()?,
        engine.store.unprofiled_disbursement_count()?
    );

    println!();
    println!("=== EVENTS BY RULE ===");
    let rules = engine.config().enabled_credit_rules.iter()
        .chain(engine.config().enabled_disbursement_rules.iter());
    let mut seen: Vec<&String> = Vec::new();
    for rule in rules {
        if seen.contains(&rule) {
            continue;
        }
        seen.push(rule);
        let count = engine.store.event_count_for_rule(rule)?;
        let description = engine
            .rules()
            .rules()
            .lookup(rule)
            .map(|r| r.description().to_string())
            .unwrap_or_default();
        println!("  {rule:<6} {count:>6}  {description}");
    }
    println!();
    println!(
        "  high amount limit: {}",
        format_amount(engine.config().high_amount_limit, true)
    );
    Ok(())
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
