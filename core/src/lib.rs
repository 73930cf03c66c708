//! Security profiles and notification rules for prisoner money.
//!
//! Credits and disbursements are grouped into sender, prisoner and
//! recipient profiles by the `ProfileAggregator`; the `RuleEngine` then
//! evaluates the enabled rules and the `EventMaterializer` writes the
//! resulting events. `SecurityEngine` drives the three in a fixed order.

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod event_materializer;
pub mod generator;
pub mod model;
pub mod notification;
pub mod profile_aggregator;
pub mod rng;
pub mod rules;
pub mod store;
pub mod types;
