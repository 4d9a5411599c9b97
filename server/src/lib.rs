//! Telemetry extraction for AI agents
//!
//! Raw events emitted by monitored agents are staged in an event store and
//! run through a registry of extractors that derive typed records (model
//! details, token usage, framework identity, security alerts, latency and
//! response content).

mod app;

pub mod core;
pub mod data;
pub mod domain;
pub mod utils;
