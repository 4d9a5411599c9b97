//! Domain logic for agent telemetry
//!
//! - `extract` - Extractor pipeline deriving typed records from raw events

pub mod extract;
