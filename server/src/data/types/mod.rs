//! Shared data types for all storage backends
//!
//! The event aggregate, the records derived from it, and the classification
//! enums they use.

mod enums;
mod event;
mod records;

pub use enums::{ComponentType, RecordKind, Severity};
pub use event::{CallerSite, Event};
pub use records::{
    Agent, ContentAnalysis, EventRecords, FrameworkDetails, ModelDetails, PerformanceMetric,
    RecordCounts, SecurityAlert, Session, TokenUsage,
};
