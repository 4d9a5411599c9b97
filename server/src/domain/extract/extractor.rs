//! The contract every extractor implements

use async_trait::async_trait;
use thiserror::Error;

use crate::data::error::DataError;
use crate::data::types::Event;
use crate::data::uow::UnitOfWork;

/// Execution phase. All universal extractors run before any specialized one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// Runs for every event and prepares state later extractors rely on
    /// (agent and session rows).
    Universal,
    /// Runs only for the events it recognizes
    Specialized,
}

/// Failure of a single extractor, isolated by the processor
#[derive(Error, Debug)]
pub enum ExtractError {
    /// A field the extractor cannot do without is absent
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// A field is present but its shape is unusable
    #[error("field `{field}` has invalid shape: expected {expected}")]
    InvalidShape {
        field: &'static str,
        expected: &'static str,
    },

    /// A unit-of-work lookup failed
    #[error(transparent)]
    Data(#[from] DataError),
}

/// A stateless unit that recognizes part of an event payload and stages
/// the typed records derived from it.
///
/// `can_process` must be pure: the registry calls it freely. All side effects
/// happen in `process`, and only through the unit of work. A payload with
/// nothing to extract is a normal outcome (`Ok(())` with nothing staged).
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Stable identifier for logs, reports and test-time lookup
    fn name(&self) -> &'static str;

    fn phase(&self) -> Phase {
        Phase::Specialized
    }

    fn can_process(&self, event: &Event) -> bool;

    async fn process(&self, event: &Event, uow: &mut UnitOfWork) -> Result<(), ExtractError>;
}
