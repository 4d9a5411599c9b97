//! Classification enums for derived records
//!
//! Stored as their `as_str()` form in every backend.

use serde::{Deserialize, Serialize};

// ============================================================================
// CLASSIFICATION ENUMS
// ============================================================================

/// Severity of a security alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Map an alert tag to its severity.
    ///
    /// `dangerous` and `critical` are high, `suspicious` is medium, any other
    /// tag is low. Matching is case-insensitive.
    pub fn from_alert_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "dangerous" | "critical" => Self::High,
            "suspicious" => Self::Medium,
            _ => Self::Low,
        }
    }

    /// Parse a stored value, unknown strings fall back to low
    pub fn parse(s: &str) -> Self {
        match s {
            "high" => Self::High,
            "medium" => Self::Medium,
            _ => Self::Low,
        }
    }
}

/// Where a framework component name was resolved from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentType {
    /// Explicit `framework.component`
    FrameworkComponent,
    /// Inferred from a `Class.method` descriptor
    PatchedClass,
    ChainType,
    LlmType,
    ToolType,
}

impl ComponentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FrameworkComponent => "framework_component",
            Self::PatchedClass => "patched_class",
            Self::ChainType => "chain_type",
            Self::LlmType => "llm_type",
            Self::ToolType => "tool_type",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "framework_component" => Some(Self::FrameworkComponent),
            "patched_class" => Some(Self::PatchedClass),
            "chain_type" => Some(Self::ChainType),
            "llm_type" => Some(Self::LlmType),
            "tool_type" => Some(Self::ToolType),
            _ => None,
        }
    }
}

/// Kinds of records derived from an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    ModelDetails,
    TokenUsage,
    FrameworkDetails,
    SecurityAlert,
    PerformanceMetric,
    ContentAnalysis,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModelDetails => "model_details",
            Self::TokenUsage => "token_usage",
            Self::FrameworkDetails => "framework_details",
            Self::SecurityAlert => "security_alert",
            Self::PerformanceMetric => "performance_metric",
            Self::ContentAnalysis => "content_analysis",
        }
    }

    /// At most one row of this kind may exist per event
    pub fn is_singleton(&self) -> bool {
        matches!(
            self,
            Self::ModelDetails | Self::TokenUsage | Self::FrameworkDetails
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_from_alert_tag() {
        assert_eq!(Severity::from_alert_tag("dangerous"), Severity::High);
        assert_eq!(Severity::from_alert_tag("CRITICAL"), Severity::High);
        assert_eq!(Severity::from_alert_tag("suspicious"), Severity::Medium);
        assert_eq!(Severity::from_alert_tag("warning"), Severity::Low);
        assert_eq!(Severity::from_alert_tag(""), Severity::Low);
    }

    #[test]
    fn test_severity_parse_roundtrips_as_str() {
        for s in [Severity::Low, Severity::Medium, Severity::High] {
            assert_eq!(Severity::parse(s.as_str()), s);
        }
    }

    #[test]
    fn test_component_type_parse() {
        assert_eq!(
            ComponentType::parse("patched_class"),
            Some(ComponentType::PatchedClass)
        );
        assert_eq!(ComponentType::parse("nope"), None);
    }

    #[test]
    fn test_record_kind_singletons() {
        assert!(RecordKind::ModelDetails.is_singleton());
        assert!(RecordKind::TokenUsage.is_singleton());
        assert!(RecordKind::FrameworkDetails.is_singleton());
        assert!(!RecordKind::SecurityAlert.is_singleton());
        assert!(!RecordKind::PerformanceMetric.is_singleton());
        assert!(!RecordKind::ContentAnalysis.is_singleton());
    }
}
