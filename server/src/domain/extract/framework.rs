//! Framework identification (`framework_patch` and any payload naming one)
//!
//! The (name, version, component) triple is resolved from, in order:
//! an explicit `framework` object, a plain `framework` string, the
//! `components` map, and a `Class.method` descriptor on patch events.

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};

use super::extractor::{ExtractError, Extractor};
use super::model_request::MODEL_REQUEST;
use super::paths::{convert_opt, get_path, string_at};
use crate::data::types::{ComponentType, Event, FrameworkDetails};
use crate::data::uow::UnitOfWork;

pub const FRAMEWORK_PATCH: &str = "framework_patch";

/// Sentinel for a name or version nobody reported
pub const UNKNOWN: &str = "unknown";

/// Placeholder some SDKs serialize for an absent value
const NONE_LITERAL: &str = "None";

/// Component keys of a `components` map, highest priority first
const COMPONENT_KEYS: &[&str] = &["chain_type", "llm_type", "tool_type"];

pub struct FrameworkExtractor;

#[async_trait]
impl Extractor for FrameworkExtractor {
    fn name(&self) -> &'static str {
        "framework"
    }

    /// `model_request` events carry their framework inside the model request
    /// record and are left to that extractor.
    fn can_process(&self, event: &Event) -> bool {
        if event.event_type == FRAMEWORK_PATCH {
            return true;
        }
        if event.event_type == MODEL_REQUEST {
            return false;
        }
        get_path(&event.data, "framework").is_some_and(|f| !f.is_null())
            || get_path(&event.data, "components").is_some_and(JsonValue::is_object)
    }

    async fn process(&self, event: &Event, uow: &mut UnitOfWork) -> Result<(), ExtractError> {
        if !event.data.is_object() {
            return Ok(());
        }

        match resolve(event) {
            Some(details) => {
                uow.add_framework_details(details).await?;
            }
            None => {
                tracing::debug!(event_id = event.id, "No framework identity in payload");
            }
        }
        Ok(())
    }
}

fn resolve(event: &Event) -> Option<FrameworkDetails> {
    let data = &event.data;

    let mut name = None;
    let mut version = None;
    let mut component: Option<(String, Option<ComponentType>)> = None;
    let mut components = None;

    match get_path(data, "framework") {
        Some(JsonValue::Object(framework)) => {
            name = framework
                .get("name")
                .and_then(JsonValue::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            version = convert_opt::<String>(framework.get("version"));
            component = framework
                .get("component")
                .and_then(JsonValue::as_str)
                .filter(|s| !s.is_empty() && *s != NONE_LITERAL)
                .map(|c| (c.to_string(), Some(ComponentType::FrameworkComponent)));
            components = framework.get("components").and_then(components_map);
        }
        Some(JsonValue::String(framework)) if !framework.is_empty() => {
            name = Some(framework.clone());
        }
        _ => {}
    }

    let version = normalize_version(version.or_else(|| convert_opt(get_path(data, "version"))));

    if component.is_none() && event.event_type == FRAMEWORK_PATCH {
        component = string_at(data, "method")
            .as_deref()
            .and_then(patched_class)
            .map(|class| (class, Some(ComponentType::PatchedClass)));
    }

    let components = components.or_else(|| get_path(data, "components").and_then(components_map));
    if component.is_none() {
        component = components.as_ref().and_then(first_component);
    }

    if name.is_none() && component.is_none() && components.is_none() {
        return None;
    }

    let (component_name, component_type) = match component {
        Some((name, kind)) => (Some(name), kind),
        None => (None, None),
    };

    Some(FrameworkDetails {
        event_id: event.id,
        name: name.unwrap_or_else(|| UNKNOWN.to_string()),
        version,
        component_name,
        component_type,
        components,
    })
}

/// Class part of a `Class.method` descriptor
fn patched_class(method: &str) -> Option<String> {
    let (class, _) = method.split_once('.')?;
    (!class.is_empty()).then(|| class.to_string())
}

/// `value` as a components map, if it is a JSON object
pub fn components_map(value: &JsonValue) -> Option<Map<String, JsonValue>> {
    value.as_object().cloned()
}

/// First usable component in a components map.
///
/// `chain_type`, `llm_type` and `tool_type` are tried in that order, then any
/// other key. Empty strings and `"None"` are skipped. Keys outside the known
/// component types yield no type.
pub fn first_component(components: &Map<String, JsonValue>) -> Option<(String, Option<ComponentType>)> {
    let usable = |key: &str| {
        components
            .get(key)
            .and_then(JsonValue::as_str)
            .filter(|s| !s.is_empty() && *s != NONE_LITERAL)
            .map(|s| (s.to_string(), ComponentType::parse(key)))
    };

    COMPONENT_KEYS.iter().find_map(|key| usable(*key)).or_else(|| {
        components
            .keys()
            .filter(|key| !COMPONENT_KEYS.contains(&key.as_str()))
            .find_map(|key| usable(key.as_str()))
    })
}

/// `None`, empty and `"None"` all become [`UNKNOWN`]
pub fn normalize_version(version: Option<String>) -> String {
    match version {
        Some(v) if !v.trim().is_empty() && v != NONE_LITERAL => v,
        _ => UNKNOWN.to_string(),
    }
}
