//! `model_request`: model identity, request parameters and framework
//!
//! Framework-instrumented requests (LangChain style) describe the model in
//! several places at once; the field schemas below list the candidates in
//! priority order.

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};

use super::extractor::{ExtractError, Extractor};
use super::framework::{components_map, first_component, normalize_version};
use super::paths::{FieldSchema, convert_opt, extract_schema_fields, first_string, get_path};
use super::usage::{provider_from_method, provider_from_model};
use crate::data::types::{ComponentType, Event, FrameworkDetails, ModelDetails};
use crate::data::uow::UnitOfWork;

pub const MODEL_REQUEST: &str = "model_request";

/// Framework assumed when a run id and framework version are reported
/// without a framework name
const RUN_ID_FRAMEWORK: &str = "langchain";

const MODEL_NAME_PATHS: &[&str] = &["model.name", "model", "llm_type", "components.llm_type"];

const MODEL_FIELDS: FieldSchema<'static> = &[
    ("provider", &["model.provider", "provider"]),
    ("type", &["model.type", "model_type"]),
    ("version", &["model.version", "model_version"]),
];

const PARAMETER_FIELDS: FieldSchema<'static> = &[
    (
        "temperature",
        &[
            "model.parameters.temperature",
            "parameters.temperature",
            "invocation_params.temperature",
        ],
    ),
    (
        "max_tokens",
        &[
            "model.parameters.max_tokens",
            "parameters.max_tokens",
            "invocation_params.max_tokens",
        ],
    ),
    (
        "top_p",
        &[
            "model.parameters.top_p",
            "parameters.top_p",
            "invocation_params.top_p",
        ],
    ),
];

pub struct ModelRequestExtractor;

#[async_trait]
impl Extractor for ModelRequestExtractor {
    fn name(&self) -> &'static str {
        "model_request"
    }

    fn can_process(&self, event: &Event) -> bool {
        event.event_type == MODEL_REQUEST
    }

    async fn process(&self, event: &Event, uow: &mut UnitOfWork) -> Result<(), ExtractError> {
        if !event.data.is_object() {
            return Ok(());
        }

        if let Some(details) = model_details(event) {
            uow.add_model_details(details).await?;
        }
        if let Some(framework) = framework_details(event) {
            uow.add_framework_details(framework).await?;
        }
        Ok(())
    }
}

/// Only string values count as names; `"None"` is a placeholder.
fn text(fields: &Map<String, JsonValue>, key: &str) -> Option<String> {
    fields
        .get(key)
        .and_then(JsonValue::as_str)
        .filter(|s| !s.is_empty() && *s != "None")
        .map(str::to_string)
}

fn model_details(event: &Event) -> Option<ModelDetails> {
    let data = &event.data;
    let fields = extract_schema_fields(data, MODEL_FIELDS);
    let params = extract_schema_fields(data, PARAMETER_FIELDS);

    let model_name = first_string(data, MODEL_NAME_PATHS).filter(|name| name != "None");
    let model_provider = text(&fields, "provider").or_else(|| {
        let name = model_name.as_deref()?;
        provider_from_model(name)
            .or_else(|| provider_from_method(name))
            .map(str::to_string)
    });

    let details = ModelDetails {
        model_name,
        model_provider,
        model_type: text(&fields, "type"),
        model_version: text(&fields, "version"),
        temperature: convert_opt(params.get("temperature")),
        max_tokens: convert_opt(params.get("max_tokens")),
        top_p: convert_opt(params.get("top_p")),
        ..ModelDetails::new(event.id)
    };

    if details.model_name.is_none() && details.model_provider.is_none() {
        return None;
    }
    Some(details)
}

/// Framework name from `framework` (object or string), else `llm_type`, else
/// a run id paired with a framework version.
fn framework_details(event: &Event) -> Option<FrameworkDetails> {
    let data = &event.data;
    let framework = get_path(data, "framework");

    let name = match framework {
        Some(JsonValue::Object(f)) => f.get("name").and_then(JsonValue::as_str).map(str::to_string),
        Some(JsonValue::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
    .or_else(|| {
        get_path(data, "llm_type")
            .and_then(JsonValue::as_str)
            .map(str::to_string)
    })
    .or_else(|| {
        (get_path(data, "run_id").is_some() && get_path(data, "framework_version").is_some())
            .then(|| RUN_ID_FRAMEWORK.to_string())
    })?;

    let version = normalize_version(
        ["framework.version", "framework_version", "version"]
            .into_iter()
            .find_map(|path| convert_opt::<String>(get_path(data, path))),
    );

    let components = get_path(data, "framework.components")
        .and_then(components_map)
        .or_else(|| get_path(data, "components").and_then(components_map));

    let (component_name, component_type) = components
        .as_ref()
        .and_then(first_component)
        .map(|(name, kind)| (Some(name), kind))
        .or_else(|| {
            get_path(data, "llm_type")
                .and_then(JsonValue::as_str)
                .map(|name| (Some(name.to_string()), Some(ComponentType::LlmType)))
        })
        .or_else(|| {
            get_path(data, "model.name")
                .and_then(JsonValue::as_str)
                .map(|name| (Some(name.to_string()), None))
        })
        .unwrap_or((None, None));

    Some(FrameworkDetails {
        event_id: event.id,
        name,
        version,
        component_name,
        component_type,
        components,
    })
}
