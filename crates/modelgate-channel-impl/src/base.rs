//! Behavior shared across the built-in channels.
//!
//! OpenAI-style channels keep the model in the JSON body and list models in a
//! `data` array; Gemini-style channels keep it in the URL path and list
//! models in a `models` array with pagination. Each helper implements one
//! flavor so the channels compose instead of subclassing.

use std::collections::HashSet;

use bytes::Bytes;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use tracing::debug;

use modelgate_channel_core::{
    ChannelError, ChannelGroup, ChannelResult, OutboundRequest, header_get,
};

const SSE_MEDIA_TYPE: &str = "text/event-stream";

#[derive(Debug, Default, Deserialize)]
struct StreamProbe {
    #[serde(default)]
    stream: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ModelProbe {
    #[serde(default)]
    model: Option<String>,
}

/// Generic streaming classification: vendor path suffix, `Accept` header,
/// `stream=true` query parameter, or a `stream: true` body field. A body
/// that does not parse is a negative match, not an error.
pub(crate) fn is_stream_request(req: &OutboundRequest, path_suffixes: &[&str]) -> bool {
    if path_suffixes.iter().any(|suffix| req.path.ends_with(suffix)) {
        return true;
    }
    if let Some(accept) = header_get(&req.headers, "accept")
        && accept.contains(SSE_MEDIA_TYPE)
    {
        return true;
    }
    if req.query_param("stream").as_deref() == Some("true") {
        return true;
    }
    serde_json::from_slice::<StreamProbe>(&req.body)
        .map(|probe| probe.stream.unwrap_or(false))
        .unwrap_or(false)
}

/// Model name from the path segment following `models`, up to any `:method`
/// suffix.
pub(crate) fn model_from_path(path: &str) -> Option<String> {
    let segments: Vec<&str> = path.split('/').collect();
    for (idx, segment) in segments.iter().enumerate() {
        if *segment == "models" && idx + 1 < segments.len() {
            let model = segments[idx + 1].split(':').next().unwrap_or_default();
            if model.is_empty() {
                return None;
            }
            return Some(model.to_string());
        }
    }
    None
}

pub(crate) fn model_from_body(body: &[u8]) -> Option<String> {
    let probe: ModelProbe = serde_json::from_slice(body).ok()?;
    probe.model.filter(|model| !model.is_empty())
}

/// Path placement takes precedence over the body field.
pub(crate) fn extract_model(req: &OutboundRequest) -> Option<String> {
    model_from_path(&req.path).or_else(|| model_from_body(&req.body))
}

/// Redirect for body-located models: rewrites the `model` field in place.
/// A request with no locatable model passes through even in strict mode.
pub(crate) fn apply_body_redirect(
    req: &mut OutboundRequest,
    group: &ChannelGroup,
    channel: &'static str,
) -> ChannelResult<()> {
    if group.model_redirects.is_empty() {
        return Ok(());
    }
    let Ok(mut value) = serde_json::from_slice::<JsonValue>(&req.body) else {
        return Ok(());
    };
    let Some(model) = value
        .get("model")
        .and_then(JsonValue::as_str)
        .map(str::to_string)
    else {
        return Ok(());
    };

    match group.model_redirects.get(&model) {
        Some(target) => {
            value["model"] = JsonValue::String(target.clone());
            let body =
                serde_json::to_vec(&value).map_err(|err| ChannelError::Other(err.to_string()))?;
            req.body = Bytes::from(body);
            debug!(
                group = %group.name,
                channel,
                original_model = %model,
                target_model = %target,
                "model redirected"
            );
            Ok(())
        }
        None if group.redirect_strict => Err(ChannelError::ModelNotConfigured(model)),
        None => Ok(()),
    }
}

/// Redirect for path-located models: rewrites the segment after `models`,
/// preserving any `:method` suffix. Only the first `models` segment is
/// considered.
pub(crate) fn apply_path_redirect(
    req: &mut OutboundRequest,
    group: &ChannelGroup,
    channel: &'static str,
) -> ChannelResult<()> {
    if group.model_redirects.is_empty() {
        return Ok(());
    }

    let original_path = req.path.clone();
    let mut segments: Vec<String> = original_path.split('/').map(str::to_string).collect();
    for idx in 0..segments.len() {
        if segments[idx] != "models" || idx + 1 >= segments.len() {
            continue;
        }
        let model_part = segments[idx + 1].clone();
        let (original_model, suffix) = match model_part.split_once(':') {
            Some((model, method)) => (model.to_string(), format!(":{method}")),
            None => (model_part, String::new()),
        };

        if let Some(target) = group.model_redirects.get(&original_model) {
            segments[idx + 1] = format!("{target}{suffix}");
            req.path = segments.join("/");
            debug!(
                group = %group.name,
                channel,
                original_model = %original_model,
                target_model = %target,
                original_path = %original_path,
                new_path = %req.path,
                "model redirected"
            );
            return Ok(());
        }
        if group.redirect_strict {
            return Err(ChannelError::ModelNotConfigured(original_model));
        }
        return Ok(());
    }
    Ok(())
}

/// A model-list request with no inbound page token is the first page.
pub(crate) fn is_first_page(req: &OutboundRequest) -> bool {
    req.query_param("pageToken").map_or(true, |token| token.is_empty())
}

/// Target model names advertised for this group, deduplicated and sorted so
/// strict listings are deterministic.
pub(crate) fn configured_model_names(group: &ChannelGroup) -> Vec<String> {
    let mut names: Vec<String> = group.model_redirects.values().cloned().collect();
    names.sort();
    names.dedup();
    names
}

pub(crate) fn unix_now() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}

fn openai_model_entry(name: &str) -> JsonValue {
    json!({
        "id": name,
        "object": "model",
        "created": unix_now(),
        "owned_by": "system",
    })
}

fn gemini_model_entry(name: &str) -> JsonValue {
    let bare = name.strip_prefix("models/").unwrap_or(name);
    json!({
        "name": format!("models/{bare}"),
        "version": "001",
        "displayName": bare,
        "supportedGenerationMethods": ["generateContent", "streamGenerateContent"],
    })
}

/// Upstream entries first, then configured entries whose key is not already
/// present. Upstream wins on conflict.
fn merge_model_arrays(
    upstream: &[JsonValue],
    configured: Vec<JsonValue>,
    key: &str,
) -> Vec<JsonValue> {
    let mut seen: HashSet<String> = upstream
        .iter()
        .filter_map(|entry| entry.get(key).and_then(JsonValue::as_str))
        .map(str::to_string)
        .collect();
    let mut merged = upstream.to_vec();
    for entry in configured {
        let Some(entry_key) = entry.get(key).and_then(JsonValue::as_str) else {
            continue;
        };
        if seen.insert(entry_key.to_string()) {
            merged.push(entry);
        }
    }
    merged
}

fn passthrough(body: &[u8], group: &ChannelGroup) -> Bytes {
    debug!(group = %group.name, "model list response not in a known shape, passing through");
    Bytes::copy_from_slice(body)
}

fn encode_or_passthrough(response: &JsonValue, original: &[u8]) -> Bytes {
    match serde_json::to_vec(response) {
        Ok(body) => Bytes::from(body),
        Err(_) => Bytes::copy_from_slice(original),
    }
}

/// `data`-shaped list transform. Strict mode advertises exactly the
/// configured target models; otherwise the upstream array is merged with the
/// configured set, upstream entries winning on id conflict.
pub(crate) fn transform_data_model_list(body: &[u8], group: &ChannelGroup) -> Bytes {
    let Ok(mut response) = serde_json::from_slice::<JsonValue>(body) else {
        return passthrough(body, group);
    };
    let Some(data) = response.get("data").and_then(JsonValue::as_array).cloned() else {
        return passthrough(body, group);
    };

    let configured: Vec<JsonValue> = configured_model_names(group)
        .iter()
        .map(|name| openai_model_entry(name))
        .collect();

    if group.redirect_strict {
        response["data"] = JsonValue::Array(configured);
    } else {
        response["data"] = JsonValue::Array(merge_model_arrays(&data, configured, "id"));
    }
    encode_or_passthrough(&response, body)
}

/// `models`-shaped list transform with pagination semantics: strict mode
/// replaces the array and removes the page token; non-strict merges only on
/// the first page so later pages never re-inject the configured set.
pub(crate) fn transform_gemini_model_list(
    req: &OutboundRequest,
    body: &[u8],
    group: &ChannelGroup,
) -> Bytes {
    let Ok(mut response) = serde_json::from_slice::<JsonValue>(body) else {
        return passthrough(body, group);
    };

    if response.get("models").is_some() {
        let upstream_models = response
            .get("models")
            .and_then(JsonValue::as_array)
            .cloned()
            .unwrap_or_default();
        let configured: Vec<JsonValue> = configured_model_names(group)
            .iter()
            .map(|name| gemini_model_entry(name))
            .collect();

        if group.redirect_strict {
            response["models"] = JsonValue::Array(configured);
            if let Some(object) = response.as_object_mut() {
                object.remove("nextPageToken");
            }
        } else if is_first_page(req) {
            response["models"] =
                JsonValue::Array(merge_model_arrays(&upstream_models, configured, "name"));
        }
        return encode_or_passthrough(&response, body);
    }

    // OpenAI-compatible sub-path listings come back `data`-shaped.
    if response.get("data").is_some() {
        return transform_data_model_list(body, group);
    }
    passthrough(body, group)
}
