//! Wire shapes for Ollama-compatible servers: URLs, payloads, response text
//! and model selection. Everything here is pure.

use crate::error::RequestMode;
use serde_json::{json, Value};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";

/// Trim and drop trailing slashes. A blank value falls back to the default.
pub fn normalize_base_url(value: &str) -> String {
    let trimmed = value.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        DEFAULT_BASE_URL.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Join `base` and `route` without doubling an `/api` segment.
///
/// `http://h:11434/api` + `/api/chat` gives `http://h:11434/api/chat`.
pub fn build_url(base: &str, route: &str) -> String {
    let base = normalize_base_url(base);
    let route = if route.starts_with('/') {
        route.to_string()
    } else {
        format!("/{route}")
    };
    if base.to_lowercase().ends_with("/api") && route.to_lowercase().starts_with("/api/") {
        format!("{base}{}", &route[4..])
    } else {
        format!("{base}{route}")
    }
}

pub fn route_for(mode: RequestMode) -> &'static str {
    match mode {
        RequestMode::Chat => "/api/chat",
        RequestMode::Generate => "/api/generate",
    }
}

/// Request body for `mode`.
pub fn payload_for(mode: RequestMode, model: &str, prompt: &str, images: &[String]) -> Value {
    match mode {
        RequestMode::Chat => json!({
            "model": model,
            "stream": false,
            "options": { "temperature": 0 },
            "messages": [{ "role": "user", "content": prompt, "images": images }],
        }),
        RequestMode::Generate => json!({
            "model": model,
            "stream": false,
            "options": { "temperature": 0 },
            "prompt": prompt,
            "images": images,
        }),
    }
}

/// Text of a successful response.
///
/// `message.content` (chat) wins over `response` (generate). A body that is
/// not JSON is taken verbatim.
pub fn response_text(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(payload) => payload
            .pointer("/message/content")
            .and_then(Value::as_str)
            .or_else(|| payload.get("response").and_then(Value::as_str))
            .unwrap_or_default()
            .trim()
            .to_string(),
        Err(_) => body.trim().to_string(),
    }
}

/// Error details of a failed response: the JSON `error` field, else the raw body.
pub fn error_details(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| body.to_string())
        .trim()
        .to_string()
}

/// Model names out of an `/api/tags` body.
pub fn model_names(body: &str) -> Result<Vec<String>, serde_json::Error> {
    let payload: Value = serde_json::from_str(body)?;
    Ok(payload
        .get("models")
        .and_then(Value::as_array)
        .map(|models| {
            models
                .iter()
                .filter_map(|m| m.get("name").and_then(Value::as_str))
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default())
}

fn find_model<'a>(models: &'a [String], target: &str) -> Option<&'a String> {
    let target = target.trim().to_lowercase();
    if target.is_empty() {
        return None;
    }
    models.iter().find(|name| name.to_lowercase() == target)
}

pub fn has_model(models: &[String], target: &str) -> bool {
    find_model(models, target).is_some()
}

/// Pick the model to use from what the server has installed.
///
/// Order: the configured model, then the first installed candidate, then the
/// first installed model, then the configured model regardless.
pub fn select_model(models: &[String], configured: &str, candidates: &[String]) -> String {
    if has_model(models, configured) {
        return configured.to_string();
    }
    candidates
        .iter()
        .find_map(|candidate| find_model(models, candidate))
        .or_else(|| models.first())
        .cloned()
        .unwrap_or_else(|| configured.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_CANDIDATE_MODELS;

    fn candidates() -> Vec<String> {
        DEFAULT_CANDIDATE_MODELS.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn urls_never_double_api() {
        assert_eq!(build_url("http://h:11434/", "/api/chat"), "http://h:11434/api/chat");
        assert_eq!(build_url("http://h:11434/api//", "/api/tags"), "http://h:11434/api/tags");
        assert_eq!(build_url("http://h:11434/API", "api/generate"), "http://h:11434/API/generate");
        assert_eq!(build_url("  ", "/api/tags"), "http://127.0.0.1:11434/api/tags");
    }

    #[test]
    fn payload_shapes() {
        let images = vec!["aGk=".to_string()];
        let chat = payload_for(RequestMode::Chat, "m", "p", &images);
        assert_eq!(chat["stream"], false);
        assert_eq!(chat["options"]["temperature"], 0);
        assert_eq!(chat["messages"][0]["role"], "user");
        assert_eq!(chat["messages"][0]["images"][0], "aGk=");
        let generate = payload_for(RequestMode::Generate, "m", "p", &images);
        assert_eq!(generate["prompt"], "p");
        assert_eq!(generate["images"][0], "aGk=");
        assert!(generate.get("messages").is_none());
    }

    #[test]
    fn response_text_sources() {
        assert_eq!(response_text(r#"{"message":{"content":" hi "}}"#), "hi");
        assert_eq!(response_text(r#"{"response":"gen"}"#), "gen");
        assert_eq!(response_text(r#"{"other":1}"#), "");
        assert_eq!(response_text("  plain text  "), "plain text");
    }

    #[test]
    fn error_details_prefers_json_error() {
        assert_eq!(error_details(r#"{"error":"model 'x' not found"}"#), "model 'x' not found");
        assert_eq!(error_details(" 404 page not found "), "404 page not found");
    }

    #[test]
    fn model_selection_order() {
        let installed = vec!["llava:7b".to_string(), "Gemma3:4b".to_string()];
        assert_eq!(select_model(&installed, "llava:7B", &candidates()), "llava:7B");
        assert_eq!(select_model(&installed, "medgemma:4b", &candidates()), "Gemma3:4b");
        let other = vec!["llava:7b".to_string()];
        assert_eq!(select_model(&other, "medgemma:4b", &candidates()), "llava:7b");
        assert_eq!(select_model(&[], "medgemma:4b", &candidates()), "medgemma:4b");
    }

    #[test]
    fn parses_tags() {
        let names = model_names(r#"{"models":[{"name":"a"},{"name":" "},{"x":1}]}"#).unwrap();
        assert_eq!(names, vec!["a"]);
        assert!(model_names("nope").is_err());
    }
}
