//! Parsing of model output into exhibition records.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use expofinder_shared::{ExhibitionRecord, ExpoFinderError, Result};

static OPENING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```(?:json)?\n?").expect("valid fence regex"));

static CLOSING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n?```$").expect("valid fence regex"));

/// Remove a surrounding markdown code fence, if present.
///
/// Only a fence at the very start (optionally tagged `json`) and one at the
/// very end are stripped; anything else is returned trimmed.
pub fn strip_code_fence(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let without_open = OPENING_FENCE.replace(trimmed, "");
    CLOSING_FENCE.replace(&without_open, "").trim().to_string()
}

/// One array element as the model wrote it. Fields are loosely typed so a
/// stray number or list does not sink the whole response.
#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(default)]
    title: Option<Value>,
    #[serde(default)]
    artist: Option<Value>,
    #[serde(default)]
    start_date: Option<Value>,
    #[serde(default)]
    end_date: Option<Value>,
    #[serde(default)]
    description: Option<Value>,
    #[serde(default)]
    image_url: Option<Value>,
    #[serde(default)]
    exhibition_url: Option<Value>,
}

/// Parse the model's reply into records, dropping entries without a title.
pub fn parse_exhibitions(raw: &str) -> Result<Vec<ExhibitionRecord>> {
    let body = strip_code_fence(raw);
    let items: Vec<RawRecord> = serde_json::from_str(&body).map_err(|e| {
        ExpoFinderError::Extraction(format!(
            "response is not a JSON array of exhibitions: {e} (got: {})",
            preview(&body)
        ))
    })?;

    let mut records = Vec::with_capacity(items.len());
    for (idx, item) in items.into_iter().enumerate() {
        let Some(title) = text(item.title) else {
            warn!(index = idx, "dropping exhibition without a title");
            continue;
        };
        records.push(ExhibitionRecord {
            title,
            artist: text(item.artist),
            start_date: text(item.start_date),
            end_date: text(item.end_date),
            description: text(item.description),
            image_url: text(item.image_url),
            exhibition_url: text(item.exhibition_url),
        });
    }
    Ok(records)
}

/// Flatten a loosely typed JSON value into non-blank text.
fn text(value: Option<Value>) -> Option<String> {
    let s = match value? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| text(Some(v)))
            .collect::<Vec<_>>()
            .join(", "),
        _ => return None,
    };
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

fn preview(s: &str) -> String {
    s.chars().take(200).collect()
}
