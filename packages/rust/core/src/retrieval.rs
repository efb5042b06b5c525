//! Normalization of external search payloads.
//!
//! Search backends disagree on response shape. [`normalize_results`] maps
//! every shape we know about onto a short list of [`RetrievedItem`]s.

use std::fmt::Write;

use pactlens_shared::Limits;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::prompts::leading_chars;

/// Maximum number of results handed to the model.
pub const MAX_SOURCES: usize = 3;

/// Conventional names for the results array, tried in order.
const ARRAY_KEYS: [&str; 7] = [
    "results",
    "data",
    "items",
    "hits",
    "documents",
    "sources",
    "organic_results",
];

const TITLE_KEYS: [&str; 4] = ["title", "name", "heading", "headline"];
const CONTENT_KEYS: [&str; 6] = ["content", "snippet", "description", "text", "body", "summary"];
const URL_KEYS: [&str; 4] = ["url", "link", "href", "source"];

/// One search result projected onto the fields we use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetrievedItem {
    pub title: Option<String>,
    pub content: String,
    pub url: Option<String>,
}

/// Outcome of normalizing a search payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedResults {
    Items(Vec<RetrievedItem>),
    /// No array anywhere; the raw string payload, truncated.
    Passthrough(String),
    Empty,
}

impl NormalizedResults {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn items(&self) -> &[RetrievedItem] {
        match self {
            Self::Items(items) => items,
            _ => &[],
        }
    }

    /// Render as labeled text for the prompt. `None` when empty.
    pub fn render(&self) -> Option<String> {
        match self {
            Self::Empty => None,
            Self::Passthrough(text) => Some(format!("Source 1:\n{text}")),
            Self::Items(items) => {
                let mut out = String::new();
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push('\n');
                    }
                    let _ = writeln!(
                        out,
                        "Source {}: {}",
                        i + 1,
                        item.title.as_deref().unwrap_or("Untitled")
                    );
                    let _ = writeln!(out, "{}", item.content);
                    if let Some(url) = &item.url {
                        let _ = writeln!(out, "URL: {url}");
                    }
                }
                Some(out)
            }
        }
    }
}

/// Normalize an arbitrary search payload.
///
/// Accepted shapes, in order of preference:
/// 1. a bare array;
/// 2. an object holding the array under a conventional key (`results`, `data`, ...);
/// 3. an object whose first array-valued field is taken as the results;
/// 4. a non-empty string, passed through truncated.
pub fn normalize_results(payload: &Value, limits: &Limits) -> NormalizedResults {
    if let Some(array) = find_results_array(payload) {
        let items: Vec<RetrievedItem> = array
            .iter()
            .filter_map(|entry| project(entry, limits.retrieval_item_chars))
            .take(MAX_SOURCES)
            .collect();
        return if items.is_empty() {
            NormalizedResults::Empty
        } else {
            NormalizedResults::Items(items)
        };
    }

    match payload {
        Value::String(text) if !text.trim().is_empty() => NormalizedResults::Passthrough(
            truncate(text.trim(), limits.retrieval_passthrough_chars),
        ),
        _ => NormalizedResults::Empty,
    }
}

fn find_results_array(payload: &Value) -> Option<&Vec<Value>> {
    match payload {
        Value::Array(array) => Some(array),
        Value::Object(object) => ARRAY_KEYS
            .iter()
            .find_map(|key| object.get(*key).and_then(Value::as_array))
            .or_else(|| object.values().find_map(Value::as_array)),
        _ => None,
    }
}

fn project(entry: &Value, max_chars: usize) -> Option<RetrievedItem> {
    match entry {
        Value::Object(fields) => {
            let title = first_text(fields, &TITLE_KEYS);
            let content = first_text(fields, &CONTENT_KEYS);
            if title.is_none() && content.is_none() {
                return None;
            }
            Some(RetrievedItem {
                title: title.map(str::to_string),
                content: truncate(content.unwrap_or_default(), max_chars),
                url: first_text(fields, &URL_KEYS).map(str::to_string),
            })
        }
        Value::String(text) if !text.trim().is_empty() => Some(RetrievedItem {
            title: None,
            content: truncate(text.trim(), max_chars),
            url: None,
        }),
        _ => None,
    }
}

fn first_text<'a>(fields: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| {
        fields
            .get(*key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    let cut = leading_chars(text, max_chars);
    if cut.len() < text.len() {
        format!("{cut}...")
    } else {
        cut.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_items() -> Value {
        json!([
            {"title": "UK income tax rates", "snippet": "Basic rate 20%", "link": "https://gov.uk/tax"},
            {"name": "HMRC guidance", "description": "Higher rate 40%", "url": "https://hmrc.gov.uk"},
            {"headline": "Additional rate", "body": "45% over 125,140", "href": "https://example.com/a"},
            {"title": "Fourth result", "content": "dropped"}
        ])
    }

    #[test]
    fn equivalent_shapes_normalize_identically() {
        let limits = Limits::default();
        let bare = normalize_results(&raw_items(), &limits);
        let data = normalize_results(&json!({"data": raw_items()}), &limits);
        let results = normalize_results(&json!({"results": raw_items()}), &limits);

        assert_eq!(bare, data);
        assert_eq!(bare, results);

        let items = bare.items();
        assert_eq!(items.len(), MAX_SOURCES);
        assert_eq!(items[0].title.as_deref(), Some("UK income tax rates"));
        assert_eq!(items[0].content, "Basic rate 20%");
        assert_eq!(items[0].url.as_deref(), Some("https://gov.uk/tax"));
        assert_eq!(items[1].title.as_deref(), Some("HMRC guidance"));
        assert_eq!(items[2].url.as_deref(), Some("https://example.com/a"));
    }

    #[test]
    fn conventional_key_beats_earlier_array_field() {
        let payload = json!({"tags": ["a", "b"], "hits": [{"title": "Hit", "text": "body"}]});
        let normalized = normalize_results(&payload, &Limits::default());
        assert_eq!(normalized.items()[0].title.as_deref(), Some("Hit"));
    }

    #[test]
    fn first_array_field_is_adopted() {
        let payload = json!({"query": "x", "count": 1, "entries": [{"title": "Only", "summary": "s"}]});
        let normalized = normalize_results(&payload, &Limits::default());
        assert_eq!(normalized.items()[0].title.as_deref(), Some("Only"));
        assert_eq!(normalized.items()[0].content, "s");
    }

    #[test]
    fn string_payload_passes_through_truncated() {
        let limits = Limits {
            retrieval_passthrough_chars: 10,
            ..Limits::default()
        };
        let normalized = normalize_results(&json!("  plain text answer from search  "), &limits);
        assert_eq!(normalized, NormalizedResults::Passthrough("plain text...".into()));
        assert!(normalize_results(&json!("   "), &limits).is_empty());
        assert!(normalize_results(&json!({"status": "ok"}), &limits).is_empty());
    }

    #[test]
    fn content_is_truncated() {
        let limits = Limits {
            retrieval_item_chars: 5,
            ..Limits::default()
        };
        let normalized = normalize_results(&json!([{"title": "t", "content": "abcdefgh"}]), &limits);
        assert_eq!(normalized.items()[0].content, "abcde...");
    }

    #[test]
    fn render_labels_sources() {
        let rendered = normalize_results(&raw_items(), &Limits::default())
            .render()
            .unwrap();
        assert!(rendered.starts_with("Source 1: UK income tax rates\nBasic rate 20%\nURL: https://gov.uk/tax\n"));
        assert!(rendered.contains("Source 3: Additional rate"));
        assert!(!rendered.contains("Fourth result"));
        assert!(NormalizedResults::Empty.render().is_none());
    }
}
