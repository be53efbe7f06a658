//! Prompt construction and response parsing for live providers.

use ctr_types::AdContext;
use serde_json::Value;

use super::orchestrator::Batch;

pub(crate) const SYSTEM_PROMPT: &str = "You are a precise decision engine that outputs strict JSON.";

/// User message: the ad, the platform and one numbered profile per line.
pub(crate) fn build_user_prompt(batch: &Batch, ad: &AdContext) -> String {
    let mut prompt = format!(
        "Advertisement shown on {}:\n\"{}\"\n\n\
         For each user profile below, decide whether that user would click this ad.\n\n\
         Profiles:\n",
        ad.platform,
        ad.text.trim()
    );

    for (i, identity) in batch.identities().iter().enumerate() {
        // Identity serialization is infallible: string keys and scalar values.
        let profile = serde_json::to_string(identity).unwrap_or_default();
        prompt.push_str(&format!("{}. {}\n", i + 1, profile));
    }

    prompt.push_str(&format!(
        "\nRespond with JSON only, in the form {{\"clicks\": [0 or 1, ...]}}, \
         with exactly {} entries in profile order (1 = clicks, 0 = does not click).",
        batch.len()
    ));
    prompt
}

/// Extract exactly `expected` labels from a model reply.
///
/// Accepts `{"clicks": [...]}` or a bare array, wrapped in prose or a
/// Markdown code fence. Labels may be `0`/`1` or `true`/`false`.
pub(crate) fn parse_labels(content: &str, expected: usize) -> Result<Vec<bool>, String> {
    let items = find_label_array(content)?;

    if items.len() != expected {
        return Err(format!("expected {} labels, got {}", expected, items.len()));
    }

    items
        .iter()
        .enumerate()
        .map(|(i, item)| label(item).ok_or_else(|| format!("label {} is not 0 or 1: {}", i, item)))
        .collect()
}

/// First complete JSON value in `content` that is a bare array or an object
/// with a `clicks` array.
///
/// Candidates start at each `{` or `[`. Text that does not parse is skipped
/// one character at a time; a value of the wrong shape is skipped whole, so
/// arrays nested inside it are never mistaken for the answer.
fn find_label_array(content: &str) -> Result<Vec<Value>, String> {
    let mut pos = 0;
    let mut saw_json = false;

    while let Some(found) = content[pos..].find(['{', '[']) {
        let start = pos + found;
        let mut values = serde_json::Deserializer::from_str(&content[start..]).into_iter::<Value>();
        match values.next() {
            Some(Ok(value)) => {
                saw_json = true;
                match value {
                    Value::Array(items) => return Ok(items),
                    Value::Object(map) => {
                        if let Some(Value::Array(items)) = map.get("clicks") {
                            return Ok(items.clone());
                        }
                    }
                    _ => {}
                }
                pos = start + values.byte_offset().max(1);
            }
            _ => pos = start + 1,
        }
    }

    Err(if saw_json {
        "reply has no \"clicks\" array".to_string()
    } else {
        "no JSON found in reply".to_string()
    })
}

fn label(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_f64() {
            Some(x) if x == 0.0 => Some(false),
            Some(x) if x == 1.0 => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim() {
            "0" => Some(false),
            "1" => Some(true),
            _ => None,
        },
        _ => None,
    }
}
