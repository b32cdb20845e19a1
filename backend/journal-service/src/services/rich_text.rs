//! Rich-text content normalizer
//!
//! Post bodies are stored and rendered as a Quill-style delta: an ordered list
//! of insert operations, each either a run of text or an embed such as an image.
//! Bodies written by older clients may arrive as a JSON-encoded delta, a legacy
//! HTML string or plain text. Everything funnels through
//! [`ensure_canonical_format`] before it is stored or handed to an editor.
//!
//! Nothing here returns an error. Unknown shapes degrade to an empty document
//! or an empty string.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const IMAGE_PLACEHOLDER: &str = " [image] ";
pub const VIDEO_PLACEHOLDER: &str = " [video] ";
pub const ELLIPSIS: &str = "...";

/// Default preview length for list views
pub const DEFAULT_PREVIEW_CHARS: usize = 150;

/// Canonical rich-text document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RichTextDocument {
    pub ops: Vec<DeltaOp>,
}

/// A single insert operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaOp {
    pub insert: Insert,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Map<String, Value>>,
}

/// Inserted content: a text run or a typed embed (`{"image": "..."}`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Insert {
    Text(String),
    Embed(Map<String, Value>),
}

impl DeltaOp {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            insert: Insert::Text(text.into()),
            attributes: None,
        }
    }

    pub fn embed(kind: &str, value: impl Into<Value>) -> Self {
        let mut map = Map::new();
        map.insert(kind.to_string(), value.into());
        Self {
            insert: Insert::Embed(map),
            attributes: None,
        }
    }
}

impl RichTextDocument {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Single text insert holding `text` verbatim
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            ops: vec![DeltaOp::text(text)],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn to_value(&self) -> Value {
        // Serializing plain maps and strings cannot fail.
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }

    /// Concatenated text with placeholders for embeds, trimmed
    pub fn plain_text(&self) -> String {
        let mut text = String::new();
        for op in &self.ops {
            match &op.insert {
                Insert::Text(s) => text.push_str(s),
                Insert::Embed(embed) if embed.contains_key("image") => {
                    text.push_str(IMAGE_PLACEHOLDER)
                }
                Insert::Embed(embed) if embed.contains_key("video") => {
                    text.push_str(VIDEO_PLACEHOLDER)
                }
                Insert::Embed(_) => text.push(' '),
            }
        }
        text.trim().to_string()
    }
}

/// Coerce content of unknown shape into a canonical document.
///
/// * an object with an `ops` array is returned as-is (ops that are not inserts
///   are dropped)
/// * a string holding such an object as JSON is parsed
/// * any other non-blank string becomes one text insert
/// * everything else becomes an empty document
pub fn ensure_canonical_format(content: &Value) -> RichTextDocument {
    match content {
        Value::Object(_) => from_delta_object(content).unwrap_or_default(),
        Value::String(s) => ensure_canonical_str(s),
        _ => RichTextDocument::empty(),
    }
}

/// String flavour of [`ensure_canonical_format`]
pub fn ensure_canonical_str(content: &str) -> RichTextDocument {
    if content.trim().is_empty() {
        return RichTextDocument::empty();
    }

    if let Some(doc) = parse_json_delta(content) {
        return doc;
    }

    RichTextDocument::from_text(content)
}

/// Plain text of a post body.
///
/// Canonical documents (and JSON-encoded ones) concatenate their text runs.
/// Other strings are treated as legacy HTML: tags are stripped, `&nbsp;`
/// becomes a space and whitespace runs collapse.
pub fn extract_plain_text(content: &Value) -> String {
    match content {
        Value::Object(_) => from_delta_object(content)
            .map(|doc| doc.plain_text())
            .unwrap_or_default(),
        Value::String(s) => match parse_json_delta(s) {
            Some(doc) => doc.plain_text(),
            None => strip_html(s),
        },
        _ => String::new(),
    }
}

/// Plain text cut to `max_chars` characters, with [`ELLIPSIS`] when cut
pub fn preview(content: &Value, max_chars: usize) -> String {
    truncate_chars(&extract_plain_text(content), max_chars)
}

/// Preview of an already canonical document
pub fn preview_document(doc: &RichTextDocument, max_chars: usize) -> String {
    truncate_chars(&doc.plain_text(), max_chars)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{}", &text[..byte_idx], ELLIPSIS),
        None => text.to_string(),
    }
}

fn parse_json_delta(raw: &str) -> Option<RichTextDocument> {
    let trimmed = raw.trim_start();
    if !trimmed.starts_with('{') {
        return None;
    }
    let value: Value = serde_json::from_str(trimmed).ok()?;
    from_delta_object(&value)
}

fn from_delta_object(value: &Value) -> Option<RichTextDocument> {
    let ops = value.get("ops")?.as_array()?;
    let ops = ops
        .iter()
        .filter_map(|op| match serde_json::from_value::<DeltaOp>(op.clone()) {
            Ok(op) => Some(op),
            Err(err) => {
                tracing::debug!(error = %err, "dropping non-insert delta op");
                None
            }
        })
        .collect();
    Some(RichTextDocument { ops })
}

fn strip_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_tag = false;
    for c in raw.chars() {
        match c {
            '<' => {
                in_tag = true;
                out.push(' ');
            }
            '>' if in_tag => in_tag = false,
            _ if in_tag => {}
            _ => out.push(c),
        }
    }

    out.replace("&nbsp;", " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_document_is_returned_unchanged() {
        let value = json!({
            "ops": [
                {"insert": "Day one in Lisbon\n", "attributes": {"bold": true}},
                {"insert": {"image": "uploads/tram.jpg"}},
                {"insert": "\n"}
            ]
        });
        let doc = ensure_canonical_format(&value);
        assert_eq!(doc.to_value(), value);
        assert_eq!(ensure_canonical_format(&doc.to_value()), doc);
    }

    #[test]
    fn test_plain_string_becomes_single_insert() {
        let doc = ensure_canonical_format(&json!("Walked the Alfama"));
        assert_eq!(doc.ops, vec![DeltaOp::text("Walked the Alfama")]);
    }

    #[test]
    fn test_json_encoded_delta_is_parsed() {
        let raw = r#"{"ops":[{"insert":"hello"}]}"#;
        let doc = ensure_canonical_format(&json!(raw));
        assert_eq!(doc, RichTextDocument::from_text("hello"));
    }

    #[test]
    fn test_malformed_shapes_degrade_to_empty() {
        assert!(ensure_canonical_format(&Value::Null).is_empty());
        assert!(ensure_canonical_format(&json!(42)).is_empty());
        assert!(ensure_canonical_format(&json!("   ")).is_empty());
        assert!(ensure_canonical_format(&json!({"ops": "nope"})).is_empty());
        assert!(ensure_canonical_format(&json!(["a", "b"])).is_empty());
    }

    #[test]
    fn test_extract_plain_text_with_embeds() {
        let doc = json!({
            "ops": [
                {"insert": "A"},
                {"insert": {"image": "x"}},
                {"insert": "B"}
            ]
        });
        assert_eq!(extract_plain_text(&doc), "A [image] B");

        let doc = json!({"ops": [{"insert": {"video": "v"}}, {"insert": {"formula": "e"}}, {"insert": "end"}]});
        assert_eq!(extract_plain_text(&doc), "[video]  end");
    }

    #[test]
    fn test_extract_plain_text_from_html() {
        let html = "<p>Hello&nbsp;<b>there</b></p>\n<p>friend</p>";
        assert_eq!(extract_plain_text(&json!(html)), "Hello there friend");
        assert_eq!(extract_plain_text(&json!(true)), "");
    }

    #[test]
    fn test_preview_truncates_with_ellipsis() {
        let doc = json!({"ops": [{"insert": "Hello World"}]});
        assert_eq!(preview(&doc, 5), "Hello...");
        assert_eq!(preview(&doc, 11), "Hello World");
        assert_eq!(preview(&doc, 50), "Hello World");
    }

    #[test]
    fn test_preview_counts_characters_not_bytes() {
        let doc = RichTextDocument::from_text("Ålesund über alles");
        assert_eq!(preview_document(&doc, 7), "Ålesund...");
    }
}
