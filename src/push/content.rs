//! Plain-text rendering of rich message content.
//!
//! Message bodies arrive either as a plain JSON string or as a Drafty document:
//! a text string plus a list of formatting spans and referenced entities.
//! Push payloads only carry plain text, so the document is flattened here with
//! light markdown-style markers for inline styles.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    /// Content is neither a string nor a well-formed document
    #[error("Malformed content: {0}")]
    Malformed(String),
}

/// Converts rich message content into plain text
pub trait ContentRenderer: Send + Sync {
    fn to_plain_text(&self, content: &serde_json::Value) -> Result<String, RenderError>;
}

/// Renderer for Drafty-formatted content
#[derive(Debug, Clone, Copy, Default)]
pub struct DraftyRenderer;

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(default)]
    txt: String,
    #[serde(default)]
    fmt: Vec<Span>,
    #[serde(default)]
    ent: Vec<Entity>,
}

#[derive(Debug, Deserialize)]
struct Span {
    #[serde(default)]
    at: i64,
    #[serde(default)]
    len: i64,
    #[serde(default)]
    tp: Option<String>,
    #[serde(default)]
    key: usize,
}

#[derive(Debug, Deserialize)]
struct Entity {
    tp: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// A span resolved against the entity table
struct Styled<'a> {
    at: usize,
    len: usize,
    tp: &'a str,
    data: Option<&'a serde_json::Value>,
}

impl ContentRenderer for DraftyRenderer {
    fn to_plain_text(&self, content: &serde_json::Value) -> Result<String, RenderError> {
        match content {
            serde_json::Value::Null => Ok(String::new()),
            serde_json::Value::String(s) => Ok(s.clone()),
            serde_json::Value::Object(_) => {
                let doc: Document = serde_json::from_value(content.clone())
                    .map_err(|e| RenderError::Malformed(e.to_string()))?;
                render_document(&doc)
            }
            other => Err(RenderError::Malformed(format!(
                "unexpected content type: {}",
                other
            ))),
        }
    }
}

fn render_document(doc: &Document) -> Result<String, RenderError> {
    let chars: Vec<char> = doc.txt.chars().collect();
    let mut inline = Vec::new();
    let mut attachments = Vec::new();

    for span in &doc.fmt {
        let (tp, data) = match span.tp.as_deref() {
            Some(tp) if !tp.is_empty() => (tp, None),
            _ => {
                let entity = doc.ent.get(span.key).ok_or_else(|| {
                    RenderError::Malformed(format!("entity {} not found", span.key))
                })?;
                (entity.tp.as_str(), Some(&entity.data))
            }
        };

        if span.at < 0 {
            let rendered = render_entity(tp, data);
            if !rendered.is_empty() {
                attachments.push(rendered);
            }
            continue;
        }

        let out_of_bounds = || {
            RenderError::Malformed(format!("span {}+{} outside of text", span.at, span.len))
        };
        let (at, len) = match (usize::try_from(span.at), usize::try_from(span.len)) {
            (Ok(at), Ok(len)) => (at, len),
            _ => return Err(out_of_bounds()),
        };
        match at.checked_add(len) {
            Some(end) if end <= chars.len() => {}
            _ => return Err(out_of_bounds()),
        }

        inline.push(Styled { at, len, tp, data });
    }

    // Outer spans first; anything nested inside an already rendered span keeps
    // the outer style only.
    inline.sort_by(|a, b| a.at.cmp(&b.at).then(b.len.cmp(&a.len)));

    let mut out = String::with_capacity(doc.txt.len());
    let mut cursor = 0;
    for span in &inline {
        if span.at < cursor {
            continue;
        }
        out.extend(&chars[cursor..span.at]);
        let inner: String = chars[span.at..span.at + span.len].iter().collect();
        out.push_str(&render_span(span, &inner));
        cursor = span.at + span.len;
    }
    out.extend(&chars[cursor..]);

    for attachment in attachments {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&attachment);
    }

    Ok(out)
}

fn render_span(span: &Styled<'_>, inner: &str) -> String {
    match span.tp {
        "ST" => format!("*{}*", inner),
        "EM" => format!("_{}_", inner),
        "DL" => format!("~{}~", inner),
        "CO" => format!("`{}`", inner),
        "BR" => "\n".to_string(),
        "IM" | "EX" => render_entity(span.tp, span.data),
        _ => inner.to_string(),
    }
}

fn render_entity(tp: &str, data: Option<&serde_json::Value>) -> String {
    let label = match tp {
        "IM" => "IMAGE",
        "EX" => "FILE",
        _ => return String::new(),
    };
    let name = data
        .and_then(|d| d.get("name"))
        .and_then(|n| n.as_str())
        .filter(|n| !n.is_empty());
    match name {
        Some(name) => format!("[{} '{}']", label, name),
        None => format!("[{}]", label),
    }
}
