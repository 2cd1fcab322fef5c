use chrono::SecondsFormat;
use thiserror::Error;

use super::content::{ContentRenderer, RenderError};
use super::types::{DataAttributes, EventKind, Payload};

/// Maximum length of message content in a push, in Unicode code points
pub const MAX_MESSAGE_LENGTH: usize = 80;

/// Appended to content that was cut at `MAX_MESSAGE_LENGTH`
pub const ELLIPSIS: char = '…';

pub const KEY_WHAT: &str = "what";
pub const KEY_SILENT: &str = "silent";
pub const KEY_TOPIC: &str = "topic";
pub const KEY_TS: &str = "ts";
// "from" is reserved by the gateway's data schema
pub const KEY_FROM: &str = "xfrom";
pub const KEY_SEQ: &str = "seq";
pub const KEY_MIME: &str = "mime";
pub const KEY_CONTENT: &str = "content";
pub const KEY_MODE_WANT: &str = "modeWant";
pub const KEY_MODE_GIVEN: &str = "modeGiven";

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Unsupported event kind: {0}")]
    UnsupportedEventKind(String),

    #[error("Failed to render content: {0}")]
    Render(#[from] RenderError),
}

/// Flatten an event payload into push data attributes.
pub fn payload_to_data(
    payload: &Payload,
    renderer: &dyn ContentRenderer,
) -> Result<DataAttributes, TransformError> {
    let kind = payload
        .kind()
        .ok_or_else(|| TransformError::UnsupportedEventKind(payload.what.clone()))?;
    Ok(event_data(payload, kind, renderer)?)
}

/// Flatten a payload whose event kind is already known.
pub fn event_data(
    payload: &Payload,
    kind: EventKind,
    renderer: &dyn ContentRenderer,
) -> Result<DataAttributes, RenderError> {
    let mut data = DataAttributes::new();
    data.insert(KEY_WHAT.to_string(), payload.what.clone());
    if payload.silent {
        data.insert(KEY_SILENT.to_string(), "true".to_string());
    }
    data.insert(KEY_TOPIC.to_string(), payload.topic.clone());
    data.insert(
        KEY_TS.to_string(),
        payload
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Nanos, true),
    );
    data.insert(KEY_FROM.to_string(), payload.from.clone());

    match kind {
        EventKind::Message => {
            data.insert(KEY_SEQ.to_string(), payload.seq.to_string());
            data.insert(KEY_MIME.to_string(), payload.content_type.clone());
            let content = renderer.to_plain_text(&payload.content)?;
            data.insert(KEY_CONTENT.to_string(), truncate_content(content));
        }
        EventKind::Subscription => {
            data.insert(KEY_MODE_WANT.to_string(), payload.mode_want.to_string());
            data.insert(KEY_MODE_GIVEN.to_string(), payload.mode_given.to_string());
        }
    }

    Ok(data)
}

/// Cut content to `MAX_MESSAGE_LENGTH` code points, marking the cut with an ellipsis.
pub fn truncate_content(content: String) -> String {
    // A string can't have more code points than bytes
    if content.len() <= MAX_MESSAGE_LENGTH {
        return content;
    }

    match content.char_indices().nth(MAX_MESSAGE_LENGTH) {
        Some((cut, _)) => {
            let mut truncated = content[..cut].to_string();
            truncated.push(ELLIPSIS);
            truncated
        }
        None => content,
    }
}
