//! crates/companion_core/src/parser.rs
//!
//! Turns raw provider output into the value a persona's response shape expects.

use crate::domain::{CounselorReply, Playlist, Recipe};
use crate::persona::{ResponseShape, StructuredSchema};
use serde::de::DeserializeOwned;

/// The provider output could not be decoded into the expected schema.
/// The reason is for diagnostics only and is never shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Malformed provider output: {reason}")]
pub struct MalformedOutput {
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedResponse {
    Text(String),
    Recipe(Recipe),
    Playlist(Playlist),
    Counselor(CounselorReply),
}

/// Parses `raw` according to `shape`.
///
/// Plain text and image shapes pass the text through untouched; callers check
/// for emptiness themselves.
pub fn parse(raw: &str, shape: ResponseShape) -> Result<ParsedResponse, MalformedOutput> {
    match shape {
        ResponseShape::PlainText | ResponseShape::Image => Ok(ParsedResponse::Text(raw.to_string())),
        ResponseShape::Structured(StructuredSchema::Recipe) => decode(raw).map(ParsedResponse::Recipe),
        ResponseShape::Structured(StructuredSchema::Playlist) => {
            decode(raw).map(ParsedResponse::Playlist)
        }
        ResponseShape::Structured(StructuredSchema::Counselor) => {
            decode(raw).map(ParsedResponse::Counselor)
        }
    }
}

/// Removes a surrounding triple-backtick fence, optionally labelled `json`.
pub fn strip_code_fence(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = rest.strip_prefix("json").unwrap_or(rest);
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, MalformedOutput> {
    let json = strip_code_fence(raw);
    if json.is_empty() {
        return Err(MalformedOutput {
            reason: "empty response".to_string(),
        });
    }
    serde_json::from_str(json).map_err(|e| MalformedOutput {
        reason: e.to_string(),
    })
}
