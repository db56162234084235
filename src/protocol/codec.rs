//! Text frame <-> typed message conversion

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use super::types::{Command, Envelope};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid JSON: {0}")]
    Json(#[source] serde_json::Error),
    #[error("message is not a JSON object")]
    NotAnObject,
    #[error("message has no 'type' field")]
    MissingType,
    #[error("message 'type' field is not a string")]
    InvalidType,
    #[error("malformed '{message_type}' message: {source}")]
    Payload {
        message_type: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode command: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Decode one inbound text frame
pub fn decode(text: &str) -> Result<Envelope, CodecError> {
    let value: Value = serde_json::from_str(text).map_err(CodecError::Json)?;
    decode_value(value)
}

/// Decode an already-parsed JSON value
pub fn decode_value(value: Value) -> Result<Envelope, CodecError> {
    let message_type = match value.as_object().ok_or(CodecError::NotAnObject)?.get("type") {
        Some(Value::String(t)) => t.clone(),
        Some(_) => return Err(CodecError::InvalidType),
        None => return Err(CodecError::MissingType),
    };

    match message_type.as_str() {
        "state" => payload(value, &message_type).map(Envelope::State),
        "update" => payload(value, &message_type).map(Envelope::Update),
        _ => Ok(Envelope::Unknown { message_type }),
    }
}

fn payload<T: DeserializeOwned>(value: Value, message_type: &str) -> Result<T, CodecError> {
    serde_json::from_value(value).map_err(|source| CodecError::Payload {
        message_type: message_type.to_string(),
        source,
    })
}

#[derive(Serialize)]
struct SetFrame<'a> {
    #[serde(rename = "type")]
    message_type: &'static str,
    #[serde(flatten)]
    command: &'a Command,
}

/// Encode an outbound command as a `"set"` text frame
pub fn encode(command: &Command) -> Result<String, CodecError> {
    serde_json::to_string(&SetFrame {
        message_type: "set",
        command,
    })
    .map_err(CodecError::Encode)
}
