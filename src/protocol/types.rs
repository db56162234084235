//! Wire message types exchanged with the companion app

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::model::{DeviceKind, ProtocolVersion};

/// One decoded inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// Full state dump (`"type": "state"`)
    State(StatePayload),
    /// Single-parameter delta (`"type": "update"`)
    Update(UpdatePayload),
    /// Structurally valid message with a type we do not handle
    Unknown { message_type: String },
}

impl Envelope {
    /// Wire name of the message type
    pub fn message_type(&self) -> &str {
        match self {
            Envelope::State(_) => "state",
            Envelope::Update(_) => "update",
            Envelope::Unknown { message_type } => message_type,
        }
    }
}

/// Full state dump
///
/// ```json
/// {"type": "state", "kind": "banana", "protocol": "1.0",
///  "strips": [{"index": 0, "label": "Mic", "mute": false, "gain": 0.0, "virtual": false,
///              "a1": true, "a2": false, ...}],
///  "buses":  [{"index": 0, "label": "A1", "mute": false, "gain": 0.0}]}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatePayload {
    pub kind: DeviceKind,
    pub protocol: ProtocolVersion,
    #[serde(default)]
    pub strips: Vec<StripPayload>,
    #[serde(default)]
    pub buses: Vec<BusPayload>,
}

/// Strip as sent by the device; every field except `label` is required
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StripPayload {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub mute: bool,
    pub gain: f64,
    #[serde(rename = "virtual")]
    pub is_virtual: bool,
    pub a1: bool,
    pub a2: bool,
    pub a3: bool,
    pub a4: bool,
    pub a5: bool,
    pub b1: bool,
    pub b2: bool,
    pub b3: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusPayload {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub mute: bool,
    pub gain: f64,
}

/// What an update or command addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    #[serde(alias = "channel")]
    Strip,
    Bus,
}

impl Target {
    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Strip => "strip",
            Target::Bus => "bus",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "strip" | "channel" => Some(Target::Strip),
            "bus" => Some(Target::Bus),
            _ => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Single-parameter delta
///
/// `{"type": "update", "target": "strip", "index": 0, "param": "mute", "value": true}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePayload {
    pub target: Target,
    pub index: usize,
    pub param: String,
    pub value: Value,
}

/// Outbound parameter change, encoded as `"type": "set"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub target: Target,
    pub index: usize,
    pub param: String,
    pub value: Value,
}

impl Command {
    pub fn new(target: Target, index: usize, param: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            target,
            index,
            param: param.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}={}", self.target, self.index, self.param, self.value)
    }
}
