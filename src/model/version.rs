//! Protocol version reported in full-state messages ("1", "1.4", "2.0.3")

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("protocol version is empty")]
    Empty,
    #[error("invalid protocol version '{0}': major and minor must start with a number")]
    Invalid(String),
}

/// Dotted protocol version. Only major and minor carry meaning; the raw
/// string is kept so snapshots compare equal to what the device sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProtocolVersion {
    raw: String,
    major: u32,
    minor: u32,
}

impl ProtocolVersion {
    /// Parse "major[.minor[...]]". Only the leading digits of major and minor
    /// are read, so pre-release tags like "1.0-beta" or "1.2.0-rc1" are accepted.
    pub fn parse(raw: &str) -> Result<Self, VersionError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(VersionError::Empty);
        }

        let mut components = trimmed.split('.');
        let invalid = || VersionError::Invalid(raw.to_string());
        let major = components.next().and_then(leading_number).ok_or_else(invalid)?;
        let minor = match components.next() {
            Some(component) => leading_number(component).ok_or_else(invalid)?,
            None => 0,
        };

        Ok(Self {
            raw: trimmed.to_string(),
            major,
            minor,
        })
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether this version speaks the given major protocol
    pub fn is_supported_by(&self, supported_major: u32) -> bool {
        self.major == supported_major
    }

    pub fn same_major(&self, other: &ProtocolVersion) -> bool {
        self.major == other.major
    }
}

/// Digits at the start of a version component ("0-beta" -> 0)
fn leading_number(component: &str) -> Option<u32> {
    let end = component
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(component.len());
    component[..end].parse().ok()
}

impl TryFrom<String> for ProtocolVersion {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ProtocolVersion> for String {
    fn from(value: ProtocolVersion) -> Self {
        value.raw
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}
