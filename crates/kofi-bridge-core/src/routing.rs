//! Routing keys: the verification token that partitions connections.

use std::fmt;

use crate::errors::RoutingKeyError;

/// Opaque, non-empty routing key.
///
/// The value is the Ko-fi verification token. No format is imposed beyond
/// non-emptiness; two keys are equal iff their strings are equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoutingKey(String);

impl RoutingKey {
    /// Build a routing key, rejecting the empty string.
    pub fn new(value: impl Into<String>) -> Result<Self, RoutingKeyError> {
        let value = value.into();
        if value.is_empty() {
            return Err(RoutingKeyError::Empty);
        }
        Ok(Self(value))
    }

    /// The raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RoutingKey {
    type Error = RoutingKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for RoutingKey {
    type Error = RoutingKeyError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl AsRef<str> for RoutingKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
