//! Identifier types for streams and instruments
//!
//! Both identifiers are opaque strings assigned by configuration. Streams are
//! ordered lexicographically, which the router relies on to break ties
//! between candidates of equal preference rank.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::TypeError;

/// Identifier of one physical or logical price stream
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    /// Create a new StreamId
    ///
    /// # Panics
    /// Panics if the identifier is empty
    pub fn new(id: impl Into<String>) -> Self {
        let s = id.into();
        assert!(!s.is_empty(), "StreamId must not be empty");
        Self(s)
    }

    /// Try to create a StreamId, rejecting empty identifiers
    pub fn try_new(id: impl Into<String>) -> Result<Self, TypeError> {
        let s = id.into();
        if s.is_empty() {
            Err(TypeError::EmptyIdentifier { kind: "stream" })
        } else {
            Ok(Self(s))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StreamId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Instrument identifier (e.g., "AAPL")
///
/// An instrument may be fed by several candidate streams; exactly one of them
/// is authoritative at any time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(String);

impl InstrumentId {
    /// Create a new InstrumentId
    ///
    /// # Panics
    /// Panics if the name is empty
    pub fn new(name: impl Into<String>) -> Self {
        let s = name.into();
        assert!(!s.is_empty(), "InstrumentId must not be empty");
        Self(s)
    }

    /// Try to create an InstrumentId, rejecting empty names
    pub fn try_new(name: impl Into<String>) -> Result<Self, TypeError> {
        let s = name.into();
        if s.is_empty() {
            Err(TypeError::EmptyIdentifier { kind: "instrument" })
        } else {
            Ok(Self(s))
        }
    }

    /// Get the instrument name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstrumentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
