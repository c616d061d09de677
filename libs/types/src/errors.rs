//! Error types for the shared domain types
//!
//! Validation failures raised when constructing identifiers and prices
//! from untrusted input (configuration files, transport payloads).

use thiserror::Error;

/// Validation error for domain types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("Empty identifier for {kind}")]
    EmptyIdentifier { kind: &'static str },

    #[error("Invalid price: {0}")]
    InvalidPrice(String),
}
