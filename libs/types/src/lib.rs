//! Types library for the price routing service
//!
//! Shared type definitions used by the router and its collaborators,
//! keeping identifiers and prices strongly typed across crate boundaries.
//!
//! # Modules
//! - `ids`: Identifiers (StreamId, InstrumentId)
//! - `numeric`: Exact decimal price type
//! - `tick`: Raw price tick as delivered by a stream
//! - `errors`: Validation error taxonomy

// Public modules
pub mod ids;
pub mod numeric;
pub mod tick;
pub mod errors;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ids::*;
    pub use crate::numeric::*;
    pub use crate::tick::*;
    pub use crate::errors::*;
}
