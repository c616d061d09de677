//! Price Router Service
//!
//! Consumes price ticks from redundant streams and produces:
//! - One authoritative stream per instrument, with forward-only failover
//! - Deduplicated, rate-limited price publications for subscribers
//! - Running per-stream statistics (min, max, cumulative fluctuation)
//!
//! # Architecture
//!
//! ```text
//!  Stream A   Stream B   Stream C        (one worker task each)
//!     │          │          │
//!  ┌──▼──────────▼──────────▼──┐
//!  │   StreamIngestCoordinator │  ← per-instrument lane lock
//!  └──┬──────────┬──────────┬──┘
//!     │          │          │
//! ┌───▼───┐ ┌────▼────┐ ┌───▼────────┐
//! │ Stats │ │Failover │ │Publication │
//! │       │ │ Router  │ │   Gate     │
//! └───────┘ └─────────┘ └───┬────────┘
//!                           │
//!                     ┌─────▼─────┐
//!                     │ PriceSink │
//!                     └───────────┘
//! ```

pub mod config;
pub mod coordinator;
pub mod events;
pub mod failover;
pub mod metrics;
pub mod publication;
pub mod sink;
pub mod statistics;
pub mod stream_state;
pub mod worker;

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
