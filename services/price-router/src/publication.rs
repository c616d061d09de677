//! Publication gate
//!
//! Decides whether a candidate price may be forwarded to subscribers. A price
//! is admitted only if it differs from the last published price for its key
//! and enough time has passed since the last publication. Identical prices are
//! never republished no matter how much time passes: this is a change feed,
//! not a heartbeat feed.
//!
//! Forced admissions (issued on failover) skip the rate rule but still obey
//! the change rule.

use std::sync::{Mutex, PoisonError};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;
use types::ids::InstrumentId;
use types::numeric::Price;

use crate::config::PublicationScope;

/// Last publication for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationRecord {
    pub last_published_price: Price,
    /// Unix nanos of the last published observation.
    pub last_published_at: i64,
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Eligible; the gate state has been advanced.
    Admitted,
    /// Same price as the last publication for the key.
    Unchanged,
    /// Changed price but inside the minimum publish interval.
    TooSoon,
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Gate enforcing the change and rate rules per publication key.
#[derive(Debug)]
pub struct PublicationGate {
    min_interval_ns: i64,
    scope: PublicationScope,
    records: DashMap<InstrumentId, PublicationRecord>,
    /// Shared rate window, used only with `PublicationScope::Global`.
    global_last_at: Mutex<Option<i64>>,
}

impl PublicationGate {
    pub fn new(min_interval_ns: i64, scope: PublicationScope) -> Self {
        Self {
            min_interval_ns,
            scope,
            records: DashMap::new(),
            global_last_at: Mutex::new(None),
        }
    }

    /// Boolean admission check under both rules.
    pub fn try_admit(&self, key: &InstrumentId, price: Price, observed_at: i64) -> bool {
        self.admit(key, price, observed_at, false).is_admitted()
    }

    /// Boolean admission check under the change rule only.
    pub fn try_admit_forced(&self, key: &InstrumentId, price: Price, observed_at: i64) -> bool {
        self.admit(key, price, observed_at, true).is_admitted()
    }

    /// Check and, if admitted, advance the gate state for `key`.
    pub fn admit(&self, key: &InstrumentId, price: Price, observed_at: i64, forced: bool) -> Admission {
        match self.scope {
            PublicationScope::PerInstrument => self.admit_keyed(key, price, observed_at, forced),
            PublicationScope::Global => {
                // The shared window is read and written under one lock so two
                // instruments cannot both pass it.
                let mut global = self
                    .global_last_at
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);

                if let Some(record) = self.records.get(key) {
                    if record.last_published_price == price {
                        return self.refuse(key, price, Admission::Unchanged);
                    }
                }
                if !forced {
                    if let Some(last_at) = *global {
                        if !self.interval_elapsed(last_at, observed_at) {
                            return self.refuse(key, price, Admission::TooSoon);
                        }
                    }
                }

                self.records.insert(
                    key.clone(),
                    PublicationRecord {
                        last_published_price: price,
                        last_published_at: observed_at,
                    },
                );
                *global = Some(observed_at);
                Admission::Admitted
            }
        }
    }

    fn admit_keyed(&self, key: &InstrumentId, price: Price, observed_at: i64, forced: bool) -> Admission {
        match self.records.entry(key.clone()) {
            Entry::Vacant(vacant) => {
                vacant.insert(PublicationRecord {
                    last_published_price: price,
                    last_published_at: observed_at,
                });
                Admission::Admitted
            }
            Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                if record.last_published_price == price {
                    return self.refuse(key, price, Admission::Unchanged);
                }
                if !forced && !self.interval_elapsed(record.last_published_at, observed_at) {
                    return self.refuse(key, price, Admission::TooSoon);
                }
                record.last_published_price = price;
                record.last_published_at = observed_at;
                Admission::Admitted
            }
        }
    }

    fn interval_elapsed(&self, last_at: i64, observed_at: i64) -> bool {
        observed_at.saturating_sub(last_at) >= self.min_interval_ns
    }

    fn refuse(&self, key: &InstrumentId, price: Price, admission: Admission) -> Admission {
        debug!(
            instrument = %key,
            price = %price,
            outcome = ?admission,
            "Publication suppressed"
        );
        admission
    }

    /// Last publication for a key, if any.
    pub fn last_published(&self, key: &InstrumentId) -> Option<PublicationRecord> {
        self.records.get(key).map(|r| *r)
    }

    pub fn scope(&self) -> PublicationScope {
        self.scope
    }
}
