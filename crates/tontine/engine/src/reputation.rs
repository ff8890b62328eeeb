//! Cross-circle reputation: default counters and the global ban list.

use std::collections::HashMap;

use tracing::warn;

use tontine_types::{Address, GlobalReputation};

use crate::engine::BAN_THRESHOLD;

/// Global default bookkeeping shared by every circle's settlement.
///
/// Counters are monotonic and never reset; the ban flag, once set, never
/// clears. A global ban blocks joining any new circle but leaves
/// already-joined circles untouched.
#[derive(Debug, Default)]
pub struct ReputationBook {
    records: HashMap<Address, GlobalReputation>,
}

impl ReputationBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &Address) -> GlobalReputation {
        self.records.get(address).copied().unwrap_or_default()
    }

    pub fn is_banned(&self, address: &Address) -> bool {
        self.get(address).banned
    }

    /// Record one default. Returns the updated record and whether this
    /// default crossed the ban threshold.
    pub fn record_default(&mut self, address: Address) -> (GlobalReputation, bool) {
        let record = self.records.entry(address).or_default();
        record.defaults = record.defaults.saturating_add(1);
        let newly_banned = !record.banned && record.defaults >= BAN_THRESHOLD;
        if newly_banned {
            record.banned = true;
            warn!(member = %address, defaults = record.defaults, "member banned globally");
        }
        (*record, newly_banned)
    }
}
