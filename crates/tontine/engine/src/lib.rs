//! Rotating savings circle settlement engine.
//!
//! A circle is a fixed-membership pool: every member contributes a fixed
//! amount each round, one member per round receives the pot, and
//! non-payment is absorbed by collateral slashing, a shared insurance
//! reserve, and a cross-circle ban list. This crate provides:
//!
//! - the round/settlement state machine and its ledgers (membership,
//!   rotation order, default detection, pot assembly, pull-payments)
//! - cross-circle reputation with a global ban threshold
//! - yield accrual on idle insurance reserves through an external venue
//! - an organizer-funded bonus pool for members with a perfect record
//! - trait boundaries for the token, yield venue, clock, and shuffle
//!   entropy, with in-memory implementations for tests and embedding
//!
//! Every externally-invoked operation either completes in full or leaves no
//! effect; an explicit operation-in-progress guard rejects reentrant calls
//! arriving through the external transfer boundary.

mod accrual;
mod admin;
mod circle;
mod payments;
mod rewards;
mod settlement;

pub mod engine;
pub mod error;
pub mod memory;
pub mod reputation;
pub mod rotation;
pub mod traits;

#[cfg(test)]
pub(crate) mod testutil;

pub use engine::{
    CircleEngine, EngineConfig, BAN_THRESHOLD, BPS_DENOM, DEFAULT_MEMBER_SPLIT_BPS, MAX_MEMBERS,
    MIN_MEMBERS, MIN_PERIOD_SECS,
};
pub use error::EngineError;
pub use memory::{
    ManualClock, MockToken, MockVault, OsEntropy, SeededEntropy, SystemClock, WeakEntropy,
};
pub use reputation::ReputationBook;
pub use traits::{Clock, EntropySource, ValueTransfer, YieldVenue};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;

    #[test]
    fn construction_rejects_zero_addresses_and_bad_splits() {
        use std::sync::Arc;
        use tontine_types::Address;

        let token = Arc::new(MockToken::new());
        let vault = Arc::new(MockVault::new(token.clone(), vault_address(), custody()));
        let clock = Arc::new(ManualClock::new(0));

        let mut config = EngineConfig::standard(owner(), treasury(), manager(), custody(), asset());
        config.owner = Address::ZERO;
        assert!(matches!(
            CircleEngine::new(
                config,
                token.clone(),
                vault.clone(),
                clock.clone(),
                Box::new(SeededEntropy::new(1)),
            ),
            Err(EngineError::ZeroAddress)
        ));

        let mut config = EngineConfig::standard(owner(), treasury(), manager(), custody(), asset());
        config.member_split_bps = 10_001;
        assert!(matches!(
            CircleEngine::new(
                config,
                token,
                vault,
                clock,
                Box::new(SeededEntropy::new(1)),
            ),
            Err(EngineError::InvalidSplit { .. })
        ));
    }

    #[test]
    fn event_log_exports_as_json_lines() {
        let mut rig = rig();
        let _ = activated_circle(&mut rig, 100, 2);
        let exported = rig.engine.export_events_json().expect("export");
        let lines: Vec<&str> = exported.lines().collect();
        assert_eq!(lines.len(), rig.engine.events().len());
        for line in lines {
            let value: serde_json::Value = serde_json::from_str(line).expect("valid json");
            assert!(value.is_object());
        }
    }
}
