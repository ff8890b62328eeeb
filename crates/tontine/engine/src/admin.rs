//! The administrative surface: pause switch, ownership transfer, and yield
//! wiring. All restricted to the single privileged owner; none of these
//! operations make external calls.

use tracing::{info, warn};

use tontine_types::{Address, EngineEvent};

use crate::engine::{CircleEngine, BPS_DENOM};
use crate::error::EngineError;

impl CircleEngine {
    fn require_owner(&self, caller: Address) -> Result<(), EngineError> {
        if caller != self.config.owner {
            return Err(EngineError::NotOwner);
        }
        Ok(())
    }

    /// Block every state-mutating entry point until `unpause`.
    pub fn pause(&mut self, caller: Address) -> Result<(), EngineError> {
        self.require_owner(caller)?;
        self.paused = true;
        self.record(EngineEvent::Paused);
        warn!("engine paused");
        Ok(())
    }

    pub fn unpause(&mut self, caller: Address) -> Result<(), EngineError> {
        self.require_owner(caller)?;
        self.paused = false;
        self.record(EngineEvent::Unpaused);
        info!("engine unpaused");
        Ok(())
    }

    pub fn transfer_ownership(
        &mut self,
        caller: Address,
        new_owner: Address,
    ) -> Result<(), EngineError> {
        self.require_owner(caller)?;
        if new_owner.is_zero() {
            return Err(EngineError::ZeroAddress);
        }
        let previous = self.config.owner;
        self.config.owner = new_owner;
        self.record(EngineEvent::OwnershipTransferred {
            from: previous,
            to: new_owner,
        });
        info!(from = %previous, to = %new_owner, "ownership transferred");
        Ok(())
    }

    pub fn set_yield_manager(
        &mut self,
        caller: Address,
        manager: Address,
    ) -> Result<(), EngineError> {
        self.require_owner(caller)?;
        if manager.is_zero() {
            return Err(EngineError::ZeroAddress);
        }
        self.config.yield_manager = manager;
        self.record(EngineEvent::YieldManagerChanged { manager });
        info!(manager = %manager, "yield manager changed");
        Ok(())
    }

    pub fn set_treasury(&mut self, caller: Address, treasury: Address) -> Result<(), EngineError> {
        self.require_owner(caller)?;
        if treasury.is_zero() {
            return Err(EngineError::ZeroAddress);
        }
        self.config.treasury = treasury;
        self.record(EngineEvent::TreasuryChanged { treasury });
        info!(treasury = %treasury, "treasury changed");
        Ok(())
    }

    /// Set the member share of harvested yield, in basis points.
    pub fn set_member_split_bps(&mut self, caller: Address, bps: u16) -> Result<(), EngineError> {
        self.require_owner(caller)?;
        if bps > BPS_DENOM {
            return Err(EngineError::InvalidSplit { bps });
        }
        self.config.member_split_bps = bps;
        self.record(EngineEvent::SplitChanged { member_bps: bps });
        info!(member_bps = bps, "yield split changed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;

    #[test]
    fn admin_operations_require_the_owner() {
        let mut rig = rig();
        assert!(matches!(
            rig.engine.pause(member(1)),
            Err(EngineError::NotOwner)
        ));
        assert!(matches!(
            rig.engine.set_member_split_bps(member(1), 5_000),
            Err(EngineError::NotOwner)
        ));
        assert!(matches!(
            rig.engine.transfer_ownership(member(1), member(2)),
            Err(EngineError::NotOwner)
        ));
    }

    #[test]
    fn pause_blocks_mutating_entry_points() {
        let mut rig = rig();
        let id = activated_circle(&mut rig, 100, 4);
        rig.engine.pause(owner()).expect("pause");

        assert!(matches!(
            rig.engine.contribute(member(1), id),
            Err(EngineError::EnginePaused)
        ));
        assert!(matches!(
            rig.engine.claim_payout(member(1), id),
            Err(EngineError::EnginePaused)
        ));
        assert!(matches!(
            rig.engine.finalize_expired(id),
            Err(EngineError::EnginePaused)
        ));

        rig.engine.unpause(owner()).expect("unpause");
        rig.engine.contribute(member(1), id).expect("resumes");
    }

    #[test]
    fn ownership_transfer_moves_the_privilege() {
        let mut rig = rig();
        rig.engine
            .transfer_ownership(owner(), member(8))
            .expect("transfer");
        assert!(matches!(
            rig.engine.pause(owner()),
            Err(EngineError::NotOwner)
        ));
        rig.engine.pause(member(8)).expect("new owner pauses");
    }

    #[test]
    fn split_must_stay_within_the_denominator() {
        let mut rig = rig();
        assert!(matches!(
            rig.engine.set_member_split_bps(owner(), 10_001),
            Err(EngineError::InvalidSplit { bps: 10_001 })
        ));
        rig.engine
            .set_member_split_bps(owner(), 10_000)
            .expect("full member split is allowed");
        assert_eq!(rig.engine.member_split_bps(), 10_000);
    }

    #[test]
    fn zero_addresses_are_rejected() {
        let mut rig = rig();
        assert!(matches!(
            rig.engine.transfer_ownership(owner(), Address::ZERO),
            Err(EngineError::ZeroAddress)
        ));
        assert!(matches!(
            rig.engine.set_treasury(owner(), Address::ZERO),
            Err(EngineError::ZeroAddress)
        ));
    }
}
