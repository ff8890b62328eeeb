//! Yield accrual on idle insurance reserves: principal tracking against the
//! external venue, proportional pending-yield computation, harvest splits,
//! and member claims.

use tracing::{debug, info};

use tontine_types::{Address, Amount, CircleId, EngineEvent};

use crate::engine::{CircleEngine, BPS_DENOM};
use crate::error::EngineError;

impl CircleEngine {
    /// This circle's proportional share of the engine's venue position:
    /// `position_value * principal / total_principal`.
    fn proportional_share(&self, principal: Amount) -> Result<Amount, EngineError> {
        if principal == 0 || self.total_yield_principal == 0 {
            return Ok(0);
        }
        let value = self.vault.position_value(self.config.custody);
        value
            .checked_mul(principal)
            .map(|v| v / self.total_yield_principal)
            .ok_or(EngineError::ArithmeticOverflow)
    }

    /// Yield grown beyond the last sync point, before the split.
    pub fn pending_yield(&self, id: CircleId) -> Result<Amount, EngineError> {
        let circle = self.circle_ref(id)?;
        let share = self.proportional_share(circle.yield_state.principal)?;
        Ok(share.saturating_sub(circle.yield_state.last_value))
    }

    /// Enable or disable yield operations for a circle. Deposits and
    /// harvests require the flag; withdrawals and member claims always work
    /// so a disabled circle can still unwind.
    pub fn set_yield_enabled(
        &mut self,
        caller: Address,
        id: CircleId,
        enabled: bool,
    ) -> Result<(), EngineError> {
        self.guard_enter()?;
        let result = self.set_yield_enabled_inner(caller, id, enabled);
        self.guard_exit();
        result
    }

    fn set_yield_enabled_inner(
        &mut self,
        caller: Address,
        id: CircleId,
        enabled: bool,
    ) -> Result<(), EngineError> {
        if caller != self.config.yield_manager {
            return Err(EngineError::NotYieldManager);
        }
        let circle = self
            .circles
            .get_mut(&id)
            .ok_or(EngineError::CircleNotFound(id))?;
        circle.yield_state.enabled = enabled;
        self.events.push(EngineEvent::YieldToggled {
            circle: id,
            enabled,
        });
        info!(circle = %id, enabled, "yield toggled");
        Ok(())
    }

    /// Park part of the insurance pool at the yield venue.
    pub fn deposit_to_yield(
        &mut self,
        caller: Address,
        id: CircleId,
        amount: Amount,
    ) -> Result<(), EngineError> {
        self.guard_enter()?;
        let result = self.deposit_to_yield_inner(caller, id, amount);
        self.guard_exit();
        result
    }

    fn deposit_to_yield_inner(
        &mut self,
        caller: Address,
        id: CircleId,
        amount: Amount,
    ) -> Result<(), EngineError> {
        if caller != self.config.yield_manager {
            return Err(EngineError::NotYieldManager);
        }
        if amount == 0 {
            return Err(EngineError::ZeroAmount);
        }
        {
            let circle = self.circle_ref(id)?;
            if !circle.yield_state.enabled {
                return Err(EngineError::YieldDisabled);
            }
            if circle.insurance_pool < amount {
                return Err(EngineError::InsufficientInsurance {
                    available: circle.insurance_pool,
                    requested: amount,
                });
            }
        }

        // Bookkeeping first, then the outward supply call.
        {
            let circle = self
                .circles
                .get_mut(&id)
                .ok_or(EngineError::CircleNotFound(id))?;
            circle.insurance_pool -= amount;
            circle.yield_state.principal = circle.yield_state.principal.saturating_add(amount);
        }
        self.total_yield_principal = self.total_yield_principal.saturating_add(amount);

        let custody = self.config.custody;
        if !self.vault.supply(custody, amount, custody) {
            self.total_yield_principal = self.total_yield_principal.saturating_sub(amount);
            let circle = self
                .circles
                .get_mut(&id)
                .ok_or(EngineError::CircleNotFound(id))?;
            circle.insurance_pool = circle.insurance_pool.saturating_add(amount);
            circle.yield_state.principal = circle.yield_state.principal.saturating_sub(amount);
            return Err(EngineError::VaultRejected);
        }

        // Re-sync the snapshot so the new principal is not read as yield.
        self.resync_snapshot(id)?;
        let principal = self.circle_ref(id)?.yield_state.principal;
        self.events.push(EngineEvent::YieldDeposited {
            circle: id,
            amount,
            principal,
        });
        info!(circle = %id, amount, principal, "insurance parked at yield venue");
        Ok(())
    }

    /// Pull principal back from the venue into the insurance pool.
    pub fn withdraw_from_yield(
        &mut self,
        caller: Address,
        id: CircleId,
        amount: Amount,
    ) -> Result<(), EngineError> {
        self.guard_enter()?;
        let result = self.withdraw_from_yield_inner(caller, id, amount);
        self.guard_exit();
        result
    }

    fn withdraw_from_yield_inner(
        &mut self,
        caller: Address,
        id: CircleId,
        amount: Amount,
    ) -> Result<(), EngineError> {
        if caller != self.config.yield_manager {
            return Err(EngineError::NotYieldManager);
        }
        if amount == 0 {
            return Err(EngineError::ZeroAmount);
        }
        {
            let circle = self.circle_ref(id)?;
            if circle.yield_state.principal < amount {
                return Err(EngineError::InsufficientPrincipal {
                    principal: circle.yield_state.principal,
                    requested: amount,
                });
            }
        }
        {
            let circle = self
                .circles
                .get_mut(&id)
                .ok_or(EngineError::CircleNotFound(id))?;
            circle.yield_state.principal -= amount;
            circle.insurance_pool = circle.insurance_pool.saturating_add(amount);
        }
        self.total_yield_principal = self.total_yield_principal.saturating_sub(amount);

        let custody = self.config.custody;
        let received = self.vault.withdraw(amount, custody);
        if received < amount {
            self.total_yield_principal = self.total_yield_principal.saturating_add(amount);
            let circle = self
                .circles
                .get_mut(&id)
                .ok_or(EngineError::CircleNotFound(id))?;
            circle.yield_state.principal = circle.yield_state.principal.saturating_add(amount);
            circle.insurance_pool = circle.insurance_pool.saturating_sub(amount);
            return Err(EngineError::ShortVaultWithdrawal {
                requested: amount,
                received,
            });
        }

        self.resync_snapshot(id)?;
        let principal = self.circle_ref(id)?.yield_state.principal;
        self.events.push(EngineEvent::YieldWithdrawn {
            circle: id,
            amount,
            principal,
        });
        info!(circle = %id, amount, principal, "principal returned to insurance pool");
        Ok(())
    }

    /// Harvest pending yield: withdraw the treasury share to the treasury
    /// immediately and credit the member share equally across the current
    /// membership. Equal-at-harvest is an accepted simplification; it is not
    /// retroactively fair across time.
    pub fn harvest_yield(&mut self, caller: Address, id: CircleId) -> Result<Amount, EngineError> {
        self.guard_enter()?;
        let result = self.harvest_yield_inner(caller, id);
        self.guard_exit();
        result
    }

    fn harvest_yield_inner(
        &mut self,
        caller: Address,
        id: CircleId,
    ) -> Result<Amount, EngineError> {
        if caller != self.config.yield_manager {
            return Err(EngineError::NotYieldManager);
        }
        let (principal, last_value, members) = {
            let circle = self.circle_ref(id)?;
            if !circle.yield_state.enabled {
                return Err(EngineError::YieldDisabled);
            }
            (
                circle.yield_state.principal,
                circle.yield_state.last_value,
                circle.member_order.clone(),
            )
        };
        if members.is_empty() {
            return Err(EngineError::NoEligibleMembers);
        }
        let share_value = self.proportional_share(principal)?;
        let pending = share_value.saturating_sub(last_value);
        if pending == 0 {
            return Err(EngineError::NoPendingYield);
        }

        let member_share = pending
            .checked_mul(self.config.member_split_bps as Amount)
            .ok_or(EngineError::ArithmeticOverflow)?
            / BPS_DENOM as Amount;
        let treasury_share = pending - member_share;
        let share_each = member_share / members.len() as Amount;
        let credited = share_each * members.len() as Amount;
        // The integer dust of the equal split stays in the position and
        // surfaces as pending yield at the next harvest.
        let dust = member_share - credited;

        {
            let circle = self
                .circles
                .get_mut(&id)
                .ok_or(EngineError::CircleNotFound(id))?;
            for member in &members {
                if let Some(record) = circle.members.get_mut(member) {
                    record.yield_claimable = record.yield_claimable.saturating_add(share_each);
                }
            }
            circle.yield_state.members_accrued =
                circle.yield_state.members_accrued.saturating_add(credited);
            circle.yield_state.last_value = share_value
                .saturating_sub(treasury_share)
                .saturating_sub(dust);
        }

        if treasury_share > 0 {
            let received = self.vault.withdraw(treasury_share, self.config.treasury);
            if received < treasury_share {
                let circle = self
                    .circles
                    .get_mut(&id)
                    .ok_or(EngineError::CircleNotFound(id))?;
                for member in &members {
                    if let Some(record) = circle.members.get_mut(member) {
                        record.yield_claimable = record.yield_claimable.saturating_sub(share_each);
                    }
                }
                circle.yield_state.members_accrued =
                    circle.yield_state.members_accrued.saturating_sub(credited);
                circle.yield_state.last_value = last_value;
                return Err(EngineError::ShortVaultWithdrawal {
                    requested: treasury_share,
                    received,
                });
            }
        }

        self.events.push(EngineEvent::YieldHarvested {
            circle: id,
            gross: pending,
            member_share: credited,
            treasury_share,
        });
        info!(circle = %id, gross = pending, member_share = credited, treasury_share, "yield harvested");
        Ok(pending)
    }

    /// Claim the caller's accrued yield share, withdrawn from the venue
    /// straight to the caller. The share is zeroed before the withdrawal.
    pub fn claim_yield(&mut self, caller: Address, id: CircleId) -> Result<Amount, EngineError> {
        self.guard_enter()?;
        let result = self.claim_yield_inner(caller, id);
        self.guard_exit();
        result
    }

    fn claim_yield_inner(&mut self, caller: Address, id: CircleId) -> Result<Amount, EngineError> {
        let amount = {
            let circle = self.circle_ref(id)?;
            let record = circle.members.get(&caller).ok_or(EngineError::NotMember)?;
            record.yield_claimable
        };
        if amount == 0 {
            return Err(EngineError::NoYieldClaimable);
        }
        {
            let circle = self
                .circles
                .get_mut(&id)
                .ok_or(EngineError::CircleNotFound(id))?;
            if let Some(record) = circle.members.get_mut(&caller) {
                record.yield_claimable = 0;
            }
            circle.yield_state.members_accrued =
                circle.yield_state.members_accrued.saturating_sub(amount);
            circle.yield_state.last_value = circle.yield_state.last_value.saturating_sub(amount);
        }
        let received = self.vault.withdraw(amount, caller);
        if received < amount {
            let circle = self
                .circles
                .get_mut(&id)
                .ok_or(EngineError::CircleNotFound(id))?;
            if let Some(record) = circle.members.get_mut(&caller) {
                record.yield_claimable = amount;
            }
            circle.yield_state.members_accrued =
                circle.yield_state.members_accrued.saturating_add(amount);
            circle.yield_state.last_value = circle.yield_state.last_value.saturating_add(amount);
            return Err(EngineError::ShortVaultWithdrawal {
                requested: amount,
                received,
            });
        }
        self.events.push(EngineEvent::YieldClaimed {
            circle: id,
            member: caller,
            amount,
        });
        debug!(circle = %id, member = %caller, amount, "yield claimed");
        Ok(amount)
    }

    /// Refresh the last-observed snapshot after principal moved, so the next
    /// harvest only sees genuine growth.
    fn resync_snapshot(&mut self, id: CircleId) -> Result<(), EngineError> {
        let principal = self.circle_ref(id)?.yield_state.principal;
        let share = self.proportional_share(principal)?;
        let circle = self
            .circles
            .get_mut(&id)
            .ok_or(EngineError::CircleNotFound(id))?;
        circle.yield_state.last_value = share;
        Ok(())
    }
}
