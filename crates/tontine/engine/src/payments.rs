//! The payment ledger: contributions in, pull-payments out, collateral
//! return, and the guarded emergency sweep.

use tracing::{debug, info, warn};

use tontine_types::{Address, Amount, CircleId, CircleStatus, EngineEvent, RoundState};

use crate::engine::CircleEngine;
use crate::error::EngineError;
use crate::settlement;

impl CircleEngine {
    /// Contribute exactly the circle's contribution amount for the current
    /// round. The pull is verified by the observed balance delta. When this
    /// deposit is the last outstanding one, the round settles immediately.
    pub fn contribute(&mut self, caller: Address, id: CircleId) -> Result<(), EngineError> {
        self.guard_enter()?;
        let result = self.contribute_inner(caller, id);
        self.guard_exit();
        result
    }

    fn contribute_inner(&mut self, caller: Address, id: CircleId) -> Result<(), EngineError> {
        let (contribution, round, new_total_in) = {
            let circle = self.circle_ref(id)?;
            if circle.status != CircleStatus::Active {
                return Err(EngineError::CircleNotActive {
                    status: circle.status,
                });
            }
            if !circle.is_member(&caller) {
                return Err(EngineError::NotMember);
            }
            let round = circle.current_round;
            if let Some(record) = circle.rounds.get(&round) {
                if record.settled {
                    return Err(EngineError::RoundSettled { round });
                }
                if record.deposited.contains(&caller) {
                    return Err(EngineError::AlreadyDeposited { round });
                }
            }
            let new_total_in = circle
                .total_in
                .checked_add(circle.params.contribution_amount)
                .ok_or(EngineError::ArithmeticOverflow)?;
            (circle.params.contribution_amount, round, new_total_in)
        };

        self.pull_exact(caller, contribution)?;

        let circle = self
            .circles
            .get_mut(&id)
            .ok_or(EngineError::CircleNotFound(id))?;
        circle.total_in = new_total_in;
        let deposits = {
            let record = circle
                .rounds
                .entry(round)
                .or_insert_with(|| RoundState::new(round));
            record.deposited.insert(caller);
            record.deposit_count()
        };
        self.events.push(EngineEvent::ContributionMade {
            circle: id,
            round,
            member: caller,
            amount: contribution,
        });
        debug!(circle = %id, round, member = %caller, deposits, "contribution recorded");

        if deposits == circle.member_count() {
            let pot = contribution.saturating_mul(circle.member_count() as Amount);
            let winner = circle.payout_order[(round - 1) as usize];
            settlement::credit_and_advance(circle, &mut self.events, round, winner, pot, 0)?;
        }
        Ok(())
    }

    /// Claim the caller's full pending-payout balance. The balance is zeroed
    /// before the outward transfer; a zero balance is an error, never a
    /// silent success.
    pub fn claim_payout(&mut self, caller: Address, id: CircleId) -> Result<Amount, EngineError> {
        self.guard_enter()?;
        let result = self.claim_payout_inner(caller, id);
        self.guard_exit();
        result
    }

    fn claim_payout_inner(&mut self, caller: Address, id: CircleId) -> Result<Amount, EngineError> {
        let amount = {
            let circle = self.circle_ref(id)?;
            circle
                .pending_payouts
                .get(&caller)
                .copied()
                .unwrap_or(0)
        };
        if amount == 0 {
            return Err(EngineError::NothingPending);
        }
        {
            let circle = self
                .circles
                .get_mut(&id)
                .ok_or(EngineError::CircleNotFound(id))?;
            circle.pending_payouts.remove(&caller);
            circle.total_out = circle.total_out.saturating_add(amount);
        }
        if let Err(err) = self.push_funds(caller, amount) {
            let circle = self
                .circles
                .get_mut(&id)
                .ok_or(EngineError::CircleNotFound(id))?;
            circle.pending_payouts.insert(caller, amount);
            circle.total_out = circle.total_out.saturating_sub(amount);
            return Err(err);
        }
        self.events.push(EngineEvent::PayoutClaimed {
            circle: id,
            member: caller,
            amount,
        });
        info!(circle = %id, member = %caller, amount, "payout claimed");
        Ok(amount)
    }

    /// Withdraw the caller's full remaining collateral once the circle has
    /// finished. Guarded by the withdrawn flag; callable exactly once.
    pub fn withdraw_collateral(
        &mut self,
        caller: Address,
        id: CircleId,
    ) -> Result<Amount, EngineError> {
        self.guard_enter()?;
        let result = self.withdraw_collateral_inner(caller, id);
        self.guard_exit();
        result
    }

    fn withdraw_collateral_inner(
        &mut self,
        caller: Address,
        id: CircleId,
    ) -> Result<Amount, EngineError> {
        let amount = {
            let circle = self.circle_ref(id)?;
            if !matches!(
                circle.status,
                CircleStatus::Completed | CircleStatus::Cancelled
            ) {
                return Err(EngineError::CircleStillRunning {
                    status: circle.status,
                });
            }
            let record = circle.members.get(&caller).ok_or(EngineError::NotMember)?;
            if record.collateral_withdrawn {
                return Err(EngineError::CollateralAlreadyWithdrawn);
            }
            if record.collateral_locked == 0 {
                return Err(EngineError::NothingToWithdraw);
            }
            record.collateral_locked
        };
        {
            let circle = self
                .circles
                .get_mut(&id)
                .ok_or(EngineError::CircleNotFound(id))?;
            let record = circle.members.get_mut(&caller).ok_or(EngineError::NotMember)?;
            record.collateral_locked = 0;
            record.collateral_withdrawn = true;
            circle.total_out = circle.total_out.saturating_add(amount);
        }
        if let Err(err) = self.push_funds(caller, amount) {
            let circle = self
                .circles
                .get_mut(&id)
                .ok_or(EngineError::CircleNotFound(id))?;
            if let Some(record) = circle.members.get_mut(&caller) {
                record.collateral_locked = amount;
                record.collateral_withdrawn = false;
            }
            circle.total_out = circle.total_out.saturating_sub(amount);
            return Err(err);
        }
        self.events.push(EngineEvent::CollateralWithdrawn {
            circle: id,
            member: caller,
            amount,
        });
        info!(circle = %id, member = %caller, amount, "collateral withdrawn");
        Ok(amount)
    }

    /// Owner-only escape hatch: sweep a cancelled circle's residual balance,
    /// but only once nothing is owed to anyone.
    pub fn emergency_withdraw(
        &mut self,
        caller: Address,
        id: CircleId,
    ) -> Result<Amount, EngineError> {
        self.guard_enter()?;
        let result = self.emergency_withdraw_inner(caller, id);
        self.guard_exit();
        result
    }

    fn emergency_withdraw_inner(
        &mut self,
        caller: Address,
        id: CircleId,
    ) -> Result<Amount, EngineError> {
        if caller != self.config.owner {
            return Err(EngineError::NotOwner);
        }
        let residual = {
            let circle = self.circle_ref(id)?;
            if circle.status != CircleStatus::Cancelled {
                return Err(EngineError::CircleNotCancelled {
                    status: circle.status,
                });
            }
            let pending = circle.pending_total();
            let yield_state = circle.yield_state;
            if pending > 0
                || circle.insurance_pool > 0
                || yield_state.principal > 0
                || yield_state.members_accrued > 0
            {
                return Err(EngineError::ObligationsOutstanding {
                    pending,
                    insurance: circle.insurance_pool,
                    principal: yield_state.principal,
                    member_yield: yield_state.members_accrued,
                });
            }
            circle.total_in.saturating_sub(circle.total_out)
        };
        if residual == 0 {
            return Err(EngineError::NothingToWithdraw);
        }
        {
            let circle = self
                .circles
                .get_mut(&id)
                .ok_or(EngineError::CircleNotFound(id))?;
            circle.total_out = circle.total_out.saturating_add(residual);
        }
        if let Err(err) = self.push_funds(caller, residual) {
            let circle = self
                .circles
                .get_mut(&id)
                .ok_or(EngineError::CircleNotFound(id))?;
            circle.total_out = circle.total_out.saturating_sub(residual);
            return Err(err);
        }
        self.events.push(EngineEvent::EmergencyWithdrawal {
            circle: id,
            to: caller,
            amount: residual,
        });
        warn!(circle = %id, to = %caller, amount = residual, "emergency withdrawal");
        Ok(residual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MockToken;
    use crate::testutil::*;
    use crate::traits::ValueTransfer;
    use std::sync::Arc;

    #[test]
    fn contribute_rejects_non_members_and_double_deposits() {
        let mut rig = rig();
        let id = activated_circle(&mut rig, 100, 4);

        fund(&rig, member(9));
        assert!(matches!(
            rig.engine.contribute(member(9), id),
            Err(EngineError::NotMember)
        ));

        rig.engine.contribute(member(1), id).expect("contribute");
        assert!(matches!(
            rig.engine.contribute(member(1), id),
            Err(EngineError::AlreadyDeposited { round: 1 })
        ));
    }

    #[test]
    fn contribute_rejects_short_delta_without_state_change() {
        let token = Arc::new(MockToken::with_fee(100)); // 1% burned in flight
        let mut rig = rig_with_token(token);
        let id = rig
            .engine
            .create_circle(creator(), params(100, 4))
            .expect("create");
        fund(&rig, member(1));
        assert!(matches!(
            rig.engine.join_circle(member(1), id),
            Err(EngineError::ShortTransfer { .. })
        ));
        let circle = rig.engine.circle(id).unwrap();
        assert_eq!(circle.member_count(), 0);
        assert_eq!(circle.total_in, 0);
        rig.engine.audit(id).expect("conserved");
    }

    #[test]
    fn claim_pays_and_zeroes_exactly_once() {
        let mut rig = rig();
        let id = activated_circle(&mut rig, 100, 4);
        let winner = rig.engine.payout_order(id).unwrap()[0];
        contribute_all_except(&mut rig, id, None);

        let before = rig.token.balance_of(winner);
        let paid = rig.engine.claim_payout(winner, id).expect("claim");
        assert_eq!(paid, 400);
        assert_eq!(rig.token.balance_of(winner), before + 400);
        assert_eq!(rig.engine.pending_payout_of(id, winner).unwrap(), 0);

        assert!(matches!(
            rig.engine.claim_payout(winner, id),
            Err(EngineError::NothingPending)
        ));
        rig.engine.audit(id).expect("conserved");
    }

    #[test]
    fn claim_with_zero_balance_is_rejected() {
        let mut rig = rig();
        let id = activated_circle(&mut rig, 100, 4);
        assert!(matches!(
            rig.engine.claim_payout(member(1), id),
            Err(EngineError::NothingPending)
        ));
    }

    #[test]
    fn collateral_withdrawal_only_after_completion_and_only_once() {
        let mut rig = rig();
        let id = activated_circle(&mut rig, 100, 2);

        assert!(matches!(
            rig.engine.withdraw_collateral(member(1), id),
            Err(EngineError::CircleStillRunning { .. })
        ));

        contribute_all_except(&mut rig, id, None);
        contribute_all_except(&mut rig, id, None);
        assert_eq!(
            rig.engine.circle(id).unwrap().status,
            CircleStatus::Completed
        );

        let before = rig.token.balance_of(member(1));
        let amount = rig
            .engine
            .withdraw_collateral(member(1), id)
            .expect("withdraw");
        assert_eq!(amount, 200);
        assert_eq!(rig.token.balance_of(member(1)), before + 200);
        assert!(matches!(
            rig.engine.withdraw_collateral(member(1), id),
            Err(EngineError::CollateralAlreadyWithdrawn)
        ));
        rig.engine.audit(id).expect("conserved");
    }

    #[test]
    fn emergency_withdraw_guards_user_funds() {
        let mut rig = rig();
        let id = rig
            .engine
            .create_circle(creator(), params(100, 4))
            .expect("create");
        fund_and_join(&mut rig, id, member(1));

        assert!(matches!(
            rig.engine.emergency_withdraw(owner(), id),
            Err(EngineError::CircleNotCancelled { .. })
        ));

        rig.engine.cancel_circle(creator(), id).expect("cancel");

        // Member 1's refund is still unclaimed.
        assert!(matches!(
            rig.engine.emergency_withdraw(owner(), id),
            Err(EngineError::ObligationsOutstanding { .. })
        ));

        rig.engine.claim_payout(member(1), id).expect("claim refund");

        // Nothing owed and nothing residual: the sweep has nothing to take.
        assert!(matches!(
            rig.engine.emergency_withdraw(owner(), id),
            Err(EngineError::NothingToWithdraw)
        ));

        assert!(matches!(
            rig.engine.emergency_withdraw(member(1), id),
            Err(EngineError::NotOwner)
        ));
    }

    #[test]
    fn guard_releases_after_a_failed_operation() {
        let mut rig = rig();
        let id = activated_circle(&mut rig, 100, 4);
        assert!(rig.engine.claim_payout(member(1), id).is_err());
        // The operation lock was released on the error path.
        rig.engine.contribute(member(1), id).expect("still usable");
    }
}
