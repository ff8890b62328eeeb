//! Circle lifecycle: creation, membership, activation, cancellation, and the
//! read-side views.

use tracing::info;

use tontine_types::{
    Address, Amount, Circle, CircleId, CircleParams, CircleStatus, EngineEvent, GlobalReputation,
    MemberRecord, RoundState,
};

use crate::engine::{CircleEngine, MAX_MEMBERS, MIN_MEMBERS, MIN_PERIOD_SECS};
use crate::error::EngineError;
use crate::rotation;
use crate::traits::EntropySource;

impl CircleEngine {
    /// Create a new circle in the `Open` state. Pulls the creator-reward
    /// funding, if any, from the caller.
    pub fn create_circle(
        &mut self,
        caller: Address,
        params: CircleParams,
    ) -> Result<CircleId, EngineError> {
        self.guard_enter()?;
        let result = self.create_circle_inner(caller, params);
        self.guard_exit();
        result
    }

    fn create_circle_inner(
        &mut self,
        caller: Address,
        params: CircleParams,
    ) -> Result<CircleId, EngineError> {
        if caller.is_zero() {
            return Err(EngineError::ZeroAddress);
        }
        if params.asset != self.config.asset {
            return Err(EngineError::AssetMismatch {
                expected: self.config.asset,
                requested: params.asset,
            });
        }
        if params.contribution_amount == 0 {
            return Err(EngineError::ZeroAmount);
        }
        if params.period_secs < MIN_PERIOD_SECS {
            return Err(EngineError::PeriodTooShort {
                min_secs: MIN_PERIOD_SECS,
                requested_secs: params.period_secs,
            });
        }
        if params.max_members < MIN_MEMBERS || params.max_members > MAX_MEMBERS {
            return Err(EngineError::MemberCountOutOfBounds {
                min: MIN_MEMBERS,
                max: MAX_MEMBERS,
                requested: params.max_members,
            });
        }
        if params.collateral_factor == 0 {
            return Err(EngineError::CollateralFactorZero);
        }
        let collateral = params
            .collateral_requirement()
            .ok_or(EngineError::ArithmeticOverflow)?;
        params
            .expected_pot()
            .ok_or(EngineError::ArithmeticOverflow)?;
        collateral
            .checked_add(params.insurance_fee)
            .ok_or(EngineError::ArithmeticOverflow)?;
        if let Some(order) = &params.payout_order {
            rotation::validate_order(order, params.max_members)?;
        }

        // Bookkeeping is settled before the pull; the reward funding is the
        // only external call in this operation.
        self.pull_exact(caller, params.creator_reward)?;

        let id = self.allocate_circle_id();
        let now = self.clock.now_secs();
        let reward = params.creator_reward;
        let contribution = params.contribution_amount;
        let max_members = params.max_members;
        let mut circle = Circle::new(id, caller, params, now);
        circle.total_in = reward;
        self.circles.insert(id, circle);

        self.record(EngineEvent::CircleCreated {
            circle: id,
            creator: caller,
            contribution,
            max_members,
        });
        if reward > 0 {
            self.record(EngineEvent::CreatorRewardFunded {
                circle: id,
                amount: reward,
            });
        }
        info!(circle = %id, creator = %caller, contribution, max_members, "circle created");
        Ok(id)
    }

    /// Join an open circle, locking collateral and paying the insurance fee.
    /// Filling the last slot activates the circle and locks the rotation.
    pub fn join_circle(&mut self, caller: Address, id: CircleId) -> Result<(), EngineError> {
        self.guard_enter()?;
        let result = self.join_circle_inner(caller, id);
        self.guard_exit();
        result
    }

    fn join_circle_inner(&mut self, caller: Address, id: CircleId) -> Result<(), EngineError> {
        if caller.is_zero() {
            return Err(EngineError::ZeroAddress);
        }
        if self.reputation.is_banned(&caller) {
            return Err(EngineError::Banned);
        }
        let (collateral, insurance, total_due, new_total_in) = {
            let circle = self.circle_ref(id)?;
            if circle.status != CircleStatus::Open {
                return Err(EngineError::CircleNotOpen {
                    status: circle.status,
                });
            }
            if circle.is_member(&caller) {
                return Err(EngineError::AlreadyJoined);
            }
            if circle.is_full() {
                return Err(EngineError::CircleFull);
            }
            if let Some(order) = &circle.params.payout_order {
                if !order.contains(&caller) {
                    return Err(EngineError::NotOnPayoutOrder);
                }
            }
            let collateral = circle
                .params
                .collateral_requirement()
                .ok_or(EngineError::ArithmeticOverflow)?;
            let insurance = circle.params.insurance_fee;
            let total_due = collateral
                .checked_add(insurance)
                .ok_or(EngineError::ArithmeticOverflow)?;
            let new_total_in = circle
                .total_in
                .checked_add(total_due)
                .ok_or(EngineError::ArithmeticOverflow)?;
            (collateral, insurance, total_due, new_total_in)
        };

        self.pull_exact(caller, total_due)?;

        let now = self.clock.now_secs();
        let circle = self
            .circles
            .get_mut(&id)
            .ok_or(EngineError::CircleNotFound(id))?;
        circle.total_in = new_total_in;
        circle.insurance_pool = circle.insurance_pool.saturating_add(insurance);
        circle.members.insert(
            caller,
            MemberRecord {
                joined_at: now,
                collateral_locked: collateral,
                insurance_contributed: insurance,
                ..MemberRecord::default()
            },
        );
        circle.member_order.push(caller);
        self.events.push(EngineEvent::MemberJoined {
            circle: id,
            member: caller,
            collateral,
            insurance,
        });
        info!(circle = %id, member = %caller, collateral, insurance, "member joined");

        if circle.is_full() {
            activate(circle, self.entropy.as_mut(), &mut self.events, now)?;
        }
        Ok(())
    }

    /// Leave a circle that has not started. The member's collateral and
    /// insurance fee are credited to the pending-payout ledger.
    pub fn leave_circle(&mut self, caller: Address, id: CircleId) -> Result<(), EngineError> {
        self.guard_enter()?;
        let result = self.leave_circle_inner(caller, id);
        self.guard_exit();
        result
    }

    fn leave_circle_inner(&mut self, caller: Address, id: CircleId) -> Result<(), EngineError> {
        let circle = self
            .circles
            .get_mut(&id)
            .ok_or(EngineError::CircleNotFound(id))?;
        if circle.status != CircleStatus::Open {
            return Err(EngineError::CircleNotOpen {
                status: circle.status,
            });
        }
        let record = circle.members.remove(&caller).ok_or(EngineError::NotMember)?;
        let refund = record
            .collateral_locked
            .saturating_add(record.insurance_contributed);
        circle.member_order.retain(|m| *m != caller);
        circle.insurance_pool = circle
            .insurance_pool
            .checked_sub(record.insurance_contributed)
            .ok_or_else(|| EngineError::InvariantViolation {
                reason: "insurance pool under-funded on leave".to_string(),
            })?;
        let pending = circle.pending_payouts.entry(caller).or_insert(0);
        *pending = pending.saturating_add(refund);
        self.events.push(EngineEvent::MemberLeft {
            circle: id,
            member: caller,
            refunded: refund,
        });
        info!(circle = %id, member = %caller, refunded = refund, "member left");
        Ok(())
    }

    /// Cancel a circle that has not started. Every joined member's collateral
    /// and insurance fee, plus any unspent creator-reward funding, is
    /// credited to the pending-payout ledger for pull-claims.
    pub fn cancel_circle(&mut self, caller: Address, id: CircleId) -> Result<(), EngineError> {
        self.guard_enter()?;
        let result = self.cancel_circle_inner(caller, id);
        self.guard_exit();
        result
    }

    fn cancel_circle_inner(&mut self, caller: Address, id: CircleId) -> Result<(), EngineError> {
        let owner = self.config.owner;
        let circle = self
            .circles
            .get_mut(&id)
            .ok_or(EngineError::CircleNotFound(id))?;
        if caller != circle.creator && caller != owner {
            return Err(EngineError::NotCreator);
        }
        if circle.status != CircleStatus::Open {
            return Err(EngineError::CircleNotOpen {
                status: circle.status,
            });
        }

        let mut refunded_members = 0u32;
        for member in circle.member_order.clone() {
            let Some(record) = circle.members.get_mut(&member) else {
                continue;
            };
            let refund = record
                .collateral_locked
                .saturating_add(record.insurance_contributed);
            record.collateral_locked = 0;
            record.collateral_withdrawn = true;
            let pending = circle.pending_payouts.entry(member).or_insert(0);
            *pending = pending.saturating_add(refund);
            refunded_members += 1;
        }
        if circle.reward_pool.remaining > 0 {
            let creator = circle.creator;
            let refund = circle.reward_pool.remaining;
            circle.reward_pool.remaining = 0;
            let pending = circle.pending_payouts.entry(creator).or_insert(0);
            *pending = pending.saturating_add(refund);
        }
        circle.insurance_pool = 0;
        circle.status = CircleStatus::Cancelled;
        self.events.push(EngineEvent::CircleCancelled {
            circle: id,
            refunded_members,
        });
        info!(circle = %id, refunded_members, "circle cancelled");
        Ok(())
    }

    // ── views ───────────────────────────────────────────────────────────

    pub fn circle(&self, id: CircleId) -> Result<&Circle, EngineError> {
        self.circle_ref(id)
    }

    pub fn member(&self, id: CircleId, address: Address) -> Result<&MemberRecord, EngineError> {
        self.circle_ref(id)?
            .members
            .get(&address)
            .ok_or(EngineError::NotMember)
    }

    pub fn global_reputation(&self, address: Address) -> GlobalReputation {
        self.reputation.get(&address)
    }

    /// Round record, lazily materialized: rounds the circle has reached but
    /// no one has touched yet read as empty, unsettled records.
    pub fn round_status(&self, id: CircleId, round: u32) -> Result<RoundState, EngineError> {
        let circle = self.circle_ref(id)?;
        if round == 0 || round > circle.last_round() || round > circle.current_round {
            return Err(EngineError::RoundNotFound { round });
        }
        Ok(circle
            .rounds
            .get(&round)
            .cloned()
            .unwrap_or_else(|| RoundState::new(round)))
    }

    pub fn has_deposited(
        &self,
        id: CircleId,
        round: u32,
        address: Address,
    ) -> Result<bool, EngineError> {
        Ok(self.round_status(id, round)?.deposited.contains(&address))
    }

    pub fn payout_order(&self, id: CircleId) -> Result<&[Address], EngineError> {
        Ok(&self.circle_ref(id)?.payout_order)
    }

    /// The member receiving the current round's pot.
    pub fn current_recipient(&self, id: CircleId) -> Result<Address, EngineError> {
        let circle = self.circle_ref(id)?;
        if circle.status != CircleStatus::Active {
            return Err(EngineError::CircleNotActive {
                status: circle.status,
            });
        }
        Ok(circle.payout_order[(circle.current_round - 1) as usize])
    }

    pub fn pending_payout_of(&self, id: CircleId, address: Address) -> Result<Amount, EngineError> {
        Ok(self
            .circle_ref(id)?
            .pending_payouts
            .get(&address)
            .copied()
            .unwrap_or(0))
    }

    /// Ids of every circle the address is currently a member of.
    pub fn circles_of(&self, address: Address) -> Vec<CircleId> {
        let mut ids: Vec<CircleId> = self
            .circles
            .values()
            .filter(|c| c.is_member(&address))
            .map(|c| c.id)
            .collect();
        ids.sort();
        ids
    }
}

/// Lock in the payout order and start round 1. Runs exactly once per circle,
/// on the join that fills the last slot.
fn activate(
    circle: &mut Circle,
    entropy: &mut dyn EntropySource,
    events: &mut Vec<EngineEvent>,
    now: u64,
) -> Result<(), EngineError> {
    let (order, shuffled) = match &circle.params.payout_order {
        Some(preset) => (preset.clone(), false),
        None => (
            rotation::shuffle(&circle.member_order, circle.id, entropy),
            true,
        ),
    };
    rotation::validate_order(&order, circle.params.max_members)?;
    for entry in &order {
        if !circle.members.contains_key(entry) {
            return Err(EngineError::InvalidPayoutOrder {
                reason: format!("entry {} is not a member", entry),
            });
        }
    }
    circle.payout_order = order.clone();
    circle.rotation_locked = true;
    circle.start_ts = now;
    circle.current_round = 1;
    circle.status = CircleStatus::Active;
    events.push(EngineEvent::PayoutOrderSet {
        circle: circle.id,
        order,
        shuffled,
    });
    events.push(EngineEvent::CircleActivated {
        circle: circle.id,
        start_ts: now,
    });
    events.push(EngineEvent::RoundStarted {
        circle: circle.id,
        round: 1,
        round_start: now,
    });
    info!(circle = %circle.id, members = circle.member_count(), shuffled, "circle activated");
    Ok(())
}
