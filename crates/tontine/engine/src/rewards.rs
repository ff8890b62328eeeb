//! The creator reward pool: an organizer-funded bonus split equally among
//! members who finish the circle without a single default.

use tracing::info;

use tontine_types::{Address, Amount, CircleId, CircleStatus, EngineEvent};

use crate::engine::CircleEngine;
use crate::error::EngineError;

impl CircleEngine {
    /// Number of members currently holding a perfect payment record,
    /// computed on demand by scanning the membership.
    pub fn eligible_reward_members(&self, id: CircleId) -> Result<u32, EngineError> {
        let circle = self.circle_ref(id)?;
        Ok(circle.members.values().filter(|m| m.defaults == 0).count() as u32)
    }

    /// Claim the caller's equal share of the creator reward pool. Only open
    /// on a completed circle, only to members with zero defaults, and only
    /// once per member. The share divides the funded amount, so every
    /// eligible member receives the same value regardless of claim order.
    pub fn claim_creator_reward(
        &mut self,
        caller: Address,
        id: CircleId,
    ) -> Result<Amount, EngineError> {
        self.guard_enter()?;
        let result = self.claim_creator_reward_inner(caller, id);
        self.guard_exit();
        result
    }

    fn claim_creator_reward_inner(
        &mut self,
        caller: Address,
        id: CircleId,
    ) -> Result<Amount, EngineError> {
        let share = {
            let circle = self.circle_ref(id)?;
            if circle.status != CircleStatus::Completed {
                return Err(EngineError::CircleNotCompleted {
                    status: circle.status,
                });
            }
            let record = circle.members.get(&caller).ok_or(EngineError::NotMember)?;
            if record.defaults > 0 {
                return Err(EngineError::NotEligibleForReward {
                    defaults: record.defaults,
                });
            }
            if record.reward_claimed {
                return Err(EngineError::RewardAlreadyClaimed);
            }
            let eligible = circle.members.values().filter(|m| m.defaults == 0).count() as Amount;
            if eligible == 0 {
                return Err(EngineError::NoEligibleMembers);
            }
            let share = circle.reward_pool.funded / eligible;
            if share == 0 {
                return Err(EngineError::RewardShareZero);
            }
            if circle.reward_pool.remaining < share {
                return Err(EngineError::InvariantViolation {
                    reason: "reward pool under-funded for the computed share".to_string(),
                });
            }
            share
        };

        {
            let circle = self
                .circles
                .get_mut(&id)
                .ok_or(EngineError::CircleNotFound(id))?;
            circle.reward_pool.remaining -= share;
            if let Some(record) = circle.members.get_mut(&caller) {
                record.reward_claimed = true;
            }
            circle.total_out = circle.total_out.saturating_add(share);
        }
        if let Err(err) = self.push_funds(caller, share) {
            let circle = self
                .circles
                .get_mut(&id)
                .ok_or(EngineError::CircleNotFound(id))?;
            circle.reward_pool.remaining += share;
            if let Some(record) = circle.members.get_mut(&caller) {
                record.reward_claimed = false;
            }
            circle.total_out = circle.total_out.saturating_sub(share);
            return Err(err);
        }
        self.events.push(EngineEvent::CreatorRewardClaimed {
            circle: id,
            member: caller,
            amount: share,
        });
        info!(circle = %id, member = %caller, amount = share, "creator reward claimed");
        Ok(share)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;
    use crate::traits::ValueTransfer;

    #[test]
    fn perfect_record_members_split_the_funded_amount() {
        let mut rig = rig();
        let (id, defaulter) = completed_circle_with_one_default(&mut rig, 90);

        assert_eq!(rig.engine.eligible_reward_members(id).unwrap(), 3);
        for candidate in rig.engine.circle(id).unwrap().member_order.clone() {
            if candidate == defaulter {
                continue;
            }
            let before = rig.token.balance_of(candidate);
            let share = rig
                .engine
                .claim_creator_reward(candidate, id)
                .expect("claim");
            assert_eq!(share, 30);
            assert_eq!(rig.token.balance_of(candidate), before + 30);
        }
        assert_eq!(rig.engine.circle(id).unwrap().reward_pool.remaining, 0);
        rig.engine.audit(id).expect("conserved");
    }

    #[test]
    fn defaulter_claim_is_rejected() {
        let mut rig = rig();
        let (id, defaulter) = completed_circle_with_one_default(&mut rig, 90);
        assert!(matches!(
            rig.engine.claim_creator_reward(defaulter, id),
            Err(EngineError::NotEligibleForReward { defaults: 1 })
        ));
    }

    #[test]
    fn double_claim_is_rejected() {
        let mut rig = rig();
        let (id, defaulter) = completed_circle_with_one_default(&mut rig, 90);
        let claimant = rig
            .engine
            .circle(id)
            .unwrap()
            .member_order
            .iter()
            .copied()
            .find(|m| *m != defaulter)
            .expect("eligible member");
        rig.engine
            .claim_creator_reward(claimant, id)
            .expect("first claim");
        assert!(matches!(
            rig.engine.claim_creator_reward(claimant, id),
            Err(EngineError::RewardAlreadyClaimed)
        ));
    }

    #[test]
    fn claims_only_open_after_completion() {
        let mut rig = rig();
        let mut p = params(100, 4);
        p.creator_reward = 90;
        fund(&rig, creator());
        let id = activated_circle_with(&mut rig, p);
        assert!(matches!(
            rig.engine.claim_creator_reward(member(1), id),
            Err(EngineError::CircleNotCompleted { .. })
        ));
    }

    #[test]
    fn zero_share_is_rejected_not_rounded_away() {
        let mut rig = rig();
        // Funded with less than one unit per eligible member.
        let (id, defaulter) = completed_circle_with_one_default(&mut rig, 2);
        let claimant = rig
            .engine
            .circle(id)
            .unwrap()
            .member_order
            .iter()
            .copied()
            .find(|m| *m != defaulter)
            .expect("eligible member");
        assert!(matches!(
            rig.engine.claim_creator_reward(claimant, id),
            Err(EngineError::RewardShareZero)
        ));
    }
}
