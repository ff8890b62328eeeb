//! Round settlement: default detection, collateral slashing, pot assembly
//! with insurance top-up, winner crediting, and round advancement.

use tracing::{info, warn};

use tontine_types::{
    Address, Amount, BanScope, Circle, CircleId, CircleStatus, EngineEvent, RoundState,
};

use crate::engine::{CircleEngine, BAN_THRESHOLD};
use crate::error::EngineError;

impl CircleEngine {
    /// Settle the current round after its deadline plus grace window has
    /// passed. Callable by anyone; the caller only supplies gas, never
    /// judgement. Members without a recorded deposit are marked defaulted and
    /// slashed `min(collateral, contribution)`; the pot is topped up from the
    /// insurance pool when the slashes do not cover the shortfall.
    ///
    /// A fully funded round never reaches this path: the last contribution
    /// settles it immediately, without waiting out the grace window.
    pub fn finalize_expired(&mut self, id: CircleId) -> Result<(), EngineError> {
        self.guard_enter()?;
        let result = self.finalize_expired_inner(id);
        self.guard_exit();
        result
    }

    fn finalize_expired_inner(&mut self, id: CircleId) -> Result<(), EngineError> {
        let now = self.clock.now_secs();
        let circle = self
            .circles
            .get_mut(&id)
            .ok_or(EngineError::CircleNotFound(id))?;
        if circle.status != CircleStatus::Active {
            return Err(EngineError::CircleNotActive {
                status: circle.status,
            });
        }
        let round = circle.current_round;
        if circle.rounds.get(&round).is_some_and(|r| r.settled) {
            return Err(EngineError::RoundSettled { round });
        }
        let deadline = circle.round_deadline(round);
        if now < deadline {
            return Err(EngineError::RoundNotExpired {
                round,
                now,
                deadline,
            });
        }
        let contribution = circle.params.contribution_amount;

        // Mark defaults, walking the join order so event emission is
        // deterministic.
        let members_list = circle.member_order.clone();
        let mut payers: u32 = 0;
        let mut defaulters: Vec<Address> = Vec::new();
        {
            let record = circle
                .rounds
                .entry(round)
                .or_insert_with(|| RoundState::new(round));
            for member in &members_list {
                if record.deposited.contains(member) {
                    payers += 1;
                } else {
                    record.defaulted.insert(*member);
                    defaulters.push(*member);
                }
            }
        }

        // Funds were verified when they were pulled; from here on the
        // arithmetic is saturating so a late failure cannot leave the round
        // half settled.
        let mut slashed_total: Amount = 0;
        for member in defaulters {
            let Some(record) = circle.members.get_mut(&member) else {
                return Err(EngineError::InvariantViolation {
                    reason: format!("rotation entry {} has no member record", member),
                });
            };
            let slash = record.collateral_locked.min(contribution);
            record.collateral_locked -= slash;
            slashed_total = slashed_total.saturating_add(slash);
            record.defaults = record.defaults.saturating_add(1);
            let local_defaults = record.defaults;
            let newly_banned_local = local_defaults >= BAN_THRESHOLD && !record.banned;
            if newly_banned_local {
                record.banned = true;
            }
            let (global, newly_banned_global) = self.reputation.record_default(member);
            warn!(
                circle = %id,
                round,
                member = %member,
                slashed = slash,
                local_defaults,
                global_defaults = global.defaults,
                "default detected"
            );
            self.events.push(EngineEvent::DefaultDetected {
                circle: id,
                round,
                member,
                slashed: slash,
                local_defaults,
                global_defaults: global.defaults,
            });
            if newly_banned_local {
                self.events.push(EngineEvent::MemberBanned {
                    circle: id,
                    member,
                    scope: BanScope::Circle,
                });
            }
            if newly_banned_global {
                self.events.push(EngineEvent::MemberBanned {
                    circle: id,
                    member,
                    scope: BanScope::Global,
                });
            }
        }

        // Pot assembly: paid contributions plus slashes, topped up from the
        // insurance pool. The pot may still fall short; the winner then
        // receives a partial pot.
        let mut pot = contribution
            .saturating_mul(payers as Amount)
            .saturating_add(slashed_total);
        let expected = contribution.saturating_mul(circle.params.max_members as Amount);
        let mut insurance_drawn: Amount = 0;
        if pot < expected {
            let shortfall = expected - pot;
            insurance_drawn = shortfall.min(circle.insurance_pool);
            circle.insurance_pool -= insurance_drawn;
            pot = pot.saturating_add(insurance_drawn);
            if pot < expected {
                warn!(circle = %id, round, pot, expected, "insurance exhausted, partial pot");
            }
        }

        let winner = circle.payout_order[(round - 1) as usize];
        credit_and_advance(circle, &mut self.events, round, winner, pot, insurance_drawn)
    }
}

/// Shared settlement tail for both the early-completion and expiry paths:
/// write the round record once, credit the winner's pending payout, and
/// advance the circle or mark it completed.
pub(crate) fn credit_and_advance(
    circle: &mut Circle,
    events: &mut Vec<EngineEvent>,
    round: u32,
    winner: Address,
    pot: Amount,
    insurance_drawn: Amount,
) -> Result<(), EngineError> {
    // The winner is selected by position, independent of who defaulted, but
    // must still be a recorded member.
    if !circle.members.contains_key(&winner) {
        return Err(EngineError::InvariantViolation {
            reason: format!("winner {} is not a recorded member", winner),
        });
    }
    let record = circle
        .rounds
        .entry(round)
        .or_insert_with(|| RoundState::new(round));
    if record.settled {
        return Err(EngineError::RoundSettled { round });
    }
    record.winner = Some(winner);
    record.pot = pot;
    record.insurance_drawn = insurance_drawn;
    record.settled = true;

    let pending = circle.pending_payouts.entry(winner).or_insert(0);
    *pending = pending.saturating_add(pot);

    events.push(EngineEvent::WinnerSelected {
        circle: circle.id,
        round,
        winner,
        pot,
        insurance_drawn,
    });
    info!(circle = %circle.id, round, winner = %winner, pot, insurance_drawn, "round settled");

    circle.current_round = round + 1;
    if round >= circle.last_round() {
        circle.status = CircleStatus::Completed;
        events.push(EngineEvent::CircleCompleted { circle: circle.id });
        info!(circle = %circle.id, "circle completed");
    } else {
        events.push(EngineEvent::RoundStarted {
            circle: circle.id,
            round: round + 1,
            round_start: circle.round_start(round + 1),
        });
    }
    Ok(())
}
