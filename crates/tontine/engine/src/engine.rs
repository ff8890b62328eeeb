//! The engine aggregate: circle arena, reputation book, external handles,
//! and the helpers shared by every entry point.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use tontine_types::{Address, Amount, Circle, CircleId, CircleStatus, EngineEvent};

use crate::error::EngineError;
use crate::reputation::ReputationBook;
use crate::traits::{Clock, EntropySource, ValueTransfer, YieldVenue};

/// Defaults before a member is banned, locally and globally.
pub const BAN_THRESHOLD: u32 = 3;

/// Membership bounds for a circle.
pub const MIN_MEMBERS: u32 = 2;
pub const MAX_MEMBERS: u32 = 100;

/// Shortest allowed round length.
pub const MIN_PERIOD_SECS: u64 = 3_600;

/// Basis-point denominator for the harvest split.
pub const BPS_DENOM: u16 = 10_000;

/// Default member share of harvested yield, in basis points.
pub const DEFAULT_MEMBER_SPLIT_BPS: u16 = 7_000;

/// Engine-level wiring fixed at construction (the addresses can later be
/// changed through the admin surface).
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Privileged administrator.
    pub owner: Address,
    /// Receives the treasury share of harvested yield.
    pub treasury: Address,
    /// Operator allowed to drive the yield module.
    pub yield_manager: Address,
    /// Account holding pooled funds at the token.
    pub custody: Address,
    /// The single fungible asset this deployment settles in.
    pub asset: Address,
    /// Member share of harvested yield, in basis points.
    pub member_split_bps: u16,
}

impl EngineConfig {
    /// Config with the default 70/30 member/treasury split.
    pub fn standard(
        owner: Address,
        treasury: Address,
        yield_manager: Address,
        custody: Address,
        asset: Address,
    ) -> Self {
        Self {
            owner,
            treasury,
            yield_manager,
            custody,
            asset,
            member_split_bps: DEFAULT_MEMBER_SPLIT_BPS,
        }
    }
}

/// Rotating savings circle engine.
///
/// Owns an id-indexed arena of circles; each circle owns its member list,
/// round records, payout order, and ledgers. Every externally-invoked
/// operation either completes in full or leaves no effect. The only
/// concurrency hazard is reentrancy through the external value-transfer
/// boundary, handled by an explicit operation-in-progress guard plus
/// bookkeeping-before-outward-call ordering.
pub struct CircleEngine {
    pub(crate) config: EngineConfig,
    pub(crate) token: Arc<dyn ValueTransfer>,
    pub(crate) vault: Arc<dyn YieldVenue>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) entropy: Box<dyn EntropySource>,
    pub(crate) paused: bool,
    pub(crate) entered: bool,
    pub(crate) next_circle_id: u64,
    pub(crate) circles: HashMap<CircleId, Circle>,
    pub(crate) reputation: ReputationBook,
    /// Principal across all circles currently parked at the yield venue.
    pub(crate) total_yield_principal: Amount,
    pub(crate) events: Vec<EngineEvent>,
}

impl CircleEngine {
    pub fn new(
        config: EngineConfig,
        token: Arc<dyn ValueTransfer>,
        vault: Arc<dyn YieldVenue>,
        clock: Arc<dyn Clock>,
        entropy: Box<dyn EntropySource>,
    ) -> Result<Self, EngineError> {
        for address in [
            config.owner,
            config.treasury,
            config.yield_manager,
            config.custody,
            config.asset,
        ] {
            if address.is_zero() {
                return Err(EngineError::ZeroAddress);
            }
        }
        if config.member_split_bps > BPS_DENOM {
            return Err(EngineError::InvalidSplit {
                bps: config.member_split_bps,
            });
        }
        Ok(Self {
            config,
            token,
            vault,
            clock,
            entropy,
            paused: false,
            entered: false,
            next_circle_id: 0,
            circles: HashMap::new(),
            reputation: ReputationBook::new(),
            total_yield_principal: 0,
            events: Vec::new(),
        })
    }

    // ── operation guard ─────────────────────────────────────────────────

    /// Acquire the operation-in-progress lock. A reentrant call through the
    /// token boundary lands here and is rejected before it can observe any
    /// mid-operation state.
    pub(crate) fn guard_enter(&mut self) -> Result<(), EngineError> {
        if self.entered {
            return Err(EngineError::ReentrantCall);
        }
        if self.paused {
            return Err(EngineError::EnginePaused);
        }
        self.entered = true;
        Ok(())
    }

    /// Release the lock. Entry points call this on every exit path.
    pub(crate) fn guard_exit(&mut self) {
        self.entered = false;
    }

    // ── arena access ────────────────────────────────────────────────────

    pub(crate) fn circle_ref(&self, id: CircleId) -> Result<&Circle, EngineError> {
        self.circles.get(&id).ok_or(EngineError::CircleNotFound(id))
    }

    pub(crate) fn circle_mut(&mut self, id: CircleId) -> Result<&mut Circle, EngineError> {
        self.circles
            .get_mut(&id)
            .ok_or(EngineError::CircleNotFound(id))
    }

    pub(crate) fn allocate_circle_id(&mut self) -> CircleId {
        self.next_circle_id += 1;
        CircleId(self.next_circle_id)
    }

    // ── external value movement ─────────────────────────────────────────

    /// Pull exactly `amount` from `from` into custody, verified by the
    /// observed balance delta rather than the nominal transfer result.
    pub(crate) fn pull_exact(&self, from: Address, amount: Amount) -> Result<(), EngineError> {
        if amount == 0 {
            return Ok(());
        }
        let before = self.token.balance_of(self.config.custody);
        let accepted = self.token.transfer_from(from, self.config.custody, amount);
        let after = self.token.balance_of(self.config.custody);
        let received = after.saturating_sub(before);
        if !accepted || received < amount {
            // Whatever did arrive goes back; the ledger never credits a
            // short pull.
            if received > 0 {
                let _ = self.token.transfer(self.config.custody, from, received);
            }
            return Err(EngineError::ShortTransfer {
                requested: amount,
                received,
            });
        }
        debug!(from = %from, amount, received, "pulled funds into custody");
        Ok(())
    }

    /// Push `amount` from custody to `to`.
    pub(crate) fn push_funds(&self, to: Address, amount: Amount) -> Result<(), EngineError> {
        if amount == 0 {
            return Ok(());
        }
        if !self.token.transfer(self.config.custody, to, amount) {
            return Err(EngineError::TransferFailed { to, amount });
        }
        debug!(to = %to, amount, "pushed funds out of custody");
        Ok(())
    }

    // ── events ──────────────────────────────────────────────────────────

    pub(crate) fn record(&mut self, event: EngineEvent) {
        self.events.push(event);
    }

    /// Boundary events in emission order.
    pub fn events(&self) -> &[EngineEvent] {
        &self.events
    }

    /// Export the boundary-event log as JSON lines for external indexers.
    pub fn export_events_json(&self) -> Result<String, EngineError> {
        let mut out = String::new();
        for event in &self.events {
            let line = serde_json::to_string(event)
                .map_err(|e| EngineError::Serialization(e.to_string()))?;
            out.push_str(&line);
            out.push('\n');
        }
        Ok(out)
    }

    // ── engine-level views ──────────────────────────────────────────────

    pub fn owner(&self) -> Address {
        self.config.owner
    }

    pub fn treasury(&self) -> Address {
        self.config.treasury
    }

    pub fn yield_manager(&self) -> Address {
        self.config.yield_manager
    }

    pub fn member_split_bps(&self) -> u16 {
        self.config.member_split_bps
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn circle_count(&self) -> usize {
        self.circles.len()
    }

    pub fn total_yield_principal(&self) -> Amount {
        self.total_yield_principal
    }

    // ── conservation audit ──────────────────────────────────────────────

    /// Check the value-conservation invariants for one circle:
    /// custody-backed obligations never exceed what was ever deposited, and
    /// the internal ledger balances to the cent.
    pub fn audit(&self, id: CircleId) -> Result<(), EngineError> {
        let circle = self.circle_ref(id)?;
        let obligations = circle
            .pending_total()
            .saturating_add(circle.insurance_pool)
            .saturating_add(circle.collateral_total())
            .saturating_add(circle.reward_pool.remaining);
        if obligations > circle.total_in {
            return Err(EngineError::InvariantViolation {
                reason: format!(
                    "obligations {} exceed total deposited {}",
                    obligations, circle.total_in
                ),
            });
        }

        // Contributions collected for the current round but not yet settled.
        let in_flight = if circle.status == CircleStatus::Active {
            circle
                .rounds
                .get(&circle.current_round)
                .filter(|r| !r.settled)
                .map(|r| circle.params.contribution_amount * r.deposit_count() as Amount)
                .unwrap_or(0)
        } else {
            0
        };

        let net_held = circle
            .total_in
            .checked_sub(circle.total_out)
            .and_then(|v| v.checked_sub(circle.yield_state.principal))
            .ok_or_else(|| EngineError::InvariantViolation {
                reason: "payouts or principal exceed deposits".to_string(),
            })?;
        let expected = obligations.saturating_add(in_flight);
        if net_held != expected {
            return Err(EngineError::InvariantViolation {
                reason: format!(
                    "ledger imbalance: custody holds {}, obligations {}",
                    net_held, expected
                ),
            });
        }
        Ok(())
    }
}
