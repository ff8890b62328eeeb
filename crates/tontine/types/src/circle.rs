use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::ids::{Amount, CircleId};

/// Lifecycle of a savings circle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircleStatus {
    /// Accepting members, not yet started.
    Open,
    /// Rounds in progress.
    Active,
    /// Every round settled.
    Completed,
    /// Cancelled while still open; joined members refunded via the
    /// pending-payout ledger.
    Cancelled,
}

/// Economic parameters fixed at creation time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CircleParams {
    /// Fungible asset the circle settles in. Must match the engine's asset.
    pub asset: Address,
    /// Per-member, per-round contribution.
    pub contribution_amount: Amount,
    /// Length of one round in seconds.
    pub period_secs: u64,
    /// Fixed membership size; also the number of rounds.
    pub max_members: u32,
    /// Collateral locked at join = `contribution_amount * collateral_factor`.
    pub collateral_factor: u32,
    /// One-off insurance fee collected at join.
    pub insurance_fee: Amount,
    /// Extra window after a round's deadline before expiry settlement opens.
    pub grace_secs: u64,
    /// Organizer-funded bonus for members finishing with zero defaults.
    pub creator_reward: Amount,
    /// Explicit payout order. When set it also acts as the join allowlist,
    /// so a full circle is always a permutation of the preset order.
    pub payout_order: Option<Vec<Address>>,
}

impl CircleParams {
    /// Collateral a joining member must lock.
    pub fn collateral_requirement(&self) -> Option<Amount> {
        self.contribution_amount
            .checked_mul(self.collateral_factor as Amount)
    }

    /// Pot size of a fully funded round.
    pub fn expected_pot(&self) -> Option<Amount> {
        self.contribution_amount.checked_mul(self.max_members as Amount)
    }
}

/// Per-member bookkeeping inside one circle.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub joined_at: u64,
    /// Local ban flag, set at the default threshold. Informational within the
    /// circle; the defaulted rounds are already handled by settlement.
    pub banned: bool,
    /// Missed-round count within this circle. Saturating, never reset.
    pub defaults: u32,
    /// Remaining locked collateral. Only ever decreases after join.
    pub collateral_locked: Amount,
    pub insurance_contributed: Amount,
    pub collateral_withdrawn: bool,
    pub reward_claimed: bool,
    /// Harvested yield claimable by this member, held at the yield venue.
    pub yield_claimable: Amount,
}

/// Per-round bookkeeping. Once `settled` is set the record never changes
/// again; it persists for audit after the circle completes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundState {
    pub round: u32,
    pub deposited: HashSet<Address>,
    pub defaulted: HashSet<Address>,
    pub winner: Option<Address>,
    pub pot: Amount,
    /// Insurance drawn to top up an under-funded pot.
    pub insurance_drawn: Amount,
    pub settled: bool,
}

impl RoundState {
    pub fn new(round: u32) -> Self {
        Self {
            round,
            ..Self::default()
        }
    }

    pub fn deposit_count(&self) -> u32 {
        self.deposited.len() as u32
    }
}

/// Organizer-funded bonus pool for members with a perfect payment record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardPool {
    /// Amount funded at creation. Fixed; every claim divides this value.
    pub funded: Amount,
    /// Remaining balance, decremented per claim. Never negative.
    pub remaining: Amount,
}

/// External yield position bookkeeping for one circle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct YieldState {
    pub enabled: bool,
    /// Insurance principal parked at the yield venue.
    pub principal: Amount,
    /// Proportional position value observed at the last sync point. Growth
    /// beyond this snapshot is pending yield.
    pub last_value: Amount,
    /// Harvested member share not yet claimed, held at the venue.
    pub members_accrued: Amount,
}

/// Cross-circle reputation for one address. Counters are monotonic and the
/// ban flag, once set, never clears.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalReputation {
    pub defaults: u32,
    pub banned: bool,
}

/// One savings circle and all the state it owns: membership, rotation order,
/// round records, and the ledgers settlement writes to.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Circle {
    pub id: CircleId,
    pub creator: Address,
    pub params: CircleParams,
    pub status: CircleStatus,
    pub created_at: u64,
    /// Set when the circle activates.
    pub start_ts: u64,
    /// 0 before activation; `max_members + 1` marks completion.
    pub current_round: u32,
    pub rotation_locked: bool,
    /// Join order. Default scans walk this for deterministic iteration.
    pub member_order: Vec<Address>,
    pub members: HashMap<Address, MemberRecord>,
    pub payout_order: Vec<Address>,
    pub rounds: BTreeMap<u32, RoundState>,
    /// Insurance fees plus slashed collateral not yet paid out or parked at
    /// the yield venue.
    pub insurance_pool: Amount,
    /// Pull-payment credits awaiting claims.
    pub pending_payouts: HashMap<Address, Amount>,
    pub reward_pool: RewardPool,
    pub yield_state: YieldState,
    /// Total value ever pulled into custody for this circle.
    pub total_in: Amount,
    /// Total value pushed out of custody for this circle.
    pub total_out: Amount,
}

impl Circle {
    pub fn new(id: CircleId, creator: Address, params: CircleParams, now: u64) -> Self {
        let reward_pool = RewardPool {
            funded: params.creator_reward,
            remaining: params.creator_reward,
        };
        Self {
            id,
            creator,
            params,
            status: CircleStatus::Open,
            created_at: now,
            start_ts: 0,
            current_round: 0,
            rotation_locked: false,
            member_order: Vec::new(),
            members: HashMap::new(),
            payout_order: Vec::new(),
            rounds: BTreeMap::new(),
            insurance_pool: 0,
            pending_payouts: HashMap::new(),
            reward_pool,
            yield_state: YieldState::default(),
            total_in: 0,
            total_out: 0,
        }
    }

    pub fn member_count(&self) -> u32 {
        self.member_order.len() as u32
    }

    pub fn is_full(&self) -> bool {
        self.member_count() >= self.params.max_members
    }

    pub fn is_member(&self, address: &Address) -> bool {
        self.members.contains_key(address)
    }

    /// Number of the final round.
    pub fn last_round(&self) -> u32 {
        self.params.max_members
    }

    /// Start of a round on the fixed schedule
    /// `start_ts + (round - 1) * period`. Recomputed from the start
    /// timestamp every time so repeated late settlements cannot drift.
    pub fn round_start(&self, round: u32) -> u64 {
        self.start_ts
            .saturating_add((round.saturating_sub(1) as u64).saturating_mul(self.params.period_secs))
    }

    /// Instant from which expiry settlement of `round` may be triggered.
    pub fn round_deadline(&self, round: u32) -> u64 {
        self.round_start(round)
            .saturating_add(self.params.period_secs)
            .saturating_add(self.params.grace_secs)
    }

    pub fn pending_total(&self) -> Amount {
        self.pending_payouts
            .values()
            .fold(0, |acc, v| acc.saturating_add(*v))
    }

    pub fn collateral_total(&self) -> Amount {
        self.members
            .values()
            .fold(0, |acc, m| acc.saturating_add(m.collateral_locked))
    }
}
