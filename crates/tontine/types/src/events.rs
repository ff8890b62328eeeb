use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::ids::{Amount, CircleId};

/// Scope of a ban.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BanScope {
    /// Within one circle only.
    Circle,
    /// Across all circles; blocks joining any new circle.
    Global,
}

/// Boundary events appended by the engine and consumed by external indexers
/// and UIs. The engine itself never reads them back.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EngineEvent {
    CircleCreated {
        circle: CircleId,
        creator: Address,
        contribution: Amount,
        max_members: u32,
    },
    MemberJoined {
        circle: CircleId,
        member: Address,
        collateral: Amount,
        insurance: Amount,
    },
    MemberLeft {
        circle: CircleId,
        member: Address,
        refunded: Amount,
    },
    PayoutOrderSet {
        circle: CircleId,
        order: Vec<Address>,
        shuffled: bool,
    },
    CircleActivated {
        circle: CircleId,
        start_ts: u64,
    },
    RoundStarted {
        circle: CircleId,
        round: u32,
        round_start: u64,
    },
    ContributionMade {
        circle: CircleId,
        round: u32,
        member: Address,
        amount: Amount,
    },
    DefaultDetected {
        circle: CircleId,
        round: u32,
        member: Address,
        slashed: Amount,
        local_defaults: u32,
        global_defaults: u32,
    },
    MemberBanned {
        circle: CircleId,
        member: Address,
        scope: BanScope,
    },
    WinnerSelected {
        circle: CircleId,
        round: u32,
        winner: Address,
        pot: Amount,
        insurance_drawn: Amount,
    },
    CircleCompleted {
        circle: CircleId,
    },
    CircleCancelled {
        circle: CircleId,
        refunded_members: u32,
    },
    PayoutClaimed {
        circle: CircleId,
        member: Address,
        amount: Amount,
    },
    CollateralWithdrawn {
        circle: CircleId,
        member: Address,
        amount: Amount,
    },
    EmergencyWithdrawal {
        circle: CircleId,
        to: Address,
        amount: Amount,
    },
    YieldToggled {
        circle: CircleId,
        enabled: bool,
    },
    YieldDeposited {
        circle: CircleId,
        amount: Amount,
        principal: Amount,
    },
    YieldWithdrawn {
        circle: CircleId,
        amount: Amount,
        principal: Amount,
    },
    YieldHarvested {
        circle: CircleId,
        gross: Amount,
        member_share: Amount,
        treasury_share: Amount,
    },
    YieldClaimed {
        circle: CircleId,
        member: Address,
        amount: Amount,
    },
    CreatorRewardFunded {
        circle: CircleId,
        amount: Amount,
    },
    CreatorRewardClaimed {
        circle: CircleId,
        member: Address,
        amount: Amount,
    },
    Paused,
    Unpaused,
    OwnershipTransferred {
        from: Address,
        to: Address,
    },
    YieldManagerChanged {
        manager: Address,
    },
    TreasuryChanged {
        treasury: Address,
    },
    SplitChanged {
        member_bps: u16,
    },
}
