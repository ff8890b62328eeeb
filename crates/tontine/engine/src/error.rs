use thiserror::Error;

use tontine_types::{Address, Amount, CircleId, CircleStatus};

/// Errors returned by engine entry points.
///
/// Every error aborts the whole operation; any bookkeeping touched before the
/// failure is rolled back before the error is returned. Messages are stable
/// per condition so off-system tooling can distinguish, say, "not yet your
/// turn" from "insufficient allowance".
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    // ── validation ─────────────────────────────────────────────────────

    #[error("zero address not allowed")]
    ZeroAddress,

    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("asset mismatch: engine settles {expected}, circle requested {requested}")]
    AssetMismatch { expected: Address, requested: Address },

    #[error("period too short: minimum {min_secs}s, requested {requested_secs}s")]
    PeriodTooShort { min_secs: u64, requested_secs: u64 },

    #[error("member count out of bounds: allowed {min}..={max}, requested {requested}")]
    MemberCountOutOfBounds { min: u32, max: u32, requested: u32 },

    #[error("collateral factor must be at least 1")]
    CollateralFactorZero,

    #[error("invalid payout order: {reason}")]
    InvalidPayoutOrder { reason: String },

    #[error("invalid split: {bps} bps exceeds the denominator")]
    InvalidSplit { bps: u16 },

    // ── state ──────────────────────────────────────────────────────────

    #[error("{0} not found")]
    CircleNotFound(CircleId),

    #[error("circle is not open (status {status:?})")]
    CircleNotOpen { status: CircleStatus },

    #[error("circle is not active (status {status:?})")]
    CircleNotActive { status: CircleStatus },

    #[error("circle is not completed (status {status:?})")]
    CircleNotCompleted { status: CircleStatus },

    #[error("circle is not cancelled (status {status:?})")]
    CircleNotCancelled { status: CircleStatus },

    #[error("circle is still running (status {status:?})")]
    CircleStillRunning { status: CircleStatus },

    #[error("circle is full")]
    CircleFull,

    #[error("already a member of this circle")]
    AlreadyJoined,

    #[error("not a member of this circle")]
    NotMember,

    #[error("already deposited for round {round}")]
    AlreadyDeposited { round: u32 },

    #[error("round {round} already settled")]
    RoundSettled { round: u32 },

    #[error("round {round} not found")]
    RoundNotFound { round: u32 },

    #[error("round {round} not yet expired: now {now}, deadline {deadline}")]
    RoundNotExpired { round: u32, now: u64, deadline: u64 },

    #[error("nothing pending to claim")]
    NothingPending,

    #[error("collateral already withdrawn")]
    CollateralAlreadyWithdrawn,

    #[error("nothing to withdraw")]
    NothingToWithdraw,

    #[error("creator reward already claimed")]
    RewardAlreadyClaimed,

    #[error("not eligible for the creator reward: {defaults} default(s) on record")]
    NotEligibleForReward { defaults: u32 },

    #[error("no members eligible for the creator reward")]
    NoEligibleMembers,

    #[error("creator reward share rounds to zero")]
    RewardShareZero,

    #[error("yield is not enabled for this circle")]
    YieldDisabled,

    #[error("no pending yield to harvest")]
    NoPendingYield,

    #[error("no yield claimable")]
    NoYieldClaimable,

    #[error("yield principal insufficient: principal {principal}, requested {requested}")]
    InsufficientPrincipal { principal: Amount, requested: Amount },

    #[error("insurance pool insufficient: available {available}, requested {requested}")]
    InsufficientInsurance { available: Amount, requested: Amount },

    // ── access control ─────────────────────────────────────────────────

    #[error("caller is not the engine owner")]
    NotOwner,

    #[error("caller is not the circle creator")]
    NotCreator,

    #[error("caller is not the yield manager")]
    NotYieldManager,

    #[error("member is banned from joining new circles")]
    Banned,

    #[error("member is not on the preset payout order")]
    NotOnPayoutOrder,

    #[error("engine is paused")]
    EnginePaused,

    #[error("reentrant call rejected")]
    ReentrantCall,

    // ── fund transfer ──────────────────────────────────────────────────

    #[error("short transfer: requested {requested}, observed delta {received}")]
    ShortTransfer { requested: Amount, received: Amount },

    #[error("transfer of {amount} to {to} failed")]
    TransferFailed { to: Address, amount: Amount },

    #[error("yield venue rejected the deposit")]
    VaultRejected,

    #[error("short venue withdrawal: requested {requested}, received {received}")]
    ShortVaultWithdrawal { requested: Amount, received: Amount },

    // ── invariant guards ───────────────────────────────────────────────

    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    #[error(
        "obligations outstanding: pending {pending}, insurance {insurance}, \
         principal {principal}, member yield {member_yield}"
    )]
    ObligationsOutstanding {
        pending: Amount,
        insurance: Amount,
        principal: Amount,
        member_yield: Amount,
    },

    #[error("invariant violation: {reason}")]
    InvariantViolation { reason: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}
