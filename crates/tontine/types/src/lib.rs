//! Core type definitions for the tontine engine.
//!
//! This crate provides the shared records every engine module works against:
//! - account and circle identifiers (`Address`, `CircleId`, `Amount`)
//! - circle lifecycle records (`Circle`, `MemberRecord`, `RoundState`)
//! - satellite-module state (`YieldState`, `RewardPool`, `GlobalReputation`)
//! - boundary events consumed by external indexers (`EngineEvent`)

pub mod address;
pub mod circle;
pub mod events;
pub mod ids;

// Re-export primary types at crate root for ergonomic use.
pub use address::Address;
pub use circle::{
    Circle, CircleParams, CircleStatus, GlobalReputation, MemberRecord, RewardPool, RoundState,
    YieldState,
};
pub use events::{BanScope, EngineEvent};
pub use ids::{Amount, CircleId};

#[cfg(test)]
mod tests {
    use super::{Address, CircleId};

    #[test]
    fn primary_types_are_available() {
        let _ = Address::ZERO;
        let _ = CircleId(1);
    }
}
