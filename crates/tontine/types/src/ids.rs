use std::fmt;

use serde::{Deserialize, Serialize};

/// Arena index of a circle. Allocated sequentially by the engine, starting
/// at 1. The circle record owns all of its nested state; the id is the only
/// handle handed out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CircleId(pub u64);

impl CircleId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CircleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "circle-{}", self.0)
    }
}

/// Value in the smallest unit of the settlement asset.
///
/// All engine arithmetic on amounts is checked before funds move and
/// saturating afterwards; an amount never goes negative.
pub type Amount = u128;
