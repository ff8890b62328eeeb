//! Payout-order assignment: preset-order validation and the activation-time
//! shuffle.

use std::collections::HashSet;

use tontine_types::{Address, CircleId};

use crate::error::EngineError;
use crate::traits::EntropySource;

/// Check that a payout order has exactly `expected_len` distinct, non-zero
/// entries. Called once at creation for preset orders and once at the single
/// point where the final order is locked in.
pub fn validate_order(order: &[Address], expected_len: u32) -> Result<(), EngineError> {
    if order.len() != expected_len as usize {
        return Err(EngineError::InvalidPayoutOrder {
            reason: format!("expected {} entries, found {}", expected_len, order.len()),
        });
    }
    let mut seen = HashSet::with_capacity(order.len());
    for address in order {
        if address.is_zero() {
            return Err(EngineError::InvalidPayoutOrder {
                reason: "zero address entry".to_string(),
            });
        }
        if !seen.insert(*address) {
            return Err(EngineError::InvalidPayoutOrder {
                reason: format!("duplicate entry {}", address),
            });
        }
    }
    Ok(())
}

/// Fisher–Yates shuffle of the joined members into a payout order, drawing
/// one domain-separated value per swap.
///
/// This is not cryptographically secure: with the default entropy source the
/// draws are publicly predictable. The shuffle only removes the advantage of
/// joining first; a motivated participant who controls draw timing can bias
/// it. Callers who need more plug a stronger [`EntropySource`] in.
pub fn shuffle(
    members: &[Address],
    circle: CircleId,
    entropy: &mut dyn EntropySource,
) -> Vec<Address> {
    let mut order = members.to_vec();
    let count = order.len() as u64;
    for i in (1..order.len()).rev() {
        let mut domain = Vec::with_capacity(43);
        domain.extend_from_slice(b"tontine.rotation.v1");
        domain.extend_from_slice(&circle.as_u64().to_le_bytes());
        domain.extend_from_slice(&count.to_le_bytes());
        domain.extend_from_slice(&(i as u64).to_le_bytes());
        let j = (entropy.draw_u64(&domain) % (i as u64 + 1)) as usize;
        order.swap(i, j);
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::SeededEntropy;

    fn addr(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    fn members(n: u64) -> Vec<Address> {
        (1..=n).map(addr).collect()
    }

    #[test]
    fn validate_accepts_well_formed_order() {
        assert!(validate_order(&members(4), 4).is_ok());
    }

    #[test]
    fn validate_rejects_wrong_length() {
        assert!(matches!(
            validate_order(&members(3), 4),
            Err(EngineError::InvalidPayoutOrder { .. })
        ));
    }

    #[test]
    fn validate_rejects_zero_entry() {
        let mut order = members(4);
        order[2] = Address::ZERO;
        assert!(matches!(
            validate_order(&order, 4),
            Err(EngineError::InvalidPayoutOrder { .. })
        ));
    }

    #[test]
    fn validate_rejects_duplicates() {
        let mut order = members(4);
        order[3] = order[0];
        assert!(matches!(
            validate_order(&order, 4),
            Err(EngineError::InvalidPayoutOrder { .. })
        ));
    }

    #[test]
    fn shuffle_produces_a_permutation() {
        let input = members(20);
        let mut entropy = SeededEntropy::new(3);
        let shuffled = shuffle(&input, CircleId(1), &mut entropy);
        assert_eq!(shuffled.len(), input.len());
        let mut sorted = shuffled.clone();
        sorted.sort();
        assert_eq!(sorted, input);
    }

    #[test]
    fn shuffle_is_deterministic_for_a_seed() {
        let input = members(10);
        let mut a = SeededEntropy::new(11);
        let mut b = SeededEntropy::new(11);
        assert_eq!(
            shuffle(&input, CircleId(2), &mut a),
            shuffle(&input, CircleId(2), &mut b)
        );
    }

    #[test]
    fn shuffle_depends_on_circle_id() {
        let input = members(10);
        let mut a = SeededEntropy::new(11);
        let mut b = SeededEntropy::new(11);
        let first = shuffle(&input, CircleId(1), &mut a);
        let second = shuffle(&input, CircleId(2), &mut b);
        assert_ne!(first, second);
    }

    #[test]
    fn single_member_order_is_unchanged() {
        let input = members(1);
        let mut entropy = SeededEntropy::new(5);
        assert_eq!(shuffle(&input, CircleId(3), &mut entropy), input);
    }
}
