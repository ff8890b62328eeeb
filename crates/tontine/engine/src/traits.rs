use tontine_types::{Address, Amount};

/// External fungible-value transfer boundary.
///
/// The engine never trusts the boolean result of a pull alone: it re-reads
/// `balance_of` before and after and treats the observed delta as the
/// transferred amount, rejecting short deltas. Implementations use interior
/// mutability; the engine is single-threaded by construction.
pub trait ValueTransfer {
    /// Pull `amount` from `from` into `to`, consuming `from`'s prior
    /// approval for `to`.
    fn transfer_from(&self, from: Address, to: Address, amount: Amount) -> bool;

    /// Move `amount` from `from` to `to` directly. The engine only calls
    /// this with its own custody account as `from`.
    fn transfer(&self, from: Address, to: Address, amount: Amount) -> bool;

    fn balance_of(&self, account: Address) -> Amount;

    fn approve(&self, owner: Address, spender: Address, amount: Amount);

    fn allowance(&self, owner: Address, spender: Address) -> Amount;
}

/// External yield-bearing deposit venue. Single-asset; one position per
/// holder. The venue is assumed never to take a larger share than requested.
pub trait YieldVenue {
    /// Move `amount` from `from` into the position owned by `on_behalf_of`.
    fn supply(&self, from: Address, amount: Amount, on_behalf_of: Address) -> bool;

    /// Withdraw up to `amount` from the caller's position to `to`; returns
    /// the amount actually withdrawn.
    fn withdraw(&self, amount: Amount, to: Address) -> Amount;

    /// Current value of `holder`'s position, principal plus accrued yield.
    fn position_value(&self, holder: Address) -> Amount;
}

/// Source of shuffle entropy.
///
/// The default production source is weak and publicly predictable (see
/// [`crate::memory::WeakEntropy`]); it removes simple first-joiner advantage
/// and nothing more. Swapping in a stronger source, or a seeded one for
/// deterministic replay, never touches settlement logic.
pub trait EntropySource {
    /// Draw 64 bits, domain-separated by `domain`.
    fn draw_u64(&mut self, domain: &[u8]) -> u64;
}

/// Wall-clock boundary. Every timestamp the engine compares against comes
/// through here, so tests can replay schedules deterministically.
pub trait Clock {
    fn now_secs(&self) -> u64;
}
