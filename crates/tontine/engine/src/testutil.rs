//! Shared fixtures for the unit-test modules.

use std::sync::Arc;

use tontine_types::{Address, Amount, CircleId, CircleParams};

use crate::engine::{CircleEngine, EngineConfig};
use crate::memory::{ManualClock, MockToken, MockVault, SeededEntropy};
use crate::traits::ValueTransfer;

pub const START_TS: u64 = 1_700_000_000;
pub const WEEK: u64 = 7 * 24 * 3600;
pub const GRACE: u64 = 3_600;

pub fn owner() -> Address {
    Address::from_low_u64(0xA1)
}

pub fn treasury() -> Address {
    Address::from_low_u64(0xA2)
}

pub fn manager() -> Address {
    Address::from_low_u64(0xA3)
}

pub fn custody() -> Address {
    Address::from_low_u64(0xA4)
}

pub fn asset() -> Address {
    Address::from_low_u64(0xA5)
}

pub fn vault_address() -> Address {
    Address::from_low_u64(0xA6)
}

pub fn creator() -> Address {
    Address::from_low_u64(50)
}

pub fn member(n: u64) -> Address {
    Address::from_low_u64(100 + n)
}

pub struct Rig {
    pub engine: CircleEngine,
    pub token: Arc<MockToken>,
    pub vault: Arc<MockVault>,
    pub clock: Arc<ManualClock>,
}

pub fn rig() -> Rig {
    rig_with_token(Arc::new(MockToken::new()))
}

pub fn rig_with_token(token: Arc<MockToken>) -> Rig {
    let vault = Arc::new(MockVault::new(token.clone(), vault_address(), custody()));
    let clock = Arc::new(ManualClock::new(START_TS));
    let config = EngineConfig::standard(owner(), treasury(), manager(), custody(), asset());
    let engine = CircleEngine::new(
        config,
        token.clone(),
        vault.clone(),
        clock.clone(),
        Box::new(SeededEntropy::new(42)),
    )
    .expect("engine config is valid");
    Rig {
        engine,
        token,
        vault,
        clock,
    }
}

pub fn params(contribution: Amount, max_members: u32) -> CircleParams {
    CircleParams {
        asset: asset(),
        contribution_amount: contribution,
        period_secs: WEEK,
        max_members,
        collateral_factor: 2,
        insurance_fee: 5,
        grace_secs: GRACE,
        creator_reward: 0,
        payout_order: None,
    }
}

/// Mint a comfortable budget and approve the custody account to pull it.
pub fn fund(rig: &Rig, who: Address) {
    rig.token.mint(who, 1_000_000);
    rig.token.approve(who, custody(), 1_000_000);
}

pub fn fund_and_join(rig: &mut Rig, id: CircleId, who: Address) {
    fund(rig, who);
    rig.engine.join_circle(who, id).expect("join");
}

/// Create a circle with the given parameters and fill it with
/// `member(1)..=member(max_members)`.
pub fn activated_circle_with(rig: &mut Rig, p: CircleParams) -> CircleId {
    let n = p.max_members as u64;
    let id = rig.engine.create_circle(creator(), p).expect("create");
    for i in 1..=n {
        fund_and_join(rig, id, member(i));
    }
    id
}

pub fn activated_circle(rig: &mut Rig, contribution: Amount, max_members: u32) -> CircleId {
    activated_circle_with(rig, params(contribution, max_members))
}

/// Everyone except `skip` contributes for the current round. When nobody is
/// skipped the last deposit settles the round.
pub fn contribute_all_except(rig: &mut Rig, id: CircleId, skip: Option<Address>) {
    let members = rig.engine.circle(id).expect("circle").member_order.clone();
    for m in members {
        if Some(m) == skip {
            continue;
        }
        rig.engine.contribute(m, id).expect("contribute");
    }
}

/// Move the clock to the current round's expiry deadline.
pub fn expire_current_round(rig: &mut Rig, id: CircleId) {
    let deadline = {
        let circle = rig.engine.circle(id).expect("circle");
        circle.round_deadline(circle.current_round)
    };
    rig.clock.set(deadline);
}

/// Run a 4-member circle to completion with exactly one default in round 2
/// (by the member in payout position 2). Returns the circle and the
/// defaulter.
pub fn completed_circle_with_one_default(rig: &mut Rig, reward: Amount) -> (CircleId, Address) {
    let mut p = params(100, 4);
    p.creator_reward = reward;
    fund(rig, creator());
    let id = activated_circle_with(rig, p);
    let defaulter = rig.engine.payout_order(id).expect("order")[1];

    contribute_all_except(rig, id, None);
    contribute_all_except(rig, id, Some(defaulter));
    expire_current_round(rig, id);
    rig.engine.finalize_expired(id).expect("finalize round 2");
    contribute_all_except(rig, id, None);
    contribute_all_except(rig, id, None);
    (id, defaulter)
}
