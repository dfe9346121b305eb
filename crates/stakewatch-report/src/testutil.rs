//! Shared fixtures for calculator tests.

use std::sync::Arc;

use stakewatch_core::{Entity, LedgerTransaction, NewEntity, TxKind};
use stakewatch_ingest::{EntityRegistry, LedgerStore, SqliteStore};

pub use stakewatch_core::REWARD_SOURCE_ADDRESS;

pub const ADDRESS: &str = "CZMNXX6Z4EFY2I66O5ZLYJVE3E3WI3FAIGKCGZ7P6ZDTBSXY7BWW7TGS5Y";
pub const OTHER: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

/// Bootstrap time used by the scenarios.
pub const T0: i64 = 1_700_000_000;

pub fn setup(initial_balance: u64) -> (Arc<SqliteStore>, Entity) {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let entity = store
        .register(NewEntity {
            address: ADDRESS.to_string(),
            display_name: Some("validator".to_string()),
            initial_balance,
        })
        .unwrap();
    (store, entity)
}

pub fn registration(id: &str, round: u64, occurred_at: i64, fee: u64) -> LedgerTransaction {
    LedgerTransaction {
        transaction_id: id.to_string(),
        entity_address: ADDRESS.to_string(),
        kind: TxKind::Registration,
        sender: ADDRESS.to_string(),
        receiver: None,
        amount: 0,
        fee,
        confirmed_round: round,
        occurred_at,
        note: None,
    }
}

#[allow(clippy::too_many_arguments)]
pub fn transfer(
    id: &str,
    round: u64,
    occurred_at: i64,
    sender: &str,
    receiver: &str,
    amount: u64,
    fee: u64,
    note: Option<&str>,
) -> LedgerTransaction {
    LedgerTransaction {
        transaction_id: id.to_string(),
        entity_address: ADDRESS.to_string(),
        kind: TxKind::Transfer,
        sender: sender.to_string(),
        receiver: Some(receiver.to_string()),
        amount,
        fee,
        confirmed_round: round,
        occurred_at,
        note: note.map(str::to_string),
    }
}

/// Initial balance 1,000,000 units; registration at round 5 and `T0` with a
/// 2 unit fee; one 50,000 unit proposer payout a day later.
pub fn scenario_without_recorded_bootstrap() -> (Arc<SqliteStore>, Entity) {
    let (store, entity) = setup(1_000_000_000_000);
    store
        .insert_if_absent(&registration("REG", 5, T0, 2_000_000))
        .unwrap();
    store
        .insert_if_absent(&transfer(
            "PAYOUT",
            6,
            T0 + 86_400,
            REWARD_SOURCE_ADDRESS,
            ADDRESS,
            50_000_000_000,
            0,
            Some("ProposerPayout for round 6"),
        ))
        .unwrap();
    (store, entity)
}

/// [`scenario_without_recorded_bootstrap`] with the registration recorded
/// as the bootstrap.
pub fn scenario() -> (Arc<SqliteStore>, Entity) {
    let (store, _) = scenario_without_recorded_bootstrap();
    store.set_bootstrap_once(ADDRESS, "REG").unwrap();
    let entity = store.get(ADDRESS).unwrap().unwrap();
    (store, entity)
}
