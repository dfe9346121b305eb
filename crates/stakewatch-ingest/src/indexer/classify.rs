//! Classification of raw indexer records into ledger transactions.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use stakewatch_core::{BOOTSTRAP_FEE_THRESHOLD, LedgerTransaction, TxKind};

use super::RawTransaction;
use crate::{Error, Result};

/// Indexer type tag of a payment.
pub const PAYMENT_TYPE: &str = "pay";

/// Indexer type tag of a participation key registration.
pub const KEYREG_TYPE: &str = "keyreg";

/// Classify a raw record fetched for `entity_address`.
///
/// - `keyreg` sent by the entity with a fee of at least
///   [`BOOTSTRAP_FEE_THRESHOLD`] becomes a `Registration`
/// - `pay` becomes a `Transfer` with amount, receiver and decoded note
/// - anything else is `Other` and yields `Ok(None)`
///
/// Records missing the fields their kind requires, or carrying values that
/// don't fit the store, are `Error::Malformed`.
pub fn classify(raw: &RawTransaction, entity_address: &str) -> Result<Option<LedgerTransaction>> {
    let id = raw
        .id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| malformed(None, "missing id"))?;
    let malformed_here = |reason: &str| malformed(Some(id), reason);

    let tx_type = raw
        .tx_type
        .as_deref()
        .ok_or_else(|| malformed_here("missing tx-type"))?;

    if tx_type != PAYMENT_TYPE && tx_type != KEYREG_TYPE {
        return Ok(None);
    }

    let sender = raw
        .sender
        .as_deref()
        .ok_or_else(|| malformed_here("missing sender"))?;
    let fee = raw.fee.ok_or_else(|| malformed_here("missing fee"))?;
    let confirmed_round = raw
        .confirmed_round
        .ok_or_else(|| malformed_here("missing confirmed-round"))?;
    let round_time = raw
        .round_time
        .ok_or_else(|| malformed_here("missing round-time"))?;

    check_range(id, "fee", fee)?;
    check_range(id, "confirmed-round", confirmed_round)?;
    let occurred_at = check_range(id, "round-time", round_time)?;

    let (kind, receiver, amount) = if tx_type == KEYREG_TYPE {
        if sender != entity_address || fee < BOOTSTRAP_FEE_THRESHOLD {
            return Ok(None);
        }
        (TxKind::Registration, None, 0)
    } else {
        let payment = raw
            .payment_transaction
            .as_ref()
            .ok_or_else(|| malformed_here("pay without payment-transaction"))?;
        let amount = payment
            .amount
            .ok_or_else(|| malformed_here("missing payment amount"))?;
        let receiver = payment
            .receiver
            .clone()
            .ok_or_else(|| malformed_here("missing payment receiver"))?;
        check_range(id, "amount", amount)?;
        (TxKind::Transfer, Some(receiver), amount)
    };

    let note = match raw.note.as_deref() {
        Some(encoded) => decode_note(encoded).map_err(|e| malformed_here(&e))?,
        None => None,
    };

    Ok(Some(LedgerTransaction {
        transaction_id: id.to_string(),
        entity_address: entity_address.to_string(),
        kind,
        sender: sender.to_string(),
        receiver,
        amount,
        fee,
        confirmed_round,
        occurred_at,
        note,
    }))
}

/// Decode a base64 note into text. Invalid UTF-8 is replaced, empty notes are `None`.
fn decode_note(encoded: &str) -> std::result::Result<Option<String>, String> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| format!("note is not valid base64: {}", e))?;
    if bytes.is_empty() {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
}

/// SQLite integers are signed; reject values above `i64::MAX`.
fn check_range(id: &str, field: &str, value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| {
        malformed(
            Some(id),
            &format!("{} {} exceeds the storable range", field, value),
        )
    })
}

fn malformed(id: Option<&str>, reason: &str) -> Error {
    Error::Malformed {
        id: id.map(str::to_string),
        reason: reason.to_string(),
    }
}
