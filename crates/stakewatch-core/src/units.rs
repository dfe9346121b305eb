//! Conversion between micro-units and display units.
//!
//! Ledger amounts are integers in micro-units end to end. Conversion to
//! decimal display units happens only when a report is rendered, through
//! [`micro_to_units`], which is exact (scale 6, no floating point).

use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::error::{Error, Result};

/// Micro-units per display unit.
pub const MICROS_PER_UNIT: u64 = 1_000_000;

/// Decimal places of the display unit.
const UNIT_SCALE: u32 = 6;

/// Convert a micro-unit amount to display units.
///
/// Values beyond the 96-bit decimal mantissa saturate to `Decimal::MAX` / `Decimal::MIN`.
pub fn micro_to_units(micro: i128) -> Decimal {
    Decimal::try_from_i128_with_scale(micro, UNIT_SCALE).unwrap_or(if micro < 0 {
        Decimal::MIN
    } else {
        Decimal::MAX
    })
}

/// Convert a micro-unit integer to an unscaled decimal, for ratio arithmetic.
pub fn micro_decimal(micro: i128) -> Decimal {
    Decimal::try_from_i128_with_scale(micro, 0).unwrap_or(if micro < 0 {
        Decimal::MIN
    } else {
        Decimal::MAX
    })
}

/// Parse a display-unit amount (e.g. `"302935.133775"`) into micro-units.
///
/// Rejects negative values and more than six fractional digits.
pub fn parse_units(input: &str) -> Result<u64> {
    let invalid = |reason: &str| Error::InvalidAmount {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let value = Decimal::from_str(input.trim()).map_err(|e| invalid(&e.to_string()))?;
    if value.is_sign_negative() && !value.is_zero() {
        return Err(invalid("amount must not be negative"));
    }

    let micro = value
        .checked_mul(Decimal::from(MICROS_PER_UNIT))
        .ok_or_else(|| invalid("amount is too large"))?;
    if !micro.fract().is_zero() {
        return Err(invalid("more than 6 decimal places"));
    }

    micro
        .to_u64()
        .ok_or_else(|| invalid("amount does not fit in 64 bits"))
}
