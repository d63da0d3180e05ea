//! Fixed-point helpers for the elastic index.
//!
//! All values are `u128` base units. No floating point anywhere: the
//! compounding debase path must be exactly reproducible, so every division
//! floors (or ceils, where named) and every operation is checked.

use crate::types::{BASIS_POINTS, SCALE};

/// `floor(a * b / denom)` without intermediate overflow where possible.
///
/// Falls back to splitting `a` into quotient and remainder of `denom` when
/// the direct product does not fit. Returns `None` on overflow or zero `denom`.
pub fn mul_div(a: u128, b: u128, denom: u128) -> Option<u128> {
    if denom == 0 {
        return None;
    }
    if let Some(product) = a.checked_mul(b) {
        return product.checked_div(denom);
    }
    // a = q * denom + r  =>  a * b / denom = q * b + r * b / denom (exact floor)
    let q = a.checked_div(denom)?;
    let r = a.checked_rem(denom)?;
    let head = q.checked_mul(b)?;
    let tail = r.checked_mul(b)?.checked_div(denom)?;
    head.checked_add(tail)
}

/// `ceil(a * b / denom)`.
pub fn mul_div_ceil(a: u128, b: u128, denom: u128) -> Option<u128> {
    let floor = mul_div(a, b, denom)?;
    // (a * b) mod denom == ((a mod denom) * b) mod denom
    let rem = a.checked_rem(denom)?.checked_mul(b)?.checked_rem(denom)?;
    if rem == 0 {
        Some(floor)
    } else {
        floor.checked_add(1)
    }
}

/// Holder-facing value of a raw amount: `raw * index / SCALE`.
pub fn to_effective(raw: u128, index: u128) -> Option<u128> {
    mul_div(raw, index, SCALE)
}

/// Raw units credited for a holder-facing amount, rounded down.
pub fn to_raw_floor(amount: u128, index: u128) -> Option<u128> {
    mul_div(amount, SCALE, index)
}

/// Raw units debited for a holder-facing amount, rounded up.
pub fn to_raw_ceil(amount: u128, index: u128) -> Option<u128> {
    mul_div_ceil(amount, SCALE, index)
}

/// `value * (10000 - rate_bp) / 10000`, floored. `None` if `rate_bp > 10000`.
pub fn reduce_by_bps(value: u128, rate_bp: u32) -> Option<u128> {
    let remaining = BASIS_POINTS.checked_sub(rate_bp)?;
    mul_div(value, u128::from(remaining), u128::from(BASIS_POINTS))
}

/// `value * (10000 + premium_bp) / 10000`, floored.
pub fn increase_by_bps(value: u128, premium_bp: u32) -> Option<u128> {
    let factor = BASIS_POINTS.checked_add(premium_bp)?;
    mul_div(value, u128::from(factor), u128::from(BASIS_POINTS))
}
