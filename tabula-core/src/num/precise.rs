// Tabula
// Copyright (c) 2026 The Project Tabula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Exact rational arithmetic for the precise numeric back-end.
//!
//! Every finite IEEE-754 double is the rational `m · 2^e` with integer `m`, so both directions
//! of the codec reduce to big-integer work: parsing scales an exact base-`b` mantissa into a
//! correctly-rounded double, and formatting generates base-`b` digits of the exact binary value
//! by long division.

use std::cmp::Ordering;

use num_bigint::BigUint;
use num_traits::{One, ToPrimitive, Zero};

use crate::errors::{number_error, NumberErrorKind, Result};

/// `2^n` for `n` in `[-1074, 1023]`. Exact; the subnormal range is reached through the raw bit
/// pattern rather than `powi`, which underflows through an intermediate.
pub(crate) fn pow2(n: i32) -> f64 {
    debug_assert!(n >= -1074 && n <= 1023);
    if n >= -1022 {
        f64::from_bits(((n + 1023) as u64) << 52)
    }
    else {
        f64::from_bits(1u64 << (n + 1074))
    }
}

/// `base^exp` as a big integer.
pub(crate) fn big_pow(base: u32, exp: u32) -> BigUint {
    BigUint::from(base).pow(exp)
}

/// The exact decomposition `|value| = m · 2^e` of a finite double.
pub(crate) fn decompose(value: f64) -> (u64, i32) {
    let bits = value.to_bits();
    let biased = ((bits >> 52) & 0x7ff) as i32;
    let frac = bits & 0x000f_ffff_ffff_ffff;

    if biased == 0 {
        (frac, -1074)
    }
    else {
        (frac | (1 << 52), biased - 1075)
    }
}

/// Rounds the positive rational `num / den` to the nearest double, ties to even.
///
/// Returns the rounded value and an inexact flag. Fails with `Overflow` when the value exceeds
/// the finite range, and with `Underflow` when it vanishes to zero.
pub(crate) fn ratio_to_f64(num: &BigUint, den: &BigUint) -> Result<(f64, bool)> {
    if num.is_zero() {
        return Ok((0.0, false));
    }

    let nb = num.bits() as i64;
    let db = den.bits() as i64;

    // Scale so the quotient carries at least 55 significant bits: enough for the 53-bit
    // significand, the round bit, and one slack bit from the log2 estimate.
    let extra = 55 - (nb - db);

    let (q, sticky_rem) = if extra >= 0 {
        let scaled = num << extra as u64;
        let q = &scaled / den;
        let r = scaled - &q * den;
        (q, !r.is_zero())
    }
    else {
        let scaled = den << (-extra) as u64;
        let q = num / &scaled;
        let r = num - &q * &scaled;
        (q, !r.is_zero())
    };

    // value = q * 2^(-extra), with floor(log2(value)) = e.
    let qb = q.bits() as i64;
    let e = qb - 1 - extra;

    if e > 1023 {
        return number_error(NumberErrorKind::Overflow);
    }

    // Significand bits available at this magnitude. Below the normal range the leading bits of
    // the significand are forced to zero, which shortens the precision.
    let prec = if e >= -1022 { 53 } else { 53 + 1022 + e };

    if prec < 1 {
        // Halfway into the first representable subnormal: 2^-1075 exactly rounds to zero
        // (even), anything above it rounds up.
        if e == -1075 && (sticky_rem || q.count_ones() > 1) {
            return Ok((f64::from_bits(1), true));
        }
        return number_error(NumberErrorKind::Underflow);
    }

    let drop = (qb - prec) as u64;
    let round_bit = q.bit(drop - 1);
    let below = &q & ((BigUint::one() << (drop - 1)) - 1u32);
    let sticky = sticky_rem || !below.is_zero();

    let mut keep = (&q >> drop).iter_u64_digits().next().unwrap_or(0);
    let mut shift = (drop as i64) - extra;

    if round_bit && (sticky || keep & 1 == 1) {
        keep += 1;
        if keep >> prec != 0 {
            keep >>= 1;
            shift += 1;
        }
    }

    if shift > 1023 {
        return number_error(NumberErrorKind::Overflow);
    }

    // keep < 2^53 and 2^shift is representable, so this product is exact.
    let value = (keep as f64) * pow2(shift as i32);

    if value.is_infinite() {
        return number_error(NumberErrorKind::Overflow);
    }
    if value == 0.0 {
        return number_error(NumberErrorKind::Underflow);
    }

    Ok((value, sticky || round_bit))
}

/// Rounds a positive big integer to the nearest double, ties to even.
pub(crate) fn big_to_f64(n: &BigUint) -> Result<(f64, bool)> {
    ratio_to_f64(n, &BigUint::one())
}

/// Generates the `k` most significant base-`base` digits of `|value|`, rounded half-even at the
/// `k`-th digit, with insignificant trailing zeros stripped.
///
/// Returns the digits and the normalized exponent `E` such that `|value| = 0.d₁…dₘ · base^E`.
pub(crate) fn digits_exact(value: f64, base: u32, k: usize) -> (Vec<u8>, i32) {
    debug_assert!(value.is_finite() && value != 0.0);
    debug_assert!(k >= 1);

    let (m2, e2) = decompose(value);

    let (mut num, mut den) = if e2 >= 0 {
        (BigUint::from(m2) << e2 as u64, BigUint::one())
    }
    else {
        (BigUint::from(m2), BigUint::one() << (-e2) as u64)
    };

    let big_base = BigUint::from(base);
    let mut scale = 0i32;

    // Normalize the fraction into [1/base, 1).
    while num >= den {
        den *= &big_base;
        scale += 1;
    }
    loop {
        let up = &num * &big_base;
        if up >= den {
            break;
        }
        num = up;
        scale -= 1;
    }

    let mut digits = Vec::with_capacity(k);

    for _ in 0..k {
        num *= &big_base;
        let d = &num / &den;
        num -= &d * &den;
        digits.push(d.to_u8().unwrap_or(0));
    }

    // The remainder is exact, so a tie is exactly representable and half-even applies.
    let round_up = match (num << 1u32).cmp(&den) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => digits.last().map_or(false, |d| d & 1 == 1),
    };

    if round_up {
        let mut carry = true;
        for d in digits.iter_mut().rev() {
            if u32::from(*d) + 1 == base {
                *d = 0;
            }
            else {
                *d += 1;
                carry = false;
                break;
            }
        }
        if carry {
            digits.truncate(k - 1);
            digits.insert(0, 1);
            scale += 1;
        }
    }

    while digits.len() > 1 && digits.last() == Some(&0) {
        digits.pop();
    }

    (digits, scale)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_pow2() {
        assert_eq!(pow2(0), 1.0);
        assert_eq!(pow2(10), 1024.0);
        assert_eq!(pow2(-1), 0.5);
        assert_eq!(pow2(1023), f64::MAX / (2.0 - f64::EPSILON));
        assert_eq!(pow2(-1074), f64::from_bits(1));
        assert_eq!(pow2(-1022), f64::MIN_POSITIVE);
    }

    #[test]
    fn verify_decompose_is_exact() {
        for value in [1.0, 0.1, 1e-320, f64::MAX, f64::MIN_POSITIVE, 3.5e10] {
            let (m, e) = decompose(value);
            let rebuilt = if e >= 0 {
                (m as f64) * pow2(e.min(1023))
            }
            else {
                (m as f64) * pow2(e)
            };
            assert_eq!(rebuilt, value, "decompose({}) mismatched", value);
        }
    }

    #[test]
    fn verify_ratio_round_trips_doubles() {
        for value in [1.0, 0.5, 0.1, 123456789.25, 1e-300, 1e300, 2.2250738585072014e-308] {
            let (m, e) = decompose(value);
            let (num, den) = if e >= 0 {
                (BigUint::from(m) << e as u64, BigUint::one())
            }
            else {
                (BigUint::from(m), BigUint::one() << (-e) as u64)
            };
            let (out, inexact) = ratio_to_f64(&num, &den).unwrap();
            assert_eq!(out, value);
            assert!(!inexact);
        }
    }

    #[test]
    fn verify_ratio_rounds_half_even() {
        // 2^53 + 1 is not representable and lies exactly between two doubles.
        let n = (BigUint::one() << 53u32) + BigUint::one();
        let (value, inexact) = big_to_f64(&n).unwrap();
        assert_eq!(value, 9007199254740992.0);
        assert!(inexact);

        // 2^53 + 3 rounds up to the even neighbour as well.
        let n = (BigUint::one() << 53u32) + BigUint::from(3u8);
        let (value, _) = big_to_f64(&n).unwrap();
        assert_eq!(value, 9007199254740996.0);
    }

    #[test]
    fn verify_ratio_range_errors() {
        let huge = big_pow(10, 400);
        assert!(big_to_f64(&huge).is_err());

        let num = BigUint::one();
        let den = big_pow(10, 400);
        assert!(ratio_to_f64(&num, &den).is_err());
    }

    #[test]
    fn verify_exact_digits_of_tenth() {
        // The double nearest 0.1 is slightly above it; the 24-digit expansion makes the excess
        // visible.
        let (digits, scale) = digits_exact(0.1, 10, 24);
        let text: String =
            digits.iter().map(|&d| char::from_digit(u32::from(d), 10).unwrap()).collect();
        assert_eq!(text, "100000000000000005551115");
        assert_eq!(scale, 0);
    }

    #[test]
    fn verify_exact_digits_round_and_strip() {
        let (digits, scale) = digits_exact(1000.0, 16, 14);
        assert_eq!(digits, vec![3, 14, 8]);
        assert_eq!(scale, 3);

        let (digits, scale) = digits_exact(0.5, 10, 5);
        assert_eq!(digits, vec![5]);
        assert_eq!(scale, 0);

        // 0.999999 at two digits carries all the way to a fresh leading digit.
        let (digits, scale) = digits_exact(0.9999999, 10, 2);
        assert_eq!(digits, vec![1]);
        assert_eq!(scale, 1);
    }
}
