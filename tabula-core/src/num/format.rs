// Tabula
// Copyright (c) 2026 The Project Tabula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::cmp::Ordering;

use crate::errors::{number_error, Error, NumberErrorKind, Result};
use crate::num::precise::digits_exact;
use crate::num::system::NumberSystem;
use crate::num::{
    fast_precision_ceiling, round_half_even, scale_by_pow, BackendKind, PrecisionContext,
};

/// Governs how the fast back-end resolves a rounding decision that lands near the midpoint
/// between two representable outputs.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ExactRounding {
    /// Escalate the boundary case to the precise back-end. The output matches canonical
    /// double-to-string conversion.
    Always,
    /// Accept the fast-path result. The output matches an FPU that keeps intermediates in
    /// 64-bit registers throughout.
    #[default]
    Never,
}

/// Options for a [`NumberFormatter`].
#[derive(Copy, Clone, Debug, Default)]
pub struct FormatOptions {
    /// The digit-generation back-end.
    pub backend: BackendKind,
    /// The working precision of the precise back-end.
    pub context: PrecisionContext,
    /// Near-tie handling under the fast back-end.
    pub exact_rounding: ExactRounding,
}

/// Relative distance from the midpoint below which the fast back-end considers a rounding
/// decision a boundary case.
const TIE_MARGIN: f64 = 1e-9;

/// A `NumberFormatter` converts IEEE-754 doubles into textual numbers of a configurable base
/// and precision.
pub struct NumberFormatter {
    system: NumberSystem,
    opts: FormatOptions,
}

impl NumberFormatter {
    /// Create a formatter over the fast back-end with default options.
    pub fn new(system: NumberSystem) -> NumberFormatter {
        NumberFormatter { system, opts: FormatOptions::default() }
    }

    /// Create a formatter with explicit options.
    pub fn with_options(system: NumberSystem, opts: FormatOptions) -> NumberFormatter {
        NumberFormatter { system, opts }
    }

    /// The number system this formatter writes.
    pub fn system(&self) -> &NumberSystem {
        &self.system
    }

    /// Formats `value` with at most `precision` significand digits.
    ///
    /// The output is `[-]d[.d*][±e]`: no insignificant trailing zeros, the exponent a signed
    /// base-`b` integer applied to the integer significand and omitted whenever the value
    /// prints in plain notation. NaN and infinities are rejected with
    /// [`Error::NonFiniteInput`].
    pub fn format(&self, value: f64, precision: u32) -> Result<String> {
        if !value.is_finite() {
            return Err(Error::NonFiniteInput);
        }

        let base = self.system.base();
        let precision = precision.max(1);

        if value == 0.0 {
            // The fast back-end loses the sign of zero in its scaling arithmetic; only the
            // precise back-end can tell the two zeros apart.
            let negative =
                self.opts.backend == BackendKind::Precise && value.is_sign_negative();
            return Ok(if negative { "-0".to_string() } else { "0".to_string() });
        }

        let (digits, scale) = match self.opts.backend {
            BackendKind::Precise => {
                if precision > self.opts.context.digits(base) {
                    return number_error(NumberErrorKind::Backend);
                }
                digits_exact(value, base, precision as usize)
            }
            BackendKind::Fast => {
                let precision = precision.min(fast_precision_ceiling(base));
                let (digits, scale, near_tie) = digits_fast(value.abs(), base, precision);

                if near_tie && self.opts.exact_rounding == ExactRounding::Always {
                    digits_exact(value, base, precision as usize)
                }
                else {
                    (digits, scale)
                }
            }
        };

        Ok(self.assemble(value.is_sign_negative(), &digits, scale, precision))
    }

    /// Formats an unsigned integer in this formatter's base, most significant digit first.
    pub fn format_unsigned(&self, mut value: u64) -> String {
        let base = u64::from(self.system.base());
        let mut out = Vec::new();

        loop {
            let digit = (value % base) as u32;
            out.push(self.digit(digit));
            value /= base;
            if value == 0 {
                break;
            }
        }

        out.iter().rev().collect()
    }

    /// Re-rounds a textual number to `precision` significand digits without constructing a
    /// double, operating directly on the digit sequence.
    ///
    /// The output is exactly what `format(parse(input), precision)` would produce if both
    /// conversions were lossless.
    pub fn reshape(&self, input: &str, precision: u32) -> Result<String> {
        let precision = precision.max(1);
        let (negative, mut digits, mut scale) = self.scan(input)?;

        if digits.is_empty() {
            return Ok("0".to_string());
        }

        let base = self.system.base();
        let k = precision as usize;

        if digits.len() > k {
            // Round half-even at the k-th digit. The dropped tail is compared against one half
            // of a unit in the last kept place.
            let first = u32::from(digits[k]);
            let rest_nonzero = digits[k + 1..].iter().any(|&d| d != 0);

            let round_up = match (2 * first).cmp(&base) {
                Ordering::Greater => true,
                Ordering::Less => false,
                Ordering::Equal => rest_nonzero || digits[k - 1] & 1 == 1,
            };

            digits.truncate(k);

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
        }

        while digits.len() > 1 && digits.last() == Some(&0) {
            digits.pop();
        }

        if digits == [0] {
            return Ok("0".to_string());
        }

        Ok(self.assemble(negative, &digits, scale, precision))
    }

    /// Scans a textual number into its digit-level form: sign, significand digits with leading
    /// zeros removed, and the normalized exponent `E` with `value = 0.d₁…dₘ · b^E`.
    fn scan(&self, input: &str) -> Result<(bool, Vec<u8>, i32)> {
        let mut chars = input.chars().peekable();

        while chars.peek().map_or(false, |c| c.is_whitespace()) {
            chars.next();
        }

        let mut negative = false;
        match chars.peek() {
            Some('-') => {
                negative = true;
                chars.next();
            }
            Some('+') => {
                chars.next();
            }
            _ => (),
        }

        let mut digits: Vec<u8> = Vec::new();
        let mut int_len = 0i32;
        let mut seen_point = false;
        let mut seen_digit = false;
        let mut exp = 0i64;
        let mut exp_sign = 0i64;

        for ch in chars.by_ref() {
            if ch == '.' && !seen_point && exp_sign == 0 {
                seen_point = true;
            }
            else if (ch == '+' || ch == '-') && seen_digit && exp_sign == 0 {
                exp_sign = if ch == '-' { -1 } else { 1 };
            }
            else if let Some(digit) = self.system.digit_value(ch) {
                seen_digit = true;
                if exp_sign != 0 {
                    exp = (exp * i64::from(self.system.base()) + i64::from(digit))
                        .min(i64::from(i32::MAX / 2));
                }
                else {
                    digits.push(digit as u8);
                    if !seen_point {
                        int_len += 1;
                    }
                }
            }
            else if ch.is_whitespace() {
                break;
            }
            else {
                return number_error(NumberErrorKind::UnexpectedChar);
            }
        }

        if !seen_digit {
            return number_error(NumberErrorKind::Empty);
        }

        let lead_zeros = digits.iter().take_while(|&&d| d == 0).count();
        digits.drain(..lead_zeros);

        while digits.last() == Some(&0) {
            digits.pop();
        }

        let scale = int_len as i64 + exp_sign * exp - lead_zeros as i64;
        Ok((negative, digits, scale.clamp(i64::from(i32::MIN / 2), i64::from(i32::MAX / 2)) as i32))
    }

    /// Lays out rounded digits as text: plain notation when the normalized exponent lies in
    /// `[0, precision]`, exponential notation otherwise.
    fn assemble(&self, negative: bool, digits: &[u8], scale: i32, precision: u32) -> String {
        let m = digits.len() as i32;
        let mut out = String::new();

        if negative {
            out.push('-');
        }

        if scale >= 0 && scale <= precision as i32 {
            if scale >= m {
                for &d in digits {
                    out.push(self.digit(u32::from(d)));
                }
                for _ in 0..(scale - m) {
                    out.push(self.digit(0));
                }
            }
            else if scale == 0 {
                out.push('.');
                for &d in digits {
                    out.push(self.digit(u32::from(d)));
                }
            }
            else {
                for (i, &d) in digits.iter().enumerate() {
                    if i as i32 == scale {
                        out.push('.');
                    }
                    out.push(self.digit(u32::from(d)));
                }
            }
        }
        else {
            for &d in digits {
                out.push(self.digit(u32::from(d)));
            }

            let exp = i64::from(scale) - i64::from(m);
            out.push(if exp < 0 { '-' } else { '+' });
            out.push_str(&self.format_unsigned(exp.unsigned_abs()));
        }

        out
    }

    #[inline]
    fn digit(&self, value: u32) -> char {
        // Digit values always come from this system, so the lookup cannot miss.
        self.system.digit_char(value).unwrap_or('?')
    }
}

/// Generates up to `k` significand digits of the positive finite `value` using 64-bit
/// arithmetic only. Returns the digits with trailing zeros stripped, the normalized exponent,
/// and whether the final rounding was a boundary case.
fn digits_fast(value: f64, base: u32, k: u32) -> (Vec<u8>, i32, bool) {
    // Normalize so that base^(e-1) <= value < base^e.
    let mut e = (value.ln() / f64::from(base).ln()).floor() as i32 + 1;

    for _ in 0..4 {
        if value >= scale_by_pow(1.0, base, e) {
            e += 1;
        }
        else if value < scale_by_pow(1.0, base, e - 1) {
            e -= 1;
        }
        else {
            break;
        }
    }

    let low = pow_u64(base, k - 1);
    let high = pow_u64(base, k);
    let mut near_tie = false;
    let mut n = 0u64;

    for _ in 0..4 {
        let scaled = scale_by_pow(value, base, k as i32 - e);
        let frac = (scaled - scaled.trunc()).abs();
        near_tie = (frac - 0.5).abs() < TIE_MARGIN;

        n = round_half_even(scaled) as u64;

        if n >= high {
            e += 1;
        }
        else if n < low {
            e -= 1;
        }
        else {
            break;
        }
    }

    let n = n.clamp(low, high - 1);

    let mut digits = vec![0u8; k as usize];
    let mut rest = n;
    for d in digits.iter_mut().rev() {
        *d = (rest % u64::from(base)) as u8;
        rest /= u64::from(base);
    }

    while digits.len() > 1 && digits.last() == Some(&0) {
        digits.pop();
    }

    (digits, e, near_tie)
}

fn pow_u64(base: u32, exp: u32) -> u64 {
    (0..exp).fold(1u64, |acc, _| acc * u64::from(base))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::num::{NumberParser, Outcome};
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn fast(base: u32) -> NumberFormatter {
        NumberFormatter::new(NumberSystem::new(base).unwrap())
    }

    fn precise(base: u32) -> NumberFormatter {
        NumberFormatter::with_options(
            NumberSystem::new(base).unwrap(),
            FormatOptions { backend: BackendKind::Precise, ..Default::default() },
        )
    }

    #[test]
    fn verify_integers_print_plain() {
        assert_eq!(fast(10).format(0.0, 1).unwrap(), "0");
        assert_eq!(fast(10).format(42.0, 5).unwrap(), "42");
        assert_eq!(fast(10).format(-42.0, 5).unwrap(), "-42");
        assert_eq!(fast(16).format(1000.0, 14).unwrap(), "3E8");
        assert_eq!(fast(10).format(120.0, 5).unwrap(), "120");
    }

    #[test]
    fn verify_fractions_print_with_leading_point() {
        assert_eq!(fast(10).format(0.1, 24).unwrap(), ".1");
        assert_eq!(fast(10).format(0.5, 5).unwrap(), ".5");
        assert_eq!(fast(10).format(1.5, 5).unwrap(), "1.5");
        assert_eq!(fast(10).format(-0.25, 5).unwrap(), "-.25");
    }

    #[test]
    fn verify_exponential_notation() {
        assert_eq!(fast(10).format(1234567890.0, 3).unwrap(), "123+7");
        // One digit below the smallest plain exponent.
        assert_eq!(fast(10).format(0.01, 11).unwrap(), "1-2");
    }

    #[test]
    fn verify_negative_zero() {
        assert_eq!(fast(10).format(-0.0, 1).unwrap(), "0");
        assert_eq!(precise(10).format(-0.0, 1).unwrap(), "-0");
    }

    #[test]
    fn verify_non_finite_rejected() {
        assert!(matches!(fast(10).format(f64::NAN, 5), Err(Error::NonFiniteInput)));
        assert!(matches!(fast(10).format(f64::INFINITY, 5), Err(Error::NonFiniteInput)));
    }

    #[test]
    fn verify_precise_expansion_of_tenth() {
        let out = precise(10).format(0.1, 24).unwrap();
        assert_eq!(out, ".100000000000000005551115");
    }

    #[test]
    fn verify_subnormal_has_correct_exponent() {
        let out = precise(10).format(1e-320, 16).unwrap();
        // The double nearest 1e-320 begins 9.99988867…e-321.
        assert!(out.starts_with("999988867"), "got {}", out);
        assert!(out.ends_with("-336"), "got {}", out);

        let fast_out = fast(10).format(1e-320, 16).unwrap();
        assert!(fast_out.starts_with("99998"), "got {}", fast_out);
    }

    #[test]
    fn verify_precise_rejects_precision_beyond_context() {
        let formatter = NumberFormatter::with_options(
            NumberSystem::new(10).unwrap(),
            FormatOptions {
                backend: BackendKind::Precise,
                context: PrecisionContext::Bits32,
                ..Default::default()
            },
        );
        assert!(formatter.format(0.1, 24).is_err());
    }

    #[test]
    fn verify_trigesimal_cell_formats() {
        let value = f64::from_bits(u64::from_le_bytes([
            0x27, 0x23, 0xF7, 0x0C, 0x92, 0x52, 0x93, 0x3F,
        ]));
        assert_eq!(precise(30).format(value, 11).unwrap(), "GTECSL0R001-C");

        // The re-decoded double is one ULP lower, yet formats identically, so the second pass
        // is stable.
        let lower = f64::from_bits(value.to_bits() - 1);
        assert_eq!(precise(30).format(lower, 11).unwrap(), "GTECSL0R001-C");
    }

    #[test]
    fn verify_format_unsigned() {
        assert_eq!(fast(30).format_unsigned(0), "0");
        assert_eq!(fast(30).format_unsigned(29), "T");
        assert_eq!(fast(30).format_unsigned(30), "10");
        assert_eq!(fast(16).format_unsigned(64206), "FACE");
    }

    #[test]
    fn verify_reshape_matches_format() {
        let formatter = precise(10);

        assert_eq!(formatter.reshape("123456", 3).unwrap(), "123+3");
        assert_eq!(formatter.reshape("1.25", 2).unwrap(), "1.2");
        assert_eq!(formatter.reshape("1.35", 2).unwrap(), "1.4");
        assert_eq!(formatter.reshape(".000", 5).unwrap(), "0");
        assert_eq!(formatter.reshape("999", 2).unwrap(), "1+3");
        assert_eq!(formatter.reshape("42", 5).unwrap(), "42");
        assert_eq!(formatter.reshape("-.5", 5).unwrap(), "-.5");
        assert_eq!(formatter.reshape("120+1", 2).unwrap(), "12+2");
    }

    #[test]
    fn verify_reshape_is_idempotent() {
        let formatter = precise(30);

        for text in ["GTECSL0R001-C", "1F.6", "-T+3", ".0001", "123456789-5"] {
            let once = formatter.reshape(text, 11).unwrap();
            let twice = formatter.reshape(&once, 11).unwrap();
            assert_eq!(once, twice, "input {:?}", text);
        }
    }

    #[test]
    fn verify_round_trip_converges_in_one_pass() {
        let mut rng = SmallRng::seed_from_u64(0x5350_5353);
        let formatter = precise(30);
        let mut parser = NumberParser::with_backend(
            NumberSystem::new(30).unwrap(),
            BackendKind::Precise,
            PrecisionContext::Bits128,
        );

        for _ in 0..500 {
            let value = f64::from_bits(rng.gen::<u64>());
            if !value.is_finite() {
                continue;
            }

            let first = formatter.format(value, 11).unwrap();
            let reparsed = match parser.parse(&first).unwrap() {
                Outcome::Number(parsed) => parsed.value,
                Outcome::Sysmiss => unreachable!(),
            };
            let second = formatter.format(reparsed, 11).unwrap();

            // Re-encoding the re-parsed value must already be stable.
            let reparsed2 = match parser.parse(&second).unwrap() {
                Outcome::Number(parsed) => parsed.value,
                Outcome::Sysmiss => unreachable!(),
            };
            let third = formatter.format(reparsed2, 11).unwrap();
            assert_eq!(second, third, "value {:e} did not stabilize", value);
        }
    }

    #[test]
    fn verify_parse_of_formatted_value_is_close() {
        let mut rng = SmallRng::seed_from_u64(0x0f0e_0d0c);
        let formatter = fast(10);
        let mut parser = NumberParser::new(NumberSystem::new(10).unwrap());

        for _ in 0..500 {
            let value: f64 = rng.gen_range(-1.0e12..1.0e12);
            let text = formatter.format(value, 15).unwrap();
            let reparsed = match parser.parse(&text).unwrap() {
                Outcome::Number(parsed) => parsed.value,
                Outcome::Sysmiss => unreachable!(),
            };

            let tolerance = value.abs() * 1e-13;
            assert!(
                (reparsed - value).abs() <= tolerance,
                "{} -> {} -> {}",
                value,
                text,
                reparsed
            );
        }
    }
}
