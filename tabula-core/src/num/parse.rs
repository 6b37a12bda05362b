// Tabula
// Copyright (c) 2026 The Project Tabula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use num_bigint::BigUint;
use num_traits::Zero;

use crate::errors::{number_error, NumberErrorKind, Result};
use crate::num::precise::{big_pow, big_to_f64, ratio_to_f64};
use crate::num::system::NumberSystem;
use crate::num::{scale_by_pow, BackendKind, PrecisionContext, Sign};

/// The result of parsing a textual number.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Parsed {
    /// The parsed value, sign applied.
    pub value: f64,
    /// The sign as written.
    pub sign: Sign,
    /// The power of the base applied to the significand as written, i.e. the written exponent
    /// less the number of fractional digits.
    pub exponent: i32,
    /// Whether the value differs from the exact written number.
    pub inexact: bool,
}

/// A completed parse: either a number or the system-missing mark.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Outcome {
    /// An ordinary number.
    Number(Parsed),
    /// The `*.` system-missing mark; no double is produced.
    Sysmiss,
}

/// The code returned by each [`NumberParser::consume`] call.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Step {
    /// More characters are required.
    Continue,
    /// A delimiter completed the number. The parser is reset and ready for the next one.
    Done(Outcome),
}

/// Exponents are saturated here; the magnitude check at the scaling step turns them into range
/// errors without building unbounded integers.
const EXP_SATURATION: i64 = 1 << 40;

/// Significand accumulation capability required of a numeric back-end.
trait Accumulate {
    fn clear(&mut self);
    fn push(&mut self, digit: u32);
    /// Final magnitude `accumulated · base^scale`, rounded half-even exactly once. Returns the
    /// magnitude and an inexact flag.
    fn finish(&self, scale: i32) -> Result<(f64, bool)>;
}

/// Fast accumulator: an exact `u64` for as long as it fits, then truncation with scale
/// tracking.
struct FastAccum {
    base: u64,
    acc: u64,
    dropped: u32,
    dropped_nonzero: bool,
}

impl FastAccum {
    fn new(base: u32) -> FastAccum {
        FastAccum { base: u64::from(base), acc: 0, dropped: 0, dropped_nonzero: false }
    }
}

impl Accumulate for FastAccum {
    fn clear(&mut self) {
        self.acc = 0;
        self.dropped = 0;
        self.dropped_nonzero = false;
    }

    fn push(&mut self, digit: u32) {
        if self.dropped == 0 && self.acc <= (u64::MAX - u64::from(digit)) / self.base {
            self.acc = self.acc * self.base + u64::from(digit);
        }
        else {
            self.dropped += 1;
            self.dropped_nonzero |= digit != 0;
        }
    }

    fn finish(&self, scale: i32) -> Result<(f64, bool)> {
        if self.acc == 0 {
            return Ok((0.0, self.dropped_nonzero));
        }

        let exp = scale.saturating_add(self.dropped as i32);
        let base = self.base as u32;

        // When both the significand and the power are exactly representable the single multiply
        // or divide rounds once, which is the best a binary back-end can do.
        let max_exact = crate::num::fast_precision_ceiling(base) as i32 - 1;
        let exact = self.acc < (1 << 53) && exp.unsigned_abs() as i32 <= max_exact;

        let value = if exact {
            if exp >= 0 {
                (self.acc as f64) * f64::from(base).powi(exp)
            }
            else {
                (self.acc as f64) / f64::from(base).powi(-exp)
            }
        }
        else {
            scale_by_pow(self.acc as f64, base, exp)
        };

        if value.is_infinite() {
            return number_error(NumberErrorKind::Overflow);
        }
        if value == 0.0 {
            return number_error(NumberErrorKind::Underflow);
        }

        let inexact = self.dropped_nonzero || !exact;
        Ok((value, inexact))
    }
}

/// Precise accumulator: an exact big integer, bounded by the working precision context.
struct PreciseAccum {
    base: u32,
    acc: BigUint,
    digits: u32,
    cap: u32,
    dropped: u32,
    dropped_nonzero: bool,
}

impl PreciseAccum {
    fn new(base: u32, context: PrecisionContext) -> PreciseAccum {
        PreciseAccum {
            base,
            acc: BigUint::zero(),
            digits: 0,
            cap: context.digits(base),
            dropped: 0,
            dropped_nonzero: false,
        }
    }
}

impl Accumulate for PreciseAccum {
    fn clear(&mut self) {
        self.acc = BigUint::zero();
        self.digits = 0;
        self.dropped = 0;
        self.dropped_nonzero = false;
    }

    fn push(&mut self, digit: u32) {
        if self.digits == 0 && digit == 0 {
            // Leading zeros carry no precision.
            return;
        }

        if self.digits < self.cap {
            self.acc = &self.acc * self.base + digit;
            self.digits += 1;
        }
        else {
            self.dropped += 1;
            self.dropped_nonzero |= digit != 0;
        }
    }

    fn finish(&self, scale: i32) -> Result<(f64, bool)> {
        if self.acc.is_zero() {
            return Ok((0.0, self.dropped_nonzero));
        }

        let exp = i64::from(scale) + i64::from(self.dropped);

        // Magnitude pre-check keeps the big integers bounded and maps runaway exponents onto
        // range errors.
        let log2_base = f64::from(self.base).log2();
        let log2_value = self.acc.bits() as f64 + exp as f64 * log2_base;

        if log2_value > 1100.0 {
            return number_error(NumberErrorKind::Overflow);
        }
        if log2_value < -1200.0 {
            return number_error(NumberErrorKind::Underflow);
        }

        let exp = exp as i32;

        let (value, inexact) = if exp >= 0 {
            big_to_f64(&(&self.acc * big_pow(self.base, exp as u32)))?
        }
        else {
            ratio_to_f64(&self.acc, &big_pow(self.base, exp.unsigned_abs()))?
        };

        Ok((value, inexact || self.dropped_nonzero))
    }
}

enum Accum {
    Fast(FastAccum),
    Precise(PreciseAccum),
}

impl Accum {
    fn get(&mut self) -> &mut dyn Accumulate {
        match self {
            Accum::Fast(a) => a,
            Accum::Precise(a) => a,
        }
    }

    fn finish(&self, scale: i32) -> Result<(f64, bool)> {
        match self {
            Accum::Fast(a) => a.finish(scale),
            Accum::Precise(a) => a.finish(scale),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum State {
    Leading,
    AfterSign,
    IntPart,
    FracPart,
    ExpStart,
    ExpDigits,
    SysmissMark,
    Trailing,
}

/// An incremental parser for textual numbers in a configurable base.
///
/// The parser is a push state machine: feed characters through [`consume`](NumberParser::consume)
/// until it reports [`Step::Done`], or finalize an undelimited number with
/// [`end`](NumberParser::end). It never blocks and never reads on its own; the caller drives all
/// I/O. After a completed number the parser has reset itself and accepts the next one.
pub struct NumberParser {
    system: NumberSystem,
    delimiter: Option<char>,
    accum: Accum,
    state: State,
    sign: Sign,
    exp_sign: i64,
    exp: i64,
    frac_digits: u32,
    digits_seen: bool,
    exp_digits_seen: bool,
}

impl NumberParser {
    /// Create a parser over the fast back-end.
    pub fn new(system: NumberSystem) -> NumberParser {
        NumberParser::with_backend(system, BackendKind::Fast, PrecisionContext::default())
    }

    /// Create a parser with an explicit back-end and working precision.
    pub fn with_backend(
        system: NumberSystem,
        backend: BackendKind,
        context: PrecisionContext,
    ) -> NumberParser {
        let accum = match backend {
            BackendKind::Fast => Accum::Fast(FastAccum::new(system.base())),
            BackendKind::Precise => Accum::Precise(PreciseAccum::new(system.base(), context)),
        };

        NumberParser {
            system,
            delimiter: None,
            accum,
            state: State::Leading,
            sign: Sign::Positive,
            exp_sign: 1,
            exp: 0,
            frac_digits: 0,
            digits_seen: false,
            exp_digits_seen: false,
        }
    }

    /// Sets a terminating delimiter. When the parser meets it, the number completes and the
    /// delimiter is consumed. The delimiter takes precedence over a digit of the same character.
    pub fn with_delimiter(mut self, delimiter: char) -> NumberParser {
        self.delimiter = Some(delimiter);
        self
    }

    /// The number system this parser reads.
    pub fn system(&self) -> &NumberSystem {
        &self.system
    }

    /// Returns the parser to its initial state. Internal buffers are retained.
    pub fn reset(&mut self) {
        self.accum.get().clear();
        self.state = State::Leading;
        self.sign = Sign::Positive;
        self.exp_sign = 1;
        self.exp = 0;
        self.frac_digits = 0;
        self.digits_seen = false;
        self.exp_digits_seen = false;
    }

    /// Feeds one character. Returns [`Step::Done`] when a delimiter completes the number.
    pub fn consume(&mut self, ch: char) -> Result<Step> {
        if self.state == State::SysmissMark {
            // Whatever follows the `*` is consumed with it.
            self.reset();
            return Ok(Step::Done(Outcome::Sysmiss));
        }

        if Some(ch) == self.delimiter {
            match self.state {
                State::Leading | State::AfterSign => return number_error(NumberErrorKind::Empty),
                State::ExpStart => return number_error(NumberErrorKind::UnexpectedChar),
                _ => (),
            }
            let outcome = self.end()?;
            return Ok(Step::Done(outcome));
        }

        match self.state {
            State::Leading => {
                if ch.is_whitespace() {
                    return Ok(Step::Continue);
                }
                match ch {
                    '*' => self.state = State::SysmissMark,
                    '-' => {
                        self.sign = Sign::Negative;
                        self.state = State::AfterSign;
                    }
                    '+' => self.state = State::AfterSign,
                    '.' => self.state = State::FracPart,
                    _ => {
                        let digit = self.digit(ch)?;
                        self.accum.get().push(digit);
                        self.digits_seen = true;
                        self.state = State::IntPart;
                    }
                }
            }
            State::AfterSign => match ch {
                '.' => self.state = State::FracPart,
                _ => {
                    let digit = self.digit(ch)?;
                    self.accum.get().push(digit);
                    self.digits_seen = true;
                    self.state = State::IntPart;
                }
            },
            State::IntPart => match ch {
                '.' => self.state = State::FracPart,
                '+' if !self.system.is_digit('+') => self.begin_exponent(1),
                '-' if !self.system.is_digit('-') => self.begin_exponent(-1),
                _ if ch.is_whitespace() => self.state = State::Trailing,
                _ => {
                    let digit = self.digit(ch)?;
                    self.accum.get().push(digit);
                    self.digits_seen = true;
                }
            },
            State::FracPart => match ch {
                '+' if !self.system.is_digit('+') => self.begin_exponent(1),
                '-' if !self.system.is_digit('-') => self.begin_exponent(-1),
                _ if ch.is_whitespace() => self.state = State::Trailing,
                _ => {
                    let digit = self.digit(ch)?;
                    self.accum.get().push(digit);
                    self.digits_seen = true;
                    self.frac_digits += 1;
                }
            },
            State::ExpStart | State::ExpDigits => match ch {
                _ if ch.is_whitespace() && self.state == State::ExpDigits => {
                    self.state = State::Trailing
                }
                _ => {
                    let digit = self.digit(ch)?;
                    self.exp = (self.exp * i64::from(self.system.base())
                        + i64::from(digit))
                    .min(EXP_SATURATION);
                    self.exp_digits_seen = true;
                    self.state = State::ExpDigits;
                }
            },
            State::Trailing => {
                if !ch.is_whitespace() {
                    return number_error(NumberErrorKind::UnexpectedChar);
                }
            }
            State::SysmissMark => unreachable!(),
        }

        Ok(Step::Continue)
    }

    /// Finalizes a number that is not closed by a delimiter, e.g. at the end of input.
    pub fn end(&mut self) -> Result<Outcome> {
        if self.state == State::SysmissMark {
            self.reset();
            return Ok(Outcome::Sysmiss);
        }

        if !self.digits_seen {
            self.reset();
            return number_error(NumberErrorKind::Empty);
        }
        if self.state == State::ExpStart && !self.exp_digits_seen {
            self.reset();
            return number_error(NumberErrorKind::UnexpectedChar);
        }

        let scale = (self.exp_sign * self.exp)
            .saturating_sub(i64::from(self.frac_digits))
            .clamp(i64::from(i32::MIN / 2), i64::from(i32::MAX / 2)) as i32;

        let result = self.accum.finish(scale);
        let sign = self.sign;
        self.reset();

        let (magnitude, inexact) = result?;

        let value = match sign {
            Sign::Positive => magnitude,
            Sign::Negative => -magnitude,
        };

        Ok(Outcome::Number(Parsed { value, sign, exponent: scale, inexact }))
    }

    /// Parses a complete string. Trailing whitespace after the number is accepted.
    pub fn parse(&mut self, text: &str) -> Result<Outcome> {
        let mut done = None;

        for ch in text.chars() {
            if done.is_some() {
                if !ch.is_whitespace() {
                    return number_error(NumberErrorKind::UnexpectedChar);
                }
                continue;
            }

            if let Step::Done(outcome) = self.consume(ch)? {
                done = Some(outcome);
            }
        }

        match done {
            Some(outcome) => Ok(outcome),
            None => self.end(),
        }
    }

    fn begin_exponent(&mut self, sign: i64) {
        self.exp_sign = sign;
        self.state = State::ExpStart;
    }

    fn digit(&mut self, ch: char) -> Result<u32> {
        match self.system.digit_value(ch) {
            Some(digit) => Ok(digit),
            None => {
                self.reset();
                number_error(NumberErrorKind::UnexpectedChar)
            }
        }
    }
}
