// Copyright 2026 Clocktree Contributors
// SPDX-License-Identifier: Apache-2.0

//! Core time representation: [`Instant`].
//!
//! An [`Instant`] is an exact rational number of seconds since the start of
//! the experiment. Trigger edges on real apparatus must line up exactly, so
//! no floating-point value ever enters the representation: all arithmetic
//! is carried out on arbitrary-precision rationals.
//!
//! The value type itself is signed so that intermediate differences such as
//! `instant - trigger_delay` can be formed and inspected. The tree rejects
//! negative instants at its boundary, and the resolver rejects negative
//! edge instants during resolution.

use std::fmt;
use std::ops::{Add, Mul, Sub};
use std::str::FromStr;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ScheduleError;

/// Maximum number of fractional digits shown by [`Instant::to_display_seconds`].
pub const MAX_DISPLAY_DIGITS: usize = 18;

/// Largest decimal scale accepted when parsing, in either direction.
///
/// Wide enough for any `f64` written in shortest form at picosecond
/// magnitudes.
pub const MAX_DECIMAL_SCALE: u32 = 30;

/// An exact point in (or span of) experiment time, in seconds.
///
/// # Invariants
///
/// - The rational is always kept in lowest terms with a positive
///   denominator, so `==`, `Ord` and `Hash` agree on exact values.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instant(BigRational);

impl Instant {
    /// Time zero: the start of the experiment.
    pub fn zero() -> Self {
        Self(BigRational::zero())
    }

    /// `numer / denom` seconds.
    ///
    /// # Errors
    ///
    /// Returns `NonIntegerDivision` if `denom == 0`.
    pub fn from_ratio(numer: i64, denom: u64) -> Result<Self, ScheduleError> {
        if denom == 0 {
            return Err(ScheduleError::NonIntegerDivision {
                dividend: Self(BigRational::from_integer(BigInt::from(numer))),
                divisor: "0".into(),
            });
        }
        Ok(Self(BigRational::new(BigInt::from(numer), BigInt::from(denom))))
    }

    fn scaled(count: u64, per_second: u64) -> Self {
        Self(BigRational::new(BigInt::from(count), BigInt::from(per_second)))
    }

    pub fn seconds(count: u64) -> Self {
        Self::scaled(count, 1)
    }

    pub fn millis(count: u64) -> Self {
        Self::scaled(count, 1_000)
    }

    pub fn micros(count: u64) -> Self {
        Self::scaled(count, 1_000_000)
    }

    pub fn nanos(count: u64) -> Self {
        Self::scaled(count, 1_000_000_000)
    }

    pub fn picos(count: u64) -> Self {
        Self::scaled(count, 1_000_000_000_000)
    }

    /// The underlying exact rational.
    pub fn as_rational(&self) -> &BigRational {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_negative()
    }

    pub fn is_positive(&self) -> bool {
        self.0.is_positive()
    }

    /// Exact division by an integer count, e.g. splitting a ramp duration
    /// into equally spaced samples.
    ///
    /// # Errors
    ///
    /// Returns `NonIntegerDivision` if `n == 0`: no quotient exists.
    pub fn div_exact(&self, n: u64) -> Result<Instant, ScheduleError> {
        if n == 0 {
            return Err(ScheduleError::NonIntegerDivision {
                dividend: self.clone(),
                divisor: "0".into(),
            });
        }
        Ok(Self(&self.0 / BigRational::from_integer(BigInt::from(n))))
    }

    /// How many whole `unit`s make up this instant.
    ///
    /// # Errors
    ///
    /// Returns `NonIntegerDivision` if `unit` is zero or if the quotient
    /// is not an integer.
    pub fn whole_multiples_of(&self, unit: &Instant) -> Result<BigInt, ScheduleError> {
        if unit.is_zero() {
            return Err(ScheduleError::NonIntegerDivision {
                dividend: self.clone(),
                divisor: unit.to_string(),
            });
        }
        let quotient = &self.0 / &unit.0;
        if !quotient.is_integer() {
            return Err(ScheduleError::NonIntegerDivision {
                dividend: self.clone(),
                divisor: unit.to_string(),
            });
        }
        Ok(quotient.to_integer())
    }

    /// Smallest whole multiple of `unit` that is not below this instant.
    ///
    /// # Errors
    ///
    /// Returns `NonIntegerDivision` if `unit` is zero.
    pub fn round_up_to(&self, unit: &Instant) -> Result<Instant, ScheduleError> {
        if unit.is_zero() {
            return Err(ScheduleError::NonIntegerDivision {
                dividend: self.clone(),
                divisor: unit.to_string(),
            });
        }
        Ok(Self((&self.0 / &unit.0).ceil() * &unit.0))
    }

    /// Decimal rendering in seconds, for diagnostics only.
    ///
    /// Exact whenever the decimal expansion terminates within
    /// [`MAX_DISPLAY_DIGITS`] fractional digits, otherwise truncated and
    /// suffixed with `...`.
    pub fn to_display_seconds(&self) -> String {
        self.to_display_seconds_with(MAX_DISPLAY_DIGITS)
    }

    /// Like [`to_display_seconds`](Self::to_display_seconds) with a custom
    /// digit budget.
    pub fn to_display_seconds_with(&self, max_digits: usize) -> String {
        let numer = self.0.numer();
        let denom = self.0.denom();
        let magnitude = numer.abs();

        let mut out = String::new();
        if numer.is_negative() {
            out.push('-');
        }
        out.push_str(&(&magnitude / denom).to_string());

        let mut rem = &magnitude % denom;
        if rem.is_zero() {
            return out;
        }
        out.push('.');

        let ten = BigInt::from(10u32);
        let mut digits = 0;
        while !rem.is_zero() && digits < max_digits {
            rem *= &ten;
            out.push_str(&(&rem / denom).to_string());
            rem = &rem % denom;
            digits += 1;
        }
        if !rem.is_zero() {
            out.push_str("...");
        }
        out
    }

    /// Exact textual form accepted by [`FromStr`]: a terminating decimal
    /// when one exists, otherwise `numer/denom`.
    pub fn to_exact_string(&self) -> String {
        if terminating_digits(self.0.denom()).is_some() {
            self.to_display_seconds_with(usize::MAX)
        } else {
            format!("{}/{}", self.0.numer(), self.0.denom())
        }
    }
}

/// Number of fractional decimal digits needed to write `1/denom`, or
/// `None` if the expansion does not terminate.
fn terminating_digits(denom: &BigInt) -> Option<usize> {
    let two = BigInt::from(2u32);
    let five = BigInt::from(5u32);
    let mut rest = denom.clone();
    let (mut twos, mut fives) = (0usize, 0usize);
    while (&rest % &two).is_zero() {
        rest /= &two;
        twos += 1;
    }
    while (&rest % &five).is_zero() {
        rest /= &five;
        fives += 1;
    }
    rest.is_one().then_some(twos.max(fives))
}

impl Default for Instant {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.to_display_seconds())
    }
}

impl Add<&Instant> for &Instant {
    type Output = Instant;

    fn add(self, rhs: &Instant) -> Instant {
        Instant(&self.0 + &rhs.0)
    }
}

impl Add for Instant {
    type Output = Instant;

    fn add(self, rhs: Instant) -> Instant {
        Instant(self.0 + rhs.0)
    }
}

impl Sub<&Instant> for &Instant {
    type Output = Instant;

    fn sub(self, rhs: &Instant) -> Instant {
        Instant(&self.0 - &rhs.0)
    }
}

impl Sub for Instant {
    type Output = Instant;

    fn sub(self, rhs: Instant) -> Instant {
        Instant(self.0 - rhs.0)
    }
}

impl Mul<u64> for &Instant {
    type Output = Instant;

    fn mul(self, rhs: u64) -> Instant {
        Instant(&self.0 * BigRational::from_integer(BigInt::from(rhs)))
    }
}

/// Error returned when a textual instant cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseInstantError {
    pub input: String,
    pub reason: &'static str,
}

impl fmt::Display for ParseInstantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid instant '{}': {}", self.input, self.reason)
    }
}

impl std::error::Error for ParseInstantError {}

impl FromStr for Instant {
    type Err = ParseInstantError;

    /// Parse `"9.5us"`, `"1/3 ms"`, `"2.5e-7"`, `"10 ns"` exactly.
    ///
    /// A bare number is in seconds. Recognised units: `s`, `ms`, `us`,
    /// `µs`, `ns`, `ps`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fail = |reason| ParseInstantError {
            input: s.to_string(),
            reason,
        };

        let text = s.trim();
        let unit_start = text
            .char_indices()
            .find(|&(_, c)| c.is_alphabetic() && c != 'e' && c != 'E')
            .map(|(i, _)| i)
            .unwrap_or(text.len());
        let (number, unit) = text.split_at(unit_start);
        let number = number.trim();
        if number.is_empty() {
            return Err(fail("missing number"));
        }

        let per_second: u64 = match unit.trim() {
            "" | "s" => 1,
            "ms" => 1_000,
            "us" | "µs" | "μs" => 1_000_000,
            "ns" => 1_000_000_000,
            "ps" => 1_000_000_000_000,
            _ => return Err(fail("unknown unit")),
        };

        let value = match number.split_once('/') {
            Some((n, d)) => {
                let n: BigInt = n.trim().parse().map_err(|_| fail("bad numerator"))?;
                let d: BigInt = d.trim().parse().map_err(|_| fail("bad denominator"))?;
                if d.is_zero() {
                    return Err(fail("zero denominator"));
                }
                BigRational::new(n, d)
            }
            None => parse_decimal(number).map_err(fail)?,
        };

        Ok(Instant(
            value / BigRational::from_integer(BigInt::from(per_second)),
        ))
    }
}

/// Exact parse of `[-+]digits[.digits][(e|E)[-+]digits]`.
///
/// The resulting power of ten is bounded by [`MAX_DECIMAL_SCALE`].
fn parse_decimal(text: &str) -> Result<BigRational, &'static str> {
    const BAD: &str = "bad decimal number";

    let (mantissa, exponent) = match text.find(['e', 'E']) {
        Some(i) => (&text[..i], text[i + 1..].parse::<i64>().map_err(|_| BAD)?),
        None => (text, 0),
    };

    let (negative, mantissa) = match mantissa.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, mantissa.strip_prefix('+').unwrap_or(mantissa)),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(BAD);
    }
    if !int_part
        .chars()
        .chain(frac_part.chars())
        .all(|c| c.is_ascii_digit())
    {
        return Err(BAD);
    }

    let frac_len = i64::try_from(frac_part.len()).map_err(|_| BAD)?;
    let scale = exponent.checked_sub(frac_len).ok_or("exponent out of range")?;
    if scale.unsigned_abs() > u64::from(MAX_DECIMAL_SCALE) {
        return Err("exponent out of range");
    }

    let digits: BigInt = format!("{int_part}{frac_part}").parse().map_err(|_| BAD)?;
    let digits = if negative { -digits } else { digits };
    let power = BigInt::from(10u32).pow(scale.unsigned_abs() as u32);

    Ok(if scale >= 0 {
        BigRational::from_integer(digits * power)
    } else {
        BigRational::new(digits, power)
    })
}

impl Serialize for Instant {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_exact_string())
    }
}

impl<'de> Deserialize<'de> for Instant {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(InstantVisitor)
    }
}

struct InstantVisitor;

impl<'de> Visitor<'de> for InstantVisitor {
    type Value = Instant;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a time such as \"9.5us\", \"1/3 s\" or a number of seconds")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Instant, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Instant, E> {
        Ok(Instant::seconds(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Instant, E> {
        Ok(Instant(BigRational::from_integer(BigInt::from(v))))
    }

    // Floats are read through their shortest round-trip decimal form, so
    // `0.5e-6` in a YAML file means exactly 500 ns.
    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Instant, E> {
        if !v.is_finite() {
            return Err(E::custom("time must be finite"));
        }
        format!("{v}").parse().map_err(E::custom)
    }
}
