use std::{
    fmt,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::EngineError;

/// Signed money amount represented as **integer cents**.
///
/// Use this type for **all** monetary values in the engine (balances, card
/// limits, bill values, installment splits) to avoid floating-point drift.
///
/// Ledger amounts are stored non-negative; the direction comes from the
/// transaction type. Signed values show up in deltas and balances.
///
/// # Examples
///
/// ```rust
/// use engine::MoneyCents;
///
/// let amount = MoneyCents::new(12_34);
/// assert_eq!(amount.cents(), 1234);
/// assert_eq!(amount.to_string(), "12.34");
/// ```
///
/// Parsing from user input (either separator, optional `R$`, at most two
/// decimals):
///
/// ```rust
/// use engine::MoneyCents;
///
/// assert_eq!("10".parse::<MoneyCents>().unwrap().cents(), 1000);
/// assert_eq!("10,5".parse::<MoneyCents>().unwrap().cents(), 1050);
/// assert!("12.345".parse::<MoneyCents>().is_err());
/// ```
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
#[repr(transparent)]
pub struct MoneyCents(i64);

impl MoneyCents {
    pub const ZERO: MoneyCents = MoneyCents(0);

    /// Creates a new amount from integer cents.
    #[must_use]
    pub const fn new(cents: i64) -> Self {
        Self(cents)
    }

    /// Returns the raw value in cents.
    #[must_use]
    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Returns `true` if the amount is 0.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if the amount is positive.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Returns `true` if the amount is negative.
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Checked addition (returns `None` on overflow).
    #[must_use]
    pub fn checked_add(self, rhs: MoneyCents) -> Option<MoneyCents> {
        self.0.checked_add(rhs.0).map(MoneyCents)
    }

    /// Checked subtraction (returns `None` on overflow).
    #[must_use]
    pub fn checked_sub(self, rhs: MoneyCents) -> Option<MoneyCents> {
        self.0.checked_sub(rhs.0).map(MoneyCents)
    }

    /// Clamps negative values to zero.
    #[must_use]
    pub fn non_negative(self) -> MoneyCents {
        MoneyCents(self.0.max(0))
    }

    /// Multiplies by a decimal factor, rounding half away from zero to the cent.
    #[must_use]
    pub fn scaled(self, factor: f64) -> MoneyCents {
        MoneyCents((self.0 as f64 * factor).round() as i64)
    }

    /// Splits the amount into `parts` installments.
    ///
    /// Every part gets `self / parts` (truncated); the last one absorbs the
    /// remainder so the parts always sum back to `self`.
    pub fn split(self, parts: u32) -> Vec<MoneyCents> {
        if parts == 0 {
            return Vec::new();
        }
        let count = i64::from(parts);
        let base = self.0 / count;
        let remainder = self.0 - base * count;
        let mut out = vec![MoneyCents(base); parts as usize];
        if let Some(last) = out.last_mut() {
            last.0 += remainder;
        }
        out
    }
}

impl std::iter::Sum for MoneyCents {
    fn sum<I: Iterator<Item = MoneyCents>>(iter: I) -> Self {
        MoneyCents(iter.map(|m| m.0).sum())
    }
}

impl fmt::Display for MoneyCents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let units = abs / 100;
        let cents = abs % 100;
        write!(f, "{sign}{units}.{cents:02}")
    }
}

impl From<i64> for MoneyCents {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<MoneyCents> for i64 {
    fn from(value: MoneyCents) -> Self {
        value.0
    }
}

impl Add for MoneyCents {
    type Output = MoneyCents;

    fn add(self, rhs: MoneyCents) -> Self::Output {
        MoneyCents(self.0 + rhs.0)
    }
}

impl AddAssign for MoneyCents {
    fn add_assign(&mut self, rhs: MoneyCents) {
        self.0 += rhs.0;
    }
}

impl Sub for MoneyCents {
    type Output = MoneyCents;

    fn sub(self, rhs: MoneyCents) -> Self::Output {
        MoneyCents(self.0 - rhs.0)
    }
}

impl SubAssign for MoneyCents {
    fn sub_assign(&mut self, rhs: MoneyCents) {
        self.0 -= rhs.0;
    }
}

impl Neg for MoneyCents {
    type Output = MoneyCents;

    fn neg(self) -> Self::Output {
        MoneyCents(-self.0)
    }
}

fn invalid_amount(reason: &str) -> EngineError {
    EngineError::InvalidAmount(reason.to_string())
}

/// Splits `raw` into whole units and the fractional digits.
///
/// With a single kind of separator it is the decimal one. When both `.` and
/// `,` appear, the rightmost is the decimal separator and the other one only
/// groups thousands (`1.234,56`, `1,234.56`).
fn split_decimal(raw: &str) -> Result<(String, &str), EngineError> {
    let decimal_at = raw.rfind(['.', ',']);
    let (whole, frac) = match decimal_at {
        Some(at) => (&raw[..at], &raw[at + 1..]),
        None => (raw, ""),
    };
    let grouping = match decimal_at.map(|at| &raw[at..=at]) {
        Some(".") => ',',
        Some(_) => '.',
        None => return Ok((whole.to_string(), frac)),
    };
    if whole.contains(['.', ','].as_slice()) && !whole.contains(grouping) {
        return Err(invalid_amount("invalid amount"));
    }
    if whole.contains(grouping) {
        let mut groups = whole.split(grouping);
        let head_ok = groups.next().is_some_and(|g| (1..=3).contains(&g.len()));
        if !head_ok || !groups.all(|g| g.len() == 3) {
            return Err(invalid_amount("invalid digit grouping"));
        }
    }
    Ok((whole.replace(grouping, ""), frac))
}

impl FromStr for MoneyCents {
    type Err = EngineError;

    /// Parses user input such as `10`, `10,5`, `-0.01`, `R$ 1.234,56`.
    ///
    /// At most two fractional digits are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (negative, rest) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };
        let rest = rest.trim_start();
        let rest = rest.strip_prefix("R$").unwrap_or(rest).trim();
        if rest.is_empty() {
            return Err(invalid_amount("empty amount"));
        }

        let (whole, frac) = split_decimal(rest)?;
        let digits_only = |v: &str| v.chars().all(|c| c.is_ascii_digit());
        if whole.is_empty() || !digits_only(&whole) || !digits_only(frac) {
            return Err(invalid_amount("invalid amount"));
        }
        if frac.len() > 2 {
            return Err(invalid_amount("too many decimals"));
        }

        let units: i64 = whole
            .parse()
            .map_err(|_| invalid_amount("amount too large"))?;
        let cents = match frac.len() {
            0 => 0,
            len => {
                let value: i64 = frac.parse().map_err(|_| invalid_amount("invalid amount"))?;
                if len == 1 { value * 10 } else { value }
            }
        };
        let total = units
            .checked_mul(100)
            .and_then(|v| v.checked_add(cents))
            .ok_or_else(|| invalid_amount("amount too large"))?;
        Ok(MoneyCents(if negative { -total } else { total }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats_two_decimals() {
        assert_eq!(MoneyCents::new(0).to_string(), "0.00");
        assert_eq!(MoneyCents::new(1).to_string(), "0.01");
        assert_eq!(MoneyCents::new(1050).to_string(), "10.50");
        assert_eq!(MoneyCents::new(-1050).to_string(), "-10.50");
    }

    #[test]
    fn parse_accepts_dot_or_comma() {
        assert_eq!("10".parse::<MoneyCents>().unwrap().cents(), 1000);
        assert_eq!("10.5".parse::<MoneyCents>().unwrap().cents(), 1050);
        assert_eq!("10,50".parse::<MoneyCents>().unwrap().cents(), 1050);
        assert_eq!("-0.01".parse::<MoneyCents>().unwrap().cents(), -1);
        assert_eq!("+1.00".parse::<MoneyCents>().unwrap().cents(), 100);
        assert_eq!("  2.30 ".parse::<MoneyCents>().unwrap().cents(), 230);
    }

    #[test]
    fn parse_rejects_more_than_two_decimals() {
        assert!("12.345".parse::<MoneyCents>().is_err());
        assert!("0.001".parse::<MoneyCents>().is_err());
    }

    #[test]
    fn parse_handles_real_prefix_and_grouping() {
        assert_eq!("R$ 1.234,56".parse::<MoneyCents>().unwrap().cents(), 123_456);
        assert_eq!("1,234.5".parse::<MoneyCents>().unwrap().cents(), 123_450);
        assert_eq!("-R$ 12".parse::<MoneyCents>().unwrap().cents(), -1200);
        assert_eq!("12.".parse::<MoneyCents>().unwrap().cents(), 1200);
        assert!("1.23.4,00".parse::<MoneyCents>().is_err());
        assert!("1.2,00".parse::<MoneyCents>().is_err());
        assert!("R$".parse::<MoneyCents>().is_err());
        assert!("abc".parse::<MoneyCents>().is_err());
    }

    #[test]
    fn split_puts_remainder_on_last_part() {
        let parts = MoneyCents::new(100_00).split(3);
        assert_eq!(
            parts,
            vec![
                MoneyCents::new(33_33),
                MoneyCents::new(33_33),
                MoneyCents::new(33_34)
            ]
        );
        assert_eq!(parts.into_iter().sum::<MoneyCents>(), MoneyCents::new(100_00));
        assert!(MoneyCents::new(5).split(0).is_empty());
    }

    #[test]
    fn scaled_rounds_half_away_from_zero() {
        assert_eq!(MoneyCents::new(33_33).scaled(0.02), MoneyCents::new(67));
        assert_eq!(MoneyCents::new(50).scaled(0.01), MoneyCents::new(1));
        assert_eq!(MoneyCents::new(-250).scaled(0.5), MoneyCents::new(-125));
    }
}
