mod account;
mod event;
mod reservation;
mod schedule;
mod time;

use std::fmt::{self, Display};
use std::str::FromStr;

use derive_more::{Add, AddAssign, Display as DisplayDerive, Error, Neg, Sub, SubAssign};
use num_format::{Locale, ToFormattedString};
use serde::{Deserialize, Serialize};

pub use self::account::*;
pub use self::event::*;
pub use self::reservation::*;
pub use self::schedule::*;
pub use self::time::*;

/// Signed currency amount held in cents.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Add,
    Sub,
    Neg,
    AddAssign,
    SubAssign,
)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub const fn from_units(units: i64) -> Self {
        Self(units * 100)
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Shortest decimal form, as written to the flat-file tables: `40`, `12.5`, `-3.25`.
    pub fn to_plain_string(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        match abs % 100 {
            0 => format!("{}{}", sign, abs / 100),
            c if c % 10 == 0 => format!("{}{}.{}", sign, abs / 100, c / 10),
            c => format!("{}{}.{:02}", sign, abs / 100, c),
        }
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(
            f,
            "{}${}.{:02}",
            sign,
            (abs / 100).to_formatted_string(&Locale::en),
            abs % 100
        )
    }
}

impl FromStr for Money {
    type Err = MoneyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || MoneyParseError(s.to_owned());
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (units, fraction) = match digits.split_once('.') {
            Some((units, fraction)) => (units, fraction),
            None => (digits, ""),
        };
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if units.is_empty() || !all_digits(units) || !all_digits(fraction) || fraction.len() > 2 {
            return Err(err());
        }
        let units = units.parse::<i64>().map_err(|_| err())?;
        let cents = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().map_err(|_| err())? * 10,
            _ => fraction.parse::<i64>().map_err(|_| err())?,
        };
        let total = units
            .checked_mul(100)
            .and_then(|c| c.checked_add(cents))
            .ok_or_else(err)?;
        Ok(Self(if negative { -total } else { total }))
    }
}

/// Keys and passwords end up in whitespace-delimited records.
pub(crate) fn is_record_token(value: &str) -> bool {
    !value.is_empty() && !value.chars().any(char::is_whitespace)
}

#[derive(Debug, DisplayDerive, Error, Clone, PartialEq, Eq)]
#[display(fmt = "Invalid amount: {:?}", _0)]
pub struct MoneyParseError(#[error(not(source))] String);
