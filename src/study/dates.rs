//! Date expressions anchored to the index date
//!
//! A date expression is a base (`index_date` or an ISO date) followed by any
//! number of signed offsets:
//!
//! ```text
//! index_date
//! index_date - 1 day
//! index_date + 364 days
//! index_date + 1 year - 1 day
//! 2018-01-01 + 6 months
//! ```
//!
//! Day offsets follow the `fixed_offset_days` policy: the number of days is
//! added as-is, so `+ 364 days` is one day short of a calendar year in a leap
//! year. Calendar-aware arithmetic happens only for offsets written in months
//! or years.

use std::fmt;

use chrono::{Duration, Months, NaiveDate};

use crate::error::{CohortError, Result};

/// Name of the index date in date expressions
pub const INDEX_DATE: &str = "index_date";

/// Add a whole number of days without any calendar adjustment
#[must_use]
pub fn fixed_offset_days(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    date.checked_add_signed(Duration::try_days(days)?)
}

/// Add a whole number of calendar months, clamping to the end of short months
#[must_use]
pub fn calendar_offset_months(date: NaiveDate, months: i64) -> Option<NaiveDate> {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        date.checked_add_months(magnitude)
    } else {
        date.checked_sub_months(magnitude)
    }
}

/// What a date expression starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateBase {
    /// The run's index date
    IndexDate,
    /// A fixed calendar date
    Fixed(NaiveDate),
}

/// A signed offset applied to a date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offset {
    /// Whole days, added with [`fixed_offset_days`]
    Days(i64),
    /// Calendar months
    Months(i64),
    /// Calendar years
    Years(i64),
}

impl Offset {
    fn apply(self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            Self::Days(n) => fixed_offset_days(date, n),
            Self::Months(n) => calendar_offset_months(date, n),
            Self::Years(n) => calendar_offset_months(date, n.checked_mul(12)?),
        }
    }
}

/// A parsed date expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateAnchor {
    /// Starting point
    pub base: DateBase,
    /// Offsets applied left to right
    pub offsets: Vec<Offset>,
}

impl DateAnchor {
    /// The index date itself
    #[must_use]
    pub const fn index_date() -> Self {
        Self {
            base: DateBase::IndexDate,
            offsets: Vec::new(),
        }
    }

    /// The index date shifted by a number of days
    #[must_use]
    pub fn index_offset_days(days: i64) -> Self {
        Self {
            base: DateBase::IndexDate,
            offsets: vec![Offset::Days(days)],
        }
    }

    /// Parse a date expression
    pub fn parse(expression: &str) -> Result<Self> {
        let invalid = |reason: &str| CohortError::invalid_date(expression, reason);
        let mut words = expression.split_whitespace();

        let base = match words.next() {
            Some(INDEX_DATE) => DateBase::IndexDate,
            Some(text) => DateBase::Fixed(
                NaiveDate::parse_from_str(text, "%Y-%m-%d")
                    .map_err(|_| invalid("expected 'index_date' or a YYYY-MM-DD date"))?,
            ),
            None => return Err(invalid("empty date expression")),
        };

        let mut offsets = Vec::new();
        while let Some(sign) = words.next() {
            let negative = match sign {
                "+" => false,
                "-" => true,
                _ => return Err(invalid("expected '+' or '-' before an offset")),
            };
            let amount: i64 = words
                .next()
                .ok_or_else(|| invalid("missing offset amount"))?
                .parse()
                .map_err(|_| invalid("offset amount must be a whole number"))?;
            let amount = if negative { -amount } else { amount };
            let offset = match words.next() {
                Some("day" | "days") => Offset::Days(amount),
                Some("month" | "months") => Offset::Months(amount),
                Some("year" | "years") => Offset::Years(amount),
                Some(_) => return Err(invalid("offset unit must be days, months or years")),
                None => return Err(invalid("missing offset unit")),
            };
            offsets.push(offset);
        }

        Ok(Self { base, offsets })
    }

    /// Resolve against an index date, `None` if the result is out of range
    #[must_use]
    pub fn resolve(&self, index_date: NaiveDate) -> Option<NaiveDate> {
        let start = match self.base {
            DateBase::IndexDate => index_date,
            DateBase::Fixed(date) => date,
        };
        self.offsets
            .iter()
            .try_fold(start, |date, offset| offset.apply(date))
    }
}

impl fmt::Display for DateAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.base {
            DateBase::IndexDate => f.write_str(INDEX_DATE)?,
            DateBase::Fixed(date) => write!(f, "{}", date.format("%Y-%m-%d"))?,
        }
        for offset in &self.offsets {
            let (n, unit) = match offset {
                Offset::Days(n) => (*n, "days"),
                Offset::Months(n) => (*n, "months"),
                Offset::Years(n) => (*n, "years"),
            };
            let sign = if n < 0 { '-' } else { '+' };
            write!(f, " {sign} {} {unit}", n.unsigned_abs())?;
        }
        Ok(())
    }
}

/// An inclusive date interval, open on a side whose bound is absent
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DateWindow {
    /// Lower bound (inclusive)
    pub start: Option<DateAnchor>,
    /// Upper bound (inclusive)
    pub end: Option<DateAnchor>,
}

/// A date window resolved for one index date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedWindow {
    /// Lower bound (inclusive)
    pub start: Option<NaiveDate>,
    /// Upper bound (inclusive)
    pub end: Option<NaiveDate>,
}

impl DateWindow {
    /// Resolve both bounds, `None` if either is out of range
    #[must_use]
    pub fn resolve(&self, index_date: NaiveDate) -> Option<ResolvedWindow> {
        let start = match &self.start {
            Some(anchor) => Some(anchor.resolve(index_date)?),
            None => None,
        };
        let end = match &self.end {
            Some(anchor) => Some(anchor.resolve(index_date)?),
            None => None,
        };
        Some(ResolvedWindow { start, end })
    }
}

impl ResolvedWindow {
    /// Whether `date` lies inside the window
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|start| start <= date) && self.end.is_none_or(|end| date <= end)
    }
}
