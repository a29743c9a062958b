//! Canonical date offsets: shifting, grid membership and aliases.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};

use crate::error::FeaturizeError;

const DAY_SECONDS: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OffsetUnit {
    Second,
    Minute,
    Hour,
    Day,
    BusinessDay,
    Week(Weekday),
    MonthStart,
    MonthEnd,
    /// Anchor month (1..=12) of one of the quarter starts.
    QuarterStart(u32),
    QuarterEnd(u32),
    YearStart(u32),
    YearEnd(u32),
    /// Calendar months preserving the day of month.
    Months,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Offset {
    n: i64,
    unit: OffsetUnit,
}

impl Offset {
    pub fn new(n: i64, unit: OffsetUnit) -> Result<Self, FeaturizeError> {
        if n < 1 {
            return Err(FeaturizeError::InvalidConfig(format!(
                "offset multiple must be positive, got {n}"
            )));
        }
        let anchor = match unit {
            OffsetUnit::QuarterStart(m)
            | OffsetUnit::QuarterEnd(m)
            | OffsetUnit::YearStart(m)
            | OffsetUnit::YearEnd(m) => Some(m),
            _ => None,
        };
        if let Some(m) = anchor {
            if !(1..=12).contains(&m) {
                return Err(FeaturizeError::InvalidConfig(format!(
                    "offset anchor month must be 1..=12, got {m}"
                )));
            }
        }
        Ok(Self { n, unit })
    }

    pub(crate) fn unit_of(n: i64, unit: OffsetUnit) -> Self {
        Self { n: n.max(1), unit }
    }

    pub fn seconds(n: i64) -> Self {
        Self::unit_of(n, OffsetUnit::Second)
    }

    pub fn minutes(n: i64) -> Self {
        Self::unit_of(n, OffsetUnit::Minute)
    }

    pub fn hours(n: i64) -> Self {
        Self::unit_of(n, OffsetUnit::Hour)
    }

    pub fn days(n: i64) -> Self {
        Self::unit_of(n, OffsetUnit::Day)
    }

    pub fn n(&self) -> i64 {
        self.n
    }

    pub fn unit(&self) -> OffsetUnit {
        self.unit
    }

    /// Fixed step length for tick-like units.
    pub fn tick_seconds(&self) -> Option<i64> {
        let base = match self.unit {
            OffsetUnit::Second => 1,
            OffsetUnit::Minute => 60,
            OffsetUnit::Hour => 3_600,
            OffsetUnit::Day => DAY_SECONDS,
            OffsetUnit::Week(_) => 7 * DAY_SECONDS,
            _ => return None,
        };
        Some(base * self.n)
    }

    fn month_step(&self) -> Option<i64> {
        match self.unit {
            OffsetUnit::MonthStart | OffsetUnit::MonthEnd | OffsetUnit::Months => Some(self.n),
            OffsetUnit::QuarterStart(_) | OffsetUnit::QuarterEnd(_) => Some(3 * self.n),
            OffsetUnit::YearStart(_) | OffsetUnit::YearEnd(_) => Some(12 * self.n),
            _ => None,
        }
    }

    /// Average step length, used for ordering offsets.
    pub fn approx_seconds(&self) -> i64 {
        if let Some(s) = self.tick_seconds() {
            return s;
        }
        if let Some(m) = self.month_step() {
            return m * 2_629_746;
        }
        // business day
        self.n * DAY_SECONDS * 7 / 5
    }

    pub fn has_intraday_step(&self) -> bool {
        matches!(
            self.unit,
            OffsetUnit::Second | OffsetUnit::Minute | OffsetUnit::Hour
        )
    }

    pub fn is_daily(&self) -> bool {
        matches!(self.unit, OffsetUnit::Day | OffsetUnit::BusinessDay) && self.n == 1
    }

    /// `ts` moved by `k` offsets. Saturates at the representable range.
    pub fn shift(&self, ts: NaiveDateTime, k: i64) -> NaiveDateTime {
        self.checked_shift(ts, k).unwrap_or(if k < 0 {
            NaiveDateTime::MIN
        } else {
            NaiveDateTime::MAX
        })
    }

    fn checked_shift(&self, ts: NaiveDateTime, k: i64) -> Option<NaiveDateTime> {
        if k == 0 {
            return Some(ts);
        }
        if let Some(step) = self.tick_seconds() {
            let secs = step.checked_mul(k)?;
            return ts.checked_add_signed(Duration::try_seconds(secs)?);
        }
        if let Some(step) = self.month_step() {
            let months = step.checked_mul(k)?;
            let time = ts.time();
            let date = ts.date();
            let shifted = match self.unit {
                OffsetUnit::Months => add_months(date, months)?,
                OffsetUnit::MonthStart | OffsetUnit::QuarterStart(_) | OffsetUnit::YearStart(_) => {
                    add_months(first_of_month(date)?, months)?
                }
                _ => last_of_month(add_months(first_of_month(date)?, months)?)?,
            };
            return Some(shifted.and_time(time));
        }
        shift_business_days(ts, self.n.checked_mul(k)?)
    }

    /// Whether `ts` falls on an anchor point of this offset.
    pub fn on_offset(&self, ts: NaiveDateTime) -> bool {
        let date = ts.date();
        let is_last = last_of_month(date).map(|d| d == date).unwrap_or(false);
        match self.unit {
            OffsetUnit::Second
            | OffsetUnit::Minute
            | OffsetUnit::Hour
            | OffsetUnit::Day
            | OffsetUnit::Months => true,
            OffsetUnit::BusinessDay => !is_weekend(date.weekday()),
            OffsetUnit::Week(anchor) => date.weekday() == anchor,
            OffsetUnit::MonthStart => date.day() == 1,
            OffsetUnit::MonthEnd => is_last,
            OffsetUnit::QuarterStart(anchor) => {
                date.day() == 1 && (date.month() + 12 - anchor) % 3 == 0
            }
            OffsetUnit::QuarterEnd(anchor) => is_last && (date.month() + 12 - anchor) % 3 == 0,
            OffsetUnit::YearStart(anchor) => date.day() == 1 && date.month() == anchor,
            OffsetUnit::YearEnd(anchor) => is_last && date.month() == anchor,
        }
    }

    /// Number of offsets from `from` to `to` when `to` lies on the grid anchored at `from`.
    pub fn steps_between(&self, from: NaiveDateTime, to: NaiveDateTime) -> Option<i64> {
        let estimate = if let Some(step) = self.tick_seconds() {
            let diff = (to - from).num_seconds();
            if (to - from).subsec_nanos() != 0 || diff % step != 0 {
                return None;
            }
            return Some(diff / step);
        } else if let Some(step) = self.month_step() {
            let months = month_index(to.date()) - month_index(from.date());
            if months % step != 0 {
                return None;
            }
            months / step
        } else {
            if is_weekend(from.date().weekday()) || is_weekend(to.date().weekday()) {
                return None;
            }
            let count = business_days_between(from.date(), to.date());
            if count % self.n != 0 {
                return None;
            }
            count / self.n
        };
        (self.checked_shift(from, estimate)? == to).then_some(estimate)
    }

    /// Calendar period used as default seasonality and max horizon.
    pub fn seasonality(&self) -> usize {
        match self.unit {
            OffsetUnit::Second | OffsetUnit::Minute => 60,
            OffsetUnit::Hour => 24,
            OffsetUnit::Day => 7,
            OffsetUnit::BusinessDay => 5,
            OffsetUnit::Week(_) => 4,
            OffsetUnit::MonthStart | OffsetUnit::MonthEnd | OffsetUnit::Months => 12,
            OffsetUnit::QuarterStart(_) | OffsetUnit::QuarterEnd(_) => 4,
            OffsetUnit::YearStart(_) | OffsetUnit::YearEnd(_) => 1,
        }
    }

    pub fn alias(&self) -> String {
        let base = match self.unit {
            OffsetUnit::Second => "S".to_string(),
            OffsetUnit::Minute => "T".to_string(),
            OffsetUnit::Hour => "H".to_string(),
            OffsetUnit::Day => "D".to_string(),
            OffsetUnit::BusinessDay => "B".to_string(),
            OffsetUnit::Week(day) => format!("W-{}", weekday_code(day)),
            OffsetUnit::MonthStart => "MS".to_string(),
            OffsetUnit::MonthEnd => "M".to_string(),
            OffsetUnit::QuarterStart(m) => format!("QS-{}", MONTH_CODES[m as usize - 1]),
            OffsetUnit::QuarterEnd(m) => format!("Q-{}", MONTH_CODES[m as usize - 1]),
            OffsetUnit::YearStart(m) => format!("AS-{}", MONTH_CODES[m as usize - 1]),
            OffsetUnit::YearEnd(m) => format!("A-{}", MONTH_CODES[m as usize - 1]),
            OffsetUnit::Months => "MO".to_string(),
        };
        if self.n == 1 {
            base
        } else {
            format!("{}{}", self.n, base)
        }
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.alias())
    }
}

impl FromStr for Offset {
    type Err = FeaturizeError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let digits = trimmed.chars().take_while(char::is_ascii_digit).count();
        let n = if digits == 0 {
            1
        } else {
            trimmed[..digits]
                .parse::<i64>()
                .map_err(|_| unknown_frequency(raw))?
        };
        let rest = &trimmed[digits..];
        let (base, anchor) = match rest.split_once('-') {
            Some((b, a)) => (b, Some(a.to_ascii_uppercase())),
            None => (rest, None),
        };
        let month_anchor = |default: u32| -> Result<u32, FeaturizeError> {
            match &anchor {
                None => Ok(default),
                Some(code) => MONTH_CODES
                    .iter()
                    .position(|m| m == code)
                    .map(|p| p as u32 + 1)
                    .ok_or_else(|| unknown_frequency(raw)),
            }
        };
        let unit = match base {
            "S" | "s" | "sec" => OffsetUnit::Second,
            "T" | "min" => OffsetUnit::Minute,
            "H" | "h" => OffsetUnit::Hour,
            "D" | "d" => OffsetUnit::Day,
            "B" => OffsetUnit::BusinessDay,
            "W" => {
                let day = match &anchor {
                    None => Weekday::Sun,
                    Some(code) => parse_weekday(code).ok_or_else(|| unknown_frequency(raw))?,
                };
                OffsetUnit::Week(day)
            }
            "MS" => OffsetUnit::MonthStart,
            "M" | "ME" => OffsetUnit::MonthEnd,
            "MO" => OffsetUnit::Months,
            "QS" => OffsetUnit::QuarterStart(month_anchor(1)?),
            "Q" | "QE" => OffsetUnit::QuarterEnd(month_anchor(12)?),
            "AS" | "YS" => OffsetUnit::YearStart(month_anchor(1)?),
            "A" | "Y" | "YE" => OffsetUnit::YearEnd(month_anchor(12)?),
            _ => return Err(unknown_frequency(raw)),
        };
        if anchor.is_some()
            && !matches!(
                unit,
                OffsetUnit::Week(_)
                    | OffsetUnit::QuarterStart(_)
                    | OffsetUnit::QuarterEnd(_)
                    | OffsetUnit::YearStart(_)
                    | OffsetUnit::YearEnd(_)
            )
        {
            return Err(unknown_frequency(raw));
        }
        Offset::new(n, unit)
    }
}

const MONTH_CODES: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

fn unknown_frequency(raw: &str) -> FeaturizeError {
    FeaturizeError::InvalidConfig(format!("unrecognized frequency {raw:?}"))
}

fn weekday_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MON",
        Weekday::Tue => "TUE",
        Weekday::Wed => "WED",
        Weekday::Thu => "THU",
        Weekday::Fri => "FRI",
        Weekday::Sat => "SAT",
        Weekday::Sun => "SUN",
    }
}

fn parse_weekday(code: &str) -> Option<Weekday> {
    [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ]
    .into_iter()
    .find(|d| weekday_code(*d) == code)
}

pub(crate) fn is_weekend(day: Weekday) -> bool {
    matches!(day, Weekday::Sat | Weekday::Sun)
}

fn month_index(date: NaiveDate) -> i64 {
    date.year() as i64 * 12 + date.month0() as i64
}

fn first_of_month(date: NaiveDate) -> Option<NaiveDate> {
    date.with_day(1)
}

pub(crate) fn last_of_month(date: NaiveDate) -> Option<NaiveDate> {
    let first = first_of_month(date)?;
    add_months(first, 1)?.pred_opt()
}

fn add_months(date: NaiveDate, months: i64) -> Option<NaiveDate> {
    let total = month_index(date).checked_add(months)?;
    let year = i32::try_from(total.div_euclid(12)).ok()?;
    let month = total.rem_euclid(12) as u32 + 1;
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let last_day = {
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year.checked_add(1)?, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?
        };
        next.pred_opt()?.day()
    };
    first.with_day(date.day().min(last_day))
}

fn shift_business_days(ts: NaiveDateTime, k: i64) -> Option<NaiveDateTime> {
    let mut date = ts.date();
    let dir = k.signum();
    let mut remaining = k.abs();
    // snap weekend starts onto the first business day in the direction of travel
    while is_weekend(date.weekday()) && remaining > 0 {
        date = date.checked_add_signed(Duration::days(dir))?;
        if !is_weekend(date.weekday()) {
            remaining -= 1;
        }
    }
    let weeks = remaining / 5;
    date = date.checked_add_signed(Duration::try_days(weeks * 7 * dir)?)?;
    remaining -= weeks * 5;
    while remaining > 0 {
        date = date.checked_add_signed(Duration::days(dir))?;
        if !is_weekend(date.weekday()) {
            remaining -= 1;
        }
    }
    Some(date.and_time(ts.time()))
}

fn business_days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    if to < from {
        return -business_days_between(to, from);
    }
    let days = (to - from).num_days();
    let mut count = days / 7 * 5;
    let mut cursor = from + Duration::days(days / 7 * 7);
    while cursor < to {
        cursor += Duration::days(1);
        if !is_weekend(cursor.weekday()) {
            count += 1;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("valid date")
    }

    #[test]
    fn aliases_round_trip_through_parsing() {
        for alias in [
            "D", "3D", "H", "15T", "S", "B", "W-SUN", "W-WED", "MS", "M", "QS-JAN", "Q-DEC",
            "AS-JAN", "A-DEC", "2MO",
        ] {
            let parsed: Offset = alias.parse().expect("alias parses");
            assert_eq!(parsed.alias(), alias);
        }
        assert!("fortnight".parse::<Offset>().is_err());
        assert!("D-JAN".parse::<Offset>().is_err());
    }

    #[test]
    fn month_end_shift_lands_on_last_day() {
        let offset: Offset = "M".parse().expect("offset");
        assert_eq!(offset.shift(ts(2020, 1, 31), 1), ts(2020, 2, 29));
        assert_eq!(offset.shift(ts(2020, 2, 29), -2), ts(2019, 12, 31));
        assert_eq!(offset.steps_between(ts(2020, 1, 31), ts(2020, 4, 30)), Some(3));
        assert_eq!(offset.steps_between(ts(2020, 1, 31), ts(2020, 4, 15)), None);
    }

    #[test]
    fn business_days_skip_weekends() {
        let offset: Offset = "B".parse().expect("offset");
        // 2020-01-03 is a Friday
        assert_eq!(offset.shift(ts(2020, 1, 3), 1), ts(2020, 1, 6));
        assert_eq!(offset.shift(ts(2020, 1, 6), -1), ts(2020, 1, 3));
        assert_eq!(offset.shift(ts(2020, 1, 1), 10), ts(2020, 1, 15));
        assert_eq!(offset.steps_between(ts(2020, 1, 1), ts(2020, 1, 15)), Some(10));
        assert_eq!(offset.steps_between(ts(2020, 1, 1), ts(2020, 1, 4)), None);
    }

    #[test]
    fn quarter_anchors_follow_the_anchor_month() {
        let offset: Offset = "QS-FEB".parse().expect("offset");
        assert!(offset.on_offset(ts(2020, 5, 1)));
        assert!(!offset.on_offset(ts(2020, 4, 1)));
        assert_eq!(offset.shift(ts(2020, 2, 1), 1), ts(2020, 5, 1));
    }

    #[test]
    fn tick_steps_require_exact_multiples() {
        let offset = Offset::hours(2);
        let start = ts(2020, 1, 1);
        assert_eq!(
            offset.steps_between(start, start + Duration::hours(6)),
            Some(3)
        );
        assert_eq!(offset.steps_between(start, start + Duration::hours(5)), None);
        assert_eq!(offset.seasonality(), 24);
    }
}
