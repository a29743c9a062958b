//! Calendrical features of a timestamp.

use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};

use crate::frame::Column;

/// Calendar components, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CalendarFeature {
    Year,
    YearIso,
    Half,
    Quarter,
    Month,
    MonthLabel,
    Day,
    Hour,
    Minute,
    Second,
    AmPm,
    AmPmLabel,
    Hour12,
    Wday,
    WdayLabel,
    Qday,
    Yday,
    Week,
    WeekOfMonth,
}

impl CalendarFeature {
    pub const ALL: [CalendarFeature; 19] = [
        CalendarFeature::Year,
        CalendarFeature::YearIso,
        CalendarFeature::Half,
        CalendarFeature::Quarter,
        CalendarFeature::Month,
        CalendarFeature::MonthLabel,
        CalendarFeature::Day,
        CalendarFeature::Hour,
        CalendarFeature::Minute,
        CalendarFeature::Second,
        CalendarFeature::AmPm,
        CalendarFeature::AmPmLabel,
        CalendarFeature::Hour12,
        CalendarFeature::Wday,
        CalendarFeature::WdayLabel,
        CalendarFeature::Qday,
        CalendarFeature::Yday,
        CalendarFeature::Week,
        CalendarFeature::WeekOfMonth,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CalendarFeature::Year => "year",
            CalendarFeature::YearIso => "year_iso",
            CalendarFeature::Half => "half",
            CalendarFeature::Quarter => "quarter",
            CalendarFeature::Month => "month",
            CalendarFeature::MonthLabel => "month_lbl",
            CalendarFeature::Day => "day",
            CalendarFeature::Hour => "hour",
            CalendarFeature::Minute => "minute",
            CalendarFeature::Second => "second",
            CalendarFeature::AmPm => "am_pm",
            CalendarFeature::AmPmLabel => "am_pm_lbl",
            CalendarFeature::Hour12 => "hour12",
            CalendarFeature::Wday => "wday",
            CalendarFeature::WdayLabel => "wday_lbl",
            CalendarFeature::Qday => "qday",
            CalendarFeature::Yday => "yday",
            CalendarFeature::Week => "week",
            CalendarFeature::WeekOfMonth => "week_of_month",
        }
    }

    pub fn is_label(&self) -> bool {
        matches!(
            self,
            CalendarFeature::MonthLabel | CalendarFeature::WdayLabel | CalendarFeature::AmPmLabel
        )
    }

    pub fn is_intraday(&self) -> bool {
        matches!(
            self,
            CalendarFeature::Hour
                | CalendarFeature::Minute
                | CalendarFeature::Second
                | CalendarFeature::AmPm
                | CalendarFeature::AmPmLabel
                | CalendarFeature::Hour12
        )
    }

    pub fn numeric(&self, ts: NaiveDateTime) -> Option<f64> {
        let date = ts.date();
        let value = match self {
            CalendarFeature::Year => date.year() as f64,
            CalendarFeature::YearIso => date.iso_week().year() as f64,
            CalendarFeature::Half => ((date.month() - 1) / 6 + 1) as f64,
            CalendarFeature::Quarter => ((date.month() - 1) / 3 + 1) as f64,
            CalendarFeature::Month => date.month() as f64,
            CalendarFeature::Day => date.day() as f64,
            CalendarFeature::Hour => ts.hour() as f64,
            CalendarFeature::Minute => ts.minute() as f64,
            CalendarFeature::Second => ts.second() as f64,
            CalendarFeature::AmPm => (ts.hour() >= 12) as u8 as f64,
            CalendarFeature::Hour12 => match ts.hour() % 12 {
                0 => 12.0,
                h => h as f64,
            },
            CalendarFeature::Wday => date.weekday().num_days_from_monday() as f64,
            CalendarFeature::Qday => {
                let q_start_month = (date.month() - 1) / 3 * 3 + 1;
                let start = date.with_day(1).and_then(|d| d.with_month(q_start_month))?;
                ((date - start).num_days() + 1) as f64
            }
            CalendarFeature::Yday => date.ordinal() as f64,
            CalendarFeature::Week => date.iso_week().week() as f64,
            CalendarFeature::WeekOfMonth => {
                let first = date.with_day(1)?;
                let offset = first.weekday().num_days_from_monday();
                ((date.day() - 1 + offset) / 7 + 1) as f64
            }
            CalendarFeature::MonthLabel | CalendarFeature::WdayLabel | CalendarFeature::AmPmLabel => {
                return None
            }
        };
        Some(value)
    }

    pub fn label(&self, ts: NaiveDateTime) -> Option<String> {
        match self {
            CalendarFeature::MonthLabel => Some(ts.format("%B").to_string()),
            CalendarFeature::WdayLabel => Some(weekday_name(ts.weekday()).to_string()),
            CalendarFeature::AmPmLabel => Some(if ts.hour() >= 12 { "pm" } else { "am" }.to_string()),
            _ => None,
        }
    }

    /// Column of this feature over `times`; labels are text, the rest float.
    pub fn column(&self, times: &[Option<NaiveDateTime>]) -> Column {
        if self.is_label() {
            Column::Text(times.iter().map(|t| t.and_then(|t| self.label(t))).collect())
        } else {
            Column::Float(
                times
                    .iter()
                    .map(|t| t.and_then(|t| self.numeric(t)).unwrap_or(f64::NAN))
                    .collect(),
            )
        }
    }
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// True when any timestamp carries a non-midnight time of day.
pub fn has_intraday_component(times: &[NaiveDateTime]) -> bool {
    times
        .iter()
        .any(|t| t.hour() != 0 || t.minute() != 0 || t.second() != 0)
}
