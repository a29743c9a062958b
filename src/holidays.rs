//! Rule-based public holiday calendars for a handful of countries.

use chrono::{Datelike, Duration, NaiveDate, Weekday};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Holiday {
    pub name: &'static str,
    /// Commonly a day off with pay.
    pub paid_time_off: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Country {
    Us,
    Gb,
    De,
    Ca,
    Fr,
}

impl Country {
    /// Accepts ISO 3166 alpha-2 codes and a few common names.
    pub fn parse(raw: &str) -> Option<Country> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "US" | "USA" | "UNITED STATES" => Some(Country::Us),
            "GB" | "UK" | "UNITED KINGDOM" => Some(Country::Gb),
            "DE" | "GERMANY" => Some(Country::De),
            "CA" | "CANADA" => Some(Country::Ca),
            "FR" | "FRANCE" => Some(Country::Fr),
            _ => None,
        }
    }

    pub fn holiday(&self, date: NaiveDate) -> Option<Holiday> {
        let rules: &[Rule] = match self {
            Country::Us => US_RULES,
            Country::Gb => GB_RULES,
            Country::De => DE_RULES,
            Country::Ca => CA_RULES,
            Country::Fr => FR_RULES,
        };
        // Observed New Year's Day can fall on December 31st of the prior year.
        rules.iter().find_map(|rule| {
            [date.year(), date.year() + 1].into_iter().find_map(|year| {
                let day = rule.date(year)?;
                let observed = if rule.observed { observed_weekday(day) } else { day };
                (observed == date).then_some(Holiday {
                    name: rule.name,
                    paid_time_off: rule.paid,
                })
            })
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum When {
    Fixed(u32, u32),
    /// n-th weekday of a month; negative n counts from the end.
    NthWeekday(u32, Weekday, i32),
    /// Days relative to Easter Sunday.
    Easter(i64),
    /// Last Monday strictly before the given month and day.
    MondayBefore(u32, u32),
}

#[derive(Debug, Clone, Copy)]
struct Rule {
    name: &'static str,
    when: When,
    paid: bool,
    observed: bool,
}

impl Rule {
    const fn new(name: &'static str, when: When, paid: bool, observed: bool) -> Self {
        Self {
            name,
            when,
            paid,
            observed,
        }
    }

    fn date(&self, year: i32) -> Option<NaiveDate> {
        match self.when {
            When::Fixed(m, d) => NaiveDate::from_ymd_opt(year, m, d),
            When::NthWeekday(m, wd, n) => nth_weekday(year, m, wd, n),
            When::Easter(delta) => easter_sunday(year).map(|e| e + Duration::days(delta)),
            When::MondayBefore(m, d) => {
                let mut day = NaiveDate::from_ymd_opt(year, m, d)?.pred_opt()?;
                while day.weekday() != Weekday::Mon {
                    day = day.pred_opt()?;
                }
                Some(day)
            }
        }
    }
}

const US_RULES: &[Rule] = &[
    Rule::new("New Year's Day", When::Fixed(1, 1), true, true),
    Rule::new("Martin Luther King Jr. Day", When::NthWeekday(1, Weekday::Mon, 3), true, false),
    Rule::new("Washington's Birthday", When::NthWeekday(2, Weekday::Mon, 3), true, false),
    Rule::new("Memorial Day", When::NthWeekday(5, Weekday::Mon, -1), true, false),
    Rule::new("Independence Day", When::Fixed(7, 4), true, true),
    Rule::new("Labor Day", When::NthWeekday(9, Weekday::Mon, 1), true, false),
    Rule::new("Columbus Day", When::NthWeekday(10, Weekday::Mon, 2), false, false),
    Rule::new("Veterans Day", When::Fixed(11, 11), false, true),
    Rule::new("Thanksgiving", When::NthWeekday(11, Weekday::Thu, 4), true, false),
    Rule::new("Christmas Day", When::Fixed(12, 25), true, true),
];

const GB_RULES: &[Rule] = &[
    Rule::new("New Year's Day", When::Fixed(1, 1), true, true),
    Rule::new("Good Friday", When::Easter(-2), true, false),
    Rule::new("Easter Monday", When::Easter(1), true, false),
    Rule::new("Early May Bank Holiday", When::NthWeekday(5, Weekday::Mon, 1), true, false),
    Rule::new("Spring Bank Holiday", When::NthWeekday(5, Weekday::Mon, -1), true, false),
    Rule::new("Summer Bank Holiday", When::NthWeekday(8, Weekday::Mon, -1), true, false),
    Rule::new("Christmas Day", When::Fixed(12, 25), true, false),
    Rule::new("Boxing Day", When::Fixed(12, 26), true, false),
];

const DE_RULES: &[Rule] = &[
    Rule::new("Neujahr", When::Fixed(1, 1), true, false),
    Rule::new("Karfreitag", When::Easter(-2), true, false),
    Rule::new("Ostermontag", When::Easter(1), true, false),
    Rule::new("Tag der Arbeit", When::Fixed(5, 1), true, false),
    Rule::new("Christi Himmelfahrt", When::Easter(39), true, false),
    Rule::new("Pfingstmontag", When::Easter(50), true, false),
    Rule::new("Tag der Deutschen Einheit", When::Fixed(10, 3), true, false),
    Rule::new("Erster Weihnachtstag", When::Fixed(12, 25), true, false),
    Rule::new("Zweiter Weihnachtstag", When::Fixed(12, 26), true, false),
];

const CA_RULES: &[Rule] = &[
    Rule::new("New Year's Day", When::Fixed(1, 1), true, true),
    Rule::new("Good Friday", When::Easter(-2), true, false),
    Rule::new("Victoria Day", When::MondayBefore(5, 25), true, false),
    Rule::new("Canada Day", When::Fixed(7, 1), true, true),
    Rule::new("Civic Holiday", When::NthWeekday(8, Weekday::Mon, 1), false, false),
    Rule::new("Labour Day", When::NthWeekday(9, Weekday::Mon, 1), true, false),
    Rule::new("Thanksgiving", When::NthWeekday(10, Weekday::Mon, 2), true, false),
    Rule::new("Remembrance Day", When::Fixed(11, 11), false, false),
    Rule::new("Christmas Day", When::Fixed(12, 25), true, true),
    Rule::new("Boxing Day", When::Fixed(12, 26), false, false),
];

const FR_RULES: &[Rule] = &[
    Rule::new("Jour de l'an", When::Fixed(1, 1), true, false),
    Rule::new("Lundi de Pâques", When::Easter(1), true, false),
    Rule::new("Fête du Travail", When::Fixed(5, 1), true, false),
    Rule::new("Victoire 1945", When::Fixed(5, 8), true, false),
    Rule::new("Ascension", When::Easter(39), true, false),
    Rule::new("Lundi de Pentecôte", When::Easter(50), false, false),
    Rule::new("Fête nationale", When::Fixed(7, 14), true, false),
    Rule::new("Assomption", When::Fixed(8, 15), true, false),
    Rule::new("Toussaint", When::Fixed(11, 1), true, false),
    Rule::new("Armistice", When::Fixed(11, 11), true, false),
    Rule::new("Noël", When::Fixed(12, 25), true, false),
];

fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: i32) -> Option<NaiveDate> {
    if n > 0 {
        NaiveDate::from_weekday_of_month_opt(year, month, weekday, n as u8)
    } else {
        let (ny, nm) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
        let mut day = NaiveDate::from_ymd_opt(ny, nm, 1)?.pred_opt()?;
        while day.weekday() != weekday {
            day = day.pred_opt()?;
        }
        Some(day - Duration::weeks(i64::from(-n - 1)))
    }
}

/// Saturday holidays move to Friday, Sunday holidays to Monday.
fn observed_weekday(day: NaiveDate) -> NaiveDate {
    match day.weekday() {
        Weekday::Sat => day - Duration::days(1),
        Weekday::Sun => day + Duration::days(1),
        _ => day,
    }
}

/// Gregorian Easter Sunday (anonymous algorithm).
pub fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn easter_dates() {
        assert_eq!(easter_sunday(2020), Some(date(2020, 4, 12)));
        assert_eq!(easter_sunday(2024), Some(date(2024, 3, 31)));
    }

    #[test]
    fn us_rules_with_observed_days() {
        let us = Country::parse("us").expect("known");
        assert_eq!(
            us.holiday(date(2020, 11, 26)).map(|h| h.name),
            Some("Thanksgiving")
        );
        assert_eq!(
            us.holiday(date(2020, 5, 25)).map(|h| h.name),
            Some("Memorial Day")
        );
        // July 4th 2020 was a Saturday.
        assert_eq!(
            us.holiday(date(2020, 7, 3)).map(|h| h.name),
            Some("Independence Day")
        );
        assert!(us.holiday(date(2020, 7, 4)).is_none());
        assert_eq!(
            us.holiday(date(2020, 10, 12)).map(|h| h.paid_time_off),
            Some(false)
        );
    }

    #[test]
    fn european_and_canadian_rules() {
        let de = Country::parse("DE").expect("known");
        assert_eq!(
            de.holiday(date(2020, 5, 21)).map(|h| h.name),
            Some("Christi Himmelfahrt")
        );
        let ca = Country::parse("Canada").expect("known");
        assert_eq!(
            ca.holiday(date(2021, 5, 24)).map(|h| h.name),
            Some("Victoria Day")
        );
        assert!(Country::parse("Narnia").is_none());
    }
}
