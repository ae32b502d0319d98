//! Month-granularity calendar used by every schedule in the crate.
//!
//! Contracts and index series in Brazil are quoted by month (`MM/YYYY`), so a
//! [`MonthYear`] is always pinned to the first day of its month.

use std::fmt;

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A calendar month, e.g. `03/2025`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthYear(NaiveDate);

impl MonthYear {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(MonthYear)
    }

    /// Parses `MM/YYYY` (a single-digit month is accepted).
    pub fn parse(text: &str) -> Option<Self> {
        let (month, year) = text.trim().split_once('/')?;
        let (month, year) = (month.trim(), year.trim());
        if year.len() != 4 || month.is_empty() || month.len() > 2 {
            return None;
        }
        Self::new(year.parse().ok()?, month.parse().ok()?)
    }

    /// The month containing `date`.
    pub fn from_date(date: NaiveDate) -> Self {
        MonthYear(date - Days::new(u64::from(date.day0())))
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn first_day(&self) -> NaiveDate {
        self.0
    }

    pub fn add_months(self, months: u32) -> Self {
        self.0
            .checked_add_months(Months::new(months))
            .map_or(MonthYear::from_date(NaiveDate::MAX), MonthYear)
    }

    pub fn sub_months(self, months: u32) -> Self {
        self.0
            .checked_sub_months(Months::new(months))
            .map_or(MonthYear::from_date(NaiveDate::MIN), MonthYear)
    }

    /// Signed number of months from `self` to `other`.
    pub fn months_until(&self, other: MonthYear) -> i32 {
        (other.year() - self.year()) * 12 + other.month() as i32 - self.month() as i32
    }

    pub fn label(&self) -> String {
        format!("{:02}/{}", self.month(), self.year())
    }
}

impl fmt::Display for MonthYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl Serialize for MonthYear {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label())
    }
}

impl<'de> Deserialize<'de> for MonthYear {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        MonthYear::parse(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid month '{text}', expected MM/YYYY")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("01/2024", Some((2024, 1)))]
    #[case("12/2030", Some((2030, 12)))]
    #[case("3/2025", Some((2025, 3)))]
    #[case(" 07/2026 ", Some((2026, 7)))]
    #[case("13/2024", None)]
    #[case("00/2024", None)]
    #[case("01/24", None)]
    #[case("2024-01", None)]
    #[case("", None)]
    fn test_parse_month_year(#[case] text: &str, #[case] expected: Option<(i32, u32)>) {
        let parsed = MonthYear::parse(text).map(|m| (m.year(), m.month()));
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_month_arithmetic_crosses_years() {
        let start = MonthYear::new(2024, 11).unwrap();
        assert_eq!(start.add_months(3), MonthYear::new(2025, 2).unwrap());
        assert_eq!(start.sub_months(11), MonthYear::new(2023, 12).unwrap());
        assert_eq!(start.months_until(MonthYear::new(2026, 1).unwrap()), 14);
        assert_eq!(start.months_until(MonthYear::new(2024, 9).unwrap()), -2);
    }

    #[test]
    fn test_from_date_and_label() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 17).unwrap();
        let month = MonthYear::from_date(date);
        assert_eq!(month.label(), "03/2025");
        assert_eq!(month.first_day(), NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
    }

    #[test]
    fn test_serde_uses_label() {
        let month = MonthYear::new(2025, 6).unwrap();
        let json = serde_json::to_string(&month).unwrap();
        assert_eq!(json, "\"06/2025\"");
        let back: MonthYear = serde_json::from_str(&json).unwrap();
        assert_eq!(back, month);
        assert!(serde_json::from_str::<MonthYear>("\"2025/06\"").is_err());
    }
}
