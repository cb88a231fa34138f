//! Calendar helpers shared by the extractor, the merge and the operators.
//!
//! Polars stores `Date` columns as days since the Unix epoch, so every
//! conversion between `NaiveDate` and the frame goes through here.

use chrono::{Datelike, Months, NaiveDate};
use polars::prelude::*;

/// Days from 0001-01-01 (CE) to 1970-01-01.
const UNIX_EPOCH_FROM_CE: i32 = 719_163;

pub fn to_epoch_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_FROM_CE
}

pub fn from_epoch_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_FROM_CE)
}

/// Build a `Date` series from optional dates.
pub fn date_series(name: &str, dates: &[Option<NaiveDate>]) -> PolarsResult<Series> {
    let days: Vec<Option<i32>> = dates.iter().map(|d| d.map(to_epoch_days)).collect();
    Series::new(name, days).cast(&DataType::Date)
}

/// Literal usable in comparisons against a `Date` column.
pub fn date_lit(date: NaiveDate) -> Expr {
    lit(to_epoch_days(date)).cast(DataType::Date)
}

/// Read a `Date` column back into chrono dates.
pub fn column_dates(series: &Series) -> PolarsResult<Vec<Option<NaiveDate>>> {
    let ca = series.date()?;
    Ok(ca
        .into_iter()
        .map(|d| d.and_then(from_epoch_days))
        .collect())
}

/// Parse the textual date forms found in workbooks (`2024-06-30`,
/// `2024/06/30`, and either followed by a time part).
pub fn parse_date_text(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    let head: String = trimmed.chars().take(10).collect();
    NaiveDate::parse_from_str(&head, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&head, "%Y/%m/%d"))
        .ok()
}

/// Convert an Excel serial day number (1900 date system).
pub fn from_excel_serial(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_days(chrono::Days::new(serial.floor() as u64))
}

pub fn month_end(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .unwrap_or(date)
}

pub fn is_month_end(date: NaiveDate) -> bool {
    month_end(date) == date
}

pub fn is_quarter_end(date: NaiveDate) -> bool {
    date.month() % 3 == 0 && is_month_end(date)
}

pub fn is_year_end(date: NaiveDate) -> bool {
    date.month() == 12 && date.day() == 31
}

/// Month-end of the month `months` before `date`.
pub fn month_end_back(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    date.checked_sub_months(Months::new(months)).map(month_end)
}

/// Most recent quarter end on or before `date`.
pub fn last_quarter_end(date: NaiveDate) -> Option<NaiveDate> {
    if is_quarter_end(date) {
        return Some(date);
    }
    let quarter_start_month = (date.month() - 1) / 3 * 3 + 1;
    NaiveDate::from_ymd_opt(date.year(), quarter_start_month, 1)?.pred_opt()
}

/// Most recent year end on or before `date`.
pub fn last_year_end(date: NaiveDate) -> Option<NaiveDate> {
    if is_year_end(date) {
        return Some(date);
    }
    NaiveDate::from_ymd_opt(date.year() - 1, 12, 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_epoch_days() {
        assert_eq!(to_epoch_days(d(1970, 1, 1)), 0);
        assert_eq!(to_epoch_days(d(1970, 1, 2)), 1);
        assert_eq!(from_epoch_days(to_epoch_days(d(2024, 2, 29))), Some(d(2024, 2, 29)));
    }

    #[test]
    fn test_month_end() {
        assert_eq!(month_end(d(2024, 2, 3)), d(2024, 2, 29));
        assert_eq!(month_end(d(2023, 12, 1)), d(2023, 12, 31));
        assert_eq!(month_end_back(d(2024, 3, 31), 1), Some(d(2024, 2, 29)));
        assert_eq!(month_end_back(d(2024, 6, 30), 12), Some(d(2023, 6, 30)));
    }

    #[test]
    fn test_period_snapping() {
        assert_eq!(last_quarter_end(d(2024, 6, 30)), Some(d(2024, 6, 30)));
        assert_eq!(last_quarter_end(d(2024, 5, 31)), Some(d(2024, 3, 31)));
        assert_eq!(last_quarter_end(d(2024, 2, 29)), Some(d(2023, 12, 31)));
        assert_eq!(last_year_end(d(2024, 12, 31)), Some(d(2024, 12, 31)));
        assert_eq!(last_year_end(d(2024, 6, 30)), Some(d(2023, 12, 31)));
    }

    #[test]
    fn test_parse_date_text() {
        assert_eq!(parse_date_text("2024-06-30"), Some(d(2024, 6, 30)));
        assert_eq!(parse_date_text("2024/06/30 00:00:00"), Some(d(2024, 6, 30)));
        assert_eq!(parse_date_text("June"), None);
        assert_eq!(from_excel_serial(45473.0), Some(d(2024, 6, 30)));
    }
}
