//! Weekly schedules and lesson-date expansion.

use crate::domain::ValidationError;
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LESSON_GENERATION_WEEKS: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Self::Mon,
        Self::Tue,
        Self::Wed,
        Self::Thu,
        Self::Fri,
        Self::Sat,
        Self::Sun,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Self::Mon => "mon",
            Self::Tue => "tue",
            Self::Wed => "wed",
            Self::Thu => "thu",
            Self::Fri => "fri",
            Self::Sat => "sat",
            Self::Sun => "sun",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Mon => "Понедельник",
            Self::Tue => "Вторник",
            Self::Wed => "Среда",
            Self::Thu => "Четверг",
            Self::Fri => "Пятница",
            Self::Sat => "Суббота",
            Self::Sun => "Воскресенье",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.code() == code)
    }

    /// Days since Monday (Monday = 0).
    pub fn index(self) -> u32 {
        self as u32
    }
}

/// Keeps recognized codes in first-seen order; unknown codes and repeats are dropped.
pub fn parse_weekday_codes<I, S>(codes: I) -> Vec<Weekday>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut days = Vec::new();
    for code in codes {
        if let Some(day) = Weekday::from_code(code.as_ref().trim()) {
            if !days.contains(&day) {
                days.push(day);
            }
        }
    }
    days
}

/// Strict parse of a stored schedule string ("mon,wed"). Blank input is an empty schedule.
pub fn parse_schedule(raw: &str) -> Result<Vec<Weekday>, ValidationError> {
    let mut days = Vec::new();
    for code in raw.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        let day = Weekday::from_code(code)
            .ok_or_else(|| ValidationError::UnknownWeekday(code.to_string()))?;
        if !days.contains(&day) {
            days.push(day);
        }
    }
    Ok(days)
}

pub fn format_schedule(days: &[Weekday]) -> String {
    days.iter().map(|d| d.code()).collect::<Vec<_>>().join(",")
}

/// Lesson dates for `weekdays` in `[start, start + weeks_ahead weeks]`, both ends inclusive.
///
/// Each weekday starts at its first occurrence on or after `start` and repeats every 7 days.
/// Output is grouped by weekday in input order.
pub fn expand_dates(weekdays: &[Weekday], start: NaiveDate, weeks_ahead: u32) -> Vec<NaiveDate> {
    let end = start + Duration::weeks(i64::from(weeks_ahead));
    let start_index = start.weekday().num_days_from_monday();
    let mut dates = Vec::new();
    for day in weekdays {
        let delta = (day.index() + 7 - start_index) % 7;
        let mut current = start + Duration::days(i64::from(delta));
        while current <= end {
            dates.push(current);
            current += Duration::days(7);
        }
    }
    dates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn mon_wed_one_week_from_monday() {
        let days = parse_weekday_codes(["mon", "wed"]);
        let dates = expand_dates(&days, d(2024, 1, 1), 1);
        assert_eq!(dates, vec![d(2024, 1, 1), d(2024, 1, 8), d(2024, 1, 3)]);
    }

    #[test]
    fn weekday_before_start_rolls_to_next_week() {
        // 2024-01-03 is a Wednesday; Monday's first occurrence is 2024-01-08.
        let dates = expand_dates(&[Weekday::Mon], d(2024, 1, 3), 1);
        assert_eq!(dates, vec![d(2024, 1, 8)]);
    }

    #[test]
    fn default_horizon_is_inclusive() {
        let dates = expand_dates(&[Weekday::Mon], d(2024, 1, 1), DEFAULT_LESSON_GENERATION_WEEKS);
        assert_eq!(dates.len(), 5);
        assert_eq!(dates.last(), Some(&d(2024, 1, 29)));
    }

    #[test]
    fn unknown_codes_are_dropped() {
        assert_eq!(
            parse_weekday_codes(["mon", "xyz", "MON", "mon", " fri "]),
            vec![Weekday::Mon, Weekday::Fri]
        );
        assert!(parse_weekday_codes(["holiday"]).is_empty());
        assert!(expand_dates(&[], d(2024, 1, 1), 4).is_empty());
    }

    #[test]
    fn strict_schedule_rejects_unknown_code() {
        assert_eq!(
            parse_schedule("mon, wed").unwrap(),
            vec![Weekday::Mon, Weekday::Wed]
        );
        assert_eq!(parse_schedule("").unwrap(), vec![]);
        assert_eq!(
            parse_schedule("mon,funday"),
            Err(ValidationError::UnknownWeekday("funday".into()))
        );
        assert_eq!(format_schedule(&[Weekday::Tue, Weekday::Sun]), "tue,sun");
    }
}
