//! Recurrence patterns and next-occurrence calculation.
//!
//! Weekday indices run Monday = 0 through Sunday = 6.

use crate::error::{Error, Result};
use crate::types::{Task, TaskState, DEFAULT_ELO_RATING};
use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Kind of recurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceType {
    Daily,
    Weekly,
    Monthly,
    Yearly,
    /// Placeholder: behaves as daily with interval 1.
    Custom,
}

/// Which occurrence of a weekday within a month ("2nd Tuesday", "last Friday").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WeekOfMonthRepr", into = "WeekOfMonthRepr")]
pub enum WeekOfMonth {
    /// 1 through 4.
    Nth(u8),
    Last,
}

/// Wire form: an integer 1-4 or the string "last".
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WeekOfMonthRepr {
    Nth(u8),
    Named(String),
}

impl TryFrom<WeekOfMonthRepr> for WeekOfMonth {
    type Error = String;

    fn try_from(repr: WeekOfMonthRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            WeekOfMonthRepr::Nth(n @ 1..=4) => Ok(WeekOfMonth::Nth(n)),
            WeekOfMonthRepr::Nth(n) => Err(format!("week_of_month must be 1-4, got {}", n)),
            WeekOfMonthRepr::Named(s) if s == "last" => Ok(WeekOfMonth::Last),
            WeekOfMonthRepr::Named(s) => Err(format!("unknown week_of_month: {}", s)),
        }
    }
}

impl From<WeekOfMonth> for WeekOfMonthRepr {
    fn from(week: WeekOfMonth) -> Self {
        match week {
            WeekOfMonth::Nth(n) => WeekOfMonthRepr::Nth(n),
            WeekOfMonth::Last => WeekOfMonthRepr::Named("last".to_string()),
        }
    }
}

fn default_interval() -> u32 {
    1
}

/// A recurrence rule. Only the fields relevant to `kind` are populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrencePattern {
    #[serde(rename = "type")]
    pub kind: RecurrenceType,
    #[serde(default = "default_interval")]
    pub interval: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_of_week: Option<BTreeSet<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_month: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub week_of_month: Option<WeekOfMonth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekday_of_month: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_expression: Option<String>,
}

impl RecurrencePattern {
    fn bare(kind: RecurrenceType, interval: u32) -> Self {
        Self {
            kind,
            interval,
            days_of_week: None,
            day_of_month: None,
            week_of_month: None,
            weekday_of_month: None,
            custom_expression: None,
        }
    }

    pub fn daily(interval: u32) -> Self {
        Self::bare(RecurrenceType::Daily, interval)
    }

    pub fn weekly(interval: u32) -> Self {
        Self::bare(RecurrenceType::Weekly, interval)
    }

    pub fn weekly_on(interval: u32, days: impl IntoIterator<Item = u8>) -> Self {
        Self {
            days_of_week: Some(days.into_iter().collect()),
            ..Self::bare(RecurrenceType::Weekly, interval)
        }
    }

    pub fn monthly_on_day(interval: u32, day: u32) -> Self {
        Self {
            day_of_month: Some(day),
            ..Self::bare(RecurrenceType::Monthly, interval)
        }
    }

    pub fn monthly_nth_weekday(interval: u32, week: WeekOfMonth, weekday: u8) -> Self {
        Self {
            week_of_month: Some(week),
            weekday_of_month: Some(weekday),
            ..Self::bare(RecurrenceType::Monthly, interval)
        }
    }

    pub fn yearly(interval: u32) -> Self {
        Self::bare(RecurrenceType::Yearly, interval)
    }

    pub fn custom(expression: impl Into<String>) -> Self {
        Self {
            custom_expression: Some(expression.into()),
            ..Self::bare(RecurrenceType::Custom, 1)
        }
    }

    /// Check field ranges and that only fields relevant to the type are set.
    pub fn validate(&self) -> Result<()> {
        if self.interval < 1 {
            return Err(Error::validation("interval", "must be at least 1"));
        }

        if let Some(days) = &self.days_of_week {
            if self.kind != RecurrenceType::Weekly {
                return Err(Error::validation("days_of_week", "only valid for weekly patterns"));
            }
            if days.is_empty() {
                return Err(Error::validation("days_of_week", "must not be empty"));
            }
            if days.iter().any(|d| *d > 6) {
                return Err(Error::validation("days_of_week", "weekday indices run 0-6"));
            }
        }

        let nth_weekday = self.week_of_month.is_some() || self.weekday_of_month.is_some();
        if (self.day_of_month.is_some() || nth_weekday) && self.kind != RecurrenceType::Monthly {
            return Err(Error::validation("day_of_month", "only valid for monthly patterns"));
        }
        if let Some(day) = self.day_of_month {
            if !(1..=31).contains(&day) {
                return Err(Error::validation("day_of_month", "must be 1-31"));
            }
            if nth_weekday {
                return Err(Error::validation(
                    "day_of_month",
                    "cannot be combined with week_of_month",
                ));
            }
        }
        if nth_weekday {
            match (self.week_of_month, self.weekday_of_month) {
                (Some(_), Some(wd)) if wd <= 6 => {}
                (Some(_), Some(_)) => {
                    return Err(Error::validation("weekday_of_month", "weekday indices run 0-6"));
                }
                _ => {
                    return Err(Error::validation(
                        "week_of_month",
                        "week_of_month and weekday_of_month must be set together",
                    ));
                }
            }
        }

        if self.custom_expression.is_some() && self.kind != RecurrenceType::Custom {
            return Err(Error::validation("custom_expression", "only valid for custom patterns"));
        }

        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

/// Compute the next occurrence of `pattern` after `from`.
pub fn calculate_next(pattern: &RecurrencePattern, from: NaiveDate) -> Result<NaiveDate> {
    let interval = pattern.interval.max(1);
    let next = match pattern.kind {
        RecurrenceType::Daily => from.checked_add_days(Days::new(u64::from(interval))),
        RecurrenceType::Weekly => match &pattern.days_of_week {
            Some(days) if !days.is_empty() => next_listed_weekday(from, days, interval),
            _ => from.checked_add_days(Days::new(7 * u64::from(interval))),
        },
        RecurrenceType::Monthly => {
            let (year, month) = add_months(from.year(), from.month(), interval);
            match (pattern.week_of_month, pattern.weekday_of_month) {
                (Some(week), Some(weekday)) => nth_weekday_of_month(year, month, week, weekday),
                _ => clamped_date(year, month, pattern.day_of_month.unwrap_or(from.day())),
            }
        }
        RecurrenceType::Yearly => {
            let year = from.year().checked_add(interval as i32);
            year.and_then(|y| clamped_date(y, from.month(), from.day()))
        }
        RecurrenceType::Custom => from.checked_add_days(Days::new(1)),
    };

    next.ok_or_else(|| Error::validation("recurrence_pattern", "next occurrence is out of range"))
}

fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_monday() as u8
}

/// Next listed weekday later in the same week, else the first listed day `interval` weeks on.
fn next_listed_weekday(from: NaiveDate, days: &BTreeSet<u8>, interval: u32) -> Option<NaiveDate> {
    let today = weekday_index(from);
    if let Some(day) = days.range(today + 1..).next() {
        return from.checked_add_days(Days::new(u64::from(day - today)));
    }
    let first = *days.iter().next()?;
    let week_start = from.checked_sub_days(Days::new(u64::from(today)))?;
    week_start.checked_add_days(Days::new(7 * u64::from(interval) + u64::from(first)))
}

fn add_months(year: i32, month: u32, months: u32) -> (i32, u32) {
    let total = year as i64 * 12 + (month as i64 - 1) + months as i64;
    ((total.div_euclid(12)) as i32, (total.rem_euclid(12)) as u32 + 1)
}

fn last_day_of_month(year: i32, month: u32) -> Option<u32> {
    (28..=31)
        .rev()
        .find(|day| NaiveDate::from_ymd_opt(year, month, *day).is_some())
}

/// `day` in the given month, clamped to the month's last day.
fn clamped_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let last = last_day_of_month(year, month)?;
    NaiveDate::from_ymd_opt(year, month, day.min(last))
}

fn nth_weekday_of_month(year: i32, month: u32, week: WeekOfMonth, weekday: u8) -> Option<NaiveDate> {
    let first_of_month = NaiveDate::from_ymd_opt(year, month, 1)?;
    let offset = (u64::from(weekday) + 7 - u64::from(weekday_index(first_of_month))) % 7;
    let first = first_of_month.checked_add_days(Days::new(offset))?;

    match week {
        WeekOfMonth::Nth(n) => {
            let date = first.checked_add_days(Days::new(7 * u64::from(n.saturating_sub(1))))?;
            (date.month() == month).then_some(date)
        }
        WeekOfMonth::Last => {
            let mut date = first;
            while let Some(following) = date.checked_add_days(Days::new(7)) {
                if following.month() != month {
                    break;
                }
                date = following;
            }
            Some(date)
        }
    }
}

/// Date the next occurrence is measured from: the due date, else the completion day.
pub fn series_anchor(task: &Task, completed_on: NaiveDate) -> NaiveDate {
    task.due_date.unwrap_or(completed_on)
}

/// Build the next occurrence of a just-completed recurring task, or `None`
/// when the series has ended.
pub fn next_occurrence(task: &Task, completed_on: NaiveDate) -> Result<Option<Task>> {
    if !task.is_recurring {
        return Ok(None);
    }
    let Some(pattern) = &task.recurrence_pattern else {
        return Ok(None);
    };

    let next_date = calculate_next(pattern, series_anchor(task, completed_on))?;

    if let Some(end) = task.recurrence_end_date {
        if next_date > end {
            return Ok(None);
        }
    }
    if let Some(max) = task.max_occurrences {
        if task.occurrence_count + 1 >= max {
            return Ok(None);
        }
    }

    let (elo_rating, comparison_count, shared_elo_rating, shared_comparison_count) =
        if task.share_elo_rating {
            let rating = task.shared_elo_rating.unwrap_or(task.elo_rating);
            let count = task.shared_comparison_count.unwrap_or(task.comparison_count);
            (rating, count, Some(rating), Some(count))
        } else {
            (DEFAULT_ELO_RATING, 0, None, None)
        };

    Ok(Some(Task {
        id: None,
        title: task.title.clone(),
        description: task.description.clone(),
        base_priority: task.base_priority,
        elo_rating,
        comparison_count,
        due_date: Some(next_date),
        state: TaskState::Active,
        context_id: task.context_id,
        start_date: None,
        delegated_to: None,
        follow_up_date: None,
        completed_at: None,
        is_recurring: true,
        recurrence_pattern: Some(pattern.clone()),
        recurrence_parent_id: task.recurrence_parent_id.or(task.id),
        share_elo_rating: task.share_elo_rating,
        shared_elo_rating,
        shared_comparison_count,
        recurrence_end_date: task.recurrence_end_date,
        max_occurrences: task.max_occurrences,
        occurrence_count: task.occurrence_count + 1,
        tags: task.tags.clone(),
        blocking_task_ids: Default::default(),
        created_at: 0,
        updated_at: 0,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewTask;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn daily_adds_interval_days() {
        assert_eq!(
            calculate_next(&RecurrencePattern::daily(1), date(2024, 1, 15)).unwrap(),
            date(2024, 1, 16)
        );
        assert_eq!(
            calculate_next(&RecurrencePattern::daily(3), date(2024, 12, 30)).unwrap(),
            date(2025, 1, 2)
        );
    }

    #[test]
    fn weekly_without_days_adds_weeks() {
        assert_eq!(
            calculate_next(&RecurrencePattern::weekly(2), date(2024, 1, 15)).unwrap(),
            date(2024, 1, 29)
        );
    }

    #[test]
    fn weekly_picks_next_listed_day_in_same_week() {
        // 2024-01-15 is a Monday; Tue = 1, Thu = 3.
        let pattern = RecurrencePattern::weekly_on(1, [1, 3]);
        assert_eq!(calculate_next(&pattern, date(2024, 1, 15)).unwrap(), date(2024, 1, 16));
        assert_eq!(calculate_next(&pattern, date(2024, 1, 16)).unwrap(), date(2024, 1, 18));
    }

    #[test]
    fn weekly_wraps_to_first_listed_day_after_interval() {
        let pattern = RecurrencePattern::weekly_on(2, [1, 3]);
        // Thursday 2024-01-18 -> Tuesday two weeks on.
        assert_eq!(calculate_next(&pattern, date(2024, 1, 18)).unwrap(), date(2024, 1, 30));
    }

    #[test]
    fn monthly_day_clamps_to_month_end() {
        let pattern = RecurrencePattern::monthly_on_day(1, 31);
        assert_eq!(calculate_next(&pattern, date(2024, 1, 31)).unwrap(), date(2024, 2, 29));
        assert_eq!(calculate_next(&pattern, date(2023, 1, 31)).unwrap(), date(2023, 2, 28));
        assert_eq!(calculate_next(&pattern, date(2024, 3, 31)).unwrap(), date(2024, 4, 30));
    }

    #[test]
    fn monthly_crosses_year_boundary() {
        let pattern = RecurrencePattern::monthly_on_day(2, 5);
        assert_eq!(calculate_next(&pattern, date(2024, 11, 5)).unwrap(), date(2025, 1, 5));
    }

    #[test]
    fn monthly_nth_weekday() {
        // Second Tuesday of February 2024 is the 13th.
        let pattern = RecurrencePattern::monthly_nth_weekday(1, WeekOfMonth::Nth(2), 1);
        assert_eq!(calculate_next(&pattern, date(2024, 1, 9)).unwrap(), date(2024, 2, 13));
    }

    #[test]
    fn monthly_last_weekday() {
        // Last Friday of March 2024 is the 29th.
        let pattern = RecurrencePattern::monthly_nth_weekday(1, WeekOfMonth::Last, 4);
        assert_eq!(calculate_next(&pattern, date(2024, 2, 23)).unwrap(), date(2024, 3, 29));
    }

    #[test]
    fn yearly_clamps_leap_day() {
        let pattern = RecurrencePattern::yearly(1);
        assert_eq!(calculate_next(&pattern, date(2024, 2, 29)).unwrap(), date(2025, 2, 28));
        assert_eq!(
            calculate_next(&RecurrencePattern::yearly(4), date(2024, 2, 29)).unwrap(),
            date(2028, 2, 29)
        );
    }

    #[test]
    fn custom_falls_back_to_one_day() {
        let pattern = RecurrencePattern::custom("every other full moon");
        assert_eq!(calculate_next(&pattern, date(2024, 1, 15)).unwrap(), date(2024, 1, 16));
    }

    #[test]
    fn serialization_only_carries_relevant_fields() {
        let json = RecurrencePattern::daily(2).to_json().unwrap();
        assert_eq!(json, r#"{"type":"daily","interval":2}"#);

        let json = RecurrencePattern::monthly_nth_weekday(1, WeekOfMonth::Last, 4)
            .to_json()
            .unwrap();
        assert!(json.contains(r#""week_of_month":"last""#));

        let parsed = RecurrencePattern::from_json(r#"{"type":"monthly","interval":1,"week_of_month":2,"weekday_of_month":1}"#).unwrap();
        assert_eq!(parsed.week_of_month, Some(WeekOfMonth::Nth(2)));
        assert!(RecurrencePattern::from_json(r#"{"type":"monthly","week_of_month":5}"#).is_err());
    }

    #[test]
    fn validate_rejects_mismatched_fields() {
        assert!(RecurrencePattern::daily(0).validate().is_err());
        assert!(RecurrencePattern::weekly_on(1, [7]).validate().is_err());
        let mut pattern = RecurrencePattern::monthly_on_day(1, 15);
        pattern.week_of_month = Some(WeekOfMonth::Nth(1));
        pattern.weekday_of_month = Some(0);
        assert!(pattern.validate().is_err());
        let mut daily = RecurrencePattern::daily(1);
        daily.day_of_month = Some(3);
        assert!(daily.validate().is_err());
        assert!(RecurrencePattern::monthly_nth_weekday(1, WeekOfMonth::Last, 6).validate().is_ok());
    }

    fn recurring(pattern: RecurrencePattern) -> Task {
        let mut task = Task::from_new(&NewTask::titled("Water plants"));
        task.id = Some(10);
        task.is_recurring = true;
        task.recurrence_pattern = Some(pattern);
        task
    }

    #[test]
    fn end_date_stops_the_series() {
        let today = date(2024, 1, 15);
        let mut task = recurring(RecurrencePattern::daily(1));
        task.recurrence_end_date = Some(today);
        assert!(next_occurrence(&task, today).unwrap().is_none());

        task.recurrence_end_date = Some(date(2024, 1, 16));
        assert!(next_occurrence(&task, today).unwrap().is_some());
    }

    #[test]
    fn max_occurrences_stops_the_series() {
        let today = date(2024, 1, 15);
        let mut task = recurring(RecurrencePattern::daily(1));
        task.max_occurrences = Some(3);
        task.occurrence_count = 1;
        assert!(next_occurrence(&task, today).unwrap().is_some());
        task.occurrence_count = 2;
        assert!(next_occurrence(&task, today).unwrap().is_none());
    }

    #[test]
    fn clone_points_at_series_root_and_resets_rating() {
        let mut task = recurring(RecurrencePattern::daily(1));
        task.elo_rating = 1620.0;
        task.comparison_count = 4;
        task.state = TaskState::Completed;

        let next = next_occurrence(&task, date(2024, 1, 15)).unwrap().unwrap();
        assert_eq!(next.recurrence_parent_id, Some(10));
        assert_eq!(next.state, TaskState::Active);
        assert_eq!(next.occurrence_count, 1);
        assert_eq!(next.due_date, Some(date(2024, 1, 16)));
        assert_eq!(next.elo_rating, DEFAULT_ELO_RATING);
        assert_eq!(next.comparison_count, 0);

        task.recurrence_parent_id = Some(3);
        let next = next_occurrence(&task, date(2024, 1, 15)).unwrap().unwrap();
        assert_eq!(next.recurrence_parent_id, Some(3));
    }

    #[test]
    fn shared_pool_carries_rating_forward() {
        let mut task = recurring(RecurrencePattern::daily(1));
        task.share_elo_rating = true;
        task.elo_rating = 1580.0;
        task.comparison_count = 6;

        let next = next_occurrence(&task, date(2024, 1, 15)).unwrap().unwrap();
        assert_eq!(next.elo_rating, 1580.0);
        assert_eq!(next.comparison_count, 6);

        task.shared_elo_rating = Some(1700.0);
        task.shared_comparison_count = Some(12);
        let next = next_occurrence(&task, date(2024, 1, 15)).unwrap().unwrap();
        assert_eq!(next.elo_rating, 1700.0);
        assert_eq!(next.comparison_count, 12);
        assert_eq!(next.shared_elo_rating, Some(1700.0));
    }

    #[test]
    fn anchor_prefers_due_date() {
        let mut task = recurring(RecurrencePattern::weekly(1));
        task.due_date = Some(date(2024, 1, 10));
        let next = next_occurrence(&task, date(2024, 1, 15)).unwrap().unwrap();
        assert_eq!(next.due_date, Some(date(2024, 1, 17)));
    }
}
