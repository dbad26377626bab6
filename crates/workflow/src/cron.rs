//! 5-field cron expressions: `minute hour day-of-month month day-of-week`.
//!
//! Supports `*`, `*/N`, `N`, `N-M`, `N-M/S` and comma lists. Day of week is
//! `0-6` with `0` = Sunday. Evaluation is in UTC.

use chrono::{DateTime, Datelike, Duration, DurationRound, Timelike, Utc};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid cron expression {expr:?}: {reason}")]
pub struct ScheduleError {
    pub expr: String,
    pub reason: String,
}

/// A parsed cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    source: String,
    minutes: Vec<u32>,
    hours: Vec<u32>,
    days_of_month: Vec<u32>,
    months: Vec<u32>,
    days_of_week: Vec<u32>,
}

impl Schedule {
    pub fn parse(expr: &str) -> Result<Self, ScheduleError> {
        let fail = |reason: String| ScheduleError {
            expr: expr.to_string(),
            reason,
        };
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(fail(format!(
                "expected 5 fields (minute hour dom month dow), got {}",
                fields.len()
            )));
        }

        Ok(Self {
            source: fields.join(" "),
            minutes: parse_field(fields[0], 0, 59).map_err(fail)?,
            hours: parse_field(fields[1], 0, 23).map_err(fail)?,
            days_of_month: parse_field(fields[2], 1, 31).map_err(fail)?,
            months: parse_field(fields[3], 1, 12).map_err(fail)?,
            days_of_week: parse_field(fields[4], 0, 6).map_err(fail)?,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether `dt` falls in a matching minute.
    pub fn matches(&self, dt: &DateTime<Utc>) -> bool {
        self.minutes.contains(&dt.minute())
            && self.hours.contains(&dt.hour())
            && self.days_of_month.contains(&dt.day())
            && self.months.contains(&dt.month())
            && self.days_of_week.contains(&dt.weekday().num_days_from_sunday())
    }

    /// The first matching minute strictly after `after`, searching up to
    /// four years ahead.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = after.duration_trunc(Duration::minutes(1)).ok()? + Duration::minutes(1);
        let mut day = start;
        let horizon = start + Duration::days(366 * 4);
        while day < horizon {
            if self.months.contains(&day.month())
                && self.days_of_month.contains(&day.day())
                && self.days_of_week.contains(&day.weekday().num_days_from_sunday())
            {
                let first_minute = if day.date_naive() == start.date_naive() {
                    start.hour() * 60 + start.minute()
                } else {
                    0
                };
                for &hour in &self.hours {
                    for &minute in &self.minutes {
                        if hour * 60 + minute >= first_minute {
                            let midnight = day.date_naive().and_hms_opt(0, 0, 0)?.and_utc();
                            return Some(midnight + Duration::minutes(i64::from(hour * 60 + minute)));
                        }
                    }
                }
            }
            day = day.date_naive().succ_opt()?.and_hms_opt(0, 0, 0)?.and_utc();
        }
        None
    }
}

impl FromStr for Schedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_field(field: &str, min: u32, max: u32) -> Result<Vec<u32>, String> {
    let mut values = Vec::new();

    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step.parse().map_err(|_| format!("invalid step {step:?}"))?;
                if step == 0 {
                    return Err("step cannot be zero".into());
                }
                (range, Some(step))
            }
            None => (part, None),
        };

        let (start, end) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            let start = number(a, min, max)?;
            let end = number(b, min, max)?;
            if start > end {
                return Err(format!("range {start}-{end} is backwards"));
            }
            (start, end)
        } else {
            let v = number(range, min, max)?;
            // `N/S` runs from N to the end of the field.
            (v, if step.is_some() { max } else { v })
        };

        values.extend((start..=end).step_by(step.unwrap_or(1) as usize));
    }

    values.sort_unstable();
    values.dedup();
    if values.is_empty() {
        return Err(format!("field {field:?} produced no values"));
    }
    Ok(values)
}

fn number(s: &str, min: u32, max: u32) -> Result<u32, String> {
    let v: u32 = s.parse().map_err(|_| format!("invalid number {s:?}"))?;
    if v < min || v > max {
        return Err(format!("{v} out of range {min}-{max}"));
    }
    Ok(v)
}
