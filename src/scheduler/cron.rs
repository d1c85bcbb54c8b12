//! Cron expression parsing
//!
//! Supports 5 fields (`minute hour day-of-month month day-of-week`) or 6
//! fields with a leading seconds field. Each field accepts `*`, `N`, `A-B`,
//! comma separated lists and a `/step` suffix. Day-of-week runs 0-7 where
//! both 0 and 7 mean Sunday. When both day fields are restricted a time
//! matches if either one does.

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Timelike};

/// Upper bound on search steps; every step moves at least one second
const MAX_SEARCH_STEPS: usize = 500_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronError(String);

impl std::fmt::Display for CronError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid cron expression: {}", self.0)
    }
}

impl std::error::Error for CronError {}

/// Parsed cron schedule, fields stored as bit sets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expr: String,
    seconds: u64,
    minutes: u64,
    hours: u64,
    days: u64,
    months: u64,
    weekdays: u64,
    day_restricted: bool,
    weekday_restricted: bool,
}

impl CronSchedule {
    pub fn parse(expr: &str) -> Result<Self, CronError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        let (seconds, rest) = match fields.len() {
            5 => ("0", &fields[..]),
            6 => (fields[0], &fields[1..]),
            n => {
                return Err(CronError(format!("expected 5 or 6 fields, got {}", n)));
            }
        };

        let mut weekdays = parse_field(rest[4], 0, 7)?;
        if weekdays & (1 << 7) != 0 {
            weekdays = (weekdays | 1) & !(1 << 7);
        }

        Ok(Self {
            expr: expr.trim().to_string(),
            seconds: parse_field(seconds, 0, 59)?,
            minutes: parse_field(rest[0], 0, 59)?,
            hours: parse_field(rest[1], 0, 23)?,
            days: parse_field(rest[2], 1, 31)?,
            months: parse_field(rest[3], 1, 12)?,
            weekdays,
            day_restricted: !rest[2].starts_with('*'),
            weekday_restricted: !rest[4].starts_with('*'),
        })
    }

    pub fn expression(&self) -> &str {
        &self.expr
    }

    /// Next fire time strictly after `after`, in local time
    pub fn next_after(&self, after: DateTime<Local>) -> Option<DateTime<Local>> {
        let mut from = after.naive_local();
        for _ in 0..4 {
            let naive = self.next_naive_after(from)?;
            match Local.from_local_datetime(&naive).earliest() {
                Some(at) if at > after => return Some(at),
                Some(_) => from = naive,
                // local time does not exist (DST gap)
                None => from = naive + TimeDelta::hours(1) - TimeDelta::seconds(1),
            }
        }
        None
    }

    /// Next matching wall-clock time strictly after `after`
    pub fn next_naive_after(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        let mut t = after.with_nanosecond(0)? + TimeDelta::seconds(1);

        for _ in 0..MAX_SEARCH_STEPS {
            if !has(self.months, t.month()) {
                t = first_of_next_month(t.date())?;
                continue;
            }
            if !self.day_matches(t.date()) {
                t = t.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !has(self.hours, t.hour()) {
                t = t.date().and_hms_opt(t.hour(), 0, 0)? + TimeDelta::hours(1);
                continue;
            }
            if !has(self.minutes, t.minute()) {
                t = t.date().and_hms_opt(t.hour(), t.minute(), 0)? + TimeDelta::minutes(1);
                continue;
            }
            if !has(self.seconds, t.second()) {
                t += TimeDelta::seconds(1);
                continue;
            }
            return Some(t);
        }
        None
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = has(self.days, date.day());
        let dow = has(self.weekdays, date.weekday().num_days_from_sunday());
        match (self.day_restricted, self.weekday_restricted) {
            (true, true) => dom || dow,
            (true, false) => dom,
            (false, true) => dow,
            (false, false) => true,
        }
    }
}

impl std::str::FromStr for CronSchedule {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.expr)
    }
}

fn has(set: u64, value: u32) -> bool {
    set & (1u64 << value) != 0
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDateTime> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
}

fn parse_number(text: &str, min: u32, max: u32) -> Result<u32, CronError> {
    let value: u32 = text
        .parse()
        .map_err(|_| CronError(format!("'{}' is not a number", text)))?;
    if value < min || value > max {
        return Err(CronError(format!(
            "{} is out of range {}-{}",
            value, min, max
        )));
    }
    Ok(value)
}

fn parse_field(field: &str, min: u32, max: u32) -> Result<u64, CronError> {
    let mut set = 0u64;

    for part in field.split(',') {
        if part.is_empty() {
            return Err(CronError(format!("empty list item in '{}'", field)));
        }

        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| CronError(format!("invalid step in '{}'", part)))?;
                if step == 0 {
                    return Err(CronError(format!("step cannot be 0 in '{}'", part)));
                }
                (range, Some(step))
            }
            None => (part, None),
        };

        let (start, end) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            let a = parse_number(a, min, max)?;
            let b = parse_number(b, min, max)?;
            if a > b {
                return Err(CronError(format!("range {} is reversed", range)));
            }
            (a, b)
        } else {
            let n = parse_number(range, min, max)?;
            // `N/step` runs from N to the end of the range
            if step.is_some() { (n, max) } else { (n, n) }
        };

        let step = step.unwrap_or(1) as usize;
        for value in (start..=end).step_by(step) {
            set |= 1u64 << value;
        }
    }

    Ok(set)
}
