//! Weekly schedule evaluation.
//!
//! The evaluator is a pure function of a schedule and an explicit local
//! wall-clock time. Components that need "now" read it through [`Clock`].

use crate::constants::MINUTES_PER_DAY;
use crate::models::Schedule;
use chrono::{Datelike, Local, NaiveDateTime, Timelike, Weekday};
use log::warn;
use std::sync::Mutex;

/// Source of the current local wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Reads the system's local time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock(Mutex<NaiveDateTime>);

impl FixedClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self(Mutex::new(now))
    }

    pub fn set(&self, now: NaiveDateTime) {
        let mut guard = self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// English weekday name as stored in schedules.
pub fn weekday_name(day: Weekday) -> &'static str {
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

/// Parse an `HH:MM` string into minutes since midnight.
pub fn parse_minutes(time: &str) -> Option<u32> {
    let (hours, minutes) = time.split_once(':')?;
    let hours: u32 = hours.trim().parse().ok()?;
    let minutes: u32 = minutes.trim().parse().ok()?;
    if minutes >= 60 {
        return None;
    }
    let total = hours.checked_mul(60)?.checked_add(minutes)?;
    (total < MINUTES_PER_DAY).then_some(total)
}

/// Minutes since midnight for a wall-clock time.
pub fn minute_of_day(now: NaiveDateTime) -> u32 {
    now.hour() * 60 + now.minute()
}

/// Whether blocking should be active at `now`.
///
/// Fails closed: an absent schedule, a day not in the schedule, or an
/// unparseable time all mean "don't block". Both bounds are inclusive, so
/// the end minute itself still blocks. An inverted window (start after end)
/// never matches.
pub fn should_block_now(schedule: Option<&Schedule>, now: NaiveDateTime) -> bool {
    let Some(schedule) = schedule else {
        return false;
    };

    let today = weekday_name(now.weekday());
    if !schedule.days.iter().any(|d| d == today) {
        return false;
    }

    let (Some(start), Some(end)) = (parse_minutes(&schedule.start_time), parse_minutes(&schedule.end_time)) else {
        warn!(
            "Unparseable schedule window {}-{}, not blocking",
            schedule.start_time, schedule.end_time
        );
        return false;
    };

    let current = minute_of_day(now);
    start <= current && current <= end
}
