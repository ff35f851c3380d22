use crate::constants::{MAX_WEBSITES, MAX_WEBSITE_LEN};
use crate::error::AppError;
use crate::models::{PartialSettings, Schedule};
use crate::schedule::parse_minutes;
use log::warn;

const WEEKDAY_NAMES: [&str; 7] = [
    "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday",
];

/// Validate time format (HH:MM, 24-hour format).
pub fn validate_time_format(time: &str) -> Result<(), AppError> {
    let err = |reason: &str| AppError::InvalidInput {
        field: "time",
        reason: reason.into(),
    };

    let bytes = time.as_bytes();
    if bytes.len() != 5 || bytes.get(2) != Some(&b':') {
        return Err(err("must be in HH:MM format"));
    }

    let (hours, minutes) = time.split_once(':').ok_or_else(|| err("must be in HH:MM format"))?;
    let hours: u32 = hours.parse().map_err(|_| err("invalid hours"))?;
    let minutes: u32 = minutes.parse().map_err(|_| err("invalid minutes"))?;

    if hours >= 24 {
        return Err(err("hours must be 00-23"));
    }
    if minutes >= 60 {
        return Err(err("minutes must be 00-59"));
    }

    Ok(())
}

/// Validate weekday names ("Monday".."Sunday").
pub fn validate_days(days: &[String]) -> Result<(), AppError> {
    for day in days {
        if !WEEKDAY_NAMES.contains(&day.as_str()) {
            return Err(AppError::InvalidInput {
                field: "days",
                reason: format!("unknown weekday '{day}'"),
            });
        }
    }
    Ok(())
}

/// Validate a schedule. An inverted window is accepted but never blocks.
pub fn validate_schedule(schedule: &Schedule) -> Result<(), AppError> {
    validate_days(&schedule.days)?;
    validate_time_format(&schedule.start_time)?;
    validate_time_format(&schedule.end_time)?;

    if let (Some(start), Some(end)) = (parse_minutes(&schedule.start_time), parse_minutes(&schedule.end_time)) {
        if start > end {
            warn!(
                "Schedule window {}-{} is inverted and will never block",
                schedule.start_time, schedule.end_time
            );
        }
    }
    Ok(())
}

/// Validate the website list.
pub fn validate_websites(websites: &[String]) -> Result<(), AppError> {
    if websites.len() > MAX_WEBSITES {
        return Err(AppError::InvalidInput {
            field: "websites",
            reason: format!("cannot exceed {MAX_WEBSITES} entries"),
        });
    }

    for website in websites {
        let trimmed = website.trim();
        if trimmed.is_empty() {
            return Err(AppError::InvalidInput {
                field: "websites",
                reason: "entries cannot be empty".into(),
            });
        }
        if trimmed.len() > MAX_WEBSITE_LEN {
            return Err(AppError::InvalidInput {
                field: "websites",
                reason: format!("entries cannot exceed {MAX_WEBSITE_LEN} characters"),
            });
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(AppError::InvalidInput {
                field: "websites",
                reason: format!("'{trimmed}' contains whitespace"),
            });
        }
    }
    Ok(())
}

/// Validate a settings update before it is written.
pub fn validate_settings(patch: &PartialSettings) -> Result<(), AppError> {
    if let Some(websites) = &patch.websites {
        validate_websites(websites)?;
    }
    if let Some(schedule) = &patch.schedule {
        validate_schedule(schedule)?;
    }
    Ok(())
}
