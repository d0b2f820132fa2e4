//! Cron and interval triggers.

use crate::{Result, SchedulerError};
use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use std::str::FromStr;

use tradewatch_db::ScheduleType;

/// When a job fires.
#[derive(Debug, Clone)]
pub enum Trigger {
    Cron {
        schedule: Box<Schedule>,
        /// The 5-field expression as registered.
        raw: String,
    },
    Interval(Duration),
}

impl Trigger {
    /// Build from a standard 5-field cron expression
    /// (`minute hour day-of-month month day-of-week`).
    pub fn cron(expression: &str) -> Result<Self> {
        let normalized = normalize_cron(expression);
        let schedule = Schedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidCron {
            expression: expression.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self::Cron {
            schedule: Box::new(schedule),
            raw: expression.trim().to_string(),
        })
    }

    /// Build from component values (`hour`, `minute`, optional
    /// day-of-week like `mon` or `mon-fri`).
    pub fn cron_components(hour: u32, minute: u32, day_of_week: Option<&str>) -> Result<Self> {
        let dow = day_of_week.unwrap_or("*");
        Self::cron(&format!("{minute} {hour} * * {dow}"))
    }

    /// Build from an interval; any combination of hours/minutes/seconds.
    pub fn interval(hours: u64, minutes: u64, seconds: u64) -> Result<Self> {
        let total = hours * 3600 + minutes * 60 + seconds;
        if total == 0 {
            return Err(SchedulerError::InvalidInterval(
                "interval must be positive".to_string(),
            ));
        }
        Ok(Self::Interval(Duration::seconds(total as i64)))
    }

    /// Reconstruct a trigger from its persisted form.
    pub fn from_definition(schedule_type: ScheduleType, schedule_value: &str) -> Result<Self> {
        match schedule_type {
            ScheduleType::Cron => Self::cron(schedule_value),
            ScheduleType::Interval => {
                let seconds: f64 = schedule_value.trim().parse().map_err(|_| {
                    SchedulerError::InvalidInterval(format!(
                        "not a number of seconds: {schedule_value}"
                    ))
                })?;
                if seconds <= 0.0 {
                    return Err(SchedulerError::InvalidInterval(
                        "interval must be positive".to_string(),
                    ));
                }
                Ok(Self::Interval(Duration::milliseconds((seconds * 1000.0) as i64)))
            }
        }
    }

    /// The next fire time strictly after `after`. Asking from `now` after
    /// any number of missed firings yields exactly one upcoming time, so
    /// missed runs coalesce naturally.
    pub fn next_fire(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Cron { schedule, .. } => schedule.after(&after).next(),
            Self::Interval(duration) => Some(after + *duration),
        }
    }

    pub fn schedule_type(&self) -> ScheduleType {
        match self {
            Self::Cron { .. } => ScheduleType::Cron,
            Self::Interval(_) => ScheduleType::Interval,
        }
    }

    /// The persisted schedule value: the cron expression, or interval
    /// seconds as a decimal string.
    pub fn schedule_value(&self) -> String {
        match self {
            Self::Cron { raw, .. } => raw.clone(),
            Self::Interval(duration) => {
                format!("{}", duration.num_milliseconds() as f64 / 1000.0)
            }
        }
    }
}

/// The cron crate wants a seconds column; standard 5-field expressions
/// get one prepended.
fn normalize_cron(expression: &str) -> String {
    let fields = expression.split_whitespace().count();
    if fields == 5 {
        format!("0 {}", expression.trim())
    } else {
        expression.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_five_field_cron_parses() {
        let trigger = Trigger::cron("0 2 * * *").unwrap();
        assert_eq!(trigger.schedule_type(), ScheduleType::Cron);
        assert_eq!(trigger.schedule_value(), "0 2 * * *");
    }

    #[test]
    fn test_invalid_cron_rejected() {
        assert!(Trigger::cron("not a cron").is_err());
        assert!(Trigger::cron("99 99 * * *").is_err());
    }

    #[test]
    fn test_cron_next_fire_daily() {
        let trigger = Trigger::cron("0 2 * * *").unwrap();
        // 09:00 today: next 02:00 is tomorrow.
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap();
        let next = trigger.next_fire(now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 11, 2, 0, 0).unwrap());
    }

    #[test]
    fn test_missed_firings_coalesce_to_one() {
        let trigger = Trigger::cron("0 * * * *").unwrap();
        // Seven hourly firings were missed; asking from now yields one
        // future time, not seven.
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 9, 30, 0).unwrap();
        let next = trigger.next_fire(now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 10, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_interval_trigger() {
        let trigger = Trigger::interval(0, 5, 30).unwrap();
        assert_eq!(trigger.schedule_value(), "330");
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap();
        assert_eq!(
            trigger.next_fire(now).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 10, 9, 5, 30).unwrap()
        );
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert!(Trigger::interval(0, 0, 0).is_err());
    }

    #[test]
    fn test_roundtrip_through_definition() {
        let trigger = Trigger::cron("30 14 * * mon").unwrap();
        let restored =
            Trigger::from_definition(trigger.schedule_type(), &trigger.schedule_value()).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
        assert_eq!(trigger.next_fire(now), restored.next_fire(now));

        let interval = Trigger::interval(1, 0, 0).unwrap();
        let restored =
            Trigger::from_definition(interval.schedule_type(), &interval.schedule_value()).unwrap();
        assert_eq!(interval.next_fire(now), restored.next_fire(now));
    }

    #[test]
    fn test_components_build_cron() {
        let trigger = Trigger::cron_components(2, 0, None).unwrap();
        assert_eq!(trigger.schedule_value(), "0 2 * * *");
    }
}
