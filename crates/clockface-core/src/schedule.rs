//! Work-schedule configuration.
//!
//! Schedules are external read-only configuration: an organization-wide
//! default plus optional per-employee overrides, loaded from a TOML file by
//! the daemon. The core only reads them.

use chrono::NaiveTime;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("no schedule configured for employee {0}")]
    NotConfigured(String),
    #[error("schedule for {scope} is invalid: {reason}")]
    Invalid { scope: String, reason: String },
}

/// One employee's (or the organization's) working-day parameters.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkSchedule {
    /// Scheduled start of the working day, e.g. `09:00:00`.
    pub start_time: NaiveTime,
    /// Scheduled end of the working day, e.g. `18:00:00`.
    pub end_time: NaiveTime,
    /// Grace period after `start_time` before a check-in counts as late.
    pub late_threshold_minutes: u32,
    /// Hours counted as regular time; anything beyond is overtime.
    pub scheduled_daily_hours: f64,
}

impl WorkSchedule {
    fn validate(&self, scope: &str) -> Result<(), ScheduleError> {
        if self.end_time <= self.start_time {
            return Err(ScheduleError::Invalid {
                scope: scope.to_string(),
                reason: format!(
                    "end_time {} is not after start_time {}",
                    self.end_time, self.start_time
                ),
            });
        }
        if self.scheduled_daily_hours <= 0.0 {
            return Err(ScheduleError::Invalid {
                scope: scope.to_string(),
                reason: format!(
                    "scheduled_daily_hours must be positive, got {}",
                    self.scheduled_daily_hours
                ),
            });
        }
        Ok(())
    }
}

/// Schedule lookup table: `[default]` section plus `[overrides.<employee>]`
/// tables in the configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleBook {
    default: Option<WorkSchedule>,
    #[serde(default)]
    overrides: HashMap<String, WorkSchedule>,
}

impl ScheduleBook {
    /// Build a book from already-parsed parts (tests, embedded defaults).
    pub fn new(default: Option<WorkSchedule>, overrides: HashMap<String, WorkSchedule>) -> Self {
        Self { default, overrides }
    }

    /// Reject invalid schedules up front so a misconfiguration surfaces at
    /// startup instead of at the first affected check-in.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        if let Some(default) = &self.default {
            default.validate("default")?;
        }
        for (employee, schedule) in &self.overrides {
            schedule.validate(employee)?;
        }
        Ok(())
    }

    /// Resolve the schedule for one employee. A missing schedule is an
    /// operational error, never a silent default.
    pub fn for_employee(&self, employee_id: &str) -> Result<WorkSchedule, ScheduleError> {
        self.overrides
            .get(employee_id)
            .or(self.default.as_ref())
            .copied()
            .ok_or_else(|| ScheduleError::NotConfigured(employee_id.to_string()))
    }

    pub fn override_count(&self) -> usize {
        self.overrides.len()
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOOK: &str = r#"
        [default]
        start_time = "09:00:00"
        end_time = "18:00:00"
        late_threshold_minutes = 10
        scheduled_daily_hours = 8.0

        [overrides.emp-7]
        start_time = "07:00:00"
        end_time = "15:00:00"
        late_threshold_minutes = 5
        scheduled_daily_hours = 7.0
    "#;

    #[test]
    fn parses_default_and_overrides() {
        let book: ScheduleBook = toml::from_str(BOOK).unwrap();
        book.validate().unwrap();
        assert!(book.has_default());
        assert_eq!(book.override_count(), 1);

        let default = book.for_employee("emp-1").unwrap();
        assert_eq!(default.start_time.to_string(), "09:00:00");
        assert_eq!(default.late_threshold_minutes, 10);

        let early_shift = book.for_employee("emp-7").unwrap();
        assert_eq!(early_shift.start_time.to_string(), "07:00:00");
        assert!((early_shift.scheduled_daily_hours - 7.0).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_schedule_is_an_error() {
        let book = ScheduleBook::new(None, HashMap::new());
        let err = book.for_employee("emp-1").unwrap_err();
        assert!(matches!(err, ScheduleError::NotConfigured(id) if id == "emp-1"));
    }

    #[test]
    fn override_only_book_rejects_unknown_employee() {
        let book: ScheduleBook = toml::from_str(
            r#"
            [overrides.emp-7]
            start_time = "07:00:00"
            end_time = "15:00:00"
            late_threshold_minutes = 5
            scheduled_daily_hours = 7.0
        "#,
        )
        .unwrap();
        assert!(book.for_employee("emp-7").is_ok());
        assert!(book.for_employee("emp-8").is_err());
    }

    #[test]
    fn inverted_times_fail_validation() {
        let book: ScheduleBook = toml::from_str(
            r#"
            [default]
            start_time = "18:00:00"
            end_time = "09:00:00"
            late_threshold_minutes = 10
            scheduled_daily_hours = 8.0
        "#,
        )
        .unwrap();
        let err = book.validate().unwrap_err();
        assert!(matches!(err, ScheduleError::Invalid { .. }));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: Result<ScheduleBook, _> = toml::from_str(
            r#"
            [default]
            start_time = "09:00:00"
            end_time = "18:00:00"
            late_threshold_minutes = 10
            scheduled_daily_hours = 8.0
            grace_days = 3
        "#,
        );
        assert!(result.is_err());
    }
}
