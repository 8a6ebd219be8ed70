//! Attendance event resolution and work-hours accounting.
//!
//! Two layers share this module. The resolver classifies a single verified
//! check-in/check-out against the employee's schedule and flags conflicting
//! events instead of dropping them. The aggregators fold the complete event
//! log for a day into a [`DailyWorkHours`] record and daily records into a
//! [`MonthlyAttendanceSummary`] — pure replays over their inputs, so
//! recomputation is idempotent and always safe.

use crate::schedule::WorkSchedule;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    CheckIn,
    CheckOut,
}

/// Classification of a single event against the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Normal,
    Late,
    EarlyLeave,
}

/// Conflict flag on a recorded event. Anomalous events stay in the log for
/// manual reconciliation but are excluded from hours aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anomaly {
    /// Second check-in while one was already open.
    DuplicateOpen,
    /// Check-out with no open check-in on the same work-day.
    OrphanCheckout,
}

/// One immutable row of the attendance log. Corrections happen through
/// compensating records, never by mutating an existing one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceEvent {
    pub id: Uuid,
    pub employee_id: String,
    pub kind: EventKind,
    /// Organization-local wall-clock instant of the event.
    pub timestamp: NaiveDateTime,
    pub match_confidence: f32,
    pub status: EventStatus,
    pub late_minutes: i64,
    pub early_minutes: i64,
    pub anomaly: Option<Anomaly>,
}

impl AttendanceEvent {
    pub fn work_date(&self) -> NaiveDate {
        self.timestamp.date()
    }
}

/// Whether the non-anomalous events leave a check-in open (present without a
/// matching check-out).
pub fn has_open_check_in(events: &[AttendanceEvent]) -> bool {
    let mut open = false;
    for event in events.iter().filter(|e| e.anomaly.is_none()) {
        match event.kind {
            EventKind::CheckIn => open = true,
            EventKind::CheckOut => open = false,
        }
    }
    open
}

/// Classify and record one verified attendance event.
///
/// `day_events` must be the complete log for this employee and work-day so
/// far; conflicts are detected by replaying it. The returned event carries
/// its anomaly flag — the caller persists it either way and surfaces the
/// anomaly to the user.
pub fn resolve_event(
    employee_id: &str,
    kind: EventKind,
    now: NaiveDateTime,
    match_confidence: f32,
    schedule: &WorkSchedule,
    day_events: &[AttendanceEvent],
) -> AttendanceEvent {
    let (status, late_minutes, early_minutes) = match kind {
        EventKind::CheckIn => classify_check_in(now, schedule),
        EventKind::CheckOut => classify_check_out(now, schedule),
    };

    let open = has_open_check_in(day_events);
    let anomaly = match kind {
        EventKind::CheckIn if open => Some(Anomaly::DuplicateOpen),
        EventKind::CheckOut if !open => Some(Anomaly::OrphanCheckout),
        _ => None,
    };

    if let Some(anomaly) = anomaly {
        tracing::warn!(
            employee = employee_id,
            ?kind,
            ?anomaly,
            "recording anomalous attendance event for reconciliation"
        );
    }

    AttendanceEvent {
        id: Uuid::new_v4(),
        employee_id: employee_id.to_string(),
        kind,
        timestamp: now,
        match_confidence,
        status,
        late_minutes,
        early_minutes,
        anomaly,
    }
}

/// Late iff the check-in lands after `start + late_threshold`; late minutes
/// count from the scheduled start, not from the end of the grace period.
fn classify_check_in(now: NaiveDateTime, schedule: &WorkSchedule) -> (EventStatus, i64, i64) {
    let minutes_past_start = (now.time() - schedule.start_time).num_minutes();
    if minutes_past_start > i64::from(schedule.late_threshold_minutes) {
        (EventStatus::Late, minutes_past_start, 0)
    } else {
        (EventStatus::Normal, 0, 0)
    }
}

fn classify_check_out(now: NaiveDateTime, schedule: &WorkSchedule) -> (EventStatus, i64, i64) {
    if now.time() < schedule.end_time {
        let minutes_short = (schedule.end_time - now.time()).num_minutes();
        (EventStatus::EarlyLeave, 0, minutes_short)
    } else {
        (EventStatus::Normal, 0, 0)
    }
}

/// Overall classification of one employee work-day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayStatus {
    Normal,
    Late,
    Absent,
    Leave,
}

/// Derived work-hours record for one `(employee, work_date)`.
///
/// Hour fields hold full precision; rounding to two decimals happens only at
/// the persistence/response edge via [`DailyWorkHours::rounded`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyWorkHours {
    pub employee_id: String,
    pub work_date: NaiveDate,
    pub first_checkin: Option<NaiveDateTime>,
    pub last_checkout: Option<NaiveDateTime>,
    pub regular_hours: f64,
    pub overtime_hours: f64,
    pub late_minutes: i64,
    pub early_minutes: i64,
    pub status: DayStatus,
    /// True when no check-out has landed yet and hours were computed against
    /// the query instant. Provisional records are never persisted.
    pub provisional: bool,
}

impl DailyWorkHours {
    /// Copy with hour fields rounded to 2 decimals, for persistence and
    /// API responses.
    pub fn rounded(&self) -> DailyWorkHours {
        DailyWorkHours {
            regular_hours: round2(self.regular_hours),
            overtime_hours: round2(self.overtime_hours),
            ..self.clone()
        }
    }
}

/// Round to 2 decimals. Applied once at the edge; intermediate math keeps
/// full precision so error cannot compound across aggregation levels.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Fold the complete event set for one employee-day into a work-hours
/// record.
///
/// Pure function of its inputs: replaying it over an unchanged log yields an
/// identical record. Anomalous events are skipped — they await manual
/// reconciliation and must not distort totals. `now` is only consulted when
/// the day has a check-in but no check-out yet.
pub fn compute_daily(
    employee_id: &str,
    work_date: NaiveDate,
    events: &[AttendanceEvent],
    schedule: &WorkSchedule,
    on_leave: bool,
    now: NaiveDateTime,
) -> DailyWorkHours {
    let mut first_checkin: Option<NaiveDateTime> = None;
    let mut last_checkout: Option<NaiveDateTime> = None;

    for event in events.iter().filter(|e| e.anomaly.is_none()) {
        match event.kind {
            EventKind::CheckIn => {
                if first_checkin.map_or(true, |t| event.timestamp < t) {
                    first_checkin = Some(event.timestamp);
                }
            }
            EventKind::CheckOut => {
                if last_checkout.map_or(true, |t| event.timestamp > t) {
                    last_checkout = Some(event.timestamp);
                }
            }
        }
    }

    let Some(checkin) = first_checkin else {
        let status = if on_leave { DayStatus::Leave } else { DayStatus::Absent };
        return DailyWorkHours {
            employee_id: employee_id.to_string(),
            work_date,
            first_checkin: None,
            last_checkout: None,
            regular_hours: 0.0,
            overtime_hours: 0.0,
            late_minutes: 0,
            early_minutes: 0,
            status,
            provisional: false,
        };
    };

    let (late_status, late_minutes, _) = classify_check_in(checkin, schedule);

    let (end, provisional) = match last_checkout {
        Some(checkout) => (checkout, false),
        None => (now.max(checkin), true),
    };

    let elapsed_hours = (end - checkin).num_seconds() as f64 / 3600.0;
    let regular_hours = elapsed_hours.min(schedule.scheduled_daily_hours);
    let overtime_hours = (elapsed_hours - schedule.scheduled_daily_hours).max(0.0);

    let early_minutes = match last_checkout {
        Some(checkout) => classify_check_out(checkout, schedule).2,
        None => 0,
    };

    let status = if late_status == EventStatus::Late {
        DayStatus::Late
    } else {
        DayStatus::Normal
    };

    DailyWorkHours {
        employee_id: employee_id.to_string(),
        work_date,
        first_checkin: Some(checkin),
        last_checkout,
        regular_hours,
        overtime_hours,
        late_minutes,
        early_minutes,
        status,
        provisional,
    }
}

/// Pure aggregation across a month's daily records; recomputable at any
/// time from the daily table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyAttendanceSummary {
    pub employee_id: String,
    pub year: i32,
    pub month: u32,
    pub regular_hours: f64,
    pub overtime_hours: f64,
    pub worked_days: u32,
    pub late_days: u32,
    pub absent_days: u32,
    pub leave_days: u32,
    pub avg_late_minutes: f64,
}

pub fn compute_monthly(
    employee_id: &str,
    year: i32,
    month: u32,
    days: &[DailyWorkHours],
) -> MonthlyAttendanceSummary {
    let mut summary = MonthlyAttendanceSummary {
        employee_id: employee_id.to_string(),
        year,
        month,
        regular_hours: 0.0,
        overtime_hours: 0.0,
        worked_days: 0,
        late_days: 0,
        absent_days: 0,
        leave_days: 0,
        avg_late_minutes: 0.0,
    };

    let mut late_minutes_total = 0i64;
    for day in days {
        summary.regular_hours += day.regular_hours;
        summary.overtime_hours += day.overtime_hours;
        match day.status {
            DayStatus::Normal | DayStatus::Late => summary.worked_days += 1,
            DayStatus::Absent => summary.absent_days += 1,
            DayStatus::Leave => summary.leave_days += 1,
        }
        if day.late_minutes > 0 {
            summary.late_days += 1;
            late_minutes_total += day.late_minutes;
        }
    }

    if summary.late_days > 0 {
        summary.avg_late_minutes = late_minutes_total as f64 / f64::from(summary.late_days);
    }
    summary
}
