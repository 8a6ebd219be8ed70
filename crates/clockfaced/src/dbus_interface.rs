//! D-Bus interface for the Clockface attendance daemon.
//!
//! Bus name: io.clockface.Timeclock1
//! Object path: /io/clockface/Timeclock1
//!
//! Structured payloads travel as JSON strings with strict request types:
//! malformed input is rejected at this boundary, before it reaches the
//! engine. Recognition failures come back as `success: false` responses the
//! UI can retry; operational failures (missing schedule, storage) surface as
//! D-Bus errors and are logged for the administrator.

use crate::engine::{EngineError, EngineHandle};
use chrono::{NaiveDate, NaiveDateTime};
use clockface_core::timeclock::{EventKind, EventStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zbus::interface;

pub struct TimeclockService {
    engine: EngineHandle,
}

impl TimeclockService {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct VerifyRequest {
    descriptor: Vec<f32>,
    mode: EventKind,
    liveness_session: Uuid,
}

#[derive(Debug, Serialize)]
struct VerifyResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    employee: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<EventStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    confidence: Option<f32>,
    message: String,
}

/// Split engine failures into a retryable user-facing response or a D-Bus
/// error for operational problems.
fn failure_response(err: EngineError) -> zbus::fdo::Result<String> {
    if err.is_operational() {
        tracing::error!(error = %err, "operational failure in attendance flow");
        return Err(zbus::fdo::Error::Failed(err.to_string()));
    }
    tracing::info!(reason = %err, "attendance attempt rejected");
    let response = VerifyResponse {
        success: false,
        employee: None,
        timestamp: None,
        status: None,
        confidence: None,
        message: err.to_string(),
    };
    to_json(&response)
}

fn to_json<T: Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value)
        .map_err(|e| zbus::fdo::Error::Failed(format!("response encoding: {e}")))
}

fn parse_session(s: &str) -> zbus::fdo::Result<Uuid> {
    Uuid::parse_str(s)
        .map_err(|e| zbus::fdo::Error::InvalidArgs(format!("session id {s:?}: {e}")))
}

fn parse_date(s: &str) -> zbus::fdo::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| zbus::fdo::Error::InvalidArgs(format!("date {s:?}: {e}")))
}

fn internal(err: EngineError) -> zbus::fdo::Error {
    tracing::error!(error = %err, "engine request failed");
    zbus::fdo::Error::Failed(err.to_string())
}

#[interface(name = "io.clockface.Timeclock1")]
impl TimeclockService {
    /// Resolve an attendance event from a descriptor, a mode, and a passed
    /// liveness session. Returns a JSON `VerifyResponse`.
    async fn verify(&self, request: &str) -> zbus::fdo::Result<String> {
        let request: VerifyRequest = serde_json::from_str(request)
            .map_err(|e| zbus::fdo::Error::InvalidArgs(format!("verify request: {e}")))?;

        match self
            .engine
            .verify(request.descriptor, request.mode, request.liveness_session)
            .await
        {
            Ok(event) => {
                let message = match event.status {
                    EventStatus::Normal => "attendance recorded".to_string(),
                    EventStatus::Late => {
                        format!("attendance recorded; {} minutes late", event.late_minutes)
                    }
                    EventStatus::EarlyLeave => {
                        format!("attendance recorded; left {} minutes early", event.early_minutes)
                    }
                };
                to_json(&VerifyResponse {
                    success: true,
                    employee: Some(event.employee_id),
                    timestamp: Some(event.timestamp),
                    status: Some(event.status),
                    confidence: Some(event.match_confidence),
                    message,
                })
            }
            Err(err) => failure_response(err),
        }
    }

    /// Enroll (or replace) the face profile for an employee. The
    /// descriptor is a JSON array of 128 floats.
    async fn enroll_profile(
        &self,
        employee: &str,
        descriptor: &str,
    ) -> zbus::fdo::Result<String> {
        let values: Vec<f32> = serde_json::from_str(descriptor)
            .map_err(|e| zbus::fdo::Error::InvalidArgs(format!("descriptor: {e}")))?;

        match self.engine.enroll(employee.to_string(), values).await {
            Ok(enrolled_at) => to_json(&serde_json::json!({
                "success": true,
                "employee": employee,
                "enrolled_at": enrolled_at.to_rfc3339(),
            })),
            Err(err @ EngineError::Descriptor(_)) => {
                Err(zbus::fdo::Error::InvalidArgs(err.to_string()))
            }
            Err(err) => Err(internal(err)),
        }
    }

    /// Delete an employee's face profile. Returns whether one existed.
    async fn reset_profile(&self, employee: &str) -> zbus::fdo::Result<bool> {
        self.engine
            .reset(employee.to_string())
            .await
            .map_err(internal)
    }

    /// Start a liveness session. Returns `{session, deadline}` as JSON.
    async fn liveness_start(&self) -> zbus::fdo::Result<String> {
        let (session, started_at) = self.engine.liveness_start().await.map_err(internal)?;
        to_json(&serde_json::json!({
            "session": session.to_string(),
            "started_at": started_at.to_rfc3339(),
        }))
    }

    /// Feed one centroid sample. Returns `{verdict, progress}` as JSON.
    async fn liveness_sample(&self, session: &str, x: f64, y: f64) -> zbus::fdo::Result<String> {
        let session = parse_session(session)?;
        let progress = self
            .engine
            .liveness_sample(session, Some((x as f32, y as f32)))
            .await
            .map_err(|err| match err {
                EngineError::UnknownSession(_) => zbus::fdo::Error::InvalidArgs(err.to_string()),
                other => internal(other),
            })?;
        to_json(&progress)
    }

    /// Register a sampling tick with no detected face.
    async fn liveness_miss(&self, session: &str) -> zbus::fdo::Result<String> {
        let session = parse_session(session)?;
        let progress = self
            .engine
            .liveness_sample(session, None)
            .await
            .map_err(|err| match err {
                EngineError::UnknownSession(_) => zbus::fdo::Error::InvalidArgs(err.to_string()),
                other => internal(other),
            })?;
        to_json(&progress)
    }

    /// Cancel a session (camera lost, user aborted). Returns false when the
    /// session is unknown.
    async fn liveness_cancel(&self, session: &str) -> zbus::fdo::Result<bool> {
        let session = parse_session(session)?;
        self.engine.liveness_cancel(session).await.map_err(internal)
    }

    /// Daily work-hours records for `[start, end]` (dates as YYYY-MM-DD),
    /// as a JSON array.
    async fn work_hours(
        &self,
        employee: &str,
        start: &str,
        end: &str,
    ) -> zbus::fdo::Result<String> {
        let start = parse_date(start)?;
        let end = parse_date(end)?;
        let records = self
            .engine
            .work_hours(employee.to_string(), start, end)
            .await
            .map_err(internal)?;
        to_json(&records)
    }

    /// Monthly attendance summary as JSON.
    async fn monthly_summary(
        &self,
        employee: &str,
        year: i32,
        month: u32,
    ) -> zbus::fdo::Result<String> {
        if !(1..=12).contains(&month) {
            return Err(zbus::fdo::Error::InvalidArgs(format!(
                "month must be 1-12, got {month}"
            )));
        }
        let summary = self
            .engine
            .monthly_summary(employee.to_string(), year, month)
            .await
            .map_err(internal)?;
        to_json(&summary)
    }

    /// Record an approved leave day (YYYY-MM-DD) for an employee.
    async fn record_leave(&self, employee: &str, date: &str) -> zbus::fdo::Result<bool> {
        let date = parse_date(date)?;
        self.engine
            .record_leave(employee.to_string(), date)
            .await
            .map_err(internal)?;
        Ok(true)
    }

    /// Daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let status = self.engine.status().await.map_err(internal)?;
        to_json(&serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "enrolled_identities": status.enrolled_identities,
            "open_liveness_sessions": status.open_liveness_sessions,
            "key_fingerprint": status.key_fingerprint,
            "schedule_default": status.schedule_default,
            "schedule_overrides": status.schedule_overrides,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_request_rejects_unknown_fields() {
        let raw = format!(
            r#"{{"descriptor": {:?}, "mode": "check_in",
                "liveness_session": "00000000-0000-0000-0000-000000000000",
                "extra": 1}}"#,
            vec![0.0f32; 128]
        );
        assert!(serde_json::from_str::<VerifyRequest>(&raw).is_err());
    }

    #[test]
    fn verify_request_parses_modes() {
        for (mode, expected) in [
            ("check_in", EventKind::CheckIn),
            ("check_out", EventKind::CheckOut),
        ] {
            let raw = format!(
                r#"{{"descriptor": {:?}, "mode": "{mode}",
                    "liveness_session": "00000000-0000-0000-0000-000000000000"}}"#,
                vec![0.0f32; 128]
            );
            let parsed: VerifyRequest = serde_json::from_str(&raw).unwrap();
            assert_eq!(parsed.mode, expected);
        }
    }

    #[test]
    fn failure_response_is_retryable_json() {
        let json = failure_response(EngineError::DuplicateOpenEvent).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["success"], false);
        assert!(value["message"].as_str().unwrap().contains("check-in"));
    }
}
