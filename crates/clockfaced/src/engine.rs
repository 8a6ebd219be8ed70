//! Engine actor: owns the store, the matcher, the schedule book, and all
//! open liveness sessions.
//!
//! Every request flows through one mpsc queue and is handled to completion
//! before the next, which is what guarantees the at-most-one-open-check-in
//! rule: two concurrent recognition attempts for the same employee are
//! serialized here, and the loser sees the winner's event in the day log.

use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use clockface_core::liveness::{LivenessError, LivenessSession, Verdict};
use clockface_core::matcher::MatchError;
use clockface_core::schedule::{ScheduleBook, ScheduleError};
use clockface_core::timeclock::{
    compute_daily, compute_monthly, resolve_event, Anomaly, AttendanceEvent, DailyWorkHours,
    EventKind, MonthlyAttendanceSummary,
};
use clockface_core::types::DescriptorError;
use clockface_core::{Descriptor, DescriptorMatcher, LivenessConfig};
use clockface_store::{AttendanceStore, StoreError};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// How long a terminal session stays addressable so a late request gets a
/// precise error instead of "unknown session".
const SESSION_RETENTION_MINUTES: i64 = 5;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error(transparent)]
    Liveness(#[from] LivenessError),
    #[error("liveness session {0} not found")]
    UnknownSession(Uuid),
    #[error("duplicate check-in recorded; previous check-in is still open")]
    DuplicateOpenEvent,
    #[error("check-out recorded without an open check-in; flagged for reconciliation")]
    OrphanCheckout,
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("engine task exited")]
    ChannelClosed,
}

impl EngineError {
    /// Operational errors need administrator attention and are logged and
    /// propagated differently from retryable recognition failures.
    pub fn is_operational(&self) -> bool {
        matches!(self, EngineError::Schedule(_) | EngineError::Store(_))
    }
}

/// Liveness state reported back to the sampling client.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LivenessProgress {
    pub verdict: Verdict,
    pub progress: u8,
}

/// Daemon health snapshot for the status surface.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub enrolled_identities: u64,
    pub open_liveness_sessions: usize,
    pub key_fingerprint: String,
    pub schedule_default: bool,
    pub schedule_overrides: usize,
}

enum EngineRequest {
    Verify {
        descriptor: Vec<f32>,
        mode: EventKind,
        liveness_session: Uuid,
        reply: oneshot::Sender<Result<AttendanceEvent, EngineError>>,
    },
    Enroll {
        employee_id: String,
        descriptor: Vec<f32>,
        reply: oneshot::Sender<Result<DateTime<Utc>, EngineError>>,
    },
    Reset {
        employee_id: String,
        reply: oneshot::Sender<Result<bool, EngineError>>,
    },
    LivenessStart {
        reply: oneshot::Sender<(Uuid, DateTime<Utc>)>,
    },
    LivenessSample {
        session: Uuid,
        centroid: Option<(f32, f32)>,
        reply: oneshot::Sender<Result<LivenessProgress, EngineError>>,
    },
    LivenessCancel {
        session: Uuid,
        reply: oneshot::Sender<bool>,
    },
    WorkHours {
        employee_id: String,
        start: NaiveDate,
        end: NaiveDate,
        reply: oneshot::Sender<Result<Vec<DailyWorkHours>, EngineError>>,
    },
    MonthlySummary {
        employee_id: String,
        year: i32,
        month: u32,
        reply: oneshot::Sender<Result<MonthlyAttendanceSummary, EngineError>>,
    },
    RecordLeave {
        employee_id: String,
        date: NaiveDate,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Status {
        reply: oneshot::Sender<Result<EngineStatus, EngineError>>,
    },
}

/// Clone-safe handle to the engine task.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn send<T>(
        &self,
        req: EngineRequest,
        rx: oneshot::Receiver<Result<T, EngineError>>,
    ) -> Result<T, EngineError> {
        self.tx
            .send(req)
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Resolve one verified attendance event end-to-end: consume the
    /// liveness session, match the descriptor, classify, persist.
    pub async fn verify(
        &self,
        descriptor: Vec<f32>,
        mode: EventKind,
        liveness_session: Uuid,
    ) -> Result<AttendanceEvent, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(
            EngineRequest::Verify {
                descriptor,
                mode,
                liveness_session,
                reply,
            },
            rx,
        )
        .await
    }

    pub async fn enroll(
        &self,
        employee_id: String,
        descriptor: Vec<f32>,
    ) -> Result<DateTime<Utc>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(
            EngineRequest::Enroll {
                employee_id,
                descriptor,
                reply,
            },
            rx,
        )
        .await
    }

    pub async fn reset(&self, employee_id: String) -> Result<bool, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Reset { employee_id, reply }, rx).await
    }

    pub async fn liveness_start(&self) -> Result<(Uuid, DateTime<Utc>), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::LivenessStart { reply })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Feed one sampling tick; `None` means no face was visible this tick.
    pub async fn liveness_sample(
        &self,
        session: Uuid,
        centroid: Option<(f32, f32)>,
    ) -> Result<LivenessProgress, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(
            EngineRequest::LivenessSample {
                session,
                centroid,
                reply,
            },
            rx,
        )
        .await
    }

    /// Returns false when the session is unknown (already swept).
    pub async fn liveness_cancel(&self, session: Uuid) -> Result<bool, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::LivenessCancel { session, reply })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    pub async fn work_hours(
        &self,
        employee_id: String,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyWorkHours>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(
            EngineRequest::WorkHours {
                employee_id,
                start,
                end,
                reply,
            },
            rx,
        )
        .await
    }

    pub async fn monthly_summary(
        &self,
        employee_id: String,
        year: i32,
        month: u32,
    ) -> Result<MonthlyAttendanceSummary, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(
            EngineRequest::MonthlySummary {
                employee_id,
                year,
                month,
                reply,
            },
            rx,
        )
        .await
    }

    pub async fn record_leave(
        &self,
        employee_id: String,
        date: NaiveDate,
    ) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(
            EngineRequest::RecordLeave {
                employee_id,
                date,
                reply,
            },
            rx,
        )
        .await
    }

    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Status { reply }, rx).await
    }
}

/// Spawn the engine task. The store and schedule book are opened by the
/// caller (fail-fast at startup), the engine only drives them.
pub fn spawn_engine(
    store: AttendanceStore,
    schedules: ScheduleBook,
    matcher: DescriptorMatcher,
    liveness_config: LivenessConfig,
) -> EngineHandle {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(16);

    let mut engine = Engine {
        store,
        schedules,
        matcher,
        liveness_config,
        sessions: HashMap::new(),
    };

    tokio::spawn(async move {
        tracing::info!("engine task started");
        while let Some(req) = rx.recv().await {
            engine.handle(req).await;
        }
        tracing::info!("engine task exiting");
    });

    EngineHandle { tx }
}

struct Engine {
    store: AttendanceStore,
    schedules: ScheduleBook,
    matcher: DescriptorMatcher,
    liveness_config: LivenessConfig,
    sessions: HashMap<Uuid, LivenessSession>,
}

impl Engine {
    async fn handle(&mut self, req: EngineRequest) {
        match req {
            EngineRequest::Verify {
                descriptor,
                mode,
                liveness_session,
                reply,
            } => {
                let result = self.run_verify(descriptor, mode, liveness_session).await;
                let _ = reply.send(result);
            }
            EngineRequest::Enroll {
                employee_id,
                descriptor,
                reply,
            } => {
                let _ = reply.send(self.run_enroll(employee_id, descriptor).await);
            }
            EngineRequest::Reset { employee_id, reply } => {
                let result = self
                    .store
                    .remove_descriptor(&employee_id)
                    .await
                    .map_err(EngineError::from);
                if let Ok(removed) = &result {
                    tracing::info!(employee = %employee_id, removed, "face profile reset");
                }
                let _ = reply.send(result);
            }
            EngineRequest::LivenessStart { reply } => {
                self.sweep_sessions(Utc::now());
                let session = LivenessSession::start(Utc::now(), self.liveness_config);
                let id = session.id();
                let started = session.started_at();
                self.sessions.insert(id, session);
                let _ = reply.send((id, started));
            }
            EngineRequest::LivenessSample {
                session,
                centroid,
                reply,
            } => {
                let _ = reply.send(self.run_liveness_sample(session, centroid));
            }
            EngineRequest::LivenessCancel { session, reply } => {
                let cancelled = match self.sessions.get_mut(&session) {
                    Some(s) => {
                        s.cancel();
                        true
                    }
                    None => false,
                };
                let _ = reply.send(cancelled);
            }
            EngineRequest::WorkHours {
                employee_id,
                start,
                end,
                reply,
            } => {
                let _ = reply.send(self.expand_daily_records(&employee_id, start, end).await);
            }
            EngineRequest::MonthlySummary {
                employee_id,
                year,
                month,
                reply,
            } => {
                let _ = reply.send(self.run_monthly(&employee_id, year, month).await);
            }
            EngineRequest::RecordLeave {
                employee_id,
                date,
                reply,
            } => {
                let result = self
                    .store
                    .record_leave(&employee_id, date)
                    .await
                    .map_err(EngineError::from);
                let _ = reply.send(result);
            }
            EngineRequest::Status { reply } => {
                let result = async {
                    Ok(EngineStatus {
                        enrolled_identities: self.store.descriptor_count().await?,
                        open_liveness_sessions: self
                            .sessions
                            .values()
                            .filter(|s| !s.verdict().is_terminal())
                            .count(),
                        key_fingerprint: self.store.key_fingerprint().to_string(),
                        schedule_default: self.schedules.has_default(),
                        schedule_overrides: self.schedules.override_count(),
                    })
                }
                .await;
                let _ = reply.send(result);
            }
        }
    }

    async fn run_enroll(
        &mut self,
        employee_id: String,
        descriptor: Vec<f32>,
    ) -> Result<DateTime<Utc>, EngineError> {
        let descriptor = Descriptor::from_vec(descriptor)?;
        let enrolled_at = Utc::now();
        self.store
            .enroll_descriptor(&clockface_core::EnrolledDescriptor {
                identity_id: employee_id.clone(),
                descriptor,
                enrolled_at,
            })
            .await?;
        tracing::info!(employee = %employee_id, "face profile enrolled");
        Ok(enrolled_at)
    }

    fn run_liveness_sample(
        &mut self,
        session: Uuid,
        centroid: Option<(f32, f32)>,
    ) -> Result<LivenessProgress, EngineError> {
        let now = Utc::now();
        self.sweep_sessions(now);
        let s = self
            .sessions
            .get_mut(&session)
            .ok_or(EngineError::UnknownSession(session))?;
        let verdict = match centroid {
            Some(pos) => s.push_sample(now, pos),
            None => s.tick_without_face(now),
        };
        Ok(LivenessProgress {
            verdict,
            progress: s.progress(),
        })
    }

    /// The full recognition flow. The liveness session is consumed before
    /// matching: one attempt per session, whatever its outcome.
    async fn run_verify(
        &mut self,
        descriptor: Vec<f32>,
        mode: EventKind,
        liveness_session: Uuid,
    ) -> Result<AttendanceEvent, EngineError> {
        let now_utc = Utc::now();
        self.sweep_sessions(now_utc);

        let session = self
            .sessions
            .get_mut(&liveness_session)
            .ok_or(EngineError::UnknownSession(liveness_session))?;
        session.poll(now_utc);
        session.consume()?;

        let probe = Descriptor::from_vec(descriptor)?;
        let gallery = self.store.load_gallery().await?;
        let matched = self.matcher.match_probe(&probe, &gallery)?;

        let schedule = self.schedules.for_employee(&matched.identity_id)?;
        let now = Local::now().naive_local();
        let day = now.date();
        let day_events = self.store.events_for_day(&matched.identity_id, day).await?;

        let event = resolve_event(
            &matched.identity_id,
            mode,
            now,
            matched.confidence,
            &schedule,
            &day_events,
        );
        self.store.append_event(&event).await?;

        // Rebuild the day's record from the updated log. Provisional
        // records (open check-in) stay query-time only.
        let mut events = day_events;
        events.push(event.clone());
        let on_leave = self.store.is_on_leave(&matched.identity_id, day).await?;
        let record = compute_daily(&matched.identity_id, day, &events, &schedule, on_leave, now);
        if !record.provisional {
            self.store.upsert_daily(&record).await?;
        }

        tracing::info!(
            employee = %event.employee_id,
            kind = ?event.kind,
            status = ?event.status,
            confidence = event.match_confidence,
            anomaly = ?event.anomaly,
            "attendance event recorded"
        );

        match event.anomaly {
            Some(Anomaly::DuplicateOpen) => Err(EngineError::DuplicateOpenEvent),
            Some(Anomaly::OrphanCheckout) => Err(EngineError::OrphanCheckout),
            None => Ok(event),
        }
    }

    /// Work-hours records for every day in `[start, end]`, past or current:
    /// persisted records where the day is settled, otherwise recomputed
    /// from the event log (provisional for a still-open today, absent or
    /// leave for empty days). Future days are omitted.
    async fn expand_daily_records(
        &self,
        employee_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyWorkHours>, EngineError> {
        let schedule = self.schedules.for_employee(employee_id)?;
        let now = Local::now().naive_local();
        let today = now.date();

        let persisted = self.store.daily_range(employee_id, start, end).await?;
        let mut by_date: HashMap<NaiveDate, DailyWorkHours> =
            persisted.into_iter().map(|r| (r.work_date, r)).collect();

        let mut records = Vec::new();
        let mut date = start;
        while date <= end {
            if date > today {
                break;
            }
            let record = match by_date.remove(&date) {
                Some(r) => r,
                None => {
                    let events = self.store.events_for_day(employee_id, date).await?;
                    let on_leave = self.store.is_on_leave(employee_id, date).await?;
                    compute_daily(employee_id, date, &events, &schedule, on_leave, now)
                }
            };
            records.push(record.rounded());
            date = match date.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }
        Ok(records)
    }

    async fn run_monthly(
        &self,
        employee_id: &str,
        year: i32,
        month: u32,
    ) -> Result<MonthlyAttendanceSummary, EngineError> {
        let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
            EngineError::Schedule(ScheduleError::Invalid {
                scope: employee_id.to_string(),
                reason: format!("invalid month {year}-{month}"),
            })
        })?;
        let end = last_day_of_month(year, month);
        let days = self.expand_daily_records(employee_id, start, end).await?;
        Ok(compute_monthly(employee_id, year, month, &days))
    }

    /// Drop sessions that have been terminal (or silently abandoned) for
    /// longer than the retention window.
    fn sweep_sessions(&mut self, now: DateTime<Utc>) {
        let retention = self.liveness_config.timeout + Duration::minutes(SESSION_RETENTION_MINUTES);
        self.sessions.retain(|id, session| {
            session.poll(now);
            let expired = now - session.started_at() > retention;
            if expired {
                tracing::debug!(session = %id, verdict = ?session.verdict(), "sweeping liveness session");
            }
            !expired
        });
    }
}

fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    next_month
        .and_then(|d| d.pred_opt())
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(year, month, 28).unwrap_or(NaiveDate::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use clockface_core::schedule::WorkSchedule;
    use clockface_core::MatcherConfig;
    use clockface_store::DescriptorCipher;
    use clockface_core::types::DESCRIPTOR_DIM;

    fn test_schedules() -> ScheduleBook {
        let default = WorkSchedule {
            start_time: NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(23, 59, 59).unwrap(),
            late_threshold_minutes: 1440,
            scheduled_daily_hours: 8.0,
        };
        ScheduleBook::new(Some(default), HashMap::new())
    }

    async fn test_engine() -> EngineHandle {
        let store = AttendanceStore::open_in_memory(DescriptorCipher::from_key([7u8; 32]))
            .await
            .unwrap();
        spawn_engine(
            store,
            test_schedules(),
            DescriptorMatcher::new(MatcherConfig::default()),
            LivenessConfig::default(),
        )
    }

    fn vector(first: f32) -> Vec<f32> {
        let mut values = vec![0.0f32; DESCRIPTOR_DIM];
        values[0] = first;
        values
    }

    /// Drive a fresh liveness session to `Passed` and return its id.
    async fn passed_session(engine: &EngineHandle) -> Uuid {
        let (session, _) = engine.liveness_start().await.unwrap();
        for n in 0..12 {
            let progress = engine
                .liveness_sample(session, Some((100.0 + 5.0 * n as f32, 50.0)))
                .await
                .unwrap();
            if progress.verdict == Verdict::Passed {
                return session;
            }
        }
        panic!("session never passed");
    }

    #[tokio::test]
    async fn verify_happy_path_records_check_in() {
        let engine = test_engine().await;
        engine.enroll("emp-1".into(), vector(0.3)).await.unwrap();

        let session = passed_session(&engine).await;
        let event = engine
            .verify(vector(0.3), EventKind::CheckIn, session)
            .await
            .unwrap();

        assert_eq!(event.employee_id, "emp-1");
        assert_eq!(event.kind, EventKind::CheckIn);
        assert!(event.anomaly.is_none());
        assert!(event.match_confidence > 0.99);
    }

    #[tokio::test]
    async fn verify_requires_known_session() {
        let engine = test_engine().await;
        engine.enroll("emp-1".into(), vector(0.3)).await.unwrap();

        let err = engine
            .verify(vector(0.3), EventKind::CheckIn, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownSession(_)));
    }

    #[tokio::test]
    async fn pending_session_is_rejected() {
        let engine = test_engine().await;
        engine.enroll("emp-1".into(), vector(0.3)).await.unwrap();

        let (session, _) = engine.liveness_start().await.unwrap();
        let err = engine
            .verify(vector(0.3), EventKind::CheckIn, session)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Liveness(LivenessError::NotPassed(Verdict::Pending))
        ));
    }

    #[tokio::test]
    async fn session_is_single_use() {
        let engine = test_engine().await;
        engine.enroll("emp-1".into(), vector(0.3)).await.unwrap();

        let session = passed_session(&engine).await;
        engine
            .verify(vector(0.3), EventKind::CheckIn, session)
            .await
            .unwrap();

        // Same session again: consumed, even though it passed.
        let err = engine
            .verify(vector(0.3), EventKind::CheckOut, session)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Liveness(LivenessError::AlreadyConsumed)
        ));
    }

    #[tokio::test]
    async fn duplicate_open_check_in_is_flagged_and_errored() {
        let engine = test_engine().await;
        engine.enroll("emp-1".into(), vector(0.3)).await.unwrap();

        let session = passed_session(&engine).await;
        engine
            .verify(vector(0.3), EventKind::CheckIn, session)
            .await
            .unwrap();

        let session = passed_session(&engine).await;
        let err = engine
            .verify(vector(0.3), EventKind::CheckIn, session)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateOpenEvent));
    }

    #[tokio::test]
    async fn orphan_check_out_is_flagged_and_errored() {
        let engine = test_engine().await;
        engine.enroll("emp-1".into(), vector(0.3)).await.unwrap();

        let session = passed_session(&engine).await;
        let err = engine
            .verify(vector(0.3), EventKind::CheckOut, session)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::OrphanCheckout));
    }

    #[tokio::test]
    async fn unknown_face_is_rejected() {
        let engine = test_engine().await;
        engine.enroll("emp-1".into(), vector(0.3)).await.unwrap();

        let session = passed_session(&engine).await;
        let err = engine
            .verify(vector(5.0), EventKind::CheckIn, session)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Match(MatchError::NoMatchWithinThreshold { .. })
        ));
    }

    #[tokio::test]
    async fn empty_gallery_is_no_candidates() {
        let engine = test_engine().await;
        let session = passed_session(&engine).await;
        let err = engine
            .verify(vector(0.3), EventKind::CheckIn, session)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Match(MatchError::NoCandidates)));
    }

    #[tokio::test]
    async fn open_day_reports_provisional_hours() {
        let engine = test_engine().await;
        engine.enroll("emp-1".into(), vector(0.3)).await.unwrap();

        let session = passed_session(&engine).await;
        engine
            .verify(vector(0.3), EventKind::CheckIn, session)
            .await
            .unwrap();

        let today = Local::now().naive_local().date();
        let records = engine
            .work_hours("emp-1".into(), today, today)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].provisional);
        assert!(records[0].last_checkout.is_none());
    }

    #[tokio::test]
    async fn full_day_settles_after_check_out() {
        let engine = test_engine().await;
        engine.enroll("emp-1".into(), vector(0.3)).await.unwrap();

        let session = passed_session(&engine).await;
        engine
            .verify(vector(0.3), EventKind::CheckIn, session)
            .await
            .unwrap();
        let session = passed_session(&engine).await;
        engine
            .verify(vector(0.3), EventKind::CheckOut, session)
            .await
            .unwrap();

        let today = Local::now().naive_local().date();
        let records = engine
            .work_hours("emp-1".into(), today, today)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert!(!records[0].provisional);
        assert!(records[0].first_checkin.is_some());
        assert!(records[0].last_checkout.is_some());
    }

    #[tokio::test]
    async fn leave_day_reported_in_range_query() {
        let engine = test_engine().await;
        let yesterday = Local::now().naive_local().date().pred_opt().unwrap();
        engine.record_leave("emp-1".into(), yesterday).await.unwrap();

        let records = engine
            .work_hours("emp-1".into(), yesterday, yesterday)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].status,
            clockface_core::timeclock::DayStatus::Leave
        );
    }

    #[tokio::test]
    async fn reset_removes_profile() {
        let engine = test_engine().await;
        engine.enroll("emp-1".into(), vector(0.3)).await.unwrap();
        assert!(engine.reset("emp-1".into()).await.unwrap());
        assert!(!engine.reset("emp-1".into()).await.unwrap());
    }

    #[tokio::test]
    async fn status_reports_counts() {
        let engine = test_engine().await;
        engine.enroll("emp-1".into(), vector(0.3)).await.unwrap();
        let _ = engine.liveness_start().await.unwrap();

        let status = engine.status().await.unwrap();
        assert_eq!(status.enrolled_identities, 1);
        assert_eq!(status.open_liveness_sessions, 1);
        assert!(status.schedule_default);
    }

    #[test]
    fn month_boundaries() {
        assert_eq!(
            last_day_of_month(2024, 2),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert_eq!(
            last_day_of_month(2024, 12),
            NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()
        );
    }
}
