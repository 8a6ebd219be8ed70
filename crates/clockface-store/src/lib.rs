//! clockface-store — SQLite persistence for the attendance core.
//!
//! Three kinds of state live here, with different write disciplines:
//! an encrypted descriptor gallery (one row per identity, replaced on
//! re-enrollment), the append-only attendance event log, and the derived
//! `daily_work_hours` table that is only ever rebuilt from that log.

pub mod crypto;

pub use crypto::{CryptoError, DescriptorCipher};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clockface_core::timeclock::{
    Anomaly, AttendanceEvent, DailyWorkHours, DayStatus, EventKind, EventStatus,
};
use clockface_core::types::{Descriptor, EnrolledDescriptor};
use rusqlite::params;
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

const TIMESTAMP_FMT: &str = "%Y-%m-%dT%H:%M:%S%.f";
const DATE_FMT: &str = "%Y-%m-%d";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database: {0}")]
    Database(#[from] tokio_rusqlite::Error),
    #[error("descriptor crypto: {0}")]
    Crypto(#[from] CryptoError),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("refusing to persist a provisional work-hours record")]
    Provisional,
}

/// Async handle to the attendance database. Cheap to clone; all clones
/// share one serialized connection.
#[derive(Clone)]
pub struct AttendanceStore {
    conn: tokio_rusqlite::Connection,
    cipher: std::sync::Arc<DescriptorCipher>,
}

impl AttendanceStore {
    /// Open (creating if needed) the database at `path` and ensure the
    /// schema exists.
    pub async fn open(path: &Path, cipher: DescriptorCipher) -> Result<Self, StoreError> {
        let conn = tokio_rusqlite::Connection::open(path.to_path_buf()).await?;
        let store = Self {
            conn,
            cipher: std::sync::Arc::new(cipher),
        };
        store.init_schema().await?;
        tracing::info!(
            path = %path.display(),
            key_fingerprint = store.cipher.fingerprint(),
            "attendance store opened"
        );
        Ok(store)
    }

    /// In-memory database, used by tests and diagnostics.
    pub async fn open_in_memory(cipher: DescriptorCipher) -> Result<Self, StoreError> {
        let conn = tokio_rusqlite::Connection::open_in_memory().await?;
        let store = Self {
            conn,
            cipher: std::sync::Arc::new(cipher),
        };
        store.init_schema().await?;
        Ok(store)
    }

    /// Short fingerprint of the active encryption key, safe to log and to
    /// surface on the status endpoint.
    pub fn key_fingerprint(&self) -> &str {
        self.cipher.fingerprint()
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "CREATE TABLE IF NOT EXISTS descriptors (
                         identity_id TEXT PRIMARY KEY,
                         vector      BLOB NOT NULL,
                         enrolled_at TEXT NOT NULL
                     );
                     CREATE TABLE IF NOT EXISTS attendance_events (
                         id               TEXT PRIMARY KEY,
                         employee_id      TEXT NOT NULL,
                         work_date        TEXT NOT NULL,
                         kind             TEXT NOT NULL,
                         ts               TEXT NOT NULL,
                         match_confidence REAL NOT NULL,
                         status           TEXT NOT NULL,
                         late_minutes     INTEGER NOT NULL,
                         early_minutes    INTEGER NOT NULL,
                         anomaly          TEXT
                     );
                     CREATE INDEX IF NOT EXISTS idx_events_employee_day
                         ON attendance_events (employee_id, work_date);
                     CREATE TABLE IF NOT EXISTS leave_records (
                         employee_id TEXT NOT NULL,
                         leave_date  TEXT NOT NULL,
                         PRIMARY KEY (employee_id, leave_date)
                     );
                     CREATE TABLE IF NOT EXISTS daily_work_hours (
                         employee_id    TEXT NOT NULL,
                         work_date      TEXT NOT NULL,
                         first_checkin  TEXT,
                         last_checkout  TEXT,
                         regular_hours  REAL NOT NULL,
                         overtime_hours REAL NOT NULL,
                         late_minutes   INTEGER NOT NULL,
                         early_minutes  INTEGER NOT NULL,
                         status         TEXT NOT NULL,
                         PRIMARY KEY (employee_id, work_date)
                     );",
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // --- Descriptor gallery ---

    /// Enroll or re-enroll an identity. Replacement, never accumulation:
    /// one active descriptor per identity.
    pub async fn enroll_descriptor(
        &self,
        enrolled: &EnrolledDescriptor,
    ) -> Result<(), StoreError> {
        let blob = self.cipher.encrypt_vector(enrolled.descriptor.as_slice())?;
        let identity = enrolled.identity_id.clone();
        let enrolled_at = enrolled.enrolled_at.to_rfc3339();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO descriptors (identity_id, vector, enrolled_at)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(identity_id)
                     DO UPDATE SET vector = ?2, enrolled_at = ?3",
                    params![identity, blob, enrolled_at],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Delete an identity's descriptor. Returns whether one existed.
    pub async fn remove_descriptor(&self, identity_id: &str) -> Result<bool, StoreError> {
        let identity = identity_id.to_string();
        let removed = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "DELETE FROM descriptors WHERE identity_id = ?1",
                    params![identity],
                )?;
                Ok(n > 0)
            })
            .await?;
        Ok(removed)
    }

    /// Load and decrypt the full gallery snapshot for matching.
    pub async fn load_gallery(&self) -> Result<Vec<EnrolledDescriptor>, StoreError> {
        let rows: Vec<(String, Vec<u8>, String)> = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT identity_id, vector, enrolled_at FROM descriptors
                     ORDER BY identity_id",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(identity_id, blob, enrolled_at)| {
                let values = self.cipher.decrypt_vector(&blob)?;
                let descriptor = Descriptor::from_vec(values).map_err(|e| {
                    StoreError::Corrupt(format!("descriptor for {identity_id}: {e}"))
                })?;
                let enrolled_at = parse_utc(&enrolled_at)?;
                Ok(EnrolledDescriptor {
                    identity_id,
                    descriptor,
                    enrolled_at,
                })
            })
            .collect()
    }

    pub async fn descriptor_count(&self) -> Result<u64, StoreError> {
        let count = self
            .conn
            .call(|conn| {
                let n: i64 =
                    conn.query_row("SELECT COUNT(*) FROM descriptors", [], |row| row.get(0))?;
                Ok(n)
            })
            .await?;
        Ok(count as u64)
    }

    // --- Attendance event log (append-only) ---

    pub async fn append_event(&self, event: &AttendanceEvent) -> Result<(), StoreError> {
        let row = (
            event.id.to_string(),
            event.employee_id.clone(),
            event.work_date().format(DATE_FMT).to_string(),
            kind_str(event.kind).to_string(),
            event.timestamp.format(TIMESTAMP_FMT).to_string(),
            f64::from(event.match_confidence),
            status_str(event.status).to_string(),
            event.late_minutes,
            event.early_minutes,
            event.anomaly.map(|a| anomaly_str(a).to_string()),
        );
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO attendance_events
                     (id, employee_id, work_date, kind, ts, match_confidence,
                      status, late_minutes, early_minutes, anomaly)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        row.0, row.1, row.2, row.3, row.4, row.5, row.6, row.7, row.8, row.9
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Complete event log for one employee-day, in timestamp order.
    pub async fn events_for_day(
        &self,
        employee_id: &str,
        work_date: NaiveDate,
    ) -> Result<Vec<AttendanceEvent>, StoreError> {
        let employee = employee_id.to_string();
        let date = work_date.format(DATE_FMT).to_string();
        type Row = (String, String, String, String, f64, String, i64, i64, Option<String>);
        let rows: Vec<Row> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, employee_id, kind, ts, match_confidence,
                            status, late_minutes, early_minutes, anomaly
                     FROM attendance_events
                     WHERE employee_id = ?1 AND work_date = ?2
                     ORDER BY ts",
                )?;
                let rows = stmt
                    .query_map(params![employee, date], |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                            row.get(6)?,
                            row.get(7)?,
                            row.get(8)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(id, employee_id, kind, ts, confidence, status, late, early, anomaly)| {
                Ok(AttendanceEvent {
                    id: parse_uuid(&id)?,
                    employee_id,
                    kind: kind_from_str(&kind)?,
                    timestamp: parse_timestamp(&ts)?,
                    match_confidence: confidence as f32,
                    status: status_from_str(&status)?,
                    late_minutes: late,
                    early_minutes: early,
                    anomaly: anomaly.as_deref().map(anomaly_from_str).transpose()?,
                })
            })
            .collect()
    }

    // --- Leave records ---

    pub async fn record_leave(
        &self,
        employee_id: &str,
        leave_date: NaiveDate,
    ) -> Result<(), StoreError> {
        let employee = employee_id.to_string();
        let date = leave_date.format(DATE_FMT).to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO leave_records (employee_id, leave_date)
                     VALUES (?1, ?2)",
                    params![employee, date],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn is_on_leave(
        &self,
        employee_id: &str,
        date: NaiveDate,
    ) -> Result<bool, StoreError> {
        let employee = employee_id.to_string();
        let date = date.format(DATE_FMT).to_string();
        let on_leave = self
            .conn
            .call(move |conn| {
                let n: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM leave_records
                     WHERE employee_id = ?1 AND leave_date = ?2",
                    params![employee, date],
                    |row| row.get(0),
                )?;
                Ok(n > 0)
            })
            .await?;
        Ok(on_leave)
    }

    // --- Derived daily work-hours table ---

    /// Idempotent upsert of a settled daily record. Hour values are rounded
    /// to 2 decimals here, at the persistence edge. Provisional records are
    /// refused — they exist only as query-time answers.
    pub async fn upsert_daily(&self, record: &DailyWorkHours) -> Result<(), StoreError> {
        if record.provisional {
            return Err(StoreError::Provisional);
        }
        let rounded = record.rounded();
        let row = (
            rounded.employee_id.clone(),
            rounded.work_date.format(DATE_FMT).to_string(),
            rounded
                .first_checkin
                .map(|t| t.format(TIMESTAMP_FMT).to_string()),
            rounded
                .last_checkout
                .map(|t| t.format(TIMESTAMP_FMT).to_string()),
            rounded.regular_hours,
            rounded.overtime_hours,
            rounded.late_minutes,
            rounded.early_minutes,
            day_status_str(rounded.status).to_string(),
        );
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO daily_work_hours
                     (employee_id, work_date, first_checkin, last_checkout,
                      regular_hours, overtime_hours, late_minutes, early_minutes, status)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                     ON CONFLICT(employee_id, work_date)
                     DO UPDATE SET first_checkin = ?3, last_checkout = ?4,
                                   regular_hours = ?5, overtime_hours = ?6,
                                   late_minutes = ?7, early_minutes = ?8, status = ?9",
                    params![
                        row.0, row.1, row.2, row.3, row.4, row.5, row.6, row.7, row.8
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn daily_for(
        &self,
        employee_id: &str,
        work_date: NaiveDate,
    ) -> Result<Option<DailyWorkHours>, StoreError> {
        let mut records = self
            .daily_range(employee_id, work_date, work_date)
            .await?;
        Ok(records.pop())
    }

    /// Daily records in `[start, end]`, ordered by date.
    pub async fn daily_range(
        &self,
        employee_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyWorkHours>, StoreError> {
        let employee = employee_id.to_string();
        let start = start.format(DATE_FMT).to_string();
        let end = end.format(DATE_FMT).to_string();
        type Row = (
            String,
            String,
            Option<String>,
            Option<String>,
            f64,
            f64,
            i64,
            i64,
            String,
        );
        let rows: Vec<Row> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT employee_id, work_date, first_checkin, last_checkout,
                            regular_hours, overtime_hours, late_minutes, early_minutes, status
                     FROM daily_work_hours
                     WHERE employee_id = ?1 AND work_date BETWEEN ?2 AND ?3
                     ORDER BY work_date",
                )?;
                let rows = stmt
                    .query_map(params![employee, start, end], |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                            row.get(6)?,
                            row.get(7)?,
                            row.get(8)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(
                |(employee_id, date, checkin, checkout, regular, overtime, late, early, status)| {
                    Ok(DailyWorkHours {
                        employee_id,
                        work_date: parse_date(&date)?,
                        first_checkin: checkin.as_deref().map(parse_timestamp).transpose()?,
                        last_checkout: checkout.as_deref().map(parse_timestamp).transpose()?,
                        regular_hours: regular,
                        overtime_hours: overtime,
                        late_minutes: late,
                        early_minutes: early,
                        status: day_status_from_str(&status)?,
                        provisional: false,
                    })
                },
            )
            .collect()
    }
}

// --- TEXT mappings for persisted enums ---

fn kind_str(kind: EventKind) -> &'static str {
    match kind {
        EventKind::CheckIn => "check_in",
        EventKind::CheckOut => "check_out",
    }
}

fn kind_from_str(s: &str) -> Result<EventKind, StoreError> {
    match s {
        "check_in" => Ok(EventKind::CheckIn),
        "check_out" => Ok(EventKind::CheckOut),
        other => Err(StoreError::Corrupt(format!("unknown event kind {other:?}"))),
    }
}

fn status_str(status: EventStatus) -> &'static str {
    match status {
        EventStatus::Normal => "normal",
        EventStatus::Late => "late",
        EventStatus::EarlyLeave => "early_leave",
    }
}

fn status_from_str(s: &str) -> Result<EventStatus, StoreError> {
    match s {
        "normal" => Ok(EventStatus::Normal),
        "late" => Ok(EventStatus::Late),
        "early_leave" => Ok(EventStatus::EarlyLeave),
        other => Err(StoreError::Corrupt(format!(
            "unknown event status {other:?}"
        ))),
    }
}

fn anomaly_str(anomaly: Anomaly) -> &'static str {
    match anomaly {
        Anomaly::DuplicateOpen => "duplicate_open",
        Anomaly::OrphanCheckout => "orphan_checkout",
    }
}

fn anomaly_from_str(s: &str) -> Result<Anomaly, StoreError> {
    match s {
        "duplicate_open" => Ok(Anomaly::DuplicateOpen),
        "orphan_checkout" => Ok(Anomaly::OrphanCheckout),
        other => Err(StoreError::Corrupt(format!("unknown anomaly {other:?}"))),
    }
}

fn day_status_str(status: DayStatus) -> &'static str {
    match status {
        DayStatus::Normal => "normal",
        DayStatus::Late => "late",
        DayStatus::Absent => "absent",
        DayStatus::Leave => "leave",
    }
}

fn day_status_from_str(s: &str) -> Result<DayStatus, StoreError> {
    match s {
        "normal" => Ok(DayStatus::Normal),
        "late" => Ok(DayStatus::Late),
        "absent" => Ok(DayStatus::Absent),
        "leave" => Ok(DayStatus::Leave),
        other => Err(StoreError::Corrupt(format!("unknown day status {other:?}"))),
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(s).map_err(|e| StoreError::Corrupt(format!("uuid {s:?}: {e}")))
}

fn parse_timestamp(s: &str) -> Result<NaiveDateTime, StoreError> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FMT)
        .map_err(|e| StoreError::Corrupt(format!("timestamp {s:?}: {e}")))
}

fn parse_date(s: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(s, DATE_FMT)
        .map_err(|e| StoreError::Corrupt(format!("date {s:?}: {e}")))
}

fn parse_utc(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("datetime {s:?}: {e}")))
}
