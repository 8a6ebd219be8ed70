//! Liveness verification via motion analysis.
//!
//! A static photograph held in front of the camera produces a near-constant
//! face centroid across samples, while a live person asked to move produces
//! measurable displacement. Each verification attempt owns one
//! [`LivenessSession`]: a state machine fed `(timestamp, centroid)` samples
//! by the caller until it reaches a terminal verdict.
//!
//! The session never reads the clock itself; every input carries its own
//! timestamp. That keeps the machine deterministic and lets the caller drive
//! it from a camera timer, a replayed trace, or a test with equal ease.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;
use uuid::Uuid;

// --- Sampling geometry ---
/// Newest samples retained in the ring buffer.
const SAMPLE_CAPACITY: usize = 10;
/// Minimum buffered samples before the movement score is evaluated.
const MIN_SAMPLES: usize = 5;
/// Minimum sampling ticks (samples plus missed ticks) before evaluation.
/// Together with `MIN_SAMPLES` this imposes a dwell time so a single jitter
/// cannot pass the check.
const MIN_TICKS: u32 = 10;

// --- Defaults (injectable via `LivenessConfig`) ---
/// Centroid displacement, in frame coordinate units, that counts as
/// voluntary motion. Relative to the coordinate space of the landmark
/// stream, not a universal pixel count.
const DEFAULT_MOVEMENT_THRESHOLD: f32 = 20.0;
/// Hard session deadline.
const DEFAULT_TIMEOUT_SECS: i64 = 20;
/// Consecutive no-face ticks tolerated before the session fails.
const DEFAULT_MAX_MISSED_TICKS: u32 = 30;

#[derive(Error, Debug)]
pub enum LivenessError {
    #[error("liveness session has verdict {0:?}, not passed")]
    NotPassed(Verdict),
    #[error("liveness session already consumed by a previous attempt")]
    AlreadyConsumed,
}

/// Session verdict. Transitions are monotonic: `Pending` moves to exactly
/// one terminal state and stays there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pending,
    Passed,
    Failed,
    TimedOut,
}

impl Verdict {
    pub fn is_terminal(self) -> bool {
        self != Verdict::Pending
    }
}

/// Liveness tuning. Threshold units follow the centroid coordinate space.
#[derive(Debug, Clone, Copy)]
pub struct LivenessConfig {
    pub movement_threshold: f32,
    pub timeout: Duration,
    pub max_missed_ticks: u32,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            movement_threshold: DEFAULT_MOVEMENT_THRESHOLD,
            timeout: Duration::seconds(DEFAULT_TIMEOUT_SECS),
            max_missed_ticks: DEFAULT_MAX_MISSED_TICKS,
        }
    }
}

/// One liveness verification attempt.
///
/// Owned by the caller; dropping it releases everything. Single-use: after
/// [`consume`](Self::consume) succeeds the session cannot authorize another
/// attendance event.
#[derive(Debug)]
pub struct LivenessSession {
    id: Uuid,
    started_at: DateTime<Utc>,
    deadline: DateTime<Utc>,
    config: LivenessConfig,
    samples: VecDeque<(DateTime<Utc>, (f32, f32))>,
    ticks: u32,
    consecutive_missed: u32,
    peak_score: f32,
    verdict: Verdict,
    consumed: bool,
}

impl LivenessSession {
    /// Start a new session; `now` anchors the deadline.
    pub fn start(now: DateTime<Utc>, config: LivenessConfig) -> Self {
        let id = Uuid::new_v4();
        tracing::debug!(session = %id, "liveness session started");
        Self {
            id,
            started_at: now,
            deadline: now + config.timeout,
            config,
            samples: VecDeque::with_capacity(SAMPLE_CAPACITY),
            ticks: 0,
            consecutive_missed: 0,
            peak_score: 0.0,
            verdict: Verdict::Pending,
            consumed: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    /// Advisory progress percentage in [0, 100]. Tracks the peak movement
    /// score so it never decreases; not part of the pass/fail contract.
    pub fn progress(&self) -> u8 {
        let ratio = (self.peak_score / self.config.movement_threshold).min(1.0);
        (ratio * 100.0).round() as u8
    }

    /// Feed one face-centroid sample. Returns the verdict after the sample
    /// is absorbed. Inputs after a terminal verdict are ignored.
    pub fn push_sample(&mut self, at: DateTime<Utc>, centroid: (f32, f32)) -> Verdict {
        if self.verdict.is_terminal() {
            return self.verdict;
        }
        if self.check_deadline(at).is_terminal() {
            return self.verdict;
        }

        self.ticks += 1;
        self.consecutive_missed = 0;
        if self.samples.len() == SAMPLE_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back((at, centroid));

        if let Some(score) = self.movement_score() {
            self.peak_score = self.peak_score.max(score);
            if self.samples.len() >= MIN_SAMPLES
                && self.ticks >= MIN_TICKS
                && score >= self.config.movement_threshold
            {
                tracing::debug!(session = %self.id, score, "liveness passed");
                self.verdict = Verdict::Passed;
            }
        }

        self.verdict
    }

    /// Register a sampling tick on which no face was detected. Too many in a
    /// row fails the session.
    pub fn tick_without_face(&mut self, at: DateTime<Utc>) -> Verdict {
        if self.verdict.is_terminal() {
            return self.verdict;
        }
        if self.check_deadline(at).is_terminal() {
            return self.verdict;
        }

        self.ticks += 1;
        self.consecutive_missed += 1;
        if self.consecutive_missed >= self.config.max_missed_ticks {
            tracing::debug!(
                session = %self.id,
                missed = self.consecutive_missed,
                "liveness failed: face lost"
            );
            self.verdict = Verdict::Failed;
        }
        self.verdict
    }

    /// Re-check the deadline without providing a sample (e.g. a periodic
    /// sweep over open sessions).
    pub fn poll(&mut self, now: DateTime<Utc>) -> Verdict {
        if self.verdict.is_terminal() {
            return self.verdict;
        }
        self.check_deadline(now)
    }

    /// Explicit cancellation (camera lost, user aborted).
    pub fn cancel(&mut self) -> Verdict {
        if !self.verdict.is_terminal() {
            tracing::debug!(session = %self.id, "liveness cancelled");
            self.verdict = Verdict::Failed;
        }
        self.verdict
    }

    /// Consume a passed session to authorize exactly one attendance event.
    pub fn consume(&mut self) -> Result<(), LivenessError> {
        if self.consumed {
            return Err(LivenessError::AlreadyConsumed);
        }
        if self.verdict != Verdict::Passed {
            return Err(LivenessError::NotPassed(self.verdict));
        }
        self.consumed = true;
        Ok(())
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    /// Displacement between the oldest and newest buffered centroids.
    fn movement_score(&self) -> Option<f32> {
        let (_, first) = self.samples.front()?;
        let (_, last) = self.samples.back()?;
        let dx = last.0 - first.0;
        let dy = last.1 - first.1;
        Some((dx * dx + dy * dy).sqrt())
    }

    fn check_deadline(&mut self, now: DateTime<Utc>) -> Verdict {
        if now >= self.deadline {
            tracing::debug!(session = %self.id, "liveness timed out");
            self.verdict = Verdict::TimedOut;
        }
        self.verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap()
    }

    /// Advance in nominal 100 ms sampling ticks.
    fn tick(n: u32) -> DateTime<Utc> {
        t0() + Duration::milliseconds(100 * i64::from(n))
    }

    #[test]
    fn moving_subject_passes_after_dwell() {
        let mut session = LivenessSession::start(t0(), LivenessConfig::default());

        // 2.5 units of rightward motion per tick: by tick 10 the buffered
        // first-to-last displacement comfortably exceeds 20 units.
        let mut verdict = Verdict::Pending;
        for n in 0..12u32 {
            verdict = session.push_sample(tick(n), (100.0 + 2.5 * n as f32, 50.0));
            if verdict.is_terminal() {
                break;
            }
        }
        assert_eq!(verdict, Verdict::Passed);
        assert!(session.progress() >= 100);
    }

    #[test]
    fn static_subject_times_out() {
        let mut session = LivenessSession::start(t0(), LivenessConfig::default());

        // A photograph: identical centroid on every tick for the full 20 s.
        for n in 0..250u32 {
            let verdict = session.push_sample(tick(n), (100.0, 50.0));
            if verdict.is_terminal() {
                assert_eq!(verdict, Verdict::TimedOut);
                // 20 s deadline at 100 ms cadence = tick 200.
                assert_eq!(n, 200);
                return;
            }
        }
        panic!("session never reached a terminal verdict");
    }

    #[test]
    fn single_jitter_before_dwell_does_not_pass() {
        let mut session = LivenessSession::start(t0(), LivenessConfig::default());

        // A large jump on the second sample: movement score is over the
        // threshold immediately, but the dwell gates must hold it back.
        session.push_sample(tick(0), (0.0, 0.0));
        let verdict = session.push_sample(tick(1), (100.0, 0.0));
        assert_eq!(verdict, Verdict::Pending);
    }

    #[test]
    fn dwell_requires_min_ticks_not_just_min_samples() {
        let mut session = LivenessSession::start(t0(), LivenessConfig::default());

        // Displacement is over the threshold from the fifth sample on, but
        // the tick gate defers the verdict until the tenth tick.
        for n in 0..9u32 {
            let verdict = session.push_sample(tick(n), (30.0 * n as f32, 0.0));
            assert_eq!(verdict, Verdict::Pending, "passed early at tick {n}");
        }
        let verdict = session.push_sample(tick(9), (270.0, 0.0));
        assert_eq!(verdict, Verdict::Passed);
    }

    #[test]
    fn ring_buffer_keeps_newest_ten() {
        let mut session = LivenessSession::start(t0(), LivenessConfig::default());

        // Move early, then freeze. Once the early motion is evicted from the
        // 10-sample window the score drops back under the threshold, so the
        // frozen tail can never pass on stale motion.
        for n in 0..5u32 {
            session.push_sample(tick(n), (4.0 * n as f32, 0.0));
        }
        for n in 5..9u32 {
            // Below MIN_TICKS; window still contains the moving samples.
            assert_eq!(session.push_sample(tick(n), (16.0, 0.0)), Verdict::Pending);
        }
        for n in 9..40u32 {
            let verdict = session.push_sample(tick(n), (16.0, 0.0));
            assert_eq!(verdict, Verdict::Pending, "stale motion passed at tick {n}");
        }
    }

    #[test]
    fn face_lost_too_long_fails() {
        let config = LivenessConfig {
            max_missed_ticks: 5,
            ..LivenessConfig::default()
        };
        let mut session = LivenessSession::start(t0(), config);

        session.push_sample(tick(0), (10.0, 10.0));
        let mut verdict = Verdict::Pending;
        for n in 1..=5u32 {
            verdict = session.tick_without_face(tick(n));
        }
        assert_eq!(verdict, Verdict::Failed);
    }

    #[test]
    fn missed_tick_counter_resets_on_face() {
        let config = LivenessConfig {
            max_missed_ticks: 3,
            ..LivenessConfig::default()
        };
        let mut session = LivenessSession::start(t0(), config);

        session.tick_without_face(tick(0));
        session.tick_without_face(tick(1));
        session.push_sample(tick(2), (10.0, 10.0));
        session.tick_without_face(tick(3));
        session.tick_without_face(tick(4));
        let verdict = session.tick_without_face(tick(5));
        assert_eq!(verdict, Verdict::Failed);
    }

    #[test]
    fn cancel_is_terminal_failure() {
        let mut session = LivenessSession::start(t0(), LivenessConfig::default());
        session.push_sample(tick(0), (10.0, 10.0));
        assert_eq!(session.cancel(), Verdict::Failed);

        // Terminal verdicts are sticky: further samples change nothing.
        let verdict = session.push_sample(tick(1), (500.0, 500.0));
        assert_eq!(verdict, Verdict::Failed);
    }

    #[test]
    fn poll_enforces_deadline() {
        let mut session = LivenessSession::start(t0(), LivenessConfig::default());
        assert_eq!(session.poll(t0() + Duration::seconds(19)), Verdict::Pending);
        assert_eq!(session.poll(t0() + Duration::seconds(20)), Verdict::TimedOut);
    }

    #[test]
    fn passed_session_consumes_exactly_once() {
        let mut session = LivenessSession::start(t0(), LivenessConfig::default());
        for n in 0..12u32 {
            session.push_sample(tick(n), (100.0 + 2.5 * n as f32, 50.0));
        }
        assert_eq!(session.verdict(), Verdict::Passed);

        session.consume().unwrap();
        assert!(session.is_consumed());
        assert!(matches!(
            session.consume(),
            Err(LivenessError::AlreadyConsumed)
        ));
    }

    #[test]
    fn pending_session_cannot_be_consumed() {
        let mut session = LivenessSession::start(t0(), LivenessConfig::default());
        assert!(matches!(
            session.consume(),
            Err(LivenessError::NotPassed(Verdict::Pending))
        ));
    }

    #[test]
    fn progress_is_monotonic_and_advisory() {
        let mut session = LivenessSession::start(t0(), LivenessConfig::default());

        // Move out then back: the instantaneous score falls, the reported
        // progress must not.
        session.push_sample(tick(0), (0.0, 0.0));
        session.push_sample(tick(1), (10.0, 0.0));
        let halfway = session.progress();
        assert_eq!(halfway, 50);

        session.push_sample(tick(2), (0.0, 0.0));
        assert!(session.progress() >= halfway);
        assert_eq!(session.verdict(), Verdict::Pending);
    }
}
