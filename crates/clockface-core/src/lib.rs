//! clockface-core — Attendance authentication and time-accounting engine.
//!
//! Matches face descriptors against an enrolled gallery, verifies liveness
//! through motion analysis, classifies check-in/check-out events against a
//! work schedule, and folds raw events into daily and monthly work-hours
//! records.

pub mod liveness;
pub mod matcher;
pub mod schedule;
pub mod timeclock;
pub mod types;

pub use liveness::{LivenessConfig, LivenessSession, Verdict};
pub use matcher::{DescriptorMatcher, MatcherConfig};
pub use schedule::{ScheduleBook, WorkSchedule};
pub use types::{Descriptor, EnrolledDescriptor, MatchResult, DESCRIPTOR_DIM};
