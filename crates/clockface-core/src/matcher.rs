//! Descriptor matching against the enrolled gallery.
//!
//! Nearest-neighbour under Euclidean distance with an acceptance threshold
//! and a separation-margin rule: a probe that lands between two enrolled
//! identities is rejected as ambiguous instead of letting the nearest one
//! silently win.

use crate::types::{Descriptor, EnrolledDescriptor, MatchResult};
use thiserror::Error;

// --- Named thresholds (coordinate-space-dependent, injectable) ---
const DEFAULT_DISTANCE_THRESHOLD: f32 = 0.5;
const DEFAULT_SEPARATION_MARGIN: f32 = 0.1;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("no descriptors enrolled")]
    NoCandidates,
    #[error("no match within threshold (best distance {best_distance:.3})")]
    NoMatchWithinThreshold { best_distance: f32 },
    #[error(
        "ambiguous match: two candidates within margin (distances {best:.3} and {runner_up:.3}, gap {gap:.3})"
    )]
    AmbiguousMatch { best: f32, runner_up: f32, gap: f32 },
}

/// Matching thresholds. Distances are in the descriptor space of the
/// external extraction model, so both values must be tuned together with it.
#[derive(Debug, Clone, Copy)]
pub struct MatcherConfig {
    /// Maximum accepted distance between probe and best candidate.
    pub distance_threshold: f32,
    /// Minimum gap to the runner-up before a sub-threshold match is
    /// accepted. `0.0` disables the gap rule (single-threshold policy).
    pub separation_margin: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
            separation_margin: DEFAULT_SEPARATION_MARGIN,
        }
    }
}

/// Pure matcher over a gallery snapshot. No side effects, safe to call
/// concurrently from any number of recognition attempts.
#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptorMatcher {
    config: MatcherConfig,
}

impl DescriptorMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    /// Find the best enrolled match for `probe`.
    ///
    /// Always scans the whole gallery, tracking the best and runner-up
    /// distances, then applies the acceptance rule:
    /// best distance under threshold, and either no runner-up under
    /// threshold or a gap of at least `separation_margin` to it.
    pub fn match_probe(
        &self,
        probe: &Descriptor,
        gallery: &[EnrolledDescriptor],
    ) -> Result<MatchResult, MatchError> {
        if gallery.is_empty() {
            return Err(MatchError::NoCandidates);
        }

        let mut best_idx = 0usize;
        let mut best = f32::INFINITY;
        let mut runner_up = f32::INFINITY;

        for (i, candidate) in gallery.iter().enumerate() {
            let d = probe.euclidean_distance(&candidate.descriptor);
            if d < best {
                runner_up = best;
                best = d;
                best_idx = i;
            } else if d < runner_up {
                runner_up = d;
            }
        }

        let threshold = self.config.distance_threshold;
        if best >= threshold {
            return Err(MatchError::NoMatchWithinThreshold {
                best_distance: best,
            });
        }

        let margin = self.config.separation_margin;
        if margin > 0.0 && runner_up < threshold {
            let gap = runner_up - best;
            if gap < margin {
                tracing::warn!(
                    best,
                    runner_up,
                    gap,
                    margin,
                    "rejecting ambiguous match between two enrolled identities"
                );
                return Err(MatchError::AmbiguousMatch {
                    best,
                    runner_up,
                    gap,
                });
            }
        }

        let confidence = (1.0 - best / threshold).clamp(0.0, 1.0);
        Ok(MatchResult {
            identity_id: gallery[best_idx].identity_id.clone(),
            distance: best,
            confidence,
        })
    }
}
