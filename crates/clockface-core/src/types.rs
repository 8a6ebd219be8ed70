use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Dimensionality of a face descriptor vector.
///
/// The extraction step is external to this crate; the core only ever sees
/// the finished 128-component vector.
pub const DESCRIPTOR_DIM: usize = 128;

#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("descriptor has {actual} components, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("descriptor contains a non-finite component at index {0}")]
    NonFinite(usize),
}

/// A fixed-length face descriptor vector.
///
/// Construction goes through [`Descriptor::from_vec`], so any value of this
/// type is guaranteed to hold exactly [`DESCRIPTOR_DIM`] finite floats.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct Descriptor {
    values: Vec<f32>,
}

impl Descriptor {
    /// Validate and wrap a raw component vector.
    pub fn from_vec(values: Vec<f32>) -> Result<Self, DescriptorError> {
        if values.len() != DESCRIPTOR_DIM {
            return Err(DescriptorError::DimensionMismatch {
                expected: DESCRIPTOR_DIM,
                actual: values.len(),
            });
        }
        if let Some(idx) = values.iter().position(|v| !v.is_finite()) {
            return Err(DescriptorError::NonFinite(idx));
        }
        Ok(Self { values })
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    /// Euclidean distance to another descriptor.
    pub fn euclidean_distance(&self, other: &Descriptor) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

impl TryFrom<Vec<f32>> for Descriptor {
    type Error = DescriptorError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        Self::from_vec(values)
    }
}

impl From<Descriptor> for Vec<f32> {
    fn from(d: Descriptor) -> Self {
        d.values
    }
}

/// An enrolled descriptor with identity metadata.
///
/// At most one active descriptor exists per identity; re-enrollment replaces
/// the stored vector rather than appending a second one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrolledDescriptor {
    pub identity_id: String,
    pub descriptor: Descriptor,
    pub enrolled_at: DateTime<Utc>,
}

/// Accepted result of matching a probe against the enrolled gallery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub identity_id: String,
    /// Euclidean distance of the best match.
    pub distance: f32,
    /// `1 - distance/threshold`, clamped to [0, 1].
    pub confidence: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor_with(first: f32) -> Descriptor {
        let mut values = vec![0.0f32; DESCRIPTOR_DIM];
        values[0] = first;
        Descriptor::from_vec(values).unwrap()
    }

    #[test]
    fn from_vec_rejects_wrong_dimension() {
        let err = Descriptor::from_vec(vec![0.0; 64]).unwrap_err();
        match err {
            DescriptorError::DimensionMismatch { expected, actual } => {
                assert_eq!(expected, DESCRIPTOR_DIM);
                assert_eq!(actual, 64);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn from_vec_rejects_non_finite() {
        let mut values = vec![0.0f32; DESCRIPTOR_DIM];
        values[7] = f32::NAN;
        let err = Descriptor::from_vec(values).unwrap_err();
        assert!(matches!(err, DescriptorError::NonFinite(7)));
    }

    #[test]
    fn distance_to_self_is_zero() {
        let d = descriptor_with(1.0);
        assert!(d.euclidean_distance(&d).abs() < 1e-6);
    }

    #[test]
    fn distance_known_geometry() {
        // Differ by 3.0 in one component and 4.0 in another: distance 5.0.
        let mut a = vec![0.0f32; DESCRIPTOR_DIM];
        let mut b = vec![0.0f32; DESCRIPTOR_DIM];
        a[0] = 3.0;
        b[1] = 4.0;
        let a = Descriptor::from_vec(a).unwrap();
        let b = Descriptor::from_vec(b).unwrap();
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn serde_roundtrip_enforces_dimension() {
        let short = serde_json::to_string(&vec![0.25f32; 12]).unwrap();
        assert!(serde_json::from_str::<Descriptor>(&short).is_err());

        let full = serde_json::to_string(&vec![0.25f32; DESCRIPTOR_DIM]).unwrap();
        let d: Descriptor = serde_json::from_str(&full).unwrap();
        assert_eq!(d.as_slice().len(), DESCRIPTOR_DIM);
    }
}
