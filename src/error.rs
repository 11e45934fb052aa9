use thiserror::Error;

/// Errors reported by skeletonization and reconstruction
#[derive(Debug, Error)]
pub enum SkelError {
    /// Malformed mesh input: out-of-range index or degenerate face
    #[error("Invalid topology: {0}")]
    InvalidTopology(String),

    /// Non finite coordinates or mismatching array shapes
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Contraction left fewer than two skeleton vertices
    #[error("Degenerate input: {0}")]
    DegenerateInput(String),

    /// Not enough oriented points to build an implicit field
    #[error("Insufficient samples: {found} given, at least {required} required")]
    InsufficientSamples { found: usize, required: usize },

    /// Zero length, non unit or non finite normal
    #[error("Invalid normal at sample {index}")]
    InvalidNormals { index: usize },

    /// Linear solves kept failing and local recovery gave up
    #[error("Numeric instability: {0}")]
    NumericInstability(String),
}

/// Result type of the crate
pub type Result<T> = std::result::Result<T, SkelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = SkelError::InsufficientSamples {
            found: 2,
            required: 4,
        };
        assert_eq!(
            format!("{err}"),
            "Insufficient samples: 2 given, at least 4 required"
        );

        let err = SkelError::InvalidNormals { index: 17 };
        assert!(format!("{err}").contains("17"));
    }
}
