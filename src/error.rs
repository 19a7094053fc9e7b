use derive_more::Display;

pub type Result<T> = core::result::Result<T, SkeletonError>;

/// Failures of the distance, power map and skeleton stages.
///
/// Every stage is a deterministic function of its inputs, so a failed call fails
/// the same way when repeated.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum SkeletonError {
    /// The occupancy has no site of the class the query measures against.
    #[display("no qualifying sites in the domain")]
    EmptySiteSet,
    /// A parameter or domain is malformed (`scale < 1`, `lower > upper`, ...).
    #[display("invalid parameter: {_0}")]
    InvalidParameter(String),
    /// Squared distances or weights would leave the exactly representable range.
    #[display("numeric overflow: {_0}")]
    NumericOverflow(String),
}

impl SkeletonError {
    pub fn invalid_parameter(details: impl Into<String>) -> Self {
        Self::InvalidParameter(details.into())
    }

    pub fn numeric_overflow(details: impl Into<String>) -> Self {
        Self::NumericOverflow(details.into())
    }
}

impl std::error::Error for SkeletonError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_problem() {
        assert!(SkeletonError::EmptySiteSet.to_string().contains("no qualifying sites"));
        let err = SkeletonError::invalid_parameter("scale 0.5 is below 1");
        assert!(err.to_string().contains("scale 0.5"));
        let err = SkeletonError::numeric_overflow("diagonal");
        assert!(err.to_string().starts_with("numeric overflow"));
    }
}
