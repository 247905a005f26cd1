use thiserror::Error;

/// The error type for deformable convolution invocations.
///
/// Every variant is detected at the entry point, before any output element is
/// written. Nothing inside the sampling or GEMM loops can fail.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeformConvError {
    /// A tensor's shape disagrees with its buffer, with the shape implied by the
    /// other tensors, or with the group partitioning.
    #[error("Shape mismatch for {tensor}: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// The tensor whose shape was rejected.
        tensor: &'static str,
        /// The expected shape or constraint.
        expected: String,
        /// The shape or value actually supplied.
        actual: String,
    },

    /// A tensor without a default (input, offset or filter) was not supplied.
    #[error("Missing required input: {name}")]
    MissingRequiredInput {
        /// The name of the missing tensor.
        name: &'static str,
    },

    /// A convolution attribute is out of range or has the wrong arity.
    #[error("Invalid attribute `{name}`: {reason}")]
    InvalidAttribute {
        /// The attribute name as the host spells it.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

impl DeformConvError {
    pub(crate) fn shape_mismatch(
        tensor: &'static str,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        Self::ShapeMismatch {
            tensor,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

/// A specialized `Result` type for deformable convolution.
pub type DeformConvResult<T> = Result<T, DeformConvError>;
