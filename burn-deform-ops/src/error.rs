use deform_conv::DeformConvError;
use thiserror::Error;

/// The error type for the Burn-facing deformable convolution operations.
#[derive(Error, Debug)]
pub enum DeformOpsError {
    /// The convolution rejected its attributes or tensor shapes.
    #[error(transparent)]
    Kernel(#[from] DeformConvError),

    /// Tensor data could not be read back as `f32` values.
    #[error("Failed to read {tensor} tensor data: {reason}")]
    TensorConversion {
        /// The tensor being read.
        tensor: &'static str,
        /// The underlying conversion failure.
        reason: String,
    },
}

/// A specialized `Result` type for the Burn-facing operations.
pub type DeformOpsResult<T> = Result<T, DeformOpsError>;
