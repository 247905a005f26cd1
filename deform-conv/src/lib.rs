//! Modulated deformable convolution (DCNv2) on the CPU.
//!
//! Every kernel tap samples the input at its regular grid position shifted by
//! a learned offset, bilinearly interpolated and weighted by a learned
//! modulation mask. The computation is split into a deformable im2col pass
//! and a grouped GEMM, both operating on plain `f32` buffers described by
//! shape-carrying views.
//!
//! # Example
//!
//! ```
//! use deform_conv::{modulated_deform_conv2d, ConvAttributes, HostInputs, HostTensor};
//!
//! let input: Vec<f32> = (1..=16).map(|v| v as f32).collect();
//! let offset = vec![0.0; 18 * 4];
//! let filter = vec![1.0; 9];
//!
//! let inputs = HostInputs {
//!     input: Some(HostTensor::new(&input, &[1, 1, 4, 4])),
//!     offset: Some(HostTensor::new(&offset, &[1, 18, 2, 2])),
//!     filter: Some(HostTensor::new(&filter, &[1, 1, 3, 3])),
//!     ..Default::default()
//! }
//! .into_inputs()?;
//! let params = ConvAttributes::default().validate()?;
//!
//! let mut output = vec![0.0; 4];
//! modulated_deform_conv2d(&inputs, &params, &mut output, [1, 1, 2, 2])?;
//! assert_eq!(output, [54.0, 63.0, 90.0, 99.0]);
//! # Ok::<(), deform_conv::DeformConvError>(())
//! ```

mod attributes;
mod conv;
mod error;
pub mod gemm;
pub mod im2col;
pub mod shape;


pub use attributes::{ConvAttributes, ConvParams};
pub use conv::{
    column_buffer_len, modulated_deform_conv2d, modulated_deform_conv2d_with_workspace,
    output_shape, DeformConvInputs, HostInputs, HostTensor, Workspace,
};
pub use error::{DeformConvError, DeformConvResult};
pub use gemm::{Accumulate, Gemm, Transpose};
pub use shape::{conv_output_size, TensorView, TensorViewMut};
