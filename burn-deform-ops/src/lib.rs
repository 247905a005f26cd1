//! Modulated deformable convolution for the Burn deep learning framework
//!
//! This crate exposes the CPU kernel from `deform-conv` as a Burn tensor
//! operation and as a DCNv2 layer. Operands are read back to host memory,
//! so the operation works with any backend but is not differentiable.

use burn::prelude::*;

mod error;
mod module;
mod ops;
mod options;

#[cfg(test)]
mod tests;

// Convenient re-exports
pub use error::{DeformOpsError, DeformOpsResult};
pub use module::{ModulatedDeformConv2d, ModulatedDeformConv2dConfig};
pub use ops::modulated_deform_conv2d;
pub use options::ModulatedDeformConvOptions;

/// Deformable convolution on Burn tensors
pub trait TensorDeformOps<B: Backend> {
    /// Apply a modulated deformable convolution with `self` as the input
    fn modulated_deform_conv2d(
        self,
        offset: Tensor<B, 4>,
        mask: Option<Tensor<B, 4>>,
        weight: Tensor<B, 4>,
        bias: Option<Tensor<B, 1>>,
        options: &ModulatedDeformConvOptions,
    ) -> DeformOpsResult<Tensor<B, 4>>;
}

impl<B: Backend> TensorDeformOps<B> for Tensor<B, 4> {
    fn modulated_deform_conv2d(
        self,
        offset: Tensor<B, 4>,
        mask: Option<Tensor<B, 4>>,
        weight: Tensor<B, 4>,
        bias: Option<Tensor<B, 1>>,
        options: &ModulatedDeformConvOptions,
    ) -> DeformOpsResult<Tensor<B, 4>> {
        ops::modulated_deform_conv2d(self, offset, mask, weight, bias, options)
    }
}
