//! Operator attributes in Burn's configuration style.

use burn::prelude::*;
use deform_conv::{ConvAttributes, ConvParams};

use crate::error::DeformOpsResult;

/// Attributes of a modulated deformable convolution.
///
/// Field names and value types mirror the operator attributes an inference
/// runtime hands over: spatial attributes are `[h, w]` integer sequences.
#[derive(Config, Debug)]
pub struct ModulatedDeformConvOptions {
    /// Convolution stride, `[h, w]`.
    #[config(default = "vec![1, 1]")]
    pub stride: Vec<i64>,
    /// Implicit zero padding on both sides, `[h, w]`.
    #[config(default = "vec![0, 0]")]
    pub padding: Vec<i64>,
    /// Spacing between kernel taps, `[h, w]`.
    #[config(default = "vec![1, 1]")]
    pub dilation: Vec<i64>,
    /// Number of convolution groups.
    #[config(default = "1")]
    pub groups: i64,
    /// Number of offset groups sharing one offset and mask field.
    #[config(default = "1")]
    pub deform_groups: i64,
}

impl ModulatedDeformConvOptions {
    /// The unvalidated attributes as the kernel's host boundary takes them.
    pub fn attributes(&self) -> ConvAttributes {
        ConvAttributes {
            stride: self.stride.clone(),
            padding: self.padding.clone(),
            dilation: self.dilation.clone(),
            deform_groups: self.deform_groups,
            groups: self.groups,
        }
    }

    /// Validates the attributes.
    pub fn params(&self) -> DeformOpsResult<ConvParams> {
        Ok(self.attributes().validate()?)
    }
}
