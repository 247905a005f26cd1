//! # Modulated Deformable Convolution on Burn Tensors
//!
//! Reads the operands back to host memory, runs the CPU kernel from
//! `deform-conv` and uploads the result to the input's device.

use burn::{prelude::*, tensor::TensorData};
use deform_conv::{output_shape, DeformConvInputs, TensorView};
use tracing::debug;

use crate::{
    error::{DeformOpsError, DeformOpsResult},
    options::ModulatedDeformConvOptions,
};

fn host_values<B: Backend, const D: usize>(
    tensor: &'static str,
    value: Tensor<B, D>,
) -> DeformOpsResult<([usize; D], Vec<f32>)> {
    let dims = value.dims();
    let values = value
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| DeformOpsError::TensorConversion {
            tensor,
            reason: format!("{e:?}"),
        })?;
    Ok((dims, values))
}

/// Applies a modulated deformable convolution.
///
/// A missing `mask` weights every tap by one; a missing `bias` adds nothing.
///
/// Offset groups partition the channels of each convolution group: channel
/// `c` of a group reads offset group `c / (channels_per_group / deform_groups)`.
/// Burn's own `deform_conv2d` partitions the full channel range instead, so
/// the two agree only when `groups == 1` or `deform_groups == 1`.
///
/// # Shapes
/// - input: `[batch, channels, height, width]`
/// - offset: `[batch, deform_groups * 2 * kernel_h * kernel_w, out_h, out_w]`
/// - mask: `[batch, deform_groups * kernel_h * kernel_w, out_h, out_w]`
/// - weight: `[out_channels, channels / groups, kernel_h, kernel_w]`
/// - bias: `[out_channels]`
/// - output: `[batch, out_channels, out_h, out_w]`
pub fn modulated_deform_conv2d<B: Backend>(
    input: Tensor<B, 4>,
    offset: Tensor<B, 4>,
    mask: Option<Tensor<B, 4>>,
    weight: Tensor<B, 4>,
    bias: Option<Tensor<B, 1>>,
    options: &ModulatedDeformConvOptions,
) -> DeformOpsResult<Tensor<B, 4>> {
    let params = options.params()?;
    let device = input.device();

    let (input_dims, input) = host_values("input", input)?;
    let (offset_dims, offset) = host_values("offset", offset)?;
    let mask = mask.map(|mask| host_values("mask", mask)).transpose()?;
    let (weight_dims, weight) = host_values("weight", weight)?;
    let bias = bias.map(|bias| host_values("bias", bias)).transpose()?;

    let inputs = DeformConvInputs {
        input: TensorView::from_slice("input", &input, input_dims)?,
        offset: TensorView::from_slice("offset", &offset, offset_dims)?,
        mask: mask
            .as_ref()
            .map(|(dims, values)| TensorView::from_slice("mask", values, *dims))
            .transpose()?,
        filter: TensorView::from_slice("weight", &weight, weight_dims)?,
        bias: bias
            .as_ref()
            .map(|(dims, values)| TensorView::from_slice("bias", values, *dims))
            .transpose()?,
    };

    let output_dims = output_shape(&inputs, &params)?;
    debug!(?input_dims, ?weight_dims, ?output_dims, "modulated_deform_conv2d");

    let mut output = vec![0.0f32; output_dims.iter().product()];
    deform_conv::modulated_deform_conv2d(&inputs, &params, &mut output, output_dims)?;

    Ok(Tensor::from_data(TensorData::new(output, output_dims), &device))
}
