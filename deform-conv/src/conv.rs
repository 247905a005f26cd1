//! # Grouped Modulated Deformable Convolution
//!
//! Entry points that validate every tensor against the convolution parameters,
//! then run deformable im2col and a GEMM per batch item and group.

use tracing::{debug, trace};

use crate::{
    attributes::ConvParams,
    error::{DeformConvError, DeformConvResult},
    gemm::{Accumulate, Gemm},
    im2col::{deformable_im2col, Im2ColGeometry},
    shape::{checked_numel, conv_output_size, fixed_dims, TensorView, TensorViewMut},
};

/// A tensor handed over by the host: a flat row-major buffer and its shape.
#[derive(Debug, Clone, Copy)]
pub struct HostTensor<'a> {
    pub data: &'a [f32],
    pub shape: &'a [usize],
}

impl<'a> HostTensor<'a> {
    pub const fn new(data: &'a [f32], shape: &'a [usize]) -> Self {
        Self { data, shape }
    }

    fn view<const D: usize>(&self, name: &'static str) -> DeformConvResult<TensorView<'a, D>> {
        let dims = fixed_dims::<D>(name, self.shape)?;
        TensorView::from_slice(name, self.data, dims)
    }
}

/// Operator inputs exactly as bound by the host, any of which may be absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostInputs<'a> {
    pub input: Option<HostTensor<'a>>,
    pub offset: Option<HostTensor<'a>>,
    pub mask: Option<HostTensor<'a>>,
    pub filter: Option<HostTensor<'a>>,
    pub bias: Option<HostTensor<'a>>,
}

impl<'a> HostInputs<'a> {
    /// Checks presence and rank of every tensor.
    ///
    /// Mask and bias may be absent; input, offset and filter may not.
    pub fn into_inputs(self) -> DeformConvResult<DeformConvInputs<'a>> {
        fn required<'a>(
            name: &'static str,
            tensor: Option<HostTensor<'a>>,
        ) -> DeformConvResult<HostTensor<'a>> {
            tensor.ok_or(DeformConvError::MissingRequiredInput { name })
        }

        Ok(DeformConvInputs {
            input: required("input", self.input)?.view("input")?,
            offset: required("offset", self.offset)?.view("offset")?,
            mask: self.mask.map(|mask| mask.view("mask")).transpose()?,
            filter: required("filter", self.filter)?.view("filter")?,
            bias: self.bias.map(|bias| bias.view("bias")).transpose()?,
        })
    }
}

/// Typed operator inputs.
///
/// # Shapes
/// - input: `[batch, channels, height, width]`
/// - offset: `[batch, deform_groups * 2 * kernel_h * kernel_w, out_h, out_w]`
/// - mask: `[batch, deform_groups * kernel_h * kernel_w, out_h, out_w]`
/// - filter: `[num_output, channels / groups, kernel_h, kernel_w]`
/// - bias: `[num_output]`
#[derive(Debug, Clone, Copy)]
pub struct DeformConvInputs<'a> {
    pub input: TensorView<'a, 4>,
    pub offset: TensorView<'a, 4>,
    pub mask: Option<TensorView<'a, 4>>,
    pub filter: TensorView<'a, 4>,
    pub bias: Option<TensorView<'a, 1>>,
}

/// Everything the loops need, derived once from validated inputs.
#[derive(Debug, Clone, Copy)]
struct ConvPlan {
    batch: usize,
    num_output: usize,
    channels_per_group: usize,
    out_channels_per_group: usize,
    column_len: usize,
    geometry: Im2ColGeometry,
}

impl ConvPlan {
    fn output_dims(&self) -> [usize; 4] {
        let [out_h, out_w] = self.geometry.output;
        [self.batch, self.num_output, out_h, out_w]
    }
}

fn expect_dims<const D: usize>(
    tensor: &'static str,
    actual: [usize; D],
    expected: [usize; D],
) -> DeformConvResult<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(DeformConvError::shape_mismatch(
            tensor,
            format!("{expected:?}"),
            format!("{actual:?}"),
        ))
    }
}

/// Product of `factors`, rejected when it does not fit in `usize`.
fn sized(tensor: &'static str, factors: &[usize]) -> DeformConvResult<usize> {
    checked_numel(factors).ok_or_else(|| {
        DeformConvError::shape_mismatch(
            tensor,
            "a size that fits in usize",
            format!("product of {factors:?}"),
        )
    })
}

fn plan(inputs: &DeformConvInputs<'_>, params: &ConvParams) -> DeformConvResult<ConvPlan> {
    params.check()?;

    let [batch, channels, in_h, in_w] = inputs.input.dims();
    let [num_output, filter_channels, kernel_h, kernel_w] = inputs.filter.dims();
    let groups = params.groups;
    let deform_groups = params.deform_groups;

    if channels % groups != 0 {
        return Err(DeformConvError::shape_mismatch(
            "input",
            format!("channels divisible by groups={groups}"),
            format!("{channels} channels"),
        ));
    }
    if num_output % groups != 0 {
        return Err(DeformConvError::shape_mismatch(
            "filter",
            format!("output channels divisible by groups={groups}"),
            format!("{num_output} output channels"),
        ));
    }
    let channels_per_group = channels / groups;
    if filter_channels != channels_per_group {
        return Err(DeformConvError::shape_mismatch(
            "filter",
            format!("{channels_per_group} input channels per group"),
            format!("{filter_channels}"),
        ));
    }
    if channels_per_group % deform_groups != 0 {
        return Err(DeformConvError::shape_mismatch(
            "input",
            format!("channels per group divisible by deform_groups={deform_groups}"),
            format!("{channels_per_group} channels per group"),
        ));
    }

    let out_size = |axis: usize, input: usize, kernel: usize| {
        conv_output_size(
            input,
            kernel,
            params.stride[axis],
            params.padding[axis],
            params.dilation[axis],
        )
        .ok_or_else(|| {
            DeformConvError::shape_mismatch(
                "output",
                "a positive spatial size",
                format!(
                    "kernel {kernel} with dilation {} does not fit input {input} padded by {}",
                    params.dilation[axis], params.padding[axis]
                ),
            )
        })
    };
    let out_h = out_size(0, in_h, kernel_h)?;
    let out_w = out_size(1, in_w, kernel_w)?;

    let taps = sized("filter", &[kernel_h, kernel_w])?;
    let mask_channels = sized("mask", &[deform_groups, taps])?;
    let offset_channels = sized("offset", &[2, mask_channels])?;
    expect_dims("offset", inputs.offset.dims(), [batch, offset_channels, out_h, out_w])?;
    if let Some(mask) = &inputs.mask {
        expect_dims("mask", mask.dims(), [batch, mask_channels, out_h, out_w])?;
    }
    if let Some(bias) = &inputs.bias {
        expect_dims("bias", bias.dims(), [num_output])?;
    }
    sized("output", &[batch, num_output, out_h, out_w])?;
    let column_len = sized("columns", &[channels_per_group, taps, out_h, out_w])?;

    Ok(ConvPlan {
        batch,
        num_output,
        channels_per_group,
        out_channels_per_group: num_output / groups,
        column_len,
        geometry: Im2ColGeometry {
            kernel: [kernel_h, kernel_w],
            stride: params.stride,
            padding: params.padding,
            dilation: params.dilation,
            output: [out_h, out_w],
            deform_groups,
        },
    })
}

/// Output shape `[batch, num_output, out_h, out_w]` the host must allocate.
pub fn output_shape(
    inputs: &DeformConvInputs<'_>,
    params: &ConvParams,
) -> DeformConvResult<[usize; 4]> {
    Ok(plan(inputs, params)?.output_dims())
}

/// Number of `f32` elements in the column scratch buffer for one invocation.
pub fn column_buffer_len(
    inputs: &DeformConvInputs<'_>,
    params: &ConvParams,
) -> DeformConvResult<usize> {
    Ok(plan(inputs, params)?.column_len)
}

/// Reusable scratch memory for the column matrix.
///
/// Grows on demand and is never shrunk, so one workspace can serve many
/// invocations of different sizes.
#[derive(Debug, Default, Clone)]
pub struct Workspace {
    columns: Vec<f32>,
}

impl Workspace {
    pub const fn new() -> Self {
        Self {
            columns: Vec::new(),
        }
    }

    pub fn with_len(len: usize) -> Self {
        Self {
            columns: vec![0.0; len],
        }
    }

    /// Bytes currently held for the column matrix.
    pub fn size_in_bytes(&self) -> usize {
        self.columns.len() * core::mem::size_of::<f32>()
    }

    fn columns(&mut self, len: usize) -> &mut [f32] {
        if self.columns.len() < len {
            self.columns.resize(len, 0.0);
        }
        &mut self.columns[..len]
    }
}

/// Computes modulated deformable convolution into `output`.
///
/// `output` must hold exactly the shape returned by [`output_shape`] and
/// `output_dims` must state it. Scratch memory is allocated for the duration
/// of the call.
///
/// # Errors
///
/// Returns an error before writing anything if a shape, the output buffer or
/// a parameter is inconsistent.
pub fn modulated_deform_conv2d(
    inputs: &DeformConvInputs<'_>,
    params: &ConvParams,
    output: &mut [f32],
    output_dims: [usize; 4],
) -> DeformConvResult<()> {
    let mut workspace = Workspace::new();
    modulated_deform_conv2d_with_workspace(inputs, params, output, output_dims, &mut workspace)
}

/// Same as [`modulated_deform_conv2d`] with caller-owned scratch memory.
pub fn modulated_deform_conv2d_with_workspace(
    inputs: &DeformConvInputs<'_>,
    params: &ConvParams,
    output: &mut [f32],
    output_dims: [usize; 4],
    workspace: &mut Workspace,
) -> DeformConvResult<()> {
    let plan = plan(inputs, params)?;
    expect_dims("output", output_dims, plan.output_dims())?;
    let mut output = TensorViewMut::from_slice("output", output, output_dims)?;

    let geometry = plan.geometry;
    let cpg = plan.channels_per_group;
    let ocpg = plan.out_channels_per_group;
    let rows = geometry.column_rows(cpg);
    let cols = geometry.column_cols();

    debug!(
        batch = plan.batch,
        groups = params.groups,
        deform_groups = params.deform_groups,
        out_h = geometry.output[0],
        out_w = geometry.output[1],
        column_len = plan.column_len,
        has_mask = inputs.mask.is_some(),
        has_bias = inputs.bias.is_some(),
        "running modulated deformable convolution"
    );

    let columns = workspace.columns(plan.column_len);
    for b in 0..plan.batch {
        let input = inputs.input.select::<3>(b);
        let offset = inputs.offset.select::<3>(b);
        let mask = inputs.mask.map(|mask| mask.select::<3>(b));
        let mut output = output.select_mut::<3>(b);

        for g in 0..params.groups {
            trace!(batch = b, group = g, "filling column buffer");
            let input = input.narrow(g * cpg..(g + 1) * cpg);
            deformable_im2col(
                &input,
                &offset,
                mask.as_ref(),
                &geometry,
                &mut TensorViewMut::contiguous(&mut *columns, [rows, cols]),
            );

            let out_channels = g * ocpg..(g + 1) * ocpg;
            let mut slab = output.narrow_mut(out_channels.clone());
            let slab = slab.as_mut_slice();
            match &inputs.bias {
                Some(bias) => {
                    for (oc, plane) in slab.chunks_exact_mut(cols).enumerate() {
                        plane.fill(bias.get([out_channels.start + oc]));
                    }
                }
                None => slab.fill(0.0),
            }

            let filter = inputs.filter.narrow(out_channels);
            Gemm::new(ocpg, cols, rows).with_beta(1.0).run(
                filter.as_slice(),
                &columns[..],
                None,
                Accumulate::InPlace,
                slab,
            );
        }
    }

    Ok(())
}
