//! # Deformable Im2Col
//!
//! Unfolds one group of one batch item into a column matrix whose rows are
//! `(channel, kernel_y, kernel_x)` taps and whose columns are output positions.
//! Each tap samples the input at its grid location shifted by a learned
//! offset, bilinearly interpolated with implicit zero padding, and scaled by a
//! modulation mask.

use libm::floorf;

use crate::shape::{TensorView, TensorViewMut};

/// Geometry shared by every tap of one im2col pass. Pairs are ordered `[h, w]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Im2ColGeometry {
    pub kernel: [usize; 2],
    pub stride: [usize; 2],
    pub padding: [usize; 2],
    pub dilation: [usize; 2],
    pub output: [usize; 2],
    pub deform_groups: usize,
}

impl Im2ColGeometry {
    /// Rows of the column matrix for `channels` input channels.
    pub const fn column_rows(&self, channels: usize) -> usize {
        channels * self.kernel[0] * self.kernel[1]
    }

    /// Columns of the column matrix.
    pub const fn column_cols(&self) -> usize {
        self.output[0] * self.output[1]
    }
}

/// Fills `columns` from one group's input.
///
/// # Shapes
/// - input: `[channels, height, width]`
/// - offset: `[deform_groups * 2 * kernel_h * kernel_w, out_h, out_w]`
/// - mask: `[deform_groups * kernel_h * kernel_w, out_h, out_w]`
/// - columns: `[channels * kernel_h * kernel_w, out_h * out_w]`
///
/// Shapes are not validated here; the convolution entry point does that.
/// Out-of-range indices trip debug assertions or panic on slice bounds.
pub fn deformable_im2col(
    input: &TensorView<'_, 3>,
    offset: &TensorView<'_, 3>,
    mask: Option<&TensorView<'_, 3>>,
    geometry: &Im2ColGeometry,
    columns: &mut TensorViewMut<'_, 2>,
) {
    debug_assert_eq!(
        offset.dims(),
        [
            geometry.deform_groups * 2 * geometry.kernel[0] * geometry.kernel[1],
            geometry.output[0],
            geometry.output[1]
        ]
    );
    debug_assert_eq!(
        columns.dims(),
        [geometry.column_rows(input.dims()[0]), geometry.column_cols()]
    );

    match mask {
        Some(mask) => {
            debug_assert_eq!(
                mask.dims(),
                [
                    geometry.deform_groups * geometry.kernel[0] * geometry.kernel[1],
                    geometry.output[0],
                    geometry.output[1]
                ]
            );
            fill_columns(input, offset, geometry, columns, |channel, oy, ox| {
                mask.get([channel, oy, ox])
            });
        }
        None => fill_columns(input, offset, geometry, columns, |_, _, _| 1.0),
    }
}

#[inline(always)]
fn fill_columns<M>(
    input: &TensorView<'_, 3>,
    offset: &TensorView<'_, 3>,
    geometry: &Im2ColGeometry,
    columns: &mut TensorViewMut<'_, 2>,
    modulation: M,
) where
    M: Fn(usize, usize, usize) -> f32,
{
    let [channels, height, width] = input.dims();
    let [kernel_h, kernel_w] = geometry.kernel;
    let [out_h, out_w] = geometry.output;
    let taps = kernel_h * kernel_w;
    let channels_per_deform_group = channels / geometry.deform_groups;

    for c in 0..channels {
        let deform_group = c / channels_per_deform_group;
        let plane = input.select::<2>(c);
        for oy in 0..out_h {
            let y_origin = (oy * geometry.stride[0]) as isize - geometry.padding[0] as isize;
            for ox in 0..out_w {
                let x_origin = (ox * geometry.stride[1]) as isize - geometry.padding[1] as isize;
                let col = oy * out_w + ox;
                for ky in 0..kernel_h {
                    for kx in 0..kernel_w {
                        let tap = ky * kernel_w + kx;
                        let offset_channel = (deform_group * taps + tap) * 2;
                        let dy = offset.get([offset_channel, oy, ox]);
                        let dx = offset.get([offset_channel + 1, oy, ox]);
                        let y = (y_origin + (ky * geometry.dilation[0]) as isize) as f32 + dy;
                        let x = (x_origin + (kx * geometry.dilation[1]) as isize) as f32 + dx;

                        let weight = modulation(deform_group * taps + tap, oy, ox);
                        let value = bilinear_sample(&plane, height, width, y, x);
                        columns.set([c * taps + tap, col], weight * value);
                    }
                }
            }
        }
    }
}

/// Bilinear interpolation at `(y, x)` treating everything outside the plane as zero.
#[inline]
pub fn bilinear_sample(
    plane: &TensorView<'_, 2>,
    height: usize,
    width: usize,
    y: f32,
    x: f32,
) -> f32 {
    if y <= -1.0 || y >= height as f32 || x <= -1.0 || x >= width as f32 {
        return 0.0;
    }

    let y_low = floorf(y);
    let x_low = floorf(x);
    let ly = y - y_low;
    let lx = x - x_low;
    let hy = 1.0 - ly;
    let hx = 1.0 - lx;

    let y0 = y_low as isize;
    let x0 = x_low as isize;
    let at = |yy: isize, xx: isize| {
        if yy >= 0 && xx >= 0 && (yy as usize) < height && (xx as usize) < width {
            plane.get([yy as usize, xx as usize])
        } else {
            0.0
        }
    };

    hy * hx * at(y0, x0)
        + hy * lx * at(y0, x0 + 1)
        + ly * hx * at(y0 + 1, x0)
        + ly * lx * at(y0 + 1, x0 + 1)
}
