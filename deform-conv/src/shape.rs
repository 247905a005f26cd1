//! # Shape-Carrying Tensor Views
//!
//! Thin row-major views over flat `f32` buffers. A view carries its dimensions
//! and strides so that indexing is expressed in logical coordinates instead of
//! hand-written pointer offsets.

use core::ops::Range;

use crate::error::{DeformConvError, DeformConvResult};

fn row_major_strides<const D: usize>(dims: [usize; D]) -> [usize; D] {
    let mut strides = [1; D];
    for axis in (0..D.saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * dims[axis + 1];
    }
    strides
}

fn numel<const D: usize>(dims: [usize; D]) -> usize {
    dims.iter().product()
}

fn check_len<const D: usize>(
    tensor: &'static str,
    len: usize,
    dims: [usize; D],
) -> DeformConvResult<()> {
    match checked_numel(&dims) {
        Some(expected) if expected == len => Ok(()),
        Some(expected) => Err(DeformConvError::shape_mismatch(
            tensor,
            format!("{expected} elements for shape {dims:?}"),
            format!("{len} elements"),
        )),
        None => Err(DeformConvError::shape_mismatch(
            tensor,
            format!("an element count for shape {dims:?} that fits in usize"),
            format!("{len} elements"),
        )),
    }
}

/// Product of `dims`, or `None` on overflow.
pub(crate) fn checked_numel(dims: &[usize]) -> Option<usize> {
    dims.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
}

/// Converts a dynamically sized shape into a fixed-rank one.
pub fn fixed_dims<const D: usize>(
    tensor: &'static str,
    shape: &[usize],
) -> DeformConvResult<[usize; D]> {
    shape.try_into().map_err(|_| {
        DeformConvError::shape_mismatch(tensor, format!("rank {D}"), format!("shape {shape:?}"))
    })
}

/// Spatial output size of a convolution along one axis.
///
/// Computes `floor((input + 2 * padding - dilation * (kernel - 1) - 1) / stride + 1)`.
/// Returns `None` when the dilated kernel does not fit in the padded input,
/// when `kernel`, `stride` or `dilation` is zero, or when an intermediate
/// size overflows `usize`.
pub const fn conv_output_size(
    input: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
    dilation: usize,
) -> Option<usize> {
    if kernel == 0 || stride == 0 || dilation == 0 {
        return None;
    }
    let Some(dilated) = dilation.checked_mul(kernel - 1) else {
        return None;
    };
    let Some(span) = dilated.checked_add(1) else {
        return None;
    };
    let Some(both_sides) = padding.checked_mul(2) else {
        return None;
    };
    let Some(padded) = input.checked_add(both_sides) else {
        return None;
    };
    if padded < span {
        return None;
    }
    Some((padded - span) / stride + 1)
}

/// Read-only view over a contiguous row-major buffer.
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a, const D: usize> {
    data: &'a [f32],
    dims: [usize; D],
    strides: [usize; D],
}

impl<'a, const D: usize> TensorView<'a, D> {
    /// Wraps `data` as a tensor of shape `dims`, checking the element count.
    pub fn from_slice(
        tensor: &'static str,
        data: &'a [f32],
        dims: [usize; D],
    ) -> DeformConvResult<Self> {
        check_len(tensor, data.len(), dims)?;
        Ok(Self::contiguous(data, dims))
    }

    pub(crate) fn contiguous(data: &'a [f32], dims: [usize; D]) -> Self {
        debug_assert_eq!(data.len(), numel(dims));
        Self {
            data,
            dims,
            strides: row_major_strides(dims),
        }
    }

    pub const fn dims(&self) -> [usize; D] {
        self.dims
    }

    pub const fn strides(&self) -> [usize; D] {
        self.strides
    }

    pub const fn as_slice(&self) -> &'a [f32] {
        self.data
    }

    #[inline]
    fn offset_of(&self, index: [usize; D]) -> usize {
        let mut offset = 0;
        for axis in 0..D {
            debug_assert!(
                index[axis] < self.dims[axis],
                "index {index:?} out of bounds for shape {:?}",
                self.dims
            );
            offset += index[axis] * self.strides[axis];
        }
        offset
    }

    /// Element at a logical index.
    #[inline]
    pub fn get(&self, index: [usize; D]) -> f32 {
        self.data[self.offset_of(index)]
    }

    /// Restricts the outermost axis to `range`.
    pub fn narrow(&self, range: Range<usize>) -> Self {
        debug_assert!(range.start <= range.end && range.end <= self.dims[0]);
        let mut dims = self.dims;
        dims[0] = range.len();
        Self {
            data: &self.data[range.start * self.strides[0]..range.end * self.strides[0]],
            dims,
            strides: self.strides,
        }
    }

    /// Fixes the outermost axis at `index`, dropping it from the view.
    ///
    /// `E` must be `D - 1`.
    pub fn select<const E: usize>(&self, index: usize) -> TensorView<'a, E> {
        assert_eq!(E + 1, D, "select drops exactly one axis");
        let mut dims = [0; E];
        dims.copy_from_slice(&self.dims[1..]);
        let mut strides = [0; E];
        strides.copy_from_slice(&self.strides[1..]);
        let start = index * self.strides[0];
        TensorView {
            data: &self.data[start..start + self.strides[0]],
            dims,
            strides,
        }
    }
}

/// Mutable counterpart of [`TensorView`].
#[derive(Debug)]
pub struct TensorViewMut<'a, const D: usize> {
    data: &'a mut [f32],
    dims: [usize; D],
    strides: [usize; D],
}

impl<'a, const D: usize> TensorViewMut<'a, D> {
    /// Wraps `data` as a writable tensor of shape `dims`, checking the element count.
    pub fn from_slice(
        tensor: &'static str,
        data: &'a mut [f32],
        dims: [usize; D],
    ) -> DeformConvResult<Self> {
        check_len(tensor, data.len(), dims)?;
        Ok(Self::contiguous(data, dims))
    }

    pub(crate) fn contiguous(data: &'a mut [f32], dims: [usize; D]) -> Self {
        debug_assert_eq!(data.len(), numel(dims));
        Self {
            data,
            dims,
            strides: row_major_strides(dims),
        }
    }

    pub const fn dims(&self) -> [usize; D] {
        self.dims
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut *self.data
    }

    #[inline]
    fn offset_of(&self, index: [usize; D]) -> usize {
        let mut offset = 0;
        for axis in 0..D {
            debug_assert!(
                index[axis] < self.dims[axis],
                "index {index:?} out of bounds for shape {:?}",
                self.dims
            );
            offset += index[axis] * self.strides[axis];
        }
        offset
    }

    #[inline]
    pub fn set(&mut self, index: [usize; D], value: f32) {
        let offset = self.offset_of(index);
        self.data[offset] = value;
    }

    /// Restricts the outermost axis to `range`.
    pub fn narrow_mut(&mut self, range: Range<usize>) -> TensorViewMut<'_, D> {
        debug_assert!(range.start <= range.end && range.end <= self.dims[0]);
        let mut dims = self.dims;
        dims[0] = range.len();
        TensorViewMut {
            data: &mut self.data[range.start * self.strides[0]..range.end * self.strides[0]],
            dims,
            strides: self.strides,
        }
    }

    /// Fixes the outermost axis at `index`, dropping it from the view.
    ///
    /// `E` must be `D - 1`.
    pub fn select_mut<const E: usize>(&mut self, index: usize) -> TensorViewMut<'_, E> {
        assert_eq!(E + 1, D, "select drops exactly one axis");
        let mut dims = [0; E];
        dims.copy_from_slice(&self.dims[1..]);
        let mut strides = [0; E];
        strides.copy_from_slice(&self.strides[1..]);
        let start = index * self.strides[0];
        TensorViewMut {
            data: &mut self.data[start..start + self.strides[0]],
            dims,
            strides,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conv_output_size_same_padding_keeps_size() {
        assert_eq!(conv_output_size(7, 3, 1, 1, 1), Some(7));
    }

    #[test]
    fn conv_output_size_strided_dilated() {
        // span = 2 * 2 + 1 = 5, padded = 12, (12 - 5) / 2 + 1 = 4
        assert_eq!(conv_output_size(10, 3, 2, 1, 2), Some(4));
    }

    #[test]
    fn conv_output_size_kernel_larger_than_input() {
        assert_eq!(conv_output_size(2, 5, 1, 0, 1), None);
        assert_eq!(conv_output_size(3, 0, 1, 0, 1), None);
    }

    #[test]
    fn conv_output_size_overflow_is_none() {
        assert_eq!(conv_output_size(4, 3, 1, usize::MAX / 2 + 1, 1), None);
        assert_eq!(conv_output_size(usize::MAX, 1, 1, 1, 1), None);
        assert_eq!(conv_output_size(4, 3, 1, 0, usize::MAX), None);
        // Largest padding whose doubled value still fits.
        assert_eq!(conv_output_size(0, 1, usize::MAX, usize::MAX / 2, 1), Some(1));
    }

    #[test]
    fn view_indexing_follows_row_major_layout() {
        let data: Vec<f32> = (0..24).map(|v| v as f32).collect();
        let view = TensorView::from_slice("t", &data, [2, 3, 4]).unwrap();
        assert_eq!(view.strides(), [12, 4, 1]);
        assert_eq!(view.get([1, 2, 3]), 23.0);

        let channel = view.select::<2>(1);
        assert_eq!(channel.dims(), [3, 4]);
        assert_eq!(channel.get([0, 1]), 13.0);

        let narrowed = view.narrow(1..2);
        assert_eq!(narrowed.dims(), [1, 3, 4]);
        assert_eq!(narrowed.get([0, 0, 0]), 12.0);
    }

    #[test]
    fn view_rejects_wrong_length() {
        let data = vec![0.0; 5];
        let err = TensorView::from_slice("input", &data, [1, 2, 3]).unwrap_err();
        assert!(matches!(err, DeformConvError::ShapeMismatch { tensor: "input", .. }));
    }

    #[test]
    fn view_rejects_overflowing_shape() {
        // A wrapping product would reach zero and accept the empty buffer.
        let err = TensorView::from_slice("filter", &[], [usize::MAX, 2, 0]).unwrap_err();
        assert!(matches!(err, DeformConvError::ShapeMismatch { tensor: "filter", .. }));
    }

    #[test]
    fn mutable_view_writes_through_subviews() {
        let mut data = vec![0.0; 12];
        let mut view = TensorViewMut::from_slice("out", &mut data, [3, 2, 2]).unwrap();
        view.narrow_mut(1..3).select_mut::<2>(1).set([1, 0], 5.0);
        assert_eq!(data[10], 5.0);
    }

    #[test]
    fn fixed_dims_rejects_wrong_rank() {
        assert_eq!(fixed_dims::<2>("x", &[3, 4]).unwrap(), [3, 4]);
        assert!(fixed_dims::<4>("x", &[3, 4]).is_err());
    }
}
