//! Convolution attributes as the host runtime supplies them, and their
//! validated form.

use crate::error::{DeformConvError, DeformConvResult};

/// Raw operator attributes.
///
/// Spatial attributes are integer sequences ordered `(h, w)`; they must hold
/// exactly two values each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvAttributes {
    pub stride: Vec<i64>,
    pub padding: Vec<i64>,
    pub dilation: Vec<i64>,
    pub deform_groups: i64,
    pub groups: i64,
}

impl Default for ConvAttributes {
    fn default() -> Self {
        Self {
            stride: vec![1, 1],
            padding: vec![0, 0],
            dilation: vec![1, 1],
            deform_groups: 1,
            groups: 1,
        }
    }
}

impl ConvAttributes {
    /// Checks arity and ranges, producing typed parameters.
    pub fn validate(&self) -> DeformConvResult<ConvParams> {
        let params = ConvParams {
            stride: spatial_pair("stride", &self.stride, 1)?,
            padding: spatial_pair("padding", &self.padding, 0)?,
            dilation: spatial_pair("dilation", &self.dilation, 1)?,
            groups: group_count("groups", self.groups)?,
            deform_groups: group_count("deform_groups", self.deform_groups)?,
        };
        Ok(params)
    }
}

fn spatial_pair(name: &'static str, values: &[i64], min: i64) -> DeformConvResult<[usize; 2]> {
    let &[h, w] = values else {
        return Err(DeformConvError::InvalidAttribute {
            name,
            reason: format!("expected 2 values, got {}", values.len()),
        });
    };
    let convert = |value: i64| {
        usize::try_from(value)
            .ok()
            .filter(|_| value >= min)
            .ok_or_else(|| DeformConvError::InvalidAttribute {
                name,
                reason: format!("{value} is below the minimum of {min}"),
            })
    };
    Ok([convert(h)?, convert(w)?])
}

fn group_count(name: &'static str, value: i64) -> DeformConvResult<usize> {
    usize::try_from(value)
        .ok()
        .filter(|&count| count >= 1)
        .ok_or_else(|| DeformConvError::InvalidAttribute {
            name,
            reason: format!("must be positive, got {value}"),
        })
}

/// Validated convolution parameters, spatial pairs ordered `[h, w]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvParams {
    pub stride: [usize; 2],
    pub padding: [usize; 2],
    pub dilation: [usize; 2],
    pub groups: usize,
    pub deform_groups: usize,
}

impl Default for ConvParams {
    fn default() -> Self {
        Self::new()
    }
}

impl ConvParams {
    /// Unit stride and dilation, no padding, one group of each kind.
    pub const fn new() -> Self {
        Self {
            stride: [1, 1],
            padding: [0, 0],
            dilation: [1, 1],
            groups: 1,
            deform_groups: 1,
        }
    }

    pub const fn with_stride(mut self, stride: [usize; 2]) -> Self {
        self.stride = stride;
        self
    }

    pub const fn with_padding(mut self, padding: [usize; 2]) -> Self {
        self.padding = padding;
        self
    }

    pub const fn with_dilation(mut self, dilation: [usize; 2]) -> Self {
        self.dilation = dilation;
        self
    }

    pub const fn with_groups(mut self, groups: usize) -> Self {
        self.groups = groups;
        self
    }

    pub const fn with_deform_groups(mut self, deform_groups: usize) -> Self {
        self.deform_groups = deform_groups;
        self
    }

    /// Rejects zero strides, dilations and group counts.
    ///
    /// Parameters built through [`ConvAttributes::validate`] always pass.
    pub fn check(&self) -> DeformConvResult<()> {
        let positive = [
            ("stride", self.stride[0].min(self.stride[1])),
            ("dilation", self.dilation[0].min(self.dilation[1])),
            ("groups", self.groups),
            ("deform_groups", self.deform_groups),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(DeformConvError::InvalidAttribute {
                    name,
                    reason: "must be positive, got 0".to_string(),
                });
            }
        }
        Ok(())
    }
}
