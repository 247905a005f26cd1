//! # Modulated Deformable Convolution Layer
//!
//! A DCNv2 layer: one convolution predicts the sampling offsets, another the
//! modulation mask, and a third holds the weights applied to the deformed
//! samples. Both prediction branches start at zero, so a fresh layer behaves
//! like a regular convolution with every tap weighted by one.

use burn::{
    module::Param,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::sigmoid,
};

use crate::{error::DeformOpsResult, ops::modulated_deform_conv2d, ModulatedDeformConvOptions};

/// Configuration for the `ModulatedDeformConv2d` module.
#[derive(Config, Debug)]
pub struct ModulatedDeformConv2dConfig {
    /// Number of input channels.
    pub in_channels: usize,
    /// Number of output channels.
    pub out_channels: usize,
    /// Size of the square kernel.
    #[config(default = "3")]
    pub kernel_size: usize,
    #[config(default = "1")]
    pub stride: usize,
    /// Padding added to all four sides of the input.
    #[config(default = "1")]
    pub padding: usize,
    #[config(default = "1")]
    pub dilation: usize,
    /// Number of convolution groups.
    #[config(default = "1")]
    pub groups: usize,
    /// Number of offset groups.
    #[config(default = "1")]
    pub deform_groups: usize,
    /// Whether the regular convolution carries a bias.
    #[config(default = "false")]
    pub bias: bool,
}

impl ModulatedDeformConv2dConfig {
    /// Initializes a new `ModulatedDeformConv2d` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> ModulatedDeformConv2d<B> {
        let taps = self.kernel_size * self.kernel_size;
        let offset_conv = self.branch_conv(2 * self.deform_groups * taps, device);
        let modulator_conv = self.branch_conv(self.deform_groups * taps, device);

        let regular_conv = Conv2dConfig::new(
            [self.in_channels, self.out_channels],
            [self.kernel_size, self.kernel_size],
        )
        .with_stride([self.stride, self.stride])
        .with_padding(PaddingConfig2d::Explicit(self.padding, self.padding))
        .with_dilation([self.dilation, self.dilation])
        .with_groups(self.groups)
        .with_bias(self.bias)
        .init(device);

        ModulatedDeformConv2d {
            stride: self.stride,
            padding: self.padding,
            dilation: self.dilation,
            groups: self.groups,
            deform_groups: self.deform_groups,
            offset_conv,
            modulator_conv,
            regular_conv,
        }
    }

    /// A zero-initialized convolution sharing the layer's sampling grid.
    fn branch_conv<B: Backend>(&self, out_channels: usize, device: &Device<B>) -> Conv2d<B> {
        let mut conv = Conv2dConfig::new(
            [self.in_channels, out_channels],
            [self.kernel_size, self.kernel_size],
        )
        .with_stride([self.stride, self.stride])
        .with_padding(PaddingConfig2d::Explicit(self.padding, self.padding))
        .with_dilation([self.dilation, self.dilation])
        .init(device);

        conv.weight = Param::from_tensor(conv.weight.val().zeros_like());
        conv.bias = conv.bias.map(|bias| Param::from_tensor(bias.val().zeros_like()));
        conv
    }
}

/// Modulated deformable convolution layer.
#[derive(Module, Debug)]
pub struct ModulatedDeformConv2d<B: Backend> {
    stride: usize,
    padding: usize,
    dilation: usize,
    groups: usize,
    deform_groups: usize,
    offset_conv: Conv2d<B>,
    modulator_conv: Conv2d<B>,
    regular_conv: Conv2d<B>,
}

impl<B: Backend> ModulatedDeformConv2d<B> {
    /// # Shapes
    /// - input: `[batch, in_channels, height, width]`
    /// - output: `[batch, out_channels, out_h, out_w]`
    pub fn forward(&self, x: Tensor<B, 4>) -> DeformOpsResult<Tensor<B, 4>> {
        let offset = self.offset_conv.forward(x.clone());
        let mask = sigmoid(self.modulator_conv.forward(x.clone())).mul_scalar(2.0);

        modulated_deform_conv2d(
            x,
            offset,
            Some(mask),
            self.regular_conv.weight.val(),
            self.regular_conv.bias.as_ref().map(Param::val),
            &self.options(),
        )
    }

    fn options(&self) -> ModulatedDeformConvOptions {
        let pair = |value: usize| vec![value as i64; 2];
        ModulatedDeformConvOptions::new()
            .with_stride(pair(self.stride))
            .with_padding(pair(self.padding))
            .with_dilation(pair(self.dilation))
            .with_groups(self.groups as i64)
            .with_deform_groups(self.deform_groups as i64)
    }
}

#[cfg(test)]
mod tests {
    use burn::tensor::Distribution;

    use super::*;
    use crate::tests::{assert_close, TestBackend};

    #[test]
    fn fresh_layer_matches_regular_convolution() {
        let device = Default::default();
        let layer = ModulatedDeformConv2dConfig::new(4, 6)
            .with_groups(2)
            .with_deform_groups(2)
            .with_bias(true)
            .init::<TestBackend>(&device);
        let x =
            Tensor::<TestBackend, 4>::random([2, 4, 7, 6], Distribution::Normal(0.0, 1.0), &device);

        let output = layer.forward(x.clone()).unwrap();
        // sigmoid(0) * 2 weights every tap by exactly one.
        let expected = layer.regular_conv.forward(x);

        assert_eq!(output.dims(), [2, 6, 7, 6]);
        assert_close(output, expected, 1e-4);
    }

    #[test]
    fn strided_dilated_layer_output_size() {
        let device = Default::default();
        let layer = ModulatedDeformConv2dConfig::new(3, 5)
            .with_stride(2)
            .with_padding(2)
            .with_dilation(2)
            .init::<TestBackend>(&device);
        let x =
            Tensor::<TestBackend, 4>::random([1, 3, 9, 9], Distribution::Normal(0.0, 1.0), &device);

        let output = layer.forward(x.clone()).unwrap();

        assert_eq!(output.dims(), [1, 5, 5, 5]);
        assert_close(output, layer.regular_conv.forward(x), 1e-4);
    }
}
