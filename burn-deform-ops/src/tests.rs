use burn::{backend::ndarray::NdArray, prelude::*, tensor::Distribution};

use crate::{ModulatedDeformConvOptions, TensorDeformOps};

pub type TestBackend = NdArray<f32>;

pub fn assert_close<const D: usize>(
    actual: Tensor<TestBackend, D>,
    expected: Tensor<TestBackend, D>,
    tolerance: f32,
) {
    assert_eq!(actual.dims(), expected.dims());
    let actual = actual.into_data().to_vec::<f32>().unwrap();
    let expected = expected.into_data().to_vec::<f32>().unwrap();
    for (index, (a, e)) in actual.iter().zip(&expected).enumerate() {
        assert!(
            (a - e).abs() <= tolerance,
            "element {index}: {a} vs {e} (tolerance {tolerance})"
        );
    }
}

#[test]
fn test_tensor_deform_ops() {
    let device = Default::default();
    let input: Tensor<TestBackend, 4> =
        Tensor::<TestBackend, 1, Int>::arange(1..17, &device)
            .float()
            .reshape([1, 1, 4, 4]);
    let offset = Tensor::<TestBackend, 4>::zeros([1, 18, 2, 2], &device);
    let weight = Tensor::<TestBackend, 4>::ones([1, 1, 3, 3], &device);

    let output = input
        .modulated_deform_conv2d(offset, None, weight, None, &ModulatedDeformConvOptions::new())
        .unwrap();

    let expected = Tensor::<TestBackend, 4>::from_floats([[[[54.0, 63.0], [90.0, 99.0]]]], &device);
    assert_close(output, expected, 1e-5);
}

#[test]
fn test_zero_mask_leaves_bias() {
    let device = Default::default();
    let input =
        Tensor::<TestBackend, 4>::random([2, 2, 5, 5], Distribution::Normal(0.0, 1.0), &device);
    let offset =
        Tensor::<TestBackend, 4>::random([2, 18, 5, 5], Distribution::Uniform(-1.0, 1.0), &device);
    let mask = Tensor::<TestBackend, 4>::zeros([2, 9, 5, 5], &device);
    let weight =
        Tensor::<TestBackend, 4>::random([3, 2, 3, 3], Distribution::Normal(0.0, 1.0), &device);
    let bias = Tensor::<TestBackend, 1>::from_floats([0.5, -1.0, 2.0], &device);

    let options = ModulatedDeformConvOptions::new().with_padding(vec![1, 1]);
    let output = input
        .modulated_deform_conv2d(offset, Some(mask), weight, Some(bias.clone()), &options)
        .unwrap();

    let expected = bias.reshape([1, 3, 1, 1]).expand([2, 3, 5, 5]);
    assert_close(output, expected, 1e-6);
}
