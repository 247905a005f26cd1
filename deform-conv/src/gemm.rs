//! # Reference GEMM
//!
//! Fixed-size dense matrix multiply computing
//! `Y = alpha * (op(A) · op(B)) + beta * V + beta * H`
//! with a plain triple loop, reduction over `K` innermost.

/// Storage orientation of the two operands.
///
/// The first letter describes `A`, the second `B`. `N` means the operand is
/// stored as written (`A: M×K`, `B: K×N`), `T` means it is stored transposed
/// (`A: K×M`, `B: N×K`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transpose {
    #[default]
    NN,
    TN,
    TT,
    NT,
}

impl Transpose {
    pub const fn new(trans_a: bool, trans_b: bool) -> Self {
        match (trans_a, trans_b) {
            (false, false) => Self::NN,
            (true, false) => Self::TN,
            (true, true) => Self::TT,
            (false, true) => Self::NT,
        }
    }
}

/// Where the `beta * H` term comes from.
#[derive(Debug, Clone, Copy, Default)]
pub enum Accumulate<'a> {
    /// No `H` term.
    #[default]
    None,
    /// `H` is a separate `M×N` buffer.
    From(&'a [f32]),
    /// `H` is the current content of `Y`; each element is read before it is overwritten.
    InPlace,
}

/// Problem description for one GEMM call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gemm {
    pub transpose: Transpose,
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub alpha: f32,
    pub beta: f32,
}

impl Gemm {
    /// `M×K` by `K×N`, untransposed, `alpha = 1`, `beta = 0`.
    pub const fn new(m: usize, n: usize, k: usize) -> Self {
        Self {
            transpose: Transpose::NN,
            m,
            n,
            k,
            alpha: 1.0,
            beta: 0.0,
        }
    }

    pub const fn with_transpose(mut self, transpose: Transpose) -> Self {
        self.transpose = transpose;
        self
    }

    pub const fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    pub const fn with_beta(mut self, beta: f32) -> Self {
        self.beta = beta;
        self
    }

    /// Runs the multiply into `y` (`M×N`, row-major).
    ///
    /// `row_bias` is the optional length-`N` vector `V`, broadcast to every row.
    /// Supplying both `row_bias` and an accumulator adds both terms scaled by `beta`.
    ///
    /// # Panics
    ///
    /// Panics if an operand is shorter than the problem dimensions require.
    pub fn run(
        &self,
        a: &[f32],
        b: &[f32],
        row_bias: Option<&[f32]>,
        accumulate: Accumulate<'_>,
        y: &mut [f32],
    ) {
        let (m, n, k) = (self.m, self.n, self.k);
        assert!(a.len() >= m * k, "A holds {} values, need {}", a.len(), m * k);
        assert!(b.len() >= k * n, "B holds {} values, need {}", b.len(), k * n);
        assert!(y.len() >= m * n, "Y holds {} values, need {}", y.len(), m * n);
        if let Some(v) = row_bias {
            assert!(v.len() >= n, "V holds {} values, need {n}", v.len());
        }
        if let Accumulate::From(h) = accumulate {
            assert!(h.len() >= m * n, "H holds {} values, need {}", h.len(), m * n);
        }

        match self.transpose {
            Transpose::NN => {
                let ia = |mi: usize, ki: usize| mi * k + ki;
                let ib = |ki: usize, ni: usize| ki * n + ni;
                self.kernel(a, b, row_bias, accumulate, y, ia, ib);
            }
            Transpose::TN => {
                let ia = |mi: usize, ki: usize| ki * m + mi;
                let ib = |ki: usize, ni: usize| ki * n + ni;
                self.kernel(a, b, row_bias, accumulate, y, ia, ib);
            }
            Transpose::TT => {
                let ia = |mi: usize, ki: usize| ki * m + mi;
                let ib = |ki: usize, ni: usize| ni * k + ki;
                self.kernel(a, b, row_bias, accumulate, y, ia, ib);
            }
            Transpose::NT => {
                let ia = |mi: usize, ki: usize| mi * k + ki;
                let ib = |ki: usize, ni: usize| ni * k + ki;
                self.kernel(a, b, row_bias, accumulate, y, ia, ib);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    #[inline(always)]
    fn kernel<IA, IB>(
        &self,
        a: &[f32],
        b: &[f32],
        row_bias: Option<&[f32]>,
        accumulate: Accumulate<'_>,
        y: &mut [f32],
        a_index: IA,
        b_index: IB,
    ) where
        IA: Fn(usize, usize) -> usize,
        IB: Fn(usize, usize) -> usize,
    {
        for mi in 0..self.m {
            for ni in 0..self.n {
                let mut acc = 0.0f32;
                for ki in 0..self.k {
                    acc += a[a_index(mi, ki)] * b[b_index(ki, ni)];
                }
                acc *= self.alpha;
                if let Some(v) = row_bias {
                    acc += self.beta * v[ni];
                }
                let idx = mi * self.n + ni;
                match accumulate {
                    Accumulate::None => {}
                    Accumulate::From(h) => acc += self.beta * h[idx],
                    Accumulate::InPlace => acc += self.beta * y[idx],
                }
                y[idx] = acc;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: [f32; 6] = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    const B: [f32; 6] = [1.0, 0.0, 0.0, 1.0, 1.0, 1.0];
    const AB: [f32; 4] = [4.0, 5.0, 10.0, 11.0];

    fn transpose(data: &[f32], rows: usize, cols: usize) -> Vec<f32> {
        let mut out = vec![0.0; data.len()];
        for r in 0..rows {
            for c in 0..cols {
                out[c * rows + r] = data[r * cols + c];
            }
        }
        out
    }

    #[test]
    fn gemm_nn_plain_product() {
        let mut y = [0.0; 4];
        Gemm::new(2, 2, 3).run(&A, &B, None, Accumulate::None, &mut y);
        assert_eq!(y, AB);
    }

    #[test]
    fn gemm_every_orientation_agrees() {
        let a_t = transpose(&A, 2, 3);
        let b_t = transpose(&B, 3, 2);
        let cases = [
            (Transpose::NN, &A[..], &B[..]),
            (Transpose::TN, &a_t[..], &B[..]),
            (Transpose::TT, &a_t[..], &b_t[..]),
            (Transpose::NT, &A[..], &b_t[..]),
        ];
        for (orientation, a, b) in cases {
            let mut y = [f32::NAN; 4];
            Gemm::new(2, 2, 3)
                .with_transpose(orientation)
                .run(a, b, None, Accumulate::None, &mut y);
            assert_eq!(y, AB, "orientation {orientation:?}");
        }
    }

    #[test]
    fn gemm_transpose_from_flags() {
        assert_eq!(Transpose::new(false, false), Transpose::NN);
        assert_eq!(Transpose::new(true, false), Transpose::TN);
        assert_eq!(Transpose::new(true, true), Transpose::TT);
        assert_eq!(Transpose::new(false, true), Transpose::NT);
    }

    #[test]
    fn gemm_alpha_and_row_bias() {
        let mut y = [0.0; 4];
        let v = [1.0, -1.0];
        Gemm::new(2, 2, 3)
            .with_alpha(2.0)
            .with_beta(0.5)
            .run(&A, &B, Some(&v), Accumulate::None, &mut y);
        assert_eq!(y, [8.5, 9.5, 20.5, 21.5]);
    }

    #[test]
    fn gemm_accumulates_in_place() {
        let mut y = [1.0, 2.0, 3.0, 4.0];
        Gemm::new(2, 2, 3)
            .with_beta(1.0)
            .run(&A, &B, None, Accumulate::InPlace, &mut y);
        assert_eq!(y, [5.0, 7.0, 13.0, 15.0]);
    }

    #[test]
    fn gemm_accumulates_from_separate_buffer() {
        let h = [1.0, 1.0, 1.0, 1.0];
        let mut y = [f32::NAN; 4];
        Gemm::new(2, 2, 3)
            .with_beta(2.0)
            .run(&A, &B, None, Accumulate::From(&h), &mut y);
        assert_eq!(y, [6.0, 7.0, 12.0, 13.0]);
    }

    #[test]
    fn gemm_overwrites_existing_output() {
        let mut y = [f32::NAN; 4];
        Gemm::new(2, 2, 3).run(&A, &B, None, Accumulate::None, &mut y);
        assert!(y.iter().all(|v| v.is_finite()));
    }

    #[test]
    #[should_panic(expected = "B holds")]
    fn gemm_rejects_short_operand() {
        let mut y = [0.0; 4];
        Gemm::new(2, 2, 3).run(&A, &B[..4], None, Accumulate::None, &mut y);
    }
}
