use crate::engine::{
    tables::{self, Twiddles},
    Engine, EngineKind,
};

// ======================================================================
// Naive - PUBLIC

/// Direct-DFT reference [`Engine`].
///
/// Quadratic in the transform length; exists to define the semantics
/// the optimized engines are tested against.
#[derive(Clone)]
pub struct Naive(());

impl Naive {
    /// Creates new [`Naive`].
    pub fn new() -> Self {
        Self(())
    }
}

impl Engine for Naive {
    fn kind(&self) -> EngineKind {
        EngineKind::Naive
    }

    fn fft(&self, data: &mut [f64], twiddles: &Twiddles, inverse: bool) {
        let n = twiddles.n;
        assert_eq!(data.len(), 2 * n);

        let roots = tables::initialize_roots(n);
        let mut out = vec![0.0; 2 * n];

        for k in 0..n {
            let mut sum_re = 0.0;
            let mut sum_im = 0.0;
            for j in 0..n {
                let (w_re, mut w_im) = roots.get(j * k % n);
                if inverse {
                    w_im = -w_im;
                }
                let (x_re, x_im) = (data[2 * j], data[2 * j + 1]);
                sum_re += x_re * w_re - x_im * w_im;
                sum_im += x_re * w_im + x_im * w_re;
            }
            out[2 * k] = sum_re;
            out[2 * k + 1] = sum_im;
        }

        if inverse {
            let scale = 1.0 / n as f64;
            for x in out.iter_mut() {
                *x *= scale;
            }
        }

        data.copy_from_slice(&out);
    }

    fn cmul(&self, x: &mut [f64], y: &[f64]) {
        for (xc, yc) in x.chunks_exact_mut(2).zip(y.chunks_exact(2)) {
            let re = xc[0] * yc[0] - xc[1] * yc[1];
            let im = xc[0] * yc[1] + xc[1] * yc[0];
            xc[0] = re;
            xc[1] = im;
        }
    }

    fn csquare(&self, x: &mut [f64]) {
        for xc in x.chunks_exact_mut(2) {
            let re = xc[0] * xc[0] - xc[1] * xc[1];
            let im = 2.0 * xc[0] * xc[1];
            xc[0] = re;
            xc[1] = im;
        }
    }

    fn cadd(&self, x: &mut [f64], y: &[f64]) {
        for (a, b) in x.iter_mut().zip(y) {
            *a += b;
        }
    }

    fn csub(&self, x: &mut [f64], y: &[f64]) {
        for (a, b) in x.iter_mut().zip(y) {
            *a -= b;
        }
    }

    fn cmul_add(&self, x: &mut [f64], y: &[f64], z: &[f64]) {
        for ((xc, yc), zc) in x
            .chunks_exact_mut(2)
            .zip(y.chunks_exact(2))
            .zip(z.chunks_exact(2))
        {
            xc[0] += yc[0] * zc[0] - yc[1] * zc[1];
            xc[1] += yc[0] * zc[1] + yc[1] * zc[0];
        }
    }
}

// ======================================================================
// Naive - IMPL Default

impl Default for Naive {
    fn default() -> Self {
        Self::new()
    }
}

// ======================================================================
// TESTS

// Engines are tested together in the parent module.
