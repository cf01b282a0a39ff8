use crate::engine::{tables::Twiddles, Engine, EngineKind};

// ======================================================================
// NoSimd - PUBLIC

/// Optimized [`Engine`] without SIMD.
///
/// [`NoSimd`] is a scalar radix-2 engine which works on all CPUs.
#[derive(Clone)]
pub struct NoSimd(());

impl NoSimd {
    /// Creates new [`NoSimd`].
    pub fn new() -> Self {
        Self(())
    }
}

impl Engine for NoSimd {
    fn kind(&self) -> EngineKind {
        EngineKind::NoSimd
    }

    fn fft(&self, data: &mut [f64], twiddles: &Twiddles, inverse: bool) {
        self.fft_private(data, twiddles, inverse);
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
// NoSimd - IMPL Default

impl Default for NoSimd {
    fn default() -> Self {
        Self::new()
    }
}

// ======================================================================
// NoSimd - PRIVATE

impl NoSimd {
    #[inline(always)]
    fn bit_reverse(data: &mut [f64], twiddles: &Twiddles) {
        for i in 0..twiddles.n {
            let j = twiddles.bitrev[i] as usize;
            if i < j {
                data.swap(2 * i, 2 * j);
                data.swap(2 * i + 1, 2 * j + 1);
            }
        }
    }

    fn fft_private(&self, data: &mut [f64], twiddles: &Twiddles, inverse: bool) {
        let n = twiddles.n;
        assert_eq!(data.len(), 2 * n);
        if n == 1 {
            return;
        }

        Self::bit_reverse(data, twiddles);

        let conj = if inverse { -1.0 } else { 1.0 };

        let mut len = 2;
        while len <= n {
            let half = len / 2;
            let mut base = 0;
            while base < n {
                for j in 0..half {
                    let w_re = twiddles.w[2 * (half + j)];
                    let w_im = conj * twiddles.w[2 * (half + j) + 1];

                    let a = 2 * (base + j);
                    let b = 2 * (base + j + half);

                    let v_re = data[b] * w_re - data[b + 1] * w_im;
                    let v_im = data[b] * w_im + data[b + 1] * w_re;

                    data[b] = data[a] - v_re;
                    data[b + 1] = data[a + 1] - v_im;
                    data[a] += v_re;
                    data[a + 1] += v_im;
                }
                base += len;
            }
            len <<= 1;
        }

        if inverse {
            let scale = 1.0 / n as f64;
            for x in data.iter_mut() {
                *x *= scale;
            }
        }
    }
}

// ======================================================================
// TESTS

// Engines are tested together in the parent module.
