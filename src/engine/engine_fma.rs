#[cfg(target_arch = "x86")]
use std::arch::x86::*;
#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

use crate::engine::{tables::Twiddles, Engine, EngineKind};

// ======================================================================
// Fma - PUBLIC

/// Optimized [`Engine`] using AVX2 and FMA.
///
/// Runs the same radix-2 passes as [`NoSimd`] with two complex words
/// per 256-bit vector and fused multiply-adds in the butterflies.
///
/// [`NoSimd`]: crate::engine::NoSimd
#[derive(Clone)]
pub struct Fma(());

impl Fma {
    /// Creates new [`Fma`].
    ///
    /// The caller must have verified that the CPU supports AVX2 and FMA;
    /// [`EngineKind::instantiate`] does this and degrades gracefully.
    ///
    /// [`EngineKind::instantiate`]: crate::engine::EngineKind
    pub fn new() -> Self {
        Self(())
    }
}

impl Engine for Fma {
    fn kind(&self) -> EngineKind {
        EngineKind::Fma
    }

    fn fft(&self, data: &mut [f64], twiddles: &Twiddles, inverse: bool) {
        unsafe { self.fft_private(data, twiddles, inverse) }
    }

    fn cmul(&self, x: &mut [f64], y: &[f64]) {
        unsafe { Self::cmul_private(x, y) }
    }

    fn csquare(&self, x: &mut [f64]) {
        unsafe { Self::csquare_private(x) }
    }

    fn cadd(&self, x: &mut [f64], y: &[f64]) {
        unsafe { Self::cadd_private(x, y) }
    }

    fn csub(&self, x: &mut [f64], y: &[f64]) {
        unsafe { Self::csub_private(x, y) }
    }

    fn cmul_add(&self, x: &mut [f64], y: &[f64], z: &[f64]) {
        unsafe { Self::cmul_add_private(x, y, z) }
    }
}

// ======================================================================
// Fma - IMPL Default

impl Default for Fma {
    fn default() -> Self {
        Self::new()
    }
}

// ======================================================================
// Fma - PRIVATE

impl Fma {
    /// Complex product of two packed pairs: `a * b`, or `a * conj(b)`
    /// when `CONJ` is set.
    #[target_feature(enable = "avx2", enable = "fma")]
    unsafe fn cmul_256<const CONJ: bool>(a: __m256d, b: __m256d) -> __m256d {
        unsafe {
            let b_re = _mm256_unpacklo_pd(b, b);
            let b_im = _mm256_unpackhi_pd(b, b);
            let a_swap = _mm256_permute_pd(a, 0b0101);
            let cross = _mm256_mul_pd(a_swap, b_im);
            if CONJ {
                // (ar·br + ai·bi, ai·br − ar·bi)
                _mm256_fmsubadd_pd(a, b_re, cross)
            } else {
                // (ar·br − ai·bi, ai·br + ar·bi)
                _mm256_fmaddsub_pd(a, b_re, cross)
            }
        }
    }

    #[target_feature(enable = "avx2", enable = "fma")]
    unsafe fn fft_private(&self, data: &mut [f64], twiddles: &Twiddles, inverse: bool) {
        let n = twiddles.n;
        assert_eq!(data.len(), 2 * n);
        if n == 1 {
            return;
        }

        for i in 0..n {
            let j = twiddles.bitrev[i] as usize;
            if i < j {
                data.swap(2 * i, 2 * j);
                data.swap(2 * i + 1, 2 * j + 1);
            }
        }

        // First stage: twiddle is 1.
        let ptr = data.as_mut_ptr();
        let mut base = 0;
        while base < n {
            unsafe {
                let a = ptr.add(2 * base);
                let b = ptr.add(2 * base + 2);
                let u = _mm_loadu_pd(a);
                let v = _mm_loadu_pd(b);
                _mm_storeu_pd(a, _mm_add_pd(u, v));
                _mm_storeu_pd(b, _mm_sub_pd(u, v));
            }
            base += 2;
        }

        // Remaining stages: two butterflies per vector.
        let tw = twiddles.w.as_ptr();
        let mut len = 4;
        while len <= n {
            let half = len / 2;
            let mut base = 0;
            while base < n {
                let mut j = 0;
                while j < half {
                    unsafe {
                        let w = _mm256_loadu_pd(tw.add(2 * (half + j)));
                        let a = ptr.add(2 * (base + j));
                        let b = ptr.add(2 * (base + j + half));
                        let u = _mm256_loadu_pd(a);
                        let v = _mm256_loadu_pd(b);
                        let vw = if inverse {
                            Self::cmul_256::<true>(v, w)
                        } else {
                            Self::cmul_256::<false>(v, w)
                        };
                        _mm256_storeu_pd(a, _mm256_add_pd(u, vw));
                        _mm256_storeu_pd(b, _mm256_sub_pd(u, vw));
                    }
                    j += 2;
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

    #[target_feature(enable = "avx2", enable = "fma")]
    unsafe fn cmul_private(x: &mut [f64], y: &[f64]) {
        assert!(x.len() == y.len() && x.len() % 4 == 0);
        let xp = x.as_mut_ptr();
        let yp = y.as_ptr();
        let mut i = 0;
        while i < x.len() {
            unsafe {
                let a = _mm256_loadu_pd(xp.add(i));
                let b = _mm256_loadu_pd(yp.add(i));
                _mm256_storeu_pd(xp.add(i), Self::cmul_256::<false>(a, b));
            }
            i += 4;
        }
    }

    #[target_feature(enable = "avx2", enable = "fma")]
    unsafe fn csquare_private(x: &mut [f64]) {
        assert!(x.len() % 4 == 0);
        let xp = x.as_mut_ptr();
        let mut i = 0;
        while i < x.len() {
            unsafe {
                let a = _mm256_loadu_pd(xp.add(i));
                _mm256_storeu_pd(xp.add(i), Self::cmul_256::<false>(a, a));
            }
            i += 4;
        }
    }

    // LLVM auto-vectorizes the linear ops once the length is known to
    // be a vector multiple.
    #[target_feature(enable = "avx2", enable = "fma")]
    unsafe fn cadd_private(x: &mut [f64], y: &[f64]) {
        assert!(x.len() == y.len() && x.len() % 4 == 0);
        for (a, b) in x.iter_mut().zip(y) {
            *a += b;
        }
    }

    #[target_feature(enable = "avx2", enable = "fma")]
    unsafe fn csub_private(x: &mut [f64], y: &[f64]) {
        assert!(x.len() == y.len() && x.len() % 4 == 0);
        for (a, b) in x.iter_mut().zip(y) {
            *a -= b;
        }
    }

    #[target_feature(enable = "avx2", enable = "fma")]
    unsafe fn cmul_add_private(x: &mut [f64], y: &[f64], z: &[f64]) {
        assert!(x.len() == y.len() && x.len() == z.len() && x.len() % 4 == 0);
        let xp = x.as_mut_ptr();
        let yp = y.as_ptr();
        let zp = z.as_ptr();
        let mut i = 0;
        while i < x.len() {
            unsafe {
                let acc = _mm256_loadu_pd(xp.add(i));
                let a = _mm256_loadu_pd(yp.add(i));
                let b = _mm256_loadu_pd(zp.add(i));
                let prod = Self::cmul_256::<false>(a, b);
                _mm256_storeu_pd(xp.add(i), _mm256_add_pd(acc, prod));
            }
            i += 4;
        }
    }
}

// ======================================================================
// TESTS

// Engines are tested together in the parent module.
