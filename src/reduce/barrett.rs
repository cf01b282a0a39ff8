//! Barrett reduction with a cached reciprocal transform.

use std::sync::Arc;

use num_bigint::BigUint;
use tracing::debug;

use crate::{
    carry::{NormParams, Normalizer},
    reduce::digits,
    shape::{self, Shape, TransformKind},
    transform::Transformer,
    weights::WeightTables,
    Error, Settings,
};

// ======================================================================
// BarrettState - CRATE

/// Cached state of a Barrett-reduced handle.
///
/// The shape holds `2·bitlen(N) + 128` bits so that a full product and
/// the two reciprocal multiplications all fit. Reduction of `x < N²`:
/// `q = ((x >> (L−1))·μ) >> (L+17)` with `μ = ⌊2^(2L+16)/N⌋`, then
/// `r = x − q·N` and at most a few corrective subtractions.
pub(crate) struct BarrettState {
    pub(crate) shape: Shape,
    pub(crate) tables: Arc<WeightTables>,
    transformer: Transformer,
    normalizer: Normalizer,
    /// Digit width of the layout.
    w: u32,
    /// `bitlen(N)`.
    l_bits: u64,
    /// Spectrum of the reciprocal `μ`.
    mu_spec: Vec<f64>,
    /// Spectrum of the modulus.
    n_spec: Vec<f64>,
    /// The modulus in canonical words.
    n_words: Vec<u64>,
}

impl BarrettState {
    pub(crate) fn build(settings: &Settings, modulus: &BigUint) -> Result<Self, Error> {
        let l_bits = modulus.bits();
        let shape = shape::select_generic(settings, 2 * l_bits + 128)?;
        debug_assert_eq!(shape.kind, TransformKind::ZeroPadded);

        let tables = Arc::new(WeightTables::new(&shape, 2, 0));
        let engine = Arc::from(shape.engine.instantiate());
        let transformer = Transformer::new(Arc::clone(&tables), engine);
        let normalizer = Normalizer::new(Arc::clone(&tables), shape.kind, None);
        let w = shape.digits_per_word;

        let mu = (BigUint::from(1u32) << (2 * l_bits + 16)) / modulus;
        let mu_spec = Self::spectrum_of(&transformer, &mu, shape.fft_len, w);
        let n_spec = Self::spectrum_of(&transformer, modulus, shape.fft_len, w);
        let n_words = digits::from_biguint(modulus, shape.fft_len, w);

        debug!(fft_len = shape.fft_len, l_bits, "Barrett state built");

        Ok(Self {
            shape,
            tables,
            transformer,
            normalizer,
            w,
            l_bits,
            mu_spec,
            n_spec,
            n_words,
        })
    }

    fn spectrum_of(transformer: &Transformer, value: &BigUint, fft_len: usize, w: u32) -> Vec<f64> {
        let mut buf = vec![0.0; 2 * fft_len];
        let words = digits::from_biguint(value, fft_len, w);
        digits::write_balanced(&words, false, &mut buf[..fft_len], w);
        let mut scratch = vec![0.0; transformer.scratch_len()];
        transformer.prepare(&mut buf);
        transformer.forward_full(&mut buf, &mut scratch);
        buf
    }

    /// Multiplies canonical words by a cached spectrum, returning the
    /// (non-negative) canonical product words.
    fn mul_cached(&self, a: &[u64], spec: &[f64]) -> Vec<u64> {
        let n = self.shape.fft_len;
        let mut buf = vec![0.0; 2 * n];
        digits::write_balanced(a, false, &mut buf[..n], self.w);

        let mut scratch = vec![0.0; self.transformer.scratch_len()];
        self.transformer.prepare(&mut buf);
        self.transformer.forward_full(&mut buf, &mut scratch);
        self.transformer.engine.cmul(&mut buf, spec);
        self.transformer.inverse_full(&mut buf, &mut scratch);

        let mut acc = Vec::new();
        self.normalizer
            .normalize_zero_padded(&mut buf[..n], &mut acc, &NormParams::default());

        let (words, negative) = digits::canonical_abs(&buf[..n], self.w);
        debug_assert!(!negative, "product of canonical values went negative");
        words
    }

    /// Reduces the balanced digits of any `|x| < N²` into canonical
    /// `[0, N)` digits, in place.
    pub(crate) fn reduce(&self, buf: &mut [f64]) {
        let n = self.shape.fft_len;
        let (mut x, negative) = digits::canonical_abs(&buf[..n], self.w);

        if !digits::is_zero(&x) {
            let t = digits::shr_bits(&x, self.l_bits - 1, self.w);
            let q1 = self.mul_cached(&t, &self.mu_spec);
            let q_hat = digits::shr_bits(&q1, self.l_bits + 17, self.w);
            let qn = self.mul_cached(&q_hat, &self.n_spec);

            digits::sub_assign(&mut x, &qn, self.w);
            let mut guard = 0;
            while digits::cmp(&x, &self.n_words).is_ge() {
                digits::sub_assign(&mut x, &self.n_words, self.w);
                guard += 1;
                debug_assert!(guard < 8, "Barrett correction did not converge");
                if guard >= 8 {
                    break;
                }
            }

            if negative && !digits::is_zero(&x) {
                // x ≡ −|x|: the residue is N − |x|.
                let mut flipped = self.n_words.clone();
                digits::sub_assign(&mut flipped, &x, self.w);
                x = flipped;
            }
        }

        digits::write_balanced(&x, false, &mut buf[..n], self.w);
    }

    /// Brings the digits of a value in `(−2N, 2N)` back to canonical
    /// `[0, N)` without transform multiplications.
    pub(crate) fn canonicalize_small(&self, buf: &mut [f64]) {
        let n = self.shape.fft_len;
        let (mut x, negative) = digits::canonical_abs(&buf[..n], self.w);

        if negative && !digits::is_zero(&x) {
            let mut add = self.n_words.clone();
            while digits::cmp(&x, &add).is_gt() {
                // |x| may exceed N; peel whole multiples first.
                digits::sub_assign(&mut x, &self.n_words, self.w);
            }
            digits::sub_assign(&mut add, &x, self.w);
            x = add;
        } else {
            while digits::cmp(&x, &self.n_words).is_ge() {
                digits::sub_assign(&mut x, &self.n_words, self.w);
            }
        }

        digits::write_balanced(&x, false, &mut buf[..n], self.w);
    }

    /// The reduced value as a big integer.
    pub(crate) fn to_biguint(&self, buf: &[f64]) -> BigUint {
        let n = self.shape.fft_len;
        let (words, negative) = digits::canonical_abs(&buf[..n], self.w);
        debug_assert!(!negative);
        digits::to_biguint(&words, self.w)
    }
}

// ======================================================================
// TESTS

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineKind;
    use num_traits::Zero;

    fn settings() -> Settings {
        Settings {
            engine_override: Some(EngineKind::NoSimd),
            ..Settings::default()
        }
    }

    fn reduce_value(state: &BarrettState, x: &BigUint) -> BigUint {
        let n = state.shape.fft_len;
        let mut buf = vec![0.0; 2 * n];
        let words = digits::from_biguint(x, n, state.w);
        digits::write_balanced(&words, false, &mut buf[..n], state.w);
        state.reduce(&mut buf);
        state.to_biguint(&buf)
    }

    #[test]
    fn reduces_squares_of_a_prime_modulus() {
        // N = 10^20 + 39 (prime).
        let modulus = BigUint::parse_bytes(b"100000000000000000039", 10).unwrap();
        let state = BarrettState::build(&settings(), &modulus).unwrap();

        let mut x = BigUint::from(3u32);
        for _ in 0..5 {
            // x² mod N against the reference.
            let sq = &x * &x;
            let got = reduce_value(&state, &sq);
            assert_eq!(got, &sq % &modulus);
            x = got;
        }
    }

    #[test]
    fn reduces_values_below_the_modulus_unchanged() {
        let modulus = BigUint::from(1_000_000_007u64);
        let state = BarrettState::build(&settings(), &modulus).unwrap();
        let x = BigUint::from(999_999_999u64);
        assert_eq!(reduce_value(&state, &x), x);
        assert_eq!(reduce_value(&state, &BigUint::zero()), BigUint::zero());
    }

    #[test]
    fn reduces_exact_multiples_to_zero() {
        let modulus = BigUint::from(1_000_000_007u64);
        let state = BarrettState::build(&settings(), &modulus).unwrap();
        let x = &modulus * &modulus - 1u32 * &modulus;
        assert_eq!(reduce_value(&state, &x), BigUint::zero());
    }
}
