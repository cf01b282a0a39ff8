//! Montgomery–McLaughlin–Gallot–Woltman reduction: a dual-transform
//! Montgomery multiplication using `R = 2^m − 1` (cyclic image) and
//! `Q = 2^m + 1` (negacyclic image) over the same physical layout.
//!
//! A value is held as the balanced digit vector of one small integer
//! `u` (`|u| < N'`); both transform images are taken from that vector
//! during a multiplication. Reduction:
//!
//! ```text
//! h  ≡ T·Np            (mod R)     Np = −N'⁻¹ mod R
//! u  = (T + h·N') / R             exact integer division
//!    ≡ (T_Q + h·N'_Q)·2^(m−1)  (mod Q)     since R ≡ −2 (mod Q)
//! ```
//!
//! and `u` is recovered exactly from its Q image because `|u| < Q/2`.
//! The working modulus is `N·400000009` to avoid pathological bit
//! patterns; conversions reduce mod `N` at the end.

use std::sync::Arc;

use num_bigint::{BigInt, BigUint};
use num_integer::Integer;
use num_traits::{One, Zero};
use tracing::debug;

use crate::{
    carry::{NormParams, Normalizer},
    reduce::{digits, MMGW_PAD_PRIME},
    shape::{self, Shape, TransformKind},
    transform::Transformer,
    weights::WeightTables,
    Error, Settings,
};

// Internal error codes surfaced when MMGW cannot be set up and the
// caller should fall back to Barrett.
const CODE_EVEN_MODULUS: u32 = 101;
const CODE_NO_COPRIME_R: u32 = 102;
const CODE_NO_INVERSE: u32 = 103;

// ======================================================================
// MmgwState - CRATE

/// Cached state of an MMGW-reduced handle.
pub(crate) struct MmgwState {
    pub(crate) cyclic_shape: Shape,
    pub(crate) cyclic_tables: Arc<WeightTables>,
    cyc_transformer: Transformer,
    cyc_normalizer: Normalizer,
    neg_transformer: Transformer,
    neg_normalizer: Normalizer,
    /// `R = 2^m − 1`, `Q = 2^m + 1`.
    m: u64,
    /// Uniform digit width (`m / fft_len`).
    w: u32,
    /// Working modulus `N·400000009`.
    pub(crate) nprime: BigUint,
    /// Cyclic spectrum of `−N'⁻¹ mod R`.
    np_spec: Vec<f64>,
    /// Negacyclic spectrum of `N' mod Q`.
    nq_spec: Vec<f64>,
    /// Negacyclic spectrum of `2^(m−1)` (`≡ −2⁻¹ mod Q`).
    c2_spec: Vec<f64>,
    /// Digits of `R² mod N'`, the conversion-in constant.
    r2_digits: Vec<f64>,
    /// Digits of 1, the conversion-out constant.
    one_digits: Vec<f64>,
}

impl std::fmt::Debug for MmgwState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MmgwState").finish()
    }
}

impl MmgwState {
    pub(crate) fn build(settings: &Settings, modulus: &BigUint) -> Result<Self, Error> {
        if modulus.is_even() {
            return Err(Error::Internal {
                code: CODE_EVEN_MODULUS,
            });
        }

        let nprime = modulus * BigUint::from(MMGW_PAD_PRIME);
        let bits = nprime.bits();

        // R must be comfortably larger than N' so that lazily-reduced
        // intermediates stay below Q/2, and coprime to N'.
        let mut m = shape::select_mmgw_exponent(settings, bits + 12)?;
        let mut tries = 0;
        let r = loop {
            let r = (BigUint::one() << m) - 1u32;
            if nprime.gcd(&r).is_one() {
                break r;
            }
            tries += 1;
            if tries > 16 {
                return Err(Error::Internal {
                    code: CODE_NO_COPRIME_R,
                });
            }
            m = shape::select_mmgw_exponent(settings, m + 1)?;
        };
        let q = (BigUint::one() << m) + 1u32;

        let cyclic_shape = shape::select_direct(settings, 2, m, -1)?;
        let neg_shape = shape::select_direct(settings, 2, m, 1)?;
        debug_assert_eq!(cyclic_shape.fft_len, neg_shape.fft_len);
        let fft_len = cyclic_shape.fft_len;
        let w = (m / fft_len as u64) as u32;

        let cyclic_tables = Arc::new(WeightTables::new(&cyclic_shape, 2, m));
        let neg_tables = Arc::new(WeightTables::new(&neg_shape, 2, m));

        let cyc_engine = Arc::from(cyclic_shape.engine.instantiate());
        let neg_engine = Arc::from(neg_shape.engine.instantiate());
        let cyc_transformer = Transformer::new(Arc::clone(&cyclic_tables), cyc_engine);
        let neg_transformer = Transformer::new(Arc::clone(&neg_tables), neg_engine);
        let cyc_normalizer = Normalizer::new(Arc::clone(&cyclic_tables), TransformKind::Cyclic, None);
        let neg_normalizer =
            Normalizer::new(Arc::clone(&neg_tables), TransformKind::Negacyclic, None);

        // Np = −N'⁻¹ mod R.
        let np = {
            let egcd = BigInt::from(nprime.clone()).extended_gcd(&BigInt::from(r.clone()));
            if !egcd.gcd.is_one() {
                return Err(Error::Internal {
                    code: CODE_NO_INVERSE,
                });
            }
            let inv = egcd.x.mod_floor(&BigInt::from(r.clone()));
            (BigInt::from(r.clone()) - inv).mod_floor(&BigInt::from(r.clone()))
        };
        let np = np.to_biguint().expect("non-negative by construction");

        let np_digits = centered_digits(&np, &r, fft_len, w);
        let np_spec = spectrum_of(&cyc_transformer, &np_digits);

        let nq = nprime.mod_floor(&q);
        let nq_digits = centered_digits(&nq, &q, fft_len, w);
        let nq_spec = spectrum_of(&neg_transformer, &nq_digits);

        // 2^(m−1) is a single digit; no centering needed.
        let mut c2_digits = vec![0.0; fft_len];
        c2_digits[((m - 1) / w as u64) as usize] = ((1u64) << ((m - 1) % w as u64)) as f64;
        let c2_spec = spectrum_of(&neg_transformer, &c2_digits);

        let r2 = (&r * &r).mod_floor(&nprime);
        let r2_digits = crate::reduce::biguint_to_balanced(&r2, fft_len, w);

        let mut one_digits = vec![0.0; fft_len];
        one_digits[0] = 1.0;

        debug!(m, fft_len, "MMGW state built");

        Ok(Self {
            cyclic_shape,
            cyclic_tables,
            cyc_transformer,
            cyc_normalizer,
            neg_transformer,
            neg_normalizer,
            m,
            w,
            nprime,
            np_spec,
            nq_spec,
            c2_spec,
            r2_digits,
            one_digits,
        })
    }

    fn fft_len(&self) -> usize {
        self.cyclic_shape.fft_len
    }

    // ============================================================
    // transform plumbing

    fn forward(&self, transformer: &Transformer, digits: &[f64]) -> Vec<f64> {
        let n = self.fft_len();
        let mut buf = vec![0.0; 2 * n];
        buf[..n].copy_from_slice(digits);
        let mut scratch = vec![0.0; transformer.scratch_len()];
        transformer.prepare(&mut buf);
        transformer.forward_full(&mut buf, &mut scratch);
        buf
    }

    fn inverse(&self, transformer: &Transformer, normalizer: &Normalizer, buf: &mut [f64]) {
        let mut scratch = vec![0.0; transformer.scratch_len()];
        transformer.inverse_full(buf, &mut scratch);
        let n = self.fft_len();
        normalizer.normalize_direct(&mut buf[..n], &NormParams::default());
    }

    // ============================================================
    // multiplication

    /// `out = a·b·R⁻¹ mod N'` on digit vectors (Montgomery product).
    pub(crate) fn mont_mul(&self, a: &[f64], b: Option<&[f64]>, out: &mut [f64]) {
        let n = self.fft_len();

        // Cyclic images: T mod R, then h = T·Np mod R.
        let fa_c = self.forward(&self.cyc_transformer, a);
        let mut t_r = match b {
            Some(b) => {
                let fb_c = self.forward(&self.cyc_transformer, b);
                let mut t = fa_c;
                self.cyc_transformer.engine.cmul(&mut t, &fb_c);
                t
            }
            None => {
                let mut t = fa_c;
                self.cyc_transformer.engine.csquare(&mut t);
                t
            }
        };
        self.inverse(&self.cyc_transformer, &self.cyc_normalizer, &mut t_r);

        let mut h = self.forward(&self.cyc_transformer, &t_r[..n]);
        self.cyc_transformer.engine.cmul(&mut h, &self.np_spec);
        self.inverse(&self.cyc_transformer, &self.cyc_normalizer, &mut h);
        let h_digits = h[..n].to_vec();

        // Negacyclic images: v = T + h·N' (mod Q).
        let fa_q = self.forward(&self.neg_transformer, a);
        let mut v = match b {
            Some(b) => {
                let fb_q = self.forward(&self.neg_transformer, b);
                let mut v = fa_q;
                self.neg_transformer.engine.cmul(&mut v, &fb_q);
                v
            }
            None => {
                let mut v = fa_q;
                self.neg_transformer.engine.csquare(&mut v);
                v
            }
        };
        let fh_q = self.forward(&self.neg_transformer, &h_digits);
        self.neg_transformer
            .engine
            .cmul_add(&mut v, &fh_q, &self.nq_spec);
        self.inverse(&self.neg_transformer, &self.neg_normalizer, &mut v);

        // u ≡ v·2^(m−1) (mod Q), and |u| < Q/2 makes it exact.
        let mut u = self.forward(&self.neg_transformer, &v[..n]);
        self.neg_transformer.engine.cmul(&mut u, &self.c2_spec);
        self.inverse(&self.neg_transformer, &self.neg_normalizer, &mut u);

        self.recover_exact(&mut u[..n]);
        out[..n].copy_from_slice(&u[..n]);
        for slot in out[n..].iter_mut() {
            *slot = 0.0;
        }
    }

    /// Replaces a lazily-reduced Q image with the centered exact
    /// integer it determines.
    fn recover_exact(&self, buf: &mut [f64]) {
        let n = self.fft_len();
        let (words, negative) = digits::canonical_abs(&buf[..n], self.w);

        let half = 1u64 << (self.w - 1);
        if words[n - 1] < half {
            // Small magnitude: the integer is ±W.
            digits::write_balanced(&words, negative, &mut buf[..n], self.w);
        } else {
            // Top zone: the integer is ∓(Q − W); Q − W is the digit
            // complement against 2^m − 1, plus two.
            let base_mask = (1u64 << self.w) - 1;
            let mut comp: Vec<u64> = words.iter().map(|&x| base_mask - x).collect();
            let mut carry = 2u64;
            for word in comp.iter_mut() {
                let cur = *word + carry;
                *word = cur & base_mask;
                carry = cur >> self.w;
                if carry == 0 {
                    break;
                }
            }
            debug_assert_eq!(carry, 0);
            digits::write_balanced(&comp, !negative, &mut buf[..n], self.w);
        }
    }

    // ============================================================
    // digit-domain service ops

    /// The (signed) integer a digit vector holds.
    fn digits_to_bigint(&self, digits: &[f64]) -> BigInt {
        let base = BigInt::from(1u64 << self.w);
        let mut v = BigInt::zero();
        for i in (0..digits.len()).rev() {
            v = v * &base + BigInt::from(digits[i] as i64);
        }
        v
    }

    fn write_bigint(&self, v: &BigInt, buf: &mut [f64]) {
        let n = self.fft_len();
        let nprime = BigInt::from(self.nprime.clone());
        let v = v.mod_floor(&nprime).to_biguint().expect("mod_floor is non-negative");
        let digits = crate::reduce::biguint_to_balanced(&v, n, self.w);
        buf[..n].copy_from_slice(&digits);
        for slot in buf[n..].iter_mut() {
            *slot = 0.0;
        }
    }

    /// Reduces an over-grown lazy value back below `N'`, preserving
    /// the Montgomery image.
    pub(crate) fn canonicalize(&self, buf: &mut [f64]) {
        let n = self.fft_len();
        let v = self.digits_to_bigint(&buf[..n]);
        self.write_bigint(&v, buf);
    }

    /// Adds a small integer to a Montgomery-form value: the addend
    /// enters scaled by `R`.
    pub(crate) fn smalladd(&self, addend: i64, buf: &mut [f64]) {
        let n = self.fft_len();
        let r = (BigInt::one() << self.m) - 1;
        let v = self.digits_to_bigint(&buf[..n]) + BigInt::from(addend) * r;
        self.write_bigint(&v, buf);
    }

    /// Multiplies a Montgomery-form value by a small integer constant.
    pub(crate) fn smallmul(&self, multiplier: f64, buf: &mut [f64]) {
        let n = self.fft_len();
        let v = self.digits_to_bigint(&buf[..n]) * BigInt::from(multiplier as i64);
        self.write_bigint(&v, buf);
    }

    // ============================================================
    // conversions

    /// Converts an integer `x < N` into Montgomery form digits.
    pub(crate) fn to_mont(&self, x: &BigUint, out: &mut [f64]) {
        let n = self.fft_len();
        let x_digits = crate::reduce::biguint_to_balanced(x, n, self.w);
        let mut tmp = vec![0.0; 2 * n];
        tmp[..n].copy_from_slice(&x_digits);
        let mut result = vec![0.0; 2 * n];
        self.mont_mul(&tmp[..n], Some(&self.r2_digits), &mut result);
        out.copy_from_slice(&result[..out.len()]);
    }

    /// Converts Montgomery form digits back to an integer mod `N'`.
    pub(crate) fn from_mont(&self, digits_in: &[f64]) -> BigUint {
        let n = self.fft_len();
        let mut result = vec![0.0; 2 * n];
        self.mont_mul(&digits_in[..n], Some(&self.one_digits), &mut result);

        // The exact integer may be negative or slightly above N'.
        let v = self.digits_to_bigint(&result[..n]);
        let nprime = BigInt::from(self.nprime.clone());
        v.mod_floor(&nprime).to_biguint().expect("mod_floor is non-negative")
    }
}

// ======================================================================
// FUNCTIONS - PRIVATE

/// Digits of the centered representative of `x` mod `modulus` (the
/// representative in `[−modulus/2, modulus/2]`). The exact half-way
/// value keeps its plain unbalanced digits.
fn centered_digits(x: &BigUint, modulus: &BigUint, fft_len: usize, w: u32) -> Vec<f64> {
    let (value, negate) = if x * 2u32 <= *modulus {
        (x.clone(), false)
    } else {
        (modulus - x, true)
    };

    let words = digits::from_biguint(&value, fft_len, w);
    let mut out = vec![0.0; fft_len];
    let carry = digits::write_balanced_carry(&words, negate, &mut out, w);
    if carry != 0 {
        // Exactly half the capacity: plain digits still fit a word.
        for (slot, &word) in out.iter_mut().zip(&words) {
            *slot = if negate { -(word as f64) } else { word as f64 };
        }
    }
    out
}

fn spectrum_of(transformer: &Transformer, digits_in: &[f64]) -> Vec<f64> {
    let n = digits_in.len();
    let mut buf = vec![0.0; 2 * n];
    buf[..n].copy_from_slice(digits_in);
    let mut scratch = vec![0.0; transformer.scratch_len()];
    transformer.prepare(&mut buf);
    transformer.forward_full(&mut buf, &mut scratch);
    buf
}

// ======================================================================
// TESTS

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineKind;

    fn settings() -> Settings {
        Settings {
            engine_override: Some(EngineKind::NoSimd),
            ..Settings::default()
        }
    }

    fn state_for(modulus: &BigUint) -> MmgwState {
        MmgwState::build(&settings(), modulus).unwrap()
    }

    #[test]
    fn even_modulus_is_rejected() {
        let err = MmgwState::build(&settings(), &BigUint::from(1000u32)).unwrap_err();
        assert_eq!(
            err,
            Error::Internal {
                code: CODE_EVEN_MODULUS
            }
        );
    }

    #[test]
    fn montgomery_roundtrip_is_identity() {
        let modulus = BigUint::parse_bytes(b"100000000000000000039", 10).unwrap();
        let state = state_for(&modulus);
        let n = state.fft_len();

        for value in [0u64, 1, 2, 12345678901234567] {
            let x = BigUint::from(value);
            let mut mont = vec![0.0; 2 * n];
            state.to_mont(&x, &mut mont);
            assert_eq!(state.from_mont(&mont) % &modulus, x % &modulus);
        }
    }

    #[test]
    fn products_match_reference() {
        let modulus = BigUint::parse_bytes(b"100000000000000000039", 10).unwrap();
        let state = state_for(&modulus);
        let n = state.fft_len();

        let a = BigUint::parse_bytes(b"99999999999999999999", 10).unwrap();
        let b = BigUint::parse_bytes(b"12345678901234567890", 10).unwrap();

        let mut ma = vec![0.0; 2 * n];
        let mut mb = vec![0.0; 2 * n];
        state.to_mont(&a, &mut ma);
        state.to_mont(&b, &mut mb);

        let mut mc = vec![0.0; 2 * n];
        state.mont_mul(&ma[..n], Some(&mb[..n]), &mut mc);

        assert_eq!(state.from_mont(&mc) % &modulus, (&a * &b) % &modulus);
    }

    #[test]
    fn squares_match_reference() {
        let modulus = BigUint::parse_bytes(b"100000000000000000039", 10).unwrap();
        let state = state_for(&modulus);
        let n = state.fft_len();

        let a = BigUint::parse_bytes(b"31415926535897932384", 10).unwrap();
        let mut ma = vec![0.0; 2 * n];
        state.to_mont(&a, &mut ma);

        let mut mc = vec![0.0; 2 * n];
        state.mont_mul(&ma[..n], None, &mut mc);

        assert_eq!(state.from_mont(&mc) % &modulus, (&a * &a) % &modulus);
    }
}
