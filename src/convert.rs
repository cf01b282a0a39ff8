//! Conversions between big integers and transform-domain values.

use std::sync::Arc;

use num_bigint::{BigInt, BigUint};
use num_integer::Integer;
use num_traits::{ToPrimitive, Zero};

use crate::{
    context::{Context, ModKind},
    residue::{FftState, Residue},
    shape::TransformKind,
    Error, Options,
};

impl Context {
    // ============================================================
    // giant → value

    /// Converts a big integer into a value.
    pub fn from_giant(&mut self, x: &BigUint) -> Result<Residue, Error> {
        let setup = Arc::clone(self.setup_ref()?);
        let mut value = self.alloc()?;

        match &setup.kind {
            ModKind::Mmgw(state) => {
                let reduced = x.mod_floor(&setup.modulus);
                state.to_mont(&reduced, value.spectrum_mut());
            }
            ModKind::Barrett(_) => {
                let reduced = x.mod_floor(&setup.modulus);
                write_digits(&setup.tables, &reduced, value.spectrum_mut());
                let n = setup.shape.fft_len;
                rebalance_with_wrap(&setup, &mut value.spectrum_mut()[..n]);
            }
            ModKind::Special => {
                let reduced = x.mod_floor(&setup.modulus);
                write_digits(&setup.tables, &reduced, value.spectrum_mut());
                let n = setup.shape.fft_len;
                rebalance_with_wrap(&setup, &mut value.spectrum_mut()[..n]);
            }
            ModKind::Raw => {
                write_digits(&setup.tables, x, value.spectrum_mut());
                let n = setup.shape.fft_len;
                rebalance_with_wrap(&setup, &mut value.spectrum_mut()[..n]);
            }
        }
        Ok(value)
    }

    /// Converts a small unsigned integer into a value.
    pub fn from_u64(&mut self, x: u64) -> Result<Residue, Error> {
        self.from_giant(&BigUint::from(x))
    }

    /// Converts a small signed integer into a value.
    pub fn from_i64(&mut self, x: i64) -> Result<Residue, Error> {
        let mut value = self.alloc()?;
        self.smalladd(x, &mut value)?;
        Ok(value)
    }

    /// Converts an integral double into a value.
    pub fn from_double(&mut self, x: f64) -> Result<Residue, Error> {
        debug_assert_eq!(x.fract(), 0.0);
        self.from_i64(x as i64)
    }

    // ============================================================
    // value → giant

    /// Converts a value back to a big integer in `[0, N)`.
    ///
    /// Returns [`Error::BadFftData`] if any word is non-finite.
    pub fn to_giant(&mut self, value: &Residue) -> Result<BigUint, Error> {
        let setup = Arc::clone(self.setup_ref()?);

        // Work on normalized digits; unfft a copy when needed.
        let mut scratch_holder: Option<Residue> = None;
        let digits_src: &Residue = if value.state() == FftState::NotFfted {
            value
        } else {
            let mut copy = self.alloc()?;
            let mut src = self.alloc()?;
            src.assign(value);
            self.unfft(&mut src, &mut copy, Options::NONE)?;
            scratch_holder = Some(copy);
            scratch_holder.as_ref().unwrap()
        };

        let n = setup.shape.fft_len;
        let digits = &digits_src.spectrum()[..n];

        // Mask the IEEE-754 exponent: NaN and ±inf have all ones.
        for (word, &d) in digits.iter().enumerate() {
            if d.to_bits() >> 52 & 0x7ff == 0x7ff {
                return Err(Error::BadFftData { word });
            }
        }

        let result = match &setup.kind {
            ModKind::Mmgw(state) => state.from_mont(digits).mod_floor(&setup.modulus),
            ModKind::Raw => {
                let v = digit_value(&setup.tables, digits);
                v.to_biguint().ok_or(Error::Internal { code: 110 })?
            }
            ModKind::Special | ModKind::Barrett(_) => {
                let v = digit_value(&setup.tables, digits);
                let m = BigInt::from(setup.modulus.clone());
                v.mod_floor(&m)
                    .to_biguint()
                    .expect("mod_floor is non-negative")
            }
        };
        drop(scratch_holder);
        Ok(result)
    }

    /// Writes the value as little-endian 32-bit limbs, returning the
    /// number of limbs used.
    pub fn to_binary_u32_array(&mut self, value: &Residue, out: &mut [u32]) -> Result<usize, Error> {
        let giant = self.to_giant(value)?;
        let limbs = giant.to_u32_digits();
        if limbs.len() > out.len() {
            return Err(Error::Internal { code: 111 });
        }
        out[..limbs.len()].copy_from_slice(&limbs);
        for slot in out[limbs.len()..].iter_mut() {
            *slot = 0;
        }
        Ok(limbs.len())
    }

    /// Writes the value as little-endian 64-bit limbs, returning the
    /// number of limbs used.
    pub fn to_binary_u64_array(&mut self, value: &Residue, out: &mut [u64]) -> Result<usize, Error> {
        let giant = self.to_giant(value)?;
        let limbs: Vec<u64> = giant.iter_u64_digits().collect();
        if limbs.len() > out.len() {
            return Err(Error::Internal { code: 111 });
        }
        out[..limbs.len()].copy_from_slice(&limbs);
        for slot in out[limbs.len()..].iter_mut() {
            *slot = 0;
        }
        Ok(limbs.len())
    }

    /// Best-effort zero test: converts and compares. Not a cheap
    /// predicate.
    pub fn is_zero(&mut self, value: &Residue) -> Result<bool, Error> {
        Ok(self.to_giant(value)?.is_zero())
    }
}

// ======================================================================
// FUNCTIONS - PRIVATE

/// Splits a non-negative integer into this layout's per-word digits
/// (plain, then balanced without wraparound).
fn write_digits(tables: &crate::weights::WeightTables, x: &BigUint, buf: &mut [f64]) {
    let n = tables.fft_len;
    let mut rest = x.clone();
    for i in 0..n {
        if rest.is_zero() {
            buf[i] = 0.0;
            continue;
        }
        let base = BigUint::from(tables.word_base[i] as u64);
        let (q, r) = rest.div_rem(&base);
        buf[i] = r.to_f64().expect("digit fits a double");
        rest = q;
    }
    debug_assert!(rest.is_zero(), "value exceeds the digit layout");
    for slot in buf[n..].iter_mut() {
        *slot = 0.0;
    }
}

/// Balances plain digits. For direct shapes the top carry folds
/// through the modulus wrap; fixed-width shapes have the headroom to
/// absorb it outright.
fn rebalance_with_wrap(setup: &crate::context::Setup, buf: &mut [f64]) {
    let n = setup.shape.fft_len;
    let mut carry = 0.0;
    for i in 0..n {
        let total = buf[i] + carry;
        let base = setup.tables.word_base[i];
        let q = (total / base).round();
        buf[i] = total - q * base;
        carry = q;
    }
    if setup.shape.kind == TransformKind::ZeroPadded {
        debug_assert_eq!(carry, 0.0, "value exceeds the zero-padded layout");
    } else {
        setup
            .normalizer
            .absorb_wrapped_carry(buf, carry * setup.normalizer.wrap());
    }
}

/// The signed integer a digit vector holds.
fn digit_value(tables: &crate::weights::WeightTables, digits: &[f64]) -> BigInt {
    let mut v = BigInt::zero();
    for i in (0..tables.fft_len).rev() {
        v = v * BigInt::from(tables.word_base[i] as u64);
        v += BigInt::from(digits[i] as i64);
    }
    v
}

// ======================================================================
// TESTS

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{engine::EngineKind, Settings, VERSION};

    fn ctx(k: f64, b: u32, n: u64, c: i64) -> Context {
        let mut ctx = Context::init(
            VERSION,
            Settings {
                engine_override: Some(EngineKind::NoSimd),
                ..Settings::default()
            },
        );
        ctx.setup_special(k, b, n, c).unwrap();
        ctx
    }

    // ============================================================
    // round-trips

    #[test]
    fn giant_roundtrip_mersenne() {
        let mut ctx = ctx(1.0, 2, 127, -1);
        let m = (BigUint::from(1u32) << 127) - 1u32;

        for x in [
            BigUint::zero(),
            BigUint::from(1u32),
            BigUint::from(0xdead_beef_1234_5678u64),
            &m - 1u32,
            &m >> 1,
        ] {
            let value = ctx.from_giant(&x).unwrap();
            assert_eq!(ctx.to_giant(&value).unwrap(), x);
        }
    }

    #[test]
    fn giant_roundtrip_proth_zero_padded() {
        let mut ctx = ctx(3.0, 2, 65, 1);
        let m = BigUint::from(3u32) * (BigUint::from(1u32) << 65) + 1u32;

        for x in [
            BigUint::from(2u32),
            &m - 1u32,
            BigUint::from(98765432109876543u64),
        ] {
            let value = ctx.from_giant(&x).unwrap();
            assert_eq!(ctx.to_giant(&value).unwrap(), x);
        }
    }

    #[test]
    fn from_giant_reduces_oversized_input() {
        let mut ctx = ctx(1.0, 2, 127, -1);
        let m = (BigUint::from(1u32) << 127) - 1u32;
        let value = ctx.from_giant(&(&m + 5u32)).unwrap();
        assert_eq!(ctx.to_giant(&value).unwrap(), BigUint::from(5u32));
    }

    #[test]
    fn from_i64_wraps_negative() {
        let mut ctx = ctx(1.0, 2, 127, -1);
        let m = (BigUint::from(1u32) << 127) - 1u32;
        let value = ctx.from_i64(-7).unwrap();
        assert_eq!(ctx.to_giant(&value).unwrap(), &m - 7u32);
    }

    // ============================================================
    // binary export

    #[test]
    fn binary_arrays_match_giant() {
        let mut ctx = ctx(1.0, 2, 127, -1);
        let x = BigUint::from(0x0123_4567_89ab_cdefu64);
        let value = ctx.from_giant(&x).unwrap();

        let mut u32s = [0u32; 8];
        let used = ctx.to_binary_u32_array(&value, &mut u32s).unwrap();
        assert_eq!(used, 2);
        assert_eq!(u32s[0], 0x89ab_cdef);
        assert_eq!(u32s[1], 0x0123_4567);

        let mut u64s = [0u64; 4];
        let used = ctx.to_binary_u64_array(&value, &mut u64s).unwrap();
        assert_eq!(used, 1);
        assert_eq!(u64s[0], 0x0123_4567_89ab_cdefu64);
    }

    // ============================================================
    // bad data

    #[test]
    fn nan_word_is_bad_fft_data() {
        let mut ctx = ctx(1.0, 2, 127, -1);
        let mut value = ctx.from_u64(5).unwrap();
        value.digits_mut()[3] = f64::NAN;
        assert_eq!(ctx.to_giant(&value), Err(Error::BadFftData { word: 3 }));

        let mut value = ctx.from_u64(5).unwrap();
        value.digits_mut()[0] = f64::INFINITY;
        assert_eq!(ctx.to_giant(&value), Err(Error::BadFftData { word: 0 }));
    }

    // ============================================================
    // is_zero

    #[test]
    fn zero_test() {
        let mut ctx = ctx(1.0, 2, 127, -1);
        let zero = ctx.from_u64(0).unwrap();
        let one = ctx.from_u64(1).unwrap();
        assert!(ctx.is_zero(&zero).unwrap());
        assert!(!ctx.is_zero(&one).unwrap());

        // The modulus itself is zero.
        let m = (BigUint::from(1u32) << 127) - 1u32;
        let value = ctx.from_giant(&m).unwrap();
        assert!(ctx.is_zero(&value).unwrap());
    }
}
