//! Carry propagation and normalization after an inverse transform.
//!
//! The inverse transform leaves each word holding an (almost) integer
//! convolution sum. Normalization multiplies by the inverse weight,
//! rounds, tracks the roundoff statistic, folds in the optional
//! mul-by-const and add-in values, and propagates carries so that every
//! word ends up balanced in `[−base/2, base/2)`.
//!
//! For direct weighted shapes the wraparound carry out of the top word
//! re-enters at word 0 multiplied by `−c` (`b^n ≡ −c` for `k = 1`,
//! `|c| = 1`). For zero-padded shapes the high half of the product is
//! explicit and is folded by the exact top-word adjustment: with
//! `H = q·k + r`, the value `H·b^n + L` becomes `L − c·q + r·b^n`,
//! the remainder `r < k` staying in the top words.

use std::sync::Arc;

use crate::{shape::TransformKind, weights::WeightTables};

// ======================================================================
// CONST - PRIVATE

// Adding and subtracting 3·2^51 rounds a double of magnitude below
// 2^51 to the nearest integer.
const ROUND_CONST: f64 = 3.0 * (1u64 << 51) as f64;

// ======================================================================
// NormParams - CRATE

/// Per-operation normalization options.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct NormParams {
    /// Multiply every word by this constant during normalization.
    pub(crate) mul_by_const: Option<f64>,
    /// Added at the given word before the mul-by-const.
    pub(crate) pre_addin: Option<(usize, f64)>,
    /// Added at the given word after the mul-by-const.
    pub(crate) post_addin: Option<(usize, f64)>,
}

// ======================================================================
// FoldParams - CRATE

/// Modulus fold of a special-form zero-padded shape.
#[derive(Clone, Copy, Debug)]
pub(crate) struct FoldParams {
    pub(crate) k: u64,
    pub(crate) c: i64,
    /// `n`, in base-`b` digits.
    pub(crate) n_digits: u64,
}

// ======================================================================
// Normalizer - CRATE

/// Carry/normalize engine bound to one handle's tables.
pub(crate) struct Normalizer {
    tables: Arc<WeightTables>,
    kind: TransformKind,
    /// Wraparound multiplier of direct shapes (`−c`).
    wrap: f64,
    /// Fold parameters of special-form zero-padded shapes; `None` for
    /// the plain multiplier used by the general reducers.
    fold: Option<FoldParams>,
}

impl Normalizer {
    pub(crate) fn new(
        tables: Arc<WeightTables>,
        kind: TransformKind,
        fold: Option<FoldParams>,
    ) -> Self {
        let wrap = match kind {
            TransformKind::Cyclic => 1.0,
            TransformKind::Negacyclic => -1.0,
            TransformKind::ZeroPadded => 0.0,
        };
        Self {
            tables,
            kind,
            wrap,
            fold,
        }
    }

    pub(crate) fn fft_len(&self) -> usize {
        self.tables.fft_len
    }

    /// Wraparound multiplier applied when a carry passes the top word.
    pub(crate) fn wrap(&self) -> f64 {
        self.wrap
    }

    /// How many words a section carry is expected to spread over.
    /// Used by the scheduler for section sizing.
    pub(crate) fn carry_spread(&self) -> usize {
        let little_bits = self.tables.digit_width.iter().copied().min().unwrap_or(1) as f64
            * (self.tables.b as f64).log2();
        if self.kind == TransformKind::ZeroPadded && self.tables.fft_len >= 1 << 16 {
            8
        } else if little_bits < 8.0 {
            6
        } else {
            4
        }
    }

    // ============================================================
    // helpers

    /// Rounds to nearest with the big-value trick, tracking roundoff.
    #[inline(always)]
    fn round_tracked(v: f64, maxerr: &mut f64) -> f64 {
        let rounded = (v + ROUND_CONST) - ROUND_CONST;
        let err = (v - rounded).abs();
        if err > *maxerr {
            *maxerr = err;
        }
        rounded
    }

    #[inline(always)]
    fn apply_addins(vi: f64, i: usize, params: &NormParams) -> f64 {
        let mut v = vi;
        if let Some((word, value)) = params.pre_addin {
            if word == i {
                v += value;
            }
        }
        if let Some(mc) = params.mul_by_const {
            v *= mc;
        }
        if let Some((word, value)) = params.post_addin {
            if word == i {
                v += value;
            }
        }
        v
    }

    // ============================================================
    // direct shapes

    /// Normalizes one word range of a direct weighted shape, starting
    /// with carry 0. Returns `(carry_out, maxerr)` for the range.
    pub(crate) fn normalize_range(
        &self,
        buf: &mut [f64],
        range: std::ops::Range<usize>,
        params: &NormParams,
    ) -> (f64, f64) {
        debug_assert_ne!(self.kind, TransformKind::ZeroPadded);
        let mut maxerr = 0.0;

        let mut carry = 0.0;
        for i in range {
            let raw = if self.tables.rational {
                buf[i]
            } else {
                buf[i] * self.tables.inv_weights[i]
            };
            let vi = Self::round_tracked(raw, &mut maxerr);
            let total = Self::apply_addins(vi, i, params) + carry;

            let base = self.tables.word_base[i];
            let q = (total * self.tables.inv_word_base[i]).round();
            buf[i] = total - q * base;
            carry = q;
        }

        (carry, maxerr)
    }

    /// Adds a section carry at word `start` and propagates it towards
    /// `end`. Returns whatever carry escapes past `end`.
    pub(crate) fn absorb_from(
        &self,
        buf: &mut [f64],
        start: usize,
        end: usize,
        carry: f64,
    ) -> f64 {
        let mut carry = carry;
        let mut i = start;
        while carry != 0.0 && i < end {
            let total = buf[i] + carry;
            let base = self.tables.word_base[i];
            let q = (total * self.tables.inv_word_base[i]).round();
            buf[i] = total - q * base;
            carry = q;
            i += 1;
        }
        carry
    }

    /// Normalizes the digit words of a direct weighted shape in place,
    /// including the wraparound carry. Returns the observed roundoff
    /// maximum.
    pub(crate) fn normalize_direct(&self, buf: &mut [f64], params: &NormParams) -> f64 {
        let n = self.tables.fft_len;
        let (carry, maxerr) = self.normalize_range(buf, 0..n, params);
        self.absorb_wrapped_carry(buf, carry * self.wrap);
        maxerr
    }

    /// Feeds a wrapped carry back in at word 0 until absorbed.
    pub(crate) fn absorb_wrapped_carry(&self, buf: &mut [f64], carry: f64) {
        let n = self.tables.fft_len;
        let mut carry = carry;
        let mut i = 0;
        let mut guard = 0;
        while carry != 0.0 {
            let total = buf[i] + carry;
            let base = self.tables.word_base[i];
            let q = (total * self.tables.inv_word_base[i]).round();
            buf[i] = total - q * base;
            carry = q;
            i += 1;
            if i == n {
                carry *= self.wrap;
                i = 0;
            }
            guard += 1;
            if guard > 2 * n {
                debug_assert!(false, "unconverged wraparound carry");
                break;
            }
        }
    }

    // ============================================================
    // zero-padded shapes

    /// Normalizes a zero-padded product and folds it back under
    /// `k·b^n + c`. `acc` is reusable scratch. Returns the roundoff
    /// maximum.
    pub(crate) fn normalize_zero_padded(
        &self,
        buf: &mut [f64],
        acc: &mut Vec<i128>,
        params: &NormParams,
    ) -> f64 {
        debug_assert_eq!(self.kind, TransformKind::ZeroPadded);
        let n = self.tables.fft_len;
        let mut maxerr = 0.0;

        acc.clear();
        acc.resize(n, 0);
        for i in 0..n {
            let vi = Self::round_tracked(buf[i], &mut maxerr);
            acc[i] = Self::apply_addins(vi, i, params) as i128;
        }

        self.rebalance(acc);
        if let Some(fold) = self.fold {
            self.fold_modulus(acc, &fold);
        }

        for i in 0..n {
            buf[i] = acc[i] as f64;
        }
        maxerr
    }

    /// Balanced carry pass over exact digits: every word ends in
    /// `[−base/2, base/2)`. The shape selector sized the transform so
    /// that nothing carries out of the top.
    fn rebalance(&self, acc: &mut [i128]) {
        let base = self.tables.word_base[0] as i128;
        let mut carry: i128 = 0;
        for slot in acc.iter_mut() {
            let cur = *slot + carry;
            let q = (cur + base / 2).div_euclid(base);
            *slot = cur - q * base;
            carry = q;
        }
        debug_assert_eq!(carry, 0, "zero-padded product exceeded capacity");
    }

    /// The top-word adjustment. Splits the value algebraically at
    /// `b^n`, short-divides the high part by `k` and folds
    /// `H·b^n + L  →  L − c·q + r·b^n`. Repeats until the quotient is
    /// exhausted; the remainder `r < k` stays in the top words.
    fn fold_modulus(&self, acc: &mut [i128], fold: &FoldParams) {
        let n = acc.len();
        let w = self.tables.digit_width[0] as u64;
        let b = self.tables.b as i128;
        let big_base = self.tables.word_base[0] as i128;
        let ns = (fold.n_digits / w) as usize;
        let off = (fold.n_digits % w) as u32;
        let b_off: i128 = b.pow(off);
        let b_rest: i128 = b.pow(w as u32 - off);
        let k = fold.k as i128;
        let neg_c = -(fold.c as i128);
        debug_assert!(ns < n);

        let mut guard = 0;
        loop {
            // Word ns splits at the b^n boundary: the low `off` digits
            // stay in L, the rest joins H.
            let split_lo = acc[ns].rem_euclid(b_off);
            let split_hi = acc[ns].div_euclid(b_off);

            // H realigned to base-B words: h[t] collects the high part
            // of word ns+t and the low digits of word ns+t+1.
            let m = n - ns;
            let mut high = vec![0i128; m];
            high[0] = split_hi;
            for t in 1..m {
                let word = acc[ns + t];
                high[t] = word.div_euclid(b_off);
                high[t - 1] += word.rem_euclid(b_off) * b_rest;
            }

            // Short division H = q·k + r, 0 <= r < k.
            let mut quot = vec![0i128; m];
            let mut rem: i128 = 0;
            for t in (0..m).rev() {
                let cur = rem * big_base + high[t];
                quot[t] = cur.div_euclid(k);
                rem = cur.rem_euclid(k);
            }

            if quot.iter().all(|&q| q == 0) {
                break;
            }

            // L − c·q + r·b^n.
            for slot in acc.iter_mut().skip(ns) {
                *slot = 0;
            }
            acc[ns] = split_lo + rem * b_off;
            for t in 0..m {
                acc[t] += neg_c * quot[t];
            }

            self.rebalance(acc);

            guard += 1;
            if guard > 64 {
                debug_assert!(false, "unconverged modulus fold");
                break;
            }
        }
    }
}

// ======================================================================
// TESTS
