//! Per-word transform weights and digit layout.
//!
//! A direct weighted transform distributes `n` base-`b` digits over
//! `fft_len` words: big words carry `⌈n/fft_len⌉` digits, little words
//! one digit less. Word `i` is scaled by the irrational weight
//! `b^(⌈n·i/N⌉ − n·i/N)` so that the cyclic (or negacyclic) convolution
//! of the weighted words is the modular product. When `n` is a multiple
//! of `fft_len` every weight is 1 and the weighted code path is bypassed
//! entirely (a rational transform).
//!
//! Zero-padded and generic shapes use a fixed digit width per word and
//! no weights; their fold back into the modulus happens in the carry
//! engine.

use std::sync::Arc;

use fixedbitset::FixedBitSet;

use crate::{
    engine::tables::{initialize_roots, initialize_twiddles, RootTable, Twiddles},
    shape::{Shape, TransformKind},
};

// ======================================================================
// WeightTables - CRATE

/// Everything word-indexed that a handle pre-computes at setup.
pub(crate) struct WeightTables {
    pub(crate) fft_len: usize,
    pub(crate) b: u32,

    /// Pass split: the transform runs as columns of length `n1`, then
    /// rows of length `n2`, with `n1 * n2 == fft_len`.
    pub(crate) n1: usize,
    pub(crate) n2: usize,

    /// `true` when every weight is 1 and weighting is bypassed.
    pub(crate) rational: bool,
    /// DWT weights; empty for rational shapes.
    pub(crate) weights: Vec<f64>,
    pub(crate) inv_weights: Vec<f64>,

    /// Words carrying `⌈n/N⌉` digits.
    pub(crate) big_word: FixedBitSet,
    /// Base-`b` digits carried by each word.
    pub(crate) digit_width: Vec<u32>,
    /// Starting digit position of each word.
    pub(crate) digit_pos: Vec<u64>,
    /// `b^digit_width[i]` as a double.
    pub(crate) word_base: Vec<f64>,
    pub(crate) inv_word_base: Vec<f64>,

    /// Negacyclic twist `e^(-iπ·j/N)` (first half of the order-`2N`
    /// root table).
    pub(crate) twist: Option<Arc<RootTable>>,
    /// Inter-pass twiddles, indexed by `r·c mod N`.
    pub(crate) step_roots: Arc<RootTable>,
    pub(crate) col_twiddles: Arc<Twiddles>,
    pub(crate) row_twiddles: Arc<Twiddles>,
}

impl WeightTables {
    /// Builds the tables for a chosen shape over base `b` with `n`
    /// payload digits (ignored for fixed-width shapes).
    pub(crate) fn new(shape: &Shape, b: u32, n: u64) -> Self {
        let fft_len = shape.fft_len;
        let n1 = 1usize << (fft_len.trailing_zeros() / 2);
        let n2 = fft_len / n1;

        let (rational, weights, inv_weights, big_word, digit_width, digit_pos) =
            if shape.digits_per_word > 0 {
                Self::fixed_layout(fft_len, shape.digits_per_word)
            } else {
                Self::variable_layout(fft_len, b, n)
            };

        let log2_b = (b as f64).log2();
        let word_base: Vec<f64> = digit_width
            .iter()
            .map(|&w| (w as f64 * log2_b).exp2())
            .collect();
        let inv_word_base: Vec<f64> = word_base.iter().map(|&x| 1.0 / x).collect();

        let twist = if shape.kind == TransformKind::Negacyclic {
            Some(initialize_roots(2 * fft_len))
        } else {
            None
        };

        Self {
            fft_len,
            b,
            n1,
            n2,
            rational,
            weights,
            inv_weights,
            big_word,
            digit_width,
            digit_pos,
            word_base,
            inv_word_base,
            twist,
            step_roots: initialize_roots(fft_len),
            col_twiddles: initialize_twiddles(n1),
            row_twiddles: initialize_twiddles(n2),
        }
    }

    /// Fixed layout: every word carries the same number of digits.
    fn fixed_layout(
        fft_len: usize,
        digits_per_word: u32,
    ) -> (bool, Vec<f64>, Vec<f64>, FixedBitSet, Vec<u32>, Vec<u64>) {
        let digit_width = vec![digits_per_word; fft_len];
        let digit_pos = (0..fft_len as u64)
            .map(|i| i * digits_per_word as u64)
            .collect();
        let mut big_word = FixedBitSet::with_capacity(fft_len);
        big_word.insert_range(..);
        (true, Vec::new(), Vec::new(), big_word, digit_width, digit_pos)
    }

    /// Variable layout: `n` digits spread over `fft_len` words with
    /// irrational per-word weights.
    fn variable_layout(
        fft_len: usize,
        b: u32,
        n: u64,
    ) -> (bool, Vec<f64>, Vec<f64>, FixedBitSet, Vec<u32>, Vec<u64>) {
        let big_width = n.div_ceil(fft_len as u64) as u32;
        let log2_b = (b as f64).log2();

        let mut digit_width = Vec::with_capacity(fft_len);
        let mut digit_pos = Vec::with_capacity(fft_len);
        let mut big_word = FixedBitSet::with_capacity(fft_len);

        for i in 0..fft_len as u64 {
            let lo = (n as u128 * i as u128).div_ceil(fft_len as u128) as u64;
            let hi = (n as u128 * (i + 1) as u128).div_ceil(fft_len as u128) as u64;
            let width = (hi - lo) as u32;
            digit_pos.push(lo);
            digit_width.push(width);
            big_word.set(i as usize, width == big_width);
        }

        let rational = n % fft_len as u64 == 0;
        let (weights, inv_weights) = if rational {
            (Vec::new(), Vec::new())
        } else {
            let mut weights = Vec::with_capacity(fft_len);
            let mut inv_weights = Vec::with_capacity(fft_len);
            for i in 0..fft_len as u128 {
                // Exponent numerator of ⌈n·i/N⌉ − n·i/N, over N.
                let num = (n as u128 * i).div_ceil(fft_len as u128) * fft_len as u128
                    - n as u128 * i;
                let e = num as f64 / fft_len as f64;
                weights.push((e * log2_b).exp2());
                inv_weights.push((-e * log2_b).exp2());
            }
            (weights, inv_weights)
        };

        (rational, weights, inv_weights, big_word, digit_width, digit_pos)
    }

    /// Total digit capacity of the layout.
    pub(crate) fn total_digits(&self) -> u64 {
        self.digit_pos[self.fft_len - 1] + self.digit_width[self.fft_len - 1] as u64
    }
}

// ======================================================================
// TESTS

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineKind;

    fn direct_shape(fft_len: usize, kind: TransformKind) -> Shape {
        Shape {
            fft_len,
            kind,
            engine: EngineKind::NoSimd,
            digits_per_word: 0,
        }
    }

    #[test]
    fn variable_layout_covers_all_digits() {
        let tables = WeightTables::new(&direct_shape(64, TransformKind::Cyclic), 2, 127);
        assert_eq!(tables.total_digits(), 127);
        assert_eq!(
            tables.digit_width.iter().map(|&w| w as u64).sum::<u64>(),
            127
        );
        // 127 over 64 words: widths 1 or 2.
        assert!(tables.digit_width.iter().all(|&w| w == 1 || w == 2));
        assert!(!tables.rational);
        assert_eq!(tables.weights.len(), 64);
    }

    #[test]
    fn weights_are_inverse_pairs_in_unit_range() {
        let tables = WeightTables::new(&direct_shape(64, TransformKind::Cyclic), 2, 127);
        for i in 0..64 {
            let prod = tables.weights[i] * tables.inv_weights[i];
            assert!((prod - 1.0).abs() < 1e-12);
            assert!(tables.weights[i] >= 1.0 && tables.weights[i] < 2.0);
        }
        assert_eq!(tables.weights[0], 1.0);
    }

    #[test]
    fn rational_when_n_divides_evenly() {
        let tables = WeightTables::new(&direct_shape(64, TransformKind::Cyclic), 2, 128);
        assert!(tables.rational);
        assert!(tables.weights.is_empty());
        assert_eq!(tables.big_word.count_ones(..), 64);
    }

    #[test]
    fn fixed_layout_is_rational() {
        let shape = Shape {
            fft_len: 64,
            kind: TransformKind::ZeroPadded,
            engine: EngineKind::NoSimd,
            digits_per_word: 16,
        };
        let tables = WeightTables::new(&shape, 2, 0);
        assert!(tables.rational);
        assert_eq!(tables.total_digits(), 64 * 16);
        assert!(tables.word_base.iter().all(|&x| x == 65536.0));
    }

    #[test]
    fn negacyclic_gets_twist_table() {
        let tables = WeightTables::new(&direct_shape(64, TransformKind::Negacyclic), 2, 128);
        let twist = tables.twist.as_ref().unwrap();
        assert_eq!(twist.n, 128);
        // e^(-iπ/2) at j = N/2.
        let (re, im) = twist.get(64);
        assert!(re.abs() < 1e-15 && (im + 1.0).abs() < 1e-15);
    }

    #[test]
    fn pass_split_multiplies_out() {
        let tables = WeightTables::new(&direct_shape(128, TransformKind::Cyclic), 2, 1279);
        assert_eq!(tables.n1 * tables.n2, 128);
        assert!(tables.n1 <= tables.n2);
    }
}
