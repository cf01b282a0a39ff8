//! Transform driver: the weighted forward and inverse transform
//! passes every operation is assembled from.
//!
//! A full transform runs as two passes over an `n1 × n2` matrix view of
//! the word vector (`n1 * n2 == fft_len`): pass 1 transforms columns
//! and applies the inter-pass twiddles, pass 2 transforms contiguous
//! rows. Pass blocks are independent within a pass, which is what the
//! thread scheduler distributes. A value whose pass 1 has run but not
//! pass 2 is *partially FFTed*.

use std::{ops::Range, sync::Arc};

use crate::{
    engine::Engine,
    weights::WeightTables,
};

// ======================================================================
// Transformer - CRATE

/// Executes transform passes against one handle's tables.
pub(crate) struct Transformer {
    pub(crate) tables: Arc<WeightTables>,
    pub(crate) engine: Arc<dyn Engine>,
}

impl Transformer {
    pub(crate) fn new(tables: Arc<WeightTables>, engine: Arc<dyn Engine>) -> Self {
        Self { tables, engine }
    }

    pub(crate) fn fft_len(&self) -> usize {
        self.tables.fft_len
    }

    /// Bytes of scratch (in doubles) each worker needs.
    pub(crate) fn scratch_len(&self) -> usize {
        2 * self.tables.n1
    }

    // ============================================================
    // forward

    /// Digit domain → weighted, twisted complex words, in place.
    ///
    /// The buffer holds `fft_len` packed digits on entry and
    /// `fft_len` interleaved complex words on exit.
    pub(crate) fn prepare(&self, buf: &mut [f64]) {
        let n = self.tables.fft_len;
        debug_assert_eq!(buf.len(), 2 * n);

        for i in (0..n).rev() {
            let d = buf[i];
            buf[2 * i] = d;
            buf[2 * i + 1] = 0.0;
        }

        if !self.tables.rational {
            for i in 0..n {
                buf[2 * i] *= self.tables.weights[i];
            }
        }

        if let Some(twist) = &self.tables.twist {
            for i in 0..n {
                let (t_re, t_im) = twist.get(i);
                let d = buf[2 * i];
                buf[2 * i] = d * t_re;
                buf[2 * i + 1] = d * t_im;
            }
        }
    }

    /// Pass 1 forward: transforms columns `cols` and applies the
    /// inter-pass twiddles. `scratch` is one column of complex words.
    pub(crate) fn forward_cols(&self, buf: &mut [f64], cols: Range<usize>, scratch: &mut [f64]) {
        let (n1, n2) = (self.tables.n1, self.tables.n2);
        let n = n1 * n2;
        debug_assert_eq!(scratch.len(), 2 * n1);

        for c in cols {
            for r in 0..n1 {
                scratch[2 * r] = buf[2 * (r * n2 + c)];
                scratch[2 * r + 1] = buf[2 * (r * n2 + c) + 1];
            }
            self.engine.fft(scratch, &self.tables.col_twiddles, false);
            for r in 0..n1 {
                let (w_re, w_im) = self.tables.step_roots.get(r * c % n);
                let (x_re, x_im) = (scratch[2 * r], scratch[2 * r + 1]);
                buf[2 * (r * n2 + c)] = x_re * w_re - x_im * w_im;
                buf[2 * (r * n2 + c) + 1] = x_re * w_im + x_im * w_re;
            }
        }
    }

    /// Pass 2 forward: transforms contiguous rows `rows`.
    pub(crate) fn forward_rows(&self, buf: &mut [f64], rows: Range<usize>) {
        let n2 = self.tables.n2;
        for r in rows {
            self.engine
                .fft(&mut buf[2 * r * n2..2 * (r + 1) * n2], &self.tables.row_twiddles, false);
        }
    }

    // ============================================================
    // inverse

    /// Pass 2 inverse: rows first.
    pub(crate) fn inverse_rows(&self, buf: &mut [f64], rows: Range<usize>) {
        let n2 = self.tables.n2;
        for r in rows {
            self.engine
                .fft(&mut buf[2 * r * n2..2 * (r + 1) * n2], &self.tables.row_twiddles, true);
        }
    }

    /// Pass 1 inverse: conjugate inter-pass twiddles, then columns.
    pub(crate) fn inverse_cols(&self, buf: &mut [f64], cols: Range<usize>, scratch: &mut [f64]) {
        let (n1, n2) = (self.tables.n1, self.tables.n2);
        let n = n1 * n2;
        debug_assert_eq!(scratch.len(), 2 * n1);

        for c in cols {
            for r in 0..n1 {
                let (w_re, w_im) = self.tables.step_roots.get(r * c % n);
                let (x_re, x_im) = (buf[2 * (r * n2 + c)], buf[2 * (r * n2 + c) + 1]);
                scratch[2 * r] = x_re * w_re + x_im * w_im;
                scratch[2 * r + 1] = x_im * w_re - x_re * w_im;
            }
            self.engine.fft(scratch, &self.tables.col_twiddles, true);
            for r in 0..n1 {
                buf[2 * (r * n2 + c)] = scratch[2 * r];
                buf[2 * (r * n2 + c) + 1] = scratch[2 * r + 1];
            }
        }
    }

    /// Untwists (negacyclic only) and compacts the complex words back
    /// into packed real digits. Inverse weighting happens in the carry
    /// engine.
    pub(crate) fn finish_inverse(&self, buf: &mut [f64]) {
        let n = self.tables.fft_len;

        if let Some(twist) = &self.tables.twist {
            for i in 0..n {
                let (t_re, t_im) = twist.get(i);
                // Multiply by the conjugate twist; only the real part
                // survives compaction.
                buf[i] = buf[2 * i] * t_re + buf[2 * i + 1] * t_im;
            }
        } else {
            for i in 0..n {
                buf[i] = buf[2 * i];
            }
        }
    }

    // ============================================================
    // single-threaded composites

    /// Full forward transform of a prepared buffer.
    pub(crate) fn forward_full(&self, buf: &mut [f64], scratch: &mut [f64]) {
        self.forward_cols(buf, 0..self.tables.n2, scratch);
        self.forward_rows(buf, 0..self.tables.n1);
    }

    /// Full inverse transform, stopping before inverse weighting.
    pub(crate) fn inverse_full(&self, buf: &mut [f64], scratch: &mut [f64]) {
        self.inverse_rows(buf, 0..self.tables.n1);
        self.inverse_cols(buf, 0..self.tables.n2, scratch);
        self.finish_inverse(buf);
    }

    // ============================================================
    // self-check

    /// Cheap fold of the buffer's bit patterns, kept in the value
    /// header for kernel self-checks.
    pub(crate) fn checksum(buf: &[f64]) -> u64 {
        let words: &[u64] = bytemuck::cast_slice(buf);
        let mut h = 0xcbf29ce484222325u64;
        for &w in words {
            h = (h ^ w).wrapping_mul(0x100000001b3);
        }
        h
    }
}

// ======================================================================
// TESTS
