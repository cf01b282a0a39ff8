//! Trig tables used by [`Engine`]:s and the transform driver.
//!
//! Tables are immutable after construction and interned in a
//! process-wide pool so that compatible handles share them; they are
//! freed when the last handle referencing them is dropped.
//!
//! # Tables
//!
//! | Table        | Size per entry | Used by                             |
//! | ------------ | -------------- | ----------------------------------- |
//! | [`Twiddles`] | `16·n` bytes   | FFT butterfly stages                |
//! | [`RootTable`]| `16·n` bytes   | inter-pass twiddles, negacyclic twist |
//!
//! [`Engine`]: crate::engine::Engine

use std::{
    collections::HashMap,
    sync::{Arc, Weak},
};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::debug;

// ======================================================================
// Twiddles - PUBLIC

/// Butterfly twiddle factors and the bit-reversal table for one
/// transform length.
///
/// Slot `len/2 + j` holds `e^(-2πi·j/len)` for each stage length
/// `len = 2, 4, .., n`, interleaved re/im.
pub struct Twiddles {
    /// Transform length in complex words.
    pub n: usize,
    /// Bit-reversal permutation of `0..n`.
    pub bitrev: Vec<u32>,
    /// Interleaved re/im twiddles; `2·n` doubles.
    pub w: Vec<f64>,
}

impl Twiddles {
    fn new(n: usize) -> Self {
        assert!(n.is_power_of_two());

        let bits = n.trailing_zeros();
        let mut bitrev = vec![0u32; n];
        if bits > 0 {
            for (i, slot) in bitrev.iter_mut().enumerate() {
                *slot = (i as u32).reverse_bits() >> (32 - bits);
            }
        }

        let mut w = vec![0.0; 2 * n];
        let mut len = 2;
        while len <= n {
            let half = len / 2;
            for j in 0..half {
                let angle = -2.0 * std::f64::consts::PI * j as f64 / len as f64;
                w[2 * (half + j)] = angle.cos();
                w[2 * (half + j) + 1] = angle.sin();
            }
            len *= 2;
        }

        Self { n, bitrev, w }
    }
}

// ======================================================================
// RootTable - PUBLIC

/// Roots of unity `e^(-2πi·j/n)` for `j < n`, interleaved re/im.
pub struct RootTable {
    /// Order of the root.
    pub n: usize,
    /// Interleaved re/im; `2·n` doubles.
    pub data: Vec<f64>,
}

impl RootTable {
    fn new(n: usize) -> Self {
        let mut data = vec![0.0; 2 * n];
        for j in 0..n {
            let angle = -2.0 * std::f64::consts::PI * j as f64 / n as f64;
            data[2 * j] = angle.cos();
            data[2 * j + 1] = angle.sin();
        }
        Self { n, data }
    }

    /// Root `j` as a `(re, im)` pair.
    #[inline(always)]
    pub fn get(&self, j: usize) -> (f64, f64) {
        (self.data[2 * j], self.data[2 * j + 1])
    }
}

// ======================================================================
// STATIC - PRIVATE

struct TablePool {
    twiddles: HashMap<usize, Weak<Twiddles>>,
    roots: HashMap<usize, Weak<RootTable>>,
}

static TABLE_POOL: OnceCell<Mutex<TablePool>> = OnceCell::new();

fn pool() -> &'static Mutex<TablePool> {
    TABLE_POOL.get_or_init(|| {
        Mutex::new(TablePool {
            twiddles: HashMap::new(),
            roots: HashMap::new(),
        })
    })
}

// ======================================================================
// FUNCTIONS - PUBLIC - initialize tables

/// Initializes and returns the shared [`Twiddles`] for length `n`.
pub fn initialize_twiddles(n: usize) -> Arc<Twiddles> {
    let mut pool = pool().lock();
    if let Some(table) = pool.twiddles.get(&n).and_then(Weak::upgrade) {
        return table;
    }
    let table = Arc::new(Twiddles::new(n));
    pool.twiddles.insert(n, Arc::downgrade(&table));
    debug!(n, "built twiddle table");
    table
}

/// Initializes and returns the shared [`RootTable`] of order `n`.
pub fn initialize_roots(n: usize) -> Arc<RootTable> {
    let mut pool = pool().lock();
    if let Some(table) = pool.roots.get(&n).and_then(Weak::upgrade) {
        return table;
    }
    let table = Arc::new(RootTable::new(n));
    pool.roots.insert(n, Arc::downgrade(&table));
    debug!(n, "built root table");
    table
}

// ======================================================================
// TESTS

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitrev_is_involution() {
        let tw = initialize_twiddles(16);
        for i in 0..16 {
            assert_eq!(tw.bitrev[tw.bitrev[i] as usize], i as u32);
        }
    }

    #[test]
    fn last_stage_slots_hold_nth_roots() {
        let tw = initialize_twiddles(8);
        // Slot 4 + j holds e^(-2πi·j/8).
        assert!((tw.w[2 * 4] - 1.0).abs() < 1e-15);
        assert!((tw.w[2 * 5] - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-15);
        assert!((tw.w[2 * 5 + 1] + std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-15);
    }

    #[test]
    fn roots_wrap_the_circle() {
        let roots = initialize_roots(4);
        assert_eq!(roots.get(0), (1.0, 0.0));
        let (re, im) = roots.get(1);
        assert!(re.abs() < 1e-15 && (im + 1.0).abs() < 1e-15);
        let (re, _) = roots.get(2);
        assert!((re + 1.0).abs() < 1e-15);
    }

    #[test]
    fn tables_are_shared_while_alive() {
        let a = initialize_roots(4096);
        let b = initialize_roots(4096);
        assert!(Arc::ptr_eq(&a, &b));
    }
}
