//! The transform-domain value type.

use std::sync::Arc;

use crate::alloc::{AlignedBuf, BufferPool};

// ======================================================================
// FftState - PUBLIC

/// Transform state of a [`Residue`].
///
/// The arithmetic facade matches on this to avoid redundant transforms:
/// a fully-FFTed operand goes straight to the pointwise multiply, a
/// partially-FFTed one only needs the remaining pass.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FftState {
    /// Digit domain: balanced base-`b` words.
    NotFfted,
    /// Leading transform pass done, remaining pass pending.
    PartiallyFfted,
    /// Spectrum domain: ready for pointwise multiplication.
    FullyFfted,
    /// Spectrum multiplied by FFT(1); addable during normalization.
    FftedForFma,
}

// ======================================================================
// Residue - PUBLIC

/// A value owned by a [`Context`], in digit or spectrum domain.
///
/// Logically a length-`fft_len` vector of `f64` digit words; physically
/// the buffer holds `2 * fft_len` doubles so that the complex spectrum
/// fits in place. A small header tracks the transform state and the
/// unnormalized-add budget.
///
/// Dropping a `Residue` returns its buffer to the owning handle's free
/// list.
///
/// [`Context`]: crate::Context
pub struct Residue {
    buf: Option<AlignedBuf>,
    pool: Arc<BufferPool>,

    pub(crate) state: FftState,
    /// Unnormalized-add budget in equivalent extra output bits.
    pub(crate) extra_bits: f32,
    /// Input/output hash maintained by the transform driver.
    pub(crate) self_check: u64,
    /// Handle identity, checked by the facade in debug builds.
    pub(crate) context_id: u64,
}

impl Residue {
    pub(crate) fn new(pool: Arc<BufferPool>, context_id: u64) -> Result<Self, crate::Error> {
        let buf = pool.take()?;
        Ok(Self {
            buf: Some(buf),
            pool,
            state: FftState::NotFfted,
            extra_bits: 0.0,
            self_check: 0,
            context_id,
        })
    }

    /// Transform state of this value.
    pub fn state(&self) -> FftState {
        self.state
    }

    /// Unnormalized-add budget in equivalent extra output bits.
    pub fn extra_bits(&self) -> f32 {
        self.extra_bits
    }

    pub(crate) fn fft_len(&self) -> usize {
        self.buf().len() / 2
    }

    fn buf(&self) -> &AlignedBuf {
        self.buf.as_ref().unwrap()
    }

    fn buf_mut(&mut self) -> &mut AlignedBuf {
        self.buf.as_mut().unwrap()
    }

    /// Digit-domain view: the first `fft_len` words.
    pub(crate) fn digits(&self) -> &[f64] {
        let n = self.fft_len();
        &self.buf()[..n]
    }

    pub(crate) fn digits_mut(&mut self) -> &mut [f64] {
        let n = self.fft_len();
        &mut self.buf_mut()[..n]
    }

    /// Spectrum view: `fft_len` interleaved re/im pairs.
    pub(crate) fn spectrum(&self) -> &[f64] {
        &self.buf()[..]
    }

    pub(crate) fn spectrum_mut(&mut self) -> &mut [f64] {
        &mut self.buf_mut()[..]
    }

    /// Copies the whole buffer and header from `other`.
    pub(crate) fn assign(&mut self, other: &Residue) {
        self.buf_mut().copy_from_slice(other.buf());
        self.state = other.state;
        self.extra_bits = other.extra_bits;
        self.self_check = other.self_check;
    }

}

impl Drop for Residue {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.put(buf);
        }
    }
}

// ======================================================================
// TESTS
