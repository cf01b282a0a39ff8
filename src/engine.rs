//! Low-level transform engines.
//!
//! **This is an advanced module which is not needed for normal use.**
//!
//! An [`Engine`] implements the inner loops every multiplication is made
//! of: complex FFT passes over interleaved re/im word pairs and the
//! pointwise spectrum operations. The driver picks the best engine for
//! the host CPU at setup; the `Engine` trait is public so that the
//! passes can be benchmarked and tested in isolation.
//!
//! # Engines
//!
//! - [`Naive`]
//!     - Direct DFT reference implementation.
//! - [`NoSimd`]
//!     - Optimized scalar radix-2 engine, works on all CPUs.
//! - [`Fma`]
//!     - AVX2+FMA engine for x86(-64), behind the default `fma` feature.
//! - [`DefaultEngine`]
//!     - Alias of the best engine built into this binary.
//!
//! [`Fma`]: self::Fma

pub use self::{engine_naive::Naive, engine_nosimd::NoSimd};

#[cfg(all(feature = "fma", any(target_arch = "x86", target_arch = "x86_64")))]
pub use self::engine_fma::Fma;

mod engine_naive;
mod engine_nosimd;

#[cfg(all(feature = "fma", any(target_arch = "x86", target_arch = "x86_64")))]
mod engine_fma;

pub mod tables;

use self::tables::Twiddles;

// ======================================================================
// TYPE ALIASES - PUBLIC

/// Default [`Engine`], currently just alias to [`Fma`].
#[cfg(all(feature = "fma", any(target_arch = "x86", target_arch = "x86_64")))]
pub type DefaultEngine = Fma;

/// Default [`Engine`], currently just alias to [`NoSimd`].
#[cfg(not(all(feature = "fma", any(target_arch = "x86", target_arch = "x86_64"))))]
pub type DefaultEngine = NoSimd;

// ======================================================================
// EngineKind - PUBLIC

/// Identifies a concrete [`Engine`] implementation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EngineKind {
    /// Direct DFT reference implementation.
    Naive,
    /// Optimized scalar engine.
    NoSimd,
    /// AVX2+FMA engine.
    Fma,
}

impl EngineKind {
    /// Instantiates this engine, degrading to [`NoSimd`] when the
    /// required CPU features are not available.
    pub(crate) fn instantiate(self) -> Box<dyn Engine> {
        match self {
            EngineKind::Naive => Box::new(Naive::new()),
            EngineKind::NoSimd => Box::new(NoSimd::new()),
            EngineKind::Fma => {
                #[cfg(all(feature = "fma", any(target_arch = "x86", target_arch = "x86_64")))]
                {
                    if std::arch::is_x86_feature_detected!("avx2")
                        && std::arch::is_x86_feature_detected!("fma")
                    {
                        return Box::new(Fma::new());
                    }
                }
                Box::new(NoSimd::new())
            }
        }
    }
}

// ======================================================================
// Engine - PUBLIC

/// Implementation of the inner transform passes.
///
/// All slices are interleaved complex: `data[2*i]` is the real part of
/// word `i` and `data[2*i + 1]` the imaginary part.
pub trait Engine: Send + Sync {
    // ============================================================
    // REQUIRED

    /// Which engine this is.
    fn kind(&self) -> EngineKind;

    /// In-place complex FFT of `twiddles.n` words.
    ///
    /// - `data.len()` must be `2 * twiddles.n`.
    /// - Forward uses `e^(-2πi/n)` roots; inverse conjugates them and
    ///   scales the result by `1/n`.
    fn fft(&self, data: &mut [f64], twiddles: &Twiddles, inverse: bool);

    /// Pointwise complex multiply: `x[] *= y[]`.
    fn cmul(&self, x: &mut [f64], y: &[f64]);

    /// Pointwise complex square: `x[] *= x[]`.
    fn csquare(&self, x: &mut [f64]);

    /// Linear add: `x[] += y[]`.
    fn cadd(&self, x: &mut [f64], y: &[f64]);

    /// Linear subtract: `x[] -= y[]`.
    fn csub(&self, x: &mut [f64], y: &[f64]);

    /// Fused pointwise multiply-accumulate: `x[] += y[] * z[]`.
    fn cmul_add(&self, x: &mut [f64], y: &[f64], z: &[f64]);
}

// ======================================================================
// TESTS
