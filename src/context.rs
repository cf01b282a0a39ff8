//! The handle: one modulus, its tables, worker pool and caches.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use num_bigint::BigUint;
use num_traits::{One, Zero};
use parking_lot::Mutex;
use tracing::debug;

use crate::{
    alloc::BufferPool,
    carry::{FoldParams, NormParams, Normalizer},
    engine::EngineKind,
    reduce::{BarrettState, MmgwState},
    residue::{FftState, Residue},
    scheduler::{self, WorkerPool, MIN_THREADED_FFT_LEN},
    shape::{self, Shape, TransformKind},
    transform::Transformer,
    weights::WeightTables,
    Error, VERSION,
};

// ======================================================================
// STATIC - PRIVATE

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

// ======================================================================
// Settings - PUBLIC

/// Handle configuration, passed to [`Context::init`].
#[derive(Clone, Debug)]
pub struct Settings {
    /// Worker threads used by large transforms. Must be at least 1.
    pub threads: usize,
    /// Extra output-bit reserve subtracted from every shape candidate.
    pub safety_margin: f64,
    /// Smallest FFT length the shape selector may pick.
    pub minimum_fft_len: usize,
    /// Deliberately steps this many rows past the chosen FFT length.
    pub larger_fftlen_count: u32,
    /// Run this many multiplications in careful mode after setup.
    pub careful_count: u32,
    /// Track roundoff on every multiplication (always on currently).
    pub error_checking: bool,
    /// Use the zero-padded shape even when a direct weighted
    /// transform is admissible.
    pub force_zero_padded: bool,
    /// Forces a specific engine instead of CPU detection.
    pub engine_override: Option<EngineKind>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            threads: 1,
            safety_margin: 0.0,
            minimum_fft_len: 0,
            larger_fftlen_count: 0,
            careful_count: 0,
            error_checking: true,
            force_zero_padded: false,
            engine_override: None,
        }
    }
}

// ======================================================================
// ModKind - CRATE

/// Which reduction strategy the handle runs.
pub(crate) enum ModKind {
    /// Special form `k·b^n + c`, reduced inside the transform.
    Special,
    /// Plain multiplier; the caller handles reduction.
    Raw,
    /// General modulus via Barrett reduction.
    Barrett(BarrettState),
    /// General modulus via MMGW dual-transform reduction.
    Mmgw(MmgwState),
}

// ======================================================================
// Setup - CRATE

/// Everything immutable after `setup`, shared with clones.
pub(crate) struct Setup {
    pub(crate) shape: Shape,
    pub(crate) tables: Arc<WeightTables>,
    pub(crate) transformer: Transformer,
    pub(crate) normalizer: Normalizer,
    pub(crate) pool: Arc<BufferPool>,
    pub(crate) workers: Arc<WorkerPool>,
    /// Per-worker column scratch.
    scratch: Vec<Mutex<Vec<f64>>>,
    pub(crate) kind: ModKind,
    /// The modulus; zero for `Raw`.
    pub(crate) modulus: BigUint,
    pub(crate) k: f64,
    pub(crate) b: u32,
    pub(crate) n: u64,
    pub(crate) c: i64,
    /// Spectrum of the constant 1, for FFT-for-FMA values.
    pub(crate) fft1: Vec<f64>,
    /// Unnormalized-add reserve in equivalent extra output bits.
    pub(crate) eb_reserve: f32,
    pub(crate) context_id: u64,
    pub(crate) mem_needed: usize,
}

impl Setup {
    pub(crate) fn threaded(&self) -> bool {
        self.workers.num_workers() > 1 && self.shape.fft_len >= MIN_THREADED_FFT_LEN
    }
}

// ======================================================================
// Context - PUBLIC

/// Process-level coordinator of arithmetic for one modulus.
///
/// A handle is created with [`init`], configured with one of the
/// `setup_*` calls, and then hands out [`Residue`] values and performs
/// arithmetic on them. Two multiplications on the same handle must be
/// serialized by the caller; concurrent work wants [`clone_handle`]
/// siblings, which share the immutable tables and the buffer pool.
///
/// [`init`]: Context::init
/// [`clone_handle`]: Context::clone_handle
pub struct Context {
    version_ok: bool,
    given_version: String,
    pub(crate) settings: Settings,
    pub(crate) setup: Option<Arc<Setup>>,

    // Running state, per handle (not shared with clones).
    pub(crate) fft_count: u64,
    pub(crate) maxerr: f64,
    pub(crate) careful_countdown: u32,
    pub(crate) mul_by_const: f64,
    pub(crate) pre_addin: Option<(usize, f64)>,
    pub(crate) post_addin: Option<(usize, f64)>,
    /// Cached random value for careful multiplications.
    pub(crate) careful_cache: Option<(Residue, Residue)>,
    /// Reusable scratch of the zero-padded fold.
    pub(crate) fold_scratch: Vec<i128>,
}

impl Context {
    // ============================================================
    // lifecycle

    /// Creates an un-configured handle.
    ///
    /// `version` must be [`VERSION`]; a mismatch is reported by the
    /// following `setup_*` call, not here.
    pub fn init(version: &str, settings: Settings) -> Self {
        Self {
            version_ok: version == VERSION,
            given_version: version.to_string(),
            settings,
            setup: None,
            fft_count: 0,
            maxerr: 0.0,
            careful_countdown: 0,
            mul_by_const: 1.0,
            pre_addin: None,
            post_addin: None,
            careful_cache: None,
            fold_scratch: Vec::new(),
        }
    }

    fn pre_setup_checks(&self) -> Result<(), Error> {
        if !self.version_ok {
            return Err(Error::VersionMismatch {
                expected: VERSION.to_string(),
                got: self.given_version.clone(),
            });
        }
        if self.settings.threads == 0 {
            return Err(Error::ZeroThreads);
        }
        Ok(())
    }

    /// Configures the handle for arithmetic mod `k·b^n + c`.
    pub fn setup_special(&mut self, k: f64, b: u32, n: u64, c: i64) -> Result<(), Error> {
        self.pre_setup_checks()?;

        let shape = shape::select_special(&self.settings, k, b, n, c)?;
        let modulus = special_modulus(k, b, n, c).ok_or(Error::TooSmall)?;

        let direct = shape.kind != TransformKind::ZeroPadded;
        let tables = Arc::new(WeightTables::new(&shape, b, if direct { n } else { 0 }));
        let fold = if direct {
            None
        } else {
            Some(FoldParams {
                k: k as u64,
                c,
                n_digits: n,
            })
        };

        self.install(shape, tables, fold, ModKind::Special, modulus, k, b, n, c)
    }

    /// Configures the handle for an arbitrary modulus, given as
    /// little-endian bytes. Prefers MMGW reduction, falling back to
    /// Barrett when the modulus is even, tiny, or MMGW setup fails.
    pub fn setup_general_mod(&mut self, modulus_le: &[u8]) -> Result<(), Error> {
        self.pre_setup_checks()?;

        let modulus = BigUint::from_bytes_le(modulus_le);
        if modulus.bits() < 2 {
            return Err(Error::TooSmall);
        }

        match MmgwState::build(&self.settings, &modulus) {
            Ok(state) => self.install_mmgw(state, modulus),
            Err(err) => {
                debug!(?err, "MMGW setup failed, using Barrett");
                let state = BarrettState::build(&self.settings, &modulus)?;
                self.install_barrett(state, modulus)
            }
        }
    }

    /// Configures the handle as a plain multiplier of up to
    /// `max_output_bits` product bits; the caller handles reduction.
    pub fn setup_without_mod(&mut self, max_output_bits: u64) -> Result<(), Error> {
        self.pre_setup_checks()?;

        let shape = shape::select_generic(&self.settings, max_output_bits)?;
        let tables = Arc::new(WeightTables::new(&shape, 2, 0));
        self.install(shape, tables, None, ModKind::Raw, BigUint::zero(), 0.0, 2, 0, 0)
    }

    fn install_barrett(&mut self, state: BarrettState, modulus: BigUint) -> Result<(), Error> {
        let shape = state.shape;
        let tables = Arc::clone(&state.tables);
        self.install(
            shape,
            tables,
            None,
            ModKind::Barrett(state),
            modulus,
            0.0,
            2,
            0,
            0,
        )
    }

    fn install_mmgw(&mut self, state: MmgwState, modulus: BigUint) -> Result<(), Error> {
        let shape = state.cyclic_shape;
        let tables = Arc::clone(&state.cyclic_tables);
        self.install(shape, tables, None, ModKind::Mmgw(state), modulus, 0.0, 2, 0, 0)
    }

    #[allow(clippy::too_many_arguments)]
    fn install(
        &mut self,
        shape: Shape,
        tables: Arc<WeightTables>,
        fold: Option<FoldParams>,
        kind: ModKind,
        modulus: BigUint,
        k: f64,
        b: u32,
        n: u64,
        c: i64,
    ) -> Result<(), Error> {
        let engine = Arc::from(shape.engine.instantiate());
        let transformer = Transformer::new(Arc::clone(&tables), Arc::clone(&engine));
        let normalizer = Normalizer::new(Arc::clone(&tables), shape.kind, fold);

        let pool = Arc::new(BufferPool::new(2 * shape.fft_len));
        let workers = Arc::new(WorkerPool::new(self.settings.threads));

        let scratch = (0..self.settings.threads)
            .map(|_| Mutex::new(vec![0.0; transformer.scratch_len()]))
            .collect();

        // Spectrum of the constant one: a delta in the digit domain.
        let mut fft1 = vec![0.0; 2 * shape.fft_len];
        fft1[0] = 1.0;
        let mut tmp_scratch = vec![0.0; transformer.scratch_len()];
        transformer.prepare(&mut fft1);
        transformer.forward_full(&mut fft1, &mut tmp_scratch);

        let payload_bpw = if shape.digits_per_word > 0 {
            shape.digits_per_word as f64 * (b.max(2) as f64).log2()
        } else {
            n as f64 * (b as f64).log2() / shape.fft_len as f64
        };
        let eb_reserve =
            (shape::max_bits_per_word(shape.fft_len) - payload_bpw - self.settings.safety_margin)
                .max(0.0) as f32;

        let mem_needed = 2 * shape.fft_len * std::mem::size_of::<f64>()
            + tables.fft_len * (std::mem::size_of::<f64>() * 4 + 8);

        let setup = Setup {
            shape,
            tables,
            transformer,
            normalizer,
            pool,
            workers,
            scratch,
            kind,
            modulus,
            k,
            b,
            n,
            c,
            fft1,
            eb_reserve,
            context_id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            mem_needed,
        };

        debug!(
            fft_len = shape.fft_len,
            kind = ?shape.kind,
            engine = ?shape.engine,
            "setup complete"
        );

        self.setup = Some(Arc::new(setup));
        self.careful_countdown = self.settings.careful_count;
        self.fft_count = 0;
        self.maxerr = 0.0;
        Ok(())
    }

    /// Creates a sibling handle sharing this handle's tables and
    /// buffer pool. The sibling starts with fresh counters.
    pub fn clone_handle(&self) -> Result<Context, Error> {
        let setup = self.setup.as_ref().ok_or(Error::NoInit)?;
        Ok(Context {
            version_ok: self.version_ok,
            given_version: self.given_version.clone(),
            settings: self.settings.clone(),
            setup: Some(Arc::clone(setup)),
            fft_count: 0,
            maxerr: 0.0,
            careful_countdown: 0,
            mul_by_const: self.mul_by_const,
            pre_addin: self.pre_addin,
            post_addin: self.post_addin,
            careful_cache: None,
            fold_scratch: Vec::new(),
        })
    }

    /// Frees all resources owned by this handle. Clones must be done
    /// separately; shared tables are freed with the last sibling.
    pub fn done(self) {}

    // ============================================================
    // accessors

    /// Memory the configured transform needs, or `None` before setup.
    pub fn mem_needed(&self) -> Option<usize> {
        self.setup.as_ref().map(|s| s.mem_needed)
    }

    /// Chosen transform shape, or `None` before setup.
    pub fn shape(&self) -> Option<Shape> {
        self.setup.as_ref().map(|s| s.shape)
    }

    /// Number of transform-multiplications performed so far.
    pub fn fft_count(&self) -> u64 {
        self.fft_count
    }

    /// Largest roundoff observed during normalization. Values past
    /// ~0.40 mean the FFT length is too small for the workload.
    pub fn maxerr(&self) -> f64 {
        self.maxerr
    }

    /// Resets the roundoff statistic.
    pub fn reset_maxerr(&mut self) {
        self.maxerr = 0.0;
    }

    /// Sets the constant folded into normalization when
    /// [`Options::MUL_BY_CONST`] is given.
    ///
    /// [`Options::MUL_BY_CONST`]: crate::ops::Options::MUL_BY_CONST
    pub fn set_mul_by_const(&mut self, value: i64) {
        self.mul_by_const = value as f64;
    }

    /// Sets the value added (at the given word) before the
    /// mul-by-const when [`Options::ADD_IN_CONST`] is given.
    ///
    /// [`Options::ADD_IN_CONST`]: crate::ops::Options::ADD_IN_CONST
    pub fn set_pre_addin(&mut self, word: usize, value: i64) {
        self.pre_addin = Some((word, value as f64));
    }

    /// Sets the value added (at the given word) after the
    /// mul-by-const when [`Options::ADD_IN_CONST`] is given.
    ///
    /// [`Options::ADD_IN_CONST`]: crate::ops::Options::ADD_IN_CONST
    pub fn set_post_addin(&mut self, word: usize, value: i64) {
        self.post_addin = Some((word, value as f64));
    }

    pub(crate) fn setup_ref(&self) -> Result<&Arc<Setup>, Error> {
        self.setup.as_ref().ok_or(Error::NoInit)
    }

    // ============================================================
    // value lifecycle

    /// Allocates a zeroed value.
    pub fn alloc(&self) -> Result<Residue, Error> {
        let setup = self.setup_ref()?;
        Residue::new(Arc::clone(&setup.pool), setup.context_id)
    }

    /// Allocates `count` values in one go.
    pub fn alloc_array(&self, count: usize) -> Result<Vec<Residue>, Error> {
        (0..count).map(|_| self.alloc()).collect()
    }

    /// Returns a value's buffer to the pool. Equivalent to dropping.
    pub fn free(&self, value: Residue) {
        drop(value);
    }

    /// Frees an array of values.
    pub fn free_array(&self, values: Vec<Residue>) {
        drop(values);
    }

    /// Drops all cached free buffers.
    pub fn free_cached(&self) -> Result<(), Error> {
        self.setup_ref()?.pool.clear();
        Ok(())
    }

    /// Copies `src` into `dst`, including the transform state.
    pub fn copy(&self, src: &Residue, dst: &mut Residue) -> Result<(), Error> {
        let setup = self.setup_ref()?;
        debug_assert_eq!(src.context_id, setup.context_id);
        dst.assign(src);
        Ok(())
    }

    /// Copies `src` into `dst`, zeroing every word outside
    /// `keep_words`. Both values must be in the digit domain.
    pub fn copy_with_mask(
        &self,
        src: &Residue,
        dst: &mut Residue,
        keep_words: std::ops::Range<usize>,
    ) -> Result<(), Error> {
        let setup = self.setup_ref()?;
        debug_assert_eq!(src.context_id, setup.context_id);
        debug_assert_eq!(src.state(), FftState::NotFfted);
        dst.assign(src);
        let digits = dst.digits_mut();
        for (i, d) in digits.iter_mut().enumerate() {
            if !keep_words.contains(&i) {
                *d = 0.0;
            }
        }
        Ok(())
    }

    // ============================================================
    // transform pipeline (crate)

    /// Runs pass 1 of the forward transform (columns), threaded when
    /// the shape is large enough.
    pub(crate) fn run_forward_cols(setup: &Setup, buf: &mut [f64]) {
        if setup.threaded() {
            let ptr = SendBuf(buf.as_mut_ptr(), buf.len());
            scheduler::par_blocks(&setup.workers, setup.tables.n2, |worker, col| {
                let mut scratch = setup.scratch[worker].lock();
                // SAFETY: columns are disjoint buffer regions.
                let buf = unsafe { ptr.slice() };
                setup.transformer.forward_cols(buf, col..col + 1, &mut scratch);
            });
        } else {
            let mut scratch = setup.scratch[0].lock();
            setup.transformer.forward_cols(buf, 0..setup.tables.n2, &mut scratch);
        }
    }

    pub(crate) fn run_forward_rows(setup: &Setup, buf: &mut [f64]) {
        if setup.threaded() {
            let ptr = SendBuf(buf.as_mut_ptr(), buf.len());
            scheduler::par_blocks(&setup.workers, setup.tables.n1, |_, row| {
                // SAFETY: rows are disjoint buffer regions.
                let buf = unsafe { ptr.slice() };
                setup.transformer.forward_rows(buf, row..row + 1);
            });
        } else {
            setup.transformer.forward_rows(buf, 0..setup.tables.n1);
        }
    }

    pub(crate) fn run_inverse(setup: &Setup, buf: &mut [f64]) {
        if setup.threaded() {
            let ptr = SendBuf(buf.as_mut_ptr(), buf.len());
            scheduler::par_blocks(&setup.workers, setup.tables.n1, |_, row| {
                let buf = unsafe { ptr.slice() };
                setup.transformer.inverse_rows(buf, row..row + 1);
            });
            scheduler::par_blocks(&setup.workers, setup.tables.n2, |worker, col| {
                let mut scratch = setup.scratch[worker].lock();
                let buf = unsafe { ptr.slice() };
                setup.transformer.inverse_cols(buf, col..col + 1, &mut scratch);
            });
        } else {
            let mut scratch = setup.scratch[0].lock();
            setup.transformer.inverse_rows(buf, 0..setup.tables.n1);
            setup
                .transformer
                .inverse_cols(buf, 0..setup.tables.n2, &mut scratch);
        }
        setup.transformer.finish_inverse(buf);
    }

    /// Advances a value to the fully-FFTed state.
    pub(crate) fn forward_value(setup: &Setup, value: &mut Residue) {
        match value.state() {
            FftState::FullyFfted | FftState::FftedForFma => {}
            FftState::NotFfted => {
                setup.transformer.prepare(value.spectrum_mut());
                Self::run_forward_cols(setup, value.spectrum_mut());
                Self::run_forward_rows(setup, value.spectrum_mut());
                value.state = FftState::FullyFfted;
                value.self_check = Transformer::checksum(value.spectrum());
            }
            FftState::PartiallyFfted => {
                Self::run_forward_rows(setup, value.spectrum_mut());
                value.state = FftState::FullyFfted;
                value.self_check = Transformer::checksum(value.spectrum());
            }
        }
    }

    /// Inverse transform + normalization of a spectrum held in `dst`.
    /// Returns the observed roundoff.
    pub(crate) fn inverse_and_normalize(
        setup: &Setup,
        dst: &mut Residue,
        params: &NormParams,
        fold_scratch: &mut Vec<i128>,
        post_fft: bool,
    ) -> f64 {
        Self::run_inverse(setup, dst.spectrum_mut());

        let maxerr = if setup.shape.kind == TransformKind::ZeroPadded {
            let n = setup.shape.fft_len;
            setup
                .normalizer
                .normalize_zero_padded(&mut dst.spectrum_mut()[..n], fold_scratch, params)
        } else if setup.threaded() {
            let n = setup.shape.fft_len;
            scheduler::run_carry_sections(
                &setup.workers,
                &setup.normalizer,
                &mut dst.spectrum_mut()[..n],
                params,
            )
        } else {
            let n = setup.shape.fft_len;
            setup
                .normalizer
                .normalize_direct(&mut dst.spectrum_mut()[..n], params)
        };

        dst.extra_bits = 0.0;
        if post_fft {
            // Start the next transform while the result is cache-warm.
            setup.transformer.prepare(dst.spectrum_mut());
            Self::run_forward_cols(setup, dst.spectrum_mut());
            dst.state = FftState::PartiallyFfted;
        } else {
            dst.state = FftState::NotFfted;
        }
        dst.self_check = Transformer::checksum(dst.spectrum());
        maxerr
    }
}

// ======================================================================
// SendBuf - PRIVATE

/// Buffer handle shared by transform workers over disjoint regions.
#[derive(Clone, Copy)]
struct SendBuf(*mut f64, usize);

unsafe impl Send for SendBuf {}
unsafe impl Sync for SendBuf {}

impl SendBuf {
    unsafe fn slice(&self) -> &mut [f64] {
        unsafe { std::slice::from_raw_parts_mut(self.0, self.1) }
    }
}

// ======================================================================
// FUNCTIONS - CRATE

/// `k·b^n + c` as a big integer; `None` when not positive.
pub(crate) fn special_modulus(k: f64, b: u32, n: u64, c: i64) -> Option<BigUint> {
    let k = BigUint::from(k as u64);
    let m = k * BigUint::from(b).pow(u32::try_from(n).ok()?);
    let m = num_bigint::BigInt::from(m) + c;
    if m <= num_bigint::BigInt::one() {
        return None;
    }
    m.to_biguint()
}

// ======================================================================
// TESTS
