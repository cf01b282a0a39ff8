//! The arithmetic facade: multiplication, fused variants, linear
//! operations and the unnormalized-add budget.

use std::sync::Arc;

use tracing::warn;

use crate::{
    carry::NormParams,
    context::{Context, ModKind, Setup},
    residue::{FftState, Residue},
    shape::TransformKind,
    Error,
};

// ======================================================================
// Options - PUBLIC

/// Option bits accepted by the arithmetic operations.
///
/// Sources are preserved by default; the `FFT_S*` bits permit the
/// named source to be replaced by its forward transform, saving a
/// scratch buffer and a transform next time it is used.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Options(u32);

impl Options {
    /// No options.
    pub const NONE: Options = Options(0);
    /// Source 1 may be left forward-transformed.
    pub const FFT_S1: Options = Options(1 << 0);
    /// Source 2 may be left forward-transformed.
    pub const FFT_S2: Options = Options(1 << 1);
    /// Source 3 may be left forward-transformed.
    pub const FFT_S3: Options = Options(1 << 2);
    /// Source 4 may be left forward-transformed.
    pub const FFT_S4: Options = Options(1 << 3);
    /// Source 1 must not be modified (the default; documents intent).
    pub const PRESERVE_S1: Options = Options(1 << 4);
    /// Source 2 must not be modified (the default; documents intent).
    pub const PRESERVE_S2: Options = Options(1 << 5);
    /// Source 3 must not be modified (the default; documents intent).
    pub const PRESERVE_S3: Options = Options(1 << 6);
    /// Source 4 must not be modified (the default; documents intent).
    pub const PRESERVE_S4: Options = Options(1 << 7);
    /// Apply the configured pre/post add-in constants.
    pub const ADD_IN_CONST: Options = Options(1 << 8);
    /// Multiply the result by the configured constant.
    pub const MUL_BY_CONST: Options = Options(1 << 9);
    /// The result may be left partially transformed for the next
    /// multiplication.
    pub const START_NEXT_FFT: Options = Options(1 << 10);

    /// Returns `true` if every bit of `other` is set in `self`.
    pub fn contains(self, other: Options) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Options {
    type Output = Options;
    fn bitor(self, rhs: Options) -> Options {
        Options(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for Options {
    fn bitor_assign(&mut self, rhs: Options) {
        self.0 |= rhs.0;
    }
}

impl std::ops::BitAnd for Options {
    type Output = Options;
    fn bitand(self, rhs: Options) -> Options {
        Options(self.0 & rhs.0)
    }
}

impl std::ops::Not for Options {
    type Output = Options;
    fn not(self) -> Options {
        Options(!self.0)
    }
}

// ======================================================================
// Second - PRIVATE

/// Second multiplication operand.
enum Second<'a> {
    /// Square the first operand.
    Square,
    Src(&'a mut Residue),
}

// ======================================================================
// Context - PUBLIC - multiplication family

impl Context {
    /// `dst = s1 · s2 (mod N)`.
    pub fn mul3(
        &mut self,
        s1: &mut Residue,
        s2: &mut Residue,
        dst: &mut Residue,
        options: Options,
    ) -> Result<(), Error> {
        if self.careful_countdown > 0 {
            self.careful_countdown -= 1;
            return self.mul3_carefully(s1, s2, dst, options);
        }
        self.mul_core(s1, Second::Src(s2), dst, None, options)
    }

    /// `dst = s1² (mod N)`.
    pub fn square3(
        &mut self,
        s1: &mut Residue,
        dst: &mut Residue,
        options: Options,
    ) -> Result<(), Error> {
        if self.careful_countdown > 0 {
            self.careful_countdown -= 1;
            return self.square3_carefully(s1, dst, options);
        }
        self.mul_core(s1, Second::Square, dst, None, options)
    }

    /// `dst = s1·s2 + s3 (mod N)`, the add folded into normalization
    /// when `s3` has been prepared with [`fft_for_fma`].
    ///
    /// [`fft_for_fma`]: Context::fft_for_fma
    pub fn muladd4(
        &mut self,
        s1: &mut Residue,
        s2: &mut Residue,
        s3: &mut Residue,
        dst: &mut Residue,
        options: Options,
    ) -> Result<(), Error> {
        self.fused_mul_addsub(s1, s2, s3, dst, 1.0, options)
    }

    /// `dst = s1·s2 − s3 (mod N)`.
    pub fn mulsub4(
        &mut self,
        s1: &mut Residue,
        s2: &mut Residue,
        s3: &mut Residue,
        dst: &mut Residue,
        options: Options,
    ) -> Result<(), Error> {
        self.fused_mul_addsub(s1, s2, s3, dst, -1.0, options)
    }

    /// `dst = (s1 + s2)·s3 (mod N)`.
    pub fn addmul4(
        &mut self,
        s1: &mut Residue,
        s2: &mut Residue,
        s3: &mut Residue,
        dst: &mut Residue,
        options: Options,
    ) -> Result<(), Error> {
        let mut sum = self.alloc()?;
        self.add3(s1, s2, &mut sum, Options::NONE)?;
        self.mul_core(&mut sum, Second::Src(s3), dst, None, options)
    }

    /// `dst = (s1 − s2)·s3 (mod N)`.
    pub fn submul4(
        &mut self,
        s1: &mut Residue,
        s2: &mut Residue,
        s3: &mut Residue,
        dst: &mut Residue,
        options: Options,
    ) -> Result<(), Error> {
        let mut dif = self.alloc()?;
        self.sub3(s1, s2, &mut dif, Options::NONE)?;
        self.mul_core(&mut dif, Second::Src(s3), dst, None, options)
    }

    /// `dst = s1·s2 + s3·s4 (mod N)`, fused in the spectrum domain.
    pub fn mulmuladd5(
        &mut self,
        s1: &mut Residue,
        s2: &mut Residue,
        s3: &mut Residue,
        s4: &mut Residue,
        dst: &mut Residue,
        options: Options,
    ) -> Result<(), Error> {
        self.mulmul_addsub(s1, s2, s3, s4, dst, 1.0, options)
    }

    /// `dst = s1·s2 − s3·s4 (mod N)`.
    pub fn mulmulsub5(
        &mut self,
        s1: &mut Residue,
        s2: &mut Residue,
        s3: &mut Residue,
        s4: &mut Residue,
        dst: &mut Residue,
        options: Options,
    ) -> Result<(), Error> {
        self.mulmul_addsub(s1, s2, s3, s4, dst, -1.0, options)
    }

    // ============================================================
    // carefully variants

    /// Multiplication for inputs whose digit distribution is not
    /// random: computes `(s1 + r)·(s2 − r) + r·(s1 + r − s2)` with a
    /// cached fixed-seed random `r`, guaranteeing well-distributed
    /// transform input.
    pub fn mul3_carefully(
        &mut self,
        s1: &mut Residue,
        s2: &mut Residue,
        dst: &mut Residue,
        options: Options,
    ) -> Result<(), Error> {
        let setup = Arc::clone(self.setup_ref()?);
        if !matches!(setup.kind, ModKind::Special | ModKind::Raw) {
            // General-mod inputs are already well distributed by the
            // reduction; run the plain product.
            return self.mul_core(s1, Second::Src(s2), dst, None, options);
        }

        let (mut r, r_sq) = self.take_careful_cache()?;

        let mut a_plus_r = self.alloc()?;
        let mut b_minus_r = self.alloc()?;
        self.add3(s1, &mut r, &mut a_plus_r, Options::NONE)?;
        self.sub3(s2, &mut r, &mut b_minus_r, Options::NONE)?;

        // t = a + r − b.
        let mut t = self.alloc()?;
        self.sub3(&mut a_plus_r, s2, &mut t, Options::NONE)?;

        let mut prod1 = self.alloc()?;
        self.mul_core(&mut a_plus_r, Second::Src(&mut b_minus_r), &mut prod1, None, Options::NONE)?;
        let mut prod2 = self.alloc()?;
        self.mul_core(&mut r, Second::Src(&mut t), &mut prod2, None, Options::NONE)?;

        self.add3(&mut prod1, &mut prod2, dst, Options::NONE)?;
        self.apply_const_options(dst, options)?;

        self.careful_cache = Some((r, r_sq));
        Ok(())
    }

    /// Applies the mul-by-const and add-in options to an already
    /// computed result, for paths that cannot fold them into a
    /// normalization pass.
    fn apply_const_options(&mut self, dst: &mut Residue, options: Options) -> Result<(), Error> {
        if options.contains(Options::ADD_IN_CONST) {
            if let Some((word, value)) = self.pre_addin {
                dst.digits_mut()[word] += value;
            }
        }
        if options.contains(Options::MUL_BY_CONST) {
            let mul_by_const = self.mul_by_const;
            self.smallmul(mul_by_const, dst)?;
        }
        if options.contains(Options::ADD_IN_CONST) {
            if let Some((word, value)) = self.post_addin {
                dst.digits_mut()[word] += value;
            }
        }
        Ok(())
    }

    /// Squaring for non-random inputs: `(s1 + r)·(s1 − r) + r²`.
    pub fn square3_carefully(
        &mut self,
        s1: &mut Residue,
        dst: &mut Residue,
        options: Options,
    ) -> Result<(), Error> {
        let setup = Arc::clone(self.setup_ref()?);
        if !matches!(setup.kind, ModKind::Special | ModKind::Raw) {
            return self.mul_core(s1, Second::Square, dst, None, options);
        }

        let (mut r, mut r_sq) = self.take_careful_cache()?;

        let mut a_plus_r = self.alloc()?;
        let mut a_minus_r = self.alloc()?;
        self.add3(s1, &mut r, &mut a_plus_r, Options::NONE)?;
        self.sub3(s1, &mut r, &mut a_minus_r, Options::NONE)?;

        let mut prod = self.alloc()?;
        self.mul_core(
            &mut a_plus_r,
            Second::Src(&mut a_minus_r),
            &mut prod,
            None,
            Options::NONE,
        )?;
        self.add3(&mut prod, &mut r_sq, dst, Options::NONE)?;
        self.apply_const_options(dst, options)?;

        self.careful_cache = Some((r, r_sq));
        Ok(())
    }

    // ============================================================
    // transform-state management

    /// Forward-transforms a value in place.
    ///
    /// MMGW values stay in the digit domain; this is a no-op there.
    pub fn fft(&mut self, value: &mut Residue) -> Result<(), Error> {
        let setup = Arc::clone(self.setup_ref()?);
        if matches!(setup.kind, ModKind::Mmgw(_)) {
            return Ok(());
        }
        Context::forward_value(&setup, value);
        Ok(())
    }

    /// Prepares a value as a fused-multiply-add operand: a forward
    /// transform followed by pointwise multiplication by FFT(1).
    ///
    /// MMGW values stay in the digit domain; this is a no-op there.
    pub fn fft_for_fma(&mut self, value: &mut Residue) -> Result<(), Error> {
        let setup = Arc::clone(self.setup_ref()?);
        if matches!(setup.kind, ModKind::Mmgw(_)) {
            return Ok(());
        }
        Context::forward_value(&setup, value);
        setup.transformer.engine.cmul(value.spectrum_mut(), &setup.fft1);
        value.state = FftState::FftedForFma;
        value.self_check = crate::transform::Transformer::checksum(value.spectrum());
        Ok(())
    }

    /// Inverse-transforms `src` into `dst`, normalizing the digits.
    pub fn unfft(
        &mut self,
        src: &mut Residue,
        dst: &mut Residue,
        options: Options,
    ) -> Result<(), Error> {
        let setup = Arc::clone(self.setup_ref()?);
        dst.assign(src);
        match dst.state() {
            FftState::NotFfted => return Ok(()),
            FftState::PartiallyFfted => {
                Context::run_forward_rows(&setup, dst.spectrum_mut());
            }
            FftState::FullyFfted | FftState::FftedForFma => {}
        }

        let params = self.norm_params(options);
        let mut fold_scratch = std::mem::take(&mut self.fold_scratch);
        let maxerr = Context::inverse_and_normalize(&setup, dst, &params, &mut fold_scratch, false);
        self.fold_scratch = fold_scratch;
        self.note_fft(maxerr);
        Ok(())
    }

    // ============================================================
    // core pipeline (private)

    fn norm_params(&self, options: Options) -> NormParams {
        NormParams {
            mul_by_const: options
                .contains(Options::MUL_BY_CONST)
                .then_some(self.mul_by_const),
            pre_addin: options
                .contains(Options::ADD_IN_CONST)
                .then_some(self.pre_addin)
                .flatten(),
            post_addin: options
                .contains(Options::ADD_IN_CONST)
                .then_some(self.post_addin)
                .flatten(),
        }
    }

    fn note_fft(&mut self, maxerr: f64) {
        self.fft_count += 1;
        if maxerr > self.maxerr {
            self.maxerr = maxerr;
        }
    }

    /// Renormalizes a digit-domain value whose unnormalized-add budget
    /// ran out.
    fn renormalize(&mut self, setup: &Setup, value: &mut Residue) {
        warn!(
            extra_bits = value.extra_bits(),
            "unnormalized-add budget exhausted, renormalizing"
        );
        debug_assert_eq!(value.state(), FftState::NotFfted);
        let mut fold_scratch = std::mem::take(&mut self.fold_scratch);
        let n = setup.shape.fft_len;
        if setup.shape.kind == TransformKind::ZeroPadded {
            setup.normalizer.normalize_zero_padded(
                &mut value.spectrum_mut()[..n],
                &mut fold_scratch,
                &NormParams::default(),
            );
        } else {
            setup
                .normalizer
                .normalize_direct(&mut value.spectrum_mut()[..n], &NormParams::default());
        }
        self.fold_scratch = fold_scratch;
        value.extra_bits = 0.0;
    }

    /// The multiplication pipeline for every reducer.
    fn mul_core(
        &mut self,
        s1: &mut Residue,
        s2: Second,
        dst: &mut Residue,
        fma: Option<(&Residue, f64)>,
        options: Options,
    ) -> Result<(), Error> {
        let setup = Arc::clone(self.setup_ref()?);
        debug_assert_eq!(s1.context_id, setup.context_id);

        match &setup.kind {
            ModKind::Special | ModKind::Raw => {
                self.mul_core_transform(&setup, s1, s2, dst, fma, options)
            }
            ModKind::Barrett(state) => {
                self.mul_core_transform(&setup, s1, s2, dst, fma, options)?;
                state.reduce(dst.spectrum_mut());
                dst.extra_bits = 0.0;
                Ok(())
            }
            ModKind::Mmgw(state) => {
                let n = setup.shape.fft_len;
                let mut out = vec![0.0; 2 * n];
                match s2 {
                    Second::Square => {
                        state.mont_mul(&s1.digits()[..n], None, &mut out);
                    }
                    Second::Src(s2) => {
                        state.mont_mul(&s1.digits()[..n], Some(&s2.digits()[..n]), &mut out);
                    }
                }
                dst.spectrum_mut().copy_from_slice(&out);
                dst.state = FftState::NotFfted;
                dst.extra_bits = 0.0;
                if let Some((f, sign)) = fma {
                    let fd: Vec<f64> = f.digits().to_vec();
                    for (d, x) in dst.digits_mut().iter_mut().zip(fd) {
                        *d += sign * x;
                    }
                    dst.extra_bits = 1.0;
                }
                self.note_fft(0.0);
                Ok(())
            }
        }
    }

    /// Loads the product spectrum `F(s1)∘F(s2)` (or the square) into
    /// `dst`, transforming operands as their states and the `allow_*`
    /// permissions dictate.
    fn load_product(
        &mut self,
        setup: &Arc<Setup>,
        s1: &mut Residue,
        s2: Second,
        dst: &mut Residue,
        allow_fft_s1: bool,
        allow_fft_s2: bool,
    ) -> Result<(), Error> {
        // Pre-multiply safety guard.
        let s2_eb = match &s2 {
            Second::Square => s1.extra_bits(),
            Second::Src(s) => s.extra_bits(),
        };
        if s1.extra_bits() + s2_eb > setup.eb_reserve
            && s1.extra_bits() > 0.0
            && s1.state() == FftState::NotFfted
        {
            self.renormalize(setup, s1);
        }

        // First operand's spectrum lands in dst.
        match s1.state() {
            FftState::FullyFfted | FftState::FftedForFma => {
                dst.assign(s1);
            }
            _ => {
                if allow_fft_s1 {
                    Context::forward_value(setup, s1);
                    dst.assign(s1);
                } else {
                    dst.assign(s1);
                    Context::forward_value(setup, dst);
                }
            }
        }

        // Second operand: pointwise multiply into dst.
        let engine = &setup.transformer.engine;
        let mut scratch_holder: Option<Residue> = None;
        match s2 {
            Second::Square => {
                engine.csquare(dst.spectrum_mut());
            }
            Second::Src(s2) => {
                if s1.extra_bits() + s2.extra_bits() > setup.eb_reserve
                    && s2.extra_bits() > 0.0
                    && s2.state() == FftState::NotFfted
                {
                    self.renormalize(setup, s2);
                }
                let spectrum: &[f64] = match s2.state() {
                    FftState::FullyFfted | FftState::FftedForFma => {
                        // Kernel self-check: the spectrum must be the
                        // one recorded when it was produced.
                        debug_assert!(
                            s2.self_check == 0
                                || s2.self_check
                                    == crate::transform::Transformer::checksum(s2.spectrum()),
                            "transformed operand was modified since its forward FFT"
                        );
                        s2.spectrum()
                    }
                    _ => {
                        if allow_fft_s2 {
                            Context::forward_value(setup, s2);
                            s2.spectrum()
                        } else {
                            let mut scratch = self.alloc()?;
                            scratch.assign(s2);
                            Context::forward_value(setup, &mut scratch);
                            scratch_holder = Some(scratch);
                            scratch_holder.as_ref().unwrap().spectrum()
                        }
                    }
                };
                engine.cmul(dst.spectrum_mut(), spectrum);
            }
        }
        drop(scratch_holder);
        dst.state = FftState::FullyFfted;
        Ok(())
    }

    /// Transform-domain multiply used by the special, raw and Barrett
    /// paths.
    fn mul_core_transform(
        &mut self,
        setup: &Arc<Setup>,
        s1: &mut Residue,
        s2: Second,
        dst: &mut Residue,
        fma: Option<(&Residue, f64)>,
        options: Options,
    ) -> Result<(), Error> {
        self.load_product(
            setup,
            s1,
            s2,
            dst,
            options.contains(Options::FFT_S1),
            options.contains(Options::FFT_S2),
        )?;

        // Fused add-in of an FFT-for-FMA operand: free during
        // normalization.
        if let Some((f, sign)) = fma {
            debug_assert_eq!(f.state(), FftState::FftedForFma);
            let engine = &setup.transformer.engine;
            if sign >= 0.0 {
                engine.cadd(dst.spectrum_mut(), f.spectrum());
            } else {
                engine.csub(dst.spectrum_mut(), f.spectrum());
            }
        }

        let params = self.norm_params(options);
        let post_fft = options.contains(Options::START_NEXT_FFT)
            && matches!(setup.kind, ModKind::Special | ModKind::Raw);
        let mut fold_scratch = std::mem::take(&mut self.fold_scratch);
        let maxerr =
            Context::inverse_and_normalize(setup, dst, &params, &mut fold_scratch, post_fft);
        self.fold_scratch = fold_scratch;
        self.note_fft(maxerr);
        Ok(())
    }

    /// `dst = s1·s2 ± s3·s4`, both products fused in the spectrum
    /// domain for the transform-based reducers.
    fn mulmul_addsub(
        &mut self,
        s1: &mut Residue,
        s2: &mut Residue,
        s3: &mut Residue,
        s4: &mut Residue,
        dst: &mut Residue,
        sign: f64,
        options: Options,
    ) -> Result<(), Error> {
        let setup = Arc::clone(self.setup_ref()?);

        if let ModKind::Mmgw(_) = &setup.kind {
            let mut p2 = self.alloc()?;
            self.mul_core(s3, Second::Src(s4), &mut p2, None, Options::NONE)?;
            return self.mul_core(s1, Second::Src(s2), dst, Some((&p2, sign)), options);
        }

        self.load_product(
            &setup,
            s1,
            Second::Src(s2),
            dst,
            options.contains(Options::FFT_S1),
            options.contains(Options::FFT_S2),
        )?;
        let mut p2 = self.alloc()?;
        self.load_product(
            &setup,
            s3,
            Second::Src(s4),
            &mut p2,
            options.contains(Options::FFT_S3),
            options.contains(Options::FFT_S4),
        )?;

        let engine = &setup.transformer.engine;
        if sign >= 0.0 {
            engine.cadd(dst.spectrum_mut(), p2.spectrum());
        } else {
            engine.csub(dst.spectrum_mut(), p2.spectrum());
        }

        let params = self.norm_params(options);
        let post_fft = options.contains(Options::START_NEXT_FFT)
            && matches!(setup.kind, ModKind::Special | ModKind::Raw);
        let mut fold_scratch = std::mem::take(&mut self.fold_scratch);
        let maxerr =
            Context::inverse_and_normalize(&setup, dst, &params, &mut fold_scratch, post_fft);
        self.fold_scratch = fold_scratch;
        self.note_fft(maxerr);

        if let ModKind::Barrett(state) = &setup.kind {
            state.reduce(dst.spectrum_mut());
            dst.extra_bits = 0.0;
        }
        Ok(())
    }

    fn fused_mul_addsub(
        &mut self,
        s1: &mut Residue,
        s2: &mut Residue,
        s3: &mut Residue,
        dst: &mut Residue,
        sign: f64,
        options: Options,
    ) -> Result<(), Error> {
        let setup = Arc::clone(self.setup_ref()?);

        match &setup.kind {
            ModKind::Special | ModKind::Raw | ModKind::Barrett(_) => {
                // Bring s3 into FFT-for-FMA form, on a scratch copy
                // unless the caller allows transforming in place.
                let mut scratch_holder: Option<Residue> = None;
                if s3.state() != FftState::FftedForFma {
                    if options.contains(Options::FFT_S3) {
                        self.fft_for_fma(s3)?;
                    } else {
                        let mut scratch = self.alloc()?;
                        scratch.assign(s3);
                        self.fft_for_fma(&mut scratch)?;
                        scratch_holder = Some(scratch);
                    }
                }
                let fma_ref: &Residue = scratch_holder.as_ref().unwrap_or(s3);
                let fma = Some((fma_ref, sign));
                self.mul_core_inner_with_fma(&setup, s1, s2, dst, fma, options)
            }
            ModKind::Mmgw(_) => {
                // The add is a plain digit add after the Montgomery
                // product.
                let mut tmp = self.alloc()?;
                tmp.assign(s3);
                self.mul_core(s1, Second::Src(s2), dst, Some((&tmp, sign)), options)
            }
        }
    }

    fn mul_core_inner_with_fma(
        &mut self,
        setup: &Arc<Setup>,
        s1: &mut Residue,
        s2: &mut Residue,
        dst: &mut Residue,
        fma: Option<(&Residue, f64)>,
        options: Options,
    ) -> Result<(), Error> {
        match &setup.kind {
            ModKind::Special | ModKind::Raw => {
                self.mul_core_transform(setup, s1, Second::Src(s2), dst, fma, options)
            }
            ModKind::Barrett(state) => {
                self.mul_core_transform(setup, s1, Second::Src(s2), dst, fma, options)?;
                state.reduce(dst.spectrum_mut());
                dst.extra_bits = 0.0;
                Ok(())
            }
            ModKind::Mmgw(_) => unreachable!("MMGW fma goes through mul_core"),
        }
    }

    fn take_careful_cache(&mut self) -> Result<(Residue, Residue), Error> {
        if let Some(cache) = self.careful_cache.take() {
            return Ok(cache);
        }

        // Fixed-seed random value; cached with its square. Only the
        // payload words are filled so that zero-padded products fit.
        let mut r = self.alloc()?;
        {
            let setup = Arc::clone(self.setup_ref()?);
            let half = setup.shape.fft_len / 2;
            let mut state = 0x9e3779b97f4a7c15u64;
            let digits = r.digits_mut();
            for (i, d) in digits.iter_mut().enumerate() {
                let in_payload = if setup.n > 0 {
                    setup.tables.digit_pos[i] < setup.n
                } else {
                    i < half
                };
                if !in_payload {
                    break;
                }
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                let base = setup.tables.word_base[i] as u64;
                *d = (state % base) as f64 - (base / 2) as f64;
            }
        }
        let mut r_sq = self.alloc()?;
        let mut r2 = self.alloc()?;
        r2.assign(&r);
        self.mul_core(&mut r2, Second::Square, &mut r_sq, None, Options::NONE)?;
        Ok((r, r_sq))
    }
}

// ======================================================================
// Context - PUBLIC - linear family

impl Context {
    /// `dst = s1 + s2`, unnormalized.
    pub fn add3(
        &mut self,
        s1: &mut Residue,
        s2: &mut Residue,
        dst: &mut Residue,
        options: Options,
    ) -> Result<(), Error> {
        self.linear_core(s1, s2, dst, 1.0, options)
    }

    /// `dst = s1 − s2`, unnormalized.
    pub fn sub3(
        &mut self,
        s1: &mut Residue,
        s2: &mut Residue,
        dst: &mut Residue,
        options: Options,
    ) -> Result<(), Error> {
        self.linear_core(s1, s2, dst, -1.0, options)
    }

    /// `d1 = s1 + s2` and `d2 = s1 − s2` in one pass.
    pub fn addsub4(
        &mut self,
        s1: &mut Residue,
        s2: &mut Residue,
        d1: &mut Residue,
        d2: &mut Residue,
        options: Options,
    ) -> Result<(), Error> {
        self.linear_core(s1, s2, d1, 1.0, options)?;
        self.linear_core(s1, s2, d2, -1.0, options)
    }

    fn linear_core(
        &mut self,
        s1: &mut Residue,
        s2: &mut Residue,
        dst: &mut Residue,
        sign: f64,
        _options: Options,
    ) -> Result<(), Error> {
        let setup = Arc::clone(self.setup_ref()?);
        let engine = &setup.transformer.engine;

        // Matching domains add linearly; otherwise operate on
        // transformed copies in dst/scratch.
        let spectral = matches!(
            s1.state(),
            FftState::FullyFfted | FftState::FftedForFma
        ) || matches!(s2.state(), FftState::FullyFfted | FftState::FftedForFma);

        if !spectral && s1.state() == FftState::NotFfted && s2.state() == FftState::NotFfted {
            dst.assign(s1);
            let n = setup.shape.fft_len;
            let s2_digits: &[f64] = &s2.spectrum()[..n];
            for (d, x) in dst.digits_mut().iter_mut().zip(s2_digits) {
                *d += sign * x;
            }
            dst.state = FftState::NotFfted;
        } else {
            dst.assign(s1);
            Context::forward_value(&setup, dst);
            let mut scratch_holder: Option<Residue> = None;
            let spectrum: &[f64] = match s2.state() {
                FftState::FullyFfted | FftState::FftedForFma => s2.spectrum(),
                _ => {
                    let mut scratch = self.alloc()?;
                    scratch.assign(s2);
                    Context::forward_value(&setup, &mut scratch);
                    scratch_holder = Some(scratch);
                    scratch_holder.as_ref().unwrap().spectrum()
                }
            };
            if sign >= 0.0 {
                engine.cadd(dst.spectrum_mut(), spectrum);
            } else {
                engine.csub(dst.spectrum_mut(), spectrum);
            }
            drop(scratch_holder);
            dst.state = FftState::FullyFfted;
            dst.self_check = crate::transform::Transformer::checksum(dst.spectrum());
        }

        // eb = log2(num_adds + 1) combines additively in linear space.
        let combined = (s1.extra_bits().exp2() + s2.extra_bits().exp2()).log2();
        dst.extra_bits = combined;

        // General-mod handles keep values canonical.
        match &setup.kind {
            ModKind::Barrett(state) => {
                if dst.state() != FftState::NotFfted {
                    let params = NormParams::default();
                    let mut fold_scratch = std::mem::take(&mut self.fold_scratch);
                    let maxerr = Context::inverse_and_normalize(
                        &setup,
                        dst,
                        &params,
                        &mut fold_scratch,
                        false,
                    );
                    self.fold_scratch = fold_scratch;
                    self.note_fft(maxerr);
                }
                state.canonicalize_small(dst.spectrum_mut());
                dst.extra_bits = 0.0;
            }
            ModKind::Mmgw(state) => {
                debug_assert_eq!(dst.state(), FftState::NotFfted);
                if dst.extra_bits() > 2.0 {
                    state.canonicalize(dst.spectrum_mut());
                    dst.extra_bits = 0.0;
                }
            }
            ModKind::Special | ModKind::Raw => {}
        }

        Ok(())
    }

    // ============================================================
    // small constants

    /// Adds a small signed integer to a value, spreading the carry
    /// across the lowest words.
    pub fn smalladd(&mut self, addend: i64, value: &mut Residue) -> Result<(), Error> {
        let setup = Arc::clone(self.setup_ref()?);

        if value.state() != FftState::NotFfted {
            let mut tmp = self.alloc()?;
            self.unfft(value, &mut tmp, Options::NONE)?;
            value.assign(&tmp);
        }

        match &setup.kind {
            ModKind::Mmgw(state) => {
                // Montgomery form: the addend enters scaled by R.
                state.smalladd(addend, value.spectrum_mut());
            }
            _ => {
                let n = setup.shape.fft_len;
                let escaped = setup.normalizer.absorb_from(
                    &mut value.spectrum_mut()[..n],
                    0,
                    n,
                    addend as f64,
                );
                setup
                    .normalizer
                    .absorb_wrapped_carry(&mut value.spectrum_mut()[..n], escaped * setup.normalizer.wrap());
                if let ModKind::Barrett(state) = &setup.kind {
                    state.canonicalize_small(value.spectrum_mut());
                }
            }
        }
        Ok(())
    }

    /// Multiplies a value by a small constant, renormalizing.
    pub fn smallmul(&mut self, multiplier: f64, value: &mut Residue) -> Result<(), Error> {
        let setup = Arc::clone(self.setup_ref()?);

        if value.state() != FftState::NotFfted {
            let mut tmp = self.alloc()?;
            self.unfft(value, &mut tmp, Options::NONE)?;
            value.assign(&tmp);
        }

        match &setup.kind {
            ModKind::Mmgw(state) => {
                state.smallmul(multiplier, value.spectrum_mut());
            }
            _ => {
                let params = NormParams {
                    mul_by_const: Some(multiplier),
                    ..NormParams::default()
                };
                let mut fold_scratch = std::mem::take(&mut self.fold_scratch);
                let n = setup.shape.fft_len;
                if setup.shape.kind == TransformKind::ZeroPadded {
                    setup.normalizer.normalize_zero_padded(
                        &mut value.spectrum_mut()[..n],
                        &mut fold_scratch,
                        &params,
                    );
                } else {
                    setup
                        .normalizer
                        .normalize_direct(&mut value.spectrum_mut()[..n], &params);
                }
                self.fold_scratch = fold_scratch;
                if let ModKind::Barrett(state) = &setup.kind {
                    state.reduce(value.spectrum_mut());
                }
            }
        }
        value.extra_bits = 0.0;
        Ok(())
    }
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
    // options

    #[test]
    fn options_combine() {
        let opts = Options::FFT_S1 | Options::START_NEXT_FFT;
        assert!(opts.contains(Options::FFT_S1));
        assert!(opts.contains(Options::START_NEXT_FFT));
        assert!(!opts.contains(Options::FFT_S2));
        assert!(Options::default() == Options::NONE);
    }

    // ============================================================
    // state transitions

    #[test]
    fn fft_s2_leaves_source_transformed() {
        let mut ctx = ctx(1.0, 2, 127, -1);
        let mut a = ctx.from_u64(3).unwrap();
        let mut b = ctx.from_u64(5).unwrap();
        let mut dst = ctx.alloc().unwrap();

        ctx.mul3(&mut a, &mut b, &mut dst, Options::FFT_S2).unwrap();
        assert_eq!(b.state(), crate::FftState::FullyFfted);
        // Default preserves the source.
        assert_eq!(a.state(), crate::FftState::NotFfted);
        assert_eq!(ctx.to_giant(&dst).unwrap(), 15u32.into());
    }

    #[test]
    fn start_next_fft_leaves_partial() {
        let mut ctx = ctx(1.0, 2, 127, -1);
        let mut a = ctx.from_u64(3).unwrap();
        let mut dst = ctx.alloc().unwrap();
        ctx.square3(&mut a, &mut dst, Options::START_NEXT_FFT).unwrap();
        assert_eq!(dst.state(), crate::FftState::PartiallyFfted);
        assert_eq!(ctx.to_giant(&dst).unwrap(), 9u32.into());
    }

    #[test]
    fn unfft_restores_digits() {
        let mut ctx = ctx(1.0, 2, 127, -1);
        let mut a = ctx.from_u64(123456789).unwrap();
        ctx.fft(&mut a).unwrap();
        let mut back = ctx.alloc().unwrap();
        ctx.unfft(&mut a, &mut back, Options::NONE).unwrap();
        assert_eq!(back.state(), crate::FftState::NotFfted);
        assert_eq!(ctx.to_giant(&back).unwrap(), 123456789u32.into());
    }

    // ============================================================
    // eb accounting

    #[test]
    fn adds_accumulate_extra_bits() {
        let mut ctx = ctx(1.0, 2, 127, -1);
        let mut a = ctx.from_u64(10).unwrap();
        let mut b = ctx.from_u64(20).unwrap();
        let mut sum = ctx.alloc().unwrap();
        ctx.add3(&mut a, &mut b, &mut sum, Options::NONE).unwrap();
        assert_eq!(sum.extra_bits(), 1.0);

        let mut sum2 = ctx.alloc().unwrap();
        ctx.add3(&mut sum, &mut b, &mut sum2, Options::NONE).unwrap();
        assert!(sum2.extra_bits() > 1.0 && sum2.extra_bits() < 2.0);
    }
}
