//! FFT length and transform-type selection.
//!
//! Given the modulus parameters this module picks the smallest transform
//! that keeps the predicted roundoff error safely bounded, choosing
//! between a direct weighted transform (cyclic for `c < 0`, negacyclic
//! for `c > 0`) and a zero-padded transform of twice the logical length.

use once_cell::sync::OnceCell;

use crate::{engine::EngineKind, Error, Settings};

// ======================================================================
// CONST - CRATE

/// Smallest supported transform length.
pub(crate) const MIN_FFT_LEN: usize = 32;

/// Largest supported transform length.
pub(crate) const MAX_FFT_LEN: usize = 1 << 22;

/// Output-word bit budget: a convolution word plus its rounding slack
/// must stay exactly representable in an `f64`.
const OUTPUT_BITS_LIMIT: f64 = 50.0;

// Statistical growth of the convolution sum per doubling of length.
const LENGTH_BITS_FACTOR: f64 = 0.6;

// Extra output bits charged to near-rational big/little distributions.
const PATHOLOGICAL_PENALTY: f64 = 0.3;

// Output-bit bonus of zero-padded shapes (no wraparound accumulation).
const ZERO_PAD_BONUS: f64 = 0.3;

// ======================================================================
// TransformKind - PUBLIC

/// Convolution flavor of a transform shape.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransformKind {
    /// Convolution mod `x^N − 1`; reduction mod `b^n − 1`.
    Cyclic,
    /// Convolution mod `x^N + 1`; reduction mod `b^n + 1`.
    Negacyclic,
    /// Upper half zero; full product recovered, folded in carry step.
    ZeroPadded,
}

// ======================================================================
// Shape - PUBLIC

/// A chosen transform shape: length, flavor and engine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Shape {
    /// Transform length in words.
    pub fft_len: usize,
    /// Convolution flavor.
    pub kind: TransformKind,
    /// Engine that runs the inner passes.
    pub engine: EngineKind,
    /// Base-`b` digits per word for fixed-base shapes
    /// (zero-padded and generic); `0` for variable-base direct shapes.
    pub digits_per_word: u32,
}

// ======================================================================
// LengthRow - CRATE

/// One row of the length table.
#[derive(Clone, Copy, Debug)]
pub(crate) struct LengthRow {
    pub(crate) fft_len: usize,
    /// Largest exponent `n` (at b = 2, |c| = 1) this length can carry.
    pub(crate) max_exp: u64,
}

// ======================================================================
// FUNCTIONS - CRATE - length table

static LENGTH_TABLE: OnceCell<Vec<LengthRow>> = OnceCell::new();

/// Largest sustainable bits-per-input-word at the given length.
pub(crate) fn max_bits_per_word(fft_len: usize) -> f64 {
    (OUTPUT_BITS_LIMIT - LENGTH_BITS_FACTOR * (fft_len as f64).log2()) / 2.0
}

pub(crate) fn length_table() -> &'static [LengthRow] {
    LENGTH_TABLE.get_or_init(|| {
        let mut rows = Vec::new();
        let mut fft_len = MIN_FFT_LEN;
        while fft_len <= MAX_FFT_LEN {
            let max_exp = (fft_len as f64 * max_bits_per_word(fft_len)) as u64;
            rows.push(LengthRow { fft_len, max_exp });
            fft_len *= 2;
        }
        rows
    })
}

// ======================================================================
// FUNCTIONS - CRATE - distribution

/// Returns `true` if the big/little word distribution of `n` over
/// `fft_len` words is close to a rational with a small denominator.
///
/// Such distributions cluster the big words and pay an extra roundoff
/// penalty. Checked fractions go down to sevenths.
pub(crate) fn is_pathological_distribution(n: u64, fft_len: usize) -> bool {
    let frac = (n % fft_len as u64) as f64 / fft_len as f64;
    if frac == 0.0 {
        return false;
    }
    for denom in 2..=7u32 {
        for num in 1..denom {
            if (frac - num as f64 / denom as f64).abs() < 0.01 {
                return true;
            }
        }
    }
    false
}

// ======================================================================
// FUNCTIONS - CRATE - selection

/// Predicted output bits per word for a candidate length.
fn weighted_output_bits(
    payload_bits: f64,
    fft_len: usize,
    b: u32,
    zero_padded: bool,
    pathological: bool,
) -> f64 {
    let bits_per_word = payload_bits / fft_len as f64;
    let mut out = 2.0 * bits_per_word + LENGTH_BITS_FACTOR * (fft_len as f64).log2();
    if b != 2 {
        // Base-b words do not pack bits exactly; charge half a digit.
        out += (b as f64).log2() / 2.0;
    }
    if pathological {
        out += PATHOLOGICAL_PENALTY;
    }
    if zero_padded {
        out -= ZERO_PAD_BONUS;
    }
    out
}

fn find_direct(settings: &Settings, b: u32, n: u64) -> Option<usize> {
    let payload_bits = n as f64 * (b as f64).log2();
    length_table().iter().position(|row| {
        if row.fft_len < settings.minimum_fft_len.max(MIN_FFT_LEN) {
            return false;
        }
        // Every word must carry at least one digit.
        if (row.fft_len as u64) > n {
            return false;
        }
        let pathological = is_pathological_distribution(n, row.fft_len);
        let out = weighted_output_bits(payload_bits, row.fft_len, b, false, pathological);
        out + 2.0 * settings.safety_margin <= OUTPUT_BITS_LIMIT
    })
}

fn find_zero_padded(settings: &Settings, k: f64, b: u32, n: u64, c: i64) -> Option<(usize, u32)> {
    // The zero-padded transform must hold the full product:
    // 2 * (n log2 b + log2 k + |c| guard) + slack bits.
    let log2_b = (b as f64).log2();
    let operand_bits = n as f64 * log2_b + k.log2().max(0.0) + 8.0;
    let product_bits = 2.0 * operand_bits + 64.0;

    for (i, row) in length_table().iter().enumerate() {
        if row.fft_len < settings.minimum_fft_len.max(MIN_FFT_LEN) {
            continue;
        }
        let max_bpw = max_bits_per_word(row.fft_len) - settings.safety_margin;
        let digits_per_word = (max_bpw / log2_b).floor() as u32;
        if digits_per_word == 0 {
            continue;
        }
        let capacity = row.fft_len as f64 * digits_per_word as f64 * log2_b;
        if capacity < product_bits {
            continue;
        }
        // The fold remainder r < k lands in the top words.
        let top_bits = 2.0 * digits_per_word as f64 * log2_b;
        if k.log2().max(0.0) + (c.unsigned_abs() as f64).log2().max(0.0) + 2.0 > top_bits {
            continue;
        }
        let out = weighted_output_bits(product_bits / 2.0, row.fft_len, b, true, false);
        if out + 2.0 * settings.safety_margin <= OUTPUT_BITS_LIMIT {
            return Some((i, digits_per_word));
        }
    }
    None
}

/// Picks the transform shape for `k·b^n + c`.
///
/// The direct weighted transform is admissible only for `k = 1`,
/// `|c| = 1`, where the wraparound is exactly the modular fold; all
/// other special forms use the zero-padded shape with the top-word
/// `k` adjustment.
pub(crate) fn select_special(
    settings: &Settings,
    k: f64,
    b: u32,
    n: u64,
    c: i64,
) -> Result<Shape, Error> {
    if k < 1.0 {
        return Err(Error::KTooSmall { k });
    }
    if k > 9007199254740991.0 || k.fract() != 0.0 {
        return Err(Error::KTooLarge { k });
    }
    if b < 2 || n == 0 || c == 0 {
        return Err(Error::TooSmall);
    }
    // k*b^n + c must exceed 1.
    if k == 1.0 && n == 1 && (b as i64) + c <= 1 {
        return Err(Error::TooSmall);
    }

    let direct_ok = k == 1.0 && (c == 1 || c == -1) && !settings.force_zero_padded;

    let zero_padded = find_zero_padded(settings, k, b, n, c);
    let direct = if direct_ok {
        find_direct(settings, b, n)
    } else {
        None
    };

    let (mut index, kind, digits_per_word) = match (zero_padded, direct) {
        (Some((zi, dpw)), Some(di)) => {
            // Smaller length wins; zero pad wins ties.
            let zlen = length_table()[zi].fft_len;
            let dlen = length_table()[di].fft_len;
            if zlen <= dlen {
                (zi, TransformKind::ZeroPadded, dpw)
            } else if c < 0 {
                (di, TransformKind::Cyclic, 0)
            } else {
                (di, TransformKind::Negacyclic, 0)
            }
        }
        (Some((zi, dpw)), None) => (zi, TransformKind::ZeroPadded, dpw),
        (None, Some(di)) => {
            if c < 0 {
                (di, TransformKind::Cyclic, 0)
            } else {
                (di, TransformKind::Negacyclic, 0)
            }
        }
        (None, None) => return Err(Error::TooLarge),
    };

    // Deliberate up-stepping for paranoid use.
    index += settings.larger_fftlen_count as usize;
    if index >= length_table().len() {
        return Err(Error::TooLarge);
    }
    let row = length_table()[index];

    // Up-stepping a zero-padded shape re-derives the word width.
    let digits_per_word = if kind == TransformKind::ZeroPadded {
        let max_bpw = max_bits_per_word(row.fft_len) - settings.safety_margin;
        (max_bpw / (b as f64).log2()).floor().max(1.0) as u32
    } else {
        digits_per_word
    };

    Ok(Shape {
        fft_len: row.fft_len,
        kind,
        engine: pick_engine(settings),
        digits_per_word,
    })
}

/// Picks a direct weighted shape for `b^n + c`, `|c| = 1`, ignoring
/// the zero-pad preference. Used for the MMGW sub-transforms, which
/// must be the cyclic/negacyclic pair.
pub(crate) fn select_direct(settings: &Settings, b: u32, n: u64, c: i64) -> Result<Shape, Error> {
    debug_assert!(c == 1 || c == -1);
    let index = find_direct(settings, b, n).ok_or(Error::TooLarge)?;
    let row = length_table()[index];
    Ok(Shape {
        fft_len: row.fft_len,
        kind: if c < 0 {
            TransformKind::Cyclic
        } else {
            TransformKind::Negacyclic
        },
        engine: pick_engine(settings),
        digits_per_word: 0,
    })
}

/// Picks a plain-multiplier shape able to hold `max_output_bits` bits
/// of exact product. Used by `setup_without_mod` and Barrett.
pub(crate) fn select_generic(settings: &Settings, max_output_bits: u64) -> Result<Shape, Error> {
    for row in length_table() {
        if row.fft_len < settings.minimum_fft_len.max(MIN_FFT_LEN) {
            continue;
        }
        let max_bpw = max_bits_per_word(row.fft_len) - settings.safety_margin;
        let digits_per_word = max_bpw.floor() as u32;
        if digits_per_word == 0 {
            continue;
        }
        let capacity = row.fft_len as u64 * digits_per_word as u64;
        if capacity >= max_output_bits + 64 {
            return Ok(Shape {
                fft_len: row.fft_len,
                kind: TransformKind::ZeroPadded,
                engine: pick_engine(settings),
                digits_per_word,
            });
        }
    }
    Err(Error::TooLarge)
}

/// Picks the MMGW word size `m`: both `2^m − 1` (cyclic) and `2^m + 1`
/// (negacyclic) must fit the same physical shape, with `2^m` holding a
/// doubled modulus image.
pub(crate) fn select_mmgw_exponent(settings: &Settings, modulus_bits: u64) -> Result<u64, Error> {
    // Lazy Montgomery reduction needs Q > 2·N'.
    let mut m = (modulus_bits + 2).next_multiple_of(MIN_FFT_LEN as u64);
    loop {
        let shape = select_direct(settings, 2, m, -1)?;
        // A word-aligned m keeps the pair rational and identical in
        // layout; the negacyclic twin exists at every length the
        // cyclic does.
        if m % shape.fft_len as u64 == 0 {
            return Ok(m);
        }
        m = m.next_multiple_of(shape.fft_len as u64);
    }
}

// ======================================================================
// FUNCTIONS - PRIVATE - engine choice

fn pick_engine(settings: &Settings) -> EngineKind {
    if let Some(kind) = settings.engine_override {
        return kind;
    }

    #[cfg(all(feature = "fma", any(target_arch = "x86", target_arch = "x86_64")))]
    {
        if std::arch::is_x86_feature_detected!("avx2")
            && std::arch::is_x86_feature_detected!("fma")
        {
            return EngineKind::Fma;
        }
    }

    EngineKind::NoSimd
}

// ======================================================================
// TESTS

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            engine_override: Some(EngineKind::NoSimd),
            ..Settings::default()
        }
    }

    // ============================================================
    // length table

    #[test]
    fn length_table_is_increasing() {
        let table = length_table();
        assert_eq!(table[0].fft_len, MIN_FFT_LEN);
        for pair in table.windows(2) {
            assert_eq!(pair[1].fft_len, pair[0].fft_len * 2);
            assert!(pair[1].max_exp > pair[0].max_exp);
        }
    }

    // ============================================================
    // is_pathological_distribution

    #[test]
    fn pathological_distribution() {
        // Exactly half the words big.
        assert!(is_pathological_distribution(96, 64));
        // One third.
        assert!(is_pathological_distribution(1024 + 341, 1024));
        // Exact (rational) distributions are not pathological.
        assert!(!is_pathological_distribution(128, 64));
        // Garden-variety irrational distribution.
        assert!(!is_pathological_distribution(127, 64));
    }

    // ============================================================
    // select_special

    #[test]
    fn mersenne_picks_cyclic() {
        let shape = select_special(&settings(), 1.0, 2, 11213, -1).unwrap();
        assert_eq!(shape.kind, TransformKind::Cyclic);
        assert!(shape.fft_len * 22 >= 11213);
    }

    #[test]
    fn fermat_style_picks_negacyclic() {
        let shape = select_special(&settings(), 1.0, 2, 4096, 1).unwrap();
        assert_eq!(shape.kind, TransformKind::Negacyclic);
    }

    #[test]
    fn proth_k_routes_to_zero_padded() {
        let shape = select_special(&settings(), 3.0, 2, 65, 1).unwrap();
        assert_eq!(shape.kind, TransformKind::ZeroPadded);
        assert!(shape.digits_per_word > 0);
    }

    #[test]
    fn small_c_routes_to_zero_padded() {
        let shape = select_special(&settings(), 1.0, 2, 607, -7).unwrap();
        assert_eq!(shape.kind, TransformKind::ZeroPadded);
    }

    #[test]
    fn larger_fftlen_count_steps_up() {
        let base = select_special(&settings(), 1.0, 2, 11213, -1).unwrap();
        let bigger = select_special(
            &Settings {
                larger_fftlen_count: 2,
                ..settings()
            },
            1.0,
            2,
            11213,
            -1,
        )
        .unwrap();
        assert_eq!(bigger.fft_len, base.fft_len * 4);
    }

    #[test]
    fn minimum_fft_len_is_honored() {
        let shape = select_special(
            &Settings {
                minimum_fft_len: 512,
                ..settings()
            },
            1.0,
            2,
            11213,
            -1,
        )
        .unwrap();
        assert!(shape.fft_len >= 512);
    }

    // ==================================================
    // ERRORS

    #[test]
    fn rejects_bad_k() {
        assert_eq!(
            select_special(&settings(), 0.0, 2, 127, -1),
            Err(Error::KTooSmall { k: 0.0 })
        );
        assert_eq!(
            select_special(&settings(), 1e18, 2, 127, -1),
            Err(Error::KTooLarge { k: 1e18 })
        );
    }

    #[test]
    fn rejects_degenerate() {
        assert_eq!(select_special(&settings(), 1.0, 2, 0, -1), Err(Error::TooSmall));
        assert_eq!(select_special(&settings(), 1.0, 2, 127, 0), Err(Error::TooSmall));
        assert_eq!(select_special(&settings(), 1.0, 2, 1, -1), Err(Error::TooSmall));
    }

    #[test]
    fn rejects_too_large() {
        assert_eq!(
            select_special(&settings(), 1.0, 2, u64::MAX / 2, -1),
            Err(Error::TooLarge)
        );
    }

    // ============================================================
    // select_generic

    #[test]
    fn generic_capacity_grows_with_bits() {
        let small = select_generic(&settings(), 10_000).unwrap();
        let large = select_generic(&settings(), 1_000_000).unwrap();
        assert!(small.fft_len < large.fft_len);
        assert_eq!(small.kind, TransformKind::ZeroPadded);
    }

    // ============================================================
    // select_mmgw_exponent

    #[test]
    fn mmgw_exponent_is_word_aligned() {
        let m = select_mmgw_exponent(&settings(), 170).unwrap();
        assert!(m >= 172);
        let cyclic = select_direct(&settings(), 2, m, -1).unwrap();
        let neg = select_direct(&settings(), 2, m, 1).unwrap();
        assert_eq!(m % cyclic.fft_len as u64, 0);
        assert_eq!(cyclic.fft_len, neg.fft_len);
        assert_eq!(cyclic.kind, TransformKind::Cyclic);
        assert_eq!(neg.kind, TransformKind::Negacyclic);
    }
}
