#![doc = include_str!(concat!(env!("OUT_DIR"), "/README-rustdocified.md"))]
#![deny(missing_docs)]

use std::fmt;

pub use crate::{
    context::{Context, Settings},
    ops::Options,
    residue::{FftState, Residue},
    shape::{Shape, TransformKind},
};

use num_bigint::BigUint;

#[cfg(test)]
mod test_util;

mod alloc;
mod carry;
mod context;
mod convert;
mod ops;
mod reduce;
mod residue;
mod scheduler;
mod shape;
mod transform;
mod weights;

pub mod engine;
pub mod resume;

// ======================================================================
// CONST - PUBLIC

/// Library version, checked by [`Context::init`].
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ======================================================================
// Error - PUBLIC

/// Represents all possible errors that can occur in this library.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// Handle used before a successful `setup_*` call.
    NoInit,

    /// [`Context::init`] was given a different library version.
    VersionMismatch {
        /// The version this library was built as.
        expected: String,
        /// The version the caller passed.
        got: String,
    },

    /// `k` is below 1.
    KTooSmall {
        /// Given multiplier.
        k: f64,
    },

    /// `k` is above 2^53 − 1 or not an integer.
    KTooLarge {
        /// Given multiplier.
        k: f64,
    },

    /// The modulus parameters are degenerate (`k·b^n + c ≤ 1`,
    /// `n = 0`, `c = 0`, or a modulus below 2).
    TooSmall,

    /// No supported transform length can carry this modulus.
    TooLarge,

    /// An aligned allocation failed.
    Malloc {
        /// Requested size in bytes.
        bytes: usize,
    },

    /// A transform word was NaN or ±inf when the result was read.
    BadFftData {
        /// First offending word index.
        word: usize,
    },

    /// The configured thread count is zero.
    ZeroThreads,

    /// An internal invariant was violated; the code identifies the
    /// site.
    Internal {
        /// Violation site code.
        code: u32,
    },
}

// ======================================================================
// Error - IMPL DISPLAY

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NoInit => write!(f, "handle used before setup"),

            Error::VersionMismatch { expected, got } => {
                write!(
                    f,
                    "version mismatch: library is {}, caller passed {}",
                    expected, got
                )
            }

            Error::KTooSmall { k } => write!(f, "k too small: {}", k),

            Error::KTooLarge { k } => {
                write!(f, "k too large or not an integer: {}", k)
            }

            Error::TooSmall => write!(f, "modulus parameters are degenerate"),

            Error::TooLarge => write!(f, "no transform length can carry this modulus"),

            Error::Malloc { bytes } => write!(f, "allocation of {} bytes failed", bytes),

            Error::BadFftData { word } => {
                write!(f, "non-finite transform data at word {}", word)
            }

            Error::ZeroThreads => write!(f, "thread count must be at least 1"),

            Error::Internal { code } => write!(f, "internal invariant violated (code {})", code),
        }
    }
}

// ======================================================================
// Error - IMPL ERROR

impl std::error::Error for Error {}

// ======================================================================
// FUNCTIONS - PUBLIC

/// Multiplies two values under an arbitrary modulus in one go,
/// setting up a throw-away [`Context`].
///
/// For repeated arithmetic under one modulus, keep a [`Context`]
/// instead: the transform tables and reduction constants are the
/// expensive part.
pub fn mul_mod(modulus: &BigUint, x: &BigUint, y: &BigUint) -> Result<BigUint, Error> {
    let mut ctx = Context::init(VERSION, Settings::default());
    ctx.setup_general_mod(&modulus.to_bytes_le())?;

    let mut a = ctx.from_giant(x)?;
    let mut b = ctx.from_giant(y)?;
    let mut dst = ctx.alloc()?;
    ctx.mul3(&mut a, &mut b, &mut dst, Options::NONE)?;
    ctx.to_giant(&dst)
}

// ======================================================================
// TESTS

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{self, modulus_of, random_below};
    use num_bigint::BigUint;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    // ============================================================
    // BOUNDARY SCENARIOS

    #[test]
    fn mersenne_squaring_chain() {
        // k=1, b=2, n=127, c=−1; 3 squared once is 9, and seven
        // squarings give 3^128 mod M127.
        let mut ctx = test_util::special_ctx(1.0, 2, 127, -1);
        let m = modulus_of(1, 2, 127, -1);

        let mut x = ctx.from_u64(3).unwrap();
        let mut dst = ctx.alloc().unwrap();
        ctx.square3(&mut x, &mut dst, Options::NONE).unwrap();
        assert_eq!(ctx.to_giant(&dst).unwrap(), BigUint::from(9u32));

        let mut x = ctx.from_u64(3).unwrap();
        for _ in 0..7 {
            let mut next = ctx.alloc().unwrap();
            ctx.square3(&mut x, &mut next, Options::NONE).unwrap();
            x = next;
        }
        let expected = BigUint::from(3u32).modpow(&BigUint::from(128u32), &m);
        assert_eq!(ctx.to_giant(&x).unwrap(), expected);
        assert!(ctx.maxerr() < 0.40);
        assert_eq!(ctx.fft_count(), 8);
    }

    #[test]
    fn proth_multiply() {
        // k=3, b=2, n=65, c=+1: 2·(N−1) ≡ N−2.
        let mut ctx = test_util::special_ctx(3.0, 2, 65, 1);
        let m = modulus_of(3, 2, 65, 1);

        let mut x = ctx.from_u64(2).unwrap();
        let mut y = ctx.from_giant(&(&m - 1u32)).unwrap();
        let mut dst = ctx.alloc().unwrap();
        ctx.mul3(&mut x, &mut y, &mut dst, Options::NONE).unwrap();
        assert_eq!(ctx.to_giant(&dst).unwrap(), &m - 2u32);
    }

    #[test]
    fn general_mod_random_products() {
        // N = 10^50 + 151 via MMGW; products against the reference.
        let m = BigUint::parse_bytes(
            b"100000000000000000000000000000000000000000000000151",
            10,
        )
        .unwrap();
        let mut ctx = test_util::general_ctx(&m);

        let mut rng = ChaCha8Rng::from_seed([7; 32]);
        for _ in 0..50 {
            let a = random_below(&mut rng, &m);
            let b = random_below(&mut rng, &m);
            let mut va = ctx.from_giant(&a).unwrap();
            let mut vb = ctx.from_giant(&b).unwrap();
            let mut dst = ctx.alloc().unwrap();
            ctx.mul3(&mut va, &mut vb, &mut dst, Options::NONE).unwrap();
            assert_eq!(ctx.to_giant(&dst).unwrap(), &a * &b % &m);
        }
    }

    #[test]
    fn forced_zero_pad_matches_direct_path() {
        // k=1, b=2, n=1279, c=−1 both ways.
        let m = modulus_of(1, 2, 1279, -1);
        let mut direct = test_util::special_ctx(1.0, 2, 1279, -1);
        let mut forced = Context::init(
            VERSION,
            Settings {
                force_zero_padded: true,
                ..test_util::test_settings()
            },
        );
        forced.setup_special(1.0, 2, 1279, -1).unwrap();
        assert_eq!(forced.shape().unwrap().kind, TransformKind::ZeroPadded);
        assert_eq!(direct.shape().unwrap().kind, TransformKind::Cyclic);

        let mut rng = ChaCha8Rng::from_seed([9; 32]);
        for _ in 0..5 {
            let a = random_below(&mut rng, &m);
            let b = random_below(&mut rng, &m);

            let mut products = Vec::new();
            for ctx in [&mut direct, &mut forced] {
                let mut va = ctx.from_giant(&a).unwrap();
                let mut vb = ctx.from_giant(&b).unwrap();
                let mut dst = ctx.alloc().unwrap();
                ctx.mul3(&mut va, &mut vb, &mut dst, Options::NONE).unwrap();
                products.push(ctx.to_giant(&dst).unwrap());
            }
            assert_eq!(products[0], products[1]);
            assert_eq!(products[0], &a * &b % &m);
        }
    }

    #[test]
    fn fma_after_unnormalized_adds() {
        // muladd4(a, b, c) with c having 10 unnormalized additions
        // matches the separate multiply and add.
        let mut ctx = test_util::special_ctx(1.0, 2, 127, -1);
        let m = modulus_of(1, 2, 127, -1);
        let mut rng = ChaCha8Rng::from_seed([3; 32]);

        let a = random_below(&mut rng, &m);
        let b = random_below(&mut rng, &m);
        let c0 = random_below(&mut rng, &m);

        let mut va = ctx.from_giant(&a).unwrap();
        let mut vb = ctx.from_giant(&b).unwrap();

        // c accumulates ten adds.
        let mut vc = ctx.from_giant(&c0).unwrap();
        let mut expected_c = c0.clone();
        for _ in 0..10 {
            let mut add = ctx.from_giant(&c0).unwrap();
            let mut next = ctx.alloc().unwrap();
            ctx.add3(&mut vc, &mut add, &mut next, Options::NONE).unwrap();
            vc = next;
            expected_c = (&expected_c + &c0) % &m;
        }
        assert!(vc.extra_bits() > 3.0);

        let mut fused = ctx.alloc().unwrap();
        ctx.muladd4(&mut va, &mut vb, &mut vc, &mut fused, Options::NONE)
            .unwrap();

        let expected = (&a * &b + &expected_c) % &m;
        assert_eq!(ctx.to_giant(&fused).unwrap(), expected);
    }

    // ============================================================
    // UNIVERSAL INVARIANTS

    #[test]
    fn identity_elements() {
        for (k, b, n, c) in [(1.0, 2, 127, -1i64), (3.0, 2, 65, 1), (1.0, 2, 256, 1)] {
            let mut ctx = test_util::special_ctx(k, b, n, c);
            let m = modulus_of(k as u64, b, n, c);
            let x = random_below(&mut ChaCha8Rng::from_seed([1; 32]), &m);

            let mut vx = ctx.from_giant(&x).unwrap();
            let mut one = ctx.from_u64(1).unwrap();
            let mut zero = ctx.from_u64(0).unwrap();

            let mut prod = ctx.alloc().unwrap();
            ctx.mul3(&mut vx, &mut one, &mut prod, Options::NONE).unwrap();
            assert_eq!(ctx.to_giant(&prod).unwrap(), x, "x·1 (mod {})", m);

            let mut sum = ctx.alloc().unwrap();
            ctx.add3(&mut vx, &mut zero, &mut sum, Options::NONE).unwrap();
            assert_eq!(ctx.to_giant(&sum).unwrap(), x, "x+0 (mod {})", m);
        }
    }

    #[test]
    fn distributivity_under_option_permutations() {
        let mut ctx = test_util::special_ctx(1.0, 2, 127, -1);
        let m = modulus_of(1, 2, 127, -1);
        let mut rng = ChaCha8Rng::from_seed([5; 32]);
        let x = random_below(&mut rng, &m);
        let y = random_below(&mut rng, &m);
        let z = random_below(&mut rng, &m);
        let expected = (&x + &y) * &z % &m;

        for options in [
            Options::NONE,
            Options::FFT_S1,
            Options::FFT_S2,
            Options::FFT_S1 | Options::FFT_S2,
            Options::PRESERVE_S1 | Options::PRESERVE_S2,
            Options::START_NEXT_FFT,
        ] {
            // (x + y)·z
            let mut vx = ctx.from_giant(&x).unwrap();
            let mut vy = ctx.from_giant(&y).unwrap();
            let mut vz = ctx.from_giant(&z).unwrap();
            let mut lhs = ctx.alloc().unwrap();
            ctx.addmul4(&mut vx, &mut vy, &mut vz, &mut lhs, options)
                .unwrap();
            assert_eq!(ctx.to_giant(&lhs).unwrap(), expected, "{:?}", options);

            // x·z + y·z
            let mut vx = ctx.from_giant(&x).unwrap();
            let mut vy = ctx.from_giant(&y).unwrap();
            let mut vz = ctx.from_giant(&z).unwrap();
            let mut vz_b = ctx.from_giant(&z).unwrap();
            let mut rhs = ctx.alloc().unwrap();
            ctx.mulmuladd5(&mut vx, &mut vz, &mut vy, &mut vz_b, &mut rhs, options)
                .unwrap();
            assert_eq!(ctx.to_giant(&rhs).unwrap(), expected, "{:?}", options);
        }
    }

    #[test]
    fn squaring_consistency() {
        let mut ctx = test_util::special_ctx(1.0, 2, 127, -1);
        let m = modulus_of(1, 2, 127, -1);
        let x = random_below(&mut ChaCha8Rng::from_seed([8; 32]), &m);
        let expected = &x * &x % &m;

        let mut vx = ctx.from_giant(&x).unwrap();
        let mut via_mul = ctx.alloc().unwrap();
        {
            let mut vx2 = ctx.from_giant(&x).unwrap();
            ctx.mul3(&mut vx, &mut vx2, &mut via_mul, Options::NONE).unwrap();
        }
        let mut via_square = ctx.alloc().unwrap();
        ctx.square3(&mut vx, &mut via_square, Options::NONE).unwrap();
        let mut via_careful = ctx.alloc().unwrap();
        ctx.square3_carefully(&mut vx, &mut via_careful, Options::NONE)
            .unwrap();

        assert_eq!(ctx.to_giant(&via_mul).unwrap(), expected);
        assert_eq!(ctx.to_giant(&via_square).unwrap(), expected);
        assert_eq!(ctx.to_giant(&via_careful).unwrap(), expected);
    }

    #[test]
    fn careful_mul_matches_plain() {
        let mut ctx = test_util::special_ctx(3.0, 2, 65, 1);
        let m = modulus_of(3, 2, 65, 1);
        let mut rng = ChaCha8Rng::from_seed([2; 32]);
        let x = random_below(&mut rng, &m);
        let y = random_below(&mut rng, &m);

        let mut vx = ctx.from_giant(&x).unwrap();
        let mut vy = ctx.from_giant(&y).unwrap();
        let mut careful = ctx.alloc().unwrap();
        ctx.mul3_carefully(&mut vx, &mut vy, &mut careful, Options::NONE)
            .unwrap();
        assert_eq!(ctx.to_giant(&careful).unwrap(), &x * &y % &m);
    }

    #[test]
    fn auto_careful_countdown() {
        let mut ctx = Context::init(
            VERSION,
            Settings {
                careful_count: 2,
                ..test_util::test_settings()
            },
        );
        ctx.setup_special(1.0, 2, 127, -1).unwrap();
        let m = modulus_of(1, 2, 127, -1);

        // Sparse early-iteration input, the careful path's reason to
        // exist.
        let mut x = ctx.from_u64(3).unwrap();
        for _ in 0..4 {
            let mut next = ctx.alloc().unwrap();
            ctx.square3(&mut x, &mut next, Options::NONE).unwrap();
            x = next;
        }
        let expected = BigUint::from(3u32).modpow(&BigUint::from(16u32), &m);
        assert_eq!(ctx.to_giant(&x).unwrap(), expected);
    }

    #[test]
    fn fma_variants_match_separate_ops() {
        let mut ctx = test_util::special_ctx(1.0, 2, 127, -1);
        let m = modulus_of(1, 2, 127, -1);
        let mut rng = ChaCha8Rng::from_seed([11; 32]);
        let a = random_below(&mut rng, &m);
        let b = random_below(&mut rng, &m);
        let c = random_below(&mut rng, &m);
        let d = random_below(&mut rng, &m);

        let cases: Vec<(&str, BigUint)> = vec![
            ("muladd4", (&a * &b + &c) % &m),
            ("mulsub4", ((&a * &b + &m) - &c) % &m),
            ("addmul4", (&a + &b) * &c % &m),
            ("submul4", ((&a + &m) - &b) * &c % &m),
            ("mulmuladd5", (&a * &b + &c * &d) % &m),
            ("mulmulsub5", (&a * &b + (&m * &m) - (&c * &d)) % &m),
        ];

        for (name, expected) in cases {
            let mut va = ctx.from_giant(&a).unwrap();
            let mut vb = ctx.from_giant(&b).unwrap();
            let mut vc = ctx.from_giant(&c).unwrap();
            let mut vd = ctx.from_giant(&d).unwrap();
            let mut dst = ctx.alloc().unwrap();
            match name {
                "muladd4" => ctx.muladd4(&mut va, &mut vb, &mut vc, &mut dst, Options::NONE),
                "mulsub4" => ctx.mulsub4(&mut va, &mut vb, &mut vc, &mut dst, Options::NONE),
                "addmul4" => ctx.addmul4(&mut va, &mut vb, &mut vc, &mut dst, Options::NONE),
                "submul4" => ctx.submul4(&mut va, &mut vb, &mut vc, &mut dst, Options::NONE),
                "mulmuladd5" => {
                    ctx.mulmuladd5(&mut va, &mut vb, &mut vc, &mut vd, &mut dst, Options::NONE)
                }
                "mulmulsub5" => {
                    ctx.mulmulsub5(&mut va, &mut vb, &mut vc, &mut vd, &mut dst, Options::NONE)
                }
                _ => unreachable!(),
            }
            .unwrap();
            assert_eq!(ctx.to_giant(&dst).unwrap(), expected, "{}", name);
        }
    }

    #[test]
    fn addsub_pair() {
        let mut ctx = test_util::special_ctx(1.0, 2, 127, -1);
        let m = modulus_of(1, 2, 127, -1);
        let mut rng = ChaCha8Rng::from_seed([13; 32]);
        let a = random_below(&mut rng, &m);
        let b = random_below(&mut rng, &m);

        let mut va = ctx.from_giant(&a).unwrap();
        let mut vb = ctx.from_giant(&b).unwrap();
        let mut sum = ctx.alloc().unwrap();
        let mut dif = ctx.alloc().unwrap();
        ctx.addsub4(&mut va, &mut vb, &mut sum, &mut dif, Options::NONE)
            .unwrap();
        assert_eq!(ctx.to_giant(&sum).unwrap(), (&a + &b) % &m);
        assert_eq!(ctx.to_giant(&dif).unwrap(), ((&a + &m) - &b) % &m);
    }

    #[test]
    fn small_constant_ops() {
        let mut ctx = test_util::special_ctx(1.0, 2, 127, -1);
        let m = modulus_of(1, 2, 127, -1);

        let mut v = ctx.from_u64(1000).unwrap();
        ctx.smalladd(34, &mut v).unwrap();
        ctx.smallmul(3.0, &mut v).unwrap();
        assert_eq!(ctx.to_giant(&v).unwrap(), BigUint::from(3102u32));

        ctx.smalladd(-5000, &mut v).unwrap();
        assert_eq!(ctx.to_giant(&v).unwrap(), (&m - 1898u32) % &m);
    }

    #[test]
    fn mul_by_const_and_addin_options() {
        let mut ctx = test_util::special_ctx(1.0, 2, 127, -1);
        ctx.set_mul_by_const(3);
        ctx.set_post_addin(0, 2);

        let mut x = ctx.from_u64(10).unwrap();
        let mut y = ctx.from_u64(20).unwrap();
        let mut dst = ctx.alloc().unwrap();
        ctx.mul3(
            &mut x,
            &mut y,
            &mut dst,
            Options::MUL_BY_CONST | Options::ADD_IN_CONST,
        )
        .unwrap();
        // (10·20)·3 + 2.
        assert_eq!(ctx.to_giant(&dst).unwrap(), BigUint::from(602u32));
    }

    #[test]
    fn thread_count_does_not_change_results() {
        // Large enough to engage the worker pool and carry sections.
        let n = 150_000u64;
        let m = modulus_of(1, 2, n, -1);
        let mut rng = ChaCha8Rng::from_seed([17; 32]);
        let a = random_below(&mut rng, &m);
        let b = random_below(&mut rng, &m);

        let mut results = Vec::new();
        for threads in [1usize, 3] {
            let mut ctx = Context::init(
                VERSION,
                Settings {
                    threads,
                    ..test_util::test_settings()
                },
            );
            ctx.setup_special(1.0, 2, n, -1).unwrap();
            let mut va = ctx.from_giant(&a).unwrap();
            let mut vb = ctx.from_giant(&b).unwrap();
            let mut dst = ctx.alloc().unwrap();
            ctx.mul3(&mut va, &mut vb, &mut dst, Options::NONE).unwrap();
            results.push(ctx.to_giant(&dst).unwrap());
        }
        assert_eq!(results[0], results[1]);
        assert_eq!(results[0], &a * &b % &m);
    }

    #[test]
    fn clones_share_tables_and_compute_independently() {
        let mut parent = test_util::special_ctx(1.0, 2, 127, -1);
        let m = modulus_of(1, 2, 127, -1);
        let mut child = parent.clone_handle().unwrap();

        let mut x = parent.from_u64(123).unwrap();
        let mut y = child.from_u64(456).unwrap();
        let mut px = parent.alloc().unwrap();
        let mut cy = child.alloc().unwrap();
        parent.square3(&mut x, &mut px, Options::NONE).unwrap();
        child.square3(&mut y, &mut cy, Options::NONE).unwrap();

        assert_eq!(
            parent.to_giant(&px).unwrap(),
            BigUint::from(123u32 * 123) % &m
        );
        assert_eq!(
            child.to_giant(&cy).unwrap(),
            BigUint::from(456u32 * 456) % &m
        );
        assert_eq!(parent.fft_count(), 1);
        assert_eq!(child.fft_count(), 1);
    }

    // ============================================================
    // general-mod paths

    #[test]
    fn barrett_fallback_for_even_modulus() {
        // An even modulus routes to Barrett.
        let m = BigUint::from(2u64).pow(89) + 2u32;
        let mut ctx = test_util::general_ctx(&m);
        let mut rng = ChaCha8Rng::from_seed([21; 32]);

        for _ in 0..10 {
            let a = random_below(&mut rng, &m);
            let b = random_below(&mut rng, &m);
            let mut va = ctx.from_giant(&a).unwrap();
            let mut vb = ctx.from_giant(&b).unwrap();
            let mut dst = ctx.alloc().unwrap();
            ctx.mul3(&mut va, &mut vb, &mut dst, Options::NONE).unwrap();
            assert_eq!(ctx.to_giant(&dst).unwrap(), &a * &b % &m);
        }
    }

    #[test]
    fn general_mod_linear_ops() {
        let m = BigUint::parse_bytes(b"100000000000000000039", 10).unwrap();
        let mut ctx = test_util::general_ctx(&m);
        let mut rng = ChaCha8Rng::from_seed([23; 32]);
        let a = random_below(&mut rng, &m);
        let b = random_below(&mut rng, &m);

        let mut va = ctx.from_giant(&a).unwrap();
        let mut vb = ctx.from_giant(&b).unwrap();
        let mut sum = ctx.alloc().unwrap();
        ctx.add3(&mut va, &mut vb, &mut sum, Options::NONE).unwrap();
        assert_eq!(ctx.to_giant(&sum).unwrap(), (&a + &b) % &m);

        let mut prod = ctx.alloc().unwrap();
        ctx.muladd4(&mut va, &mut vb, &mut sum, &mut prod, Options::NONE)
            .unwrap();
        assert_eq!(ctx.to_giant(&prod).unwrap(), (&a * &b + (&a + &b)) % &m);
    }

    #[test]
    fn one_shot_mul_mod() {
        let m = BigUint::parse_bytes(b"100000000000000000039", 10).unwrap();
        let x = BigUint::parse_bytes(b"99999999999999999999", 10).unwrap();
        let y = BigUint::parse_bytes(b"12345678901234567891", 10).unwrap();
        assert_eq!(mul_mod(&m, &x, &y).unwrap(), &x * &y % &m);
    }

    #[test]
    fn tiny_general_modulus_is_rejected() {
        let mut ctx = Context::init(VERSION, test_util::test_settings());
        assert_eq!(ctx.setup_general_mod(&[1]), Err(Error::TooSmall));
    }

    #[test]
    fn raw_multiplier_computes_exact_products() {
        // No modulus: the caller gets the exact product back.
        let mut ctx = Context::init(VERSION, test_util::test_settings());
        ctx.setup_without_mod(512).unwrap();

        let mut rng = ChaCha8Rng::from_seed([29; 32]);
        let bound = BigUint::from(1u32) << 200;
        let a = random_below(&mut rng, &bound);
        let b = random_below(&mut rng, &bound);

        let mut va = ctx.from_giant(&a).unwrap();
        let mut vb = ctx.from_giant(&b).unwrap();
        let mut dst = ctx.alloc().unwrap();
        ctx.mul3(&mut va, &mut vb, &mut dst, Options::NONE).unwrap();
        assert_eq!(ctx.to_giant(&dst).unwrap(), &a * &b);
    }

    // ============================================================
    // display

    #[test]
    fn errors_format() {
        assert_eq!(
            Error::BadFftData { word: 7 }.to_string(),
            "non-finite transform data at word 7"
        );
        assert_eq!(
            Error::VersionMismatch {
                expected: "1".into(),
                got: "2".into()
            }
            .to_string(),
            "version mismatch: library is 1, caller passed 2"
        );
        assert!(!Error::TooLarge.to_string().is_empty());
    }
}
