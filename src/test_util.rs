use num_bigint::BigUint;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::{engine::EngineKind, Context, Settings, VERSION};

// ======================================================================
// FUNCTIONS - CRATE

/// Test settings: fixed engine so results don't depend on the host
/// CPU's feature set.
pub(crate) fn test_settings() -> Settings {
    Settings {
        engine_override: Some(EngineKind::NoSimd),
        ..Settings::default()
    }
}

/// A handle set up for `k·b^n + c`.
pub(crate) fn special_ctx(k: f64, b: u32, n: u64, c: i64) -> Context {
    let mut ctx = Context::init(VERSION, test_settings());
    ctx.setup_special(k, b, n, c).unwrap();
    ctx
}

/// A handle set up for an arbitrary modulus.
pub(crate) fn general_ctx(modulus: &BigUint) -> Context {
    let mut ctx = Context::init(VERSION, test_settings());
    ctx.setup_general_mod(&modulus.to_bytes_le()).unwrap();
    ctx
}

/// `k·b^n + c` as a big integer.
pub(crate) fn modulus_of(k: u64, b: u32, n: u64, c: i64) -> BigUint {
    let m = BigUint::from(k) * BigUint::from(b).pow(n as u32);
    if c >= 0 {
        m + BigUint::from(c as u64)
    } else {
        m - BigUint::from(c.unsigned_abs())
    }
}

/// Uniformly random value below `bound`.
pub(crate) fn random_below(rng: &mut ChaCha8Rng, bound: &BigUint) -> BigUint {
    let bytes = (bound.bits() as usize + 7) / 8;
    loop {
        let mut buf = vec![0u8; bytes];
        rng.fill(&mut buf[..]);
        let candidate = BigUint::from_bytes_le(&buf);
        if &candidate < bound {
            return candidate;
        }
    }
}
