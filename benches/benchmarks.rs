use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use ibdwt::{
    engine::{Engine, EngineKind, Naive, NoSimd},
    Context, Options, Settings, VERSION,
};

// ======================================================================
// UTIL

fn random_value(ctx: &mut Context, seed: u8) -> ibdwt::Residue {
    let mut rng = ChaCha8Rng::from_seed([seed; 32]);
    let bits = match ctx.shape() {
        Some(_) => 1usize << 14,
        None => 1024,
    };
    let mut bytes = vec![0u8; bits / 8];
    rng.fill(&mut bytes[..]);
    let x = num_bigint::BigUint::from_bytes_le(&bytes);
    ctx.from_giant(&x).unwrap()
}

fn special_ctx(engine: EngineKind, n: u64) -> Context {
    let mut ctx = Context::init(
        VERSION,
        Settings {
            engine_override: Some(engine),
            ..Settings::default()
        },
    );
    ctx.setup_special(1.0, 2, n, -1).unwrap();
    ctx
}

// ======================================================================
// BENCHMARKS - SQUARING

fn benchmarks_squaring(c: &mut Criterion) {
    let mut group = c.benchmark_group("square");

    for n in [21701u64, 86243, 216091, 859433] {
        for engine in [EngineKind::NoSimd, EngineKind::Fma] {
            let mut ctx = special_ctx(engine, n);
            let fft_len = ctx.shape().unwrap().fft_len;
            group.throughput(Throughput::Elements(fft_len as u64));

            let mut x = random_value(&mut ctx, 1);
            let mut dst = ctx.alloc().unwrap();

            let id = format!("{:?}/2^{}-1", engine, n);
            group.bench_function(BenchmarkId::new("square3", &id), |b| {
                b.iter(|| {
                    ctx.square3(&mut x, &mut dst, Options::START_NEXT_FFT)
                        .unwrap();
                    std::mem::swap(&mut x, &mut dst);
                });
            });
        }
    }

    group.finish();
}

// ======================================================================
// BENCHMARKS - ENGINE

fn benchmarks_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine");
    group.sample_size(50);

    let n = 4096;
    let tables = ibdwt::engine::tables::initialize_twiddles(n);
    let mut rng = ChaCha8Rng::from_seed([2; 32]);
    let data: Vec<f64> = (0..2 * n).map(|_| rng.gen_range(-1.0..1.0)).collect();

    let engines: Vec<(&str, Box<dyn Engine>)> = vec![
        ("Naive", Box::new(Naive::new())),
        ("NoSimd", Box::new(NoSimd::new())),
    ];

    for (name, engine) in engines {
        if name == "Naive" {
            group.sample_size(10);
        }
        let mut buf = data.clone();
        group.bench_function(BenchmarkId::new("fft", name), |b| {
            b.iter(|| engine.fft(&mut buf, &tables, false));
        });

        let mut x = data.clone();
        let y = data.clone();
        group.bench_function(BenchmarkId::new("cmul", name), |b| {
            b.iter(|| engine.cmul(&mut x, &y));
        });
    }

    group.finish();
}

// ======================================================================
// BENCHMARKS - GENERAL MOD

fn benchmarks_general_mod(c: &mut Criterion) {
    let mut group = c.benchmark_group("general_mod");
    group.sample_size(20);

    let modulus = num_bigint::BigUint::parse_bytes(
        b"100000000000000000000000000000000000000000000000151",
        10,
    )
    .unwrap();
    let mut ctx = Context::init(VERSION, Settings::default());
    ctx.setup_general_mod(&modulus.to_bytes_le()).unwrap();

    let mut rng = ChaCha8Rng::from_seed([3; 32]);
    let mut bytes = vec![0u8; 20];
    rng.fill(&mut bytes[..]);
    let x = num_bigint::BigUint::from_bytes_le(&bytes);
    let mut a = ctx.from_giant(&x).unwrap();
    let mut b_value = ctx.from_giant(&(&x + 1u32)).unwrap();
    let mut dst = ctx.alloc().unwrap();

    group.bench_function("mmgw_mul", |bench| {
        bench.iter(|| {
            ctx.mul3(&mut a, &mut b_value, &mut dst, Options::NONE)
                .unwrap();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmarks_squaring,
    benchmarks_engine,
    benchmarks_general_mod
);
criterion_main!(benches);
