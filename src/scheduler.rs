//! Cooperative worker pool and the carry-section state machine.
//!
//! Helper threads are created once at setup and sleep on a
//! `work_to_do` event between multiplications. Each parallel phase
//! hands out blocks from an atomic counter; the inverse-transform
//! normalization instead assigns each worker a *carry section* of
//! contiguous words, whose boundary carries flow section to section
//! (wrapping at the top) through the `can_carry_into` event.
//!
//! Results are independent of the worker count: every per-word update
//! is exact integer arithmetic, so only the partitioning differs.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::carry::{NormParams, Normalizer};

// ======================================================================
// CONST - CRATE

/// Transforms below this length always run single-threaded.
pub(crate) const MIN_THREADED_FFT_LEN: usize = 1 << 13;

// ======================================================================
// SendPtr - PRIVATE

/// Raw buffer handle shared across workers. Workers touch disjoint
/// regions; the section table serializes the boundary updates.
#[derive(Clone, Copy)]
struct SendPtr(*mut f64);

unsafe impl Send for SendPtr {}
unsafe impl Sync for SendPtr {}

impl SendPtr {
    /// Reconstructs the full slice. Caller restricts itself to its
    /// assigned region (or holds the section lock).
    unsafe fn slice(&self, len: usize) -> &mut [f64] {
        unsafe { std::slice::from_raw_parts_mut(self.0, len) }
    }
}

// ======================================================================
// WorkerPool - CRATE

struct PoolState {
    job: Option<Arc<dyn Fn(usize) + Send + Sync>>,
    generation: u64,
    active: usize,
    shutdown: bool,
}

struct PoolShared {
    state: Mutex<PoolState>,
    work_to_do: Condvar,
    all_helpers_done: Condvar,
}

/// Persistent helper-thread pool. The main thread participates in
/// every job as worker 0.
///
/// Cloned handles share one pool; concurrent multiplications take
/// turns through the run lock.
pub(crate) struct WorkerPool {
    shared: Arc<PoolShared>,
    run_lock: Mutex<()>,
    handles: Vec<std::thread::JoinHandle<()>>,
    num_workers: usize,
}

impl WorkerPool {
    /// Creates a pool of `threads` workers total (including the
    /// caller); `threads == 1` spawns no helpers.
    pub(crate) fn new(threads: usize) -> Self {
        assert!(threads >= 1);
        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState {
                job: None,
                generation: 0,
                active: 0,
                shutdown: false,
            }),
            work_to_do: Condvar::new(),
            all_helpers_done: Condvar::new(),
        });

        let mut handles = Vec::new();
        for helper in 1..threads {
            let shared = Arc::clone(&shared);
            handles.push(std::thread::spawn(move || helper_loop(shared, helper)));
        }

        Self {
            shared,
            run_lock: Mutex::new(()),
            handles,
            num_workers: threads,
        }
    }

    pub(crate) fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Runs `f(worker_id)` on every worker and returns when all are
    /// done.
    pub(crate) fn run<'env>(&self, f: impl Fn(usize) + Send + Sync + 'env) {
        if self.num_workers == 1 {
            f(0);
            return;
        }

        let _turn = self.run_lock.lock();

        // Lifetime erasure: this frame does not return until every
        // helper has finished with the job.
        let job: Arc<dyn Fn(usize) + Send + Sync + 'env> = Arc::new(f);
        let job: Arc<dyn Fn(usize) + Send + Sync + 'static> = unsafe {
            std::mem::transmute::<
                Arc<dyn Fn(usize) + Send + Sync + 'env>,
                Arc<dyn Fn(usize) + Send + Sync + 'static>,
            >(job)
        };

        {
            let mut state = self.shared.state.lock();
            state.job = Some(job.clone());
            state.generation += 1;
            state.active = self.num_workers - 1;
            self.shared.work_to_do.notify_all();
        }

        job(0);

        // A helper from the previous batch may signal spuriously;
        // recheck the counter every wakeup.
        let mut state = self.shared.state.lock();
        while state.active != 0 {
            self.shared.all_helpers_done.wait(&mut state);
        }
        state.job = None;
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            self.shared.work_to_do.notify_all();
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn helper_loop(shared: Arc<PoolShared>, worker_id: usize) {
    let mut seen_generation = 0u64;
    loop {
        let job = {
            let mut state = shared.state.lock();
            loop {
                if state.shutdown {
                    return;
                }
                if state.generation != seen_generation && state.job.is_some() {
                    seen_generation = state.generation;
                    break state.job.as_ref().unwrap().clone();
                }
                shared.work_to_do.wait(&mut state);
            }
        };

        job(worker_id);

        let mut state = shared.state.lock();
        state.active -= 1;
        if state.active == 0 {
            shared.all_helpers_done.notify_all();
        }
    }
}

// ======================================================================
// FUNCTIONS - CRATE - block distribution

/// Runs `block_fn` once for every block index in `0..num_blocks`,
/// handing blocks out from an atomic counter.
pub(crate) fn par_blocks(pool: &WorkerPool, num_blocks: usize, block_fn: impl Fn(usize, usize) + Send + Sync) {
    let counter = AtomicUsize::new(0);
    pool.run(|worker| loop {
        let block = counter.fetch_add(1, Ordering::Relaxed);
        if block >= num_blocks {
            break;
        }
        block_fn(worker, block);
    });
}

// ======================================================================
// Carry sections - CRATE

/// Section lifecycle during the inverse-transform normalization.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
enum SectionState {
    Untouched,
    Active,
    /// Local pass finished; carries may flow into this section.
    LocalDone,
    Complete,
}

struct Section {
    start: usize,
    end: usize,
    state: SectionState,
    carry_out: f64,
}

struct SectionTable {
    sections: Mutex<Vec<Section>>,
    can_carry_into: Condvar,
}

/// Sectioned carry propagation across the worker pool. Falls back to
/// the single-threaded path for one worker. Returns the maximum
/// observed roundoff.
pub(crate) fn run_carry_sections(
    pool: &WorkerPool,
    norm: &Normalizer,
    buf: &mut [f64],
    params: &NormParams,
) -> f64 {
    let n = norm.fft_len();
    let min_section = 2 * norm.carry_spread().max(2);
    let num_sections = pool.num_workers().min(n / min_section).max(1);

    if num_sections == 1 {
        return norm.normalize_direct(buf, params);
    }

    let mut sections = Vec::with_capacity(num_sections);
    let per = n / num_sections;
    for s in 0..num_sections {
        let start = s * per;
        let end = if s == num_sections - 1 { n } else { start + per };
        sections.push(Section {
            start,
            end,
            state: SectionState::Untouched,
            carry_out: 0.0,
        });
    }
    let table = SectionTable {
        sections: Mutex::new(sections),
        can_carry_into: Condvar::new(),
    };

    let maxerr = Mutex::new(0.0f64);
    let ptr = SendPtr(buf.as_mut_ptr());
    let buf_len = buf.len();

    pool.run(|worker| {
        if worker >= num_sections {
            return;
        }

        // Claim the section and run the local pass.
        let (start, end) = {
            let mut sections = table.sections.lock();
            let section = &mut sections[worker];
            section.state = SectionState::Active;
            (section.start, section.end)
        };
        trace!(worker, start, end, "carry section active");

        // SAFETY: this worker owns words [start, end) until LocalDone;
        // later boundary updates happen under the section lock.
        let slice = unsafe { ptr.slice(buf_len) };
        let (carry_out, local_err) = norm.normalize_range(slice, start..end, params);

        let mut sections = table.sections.lock();
        sections[worker].state = SectionState::LocalDone;
        sections[worker].carry_out = carry_out;
        table.can_carry_into.notify_all();

        // Feed this section's carry into the following sections in
        // word order, wrapping (and sign-folding) at the top.
        let mut target = (worker + 1) % num_sections;
        let mut carry = if worker == num_sections - 1 {
            carry_out * norm.wrap()
        } else {
            carry_out
        };
        while carry != 0.0 {
            while sections[target].state < SectionState::LocalDone {
                table.can_carry_into.wait(&mut sections);
            }
            let (t_start, t_end) = (sections[target].start, sections[target].end);
            // Section lock held: boundary words are stable.
            let slice = unsafe { ptr.slice(buf_len) };
            carry = norm.absorb_from(slice, t_start, t_end, carry);
            target = (target + 1) % num_sections;
            if target == 0 {
                carry *= norm.wrap();
            }
        }

        sections[worker].state = SectionState::Complete;
        drop(sections);

        // Merge the local roundoff statistic under the lock.
        let mut maxerr = maxerr.lock();
        if local_err > *maxerr {
            *maxerr = local_err;
        }
    });

    let maxerr = *maxerr.lock();
    maxerr
}

// ======================================================================
// TESTS

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    // ============================================================
    // WorkerPool

    #[test]
    fn single_worker_runs_inline() {
        let pool = WorkerPool::new(1);
        let hits = AtomicUsize::new(0);
        pool.run(|worker| {
            assert_eq!(worker, 0);
            hits.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn all_workers_participate() {
        let pool = WorkerPool::new(4);
        let mask = AtomicUsize::new(0);
        pool.run(|worker| {
            mask.fetch_or(1 << worker, Ordering::Relaxed);
        });
        assert_eq!(mask.load(Ordering::Relaxed), 0b1111);
    }

    #[test]
    fn pool_survives_many_batches() {
        let pool = WorkerPool::new(3);
        let total = AtomicU64::new(0);
        for _ in 0..100 {
            pool.run(|_| {
                total.fetch_add(1, Ordering::Relaxed);
            });
        }
        assert_eq!(total.load(Ordering::Relaxed), 300);
    }

    // ============================================================
    // par_blocks

    #[test]
    fn par_blocks_covers_every_block_once() {
        let pool = WorkerPool::new(4);
        let flags: Vec<AtomicUsize> = (0..1000).map(|_| AtomicUsize::new(0)).collect();
        par_blocks(&pool, 1000, |_, block| {
            flags[block].fetch_add(1, Ordering::Relaxed);
        });
        assert!(flags.iter().all(|f| f.load(Ordering::Relaxed) == 1));
    }

    // ============================================================
    // carry sections

    #[test]
    fn sectioned_carry_matches_sequential() {
        use crate::{
            engine::EngineKind,
            shape::{Shape, TransformKind},
            weights::WeightTables,
        };
        use std::sync::Arc;

        // 256 digits over 64 words of base 16, mod 2^256 − 1.
        let shape = Shape {
            fft_len: 64,
            kind: TransformKind::Cyclic,
            engine: EngineKind::NoSimd,
            digits_per_word: 0,
        };
        let tables = Arc::new(WeightTables::new(&shape, 2, 256));
        let norm = Normalizer::new(tables, TransformKind::Cyclic, None);

        let raw: Vec<f64> = (0..64)
            .map(|i| (((i * 2654435761usize) % 4001) as f64) - 2000.0)
            .collect();

        let mut sequential = raw.clone();
        norm.normalize_direct(&mut sequential, &NormParams::default());

        let pool = WorkerPool::new(4);
        let mut sectioned = raw.clone();
        run_carry_sections(&pool, &norm, &mut sectioned, &NormParams::default());

        // Same value mod 2^256−1; digits may differ only at exact
        // rounding ties, which these inputs avoid.
        use num_bigint::BigInt;
        let value = |digits: &[f64]| {
            let mut v = BigInt::from(0);
            for i in (0..64).rev() {
                v *= 16;
                v += BigInt::from(digits[i] as i64);
            }
            v
        };
        let m = (BigInt::from(1) << 256) - 1;
        assert_eq!((value(&sequential) - value(&sectioned)) % m, BigInt::from(0));
    }
}
