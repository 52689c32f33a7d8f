//! Multi-threaded stress runs against one dispatcher.
//!
//! Every worker keeps a small window of live blocks, each filled with a
//! byte pattern. Blocks are checked before they are freed, so a block handed
//! to two owners at once shows up as corruption. Workers run in waves: every
//! wave's threads exit before the next wave starts, which pushes the
//! per-thread instances through the pool.

use std::ptr::NonNull;
use std::thread;
use std::time::Instant;

use ipcmem_core::{SharedAlloc, SizeClass, VariableAlloc};
use tracing::{debug, info};

use crate::config;
use crate::error::HarnessError;
use crate::report::{BucketHits, StressReport};

/// Knobs for one stress run.
#[derive(Debug, Clone)]
pub struct StressRunner {
    /// Worker threads per wave.
    pub threads: usize,
    /// Waves of workers; each wave starts after the previous one exited.
    pub waves: usize,
    /// Alloc-or-free steps per worker.
    pub iterations: usize,
    /// Root seed for every worker's generator.
    pub seed: u64,
    /// Largest request size, in bytes.
    pub max_size: usize,
    /// Live blocks each worker keeps at most.
    pub live_slots: usize,
}

impl Default for StressRunner {
    fn default() -> Self {
        Self {
            threads: config::default_threads(),
            waves: 2,
            iterations: 10_000,
            seed: 0xC0FF_EE00,
            max_size: 512,
            live_slots: 64,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed | 1 }
    }

    fn next_u64(&mut self) -> u64 {
        // xorshift64*
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn gen_range_usize(&mut self, low: usize, high_inclusive: usize) -> usize {
        let span = high_inclusive - low + 1;
        low + (self.next_u64() as usize % span)
    }
}

#[derive(Clone, Copy)]
struct Block {
    ptr: NonNull<u8>,
    size: usize,
    fill: u8,
}

#[derive(Debug, Default)]
struct WorkerStats {
    allocations: u64,
    frees: u64,
    bytes_requested: u64,
    bucket_hits: Vec<u64>,
    fallback_hits: u64,
}

impl WorkerStats {
    fn merge(&mut self, other: WorkerStats) {
        self.allocations += other.allocations;
        self.frees += other.frees;
        self.bytes_requested += other.bytes_requested;
        self.fallback_hits += other.fallback_hits;
        if self.bucket_hits.len() < other.bucket_hits.len() {
            self.bucket_hits.resize(other.bucket_hits.len(), 0);
        }
        for (mine, theirs) in self.bucket_hits.iter_mut().zip(other.bucket_hits) {
            *mine += theirs;
        }
    }
}

impl StressRunner {
    fn validate(&self) -> Result<(), HarnessError> {
        let checks = [
            (self.threads, "threads"),
            (self.waves, "waves"),
            (self.iterations, "iterations"),
            (self.max_size, "max_size"),
            (self.live_slots, "live_slots"),
        ];
        for (value, name) in checks {
            if value == 0 {
                return Err(HarnessError::InvalidConfig(format!("{name} must be > 0")));
            }
        }
        Ok(())
    }

    /// Run every wave against a fresh default dispatcher.
    pub fn run(&self) -> Result<StressReport, HarnessError> {
        self.run_on(&VariableAlloc::new())
    }

    /// Run every wave against `engine` and report what happened.
    pub fn run_on(&self, engine: &VariableAlloc) -> Result<StressReport, HarnessError> {
        self.validate()?;
        info!(
            threads = self.threads,
            waves = self.waves,
            iterations = self.iterations,
            "starting stress run"
        );

        let started = Instant::now();
        let mut totals = WorkerStats {
            bucket_hits: vec![0; engine.table().classes_size()],
            ..WorkerStats::default()
        };
        for wave in 0..self.waves {
            let stats = self.run_wave(engine, wave)?;
            debug!(wave, allocations = stats.allocations, "wave finished");
            totals.merge(stats);
        }
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let pool = engine.pool_metrics().unwrap_or_default();

        let table = engine.table();
        let bucket_hits = totals
            .bucket_hits
            .iter()
            .enumerate()
            .filter(|(_, hits)| **hits > 0)
            .map(|(bucket, &hits)| BucketHits {
                bucket,
                block_size: table.bucket_size(bucket),
                hits,
            })
            .collect();

        Ok(StressReport {
            title: "ipcmem stress run".to_string(),
            threads: self.threads,
            waves: self.waves,
            iterations: self.iterations,
            seed: self.seed,
            max_size: self.max_size,
            allocations: totals.allocations,
            frees: totals.frees,
            bytes_requested: totals.bytes_requested,
            bucket_hits,
            fallback_hits: totals.fallback_hits,
            elapsed_ms,
            pool,
        })
    }

    fn run_wave(&self, engine: &VariableAlloc, wave: usize) -> Result<WorkerStats, HarnessError> {
        thread::scope(|s| {
            let handles: Vec<_> = (0..self.threads)
                .map(|worker| {
                    let seed = self.worker_seed(wave, worker);
                    s.spawn(move || self.run_worker(engine, worker, seed))
                })
                .collect();

            let mut wave_stats = WorkerStats::default();
            let mut first_error = None;
            for (worker, handle) in handles.into_iter().enumerate() {
                let outcome = handle
                    .join()
                    .unwrap_or(Err(HarnessError::WorkerPanicked(worker)));
                match outcome {
                    Ok(stats) => wave_stats.merge(stats),
                    Err(err) => {
                        first_error.get_or_insert(err);
                    }
                }
            }
            match first_error {
                Some(err) => Err(err),
                None => Ok(wave_stats),
            }
        })
    }

    fn worker_seed(&self, wave: usize, worker: usize) -> u64 {
        let lane = (wave * self.threads + worker) as u64;
        self.seed ^ lane.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
    }

    fn run_worker(
        &self,
        engine: &VariableAlloc,
        worker: usize,
        seed: u64,
    ) -> Result<WorkerStats, HarnessError> {
        let mut rng = XorShift64::new(seed);
        let mut slots: Vec<Option<Block>> = vec![None; self.live_slots];
        let mut stats = WorkerStats {
            bucket_hits: vec![0; engine.table().classes_size()],
            ..WorkerStats::default()
        };

        let mut outcome = Ok(());
        for step in 0..self.iterations {
            let i = rng.gen_range_usize(0, self.live_slots - 1);
            let result = match slots[i].take() {
                Some(block) => release(engine, block, worker, step).map(|()| stats.frees += 1),
                None => {
                    let size = rng.gen_range_usize(1, self.max_size);
                    let fill = (rng.next_u64() & 0xFF) as u8;
                    acquire(engine, size, fill, worker).map(|block| {
                        stats.record(engine.route(size), size);
                        slots[i] = Some(block);
                    })
                }
            };
            if let Err(err) = result {
                outcome = Err(err);
                break;
            }
        }

        for block in slots.into_iter().flatten() {
            let freed = release(engine, block, worker, self.iterations);
            if outcome.is_ok() {
                outcome = freed.map(|()| stats.frees += 1);
            }
        }
        outcome.map(|()| stats)
    }
}

impl WorkerStats {
    fn record(&mut self, route: SizeClass, size: usize) {
        self.allocations += 1;
        self.bytes_requested += size as u64;
        match route {
            SizeClass::Bucket(index) => self.bucket_hits[index] += 1,
            SizeClass::Overflow => self.fallback_hits += 1,
        }
    }
}

fn acquire(
    engine: &VariableAlloc,
    size: usize,
    fill: u8,
    worker: usize,
) -> Result<Block, HarnessError> {
    let ptr = engine
        .alloc(size)
        .ok_or(HarnessError::AllocationFailed { worker, size })?;
    // SAFETY: `alloc` returned at least `size` writable bytes.
    unsafe { ptr.as_ptr().write_bytes(fill, size) };
    Ok(Block { ptr, size, fill })
}

/// Checks the block's pattern, then frees it either way.
fn release(
    engine: &VariableAlloc,
    block: Block,
    worker: usize,
    step: usize,
) -> Result<(), HarnessError> {
    // SAFETY: the block is live and `size` bytes long; only this worker
    // holds it.
    let intact = unsafe { std::slice::from_raw_parts(block.ptr.as_ptr(), block.size) }
        .iter()
        .all(|&b| b == block.fill);
    // SAFETY: same size as the matching `alloc`, freed exactly once.
    unsafe { engine.free(block.ptr, block.size) };
    if intact {
        Ok(())
    } else {
        Err(HarnessError::Corruption {
            worker,
            step,
            size: block.size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_knobs_are_rejected() {
        let runner = StressRunner {
            threads: 0,
            ..StressRunner::default()
        };
        assert!(matches!(runner.run(), Err(HarnessError::InvalidConfig(_))));

        let runner = StressRunner {
            live_slots: 0,
            ..StressRunner::default()
        };
        assert!(matches!(runner.run(), Err(HarnessError::InvalidConfig(_))));
    }

    #[test]
    fn worker_seeds_differ_per_lane() {
        let runner = StressRunner::default();
        let a = runner.worker_seed(0, 0);
        let b = runner.worker_seed(0, 1);
        let c = runner.worker_seed(1, 0);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn single_worker_frees_everything_it_allocates() {
        let runner = StressRunner {
            threads: 1,
            waves: 1,
            iterations: 500,
            ..StressRunner::default()
        };
        let report = runner.run().unwrap();
        assert_eq!(report.allocations, report.frees);
        let routed: u64 = report.bucket_hits.iter().map(|b| b.hits).sum();
        assert_eq!(routed + report.fallback_hits, report.allocations);
    }
}
