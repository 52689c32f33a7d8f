use ipcmem_core::{AllocPolicy, FixedPool, SharedAlloc, ThreadPooled, TypedAlloc, VariableAlloc};
use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread::{self, ThreadId};

#[derive(Clone, Copy, Debug)]
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
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
        assert!(low <= high_inclusive);
        let span = high_inclusive - low + 1;
        low + (self.next_u64() as usize % span)
    }
}

/// Runs `f` on a new thread and waits for it to exit, thread-local
/// destructors included.
fn on_new_thread<'a>(f: impl FnOnce() + Send + 'a) {
    thread::scope(|s| s.spawn(f).join().unwrap());
}

static NEXT_STAMP: AtomicU64 = AtomicU64::new(1);

/// Fixed-size allocator that remembers which thread is driving it.
///
/// Panics if two threads ever drive the same instance without it passing
/// through the pool in between.
#[derive(Debug)]
struct Owned {
    stamp: u64,
    owner: Option<ThreadId>,
    inner: FixedPool<64>,
}

impl Default for Owned {
    fn default() -> Self {
        Self {
            stamp: NEXT_STAMP.fetch_add(1, Ordering::Relaxed),
            owner: None,
            inner: FixedPool::default(),
        }
    }
}

impl Owned {
    fn claim(&mut self) {
        let me = thread::current().id();
        match self.owner {
            None => self.owner = Some(me),
            Some(owner) => assert_eq!(owner, me, "instance {} driven by two threads", self.stamp),
        }
    }
}

impl AllocPolicy for Owned {
    fn alloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        self.claim();
        self.inner.alloc(size)
    }

    unsafe fn free(&mut self, ptr: NonNull<u8>, size: usize) {
        self.claim();
        unsafe { self.inner.free(ptr, size) }
    }

    fn clear(&mut self) {
        self.inner.clear();
    }

    /// Adoption hands the instance to a new thread.
    fn swap(&mut self, other: &mut Self) {
        std::mem::swap(self, other);
        self.owner = None;
    }
}

fn churn_fixed(engine: &ThreadPooled<Owned>, seed: u64, rounds: usize) {
    let mut rng = XorShift64::new(seed);
    let mut live: Vec<NonNull<u8>> = Vec::new();
    for _ in 0..rounds {
        let p = engine.alloc(40).expect("40 bytes fit a 64-byte block");
        unsafe { p.as_ptr().write_bytes(seed as u8, 40) };
        live.push(p);
        if rng.gen_range_usize(0, 2) > 0 {
            let victim = live.swap_remove(rng.gen_range_usize(0, live.len() - 1));
            assert_eq!(unsafe { victim.as_ptr().read() }, seed as u8);
            unsafe { engine.free(victim, 40) };
        }
    }
    for p in live {
        unsafe { engine.free(p, 40) };
    }
}

#[test]
fn two_threads_never_share_an_instance() {
    let engine = ThreadPooled::<Owned>::new();

    thread::scope(|s| {
        let workers: Vec<_> = [11_u64, 29]
            .into_iter()
            .map(|seed| {
                let engine = &engine;
                s.spawn(move || churn_fixed(engine, seed, 1_000))
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
    });

    let m = engine.metrics();
    assert_eq!(m.checked_out(), 0);
    assert_eq!(engine.spare_count() as u64, m.fresh);
    assert!(m.fresh <= 2);
}

#[test]
fn fast_path_takes_no_lock_after_binding() {
    let engine = ThreadPooled::<Owned>::new();
    thread::scope(|s| {
        s.spawn(|| {
            let first = engine.alloc(8).unwrap();
            let bound = engine.metrics().lock_acquisitions;
            for _ in 0..500 {
                let p = engine.alloc(64).unwrap();
                unsafe { engine.free(p, 64) };
            }
            unsafe { engine.free(first, 8) };
            assert_eq!(engine.metrics().lock_acquisitions, bound);
        });
    });
}

#[test]
fn clear_while_held_gives_the_next_thread_a_fresh_instance() {
    let engine = ThreadPooled::<Owned>::new();
    let held = engine.alloc(16).unwrap();

    // Park an instance in the pool, then clear it away.
    on_new_thread(|| {
        let p = engine.alloc(16).unwrap();
        unsafe { engine.free(p, 16) };
    });
    assert_eq!(engine.spare_count(), 1);
    engine.clear();
    assert_eq!(engine.spare_count(), 0);

    let before = engine.metrics();
    let next_stamp = thread::scope(|s| {
        s.spawn(|| {
            let p = engine.alloc(16).unwrap();
            unsafe { engine.free(p, 16) };
            engine.detach_current_thread().map(|o| o.stamp)
        })
        .join()
        .unwrap()
    });
    let after = engine.metrics();
    assert_eq!(after.fresh, before.fresh + 1);
    assert_eq!(after.reused, before.reused);

    // The bound instance survived the clear along with its block.
    unsafe {
        held.as_ptr().write_bytes(0x11, 16);
        engine.free(held, 16);
    }
    let main_stamp = engine.detach_current_thread().map(|o| o.stamp);
    assert!(next_stamp.is_some());
    assert_ne!(next_stamp, main_stamp);
}

/// Fails if the system allocator hands out memory overlapping `block`,
/// i.e. if the chunk behind `block` was returned to it.
fn assert_block_still_reserved(block: NonNull<u8>, len: usize) {
    let layout = Layout::from_size_align(1024, 16).unwrap();
    let start = block.as_ptr() as usize;
    let mut taken = Vec::new();
    for _ in 0..64 {
        let p = unsafe { std::alloc::alloc(layout) };
        assert!(!p.is_null());
        let addr = p as usize;
        assert!(
            addr + layout.size() <= start || start + len <= addr,
            "block at {start:#x} was released while still in use"
        );
        taken.push(p);
    }
    for p in taken {
        unsafe { std::alloc::dealloc(p, layout) };
    }
}

fn alloc_on_new_thread(engine: &ThreadPooled<FixedPool<32>>, fill: u8) -> NonNull<u8> {
    let addr = thread::scope(|s| {
        s.spawn(|| {
            let p = engine.alloc(32).unwrap();
            unsafe { p.as_ptr().write_bytes(fill, 32) };
            p.as_ptr() as usize
        })
        .join()
        .unwrap()
    });
    NonNull::new(addr as *mut u8).unwrap()
}

#[test]
fn clear_keeps_a_block_held_past_its_thread() {
    let engine = ThreadPooled::<FixedPool<32>>::new();
    let held = alloc_on_new_thread(&engine, 0x5A);
    assert_eq!(engine.spare_count(), 1);

    engine.clear();
    assert_eq!(engine.spare_count(), 0);
    assert_block_still_reserved(held, 32);

    let bytes = unsafe { std::slice::from_raw_parts(held.as_ptr(), 32) };
    assert!(bytes.iter().all(|&b| b == 0x5A));
    unsafe { engine.free(held, 32) };
}

#[test]
fn clear_after_a_cross_thread_free_keeps_the_block_usable() {
    let engine = ThreadPooled::<FixedPool<32>>::new();
    let moved = alloc_on_new_thread(&engine, 0x11);

    // Freed here, so it lands on this thread's free list.
    unsafe { engine.free(moved, 32) };
    engine.clear();
    assert_eq!(engine.spare_count(), 0);

    let again = engine.alloc(32).unwrap();
    assert_eq!(again, moved);
    assert_block_still_reserved(again, 32);
    unsafe {
        again.as_ptr().write_bytes(0x22, 32);
        engine.free(again, 32);
    }
}

#[test]
fn thread_outliving_its_engine_drops_the_instance_quietly() {
    let engine = Arc::new(ThreadPooled::<Owned>::new());
    let bound = Arc::new(Barrier::new(2));
    let dropped = Arc::new(Barrier::new(2));

    let worker = {
        let engine = Arc::clone(&engine);
        let bound = Arc::clone(&bound);
        let dropped = Arc::clone(&dropped);
        thread::spawn(move || {
            let p = engine.alloc(32).unwrap();
            unsafe { engine.free(p, 32) };
            assert!(engine.is_bound_here());
            drop(engine);
            bound.wait();
            dropped.wait();
        })
    };

    bound.wait();
    let engine = Arc::try_unwrap(engine).expect("worker released its handle");
    drop(engine);
    dropped.wait();
    worker.join().unwrap();
}

fn churn_dispatcher(engine: &VariableAlloc, seed: u64) {
    const STEPS: usize = 3_000;
    const SLOTS: usize = 48;
    let mut rng = XorShift64::new(seed);
    let mut slots: [Option<(NonNull<u8>, usize, u8)>; SLOTS] = [None; SLOTS];

    for step in 0..STEPS {
        let i = rng.gen_range_usize(0, SLOTS - 1);
        match slots[i].take() {
            Some((p, size, fill)) => {
                let bytes = unsafe { std::slice::from_raw_parts(p.as_ptr(), size) };
                assert!(
                    bytes.iter().all(|&b| b == fill),
                    "seed={seed} step={step}: block of {size} bytes was overwritten"
                );
                unsafe { engine.free(p, size) };
            }
            None => {
                let size = rng.gen_range_usize(1, 600);
                let fill = (rng.next_u64() & 0xFF) as u8;
                let p = engine.alloc(size).expect("allocation");
                unsafe { p.as_ptr().write_bytes(fill, size) };
                slots[i] = Some((p, size, fill));
            }
        }
    }
    for (p, size, _) in slots.into_iter().flatten() {
        unsafe { engine.free(p, size) };
    }
}

#[test]
fn deterministic_sequences_through_the_dispatcher_keep_contents() {
    let engine = VariableAlloc::new();

    thread::scope(|s| {
        let workers: Vec<_> = [1_u64, 2, 3, 4]
            .into_iter()
            .map(|seed| {
                let engine = &engine;
                s.spawn(move || churn_dispatcher(engine, seed))
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
    });

    let m = engine.pool_metrics().expect("pooled buckets report metrics");
    assert_eq!(m.checked_out(), 0);
    assert_eq!(m.checkins, m.fresh + m.reused);
    engine.clear();
}

#[test]
fn typed_vectors_share_one_engine_across_threads() {
    let engine = VariableAlloc::new();
    thread::scope(|s| {
        for t in 0..4_u64 {
            let engine = &engine;
            s.spawn(move || {
                let typed = TypedAlloc::<u64, _>::new(engine);
                for n in 1..=40 {
                    let p = typed.allocate(n).unwrap();
                    unsafe {
                        for k in 0..n {
                            p.add(k).write(t * 1_000 + k as u64);
                        }
                        assert_eq!(p.add(n - 1).read(), t * 1_000 + (n - 1) as u64);
                        typed.deallocate(p, n);
                    }
                }
            });
        }
    });
}
