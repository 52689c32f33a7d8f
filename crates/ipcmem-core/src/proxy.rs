//! Per-thread proxies over pooled allocator instances.
//!
//! Each (thread, engine) pair owns one [`Proxy`]. It is created lazily by the
//! first allocation a thread makes against an engine, adopts a spare instance
//! from the engine's pool if there is one, and hands the instance back when
//! the thread exits. Between those two points the thread drives its instance
//! with no synchronization at all.
//!
//! Proxies live in a single thread-local slot map keyed by engine id. Slots
//! whose engine has been dropped are pruned the next time the thread binds a
//! new proxy.

#![allow(unsafe_code)]

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::{Arc, Weak};

use tracing::debug;

use crate::metrics::PoolMetrics;
use crate::policy::AllocPolicy;
use crate::pool::InstancePool;

/// Whether a proxy participates in pool check-in.
#[derive(Debug)]
enum Binding<P> {
    /// Owned by a thread on behalf of an engine; returns its state on drop.
    Bound(Weak<InstancePool<P>>),
    /// Moved-from shell; never touches any pool.
    Unbound,
}

/// Exclusive handle to one allocator instance.
#[derive(Debug)]
pub struct Proxy<P: AllocPolicy> {
    binding: Binding<P>,
    policy: P,
}

impl<P: AllocPolicy> Proxy<P> {
    /// Binds a new proxy to `pool`, adopting a spare instance if available.
    pub fn bind(pool: &Arc<InstancePool<P>>) -> Self {
        let mut policy = P::default();
        match pool.checkout() {
            Some(mut spare) => {
                policy.swap(&mut spare);
                PoolMetrics::inc(&pool.metrics().reused);
                debug!(engine = pool.id(), "proxy adopted a spare allocator instance");
            }
            None => {
                PoolMetrics::inc(&pool.metrics().fresh);
                debug!(engine = pool.id(), "proxy started from a fresh allocator instance");
            }
        }
        Self {
            binding: Binding::Bound(Arc::downgrade(pool)),
            policy,
        }
    }

    /// A default-constructed shell with no engine behind it.
    #[must_use]
    pub fn unbound() -> Self {
        Self {
            binding: Binding::Unbound,
            policy: P::default(),
        }
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        matches!(self.binding, Binding::Bound(_))
    }

    /// Moves the instance out and leaves an unbound shell behind.
    ///
    /// The shell performs no check-in when dropped, so the moved state can
    /// never be returned to the pool twice.
    pub fn unbind(&mut self) -> P {
        self.binding = Binding::Unbound;
        std::mem::take(&mut self.policy)
    }

    pub fn alloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        self.policy.alloc(size)
    }

    /// # Safety
    ///
    /// Same contract as [`AllocPolicy::free`].
    pub unsafe fn free(&mut self, ptr: NonNull<u8>, size: usize) {
        // SAFETY: forwarded caller contract.
        unsafe { self.policy.free(ptr, size) }
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut P {
        &mut self.policy
    }

    fn is_orphaned(&self) -> bool {
        match &self.binding {
            Binding::Bound(pool) => pool.strong_count() == 0,
            Binding::Unbound => true,
        }
    }
}

impl<P: AllocPolicy> Drop for Proxy<P> {
    fn drop(&mut self) {
        let Binding::Bound(pool) = &self.binding else {
            return;
        };
        // The engine may already be gone; its instance then dies with us.
        let Some(pool) = pool.upgrade() else {
            return;
        };
        let policy = std::mem::take(&mut self.policy);
        pool.checkin(policy);
        debug!(engine = pool.id(), "proxy returned its allocator instance");
    }
}

/// Type-erased view of a `Proxy<P>` stored in the thread's slot map.
trait Slot: Any {
    fn is_orphaned(&self) -> bool;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<P: AllocPolicy> Slot for Proxy<P> {
    fn is_orphaned(&self) -> bool {
        Proxy::is_orphaned(self)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

type SlotMap = HashMap<u64, Box<dyn Slot>>;

thread_local! {
    static SLOTS: RefCell<SlotMap> = RefCell::new(HashMap::new());
}

/// Runs `op` against this thread's proxy for `pool`, binding one on first use.
///
/// When the slot map is unreachable (the thread is tearing down its
/// thread-locals, or `op` re-entered the engine) the call is served by a
/// transient proxy that is checked back in as soon as `op` returns.
pub(crate) fn with_local<P, R>(
    pool: &Arc<InstancePool<P>>,
    mut op: impl FnMut(&mut Proxy<P>) -> R,
) -> R
where
    P: AllocPolicy,
{
    let served = SLOTS
        .try_with(|cell| {
            let mut slots = cell.try_borrow_mut().ok()?;
            let proxy = local_proxy(&mut slots, pool)?;
            Some(op(proxy))
        })
        .ok()
        .flatten();

    match served {
        Some(result) => result,
        None => {
            let mut transient = Proxy::bind(pool);
            op(&mut transient)
        }
    }
}

/// Removes this thread's proxy for `engine` from the slot map.
pub(crate) fn take_local<P: AllocPolicy>(engine: u64) -> Option<Box<Proxy<P>>> {
    let slot = SLOTS
        .try_with(|cell| cell.try_borrow_mut().ok()?.remove(&engine))
        .ok()
        .flatten()?;
    slot.into_any().downcast::<Proxy<P>>().ok()
}

/// Whether this thread currently holds a proxy for `engine`.
pub(crate) fn has_local(engine: u64) -> bool {
    SLOTS
        .try_with(|cell| cell.try_borrow().is_ok_and(|slots| slots.contains_key(&engine)))
        .unwrap_or(false)
}

fn local_proxy<'a, P: AllocPolicy>(
    slots: &'a mut SlotMap,
    pool: &Arc<InstancePool<P>>,
) -> Option<&'a mut Proxy<P>> {
    let id = pool.id();
    if !slots.contains_key(&id) {
        slots.retain(|_, slot| !slot.is_orphaned());
        slots.insert(id, Box::new(Proxy::bind(pool)));
    }
    slots.get_mut(&id)?.as_any_mut().downcast_mut::<Proxy<P>>()
}
