//! Allocation engine for the ipcmem shared-memory library.
//!
//! Requests are classified into a fixed set of size classes and served by
//! one bucket allocator per class, so allocations of similar size keep
//! reusing the same arenas. Each bucket gives every thread its own allocator
//! instance and recycles instances of exited threads through a small
//! lock-protected pool.
//!
//! # Architecture
//!
//! - **Contracts** (`policy`): `AllocPolicy` for exclusively-owned instances,
//!   `SharedAlloc` for thread-safe handles
//! - **Instance pool** (`pool`): LIFO spare instances behind one mutex
//! - **Thread-local proxy** (`proxy`): lazily bound per (thread, engine),
//!   returns its instance on thread exit
//! - **Thread-pooled engine** (`pooled`): `SharedAlloc` over any `AllocPolicy`
//! - **Size-class table** (`size_class`): build-time step -> bucket mapping
//! - **Dispatcher** (`dispatch`): routes each size to its bucket or the fallback
//! - **Collaborators** (`fixed`, `system`): free-list bucket and system fallback
//! - **Typed adapter** (`typed`): element-count view for container code
//! - **Configuration** (`config`) and **metrics** (`metrics`)

#![deny(unsafe_code)]

pub mod config;
pub mod dispatch;
pub mod error;
pub mod fixed;
pub mod metrics;
pub mod policy;
pub mod pool;
pub mod pooled;
pub mod proxy;
pub mod size_class;
pub mod system;
pub mod typed;

pub use dispatch::{Bucket, VariableAlloc};
pub use error::EngineError;
pub use fixed::FixedPool;
pub use metrics::{PoolMetrics, PoolSnapshot};
pub use policy::{AllocPolicy, SharedAlloc};
pub use pool::InstancePool;
pub use pooled::ThreadPooled;
pub use proxy::Proxy;
pub use size_class::{SizeClass, SizeClassTable};
pub use system::SystemAlloc;
pub use typed::TypedAlloc;
