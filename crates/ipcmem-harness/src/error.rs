use thiserror::Error;

/// Why a stress run could not complete.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("invalid run configuration: {0}")]
    InvalidConfig(String),
    #[error("allocation of {size} bytes failed on worker {worker}")]
    AllocationFailed { worker: usize, size: usize },
    #[error("worker {worker}: block of {size} bytes was overwritten before step {step}")]
    Corruption {
        worker: usize,
        step: usize,
        size: usize,
    },
    #[error("worker {0} panicked")]
    WorkerPanicked(usize),
}
