//! Report generation for stress runs.

use ipcmem_core::PoolSnapshot;
use serde::{Deserialize, Serialize};

/// Allocations routed to one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketHits {
    pub bucket: usize,
    /// Block size the bucket serves.
    pub block_size: usize,
    pub hits: u64,
}

/// Outcome of a stress run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressReport {
    /// Report title.
    pub title: String,
    pub threads: usize,
    pub waves: usize,
    pub iterations: usize,
    pub seed: u64,
    pub max_size: usize,
    pub allocations: u64,
    pub frees: u64,
    pub bytes_requested: u64,
    /// Buckets that served at least one allocation, by index.
    pub bucket_hits: Vec<BucketHits>,
    /// Allocations that went to the fallback allocator.
    pub fallback_hits: u64,
    /// Wall-clock time for all waves.
    pub elapsed_ms: u64,
    /// Instance-pool counters summed over every bucket.
    pub pool: PoolSnapshot,
}

impl StressReport {
    /// Render the report as markdown.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# {}\n\n", self.title));
        out.push_str(&format!("- Threads: {} x {} waves\n", self.threads, self.waves));
        out.push_str(&format!("- Iterations per worker: {}\n", self.iterations));
        out.push_str(&format!("- Seed: {:#x}\n", self.seed));
        out.push_str(&format!("- Max request: {} bytes\n", self.max_size));
        out.push_str(&format!("- Allocations: {}\n", self.allocations));
        out.push_str(&format!("- Frees: {}\n", self.frees));
        out.push_str(&format!("- Fallback: {}\n", self.fallback_hits));
        out.push_str(&format!("- Elapsed: {} ms\n\n", self.elapsed_ms));

        out.push_str("## Pool\n\n");
        out.push_str(&format!("- Fresh instances: {}\n", self.pool.fresh));
        out.push_str(&format!("- Reused instances: {}\n", self.pool.reused));
        out.push_str(&format!("- Check-ins: {}\n", self.pool.checkins));
        out.push_str(&format!("- Lock acquisitions: {}\n", self.pool.lock_acquisitions));
        out.push_str(&format!("- Still bound: {}\n\n", self.pool.checked_out()));

        out.push_str("| Bucket | Block size | Hits |\n");
        out.push_str("|--------|------------|------|\n");
        for b in &self.bucket_hits {
            out.push_str(&format!("| {} | {} | {} |\n", b.bucket, b.block_size, b.hits));
        }
        out
    }

    /// Render the report as JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }
}
