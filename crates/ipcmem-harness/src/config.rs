//! Harness defaults.
//!
//! The worker count can be preset with `IPCMEM_HARNESS_THREADS`; the CLI
//! flag still wins when given.

use std::sync::OnceLock;

/// Worker threads used when neither the flag nor the environment says.
pub const FALLBACK_THREADS: usize = 4;

static DEFAULT_THREADS: OnceLock<usize> = OnceLock::new();

/// Parse a thread count, rejecting zero and garbage.
#[must_use]
pub fn parse_threads(raw: &str) -> Option<usize> {
    raw.trim().parse::<usize>().ok().filter(|&n| n > 0)
}

/// Default worker count (reads the env var on first call, caches thereafter).
#[must_use]
pub fn default_threads() -> usize {
    *DEFAULT_THREADS.get_or_init(|| {
        std::env::var("IPCMEM_HARNESS_THREADS")
            .ok()
            .and_then(|v| parse_threads(&v))
            .unwrap_or(FALLBACK_THREADS)
    })
}

/// Parse a seed given in decimal or `0x` hex, with optional `_` separators.
pub fn parse_seed(raw: &str) -> Result<u64, std::num::ParseIntError> {
    let s = raw.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(&hex.replace('_', ""), 16)
    } else {
        s.replace('_', "").parse::<u64>()
    }
}
