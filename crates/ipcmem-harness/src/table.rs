//! Size-class table rendering.

use ipcmem_core::SizeClassTable;
use serde::{Deserialize, Serialize};

/// One table step: the request sizes it covers and where they go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRow {
    pub step: usize,
    pub min_size: usize,
    pub max_size: usize,
    pub bucket: usize,
    pub block_size: usize,
}

/// Full routing table of a dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableReport {
    pub base_size: usize,
    pub classes_size: usize,
    /// Largest size served by a bucket; anything above goes to the fallback.
    pub max_size: usize,
    /// Buckets at least one step routes to.
    pub used_buckets: Vec<usize>,
    pub rows: Vec<TableRow>,
}

impl TableReport {
    #[must_use]
    pub fn new(table: &SizeClassTable) -> Self {
        let base = table.base_size();
        let rows = (0..table.classes_size())
            .filter_map(|step| {
                let max_size = (step + 1) * base;
                let bucket = table.classify(max_size).bucket()?;
                Some(TableRow {
                    step,
                    min_size: step * base + 1,
                    max_size,
                    bucket,
                    block_size: table.bucket_size(bucket),
                })
            })
            .collect();
        Self {
            base_size: base,
            classes_size: table.classes_size(),
            max_size: table.max_size(),
            used_buckets: table.used_buckets().collect(),
            rows,
        }
    }

    /// Render the table as markdown.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str("# Size classes\n\n");
        out.push_str(&format!("- Base size: {} bytes\n", self.base_size));
        out.push_str(&format!("- Classes: {}\n", self.classes_size));
        out.push_str(&format!("- Buckets in use: {}\n", self.used_buckets.len()));
        out.push_str(&format!("- Fallback above: {} bytes\n\n", self.max_size));
        out.push_str("| Step | Sizes | Bucket | Block size |\n");
        out.push_str("|------|-------|--------|------------|\n");
        for r in &self.rows {
            out.push_str(&format!(
                "| {} | {}-{} | {} | {} |\n",
                r.step, r.min_size, r.max_size, r.bucket, r.block_size
            ));
        }
        out
    }

    /// Render the table as JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }
}
