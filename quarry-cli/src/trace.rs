//! Run trace persistence.

use quarry_core::ResearchTrace;
use std::path::{Path, PathBuf};

/// Write `trace` as `<dir>/<run_id>.json`, creating `dir` if needed.
pub fn write_trace(dir: &Path, trace: &ResearchTrace) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.json", trace.run_id));
    std::fs::write(&path, serde_json::to_string_pretty(trace)?)?;
    Ok(path)
}
