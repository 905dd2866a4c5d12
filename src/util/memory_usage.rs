use log::{debug, warn};
use psutil::process::os::linux::ProcessExt;
use std::fmt::Arguments;

const BYTES_IN_GB: f64 = 1024_f64 * 1024_f64 * 1024_f64;

/// Memory of the current process, in GB.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryUsage {
    pub total: f64,
    pub resident: f64,
    pub shared: f64,
}

#[allow(clippy::cast_precision_loss)]
pub fn memory_usage() -> Option<MemoryUsage> {
    let stats = psutil::process::Process::new(std::process::id())
        .and_then(|process| process.procfs_statm());
    match stats {
        Ok(mem) => Some(MemoryUsage {
            total: mem.size as f64 / BYTES_IN_GB,
            resident: mem.resident as f64 / BYTES_IN_GB,
            shared: mem.shared as f64 / BYTES_IN_GB,
        }),
        Err(e) => {
            warn!("Could not read memory usage: {}", e);
            None
        }
    }
}

/// Logs the memory usage of the current process at debug level, tagged with `msg`.
pub fn print_memory_usage(msg: Arguments) {
    if let Some(usage) = memory_usage() {
        debug!(
            "Memory usage: total = {:.6} GB, rss = {:.6} GB, shared = {:.6} GB [{}]",
            usage.total, usage.resident, usage.shared, msg
        );
    }
}
