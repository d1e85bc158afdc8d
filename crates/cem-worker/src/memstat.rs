//! Per-job memory hygiene (§4.9 "Concurrency control": "after each job,
//! drop working buffers and request a GC cycle; log RSS delta"). Rust has
//! no GC to request; the equivalent here is simply ensuring the job's
//! owned buffers (cleaned body, extraction sources) are dropped before the
//! RSS sample is taken, then logging the delta.

#[cfg(target_os = "linux")]
pub fn rss_kb() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            return rest.trim().trim_end_matches(" kB").trim().parse().ok();
        }
    }
    None
}

#[cfg(not(target_os = "linux"))]
pub fn rss_kb() -> Option<u64> {
    None
}

/// Logs the RSS delta across one job. Call with the `before` sample taken
/// right after claiming the message and the buffers it owned already
/// dropped.
pub fn log_delta(message_id: uuid::Uuid, before_kb: Option<u64>) {
    let after_kb = rss_kb();
    match (before_kb, after_kb) {
        (Some(before), Some(after)) => {
            tracing::debug!(
                %message_id,
                rss_before_kb = before,
                rss_after_kb = after,
                rss_delta_kb = after as i64 - before as i64,
                "job_memory_delta"
            );
        }
        _ => {
            tracing::debug!(%message_id, "job_memory_delta_unavailable");
        }
    }
}
