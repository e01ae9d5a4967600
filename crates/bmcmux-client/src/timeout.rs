//! Per-provider timeout allocation

use std::time::Duration;

use crate::context::CallContext;

/// Timeout for one provider attempt when the context has no deadline
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Split the context's remaining time evenly across `driver_count` attempts.
///
/// An explicit override wins outright. Without a deadline every attempt gets
/// [`DEFAULT_PROVIDER_TIMEOUT`]. The share is truncated to whole
/// milliseconds; a zero count is treated as one.
pub fn allocate_timeout(
    ctx: &CallContext,
    driver_count: usize,
    explicit: Option<Duration>,
) -> Duration {
    if let Some(timeout) = explicit {
        return timeout;
    }

    let Some(remaining) = ctx.remaining() else {
        return DEFAULT_PROVIDER_TIMEOUT;
    };

    let count = driver_count.max(1) as u128;
    let share = remaining.as_millis() / count;
    Duration::from_millis(u64::try_from(share).unwrap_or(u64::MAX))
}
