use crate::config::PollingConfig;
use std::{future::Future, time::Duration};

#[derive(Debug, Clone, Copy)]
pub struct PollSchedule {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl From<&PollingConfig> for PollSchedule {
    fn from(cfg: &PollingConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts,
            interval: Duration::from_millis(cfg.interval_ms),
        }
    }
}

/// Run `check` up to `max_attempts` times, sleeping `interval` between attempts (never after the
/// last). `Ok(Some(v))` as soon as a check settles, `Ok(None)` when attempts run out.
///
/// Check errors end the loop immediately; only an unsettled check is retried.
pub async fn poll_fixed<T, Fut>(
    schedule: PollSchedule,
    mut check: impl FnMut(u32) -> Fut + Send,
) -> eyre::Result<Option<T>>
where
    Fut: Future<Output = eyre::Result<Option<T>>> + Send,
{
    if schedule.max_attempts == 0 {
        eyre::bail!("invalid poll schedule: max_attempts=0");
    }

    for attempt in 1..=schedule.max_attempts {
        if let Some(v) = check(attempt).await? {
            return Ok(Some(v));
        }
        if attempt < schedule.max_attempts {
            tokio::time::sleep(schedule.interval).await;
        }
    }
    Ok(None)
}
