//! Background age-triggered flush for [`super::HistoryLog`].
//!
//! Grounded on `original_source/memscreen/storage/sqlite.py`'s
//! `BatchWriter`: a deque drained on a timer as well as on size, so a
//! lightly-loaded process doesn't leave rows queued indefinitely.

use std::sync::Arc;
use std::time::Duration;

use super::HistoryLog;

/// Polls a [`HistoryLog`]'s queue and flushes once the oldest entry exceeds
/// `flush_interval`.
pub struct BatchWriter {
    log: Arc<HistoryLog>,
    flush_interval: Duration,
    poll_interval: Duration,
}

impl BatchWriter {
    pub fn new(log: Arc<HistoryLog>) -> Self {
        Self { log, flush_interval: Duration::from_secs(1), poll_interval: Duration::from_millis(100) }
    }

    pub fn with_intervals(log: Arc<HistoryLog>, flush_interval: Duration, poll_interval: Duration) -> Self {
        Self { log, flush_interval, poll_interval }
    }

    /// Spawn the polling task. The returned handle may be aborted at
    /// shutdown; dropping it leaves the task running (tokio semantics).
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.poll_interval);
            loop {
                ticker.tick().await;
                let due = self.log.oldest_queued_age_ms().is_some_and(|age| age as u128 >= self.flush_interval.as_millis());
                if due {
                    if let Err(e) = self.log.flush() {
                        tracing::warn!(error = %e, "history batch flush failed");
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventKind;

    #[tokio::test]
    async fn age_triggered_flush_drains_a_single_queued_row() {
        let log = Arc::new(HistoryLog::open_in_memory().unwrap());
        log.add_history("m1", None, Some("x"), EventKind::Add, None, None, false).unwrap();
        assert_eq!(log.row_count().unwrap(), 0);

        let writer = BatchWriter::with_intervals(log.clone(), Duration::from_millis(20), Duration::from_millis(5));
        let handle = writer.spawn();

        tokio::time::sleep(Duration::from_millis(80)).await;
        handle.abort();

        assert_eq!(log.row_count().unwrap(), 1);
    }
}
