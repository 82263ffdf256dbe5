use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Window name (`requests_per_minute`, ...) to request ceiling.
pub type RateLimits = BTreeMap<String, u32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum RateWindow {
    Minute,
    Hour,
    Day,
}

impl RateWindow {
    pub const ALL: [Self; 3] = [Self::Minute, Self::Hour, Self::Day];

    /// Key under which this window's ceiling is configured.
    pub fn limit_key(self) -> &'static str {
        match self {
            Self::Minute => "requests_per_minute",
            Self::Hour => "requests_per_hour",
            Self::Day => "requests_per_day",
        }
    }

    pub fn duration(self) -> Duration {
        match self {
            Self::Minute => Duration::from_secs(60),
            Self::Hour => Duration::from_secs(3_600),
            Self::Day => Duration::from_secs(86_400),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitExceeded {
    pub window: RateWindow,
    pub limit: u32,
    pub operation: Option<String>,
    /// Time until the oldest counted request leaves the window.
    pub retry_after: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    key: String,
    window: RateWindow,
}

/// Multi-window sliding-window limiter keyed by token fingerprint.
///
/// Each (fingerprint[:operation], window) pair owns its own history of
/// request instants. Histories are pruned on access; [`RateLimiter::sweep`]
/// drops buckets that have gone idle.
#[derive(Debug, Default)]
pub struct RateLimiter {
    histories: Mutex<HashMap<BucketKey, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check every configured window and record the request in each one that
    /// passes. Stops at the first exhausted window without recording there.
    pub fn check_and_record(
        &self,
        fingerprint: &str,
        limits: &RateLimits,
        operation: Option<&str>,
    ) -> Result<(), RateLimitExceeded> {
        self.check_and_record_at(Instant::now(), fingerprint, limits, operation)
    }

    pub(crate) fn check_and_record_at(
        &self,
        now: Instant,
        fingerprint: &str,
        limits: &RateLimits,
        operation: Option<&str>,
    ) -> Result<(), RateLimitExceeded> {
        let key = bucket_key(fingerprint, operation);

        for window in RateWindow::ALL {
            let Some(&limit) = limits.get(window.limit_key()) else {
                continue;
            };

            let mut histories = self
                .histories
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let history = histories
                .entry(BucketKey {
                    key: key.clone(),
                    window,
                })
                .or_default();
            prune(history, now, window);

            if history.len() >= usize::try_from(limit).unwrap_or(usize::MAX) {
                let retry_after = history.front().map_or_else(
                    || window.duration(),
                    |oldest| (*oldest + window.duration()).saturating_duration_since(now),
                );
                tracing::debug!(
                    bucket = %key,
                    %window,
                    limit,
                    "rate limit window exhausted"
                );
                return Err(RateLimitExceeded {
                    window,
                    limit,
                    operation: operation.map(str::to_string),
                    retry_after,
                });
            }

            history.push_back(now);
        }

        Ok(())
    }

    /// Requests currently counted against `window` without recording.
    pub fn usage(&self, fingerprint: &str, operation: Option<&str>, window: RateWindow) -> usize {
        self.usage_at(Instant::now(), fingerprint, operation, window)
    }

    pub(crate) fn usage_at(
        &self,
        now: Instant,
        fingerprint: &str,
        operation: Option<&str>,
        window: RateWindow,
    ) -> usize {
        let mut histories = self
            .histories
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let bucket = BucketKey {
            key: bucket_key(fingerprint, operation),
            window,
        };
        histories.get_mut(&bucket).map_or(0, |history| {
            prune(history, now, window);
            history.len()
        })
    }

    /// Drop buckets with no requests left inside their window.
    /// Returns the number of buckets removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub(crate) fn sweep_at(&self, now: Instant) -> usize {
        let mut histories = self
            .histories
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let before = histories.len();
        histories.retain(|bucket, history| {
            prune(history, now, bucket.window);
            !history.is_empty()
        });
        before - histories.len()
    }

    pub fn bucket_count(&self) -> usize {
        self.histories
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

fn bucket_key(fingerprint: &str, operation: Option<&str>) -> String {
    match operation {
        Some(op) => format!("{fingerprint}:{op}"),
        None => fingerprint.to_string(),
    }
}

fn prune(history: &mut VecDeque<Instant>, now: Instant, window: RateWindow) {
    let Some(cutoff) = now.checked_sub(window.duration()) else {
        return;
    };
    // Only instants strictly older than the window age out.
    while history.front().is_some_and(|t| *t < cutoff) {
        history.pop_front();
    }
}
