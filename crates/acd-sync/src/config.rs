use acd_core::DEFAULT_LOG_CAPACITY;
use std::time::Duration;
use url::Url;

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_secs(1);

/// How long to wait before re-establishing a dropped session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    Fixed(Duration),
    /// Doubles per consecutive failed attempt, capped at `max`.
    Backoff {
        initial: Duration,
        max: Duration,
        jitter: bool,
    },
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy::Fixed(DEFAULT_RECONNECT_DELAY)
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (0 for the first retry after a drop).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            ReconnectPolicy::Fixed(delay) => delay,
            ReconnectPolicy::Backoff {
                initial,
                max,
                jitter,
            } => {
                let mut delay = initial.min(max);
                for _ in 0..attempt {
                    delay = next_backoff(delay, max);
                    if delay == max {
                        break;
                    }
                }
                if jitter {
                    delay + jitter_for(delay, attempt)
                } else {
                    delay
                }
            }
        }
    }
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
    let next = current + current;
    if next > max {
        max
    } else {
        next
    }
}

/// Up to a quarter of `delay`, stable per process and attempt so that many
/// clients dropped by the same server restart spread their retries.
fn jitter_for(delay: Duration, attempt: u32) -> Duration {
    let window = delay.as_millis() as u64 / 4;
    if window == 0 {
        return Duration::ZERO;
    }
    let seed = format!("{}:{attempt}", std::process::id());
    let mut hash: u32 = 2166136261;
    for byte in seed.as_bytes() {
        hash ^= *byte as u32;
        hash = hash.wrapping_mul(16777619);
    }
    Duration::from_millis(u64::from(hash) % window)
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Origin the dashboard is served from; the socket and REST URLs derive from it.
    pub origin: Url,
    pub heartbeat_interval: Duration,
    /// `None` disables the stale-connection check and relies on transport close alone.
    pub pong_timeout: Option<Duration>,
    pub reconnect: ReconnectPolicy,
    pub log_capacity: usize,
    pub outbound_capacity: usize,
    pub reconcile_on_reconnect: bool,
    pub close_grace: Duration,
}

impl SyncConfig {
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            pong_timeout: Some(DEFAULT_HEARTBEAT_INTERVAL * 2),
            reconnect: ReconnectPolicy::default(),
            log_capacity: DEFAULT_LOG_CAPACITY,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            reconcile_on_reconnect: true,
            close_grace: DEFAULT_CLOSE_GRACE,
        }
    }

    /// Also rescales the pong timeout to twice the new interval when one is set.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        if self.pong_timeout.is_some() {
            self.pong_timeout = Some(interval * 2);
        }
        self
    }

    pub fn with_pong_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.pong_timeout = timeout;
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self
    }

    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }

    pub fn with_reconcile_on_reconnect(mut self, enabled: bool) -> Self {
        self.reconcile_on_reconnect = enabled;
        self
    }
}
