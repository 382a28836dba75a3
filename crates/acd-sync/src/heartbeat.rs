use std::time::Duration;
use tokio::time::{interval_at, sleep_until, Instant, Interval, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Send a liveness probe now.
    Probe,
    /// The outstanding probe went unanswered past the pong timeout.
    Stale { waited: Duration },
}

#[derive(Debug, Clone, Copy)]
struct Ticket {
    sent_at: Instant,
}

/// Liveness probing for one connected session. Dropping the monitor cancels
/// its timer, so it must not outlive the connection it belongs to.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    ticker: Interval,
    pong_timeout: Option<Duration>,
    outstanding: Option<Ticket>,
    last_pong: Option<Instant>,
}

impl HeartbeatMonitor {
    /// The first probe is due one `interval` after start.
    pub fn start(interval: Duration, pong_timeout: Option<Duration>) -> Self {
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            ticker,
            pong_timeout,
            outstanding: None,
            last_pong: None,
        }
    }

    /// Resolves when there is something to do. Cancel-safe.
    pub async fn next_action(&mut self) -> HeartbeatAction {
        loop {
            match (self.outstanding, self.pong_timeout) {
                (Some(ticket), Some(timeout)) => {
                    let deadline = ticket.sent_at + timeout;
                    tokio::select! {
                        _ = sleep_until(deadline) => {
                            return HeartbeatAction::Stale {
                                waited: Instant::now().saturating_duration_since(ticket.sent_at),
                            };
                        }
                        // at most one probe in flight: ticks are swallowed until it resolves
                        _ = self.ticker.tick() => {}
                    }
                }
                _ => {
                    self.ticker.tick().await;
                    self.outstanding = Some(Ticket {
                        sent_at: Instant::now(),
                    });
                    return HeartbeatAction::Probe;
                }
            }
        }
    }

    /// Records a pong; returns the round trip of the probe it answers, if any.
    pub fn on_pong(&mut self) -> Option<Duration> {
        let now = Instant::now();
        self.last_pong = Some(now);
        self.outstanding
            .take()
            .map(|ticket| now.saturating_duration_since(ticket.sent_at))
    }

    pub fn probe_in_flight(&self) -> bool {
        self.outstanding.is_some()
    }

    pub fn last_pong(&self) -> Option<Instant> {
        self.last_pong
    }
}
