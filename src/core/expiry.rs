//! TTL expiration timer
//!
//! Tracks one countdown per namespace path. A background task wakes every
//! tick, collects the paths whose deadline has passed and sends them on an
//! mpsc channel; whoever owns the namespace decides what "expired" means.
//!
//! TTL values follow the usual key-value store convention:
//! - `ttl > 0`: expire `ttl` seconds from now
//! - `ttl == 0`: expire on the next tick
//! - `ttl < 0`: never expire
//!
//! A deadline too far out to represent is treated as never expiring.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Countdown {
    Immortal,
    Until(Instant),
}

impl Countdown {
    pub fn from_ttl(ttl_secs: i64) -> Self {
        match ttl_secs {
            t if t < 0 => Countdown::Immortal,
            0 => Countdown::Until(Instant::now()),
            t => Instant::now()
                .checked_add(Duration::from_secs(t as u64))
                .map_or(Countdown::Immortal, Countdown::Until),
        }
    }

    /// The later of two countdowns; `Immortal` outlasts any deadline
    pub fn later(self, other: Countdown) -> Countdown {
        match (self, other) {
            (Countdown::Until(a), Countdown::Until(b)) => Countdown::Until(a.max(b)),
            _ => Countdown::Immortal,
        }
    }

    fn is_due(&self, now: Instant) -> bool {
        match self {
            Countdown::Immortal => false,
            Countdown::Until(deadline) => *deadline <= now,
        }
    }
}

#[derive(Debug, Default)]
pub struct ExpiryTimer {
    countdowns: Mutex<HashMap<String, Countdown>>,
}

impl ExpiryTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the countdown for `path`, replacing any previous one
    pub fn arm(&self, path: &str, ttl_secs: i64) {
        self.set(path, Countdown::from_ttl(ttl_secs));
    }

    /// Like [`arm`](Self::arm) but leaves immortal paths immortal
    pub fn refresh(&self, path: &str, ttl_secs: i64) {
        let mut countdowns = self.countdowns.lock();
        if countdowns.get(path) != Some(&Countdown::Immortal) {
            countdowns.insert(path.to_string(), Countdown::from_ttl(ttl_secs));
        }
    }

    pub fn disarm(&self, path: &str) {
        self.countdowns.lock().remove(path);
    }

    /// Push the countdown of `path` out to at least `countdown`
    pub fn extend(&self, path: &str, countdown: Countdown) {
        let mut countdowns = self.countdowns.lock();
        let extended = match countdowns.get(path) {
            Some(current) => current.later(countdown),
            None => countdown,
        };
        countdowns.insert(path.to_string(), extended);
    }

    /// Move the countdown of `old` to `new`; `false` if `old` had none
    pub fn transplant(&self, old: &str, new: &str) -> bool {
        let mut countdowns = self.countdowns.lock();
        match countdowns.remove(old) {
            Some(countdown) => {
                countdowns.insert(new.to_string(), countdown);
                true
            }
            None => false,
        }
    }

    pub fn countdown(&self, path: &str) -> Option<Countdown> {
        self.countdowns.lock().get(path).copied()
    }

    pub fn is_armed(&self, path: &str) -> bool {
        self.countdowns.lock().contains_key(path)
    }

    /// Time left before `path` expires; `None` if untracked or immortal
    pub fn remaining(&self, path: &str) -> Option<Duration> {
        match self.countdown(path)? {
            Countdown::Immortal => None,
            Countdown::Until(deadline) => Some(deadline.saturating_duration_since(Instant::now())),
        }
    }

    pub fn len(&self) -> usize {
        self.countdowns.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.countdowns.lock().is_empty()
    }

    pub(crate) fn set(&self, path: &str, countdown: Countdown) {
        self.countdowns.lock().insert(path.to_string(), countdown);
    }

    /// Remove and return every path whose deadline is at or before `now`
    pub fn collect_expired(&self, now: Instant) -> Vec<String> {
        let mut countdowns = self.countdowns.lock();
        let due: Vec<String> = countdowns
            .iter()
            .filter(|(_, c)| c.is_due(now))
            .map(|(p, _)| p.clone())
            .collect();
        for path in &due {
            countdowns.remove(path);
        }
        due
    }

    /// Start the ticking task; expired paths arrive on the returned channel
    ///
    /// The task stops once the receiver is dropped.
    pub fn spawn(
        self: &Arc<Self>,
        tick: Duration,
    ) -> (mpsc::UnboundedReceiver<String>, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let timer = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                if tx.is_closed() {
                    debug!("expiry receiver dropped, stopping timer");
                    return;
                }

                for path in timer.collect_expired(Instant::now()) {
                    trace!(path = %path, "countdown expired");
                    if tx.send(path).is_err() {
                        return;
                    }
                }
            }
        });

        (rx, handle)
    }
}
