use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default minimum spacing between notifications.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

/// Monotonic time source for the cooldown gate.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Production clock backed by `Instant::now`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(|e| e.into_inner());
        self.origin + offset
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Suppresses repeated notifications inside a fixed window.
///
/// The first notification is always permitted. After that, another one is
/// permitted only once strictly more than `window` has elapsed since the last
/// successful notification.
#[derive(Clone, Debug)]
pub struct CooldownGate {
    window: Duration,
    last_notified: Option<Instant>,
}

impl CooldownGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_notified: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn last_notified(&self) -> Option<Instant> {
        self.last_notified
    }

    /// Whether a notification at `now` is allowed.
    pub fn ready(&self, now: Instant) -> bool {
        match self.last_notified {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.window,
        }
    }

    /// Time left until the gate reopens (zero when ready).
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last_notified {
            None => Duration::ZERO,
            Some(last) => {
                let elapsed = now.saturating_duration_since(last);
                if elapsed > self.window {
                    Duration::ZERO
                } else {
                    self.window - elapsed
                }
            }
        }
    }

    /// Record a successful notification.
    pub fn record(&mut self, now: Instant) {
        self.last_notified = Some(now);
    }
}

impl Default for CooldownGate {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}
