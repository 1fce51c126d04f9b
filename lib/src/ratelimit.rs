//! Rate limiting for diagnostic output.
//!
//! The classic kernel limiter: allow at most `burst` events per
//! `interval_ms` window, count what was dropped, and report the dropped
//! count once the next window opens. Const-constructible so call sites can
//! keep one `static` limiter per diagnostic source.

use spin::Mutex;

/// Default window length.
pub const DEFAULT_INTERVAL_MS: u64 = 5000;

/// Default events allowed per window.
pub const DEFAULT_BURST: u32 = 10;

struct RateLimitState {
    window_start: u64,
    started: bool,
    printed: u32,
    missed: u64,
}

/// Sliding-window event limiter.
///
/// Time is passed in by the caller (usually from [`crate::clock::ticks_ms`])
/// rather than read internally, so the limiter itself stays pure and
/// testable. A frozen clock simply keeps the limiter inside one window.
pub struct RateLimit {
    name: &'static str,
    interval_ms: u64,
    burst: u32,
    state: Mutex<RateLimitState>,
}

impl RateLimit {
    pub const fn new(name: &'static str, interval_ms: u64, burst: u32) -> Self {
        Self {
            name,
            interval_ms,
            burst,
            state: Mutex::new(RateLimitState {
                window_start: 0,
                started: false,
                printed: 0,
                missed: 0,
            }),
        }
    }

    /// Limiter with the default 5s/10-event policy.
    pub const fn with_defaults(name: &'static str) -> Self {
        Self::new(name, DEFAULT_INTERVAL_MS, DEFAULT_BURST)
    }

    /// Name used in suppression reports.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns true when the caller may proceed with its event.
    ///
    /// A zero interval disables limiting entirely; a zero burst suppresses
    /// every event. When a new window opens and events were dropped in the
    /// previous one, a summary line is logged first.
    pub fn check(&self, now_ms: u64) -> bool {
        if self.interval_ms == 0 {
            return true;
        }

        let mut state = self.state.lock();
        if !state.started {
            state.started = true;
            state.window_start = now_ms;
        }

        if now_ms.saturating_sub(state.window_start) >= self.interval_ms {
            if state.missed > 0 {
                crate::klog_warn!("{}: {} events suppressed", self.name, state.missed);
                state.missed = 0;
            }
            state.window_start = now_ms;
            state.printed = 0;
        }

        if state.printed < self.burst {
            state.printed += 1;
            true
        } else {
            state.missed = state.missed.saturating_add(1);
            false
        }
    }

    /// Events dropped in the current window.
    pub fn missed(&self) -> u64 {
        self.state.lock().missed
    }
}
