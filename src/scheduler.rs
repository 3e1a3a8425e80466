//! Deferred actions and interval timers for the control loop.
//!
//! HTTP handlers never restart the chip themselves: they schedule a
//! [`DeferredAction`] and return, so the response is flushed before the
//! reset. The control loop drains the queue on every tick.
//!
//! ```text
//! ┌────────────┐  schedule()   ┌─────────────┐  tick(now)  ┌────────────┐
//! │  handler   │ ────────────▶ │ ActionQueue │ ──────────▶ │ main loop  │
//! │ (httpd)    │               │  (1 slot)   │   Some(a)   │ restart()  │
//! └────────────┘               └─────────────┘             └────────────┘
//! ```
//!
//! An action fires only once the loop has observed it on an earlier tick
//! *and* the grace period has elapsed since it was scheduled.

use log::info;

// ═══════════════════════════════════════════════════════════════
//  Deferred actions
// ═══════════════════════════════════════════════════════════════

/// Work the control loop performs on behalf of a request handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredAction {
    /// Restart the chip into the configured boot partition.
    Reboot,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    action: DeferredAction,
    scheduled_at_ms: u64,
    observed: bool,
}

/// Single-slot deferred-action queue.
#[derive(Debug)]
pub struct ActionQueue {
    pending: Option<Pending>,
    grace_ms: u64,
}

impl ActionQueue {
    pub fn new(grace_ms: u32) -> Self {
        Self {
            pending: None,
            grace_ms: u64::from(grace_ms),
        }
    }

    /// Queue `action`. Returns `false` if the slot is already occupied;
    /// the earlier action is kept.
    pub fn schedule(&mut self, action: DeferredAction, now_ms: u64) -> bool {
        if self.pending.is_some() {
            return false;
        }
        info!("Scheduler: {:?} queued (grace {} ms)", action, self.grace_ms);
        self.pending = Some(Pending {
            action,
            scheduled_at_ms: now_ms,
            observed: false,
        });
        true
    }

    /// Whether an action is waiting to fire.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Call once per control loop tick. Returns the action when it is due.
    pub fn tick(&mut self, now_ms: u64) -> Option<DeferredAction> {
        let pending = self.pending.as_mut()?;
        if !pending.observed {
            pending.observed = true;
            return None;
        }
        if now_ms.saturating_sub(pending.scheduled_at_ms) < self.grace_ms {
            return None;
        }
        let action = pending.action;
        self.pending = None;
        info!("Scheduler: {:?} due", action);
        Some(action)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Interval timer
// ═══════════════════════════════════════════════════════════════

/// Fixed-interval timer polled from the control loop.
#[derive(Debug, Clone, Copy)]
pub struct IntervalTimer {
    interval_ms: u64,
    last_ms: Option<u64>,
}

impl IntervalTimer {
    pub fn new(interval_ms: u32) -> Self {
        Self {
            interval_ms: u64::from(interval_ms),
            last_ms: None,
        }
    }

    /// `true` on the first poll and then once per interval.
    pub fn due(&mut self, now_ms: u64) -> bool {
        match self.last_ms {
            Some(last) if now_ms.saturating_sub(last) < self.interval_ms => false,
            _ => {
                self.last_ms = Some(now_ms);
                true
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
