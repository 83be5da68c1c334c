//! Connection gate for the push channel
//!
//! Reconnect requests are debounced (the newest request supersedes older
//! ones) and attempts are spaced by a cooldown. Time is passed in so the
//! gate can be driven deterministically.

use std::time::{Duration, Instant};

/// What to do with a connection request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Connect now
    Proceed,
    /// A newer request exists
    Superseded,
    /// An attempt is already running
    InFlight,
    /// Wait this long, then ask again
    CoolingDown(Duration),
}

#[derive(Debug, Clone)]
pub struct ConnectGate {
    debounce: Duration,
    cooldown: Duration,
    generation: u64,
    last_attempt: Option<Instant>,
    connecting: bool,
}

impl ConnectGate {
    pub fn new(debounce: Duration, cooldown: Duration) -> Self {
        Self {
            debounce,
            cooldown,
            generation: 0,
            last_attempt: None,
            connecting: false,
        }
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Register a connection request and get its ticket
    pub fn request(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    pub fn is_current(&self, ticket: u64) -> bool {
        ticket == self.generation
    }

    /// Decide whether the request behind `ticket` may connect at `now`
    pub fn begin(&mut self, ticket: u64, now: Instant) -> GateDecision {
        if !self.is_current(ticket) {
            return GateDecision::Superseded;
        }
        if self.connecting {
            return GateDecision::InFlight;
        }
        if let Some(last) = self.last_attempt {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.cooldown {
                return GateDecision::CoolingDown(self.cooldown - elapsed);
            }
        }
        self.connecting = true;
        self.last_attempt = Some(now);
        GateDecision::Proceed
    }

    /// Mark the running attempt as finished
    pub fn finish(&mut self) {
        self.connecting = false;
    }
}
