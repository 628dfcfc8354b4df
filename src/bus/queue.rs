use crate::bus::InboundEvent;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::warn;

const DEFAULT_RATE_LIMIT: usize = 30;
const DEFAULT_RATE_WINDOW_S: f64 = 60.0;

/// Inbound event queue between the transport poll loop and the dispatcher,
/// with per-sender rate limiting so one noisy chat member cannot starve the
/// rest of the tenant.
pub struct EventBus {
    pub inbound_tx: mpsc::UnboundedSender<InboundEvent>,
    inbound_rx: mpsc::UnboundedReceiver<InboundEvent>,
    rate_limit: usize,
    rate_window: Duration,
    sender_timestamps: HashMap<String, Vec<Instant>>,
}

impl EventBus {
    pub fn new(rate_limit: usize, rate_window_secs: f64) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            inbound_tx,
            inbound_rx,
            rate_limit,
            rate_window: Duration::from_secs_f64(rate_window_secs),
            sender_timestamps: HashMap::new(),
        }
    }

    pub fn publish(&mut self, event: InboundEvent) {
        let now = Instant::now();
        let key = event.sender_key();
        let cutoff = now - self.rate_window;

        // Senders quiet for a full window are forgotten, so the map tracks
        // only currently-active senders. Timestamps are appended in order,
        // so checking the newest one is enough.
        self.sender_timestamps
            .retain(|_, ts| ts.last().is_some_and(|&t| t > cutoff));

        let timestamps = self.sender_timestamps.entry(key.clone()).or_default();
        timestamps.retain(|&t| t > cutoff);

        if timestamps.len() >= self.rate_limit {
            warn!(
                "Rate limit hit for {} ({}/{:.0}s), dropping event",
                key,
                self.rate_limit,
                self.rate_window.as_secs_f64()
            );
            return;
        }

        timestamps.push(now);
        let _ = self.inbound_tx.send(event);
    }

    /// Drain one already-queued event without waiting.
    pub fn try_consume(&mut self) -> Option<InboundEvent> {
        self.inbound_rx.try_recv().ok()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_LIMIT, DEFAULT_RATE_WINDOW_S)
    }
}
