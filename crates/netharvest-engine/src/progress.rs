// crates/netharvest-engine/src/progress.rs
// ============================================================================
// Module: Netharvest Progress Delivery
// Description: Channel-backed progress sinks for completion events.
// Purpose: Deliver per-device completions without ever blocking the pool.
// Dependencies: tokio, netharvest-core
// ============================================================================

//! ## Overview
//! The controller publishes one completion event per finished device. The
//! default sink buffers through an unbounded channel so publication never
//! blocks; the lossy sink bounds its buffer and drops events when the
//! subscriber falls behind, which is acceptable only because the subscriber
//! opted into it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use netharvest_core::CompletionEvent;
use netharvest_core::ProgressSink;
use tokio::sync::mpsc;
use tracing::trace;

// ============================================================================
// SECTION: Buffered Sink
// ============================================================================

/// Default sink: buffers every event, never blocks the publisher.
pub struct BufferedProgress {
    /// Channel sender.
    sender: mpsc::UnboundedSender<CompletionEvent>,
}

impl BufferedProgress {
    /// Creates the sink and its subscriber half.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<CompletionEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender,
            },
            receiver,
        )
    }
}

impl ProgressSink for BufferedProgress {
    fn publish(&self, event: &CompletionEvent) {
        // A dropped subscriber must not affect the run.
        let _ = self.sender.send(event.clone());
    }
}

// ============================================================================
// SECTION: Lossy Sink
// ============================================================================

/// Explicitly lossy sink: bounded buffer, slow subscribers miss events.
pub struct LossyProgress {
    /// Channel sender.
    sender: mpsc::Sender<CompletionEvent>,
}

impl LossyProgress {
    /// Creates the sink with the given buffer capacity.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<CompletionEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender,
            },
            receiver,
        )
    }
}

impl ProgressSink for LossyProgress {
    fn publish(&self, event: &CompletionEvent) {
        if self.sender.try_send(event.clone()).is_err() {
            trace!(index = event.index, "dropping progress event for slow subscriber");
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use netharvest_core::DeviceDisposition;
    use netharvest_core::DeviceId;
    use netharvest_core::DeviceOutcome;

    use super::*;

    fn event(index: u64) -> CompletionEvent {
        CompletionEvent {
            index,
            total: 10,
            outcome: DeviceOutcome {
                device_id: DeviceId::from_raw(index.max(1)).expect("id"),
                device_name: format!("device-{index}"),
                host: "192.0.2.1".to_string(),
                disposition: DeviceDisposition::Success,
                duration_ms: 5,
                output: String::new(),
                failure: None,
                skip: None,
                credential_id: None,
                warnings: Vec::new(),
                validation: None,
                capture_path: None,
            },
        }
    }

    #[test]
    fn buffered_sink_retains_all_events() {
        let (sink, mut receiver) = BufferedProgress::channel();
        for index in 1 ..= 100 {
            sink.publish(&event(index));
        }
        let mut seen = 0;
        while receiver.try_recv().is_ok() {
            seen += 1;
        }
        assert_eq!(seen, 100);
    }

    #[test]
    fn lossy_sink_drops_beyond_capacity() {
        let (sink, mut receiver) = LossyProgress::channel(4);
        for index in 1 ..= 100 {
            sink.publish(&event(index));
        }
        let mut seen = 0;
        while receiver.try_recv().is_ok() {
            seen += 1;
        }
        assert_eq!(seen, 4);
    }

    #[test]
    fn publishing_after_subscriber_drop_is_harmless() {
        let (sink, receiver) = BufferedProgress::channel();
        drop(receiver);
        sink.publish(&event(1));
    }
}
