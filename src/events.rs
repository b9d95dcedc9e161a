//! Asynchronous condition reporting.
//!
//! Sample loss never stops the stream; capture favors continuity over
//! completeness. Conditions are queued for the consumer to read at its
//! own pace.

use crossbeam_channel::{Receiver, Sender, bounded};

use crate::constants::EVENT_QUEUE_DEPTH;

/// Conditions surfaced while streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEvent {
    /// Delivered sample indices skipped forward; `missing` samples are
    /// permanently lost.
    Gap { channel: usize, missing: u64 },
    /// Delivered sample indices moved backwards. The data was not merged.
    Rewind { channel: usize, overlap: u64 },
    /// The ring filled and the newest samples are being dropped. Emitted
    /// once per overflow episode.
    Overflow { channel: usize },
    /// Hardware ADC overload notification.
    Overload { channel: usize },
    /// A queued tuner mode change was applied.
    ModeChangeApplied { channel: usize },
}

pub(crate) fn event_queue() -> (EventSender, Receiver<SourceEvent>) {
    let (tx, rx) = bounded(EVENT_QUEUE_DEPTH);
    (EventSender { tx }, rx)
}

/// Send side of the event queue. Never blocks: the callback thread
/// drops events when the consumer falls this far behind.
#[derive(Clone)]
pub(crate) struct EventSender {
    tx: Sender<SourceEvent>,
}

impl EventSender {
    pub(crate) fn emit(&self, event: SourceEvent) {
        if self.tx.try_send(event).is_err() {
            log::debug!("Event queue full, dropping {:?}", event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_drops_when_full() {
        let (tx, rx) = event_queue();
        for _ in 0..EVENT_QUEUE_DEPTH + 10 {
            tx.emit(SourceEvent::Overload { channel: 0 });
        }
        assert_eq!(rx.len(), EVENT_QUEUE_DEPTH);
    }
}
