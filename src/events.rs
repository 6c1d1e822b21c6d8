//! Change notifications emitted on every commit.
//!
//! The UI and the system monitor subscribe here; they only ever see whole
//! committed versions.

use crate::feeder::{BufferVersion, LineSpan};
use serde::Serialize;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 64;

/// One edit's footprint: what it removed and what it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditMapping {
    /// Lines of the previous version this edit consumed.
    pub old: Option<LineSpan>,
    /// Lines of the new version this edit produced.
    pub new: Option<LineSpan>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub version: BufferVersion,
    /// Smallest span of the new version covering every touched spot.
    pub affected: Option<LineSpan>,
    /// Line count after the commit.
    pub line_count: usize,
    pub edits: Vec<EditMapping>,
}

#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    /// Publish to current subscribers. Having none is not an error.
    pub fn publish(&self, event: ChangeEvent) {
        let receivers = self.tx.send(event).unwrap_or(0);
        tracing::trace!(receivers, "change event published");
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeder::LineId;

    #[test]
    fn subscribers_receive_published_events() {
        let notifier = ChangeNotifier::new();
        let mut rx = notifier.subscribe();
        let event = ChangeEvent {
            version: BufferVersion(3),
            affected: Some(LineSpan::single(LineId(7))),
            line_count: 10,
            edits: vec![],
        };
        notifier.publish(event.clone());
        assert_eq!(rx.try_recv().unwrap(), event);
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let notifier = ChangeNotifier::new();
        notifier.publish(ChangeEvent {
            version: BufferVersion(1),
            affected: None,
            line_count: 0,
            edits: vec![],
        });
    }
}
