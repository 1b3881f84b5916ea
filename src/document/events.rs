//! Document lifecycle events.

use std::sync::Arc;

use parking_lot::RwLock;

use super::Document;

/// Lifecycle event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentEvent {
    Open,
    Change,
    Close,
}

/// Every notification fires `Pre`, then `Main`, then `Post` listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Pre,
    Main,
    Post,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Pre, Phase::Main, Phase::Post];
}

pub type Listener<D> = Arc<dyn Fn(&D) + Send + Sync>;

struct Subscription {
    event: DocumentEvent,
    phase: Phase,
    listener: Listener<Document>,
}

/// Subscriber lists for document events.
#[derive(Default)]
pub struct EventBus {
    subscriptions: RwLock<Vec<Subscription>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.subscriptions.read().len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, event: DocumentEvent, phase: Phase, listener: Listener<Document>) {
        self.subscriptions.write().push(Subscription {
            event,
            phase,
            listener,
        });
    }

    pub fn notify(&self, event: DocumentEvent, document: &Document) {
        for phase in Phase::ALL {
            // Snapshot so listeners may subscribe while being notified.
            let listeners: Vec<Listener<Document>> = self
                .subscriptions
                .read()
                .iter()
                .filter(|s| s.event == event && s.phase == phase)
                .map(|s| Arc::clone(&s.listener))
                .collect();
            for listener in listeners {
                listener(document);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tower_lsp::lsp_types::Url;

    #[test]
    fn phases_fire_in_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for (phase, name) in [(Phase::Post, "post"), (Phase::Main, "main"), (Phase::Pre, "pre")] {
            let log = Arc::clone(&log);
            bus.subscribe(
                DocumentEvent::Change,
                phase,
                Arc::new(move |_: &Document| log.lock().push(name)),
            );
        }
        let close_log = Arc::clone(&log);
        bus.subscribe(
            DocumentEvent::Close,
            Phase::Main,
            Arc::new(move |_: &Document| close_log.lock().push("close")),
        );

        let doc = Document::new(Url::parse("file:///a.svelte").unwrap(), "", 1);
        bus.notify(DocumentEvent::Change, &doc);
        assert_eq!(*log.lock(), vec!["pre", "main", "post"]);
    }
}
