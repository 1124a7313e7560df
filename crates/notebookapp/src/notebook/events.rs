//! Change notifications emitted by [`super::Notebook`].
//!
//! Listeners run synchronously on the thread that performed the change, in
//! the order the changes were committed.

/// What changed in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotebookEvent {
    /// A node's attributes changed. With `recurse` its children may have
    /// changed as well (added, removed or reordered).
    Changed { nodeid: String, recurse: bool },
    Added { nodeid: String, parentid: String },
    Removed { nodeid: String, parentid: String },
}

impl NotebookEvent {
    pub fn changed(nodeid: &str, recurse: bool) -> NotebookEvent {
        NotebookEvent::Changed {
            nodeid: nodeid.to_string(),
            recurse,
        }
    }

    /// Event name as used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            NotebookEvent::Changed { recurse: false, .. } => "changed",
            NotebookEvent::Changed { recurse: true, .. } => "changed-recurse",
            NotebookEvent::Added { .. } => "added",
            NotebookEvent::Removed { .. } => "removed",
        }
    }

    pub fn nodeid(&self) -> &str {
        match self {
            NotebookEvent::Changed { nodeid, .. }
            | NotebookEvent::Added { nodeid, .. }
            | NotebookEvent::Removed { nodeid, .. } => nodeid,
        }
    }
}

/// Handle returned by [`Listeners::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback = Box<dyn FnMut(&NotebookEvent) + Send>;

#[derive(Default)]
pub struct Listeners {
    next: u64,
    callbacks: Vec<(ListenerId, Callback)>,
    suppressed: usize,
}

impl Listeners {
    pub fn subscribe(&mut self, f: impl FnMut(&NotebookEvent) + Send + 'static) -> ListenerId {
        let id = ListenerId(self.next);
        self.next += 1;
        self.callbacks.push((id, Box::new(f)));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.callbacks.len();
        self.callbacks.retain(|(other, _)| *other != id);
        self.callbacks.len() != before
    }

    /// Holds back delivery until a matching [`Listeners::resume`].
    pub fn suppress(&mut self) {
        self.suppressed += 1;
    }

    pub fn resume(&mut self) {
        self.suppressed = self.suppressed.saturating_sub(1);
    }

    pub fn notify(&mut self, event: &NotebookEvent) {
        if self.suppressed > 0 {
            return;
        }
        tracing::trace!(kind = event.kind(), nodeid = event.nodeid(), "notebook event");
        for (_, callback) in self.callbacks.iter_mut() {
            callback(event);
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.callbacks.len())
            .field("suppressed", &self.suppressed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_delivery_order_and_unsubscribe() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut listeners = Listeners::default();
        let sink = seen.clone();
        let id = listeners.subscribe(move |e| sink.lock().unwrap().push(e.kind()));

        listeners.notify(&NotebookEvent::changed("a", false));
        listeners.notify(&NotebookEvent::changed("a", true));
        assert!(listeners.unsubscribe(id));
        assert!(!listeners.unsubscribe(id));
        listeners.notify(&NotebookEvent::changed("a", false));

        assert_eq!(*seen.lock().unwrap(), vec!["changed", "changed-recurse"]);
    }

    #[test]
    fn test_suppressed_events_are_dropped() {
        let count = Arc::new(Mutex::new(0));
        let mut listeners = Listeners::default();
        let sink = count.clone();
        listeners.subscribe(move |_| *sink.lock().unwrap() += 1);

        listeners.suppress();
        listeners.notify(&NotebookEvent::changed("a", false));
        listeners.resume();
        listeners.notify(&NotebookEvent::changed("a", false));
        assert_eq!(*count.lock().unwrap(), 1);
    }
}
