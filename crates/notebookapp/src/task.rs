use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation handle for long walks.
///
/// Clones share one flag. Walkers poll [`Task::is_stopped`] between nodes.
#[derive(Debug, Clone, Default)]
pub struct Task {
    stopped: Arc<AtomicBool>,
}

impl Task {
    pub fn new() -> Task {
        Task::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// True if `task` is present and has been stopped.
pub fn stopped(task: Option<&Task>) -> bool {
    task.is_some_and(Task::is_stopped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag() {
        let task = Task::new();
        let worker = task.clone();
        assert!(!worker.is_stopped());
        task.stop();
        assert!(worker.is_stopped());
        assert!(stopped(Some(&worker)));
        assert!(!stopped(None));
    }
}
