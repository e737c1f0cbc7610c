//! Notification sink for entry/exit transitions. A failed notification is
//! an inconvenience, never a reason to fail the transition that triggered
//! it, so the trait is fire-and-forget and implementations swallow their
//! own errors.

pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Default sink: the process log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        log::info!("[NOTIFY] {}", message);
    }
}

/// Discards everything. Used in tests and replay runs.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _message: &str) {}
}
