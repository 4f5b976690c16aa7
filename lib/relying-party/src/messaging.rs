//! User-facing notices.

use tracing::{info, warn};

/// Delivers messages to the end user.
///
/// Delivery is fire-and-forget; implementations must not fail the caller.
pub trait Messenger: Send + Sync {
    /// Shows an error message.
    fn notify_error(&self, message: &str);

    /// Shows an informational message.
    fn notify_info(&self, message: &str);
}

/// A [`Messenger`] that writes notices to the log.
///
/// For hosts without a user interface.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMessenger;

impl Messenger for LogMessenger {
    fn notify_error(&self, message: &str) {
        warn!(notice = message, "user notice");
    }

    fn notify_info(&self, message: &str) {
        info!(notice = message, "user notice");
    }
}
