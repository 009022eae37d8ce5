use notify_rust::Notification;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Best-effort desktop notifications. Implementations must never propagate
/// failures into session state.
pub trait Notifier: Send + Sync {
    fn notify(&self, summary: &str, body: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn notify(&self, summary: &str, body: &str) {
        if let Err(err) = Notification::new().summary(summary).body(body).show() {
            eprintln!("reminder notification failed: {err}");
        }
    }
}

/// Handle to a scheduled one-shot reminder. Cancelling a reminder that is
/// already firing is tolerated; the notification is best-effort either way.
#[derive(Debug)]
pub struct ReminderHandle {
    handle: JoinHandle<()>,
}

impl ReminderHandle {
    pub fn cancel(self) {
        self.handle.abort();
    }
}

/// Schedule a notification to fire once after `delay` on the current runtime.
pub fn schedule_reminder(
    notifier: Arc<dyn Notifier>,
    delay: Duration,
    summary: String,
    body: String,
) -> ReminderHandle {
    let handle = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        notifier.notify(&summary, &body);
    });
    ReminderHandle { handle }
}
