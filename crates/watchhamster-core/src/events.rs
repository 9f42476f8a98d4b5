//! Forwarding of supervision events to the webhook notifier.

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use watchhamster_notify::{NotifyEvent, Notifier};
use watchhamster_process_management::ProcessEvent;

/// Notification for a supervision event. `Stopped` and status reports are not announced.
pub fn to_notify_event(event: &ProcessEvent) -> Option<NotifyEvent> {
    match event {
        ProcessEvent::Started { id, restart_count } => {
            Some(NotifyEvent::monitor_started(id, *restart_count))
        }
        ProcessEvent::StartFailed { id, reason }
        | ProcessEvent::StopFailed { id, reason }
        | ProcessEvent::RecoveryFailed { id, reason } => {
            Some(NotifyEvent::monitor_failed(id, reason))
        }
        ProcessEvent::Recovered { id } => Some(NotifyEvent::monitor_recovered(id)),
        ProcessEvent::HealthChanged { id, from, to } => {
            Some(NotifyEvent::health_changed(id, *from, *to))
        }
        ProcessEvent::Stopped { .. } | ProcessEvent::StatusReport { .. } => None,
    }
}

/// Relay events until the manager's event channel closes.
pub(crate) fn spawn_forwarder(
    mut events: broadcast::Receiver<ProcessEvent>,
    notifier: Notifier,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(notification) = to_notify_event(&event) {
                        notifier.notify(notification);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event forwarder lagged, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => {
                    debug!("Event channel closed, forwarder exiting");
                    break;
                }
            }
        }
    })
}
