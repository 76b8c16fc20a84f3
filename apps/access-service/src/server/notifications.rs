use std::sync::Arc;

use access_core::{AccessRequest, AccessRequestId, AccessRequestStatus, GroupId, User, UserId};
use access_protocol::{encode_envelope, NotificationAudience, NotificationKind};
use serde::Serialize;
use tokio::sync::mpsc;

use super::metrics::{
    record_notification_dropped, record_notification_emitted, NOTIFICATION_DROP_REASON_CLOSED,
    NOTIFICATION_DROP_REASON_ENCODE_ERROR, NOTIFICATION_DROP_REASON_QUEUE_FULL,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationEvent {
    RequestCreated,
    RequestApproved,
    RequestRejected,
}

impl NotificationEvent {
    #[must_use]
    pub const fn kind(self) -> NotificationKind {
        match self {
            Self::RequestCreated => NotificationKind::RequestCreated,
            Self::RequestApproved => NotificationKind::RequestApproved,
            Self::RequestRejected => NotificationKind::RequestRejected,
        }
    }

    #[must_use]
    pub const fn event_type(self) -> &'static str {
        self.kind().as_str()
    }

    #[must_use]
    pub fn audience(self) -> Option<NotificationAudience> {
        self.kind().audience()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationRecipient {
    pub user_id: UserId,
    pub email: String,
}

/// Envelope `d` payload for lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationPayload {
    pub request_id: AccessRequestId,
    pub requester_user_id: UserId,
    pub requested_group_id: GroupId,
    pub request_ownership: bool,
    pub status: AccessRequestStatus,
    pub resolver_user_id: Option<UserId>,
    pub resolution_reason: Option<String>,
    pub recipients: Vec<NotificationRecipient>,
}

impl NotificationPayload {
    #[must_use]
    pub fn new(request: &AccessRequest, recipients: &[User]) -> Self {
        Self {
            request_id: request.id,
            requester_user_id: request.requester_user_id,
            requested_group_id: request.requested_group_id,
            request_ownership: request.request_ownership,
            status: request.status,
            resolver_user_id: request.resolver_user_id,
            resolution_reason: request.resolution_reason.clone(),
            recipients: recipients
                .iter()
                .map(|user| NotificationRecipient {
                    user_id: user.id,
                    email: user.email.clone(),
                })
                .collect(),
        }
    }
}

/// Fire-and-forget delivery of lifecycle events. Implementations must not block
/// and must not fail the operation that produced the event.
pub trait NotificationSink {
    fn notify(&self, event: NotificationEvent, request: &AccessRequest, recipients: &[User]);
}

impl<T: NotificationSink + ?Sized> NotificationSink for Arc<T> {
    fn notify(&self, event: NotificationEvent, request: &AccessRequest, recipients: &[User]) {
        (**self).notify(event, request, recipients);
    }
}

/// Sink that only writes a structured log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&self, event: NotificationEvent, request: &AccessRequest, recipients: &[User]) {
        record_notification_emitted(event.event_type());
        tracing::info!(
            event = "notification.emit",
            event_type = event.event_type(),
            request_id = %request.id,
            recipients = recipients.len(),
        );
    }
}

/// Sink that queues encoded envelopes for an out-of-process dispatcher.
/// A full or closed queue drops the event and counts it.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::Sender<String>,
}

impl ChannelNotifier {
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl NotificationSink for ChannelNotifier {
    fn notify(&self, event: NotificationEvent, request: &AccessRequest, recipients: &[User]) {
        let event_type = event.event_type();
        let payload = NotificationPayload::new(request, recipients);
        let encoded = match encode_envelope(event_type, &payload) {
            Ok(encoded) => encoded,
            Err(error) => {
                record_notification_dropped(event_type, NOTIFICATION_DROP_REASON_ENCODE_ERROR);
                tracing::warn!(
                    event = "notification.drop",
                    event_type,
                    request_id = %request.id,
                    reason = NOTIFICATION_DROP_REASON_ENCODE_ERROR,
                    error = %error,
                );
                return;
            }
        };

        match self.sender.try_send(encoded) {
            Ok(()) => record_notification_emitted(event_type),
            Err(error) => {
                let reason = match error {
                    mpsc::error::TrySendError::Full(_) => NOTIFICATION_DROP_REASON_QUEUE_FULL,
                    mpsc::error::TrySendError::Closed(_) => NOTIFICATION_DROP_REASON_CLOSED,
                };
                record_notification_dropped(event_type, reason);
                tracing::warn!(
                    event = "notification.drop",
                    event_type,
                    request_id = %request.id,
                    reason,
                );
            }
        }
    }
}
