#![forbid(unsafe_code)]

mod server;

pub use server::{
    init_tracing, is_self_request, render_metrics, AccessFailure, AccessRequestFilter,
    AccessRequestLifecycle, AppConfig, ApproveAccessRequest, AuthorizationPolicy,
    ChannelNotifier, ConstraintEngine, CreateAccessRequest, DirectorySeed, DirectoryStore,
    GroupHierarchy, InMemoryDirectory, MembershipGrant, NotificationEvent, NotificationPayload,
    NotificationRecipient, NotificationSink, PostgresDirectory, RejectAccessRequest,
    RequestPredicate, Resolution, RoleMapping, RoleTarget, TagAssignment, TracingNotifier,
    DEFAULT_DB_MAX_CONNECTIONS, DEFAULT_NOTIFICATION_QUEUE, DEFAULT_OPERATION_TIMEOUT_MILLIS,
    DUPLICATE_REQUEST_REASON, ME,
};
