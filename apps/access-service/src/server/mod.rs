pub(crate) mod authorization;
pub(crate) mod constraints;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod directory;
pub(crate) mod directory_memory;
pub(crate) mod errors;
pub(crate) mod hierarchy;
pub(crate) mod lifecycle;
pub(crate) mod metrics;
pub(crate) mod notifications;
pub(crate) mod query;
#[cfg(test)]
mod tests;

pub use authorization::{is_self_request, AuthorizationPolicy};
pub use constraints::ConstraintEngine;
pub use self::core::{
    AppConfig, DEFAULT_DB_MAX_CONNECTIONS, DEFAULT_NOTIFICATION_QUEUE,
    DEFAULT_OPERATION_TIMEOUT_MILLIS, DUPLICATE_REQUEST_REASON,
};
pub use db::PostgresDirectory;
pub use directory::{
    DirectorySeed, DirectoryStore, MembershipGrant, Resolution, RoleMapping, TagAssignment,
};
pub use directory_memory::InMemoryDirectory;
pub use errors::{init_tracing, AccessFailure};
pub use hierarchy::{GroupHierarchy, RoleTarget};
pub use lifecycle::{
    AccessRequestLifecycle, ApproveAccessRequest, CreateAccessRequest, RejectAccessRequest,
};
pub use metrics::render_metrics;
pub use notifications::{
    ChannelNotifier, NotificationEvent, NotificationPayload, NotificationRecipient,
    NotificationSink, TracingNotifier,
};
pub use query::{AccessRequestFilter, RequestPredicate, ME};
