use access_core::DomainError;

pub const NOT_FOUND_ERROR: &str = "not_found";
pub const GROUP_NOT_MANAGED_ERROR: &str = "group_not_managed";
pub const INVALID_STATE_ERROR: &str = "invalid_state";
pub const SELF_APPROVAL_ERROR: &str = "self_approval";
pub const NOT_AUTHORIZED_ERROR: &str = "not_authorized";
pub const REASON_REQUIRED_ERROR: &str = "reason_required";
pub const UNKNOWN_USER_ERROR: &str = "unknown_user";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessFailure {
    #[error("not found")]
    NotFound,
    #[error("groups not managed by access cannot be modified")]
    GroupNotManaged,
    #[error("access request is not pending")]
    InvalidState,
    #[error("users cannot approve their own requests")]
    SelfApproval,
    #[error("current user is not allowed to perform this action")]
    NotAuthorized,
    #[error("{0}")]
    ReasonRequired(String),
    #[error("user is unknown or deactivated")]
    UnknownUser,
    #[error("reason is invalid")]
    InvalidReason,
    #[error("operation timed out")]
    Timeout,
    #[error("internal error")]
    Internal,
}

impl AccessFailure {
    /// Stable identifier handed to the boundary layer.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound => NOT_FOUND_ERROR,
            Self::GroupNotManaged => GROUP_NOT_MANAGED_ERROR,
            Self::InvalidState => INVALID_STATE_ERROR,
            Self::SelfApproval => SELF_APPROVAL_ERROR,
            Self::NotAuthorized => NOT_AUTHORIZED_ERROR,
            Self::ReasonRequired(_) => REASON_REQUIRED_ERROR,
            Self::UnknownUser => UNKNOWN_USER_ERROR,
            Self::InvalidReason => "invalid_reason",
            Self::Timeout => "timeout",
            Self::Internal => "internal_error",
        }
    }

    /// HTTP status the boundary layer should answer with.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::GroupNotManaged
            | Self::InvalidState
            | Self::ReasonRequired(_)
            | Self::InvalidReason => 400,
            Self::SelfApproval | Self::NotAuthorized | Self::UnknownUser => 403,
            Self::Timeout => 504,
            Self::Internal => 500,
        }
    }
}

impl From<DomainError> for AccessFailure {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::InvalidReason => Self::InvalidReason,
            other => {
                tracing::error!(event = "domain.decode", error = %other);
                Self::Internal
            }
        }
    }
}

impl From<sqlx::Error> for AccessFailure {
    fn from(value: sqlx::Error) -> Self {
        tracing::error!(event = "db.query", error = %value);
        Self::Internal
    }
}

pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_current_span(true)
        .with_span_list(true)
        .init();
}
