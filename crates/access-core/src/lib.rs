#![forbid(unsafe_code)]

mod constraints;
mod model;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

pub use constraints::{
    coalesce_ending_at, min_time_limit, reason_is_present, reason_violation, GrantRelation,
    ReasonViolation,
};
pub use model::{
    edge_active_at, AccessRequest, AccessRequestStatus, App, Group, GroupKind, GroupType,
    MembershipEdge, RoleGroupMap, RoleRelation, Tag, TagConstraints, TagMapping, User,
};

/// Maximum characters accepted for request and resolution reasons.
pub const MAX_REASON_CHARS: usize = 1_024;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("user id is invalid")]
    InvalidUserId,
    #[error("group id is invalid")]
    InvalidGroupId,
    #[error("app id is invalid")]
    InvalidAppId,
    #[error("tag id is invalid")]
    InvalidTagId,
    #[error("tag mapping id is invalid")]
    InvalidTagMappingId,
    #[error("role group mapping id is invalid")]
    InvalidRoleGroupMapId,
    #[error("membership id is invalid")]
    InvalidMembershipId,
    #[error("access request id is invalid")]
    InvalidAccessRequestId,
    #[error("group type is invalid")]
    InvalidGroupType,
    #[error("role group relation is invalid")]
    InvalidRoleRelation,
    #[error("access request status is invalid")]
    InvalidRequestStatus,
    #[error("reason is invalid")]
    InvalidReason,
}

macro_rules! ulid_id {
    ($name:ident, $error:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(Ulid);

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl TryFrom<String> for $name {
            type Error = DomainError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::try_from(value.as_str())
            }
        }

        impl TryFrom<&str> for $name {
            type Error = DomainError;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                let parsed = Ulid::from_string(value).map_err(|_| DomainError::$error)?;
                Ok(Self(parsed))
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.to_string()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

ulid_id!(UserId, InvalidUserId);
ulid_id!(GroupId, InvalidGroupId);
ulid_id!(AppId, InvalidAppId);
ulid_id!(TagId, InvalidTagId);
ulid_id!(TagMappingId, InvalidTagMappingId);
ulid_id!(RoleGroupMapId, InvalidRoleGroupMapId);
ulid_id!(MembershipId, InvalidMembershipId);
ulid_id!(AccessRequestId, InvalidAccessRequestId);

/// A trimmed, non-empty justification attached to a request or a resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reason(String);

impl Reason {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Normalize an optional free-text reason.
    ///
    /// Blank input collapses to `None`.
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidReason`] when the trimmed text is longer
    /// than [`MAX_REASON_CHARS`] or contains a NUL byte.
    pub fn normalize(value: Option<&str>) -> Result<Option<Self>, DomainError> {
        let Some(value) = value else {
            return Ok(None);
        };
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        validate_reason(trimmed)?;
        Ok(Some(Self(trimmed.to_owned())))
    }
}

impl TryFrom<String> for Reason {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::normalize(Some(&value))?.ok_or(DomainError::InvalidReason)
    }
}

fn validate_reason(value: &str) -> Result<(), DomainError> {
    if value.chars().count() > MAX_REASON_CHARS {
        return Err(DomainError::InvalidReason);
    }
    if value.contains('\0') {
        return Err(DomainError::InvalidReason);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{AccessRequestId, DomainError, GroupId, Reason, UserId, MAX_REASON_CHARS};

    #[test]
    fn ids_parse_and_reject_garbage() {
        let id = UserId::new();
        let parsed = UserId::try_from(id.to_string()).unwrap();
        assert_eq!(id, parsed);

        assert_eq!(
            GroupId::try_from("not-a-ulid").unwrap_err(),
            DomainError::InvalidGroupId
        );
        assert_eq!(
            AccessRequestId::try_from(String::new()).unwrap_err(),
            DomainError::InvalidAccessRequestId
        );
    }

    #[test]
    fn ids_convert_into_their_display_string() {
        let id = GroupId::new();
        assert_eq!(String::from(id), id.to_string());
    }

    #[test]
    fn reason_normalization_trims_and_collapses_blank() {
        assert_eq!(Reason::normalize(None).unwrap(), None);
        assert_eq!(Reason::normalize(Some("   ")).unwrap(), None);
        let reason = Reason::normalize(Some("  on-call rotation \n")).unwrap().unwrap();
        assert_eq!(reason.as_str(), "on-call rotation");
    }

    #[test]
    fn reason_rejects_oversized_and_nul() {
        let long = "a".repeat(MAX_REASON_CHARS + 1);
        assert_eq!(
            Reason::normalize(Some(&long)).unwrap_err(),
            DomainError::InvalidReason
        );
        assert_eq!(
            Reason::normalize(Some("bad\0reason")).unwrap_err(),
            DomainError::InvalidReason
        );
        assert!(Reason::try_from(String::from("  ")).is_err());
        assert!(Reason::normalize(Some(&"a".repeat(MAX_REASON_CHARS))).is_ok());
    }
}
