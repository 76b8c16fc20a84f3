use serde::{Deserialize, Serialize};

use crate::{
    AccessRequestId, AppId, DomainError, GroupId, MembershipId, RoleGroupMapId, TagId,
    TagMappingId, UserId,
};

/// An edge with no end, or one whose end lies in the future, is active.
#[must_use]
pub fn edge_active_at(ended_at_unix: Option<i64>, now_unix: i64) -> bool {
    ended_at_unix.is_none_or(|ended_at| ended_at > now_unix)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub display_name: String,
    pub deleted_at_unix: Option<i64>,
}

impl User {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.deleted_at_unix.is_none()
    }
}

/// Group discriminant, as stored and as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupType {
    #[serde(rename = "okta_group")]
    Direct,
    #[serde(rename = "app_group")]
    App,
    #[serde(rename = "role_group")]
    Role,
}

impl GroupType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "okta_group",
            Self::App => "app_group",
            Self::Role => "role_group",
        }
    }
}

impl TryFrom<String> for GroupType {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "okta_group" => Ok(Self::Direct),
            "app_group" => Ok(Self::App),
            "role_group" => Ok(Self::Role),
            _ => Err(DomainError::InvalidGroupType),
        }
    }
}

/// Subtype payload of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GroupKind {
    #[serde(rename = "okta_group")]
    Direct,
    #[serde(rename = "app_group")]
    App {
        app_id: AppId,
        /// Owners of this group are treated as owners of the whole app.
        is_owner_group: bool,
    },
    #[serde(rename = "role_group")]
    Role,
}

impl GroupKind {
    #[must_use]
    pub const fn group_type(self) -> GroupType {
        match self {
            Self::Direct => GroupType::Direct,
            Self::App { .. } => GroupType::App,
            Self::Role => GroupType::Role,
        }
    }

    #[must_use]
    pub const fn app_id(self) -> Option<AppId> {
        match self {
            Self::App { app_id, .. } => Some(app_id),
            Self::Direct | Self::Role => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub description: String,
    pub kind: GroupKind,
    /// Whether membership changes may be driven by access requests.
    pub is_managed: bool,
    pub deleted_at_unix: Option<i64>,
}

impl Group {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.deleted_at_unix.is_none()
    }

    #[must_use]
    pub fn group_type(&self) -> GroupType {
        self.kind.group_type()
    }

    #[must_use]
    pub fn is_role_group(&self) -> bool {
        matches!(self.kind, GroupKind::Role)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    pub id: AppId,
    pub name: String,
    pub deleted_at_unix: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleRelation {
    GrantsMembership,
    GrantsOwnership,
}

impl RoleRelation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GrantsMembership => "grants_membership",
            Self::GrantsOwnership => "grants_ownership",
        }
    }
}

impl TryFrom<String> for RoleRelation {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "grants_membership" => Ok(Self::GrantsMembership),
            "grants_ownership" => Ok(Self::GrantsOwnership),
            _ => Err(DomainError::InvalidRoleRelation),
        }
    }
}

/// Directed edge from a role group to the group it confers access in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGroupMap {
    pub id: RoleGroupMapId,
    pub role_group_id: GroupId,
    pub group_id: GroupId,
    pub relation: RoleRelation,
    pub created_at_unix: i64,
    pub ended_at_unix: Option<i64>,
}

impl RoleGroupMap {
    #[must_use]
    pub fn is_active_at(&self, now_unix: i64) -> bool {
        edge_active_at(self.ended_at_unix, now_unix)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipEdge {
    pub id: MembershipId,
    pub user_id: UserId,
    pub group_id: GroupId,
    pub is_owner: bool,
    pub created_at_unix: i64,
    pub ended_at_unix: Option<i64>,
}

impl MembershipEdge {
    #[must_use]
    pub fn is_active_at(&self, now_unix: i64) -> bool {
        edge_active_at(self.ended_at_unix, now_unix)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagConstraints {
    pub require_member_reason: bool,
    pub require_owner_reason: bool,
    pub member_time_limit_secs: Option<u64>,
    pub owner_time_limit_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    pub enabled: bool,
    pub constraints: TagConstraints,
    pub deleted_at_unix: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagMapping {
    pub id: TagMappingId,
    pub group_id: GroupId,
    pub tag: Tag,
    /// App-level override of the tag defaults, honored on app groups only.
    pub app_override: Option<TagConstraints>,
    pub ended_at_unix: Option<i64>,
}

impl TagMapping {
    #[must_use]
    pub fn effective_constraints(&self, kind: GroupKind) -> TagConstraints {
        match (kind, self.app_override) {
            (GroupKind::App { .. }, Some(overridden)) => overridden,
            _ => self.tag.constraints,
        }
    }

    #[must_use]
    pub fn is_active_at(&self, now_unix: i64) -> bool {
        self.tag.enabled
            && self.tag.deleted_at_unix.is_none()
            && edge_active_at(self.ended_at_unix, now_unix)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum AccessRequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl AccessRequestStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl TryFrom<String> for AccessRequestStatus {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(DomainError::InvalidRequestStatus),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRequest {
    pub id: AccessRequestId,
    pub requester_user_id: UserId,
    pub requested_group_id: GroupId,
    pub request_ownership: bool,
    pub status: AccessRequestStatus,
    pub request_reason: Option<String>,
    pub request_ending_at_unix: Option<i64>,
    pub resolver_user_id: Option<UserId>,
    pub resolution_reason: Option<String>,
    pub resolved_at_unix: Option<i64>,
    pub approval_ending_at_unix: Option<i64>,
    pub created_at_unix: i64,
}

impl AccessRequest {
    /// A fresh pending request.
    #[must_use]
    pub fn pending(
        requester_user_id: UserId,
        requested_group_id: GroupId,
        request_ownership: bool,
        request_reason: Option<String>,
        request_ending_at_unix: Option<i64>,
        created_at_unix: i64,
    ) -> Self {
        Self {
            id: AccessRequestId::new(),
            requester_user_id,
            requested_group_id,
            request_ownership,
            status: AccessRequestStatus::Pending,
            request_reason,
            request_ending_at_unix,
            resolver_user_id: None,
            resolution_reason: None,
            resolved_at_unix: None,
            approval_ending_at_unix: None,
            created_at_unix,
        }
    }

    /// Pending and never resolved; both must hold before a resolution commits.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == AccessRequestStatus::Pending && self.resolved_at_unix.is_none()
    }

    #[must_use]
    pub fn is_duplicate_of(&self, other: &Self) -> bool {
        self.requester_user_id == other.requester_user_id
            && self.requested_group_id == other.requested_group_id
            && self.request_ownership == other.request_ownership
    }
}

#[cfg(test)]
mod tests {
    use super::{
        edge_active_at, AccessRequest, AccessRequestStatus, GroupKind, GroupType, RoleRelation,
        Tag, TagConstraints, TagMapping,
    };
    use crate::{AppId, DomainError, GroupId, TagId, TagMappingId, UserId};

    fn mapping(app_override: Option<TagConstraints>) -> TagMapping {
        TagMapping {
            id: TagMappingId::new(),
            group_id: GroupId::new(),
            tag: Tag {
                id: TagId::new(),
                name: String::from("sox"),
                enabled: true,
                constraints: TagConstraints {
                    require_member_reason: true,
                    ..TagConstraints::default()
                },
                deleted_at_unix: None,
            },
            app_override,
            ended_at_unix: None,
        }
    }

    #[test]
    fn edges_with_future_end_are_still_active() {
        assert!(edge_active_at(None, 100));
        assert!(edge_active_at(Some(101), 100));
        assert!(!edge_active_at(Some(100), 100));
        assert!(!edge_active_at(Some(50), 100));
    }

    #[test]
    fn group_type_strings_round_trip() {
        for group_type in [GroupType::Direct, GroupType::App, GroupType::Role] {
            let parsed = GroupType::try_from(group_type.as_str().to_owned()).unwrap();
            assert_eq!(parsed, group_type);
        }
        assert_eq!(
            GroupType::try_from(String::from("team")).unwrap_err(),
            DomainError::InvalidGroupType
        );
    }

    #[test]
    fn role_relation_rejects_unknown_values() {
        assert_eq!(
            RoleRelation::try_from(String::from("grants_ownership")).unwrap(),
            RoleRelation::GrantsOwnership
        );
        assert_eq!(
            RoleRelation::try_from(String::from("grants_admin")).unwrap_err(),
            DomainError::InvalidRoleRelation
        );
    }

    #[test]
    fn app_override_applies_only_to_app_groups() {
        let overridden = TagConstraints::default();
        let tag_map = mapping(Some(overridden));

        let app_kind = GroupKind::App {
            app_id: AppId::new(),
            is_owner_group: false,
        };
        assert!(!tag_map.effective_constraints(app_kind).require_member_reason);
        assert!(tag_map.effective_constraints(GroupKind::Direct).require_member_reason);
        assert!(mapping(None).effective_constraints(app_kind).require_member_reason);
    }

    #[test]
    fn deleted_or_disabled_tag_makes_mapping_inactive() {
        let mut tag_map = mapping(None);
        assert!(tag_map.is_active_at(10));
        tag_map.tag.enabled = false;
        assert!(!tag_map.is_active_at(10));
        tag_map.tag.enabled = true;
        tag_map.tag.deleted_at_unix = Some(5);
        assert!(!tag_map.is_active_at(10));
    }

    #[test]
    fn request_status_parsing_is_case_insensitive() {
        assert_eq!(
            AccessRequestStatus::try_from(String::from("PENDING")).unwrap(),
            AccessRequestStatus::Pending
        );
        assert!(AccessRequestStatus::Approved.is_terminal());
        assert!(!AccessRequestStatus::Pending.is_terminal());
    }

    #[test]
    fn duplicate_detection_uses_requester_group_and_relation() {
        let requester = UserId::new();
        let group = GroupId::new();
        let first = AccessRequest::pending(requester, group, false, None, None, 1);
        let second = AccessRequest::pending(requester, group, false, None, None, 2);
        let ownership = AccessRequest::pending(requester, group, true, None, None, 3);
        assert!(first.is_open());
        assert!(second.is_duplicate_of(&first));
        assert!(!ownership.is_duplicate_of(&first));
    }
}
