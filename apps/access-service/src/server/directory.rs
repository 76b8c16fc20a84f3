use access_core::{
    AccessRequest, AccessRequestId, AccessRequestStatus, App, AppId, Group, GroupId,
    MembershipEdge, RoleGroupMap, RoleRelation, Tag, TagConstraints, TagId, TagMapping,
    TagMappingId, User, UserId,
};

use super::{errors::AccessFailure, query::RequestPredicate};

/// Active role mapping joined with its active target group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleMapping {
    pub map: RoleGroupMap,
    pub group: Group,
}

/// Membership edge written when an approval commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MembershipGrant {
    pub user_id: UserId,
    pub group_id: GroupId,
    pub is_owner: bool,
    pub ending_at_unix: Option<i64>,
}

/// Terminal transition applied to a pending request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub request_id: AccessRequestId,
    pub status: AccessRequestStatus,
    pub resolver_user_id: UserId,
    pub resolution_reason: Option<String>,
    pub resolved_at_unix: i64,
    pub approval_ending_at_unix: Option<i64>,
    pub grant: Option<MembershipGrant>,
}

/// Tag assignment as written by directory sync; the tag itself is joined on read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagAssignment {
    pub id: TagMappingId,
    pub group_id: GroupId,
    pub tag_id: TagId,
    pub app_override: Option<TagConstraints>,
    pub ended_at_unix: Option<i64>,
}

/// Read model over the identity directory plus the access request table.
///
/// Queries taking `now_unix` only return rows whose edges are active at that
/// instant and whose endpoints are not soft-deleted.
#[allow(async_fn_in_trait)]
pub trait DirectoryStore {
    /// User by id, deleted or not.
    async fn user(&self, user_id: UserId) -> Result<Option<User>, AccessFailure>;

    /// User by id or case-insensitive email.
    async fn find_user(&self, reference: &str) -> Result<Option<User>, AccessFailure>;

    async fn active_group(&self, group_id: GroupId) -> Result<Option<Group>, AccessFailure>;

    /// Group ids whose id equals `reference` or whose name matches it case-insensitively.
    async fn find_groups(&self, reference: &str) -> Result<Vec<GroupId>, AccessFailure>;

    /// Active users holding an active owner edge on `group_id`, ordered by user id.
    async fn direct_owners(
        &self,
        group_id: GroupId,
        now_unix: i64,
    ) -> Result<Vec<User>, AccessFailure>;

    /// Active owner groups of an active app.
    async fn owner_app_groups(&self, app_id: AppId) -> Result<Vec<Group>, AccessFailure>;

    /// Active mappings of `relation` out of `role_group_id` to active groups, in creation order.
    async fn role_mappings(
        &self,
        role_group_id: GroupId,
        relation: RoleRelation,
        now_unix: i64,
    ) -> Result<Vec<RoleMapping>, AccessFailure>;

    async fn active_tag_mappings(
        &self,
        group_id: GroupId,
        now_unix: i64,
    ) -> Result<Vec<TagMapping>, AccessFailure>;

    /// Active groups on which an active `user_id` holds an active owner edge.
    async fn groups_owned_by(
        &self,
        user_id: UserId,
        now_unix: i64,
    ) -> Result<Vec<Group>, AccessFailure>;

    /// Active app groups belonging to any of the given active apps.
    async fn app_groups_of(&self, app_ids: &[AppId]) -> Result<Vec<GroupId>, AccessFailure>;

    /// Active role groups holding an active ownership mapping onto any of `group_ids`.
    async fn role_groups_granting_ownership(
        &self,
        group_ids: &[GroupId],
        now_unix: i64,
    ) -> Result<Vec<GroupId>, AccessFailure>;

    async fn active_memberships(
        &self,
        user_id: UserId,
        group_id: GroupId,
        now_unix: i64,
    ) -> Result<Vec<MembershipEdge>, AccessFailure>;

    async fn access_request(
        &self,
        request_id: AccessRequestId,
    ) -> Result<Option<AccessRequest>, AccessFailure>;

    /// Atomically reject every open duplicate of `request` and insert it.
    /// Returns the superseded requests as stored after rejection.
    async fn insert_request_replacing_pending(
        &self,
        request: &AccessRequest,
        duplicate_reason: &str,
        now_unix: i64,
    ) -> Result<Vec<AccessRequest>, AccessFailure>;

    /// Apply `resolution` only if the request is still open, writing its grant in
    /// the same unit. Fails with `InvalidState` when another resolver got there first.
    async fn commit_resolution(
        &self,
        resolution: &Resolution,
    ) -> Result<AccessRequest, AccessFailure>;

    /// Requests matching `predicate`, newest first.
    async fn list_requests(
        &self,
        predicate: &RequestPredicate,
    ) -> Result<Vec<AccessRequest>, AccessFailure>;
}

/// Write side used by directory sync jobs and test fixtures. Every call upserts.
#[allow(async_fn_in_trait)]
pub trait DirectorySeed {
    async fn put_user(&self, user: &User) -> Result<(), AccessFailure>;
    async fn put_app(&self, app: &App) -> Result<(), AccessFailure>;
    async fn put_group(&self, group: &Group) -> Result<(), AccessFailure>;
    async fn put_membership(&self, edge: &MembershipEdge) -> Result<(), AccessFailure>;
    async fn put_role_mapping(&self, map: &RoleGroupMap) -> Result<(), AccessFailure>;
    async fn put_tag(&self, tag: &Tag) -> Result<(), AccessFailure>;
    async fn put_tag_assignment(&self, assignment: &TagAssignment) -> Result<(), AccessFailure>;
}
