use std::collections::{BTreeSet, HashMap};

use access_core::{
    AccessRequest, AccessRequestId, AccessRequestStatus, App, AppId, Group,
    GroupId, GroupKind, MembershipEdge, MembershipId, RoleGroupMap, RoleRelation, Tag, TagId,
    TagMapping, User, UserId,
};
use tokio::sync::RwLock;

use super::{
    directory::{
        DirectorySeed, DirectoryStore, MembershipGrant, Resolution, RoleMapping, TagAssignment,
    },
    errors::AccessFailure,
    query::RequestPredicate,
};

#[derive(Default)]
struct DirectoryTables {
    users: HashMap<UserId, User>,
    apps: HashMap<AppId, App>,
    groups: HashMap<GroupId, Group>,
    role_maps: Vec<RoleGroupMap>,
    memberships: Vec<MembershipEdge>,
    tags: HashMap<TagId, Tag>,
    tag_assignments: Vec<TagAssignment>,
    requests: Vec<AccessRequest>,
}

impl DirectoryTables {
    fn active_user(&self, user_id: UserId) -> Option<&User> {
        self.users.get(&user_id).filter(|user| user.is_active())
    }

    fn active_group(&self, group_id: GroupId) -> Option<&Group> {
        self.groups.get(&group_id).filter(|group| group.is_active())
    }

    fn app_is_active(&self, app_id: AppId) -> bool {
        self.apps
            .get(&app_id)
            .is_some_and(|app| app.deleted_at_unix.is_none())
    }

    fn active_owner_edge(&self, edge: &MembershipEdge, now_unix: i64) -> bool {
        edge.is_owner
            && edge.is_active_at(now_unix)
            && self.active_user(edge.user_id).is_some()
            && self.active_group(edge.group_id).is_some()
    }

    fn apply_grant(&mut self, grant: MembershipGrant, now_unix: i64) {
        let mut extended = false;
        for edge in &mut self.memberships {
            if edge.user_id == grant.user_id
                && edge.group_id == grant.group_id
                && edge.is_owner == grant.is_owner
                && edge.is_active_at(now_unix)
            {
                edge.ended_at_unix = grant.ending_at_unix;
                extended = true;
            }
        }
        if !extended {
            self.memberships.push(MembershipEdge {
                id: MembershipId::new(),
                user_id: grant.user_id,
                group_id: grant.group_id,
                is_owner: grant.is_owner,
                created_at_unix: now_unix,
                ended_at_unix: grant.ending_at_unix,
            });
        }
    }
}

/// Process-local directory guarded by a single lock. Suitable for tests and
/// single-node deployments; every mutation is one critical section.
#[derive(Default)]
pub struct InMemoryDirectory {
    tables: RwLock<DirectoryTables>,
}

impl InMemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DirectoryStore for InMemoryDirectory {
    async fn user(&self, user_id: UserId) -> Result<Option<User>, AccessFailure> {
        Ok(self.tables.read().await.users.get(&user_id).cloned())
    }

    async fn find_user(&self, reference: &str) -> Result<Option<User>, AccessFailure> {
        let tables = self.tables.read().await;
        if let Ok(user_id) = UserId::try_from(reference) {
            if let Some(user) = tables.users.get(&user_id) {
                return Ok(Some(user.clone()));
            }
        }
        Ok(tables
            .users
            .values()
            .find(|user| user.email.eq_ignore_ascii_case(reference))
            .cloned())
    }

    async fn active_group(&self, group_id: GroupId) -> Result<Option<Group>, AccessFailure> {
        Ok(self.tables.read().await.active_group(group_id).cloned())
    }

    async fn find_groups(&self, reference: &str) -> Result<Vec<GroupId>, AccessFailure> {
        let tables = self.tables.read().await;
        let by_id = GroupId::try_from(reference).ok();
        let mut ids = tables
            .groups
            .values()
            .filter(|group| Some(group.id) == by_id || group.name.eq_ignore_ascii_case(reference))
            .map(|group| group.id)
            .collect::<Vec<_>>();
        ids.sort();
        Ok(ids)
    }

    async fn direct_owners(
        &self,
        group_id: GroupId,
        now_unix: i64,
    ) -> Result<Vec<User>, AccessFailure> {
        let tables = self.tables.read().await;
        let owner_ids = tables
            .memberships
            .iter()
            .filter(|edge| edge.group_id == group_id && tables.active_owner_edge(edge, now_unix))
            .map(|edge| edge.user_id)
            .collect::<BTreeSet<_>>();
        Ok(owner_ids
            .into_iter()
            .filter_map(|user_id| tables.active_user(user_id).cloned())
            .collect())
    }

    async fn owner_app_groups(&self, app_id: AppId) -> Result<Vec<Group>, AccessFailure> {
        let tables = self.tables.read().await;
        if !tables.app_is_active(app_id) {
            return Ok(Vec::new());
        }
        let mut groups = tables
            .groups
            .values()
            .filter(|group| {
                group.is_active()
                    && matches!(
                        group.kind,
                        GroupKind::App { app_id: owner_app, is_owner_group: true } if owner_app == app_id
                    )
            })
            .cloned()
            .collect::<Vec<_>>();
        groups.sort_by_key(|group| group.id);
        Ok(groups)
    }

    async fn role_mappings(
        &self,
        role_group_id: GroupId,
        relation: RoleRelation,
        now_unix: i64,
    ) -> Result<Vec<RoleMapping>, AccessFailure> {
        let tables = self.tables.read().await;
        if tables.active_group(role_group_id).is_none() {
            return Ok(Vec::new());
        }
        let mut mappings = tables
            .role_maps
            .iter()
            .filter(|map| {
                map.role_group_id == role_group_id
                    && map.relation == relation
                    && map.is_active_at(now_unix)
            })
            .filter_map(|map| {
                tables.active_group(map.group_id).map(|group| RoleMapping {
                    map: map.clone(),
                    group: group.clone(),
                })
            })
            .collect::<Vec<_>>();
        mappings.sort_by_key(|mapping| mapping.map.created_at_unix);
        Ok(mappings)
    }

    async fn active_tag_mappings(
        &self,
        group_id: GroupId,
        now_unix: i64,
    ) -> Result<Vec<TagMapping>, AccessFailure> {
        let tables = self.tables.read().await;
        Ok(tables
            .tag_assignments
            .iter()
            .filter(|assignment| assignment.group_id == group_id)
            .filter_map(|assignment| {
                tables.tags.get(&assignment.tag_id).map(|tag| TagMapping {
                    id: assignment.id,
                    group_id: assignment.group_id,
                    tag: tag.clone(),
                    app_override: assignment.app_override,
                    ended_at_unix: assignment.ended_at_unix,
                })
            })
            .filter(|mapping| mapping.is_active_at(now_unix))
            .collect())
    }

    async fn groups_owned_by(
        &self,
        user_id: UserId,
        now_unix: i64,
    ) -> Result<Vec<Group>, AccessFailure> {
        let tables = self.tables.read().await;
        let group_ids = tables
            .memberships
            .iter()
            .filter(|edge| edge.user_id == user_id && tables.active_owner_edge(edge, now_unix))
            .map(|edge| edge.group_id)
            .collect::<BTreeSet<_>>();
        Ok(group_ids
            .into_iter()
            .filter_map(|group_id| tables.active_group(group_id).cloned())
            .collect())
    }

    async fn app_groups_of(&self, app_ids: &[AppId]) -> Result<Vec<GroupId>, AccessFailure> {
        let tables = self.tables.read().await;
        let mut ids = tables
            .groups
            .values()
            .filter(|group| group.is_active())
            .filter(|group| {
                group.kind.app_id().is_some_and(|app_id| {
                    app_ids.contains(&app_id) && tables.app_is_active(app_id)
                })
            })
            .map(|group| group.id)
            .collect::<Vec<_>>();
        ids.sort();
        Ok(ids)
    }

    async fn role_groups_granting_ownership(
        &self,
        group_ids: &[GroupId],
        now_unix: i64,
    ) -> Result<Vec<GroupId>, AccessFailure> {
        let tables = self.tables.read().await;
        let role_ids = tables
            .role_maps
            .iter()
            .filter(|map| {
                map.relation == RoleRelation::GrantsOwnership
                    && map.is_active_at(now_unix)
                    && group_ids.contains(&map.group_id)
                    && tables.active_group(map.group_id).is_some()
            })
            .filter(|map| {
                tables
                    .active_group(map.role_group_id)
                    .is_some_and(Group::is_role_group)
            })
            .map(|map| map.role_group_id)
            .collect::<BTreeSet<_>>();
        Ok(role_ids.into_iter().collect())
    }

    async fn active_memberships(
        &self,
        user_id: UserId,
        group_id: GroupId,
        now_unix: i64,
    ) -> Result<Vec<MembershipEdge>, AccessFailure> {
        let tables = self.tables.read().await;
        Ok(tables
            .memberships
            .iter()
            .filter(|edge| {
                edge.user_id == user_id && edge.group_id == group_id && edge.is_active_at(now_unix)
            })
            .cloned()
            .collect())
    }

    async fn access_request(
        &self,
        request_id: AccessRequestId,
    ) -> Result<Option<AccessRequest>, AccessFailure> {
        let tables = self.tables.read().await;
        Ok(tables
            .requests
            .iter()
            .find(|request| request.id == request_id)
            .cloned())
    }

    async fn insert_request_replacing_pending(
        &self,
        request: &AccessRequest,
        duplicate_reason: &str,
        now_unix: i64,
    ) -> Result<Vec<AccessRequest>, AccessFailure> {
        let mut tables = self.tables.write().await;
        let mut superseded = Vec::new();
        for existing in &mut tables.requests {
            if existing.is_open() && existing.is_duplicate_of(request) {
                existing.status = AccessRequestStatus::Rejected;
                existing.resolver_user_id = Some(request.requester_user_id);
                existing.resolution_reason = Some(duplicate_reason.to_owned());
                existing.resolved_at_unix = Some(now_unix);
                superseded.push(existing.clone());
            }
        }
        tables.requests.push(request.clone());
        Ok(superseded)
    }

    async fn commit_resolution(
        &self,
        resolution: &Resolution,
    ) -> Result<AccessRequest, AccessFailure> {
        let mut tables = self.tables.write().await;
        let request = tables
            .requests
            .iter_mut()
            .find(|request| request.id == resolution.request_id)
            .ok_or(AccessFailure::NotFound)?;
        if !request.is_open() {
            return Err(AccessFailure::InvalidState);
        }
        request.status = resolution.status;
        request.resolver_user_id = Some(resolution.resolver_user_id);
        request.resolution_reason.clone_from(&resolution.resolution_reason);
        request.resolved_at_unix = Some(resolution.resolved_at_unix);
        request.approval_ending_at_unix = resolution.approval_ending_at_unix;
        let resolved = request.clone();

        if let Some(grant) = resolution.grant {
            tables.apply_grant(grant, resolution.resolved_at_unix);
        }
        Ok(resolved)
    }

    async fn list_requests(
        &self,
        predicate: &RequestPredicate,
    ) -> Result<Vec<AccessRequest>, AccessFailure> {
        let tables = self.tables.read().await;
        let mut matched = tables
            .requests
            .iter()
            .enumerate()
            .filter(|(_, request)| {
                predicate.matches(
                    request,
                    tables.users.get(&request.requester_user_id),
                    tables.groups.get(&request.requested_group_id),
                    request
                        .resolver_user_id
                        .and_then(|user_id| tables.users.get(&user_id)),
                )
            })
            .collect::<Vec<_>>();
        matched.sort_by(|(left_index, left), (right_index, right)| {
            right
                .created_at_unix
                .cmp(&left.created_at_unix)
                .then(right_index.cmp(left_index))
        });
        Ok(matched.into_iter().map(|(_, request)| request.clone()).collect())
    }
}

impl DirectorySeed for InMemoryDirectory {
    async fn put_user(&self, user: &User) -> Result<(), AccessFailure> {
        self.tables.write().await.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn put_app(&self, app: &App) -> Result<(), AccessFailure> {
        self.tables.write().await.apps.insert(app.id, app.clone());
        Ok(())
    }

    async fn put_group(&self, group: &Group) -> Result<(), AccessFailure> {
        self.tables.write().await.groups.insert(group.id, group.clone());
        Ok(())
    }

    async fn put_membership(&self, edge: &MembershipEdge) -> Result<(), AccessFailure> {
        let mut tables = self.tables.write().await;
        match tables.memberships.iter_mut().find(|existing| existing.id == edge.id) {
            Some(existing) => *existing = edge.clone(),
            None => tables.memberships.push(edge.clone()),
        }
        Ok(())
    }

    async fn put_role_mapping(&self, map: &RoleGroupMap) -> Result<(), AccessFailure> {
        let mut tables = self.tables.write().await;
        match tables.role_maps.iter_mut().find(|existing| existing.id == map.id) {
            Some(existing) => *existing = map.clone(),
            None => tables.role_maps.push(map.clone()),
        }
        Ok(())
    }

    async fn put_tag(&self, tag: &Tag) -> Result<(), AccessFailure> {
        self.tables.write().await.tags.insert(tag.id, tag.clone());
        Ok(())
    }

    async fn put_tag_assignment(&self, assignment: &TagAssignment) -> Result<(), AccessFailure> {
        let mut tables = self.tables.write().await;
        match tables
            .tag_assignments
            .iter_mut()
            .find(|existing| existing.id == assignment.id)
        {
            Some(existing) => *existing = assignment.clone(),
            None => tables.tag_assignments.push(assignment.clone()),
        }
        Ok(())
    }
}
