use std::collections::{BTreeMap, BTreeSet};

use access_core::{Group, GroupId, GroupKind, GroupType, RoleRelation, TagMapping, User, UserId};
use futures_util::future::try_join_all;

use super::{directory::DirectoryStore, errors::AccessFailure};

/// Active role mapping target, with the tags currently on that target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleTarget {
    pub group: Group,
    pub relation: RoleRelation,
    pub created_at_unix: i64,
    pub tags: Vec<TagMapping>,
}

impl RoleTarget {
    #[must_use]
    pub fn group_type(&self) -> GroupType {
        self.group.group_type()
    }
}

/// Walks ownership through app owner groups and role group mappings, one hop each.
pub struct GroupHierarchy<'a, S> {
    store: &'a S,
    now_unix: i64,
}

impl<'a, S: DirectoryStore> GroupHierarchy<'a, S> {
    pub fn new(store: &'a S, now_unix: i64) -> Self {
        Self { store, now_unix }
    }

    /// Everyone who may manage `group`, deduplicated and ordered by user id.
    ///
    /// Direct owners always count. App groups add the owners of their app's
    /// owner groups. Role groups add the direct and app-level owners of every
    /// group they grant ownership of; those targets are not expanded further.
    pub async fn resolve_effective_owners(&self, group: &Group) -> Result<Vec<User>, AccessFailure> {
        let mut owners = BTreeMap::new();
        for user in self.owners_without_role_expansion(group).await? {
            owners.insert(user.id, user);
        }

        if group.is_role_group() {
            let mut visited = BTreeSet::from([group.id]);
            let targets = self
                .store
                .role_mappings(group.id, RoleRelation::GrantsOwnership, self.now_unix)
                .await?
                .into_iter()
                .filter(|mapping| visited.insert(mapping.group.id))
                .map(|mapping| mapping.group)
                .collect::<Vec<_>>();
            let inherited = try_join_all(
                targets
                    .iter()
                    .map(|target| self.owners_without_role_expansion(target)),
            )
            .await?;
            for user in inherited.into_iter().flatten() {
                owners.insert(user.id, user);
            }
        }

        Ok(owners.into_values().collect())
    }

    async fn owners_without_role_expansion(&self, group: &Group) -> Result<Vec<User>, AccessFailure> {
        let mut owners = self.store.direct_owners(group.id, self.now_unix).await?;
        if let GroupKind::App { app_id, .. } = group.kind {
            for owner_group in self.store.owner_app_groups(app_id).await? {
                if owner_group.id == group.id {
                    continue;
                }
                owners.extend(self.store.direct_owners(owner_group.id, self.now_unix).await?);
            }
        }
        Ok(owners)
    }

    /// Active targets of `role_group` under `relation`, in mapping creation order,
    /// each with its active tags. Non-role groups have no targets.
    pub async fn resolve_role_group_targets(
        &self,
        role_group: &Group,
        relation: RoleRelation,
    ) -> Result<Vec<RoleTarget>, AccessFailure> {
        if !role_group.is_role_group() {
            return Ok(Vec::new());
        }
        let mappings = self
            .store
            .role_mappings(role_group.id, relation, self.now_unix)
            .await?;
        let tags = try_join_all(
            mappings
                .iter()
                .map(|mapping| self.store.active_tag_mappings(mapping.group.id, self.now_unix)),
        )
        .await?;

        Ok(mappings
            .into_iter()
            .zip(tags)
            .map(|(mapping, tags)| RoleTarget {
                group: mapping.group,
                relation: mapping.map.relation,
                created_at_unix: mapping.map.created_at_unix,
                tags,
            })
            .collect())
    }

    /// Inverse of [`Self::resolve_effective_owners`]: every active group `user_id` may manage.
    pub async fn groups_managed_by(&self, user_id: UserId) -> Result<BTreeSet<GroupId>, AccessFailure> {
        let owned = self.store.groups_owned_by(user_id, self.now_unix).await?;
        let mut managed: BTreeSet<GroupId> = owned.iter().map(|group| group.id).collect();

        let administered_apps = owned
            .iter()
            .filter_map(|group| match group.kind {
                GroupKind::App {
                    app_id,
                    is_owner_group: true,
                } => Some(app_id),
                _ => None,
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();
        if !administered_apps.is_empty() {
            managed.extend(self.store.app_groups_of(&administered_apps).await?);
        }

        let owner_targets = managed.iter().copied().collect::<Vec<_>>();
        if !owner_targets.is_empty() {
            managed.extend(
                self.store
                    .role_groups_granting_ownership(&owner_targets, self.now_unix)
                    .await?,
            );
        }

        Ok(managed)
    }
}
