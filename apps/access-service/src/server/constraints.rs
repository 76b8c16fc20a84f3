use access_core::{
    coalesce_ending_at, min_time_limit, reason_violation, GrantRelation, Group, RoleRelation,
    TagMapping, UserId,
};

use super::{directory::DirectoryStore, errors::AccessFailure, hierarchy::GroupHierarchy};

/// Tags that bind one kind of addition to one group.
#[derive(Debug, Clone)]
struct TagScope {
    group: Group,
    tags: Vec<TagMapping>,
    relation: GrantRelation,
}

/// Evaluates tag constraints for membership and ownership additions.
pub struct ConstraintEngine<'a, S> {
    store: &'a S,
    hierarchy: GroupHierarchy<'a, S>,
    now_unix: i64,
}

impl<'a, S: DirectoryStore> ConstraintEngine<'a, S> {
    pub fn new(store: &'a S, now_unix: i64) -> Self {
        Self {
            store,
            hierarchy: GroupHierarchy::new(store, now_unix),
            now_unix,
        }
    }

    /// Reject the addition when any binding tag demands a reason and none was given.
    ///
    /// Member additions to a role group are also checked against the member tags
    /// of the groups it grants membership in and the owner tags of the groups it
    /// grants ownership of.
    pub async fn validate(
        &self,
        group: &Group,
        reason: Option<&str>,
        members_to_add: &[UserId],
        owners_to_add: &[UserId],
    ) -> Result<(), AccessFailure> {
        let mut relations = Vec::with_capacity(2);
        if !members_to_add.is_empty() {
            relations.push(GrantRelation::Member);
        }
        if !owners_to_add.is_empty() {
            relations.push(GrantRelation::Owner);
        }

        for relation in relations {
            for scope in self.tag_scopes(group, relation).await? {
                if let Some(violation) =
                    reason_violation(&scope.group, &scope.tags, scope.relation, reason)
                {
                    return Err(AccessFailure::ReasonRequired(violation.to_string()));
                }
            }
        }
        Ok(())
    }

    /// Clamp `requested_ending_at_unix` to the tightest time limit any binding tag sets.
    pub async fn coalesce_ending_at(
        &self,
        group: &Group,
        relation: GrantRelation,
        requested_ending_at_unix: Option<i64>,
    ) -> Result<Option<i64>, AccessFailure> {
        let limit = self
            .tag_scopes(group, relation)
            .await?
            .iter()
            .filter_map(|scope| min_time_limit(&scope.group, &scope.tags, scope.relation))
            .min();
        Ok(coalesce_ending_at(
            requested_ending_at_unix,
            limit,
            self.now_unix,
        ))
    }

    async fn tag_scopes(
        &self,
        group: &Group,
        relation: GrantRelation,
    ) -> Result<Vec<TagScope>, AccessFailure> {
        let mut scopes = vec![TagScope {
            group: group.clone(),
            tags: self.store.active_tag_mappings(group.id, self.now_unix).await?,
            relation,
        }];
        if !group.is_role_group() || relation == GrantRelation::Owner {
            return Ok(scopes);
        }

        for (role_relation, inherited) in [
            (RoleRelation::GrantsMembership, GrantRelation::Member),
            (RoleRelation::GrantsOwnership, GrantRelation::Owner),
        ] {
            let targets = self
                .hierarchy
                .resolve_role_group_targets(group, role_relation)
                .await?;
            scopes.extend(targets.into_iter().map(|target| TagScope {
                group: target.group,
                tags: target.tags,
                relation: inherited,
            }));
        }
        Ok(scopes)
    }
}
