use access_core::{AccessRequest, Group, UserId};

use super::{directory::DirectoryStore, errors::AccessFailure, hierarchy::GroupHierarchy};

#[must_use]
pub fn is_self_request(user_id: UserId, request: &AccessRequest) -> bool {
    request.requester_user_id == user_id
}

/// Decides who may act on a group and on requests for it.
pub struct AuthorizationPolicy<'a, S> {
    hierarchy: GroupHierarchy<'a, S>,
}

impl<'a, S: DirectoryStore> AuthorizationPolicy<'a, S> {
    pub fn new(store: &'a S, now_unix: i64) -> Self {
        Self {
            hierarchy: GroupHierarchy::new(store, now_unix),
        }
    }

    /// True when `user_id` is among the effective owners of an active `group`.
    pub async fn can_manage_group(&self, user_id: UserId, group: &Group) -> Result<bool, AccessFailure> {
        if !group.is_active() {
            return Ok(false);
        }
        let owners = self.hierarchy.resolve_effective_owners(group).await?;
        Ok(owners.iter().any(|owner| owner.id == user_id))
    }

    /// Requesters may always withdraw their own request; anyone else must manage
    /// the requested group, which nobody does once it is deleted.
    pub async fn can_reject(
        &self,
        user_id: UserId,
        request: &AccessRequest,
        group: Option<&Group>,
    ) -> Result<bool, AccessFailure> {
        if is_self_request(user_id, request) {
            return Ok(true);
        }
        match group {
            Some(group) => self.can_manage_group(user_id, group).await,
            None => Ok(false),
        }
    }
}
