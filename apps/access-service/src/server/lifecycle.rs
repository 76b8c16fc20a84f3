use std::{future::Future, sync::Arc, time::Duration};

use access_core::{
    AccessRequest, AccessRequestId, AccessRequestStatus, GrantRelation, Group, GroupId, Reason,
    RoleRelation, User, UserId,
};
use access_protocol::NotificationAudience;

use super::{
    authorization::{is_self_request, AuthorizationPolicy},
    constraints::ConstraintEngine,
    core::{now_unix, AppConfig, DUPLICATE_REQUEST_REASON},
    directory::{DirectoryStore, MembershipGrant, Resolution},
    errors::AccessFailure,
    hierarchy::{GroupHierarchy, RoleTarget},
    metrics::{record_duplicates_superseded, record_lifecycle_outcome},
    notifications::{NotificationEvent, NotificationSink},
    query::{build_predicate, AccessRequestFilter},
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateAccessRequest {
    pub group_id: GroupId,
    pub request_ownership: bool,
    pub reason: Option<String>,
    pub ending_at_unix: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApproveAccessRequest {
    pub reason: Option<String>,
    pub ending_at_unix: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectAccessRequest {
    pub reason: Option<String>,
    pub notify_requester: bool,
}

impl Default for RejectAccessRequest {
    fn default() -> Self {
        Self {
            reason: None,
            notify_requester: true,
        }
    }
}

/// Drives access requests from creation to a terminal state.
pub struct AccessRequestLifecycle<S, N> {
    store: Arc<S>,
    notifier: N,
    operation_timeout: Duration,
}

impl<S, N> AccessRequestLifecycle<S, N>
where
    S: DirectoryStore,
    N: NotificationSink,
{
    pub fn new(store: Arc<S>, notifier: N, config: &AppConfig) -> Self {
        Self {
            store,
            notifier,
            operation_timeout: config.operation_timeout,
        }
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Open a pending request, superseding any open duplicate, and notify the
    /// group's effective owners.
    ///
    /// # Errors
    /// `UnknownUser` for a missing or deleted requester, `NotFound` for a missing
    /// or deleted group, `GroupNotManaged`, `InvalidReason`, or `Timeout`.
    pub async fn create(
        &self,
        requester_user_id: UserId,
        input: CreateAccessRequest,
    ) -> Result<AccessRequest, AccessFailure> {
        self.run("create", self.create_inner(requester_user_id, input))
            .await
    }

    /// Approve a pending request and grant the requested membership or ownership.
    ///
    /// # Errors
    /// Checks run in order and the first failing one is returned: `NotFound`,
    /// `SelfApproval`, `UnknownUser` (approver), `NotFound` (group deleted),
    /// `NotAuthorized`, `InvalidState`, `GroupNotManaged`, `UnknownUser`
    /// (requester), `InvalidReason`, `ReasonRequired`, then `Timeout`.
    pub async fn approve(
        &self,
        request_id: AccessRequestId,
        approver_user_id: UserId,
        input: ApproveAccessRequest,
    ) -> Result<AccessRequest, AccessFailure> {
        self.run(
            "approve",
            self.approve_inner(request_id, approver_user_id, input),
        )
        .await
    }

    /// Reject a pending request. Requesters may reject their own request to withdraw it.
    ///
    /// # Errors
    /// `NotFound`, `UnknownUser`, `NotAuthorized`, `InvalidState`, `InvalidReason`
    /// or `Timeout`.
    pub async fn reject(
        &self,
        request_id: AccessRequestId,
        rejecter_user_id: UserId,
        input: RejectAccessRequest,
    ) -> Result<AccessRequest, AccessFailure> {
        self.run(
            "reject",
            self.reject_inner(request_id, rejecter_user_id, input),
        )
        .await
    }

    /// # Errors
    /// `NotFound` or `Timeout`.
    pub async fn get(&self, request_id: AccessRequestId) -> Result<AccessRequest, AccessFailure> {
        self.run("get", self.load_request(request_id)).await
    }

    /// Requests matching `filter`, newest first. `@me` references resolve to `actor`.
    ///
    /// # Errors
    /// `Timeout`, or `Internal` on store failure.
    pub async fn list(
        &self,
        actor: UserId,
        filter: &AccessRequestFilter,
    ) -> Result<Vec<AccessRequest>, AccessFailure> {
        self.run("list", async {
            let now = now_unix();
            match build_predicate(&*self.store, actor, filter, now).await? {
                Some(predicate) => self.store.list_requests(&predicate).await,
                None => Ok(Vec::new()),
            }
        })
        .await
    }

    /// # Errors
    /// `NotFound` for a missing or deleted group.
    pub async fn effective_owners(&self, group_id: GroupId) -> Result<Vec<User>, AccessFailure> {
        self.run("effective_owners", async {
            let group = self.load_group(group_id).await?;
            GroupHierarchy::new(&*self.store, now_unix())
                .resolve_effective_owners(&group)
                .await
        })
        .await
    }

    /// # Errors
    /// `Timeout`, or `Internal` on store failure. Deleted groups are never manageable.
    pub async fn can_manage_group(
        &self,
        user_id: UserId,
        group_id: GroupId,
    ) -> Result<bool, AccessFailure> {
        self.run("can_manage_group", async {
            let Some(group) = self.store.active_group(group_id).await? else {
                return Ok(false);
            };
            AuthorizationPolicy::new(&*self.store, now_unix())
                .can_manage_group(user_id, &group)
                .await
        })
        .await
    }

    /// # Errors
    /// `NotFound` for a missing or deleted group.
    pub async fn role_group_targets(
        &self,
        group_id: GroupId,
        relation: RoleRelation,
    ) -> Result<Vec<RoleTarget>, AccessFailure> {
        self.run("role_group_targets", async {
            let group = self.load_group(group_id).await?;
            GroupHierarchy::new(&*self.store, now_unix())
                .resolve_role_group_targets(&group, relation)
                .await
        })
        .await
    }

    async fn run<T>(
        &self,
        operation: &'static str,
        work: impl Future<Output = Result<T, AccessFailure>>,
    ) -> Result<T, AccessFailure> {
        let result = with_timeout(self.operation_timeout, work).await;
        match &result {
            Ok(_) => record_lifecycle_outcome(operation, "ok"),
            Err(failure) => {
                record_lifecycle_outcome(operation, failure.error_code());
                tracing::info!(
                    event = "access_request.failure",
                    operation,
                    outcome = failure.error_code(),
                );
            }
        }
        result
    }

    async fn create_inner(
        &self,
        requester_user_id: UserId,
        input: CreateAccessRequest,
    ) -> Result<AccessRequest, AccessFailure> {
        let now = now_unix();
        let requester = self.load_active_user(requester_user_id).await?;
        let group = self.load_group(input.group_id).await?;
        if !group.is_managed {
            return Err(AccessFailure::GroupNotManaged);
        }
        let reason = Reason::normalize(input.reason.as_deref())?;
        let recipients = self
            .recipients(
                NotificationEvent::RequestCreated,
                Some(&group),
                Some(requester.clone()),
                now,
            )
            .await?;

        let request = AccessRequest::pending(
            requester.id,
            group.id,
            input.request_ownership,
            reason.map(Reason::into_inner),
            input.ending_at_unix,
            now,
        );
        let superseded = self
            .store
            .insert_request_replacing_pending(&request, DUPLICATE_REQUEST_REASON, now)
            .await?;
        if !superseded.is_empty() {
            record_duplicates_superseded(superseded.len());
        }
        for duplicate in &superseded {
            tracing::info!(
                event = "access_request.reject",
                outcome = "duplicate",
                request_id = %duplicate.id,
                replaced_by = %request.id,
            );
        }

        tracing::info!(
            event = "access_request.create",
            outcome = "created",
            request_id = %request.id,
            requester_user_id = %request.requester_user_id,
            group_id = %request.requested_group_id,
            request_ownership = request.request_ownership,
            recipients = recipients.len(),
        );
        self.deliver(NotificationEvent::RequestCreated, &request, &recipients);
        Ok(request)
    }

    async fn approve_inner(
        &self,
        request_id: AccessRequestId,
        approver_user_id: UserId,
        input: ApproveAccessRequest,
    ) -> Result<AccessRequest, AccessFailure> {
        let now = now_unix();
        let request = self.load_request(request_id).await?;
        if is_self_request(approver_user_id, &request) {
            return Err(AccessFailure::SelfApproval);
        }
        let approver = self.load_active_user(approver_user_id).await?;
        let group = self.load_group(request.requested_group_id).await?;
        if !AuthorizationPolicy::new(&*self.store, now)
            .can_manage_group(approver.id, &group)
            .await?
        {
            return Err(AccessFailure::NotAuthorized);
        }
        if !request.is_open() {
            return Err(AccessFailure::InvalidState);
        }
        if !group.is_managed {
            return Err(AccessFailure::GroupNotManaged);
        }
        let requester = self.load_active_user(request.requester_user_id).await?;
        let reason = Reason::normalize(input.reason.as_deref())?;

        let relation = GrantRelation::from_ownership(request.request_ownership);
        let (members, owners) = match relation {
            GrantRelation::Member => (vec![requester.id], Vec::new()),
            GrantRelation::Owner => (Vec::new(), vec![requester.id]),
        };
        let engine = ConstraintEngine::new(&*self.store, now);
        engine
            .validate(
                &group,
                reason.as_ref().map(Reason::as_str),
                &members,
                &owners,
            )
            .await?;
        let ending_at_unix = engine
            .coalesce_ending_at(&group, relation, input.ending_at_unix)
            .await?;
        let recipients = self
            .recipients(
                NotificationEvent::RequestApproved,
                Some(&group),
                Some(requester.clone()),
                now,
            )
            .await?;

        let approved = self
            .store
            .commit_resolution(&Resolution {
                request_id: request.id,
                status: AccessRequestStatus::Approved,
                resolver_user_id: approver.id,
                resolution_reason: reason.map(Reason::into_inner),
                resolved_at_unix: now,
                approval_ending_at_unix: ending_at_unix,
                grant: Some(MembershipGrant {
                    user_id: requester.id,
                    group_id: group.id,
                    is_owner: request.request_ownership,
                    ending_at_unix,
                }),
            })
            .await?;

        tracing::info!(
            event = "access_request.approve",
            outcome = "approved",
            request_id = %approved.id,
            resolver_user_id = %approver.id,
            group_id = %group.id,
            relation = relation.as_str(),
            ending_at_unix = ?ending_at_unix,
        );
        self.deliver(NotificationEvent::RequestApproved, &approved, &recipients);
        Ok(approved)
    }

    async fn reject_inner(
        &self,
        request_id: AccessRequestId,
        rejecter_user_id: UserId,
        input: RejectAccessRequest,
    ) -> Result<AccessRequest, AccessFailure> {
        let now = now_unix();
        let request = self.load_request(request_id).await?;
        let rejecter = self.load_active_user(rejecter_user_id).await?;
        let withdrawn = is_self_request(rejecter.id, &request);
        let group = self.store.active_group(request.requested_group_id).await?;
        if !AuthorizationPolicy::new(&*self.store, now)
            .can_reject(rejecter.id, &request, group.as_ref())
            .await?
        {
            return Err(AccessFailure::NotAuthorized);
        }
        if !request.is_open() {
            return Err(AccessFailure::InvalidState);
        }
        let reason = Reason::normalize(input.reason.as_deref())?;
        let recipients = if !withdrawn && input.notify_requester {
            let requester = self.store.user(request.requester_user_id).await?;
            self.recipients(NotificationEvent::RequestRejected, group.as_ref(), requester, now)
                .await?
        } else {
            Vec::new()
        };

        let rejected = self
            .store
            .commit_resolution(&Resolution {
                request_id: request.id,
                status: AccessRequestStatus::Rejected,
                resolver_user_id: rejecter.id,
                resolution_reason: reason.map(Reason::into_inner),
                resolved_at_unix: now,
                approval_ending_at_unix: None,
                grant: None,
            })
            .await?;

        tracing::info!(
            event = "access_request.reject",
            outcome = if withdrawn { "withdrawn" } else { "rejected" },
            request_id = %rejected.id,
            resolver_user_id = %rejecter.id,
        );
        self.deliver(NotificationEvent::RequestRejected, &rejected, &recipients);
        Ok(rejected)
    }

    /// Active users `event` is addressed to. Deleted groups have no owners to tell.
    async fn recipients(
        &self,
        event: NotificationEvent,
        group: Option<&Group>,
        requester: Option<User>,
        now: i64,
    ) -> Result<Vec<User>, AccessFailure> {
        match event.audience() {
            Some(NotificationAudience::GroupOwners) => match group {
                Some(group) => {
                    GroupHierarchy::new(&*self.store, now)
                        .resolve_effective_owners(group)
                        .await
                }
                None => Ok(Vec::new()),
            },
            Some(NotificationAudience::Requester) => {
                Ok(requester.into_iter().filter(User::is_active).collect())
            }
            None => Ok(Vec::new()),
        }
    }

    fn deliver(&self, event: NotificationEvent, request: &AccessRequest, recipients: &[User]) {
        if recipients.is_empty() {
            tracing::info!(
                event = "notification.skip",
                event_type = event.event_type(),
                request_id = %request.id,
                outcome = "no_recipients",
            );
            return;
        }
        self.notifier.notify(event, request, recipients);
    }

    async fn load_request(&self, request_id: AccessRequestId) -> Result<AccessRequest, AccessFailure> {
        self.store
            .access_request(request_id)
            .await?
            .ok_or(AccessFailure::NotFound)
    }

    async fn load_group(&self, group_id: GroupId) -> Result<Group, AccessFailure> {
        self.store
            .active_group(group_id)
            .await?
            .ok_or(AccessFailure::NotFound)
    }

    async fn load_active_user(&self, user_id: UserId) -> Result<User, AccessFailure> {
        self.store
            .user(user_id)
            .await?
            .filter(User::is_active)
            .ok_or(AccessFailure::UnknownUser)
    }
}

async fn with_timeout<T>(
    limit: Duration,
    work: impl Future<Output = Result<T, AccessFailure>>,
) -> Result<T, AccessFailure> {
    tokio::time::timeout(limit, work)
        .await
        .unwrap_or(Err(AccessFailure::Timeout))
}
