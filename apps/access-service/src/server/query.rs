use access_core::{AccessRequest, AccessRequestStatus, Group, GroupId, User, UserId};
use serde::Deserialize;

use super::{directory::DirectoryStore, errors::AccessFailure, hierarchy::GroupHierarchy};

/// User reference that resolves to the calling user.
pub const ME: &str = "@me";

/// Caller-facing list filter. User references accept `@me`, a user id or an email;
/// group references accept a group id or a group name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AccessRequestFilter {
    pub status: Option<AccessRequestStatus>,
    pub requester: Option<String>,
    pub group: Option<String>,
    /// Only requests for groups this user can manage.
    pub assignee: Option<String>,
    pub resolver: Option<String>,
    pub q: Option<String>,
}

/// Resolved filter, expressed in ids. `None` fields do not constrain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestPredicate {
    pub status: Option<AccessRequestStatus>,
    pub requester_user_id: Option<UserId>,
    pub group_ids: Option<Vec<GroupId>>,
    pub managed_group_ids: Option<Vec<GroupId>>,
    pub resolver_user_id: Option<UserId>,
    /// Lowercased free-text search.
    pub text: Option<String>,
}

impl RequestPredicate {
    /// Statuses whose name contains the free-text search.
    #[must_use]
    pub fn text_statuses(&self) -> Vec<AccessRequestStatus> {
        let Some(text) = &self.text else {
            return Vec::new();
        };
        [
            AccessRequestStatus::Pending,
            AccessRequestStatus::Approved,
            AccessRequestStatus::Rejected,
        ]
        .into_iter()
        .filter(|status| status.as_str().contains(text.as_str()))
        .collect()
    }

    /// Evaluate against a request and its joined rows.
    #[must_use]
    pub fn matches(
        &self,
        request: &AccessRequest,
        requester: Option<&User>,
        group: Option<&Group>,
        resolver: Option<&User>,
    ) -> bool {
        if self.status.is_some_and(|status| status != request.status) {
            return false;
        }
        if self
            .requester_user_id
            .is_some_and(|user_id| user_id != request.requester_user_id)
        {
            return false;
        }
        if self
            .group_ids
            .as_ref()
            .is_some_and(|ids| !ids.contains(&request.requested_group_id))
        {
            return false;
        }
        if self
            .managed_group_ids
            .as_ref()
            .is_some_and(|ids| !ids.contains(&request.requested_group_id))
        {
            return false;
        }
        if self
            .resolver_user_id
            .is_some_and(|user_id| Some(user_id) != request.resolver_user_id)
        {
            return false;
        }
        let Some(text) = &self.text else {
            return true;
        };

        let id_prefix = request
            .id
            .to_string()
            .to_ascii_lowercase()
            .starts_with(text.as_str());
        let user_hit = |user: Option<&User>| {
            user.is_some_and(|user| {
                contains_folded(&user.email, text) || contains_folded(&user.display_name, text)
            })
        };
        let group_hit = group.is_some_and(|group| {
            contains_folded(&group.name, text) || contains_folded(&group.description, text)
        });

        id_prefix
            || self.text_statuses().contains(&request.status)
            || user_hit(requester)
            || user_hit(resolver)
            || group_hit
    }
}

fn contains_folded(haystack: &str, needle_lowercase: &str) -> bool {
    haystack.to_lowercase().contains(needle_lowercase)
}

/// Escape `LIKE` metacharacters so user text matches literally.
pub(crate) fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

async fn resolve_user<S: DirectoryStore>(
    store: &S,
    actor: UserId,
    reference: &str,
) -> Result<Option<UserId>, AccessFailure> {
    if reference == ME {
        return Ok(Some(actor));
    }
    Ok(store.find_user(reference).await?.map(|user| user.id))
}

/// Resolve caller-facing references into ids. `Ok(None)` means the filter can
/// match nothing, such as a reference to a user that does not exist.
pub(crate) async fn build_predicate<S: DirectoryStore>(
    store: &S,
    actor: UserId,
    filter: &AccessRequestFilter,
    now_unix: i64,
) -> Result<Option<RequestPredicate>, AccessFailure> {
    let mut predicate = RequestPredicate {
        status: filter.status,
        text: non_blank(filter.q.as_deref()).map(str::to_lowercase),
        ..RequestPredicate::default()
    };

    if let Some(reference) = non_blank(filter.requester.as_deref()) {
        let Some(user_id) = resolve_user(store, actor, reference).await? else {
            return Ok(None);
        };
        predicate.requester_user_id = Some(user_id);
    }

    if let Some(reference) = non_blank(filter.group.as_deref()) {
        let group_ids = store.find_groups(reference).await?;
        if group_ids.is_empty() {
            return Ok(None);
        }
        predicate.group_ids = Some(group_ids);
    }

    if let Some(reference) = non_blank(filter.assignee.as_deref()) {
        let Some(user_id) = resolve_user(store, actor, reference).await? else {
            return Ok(None);
        };
        let managed = GroupHierarchy::new(store, now_unix)
            .groups_managed_by(user_id)
            .await?;
        if managed.is_empty() {
            return Ok(None);
        }
        predicate.managed_group_ids = Some(managed.into_iter().collect());
    }

    if let Some(reference) = non_blank(filter.resolver.as_deref()) {
        let Some(user_id) = resolve_user(store, actor, reference).await? else {
            return Ok(None);
        };
        predicate.resolver_user_id = Some(user_id);
    }

    Ok(Some(predicate))
}

#[cfg(test)]
mod tests {
    use access_core::{AccessRequest, AccessRequestStatus, GroupId, GroupKind, UserId};

    use super::{build_predicate, escape_like, AccessRequestFilter, RequestPredicate, ME};
    use crate::server::tests::Fixture;

    #[test]
    fn status_filter_accepts_any_case() {
        for raw in [
            r#"{"status":"PENDING"}"#,
            r#"{"status":"pending"}"#,
            r#"{"status":"Pending"}"#,
        ] {
            let filter = serde_json::from_str::<AccessRequestFilter>(raw).unwrap();
            assert_eq!(filter.status, Some(AccessRequestStatus::Pending));
        }
        assert!(serde_json::from_str::<AccessRequestFilter>(r#"{"status":"expired"}"#).is_err());
        assert_eq!(
            serde_json::to_string(&AccessRequestStatus::Approved).unwrap(),
            r#""approved""#
        );
    }

    #[test]
    fn escape_like_neutralizes_wildcards() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[test]
    fn text_search_covers_status_names_and_joined_rows() {
        let requester = Fixture::user_record("dana@example.com", "Dana Scully");
        let group = Fixture::group_record("Payroll-Readers", GroupKind::Direct);
        let request = AccessRequest::pending(requester.id, group.id, false, None, None, 10);

        let by_status = RequestPredicate {
            text: Some(String::from("pend")),
            ..RequestPredicate::default()
        };
        assert_eq!(by_status.text_statuses(), vec![AccessRequestStatus::Pending]);
        assert!(by_status.matches(&request, Some(&requester), Some(&group), None));

        let by_name = RequestPredicate {
            text: Some(String::from("scully")),
            ..RequestPredicate::default()
        };
        assert!(by_name.matches(&request, Some(&requester), Some(&group), None));

        let by_group = RequestPredicate {
            text: Some(String::from("payroll")),
            ..RequestPredicate::default()
        };
        assert!(by_group.matches(&request, Some(&requester), Some(&group), None));

        let miss = RequestPredicate {
            text: Some(String::from("mulder")),
            ..RequestPredicate::default()
        };
        assert!(!miss.matches(&request, Some(&requester), Some(&group), None));
    }

    #[test]
    fn id_fields_constrain_independently() {
        let requester = UserId::new();
        let request = AccessRequest::pending(requester, GroupId::new(), true, None, None, 1);
        let predicate = RequestPredicate {
            requester_user_id: Some(requester),
            status: Some(AccessRequestStatus::Pending),
            ..RequestPredicate::default()
        };
        assert!(predicate.matches(&request, None, None, None));

        let resolved_by = RequestPredicate {
            resolver_user_id: Some(requester),
            ..RequestPredicate::default()
        };
        assert!(!resolved_by.matches(&request, None, None, None));
    }

    #[tokio::test]
    async fn me_and_email_references_resolve_to_ids() {
        let fixture = Fixture::new();
        let user = fixture.user("fox@example.com").await;

        let filter = AccessRequestFilter {
            requester: Some(String::from(ME)),
            resolver: Some(String::from("FOX@example.com")),
            ..AccessRequestFilter::default()
        };
        let predicate = build_predicate(&fixture.store, user.id, &filter, fixture.now)
            .await
            .unwrap()
            .expect("known references should resolve");
        assert_eq!(predicate.requester_user_id, Some(user.id));
        assert_eq!(predicate.resolver_user_id, Some(user.id));
    }

    #[tokio::test]
    async fn unknown_references_match_nothing() {
        let fixture = Fixture::new();
        let user = fixture.user("fox@example.com").await;

        for filter in [
            AccessRequestFilter {
                requester: Some(String::from("nobody@example.com")),
                ..AccessRequestFilter::default()
            },
            AccessRequestFilter {
                group: Some(String::from("No-Such-Group")),
                ..AccessRequestFilter::default()
            },
            AccessRequestFilter {
                assignee: Some(String::from(ME)),
                ..AccessRequestFilter::default()
            },
        ] {
            let predicate = build_predicate(&fixture.store, user.id, &filter, fixture.now)
                .await
                .unwrap();
            assert_eq!(predicate, None);
        }
    }
}
