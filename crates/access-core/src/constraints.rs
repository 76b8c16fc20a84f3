use crate::{Group, TagConstraints, TagMapping};

/// Relation a user gains in a group, as seen by tag constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrantRelation {
    Member,
    Owner,
}

impl GrantRelation {
    #[must_use]
    pub const fn from_ownership(request_ownership: bool) -> Self {
        if request_ownership {
            Self::Owner
        } else {
            Self::Member
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Owner => "owner",
        }
    }

    const fn requires_reason(self, constraints: &TagConstraints) -> bool {
        match self {
            Self::Member => constraints.require_member_reason,
            Self::Owner => constraints.require_owner_reason,
        }
    }

    const fn time_limit_secs(self, constraints: &TagConstraints) -> Option<u64> {
        match self {
            Self::Member => constraints.member_time_limit_secs,
            Self::Owner => constraints.owner_time_limit_secs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "a reason is required to add {}s to group `{group_name}` because of tag `{tag_name}`",
    .relation.as_str()
)]
pub struct ReasonViolation {
    pub tag_name: String,
    pub group_name: String,
    pub relation: GrantRelation,
}

#[must_use]
pub fn reason_is_present(reason: Option<&str>) -> bool {
    reason.is_some_and(|value| !value.trim().is_empty())
}

/// First tag on `group` demanding a reason for `relation`, if any. `tags`
/// must already be the group's active mappings.
#[must_use]
pub fn reason_violation(
    group: &Group,
    tags: &[TagMapping],
    relation: GrantRelation,
    reason: Option<&str>,
) -> Option<ReasonViolation> {
    if reason_is_present(reason) {
        return None;
    }
    tags.iter()
        .find(|mapping| relation.requires_reason(&mapping.effective_constraints(group.kind)))
        .map(|mapping| ReasonViolation {
            tag_name: mapping.tag.name.clone(),
            group_name: group.name.clone(),
            relation,
        })
}

/// Tightest time limit, in seconds, that active tags on `group` impose on `relation`.
#[must_use]
pub fn min_time_limit(group: &Group, tags: &[TagMapping], relation: GrantRelation) -> Option<u64> {
    tags.iter()
        .filter_map(|mapping| relation.time_limit_secs(&mapping.effective_constraints(group.kind)))
        .min()
}

/// Clamp a requested ending time so it never exceeds `now + limit`.
#[must_use]
pub fn coalesce_ending_at(
    requested_ending_at_unix: Option<i64>,
    limit_secs: Option<u64>,
    now_unix: i64,
) -> Option<i64> {
    let Some(limit_secs) = limit_secs else {
        return requested_ending_at_unix;
    };
    let cap = now_unix.saturating_add(i64::try_from(limit_secs).unwrap_or(i64::MAX));
    Some(requested_ending_at_unix.map_or(cap, |requested| requested.min(cap)))
}

#[cfg(test)]
mod tests {
    use super::{
        coalesce_ending_at, min_time_limit, reason_is_present, reason_violation, GrantRelation,
    };
    use crate::{
        AppId, Group, GroupId, GroupKind, Tag, TagConstraints, TagId, TagMapping, TagMappingId,
    };

    fn group(kind: GroupKind) -> Group {
        Group {
            id: GroupId::new(),
            name: String::from("App-Payroll-Admins"),
            description: String::new(),
            kind,
            is_managed: true,
            deleted_at_unix: None,
        }
    }

    fn tag(name: &str, enabled: bool, constraints: TagConstraints) -> TagMapping {
        TagMapping {
            id: TagMappingId::new(),
            group_id: GroupId::new(),
            tag: Tag {
                id: TagId::new(),
                name: name.to_owned(),
                enabled,
                constraints,
                deleted_at_unix: None,
            },
            app_override: None,
            ended_at_unix: None,
        }
    }

    #[test]
    fn blank_reason_is_not_present() {
        assert!(!reason_is_present(None));
        assert!(!reason_is_present(Some(" \t")));
        assert!(reason_is_present(Some("ticket-42")));
    }

    #[test]
    fn member_flag_only_binds_member_additions() {
        let target = group(GroupKind::Direct);
        let tags = vec![tag(
            "pci",
            true,
            TagConstraints {
                require_member_reason: true,
                ..TagConstraints::default()
            },
        )];

        let violation = reason_violation(&target, &tags, GrantRelation::Member, None).unwrap();
        assert_eq!(violation.tag_name, "pci");
        assert!(violation.to_string().contains("App-Payroll-Admins"));
        assert!(violation.to_string().contains("members"));
        assert!(reason_violation(&target, &tags, GrantRelation::Owner, None).is_none());
        assert!(reason_violation(&target, &tags, GrantRelation::Member, Some("audit")).is_none());
    }

    #[test]
    fn disabled_tags_are_filtered_before_they_bind() {
        let target = group(GroupKind::Direct);
        let strict = TagConstraints {
            require_owner_reason: true,
            owner_time_limit_secs: Some(60),
            ..TagConstraints::default()
        };
        let active = [tag("retired", false, strict), tag("open", true, TagConstraints::default())]
            .into_iter()
            .filter(|mapping| mapping.is_active_at(0))
            .collect::<Vec<_>>();
        assert_eq!(active.len(), 1);
        assert!(reason_violation(&target, &active, GrantRelation::Owner, None).is_none());
        assert_eq!(min_time_limit(&target, &active, GrantRelation::Owner), None);
    }

    #[test]
    fn app_override_relaxes_reason_on_app_groups() {
        let target = group(GroupKind::App {
            app_id: AppId::new(),
            is_owner_group: false,
        });
        let mut mapping = tag(
            "sox",
            true,
            TagConstraints {
                require_member_reason: true,
                ..TagConstraints::default()
            },
        );
        mapping.app_override = Some(TagConstraints::default());
        assert!(reason_violation(&target, &[mapping], GrantRelation::Member, None).is_none());
    }

    #[test]
    fn min_time_limit_picks_tightest_tag() {
        let target = group(GroupKind::Direct);
        let tags = vec![
            tag(
                "quarterly",
                true,
                TagConstraints {
                    member_time_limit_secs: Some(7_776_000),
                    ..TagConstraints::default()
                },
            ),
            tag(
                "weekly",
                true,
                TagConstraints {
                    member_time_limit_secs: Some(604_800),
                    ..TagConstraints::default()
                },
            ),
        ];
        assert_eq!(
            min_time_limit(&target, &tags, GrantRelation::Member),
            Some(604_800)
        );
        assert_eq!(min_time_limit(&target, &tags, GrantRelation::Owner), None);
    }

    #[test]
    fn coalesce_bounds_unbounded_and_keeps_earlier_requests() {
        assert_eq!(coalesce_ending_at(None, None, 1_000), None);
        assert_eq!(coalesce_ending_at(Some(5_000), None, 1_000), Some(5_000));
        assert_eq!(coalesce_ending_at(None, Some(60), 1_000), Some(1_060));
        assert_eq!(coalesce_ending_at(Some(1_030), Some(60), 1_000), Some(1_030));
        assert_eq!(coalesce_ending_at(Some(9_999), Some(60), 1_000), Some(1_060));
        assert_eq!(coalesce_ending_at(None, Some(u64::MAX), 1_000), Some(i64::MAX));
    }
}
