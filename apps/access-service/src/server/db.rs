mod schema;

use std::sync::Arc;

use access_core::{
    AccessRequest, AccessRequestId, AccessRequestStatus, App, AppId, DomainError, Group, GroupId,
    GroupKind, MembershipEdge, MembershipId, RoleGroupMap, RoleRelation, Tag, TagConstraints,
    TagMapping, User, UserId,
};
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    PgPool, Postgres, QueryBuilder, Row,
};
use tokio::sync::OnceCell;

use super::{
    directory::{
        DirectorySeed, DirectoryStore, MembershipGrant, Resolution, RoleMapping, TagAssignment,
    },
    errors::AccessFailure,
    query::{escape_like, RequestPredicate},
};

const USER_COLUMNS: &str = "u.user_id, u.email, u.display_name, u.deleted_at_unix";
const GROUP_COLUMNS: &str = "g.group_id, g.name, g.description, g.kind, g.app_id, \
     g.is_owner_group, g.is_managed, g.deleted_at_unix";
const REQUEST_COLUMNS: &str = "r.request_id, r.requester_user_id, r.requested_group_id, \
     r.request_ownership, r.status, r.request_reason, r.request_ending_at_unix, \
     r.resolver_user_id, r.resolution_reason, r.resolved_at_unix, \
     r.approval_ending_at_unix, r.created_at_unix";

/// Directory and request table backed by Postgres. The schema is created on
/// first use.
#[derive(Clone)]
pub struct PostgresDirectory {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

impl PostgresDirectory {
    /// Build a lazily connecting pool; no connection is opened until first use.
    ///
    /// # Errors
    /// Returns `Internal` when `database_url` cannot be parsed.
    pub fn connect_lazy(database_url: &str, max_connections: u32) -> Result<Self, AccessFailure> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_lazy(database_url)?;
        Ok(Self::from_pool(pool))
    }

    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        }
    }

    /// # Errors
    /// Returns `Internal` when the schema statements fail.
    pub async fn ensure_schema(&self) -> Result<(), AccessFailure> {
        self.schema_ready
            .get_or_try_init(|| async { schema::apply_schema(&self.pool).await })
            .await
            .map(|_| ())
            .map_err(|e| {
                tracing::error!(event = "db.init", error = %e);
                AccessFailure::Internal
            })
    }

    async fn pool(&self) -> Result<&PgPool, AccessFailure> {
        self.ensure_schema().await?;
        Ok(&self.pool)
    }
}

fn group_kind_to_i16(kind: GroupKind) -> i16 {
    match kind {
        GroupKind::Direct => 0,
        GroupKind::App { .. } => 1,
        GroupKind::Role => 2,
    }
}

fn relation_to_i16(relation: RoleRelation) -> i16 {
    match relation {
        RoleRelation::GrantsMembership => 0,
        RoleRelation::GrantsOwnership => 1,
    }
}

fn relation_from_i16(value: i16) -> Result<RoleRelation, AccessFailure> {
    match value {
        0 => Ok(RoleRelation::GrantsMembership),
        1 => Ok(RoleRelation::GrantsOwnership),
        _ => Err(DomainError::InvalidRoleRelation.into()),
    }
}

fn status_to_i16(status: AccessRequestStatus) -> i16 {
    match status {
        AccessRequestStatus::Pending => 0,
        AccessRequestStatus::Approved => 1,
        AccessRequestStatus::Rejected => 2,
    }
}

fn status_from_i16(value: i16) -> Result<AccessRequestStatus, AccessFailure> {
    match value {
        0 => Ok(AccessRequestStatus::Pending),
        1 => Ok(AccessRequestStatus::Approved),
        2 => Ok(AccessRequestStatus::Rejected),
        _ => Err(DomainError::InvalidRequestStatus.into()),
    }
}

fn constraints_to_json(constraints: &TagConstraints) -> Result<String, AccessFailure> {
    serde_json::to_string(constraints).map_err(|_| AccessFailure::Internal)
}

fn constraints_from_json(value: &str) -> Result<TagConstraints, AccessFailure> {
    serde_json::from_str(value).map_err(|e| {
        tracing::error!(event = "db.decode", field = "constraints_json", error = %e);
        AccessFailure::Internal
    })
}

fn user_from_row(row: &PgRow) -> Result<User, AccessFailure> {
    Ok(User {
        id: UserId::try_from(row.try_get::<String, _>("user_id")?)?,
        email: row.try_get("email")?,
        display_name: row.try_get("display_name")?,
        deleted_at_unix: row.try_get("deleted_at_unix")?,
    })
}

fn group_from_row(row: &PgRow) -> Result<Group, AccessFailure> {
    let kind = match row.try_get::<i16, _>("kind")? {
        0 => GroupKind::Direct,
        1 => {
            let app_id: Option<String> = row.try_get("app_id")?;
            GroupKind::App {
                app_id: AppId::try_from(app_id.ok_or(DomainError::InvalidAppId)?)?,
                is_owner_group: row.try_get("is_owner_group")?,
            }
        }
        2 => GroupKind::Role,
        _ => return Err(DomainError::InvalidGroupType.into()),
    };
    Ok(Group {
        id: GroupId::try_from(row.try_get::<String, _>("group_id")?)?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        kind,
        is_managed: row.try_get("is_managed")?,
        deleted_at_unix: row.try_get("deleted_at_unix")?,
    })
}

fn request_from_row(row: &PgRow) -> Result<AccessRequest, AccessFailure> {
    let resolver_user_id = row
        .try_get::<Option<String>, _>("resolver_user_id")?
        .map(UserId::try_from)
        .transpose()?;
    Ok(AccessRequest {
        id: AccessRequestId::try_from(row.try_get::<String, _>("request_id")?)?,
        requester_user_id: UserId::try_from(row.try_get::<String, _>("requester_user_id")?)?,
        requested_group_id: GroupId::try_from(row.try_get::<String, _>("requested_group_id")?)?,
        request_ownership: row.try_get("request_ownership")?,
        status: status_from_i16(row.try_get("status")?)?,
        request_reason: row.try_get("request_reason")?,
        request_ending_at_unix: row.try_get("request_ending_at_unix")?,
        resolver_user_id,
        resolution_reason: row.try_get("resolution_reason")?,
        resolved_at_unix: row.try_get("resolved_at_unix")?,
        approval_ending_at_unix: row.try_get("approval_ending_at_unix")?,
        created_at_unix: row.try_get("created_at_unix")?,
    })
}

fn membership_from_row(row: &PgRow) -> Result<MembershipEdge, AccessFailure> {
    Ok(MembershipEdge {
        id: row.try_get::<String, _>("membership_id")?.try_into()?,
        user_id: UserId::try_from(row.try_get::<String, _>("user_id")?)?,
        group_id: GroupId::try_from(row.try_get::<String, _>("group_id")?)?,
        is_owner: row.try_get("is_owner")?,
        created_at_unix: row.try_get("created_at_unix")?,
        ended_at_unix: row.try_get("ended_at_unix")?,
    })
}

fn ids_to_strings<T: ToString>(ids: &[T]) -> Vec<String> {
    ids.iter().map(ToString::to_string).collect()
}

impl DirectoryStore for PostgresDirectory {
    async fn user(&self, user_id: UserId) -> Result<Option<User>, AccessFailure> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users u WHERE u.user_id = $1"))
            .bind(user_id.to_string())
            .fetch_optional(self.pool().await?)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user(&self, reference: &str) -> Result<Option<User>, AccessFailure> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users u
             WHERE u.user_id = $1 OR lower(u.email) = lower($1)
             ORDER BY (u.user_id = $1) DESC, u.user_id
             LIMIT 1"
        ))
        .bind(reference)
        .fetch_optional(self.pool().await?)
        .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn active_group(&self, group_id: GroupId) -> Result<Option<Group>, AccessFailure> {
        let row = sqlx::query(&format!(
            "SELECT {GROUP_COLUMNS} FROM groups g
             WHERE g.group_id = $1 AND g.deleted_at_unix IS NULL"
        ))
        .bind(group_id.to_string())
        .fetch_optional(self.pool().await?)
        .await?;
        row.as_ref().map(group_from_row).transpose()
    }

    async fn find_groups(&self, reference: &str) -> Result<Vec<GroupId>, AccessFailure> {
        let rows = sqlx::query(
            "SELECT group_id FROM groups
             WHERE group_id = $1 OR lower(name) = lower($1)
             ORDER BY group_id",
        )
        .bind(reference)
        .fetch_all(self.pool().await?)
        .await?;
        rows.iter()
            .map(|row| -> Result<GroupId, AccessFailure> {
                Ok(GroupId::try_from(row.try_get::<String, _>("group_id")?)?)
            })
            .collect()
    }

    async fn direct_owners(
        &self,
        group_id: GroupId,
        now_unix: i64,
    ) -> Result<Vec<User>, AccessFailure> {
        let rows = sqlx::query(&format!(
            "SELECT DISTINCT {USER_COLUMNS}
             FROM memberships m
             JOIN users u ON u.user_id = m.user_id
             JOIN groups g ON g.group_id = m.group_id
             WHERE m.group_id = $1
               AND m.is_owner
               AND (m.ended_at_unix IS NULL OR m.ended_at_unix > $2)
               AND u.deleted_at_unix IS NULL
               AND g.deleted_at_unix IS NULL
             ORDER BY u.user_id"
        ))
        .bind(group_id.to_string())
        .bind(now_unix)
        .fetch_all(self.pool().await?)
        .await?;
        rows.iter().map(user_from_row).collect()
    }

    async fn owner_app_groups(&self, app_id: AppId) -> Result<Vec<Group>, AccessFailure> {
        let rows = sqlx::query(&format!(
            "SELECT {GROUP_COLUMNS}
             FROM groups g
             JOIN apps a ON a.app_id = g.app_id
             WHERE g.app_id = $1
               AND g.kind = $2
               AND g.is_owner_group
               AND g.deleted_at_unix IS NULL
               AND a.deleted_at_unix IS NULL
             ORDER BY g.group_id"
        ))
        .bind(app_id.to_string())
        .bind(group_kind_to_i16(GroupKind::App {
            app_id,
            is_owner_group: true,
        }))
        .fetch_all(self.pool().await?)
        .await?;
        rows.iter().map(group_from_row).collect()
    }

    async fn role_mappings(
        &self,
        role_group_id: GroupId,
        relation: RoleRelation,
        now_unix: i64,
    ) -> Result<Vec<RoleMapping>, AccessFailure> {
        let rows = sqlx::query(&format!(
            "SELECT rm.map_id, rm.role_group_id, rm.relation,
                    rm.created_at_unix AS map_created_at_unix,
                    rm.ended_at_unix AS map_ended_at_unix,
                    {GROUP_COLUMNS}
             FROM role_group_maps rm
             JOIN groups g ON g.group_id = rm.group_id
             JOIN groups rg ON rg.group_id = rm.role_group_id
             WHERE rm.role_group_id = $1
               AND rm.relation = $2
               AND (rm.ended_at_unix IS NULL OR rm.ended_at_unix > $3)
               AND g.deleted_at_unix IS NULL
               AND rg.deleted_at_unix IS NULL
             ORDER BY rm.created_at_unix, rm.map_id"
        ))
        .bind(role_group_id.to_string())
        .bind(relation_to_i16(relation))
        .bind(now_unix)
        .fetch_all(self.pool().await?)
        .await?;

        rows.iter()
            .map(|row| -> Result<RoleMapping, AccessFailure> {
                let group = group_from_row(row)?;
                Ok(RoleMapping {
                    map: RoleGroupMap {
                        id: row.try_get::<String, _>("map_id")?.try_into()?,
                        role_group_id: GroupId::try_from(
                            row.try_get::<String, _>("role_group_id")?,
                        )?,
                        group_id: group.id,
                        relation: relation_from_i16(row.try_get("relation")?)?,
                        created_at_unix: row.try_get("map_created_at_unix")?,
                        ended_at_unix: row.try_get("map_ended_at_unix")?,
                    },
                    group,
                })
            })
            .collect()
    }

    async fn active_tag_mappings(
        &self,
        group_id: GroupId,
        now_unix: i64,
    ) -> Result<Vec<TagMapping>, AccessFailure> {
        let rows = sqlx::query(
            "SELECT tm.tag_map_id, tm.group_id, tm.app_constraints_json, tm.ended_at_unix,
                    t.tag_id, t.name, t.enabled, t.constraints_json, t.deleted_at_unix
             FROM group_tag_maps tm
             JOIN tags t ON t.tag_id = tm.tag_id
             WHERE tm.group_id = $1
               AND t.enabled
               AND t.deleted_at_unix IS NULL
               AND (tm.ended_at_unix IS NULL OR tm.ended_at_unix > $2)
             ORDER BY tm.tag_map_id",
        )
        .bind(group_id.to_string())
        .bind(now_unix)
        .fetch_all(self.pool().await?)
        .await?;

        rows.iter()
            .map(|row| -> Result<TagMapping, AccessFailure> {
                let app_override = row
                    .try_get::<Option<String>, _>("app_constraints_json")?
                    .as_deref()
                    .map(constraints_from_json)
                    .transpose()?;
                Ok(TagMapping {
                    id: row.try_get::<String, _>("tag_map_id")?.try_into()?,
                    group_id: GroupId::try_from(row.try_get::<String, _>("group_id")?)?,
                    tag: Tag {
                        id: row.try_get::<String, _>("tag_id")?.try_into()?,
                        name: row.try_get("name")?,
                        enabled: row.try_get("enabled")?,
                        constraints: constraints_from_json(
                            &row.try_get::<String, _>("constraints_json")?,
                        )?,
                        deleted_at_unix: row.try_get("deleted_at_unix")?,
                    },
                    app_override,
                    ended_at_unix: row.try_get("ended_at_unix")?,
                })
            })
            .collect()
    }

    async fn groups_owned_by(
        &self,
        user_id: UserId,
        now_unix: i64,
    ) -> Result<Vec<Group>, AccessFailure> {
        let rows = sqlx::query(&format!(
            "SELECT DISTINCT {GROUP_COLUMNS}
             FROM memberships m
             JOIN users u ON u.user_id = m.user_id
             JOIN groups g ON g.group_id = m.group_id
             WHERE m.user_id = $1
               AND m.is_owner
               AND (m.ended_at_unix IS NULL OR m.ended_at_unix > $2)
               AND u.deleted_at_unix IS NULL
               AND g.deleted_at_unix IS NULL
             ORDER BY g.group_id"
        ))
        .bind(user_id.to_string())
        .bind(now_unix)
        .fetch_all(self.pool().await?)
        .await?;
        rows.iter().map(group_from_row).collect()
    }

    async fn app_groups_of(&self, app_ids: &[AppId]) -> Result<Vec<GroupId>, AccessFailure> {
        let rows = sqlx::query(
            "SELECT g.group_id
             FROM groups g
             JOIN apps a ON a.app_id = g.app_id
             WHERE g.app_id = ANY($1)
               AND g.deleted_at_unix IS NULL
               AND a.deleted_at_unix IS NULL
             ORDER BY g.group_id",
        )
        .bind(ids_to_strings(app_ids))
        .fetch_all(self.pool().await?)
        .await?;
        rows.iter()
            .map(|row| -> Result<GroupId, AccessFailure> {
                Ok(GroupId::try_from(row.try_get::<String, _>("group_id")?)?)
            })
            .collect()
    }

    async fn role_groups_granting_ownership(
        &self,
        group_ids: &[GroupId],
        now_unix: i64,
    ) -> Result<Vec<GroupId>, AccessFailure> {
        let rows = sqlx::query(
            "SELECT DISTINCT rm.role_group_id
             FROM role_group_maps rm
             JOIN groups rg ON rg.group_id = rm.role_group_id
             JOIN groups g ON g.group_id = rm.group_id
             WHERE rm.group_id = ANY($1)
               AND rm.relation = $2
               AND (rm.ended_at_unix IS NULL OR rm.ended_at_unix > $3)
               AND rg.kind = $4
               AND rg.deleted_at_unix IS NULL
               AND g.deleted_at_unix IS NULL
             ORDER BY rm.role_group_id",
        )
        .bind(ids_to_strings(group_ids))
        .bind(relation_to_i16(RoleRelation::GrantsOwnership))
        .bind(now_unix)
        .bind(group_kind_to_i16(GroupKind::Role))
        .fetch_all(self.pool().await?)
        .await?;
        rows.iter()
            .map(|row| -> Result<GroupId, AccessFailure> {
                Ok(GroupId::try_from(row.try_get::<String, _>("role_group_id")?)?)
            })
            .collect()
    }

    async fn active_memberships(
        &self,
        user_id: UserId,
        group_id: GroupId,
        now_unix: i64,
    ) -> Result<Vec<MembershipEdge>, AccessFailure> {
        let rows = sqlx::query(
            "SELECT membership_id, user_id, group_id, is_owner, created_at_unix, ended_at_unix
             FROM memberships
             WHERE user_id = $1
               AND group_id = $2
               AND (ended_at_unix IS NULL OR ended_at_unix > $3)
             ORDER BY created_at_unix, membership_id",
        )
        .bind(user_id.to_string())
        .bind(group_id.to_string())
        .bind(now_unix)
        .fetch_all(self.pool().await?)
        .await?;
        rows.iter().map(membership_from_row).collect()
    }

    async fn access_request(
        &self,
        request_id: AccessRequestId,
    ) -> Result<Option<AccessRequest>, AccessFailure> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM access_requests r WHERE r.request_id = $1"
        ))
        .bind(request_id.to_string())
        .fetch_optional(self.pool().await?)
        .await?;
        row.as_ref().map(request_from_row).transpose()
    }

    async fn insert_request_replacing_pending(
        &self,
        request: &AccessRequest,
        duplicate_reason: &str,
        now_unix: i64,
    ) -> Result<Vec<AccessRequest>, AccessFailure> {
        let mut tx = self.pool().await?.begin().await?;
        let lock_key = format!(
            "access_request:{}:{}:{}",
            request.requester_user_id, request.requested_group_id, request.request_ownership
        );
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(lock_key)
            .execute(&mut *tx)
            .await?;

        let superseded = sqlx::query(&format!(
            "UPDATE access_requests AS r
             SET status = $1,
                 resolver_user_id = $2,
                 resolution_reason = $3,
                 resolved_at_unix = $4
             WHERE r.requester_user_id = $2
               AND r.requested_group_id = $5
               AND r.request_ownership = $6
               AND r.status = $7
               AND r.resolved_at_unix IS NULL
             RETURNING {REQUEST_COLUMNS}"
        ))
        .bind(status_to_i16(AccessRequestStatus::Rejected))
        .bind(request.requester_user_id.to_string())
        .bind(duplicate_reason)
        .bind(now_unix)
        .bind(request.requested_group_id.to_string())
        .bind(request.request_ownership)
        .bind(status_to_i16(AccessRequestStatus::Pending))
        .fetch_all(&mut *tx)
        .await?
        .iter()
        .map(request_from_row)
        .collect::<Result<Vec<_>, _>>()?;

        sqlx::query(
            "INSERT INTO access_requests (
                request_id, requester_user_id, requested_group_id, request_ownership, status,
                request_reason, request_ending_at_unix, resolver_user_id, resolution_reason,
                resolved_at_unix, approval_ending_at_unix, created_at_unix
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(request.id.to_string())
        .bind(request.requester_user_id.to_string())
        .bind(request.requested_group_id.to_string())
        .bind(request.request_ownership)
        .bind(status_to_i16(request.status))
        .bind(request.request_reason.as_deref())
        .bind(request.request_ending_at_unix)
        .bind(request.resolver_user_id.map(|id| id.to_string()))
        .bind(request.resolution_reason.as_deref())
        .bind(request.resolved_at_unix)
        .bind(request.approval_ending_at_unix)
        .bind(request.created_at_unix)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(superseded)
    }

    async fn commit_resolution(
        &self,
        resolution: &Resolution,
    ) -> Result<AccessRequest, AccessFailure> {
        let mut tx = self.pool().await?.begin().await?;
        let row = sqlx::query(&format!(
            "UPDATE access_requests AS r
             SET status = $2,
                 resolver_user_id = $3,
                 resolution_reason = $4,
                 resolved_at_unix = $5,
                 approval_ending_at_unix = $6
             WHERE r.request_id = $1
               AND r.status = $7
               AND r.resolved_at_unix IS NULL
             RETURNING {REQUEST_COLUMNS}"
        ))
        .bind(resolution.request_id.to_string())
        .bind(status_to_i16(resolution.status))
        .bind(resolution.resolver_user_id.to_string())
        .bind(resolution.resolution_reason.as_deref())
        .bind(resolution.resolved_at_unix)
        .bind(resolution.approval_ending_at_unix)
        .bind(status_to_i16(AccessRequestStatus::Pending))
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            let exists = sqlx::query("SELECT 1 FROM access_requests WHERE request_id = $1")
                .bind(resolution.request_id.to_string())
                .fetch_optional(&mut *tx)
                .await?
                .is_some();
            return Err(if exists {
                AccessFailure::InvalidState
            } else {
                AccessFailure::NotFound
            });
        };
        let resolved = request_from_row(&row)?;

        if let Some(grant) = resolution.grant {
            apply_grant(&mut tx, grant, resolution.resolved_at_unix).await?;
        }

        tx.commit().await?;
        Ok(resolved)
    }

    async fn list_requests(
        &self,
        predicate: &RequestPredicate,
    ) -> Result<Vec<AccessRequest>, AccessFailure> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {REQUEST_COLUMNS}
             FROM access_requests r
             LEFT JOIN users req ON req.user_id = r.requester_user_id
             LEFT JOIN groups g ON g.group_id = r.requested_group_id
             LEFT JOIN users res ON res.user_id = r.resolver_user_id
             WHERE TRUE"
        ));

        if let Some(status) = predicate.status {
            builder.push(" AND r.status = ");
            builder.push_bind(status_to_i16(status));
        }
        if let Some(user_id) = predicate.requester_user_id {
            builder.push(" AND r.requester_user_id = ");
            builder.push_bind(user_id.to_string());
        }
        if let Some(group_ids) = &predicate.group_ids {
            builder.push(" AND r.requested_group_id = ANY(");
            builder.push_bind(ids_to_strings(group_ids));
            builder.push(")");
        }
        if let Some(group_ids) = &predicate.managed_group_ids {
            builder.push(" AND r.requested_group_id = ANY(");
            builder.push_bind(ids_to_strings(group_ids));
            builder.push(")");
        }
        if let Some(user_id) = predicate.resolver_user_id {
            builder.push(" AND r.resolver_user_id = ");
            builder.push_bind(user_id.to_string());
        }
        if let Some(text) = &predicate.text {
            let contains = format!("%{}%", escape_like(text));
            let statuses = predicate
                .text_statuses()
                .into_iter()
                .map(status_to_i16)
                .collect::<Vec<_>>();
            builder.push(" AND (lower(r.request_id) LIKE ");
            builder.push_bind(format!("{}%", escape_like(text)));
            builder.push(" OR r.status = ANY(");
            builder.push_bind(statuses);
            builder.push(")");
            for column in [
                "req.email",
                "req.display_name",
                "res.email",
                "res.display_name",
                "g.name",
                "g.description",
            ] {
                builder.push(format!(" OR {column} ILIKE "));
                builder.push_bind(contains.clone());
            }
            builder.push(")");
        }
        builder.push(" ORDER BY r.created_at_unix DESC, r.request_id DESC");

        let rows = builder.build().fetch_all(self.pool().await?).await?;
        rows.iter().map(request_from_row).collect()
    }
}

async fn apply_grant(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    grant: MembershipGrant,
    now_unix: i64,
) -> Result<(), AccessFailure> {
    let extended = sqlx::query(
        "UPDATE memberships
         SET ended_at_unix = $4
         WHERE user_id = $1
           AND group_id = $2
           AND is_owner = $3
           AND (ended_at_unix IS NULL OR ended_at_unix > $5)",
    )
    .bind(grant.user_id.to_string())
    .bind(grant.group_id.to_string())
    .bind(grant.is_owner)
    .bind(grant.ending_at_unix)
    .bind(now_unix)
    .execute(&mut **tx)
    .await?
    .rows_affected();
    if extended > 0 {
        return Ok(());
    }

    sqlx::query(
        "INSERT INTO memberships (
            membership_id, user_id, group_id, is_owner, created_at_unix, ended_at_unix
         ) VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(MembershipId::new().to_string())
    .bind(grant.user_id.to_string())
    .bind(grant.group_id.to_string())
    .bind(grant.is_owner)
    .bind(now_unix)
    .bind(grant.ending_at_unix)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

impl DirectorySeed for PostgresDirectory {
    async fn put_user(&self, user: &User) -> Result<(), AccessFailure> {
        sqlx::query(
            "INSERT INTO users (user_id, email, display_name, deleted_at_unix)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (user_id) DO UPDATE
             SET email = EXCLUDED.email,
                 display_name = EXCLUDED.display_name,
                 deleted_at_unix = EXCLUDED.deleted_at_unix",
        )
        .bind(user.id.to_string())
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(user.deleted_at_unix)
        .execute(self.pool().await?)
        .await?;
        Ok(())
    }

    async fn put_app(&self, app: &App) -> Result<(), AccessFailure> {
        sqlx::query(
            "INSERT INTO apps (app_id, name, deleted_at_unix)
             VALUES ($1, $2, $3)
             ON CONFLICT (app_id) DO UPDATE
             SET name = EXCLUDED.name,
                 deleted_at_unix = EXCLUDED.deleted_at_unix",
        )
        .bind(app.id.to_string())
        .bind(&app.name)
        .bind(app.deleted_at_unix)
        .execute(self.pool().await?)
        .await?;
        Ok(())
    }

    async fn put_group(&self, group: &Group) -> Result<(), AccessFailure> {
        let (app_id, is_owner_group) = match group.kind {
            GroupKind::App {
                app_id,
                is_owner_group,
            } => (Some(app_id.to_string()), is_owner_group),
            GroupKind::Direct | GroupKind::Role => (None, false),
        };
        sqlx::query(
            "INSERT INTO groups (
                group_id, name, description, kind, app_id, is_owner_group, is_managed,
                deleted_at_unix
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (group_id) DO UPDATE
             SET name = EXCLUDED.name,
                 description = EXCLUDED.description,
                 kind = EXCLUDED.kind,
                 app_id = EXCLUDED.app_id,
                 is_owner_group = EXCLUDED.is_owner_group,
                 is_managed = EXCLUDED.is_managed,
                 deleted_at_unix = EXCLUDED.deleted_at_unix",
        )
        .bind(group.id.to_string())
        .bind(&group.name)
        .bind(&group.description)
        .bind(group_kind_to_i16(group.kind))
        .bind(app_id)
        .bind(is_owner_group)
        .bind(group.is_managed)
        .bind(group.deleted_at_unix)
        .execute(self.pool().await?)
        .await?;
        Ok(())
    }

    async fn put_membership(&self, edge: &MembershipEdge) -> Result<(), AccessFailure> {
        sqlx::query(
            "INSERT INTO memberships (
                membership_id, user_id, group_id, is_owner, created_at_unix, ended_at_unix
             ) VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (membership_id) DO UPDATE
             SET is_owner = EXCLUDED.is_owner,
                 ended_at_unix = EXCLUDED.ended_at_unix",
        )
        .bind(edge.id.to_string())
        .bind(edge.user_id.to_string())
        .bind(edge.group_id.to_string())
        .bind(edge.is_owner)
        .bind(edge.created_at_unix)
        .bind(edge.ended_at_unix)
        .execute(self.pool().await?)
        .await?;
        Ok(())
    }

    async fn put_role_mapping(&self, map: &RoleGroupMap) -> Result<(), AccessFailure> {
        sqlx::query(
            "INSERT INTO role_group_maps (
                map_id, role_group_id, group_id, relation, created_at_unix, ended_at_unix
             ) VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (map_id) DO UPDATE
             SET relation = EXCLUDED.relation,
                 ended_at_unix = EXCLUDED.ended_at_unix",
        )
        .bind(map.id.to_string())
        .bind(map.role_group_id.to_string())
        .bind(map.group_id.to_string())
        .bind(relation_to_i16(map.relation))
        .bind(map.created_at_unix)
        .bind(map.ended_at_unix)
        .execute(self.pool().await?)
        .await?;
        Ok(())
    }

    async fn put_tag(&self, tag: &Tag) -> Result<(), AccessFailure> {
        sqlx::query(
            "INSERT INTO tags (tag_id, name, enabled, constraints_json, deleted_at_unix)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (tag_id) DO UPDATE
             SET name = EXCLUDED.name,
                 enabled = EXCLUDED.enabled,
                 constraints_json = EXCLUDED.constraints_json,
                 deleted_at_unix = EXCLUDED.deleted_at_unix",
        )
        .bind(tag.id.to_string())
        .bind(&tag.name)
        .bind(tag.enabled)
        .bind(constraints_to_json(&tag.constraints)?)
        .bind(tag.deleted_at_unix)
        .execute(self.pool().await?)
        .await?;
        Ok(())
    }

    async fn put_tag_assignment(&self, assignment: &TagAssignment) -> Result<(), AccessFailure> {
        let app_override = assignment
            .app_override
            .as_ref()
            .map(constraints_to_json)
            .transpose()?;
        sqlx::query(
            "INSERT INTO group_tag_maps (
                tag_map_id, group_id, tag_id, app_constraints_json, ended_at_unix
             ) VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (tag_map_id) DO UPDATE
             SET app_constraints_json = EXCLUDED.app_constraints_json,
                 ended_at_unix = EXCLUDED.ended_at_unix",
        )
        .bind(assignment.id.to_string())
        .bind(assignment.group_id.to_string())
        .bind(assignment.tag_id.to_string())
        .bind(app_override)
        .bind(assignment.ended_at_unix)
        .execute(self.pool().await?)
        .await?;
        Ok(())
    }
}
