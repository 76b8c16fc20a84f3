use sqlx::PgPool;

const SCHEMA_INIT_LOCK_ID: i64 = 0x4143_4345_5353_5251;

const CREATE_USERS_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS users (
                    user_id TEXT PRIMARY KEY,
                    email TEXT NOT NULL,
                    display_name TEXT NOT NULL DEFAULT '',
                    deleted_at_unix BIGINT NULL
                )";
const CREATE_USERS_EMAIL_INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS idx_users_email_lower ON users(lower(email))";
const CREATE_APPS_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS apps (
                    app_id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    deleted_at_unix BIGINT NULL
                )";
const CREATE_GROUPS_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS groups (
                    group_id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    kind SMALLINT NOT NULL,
                    app_id TEXT NULL REFERENCES apps(app_id),
                    is_owner_group BOOLEAN NOT NULL DEFAULT FALSE,
                    is_managed BOOLEAN NOT NULL DEFAULT TRUE,
                    deleted_at_unix BIGINT NULL
                )";
const CREATE_GROUPS_APP_INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS idx_groups_app ON groups(app_id, is_owner_group)";
const CREATE_MEMBERSHIPS_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS memberships (
                    membership_id TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL REFERENCES users(user_id),
                    group_id TEXT NOT NULL REFERENCES groups(group_id),
                    is_owner BOOLEAN NOT NULL,
                    created_at_unix BIGINT NOT NULL,
                    ended_at_unix BIGINT NULL
                )";
const CREATE_MEMBERSHIPS_GROUP_INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS idx_memberships_group_owner ON memberships(group_id, is_owner)";
const CREATE_MEMBERSHIPS_USER_INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS idx_memberships_user_group ON memberships(user_id, group_id)";
const CREATE_ROLE_GROUP_MAPS_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS role_group_maps (
                    map_id TEXT PRIMARY KEY,
                    role_group_id TEXT NOT NULL REFERENCES groups(group_id),
                    group_id TEXT NOT NULL REFERENCES groups(group_id),
                    relation SMALLINT NOT NULL,
                    created_at_unix BIGINT NOT NULL,
                    ended_at_unix BIGINT NULL
                )";
const CREATE_ROLE_GROUP_MAPS_ROLE_INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS idx_role_group_maps_role_relation
                    ON role_group_maps(role_group_id, relation, created_at_unix)";
const CREATE_ROLE_GROUP_MAPS_TARGET_INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS idx_role_group_maps_target_relation
                    ON role_group_maps(group_id, relation)";
const CREATE_TAGS_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS tags (
                    tag_id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    enabled BOOLEAN NOT NULL DEFAULT TRUE,
                    constraints_json TEXT NOT NULL DEFAULT '{}',
                    deleted_at_unix BIGINT NULL
                )";
const CREATE_GROUP_TAG_MAPS_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS group_tag_maps (
                    tag_map_id TEXT PRIMARY KEY,
                    group_id TEXT NOT NULL REFERENCES groups(group_id),
                    tag_id TEXT NOT NULL REFERENCES tags(tag_id),
                    app_constraints_json TEXT NULL,
                    ended_at_unix BIGINT NULL
                )";
const CREATE_GROUP_TAG_MAPS_GROUP_INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS idx_group_tag_maps_group ON group_tag_maps(group_id)";
const CREATE_ACCESS_REQUESTS_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS access_requests (
                    request_id TEXT PRIMARY KEY,
                    requester_user_id TEXT NOT NULL REFERENCES users(user_id),
                    requested_group_id TEXT NOT NULL REFERENCES groups(group_id),
                    request_ownership BOOLEAN NOT NULL,
                    status SMALLINT NOT NULL,
                    request_reason TEXT NULL,
                    request_ending_at_unix BIGINT NULL,
                    resolver_user_id TEXT NULL REFERENCES users(user_id),
                    resolution_reason TEXT NULL,
                    resolved_at_unix BIGINT NULL,
                    approval_ending_at_unix BIGINT NULL,
                    created_at_unix BIGINT NOT NULL
                )";
const CREATE_ACCESS_REQUESTS_DUPLICATE_INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS idx_access_requests_requester_group
                    ON access_requests(requester_user_id, requested_group_id, request_ownership, status)";
const CREATE_ACCESS_REQUESTS_CREATED_INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS idx_access_requests_created
                    ON access_requests(created_at_unix DESC)";

const SCHEMA_STATEMENTS: [&str; 17] = [
    CREATE_USERS_TABLE_SQL,
    CREATE_USERS_EMAIL_INDEX_SQL,
    CREATE_APPS_TABLE_SQL,
    CREATE_GROUPS_TABLE_SQL,
    CREATE_GROUPS_APP_INDEX_SQL,
    CREATE_MEMBERSHIPS_TABLE_SQL,
    CREATE_MEMBERSHIPS_GROUP_INDEX_SQL,
    CREATE_MEMBERSHIPS_USER_INDEX_SQL,
    CREATE_ROLE_GROUP_MAPS_TABLE_SQL,
    CREATE_ROLE_GROUP_MAPS_ROLE_INDEX_SQL,
    CREATE_ROLE_GROUP_MAPS_TARGET_INDEX_SQL,
    CREATE_TAGS_TABLE_SQL,
    CREATE_GROUP_TAG_MAPS_TABLE_SQL,
    CREATE_GROUP_TAG_MAPS_GROUP_INDEX_SQL,
    CREATE_ACCESS_REQUESTS_TABLE_SQL,
    CREATE_ACCESS_REQUESTS_DUPLICATE_INDEX_SQL,
    CREATE_ACCESS_REQUESTS_CREATED_INDEX_SQL,
];

/// Create every table and index if missing. Concurrent callers serialize on an
/// advisory lock so only one runs the DDL.
pub(crate) async fn apply_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(SCHEMA_INIT_LOCK_ID)
        .execute(&mut *tx)
        .await?;

    for statement in SCHEMA_STATEMENTS {
        sqlx::query(statement).execute(&mut *tx).await?;
    }

    tx.commit().await
}
