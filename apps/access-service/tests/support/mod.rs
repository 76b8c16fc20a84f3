#![allow(dead_code)]

use std::{
    sync::{Arc, Mutex},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use access_core::{
    AccessRequest, AccessRequestId, App, AppId, Group, GroupId, GroupKind, MembershipEdge,
    MembershipId, RoleGroupMap, RoleGroupMapId, RoleRelation, Tag, TagConstraints, TagId,
    TagMappingId, User, UserId,
};
use access_service::{
    AccessRequestLifecycle, AppConfig, DirectorySeed, DirectoryStore, NotificationEvent,
    NotificationSink, TagAssignment,
};

pub fn now_unix() -> i64 {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs();
    i64::try_from(seconds).expect("unix time should fit in i64")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub event: NotificationEvent,
    pub request_id: AccessRequestId,
    pub recipients: Vec<UserId>,
}

/// Sink that remembers every event it was handed.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().expect("notifier lock should not be poisoned").clone()
    }

    pub fn sent_for(&self, event: NotificationEvent) -> Vec<SentNotification> {
        self.sent()
            .into_iter()
            .filter(|notification| notification.event == event)
            .collect()
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify(&self, event: NotificationEvent, request: &AccessRequest, recipients: &[User]) {
        self.sent
            .lock()
            .expect("notifier lock should not be poisoned")
            .push(SentNotification {
                event,
                request_id: request.id,
                recipients: recipients.iter().map(|user| user.id).collect(),
            });
    }
}

pub type TestLifecycle<S> = AccessRequestLifecycle<S, Arc<RecordingNotifier>>;

pub fn lifecycle<S: DirectoryStore>(store: Arc<S>) -> (TestLifecycle<S>, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let config = AppConfig {
        operation_timeout: Duration::from_secs(5),
        ..AppConfig::default()
    };
    (
        AccessRequestLifecycle::new(store, Arc::clone(&notifier), &config),
        notifier,
    )
}

pub async fn seed_user<S: DirectorySeed>(store: &S, email: &str) -> User {
    let user = User {
        id: UserId::new(),
        email: email.to_owned(),
        display_name: email.split('@').next().unwrap_or(email).to_owned(),
        deleted_at_unix: None,
    };
    store.put_user(&user).await.expect("user should seed");
    user
}

pub async fn deactivate_user<S: DirectorySeed>(store: &S, user: &User) {
    let mut deleted = user.clone();
    deleted.deleted_at_unix = Some(now_unix() - 1);
    store.put_user(&deleted).await.expect("user should update");
}

pub async fn seed_app<S: DirectorySeed>(store: &S, name: &str) -> App {
    let app = App {
        id: AppId::new(),
        name: name.to_owned(),
        deleted_at_unix: None,
    };
    store.put_app(&app).await.expect("app should seed");
    app
}

pub async fn seed_group<S: DirectorySeed>(store: &S, name: &str, kind: GroupKind) -> Group {
    let group = Group {
        id: GroupId::new(),
        name: name.to_owned(),
        description: format!("{name} access"),
        kind,
        is_managed: true,
        deleted_at_unix: None,
    };
    store.put_group(&group).await.expect("group should seed");
    group
}

pub async fn seed_app_group<S: DirectorySeed>(
    store: &S,
    app: &App,
    name: &str,
    is_owner_group: bool,
) -> Group {
    seed_group(
        store,
        name,
        GroupKind::App {
            app_id: app.id,
            is_owner_group,
        },
    )
    .await
}

pub async fn update_group<S: DirectorySeed>(store: &S, group: &Group) {
    store.put_group(group).await.expect("group should update");
}

pub async fn seed_edge<S: DirectorySeed>(
    store: &S,
    user: &User,
    group: &Group,
    is_owner: bool,
    ended_at_unix: Option<i64>,
) {
    let edge = MembershipEdge {
        id: MembershipId::new(),
        user_id: user.id,
        group_id: group.id,
        is_owner,
        created_at_unix: now_unix() - 60,
        ended_at_unix,
    };
    store
        .put_membership(&edge)
        .await
        .expect("membership should seed");
}

pub async fn seed_owner<S: DirectorySeed>(store: &S, user: &User, group: &Group) {
    seed_edge(store, user, group, true, None).await;
}

pub async fn seed_role_map<S: DirectorySeed>(
    store: &S,
    role: &Group,
    target: &Group,
    relation: RoleRelation,
) -> RoleGroupMap {
    let map = RoleGroupMap {
        id: RoleGroupMapId::new(),
        role_group_id: role.id,
        group_id: target.id,
        relation,
        created_at_unix: now_unix() - 60,
        ended_at_unix: None,
    };
    store
        .put_role_mapping(&map)
        .await
        .expect("role mapping should seed");
    map
}

pub async fn seed_tag<S: DirectorySeed>(
    store: &S,
    group: &Group,
    name: &str,
    constraints: TagConstraints,
    app_override: Option<TagConstraints>,
) -> Tag {
    let tag = Tag {
        id: TagId::new(),
        name: name.to_owned(),
        enabled: true,
        constraints,
        deleted_at_unix: None,
    };
    store.put_tag(&tag).await.expect("tag should seed");
    store
        .put_tag_assignment(&TagAssignment {
            id: TagMappingId::new(),
            group_id: group.id,
            tag_id: tag.id,
            app_override,
            ended_at_unix: None,
        })
        .await
        .expect("tag assignment should seed");
    tag
}
