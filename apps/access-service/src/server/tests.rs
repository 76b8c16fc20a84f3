use access_core::{
    App, AppId, Group, GroupId, GroupKind, MembershipEdge, MembershipId, RoleGroupMap,
    RoleGroupMapId, RoleRelation, Tag, TagConstraints, TagId, TagMappingId, User, UserId,
};

use super::{
    core::now_unix,
    directory::{DirectorySeed, TagAssignment},
    directory_memory::InMemoryDirectory,
};

/// Seeded in-memory directory shared by the unit tests of this crate.
pub(crate) struct Fixture {
    pub(crate) store: InMemoryDirectory,
    pub(crate) now: i64,
}

impl Fixture {
    pub(crate) fn new() -> Self {
        Self {
            store: InMemoryDirectory::new(),
            now: now_unix(),
        }
    }

    pub(crate) fn user_record(email: &str, display_name: &str) -> User {
        User {
            id: UserId::new(),
            email: email.to_owned(),
            display_name: display_name.to_owned(),
            deleted_at_unix: None,
        }
    }

    pub(crate) fn group_record(name: &str, kind: GroupKind) -> Group {
        Group {
            id: GroupId::new(),
            name: name.to_owned(),
            description: format!("{name} group"),
            kind,
            is_managed: true,
            deleted_at_unix: None,
        }
    }

    pub(crate) async fn user(&self, email: &str) -> User {
        let user = Self::user_record(email, email.split('@').next().unwrap_or(email));
        self.store.put_user(&user).await.expect("user should seed");
        user
    }

    pub(crate) async fn deactivate(&self, user: &User) {
        let mut deleted = user.clone();
        deleted.deleted_at_unix = Some(self.now - 1);
        self.store.put_user(&deleted).await.expect("user should update");
    }

    pub(crate) async fn app(&self, name: &str) -> App {
        let app = App {
            id: AppId::new(),
            name: name.to_owned(),
            deleted_at_unix: None,
        };
        self.store.put_app(&app).await.expect("app should seed");
        app
    }

    pub(crate) async fn group(&self, name: &str, kind: GroupKind) -> Group {
        let group = Self::group_record(name, kind);
        self.store.put_group(&group).await.expect("group should seed");
        group
    }

    pub(crate) async fn app_group(&self, app: &App, name: &str, is_owner_group: bool) -> Group {
        self.group(
            name,
            GroupKind::App {
                app_id: app.id,
                is_owner_group,
            },
        )
        .await
    }

    async fn edge(&self, user: &User, group: &Group, is_owner: bool, ended_at_unix: Option<i64>) {
        let edge = MembershipEdge {
            id: MembershipId::new(),
            user_id: user.id,
            group_id: group.id,
            is_owner,
            created_at_unix: self.now - 60,
            ended_at_unix,
        };
        self.store
            .put_membership(&edge)
            .await
            .expect("membership should seed");
    }

    pub(crate) async fn own(&self, user: &User, group: &Group) {
        self.edge(user, group, true, None).await;
    }

    pub(crate) async fn own_until(&self, user: &User, group: &Group, ended_at_unix: Option<i64>) {
        self.edge(user, group, true, ended_at_unix).await;
    }

    pub(crate) async fn member(&self, user: &User, group: &Group) {
        self.edge(user, group, false, None).await;
    }

    pub(crate) async fn map_role(
        &self,
        role: &Group,
        target: &Group,
        relation: RoleRelation,
    ) -> RoleGroupMap {
        let map = RoleGroupMap {
            id: RoleGroupMapId::new(),
            role_group_id: role.id,
            group_id: target.id,
            relation,
            created_at_unix: self.now - 60,
            ended_at_unix: None,
        };
        self.store
            .put_role_mapping(&map)
            .await
            .expect("role mapping should seed");
        map
    }

    pub(crate) async fn end_role_map(&self, map: &RoleGroupMap) {
        let mut ended = map.clone();
        ended.ended_at_unix = Some(self.now - 1);
        self.store
            .put_role_mapping(&ended)
            .await
            .expect("role mapping should update");
    }

    pub(crate) async fn delete_group(&self, group: &Group) {
        let mut deleted = group.clone();
        deleted.deleted_at_unix = Some(self.now - 1);
        self.store.put_group(&deleted).await.expect("group should update");
    }

    pub(crate) async fn delete_app(&self, app: &App) {
        let mut deleted = app.clone();
        deleted.deleted_at_unix = Some(self.now - 1);
        self.store.put_app(&deleted).await.expect("app should update");
    }

    pub(crate) async fn disable_tag(&self, tag: &Tag) {
        let mut disabled = tag.clone();
        disabled.enabled = false;
        self.store.put_tag(&disabled).await.expect("tag should update");
    }

    pub(crate) async fn tag(&self, group: &Group, name: &str, constraints: TagConstraints) -> Tag {
        let tag = Tag {
            id: TagId::new(),
            name: name.to_owned(),
            enabled: true,
            constraints,
            deleted_at_unix: None,
        };
        self.store.put_tag(&tag).await.expect("tag should seed");
        self.store
            .put_tag_assignment(&TagAssignment {
                id: TagMappingId::new(),
                group_id: group.id,
                tag_id: tag.id,
                app_override: None,
                ended_at_unix: None,
            })
            .await
            .expect("tag assignment should seed");
        tag
    }
}

#[tokio::test]
async fn fixture_seeds_are_visible_through_the_store() {
    use super::directory::DirectoryStore;

    let fixture = Fixture::new();
    let group = fixture.group("Seeded", GroupKind::Direct).await;
    let owner = fixture.user("seed@example.com").await;
    fixture.own(&owner, &group).await;

    let owners = fixture
        .store
        .direct_owners(group.id, fixture.now)
        .await
        .expect("owners should load");
    assert_eq!(owners, vec![owner.clone()]);
    assert_eq!(
        fixture
            .store
            .find_user("SEED@example.com")
            .await
            .expect("lookup should succeed"),
        Some(owner)
    );
    assert_eq!(
        fixture.store.find_groups("seeded").await.expect("lookup should succeed"),
        vec![group.id]
    );
}
