//! Shared fixtures for the integration tests
//!
//! An in-memory host runtime with tables, tracked objects and a
//! flush/commit cycle, plus recording handlers.

#![allow(dead_code)]

pub mod eval;
pub mod host;
pub mod recording;

use std::sync::Arc;

use rowgate::{register_hooks, AuthHooks, AuthorizationHandler, Config, PostCommitHandler};
use rowgate_common::{row, Row};
use rowgate_query::{Entity, EntityRegistry, Table};
use serde_json::json;
use tracing_subscriber::EnvFilter;

pub use host::{MemoryHost, MemorySession, ObjectId};
pub use recording::{AuthCall, PostCall, RecordingAuth, RecordingPostCommit};

/// Install a test subscriber once per binary
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Mapped entities used across the tests
pub struct Models {
    pub registry: Arc<EntityRegistry>,
    pub user: Arc<Entity>,
    pub group: Arc<Entity>,
    pub user_group: Arc<Entity>,
    pub document: Arc<Entity>,
}

pub fn models() -> Models {
    let mut registry = EntityRegistry::new();
    let user = registry.register(Entity::new(
        "User",
        Arc::new(Table::new("users", &["id", "name", "age"]).with_primary_key(&["id"])),
    ));
    let group = registry.register(Entity::new(
        "Group",
        Arc::new(Table::new("groups", &["id", "name", "parent_id"]).with_primary_key(&["id"])),
    ));
    let user_group = registry.register(Entity::new(
        "UserGroup",
        Arc::new(
            Table::new("user_groups", &["user_id", "group_id"])
                .with_primary_key(&["user_id", "group_id"]),
        ),
    ));
    let document = registry.register(Entity::new(
        "Document",
        Arc::new(
            Table::new("documents", &["id", "owner_id", "title", "archived"])
                .with_primary_key(&["id"]),
        ),
    ));

    Models {
        registry: Arc::new(registry),
        user,
        group,
        user_group,
        document,
    }
}

pub fn user_row(id: i64, name: &str, age: i64) -> Row {
    row([("id", json!(id)), ("name", json!(name)), ("age", json!(age))])
}

pub fn document_row(id: i64, owner_id: i64, title: &str) -> Row {
    row([
        ("id", json!(id)),
        ("owner_id", json!(owner_id)),
        ("title", json!(title)),
        ("archived", json!(false)),
    ])
}

/// Host seeded with a few rows and hooks registered with the given handlers
pub fn setup(
    authorization: Arc<dyn AuthorizationHandler>,
    post_commit: Arc<dyn PostCommitHandler>,
    config: &Config,
) -> (MemoryHost, Arc<AuthHooks>, Models) {
    init_tracing();
    let models = models();
    let mut host = MemoryHost::new(models.registry.clone());
    host.seed(
        "users",
        vec![user_row(1, "alice", 30), user_row(2, "bob", 25), user_row(3, "carol", 41)],
    );
    host.seed(
        "groups",
        vec![
            row([("id", json!(1)), ("name", json!("root")), ("parent_id", json!(null))]),
            row([("id", json!(2)), ("name", json!("eng")), ("parent_id", json!(1))]),
        ],
    );
    host.seed(
        "user_groups",
        vec![
            row([("user_id", 1), ("group_id", 2)]),
            row([("user_id", 2), ("group_id", 1)]),
        ],
    );
    host.seed(
        "documents",
        vec![document_row(1, 1, "plan"), document_row(2, 2, "notes"), document_row(3, 1, "draft")],
    );

    let hooks = register_hooks(&mut host, authorization, post_commit, config)
        .expect("hooks should register");
    (host, hooks, models)
}
