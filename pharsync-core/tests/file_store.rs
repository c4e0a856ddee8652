//! FileStore lifecycle, optimistic-concurrency, and error-message tests.

use std::fs;

use pharsync_core::{
    DesiredStateStore, FileStore, HttpSource, Identity, PluginResource, PluginSource, PluginSpec,
    StoreError,
};
use tempfile::TempDir;

fn id(namespace: &str, name: &str) -> Identity {
    Identity::new(namespace, name)
}

fn inline(identity: &Identity, data: &[u8]) -> PluginResource {
    PluginResource::new(
        identity,
        PluginSpec {
            source: PluginSource::inline(data.to_vec()),
            dependency_policy: Default::default(),
        },
    )
}

// ---------------------------------------------------------------------------
// 1. Create / get / delete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_then_get_roundtrip() {
    let root = TempDir::new().expect("tempdir");
    let store = FileStore::new(root.path());
    let econ = id("survival", "econ");

    let created = store.create(inline(&econ, b"phar")).await.expect("create");
    assert_eq!(created.resource_version, 1);

    let loaded = store.get(&econ).await.expect("get");
    assert_eq!(loaded.spec.source.data, b"phar");
    assert_eq!(loaded.resource_version, 1);
    assert_eq!(loaded.status.expected_checksum, None);
}

#[tokio::test]
async fn create_twice_is_rejected() {
    let root = TempDir::new().expect("tempdir");
    let store = FileStore::new(root.path());
    let econ = id("survival", "econ");

    store.create(inline(&econ, b"a")).await.expect("create");
    let err = store.create(inline(&econ, b"b")).await.unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists(_)), "got: {err}");
}

#[tokio::test]
async fn get_missing_returns_not_found() {
    let root = TempDir::new().expect("tempdir");
    let store = FileStore::new(root.path());
    let err = store.get(&id("survival", "ghost")).await.unwrap_err();
    assert!(err.is_not_found(), "got: {err}");
    assert!(err.to_string().contains("survival/ghost"));
}

#[tokio::test]
async fn delete_removes_and_then_reports_not_found() {
    let root = TempDir::new().expect("tempdir");
    let store = FileStore::new(root.path());
    let econ = id("survival", "econ");

    store.create(inline(&econ, b"a")).await.expect("create");
    store.delete(&econ).await.expect("delete");
    assert!(store.get(&econ).await.unwrap_err().is_not_found());
    assert!(store.delete(&econ).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn get_rejects_path_escaping_identity() {
    let root = TempDir::new().expect("tempdir");
    let store = FileStore::new(root.path());
    let err = store.get(&id("..", "passwd")).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidIdentity(_)), "got: {err}");
}

// ---------------------------------------------------------------------------
// 2. Update / optimistic concurrency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn update_bumps_version_and_keeps_created_at() {
    let root = TempDir::new().expect("tempdir");
    let store = FileStore::new(root.path());
    let econ = id("survival", "econ");

    let mut resource = store.create(inline(&econ, b"a")).await.expect("create");
    resource.status.expected_checksum = Some(7);
    let updated = store.update(&resource).await.expect("update");

    assert_eq!(updated.resource_version, 2);
    assert_eq!(updated.created_at, resource.created_at);
    assert!(updated.updated_at >= resource.updated_at);
    assert_eq!(
        store.get(&econ).await.unwrap().status.expected_checksum,
        Some(7)
    );
}

#[tokio::test]
async fn stale_update_conflicts() {
    let root = TempDir::new().expect("tempdir");
    let store = FileStore::new(root.path());
    let econ = id("survival", "econ");

    let stale = store.create(inline(&econ, b"a")).await.expect("create");
    let mut fresh = stale.clone();
    fresh.spec.source = PluginSource::http(HttpSource::new("https://example.test/econ.phar"));
    store.update(&fresh).await.expect("first writer");

    let mut late = stale;
    late.status.expected_checksum = Some(1);
    let err = store.update(&late).await.unwrap_err();
    assert!(err.is_conflict(), "got: {err}");

    // The winning spec is intact and the status was not applied.
    let current = store.get(&econ).await.unwrap();
    assert!(current.spec.source.http.is_some());
    assert_eq!(current.status.expected_checksum, None);
}

#[tokio::test]
async fn update_of_deleted_resource_is_not_found() {
    let root = TempDir::new().expect("tempdir");
    let store = FileStore::new(root.path());
    let econ = id("survival", "econ");

    let resource = store.create(inline(&econ, b"a")).await.expect("create");
    store.delete(&econ).await.expect("delete");
    assert!(store.update(&resource).await.unwrap_err().is_not_found());
}

// ---------------------------------------------------------------------------
// 3. List
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_is_sorted_and_skips_foreign_files() {
    let root = TempDir::new().expect("tempdir");
    let store = FileStore::new(root.path());

    for (ns, name) in [("survival", "zeta"), ("creative", "worldedit"), ("survival", "alpha")] {
        store
            .create(inline(&id(ns, name), name.as_bytes()))
            .await
            .expect("create");
    }
    fs::write(root.path().join("survival").join("notes.txt"), "ignored").unwrap();
    fs::write(root.path().join("stray.yaml"), "ignored").unwrap();

    let listed: Vec<String> = store
        .list()
        .await
        .expect("list")
        .iter()
        .map(|r| r.identity().to_string())
        .collect();
    assert_eq!(
        listed,
        vec!["creative/worldedit", "survival/alpha", "survival/zeta"]
    );
}

#[tokio::test]
async fn list_skips_corrupt_document_that_get_still_reports() {
    let root = TempDir::new().expect("tempdir");
    let store = FileStore::new(root.path());
    store.create(inline(&id("survival", "econ"), b"ok")).await.unwrap();
    fs::write(
        root.path().join("survival/broken.yaml"),
        b": : corrupt : yaml : !!!\n  - [unclosed",
    )
    .unwrap();

    let listed = store.list().await.unwrap();
    let ids: Vec<Identity> = listed.iter().map(|r| r.identity()).collect();
    assert_eq!(ids, vec![id("survival", "econ")]);

    let err = store.get(&id("survival", "broken")).await.unwrap_err();
    assert!(matches!(err, StoreError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("broken.yaml"));
}

#[tokio::test]
async fn document_identity_follows_file_location() {
    let root = TempDir::new().expect("tempdir");
    let dir = root.path().join("survival");
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("econ.yaml"),
        "namespace: other\nname: mislabeled\nspec:\n  source:\n    data: '6869'\n",
    )
    .unwrap();

    let store = FileStore::new(root.path());
    let resource = store.get(&id("survival", "econ")).await.expect("get");
    assert_eq!(resource.identity(), id("survival", "econ"));
    assert_eq!(resource.spec.source.data, b"hi");
}
