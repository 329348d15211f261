//! Integration tests: several devices exchanging snapshots through a shared
//! remote.

use chrono::NaiveDate;
use serde_json::json;
use snapsync_engine::remote_store::{
    DirectoryConnector, MemoryConnector, MemoryRemote, RemoteConfig, RemoteConnector,
};
use snapsync_engine::storage::{FileStore, InMemoryStore, KeyValueExt, KeyValueStore};
use snapsync_engine::{
    EventKind, FixedClock, MemoryDatabase, RetentionPolicy, SyncConfig, SyncError, SyncEvent, SyncLibs,
    SyncStatus, TickOutcome,
};
use std::sync::{Arc, Mutex};

struct Device {
    libs: SyncLibs,
    db: Arc<MemoryDatabase>,
}

fn device_with(
    connector: Arc<dyn RemoteConnector>,
    store: Arc<dyn KeyValueStore>,
    id: &str,
    config: SyncConfig,
) -> Device {
    store.set_json(&config.identity_key, id).unwrap();
    let db = Arc::new(MemoryDatabase::new("app", ["notes", "tags"]));
    let libs = SyncLibs::new(config, store, db.clone(), connector).with_clock(Arc::new(
        FixedClock(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
    ));
    Device { libs, db }
}

fn memory_device(remote: &MemoryRemote, id: &str) -> Device {
    let dev = device_with(
        Arc::new(MemoryConnector::new(remote.clone())),
        Arc::new(InMemoryStore::new()),
        id,
        SyncConfig::new("ext"),
    );
    dev.libs
        .remote()
        .save_config(&RemoteConfig::new("memory://", "", ""))
        .unwrap();
    dev
}

async fn tick(dev: &Device) -> TickOutcome {
    dev.libs.resolver().run_tick().await.expect("tick failed")
}

#[tokio::test]
async fn two_devices_converge() {
    let remote = MemoryRemote::new();
    let a = memory_device(&remote, "A");
    let b = memory_device(&remote, "B");

    a.db.put("notes", "n1", json!({"title": "from A"})).unwrap();
    b.db.put("notes", "local", json!("B only")).unwrap();

    // A seeds the remote.
    let outcome = tick(&a).await;
    assert!(matches!(outcome, TickOutcome::Seeded { .. }));
    assert_eq!(remote.file_names("/"), vec!["ext-export_2024-01-01_A.json"]);

    // B adopts A's data and claims the snapshot.
    let outcome = tick(&b).await;
    assert!(matches!(outcome, TickOutcome::Received { ref from_device, .. } if from_device == "A"));
    assert_eq!(b.db.get("notes", "n1"), Some(json!({"title": "from A"})));
    assert_eq!(b.db.get("notes", "local"), None);
    assert_eq!(remote.file_names("/"), vec!["ext-export_2024-01-01_B.json"]);

    // A sees B's claim as the newest snapshot and takes it back.
    let outcome = tick(&a).await;
    assert!(matches!(outcome, TickOutcome::Received { ref from_device, .. } if from_device == "B"));
    assert_eq!(remote.file_names("/"), vec!["ext-export_2024-01-01_A.json"]);

    // Now the newest snapshot is A's own, so A refreshes it.
    a.db.put("notes", "n2", json!("second")).unwrap();
    let outcome = tick(&a).await;
    assert!(matches!(outcome, TickOutcome::Refreshed { .. }));

    let outcome = tick(&b).await;
    assert!(outcome.received());
    assert_eq!(b.db.get("notes", "n2"), Some(json!("second")));
    assert_eq!(a.db.rows("notes"), b.db.rows("notes"));
}

#[tokio::test]
async fn newest_writer_wins() {
    let remote = MemoryRemote::new();
    let a = memory_device(&remote, "A");
    let b = memory_device(&remote, "B");
    let c = memory_device(&remote, "C");

    a.db.put("notes", "n", json!("A")).unwrap();
    tick(&a).await;

    // C has never synced; its local data is replaced, not merged.
    c.db.put("notes", "n", json!("C")).unwrap();
    c.db.put("tags", "t", json!("C")).unwrap();
    tick(&c).await;
    assert_eq!(c.db.get("notes", "n"), Some(json!("A")));
    assert_eq!(c.db.get("tags", "t"), None);

    // B picks up whatever C claimed last.
    tick(&b).await;
    assert_eq!(b.db.get("notes", "n"), Some(json!("A")));
    assert_eq!(remote.file_names("/"), vec!["ext-export_2024-01-01_B.json"]);
}

#[tokio::test]
async fn events_follow_ticks() {
    let remote = MemoryRemote::new();
    let a = memory_device(&remote, "A");
    let b = memory_device(&remote, "B");
    tick(&a).await;

    let engine = b.libs.sync();
    let seen = Arc::new(Mutex::new(Vec::new()));
    for kind in [EventKind::Received, EventKind::Uploaded] {
        let sink = Arc::clone(&seen);
        engine.on(
            kind,
            Arc::new(move |e: &SyncEvent| sink.lock().unwrap().push(e.clone())),
        );
    }
    let mut rx = engine.subscribe();

    assert!(engine.sync_now().await.unwrap().unwrap().received());
    assert!(engine.sync_now().await.unwrap().is_some());

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen[0], SyncEvent::Received { from_device: "A".into() });
    assert!(matches!(&seen[1], SyncEvent::Uploaded { path } if path == "/ext-export_2024-01-01_B.json"));
    assert_eq!(rx.recv().await.unwrap().kind(), EventKind::Received);
    assert_eq!(engine.status(), SyncStatus::Success);
}

#[tokio::test]
async fn removing_the_config_fails_ticks() {
    let remote = MemoryRemote::new();
    let a = memory_device(&remote, "A");
    tick(&a).await;

    a.libs.remote().remove_config().unwrap();
    assert!(!a.libs.remote().is_configured());

    let engine = a.libs.sync();
    assert!(engine.sync_now().await.is_err());
    assert_eq!(engine.status(), SyncStatus::Fail);
    assert!(!engine.try_start_sync());
}

#[tokio::test]
async fn pruning_keeps_one_snapshot_per_device() {
    let remote = MemoryRemote::new();
    remote.insert_file(
        "/ext-export_2023-12-01_A.json",
        b"{}",
        chrono::Utc::now() - chrono::Duration::days(31),
    );
    let a = device_with(
        Arc::new(MemoryConnector::new(remote.clone())),
        Arc::new(InMemoryStore::new()),
        "A",
        SyncConfig::new("ext")
            .with_retention(RetentionPolicy::keep_all().with_prune_superseded(true)),
    );
    a.libs
        .remote()
        .save_config(&RemoteConfig::new("memory://", "", ""))
        .unwrap();

    tick(&a).await;

    assert_eq!(remote.file_names("/"), vec!["ext-export_2024-01-01_A.json"]);
}

#[tokio::test]
async fn devices_share_a_directory() {
    let share = tempfile::tempdir().unwrap();
    let homes = tempfile::tempdir().unwrap();
    let url = format!("file://{}", share.path().display());

    let make = |id: &str| {
        let store = FileStore::open(&homes.path().join(format!("{id}.json"))).unwrap();
        let dev = device_with(
            Arc::new(DirectoryConnector::new()),
            Arc::new(store),
            id,
            SyncConfig::new("ext").with_root_path("/sync"),
        );
        dev.libs
            .remote()
            .save_config(&RemoteConfig::new(url.clone(), "", ""))
            .unwrap();
        dev
    };
    let a = make("A");
    let b = make("B");

    a.db.put("notes", "n1", json!("shared")).unwrap();
    assert!(matches!(tick(&a).await, TickOutcome::Seeded { .. }));
    assert!(share.path().join("sync/ext-export_2024-01-01_A.json").exists());

    assert!(tick(&b).await.received());
    assert_eq!(b.db.get("notes", "n1"), Some(json!("shared")));
    assert!(share.path().join("sync/ext-export_2024-01-01_B.json").exists());
    assert!(!share.path().join("sync/ext-export_2024-01-01_A.json").exists());

    b.db.put("notes", "n2", json!("from B")).unwrap();
    assert!(matches!(tick(&b).await, TickOutcome::Refreshed { .. }));

    assert!(tick(&a).await.received());
    assert_eq!(a.db.get("notes", "n2"), Some(json!("from B")));
}

#[tokio::test]
async fn config_survives_reopen() {
    let homes = tempfile::tempdir().unwrap();
    let path = homes.path().join("settings.json");
    let remote = MemoryRemote::new();

    {
        let store = FileStore::open(&path).unwrap();
        let dev = device_with(
            Arc::new(MemoryConnector::new(remote.clone())),
            Arc::new(store),
            "A",
            SyncConfig::new("ext"),
        );
        dev.libs
            .remote()
            .save_config(&RemoteConfig::new("memory://share", "alice", "pw"))
            .unwrap();
        dev.libs.set_auto_sync(true).unwrap();
    }

    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(&path).unwrap());
    let libs = SyncLibs::new(
        SyncConfig::new("ext"),
        store,
        Arc::new(MemoryDatabase::new("app", ["notes"])),
        Arc::new(MemoryConnector::new(remote)),
    );
    assert!(libs.remote().is_configured());
    assert_eq!(libs.remote().url(), "memory://share");
    assert!(libs.is_auto_sync());
    assert_eq!(libs.device_id().unwrap(), "A");
}

#[tokio::test]
async fn namespace_outside_the_naming_convention_never_syncs_silently() {
    let remote = MemoryRemote::new();
    let make = |id: &str| {
        let dev = device_with(
            Arc::new(MemoryConnector::new(remote.clone())),
            Arc::new(InMemoryStore::new()),
            id,
            SyncConfig::new("my_ext"),
        );
        dev.libs
            .remote()
            .save_config(&RemoteConfig::new("memory://", "", ""))
            .unwrap();
        dev
    };
    let a = make("A");
    let b = make("B");
    a.db.put("notes", "n1", json!("from A")).unwrap();

    assert!(a.libs.config().validate().is_err());
    for dev in [&a, &b, &a] {
        let result = dev.libs.resolver().run_tick().await;
        assert!(matches!(result, Err(SyncError::MalformedName(_))));
    }
    assert!(remote.file_names("/").is_empty());

    let engine = a.libs.sync();
    assert!(engine.sync_now().await.is_err());
    assert_eq!(engine.status(), SyncStatus::Fail);
}
