// ABOUTME: Integration tests for the snapshot store over real tar.gz archives.
// ABOUTME: Covers byte-identical restore, retention, foreign files and the eviction properties.

mod support;

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use safeship::snapshot::tree::tree_digest;
use safeship::snapshot::{
    Snapshot, SnapshotError, SnapshotStore, TarGzArchiveStore, select_evictions,
};
use std::fs;
use support::{HostDirs, read, rev, write_tree};

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_750_000_000 + secs, 0).unwrap()
}

#[tokio::test]
async fn restore_after_create_is_byte_identical() {
    let dirs = HostDirs::new();
    write_tree(
        &dirs.app,
        &[
            ("app.py", "print('hi')"),
            ("templates/index.html", "<h1>hi</h1>"),
            ("static/img/logo.svg", "<svg/>"),
        ],
    );
    let archive = TarGzArchiveStore::new(&dirs.backups);
    let store = SnapshotStore::new(&archive, &dirs.app, 5);

    let handle = store.create(Some(&rev("v1.0.0"))).await.unwrap();
    assert_eq!(handle.digest, tree_digest(&dirs.app).unwrap());

    // Half-finished update: one file changed, one deleted, one added.
    fs::write(dirs.app.join("app.py"), "broken").unwrap();
    fs::remove_dir_all(dirs.app.join("templates")).unwrap();
    fs::write(dirs.app.join("stray.txt"), "x").unwrap();

    let restored = store.restore_latest().await.unwrap();

    assert_eq!(restored, handle.snapshot);
    assert_eq!(tree_digest(&dirs.app).unwrap(), handle.digest);
    assert_eq!(read(&dirs.app, "templates/index.html"), "<h1>hi</h1>");
    assert!(!dirs.app.join("stray.txt").exists());
}

#[tokio::test]
async fn restore_works_when_live_tree_is_gone() {
    let dirs = HostDirs::new();
    write_tree(&dirs.app, &[("app.py", "v1")]);
    let archive = TarGzArchiveStore::new(&dirs.backups);
    let store = SnapshotStore::new(&archive, &dirs.app, 5);
    store.create(None).await.unwrap();

    fs::remove_dir_all(&dirs.app).unwrap();
    store.restore_latest().await.unwrap();

    assert_eq!(read(&dirs.app, "app.py"), "v1");
}

#[tokio::test]
async fn restore_picks_newest_by_timestamp_not_name() {
    let dirs = HostDirs::new();
    let archive = TarGzArchiveStore::new(&dirs.backups);
    let store = SnapshotStore::new(&archive, &dirs.app, 5);

    // "v9.0.0" sorts after "v1.0.0" lexically but is older.
    write_tree(&dirs.app, &[("app.py", "old")]);
    store.create_at(Some(&rev("v9.0.0")), at(0)).await.unwrap();
    write_tree(&dirs.app, &[("app.py", "new")]);
    store.create_at(Some(&rev("v1.0.0")), at(60)).await.unwrap();

    let restored = store.restore_latest().await.unwrap();
    assert_eq!(restored.revision, Some(rev("v1.0.0")));
    assert_eq!(read(&dirs.app, "app.py"), "new");
}

#[tokio::test]
async fn restore_without_snapshots_fails() {
    let dirs = HostDirs::new();
    let archive = TarGzArchiveStore::new(&dirs.backups);
    let store = SnapshotStore::new(&archive, &dirs.app, 5);

    let err = store.restore_latest().await.unwrap_err();
    assert!(matches!(err, SnapshotError::NoSnapshot));
}

#[tokio::test]
async fn n_plus_one_creates_retain_n_most_recent() {
    let dirs = HostDirs::new();
    write_tree(&dirs.app, &[("app.py", "x")]);
    let archive = TarGzArchiveStore::new(&dirs.backups);
    let store = SnapshotStore::new(&archive, &dirs.app, 3);

    for i in 0..4 {
        store.create_at(None, at(i)).await.unwrap();
    }
    let evicted = store.evict_oldest().await.unwrap();

    assert_eq!(evicted.len(), 1);
    assert_eq!(evicted[0].created_at, at(0));
    let kept: Vec<_> = store
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.created_at)
        .collect();
    assert_eq!(kept, vec![at(3), at(2), at(1)]);
}

#[tokio::test]
async fn foreign_files_are_listed_nowhere_and_never_deleted() {
    let dirs = HostDirs::new();
    write_tree(&dirs.app, &[("app.py", "x")]);
    let archive = TarGzArchiveStore::new(&dirs.backups);
    let store = SnapshotStore::new(&archive, &dirs.app, 1);

    store.create_at(None, at(0)).await.unwrap();
    store.create_at(None, at(1)).await.unwrap();
    fs::write(dirs.backups.join("notes.tar.gz"), "not ours").unwrap();
    fs::write(dirs.backups.join("README"), "hello").unwrap();

    assert_eq!(store.list().await.unwrap().len(), 2);
    store.evict_oldest().await.unwrap();

    assert_eq!(store.list().await.unwrap().len(), 1);
    assert!(dirs.backups.join("notes.tar.gz").exists());
    assert!(dirs.backups.join("README").exists());
}

fn snapshot(secs: i64, label: &str) -> Snapshot {
    let revision = (label != "untracked").then(|| rev(label));
    let created_at = at(secs);
    Snapshot {
        name: Snapshot::name_for(revision.as_ref(), created_at),
        revision,
        created_at,
    }
}

fn arb_snapshots() -> impl Strategy<Value = Vec<Snapshot>> {
    prop::collection::vec(
        (0i64..50, prop::sample::select(vec!["untracked", "v1.0.0", "v1.2.0", "v2.0.0"])),
        0..20,
    )
    .prop_map(|items| {
        let mut snapshots: Vec<Snapshot> =
            items.into_iter().map(|(s, l)| snapshot(s, l)).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots.dedup_by(|a, b| a.name == b.name);
        snapshots
    })
}

proptest! {
    #[test]
    fn eviction_keeps_exactly_the_newest(snapshots in arb_snapshots(), retain in 1usize..8) {
        let total = snapshots.len();
        let evicted = select_evictions(snapshots.clone(), retain);

        prop_assert_eq!(evicted.len(), total.saturating_sub(retain));

        let kept: Vec<_> = snapshots
            .iter()
            .filter(|s| !evicted.contains(s))
            .collect();
        for k in &kept {
            for e in &evicted {
                prop_assert!((k.created_at, &k.name) > (e.created_at, &e.name));
            }
        }
    }

    #[test]
    fn newest_snapshot_is_never_evicted(snapshots in arb_snapshots(), retain in 1usize..8) {
        prop_assume!(!snapshots.is_empty());
        let newest = snapshots
            .iter()
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)))
            .cloned()
            .unwrap();

        let evicted = select_evictions(snapshots, retain);
        prop_assert!(!evicted.contains(&newest));
    }

    #[test]
    fn eviction_ignores_input_order(mut snapshots in arb_snapshots(), retain in 1usize..8) {
        let forward = select_evictions(snapshots.clone(), retain);
        snapshots.reverse();
        let backward = select_evictions(snapshots, retain);
        prop_assert_eq!(forward, backward);
    }
}
