use std::fs;
use std::path::PathBuf;

use kvault_lib::{
    backup_paths, list_entries, restore_all, select, BackupOptions, CompressionLevel, Entry,
    LogObserver, RestoreOptions, RunReport, SetupError, Store,
};

use crate::common::{at_secs, restored_path, set_mtime, CountingObserver, Fixture};

fn sample_tree(fx: &Fixture) -> Vec<PathBuf> {
    let mut files = vec![
        fx.write("docs/readme.md", "# readme\n"),
        fx.write("docs/empty.txt", ""),
        fx.write("bin/blob.bin", (0..=255u8).cycle().take(70_000).collect::<Vec<_>>()),
        fx.write("deep/a/b/c/leaf.txt", "leaf"),
    ];
    files.sort();
    files
}

#[test]
fn test_backup_then_restore_round_trip() {
    let fx = Fixture::new();
    let files = sample_tree(&fx);
    let manifest = fx.manifest("src\n");

    let store = fx.open_store();
    let paths = select(&manifest).unwrap();
    assert_eq!(paths.iter().cloned().collect::<Vec<_>>(), files);

    let observer = CountingObserver::default();
    let report = backup_paths(&store, &paths, &BackupOptions::default(), &observer).unwrap();
    assert_eq!(report.updated, files.len());
    assert!(report.is_success());
    assert_eq!(observer.seen(), files.len());

    let out = fx.restore_dir("restored");
    let report = restore_all(&store, &out, &RestoreOptions::default(), &LogObserver).unwrap();
    assert_eq!(report.restored, files.len());

    for original in &files {
        let restored = restored_path(&out, original);
        assert_eq!(fs::read(&restored).unwrap(), fs::read(original).unwrap());
    }
}

#[test]
fn test_every_compression_level_round_trips() {
    let fx = Fixture::new();
    let file = fx.write("data.txt", "compress me ".repeat(500));
    let paths = [file.clone()].into_iter().collect();
    let store = fx.open_store();

    for level in 0..=9u32 {
        let options = BackupOptions {
            level: CompressionLevel::try_from(level).unwrap(),
            max_age: 0,
            ..BackupOptions::default()
        };
        // Force a rewrite each time.
        set_mtime(&file, at_secs(1_600_000_000 + u64::from(level) * 10, 0));
        let report = backup_paths(&store, &paths, &options, &LogObserver).unwrap();
        assert_eq!(report.updated, 1, "level {}", level);

        let stored = store.get(file.to_str().unwrap()).unwrap().unwrap();
        assert_eq!(Entry::decode_header(&stored).unwrap().level as u32, level);
        let mut body = Vec::new();
        Entry::unpack(&stored, &mut body).unwrap();
        assert_eq!(body, fs::read(&file).unwrap());
    }
}

#[test]
fn test_second_backup_writes_nothing() {
    let fx = Fixture::new();
    let files = sample_tree(&fx);
    for file in &files {
        set_mtime(file, at_secs(1_600_000_000, 0));
    }
    let paths = select(fx.manifest("src\n")).unwrap();
    let store = fx.open_store();
    let options = BackupOptions::default();

    backup_paths(&store, &paths, &options, &LogObserver).unwrap();
    let before: Vec<_> = list_entries(&store).unwrap();

    let report = backup_paths(&store, &paths, &options, &LogObserver).unwrap();
    assert_eq!(report.updated, 0);
    assert_eq!(report.up_to_date, files.len());
    assert_eq!(list_entries(&store).unwrap(), before);
}

#[test]
fn test_zero_threshold_picks_up_subsecond_edit() {
    let fx = Fixture::new();
    let file = fx.write("a.txt", "v1");
    set_mtime(&file, at_secs(1_600_000_000, 0));
    let paths = [file.clone()].into_iter().collect();
    let store = fx.open_store();
    let options = BackupOptions {
        max_age: 0,
        ..BackupOptions::default()
    };

    backup_paths(&store, &paths, &options, &LogObserver).unwrap();

    fs::write(&file, "v2").unwrap();
    set_mtime(&file, at_secs(1_600_000_000, 250_000_000));
    let report = backup_paths(&store, &paths, &options, &LogObserver).unwrap();
    assert_eq!(report.updated, 1);

    let mut body = Vec::new();
    Entry::unpack(&store.get(file.to_str().unwrap()).unwrap().unwrap(), &mut body).unwrap();
    assert_eq!(body, b"v2");
}

#[test]
fn test_large_threshold_keeps_old_snapshot() {
    let fx = Fixture::new();
    let file = fx.write("a.txt", "v1");
    set_mtime(&file, at_secs(1_600_000_000, 0));
    let paths = [file.clone()].into_iter().collect();
    let store = fx.open_store();
    let options = BackupOptions {
        max_age: 3_600,
        ..BackupOptions::default()
    };

    backup_paths(&store, &paths, &options, &LogObserver).unwrap();

    fs::write(&file, "v2").unwrap();
    set_mtime(&file, at_secs(1_600_000_060, 0));
    let report = backup_paths(&store, &paths, &options, &LogObserver).unwrap();
    assert_eq!(report.up_to_date, 1);

    let mut body = Vec::new();
    Entry::unpack(&store.get(file.to_str().unwrap()).unwrap().unwrap(), &mut body).unwrap();
    assert_eq!(body, b"v1");
}

#[test]
fn test_streaming_restore_matches_plain() {
    let fx = Fixture::new();
    let mut files = sample_tree(&fx);
    for i in 0..40 {
        files.push(fx.write(&format!("many/f{:02}.txt", i), format!("file {}", i)));
    }
    let store = fx.open_store();
    let paths = select(fx.manifest("src\n")).unwrap();
    backup_paths(&store, &paths, &BackupOptions::default(), &LogObserver).unwrap();

    let plain_out = fx.restore_dir("plain");
    let plain = restore_all(&store, &plain_out, &RestoreOptions::default(), &LogObserver).unwrap();

    let streaming_out = fx.restore_dir("streaming");
    let options = RestoreOptions {
        workers: 4,
        streaming: true,
        decoders: 2,
        queue_capacity: 3,
    };
    let streaming = restore_all(&store, &streaming_out, &options, &LogObserver).unwrap();

    assert_eq!(plain, streaming);
    assert_eq!(plain.restored, files.len());
    for original in &files {
        assert_eq!(
            fs::read(restored_path(&plain_out, original)).unwrap(),
            fs::read(restored_path(&streaming_out, original)).unwrap()
        );
    }
}

#[test]
fn test_restore_from_store_without_collection() {
    let fx = Fixture::new();
    // Create the store file without the collection.
    drop(Store::open(fx.store_path(), "files").unwrap());

    let store = Store::open_existing(fx.store_path(), "files").unwrap();
    let out = fx.restore_dir("out");
    let report = restore_all(&store, &out, &RestoreOptions::default(), &LogObserver).unwrap();

    assert_eq!(report, RunReport::default());
    assert_eq!(fs::read_dir(&out).unwrap().count(), 0);
    assert!(list_entries(&store).unwrap().is_empty());
}

#[test]
fn test_collections_are_independent() {
    let fx = Fixture::new();
    let file = fx.write("a.txt", "a");
    let paths = [file].into_iter().collect();

    {
        let store = Store::open(fx.store_path(), "laptop").unwrap();
        store.ensure_collection().unwrap();
        backup_paths(&store, &paths, &BackupOptions::default(), &LogObserver).unwrap();
    }

    // One handle per file at a time.
    {
        let other = Store::open_existing(fx.store_path(), "desktop").unwrap();
        assert!(list_entries(&other).unwrap().is_empty());
    }
    let laptop = Store::open_existing(fx.store_path(), "laptop").unwrap();
    assert_eq!(list_entries(&laptop).unwrap().len(), 1);
}

#[test]
fn test_unreadable_file_does_not_stop_run() {
    let fx = Fixture::new();
    let files = sample_tree(&fx);
    let mut paths: kvault_lib::PathSet = files.iter().cloned().collect();
    let vanished = fx.root().join("src/vanished.txt");
    paths.insert(vanished.clone());

    let store = fx.open_store();
    let options = BackupOptions {
        workers: 2,
        ..BackupOptions::default()
    };
    let report = backup_paths(&store, &paths, &options, &LogObserver).unwrap();

    assert_eq!(report.updated, files.len());
    assert_eq!(report.failed, vec![vanished]);
    assert_eq!(report.total(), files.len() + 1);
}

#[test]
fn test_restore_over_previous_restore_replaces_files() {
    let fx = Fixture::new();
    let file = fx.write("a.txt", "first");
    let paths = [file.clone()].into_iter().collect();
    let store = fx.open_store();
    let options = BackupOptions {
        max_age: 0,
        ..BackupOptions::default()
    };

    backup_paths(&store, &paths, &options, &LogObserver).unwrap();
    let out = fx.restore_dir("out");
    restore_all(&store, &out, &RestoreOptions::default(), &LogObserver).unwrap();

    fs::write(&file, "second").unwrap();
    set_mtime(&file, at_secs(2_000_000_000, 0));
    backup_paths(&store, &paths, &options, &LogObserver).unwrap();
    let streaming = RestoreOptions {
        streaming: true,
        ..RestoreOptions::default()
    };
    restore_all(&store, &out, &streaming, &LogObserver).unwrap();

    let restored = restored_path(&out, &file);
    assert_eq!(fs::read(&restored).unwrap(), b"second");
    assert_eq!(
        fs::metadata(&restored).unwrap().modified().unwrap(),
        at_secs(2_000_000_000, 0)
    );
    // Only the restored file, no temporary leftovers.
    assert_eq!(fs::read_dir(restored.parent().unwrap()).unwrap().count(), 1);
}

#[test]
fn test_open_existing_requires_file() {
    let fx = Fixture::new();
    assert!(Store::open_existing(fx.root().join("nope.redb"), "files").is_err());
}

#[test]
fn test_zero_workers_is_setup_error() {
    let fx = Fixture::new();
    let store = fx.open_store();
    let out = fx.restore_dir("out");
    let options = RestoreOptions {
        workers: 0,
        ..RestoreOptions::default()
    };
    assert!(matches!(
        restore_all(&store, &out, &options, &LogObserver),
        Err(SetupError::InvalidWorkers(0))
    ));
}
