//! Integration tests for qsticky
//!
//! SQLite tests run against a fresh database file in a temp directory.
//! PostgreSQL tests need a reachable server and only run when
//! `QSTICKY_TEST_PG_HOST` is set (`QSTICKY_TEST_PG_USER`,
//! `QSTICKY_TEST_PG_PASSWORD` and `QSTICKY_TEST_PG_DBNAME` are optional).

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use qsticky::database::SqliteStore;
use qsticky::database::schema::ensure_schema;
use qsticky::{
    ConnectionConfig, ConnectionManager, Font, Note, NoteRepository, NoteState, Notification,
    Preferences, Rgba, Session, StickyError, StoreError, SyncCoordinator, SyncSettings,
};
use tempfile::TempDir;

/// Open and migrate a SQLite store in a temp directory
fn setup_sqlite() -> (ConnectionManager, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let config = ConnectionConfig::sqlite(temp_dir.path().join("data").join("qsticky.db"));
    let mut manager = ConnectionManager::open(&config, SyncSettings::default())
        .expect("Failed to open database");
    ensure_schema(manager.connection_mut().unwrap()).expect("Failed to create schema");
    (manager, temp_dir)
}

fn sample_note() -> Note {
    Note {
        id: None,
        text: "hi".to_string(),
        x: 10,
        y: 10,
        width: 100,
        height: 100,
        color: Rgba::WHITE,
        font_color: Rgba::BLACK,
        font: Font::new("Sans", 12),
        z_order: 0,
        visible: true,
    }
}

/// PostgreSQL tests share one server database and must not interleave
static PG_LOCK: Mutex<()> = Mutex::new(());

fn pg_guard() -> MutexGuard<'static, ()> {
    PG_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn fast_settings() -> SyncSettings {
    SyncSettings {
        debounce: Duration::from_millis(50),
        ..SyncSettings::default()
    }
}

/// Run a repository test against every engine available here
fn for_each_store(test: impl Fn(&mut dyn NoteRepository)) {
    let (mut manager, _temp_dir) = setup_sqlite();
    test(&mut manager);

    let mut memory =
        ConnectionManager::open(&ConnectionConfig::Memory, SyncSettings::default()).unwrap();
    test(&mut memory);

    let _guard = pg_guard();
    if let Some(mut manager) = setup_postgres() {
        test(&mut manager);
    }
}

#[test]
fn test_insert_then_list_scenario() {
    for_each_store(|store| {
        let note = sample_note();
        let saved = store.insert(&note).unwrap();
        let id = saved.id.unwrap();
        assert!(id >= 1);

        let all = store.list_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], note.with_id(id));
    });
}

#[test]
fn test_update_overwrites_full_row() {
    for_each_store(|store| {
        let mut saved = store.insert(&sample_note()).unwrap();
        saved.text = "changed".to_string();
        saved.x = -40;
        saved.width = 300;
        saved.color = Rgba::LEMON_CHIFFON;
        saved.font_color = Rgba::rgb(0x33, 0x66, 0x99);
        saved.font = Font::new("Serif", 18);
        saved.z_order = 7;
        saved.visible = false;
        store.update(&saved).unwrap();

        let all = store.list_all().unwrap();
        assert_eq!(all, vec![saved.clone()]);

        // A row removed elsewhere reports NotFound
        let id = saved.id.unwrap();
        store.delete(id).unwrap();
        assert_eq!(store.update(&saved), Err(StoreError::NotFound(id)));
    });
}

#[test]
fn test_delete_is_idempotent() {
    for_each_store(|store| {
        let saved = store.insert(&sample_note()).unwrap();
        let id = saved.id.unwrap();

        store.delete(id).unwrap();
        store.delete(id).unwrap();
        store.delete(id + 1000).unwrap();

        assert!(store.list_all().unwrap().iter().all(|n| n.id != Some(id)));
    });
}

#[test]
fn test_list_all_sorted_by_z_order() {
    for_each_store(|store| {
        for z in [2, 3, 1] {
            let note = Note {
                z_order: z,
                text: format!("z{}", z),
                ..sample_note()
            };
            store.insert(&note).unwrap();
        }

        let texts: Vec<String> = store.list_all().unwrap().into_iter().map(|n| n.text).collect();
        assert_eq!(texts, vec!["z1", "z2", "z3"]);
    });
}

#[test]
fn test_preferences_defaults_and_round_trip() {
    for_each_store(|store| {
        assert_eq!(store.get_preferences().unwrap(), Preferences::default());

        let prefs = Preferences {
            color: Rgba::rgb(0xaa, 0xbb, 0xcc),
            font_color: Rgba::WHITE,
            font: Font::new("Mono", 9),
            apply_globally: true,
        };
        store.save_preferences(&prefs).unwrap();
        assert_eq!(store.get_preferences().unwrap(), prefs);

        // Upsert keeps a single row
        let second = Preferences {
            apply_globally: false,
            ..prefs
        };
        store.save_preferences(&second).unwrap();
        assert_eq!(store.get_preferences().unwrap(), second);
    });
}

#[test]
fn test_invalid_note_rejected_as_constraint_violation() {
    for_each_store(|store| {
        let note = Note {
            width: 0,
            ..sample_note()
        };
        assert!(matches!(
            store.insert(&note),
            Err(StoreError::ConstraintViolation(_))
        ));
    });
}

#[test]
fn test_schema_is_idempotent_across_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let config = ConnectionConfig::sqlite(temp_dir.path().join("qsticky.db"));

    let id = {
        let mut manager = ConnectionManager::open(&config, SyncSettings::default()).unwrap();
        ensure_schema(manager.connection_mut().unwrap()).unwrap();
        manager.insert(&sample_note()).unwrap().id.unwrap()
    };

    let mut manager = ConnectionManager::open(&config, SyncSettings::default()).unwrap();
    ensure_schema(manager.connection_mut().unwrap()).unwrap();
    ensure_schema(manager.connection_mut().unwrap()).unwrap();

    let all = manager.list_all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, Some(id));
}

#[test]
fn test_coordinator_end_to_end_sqlite() {
    let temp_dir = TempDir::new().unwrap();
    let config = ConnectionConfig::sqlite(temp_dir.path().join("qsticky.db"));

    let t0 = Instant::now();
    let first_id = {
        let mut sync = SyncCoordinator::connect(&config, fast_settings()).unwrap();
        let loaded = sync.load().unwrap();
        assert_eq!(loaded.len(), 1, "First run should create one note");
        let (key, note) = &loaded[0];
        assert_eq!(note.width, qsticky::DEFAULT_NOTE_WIDTH);

        sync.set_text(*key, "shopping", t0);
        for step in 0..10 {
            sync.move_note(*key, 100 + step, 200, t0 + Duration::from_millis(step as u64));
        }
        sync.tick(t0 + Duration::from_secs(1));
        assert_eq!(sync.state(*key), Some(NoteState::Persisted));

        let other = sync.create_note();
        sync.delete_note(other).unwrap();

        let id = note.id.unwrap();
        assert!(sync.drain_notifications().contains(&Notification::NotePersisted {
            key: *key,
            id
        }));
        assert_eq!(sync.shutdown(), 0);
        id
    };

    let mut sync = SyncCoordinator::connect(&config, fast_settings()).unwrap();
    let loaded = sync.load().unwrap();
    assert_eq!(loaded.len(), 1);
    let (_, note) = &loaded[0];
    assert_eq!(note.id, Some(first_id));
    assert_eq!(note.text, "shopping");
    assert_eq!((note.x, note.y), (109, 200));
}

#[test]
fn test_coordinator_show_all_sees_other_instance() {
    let temp_dir = TempDir::new().unwrap();
    let config = ConnectionConfig::sqlite(temp_dir.path().join("qsticky.db"));

    let mut first = SyncCoordinator::connect(&config, fast_settings()).unwrap();
    let mine = first.load().unwrap()[0].0;
    let mine_id = first.note(mine).unwrap().id.unwrap();

    let mut second = SyncCoordinator::connect(&config, fast_settings()).unwrap();
    second.load().unwrap();
    let theirs = second.create_note();
    second.set_text(theirs, "from the other window", Instant::now());
    second.flush_all();
    let shared = second.key_for_id(mine_id).unwrap();
    second.delete_note(shared).unwrap();

    first.request_show_all();
    first.tick(Instant::now());

    let notifications = first.drain_notifications();
    assert!(notifications.contains(&Notification::NoteExternallyRemoved {
        key: mine,
        id: mine_id
    }));
    assert!(notifications.iter().any(|n| matches!(
        n,
        Notification::NoteLoaded { note, .. } if note.text == "from the other window"
    )));
    assert_eq!(first.state(mine), Some(NoteState::Deleted));
}

/// Coordinator on `path` whose writes give up on a busy file after `busy`
fn busy_sensitive_coordinator(path: &std::path::Path, busy: Duration) -> SyncCoordinator {
    let settings = SyncSettings {
        debounce: Duration::from_millis(10),
        query_timeout: busy,
        ..SyncSettings::default()
    };
    let mut sync = SyncCoordinator::connect(&ConnectionConfig::sqlite(path), settings).unwrap();
    sync.load().unwrap();
    sync.drain_notifications();
    sync
}

fn lock_file(path: &std::path::Path) -> SqliteStore {
    let locker = SqliteStore::open(path, Duration::from_secs(5)).unwrap();
    locker.connection().execute_batch("BEGIN IMMEDIATE").unwrap();
    locker
}

#[test]
fn test_busy_file_twice_keeps_note_dirty() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("qsticky.db");
    let mut sync = busy_sensitive_coordinator(&db_path, Duration::from_millis(50));
    let key = sync.notes()[0].0;

    let locker = lock_file(&db_path);
    let t0 = Instant::now();
    sync.set_text(key, "written while locked", t0);
    sync.tick(t0 + Duration::from_secs(1));

    assert_eq!(sync.state(key), Some(NoteState::Dirty));
    assert!(
        sync.drain_notifications()
            .iter()
            .any(|n| matches!(n, Notification::StoreUnavailable(_)))
    );

    locker.connection().execute_batch("ROLLBACK").unwrap();
    assert_eq!(sync.flush_all(), 0);
    assert_eq!(sync.state(key), Some(NoteState::Persisted));

    let mut reader = SqliteStore::open(&db_path, Duration::from_secs(1)).unwrap();
    assert_eq!(reader.list_all().unwrap()[0].text, "written while locked");
}

#[test]
fn test_busy_file_released_before_retry_persists() {
    let busy = Duration::from_millis(400);
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("qsticky.db");
    let mut sync = busy_sensitive_coordinator(&db_path, busy);
    let key = sync.notes()[0].0;

    // Released after the first attempt gives up, before the retry does
    let locker = lock_file(&db_path);
    let release = std::thread::spawn(move || {
        std::thread::sleep(busy + Duration::from_millis(200));
        locker.connection().execute_batch("COMMIT").unwrap();
    });

    let t0 = Instant::now();
    sync.set_text(key, "retried", t0);
    sync.tick(t0 + Duration::from_secs(1));
    let elapsed = t0.elapsed();
    release.join().unwrap();

    assert!(elapsed >= busy, "first attempt should have waited on the lock");
    assert_eq!(sync.state(key), Some(NoteState::Persisted));
    assert!(
        !sync.drain_notifications()
            .iter()
            .any(|n| matches!(n, Notification::StoreUnavailable(_)))
    );

    let mut reader = SqliteStore::open(&db_path, Duration::from_secs(1)).unwrap();
    assert_eq!(reader.list_all().unwrap()[0].text, "retried");
}

#[test]
fn test_coordinator_memory_engine() {
    let mut sync =
        SyncCoordinator::connect(&ConnectionConfig::Memory, SyncSettings::default()).unwrap();
    let loaded = sync.load().unwrap();
    assert_eq!(loaded.len(), 1);

    let key = loaded[0].0;
    sync.hide_note(key);
    assert!(sync.all_hidden());
    assert!(sync.session_mut().ping());
}

#[test]
fn test_connect_rejects_invalid_path() {
    let temp_dir = TempDir::new().unwrap();
    let blocker = temp_dir.path().join("not-a-dir");
    std::fs::write(&blocker, "x").unwrap();

    let config = ConnectionConfig::sqlite(blocker.join("qsticky.db"));
    let result = SyncCoordinator::connect(&config, SyncSettings::default());
    match result {
        Err(err @ StickyError::Connection(_)) => assert!(err.is_fatal()),
        Err(other) => panic!("Expected connection error, got {}", other),
        Ok(_) => panic!("Expected connection error"),
    }
}

#[test]
fn test_config_file_drives_connect() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("notes.db");
    let config_path = temp_dir.path().join("qsticky.toml");
    std::fs::write(
        &config_path,
        format!(
            "engine = \"sqlite\"\npath = {:?}\n\n[sync]\ndebounce = 250\n",
            db_path.display().to_string()
        ),
    )
    .unwrap();

    let (config, settings) = ConnectionConfig::load_from_file(&config_path).unwrap();
    assert_eq!(settings.debounce, Duration::from_millis(250));
    assert_eq!(settings.query_timeout, SyncSettings::default().query_timeout);

    let mut sync = SyncCoordinator::connect(&config, settings).unwrap();
    sync.load().unwrap();
    sync.shutdown();
    assert!(db_path.exists());
}

fn setup_postgres() -> Option<ConnectionManager> {
    let host = std::env::var("QSTICKY_TEST_PG_HOST").ok()?;
    let user = std::env::var("QSTICKY_TEST_PG_USER").ok();
    let password = std::env::var("QSTICKY_TEST_PG_PASSWORD").ok();
    let dbname = std::env::var("QSTICKY_TEST_PG_DBNAME").ok();

    let config = ConnectionConfig::from_parts(
        "postgres",
        None,
        Some(&host),
        None,
        dbname.as_deref(),
        user.as_deref(),
        password.as_deref(),
    )
    .expect("Invalid test server config");
    let mut manager = ConnectionManager::open(&config, SyncSettings::default())
        .expect("Failed to connect to test server");
    let conn = manager.connection_mut().unwrap();
    ensure_schema(conn).expect("Failed to create schema");

    if let qsticky::Connection::Postgres(store) = conn {
        store
            .client_mut()
            .batch_execute("TRUNCATE notes RESTART IDENTITY; DELETE FROM preferences;")
            .expect("Failed to reset test database");
    }
    Some(manager)
}

#[test]
fn test_postgres_reconnect() {
    let _guard = pg_guard();
    let Some(mut manager) = setup_postgres() else {
        return;
    };
    manager.insert(&sample_note()).unwrap();
    assert!(manager.ping());

    Session::close(&mut manager);
    assert!(!manager.ping());
    manager.reconnect().unwrap();
    assert_eq!(manager.list_all().unwrap().len(), 1);
}
