use attrstore_core::db::{open_shared, open_shared_in_memory};
use attrstore_core::{
    AttrValue, AttributeOptions, BlobStore, MemoryBlobStore, RecordId, RecordRepository,
    RecordRow, RecordService, RepoError, RepoResult, SaveError, SchemaRegistry, SqliteBlobStore,
    SqliteRecordRepository, StoreOptions,
};
use rusqlite::Connection;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn registry() -> Arc<SchemaRegistry> {
    let mut registry = SchemaRegistry::new();
    registry
        .define("Post", "settings", StoreOptions::inline(), |s| {
            s.boolean("allow_comments", AttributeOptions::new().default(true))?;
            s.string(
                "theme",
                AttributeOptions::new()
                    .default("light")
                    .allowed(["light", "dark"]),
            )
        })
        .unwrap();
    registry
        .define("Post", "meta", StoreOptions::table("post_meta"), |s| {
            s.integer("views", AttributeOptions::new().default(0))?;
            s.datetime("reviewed_at", AttributeOptions::new())
        })
        .unwrap();
    Arc::new(registry)
}

fn sqlite_service(conn: &Arc<Mutex<Connection>>) -> RecordService<SqliteRecordRepository> {
    let registry = registry();
    let blob_store = SqliteBlobStore::new(Arc::clone(conn));
    blob_store.prepare_tables(&registry).unwrap();
    let blob_store: Arc<dyn BlobStore> = Arc::new(blob_store);
    RecordService::new(
        SqliteRecordRepository::new(Arc::clone(conn)),
        registry,
        Some(blob_store),
    )
}

fn memory_service(memory: &Arc<MemoryBlobStore>) -> RecordService<SqliteRecordRepository> {
    let blob_store: Arc<dyn BlobStore> = memory.clone();
    RecordService::new(
        SqliteRecordRepository::new(open_shared_in_memory().unwrap()),
        registry(),
        Some(blob_store),
    )
}

fn count_rows(conn: &Arc<Mutex<Connection>>, sql: &str) -> i64 {
    conn.lock()
        .unwrap()
        .query_row(sql, [], |row| row.get(0))
        .unwrap()
}

/// Repository whose row writes always fail.
struct ReadOnlyRepository;

impl RecordRepository for ReadOnlyRepository {
    fn save_row(&self, _row: &RecordRow) -> RepoResult<()> {
        Err(RepoError::Unavailable("disk full".to_string()))
    }

    fn load_row(&self, _owner_type: &str, _id: RecordId) -> RepoResult<Option<RecordRow>> {
        Ok(None)
    }

    fn delete_row(&self, _owner_type: &str, _id: RecordId) -> RepoResult<bool> {
        Ok(false)
    }

    fn list_ids(&self, _owner_type: &str) -> RepoResult<Vec<RecordId>> {
        Ok(Vec::new())
    }
}

#[test]
fn saved_stores_are_read_back_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("attrstore.db");

    let id = {
        let conn = open_shared(&path).unwrap();
        let service = sqlite_service(&conn);
        let mut record = service.new_record("Post");
        record.set_field("title", "Hello");
        record.set("settings", "theme", "dark").unwrap();
        record.set("meta", "views", "12").unwrap();
        record
            .set("meta", "reviewed_at", "2024-05-01 09:30:00")
            .unwrap();
        service.save(&mut record).unwrap();
        assert!(!record.stores().is_dirty());
        record.id()
    };

    let conn = open_shared(&path).unwrap();
    let service = sqlite_service(&conn);
    let mut found = service.find("Post", id).unwrap().unwrap();
    assert_eq!(found.field("title"), Some(&json!("Hello")));
    assert_eq!(
        found.get("settings", "theme").unwrap(),
        Some(AttrValue::String("dark".to_string()))
    );
    assert!(found.get_flag("settings", "allow_comments").unwrap());
    assert_eq!(found.get("meta", "views").unwrap(), Some(AttrValue::Integer(12)));
    let reviewed_at = found.get("meta", "reviewed_at").unwrap().unwrap();
    assert_eq!(reviewed_at.to_json(), json!("2024-05-01T09:30:00Z"));
}

#[test]
fn inline_store_is_written_with_the_owner_row_only() {
    let conn = open_shared_in_memory().unwrap();
    let service = sqlite_service(&conn);
    let mut record = service.new_record("Post");

    record.set("settings", "allow_comments", false).unwrap();
    service.save(&mut record).unwrap();

    assert_eq!(
        count_rows(
            &conn,
            "SELECT COUNT(*) FROM record_columns WHERE column_name = 'settings';"
        ),
        1
    );
    assert_eq!(count_rows(&conn, "SELECT COUNT(*) FROM post_meta;"), 0);
    assert!(record.row().dirty_columns().next().is_none());
}

#[test]
fn reload_discards_unsaved_writes() {
    let conn = open_shared_in_memory().unwrap();
    let service = sqlite_service(&conn);
    let mut record = service.new_record("Post");
    record.set("meta", "views", 3).unwrap();
    service.save(&mut record).unwrap();

    record.set("meta", "views", 99).unwrap();
    record.set("settings", "theme", "dark").unwrap();
    service.reload(&mut record).unwrap();

    assert!(!record.stores().is_dirty());
    assert_eq!(record.get("meta", "views").unwrap(), Some(AttrValue::Integer(3)));
    assert_eq!(
        record.get("settings", "theme").unwrap(),
        Some(AttrValue::String("light".to_string()))
    );
}

#[test]
fn delete_cascades_to_store_rows() {
    let conn = open_shared_in_memory().unwrap();
    let service = sqlite_service(&conn);
    let mut record = service.new_record("Post");
    record.set("settings", "theme", "dark").unwrap();
    record.set("meta", "views", 1).unwrap();
    service.save(&mut record).unwrap();
    assert_eq!(count_rows(&conn, "SELECT COUNT(*) FROM post_meta;"), 1);

    let found = service.find("Post", record.id()).unwrap().unwrap();
    assert!(service.delete(found).unwrap());

    assert_eq!(count_rows(&conn, "SELECT COUNT(*) FROM post_meta;"), 0);
    assert_eq!(count_rows(&conn, "SELECT COUNT(*) FROM record_columns;"), 0);
    assert!(service.find("Post", record.id()).unwrap().is_none());

    let err = service.reload(&mut record).unwrap_err();
    assert!(matches!(err, SaveError::Repo(RepoError::NotFound { .. })));
}

#[test]
fn list_ids_returns_saved_records() {
    let conn = open_shared_in_memory().unwrap();
    let service = sqlite_service(&conn);
    let mut first = service.new_record("Post");
    let mut second = service.new_record("Post");
    service.save(&mut first).unwrap();
    service.save(&mut second).unwrap();

    let mut ids = service.list_ids("Post").unwrap();
    ids.sort();
    let mut expected = vec![first.id(), second.id()];
    expected.sort();
    assert_eq!(ids, expected);
    assert!(service.list_ids("Author").unwrap().is_empty());
}

#[test]
fn save_without_store_writes_touches_no_blob() {
    let memory = Arc::new(MemoryBlobStore::new());
    let service = memory_service(&memory);
    let mut record = service.new_record("Post");
    record.get("meta", "views").unwrap();
    record.set_field("title", "only the row");

    service.save(&mut record).unwrap();
    assert_eq!(memory.put_calls(), 0);
}

#[test]
fn prefetch_loads_many_records_with_one_read() {
    let memory = Arc::new(MemoryBlobStore::new());
    let service = memory_service(&memory);

    let mut ids = Vec::new();
    for views in [5_i64, 7, 0] {
        let mut record = service.new_record("Post");
        if views > 0 {
            record.set("meta", "views", views).unwrap();
        }
        service.save(&mut record).unwrap();
        ids.push((record.id(), views));
    }

    let mut records = ids
        .iter()
        .map(|(id, _)| service.find("Post", *id).unwrap().unwrap())
        .collect::<Vec<_>>();
    let reads_before = memory.fetch_calls();

    assert_eq!(service.prefetch(&mut records, "meta").unwrap(), 3);
    assert_eq!(service.prefetch(&mut records, "settings").unwrap(), 0);
    for (record, (_, views)) in records.iter_mut().zip(&ids) {
        assert_eq!(
            record.get("meta", "views").unwrap(),
            Some(AttrValue::Integer(*views))
        );
    }
    assert_eq!(memory.fetch_calls(), reads_before + 1);
}

#[test]
fn row_failure_after_associated_write_is_partial() {
    let memory = Arc::new(MemoryBlobStore::new());
    let blob_store: Arc<dyn BlobStore> = memory.clone();
    let service = RecordService::new(ReadOnlyRepository, registry(), Some(blob_store));

    let mut record = service.new_record("Post");
    record.set("meta", "views", 1).unwrap();
    record.set("settings", "theme", "dark").unwrap();

    match service.save(&mut record).unwrap_err() {
        SaveError::PartialCommit(partial) => {
            assert_eq!(partial.committed_stores, vec!["meta".to_string()]);
            assert_eq!(partial.failed, "owner row");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(memory.put_calls(), 1);
    assert!(record.stores().store("settings").unwrap().is_dirty());
    assert!(!record.stores().store("meta").unwrap().is_dirty());

    let mut inline_only = service.new_record("Post");
    inline_only.set("settings", "theme", "dark").unwrap();
    let err = service.save(&mut inline_only).unwrap_err();
    assert!(matches!(err, SaveError::Repo(RepoError::Unavailable(_))));
    assert!(inline_only.stores().is_dirty());
}

#[test]
fn custom_hooks_run_after_store_hooks() {
    let conn = open_shared_in_memory().unwrap();
    let mut service = sqlite_service(&conn);
    let saves = Arc::new(AtomicUsize::new(0));
    let reloads = Arc::new(AtomicUsize::new(0));
    {
        let saves = Arc::clone(&saves);
        service.hooks_mut().on_after_save(move |record| {
            assert!(!record.stores().is_dirty());
            saves.fetch_add(1, Ordering::SeqCst);
        });
        let reloads = Arc::clone(&reloads);
        service.hooks_mut().on_after_reload(move |_| {
            reloads.fetch_add(1, Ordering::SeqCst);
        });
    }

    let mut record = service.new_record("Post");
    record.set("settings", "theme", "dark").unwrap();
    service.save(&mut record).unwrap();
    service.reload(&mut record).unwrap();

    assert_eq!(saves.load(Ordering::SeqCst), 1);
    assert_eq!(reloads.load(Ordering::SeqCst), 1);
}

#[test]
fn prefetch_reads_each_owner_type_from_its_own_table() {
    let mut registry = SchemaRegistry::new();
    registry
        .define("Post", "meta", StoreOptions::table("post_meta"), |s| {
            s.integer("views", AttributeOptions::new().default(0))
        })
        .unwrap();
    registry
        .define("Author", "meta", StoreOptions::table("author_meta"), |s| {
            s.integer("views", AttributeOptions::new().default(0))
        })
        .unwrap();
    registry
        .define("Tag", "settings", StoreOptions::inline(), |s| {
            s.boolean("pinned", AttributeOptions::new())
        })
        .unwrap();
    let memory = Arc::new(MemoryBlobStore::new());
    let blob_store: Arc<dyn BlobStore> = memory.clone();
    let service = RecordService::new(
        SqliteRecordRepository::new(open_shared_in_memory().unwrap()),
        Arc::new(registry),
        Some(blob_store),
    );

    let mut post = service.new_record("Post");
    post.set("meta", "views", 4).unwrap();
    service.save(&mut post).unwrap();
    let mut author = service.new_record("Author");
    author.set("meta", "views", 9).unwrap();
    service.save(&mut author).unwrap();

    let mut records = vec![
        service.find("Post", post.id()).unwrap().unwrap(),
        service.find("Author", author.id()).unwrap().unwrap(),
    ];
    let reads_before = memory.fetch_calls();
    assert_eq!(service.prefetch(&mut records, "meta").unwrap(), 2);
    assert_eq!(memory.fetch_calls(), reads_before + 2);
    assert_eq!(records[0].get("meta", "views").unwrap(), Some(AttrValue::Integer(4)));
    assert_eq!(records[1].get("meta", "views").unwrap(), Some(AttrValue::Integer(9)));
    assert_eq!(memory.fetch_calls(), reads_before + 2);

    let tag = service.new_record("Tag");
    let mut mixed = vec![service.find("Post", post.id()).unwrap().unwrap(), tag];
    let err = service.prefetch(&mut mixed, "meta").unwrap_err();
    assert!(matches!(err, SaveError::Store(_)));
    assert_eq!(memory.fetch_calls(), reads_before + 2);
    assert!(mixed[0].stores().prime_associated("meta", None).unwrap());
}
