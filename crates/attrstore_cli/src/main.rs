//! CLI smoke entry point.
//!
//! Declares a small schema, runs a set → save → reload round trip against an
//! in-memory database and prints the resolved attributes.
//!
//! Set `ATTRSTORE_LOG_DIR` to an absolute path to enable file logging.

use attrstore_core::{
    core_version, db, default_log_level, init_logging, AttributeOptions, BlobStore, Record,
    RecordService, SchemaRegistry, SqliteBlobStore, SqliteRecordRepository, StoreOptions,
};
use log::info;
use serde_json::json;
use std::error::Error;
use std::sync::Arc;

const OWNER_TYPE: &str = "article";

fn main() -> Result<(), Box<dyn Error>> {
    if let Ok(log_dir) = std::env::var("ATTRSTORE_LOG_DIR") {
        init_logging(default_log_level(), &log_dir)?;
    }
    println!("attrstore_core version={}", core_version());

    let registry = Arc::new(demo_registry()?);
    let conn = db::open_shared_in_memory()?;
    let blob_store = SqliteBlobStore::new(Arc::clone(&conn));
    blob_store.prepare_tables(&registry)?;
    let blob_store: Arc<dyn BlobStore> = Arc::new(blob_store);
    let service = RecordService::new(
        SqliteRecordRepository::new(conn),
        Arc::clone(&registry),
        Some(blob_store),
    );

    let mut article = service.new_record(OWNER_TYPE);
    article.set_field("title", "Hello attribute stores");
    print_stores("defaults", &mut article)?;

    article.set("settings", "allow_comments", false)?;
    article.set("settings", "max_tags", "7")?;
    article.set("meta", "reviewed_at", "2024-05-01T09:30:00Z")?;
    service.save(&mut article)?;

    let mut reloaded = service
        .find(OWNER_TYPE, article.id())?
        .ok_or("saved article not found")?;
    print_stores("reloaded", &mut reloaded)?;

    reloaded.set("settings", "theme", "dark")?;
    service.reload(&mut reloaded)?;
    print_stores("after discard", &mut reloaded)?;

    info!(
        "event=cli_smoke module=cli status=ok owner={}",
        reloaded.owner_key()
    );
    Ok(())
}

fn demo_registry() -> Result<SchemaRegistry, Box<dyn Error>> {
    let mut registry = SchemaRegistry::new();
    registry.define(OWNER_TYPE, "settings", StoreOptions::inline(), |store| {
        store.boolean("allow_comments", AttributeOptions::new().default(true))?;
        store.integer("max_tags", AttributeOptions::new().default(5))?;
        store.string(
            "theme",
            AttributeOptions::new()
                .default("light")
                .allowed(["light", "dark"]),
        )
    })?;
    registry.define(
        OWNER_TYPE,
        "meta",
        StoreOptions::table("article_meta"),
        |store| {
            store.datetime("reviewed_at", AttributeOptions::new())?;
            store.string(
                "slug",
                AttributeOptions::new().default_with(|owner| {
                    let title = owner
                        .field("title")
                        .and_then(|value| value.as_str().map(str::to_string))
                        .unwrap_or_default();
                    json!(title.to_lowercase().replace(' ', "-"))
                }),
            )
        },
    )?;
    Ok(registry)
}

fn print_stores(label: &str, record: &mut Record) -> Result<(), Box<dyn Error>> {
    println!("[{label}] {}", record.owner_key());
    for store in ["settings", "meta"] {
        let values = {
            let (owner, stores) = attrstore_core::StoreHost::owner_and_stores(record);
            stores.store(store)?.to_map(owner)?
        };
        for (name, slot) in values {
            let shown = slot.map_or_else(|| "null".to_string(), |value| value.to_string());
            println!("  {store}.{name} = {shown}");
        }
    }
    Ok(())
}
