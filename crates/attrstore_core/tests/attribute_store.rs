use attrstore_core::{
    AttrValue, AttributeOptions, AttributeStore, Backend, CoercionPolicy, CommitOutcome,
    RecordRow, SchemaRegistry, StoreError, StoreOptions, StoreSchema,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

fn settings_schema(policy: CoercionPolicy) -> Arc<StoreSchema> {
    let mut registry = SchemaRegistry::new();
    registry
        .define(
            "Post",
            "settings",
            StoreOptions::inline().coercion(policy),
            |s| {
                s.boolean("allow_comments", AttributeOptions::new().default(true))?;
                s.integer("max_tags", AttributeOptions::new().default(5))?;
                s.string(
                    "theme",
                    AttributeOptions::new()
                        .default("light")
                        .allowed(["light", "dark"]),
                )?;
                s.string("note", AttributeOptions::new())?;
                s.string(
                    "slug",
                    AttributeOptions::new().default_with(|owner| {
                        let title = owner
                            .field("title")
                            .and_then(|value| value.as_str().map(str::to_string))
                            .unwrap_or_default();
                        json!(format!("{}-slug", title.to_lowercase()))
                    }),
                )?;
                Ok(())
            },
        )
        .unwrap()
}

fn open_store(schema: &Arc<StoreSchema>) -> AttributeStore {
    AttributeStore::new(Arc::clone(schema), Backend::for_schema(schema, None).unwrap())
}

fn new_row() -> RecordRow {
    RecordRow::new("Post", Uuid::new_v4())
}

fn persist(store: &mut AttributeStore, row: &mut RecordRow) {
    match store.commit(&*row).unwrap() {
        CommitOutcome::Staged(staged) => {
            row.stage_column(staged);
            store.confirm_staged();
            row.mark_saved();
        }
        other => panic!("expected staged inline commit, got {other:?}"),
    }
}

#[test]
fn reads_resolve_defaults_on_a_fresh_owner() {
    let schema = settings_schema(CoercionPolicy::Strict);
    let row = new_row();
    let mut store = open_store(&schema);

    assert!(!store.is_loaded());
    assert_eq!(
        store.get(&row, "allow_comments").unwrap(),
        Some(AttrValue::Boolean(true))
    );
    assert!(store.is_loaded());
    assert_eq!(store.get(&row, "max_tags").unwrap(), Some(AttrValue::Integer(5)));
    assert_eq!(store.get(&row, "note").unwrap(), None);
    assert!(store.get_flag(&row, "allow_comments").unwrap());
    assert!(!store.get_flag(&row, "note").unwrap());
}

#[test]
fn pending_write_shadows_default_until_discard() {
    let schema = settings_schema(CoercionPolicy::Strict);
    let row = new_row();
    let mut store = open_store(&schema);

    let written = store.set(&row, "max_tags", "9").unwrap();
    assert_eq!(written, Some(AttrValue::Integer(9)));
    assert_eq!(store.get(&row, "max_tags").unwrap(), Some(AttrValue::Integer(9)));
    assert!(store.is_dirty());
    assert_eq!(store.changed_attributes(), vec!["max_tags"]);

    store.discard();
    assert!(!store.is_dirty());
    assert_eq!(store.get(&row, "max_tags").unwrap(), Some(AttrValue::Integer(5)));
}

#[test]
fn explicit_null_shadows_default() {
    let schema = settings_schema(CoercionPolicy::Strict);
    let row = new_row();
    let mut store = open_store(&schema);

    store.set(&row, "allow_comments", Value::Null).unwrap();
    assert_eq!(store.get(&row, "allow_comments").unwrap(), None);
    assert!(!store.get_flag(&row, "allow_comments").unwrap());
}

#[test]
fn committed_values_are_read_back_from_the_owner_row() {
    let schema = settings_schema(CoercionPolicy::Strict);
    let mut row = new_row();
    row.set_field("title", "Hello");
    let mut store = open_store(&schema);

    store.set(&row, "theme", "dark").unwrap();
    persist(&mut store, &mut row);
    assert!(!store.is_dirty());

    let blob = String::from_utf8(row.column("settings").unwrap().to_vec()).unwrap();
    assert_eq!(
        blob,
        r#"{"allow_comments":true,"max_tags":5,"theme":"dark","slug":"hello-slug"}"#
    );

    let mut reopened = open_store(&schema);
    assert_eq!(
        reopened.get(&row, "theme").unwrap(),
        Some(AttrValue::String("dark".to_string()))
    );
    assert_eq!(
        reopened.get(&row, "allow_comments").unwrap(),
        Some(AttrValue::Boolean(true))
    );
}

#[test]
fn rejected_writes_leave_pending_untouched() {
    let schema = settings_schema(CoercionPolicy::Strict);
    let row = new_row();
    let mut store = open_store(&schema);

    let err = store.set(&row, "theme", "neon").unwrap_err();
    assert!(matches!(err, StoreError::DisallowedValue(_)));

    let err = store.set(&row, "max_tags", "many").unwrap_err();
    match err {
        StoreError::Coercion(coercion) => assert_eq!(coercion.attribute, "max_tags"),
        other => panic!("unexpected error: {other}"),
    }

    let err = store.set(&row, "missing", 1).unwrap_err();
    assert!(matches!(err, StoreError::UnknownAttribute { .. }));
    assert!(!store.is_dirty());
}

#[test]
fn fallback_policy_writes_the_default_instead_of_failing() {
    let schema = settings_schema(CoercionPolicy::FallbackToDefault);
    let row = new_row();
    let mut store = open_store(&schema);

    let written = store.set(&row, "max_tags", "many").unwrap();
    assert_eq!(written, Some(AttrValue::Integer(5)));
    assert_eq!(store.changed_attributes(), vec!["max_tags"]);

    let err = store.set(&row, "theme", "neon").unwrap_err();
    assert!(matches!(err, StoreError::DisallowedValue(_)));
}

#[test]
fn commit_without_writes_is_a_noop() {
    let schema = settings_schema(CoercionPolicy::Strict);
    let row = new_row();
    let mut store = open_store(&schema);

    store.get(&row, "theme").unwrap();
    assert_eq!(store.commit(&row).unwrap(), CommitOutcome::Unchanged);
}

#[test]
fn abandoned_stage_keeps_pending_for_retry() {
    let schema = settings_schema(CoercionPolicy::Strict);
    let row = new_row();
    let mut store = open_store(&schema);

    store.set(&row, "theme", "dark").unwrap();
    assert!(matches!(store.commit(&row).unwrap(), CommitOutcome::Staged(_)));
    store.abandon_staged();
    assert!(store.is_dirty());
    assert_eq!(
        store.get(&row, "theme").unwrap(),
        Some(AttrValue::String("dark".to_string()))
    );
}

#[test]
fn confirm_keeps_writes_made_after_staging() {
    let schema = settings_schema(CoercionPolicy::Strict);
    let row = new_row();
    let mut store = open_store(&schema);

    store.set(&row, "theme", "dark").unwrap();
    assert!(matches!(store.commit(&row).unwrap(), CommitOutcome::Staged(_)));
    store.set(&row, "max_tags", 7).unwrap();
    store.confirm_staged();

    assert_eq!(store.changed_attributes(), vec!["max_tags"]);
}

#[test]
fn computed_default_follows_the_owner() {
    let schema = settings_schema(CoercionPolicy::Strict);
    let mut row = new_row();
    row.set_field("title", "First");
    let mut store = open_store(&schema);

    assert_eq!(
        store.get(&row, "slug").unwrap(),
        Some(AttrValue::String("first-slug".to_string()))
    );
    row.set_field("title", "Second");
    assert_eq!(
        store.get(&row, "slug").unwrap(),
        Some(AttrValue::String("second-slug".to_string()))
    );
}

#[test]
fn unknown_stored_keys_survive_a_commit() {
    let schema = settings_schema(CoercionPolicy::Strict);
    let mut columns = BTreeMap::new();
    columns.insert(
        "settings".to_string(),
        br#"{"legacy":1,"max_tags":2}"#.to_vec(),
    );
    let row = RecordRow::from_storage("Post", Uuid::new_v4(), BTreeMap::new(), columns);
    let mut store = open_store(&schema);

    assert_eq!(store.get(&row, "max_tags").unwrap(), Some(AttrValue::Integer(2)));
    store.set(&row, "theme", "dark").unwrap();
    let CommitOutcome::Staged(staged) = store.commit(&row).unwrap() else {
        panic!("inline commit should stage");
    };
    assert_eq!(
        String::from_utf8(staged.bytes).unwrap(),
        r#"{"allow_comments":true,"max_tags":2,"theme":"dark","slug":"-slug","legacy":1}"#
    );
}

#[test]
fn to_map_lists_every_attribute_in_schema_order() {
    let schema = settings_schema(CoercionPolicy::Strict);
    let row = new_row();
    let mut store = open_store(&schema);
    store.set(&row, "note", "hi").unwrap();

    let names = store
        .to_map(&row)
        .unwrap()
        .into_iter()
        .map(|(name, _)| name)
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["allow_comments", "max_tags", "theme", "note", "slug"]);
}
