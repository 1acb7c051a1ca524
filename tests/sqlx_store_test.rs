use serde_json::{json, Map, Value};
use silica::config::ArraySettings;
use silica::domain::{FieldDefinition, FieldKind, FormDefinition, NewRecord, Record};
use silica::forms::{FormError, PostedData, SilicaForm};
use silica::persistence::{
    LockPolicy, PersistenceConfig, RecordFilter, RecordStore, SqlxRecordStore, StoreTransaction,
};
use tempfile::TempDir;

async fn connect(dir: &TempDir) -> SqlxRecordStore {
    let config = PersistenceConfig {
        url: format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("silica.db").display()
        ),
        max_connections: 1,
        ..Default::default()
    };
    SqlxRecordStore::connect(&config).await.unwrap()
}

async fn seed(store: &SqlxRecordStore, names: &[&str]) -> Vec<Record> {
    let records = names
        .iter()
        .map(|name| {
            let mut values = Map::new();
            values.insert("name".into(), json!(name));
            NewRecord::new(values)
        })
        .collect();
    let mut tx = store.begin().await.unwrap();
    let created = tx.bulk_create("members", records, 2).await.unwrap();
    tx.commit().await.unwrap();
    created
}

async fn names(store: &SqlxRecordStore) -> Vec<Value> {
    store
        .query(&RecordFilter::new("members"))
        .await
        .unwrap()
        .into_iter()
        .map(|record| record.values["name"].clone())
        .collect()
}

fn organization() -> FormDefinition {
    let member = FormDefinition::new("member")
        .with_model("members")
        .with_field(FieldDefinition::text("name"));
    FormDefinition::new("organization")
        .with_field(FieldDefinition::text("title"))
        .with_field(FieldDefinition::new("members", FieldKind::array(member)))
}

#[tokio::test]
async fn test_bulk_create_keeps_order() {
    let dir = TempDir::new().unwrap();
    let store = connect(&dir).await;

    let created = seed(&store, &["A", "B", "C", "D", "E"]).await;
    assert_eq!(created.len(), 5);
    assert_eq!(
        names(&store).await,
        vec![json!("A"), json!("B"), json!("C"), json!("D"), json!("E")]
    );
}

#[tokio::test]
async fn test_batch_size_above_bind_limit_is_split() {
    let dir = TempDir::new().unwrap();
    let store = connect(&dir).await;

    let records: Vec<NewRecord> = (0..7_000)
        .map(|i| {
            let mut values = Map::new();
            values.insert("name".into(), json!(format!("member {}", i)));
            NewRecord::new(values)
        })
        .collect();
    let mut tx = store.begin().await.unwrap();
    let created = tx.bulk_create("members", records, 10_000).await.unwrap();
    let updated = tx
        .bulk_update("members", created.clone(), &["name".to_string()], 10_000)
        .await
        .unwrap();
    assert_eq!(updated, 7_000);
    tx.commit().await.unwrap();

    assert_eq!(created.len(), 7_000);
    let stored = names(&store).await;
    assert_eq!(stored.len(), 7_000);
    assert_eq!(stored[6_999], json!("member 6999"));
}

#[tokio::test]
async fn test_transaction_rollback_discards_writes() {
    let dir = TempDir::new().unwrap();
    let store = connect(&dir).await;
    let created = seed(&store, &["A", "B"]).await;

    let mut tx = store.begin().await.unwrap();
    let current = tx
        .query(&RecordFilter::new("members"), LockPolicy::ForUpdate)
        .await
        .unwrap();
    assert_eq!(current.len(), 2);
    assert_eq!(tx.delete("members", &[created[0].id.clone()]).await.unwrap(), 1);
    tx.rollback().await.unwrap();

    assert_eq!(names(&store).await, vec![json!("A"), json!("B")]);
}

#[tokio::test]
async fn test_form_submission_reconciles_against_sqlite() {
    let dir = TempDir::new().unwrap();
    let store = connect(&dir).await;
    let created = seed(&store, &["A", "B"]).await;

    let mut form = SilicaForm::new(organization(), &ArraySettings::default()).unwrap();
    let posted = PostedData::from_json(&json!({
        "title": "Acme",
        "members": [
            {"pk": created[0].id.as_str(), "name": "A2"},
            {"name": "C"}
        ]
    }))
    .unwrap();

    let submission = form.submit(&store, posted).await.unwrap();
    let members = &submission.arrays["members"];
    assert!(members.committed);
    assert_eq!(members.deleted, vec![created[1].id.clone()]);
    assert_eq!(names(&store).await, vec![json!("A2"), json!("C")]);

    let current = store.query(&RecordFilter::new("members")).await.unwrap();
    assert_eq!(current[0].id, created[0].id);
}

#[tokio::test]
async fn test_invalid_submission_rolls_back_when_configured() {
    let dir = TempDir::new().unwrap();
    let store = connect(&dir).await;
    seed(&store, &["A", "B"]).await;

    let settings = ArraySettings {
        rollback_on_error: true,
        ..Default::default()
    };
    let mut form = SilicaForm::new(organization(), &settings).unwrap();
    let posted = PostedData::from_json(&json!({
        "title": "Acme",
        "members": [{"pk": "missing", "name": "X"}]
    }))
    .unwrap();

    let err = form.submit(&store, posted).await.unwrap_err();
    assert!(matches!(err, FormError::Invalid { .. }));
    assert_eq!(names(&store).await, vec![json!("A"), json!("B")]);
}

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = connect(&dir).await;

    let result = store.migrate().await.unwrap();
    assert_eq!(result.applied, 0);
    assert_eq!(result.skipped, 1);

    let status = store.migration_status().await.unwrap();
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].name, "001_records");
    assert!(status[0].applied);
    store.close().await;
}

#[tokio::test]
async fn test_connect_fails_for_unreachable_database() {
    let dir = TempDir::new().unwrap();
    let config = PersistenceConfig {
        url: format!(
            "sqlite://{}",
            dir.path().join("missing").join("silica.db").display()
        ),
        max_connections: 1,
        connect_timeout_secs: 1,
        ..Default::default()
    };
    assert!(SqlxRecordStore::connect(&config).await.is_err());
}
