//! Store-level scenarios: build, serve, write and concurrent updates
//!
//! These run the library directly against temp directories, covering the
//! read states and the consistency of derived files after writes.

use std::fs;
use std::sync::Arc;

use cardstore::domain::{content_hash, Dataset, Resource, SheetModel};
use cardstore::storage::{
    ProjectConfig, ReadState, ResourceStore, StoreConfig, StoreError,
};
use tempfile::TempDir;

fn store(dir: &TempDir) -> ResourceStore {
    ResourceStore::new(StoreConfig::resolve(dir.path(), &ProjectConfig::default()).unwrap())
}

fn sheet(name: &str, rows: &[&[&str]]) -> SheetModel {
    SheetModel::new(
        name,
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect(),
    )
}

fn manifest_on_disk(dir: &TempDir) -> serde_json::Map<String, serde_json::Value> {
    let text = fs::read_to_string(dir.path().join("json/cache.json")).unwrap();
    serde_json::from_str(&text).unwrap()
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn vocabulary_source_builds_single_entry_projection() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("csv")).unwrap();
    fs::write(
        dir.path().join("csv/Vocabulary.csv"),
        "japanese,english,romaji,grp,subGrp\n人間,human,ningen,Noun,People\n",
    )
    .unwrap();
    let store = store(&dir);

    let outcome = store.read_dataset(Dataset::Vocabulary).await.unwrap();
    assert_eq!(outcome.state, ReadState::Build(Dataset::Vocabulary));
    let bytes = outcome.body.into_bytes().await.unwrap();

    let doc: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(doc.len(), 1);
    let (key, row) = doc.iter().next().unwrap();
    assert_eq!(key.len(), 32);
    assert_eq!(
        row,
        &serde_json::json!({
            "japanese": "人間",
            "english": "human",
            "romaji": "ningen",
            "grp": "Noun",
            "subGrp": "People",
        })
    );

    let manifest = manifest_on_disk(&dir);
    assert_eq!(manifest.len(), 1);
    assert_eq!(manifest["vocabulary"], content_hash(&bytes));
}

#[tokio::test]
async fn aggregate_with_nothing_present_creates_nothing() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    let err = store.read_aggregate().await.unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains("No datasets"));

    assert!(!dir.path().join("json").exists());
    assert!(!dir.path().join("csv").exists());
}

#[tokio::test]
async fn write_then_read_serves_stored_projection() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    let receipt = store
        .write(&sheet(
            "Phrases",
            &[&["english", "japanese"], &["hello", "こんにちは"], &["thanks", "ありがとう"]],
        ))
        .await
        .unwrap();

    assert!(dir.path().join("csv/Phrases.csv").is_file());
    assert!(receipt.backup_path.as_ref().unwrap().is_file());
    assert!(dir.path().join("json/phrases.json").is_file());
    assert_eq!(manifest_on_disk(&dir)["phrases"], receipt.hash);

    // Edit the source behind the store's back: the projection is served as is
    fs::write(dir.path().join("csv/Phrases.csv"), "english\nchanged\n").unwrap();

    let outcome = store.read(Resource::Dataset(Dataset::Phrases)).await.unwrap();
    assert_eq!(outcome.state, ReadState::Serve(Resource::Dataset(Dataset::Phrases)));
    let bytes = outcome.body.into_bytes().await.unwrap();
    assert_eq!(content_hash(&bytes), receipt.hash);
}

#[tokio::test]
async fn existing_manifest_is_served_without_rebuild() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    store.write(&sheet("Kanji", &[&["kanji"], &["犬"]])).await.unwrap();

    let before = fs::read(dir.path().join("json/cache.json")).unwrap();
    let outcome = store.read_aggregate().await.unwrap();

    assert_eq!(outcome.state, ReadState::Serve(Resource::Cache));
    assert!(outcome.body.is_streamed());
    assert_eq!(outcome.body.into_bytes().await.unwrap(), before);
}

// =============================================================================
// Aggregate rebuild
// =============================================================================

#[tokio::test]
async fn aggregate_isolates_malformed_source() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("csv")).unwrap();
    fs::write(dir.path().join("csv/Phrases.csv"), "english\nhello\n").unwrap();
    fs::write(dir.path().join("csv/Vocabulary.csv"), "english\ndog\n").unwrap();
    fs::write(dir.path().join("csv/Kanji.csv"), "kanji\n犬\"\n").unwrap();
    let store = store(&dir);

    let outcome = store.read_aggregate().await.unwrap();
    assert_eq!(
        outcome.state,
        ReadState::RebuildAggregate(vec![Dataset::Phrases, Dataset::Vocabulary, Dataset::Kanji])
    );
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].resource, Dataset::Kanji);
    assert!(matches!(outcome.failures[0].error, StoreError::Conversion { .. }));

    let body: serde_json::Map<String, serde_json::Value> =
        serde_json::from_slice(&outcome.body.into_bytes().await.unwrap()).unwrap();
    assert_eq!(body.len(), 2);
    assert!(body.contains_key("phrases"));
    assert!(body.contains_key("vocabulary"));
    assert_eq!(body, manifest_on_disk(&dir));
}

#[tokio::test]
async fn aggregate_with_only_failures_writes_no_manifest() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("csv")).unwrap();
    fs::write(dir.path().join("csv/Kanji.csv"), "#!bogus,1\n").unwrap();
    let store = store(&dir);

    let err = store.read_aggregate().await.unwrap_err();
    assert!(matches!(err, StoreError::Conversion { resource: Dataset::Kanji, .. }));
    assert!(!dir.path().join("json/cache.json").exists());
}

#[tokio::test]
async fn rebuild_all_drops_stale_entries() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    store.write(&sheet("Phrases", &[&["english"], &["hi"]])).await.unwrap();
    store.write(&sheet("Kanji", &[&["kanji"], &["犬"]])).await.unwrap();

    fs::remove_file(dir.path().join("csv/Kanji.csv")).unwrap();
    let report = store.rebuild_all().await.unwrap();

    assert!(report.failures.is_empty());
    assert_eq!(report.manifest.keys().collect::<Vec<_>>(), vec!["phrases"]);
    assert_eq!(manifest_on_disk(&dir).len(), 1);
}

#[tokio::test]
async fn rebuild_all_keeps_entry_of_failed_dataset() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    store.write(&sheet("Phrases", &[&["english"], &["hi"]])).await.unwrap();
    let kanji = store.write(&sheet("Kanji", &[&["kanji"], &["犬"]])).await.unwrap();

    fs::write(dir.path().join("csv/Kanji.csv"), "kanji\n犬\"\n").unwrap();
    let report = store.rebuild_all().await.unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].resource, Dataset::Kanji);
    assert_eq!(report.rebuilt.keys().collect::<Vec<_>>(), vec!["phrases"]);

    // The old projection is still served, so its entry stays
    let served = fs::read(dir.path().join("json/kanji.json")).unwrap();
    assert_eq!(content_hash(&served), kanji.hash);
    let manifest = manifest_on_disk(&dir);
    assert_eq!(manifest["kanji"], kanji.hash);
    assert_eq!(serde_json::Value::Object(manifest), serde_json::to_value(&report.manifest).unwrap());
}

fn large_source(header: &str, rows: usize) -> String {
    let mut text = format!("{header}\n");
    for i in 0..rows {
        text.push_str(&format!("word {i},note {i}\n"));
    }
    text
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn aggregate_rebuild_keeps_concurrent_writes() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("csv")).unwrap();
    fs::write(dir.path().join("csv/Phrases.csv"), large_source("english,note", 20_000)).unwrap();
    fs::write(dir.path().join("csv/Vocabulary.csv"), large_source("english,note", 20_000)).unwrap();
    let store = Arc::new(store(&dir));

    let aggregate = {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.read_aggregate().await })
    };
    let writes: Vec<_> = [
        sheet("Kanji", &[&["kanji"], &["犬"]]),
        sheet("Phrases", &[&["english"], &["hello"]]),
    ]
    .into_iter()
    .map(|input| {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            store.write(&input).await
        })
    })
    .collect();

    let outcome = aggregate.await.unwrap().unwrap();
    assert!(outcome.failures.is_empty());
    let mut receipts = Vec::new();
    for handle in writes {
        receipts.push(handle.await.unwrap().unwrap());
    }

    let manifest = manifest_on_disk(&dir);
    assert!(manifest.contains_key("vocabulary"));
    for receipt in receipts {
        assert_eq!(manifest[receipt.resource.name()], receipt.hash);
        let projection = fs::read(&receipt.projection_path).unwrap();
        assert_eq!(content_hash(&projection), receipt.hash);
    }
}

// =============================================================================
// Consistency
// =============================================================================

#[tokio::test]
async fn rebuild_from_disk_matches_written_hash() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    let mut input = sheet("Vocabulary", &[&["english", "note"], &["dog", "line one\r\nline two"], &["cat", ""]]);
    input.freeze = Some("A2".parse().unwrap());
    let receipt = store.write(&input).await.unwrap();

    fs::remove_file(dir.path().join("json/vocabulary.json")).unwrap();
    let outcome = store.read_dataset(Dataset::Vocabulary).await.unwrap();
    assert_eq!(outcome.state, ReadState::Build(Dataset::Vocabulary));

    let bytes = outcome.body.into_bytes().await.unwrap();
    assert_eq!(content_hash(&bytes), receipt.hash);
}

#[tokio::test]
async fn rewriting_a_dataset_replaces_its_hash() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    let first = store.write(&sheet("Kanji", &[&["kanji"], &["犬"]])).await.unwrap();
    let second = store.write(&sheet("Kanji", &[&["kanji"], &["猫"]])).await.unwrap();

    assert_ne!(first.hash, second.hash);
    assert_eq!(manifest_on_disk(&dir)["kanji"], second.hash);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writes_to_distinct_datasets_converge() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(store(&dir));

    let handles: Vec<_> = Dataset::ALL
        .into_iter()
        .map(|dataset| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let input = sheet(dataset.display_name(), &[&["english"], &[dataset.name()]]);
                store.write(&input).await.map(|receipt| receipt.hash)
            })
        })
        .collect();

    let mut hashes = Vec::new();
    for handle in handles {
        hashes.push(handle.await.unwrap().unwrap());
    }

    let manifest = manifest_on_disk(&dir);
    assert_eq!(manifest.len(), Dataset::ALL.len());
    for (dataset, hash) in Dataset::ALL.into_iter().zip(hashes) {
        assert_eq!(manifest[dataset.name()], hash);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reads_build_once() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("csv")).unwrap();
    fs::write(dir.path().join("csv/Phrases.csv"), "english\nhello\n").unwrap();
    let store = Arc::new(store(&dir));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let outcome = store.read_dataset(Dataset::Phrases).await.unwrap();
                let built = matches!(outcome.state, ReadState::Build(_));
                (built, outcome.body.into_bytes().await.unwrap())
            })
        })
        .collect();

    let mut builds = 0;
    let mut bodies = Vec::new();
    for handle in handles {
        let (built, body) = handle.await.unwrap();
        builds += usize::from(built);
        bodies.push(body);
    }

    assert_eq!(builds, 1);
    assert!(bodies.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writes_to_one_dataset_leave_a_consistent_pair() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(store(&dir));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let value = format!("value {i}");
                store
                    .write(&sheet("Phrases", &[&["english"], &[value.as_str()]]))
                    .await
                    .unwrap()
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap();
    }

    let projection = fs::read(dir.path().join("json/phrases.json")).unwrap();
    assert_eq!(manifest_on_disk(&dir)["phrases"], content_hash(&projection));

    let source = fs::read_to_string(dir.path().join("csv/Phrases.csv")).unwrap();
    let doc: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(&projection).unwrap();
    let value = doc.values().next().unwrap()["english"].as_str().unwrap().to_string();
    assert!(source.contains(&value));
}
