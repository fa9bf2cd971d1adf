use docqa_vector_store::{
    chunk_metadata, EmbeddingProvider, FlatIndex, SnapshotPaths, StubEmbedder, VectorStore,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const DIM: usize = 8;

async fn populated_store(base: &std::path::Path) -> VectorStore {
    let store = VectorStore::open(base, DIM).await.unwrap();
    let embedder = StubEmbedder::new(DIM);
    for (filename, chunks) in [("a.txt", 2), ("b.pdf", 3)] {
        let texts: Vec<String> = (0..chunks).map(|i| format!("{filename}#{i}")).collect();
        let embeddings = embedder.embed_batch(&texts).await.unwrap();
        let metadata = (0..chunks)
            .map(|i| chunk_metadata(filename, i, chunks))
            .collect();
        store
            .insert(embeddings, texts, Some(metadata))
            .await
            .unwrap();
    }
    store
}

#[tokio::test]
async fn reload_yields_identical_records() {
    let tmp = TempDir::new().unwrap();
    let base = tmp.path().join("data").join("docqa_index.json");
    let original = populated_store(&base).await;
    let expected = original.records().await;
    drop(original);

    let reopened = VectorStore::open(&base, DIM).await.unwrap();
    assert_eq!(reopened.records().await, expected);
    assert_eq!(reopened.size().await, 5);

    let hits = reopened.search(&expected[4].embedding, 1).await.unwrap();
    assert_eq!(hits[0].text, "b.pdf#2");
}

#[tokio::test]
async fn deletion_survives_reload() {
    let tmp = TempDir::new().unwrap();
    let base = tmp.path().join("docqa_index.json");
    let store = populated_store(&base).await;
    store.delete_by_source("a.txt").await.unwrap();
    drop(store);

    let reopened = VectorStore::open(&base, DIM).await.unwrap();
    let files = reopened.file_info().await;
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].filename, "b.pdf");
    assert_eq!(files[0].chunks, 3);
}

#[tokio::test]
async fn corrupt_snapshot_starts_empty() {
    let tmp = TempDir::new().unwrap();
    let base = tmp.path().join("docqa_index.json");
    drop(populated_store(&base).await);

    std::fs::write(&base, b"{ not json").unwrap();
    let store = VectorStore::open(&base, DIM).await.unwrap();
    assert_eq!(store.size().await, 0);

    // the store is still usable and overwrites the bad files
    let embedder = StubEmbedder::new(DIM);
    let texts = vec!["fresh".to_string()];
    let embeddings = embedder.embed_batch(&texts).await.unwrap();
    store.insert(embeddings, texts, None).await.unwrap();
    drop(store);
    assert_eq!(VectorStore::open(&base, DIM).await.unwrap().size().await, 1);
}

#[tokio::test]
async fn index_ahead_of_snapshot_is_rebuilt_on_open() {
    let tmp = TempDir::new().unwrap();
    let base = tmp.path().join("docqa_index.json");
    let store = populated_store(&base).await;
    let committed = store.records().await;
    drop(store);

    // the index of a later flush landed but its snapshot never did
    let paths = SnapshotPaths::for_base(&base);
    let mut ahead = FlatIndex::new(DIM);
    let mut rows: Vec<Vec<f32>> = committed.iter().map(|r| r.embedding.clone()).collect();
    rows.push(vec![0.25; DIM]);
    ahead.add(&rows).unwrap();
    std::fs::write(&paths.index, ahead.encode()).unwrap();

    let store = VectorStore::open(&base, DIM).await.unwrap();
    assert_eq!(store.records().await, committed);
    assert_eq!(store.size().await, 5);
    let hits = store.search(&committed[3].embedding, 1).await.unwrap();
    assert_eq!(hits[0].text, "b.pdf#1");

    // the repaired index is written straight back
    let on_disk = FlatIndex::decode(&std::fs::read(&paths.index).unwrap(), DIM).unwrap();
    assert_eq!(on_disk.len(), 5);
}

#[tokio::test]
async fn short_index_is_rebuilt_on_open() {
    let tmp = TempDir::new().unwrap();
    let base = tmp.path().join("docqa_index.json");
    let store = populated_store(&base).await;
    let committed = store.records().await;
    drop(store);

    let paths = SnapshotPaths::for_base(&base);
    let mut short = FlatIndex::new(DIM);
    short.add(&[vec![0.0; DIM]]).unwrap();
    std::fs::write(&paths.index, short.encode()).unwrap();

    let store = VectorStore::open(&base, DIM).await.unwrap();
    assert_eq!(store.records().await, committed);
}

#[tokio::test]
async fn legacy_snapshot_with_mismatched_index_starts_empty() {
    let tmp = TempDir::new().unwrap();
    let base = tmp.path().join("docqa_index.json");
    let paths = SnapshotPaths::for_base(&base);

    let mut index = FlatIndex::new(DIM);
    index.add(&[vec![0.0; DIM]]).unwrap();
    std::fs::write(&paths.index, index.encode()).unwrap();
    let legacy = serde_json::json!({
        "texts": ["one", "two"],
        "metadata": [{}, {}],
        "dimension": DIM,
    });
    std::fs::write(&paths.snapshot, serde_json::to_vec(&legacy).unwrap()).unwrap();

    let store = VectorStore::open(&base, DIM).await.unwrap();
    assert_eq!(store.size().await, 0);
}

#[tokio::test]
async fn different_dimension_is_treated_as_corrupt() {
    let tmp = TempDir::new().unwrap();
    let base = tmp.path().join("docqa_index.json");
    drop(populated_store(&base).await);

    let store = VectorStore::open(&base, DIM * 2).await.unwrap();
    assert_eq!(store.size().await, 0);
}

#[tokio::test]
async fn legacy_snapshot_is_migrated_and_deletable() {
    let tmp = TempDir::new().unwrap();
    let base = tmp.path().join("docqa_index.json");
    let paths = SnapshotPaths::for_base(&base);

    let embedder = StubEmbedder::new(DIM);
    let texts = vec!["old a".to_string(), "old b".to_string()];
    let embeddings = embedder.embed_batch(&texts).await.unwrap();
    let mut index = FlatIndex::new(DIM);
    index.add(&embeddings).unwrap();
    std::fs::write(&paths.index, index.encode()).unwrap();
    let legacy = serde_json::json!({
        "texts": texts,
        "metadata": [chunk_metadata("a.txt", 0, 1), chunk_metadata("b.txt", 0, 1)],
        "dimension": DIM,
    });
    std::fs::write(&paths.snapshot, serde_json::to_vec(&legacy).unwrap()).unwrap();

    let store = VectorStore::open(&base, DIM).await.unwrap();
    assert_eq!(store.size().await, 2);
    assert_eq!(store.records().await[1].embedding, embeddings[1]);

    assert_eq!(store.delete_by_source("a.txt").await.unwrap(), 1);
    let hits = store.search(&embeddings[1], 2).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].text, "old b");

    let rewritten: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&paths.snapshot).unwrap()).unwrap();
    assert_eq!(rewritten["schema_version"], 1);
    assert_eq!(rewritten["embeddings"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn clear_removes_both_artifacts() {
    let tmp = TempDir::new().unwrap();
    let base = tmp.path().join("docqa_index.json");
    let store = populated_store(&base).await;
    let paths = SnapshotPaths::for_base(&base);
    assert!(paths.snapshot.exists() && paths.index.exists());

    store.clear().await.unwrap();
    assert!(!paths.snapshot.exists());
    assert!(!paths.index.exists());
    drop(store);
    assert_eq!(VectorStore::open(&base, DIM).await.unwrap().size().await, 0);
}
