use docqa_vector_store::{
    chunk_metadata, EmbeddingProvider, Metadata, StubEmbedder, VectorStore, VectorStoreError,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const DIM: usize = 32;

async fn insert_file(store: &VectorStore, embedder: &StubEmbedder, filename: &str, chunks: usize) {
    let texts: Vec<String> = (0..chunks)
        .map(|i| format!("{filename} chunk {i}"))
        .collect();
    let embeddings = embedder.embed_batch(&texts).await.unwrap();
    let metadata: Vec<Metadata> = (0..chunks)
        .map(|i| chunk_metadata(filename, i, chunks))
        .collect();
    store
        .insert(embeddings, texts, Some(metadata))
        .await
        .unwrap();
}

async fn assert_consistent(store: &VectorStore) {
    let records = store.records().await;
    assert_eq!(store.size().await, records.len());
    for record in &records {
        assert_eq!(record.embedding.len(), DIM);
    }
}

#[tokio::test]
async fn size_tracks_records_across_mutations() {
    let tmp = TempDir::new().unwrap();
    let store = VectorStore::open(tmp.path().join("index.json"), DIM)
        .await
        .unwrap();
    let embedder = StubEmbedder::new(DIM);

    insert_file(&store, &embedder, "a.txt", 3).await;
    assert_consistent(&store).await;
    insert_file(&store, &embedder, "b.txt", 2).await;
    assert_consistent(&store).await;
    insert_file(&store, &embedder, "c.txt", 4).await;
    assert_eq!(store.size().await, 9);

    assert_eq!(store.delete_by_source("b.txt").await.unwrap(), 2);
    assert_consistent(&store).await;
    assert_eq!(store.delete_by_source("missing.txt").await.unwrap(), 0);
    assert_consistent(&store).await;

    insert_file(&store, &embedder, "b.txt", 1).await;
    assert_consistent(&store).await;
    assert_eq!(store.size().await, 8);

    store.clear().await.unwrap();
    assert_consistent(&store).await;
    assert_eq!(store.size().await, 0);
}

#[tokio::test]
async fn deleted_source_is_no_longer_searchable() {
    let tmp = TempDir::new().unwrap();
    let store = VectorStore::open(tmp.path().join("index.json"), DIM)
        .await
        .unwrap();
    let embedder = StubEmbedder::new(DIM);
    insert_file(&store, &embedder, "a.txt", 3).await;
    insert_file(&store, &embedder, "b.txt", 3).await;

    let removed = store.delete_by_source("a.txt").await.unwrap();
    assert_eq!(removed, 3);
    assert_eq!(store.delete_by_source("a.txt").await.unwrap(), 0);

    let query = embedder.embed("a.txt chunk 1").await.unwrap();
    let hits = store.search(&query, 10).await.unwrap();
    assert_eq!(hits.len(), 3);
    for hit in &hits {
        assert_eq!(hit.metadata["filename"], "b.txt");
    }

    // retained records keep their relative order
    let chunk_indexes: Vec<u64> = store
        .records()
        .await
        .iter()
        .filter_map(|r| r.chunk_index())
        .collect();
    assert_eq!(chunk_indexes, vec![0, 1, 2]);
}

#[tokio::test]
async fn searching_with_a_stored_vector_returns_it_first() {
    let tmp = TempDir::new().unwrap();
    let store = VectorStore::open(tmp.path().join("index.json"), DIM)
        .await
        .unwrap();
    let embedder = StubEmbedder::new(DIM);
    insert_file(&store, &embedder, "a.txt", 5).await;

    let records = store.records().await;
    let hits = store.search(&records[3].embedding, 3).await.unwrap();
    assert_eq!(hits[0].text, records[3].text);
    assert!(hits[0].distance.abs() < 1e-5);
    assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
}

#[tokio::test]
async fn wrong_dimension_leaves_the_store_unchanged() {
    let tmp = TempDir::new().unwrap();
    let store = VectorStore::open(tmp.path().join("index.json"), DIM)
        .await
        .unwrap();
    let embedder = StubEmbedder::new(DIM);
    insert_file(&store, &embedder, "a.txt", 2).await;
    let before = store.records().await;

    let mut embeddings = StubEmbedder::new(DIM)
        .embed_batch(&["ok".to_string()])
        .await
        .unwrap();
    embeddings.push(vec![0.0; DIM - 1]);
    let err = store
        .insert(embeddings, vec!["ok".into(), "short".into()], None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        VectorStoreError::InvalidDimension {
            expected: DIM,
            actual: 31
        }
    ));
    assert_eq!(store.records().await, before);

    let err = store.search(&[0.0; 4], 3).await.unwrap_err();
    assert!(err.is_invalid_input());
}

#[tokio::test]
async fn search_on_cleared_store_is_empty() {
    let tmp = TempDir::new().unwrap();
    let store = VectorStore::open(tmp.path().join("index.json"), DIM)
        .await
        .unwrap();
    let embedder = StubEmbedder::new(DIM);
    insert_file(&store, &embedder, "a.txt", 2).await;
    store.clear().await.unwrap();

    let query = embedder.embed("anything").await.unwrap();
    assert!(store.search(&query, 3).await.unwrap().is_empty());
    assert!(store.file_info().await.is_empty());
}

#[tokio::test]
async fn concurrent_readers_see_whole_mutations() {
    let tmp = TempDir::new().unwrap();
    let store = std::sync::Arc::new(
        VectorStore::open(tmp.path().join("index.json"), DIM)
            .await
            .unwrap(),
    );
    let embedder = StubEmbedder::new(DIM);
    insert_file(&store, &embedder, "keep.txt", 4).await;
    insert_file(&store, &embedder, "drop.txt", 4).await;

    let query = embedder.embed("keep.txt chunk 0").await.unwrap();
    let mut readers = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let query = query.clone();
        readers.push(tokio::spawn(async move {
            let hits = store.search(&query, 8).await.unwrap();
            assert!(hits.len() == 8 || hits.len() == 4);
        }));
    }
    store.delete_by_source("drop.txt").await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }
    assert_eq!(store.size().await, 4);
}
