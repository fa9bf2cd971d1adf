use crate::error::{Result, VectorStoreError};
use crate::flat_index::FlatIndex;
use crate::snapshot::{self, SnapshotPaths};
use crate::types::{FileInfo, Metadata, SearchHit, VectorRecord};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Records plus the index derived from them. `index.len() == records.len()`
/// and row `i` of the index is `records[i].embedding`.
#[derive(Debug)]
struct StoreState {
    records: Vec<VectorRecord>,
    index: FlatIndex,
}

impl StoreState {
    fn empty(dimension: usize) -> Self {
        Self {
            records: Vec::new(),
            index: FlatIndex::new(dimension),
        }
    }

    /// Append in lock-step. On error nothing is left appended.
    fn append(&mut self, records: Vec<VectorRecord>) -> Result<()> {
        let committed = self.records.len();
        for record in &records {
            if let Err(err) = self.index.add(std::slice::from_ref(&record.embedding)) {
                self.index.truncate(committed);
                return Err(err);
            }
        }
        self.records.extend(records);
        Ok(())
    }

    fn truncate(&mut self, len: usize) {
        self.records.truncate(len);
        self.index.truncate(len);
    }
}

/// Rows appended after `committed` that are not yet on disk. Dropping it
/// without [`Uncommitted::keep`] truncates them away again, which also
/// covers a caller cancelled mid-flush.
struct Uncommitted<'a> {
    state: &'a mut StoreState,
    committed: usize,
    kept: bool,
}

impl Uncommitted<'_> {
    fn keep(mut self) {
        self.kept = true;
    }
}

impl Drop for Uncommitted<'_> {
    fn drop(&mut self) {
        if !self.kept {
            self.state.truncate(self.committed);
        }
    }
}

/// Durable, mutable collection of embedded chunks.
///
/// The record list is the source of truth; the [`FlatIndex`] is a cache
/// rebuilt from it whenever records are removed. Appends happen in place
/// under the write lock and are truncated away if the flush fails; removals
/// are staged on a rebuilt state that is swapped in only after it is on
/// disk. Readers never see a half-applied change and a failed flush leaves
/// the previous state in place.
pub struct VectorStore {
    dimension: usize,
    base_path: PathBuf,
    paths: SnapshotPaths,
    state: RwLock<StoreState>,
}

impl VectorStore {
    /// Open the store persisted at `base_path`, or start empty.
    ///
    /// Missing or unreadable state is not an error: it is logged and the
    /// store comes up empty.
    pub async fn open(base_path: impl AsRef<Path>, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(VectorStoreError::Other(
                "vector dimension must be greater than zero".to_string(),
            ));
        }
        let base_path = base_path.as_ref().to_path_buf();
        let paths = SnapshotPaths::for_base(&base_path);

        let state = match snapshot::load(&paths, dimension).await {
            Ok(Some(loaded)) => {
                if loaded.migrated {
                    log::info!(
                        "Recovered embeddings for {} records from {:?}",
                        loaded.records.len(),
                        paths.index
                    );
                }
                log::info!(
                    "Loaded vector store from {:?} ({} records)",
                    base_path,
                    loaded.records.len()
                );
                let state = StoreState {
                    records: loaded.records,
                    index: loaded.index,
                };
                if loaded.migrated || loaded.repaired {
                    if let Err(err) =
                        snapshot::save(&paths, dimension, &state.records, &state.index).await
                    {
                        log::warn!("Could not rewrite vector store at {:?}: {err}", base_path);
                    }
                }
                state
            }
            Ok(None) => {
                log::info!("No vector store at {:?}; starting empty", base_path);
                StoreState::empty(dimension)
            }
            Err(err) => {
                log::warn!(
                    "Discarding unreadable vector store at {:?}: {err}; starting empty",
                    base_path
                );
                StoreState::empty(dimension)
            }
        };

        Ok(Self {
            dimension,
            base_path,
            paths,
            state: RwLock::new(state),
        })
    }

    /// Append records in lock-step and persist.
    ///
    /// Empty input is a no-op. Without `metadata` every record gets an empty
    /// map. Validation happens before anything is touched.
    pub async fn insert(
        &self,
        embeddings: Vec<Vec<f32>>,
        texts: Vec<String>,
        metadata: Option<Vec<Metadata>>,
    ) -> Result<()> {
        let records = self.prepare_records(embeddings, texts, metadata)?;
        if records.is_empty() {
            log::debug!("Insert called with no records; nothing to do");
            return Ok(());
        }
        let added = records.len();

        let mut state = self.state.write().await;
        self.append_committed(&mut state, records).await?;
        log::info!("Inserted {added} records (total {})", state.records.len());
        Ok(())
    }

    /// Swap every record of `filename` for the given records in one step.
    ///
    /// Removal and append share a single write lock and a single flush, so
    /// concurrent replacements of the same file serialise and a failure
    /// keeps the old records. New records go to the end in the given order.
    /// Returns how many records were removed.
    pub async fn replace_source(
        &self,
        filename: &str,
        embeddings: Vec<Vec<f32>>,
        texts: Vec<String>,
        metadata: Option<Vec<Metadata>>,
    ) -> Result<usize> {
        let incoming = self.prepare_records(embeddings, texts, metadata)?;
        let added = incoming.len();

        let mut state = self.state.write().await;
        let removed = state
            .records
            .iter()
            .filter(|record| record.filename() == Some(filename))
            .count();
        if removed == 0 {
            if added > 0 {
                self.append_committed(&mut state, incoming).await?;
                log::info!("Inserted {added} records for '{filename}'");
            }
            return Ok(0);
        }

        let retained: Vec<VectorRecord> = state
            .records
            .iter()
            .filter(|record| record.filename() != Some(filename))
            .cloned()
            .collect();
        let mut staged = self.rebuild(retained)?;
        staged.append(incoming)?;

        self.flush(&staged).await?;
        *state = staged;
        log::info!(
            "Replaced {removed} records for '{filename}' with {added} (total {})",
            state.records.len()
        );
        Ok(removed)
    }

    /// Up to `k` records nearest to `query`, closest first.
    pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let state = self.state.read().await;
        if state.records.is_empty() {
            return Ok(Vec::new());
        }
        let neighbors = state.index.search(query, k)?;
        let hits = neighbors
            .into_iter()
            .filter_map(|neighbor| {
                state.records.get(neighbor.position).map(|record| SearchHit {
                    text: record.text.clone(),
                    distance: neighbor.distance,
                    metadata: record.metadata.clone(),
                })
            })
            .collect::<Vec<_>>();
        log::debug!("Search k={k} returned {} hits", hits.len());
        Ok(hits)
    }

    /// Remove every record whose metadata `filename` equals `filename`.
    ///
    /// Returns how many were removed. Removal rebuilds the index from the
    /// retained records in their original order.
    pub async fn delete_by_source(&self, filename: &str) -> Result<usize> {
        let mut state = self.state.write().await;
        let removed = state
            .records
            .iter()
            .filter(|record| record.filename() == Some(filename))
            .count();
        if removed == 0 {
            return Ok(0);
        }

        let retained: Vec<VectorRecord> = state
            .records
            .iter()
            .filter(|record| record.filename() != Some(filename))
            .cloned()
            .collect();
        let staged = self.rebuild(retained)?;

        self.flush(&staged).await?;
        *state = staged;
        log::info!(
            "Removed {removed} records for '{filename}'; index rebuilt with {} records",
            state.records.len()
        );
        Ok(removed)
    }

    /// Drop every record and delete the persisted files. Idempotent.
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.write().await;
        snapshot::remove(&self.paths).await?;
        *state = StoreState::empty(self.dimension);
        log::info!("Cleared vector store at {:?}", self.base_path);
        Ok(())
    }

    pub async fn size(&self) -> usize {
        self.state.read().await.index.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.size().await == 0
    }

    /// One entry per distinct `filename`, in first-seen order.
    pub async fn file_info(&self) -> Vec<FileInfo> {
        let state = self.state.read().await;
        let mut files: Vec<FileInfo> = Vec::new();
        let mut positions: HashMap<&str, usize> = HashMap::new();
        for record in &state.records {
            let Some(filename) = record.filename() else {
                continue;
            };
            match positions.get(filename) {
                Some(&slot) => files[slot].chunks += 1,
                None => {
                    positions.insert(filename, files.len());
                    files.push(FileInfo {
                        filename: filename.to_string(),
                        chunks: 1,
                        first_chunk_index: record.chunk_index().unwrap_or(0),
                    });
                }
            }
        }
        files
    }

    /// Copy of every record in index order
    pub async fn records(&self) -> Vec<VectorRecord> {
        self.state.read().await.records.clone()
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Validate parallel inputs and zip them into records. Empty input gives
    /// an empty list.
    fn prepare_records(
        &self,
        embeddings: Vec<Vec<f32>>,
        texts: Vec<String>,
        metadata: Option<Vec<Metadata>>,
    ) -> Result<Vec<VectorRecord>> {
        if embeddings.is_empty() || texts.is_empty() {
            return Ok(Vec::new());
        }
        if embeddings.len() != texts.len() {
            return Err(VectorStoreError::LengthMismatch {
                what: "embeddings",
                expected: texts.len(),
                actual: embeddings.len(),
            });
        }
        let metadata = match metadata {
            Some(metadata) if metadata.len() != texts.len() => {
                return Err(VectorStoreError::LengthMismatch {
                    what: "metadata entries",
                    expected: texts.len(),
                    actual: metadata.len(),
                });
            }
            Some(metadata) => metadata,
            None => vec![Metadata::new(); texts.len()],
        };
        for embedding in &embeddings {
            self.check_embedding(embedding)?;
        }
        Ok(embeddings
            .into_iter()
            .zip(texts)
            .zip(metadata)
            .map(|((embedding, text), metadata)| VectorRecord {
                embedding,
                text,
                metadata,
            })
            .collect())
    }

    /// Append in place and flush; the append is undone unless the flush
    /// succeeds.
    async fn append_committed(
        &self,
        state: &mut StoreState,
        records: Vec<VectorRecord>,
    ) -> Result<()> {
        let committed = state.records.len();
        state.append(records)?;
        let pending = Uncommitted {
            state,
            committed,
            kept: false,
        };
        self.flush(&*pending.state).await?;
        pending.keep();
        Ok(())
    }

    fn check_embedding(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dimension {
            return Err(VectorStoreError::InvalidDimension {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        if embedding.iter().any(|value| !value.is_finite()) {
            return Err(VectorStoreError::InvalidEmbedding(
                "embedding contains NaN or infinite values".to_string(),
            ));
        }
        Ok(())
    }

    /// Fresh index over `records`, one vector at a time. Any bad record
    /// aborts the rebuild and the caller keeps its current state.
    fn rebuild(&self, records: Vec<VectorRecord>) -> Result<StoreState> {
        let mut index = FlatIndex::new(self.dimension);
        for record in &records {
            index.add(std::slice::from_ref(&record.embedding))?;
        }
        Ok(StoreState { records, index })
    }

    async fn flush(&self, state: &StoreState) -> Result<()> {
        snapshot::save(&self.paths, self.dimension, &state.records, &state.index).await
    }
}
