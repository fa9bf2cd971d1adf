//! On-disk form of a [`VectorStore`](crate::VectorStore).
//!
//! Two artifacts share a base path: the native [`FlatIndex`] encoding
//! (`<base>.index`) and a JSON snapshot (`<base>.json`) holding texts,
//! metadata, raw embeddings and the dimension, all in index order.

use crate::error::{Result, VectorStoreError};
use crate::flat_index::FlatIndex;
use crate::types::{Metadata, VectorRecord};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

const fn default_schema_version() -> u32 {
    SNAPSHOT_SCHEMA_VERSION
}

#[derive(Debug, Deserialize)]
struct PersistedSnapshot {
    #[serde(default = "default_schema_version")]
    schema_version: u32,
    dimension: usize,
    texts: Vec<String>,
    metadata: Vec<Metadata>,
    /// Absent in legacy snapshots that only kept text and metadata
    #[serde(default)]
    embeddings: Option<Vec<Vec<f32>>>,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    schema_version: u32,
    dimension: usize,
    texts: Vec<&'a str>,
    metadata: Vec<&'a Metadata>,
    embeddings: Vec<&'a [f32]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPaths {
    pub snapshot: PathBuf,
    pub index: PathBuf,
}

impl SnapshotPaths {
    #[must_use]
    pub fn for_base(base: &Path) -> Self {
        Self {
            snapshot: base.with_extension("json"),
            index: base.with_extension("index"),
        }
    }
}

#[derive(Debug)]
pub(crate) struct LoadedSnapshot {
    pub records: Vec<VectorRecord>,
    pub index: FlatIndex,
    /// Embeddings were recovered from the index rather than the snapshot
    pub migrated: bool,
    /// The index file was missing or disagreed with the snapshot and was
    /// rebuilt from the snapshot's embeddings
    pub repaired: bool,
}

/// Load the persisted store. `Ok(None)` when there is no snapshot.
///
/// The snapshot is the commit point: [`save`] renames it last, so when the
/// index file is missing or disagrees with a snapshot that carries
/// embeddings, the index is rebuilt from those embeddings. Legacy snapshots
/// without embeddings still need a matching index.
pub(crate) async fn load(paths: &SnapshotPaths, dimension: usize) -> Result<Option<LoadedSnapshot>> {
    let Some(snapshot_bytes) = read_if_exists(&paths.snapshot).await? else {
        if tokio::fs::try_exists(&paths.index).await? {
            log::warn!(
                "Ignoring index {:?} without a committed snapshot",
                paths.index
            );
        }
        return Ok(None);
    };
    let persisted: PersistedSnapshot = serde_json::from_slice(&snapshot_bytes)?;

    if persisted.schema_version != SNAPSHOT_SCHEMA_VERSION {
        return Err(VectorStoreError::Other(format!(
            "unsupported snapshot schema_version {} (expected {SNAPSHOT_SCHEMA_VERSION})",
            persisted.schema_version
        )));
    }
    if persisted.dimension != dimension {
        return Err(VectorStoreError::InvalidDimension {
            expected: dimension,
            actual: persisted.dimension,
        });
    }
    let count = persisted.texts.len();
    if persisted.metadata.len() != count {
        return Err(VectorStoreError::LengthMismatch {
            what: "metadata entries",
            expected: count,
            actual: persisted.metadata.len(),
        });
    }

    let index = read_if_exists(&paths.index)
        .await?
        .map(|bytes| FlatIndex::decode(&bytes, dimension));

    let (embeddings, index, migrated, repaired) = match persisted.embeddings {
        Some(embeddings) => {
            if embeddings.len() != count {
                return Err(VectorStoreError::LengthMismatch {
                    what: "embeddings",
                    expected: count,
                    actual: embeddings.len(),
                });
            }
            if let Some(bad) = embeddings.iter().find(|e| e.len() != dimension) {
                return Err(VectorStoreError::InvalidDimension {
                    expected: dimension,
                    actual: bad.len(),
                });
            }
            match index {
                Some(Ok(index)) if index_matches(&index, &embeddings) => {
                    (embeddings, index, false, false)
                }
                stale => {
                    let reason = match stale {
                        None => "missing".to_string(),
                        Some(Err(err)) => format!("unreadable ({err})"),
                        Some(Ok(index)) => format!(
                            "out of step ({} rows for {count} records)",
                            index.len()
                        ),
                    };
                    log::warn!(
                        "Index {:?} is {reason}; rebuilding it from the snapshot",
                        paths.index
                    );
                    let mut rebuilt = FlatIndex::new(dimension);
                    rebuilt.add(&embeddings)?;
                    (embeddings, rebuilt, false, true)
                }
            }
        }
        None => {
            let index = match index {
                Some(index) => index?,
                None => {
                    return Err(VectorStoreError::Other(
                        "legacy snapshot has no embeddings and no index file".to_string(),
                    ))
                }
            };
            if index.len() != count {
                return Err(VectorStoreError::LengthMismatch {
                    what: "index vectors",
                    expected: count,
                    actual: index.len(),
                });
            }
            let recovered = (0..count)
                .map(|position| {
                    index.vector(position).ok_or_else(|| {
                        VectorStoreError::Index(format!("missing index row {position}"))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            (recovered, index, true, false)
        }
    };

    let records = embeddings
        .into_iter()
        .zip(persisted.texts)
        .zip(persisted.metadata)
        .map(|((embedding, text), metadata)| VectorRecord {
            embedding,
            text,
            metadata,
        })
        .collect();

    Ok(Some(LoadedSnapshot {
        records,
        index,
        migrated,
        repaired,
    }))
}

fn index_matches(index: &FlatIndex, embeddings: &[Vec<f32>]) -> bool {
    index.len() == embeddings.len()
        && embeddings
            .iter()
            .enumerate()
            .all(|(position, embedding)| index.vector(position).as_deref() == Some(embedding.as_slice()))
}

/// Write both artifacts.
///
/// Both temp files are written before anything is renamed; the index is
/// renamed first and the snapshot last. A failure before the snapshot
/// rename leaves the previous snapshot committed, and [`load`] rebuilds the
/// index from it if the index already moved on.
pub(crate) async fn save(
    paths: &SnapshotPaths,
    dimension: usize,
    records: &[VectorRecord],
    index: &FlatIndex,
) -> Result<()> {
    let snapshot = SnapshotRef {
        schema_version: SNAPSHOT_SCHEMA_VERSION,
        dimension,
        texts: records.iter().map(|r| r.text.as_str()).collect(),
        metadata: records.iter().map(|r| &r.metadata).collect(),
        embeddings: records.iter().map(|r| r.embedding.as_slice()).collect(),
    };
    let snapshot_bytes = serde_json::to_vec(&snapshot)?;

    let index_tmp = write_temp(&paths.index, &index.encode()).await?;
    let snapshot_tmp = match write_temp(&paths.snapshot, &snapshot_bytes).await {
        Ok(tmp) => tmp,
        Err(err) => {
            discard(&index_tmp).await;
            return Err(err);
        }
    };
    if let Err(err) = tokio::fs::rename(&index_tmp, &paths.index).await {
        discard(&index_tmp).await;
        discard(&snapshot_tmp).await;
        return Err(err.into());
    }
    if let Err(err) = tokio::fs::rename(&snapshot_tmp, &paths.snapshot).await {
        discard(&snapshot_tmp).await;
        return Err(err.into());
    }
    Ok(())
}

/// Delete both artifacts; missing files are fine.
pub(crate) async fn remove(paths: &SnapshotPaths) -> Result<()> {
    for path in [&paths.snapshot, &paths.index] {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

async fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Write `bytes` next to `path` as `<path>.tmp` and return the temp path
async fn write_temp(path: &Path, bytes: &[u8]) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, bytes).await?;
    Ok(tmp)
}

async fn discard(tmp: &Path) {
    if let Err(err) = tokio::fs::remove_file(tmp).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            log::debug!("Could not remove temp file {tmp:?}: {err}");
        }
    }
}
