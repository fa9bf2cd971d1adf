use crate::error::{Result, VectorStoreError};
use ndarray::{s, Array2, ArrayView1, Axis};

const INDEX_MAGIC: &[u8; 4] = b"FLX1";
const HEADER_LEN: usize = 16;

/// A search hit: index position plus squared L2 distance to the query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

/// Exact nearest-neighbour index over fixed-dimension `f32` vectors.
///
/// Append-only: positions are assigned in insertion order and never change.
/// There is no delete or update; callers that need removal rebuild a fresh
/// index from the vectors they keep.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimension: usize,
    vectors: Array2<f32>,
}

impl FlatIndex {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Array2::zeros((0, dimension)),
        }
    }

    /// Append vectors. The whole batch is validated before anything is added.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        for vector in vectors {
            self.check_dimension(vector)?;
        }
        for vector in vectors {
            self.vectors
                .push_row(ArrayView1::from(vector.as_slice()))
                .map_err(|e| VectorStoreError::Index(e.to_string()))?;
        }
        Ok(())
    }

    /// Drop every vector at or after `len`. Used to roll back an append
    /// that could not be persisted.
    pub fn truncate(&mut self, len: usize) {
        if len < self.len() {
            self.vectors = self.vectors.slice(s![..len, ..]).to_owned();
        }
    }

    /// Up to `k` nearest positions by squared L2 distance, ascending.
    /// Equal distances keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        self.check_dimension(query)?;
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let query = ArrayView1::from(query);
        let mut scored: Vec<Neighbor> = self
            .vectors
            .axis_iter(Axis(0))
            .enumerate()
            .map(|(position, row)| Neighbor {
                position,
                distance: squared_l2(row, query),
            })
            .collect();

        // sort_by is stable, so ties stay in position order
        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        scored.truncate(k);
        Ok(scored)
    }

    /// Copy of the vector stored at `position`
    #[must_use]
    pub fn vector(&self, position: usize) -> Option<Vec<f32>> {
        (position < self.len()).then(|| self.vectors.row(position).to_vec())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vectors.nrows()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    /// Native binary form: magic, `u32` dimension, `u64` count, then the
    /// row-major `f32` values, all little-endian.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.vectors.len() * 4);
        out.extend_from_slice(INDEX_MAGIC);
        #[allow(clippy::cast_possible_truncation)]
        let dim = self.dimension as u32;
        out.extend_from_slice(&dim.to_le_bytes());
        out.extend_from_slice(&(self.len() as u64).to_le_bytes());
        for value in &self.vectors {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out
    }

    pub fn decode(bytes: &[u8], expected_dimension: usize) -> Result<Self> {
        if bytes.len() < HEADER_LEN || &bytes[0..4] != INDEX_MAGIC {
            return Err(VectorStoreError::Index(
                "index file has an unknown header".to_string(),
            ));
        }
        let dim = u32::from_le_bytes(read_array(&bytes[4..8])?) as usize;
        if dim != expected_dimension {
            return Err(VectorStoreError::InvalidDimension {
                expected: expected_dimension,
                actual: dim,
            });
        }
        let count = usize::try_from(u64::from_le_bytes(read_array(&bytes[8..16])?))
            .map_err(|_| VectorStoreError::Index("index count overflows usize".to_string()))?;
        let expected_len = count
            .checked_mul(dim)
            .and_then(|values| values.checked_mul(4))
            .and_then(|payload| payload.checked_add(HEADER_LEN))
            .ok_or_else(|| VectorStoreError::Index("index size overflows usize".to_string()))?;
        if bytes.len() != expected_len {
            return Err(VectorStoreError::Index(format!(
                "index file is {} bytes, expected {expected_len}",
                bytes.len()
            )));
        }

        let values = bytes[HEADER_LEN..]
            .chunks_exact(4)
            .map(|raw| read_array(raw).map(f32::from_le_bytes))
            .collect::<Result<Vec<f32>>>()?;
        let vectors = Array2::from_shape_vec((count, dim), values)
            .map_err(|e| VectorStoreError::Index(e.to_string()))?;

        Ok(Self {
            dimension: dim,
            vectors,
        })
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(VectorStoreError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

fn squared_l2(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

fn read_array<const N: usize>(bytes: &[u8]) -> Result<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| VectorStoreError::Index("truncated index file".to_string()))
}
