//! Flat (brute-force) inner-product index.
//!
//! Vectors are stored contiguously in insertion order. A query scores every vector, so
//! search cost is O(N·d); exact and adequate for a few thousand cases.
//!
//! # On-disk layout (little-endian)
//!
//! ```text
//! magic      8 bytes  "PAFLAT01"
//! dim        u32
//! count      u64
//! model_len  u32
//! model      model_len bytes, UTF-8 embedding model id
//! data       count * dim f32
//! ```

use crate::StoreError;

const MAGIC: &[u8; 8] = b"PAFLAT01";

/// A search result: the vector's insertion position and its similarity to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub position: usize,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dim: usize,
    model_id: String,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dim: usize, model_id: impl Into<String>) -> Self {
        Self {
            dim,
            model_id: model_id.into(),
            data: Vec::new(),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Embedding model the vectors were produced with.
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn len(&self) -> usize {
        if self.dim == 0 { 0 } else { self.data.len() / self.dim }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append a vector; its position is the previous `len()`.
    pub fn add(&mut self, vector: &[f32]) -> Result<usize, StoreError> {
        self.check_dim(vector)?;
        let position = self.len();
        self.data.extend_from_slice(vector);
        Ok(position)
    }

    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dim)?;
        self.data.get(start..start + self.dim)
    }

    pub fn vectors(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dim.max(1))
    }

    /// Top `k` vectors by inner product with `query`, highest first.
    ///
    /// Equal scores keep insertion order. Returns `min(k, len())` hits.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Hit>, StoreError> {
        self.check_dim(query)?;
        let mut hits: Vec<Hit> = self
            .vectors()
            .enumerate()
            .map(|(position, v)| Hit {
                position,
                score: v.iter().zip(query).map(|(a, b)| a * b).sum(),
            })
            .collect();
        // Stable sort: ties stay in insertion order.
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let model = self.model_id.as_bytes();
        let mut out = Vec::with_capacity(24 + model.len() + self.data.len() * 4);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&(self.dim as u32).to_le_bytes());
        out.extend_from_slice(&(self.len() as u64).to_le_bytes());
        out.extend_from_slice(&(model.len() as u32).to_le_bytes());
        out.extend_from_slice(model);
        for x in &self.data {
            out.extend_from_slice(&x.to_le_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        let mut cursor = Cursor { bytes, pos: 0 };
        if cursor.take(8)? != MAGIC {
            return Err(StoreError::Corrupt("bad magic".into()));
        }
        let dim = u32::from_le_bytes(cursor.array()?) as usize;
        let count = u64::from_le_bytes(cursor.array()?) as usize;
        let model_len = u32::from_le_bytes(cursor.array()?) as usize;
        let model_id = std::str::from_utf8(cursor.take(model_len)?)
            .map_err(|e| StoreError::Corrupt(format!("model id: {e}")))?
            .to_string();

        let body_len = count
            .checked_mul(dim)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| StoreError::Corrupt("vector count overflows".into()))?;
        let body = cursor.take(body_len)?;
        if cursor.pos != bytes.len() {
            return Err(StoreError::Corrupt(format!(
                "{} trailing bytes",
                bytes.len() - cursor.pos
            )));
        }
        let data = body
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        Ok(Self {
            dim,
            model_id,
            data,
        })
    }

    fn check_dim(&self, vector: &[f32]) -> Result<(), StoreError> {
        if vector.len() != self.dim {
            return Err(StoreError::DimensionMismatch {
                expected: self.dim,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], StoreError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| StoreError::Corrupt("unexpected end of file".into()))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], StoreError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}
