//! Exact flat inner-product vector index.
//!
//! Stores unit-normalized embeddings in one contiguous row-major matrix
//! and ranks candidates by exact inner product (cosine similarity, given
//! unit vectors). Ids are assigned by insertion order starting at 0 and
//! are never reused or renumbered; position `i` in the companion metadata
//! sequence describes the vector at id `i`.
//!
//! Search always returns exactly `k` slots per query. When the index
//! holds fewer than `k` vectors the tail is padded with id `-1` and score
//! `-inf`, which consumers must skip.

use std::fs;
use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Sentinel id for search slots beyond the number of stored vectors.
pub const NO_MATCH_ID: i64 = -1;

/// Flat exact inner-product index.
#[derive(Debug, Serialize, Deserialize)]
pub struct FlatIndex {
    dimension: usize,
    /// Row-major `[len, dimension]` matrix.
    data: Vec<f32>,
}

impl FlatIndex {
    /// Create an empty index for vectors of the given dimensionality.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    /// Whether the index holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Vector dimensionality.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Bulk-append vectors. Ids continue from the current count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Index`] if any vector has the wrong dimension.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        for vector in vectors {
            if vector.len() != self.dimension {
                return Err(Error::Index(format!(
                    "dimension mismatch: expected {}, got {}",
                    self.dimension,
                    vector.len()
                )));
            }
        }
        self.data.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    /// Exact top-`k` inner-product search for a batch of queries.
    ///
    /// Returns `(scores, ids)` with one row per query, positionally
    /// aligned with the input order, scores non-increasing within a row.
    /// Rows are padded to length `k` with [`NO_MATCH_ID`] / `-inf`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Index`] on query dimension mismatch.
    pub fn search(&self, queries: &[Vec<f32>], k: usize) -> Result<(Vec<Vec<f32>>, Vec<Vec<i64>>)> {
        for query in queries {
            if query.len() != self.dimension {
                return Err(Error::Index(format!(
                    "query dimension mismatch: expected {}, got {}",
                    self.dimension,
                    query.len()
                )));
            }
        }

        let per_query: Vec<(Vec<f32>, Vec<i64>)> = queries
            .par_iter()
            .map(|query| self.search_one(query, k))
            .collect();

        let mut scores = Vec::with_capacity(per_query.len());
        let mut ids = Vec::with_capacity(per_query.len());
        for (s, i) in per_query {
            scores.push(s);
            ids.push(i);
        }
        Ok((scores, ids))
    }

    fn search_one(&self, query: &[f32], k: usize) -> (Vec<f32>, Vec<i64>) {
        let mut ranked: Vec<(f32, i64)> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(id, row)| (dot(row, query), id as i64))
            .collect();
        // Descending score; ties broken by ascending id for determinism.
        ranked.sort_unstable_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        ranked.truncate(k);
        while ranked.len() < k {
            ranked.push((f32::NEG_INFINITY, NO_MATCH_ID));
        }
        ranked.into_iter().unzip()
    }

    /// Persist the index to a binary file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = bincode::serde::encode_to_vec(self, bincode::config::standard())?;
        fs::write(path, bytes)?;
        Ok(())
    }

    /// Load a persisted index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Index`] if the file cannot be decoded or its
    /// contents are internally inconsistent.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let (index, _): (FlatIndex, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())?;
        if index.dimension == 0 || index.data.len() % index.dimension != 0 {
            return Err(Error::Index(format!(
                "corrupt index file: {} values for dimension {}",
                index.data.len(),
                index.dimension
            )));
        }
        Ok(index)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
