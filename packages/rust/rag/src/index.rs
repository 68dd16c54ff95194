//! Exact nearest-neighbor index over squared L2 distance.
//!
//! Construction and search are separate types: vectors go into an
//! [`IndexBuilder`], and only [`IndexBuilder::finish`] yields a searchable
//! [`FlatL2Index`]. Once built, the index is immutable and can be shared
//! across tasks for concurrent reads.

use std::cmp::Ordering;

use pagewise_shared::{PagewiseError, Result};

/// A search hit: position of the stored vector and its squared L2 distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

/// Accumulates vectors for a [`FlatL2Index`].
#[derive(Debug, Default)]
pub struct IndexBuilder {
    dimension: Option<usize>,
    data: Vec<f32>,
    len: usize,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-size the builder for `capacity` vectors of `dimension` components.
    pub fn with_dimension(dimension: usize, capacity: usize) -> Self {
        Self {
            dimension: Some(dimension),
            data: Vec::with_capacity(dimension * capacity),
            len: 0,
        }
    }

    /// Append a vector. The first vector fixes the dimension of the index.
    pub fn add(&mut self, vector: &[f32]) -> Result<()> {
        if vector.is_empty() {
            return Err(PagewiseError::Index("cannot index a zero-length vector".into()));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(PagewiseError::Index(format!(
                "vector {} contains non-finite components",
                self.len
            )));
        }
        match self.dimension {
            Some(dim) if dim != vector.len() => {
                return Err(PagewiseError::Index(format!(
                    "dimension mismatch at vector {}: expected {dim}, got {}",
                    self.len,
                    vector.len()
                )));
            }
            Some(_) => {}
            None => self.dimension = Some(vector.len()),
        }

        self.data.extend_from_slice(vector);
        self.len += 1;
        Ok(())
    }

    /// Freeze the builder into a searchable index.
    pub fn finish(self) -> FlatL2Index {
        FlatL2Index {
            dimension: self.dimension.unwrap_or(0),
            data: self.data,
            len: self.len,
        }
    }
}

/// Brute-force index storing vectors contiguously in insertion order.
#[derive(Debug, Clone)]
pub struct FlatL2Index {
    dimension: usize,
    data: Vec<f32>,
    len: usize,
}

impl FlatL2Index {
    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Vector dimension (0 for an empty index).
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Stored vector at `position`, if any.
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        if position >= self.len {
            return None;
        }
        let start = position * self.dimension;
        Some(&self.data[start..start + self.dimension])
    }

    /// Return the `k` nearest stored vectors, closest first.
    ///
    /// Equal distances are ordered by position. Asking for more neighbors
    /// than are stored returns every vector.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(PagewiseError::Index(format!(
                "query dimension {} does not match index dimension {}",
                query.len(),
                self.dimension
            )));
        }

        let mut hits: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, stored)| Neighbor {
                position,
                distance: squared_l2(query, stored),
            })
            .collect();

        let k = k.min(hits.len());
        if k < hits.len() {
            hits.select_nth_unstable_by(k - 1, compare_neighbors);
            hits.truncate(k);
        }
        hits.sort_by(compare_neighbors);

        Ok(hits)
    }
}

fn compare_neighbors(a: &Neighbor, b: &Neighbor) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then(a.position.cmp(&b.position))
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(vectors: &[&[f32]]) -> FlatL2Index {
        let mut builder = IndexBuilder::new();
        for v in vectors {
            builder.add(v).unwrap();
        }
        builder.finish()
    }

    #[test]
    fn search_orders_by_distance() {
        let index = build(&[&[0.0, 0.0], &[3.0, 4.0], &[1.0, 0.0], &[0.0, 2.0]]);
        let hits = index.search(&[0.0, 0.0], 3).unwrap();

        let positions: Vec<usize> = hits.iter().map(|h| h.position).collect();
        assert_eq!(positions, vec![0, 2, 3]);
        assert_eq!(hits[0].distance, 0.0);
        assert_eq!(hits[1].distance, 1.0);
        assert_eq!(hits[2].distance, 4.0);
    }

    #[test]
    fn ties_break_by_position() {
        let index = build(&[&[1.0, 0.0], &[0.0, 1.0], &[-1.0, 0.0], &[0.0, -1.0]]);
        let hits = index.search(&[0.0, 0.0], 2).unwrap();
        let positions: Vec<usize> = hits.iter().map(|h| h.position).collect();
        assert_eq!(positions, vec![0, 1]);
    }

    #[test]
    fn k_larger_than_len_returns_all() {
        let index = build(&[&[1.0], &[2.0]]);
        let hits = index.search(&[2.0], 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].position, 1);
    }

    #[test]
    fn empty_index_is_queryable() {
        let index = IndexBuilder::new().finish();
        assert!(index.is_empty());
        assert_eq!(index.dimension(), 0);
        assert!(index.search(&[1.0, 2.0], 3).unwrap().is_empty());
    }

    #[test]
    fn dimension_mismatch_rejected() {
        let mut builder = IndexBuilder::with_dimension(2, 2);
        builder.add(&[1.0, 2.0]).unwrap();
        let err = builder.add(&[1.0]).unwrap_err();
        assert!(err.to_string().contains("expected 2, got 1"));

        let index = build(&[&[1.0, 2.0]]);
        assert!(index.search(&[1.0, 2.0, 3.0], 1).is_err());
    }

    #[test]
    fn non_finite_rejected() {
        let mut builder = IndexBuilder::new();
        assert!(builder.add(&[f32::NAN, 1.0]).is_err());
        assert!(builder.add(&[]).is_err());
    }

    #[test]
    fn vector_lookup() {
        let index = build(&[&[1.0, 2.0], &[3.0, 4.0]]);
        assert_eq!(index.vector(1), Some(&[3.0, 4.0][..]));
        assert_eq!(index.vector(2), None);
    }
}
