use super::types::{SearchHit, VectorError};

/// Exact (brute force) L2 index.
///
/// Vectors are stored contiguously in build order. Built once and never mutated;
/// per-dataset chunk counts are small enough that a linear scan is the whole search.
#[derive(Debug, Clone)]
pub struct FlatL2Index {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatL2Index {
    /// Build an index over `vectors`; all must share the first vector's dimension
    pub fn build(vectors: &[Vec<f32>]) -> Result<Self, VectorError> {
        let dimension = vectors.first().ok_or(VectorError::Empty)?.len();
        if dimension == 0 {
            return Err(VectorError::ZeroDimension);
        }

        let mut data = Vec::with_capacity(dimension * vectors.len());
        for vector in vectors {
            if vector.len() != dimension {
                return Err(VectorError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            data.extend_from_slice(vector);
        }

        Ok(Self { dimension, data })
    }

    /// Return up to `k` stored vectors nearest to `query`, by ascending distance.
    ///
    /// Ties keep build order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, VectorError> {
        if query.len() != self.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut hits: Vec<SearchHit> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, stored)| SearchHit {
                position,
                distance: squared_l2(stored, query).sqrt(),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.position.cmp(&b.position))
        });
        hits.truncate(k);

        Ok(hits)
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Vec<f32>> {
        vec![
            vec![0.0, 0.0],
            vec![3.0, 4.0],
            vec![1.0, 0.0],
            vec![0.0, 1.0],
        ]
    }

    #[test]
    fn test_build() {
        let index = FlatL2Index::build(&sample()).unwrap();
        assert_eq!(index.len(), 4);
        assert_eq!(index.dimension(), 2);
    }

    #[test]
    fn test_build_rejects_mixed_dimensions() {
        let vectors = vec![vec![0.0, 1.0], vec![1.0, 2.0, 3.0]];
        assert!(matches!(
            FlatL2Index::build(&vectors),
            Err(VectorError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_build_rejects_empty_input() {
        assert!(matches!(FlatL2Index::build(&[]), Err(VectorError::Empty)));
        assert!(matches!(
            FlatL2Index::build(&[vec![]]),
            Err(VectorError::ZeroDimension)
        ));
    }

    #[test]
    fn test_search_orders_by_distance() {
        let index = FlatL2Index::build(&sample()).unwrap();
        let hits = index.search(&[0.1, 0.0], 3).unwrap();

        let positions: Vec<usize> = hits.iter().map(|h| h.position).collect();
        assert_eq!(positions, vec![0, 2, 3]);
        assert!((hits[0].distance - 0.1).abs() < 1e-6);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn test_search_ties_keep_build_order() {
        let index = FlatL2Index::build(&sample()).unwrap();
        let hits = index.search(&[0.0, 0.0], 3).unwrap();
        assert_eq!(hits[1].position, 2);
        assert_eq!(hits[2].position, 3);
        assert_eq!(hits[1].distance, hits[2].distance);
    }

    #[test]
    fn test_search_returns_all_when_k_exceeds_len() {
        let index = FlatL2Index::build(&sample()).unwrap();
        let hits = index.search(&[5.0, 5.0], 10).unwrap();
        assert_eq!(hits.len(), 4);
        assert_eq!(hits[0].position, 1);
        assert!(hits.iter().all(|h| h.position < index.len()));
    }

    #[test]
    fn test_search_rejects_wrong_query_dimension() {
        let index = FlatL2Index::build(&sample()).unwrap();
        assert!(matches!(
            index.search(&[1.0, 2.0, 3.0], 2),
            Err(VectorError::DimensionMismatch { .. })
        ));
    }
}
