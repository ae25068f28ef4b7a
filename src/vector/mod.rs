//! Vector Module
//!
//! Embedding storage and exact nearest-neighbor ranking.

mod embedding_store;
mod ranker;
mod similarity;

pub use embedding_store::{DuplicatePolicy, EmbeddingEntry, EmbeddingStore, StoreBuilder};
pub use ranker::{
    nearest, Neighbor, RankerConfig, SimilarityRanker, SimilarityResult, ZeroVectorPolicy,
    MAX_COSINE_DISTANCE,
};
pub use similarity::{
    cosine_distance, cosine_distance_from_parts, cosine_similarity, cosine_similarity_from_parts,
    dot_product, normalize_vector, VectorOps,
};
