//! WORDNEAR - Nearest-Neighbor Word Lookup
//!
//! Loads a pretrained word-embedding table and answers exact top-k
//! cosine-distance queries against it, with a 2D projection of the
//! neighborhood for plotting.
//!
//! ```
//! use wordnear::{EmbeddingStore, SimilarityRanker};
//!
//! let store = EmbeddingStore::build(vec![
//!     ("a", vec![1.0, 0.0]),
//!     ("b", vec![0.0, 1.0]),
//!     ("c", vec![1.0, 1.0]),
//! ])?;
//!
//! let result = SimilarityRanker::default().nearest(&store, &[1.0, 0.0], 2)?;
//! assert_eq!(result.tokens().collect::<Vec<_>>(), vec!["a", "c"]);
//! # Ok::<(), wordnear::EmbeddingError>(())
//! ```

pub mod error;
pub mod loader;
pub mod metrics;
pub mod projection;
pub mod service;
pub mod vector;

pub use error::{EmbeddingError, Result};
pub use loader::{load_path, LoaderConfig};
pub use metrics::Metrics;
pub use projection::{project_2d, project_neighbors, Point2D, ProjectionConfig};
pub use service::QueryService;
pub use vector::{
    nearest, DuplicatePolicy, EmbeddingStore, Neighbor, RankerConfig, SimilarityRanker,
    SimilarityResult, StoreBuilder, ZeroVectorPolicy,
};
