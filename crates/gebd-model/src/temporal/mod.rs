//! Temporal side of the detector: sliding-window aggregation and the
//! group-similarity window encoder.

pub mod aggregator;
pub mod group_similarity;
pub mod sink;
pub mod window;

pub use aggregator::aggregate;
pub use group_similarity::GroupSimilarityEncoder;
pub use sink::{MemorySink, RecordedSimilarity, SafetensorsDirSink, SimilaritySink};
pub use window::{SimilarityWindow, WindowScorer};
