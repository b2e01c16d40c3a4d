pub mod embedding;
pub mod ensemble;
pub mod matcher;

pub use embedding::{BasicEmbeddingProvider, EmbeddingProvider, NullEmbeddingProvider};
pub use ensemble::{ConfidenceLevel, EnsembleMatcher, EnsembleMatcherConfig, EnsembleResult, PATTERN_BOOST};
pub use matcher::MatcherResult;
