pub mod scorer;

pub use scorer::{bm25_relevance, normalize_relevance, trigram_overlap};
