pub mod executor;
pub mod results;

pub use executor::SearchQueryService;
pub use results::{FileGridRow, FileGridSearchResult, HighlightSpan, PageResult, SearchHit, Snippet, SortMetadata};
