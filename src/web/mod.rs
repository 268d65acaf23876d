//! Web 边界：搜索（SearxNG）与抓取（HTTP + html2text），以及内存替身

pub mod fetch;
pub mod search;
pub mod stub;

pub use fetch::{extract_title, Document, FetchService, HttpFetcher};
pub use search::{SearchOptions, SearchResponse, SearchResult, SearchService, SearxngClient};
pub use stub::{StaticFetch, StaticSearch};
