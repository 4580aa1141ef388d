// HTTP 协议实现

pub mod chunk;
pub mod fetcher;
pub mod manager;
pub mod request;
pub mod types;
mod worker;

pub use chunk::{range_mode, split_chunks, Chunk};
pub use fetcher::HttpFetcher;
pub use manager::HttpFetcherManager;
pub use types::{HttpStats, OptsExtra, ReqExtra, RequestError};
