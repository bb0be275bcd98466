//! 多数据源影视聚合搜索
//!
//! 并发查询多个苹果 CMS 风格的资源站接口，合并、排序、过滤结果，
//! 并解析详情中的剧集播放列表。

pub mod aggregator;
pub mod cache;
pub mod client;
pub mod config;
pub mod detail;
pub mod error;
pub mod filter;
pub mod http_client;
pub mod play_url;
pub mod player;
pub mod server;
pub mod types;

#[cfg(test)]
mod testing;

pub use aggregator::{SearchAggregator, SearchOptions, SearchOutcome, SearchSession};
pub use config::{ConfigRegistry, Settings};
pub use detail::DetailFetcher;
pub use error::AppError;
pub use types::{DetailRecord, Episode, EpisodeList, SearchResultItem, SourceDescriptor};
