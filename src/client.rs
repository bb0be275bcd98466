//! 单个数据源的请求
//! 失败一律在这里吞掉：搜索返回空列表，详情返回 None

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::ResponseCache;
use crate::config::Settings;
use crate::http_client::{HttpClientError, Transport};
use crate::types::{DetailPath, DetailRecord, SearchResultItem, SourceDescriptor, UpstreamPage};

pub const API_PATH: &str = "/api.php/provide/vod";
pub const DETAIL_PAGE_PATH: &str = "/index.php/vod/detail/id/";

/// 重试策略: 最多 `max_attempts` 次，第 n 次失败后等待 `backoff * n`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }
}

/// 一页搜索结果及上游报告的总页数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourcePage {
    pub items: Vec<SearchResultItem>,
    pub page_count: u32,
}

pub struct SourceClient {
    transport: Arc<dyn Transport>,
    cache: Option<Arc<ResponseCache>>,
    search_timeout: Duration,
    detail_timeout: Duration,
    retry: RetryPolicy,
}

impl SourceClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let defaults = Settings::default();
        Self {
            transport,
            cache: None,
            search_timeout: defaults.source_timeout,
            detail_timeout: defaults.detail_timeout,
            retry: defaults.retry,
        }
    }

    pub fn from_settings(transport: Arc<dyn Transport>, settings: &Settings) -> Self {
        Self::new(transport)
            .with_timeouts(settings.source_timeout, settings.detail_timeout)
            .with_retry(settings.retry)
            .with_cache(Arc::new(
                ResponseCache::new(settings.cache_ttl).with_capacity(settings.cache_capacity),
            ))
    }

    pub fn with_timeouts(mut self, search: Duration, detail: Duration) -> Self {
        self.search_timeout = search;
        self.detail_timeout = detail;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_deref()
    }

    /// 搜索一页，任何失败都返回空页
    pub async fn search(&self, source: &SourceDescriptor, query: &str, page: u32) -> SourcePage {
        match self.try_search(source, query, page).await {
            Ok(result) => {
                debug!("数据源 {} 第 {} 页: {} 个结果", source.id, page, result.items.len());
                result
            }
            Err(e) => {
                warn!("数据源 {} ({}) 第 {} 页搜索失败: {}", source.name, source.id, page, e);
                SourcePage::default()
            }
        }
    }

    pub async fn try_search(
        &self,
        source: &SourceDescriptor,
        query: &str,
        page: u32,
    ) -> Result<SourcePage, HttpClientError> {
        let url = search_url(source, query, page)?;
        let upstream = self
            .fetch_page(&url, self.search_timeout, &self.retry)
            .await?;

        let items = upstream
            .list
            .iter()
            .filter_map(|r| SearchResultItem::from_record(r, source))
            .collect();

        Ok(SourcePage {
            items,
            page_count: upstream.page_count,
        })
    }

    /// 获取详情，列表为空或请求失败时返回 None
    pub async fn fetch_detail(&self, source: &SourceDescriptor, vod_id: &str) -> Option<DetailRecord> {
        match self.try_fetch_detail(source, vod_id).await {
            Ok(detail) => detail,
            Err(e) => {
                warn!("数据源 {} 获取详情 {} 失败: {}", source.id, vod_id, e);
                None
            }
        }
    }

    /// 与 `fetch_detail` 相同，但保留失败原因；`Ok(None)` 表示上游没有该条目
    pub async fn try_fetch_detail(
        &self,
        source: &SourceDescriptor,
        vod_id: &str,
    ) -> Result<Option<DetailRecord>, HttpClientError> {
        let url = detail_url(source, vod_id)?;
        let upstream = self
            .fetch_page(&url, self.detail_timeout, &RetryPolicy::none())
            .await?;

        Ok(upstream
            .list
            .first()
            .and_then(|r| DetailRecord::from_record(r, source)))
    }

    /// 读缓存 -> 按策略请求 -> 校验 -> 写缓存；最终失败时回退到过期缓存
    async fn fetch_page(
        &self,
        url: &str,
        timeout: Duration,
        policy: &RetryPolicy,
    ) -> Result<UpstreamPage, HttpClientError> {
        if let Some(page) = self
            .cache
            .as_ref()
            .and_then(|c| c.get_fresh(url))
            .and_then(|body| UpstreamPage::parse(&body).ok())
        {
            debug!("缓存命中: {}", url);
            return Ok(page);
        }

        let error = match self.fetch_with_retry(url, timeout, policy).await {
            Ok(page) => return Ok(page),
            Err(e) => e,
        };

        if let Some(page) = self
            .cache
            .as_ref()
            .and_then(|c| c.get_any(url))
            .and_then(|body| UpstreamPage::parse(&body).ok())
        {
            warn!("请求失败 ({})，使用过期缓存: {}", error, url);
            return Ok(page);
        }

        Err(error)
    }

    async fn fetch_with_retry(
        &self,
        url: &str,
        timeout: Duration,
        policy: &RetryPolicy,
    ) -> Result<UpstreamPage, HttpClientError> {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let result = self
                .transport
                .get_text(url, timeout)
                .await
                .and_then(|body| UpstreamPage::parse(&body).map(|page| (body, page)));

            match result {
                Ok((body, page)) => {
                    if let Some(cache) = &self.cache {
                        cache.put(url, &body);
                    }
                    return Ok(page);
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = policy.delay_for(attempt);
                    debug!("第 {} 次请求失败 ({})，{:?} 后重试: {}", attempt, e, delay, url);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// `{base}/api.php/provide/vod?ac=videolist&wd={query}[&pg={page}]`
pub fn search_url(source: &SourceDescriptor, query: &str, page: u32) -> Result<String, HttpClientError> {
    let mut url = parse_base(&source.base_url, API_PATH)?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("ac", "videolist").append_pair("wd", query);
        if page > 1 {
            pairs.append_pair("pg", &page.to_string());
        }
    }
    Ok(url.to_string())
}

/// 按数据源配置的路径风格构造详情地址
pub fn detail_url(source: &SourceDescriptor, vod_id: &str) -> Result<String, HttpClientError> {
    let base = source.detail_base();
    match source.detail_path {
        DetailPath::Provide => {
            let mut url = parse_base(base, API_PATH)?;
            url.query_pairs_mut()
                .append_pair("ac", "videolist")
                .append_pair("ids", vod_id);
            Ok(url.to_string())
        }
        DetailPath::VodDetailPage => {
            let path = format!("{}{}.html", DETAIL_PAGE_PATH, urlencoding::encode(vod_id));
            Ok(parse_base(base, &path)?.to_string())
        }
    }
}

fn parse_base(base: &str, path: &str) -> Result<url::Url, HttpClientError> {
    let raw = format!("{}{}", base.trim().trim_end_matches('/'), path);
    url::Url::parse(&raw).map_err(|e| HttpClientError::Malformed(format!("无效的接口地址 {}: {}", base, e)))
}
