//! 多源聚合搜索
//! 并发请求所有选中的数据源，按总页数扩展分页，在全局超时内合并、排序、过滤

use futures::stream::{FuturesUnordered, StreamExt};
use icu_collator::options::CollatorOptions;
use icu_collator::{Collator, CollatorBorrowed};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::{AbortHandle, JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::client::SourceClient;
use crate::config::{ConfigRegistry, Settings};
use crate::error::AppError;
use crate::filter;
use crate::types::{SearchResultItem, SourceDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    /// 每个数据源最多获取的页数 (含第一页)
    pub max_pages: u32,
    /// 整个扇出 (含分页扩展) 的总时限
    pub global_timeout: Duration,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for SearchOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            max_pages: settings.max_pages.max(1),
            global_timeout: settings.search_timeout,
        }
    }
}

/// 单个数据源的贡献情况
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceOutcome {
    pub source_id: String,
    pub source_name: String,
    pub pages: u32,
    pub count: usize,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    pub items: Vec<SearchResultItem>,
    pub sources: Vec<SourceOutcome>,
    pub timed_out: bool,
}

/// 按页号收集的结果，超时后已到达的页仍然有效
#[derive(Debug, Default)]
struct SourceSlot {
    pages: BTreeMap<u32, Vec<SearchResultItem>>,
    completed: bool,
}

type SharedSlot = Arc<Mutex<SourceSlot>>;

fn lock(slot: &SharedSlot) -> MutexGuard<'_, SourceSlot> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct SearchAggregator {
    registry: Arc<ConfigRegistry>,
    client: Arc<SourceClient>,
    options: SearchOptions,
}

impl SearchAggregator {
    pub fn new(registry: Arc<ConfigRegistry>, client: Arc<SourceClient>, options: SearchOptions) -> Self {
        Self {
            registry,
            client,
            options,
        }
    }

    pub fn registry(&self) -> &ConfigRegistry {
        &self.registry
    }

    pub async fn search(
        &self,
        query: &str,
        source_ids: &[String],
        filter_adult: bool,
    ) -> Result<Vec<SearchResultItem>, AppError> {
        Ok(self.search_detailed(query, source_ids, filter_adult).await?.items)
    }

    pub async fn search_detailed(
        &self,
        query: &str,
        source_ids: &[String],
        filter_adult: bool,
    ) -> Result<SearchOutcome, AppError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::InvalidArgument("搜索关键词不能为空".to_string()));
        }
        if source_ids.is_empty() {
            return Err(AppError::InvalidArgument("请至少选择一个数据源".to_string()));
        }

        let sources = self.resolve_sources(source_ids);
        info!("开始搜索: {}, 共 {} 个数据源", query, sources.len());

        let slots: Vec<SharedSlot> = sources.iter().map(|_| SharedSlot::default()).collect();
        let mut tasks = JoinSet::new();
        for (source, slot) in sources.iter().zip(&slots) {
            tasks.spawn(collect_source(
                self.client.clone(),
                source.clone(),
                query.to_string(),
                self.options.max_pages,
                slot.clone(),
            ));
        }

        let drained = tokio::time::timeout(self.options.global_timeout, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    warn!("数据源任务异常退出: {}", e);
                }
            }
        })
        .await;

        let timed_out = drained.is_err();
        if timed_out {
            warn!("搜索 {} 超过 {:?}，未响应的数据源按空结果处理", query, self.options.global_timeout);
            tasks.abort_all();
        }

        let mut items = Vec::new();
        let mut outcomes = Vec::with_capacity(sources.len());
        for (source, slot) in sources.iter().zip(&slots) {
            let slot = lock(slot);
            let before = items.len();
            for page in slot.pages.values() {
                items.extend(page.iter().cloned());
            }
            outcomes.push(SourceOutcome {
                source_id: source.id.clone(),
                source_name: source.name.clone(),
                pages: slot.pages.len() as u32,
                count: items.len() - before,
                completed: slot.completed,
            });
        }

        sort_items(&mut items);
        if filter_adult {
            filter::retain_allowed(&mut items);
        }

        info!("搜索完成: {}, {} 个结果", query, items.len());
        Ok(SearchOutcome {
            items,
            sources: outcomes,
            timed_out,
        })
    }

    /// 去重并解析，找不到的 id 直接跳过
    fn resolve_sources(&self, source_ids: &[String]) -> Vec<SourceDescriptor> {
        let mut seen = HashSet::new();
        source_ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .filter_map(|id| {
                let resolved = self.registry.resolve(id);
                if resolved.is_none() {
                    debug!("跳过未知数据源: {}", id);
                }
                resolved
            })
            .collect()
    }
}

/// 先取第一页，再并发获取其余页 (不超过 `max_pages`)，每页到达即写入
async fn collect_source(
    client: Arc<SourceClient>,
    source: SourceDescriptor,
    query: String,
    max_pages: u32,
    slot: SharedSlot,
) {
    let first = client.search(&source, &query, 1).await;
    let total = first.page_count.min(max_pages);
    lock(&slot).pages.insert(1, first.items);

    if total > 1 {
        let (client, source, query) = (&client, &source, query.as_str());
        let mut pending: FuturesUnordered<_> = (2..=total)
            .map(|page| async move { (page, client.search(source, query, page).await) })
            .collect();

        while let Some((page, result)) = pending.next().await {
            lock(&slot).pages.insert(page, result.items);
        }
    }

    lock(&slot).completed = true;
}

/// 先按标题、再按数据源名称排序；稳定排序，其余并列保持合并顺序
pub fn sort_items(items: &mut [SearchResultItem]) {
    items.sort_by(|a, b| {
        locale_compare(&a.title, &b.title).then_with(|| locale_compare(&a.source_name, &b.source_name))
    });
}

static COLLATOR: Lazy<Option<CollatorBorrowed<'static>>> = Lazy::new(|| {
    Collator::try_new(Default::default(), CollatorOptions::default())
        .map_err(|e| warn!("排序规则加载失败，退回忽略大小写比较: {}", e))
        .ok()
});

/// 本地化比较 (Unicode 排序规则，小写在前、重音字母跟随基本字母)；完全相同时再比较原文
pub fn locale_compare(a: &str, b: &str) -> Ordering {
    let collated = match COLLATOR.as_ref() {
        Some(collator) => collator.compare(a, b),
        None => a
            .chars()
            .flat_map(char::to_lowercase)
            .cmp(b.chars().flat_map(char::to_lowercase)),
    };
    collated.then_with(|| a.cmp(b))
}

type SearchHandle = JoinHandle<Result<Vec<SearchResultItem>, AppError>>;

/// 调用方的“最新查询”跟踪: 新查询开始时中止上一个，过期查询的结果不返回
pub struct SearchSession {
    aggregator: Arc<SearchAggregator>,
    generation: AtomicU64,
    inflight: Mutex<Option<AbortHandle>>,
}

impl SearchSession {
    pub fn new(aggregator: Arc<SearchAggregator>) -> Self {
        Self {
            aggregator,
            generation: AtomicU64::new(0),
            inflight: Mutex::new(None),
        }
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(AtomicOrdering::SeqCst)
    }

    /// `Ok(None)` 表示本次查询已被更新的查询取代
    pub async fn search(
        &self,
        query: &str,
        source_ids: &[String],
        filter_adult: bool,
    ) -> Result<Option<Vec<SearchResultItem>>, AppError> {
        let (ticket, handle) = self.begin(query, source_ids, filter_adult);
        self.finish(ticket, handle).await
    }

    /// 取号、启动、替换在途任务必须在同一把锁内完成，否则并发调用会互相中止
    fn begin(&self, query: &str, source_ids: &[String], filter_adult: bool) -> (u64, SearchHandle) {
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        let ticket = self.generation.fetch_add(1, AtomicOrdering::SeqCst) + 1;

        let aggregator = self.aggregator.clone();
        let query = query.to_string();
        let source_ids = source_ids.to_vec();
        let handle = tokio::spawn(async move { aggregator.search(&query, &source_ids, filter_adult).await });

        if let Some(previous) = inflight.replace(handle.abort_handle()) {
            previous.abort();
        }
        (ticket, handle)
    }

    async fn finish(&self, ticket: u64, handle: SearchHandle) -> Result<Option<Vec<SearchResultItem>>, AppError> {
        let result = match handle.await {
            Ok(result) => result?,
            Err(e) if e.is_cancelled() => {
                debug!("查询 #{} 已被取代", ticket);
                return Ok(None);
            }
            Err(e) => return Err(AppError::UpstreamError(format!("搜索任务异常: {}", e))),
        };

        if self.current_generation() != ticket {
            debug!("查询 #{} 已被取代，丢弃结果", ticket);
            return Ok(None);
        }
        Ok(Some(result))
    }
}
