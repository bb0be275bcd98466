//! HTTP 接口
//! 把搜索、详情、播放参数暴露为 JSON 端点，界面层不在本 crate 内

use axum::extract::{Query, State};
use axum::http::{header, Method};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::aggregator::{SearchAggregator, SearchOptions};
use crate::client::SourceClient;
use crate::config::{ConfigRegistry, Settings};
use crate::detail::DetailFetcher;
use crate::error::AppError;
use crate::http_client::Transport;
use crate::player::PlayerTarget;

#[derive(Clone)]
pub struct AppState {
    registry: Arc<ConfigRegistry>,
    client: Arc<SourceClient>,
    aggregator: Arc<SearchAggregator>,
    detail: Arc<DetailFetcher>,
    adult_filter: bool,
}

impl AppState {
    pub fn new(registry: ConfigRegistry, settings: &Settings, transport: Arc<dyn Transport>) -> Self {
        let registry = Arc::new(registry);
        let client = Arc::new(SourceClient::from_settings(transport, settings));
        let aggregator = Arc::new(SearchAggregator::new(
            registry.clone(),
            client.clone(),
            SearchOptions::from(settings),
        ));
        let detail = Arc::new(DetailFetcher::new(registry.clone(), client.clone()));
        Self {
            registry,
            client,
            aggregator,
            detail,
            adult_filter: settings.adult_filter,
        }
    }

    /// 后台定期清理超过保留期限的缓存条目
    pub fn spawn_cache_purge(&self, every: Duration) -> Option<JoinHandle<()>> {
        self.client.cache()?;
        let client = self.client.clone();
        let every = every.max(Duration::from_secs(1));

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                if let Some(cache) = client.cache() {
                    let purged = cache.purge_stale();
                    if purged > 0 {
                        debug!("清理过期缓存 {} 条", purged);
                    }
                }
            }
        }))
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/sources", get(sources_handler))
        .route("/api/search", get(search_handler))
        .route("/api/detail", get(detail_handler))
        .route("/api/play", get(play_handler))
        .route("/api/cache", get(cache_stats_handler).delete(cache_clear_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub wd: Option<String>,
    /// 逗号分隔的数据源 id，缺省时使用默认选择
    pub sources: Option<String>,
    pub filter: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DetailParams {
    pub source: String,
    pub id: String,
    #[serde(default)]
    pub index: Option<usize>,
}

/// 健康检查
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "sources": state.registry.len(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// GET /api/sources - 数据源列表
async fn sources_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "sources": state.registry.list(),
        "defaultSelection": state.registry.default_selection(),
        "adultSources": state.registry.adult_ids(),
        "adultFilter": state.adult_filter
    }))
}

/// GET /api/search?wd=关键词&sources=a,b&filter=1
async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, AppError> {
    let keyword = params.wd.unwrap_or_default();
    let source_ids: Vec<String> = match params.sources {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        None => state.registry.default_selection(),
    };
    let filter_adult = params
        .filter
        .as_deref()
        .map(parse_flag)
        .unwrap_or(state.adult_filter);

    info!("🔍 搜索: {} (数据源: {})", keyword, source_ids.join(", "));
    let outcome = state
        .aggregator
        .search_detailed(&keyword, &source_ids, filter_adult)
        .await?;
    Ok(Json(outcome))
}

/// GET /api/detail?source=&id=
async fn detail_handler(
    State(state): State<AppState>,
    Query(params): Query<DetailParams>,
) -> Result<impl IntoResponse, AppError> {
    let detail = state.detail.fetch(&params.source, &params.id).await?;
    Ok(Json(detail))
}

/// GET /api/play?source=&id=&index= - 播放器参数
async fn play_handler(
    State(state): State<AppState>,
    Query(params): Query<DetailParams>,
) -> Result<impl IntoResponse, AppError> {
    let detail = state.detail.fetch(&params.source, &params.id).await?;
    let target = PlayerTarget::from_detail(&detail, params.index.unwrap_or(0))?;
    Ok(Json(json!({
        "query": target.to_query_string(),
        "target": target,
    })))
}

async fn cache_stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "cache": state.client.cache().map(|c| c.stats()) }))
}

async fn cache_clear_handler(State(state): State<AppState>) -> impl IntoResponse {
    if let Some(cache) = state.client.cache() {
        cache.clear();
    }
    Json(json!({ "success": true }))
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "on" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{detail_url, search_url};
    use crate::testing::{page_body, record, source, Reply, ScriptedTransport};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    fn app(transport: ScriptedTransport) -> Router {
        let registry = ConfigRegistry::new(vec![source("a", "源A"), source("b", "源B")], Vec::new());
        router(AppState::new(registry, &Settings::default(), Arc::new(transport)))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_search_endpoint() {
        let transport = ScriptedTransport::new()
            .on(
                search_url(&source("a", "源A"), "无间道", 1).unwrap(),
                Reply::ok(page_body(vec![record("1", "无间道", "剧情片"), record("2", "福利合集", "福利片")], 1)),
            )
            .on(
                search_url(&source("b", "源B"), "无间道", 1).unwrap(),
                Reply::ok(page_body(vec![record("9", "无间道", "剧情片")], 1)),
            );

        let uri = format!("/api/search?wd={}&sources=a,b", urlencoding::encode("无间道"));
        let (status, body) = get_json(app(transport), &uri).await;
        assert_eq!(status, StatusCode::OK);
        let items = body["items"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["sourceName"], "源A");
        assert_eq!(items[1]["sourceName"], "源B");
        assert_eq!(body["timedOut"], false);
    }

    #[tokio::test]
    async fn test_search_requires_keyword() {
        let (status, body) = get_json(app(ScriptedTransport::new()), "/api/search?sources=a").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_argument");
        assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()));

        let (status, _) = get_json(app(ScriptedTransport::new()), "/api/search?wd=x&sources=,").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_detail_and_play_endpoints() {
        let body = serde_json::json!({
            "list": [{ "vod_id": "7", "vod_name": "无间道", "vod_play_url": "第1集$http://a/1#第2集$http://a/2" }]
        })
        .to_string();
        let url = detail_url(&source("a", "源A"), "7").unwrap();

        let (status, detail) = get_json(
            app(ScriptedTransport::new().on(url.clone(), Reply::ok(body.clone()))),
            "/api/detail?source=a&id=7",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(detail["episodeGroups"][0].as_array().unwrap().len(), 2);

        let (status, play) = get_json(
            app(ScriptedTransport::new().on(url, Reply::ok(body))),
            "/api/play?source=a&id=7&index=1",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(play["target"]["url"], "http://a/2");
        assert!(play["query"].as_str().unwrap().contains("index=1"));
    }

    #[tokio::test]
    async fn test_detail_errors() {
        let (status, body) = get_json(app(ScriptedTransport::new()), "/api/detail?source=zz&id=1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_source");

        let url = detail_url(&source("a", "源A"), "1").unwrap();
        let (status, body) = get_json(
            app(ScriptedTransport::new().on(url, Reply::ok(r#"{"list":[]}"#))),
            "/api/detail?source=a&id=1",
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn test_sources_and_cache_endpoints() {
        let mut adult = source("x", "某成人源");
        adult.is_adult = true;
        let registry = ConfigRegistry::new(vec![source("a", "源A"), adult], Vec::new());
        let app = router(AppState::new(registry, &Settings::default(), Arc::new(ScriptedTransport::new())));

        let (status, body) = get_json(app.clone(), "/api/sources").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sources"].as_array().unwrap().len(), 2);
        assert_eq!(body["sources"][0]["id"], "a");
        assert_eq!(body["adultSources"], serde_json::json!(["x"]));
        assert_eq!(body["adultFilter"], true);

        let (_, body) = get_json(app, "/api/cache").await;
        assert_eq!(body["cache"]["size"], 0);
        assert_eq!(body["cache"]["ttl_secs"], 300);
        assert_eq!(body["cache"]["capacity"], 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_cache_purge() {
        let registry = ConfigRegistry::new(vec![source("a", "源A")], Vec::new());
        let state = AppState::new(registry, &Settings::default(), Arc::new(ScriptedTransport::new()));
        let purge = state.spawn_cache_purge(Duration::from_secs(300)).unwrap();

        let cache = state.client.cache().unwrap();
        cache.put("https://a.example.com/api.php/provide/vod?wd=x", "{}");
        tokio::time::advance(Duration::from_secs(300)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(cache.stats().size, 1);

        tokio::time::advance(Duration::from_secs(3600)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(cache.stats().size, 0);
        purge.abort();
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("1"));
        assert!(parse_flag("TRUE"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("off"));
    }
}
