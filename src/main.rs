use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use vod_search::config::{ConfigRegistry, Settings};
use vod_search::http_client::HttpTransport;
use vod_search::server::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志，RUST_LOG 可覆盖默认级别
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let settings = Settings::from_env();
    let registry = ConfigRegistry::load(&settings.sources_file)
        .with_context(|| format!("加载数据源配置失败: {}", settings.sources_file.display()))?;
    let source_count = registry.len();

    if let Some(proxy) = &settings.proxy_url {
        info!("🔀 通过代理请求数据源: {}", proxy);
    }
    let transport = Arc::new(HttpTransport::new(settings.proxy_url.clone()));
    let state = AppState::new(registry, &settings, transport);
    state.spawn_cache_purge(settings.cache_ttl);
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    info!("🚀 影视聚合搜索 API 启动在 http://{}", addr);
    info!("📚 已加载 {} 个数据源", source_count);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("无法监听 {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}
