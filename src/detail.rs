//! 视频详情与剧集解析

use std::sync::Arc;
use tracing::{debug, warn};

use crate::client::SourceClient;
use crate::config::ConfigRegistry;
use crate::error::AppError;
use crate::play_url;
use crate::types::DetailRecord;

pub struct DetailFetcher {
    registry: Arc<ConfigRegistry>,
    client: Arc<SourceClient>,
}

impl DetailFetcher {
    pub fn new(registry: Arc<ConfigRegistry>, client: Arc<SourceClient>) -> Self {
        Self { registry, client }
    }

    /// 剧集为空是合法结果 (暂无可播放剧集)，不算错误
    pub async fn fetch(&self, source_id: &str, vod_id: &str) -> Result<DetailRecord, AppError> {
        let vod_id = vod_id.trim();
        if vod_id.is_empty() {
            return Err(AppError::InvalidArgument("缺少视频 id".to_string()));
        }

        let source = self
            .registry
            .resolve(source_id)
            .ok_or_else(|| AppError::InvalidSource(format!("数据源 {} 不存在", source_id)))?;

        let mut detail = match self.client.try_fetch_detail(&source, vod_id).await {
            Ok(Some(detail)) => detail,
            Ok(None) => {
                debug!("数据源 {} 没有 {} 的详情", source.id, vod_id);
                return Err(AppError::NotFound("详情数据格式错误或无数据".to_string()));
            }
            Err(e) => {
                warn!("获取视频详情失败 {}/{}: {}", source.id, vod_id, e);
                return Err(e.into());
            }
        };

        detail.episode_groups = play_url::decode(&detail.raw_play_url);
        debug!(
            "详情 {}/{}: {} 组剧集",
            source.id,
            vod_id,
            detail.episode_groups.len()
        );
        Ok(detail)
    }
}
