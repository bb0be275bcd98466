//! 播放器交接参数
//! 以查询字符串的形式交给外部播放器，本模块不关心播放器本身

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::form_urlencoded;

use crate::error::AppError;
use crate::types::{DetailRecord, EpisodeList};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerTarget {
    pub url: String,
    pub title: String,
    pub source_id: String,
    pub episode_index: usize,
    pub vod_id: String,
    pub episodes: EpisodeList,
}

impl PlayerTarget {
    /// 从详情的第一组剧集中选取第 `index` 集
    pub fn from_detail(detail: &DetailRecord, index: usize) -> Result<Self, AppError> {
        let episodes = detail.primary_episodes();
        if episodes.is_empty() {
            return Err(AppError::NotFound("暂无可播放的剧集".to_string()));
        }
        let episode = episodes.get(index).ok_or_else(|| {
            AppError::InvalidArgument(format!("剧集序号 {} 超出范围 (共 {} 集)", index, episodes.len()))
        })?;

        Ok(Self {
            url: episode.url.clone(),
            title: detail.title.clone(),
            source_id: detail.source_id.clone(),
            episode_index: index,
            vod_id: detail.vod_id.clone(),
            episodes: episodes.to_vec(),
        })
    }

    /// `url=..&title=..&source=..&index=..&id=..&episodes=<json>`
    pub fn to_query_string(&self) -> String {
        let episodes = serde_json::to_string(&self.episodes).unwrap_or_else(|_| "[]".to_string());
        form_urlencoded::Serializer::new(String::new())
            .append_pair("url", &self.url)
            .append_pair("title", &self.title)
            .append_pair("source", &self.source_id)
            .append_pair("index", &self.episode_index.to_string())
            .append_pair("id", &self.vod_id)
            .append_pair("episodes", &episodes)
            .finish()
    }

    pub fn from_query_string(query: &str) -> Result<Self, AppError> {
        let params: HashMap<String, String> = form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
            .into_owned()
            .collect();
        let get = |key: &str| params.get(key).cloned().unwrap_or_default();

        let url = get("url");
        if url.is_empty() {
            return Err(AppError::InvalidArgument("缺少播放地址".to_string()));
        }
        let episode_index = match params.get("index") {
            Some(i) => i
                .parse()
                .map_err(|_| AppError::InvalidArgument(format!("无效的剧集序号: {}", i)))?,
            None => 0,
        };
        let episodes = match params.get("episodes") {
            Some(raw) if !raw.is_empty() => serde_json::from_str(raw)
                .map_err(|e| AppError::InvalidArgument(format!("无效的剧集列表: {}", e)))?,
            _ => Vec::new(),
        };

        Ok(Self {
            url,
            title: get("title"),
            source_id: get("source"),
            episode_index,
            vod_id: get("id"),
            episodes,
        })
    }
}
