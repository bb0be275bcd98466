//! 数据模型
//! 上游 JSON 字段不固定，先以 `VodRecord` 宽松读取，再在 client 边界收窄为强类型

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::http_client::HttpClientError;

/// 详情接口的路径风格
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailPath {
    /// `/api.php/provide/vod?ac=videolist&ids={id}`
    #[default]
    Provide,
    /// `/index.php/vod/detail/id/{id}.html`
    VodDetailPage,
}

/// 一个已配置的数据源
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDescriptor {
    pub id: String,
    pub name: String,
    pub base_url: String,
    pub is_adult: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail_base_url: Option<String>,
    #[serde(default)]
    pub detail_path: DetailPath,
}

impl SourceDescriptor {
    /// 详情请求使用的基础地址，未单独配置时回落到 `base_url`
    pub fn detail_base(&self) -> &str {
        self.detail_base_url
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&self.base_url)
    }
}

/// 搜索结果条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultItem {
    pub vod_id: String,
    pub title: String,
    pub type_name: String,
    pub year: String,
    pub remark_text: String,
    pub poster_url: String,
    pub source_id: String,
    pub source_name: String,
    pub api_base_url: String,
}

impl SearchResultItem {
    /// 从上游记录收窄，缺少 id 或名称的记录直接丢弃
    pub fn from_record(record: &VodRecord, source: &SourceDescriptor) -> Option<Self> {
        let vod_id = record.text("vod_id");
        let title = record.text("vod_name");
        if vod_id.is_empty() || title.is_empty() {
            return None;
        }

        Some(Self {
            vod_id,
            title,
            type_name: record.text("type_name"),
            year: record.text("vod_year"),
            remark_text: record.text("vod_remarks"),
            poster_url: record.text("vod_pic"),
            source_id: source.id.clone(),
            source_name: source.name.clone(),
            api_base_url: source.base_url.clone(),
        })
    }
}

/// 单集
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub label: String,
    pub url: String,
}

/// 一组剧集，顺序即上游顺序
pub type EpisodeList = Vec<Episode>;

/// 视频详情
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailRecord {
    pub vod_id: String,
    pub title: String,
    pub type_name: String,
    pub year: String,
    pub region: String,
    pub language: String,
    pub director: String,
    pub actor: String,
    pub description: String,
    pub poster_url: String,
    pub source_id: String,
    pub source_name: String,
    /// 多组剧集 (线路)，只有第一组用于播放选择
    pub episode_groups: Vec<EpisodeList>,
    /// 未解析的 `vod_play_url` 原文
    #[serde(skip)]
    pub raw_play_url: String,
}

impl DetailRecord {
    pub fn from_record(record: &VodRecord, source: &SourceDescriptor) -> Option<Self> {
        let vod_id = record.text("vod_id");
        if vod_id.is_empty() {
            return None;
        }

        Some(Self {
            vod_id,
            title: record.text("vod_name"),
            type_name: record.text("type_name"),
            year: record.text("vod_year"),
            region: record.text("vod_area"),
            language: record.text("vod_lang"),
            director: record.text("vod_director"),
            actor: record.text("vod_actor"),
            description: record.text("vod_content"),
            poster_url: record.text("vod_pic"),
            source_id: source.id.clone(),
            source_name: source.name.clone(),
            episode_groups: Vec::new(),
            raw_play_url: record.text("vod_play_url"),
        })
    }

    /// 第一组剧集，无剧集时为空
    pub fn primary_episodes(&self) -> &[Episode] {
        self.episode_groups.first().map(Vec::as_slice).unwrap_or(&[])
    }
}

/// 上游单条记录
#[derive(Debug, Clone, Default)]
pub struct VodRecord(Map<String, Value>);

impl VodRecord {
    /// 读取字段为字符串；数字字段 (常见于 `vod_id`) 转成文本，缺失或 null 为空串
    pub fn text(&self, key: &str) -> String {
        match self.0.get(key) {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => String::new(),
        }
    }
}

impl From<Map<String, Value>> for VodRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// 上游列表响应 `{ code, list, pagecount }`
#[derive(Debug, Clone, Default)]
pub struct UpstreamPage {
    pub code: Option<i64>,
    pub list: Vec<VodRecord>,
    pub page_count: u32,
}

impl UpstreamPage {
    /// 只要 `list` 存在且为数组即视为有效；顶层直接是数组的响应也接受
    pub fn parse(body: &str) -> Result<Self, HttpClientError> {
        let value: Value = serde_json::from_str(body.trim_start_matches('\u{feff}'))
            .map_err(|e| HttpClientError::Malformed(format!("JSON 解析失败: {}", e)))?;

        let (code, list, page_count) = match value {
            Value::Object(mut obj) => {
                let list = match obj.remove("list") {
                    Some(Value::Array(list)) => list,
                    _ => return Err(HttpClientError::Malformed("缺少 list 数组".to_string())),
                };
                let code = obj.get("code").and_then(as_i64);
                let page_count = obj
                    .get("pagecount")
                    .and_then(as_i64)
                    .filter(|n| *n > 0)
                    .map(|n| n.min(u32::MAX as i64) as u32)
                    .unwrap_or(1);
                (code, list, page_count)
            }
            Value::Array(list) => (None, list, 1),
            _ => return Err(HttpClientError::Malformed("响应不是 JSON 对象".to_string())),
        };

        let list = list
            .into_iter()
            .filter_map(|v| match v {
                Value::Object(map) => Some(VodRecord::from(map)),
                _ => None,
            })
            .collect();

        Ok(Self {
            code,
            list,
            page_count,
        })
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
