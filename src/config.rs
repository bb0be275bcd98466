//! 数据源注册表与运行参数
//! 数据源从 JSON 文件加载一次，之后作为只读值注入各组件

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::client::RetryPolicy;
use crate::types::{DetailPath, SourceDescriptor};

/// 默认数据源文件
const SOURCES_FILE: &str = "sources.json";

const CUSTOM_PREFIX: &str = "custom_";

/// 首次使用时默认选中的数据源
const DEFAULT_SELECTION: [&str; 4] = ["tyyszy", "dyttzy", "bfzy", "ruyi"];

/// 内置数据源: (id, 名称, 接口地址)
const BUILTIN_SOURCES: [(&str, &str, &str); 8] = [
    ("bfzy", "暴风资源", "https://bfzyapi.com"),
    ("dyttzy", "电影天堂资源", "http://caiji.dyttzyapi.com"),
    ("ffzy", "非凡影视", "http://ffzy5.tv"),
    ("heimuer", "黑木耳", "https://json.heimuer.xyz"),
    ("ruyi", "如意资源", "https://cj.rycjapi.com"),
    ("tyyszy", "天涯资源", "https://tyyszy.com"),
    ("wolong", "卧龙资源", "https://wolongzyw.com"),
    ("zy360", "360资源", "https://360zy.com"),
];

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuiltinEntry {
    name: String,
    api: String,
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    adult: bool,
    #[serde(default)]
    detail_path: DetailPath,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomEntry {
    name: String,
    url: String,
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    is_adult: bool,
    #[serde(default)]
    detail_path: DetailPath,
}

#[derive(Debug, Default, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    builtin: Option<BTreeMap<String, BuiltinEntry>>,
    #[serde(default)]
    custom: Vec<CustomEntry>,
}

/// 内置 + 用户自定义数据源
#[derive(Debug, Clone, Default)]
pub struct ConfigRegistry {
    builtin: BTreeMap<String, SourceDescriptor>,
    custom: Vec<SourceDescriptor>,
}

impl ConfigRegistry {
    pub fn new(builtin: Vec<SourceDescriptor>, custom: Vec<SourceDescriptor>) -> Self {
        let builtin = builtin.into_iter().map(|s| (s.id.clone(), s)).collect();
        let custom = custom
            .into_iter()
            .enumerate()
            .map(|(index, mut s)| {
                s.id = format!("{}{}", CUSTOM_PREFIX, index);
                s
            })
            .collect();
        Self { builtin, custom }
    }

    /// 编译期内置的数据源目录
    pub fn builtin() -> Self {
        let builtin = BUILTIN_SOURCES
            .iter()
            .map(|(id, name, api)| SourceDescriptor {
                id: id.to_string(),
                name: name.to_string(),
                base_url: api.to_string(),
                is_adult: false,
                detail_base_url: None,
                detail_path: DetailPath::Provide,
            })
            .collect();
        Self::new(builtin, Vec::new())
    }

    /// 从文件加载；文件不存在时使用内置目录，文件中未给出 builtin 时同样沿用内置目录
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            warn!("数据源文件 {} 不存在，使用内置数据源", path.display());
            return Ok(Self::builtin());
        }

        let content = std::fs::read_to_string(path)?;
        let registry = Self::from_json(&content)?;
        info!(
            "📦 加载数据源: {} 个内置, {} 个自定义",
            registry.builtin.len(),
            registry.custom.len()
        );
        Ok(registry)
    }

    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        let file: RegistryFile = serde_json::from_str(content)?;

        let builtin = match file.builtin {
            Some(entries) => entries
                .into_iter()
                .map(|(id, e)| SourceDescriptor {
                    id,
                    name: e.name,
                    base_url: trim_base(&e.api),
                    is_adult: e.adult,
                    detail_base_url: e.detail.map(|d| trim_base(&d)),
                    detail_path: e.detail_path,
                })
                .collect(),
            None => Self::builtin().builtin.into_values().collect(),
        };

        let custom = file
            .custom
            .into_iter()
            .map(|e| SourceDescriptor {
                id: String::new(),
                name: e.name,
                base_url: trim_base(&e.url),
                is_adult: e.is_adult,
                detail_base_url: e.detail.map(|d| trim_base(&d)),
                detail_path: e.detail_path,
            })
            .collect();

        Ok(Self::new(builtin, custom))
    }

    /// 按 id 查找，`custom_<n>` 指向第 n 个自定义数据源
    pub fn resolve(&self, id: &str) -> Option<SourceDescriptor> {
        match id.strip_prefix(CUSTOM_PREFIX) {
            Some(index) => index
                .parse::<usize>()
                .ok()
                .and_then(|i| self.custom.get(i))
                .cloned(),
            None => self.builtin.get(id).cloned(),
        }
    }

    /// 内置 (按 id 排序) 在前，自定义按添加顺序在后
    pub fn list(&self) -> Vec<SourceDescriptor> {
        self.builtin
            .values()
            .chain(self.custom.iter())
            .cloned()
            .collect()
    }

    /// 默认选中的非成人内置源；一个都不存在时选中全部非成人源
    pub fn default_selection(&self) -> Vec<String> {
        let preset: Vec<String> = DEFAULT_SELECTION
            .iter()
            .filter(|id| self.builtin.get(**id).is_some_and(|s| !s.is_adult))
            .map(|id| id.to_string())
            .collect();
        if !preset.is_empty() {
            return preset;
        }
        self.list()
            .into_iter()
            .filter(|s| !s.is_adult)
            .map(|s| s.id)
            .collect()
    }

    pub fn adult_ids(&self) -> Vec<String> {
        self.list()
            .into_iter()
            .filter(|s| s.is_adult)
            .map(|s| s.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.builtin.len() + self.custom.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn trim_base(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// 运行参数，全部来自环境变量
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub sources_file: PathBuf,
    pub proxy_url: Option<String>,
    pub source_timeout: Duration,
    pub detail_timeout: Duration,
    pub search_timeout: Duration,
    pub max_pages: u32,
    pub retry: RetryPolicy,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub adult_filter: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: 3000,
            sources_file: PathBuf::from(SOURCES_FILE),
            proxy_url: None,
            source_timeout: Duration::from_secs(8),
            detail_timeout: Duration::from_secs(10),
            search_timeout: Duration::from_secs(15),
            max_pages: 5,
            retry: RetryPolicy::default(),
            cache_ttl: Duration::from_secs(crate::cache::DEFAULT_TTL_SECONDS),
            cache_capacity: crate::cache::DEFAULT_CAPACITY,
            adult_filter: true,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 解析失败的值回落到默认值
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        let num = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let secs = |key: &str, default: Duration| num(key).map(Duration::from_secs).unwrap_or(default);

        Self {
            port: lookup("PORT").and_then(|p| p.trim().parse().ok()).unwrap_or(d.port),
            sources_file: lookup("SOURCES_FILE").map(PathBuf::from).unwrap_or(d.sources_file),
            proxy_url: lookup("PROXY_URL").filter(|p| !p.trim().is_empty()),
            source_timeout: secs("SOURCE_TIMEOUT_SECS", d.source_timeout),
            detail_timeout: secs("DETAIL_TIMEOUT_SECS", d.detail_timeout),
            search_timeout: secs("SEARCH_TIMEOUT_SECS", d.search_timeout),
            max_pages: num("SEARCH_MAX_PAGES")
                .map(|n| n.clamp(1, 50) as u32)
                .unwrap_or(d.max_pages),
            retry: RetryPolicy {
                max_attempts: num("RETRY_MAX_ATTEMPTS")
                    .map(|n| n.clamp(1, 10) as u32)
                    .unwrap_or(d.retry.max_attempts),
                backoff: num("RETRY_BACKOFF_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(d.retry.backoff),
            },
            cache_ttl: secs("CACHE_TTL_SECS", d.cache_ttl),
            cache_capacity: num("CACHE_MAX_ENTRIES")
                .map(|n| n.max(1) as usize)
                .unwrap_or(d.cache_capacity),
            adult_filter: lookup("ADULT_FILTER")
                .map(|v| !matches!(v.trim(), "0" | "false" | "off"))
                .unwrap_or(d.adult_filter),
        }
    }
}
