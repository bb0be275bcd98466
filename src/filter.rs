//! 成人内容过滤

use crate::types::SearchResultItem;

/// 分类名中出现任一关键词即视为屏蔽 (区分大小写的子串匹配)
pub const BANNED_KEYWORDS: [&str; 19] = [
    "伦理片",
    "福利",
    "里番动漫",
    "门事件",
    "萝莉少女",
    "制服诱惑",
    "国产传媒",
    "cosplay",
    "黑丝诱惑",
    "无码",
    "日本无码",
    "有码",
    "日本有码",
    "SWAG",
    "网红主播",
    "色情片",
    "同性片",
    "福利视频",
    "福利片",
];

pub fn is_banned(type_name: &str) -> bool {
    BANNED_KEYWORDS.iter().any(|kw| type_name.contains(kw))
}

/// 移除被屏蔽分类的条目，其余顺序不变
pub fn retain_allowed(items: &mut Vec<SearchResultItem>) {
    items.retain(|item| !is_banned(&item.type_name));
}
