//! 播放地址编解码
//! 格式: 线路之间用 `$$$` 分隔，剧集之间用 `#` 分隔，单集为 `名称$地址`

use crate::types::{Episode, EpisodeList};

pub const GROUP_DELIMITER: &str = "$$$";
pub const EPISODE_DELIMITER: char = '#';
pub const LABEL_DELIMITER: char = '$';

/// 解析全部线路，空线路不出现在结果中；无效条目直接丢弃，不报错
pub fn decode(raw: &str) -> Vec<EpisodeList> {
    if raw.trim().is_empty() {
        return Vec::new();
    }

    raw.split(GROUP_DELIMITER)
        .map(decode_group)
        .filter(|group| !group.is_empty())
        .collect()
}

/// 只取第一条线路
pub fn decode_first_group(raw: &str) -> EpisodeList {
    decode(raw).into_iter().next().unwrap_or_default()
}

/// 序列化回上游格式
pub fn encode(groups: &[EpisodeList]) -> String {
    groups
        .iter()
        .map(|group| {
            group
                .iter()
                .map(|ep| format!("{}{}{}", ep.label, LABEL_DELIMITER, ep.url))
                .collect::<Vec<_>>()
                .join(&EPISODE_DELIMITER.to_string())
        })
        .collect::<Vec<_>>()
        .join(GROUP_DELIMITER)
}

fn decode_group(group: &str) -> EpisodeList {
    group.split(EPISODE_DELIMITER).filter_map(decode_entry).collect()
}

fn decode_entry(entry: &str) -> Option<Episode> {
    let entry = entry.trim();
    if entry.is_empty() {
        return None;
    }

    // 只按第一个 `$` 切分，地址里后续的 `$` 保留
    let (label, url) = match entry.split_once(LABEL_DELIMITER) {
        Some((label, url)) => (label.trim(), url.trim()),
        None => (entry, entry),
    };

    if url.is_empty() || !url.starts_with("http") {
        return None;
    }

    let label = if label.is_empty() { url } else { label };
    Some(Episode {
        label: label.to_string(),
        url: url.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(label: &str, url: &str) -> Episode {
        Episode {
            label: label.to_string(),
            url: url.to_string(),
        }
    }

    #[test]
    fn test_decode_two_groups() {
        let raw = "第1集$http://a/1.m3u8#第2集$http://a/2.m3u8$$$备用1$http://b/1.m3u8";
        let groups = decode(raw);
        assert_eq!(groups.len(), 2);
        assert_eq!(
            groups[0],
            vec![ep("第1集", "http://a/1.m3u8"), ep("第2集", "http://a/2.m3u8")]
        );
        assert_eq!(groups[1], vec![ep("备用1", "http://b/1.m3u8")]);
    }

    #[test]
    fn test_decode_empty_input() {
        assert!(decode("").is_empty());
        assert!(decode("   ").is_empty());
        assert!(decode_first_group("").is_empty());
    }

    #[test]
    fn test_generated_groups_keep_shape_and_order() {
        for n in 1..4 {
            for m in 1..5 {
                let groups: Vec<EpisodeList> = (0..n)
                    .map(|g| {
                        (0..m)
                            .map(|e| ep(&format!("第{}集", e + 1), &format!("https://cdn{}.example.com/{}.m3u8", g, e)))
                            .collect()
                    })
                    .collect();
                let decoded = decode(&encode(&groups));
                assert_eq!(decoded, groups, "{} 组 x {} 集", n, m);
            }
        }
    }

    #[test]
    fn test_trailing_and_doubled_delimiters() {
        let groups = decode("第1集$http://a/1#第2集$http://a/2#");
        assert_eq!(groups[0].len(), 2);

        let groups = decode("第1集$http://a/1##第2集$http://a/2$$$$$$备用$http://b/1$$$");
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[1], vec![ep("备用", "http://b/1")]);
    }

    #[test]
    fn test_dollar_inside_url_is_kept() {
        let groups = decode("正片$https://a/play?sig=x$y$z");
        assert_eq!(groups[0], vec![ep("正片", "https://a/play?sig=x$y$z")]);
    }

    #[test]
    fn test_non_http_entries_dropped() {
        let groups = decode("第1集$ftp://a/1#第2集$magnet:?xt=1#第3集$http://a/3#第4集$");
        assert_eq!(groups[0], vec![ep("第3集", "http://a/3")]);
    }

    #[test]
    fn test_group_with_only_invalid_entries_omitted() {
        let groups = decode("坏的$rtmp://x$$$第1集$http://ok/1");
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0][0].url, "http://ok/1");
    }

    #[test]
    fn test_entry_without_label() {
        assert_eq!(decode_first_group("http://a/1.mp4"), vec![ep("http://a/1.mp4", "http://a/1.mp4")]);
        assert_eq!(decode_first_group("$http://a/1.mp4"), vec![ep("http://a/1.mp4", "http://a/1.mp4")]);
        assert!(decode("第1集").is_empty());
    }

    #[test]
    fn test_first_group_only() {
        let first = decode_first_group("a$http://x/1#b$http://x/2$$$c$http://y/1");
        assert_eq!(first, vec![ep("a", "http://x/1"), ep("b", "http://x/2")]);
    }
}
