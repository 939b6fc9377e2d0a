//! Conversion Context - 音源描述
//!
//! 平台、标识规范化与高潮缓存 key

use serde::{Deserialize, Serialize};

use super::errors::ParamError;

/// 音源平台
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Netease,
    Qq,
    Bilibili,
    Douyin,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Netease => "netease",
            Platform::Qq => "qq",
            Platform::Bilibili => "bilibili",
            Platform::Douyin => "douyin",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "netease" | "163" => Some(Platform::Netease),
            "qq" | "qqmusic" => Some(Platform::Qq),
            "bilibili" | "bili" => Some(Platform::Bilibili),
            "douyin" => Some(Platform::Douyin),
            _ => None,
        }
    }

    /// 未指定音质时依次尝试的音质标签（由高到低）
    pub fn quality_ladder(&self) -> &'static [&'static str] {
        match self {
            Platform::Netease => &[
                "jymaster", "jyeffect", "sky", "hires", "lossless", "exhigh", "standard",
            ],
            Platform::Qq => &["flac", "320k", "128k"],
            Platform::Bilibili | Platform::Douyin => &["audio"],
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 音源描述（调用方提交）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub platform: Platform,
    /// 搜索词、ID 或 URL
    pub query: String,
    /// 期望音质，None 时由平台按默认顺序选择
    #[serde(default)]
    pub quality: Option<String>,
    /// B 站多 P 视频的分 P 序号（从 1 开始），None 时取 URL 中的 `p=` 参数
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part: Option<u32>,
}

/// 规范化后的查询
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceQuery {
    /// 平台内 ID（网易云/QQ 歌曲 ID、BV 号、抖音作品 ID）
    Id(String),
    /// 关键词搜索
    Search(String),
    /// 需要网关解析的短链
    Url(String),
}

impl SourceQuery {
    pub fn as_str(&self) -> &str {
        match self {
            SourceQuery::Id(s) | SourceQuery::Search(s) | SourceQuery::Url(s) => s,
        }
    }
}

impl SourceDescriptor {
    /// 按平台规则规范化查询
    pub fn normalize(&self) -> Result<SourceQuery, ParamError> {
        let query = self.query.trim();
        if query.is_empty() {
            return Err(ParamError::InvalidSource("empty query".to_string()));
        }
        self.part()?;
        match self.platform {
            Platform::Netease | Platform::Qq => {
                if query.chars().all(|c| c.is_ascii_digit()) {
                    Ok(SourceQuery::Id(query.to_string()))
                } else if let Some(id) = extract_query_param(query, "id") {
                    Ok(SourceQuery::Id(id))
                } else {
                    Ok(SourceQuery::Search(query.to_string()))
                }
            }
            Platform::Bilibili => extract_bvid(query)
                .or_else(|| extract_avid(query))
                .map(SourceQuery::Id)
                .ok_or_else(|| ParamError::InvalidSource(format!("无法提取 BV 号: {}", query))),
            Platform::Douyin => {
                if let Some(id) = extract_aweme_id(query) {
                    Ok(SourceQuery::Id(id))
                } else if query.contains("v.douyin.com/") {
                    Ok(SourceQuery::Url(query.to_string()))
                } else {
                    Err(ParamError::InvalidSource(format!(
                        "无法提取抖音作品 ID: {}",
                        query
                    )))
                }
            }
        }
    }
}

impl SourceDescriptor {
    /// 要获取的分 P 序号
    ///
    /// 第 1 P 与未指定等价，返回 None；只有 B 站支持分 P
    pub fn part(&self) -> Result<Option<u32>, ParamError> {
        let part = match self.part {
            Some(part) => Some(part),
            None if self.platform == Platform::Bilibili => {
                extract_query_param(self.query.trim(), "p").and_then(|p| p.parse().ok())
            }
            None => None,
        };
        match part {
            Some(0) => Err(ParamError::InvalidSource("part index starts at 1".to_string())),
            Some(_) if self.platform != Platform::Bilibili => Err(ParamError::InvalidSource(
                format!("{} has no multi-part videos", self.platform),
            )),
            Some(part) if part > 1 => Ok(Some(part)),
            _ => Ok(None),
        }
    }
}

/// 从 URL 或裸 ID 中提取 BV 号（`BV` + 10 位字母数字）
pub fn extract_bvid(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut pos = 0;
    while let Some(offset) = input[pos..].find("BV") {
        let start = pos + offset;
        let id: String = input[start + 2..]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect();
        let preceded_by_alnum = start > 0 && bytes[start - 1].is_ascii_alphanumeric();
        if id.len() == 10 && !preceded_by_alnum {
            return Some(format!("BV{}", id));
        }
        pos = start + 2;
    }
    None
}

/// 提取 av 号，返回 `av<数字>`
fn extract_avid(input: &str) -> Option<String> {
    let lower = input.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let mut pos = 0;
    while let Some(offset) = lower[pos..].find("av") {
        let start = pos + offset;
        let digits: String = lower[start + 2..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        let preceded_by_alnum = start > 0 && bytes[start - 1].is_ascii_alphanumeric();
        if !digits.is_empty() && !preceded_by_alnum {
            return Some(format!("av{}", digits));
        }
        pos = start + 2;
    }
    None
}

/// 从抖音 URL 或裸 ID 中提取作品 ID
pub fn extract_aweme_id(input: &str) -> Option<String> {
    let is_aweme_id = |s: &str| (15..=20).contains(&s.len()) && s.chars().all(|c| c.is_ascii_digit());

    if is_aweme_id(input) {
        return Some(input.to_string());
    }
    if let Some(id) = extract_query_param(input, "modal_id") {
        if is_aweme_id(&id) {
            return Some(id);
        }
    }
    for marker in ["/video/", "/note/"] {
        if let Some(idx) = input.find(marker) {
            let id: String = input[idx + marker.len()..]
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if is_aweme_id(&id) {
                return Some(id);
            }
        }
    }
    None
}

/// 提取 URL 查询参数中的纯数字值
fn extract_query_param(input: &str, name: &str) -> Option<String> {
    let (_, query) = input.split_once('?')?;
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        if key == name && !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
            Some(value.to_string())
        } else {
            None
        }
    })
}

/// 带分 P 后缀的音源 ID: 第 N P (N > 1) 为 `<id>_p<N>`
pub fn source_id_with_part(source_id: &str, part: Option<u32>) -> String {
    match part {
        Some(part) => format!("{}_p{}", source_id, part),
        None => source_id.to_string(),
    }
}

/// 平台音源的高潮缓存 key: `<platform>_<id>_<quality>`
pub fn chorus_key_for_source(platform: Platform, source_id: &str, quality: &str) -> String {
    format!("{}_{}_{}", platform.as_str(), source_id, quality)
}

/// 上传文件的高潮缓存 key: `upload_<md5>`
pub fn chorus_key_for_upload(content_hash: &str) -> String {
    format!("upload_{}", content_hash)
}

/// 音频内容哈希 (md5 hex)
pub fn content_hash(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(platform: Platform, query: &str) -> SourceDescriptor {
        SourceDescriptor {
            platform,
            query: query.to_string(),
            quality: None,
            part: None,
        }
    }

    #[test]
    fn test_netease_numeric_id_and_search() {
        assert_eq!(
            descriptor(Platform::Netease, "12345").normalize().unwrap(),
            SourceQuery::Id("12345".to_string())
        );
        assert_eq!(
            descriptor(Platform::Netease, "https://music.163.com/song?id=1330348068")
                .normalize()
                .unwrap(),
            SourceQuery::Id("1330348068".to_string())
        );
        assert_eq!(
            descriptor(Platform::Netease, "起风了").normalize().unwrap(),
            SourceQuery::Search("起风了".to_string())
        );
    }

    #[test]
    fn test_bvid_extraction() {
        assert_eq!(
            extract_bvid("https://www.bilibili.com/video/BV1xx411c7mD?p=2"),
            Some("BV1xx411c7mD".to_string())
        );
        assert_eq!(extract_bvid("BV1xx411c7mD"), Some("BV1xx411c7mD".to_string()));
        assert_eq!(extract_bvid("BV123"), None);
        assert_eq!(
            descriptor(Platform::Bilibili, "av170001").normalize().unwrap(),
            SourceQuery::Id("av170001".to_string())
        );
        assert!(descriptor(Platform::Bilibili, "not a video")
            .normalize()
            .is_err());
    }

    #[test]
    fn test_avid_skips_non_numeric_matches() {
        assert_eq!(extract_avid("navigate av170001"), Some("av170001".to_string()));
        assert_eq!(
            extract_avid("https://www.bilibili.com/video/AV170001/"),
            Some("av170001".to_string())
        );
        assert_eq!(extract_avid("java12"), None);
        assert_eq!(
            descriptor(Platform::Bilibili, "navigate av170001").normalize().unwrap(),
            SourceQuery::Id("av170001".to_string())
        );
    }

    #[test]
    fn test_bilibili_part_from_url_and_field() {
        let from_url = descriptor(Platform::Bilibili, "https://www.bilibili.com/video/BV1xx411c7mD?p=3");
        assert_eq!(from_url.part().unwrap(), Some(3));
        assert_eq!(
            from_url.normalize().unwrap(),
            SourceQuery::Id("BV1xx411c7mD".to_string())
        );

        let explicit = SourceDescriptor {
            part: Some(2),
            ..from_url.clone()
        };
        assert_eq!(explicit.part().unwrap(), Some(2));

        let first = SourceDescriptor {
            part: Some(1),
            ..from_url.clone()
        };
        assert_eq!(first.part().unwrap(), None);

        let zero = SourceDescriptor {
            part: Some(0),
            ..from_url
        };
        assert!(zero.normalize().is_err());

        let netease = SourceDescriptor {
            part: Some(2),
            ..descriptor(Platform::Netease, "12345")
        };
        assert!(netease.normalize().is_err());
        assert_eq!(source_id_with_part("BV1xx411c7mD", Some(3)), "BV1xx411c7mD_p3");
        assert_eq!(source_id_with_part("BV1xx411c7mD", None), "BV1xx411c7mD");
    }

    #[test]
    fn test_aweme_id_extraction() {
        assert_eq!(
            extract_aweme_id("https://www.douyin.com/video/7234567890123456789"),
            Some("7234567890123456789".to_string())
        );
        assert_eq!(
            extract_aweme_id("https://www.douyin.com/discover?modal_id=7234567890123456789"),
            Some("7234567890123456789".to_string())
        );
        assert_eq!(
            descriptor(Platform::Douyin, "https://v.douyin.com/iRNBho6u/")
                .normalize()
                .unwrap(),
            SourceQuery::Url("https://v.douyin.com/iRNBho6u/".to_string())
        );
        assert!(descriptor(Platform::Douyin, "12").normalize().is_err());
    }

    #[test]
    fn test_chorus_keys() {
        assert_eq!(
            chorus_key_for_source(Platform::Netease, "12345", "320k"),
            "netease_12345_320k"
        );
        assert_eq!(
            chorus_key_for_upload(&content_hash(b"abc")),
            "upload_900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[test]
    fn test_platform_parse() {
        assert_eq!(Platform::from_str("NetEase"), Some(Platform::Netease));
        assert_eq!(Platform::from_str("bili"), Some(Platform::Bilibili));
        assert_eq!(Platform::from_str("spotify"), None);
    }
}
