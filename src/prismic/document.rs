use chrono::{DateTime, Local};
use serde::{Deserialize, Deserializer};

use crate::{
    error::{Error, Result},
    richtext::RichText,
};

/// 内容服务返回的原始文档
///
/// 字段尽量宽松地反序列化，必填性校验在各自的规范化函数中完成。
#[derive(Debug, Clone, Deserialize)]
pub struct RawDocument {
    pub id: String,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(rename = "type")]
    pub doc_type: String,
    #[serde(default, deserialize_with = "parse_optional_local")]
    pub first_publication_date: Option<DateTime<Local>>,
    #[serde(default, deserialize_with = "parse_optional_local")]
    pub last_publication_date: Option<DateTime<Local>>,
    #[serde(default)]
    pub data: Option<RawPostData>,
}

impl RawDocument {
    /// 构造一个未发布、无数据的文档
    pub fn new(doc_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            uid: None,
            doc_type: doc_type.into(),
            first_publication_date: None,
            last_publication_date: None,
            data: None,
        }
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    /// 设置首次发布时间，最后发布时间同步设置
    pub fn published_at(mut self, at: DateTime<Local>) -> Self {
        self.first_publication_date = Some(at);
        self.last_publication_date = Some(at);
        self
    }

    pub fn modified_at(mut self, at: DateTime<Local>) -> Self {
        self.last_publication_date = Some(at);
        self
    }

    pub fn with_data(mut self, data: RawPostData) -> Self {
        self.data = Some(data);
        self
    }
}

/// 文章文档的 `data` 块
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPostData {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub banner: Option<RawImage>,
    #[serde(default)]
    pub content: Option<Vec<RawContentGroup>>,
}

impl RawPostData {
    pub fn new(
        title: impl Into<String>,
        subtitle: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        Self {
            title: Some(title.into()),
            subtitle: Some(subtitle.into()),
            author: Some(author.into()),
            banner: None,
            content: None,
        }
    }
}

/// 图片字段，空图片在内容服务中表现为 `{}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawImage {
    #[serde(default)]
    pub url: Option<String>,
}

/// 正文分组：一个小标题加一段富文本
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawContentGroup {
    #[serde(default)]
    pub heading: Option<String>,
    #[serde(default)]
    pub body: RichText,
}

/// 取出必填字段，缺失时返回 [`Error::Validation`]
pub(crate) fn required(value: Option<String>, id: &str, field: &str) -> Result<String> {
    value.ok_or_else(|| Error::Validation(format!("document {id}: missing `{field}`")))
}

/// 解析内容服务的时间戳
///
/// 支持 RFC 3339 以及 `2021-03-15T19:25:28+0000` 这种不带冒号的时区偏移。
pub fn parse_timestamp(s: &str) -> Option<DateTime<Local>> {
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z"))
        .ok()
        .map(|dt| dt.with_timezone(&Local))
}

fn parse_optional_local<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<DateTime<Local>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(s) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };

    parse_timestamp(&s)
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom(format!("无法解析日期: {}", s)))
}
