mod client;
mod document;
mod memory;

use std::future::Future;

use chrono::{DateTime, Local};
use serde::Deserialize;

use crate::error::Result;

pub use self::{
    client::PrismicClient,
    document::{RawContentGroup, RawDocument, RawImage, RawPostData, parse_timestamp},
    memory::MemoryService,
};

pub(crate) use self::document::required;

/// 文章文档类型
pub const POST_TYPE: &str = "post";

/// 内容查询服务
///
/// 按谓词与分页参数返回原始文档页。实现方负责网络与反序列化，
/// 不做重试；缓存与超时由调用方决定。
pub trait ContentService: Send + Sync {
    /// 按谓词查询一页文档
    fn query(
        &self,
        predicates: &[Predicate],
        options: &QueryOptions,
    ) -> impl Future<Output = Result<RawPage>> + Send;

    /// 解引用上一页返回的 [`PageToken`]，获取下一页
    fn next_page(&self, token: &PageToken) -> impl Future<Output = Result<RawPage>> + Send;

    /// 按 uid 获取已发布文档，不存在时返回 `None`
    fn get_by_uid(
        &self,
        doc_type: &str,
        uid: &str,
    ) -> impl Future<Output = Result<Option<RawDocument>>> + Send {
        async move {
            let predicates = [Predicate::uid(doc_type, uid)];
            let options = QueryOptions::default().page_size(1);
            let page = self.query(&predicates, &options).await?;
            Ok(page.results.into_iter().next())
        }
    }

    /// 在预览引用（草稿版本）下获取该类型的当前文档，不存在时返回 `None`
    fn get_single_by_ref(
        &self,
        doc_type: &str,
        reference: &str,
    ) -> impl Future<Output = Result<Option<RawDocument>>> + Send;
}

/// 一页原始文档
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPage {
    #[serde(default)]
    pub results: Vec<RawDocument>,
    #[serde(default)]
    pub next_page: Option<PageToken>,
}

/// 不透明的分页游标
///
/// 只关心是否存在，不解析其内容。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct PageToken(String);

impl PageToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PageToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 查询谓词
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `document.type` 等于给定类型
    DocumentType(String),
    /// 指定类型下 uid 等于给定值
    Uid { doc_type: String, uid: String },
    /// 首次发布时间晚于给定时间
    PublishedAfter(DateTime<Local>),
    /// 首次发布时间早于给定时间
    PublishedBefore(DateTime<Local>),
}

impl Predicate {
    pub fn document_type(doc_type: impl Into<String>) -> Self {
        Predicate::DocumentType(doc_type.into())
    }

    pub fn uid(doc_type: impl Into<String>, uid: impl Into<String>) -> Self {
        Predicate::Uid {
            doc_type: doc_type.into(),
            uid: uid.into(),
        }
    }

    /// 转换为内容服务的查询语法
    ///
    /// ```
    /// # use spacetravelling::prismic::Predicate;
    /// let p = Predicate::document_type("post");
    /// assert_eq!(p.to_query(), r#"[at(document.type,"post")]"#);
    /// ```
    pub fn to_query(&self) -> String {
        match self {
            Predicate::DocumentType(t) => format!(r#"[at(document.type,"{}")]"#, quote(t)),
            Predicate::Uid { doc_type, uid } => {
                format!(r#"[at(my.{}.uid,"{}")]"#, doc_type, quote(uid))
            }
            Predicate::PublishedAfter(at) => format!(
                "[date.after(document.first_publication_date,{})]",
                at.timestamp_millis()
            ),
            Predicate::PublishedBefore(at) => format!(
                "[date.before(document.first_publication_date,{})]",
                at.timestamp_millis()
            ),
        }
    }
}

/// 将多个谓词组合为查询参数 `q`
pub fn to_query_param(predicates: &[Predicate]) -> String {
    let inner: String = predicates.iter().map(Predicate::to_query).collect();
    format!("[{inner}]")
}

fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// 排序方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    FirstPublicationAsc,
    FirstPublicationDesc,
}

impl SortOrder {
    fn as_query(self) -> &'static str {
        match self {
            SortOrder::FirstPublicationAsc => "document.first_publication_date",
            SortOrder::FirstPublicationDesc => "document.first_publication_date desc",
        }
    }
}

/// 查询选项
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// 仅返回的字段，形如 `post.title`
    pub fetch: Vec<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub orderings: Vec<SortOrder>,
}

impl QueryOptions {
    pub fn fetch<I, T>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.fetch = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn order_by(mut self, order: SortOrder) -> Self {
        self.orderings.push(order);
        self
    }

    /// `orderings` 查询参数，未指定排序时为 `None`
    pub fn orderings_param(&self) -> Option<String> {
        if self.orderings.is_empty() {
            return None;
        }
        let inner = self
            .orderings
            .iter()
            .map(|o| o.as_query())
            .collect::<Vec<_>>()
            .join(",");
        Some(format!("[{inner}]"))
    }
}
