use std::collections::HashSet;

use chrono::{DateTime, Local};
use tracing::instrument;

use crate::{
    error::{Error, Result},
    prismic::{
        ContentService, POST_TYPE, PageToken, Predicate, QueryOptions, RawDocument, RawPage,
        required,
    },
};

/// 列表中展示的文章摘要
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleSummary {
    /// 内容服务分配的唯一标识，合并时按此去重
    pub id: String,
    /// 文章页路径使用的 uid
    pub slug: Option<String>,
    /// `None` 表示未发布
    pub published_at: Option<DateTime<Local>>,
    pub title: String,
    pub subtitle: String,
    pub author: String,
}

impl ArticleSummary {
    /// 规范化原始文档，缺少 `data` 或标题、副标题、作者时返回 [`Error::Validation`]
    pub fn from_raw(doc: RawDocument) -> Result<Self> {
        let data = doc
            .data
            .ok_or_else(|| Error::Validation(format!("document {}: missing `data`", doc.id)))?;

        Ok(Self {
            title: required(data.title, &doc.id, "title")?,
            subtitle: required(data.subtitle, &doc.id, "subtitle")?,
            author: required(data.author, &doc.id, "author")?,
            slug: doc.uid,
            published_at: doc.first_publication_date,
            id: doc.id,
        })
    }
}

/// 一页文章摘要
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub results: Vec<ArticleSummary>,
    /// 存在即表示还有下一页
    pub next_page: Option<PageToken>,
}

impl ListingPage {
    fn from_raw(page: RawPage) -> Result<Self> {
        Ok(Self {
            results: page
                .results
                .into_iter()
                .map(ArticleSummary::from_raw)
                .collect::<Result<_>>()?,
            next_page: page.next_page,
        })
    }
}

/// 首页第一页：只取列表需要的字段
#[instrument(skip(service))]
pub async fn fetch_initial_listing<S: ContentService>(
    service: &S,
    page_size: u32,
) -> Result<ListingPage> {
    if page_size == 0 {
        return Err(Error::Validation("page_size must be positive".to_string()));
    }

    let options = QueryOptions::default()
        .fetch(
            ["title", "subtitle", "author"]
                .iter()
                .map(|f| format!("{POST_TYPE}.{f}")),
        )
        .page(1)
        .page_size(page_size);

    let page = service
        .query(&[Predicate::document_type(POST_TYPE)], &options)
        .await?;

    let listing = ListingPage::from_raw(page)?;
    tracing::debug!(
        count = listing.results.len(),
        has_more = listing.next_page.is_some(),
        "initial listing fetched"
    );
    Ok(listing)
}

/// 通过上一页返回的游标获取下一页
#[instrument(skip_all, fields(token = %token))]
pub async fn fetch_next_listing<S: ContentService>(
    service: &S,
    token: &PageToken,
) -> Result<ListingPage> {
    let page = service.next_page(token).await?;
    ListingPage::from_raw(page)
}

/// 合并两段摘要列表
///
/// 先 `existing` 后 `incoming` 拼接，按 `id` 去重，保留第一次出现的条目。
pub fn merge_listings(
    existing: &[ArticleSummary],
    incoming: &[ArticleSummary],
) -> Vec<ArticleSummary> {
    let mut seen = HashSet::new();

    existing
        .iter()
        .chain(incoming)
        .filter(|summary| seen.insert(summary.id.as_str()))
        .cloned()
        .collect()
}

/// 调用方持有的"加载更多"累加器
#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub results: Vec<ArticleSummary>,
    pub next_page: Option<PageToken>,
}

impl From<ListingPage> for Listing {
    fn from(page: ListingPage) -> Self {
        Self {
            results: merge_listings(&page.results, &[]),
            next_page: page.next_page,
        }
    }
}

impl Listing {
    pub fn has_more(&self) -> bool {
        self.next_page.is_some()
    }

    /// 加载下一页并合并，返回新增条目数
    ///
    /// 没有下一页时不发起请求；请求失败时当前状态保持不变。
    pub async fn load_more<S: ContentService>(&mut self, service: &S) -> Result<usize> {
        let Some(token) = &self.next_page else {
            return Ok(0);
        };

        let page = fetch_next_listing(service, token).await?;

        let before = self.results.len();
        self.results = merge_listings(&self.results, &page.results);
        self.next_page = page.next_page;
        Ok(self.results.len() - before)
    }

    /// 一直加载到没有下一页为止
    pub async fn load_all<S: ContentService>(&mut self, service: &S) -> Result<()> {
        while self.has_more() {
            self.load_more(service).await?;
        }
        Ok(())
    }
}
